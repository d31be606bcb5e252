//! 更新策略
//!
//! 每种策略负责一类内容的变更与变更后校验。策略按固定顺序
//! 逐个询问`can_handle`，第一个接手的策略执行变更；纯文本
//! 策略永远兜底。校验失败的变更不会落盘。

use std::rc::Rc;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::core::{RetouchError, RetouchResult};
use crate::parsers::html::{parse, select_nodes, serialize, set_node_attr};

/// 单个更新操作
#[derive(Debug, Clone)]
pub enum UpdateOperation {
    /// 替换文件中首次出现的旧内容
    ReplaceContent { old: String, new: String },
    /// 替换指定行（1起始）
    ReplaceLine { line: usize, new: String },
    /// 替换选择器命中元素的内部HTML
    ReplaceSelector { selector: String, new_html: String },
    /// 设置选择器命中元素的属性
    SetAttribute {
        selector: String,
        attribute: String,
        value: String,
    },
}

impl UpdateOperation {
    pub fn kind(&self) -> &'static str {
        match self {
            UpdateOperation::ReplaceContent { .. } => "content",
            UpdateOperation::ReplaceLine { .. } => "line",
            UpdateOperation::ReplaceSelector { .. } => "selector",
            UpdateOperation::SetAttribute { .. } => "attribute",
        }
    }

    /// 从JSON操作描述构造，供批量接口使用
    ///
    /// 描述形如 `{"type": "content", "old": "...", "new": "..."}`。
    pub fn from_descriptor(descriptor: &Value) -> RetouchResult<Self> {
        let op_type = descriptor
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default();

        let str_field = |name: &str| -> RetouchResult<String> {
            descriptor
                .get(name)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| {
                    RetouchError::Validation(format!("操作缺少字段 {}", name))
                })
        };

        match op_type {
            "content" => Ok(UpdateOperation::ReplaceContent {
                old: str_field("old")?,
                new: str_field("new")?,
            }),
            "line" => {
                let line = descriptor
                    .get("line")
                    .and_then(Value::as_u64)
                    .ok_or_else(|| {
                        RetouchError::Validation("操作缺少字段 line".to_string())
                    })? as usize;
                Ok(UpdateOperation::ReplaceLine {
                    line,
                    new: str_field("new")?,
                })
            }
            "selector" => Ok(UpdateOperation::ReplaceSelector {
                selector: str_field("selector")?,
                new_html: str_field("new_html")?,
            }),
            "attribute" => Ok(UpdateOperation::SetAttribute {
                selector: str_field("selector")?,
                attribute: str_field("attribute")?,
                value: str_field("value")?,
            }),
            other => Err(RetouchError::UnknownOperationType(other.to_string())),
        }
    }
}

/// 变更后校验报告
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn ok() -> Self {
        Self {
            valid: true,
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            errors: vec![error.into()],
            warnings: Vec::new(),
        }
    }
}

/// 更新策略接口
pub trait UpdateStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// 是否接手该文件内容与操作的组合
    fn can_handle(&self, content: &str, operation: &UpdateOperation) -> bool;

    /// 执行变更，返回变更后的完整内容
    fn apply(&self, content: &str, operation: &UpdateOperation) -> RetouchResult<String>;

    /// 校验变更后的内容
    fn validate(&self, content: &str) -> ValidationReport;
}

/// 文本层的内容替换，content/line两种操作共用
fn apply_text_operation(content: &str, operation: &UpdateOperation) -> RetouchResult<String> {
    match operation {
        UpdateOperation::ReplaceContent { old, new } => {
            if !content.contains(old.as_str()) {
                return Err(RetouchError::Validation(format!(
                    "目标内容不存在: {}",
                    crate::utils::context_snippet(old, 0, 40, 0)
                )));
            }
            Ok(content.replacen(old.as_str(), new, 1))
        }
        UpdateOperation::ReplaceLine { line, new } => {
            if *line == 0 {
                return Err(RetouchError::Validation("行号从1开始".to_string()));
            }
            // 按\n切分保留每行的\r，非目标行逐字节不变
            let mut segments: Vec<String> =
                content.split('\n').map(str::to_string).collect();
            let line_count = if content.ends_with('\n') {
                segments.len() - 1
            } else {
                segments.len()
            };
            if *line > line_count {
                return Err(RetouchError::Validation(format!(
                    "行号{}超出文件范围（共{}行）",
                    line, line_count
                )));
            }
            let target = &mut segments[*line - 1];
            *target = if target.ends_with('\r') {
                format!("{}\r", new)
            } else {
                new.clone()
            };
            Ok(segments.join("\n"))
        }
        other => Err(RetouchError::Validation(format!(
            "文本策略不支持{}操作",
            other.kind()
        ))),
    }
}

/// 模板策略
///
/// 处理含Blade语法的文件。变更走文本层替换（不经过DOM，指令
/// 不是合法HTML），校验检查指令配对与输出表达式括号平衡。
pub struct TemplateStrategy {
    directive_pairs: Vec<(Regex, Regex)>,
    blade_marker: Regex,
}

impl Default for TemplateStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateStrategy {
    pub fn new() -> Self {
        // \b后缀防止@if匹配到@isset、@for匹配到@foreach
        let pair = |open: &str, close: &str| {
            (Regex::new(open).unwrap(), Regex::new(close).unwrap())
        };

        Self {
            directive_pairs: vec![
                pair(r"@if\b", r"@endif\b"),
                pair(r"@foreach\b", r"@endforeach\b"),
                pair(r"@for\b", r"@endfor\b"),
                pair(r"@while\b", r"@endwhile\b"),
                pair(r"@section\b", r"@endsection\b"),
                pair(r"@push\b", r"@endpush\b"),
            ],
            blade_marker: Regex::new(r"@\w+|\{\{|\{!!").unwrap(),
        }
    }

    fn count(regex: &Regex, content: &str) -> usize {
        regex.find_iter(content).count()
    }
}

impl UpdateStrategy for TemplateStrategy {
    fn name(&self) -> &'static str {
        "template"
    }

    fn can_handle(&self, content: &str, operation: &UpdateOperation) -> bool {
        matches!(
            operation,
            UpdateOperation::ReplaceContent { .. } | UpdateOperation::ReplaceLine { .. }
        ) && self.blade_marker.is_match(content)
    }

    fn apply(&self, content: &str, operation: &UpdateOperation) -> RetouchResult<String> {
        apply_text_operation(content, operation)
    }

    fn validate(&self, content: &str) -> ValidationReport {
        let mut report = ValidationReport::ok();

        for (open, close) in &self.directive_pairs {
            let opened = Self::count(open, content);
            let closed = Self::count(close, content);
            if opened != closed {
                report.valid = false;
                report.errors.push(format!(
                    "指令不配对: {} x{} 对 {} x{}",
                    open.as_str(),
                    opened,
                    close.as_str(),
                    closed
                ));
            }
        }

        let echo_open = content.matches("{{").count();
        let echo_close = content.matches("}}").count();
        if echo_open != echo_close {
            report.valid = false;
            report.errors.push(format!(
                "输出表达式括号不平衡: {{ x{} 对 }} x{}",
                echo_open, echo_close
            ));
        }

        let raw_open = content.matches("{!!").count();
        let raw_close = content.matches("!!}").count();
        if raw_open != raw_close {
            report.valid = false;
            report
                .errors
                .push("原始输出表达式 {!! !!} 不配对".to_string());
        }

        report
    }
}

/// DOM策略
///
/// 处理选择器/属性操作：解析、定位、改写、重新序列化。
/// 选择器没有命中任何元素视为校验失败。
#[derive(Default)]
pub struct DomStrategy;

// 校验时做标签平衡检查的容器标签
const BALANCED_TAGS: &[&str] = &["div", "section", "article", "table", "ul", "ol", "form"];

impl DomStrategy {
    fn replace_children(
        target: &markup5ever_rcdom::Handle,
        new_html: &str,
    ) -> RetouchResult<()> {
        // 空内容是合法的清空操作，跳过片段解析
        target.children.borrow_mut().clear();
        if new_html.trim().is_empty() {
            return Ok(());
        }

        let fragment = parse(new_html)?;
        let Some(body) = fragment.body() else {
            return Err(RetouchError::Parse("片段解析后缺少body".to_string()));
        };

        let new_children: Vec<_> = body.children.borrow_mut().drain(..).collect();
        for child in &new_children {
            child.parent.set(Some(Rc::downgrade(target)));
        }
        target.children.borrow_mut().extend(new_children);
        Ok(())
    }
}

impl UpdateStrategy for DomStrategy {
    fn name(&self) -> &'static str {
        "dom"
    }

    fn can_handle(&self, content: &str, operation: &UpdateOperation) -> bool {
        matches!(
            operation,
            UpdateOperation::ReplaceSelector { .. } | UpdateOperation::SetAttribute { .. }
        ) && content.contains('<')
    }

    fn apply(&self, content: &str, operation: &UpdateOperation) -> RetouchResult<String> {
        let dom = parse(content)?;

        match operation {
            UpdateOperation::ReplaceSelector { selector, new_html } => {
                let matches = select_nodes(&dom.document(), selector);
                if matches.is_empty() {
                    return Err(RetouchError::Validation(format!(
                        "选择器没有命中任何元素: {}",
                        selector
                    )));
                }
                debug!(selector = %selector, count = matches.len(), "选择器替换");
                for node in &matches {
                    Self::replace_children(node, new_html)?;
                }
            }
            UpdateOperation::SetAttribute {
                selector,
                attribute,
                value,
            } => {
                let matches = select_nodes(&dom.document(), selector);
                if matches.is_empty() {
                    return Err(RetouchError::Validation(format!(
                        "选择器没有命中任何元素: {}",
                        selector
                    )));
                }
                for node in &matches {
                    set_node_attr(node, attribute, Some(value.clone()));
                }
            }
            other => {
                return Err(RetouchError::Validation(format!(
                    "DOM策略不支持{}操作",
                    other.kind()
                )));
            }
        }

        serialize(&dom)
    }

    fn validate(&self, content: &str) -> ValidationReport {
        let mut report = ValidationReport::ok();

        for tag in BALANCED_TAGS {
            let open_space = content.matches(&format!("<{} ", tag)).count();
            let open_plain = content.matches(&format!("<{}>", tag)).count();
            let open = open_space + open_plain;
            let close = content.matches(&format!("</{}>", tag)).count();
            if open != close {
                report.warnings.push(format!(
                    "标签<{}>疑似不平衡: 开{} 闭{}",
                    tag, open, close
                ));
            }
        }

        report
    }
}

/// 纯文本策略，兜底
#[derive(Default)]
pub struct PlainTextStrategy;

impl UpdateStrategy for PlainTextStrategy {
    fn name(&self) -> &'static str {
        "plain_text"
    }

    fn can_handle(&self, _content: &str, operation: &UpdateOperation) -> bool {
        matches!(
            operation,
            UpdateOperation::ReplaceContent { .. } | UpdateOperation::ReplaceLine { .. }
        )
    }

    fn apply(&self, content: &str, operation: &UpdateOperation) -> RetouchResult<String> {
        apply_text_operation(content, operation)
    }

    fn validate(&self, _content: &str) -> ValidationReport {
        ValidationReport::ok()
    }
}

/// 默认策略链，顺序即优先级
pub fn default_strategies() -> Vec<Box<dyn UpdateStrategy>> {
    vec![
        Box::new(TemplateStrategy::new()),
        Box::new(DomStrategy),
        Box::new(PlainTextStrategy),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_from_descriptor() {
        let descriptor = serde_json::json!({
            "type": "content",
            "old": "Old",
            "new": "New"
        });
        let op = UpdateOperation::from_descriptor(&descriptor).unwrap();
        assert!(matches!(op, UpdateOperation::ReplaceContent { .. }));
        assert_eq!(op.kind(), "content");
    }

    #[test]
    fn test_operation_from_unknown_descriptor() {
        let descriptor = serde_json::json!({"type": "teleport"});
        let result = UpdateOperation::from_descriptor(&descriptor);
        assert!(matches!(
            result,
            Err(RetouchError::UnknownOperationType(_))
        ));
    }

    #[test]
    fn test_template_strategy_handles_blade() {
        let strategy = TemplateStrategy::new();
        let op = UpdateOperation::ReplaceContent {
            old: "Hi".to_string(),
            new: "Hello".to_string(),
        };

        assert!(strategy.can_handle("@if ($x)\nHi\n@endif\n", &op));
        assert!(strategy.can_handle("<p>{{ $name }}</p>", &op));
        assert!(!strategy.can_handle("<p>plain html</p>", &op));
    }

    #[test]
    fn test_template_validation_catches_unpaired_if() {
        let strategy = TemplateStrategy::new();

        let report = strategy.validate("@if ($x)\nHi\n@endif\n");
        assert!(report.valid);

        let report = strategy.validate("@if ($x)\nHi\n");
        assert!(!report.valid);
    }

    #[test]
    fn test_template_validation_isset_not_counted_as_if() {
        let strategy = TemplateStrategy::new();
        // @isset / @foreach 不应被计入 @if / @for 的配对
        let report = strategy.validate("@isset($x) x @endisset @foreach($l as $i) y @endforeach");
        assert!(report.valid);
    }

    #[test]
    fn test_template_validation_echo_balance() {
        let strategy = TemplateStrategy::new();
        let report = strategy.validate("<p>{{ $name </p>");
        assert!(!report.valid);
    }

    #[test]
    fn test_template_apply_replace_line() {
        let strategy = TemplateStrategy::new();
        let content = "line one\n{{ $x }}\nline three\n";
        let op = UpdateOperation::ReplaceLine {
            line: 3,
            new: "LINE THREE".to_string(),
        };

        let updated = strategy.apply(content, &op).unwrap();
        assert_eq!(updated, "line one\n{{ $x }}\nLINE THREE\n");
    }

    #[test]
    fn test_replace_line_preserves_crlf() {
        let strategy = PlainTextStrategy;
        let content = "line one\r\nline two\r\nline three\r\n";
        let op = UpdateOperation::ReplaceLine {
            line: 2,
            new: "LINE TWO".to_string(),
        };

        let updated = strategy.apply(content, &op).unwrap();
        assert_eq!(updated, "line one\r\nLINE TWO\r\nline three\r\n");
    }

    #[test]
    fn test_replace_line_out_of_range() {
        let strategy = PlainTextStrategy;
        let op = UpdateOperation::ReplaceLine {
            line: 4,
            new: "x".to_string(),
        };
        // 末尾换行不算一行
        assert!(matches!(
            strategy.apply("a\nb\nc\n", &op),
            Err(RetouchError::Validation(_))
        ));
    }

    #[test]
    fn test_text_replace_missing_target() {
        let strategy = PlainTextStrategy;
        let op = UpdateOperation::ReplaceContent {
            old: "absent".to_string(),
            new: "x".to_string(),
        };
        assert!(matches!(
            strategy.apply("some text", &op),
            Err(RetouchError::Validation(_))
        ));
    }

    #[test]
    fn test_text_replace_first_occurrence_only() {
        let strategy = PlainTextStrategy;
        let op = UpdateOperation::ReplaceContent {
            old: "aa".to_string(),
            new: "bb".to_string(),
        };
        assert_eq!(strategy.apply("aa aa", &op).unwrap(), "bb aa");
    }

    #[test]
    fn test_dom_strategy_replace_selector() {
        let strategy = DomStrategy;
        let content = r#"<div class="hero"><p>Old text</p></div>"#;
        let op = UpdateOperation::ReplaceSelector {
            selector: ".hero".to_string(),
            new_html: "<p>New text</p>".to_string(),
        };

        let updated = strategy.apply(content, &op).unwrap();
        assert!(updated.contains("New text"));
        assert!(!updated.contains("Old text"));
        assert!(updated.contains(r#"class="hero""#));
    }

    #[test]
    fn test_dom_strategy_set_attribute() {
        let strategy = DomStrategy;
        let content = r#"<img src="/old.png" alt="pic">"#;
        let op = UpdateOperation::SetAttribute {
            selector: "img".to_string(),
            attribute: "src".to_string(),
            value: "/new.png".to_string(),
        };

        let updated = strategy.apply(content, &op).unwrap();
        assert!(updated.contains(r#"src="/new.png""#));
        assert!(updated.contains(r#"alt="pic""#));
    }

    #[test]
    fn test_dom_strategy_selector_miss() {
        let strategy = DomStrategy;
        let op = UpdateOperation::ReplaceSelector {
            selector: "#missing".to_string(),
            new_html: "<p>x</p>".to_string(),
        };

        assert!(matches!(
            strategy.apply("<div>hello</div>", &op),
            Err(RetouchError::Validation(_))
        ));
    }

    #[test]
    fn test_default_strategy_order() {
        let strategies = default_strategies();
        let names: Vec<_> = strategies.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["template", "dom", "plain_text"]);
    }
}
