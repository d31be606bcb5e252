//! 元素分类器
//!
//! 遍历DOM，应用候选选择器与排除规则，对每个候选节点
//! 判定内容类型并产出完整的元素元数据。
//!
//! 排除规则按固定顺序应用：
//! 1. 标签在排除集内（默认 script/style/meta/link，可配置）
//! 2. 自身或任一祖先带有 `data-cms-exclude` 标记
//! 3. 文本短于最小长度（媒体类标签除外）
//!
//! 内容类型判定是严格的fallthrough：标签直接映射 → 框架属性 →
//! class启发式 → 内容形态，后面的规则只在前面不命中时生效。

use chrono::Utc;
use markup5ever_rcdom::{Handle, NodeData};

use crate::parsers::html::{
    get_node_attr, get_node_attrs, get_node_classes, get_node_name, inner_html, text_content,
    DomHandle,
};
use crate::scanner::types::{
    ContentType, EditPermissions, ElementMetadata, PositionEstimate, SourceMapping,
};
use crate::scanner::ScanOptions;
use crate::utils::short_hash;

/// 候选标签集合：文本元素、媒体、链接、列表、表格
const CANDIDATE_TAGS: &[&str] = &[
    "p", "span", "div", "h1", "h2", "h3", "h4", "h5", "h6", "img", "a", "ul", "ol", "li",
    "table", "video", "audio", "iframe",
];

/// 天然无文本的标签，不受最小文本长度约束
const NON_TEXT_TAGS: &[&str] = &["img", "video", "audio", "iframe"];

/// 文档外壳标签，遍历时跳过自身但继续下钻
const SHELL_TAGS: &[&str] = &["html", "head", "body"];

/// 行内格式化标签，出现在子节点中即视为富文本
const INLINE_FORMAT_TAGS: &[&str] = &[
    "b", "i", "em", "strong", "u", "a", "code", "small", "mark", "sub", "sup", "br",
];

/// 分类结果：元数据加DOM句柄，标记注入时按句柄回写
pub struct CandidateElement {
    pub meta: ElementMetadata,
    pub handle: Handle,
}

/// 从DOM中提取全部可编辑候选元素
///
/// `source_html` 仅用于估计元素在原文中的字节偏移，尽力而为。
pub fn extract_editable_elements(
    dom: &DomHandle,
    source_html: &str,
    options: &ScanOptions,
) -> Vec<CandidateElement> {
    let mut out = Vec::new();
    let root = dom.content_root();

    walk(&root, &mut WalkContext {
        options,
        source_html,
        path: Vec::new(),
        excluded_by_ancestor: false,
    }, &mut out);

    out
}

struct WalkContext<'a> {
    options: &'a ScanOptions,
    source_html: &'a str,
    /// (标签, 同名兄弟序号) 栈，用于xpath/选择器/稳定路径
    path: Vec<(String, usize)>,
    excluded_by_ancestor: bool,
}

fn walk(node: &Handle, ctx: &mut WalkContext, out: &mut Vec<CandidateElement>) {
    // 统计同名兄弟序号（nth-of-type语义，1起始）
    let mut tag_counters: std::collections::HashMap<String, usize> =
        std::collections::HashMap::new();

    for child in node.children.borrow().iter() {
        let Some(tag) = get_node_name(child).map(|t| t.to_string()) else {
            continue;
        };

        let index = tag_counters
            .entry(tag.clone())
            .and_modify(|c| *c += 1)
            .or_insert(1);
        let index = *index;

        let shell = SHELL_TAGS.contains(&tag.as_str());
        let excluded_here =
            ctx.excluded_by_ancestor || get_node_attr(child, "data-cms-exclude").is_some();

        if !shell {
            ctx.path.push((tag.clone(), index));

            if let Some(candidate) = classify(child, &tag, excluded_here, ctx) {
                out.push(candidate);
            }
        }

        let saved_excluded = ctx.excluded_by_ancestor;
        ctx.excluded_by_ancestor = excluded_here;
        walk(child, ctx, out);
        ctx.excluded_by_ancestor = saved_excluded;

        if !shell {
            ctx.path.pop();
        }
    }
}

fn classify(
    node: &Handle,
    tag: &str,
    excluded: bool,
    ctx: &WalkContext,
) -> Option<CandidateElement> {
    // 规则1：排除标签集
    if ctx.options.excluded_tags.iter().any(|t| t == tag) {
        return None;
    }

    // 规则2：显式排除标记（自身或祖先）
    if excluded {
        return None;
    }

    let explicitly_marked = get_node_attr(node, "data-cms-editable").is_some();
    let is_candidate_tag = CANDIDATE_TAGS.contains(&tag);
    let is_component_bearing = has_framework_attributes(node);

    if !is_candidate_tag && !explicitly_marked && !is_component_bearing {
        return None;
    }

    // 链接必须带href才算可编辑
    if tag == "a" && get_node_attr(node, "href").is_none() && !explicitly_marked {
        return None;
    }

    let text = text_content(node);
    let trimmed = text.trim();

    // 规则3：文本过短（媒体标签除外）
    if !NON_TEXT_TAGS.contains(&tag) && trimmed.chars().count() < ctx.options.min_text_length {
        return None;
    }

    let content_type = detect_content_type(node, tag, trimmed);
    let attributes = get_node_attrs(node);
    let classes = get_node_classes(node);

    let xpath = build_xpath(&ctx.path);
    let css_selector = build_css_selector(node, &ctx.path);

    // 稳定ID：标签+class+规范化文本+结构路径，逐字节相同的
    // 内容重扫必须得到同一个ID
    let normalized_text: String = trimmed.split_whitespace().collect::<Vec<_>>().join(" ");
    let id = format!(
        "el-{}",
        short_hash(&format!("{}|{}|{}|{}", tag, classes.join("."), normalized_text, xpath))
    );

    let char_offset = estimate_offset(ctx.source_html, tag, trimmed);

    let meta = ElementMetadata {
        id,
        tag_name: tag.to_string(),
        content_type,
        text_content: trimmed.to_string(),
        inner_html: inner_html(node).unwrap_or_default(),
        attributes,
        position: PositionEstimate {
            depth: ctx.path.len().saturating_sub(1),
            sibling_index: ctx.path.last().map(|(_, i)| *i).unwrap_or(1),
            char_offset,
        },
        source_mapping: SourceMapping::unmapped(),
        edit_permissions: EditPermissions::for_content_type(content_type),
        xpath,
        css_selector,
        validation_rules: validation_rules_for(content_type),
        created_at: Utc::now(),
    };

    Some(CandidateElement {
        meta,
        handle: node.clone(),
    })
}

/// 内容类型判定，严格fallthrough
pub fn detect_content_type(node: &Handle, tag: &str, text: &str) -> ContentType {
    // 1. 标签直接映射
    match tag {
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => return ContentType::Text,
        "img" => return ContentType::Image,
        "a" => return ContentType::Link,
        "video" => return ContentType::Video,
        "audio" => return ContentType::Audio,
        "iframe" => return ContentType::Embed,
        _ => {}
    }

    // 2. 框架属性检测
    if has_framework_attributes(node) {
        return ContentType::Component;
    }

    // 3. class启发式
    let classes = get_node_classes(node);
    if classes
        .iter()
        .any(|c| c.contains("richtext") || c.contains("wysiwyg") || c.contains("editor-content"))
    {
        return ContentType::RichText;
    }
    if classes.iter().any(|c| c.contains("translat")) {
        return ContentType::Translation;
    }

    // 4. 内容形态分析
    if text.is_empty() && !has_element_children(node) {
        return ContentType::Container;
    }
    if text.contains("__(") || text.contains("@lang(") {
        return ContentType::Translation;
    }
    if text.contains("{{") && text.contains("}}") {
        return ContentType::DynamicContent;
    }
    if has_inline_formatting_children(node) {
        return ContentType::RichText;
    }

    ContentType::PlainText
}

fn has_framework_attributes(node: &Handle) -> bool {
    if let NodeData::Element { attrs, .. } = &node.data {
        attrs.borrow().iter().any(|attr| {
            let name = attr.name.local.as_ref();
            name.starts_with("wire:")
                || name.starts_with("x-")
                || name.starts_with("v-")
                || name.starts_with('@')
                || (name.starts_with(':') && name.len() > 1)
        })
    } else {
        false
    }
}

fn has_element_children(node: &Handle) -> bool {
    node.children
        .borrow()
        .iter()
        .any(|child| matches!(child.data, NodeData::Element { .. }))
}

fn has_inline_formatting_children(node: &Handle) -> bool {
    node.children.borrow().iter().any(|child| {
        get_node_name(child).is_some_and(|name| INLINE_FORMAT_TAGS.contains(&name))
    })
}

fn build_xpath(path: &[(String, usize)]) -> String {
    let mut out = String::new();
    for (tag, index) in path {
        out.push_str(&format!("/{}[{}]", tag, index));
    }
    out
}

fn build_css_selector(node: &Handle, path: &[(String, usize)]) -> String {
    // 有id时用最短形式
    if let Some(id) = get_node_attr(node, "id") {
        if !id.is_empty() {
            return format!("#{}", id);
        }
    }

    path.iter()
        .map(|(tag, index)| format!("{}:nth-of-type({})", tag, index))
        .collect::<Vec<_>>()
        .join(" > ")
}

fn validation_rules_for(content_type: ContentType) -> Vec<String> {
    match content_type {
        ContentType::Image => vec!["required_attr:src".to_string()],
        ContentType::Link => vec!["required_attr:href".to_string()],
        ContentType::RichText => vec!["max_length:65535".to_string()],
        ContentType::PlainText | ContentType::Text => vec!["max_length:10000".to_string()],
        _ => Vec::new(),
    }
}

fn estimate_offset(source_html: &str, tag: &str, text: &str) -> Option<usize> {
    // 优先按文本内容定位，退化为按开始标签定位
    let probe: String = text.chars().take(32).collect();
    if !probe.is_empty() {
        if let Some(offset) = source_html.find(probe.as_str()) {
            return Some(offset);
        }
    }
    source_html.find(&format!("<{}", tag))
}
