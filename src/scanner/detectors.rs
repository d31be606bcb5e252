//! 组件与调用点模式检测器
//!
//! 对原始文本做纯函数式的模式抽取，与DOM遍历互不依赖：
//! 模板指令出现在解析之前的文本里，只能靠模式匹配发现。
//! 所有检测器无共享可变状态，结果集直接拼接。
//!
//! 覆盖的语法字母表：
//! - Blade组件标签（`<x-name>`自闭合与成对形式）、`@include`、`@component`
//! - Livewire标签/指令与`wire:*`事件绑定
//! - Alpine `x-*` 属性
//! - Vue `v-*`/`@event`/`:bind` 属性与PascalCase组件标签
//! - 翻译调用点 `__()` / `trans()` / `@lang()` / `{{ __() }}`
//! - 静态资源引用（helper调用与HTML标签两类）

use std::collections::BTreeMap;

use regex::Regex;

use crate::scanner::types::{
    AssetKind, AssetRef, ComponentKind, ComponentRef, TranslationKeyRef, TranslationPattern,
};
use crate::utils::{context_snippet, is_external_url, line_number_at};

/// 预编译的检测器集合
///
/// 正则在构造时编译一次，检测调用全部是`&self`的纯读操作，
/// 可以安全地对同一内容并发运行。
pub struct PatternDetectors {
    context_radius: usize,

    re_blade_component: Regex,
    re_include: Regex,
    re_component_directive: Regex,
    re_livewire_tag: Regex,
    re_livewire_directive: Regex,
    re_wire_attr: Regex,
    re_alpine_attr: Regex,
    re_vue_attr: Regex,
    re_vue_component: Regex,

    re_trans_echo: Regex,
    re_trans_call: Regex,
    re_trans_directive: Regex,
    re_param_pair: Regex,

    re_asset_helper: Regex,
    re_storage_url: Regex,
    re_img_src: Regex,
    re_link_css: Regex,
    re_script_src: Regex,

    re_attr_pair: Regex,
}

impl PatternDetectors {
    pub fn new(context_radius: usize) -> Self {
        Self {
            context_radius,

            re_blade_component: Regex::new(r"<x-([\w.-]+)((?:\s[^>]*?)?)\s*/?>").unwrap(),
            re_include: Regex::new(
                r#"@include\(\s*['"]([\w.:-]+)['"]\s*(?:,\s*(\[[^\]]*\]))?\s*\)"#,
            )
            .unwrap(),
            re_component_directive: Regex::new(r#"@component\(\s*['"]([\w.:-]+)['"]"#).unwrap(),
            re_livewire_tag: Regex::new(r"<livewire:([\w.-]+)((?:\s[^>]*?)?)\s*/?>").unwrap(),
            re_livewire_directive: Regex::new(r#"@livewire\(\s*['"]([\w.-]+)['"]"#).unwrap(),
            re_wire_attr: Regex::new(r#"\bwire:([\w.-]+)\s*=\s*["']([^"']*)["']"#).unwrap(),
            re_alpine_attr: Regex::new(r#"\b(x-[\w.:-]+)\s*=\s*["']([^"']*)["']"#).unwrap(),
            re_vue_attr: Regex::new(r#"(?:^|\s)(v-[\w.:-]+|@[\w-]+|:[\w-]+)\s*=\s*["']([^"']*)["']"#)
                .unwrap(),
            re_vue_component: Regex::new(r"<([A-Z][a-zA-Z0-9]*)((?:\s[^>]*?)?)\s*/?>").unwrap(),

            re_trans_echo: Regex::new(
                r#"\{\{\s*__\(\s*['"]([^'"]+)['"]\s*(?:,\s*(\[[^\]]*\]))?\s*\)\s*\}\}"#,
            )
            .unwrap(),
            re_trans_call: Regex::new(
                r#"(?:__|\btrans)\(\s*['"]([^'"]+)['"]\s*(?:,\s*(\[[^\]]*\]))?\s*\)"#,
            )
            .unwrap(),
            re_trans_directive: Regex::new(r#"@lang\(\s*['"]([^'"]+)['"]\s*\)"#).unwrap(),
            re_param_pair: Regex::new(
                r#"['"]([\w.-]+)['"]\s*=>\s*(?:['"]([^'"]*)['"]|([\w.-]+))"#,
            )
            .unwrap(),

            re_asset_helper: Regex::new(r#"\basset\(\s*['"]([^'"]+)['"]\s*\)"#).unwrap(),
            re_storage_url: Regex::new(r#"Storage::url\(\s*['"]([^'"]+)['"]\s*\)"#).unwrap(),
            re_img_src: Regex::new(r#"<img[^>]+src\s*=\s*["']([^"']+)["']"#).unwrap(),
            re_link_css: Regex::new(r#"<link[^>]+href\s*=\s*["']([^"']+\.css[^"']*)["']"#).unwrap(),
            re_script_src: Regex::new(r#"<script[^>]+src\s*=\s*["']([^"']+)["']"#).unwrap(),

            re_attr_pair: Regex::new(r#"([\w:@.-]+)\s*=\s*["']([^"']*)["']"#).unwrap(),
        }
    }

    /// 检测所有框架的组件引用
    pub fn detect_components(&self, content: &str) -> Vec<ComponentRef> {
        let mut refs = Vec::new();

        self.detect_blade_components(content, &mut refs);
        self.detect_includes(content, &mut refs);
        self.detect_livewire(content, &mut refs);
        self.detect_inline_attributes(content, &mut refs);
        self.detect_vue_components(content, &mut refs);

        refs
    }

    /// 按框架分组组件引用，供ScanResult聚合
    pub fn group_by_framework(refs: Vec<ComponentRef>) -> BTreeMap<String, Vec<ComponentRef>> {
        let mut grouped: BTreeMap<String, Vec<ComponentRef>> = BTreeMap::new();

        for component in refs {
            let framework = match component.kind {
                ComponentKind::ClassBased | ComponentKind::Anonymous | ComponentKind::Include => {
                    "blade"
                }
                ComponentKind::Tag | ComponentKind::Directive | ComponentKind::WireMethod => {
                    "livewire"
                }
                ComponentKind::Alpine => "alpine",
                ComponentKind::Vue | ComponentKind::VueComponent => "vue",
            };
            grouped.entry(framework.to_string()).or_default().push(component);
        }

        grouped
    }

    fn detect_blade_components(&self, content: &str, refs: &mut Vec<ComponentRef>) {
        for caps in self.re_blade_component.captures_iter(content) {
            let whole = caps.get(0).unwrap();
            let name = caps[1].to_string();
            let attributes = self.parse_attributes(caps.get(2).map_or("", |m| m.as_str()));

            // 成对形式捕获slot内容，自闭合形式没有slot
            let slot_content = if whole.as_str().ends_with("/>") {
                None
            } else {
                let close_tag = format!("</x-{}>", name);
                content[whole.end()..]
                    .find(&close_tag)
                    .map(|rel| content[whole.end()..whole.end() + rel].to_string())
            };

            refs.push(ComponentRef {
                kind: ComponentKind::ClassBased,
                name,
                attributes,
                slot_content,
                offset: whole.start(),
                line_number: line_number_at(content, whole.start()),
            });
        }

        for caps in self.re_component_directive.captures_iter(content) {
            let whole = caps.get(0).unwrap();
            refs.push(ComponentRef {
                kind: ComponentKind::Anonymous,
                name: caps[1].to_string(),
                attributes: BTreeMap::new(),
                slot_content: None,
                offset: whole.start(),
                line_number: line_number_at(content, whole.start()),
            });
        }
    }

    fn detect_includes(&self, content: &str, refs: &mut Vec<ComponentRef>) {
        for caps in self.re_include.captures_iter(content) {
            let whole = caps.get(0).unwrap();
            let attributes = caps
                .get(2)
                .map(|blob| self.parse_param_blob(blob.as_str()))
                .unwrap_or_default();

            refs.push(ComponentRef {
                kind: ComponentKind::Include,
                name: caps[1].to_string(),
                attributes,
                slot_content: None,
                offset: whole.start(),
                line_number: line_number_at(content, whole.start()),
            });
        }
    }

    fn detect_livewire(&self, content: &str, refs: &mut Vec<ComponentRef>) {
        for caps in self.re_livewire_tag.captures_iter(content) {
            let whole = caps.get(0).unwrap();
            refs.push(ComponentRef {
                kind: ComponentKind::Tag,
                name: caps[1].to_string(),
                attributes: self.parse_attributes(caps.get(2).map_or("", |m| m.as_str())),
                slot_content: None,
                offset: whole.start(),
                line_number: line_number_at(content, whole.start()),
            });
        }

        for caps in self.re_livewire_directive.captures_iter(content) {
            let whole = caps.get(0).unwrap();
            refs.push(ComponentRef {
                kind: ComponentKind::Directive,
                name: caps[1].to_string(),
                attributes: BTreeMap::new(),
                slot_content: None,
                offset: whole.start(),
                line_number: line_number_at(content, whole.start()),
            });
        }
    }

    /// 行内事件绑定属性：wire:* / x-* / v-*
    ///
    /// 同一个元素可以同时命中多个字母表，每次出现独立记录。
    fn detect_inline_attributes(&self, content: &str, refs: &mut Vec<ComponentRef>) {
        for caps in self.re_wire_attr.captures_iter(content) {
            let whole = caps.get(0).unwrap();
            let mut attributes = BTreeMap::new();
            attributes.insert(format!("wire:{}", &caps[1]), caps[2].to_string());

            refs.push(ComponentRef {
                kind: ComponentKind::WireMethod,
                name: caps[2].to_string(),
                attributes,
                slot_content: None,
                offset: whole.start(),
                line_number: line_number_at(content, whole.start()),
            });
        }

        for caps in self.re_alpine_attr.captures_iter(content) {
            let whole = caps.get(0).unwrap();
            let mut attributes = BTreeMap::new();
            attributes.insert(caps[1].to_string(), caps[2].to_string());

            refs.push(ComponentRef {
                kind: ComponentKind::Alpine,
                name: caps[1].to_string(),
                attributes,
                slot_content: None,
                offset: whole.start(),
                line_number: line_number_at(content, whole.start()),
            });
        }

        for caps in self.re_vue_attr.captures_iter(content) {
            let attr_match = caps.get(1).unwrap();
            let mut attributes = BTreeMap::new();
            attributes.insert(caps[1].to_string(), caps[2].to_string());

            refs.push(ComponentRef {
                kind: ComponentKind::Vue,
                name: caps[1].to_string(),
                attributes,
                slot_content: None,
                offset: attr_match.start(),
                line_number: line_number_at(content, attr_match.start()),
            });
        }
    }

    fn detect_vue_components(&self, content: &str, refs: &mut Vec<ComponentRef>) {
        for caps in self.re_vue_component.captures_iter(content) {
            let whole = caps.get(0).unwrap();
            refs.push(ComponentRef {
                kind: ComponentKind::VueComponent,
                name: caps[1].to_string(),
                attributes: self.parse_attributes(caps.get(2).map_or("", |m| m.as_str())),
                slot_content: None,
                offset: whole.start(),
                line_number: line_number_at(content, whole.start()),
            });
        }
    }

    /// 检测翻译调用点
    ///
    /// 输出形式（`{{ __() }}`）优先匹配，内部的函数调用不再重复记录。
    pub fn detect_translation_keys(&self, content: &str) -> Vec<TranslationKeyRef> {
        let mut keys = Vec::new();
        let mut claimed: Vec<(usize, usize)> = Vec::new();

        for caps in self.re_trans_echo.captures_iter(content) {
            let whole = caps.get(0).unwrap();
            claimed.push((whole.start(), whole.end()));
            keys.push(self.build_translation_ref(
                content,
                &caps[1],
                caps.get(2).map(|m| m.as_str()),
                whole.start(),
                whole.len(),
                TranslationPattern::Echo,
            ));
        }

        for caps in self.re_trans_call.captures_iter(content) {
            let whole = caps.get(0).unwrap();
            let overlaps = claimed
                .iter()
                .any(|&(start, end)| whole.start() < end && whole.end() > start);
            if overlaps {
                continue;
            }
            keys.push(self.build_translation_ref(
                content,
                &caps[1],
                caps.get(2).map(|m| m.as_str()),
                whole.start(),
                whole.len(),
                TranslationPattern::FunctionCall,
            ));
        }

        for caps in self.re_trans_directive.captures_iter(content) {
            let whole = caps.get(0).unwrap();
            keys.push(self.build_translation_ref(
                content,
                &caps[1],
                None,
                whole.start(),
                whole.len(),
                TranslationPattern::Directive,
            ));
        }

        keys
    }

    fn build_translation_ref(
        &self,
        content: &str,
        key: &str,
        param_blob: Option<&str>,
        offset: usize,
        match_len: usize,
        pattern_type: TranslationPattern,
    ) -> TranslationKeyRef {
        let namespace = key.split_once('.').map(|(ns, _)| ns.to_string());
        let parameters = param_blob
            .map(|blob| self.parse_param_blob(blob))
            .unwrap_or_default();

        TranslationKeyRef {
            key: key.to_string(),
            pattern_type,
            line_number: line_number_at(content, offset),
            offset,
            context: context_snippet(content, offset, match_len, self.context_radius),
            namespace,
            parameters,
            locales_available: BTreeMap::new(),
        }
    }

    /// 尽力解析 `['name' => 'Ann', 'count' => 3]` 形式的参数块
    ///
    /// 这是对自由文本里关联数组字面量的正则近似，天然脆弱；
    /// 解析不出任何键值对时返回空map，永不报错。未来换成真正的
    /// 解析器时只需替换这一个函数。
    pub fn parse_param_blob(&self, blob: &str) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();

        for caps in self.re_param_pair.captures_iter(blob) {
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            params.insert(caps[1].to_string(), value);
        }

        params
    }

    /// 检测静态资源引用
    pub fn detect_assets(&self, content: &str) -> Vec<AssetRef> {
        let mut assets = Vec::new();

        let detectors: [(&Regex, &str); 5] = [
            (&self.re_asset_helper, "asset_helper"),
            (&self.re_storage_url, "storage_url"),
            (&self.re_img_src, "img_src"),
            (&self.re_link_css, "link_css"),
            (&self.re_script_src, "script_src"),
        ];

        for (regex, pattern) in detectors {
            for caps in regex.captures_iter(content) {
                let whole = caps.get(0).unwrap();
                let url = caps[1].to_string();

                assets.push(AssetRef {
                    kind: AssetKind::from_url(&url),
                    is_external: is_external_url(&url),
                    pattern: pattern.to_string(),
                    offset: whole.start(),
                    line_number: line_number_at(content, whole.start()),
                    url,
                });
            }
        }

        assets
    }

    /// 解析标签属性块为有序map
    fn parse_attributes(&self, raw: &str) -> BTreeMap<String, String> {
        let mut attributes = BTreeMap::new();
        for caps in self.re_attr_pair.captures_iter(raw) {
            attributes.insert(caps[1].to_string(), caps[2].to_string());
        }
        attributes
    }
}

impl Default for PatternDetectors {
    fn default() -> Self {
        Self::new(50)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detectors() -> PatternDetectors {
        PatternDetectors::default()
    }

    #[test]
    fn test_blade_self_closing_component() {
        let refs = detectors().detect_components(r#"<x-alert type="error" dismissible/>"#);
        let alert = refs
            .iter()
            .find(|r| r.kind == ComponentKind::ClassBased)
            .unwrap();
        assert_eq!(alert.name, "alert");
        assert_eq!(alert.attributes.get("type").map(String::as_str), Some("error"));
        assert!(alert.slot_content.is_none());
    }

    #[test]
    fn test_blade_paired_component_captures_slot() {
        let refs = detectors().detect_components(r#"<x-card title="Hi">Slot body</x-card>"#);
        let card = refs
            .iter()
            .find(|r| r.kind == ComponentKind::ClassBased)
            .unwrap();
        assert_eq!(card.name, "card");
        assert_eq!(card.slot_content.as_deref(), Some("Slot body"));
    }

    #[test]
    fn test_include_directive_with_data() {
        let refs = detectors().detect_components(r#"@include('partials.nav', ['active' => 'home'])"#);
        let include = refs.iter().find(|r| r.kind == ComponentKind::Include).unwrap();
        assert_eq!(include.name, "partials.nav");
        assert_eq!(include.attributes.get("active").map(String::as_str), Some("home"));
    }

    #[test]
    fn test_multiple_alphabets_on_one_element() {
        let html = r#"<button wire:click="save" x-data="{open: false}" v-if="ready">Go</button>"#;
        let refs = detectors().detect_components(html);

        assert!(refs.iter().any(|r| r.kind == ComponentKind::WireMethod && r.name == "save"));
        assert!(refs.iter().any(|r| r.kind == ComponentKind::Alpine && r.name == "x-data"));
        assert!(refs.iter().any(|r| r.kind == ComponentKind::Vue && r.name == "v-if"));
    }

    #[test]
    fn test_group_by_framework() {
        let html = r#"<x-alert/><livewire:counter/><div x-show="open"></div>"#;
        let grouped = PatternDetectors::group_by_framework(detectors().detect_components(html));

        assert_eq!(grouped.get("blade").map(Vec::len), Some(1));
        assert_eq!(grouped.get("livewire").map(Vec::len), Some(1));
        assert_eq!(grouped.get("alpine").map(Vec::len), Some(1));
    }

    #[test]
    fn test_translation_call_scenario() {
        // 第3行的调用点：行号按偏移前换行数+1计算
        let content = "line one\nline two\n__('messages.welcome', ['name' => 'Ann'])";
        let keys = detectors().detect_translation_keys(content);

        assert_eq!(keys.len(), 1);
        let key = &keys[0];
        assert_eq!(key.key, "messages.welcome");
        assert_eq!(key.line_number, 3);
        assert_eq!(key.namespace.as_deref(), Some("messages"));
        assert_eq!(key.parameters.get("name").map(String::as_str), Some("Ann"));
        assert_eq!(key.pattern_type, TranslationPattern::FunctionCall);
    }

    #[test]
    fn test_translation_echo_not_double_counted() {
        let content = "{{ __('nav.home') }}";
        let keys = detectors().detect_translation_keys(content);

        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].pattern_type, TranslationPattern::Echo);
        assert_eq!(keys[0].key, "nav.home");
    }

    #[test]
    fn test_translation_key_without_namespace() {
        let keys = detectors().detect_translation_keys("__('welcome')");
        assert_eq!(keys.len(), 1);
        assert!(keys[0].namespace.is_none());
    }

    #[test]
    fn test_translation_directive() {
        let keys = detectors().detect_translation_keys("@lang('auth.failed')");
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].pattern_type, TranslationPattern::Directive);
        assert_eq!(keys[0].namespace.as_deref(), Some("auth"));
    }

    #[test]
    fn test_malformed_param_blob_degrades_to_empty() {
        let keys = detectors().detect_translation_keys("__('a.b', [whatever 12 =>)])");
        // 畸形参数块不会让检测失败，参数退化为空map
        assert_eq!(keys.len(), 1);
        assert!(keys[0].parameters.is_empty());
    }

    #[test]
    fn test_context_snippet_present() {
        let content = "before before before __('k.v') after after after";
        let keys = detectors().detect_translation_keys(content);
        assert!(keys[0].context.contains("__('k.v')"));
        assert!(keys[0].context.contains("before"));
    }

    #[test]
    fn test_asset_detection_kinds() {
        let html = concat!(
            "<link rel=\"stylesheet\" href=\"/css/app.css\">\n",
            "<script src=\"https://cdn.example.com/app.js\"></script>\n",
            "<img src=\"images/logo.png\">\n",
            "asset('fonts/inter.woff2')\n",
            "Storage::url('docs/manual.pdf')",
        );
        let assets = detectors().detect_assets(html);

        let by_pattern = |p: &str| assets.iter().find(|a| a.pattern == p).unwrap();

        assert_eq!(by_pattern("link_css").kind, AssetKind::Stylesheet);
        assert!(!by_pattern("link_css").is_external);
        assert_eq!(by_pattern("script_src").kind, AssetKind::Javascript);
        assert!(by_pattern("script_src").is_external);
        assert_eq!(by_pattern("img_src").kind, AssetKind::Image);
        assert_eq!(by_pattern("asset_helper").kind, AssetKind::Font);
        assert_eq!(by_pattern("storage_url").kind, AssetKind::Document);
        assert_eq!(by_pattern("storage_url").line_number, 5);
    }

    #[test]
    fn test_detectors_are_composable() {
        // 同一内容跑全部检测器互不干扰
        let content = r#"<x-badge/> __('ui.ok') <img src="a.png">"#;
        let d = detectors();
        let components = d.detect_components(content);
        let keys = d.detect_translation_keys(content);
        let assets = d.detect_assets(content);

        assert!(!components.is_empty());
        assert_eq!(keys.len(), 1);
        assert_eq!(assets.len(), 1);
    }
}
