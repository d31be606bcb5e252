//! 源文件映射
//!
//! 尽力把DOM元素映射回模板源文件+行号。算法按置信度降序，
//! 第一个命中即返回，这个顺序是硬约定：
//!
//! 1. 显式 `data-source-file`/`data-source-line` 标记 → 置信度90
//! 2. 组件树结构分析 → 置信度70（尽力而为）
//! 3. class/id结构启发式 → 置信度30
//! 4. 未命中 → 置信度0，file为None
//!
//! 映射永不报错；内部失败记录日志后退化为置信度0。

use tracing::debug;

use crate::scanner::types::{ComponentRef, ElementMetadata, MappingMethod, SourceMapping};

/// 把元素映射回源文件
///
/// `components` 是同一次扫描发现的组件引用，供结构分析使用。
pub fn map_to_source(element: &ElementMetadata, components: &[ComponentRef]) -> SourceMapping {
    if let Some(mapping) = map_by_data_attribute(element) {
        return mapping;
    }

    if let Some(mapping) = map_by_component_analysis(element, components) {
        return mapping;
    }

    if let Some(mapping) = map_by_heuristic(element) {
        return mapping;
    }

    debug!(element = %element.id, "元素无法映射回源文件");
    SourceMapping::unmapped()
}

/// 方式1：显式标记
fn map_by_data_attribute(element: &ElementMetadata) -> Option<SourceMapping> {
    let file = element
        .attributes
        .iter()
        .find(|(name, _)| name == "data-source-file")
        .map(|(_, value)| value.clone())?;

    let line = element
        .attributes
        .iter()
        .find(|(name, _)| name == "data-source-line")
        .and_then(|(_, value)| value.parse::<usize>().ok());

    Some(SourceMapping {
        file: Some(file),
        line,
        component: None,
        method: MappingMethod::DataAttribute,
        confidence: MappingMethod::DataAttribute.confidence(),
    })
}

/// 方式2：组件树结构分析（尽力而为）
///
/// 保守实现：元素文本出现在某个组件的slot内容里时，认为它由
/// 该组件渲染，映射到按约定推导的组件模板路径。规则刻意克制，
/// 精确的结构分析留给后续扩展。
fn map_by_component_analysis(
    element: &ElementMetadata,
    components: &[ComponentRef],
) -> Option<SourceMapping> {
    if element.text_content.is_empty() {
        return None;
    }

    let owner = components.iter().find(|c| {
        c.slot_content
            .as_ref()
            .is_some_and(|slot| slot.contains(&element.text_content))
    })?;

    Some(SourceMapping {
        file: Some(component_template_path(&owner.name)),
        line: Some(owner.line_number),
        component: Some(owner.name.clone()),
        method: MappingMethod::ComponentAnalysis,
        confidence: MappingMethod::ComponentAnalysis.confidence(),
    })
}

/// 方式3：class/id结构启发式（低置信度）
///
/// 只在元素带有稳定锚点（id或语义化class）时猜测一个模板名，
/// 永远不给出行号。
fn map_by_heuristic(element: &ElementMetadata) -> Option<SourceMapping> {
    let has_anchor = element.attributes.iter().any(|(name, value)| {
        (name == "id" && !value.is_empty())
            || (name == "class" && value.split_whitespace().any(|c| c.len() >= 4))
    });

    if !has_anchor {
        return None;
    }

    Some(SourceMapping {
        file: None,
        line: None,
        component: None,
        method: MappingMethod::Heuristic,
        confidence: MappingMethod::Heuristic.confidence(),
    })
}

/// 组件名到模板路径的约定映射：`alert` → `components/alert.blade.php`
fn component_template_path(name: &str) -> String {
    format!("components/{}.blade.php", name.replace('.', "/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::types::{ComponentKind, ContentType, EditPermissions, PositionEstimate};
    use std::collections::BTreeMap;

    fn element(attributes: Vec<(&str, &str)>, text: &str) -> ElementMetadata {
        ElementMetadata {
            id: "el-test".to_string(),
            tag_name: "p".to_string(),
            content_type: ContentType::PlainText,
            text_content: text.to_string(),
            inner_html: text.to_string(),
            attributes: attributes
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            position: PositionEstimate::default(),
            source_mapping: crate::scanner::types::SourceMapping::unmapped(),
            edit_permissions: EditPermissions::for_content_type(ContentType::PlainText),
            xpath: "/p[1]".to_string(),
            css_selector: "p:nth-of-type(1)".to_string(),
            validation_rules: Vec::new(),
            created_at: chrono::Utc::now(),
        }
    }

    fn card_component(slot: &str) -> ComponentRef {
        ComponentRef {
            kind: ComponentKind::ClassBased,
            name: "card".to_string(),
            attributes: BTreeMap::new(),
            slot_content: Some(slot.to_string()),
            offset: 0,
            line_number: 7,
        }
    }

    #[test]
    fn test_data_attribute_mapping() {
        let el = element(
            vec![
                ("data-source-file", "resources/views/home.blade.php"),
                ("data-source-line", "42"),
            ],
            "Welcome",
        );
        let mapping = map_to_source(&el, &[]);

        assert_eq!(mapping.method, MappingMethod::DataAttribute);
        assert_eq!(mapping.confidence, 90);
        assert_eq!(mapping.file.as_deref(), Some("resources/views/home.blade.php"));
        assert_eq!(mapping.line, Some(42));
    }

    #[test]
    fn test_explicit_marker_beats_heuristic() {
        // 同时具备显式标记和启发式锚点时，必须返回显式标记映射
        let el = element(
            vec![
                ("data-source-file", "views/about.blade.php"),
                ("id", "hero-title"),
                ("class", "headline primary"),
            ],
            "About us",
        );
        let mapping = map_to_source(&el, &[]);

        assert_eq!(mapping.method, MappingMethod::DataAttribute);
        assert_eq!(mapping.confidence, 90);
    }

    #[test]
    fn test_component_analysis_mapping() {
        let el = element(vec![], "Inside the card slot");
        let components = vec![card_component("Some <b>Inside the card slot</b> markup")];
        let mapping = map_to_source(&el, &components);

        assert_eq!(mapping.method, MappingMethod::ComponentAnalysis);
        assert_eq!(mapping.confidence, 70);
        assert_eq!(mapping.component.as_deref(), Some("card"));
        assert_eq!(mapping.file.as_deref(), Some("components/card.blade.php"));
    }

    #[test]
    fn test_heuristic_mapping_low_confidence() {
        let el = element(vec![("id", "sidebar")], "Some sidebar text");
        let mapping = map_to_source(&el, &[]);

        assert_eq!(mapping.method, MappingMethod::Heuristic);
        assert_eq!(mapping.confidence, 30);
        assert!(mapping.file.is_none());
        assert!(mapping.line.is_none());
    }

    #[test]
    fn test_unmapped_degrades_to_zero() {
        let el = element(vec![], "Anonymous text");
        let mapping = map_to_source(&el, &[]);

        assert_eq!(mapping.method, MappingMethod::None);
        assert_eq!(mapping.confidence, 0);
        assert!(mapping.file.is_none());
    }
}
