//! 可编辑标记注入
//!
//! 在编辑模式下把扫描到的元数据（稳定ID、内容类型、权限提示）
//! 作为附加属性写回HTML，不改动既有属性、嵌套和文本。
//! 单个元素注入失败只记警告并跳过；整体失败时返回原始HTML
//! （fail-safe，绝不返回半成品）。

use tracing::warn;

use crate::core::RetouchResult;
use crate::parsers::html::{get_node_attr, parse, serialize, set_node_attr};
use crate::scanner::classifier::{extract_editable_elements, CandidateElement};
use crate::scanner::ScanOptions;

/// 注入可编辑标记
///
/// 幂等：已带有相同标记的元素不会被重复标注或双重包装。
pub fn inject_editable_markers(html: &str, options: &ScanOptions) -> String {
    match try_inject(html, options) {
        Ok(marked) => marked,
        Err(e) => {
            warn!("标记注入整体失败，返回原始HTML: {}", e);
            html.to_string()
        }
    }
}

fn try_inject(html: &str, options: &ScanOptions) -> RetouchResult<String> {
    let dom = parse(html)?;
    let candidates = extract_editable_elements(&dom, html, options);

    for candidate in &candidates {
        if let Err(e) = inject_one(candidate) {
            warn!(element = %candidate.meta.id, "单个元素标记注入失败，跳过: {}", e);
        }
    }

    serialize(&dom)
}

fn inject_one(candidate: &CandidateElement) -> RetouchResult<()> {
    let node = &candidate.handle;
    let meta = &candidate.meta;

    // 已标注的元素保持原样，保证重复注入幂等
    if get_node_attr(node, "data-cms-id").as_deref() == Some(meta.id.as_str()) {
        return Ok(());
    }

    set_node_attr(node, "data-cms-id", Some(meta.id.clone()));
    set_node_attr(node, "data-cms-type", Some(content_type_label(meta)?));
    set_node_attr(node, "data-cms-permissions", Some(permissions_label(meta)));

    if meta.edit_permissions.editable && get_node_attr(node, "data-cms-editable").is_none() {
        set_node_attr(node, "data-cms-editable", Some("true".to_string()));
    }

    Ok(())
}

fn content_type_label(meta: &crate::scanner::types::ElementMetadata) -> RetouchResult<String> {
    let json = serde_json::to_string(&meta.content_type)?;
    Ok(json.trim_matches('"').to_string())
}

fn permissions_label(meta: &crate::scanner::types::ElementMetadata) -> String {
    let perms = &meta.edit_permissions;
    let mut parts = Vec::new();
    if perms.can_edit_text {
        parts.push("text");
    }
    if perms.can_edit_attributes {
        parts.push("attributes");
    }
    if parts.is_empty() {
        parts.push("none");
    }
    parts.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markers_added() {
        let html = r#"<p class="x">Hello world</p>"#;
        let marked = inject_editable_markers(html, &ScanOptions::default());

        assert!(marked.contains("data-cms-id=\"el-"));
        assert!(marked.contains(r#"data-cms-type="plain_text""#));
        assert!(marked.contains(r#"class="x""#));
        assert!(marked.contains("Hello world"));
    }

    #[test]
    fn test_injection_is_idempotent() {
        let html = r#"<p class="x">Hello world</p>"#;
        let options = ScanOptions::default();

        let once = inject_editable_markers(html, &options);
        let twice = inject_editable_markers(&once, &options);

        assert_eq!(once, twice);
        // 标记属性不会重复出现
        assert_eq!(twice.matches("data-cms-id").count(), 1);
    }

    #[test]
    fn test_existing_attributes_untouched() {
        let html = r#"<p class="x" title="keep me">Hello world</p>"#;
        let marked = inject_editable_markers(html, &ScanOptions::default());

        assert!(marked.contains(r#"title="keep me""#));
        assert!(marked.contains(r#"class="x""#));
    }

    #[test]
    fn test_total_failure_returns_original() {
        // 空输入解析失败，返回原始内容而不是报错
        let marked = inject_editable_markers("", &ScanOptions::default());
        assert_eq!(marked, "");
    }

    #[test]
    fn test_media_permissions_hint() {
        let html = r#"<img src="/a.png">"#;
        let marked = inject_editable_markers(html, &ScanOptions::default());
        assert!(marked.contains(r#"data-cms-permissions="attributes""#));
    }
}
