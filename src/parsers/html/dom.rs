use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use markup5ever_rcdom::{Handle, NodeData, RcDom};

use crate::core::{RetouchError, RetouchResult};

/// 解析后的DOM句柄
///
/// 记录输入是否为片段（没有`<html>`外壳），序列化时据此决定
/// 是否剥离解析器补全的文档外壳。
pub struct DomHandle {
    pub dom: RcDom,
    pub is_fragment: bool,
    /// html5ever收集到的解析警告，永不致命
    pub parse_warnings: Vec<String>,
}

impl DomHandle {
    /// 文档根节点
    pub fn document(&self) -> Handle {
        self.dom.document.clone()
    }

    /// 解析器补全的body节点（片段内容挂在这里）
    pub fn body(&self) -> Option<Handle> {
        let html = get_child_node_by_name(&self.dom.document, "html")?;
        get_child_node_by_name(&html, "body")
    }

    /// 片段的内容根：片段取body，完整文档取document
    pub fn content_root(&self) -> Handle {
        if self.is_fragment {
            self.body().unwrap_or_else(|| self.dom.document.clone())
        } else {
            self.dom.document.clone()
        }
    }
}

/// 解析HTML字符串为DOM句柄
///
/// 空白输入返回`EmptyContent`；畸形HTML永不报错，
/// 解析器错误被收集到`parse_warnings`中。
pub fn parse(html: &str) -> RetouchResult<DomHandle> {
    if html.trim().is_empty() {
        return Err(RetouchError::EmptyContent);
    }

    let is_fragment = !html.to_lowercase().contains("<html");
    let dom = html_to_dom(html.as_bytes())?;
    let parse_warnings = dom
        .errors
        .borrow()
        .iter()
        .map(|e| e.to_string())
        .collect();

    Ok(DomHandle {
        dom,
        is_fragment,
        parse_warnings,
    })
}

/// 将 HTML 字节转换为 DOM
pub fn html_to_dom(data: &[u8]) -> RetouchResult<RcDom> {
    parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut std::io::Cursor::new(data))
        .map_err(|e| RetouchError::Parse(e.to_string()))
}

/// 查找指定名称的所有后代元素节点（含自身）
pub fn find_nodes(node: &Handle, node_name: &str) -> Vec<Handle> {
    let mut found_nodes = Vec::new();

    if let NodeData::Element { ref name, .. } = node.data {
        if &*name.local == node_name {
            found_nodes.push(node.clone());
        }
    }

    for child_node in node.children.borrow().iter() {
        found_nodes.append(&mut find_nodes(child_node, node_name));
    }

    found_nodes
}

/// 根据名称获取直接子节点
pub fn get_child_node_by_name(parent: &Handle, node_name: &str) -> Option<Handle> {
    let children = parent.children.borrow();
    let matching_children = children.iter().find(|child| match child.data {
        NodeData::Element { ref name, .. } => &*name.local == node_name,
        _ => false,
    });
    matching_children.cloned()
}

/// 获取节点属性值
pub fn get_node_attr(node: &Handle, attr_name: &str) -> Option<String> {
    match &node.data {
        NodeData::Element { attrs, .. } => {
            for attr in attrs.borrow().iter() {
                if &*attr.name.local == attr_name {
                    return Some(attr.value.to_string());
                }
            }
            None
        }
        _ => None,
    }
}

/// 获取节点全部属性，保持文档中出现的顺序
pub fn get_node_attrs(node: &Handle) -> Vec<(String, String)> {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .map(|attr| (attr.name.local.to_string(), attr.value.to_string()))
            .collect(),
        _ => Vec::new(),
    }
}

/// 获取节点class列表
pub fn get_node_classes(node: &Handle) -> Vec<String> {
    get_node_attr(node, "class")
        .map(|v| v.split_whitespace().map(|c| c.to_string()).collect())
        .unwrap_or_default()
}

/// 获取节点名称
pub fn get_node_name(node: &Handle) -> Option<&'_ str> {
    match &node.data {
        NodeData::Element { name, .. } => Some(name.local.as_ref()),
        _ => None,
    }
}

/// 设置节点属性；`attr_value`为None时删除该属性
pub fn set_node_attr(node: &Handle, attr_name: &str, attr_value: Option<String>) {
    use html5ever::interface::{Attribute, QualName};
    use html5ever::tendril::format_tendril;
    use html5ever::{namespace_url, ns, LocalName};

    if let NodeData::Element { attrs, .. } = &node.data {
        let attrs_mut = &mut attrs.borrow_mut();
        let mut i = 0;
        let mut found_existing_attr: bool = false;

        while i < attrs_mut.len() {
            if &attrs_mut[i].name.local == attr_name {
                found_existing_attr = true;

                if let Some(attr_value) = attr_value.clone() {
                    let _ = &attrs_mut[i].value.clear();
                    let _ = &attrs_mut[i].value.push_slice(attr_value.as_str());
                } else {
                    // Remove attr completely if attr_value is not defined
                    attrs_mut.remove(i);
                    continue;
                }
            }

            i += 1;
        }

        if !found_existing_attr {
            // Add new attribute (since originally the target node didn't have it)
            if let Some(attr_value) = attr_value.clone() {
                let name = LocalName::from(attr_name);

                attrs_mut.push(Attribute {
                    name: QualName::new(None, ns!(), name),
                    value: format_tendril!("{}", attr_value),
                });
            }
        }
    };
}

/// 收集节点及其后代的全部文本内容
pub fn text_content(node: &Handle) -> String {
    let mut out = String::new();
    collect_text(node, &mut out);
    out
}

fn collect_text(node: &Handle, out: &mut String) {
    match &node.data {
        NodeData::Text { contents } => out.push_str(&contents.borrow()),
        _ => {
            for child in node.children.borrow().iter() {
                collect_text(child, out);
            }
        }
    }
}

/// 简单CSS选择器匹配
///
/// 支持 `tag`、`.class`、`#id`、`tag.class`、`tag#id` 以及
/// `[attr]`/`[attr=value]` 形式——覆盖文件更新引擎按选择器
/// 定位元素所需的范围，不是完整的选择器引擎。
pub fn select_nodes(root: &Handle, selector: &str) -> Vec<Handle> {
    let selector = selector.trim();
    let mut matched = Vec::new();
    select_recursive(root, selector, &mut matched);
    matched
}

fn select_recursive(node: &Handle, selector: &str, matched: &mut Vec<Handle>) {
    if node_matches_selector(node, selector) {
        matched.push(node.clone());
    }

    for child in node.children.borrow().iter() {
        select_recursive(child, selector, matched);
    }
}

fn node_matches_selector(node: &Handle, selector: &str) -> bool {
    let Some(node_name) = get_node_name(node) else {
        return false;
    };

    // [attr] / [attr=value]
    if let Some(rest) = selector.strip_prefix('[') {
        let Some(inner) = rest.strip_suffix(']') else {
            return false;
        };
        return match inner.split_once('=') {
            Some((attr, value)) => {
                let value = value.trim_matches('"').trim_matches('\'');
                get_node_attr(node, attr.trim()).as_deref() == Some(value)
            }
            None => get_node_attr(node, inner.trim()).is_some(),
        };
    }

    if let Some(class) = selector.strip_prefix('.') {
        return get_node_classes(node).iter().any(|c| c == class);
    }

    if let Some(id) = selector.strip_prefix('#') {
        return get_node_attr(node, "id").as_deref() == Some(id);
    }

    if let Some((tag, class)) = selector.split_once('.') {
        return node_name == tag && get_node_classes(node).iter().any(|c| c == class);
    }

    if let Some((tag, id)) = selector.split_once('#') {
        return node_name == tag && get_node_attr(node, "id").as_deref() == Some(id);
    }

    node_name == selector
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty_content() {
        assert!(matches!(parse(""), Err(RetouchError::EmptyContent)));
        assert!(matches!(parse("   \n "), Err(RetouchError::EmptyContent)));
    }

    #[test]
    fn test_parse_fragment_detection() {
        assert!(parse("<p>hi there</p>").unwrap().is_fragment);
        assert!(!parse("<html><body><p>hi</p></body></html>").unwrap().is_fragment);
    }

    #[test]
    fn test_parse_malformed_never_fails() {
        let handle = parse("<div><p>unclosed <span>mess").unwrap();
        assert!(handle.body().is_some());
    }

    #[test]
    fn test_text_content() {
        let handle = parse("<div>Hello <b>brave</b> world</div>").unwrap();
        let div = &find_nodes(&handle.document(), "div")[0];
        assert_eq!(text_content(div), "Hello brave world");
    }

    #[test]
    fn test_get_and_set_node_attr() {
        let handle = parse(r#"<p class="x">Hey</p>"#).unwrap();
        let p = &find_nodes(&handle.document(), "p")[0];

        assert_eq!(get_node_attr(p, "class").as_deref(), Some("x"));

        set_node_attr(p, "data-cms-id", Some("el-123".to_string()));
        assert_eq!(get_node_attr(p, "data-cms-id").as_deref(), Some("el-123"));

        set_node_attr(p, "data-cms-id", None);
        assert_eq!(get_node_attr(p, "data-cms-id"), None);
    }

    #[test]
    fn test_select_nodes() {
        let handle = parse(
            r#"<div id="hero" class="wide"><p class="lead">One</p><p>Two</p></div>"#,
        )
        .unwrap();
        let root = handle.document();

        assert_eq!(select_nodes(&root, "p").len(), 2);
        assert_eq!(select_nodes(&root, ".lead").len(), 1);
        assert_eq!(select_nodes(&root, "#hero").len(), 1);
        assert_eq!(select_nodes(&root, "p.lead").len(), 1);
        assert_eq!(select_nodes(&root, "div#hero").len(), 1);
        assert_eq!(select_nodes(&root, "[class=wide]").len(), 1);
        assert_eq!(select_nodes(&root, "span").len(), 0);
    }
}
