use html5ever::serialize::{serialize as html5_serialize, SerializeOpts, TraversalScope};
use markup5ever_rcdom::{Handle, SerializableHandle};

use crate::core::{RetouchError, RetouchResult};

use super::dom::DomHandle;

/// 序列化DOM句柄
///
/// 完整文档按原样序列化；片段只序列化body的子节点，
/// 剥离解析器补全的`<html><head><body>`外壳，使良构片段可以
/// 逐字节往返。
pub fn serialize(handle: &DomHandle) -> RetouchResult<String> {
    if handle.is_fragment {
        match handle.body() {
            Some(body) => serialize_children(&body),
            // body缺失说明解析结果异常，退化为整文档序列化
            None => serialize_node(&handle.document()),
        }
    } else {
        serialize_children(&handle.document())
    }
}

/// 序列化单个节点（含自身标签）
pub fn serialize_node(node: &Handle) -> RetouchResult<String> {
    serialize_with_scope(node, TraversalScope::IncludeNode)
}

/// 序列化节点的子节点，等价于DOM的innerHTML
pub fn inner_html(node: &Handle) -> RetouchResult<String> {
    serialize_children(node)
}

fn serialize_children(node: &Handle) -> RetouchResult<String> {
    serialize_with_scope(node, TraversalScope::ChildrenOnly(None))
}

fn serialize_with_scope(node: &Handle, traversal_scope: TraversalScope) -> RetouchResult<String> {
    let mut buf: Vec<u8> = Vec::new();
    let serializable: SerializableHandle = node.clone().into();
    let opts = SerializeOpts {
        scripting_enabled: false,
        traversal_scope,
        create_missing_parent: false,
    };

    html5_serialize(&mut buf, &serializable, opts)
        .map_err(|e| RetouchError::Parse(format!("DOM序列化失败: {}", e)))?;

    String::from_utf8(buf).map_err(|e| RetouchError::Parse(format!("序列化结果非UTF-8: {}", e)))
}
