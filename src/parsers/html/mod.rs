//! HTML解析适配层
//!
//! 将html5ever包装为内容扫描器需要的最小接口：容错解析任意HTML
//! 片段或完整文档，解析错误只收集不抛出；序列化时对片段剥离
//! 解析器补全的文档外壳，保证未触碰部分可逆。

mod dom;
mod serializer;

pub use dom::{
    find_nodes, get_node_attr, get_node_attrs, get_node_classes, get_node_name, html_to_dom,
    parse, select_nodes, set_node_attr, text_content, DomHandle,
};
pub use serializer::{inner_html, serialize, serialize_node};
