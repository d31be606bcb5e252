//! # 解析器模块
//!
//! 这个模块包含内容扫描所依赖的HTML解析能力：
//!
//! - HTML片段/文档解析与序列化
//! - DOM节点读写工具函数
//! - 简单CSS选择器匹配
//!
//! # 模块组织
//!
//! - `html` - 基于html5ever的DOM解析适配层

pub mod html;

// Re-export commonly used items for convenience
pub use html::{parse, serialize, DomHandle};
