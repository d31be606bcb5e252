//! # Retouch Library
//!
//! 面向模板站点的内容管理层：扫描渲染后的HTML发现可编辑区域，
//! 把元素映射回模板源文件，并对源文件做带备份与回滚的事务化
//! 变更。
//!
//! ## 模块组织
//!
//! - `core` - 错误类型与配置
//! - `parsers` - HTML解析与序列化
//! - `scanner` - 可编辑区域发现、框架模式检测、缓存与差分
//! - `updater` - 事务化文件更新（锁、备份、策略）
//! - `translation` - 按语言分文件的翻译存储
//! - `network` - 远程页面抓取（可选）
//! - `utils` - 哈希与文本工具

pub mod core;
#[cfg(feature = "remote")]
pub mod network;
pub mod parsers;
pub mod scanner;
pub mod translation;
pub mod updater;
pub mod utils;

// Re-export commonly used items for convenience
pub use crate::core::{
    RetouchConfig, RetouchError, RetouchResult, ScannerConfig, TranslationConfig, UpdaterConfig,
};
pub use crate::scanner::{ContentScanner, ScanOptions};
pub use crate::translation::TranslationManager;
pub use crate::updater::{FileUpdater, UpdateOperation};
