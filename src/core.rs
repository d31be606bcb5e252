//! 核心错误类型与配置
//!
//! 提供整个内容管理层的统一错误分类和配置结构。
//! 错误传播策略：检测层失败（单个元素、单个检测器）记录警告后继续，
//! 变更层失败（文件写入、校验、锁）回滚后向调用方传播。

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 内容管理层统一错误类型
#[derive(Error, Debug)]
pub enum RetouchError {
    /// 输入内容为空或非法
    #[error("内容为空，无法解析")]
    EmptyContent,

    /// HTML解析错误（非致命，通常只收集不抛出）
    #[error("解析错误: {0}")]
    Parse(String),

    /// 无效的页面URL
    #[error("无效的URL: {0}")]
    InvalidUrl(String),

    /// 远程页面抓取超时
    #[error("抓取页面超时: {0}")]
    FetchTimeout(String),

    /// 远程页面抓取失败（非超时）
    #[error("抓取页面失败: {0}")]
    Fetch(String),

    /// 文件锁已被其他调用方持有
    #[error("文件锁竞争: {0}")]
    LockContention(String),

    /// 原子写入校验失败（临时文件内容与预期不符）
    #[error("原子写入校验失败: {0}")]
    AtomicWriteVerification(String),

    /// 策略校验失败（变更后的内容未通过结构检查）
    #[error("内容校验失败: {0}")]
    Validation(String),

    /// 备份校验和不匹配，拒绝恢复
    #[error("备份已损坏: {0}")]
    BackupCorrupted(String),

    /// 找不到指定的备份记录
    #[error("备份不存在: {0}")]
    BackupNotFound(String),

    /// 翻译键不符合键格式要求
    #[error("无效的翻译键: {0}")]
    InvalidKey(String),

    /// 翻译值包含不安全内容
    #[error("不安全的翻译内容: {0}")]
    UnsafeContent(String),

    /// 没有任何更新策略能处理该内容
    #[error("未知的更新策略: {0}")]
    UnknownStrategy(String),

    /// 批量更新中出现无法识别的操作类型
    #[error("未知的操作类型: {0}")]
    UnknownOperationType(String),

    /// IO错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),
}

impl RetouchError {
    /// 检测层错误可以被吞掉继续处理，变更层错误必须传播
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RetouchError::Parse(_) | RetouchError::EmptyContent | RetouchError::Fetch(_)
        )
    }

    /// 获取错误的严重程度
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            RetouchError::Parse(_) => ErrorSeverity::Warning,
            RetouchError::EmptyContent => ErrorSeverity::Info,
            RetouchError::InvalidUrl(_) => ErrorSeverity::Info,
            RetouchError::InvalidKey(_) => ErrorSeverity::Info,
            RetouchError::UnsafeContent(_) => ErrorSeverity::Warning,
            RetouchError::FetchTimeout(_) => ErrorSeverity::Warning,
            RetouchError::Fetch(_) => ErrorSeverity::Warning,
            RetouchError::LockContention(_) => ErrorSeverity::Warning,
            RetouchError::Validation(_) => ErrorSeverity::Error,
            RetouchError::UnknownStrategy(_) => ErrorSeverity::Error,
            RetouchError::UnknownOperationType(_) => ErrorSeverity::Error,
            RetouchError::Io(_) => ErrorSeverity::Error,
            RetouchError::Config(_) => ErrorSeverity::Critical,
            RetouchError::AtomicWriteVerification(_) => ErrorSeverity::Critical,
            RetouchError::BackupCorrupted(_) => ErrorSeverity::Critical,
            RetouchError::BackupNotFound(_) => ErrorSeverity::Error,
        }
    }
}

impl From<serde_json::Error> for RetouchError {
    fn from(error: serde_json::Error) -> Self {
        RetouchError::Parse(format!("JSON序列化错误: {}", error))
    }
}

impl From<toml::de::Error> for RetouchError {
    fn from(error: toml::de::Error) -> Self {
        RetouchError::Config(format!("TOML解析错误: {}", error))
    }
}

/// 错误严重程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

/// 错误结果类型别名
pub type RetouchResult<T> = Result<T, RetouchError>;

/// 扫描器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// 扫描结果缓存容量（条目数）
    pub cache_capacity: usize,
    /// 缓存条目TTL（秒）
    pub cache_ttl_secs: u64,
    /// 排除的标签集合
    pub excluded_tags: Vec<String>,
    /// 最小可编辑文本长度
    pub min_text_length: usize,
    /// 翻译调用上下文片段半径（字符数）
    pub context_radius: usize,
    /// 远程抓取超时（秒）
    pub fetch_timeout_secs: u64,
    /// 抓取时使用的User-Agent
    pub user_agent: Option<String>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 256,
            cache_ttl_secs: 3600,
            excluded_tags: vec![
                "script".to_string(),
                "style".to_string(),
                "meta".to_string(),
                "link".to_string(),
            ],
            min_text_length: 3,
            context_radius: 50,
            fetch_timeout_secs: 30,
            user_agent: None,
        }
    }
}

impl ScannerConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

/// 文件更新引擎配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdaterConfig {
    /// 每次变更前自动创建备份
    pub auto_backup: bool,
    /// 变更失败时从备份回滚
    pub rollback_on_failure: bool,
    /// 备份目录
    pub backup_dir: String,
    /// 每个文件保留的最大备份数
    pub max_backups_per_file: usize,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            auto_backup: true,
            rollback_on_failure: true,
            backup_dir: ".retouch-backups".to_string(),
            max_backups_per_file: 20,
        }
    }
}

/// 翻译存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationConfig {
    /// 默认语言
    pub default_locale: String,
    /// 翻译值最大长度
    pub max_value_length: usize,
    /// 是否允许翻译值中包含HTML
    pub allow_html: bool,
    /// 写入前自动备份语言文件
    pub auto_backup: bool,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            default_locale: "en".to_string(),
            max_value_length: 1000,
            allow_html: false,
            auto_backup: true,
        }
    }
}

/// 顶层配置，可从TOML文件加载
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RetouchConfig {
    pub scanner: ScannerConfig,
    pub updater: UpdaterConfig,
    pub translation: TranslationConfig,
}

impl RetouchConfig {
    /// 从TOML字符串加载配置，缺失字段取默认值
    pub fn from_toml_str(raw: &str) -> RetouchResult<Self> {
        let config: RetouchConfig = toml::from_str(raw)?;
        Ok(config)
    }
}
