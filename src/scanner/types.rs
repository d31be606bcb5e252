//! 扫描结果数据模型
//!
//! 扫描产生的所有结构都是不可变的值类型，可序列化，
//! 通过内容哈希键入缓存。

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 元素内容类型
///
/// 分类顺序是硬约定：标签直接映射优先于框架属性检测，
/// 框架属性优先于class启发式，最后才是内容形态分析。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Text,
    PlainText,
    RichText,
    Image,
    Link,
    Video,
    Audio,
    Embed,
    Container,
    Component,
    Translation,
    DynamicContent,
}

/// 源文件映射方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingMethod {
    /// 显式 data-source-* 标记
    DataAttribute,
    /// 组件树结构分析
    ComponentAnalysis,
    /// class/id结构启发式
    Heuristic,
    /// 未能定位
    None,
}

impl MappingMethod {
    /// 各映射方式的固定置信度：90 > 70 > 30 > 0
    pub fn confidence(&self) -> u8 {
        match self {
            MappingMethod::DataAttribute => 90,
            MappingMethod::ComponentAnalysis => 70,
            MappingMethod::Heuristic => 30,
            MappingMethod::None => 0,
        }
    }
}

/// 元素到模板源文件的映射
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceMapping {
    pub file: Option<String>,
    pub line: Option<usize>,
    pub component: Option<String>,
    pub method: MappingMethod,
    /// 0-100，由method决定
    pub confidence: u8,
}

impl SourceMapping {
    pub fn unmapped() -> Self {
        Self {
            file: None,
            line: None,
            component: None,
            method: MappingMethod::None,
            confidence: 0,
        }
    }
}

/// 元素在文档中的位置估计
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PositionEstimate {
    /// DOM深度（内容根为0）
    pub depth: usize,
    /// 在父元素中的序号（同名兄弟间1起始）
    pub sibling_index: usize,
    /// 原始HTML中的近似字节偏移（尽力而为）
    pub char_offset: Option<usize>,
}

/// 元素编辑权限提示
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditPermissions {
    pub editable: bool,
    pub can_edit_text: bool,
    pub can_edit_attributes: bool,
}

impl EditPermissions {
    pub fn for_content_type(content_type: ContentType) -> Self {
        match content_type {
            // 媒体元素只改属性（src/alt等），不改文本
            ContentType::Image | ContentType::Video | ContentType::Audio | ContentType::Embed => {
                Self {
                    editable: true,
                    can_edit_text: false,
                    can_edit_attributes: true,
                }
            }
            // 动态内容和组件由模板驱动，页面侧只读
            ContentType::DynamicContent | ContentType::Component => Self {
                editable: false,
                can_edit_text: false,
                can_edit_attributes: false,
            },
            _ => Self {
                editable: true,
                can_edit_text: true,
                can_edit_attributes: true,
            },
        }
    }
}

/// 可编辑元素的完整元数据
///
/// `id` 由 标签+class+规范化文本+结构路径 派生，
/// 对逐字节相同的内容重扫必须得到相同的id（差分依赖这一点）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementMetadata {
    pub id: String,
    pub tag_name: String,
    pub content_type: ContentType,
    pub text_content: String,
    pub inner_html: String,
    /// 属性按文档中出现顺序保存
    pub attributes: Vec<(String, String)>,
    pub position: PositionEstimate,
    pub source_mapping: SourceMapping,
    pub edit_permissions: EditPermissions,
    pub xpath: String,
    pub css_selector: String,
    pub validation_rules: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl ElementMetadata {
    /// 属性的序列化形式，用于差分比较
    pub fn attributes_serialized(&self) -> String {
        self.attributes
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(";")
    }
}

/// 组件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    ClassBased,
    Anonymous,
    Include,
    Tag,
    Directive,
    WireMethod,
    Alpine,
    Vue,
    VueComponent,
}

/// 模板/响应式组件引用
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentRef {
    pub kind: ComponentKind,
    pub name: String,
    pub attributes: BTreeMap<String, String>,
    pub slot_content: Option<String>,
    pub offset: usize,
    pub line_number: usize,
}

/// 翻译调用点形态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslationPattern {
    /// `__('key')` 裸函数调用
    FunctionCall,
    /// `@lang('key')` 模板指令
    Directive,
    /// `{{ __('key') }}` 内联输出
    Echo,
}

/// 翻译键引用
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationKeyRef {
    /// 点分命名空间键
    pub key: String,
    pub pattern_type: TranslationPattern,
    /// 1起始行号（匹配偏移前的换行数+1）
    pub line_number: usize,
    pub offset: usize,
    /// 匹配位置周围的文本片段
    pub context: String,
    /// 第一个点之前的片段；无点则为None
    pub namespace: Option<String>,
    /// 内联参数（尽力解析，畸形时为空）
    pub parameters: BTreeMap<String, String>,
    /// 各语言是否已有该键（由翻译存储补注）
    pub locales_available: BTreeMap<String, bool>,
}

/// 资源类型，由文件扩展名派生
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Stylesheet,
    Javascript,
    Image,
    Video,
    Audio,
    Document,
    Font,
    Unknown,
}

impl AssetKind {
    /// 扩展名到资源类型的映射表
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "css" => AssetKind::Stylesheet,
            "js" => AssetKind::Javascript,
            "jpg" | "jpeg" | "png" | "gif" | "svg" | "webp" => AssetKind::Image,
            "mp4" | "webm" => AssetKind::Video,
            "mp3" | "wav" => AssetKind::Audio,
            "pdf" | "doc" | "docx" => AssetKind::Document,
            "woff" | "woff2" | "ttf" | "eot" => AssetKind::Font,
            _ => AssetKind::Unknown,
        }
    }

    /// 从URL路径推断资源类型（忽略查询串与锚点）
    pub fn from_url(url: &str) -> Self {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        match path.rsplit_once('.') {
            Some((_, ext)) => AssetKind::from_extension(ext),
            None => AssetKind::Unknown,
        }
    }
}

/// 静态资源引用
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetRef {
    pub url: String,
    pub kind: AssetKind,
    /// 命中的检测器名称（asset_helper/storage_url/img_src/...）
    pub pattern: String,
    pub is_external: bool,
    pub offset: usize,
    pub line_number: usize,
}

/// 扫描结果元数据
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanMetadata {
    pub content_hash: String,
    pub scanned_at: DateTime<Utc>,
    pub element_count: usize,
    pub translation_key_count: usize,
    pub component_count: usize,
    pub asset_count: usize,
}

/// 一次扫描的聚合结果，产生后不可变
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub elements: Vec<ElementMetadata>,
    pub translation_keys: Vec<TranslationKeyRef>,
    /// 按框架分组的组件引用（blade/livewire/alpine/vue）
    pub components: BTreeMap<String, Vec<ComponentRef>>,
    pub assets: Vec<AssetRef>,
    pub metadata: ScanMetadata,
    /// 检测层吞掉的失败以警告形式随结果返回
    pub warnings: Vec<String>,
}

impl ScanResult {
    pub fn component_count(&self) -> usize {
        self.components.values().map(|v| v.len()).sum()
    }
}

/// 差分类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanDiffKind {
    /// 与上一次扫描的增量比较
    Incremental,
    /// 没有上一次结果，全部视为新增
    FullScan,
}

/// 两次扫描之间的元素差分，按稳定id匹配
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanDiff {
    pub kind: ScanDiffKind,
    pub added: Vec<ElementMetadata>,
    pub modified: Vec<ElementMetadata>,
    pub removed: Vec<ElementMetadata>,
    pub unchanged: Vec<String>,
}
