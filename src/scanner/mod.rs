//! # 内容扫描器模块
//!
//! 对渲染后的HTML做可编辑区域发现：DOM层的结构抽取与文本层的
//! 模式抽取是两趟独立的遍历，结果在`ScanResult`中聚合，按内容
//! 哈希缓存。
//!
//! # 模块组织
//!
//! - `types` - 扫描结果数据模型
//! - `classifier` - DOM遍历与元素分类
//! - `detectors` - 框架指令/调用点的正则检测
//! - `source_map` - 元素到模板源文件的映射
//! - `cache` - 结果缓存与差分引擎
//! - `markers` - 可编辑标记注入

pub mod cache;
pub mod classifier;
pub mod detectors;
pub mod markers;
pub mod source_map;
pub mod types;

use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
#[cfg(feature = "remote")]
use tracing::info;
use tracing::{debug, warn};

use crate::core::{RetouchResult, ScannerConfig};
use crate::parsers::html::parse;
use crate::utils::content_hash;

use cache::{diff_scans, CacheStats, ScanCache};
use detectors::PatternDetectors;

// Re-export commonly used items for convenience
pub use types::{
    AssetKind, AssetRef, ComponentKind, ComponentRef, ContentType, ElementMetadata,
    MappingMethod, ScanDiff, ScanDiffKind, ScanMetadata, ScanResult, SourceMapping,
    TranslationKeyRef, TranslationPattern,
};

/// 单次扫描的选项
///
/// 序列化指纹参与缓存键，`force_refresh`除外——强制刷新只是
/// 跳过缓存读取，不改变结果身份。
#[derive(Debug, Clone, Serialize)]
pub struct ScanOptions {
    pub include_components: bool,
    pub include_translations: bool,
    pub include_assets: bool,
    pub excluded_tags: Vec<String>,
    pub min_text_length: usize,
    #[serde(skip)]
    pub force_refresh: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self::from_config(&ScannerConfig::default())
    }
}

impl ScanOptions {
    pub fn from_config(config: &ScannerConfig) -> Self {
        Self {
            include_components: true,
            include_translations: true,
            include_assets: true,
            excluded_tags: config.excluded_tags.clone(),
            min_text_length: config.min_text_length,
            force_refresh: false,
        }
    }

    /// 参与缓存键的选项指纹
    pub fn fingerprint(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// 内容扫描器
///
/// 请求作用域内同步执行；缓存内部做了并发保护，不同内容的
/// 扫描可以并行进行。
pub struct ContentScanner {
    config: ScannerConfig,
    cache: ScanCache,
    detectors: PatternDetectors,
}

impl ContentScanner {
    pub fn new(config: ScannerConfig) -> Self {
        let cache = ScanCache::new(
            config.cache_capacity,
            Duration::from_secs(config.cache_ttl_secs),
        );
        let detectors = PatternDetectors::new(config.context_radius);

        Self {
            config,
            cache,
            detectors,
        }
    }

    /// 扫描HTML字符串
    ///
    /// 命中缓存直接返回；`force_refresh`跳过缓存读取但仍写入
    /// 新结果。检测层的失败以警告形式进入结果，扫描本身只在
    /// 输入为空时报错。
    pub fn scan_html(&self, html: &str, options: &ScanOptions) -> RetouchResult<ScanResult> {
        let key = ScanCache::cache_key("html", html, &options.fingerprint());

        if !options.force_refresh {
            if let Some(cached) = self.cache.get(&key) {
                debug!(key = %key, "扫描结果缓存命中");
                return Ok(cached);
            }
        }

        let result = self.perform_scan(html, options)?;
        self.cache.put(key, result.clone());
        Ok(result)
    }

    /// 扫描HTML并返回结果的缓存键，供后续差分使用
    pub fn scan_html_keyed(
        &self,
        html: &str,
        options: &ScanOptions,
    ) -> RetouchResult<(String, ScanResult)> {
        let key = ScanCache::cache_key("html", html, &options.fingerprint());
        let result = self.scan_html(html, options)?;
        Ok((key, result))
    }

    /// 抓取远程页面并扫描
    #[cfg(feature = "remote")]
    pub fn scan_page(&self, url: &str, options: &ScanOptions) -> RetouchResult<ScanResult> {
        let html = crate::network::fetch_page(
            url,
            self.config.fetch_timeout(),
            self.config.user_agent.as_deref(),
        )?;
        info!(url = %url, bytes = html.len(), "远程页面抓取完成");
        self.scan_html(&html, options)
    }

    /// 与缓存中的历史结果做差分
    ///
    /// 历史结果不存在（或已过期）时退化为full_scan差分。
    pub fn diff_with_cached(&self, current: &ScanResult, previous_key: &str) -> ScanDiff {
        let previous = self.cache.get(previous_key);
        diff_scans(current, previous.as_ref())
    }

    /// 注入可编辑标记
    pub fn inject_editable_markers(&self, html: &str, options: &ScanOptions) -> String {
        markers::inject_editable_markers(html, options)
    }

    /// 用翻译存储补注每个翻译键的语言可用性
    pub fn annotate_locales(
        &self,
        result: &mut ScanResult,
        store: &crate::translation::TranslationManager,
    ) {
        let locales = store.available_locales();
        for key_ref in &mut result.translation_keys {
            for locale in &locales {
                let available = store.has(&key_ref.key, locale);
                key_ref.locales_available.insert(locale.clone(), available);
            }
        }
    }

    /// 主动失效某个缓存键
    pub fn invalidate(&self, key: &str) -> bool {
        self.cache.forget(key)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    fn perform_scan(&self, html: &str, options: &ScanOptions) -> RetouchResult<ScanResult> {
        let mut warnings = Vec::new();

        // 第一趟：DOM结构抽取
        let dom = parse(html)?;
        for parse_warning in dom.parse_warnings.iter().take(8) {
            warnings.push(format!("解析警告: {}", parse_warning));
        }

        let candidates = classifier::extract_editable_elements(&dom, html, options);
        let mut elements: Vec<_> = candidates.into_iter().map(|c| c.meta).collect();

        // 第二趟：原始文本的模式抽取（与DOM趟完全独立）
        let component_refs = if options.include_components {
            self.detectors.detect_components(html)
        } else {
            Vec::new()
        };

        let translation_keys = if options.include_translations {
            self.detectors.detect_translation_keys(html)
        } else {
            Vec::new()
        };

        let assets = if options.include_assets {
            self.detectors.detect_assets(html)
        } else {
            Vec::new()
        };

        // 源映射：单个元素失败不会中断扫描
        for element in &mut elements {
            element.source_mapping = source_map::map_to_source(element, &component_refs);
        }

        if !dom.parse_warnings.is_empty() {
            warn!(
                count = dom.parse_warnings.len(),
                "HTML解析存在非致命警告"
            );
        }

        let components = PatternDetectors::group_by_framework(component_refs);
        let component_count = components.values().map(Vec::len).sum();

        let metadata = ScanMetadata {
            content_hash: content_hash(html),
            scanned_at: Utc::now(),
            element_count: elements.len(),
            translation_key_count: translation_keys.len(),
            component_count,
            asset_count: assets.len(),
        };

        Ok(ScanResult {
            elements,
            translation_keys,
            components,
            assets,
            metadata,
            warnings,
        })
    }
}

impl Default for ContentScanner {
    fn default() -> Self {
        Self::new(ScannerConfig::default())
    }
}
