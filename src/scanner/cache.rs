//! 扫描缓存与差分引擎
//!
//! 扫描结果按 `blake3(扫描类型 + 内容哈希 + 选项指纹)` 键入
//! LRU缓存，条目带TTL。缓存是派生数据，并发下last-writer-wins
//! 即可。差分按稳定元素ID匹配两次扫描结果。

use std::num::NonZeroUsize;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use lru::LruCache;
use tracing::debug;

use crate::scanner::types::{ElementMetadata, ScanDiff, ScanDiffKind, ScanResult};
use crate::utils::content_hash;

/// 缓存条目
struct CacheEntry {
    result: ScanResult,
    created_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.created_at.elapsed() > self.ttl
    }
}

/// 缓存统计信息
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub sets: usize,
    pub expired: usize,
}

impl CacheStats {
    /// 计算命中率
    pub fn hit_rate(&self) -> f32 {
        let total = self.hits + self.misses;
        if total > 0 {
            self.hits as f32 / total as f32
        } else {
            0.0
        }
    }
}

/// 扫描结果缓存
pub struct ScanCache {
    entries: RwLock<LruCache<String, CacheEntry>>,
    stats: RwLock<CacheStats>,
    default_ttl: Duration,
}

impl ScanCache {
    pub fn new(capacity: usize, default_ttl: Duration) -> Self {
        let capacity =
            NonZeroUsize::new(capacity).unwrap_or_else(|| NonZeroUsize::new(256).unwrap());

        Self {
            entries: RwLock::new(LruCache::new(capacity)),
            stats: RwLock::new(CacheStats::default()),
            default_ttl,
        }
    }

    /// 构造缓存键
    pub fn cache_key(scan_type: &str, html: &str, options_fingerprint: &str) -> String {
        content_hash(&format!(
            "{}:{}:{}",
            scan_type,
            content_hash(html),
            options_fingerprint
        ))
    }

    /// 读取缓存；过期条目当作miss并移除
    pub fn get(&self, key: &str) -> Option<ScanResult> {
        let mut entries = self.entries.write().ok()?;
        let mut stats = self.stats.write().ok()?;

        match entries.get(key) {
            Some(entry) if entry.is_expired() => {
                entries.pop(key);
                stats.expired += 1;
                stats.misses += 1;
                None
            }
            Some(entry) => {
                stats.hits += 1;
                Some(entry.result.clone())
            }
            None => {
                stats.misses += 1;
                None
            }
        }
    }

    /// 写入缓存
    pub fn put(&self, key: String, result: ScanResult) {
        if let (Ok(mut entries), Ok(mut stats)) = (self.entries.write(), self.stats.write()) {
            entries.put(
                key,
                CacheEntry {
                    result,
                    created_at: Instant::now(),
                    ttl: self.default_ttl,
                },
            );
            stats.sets += 1;
        }
    }

    /// 删除缓存条目
    pub fn forget(&self, key: &str) -> bool {
        self.entries
            .write()
            .map(|mut entries| entries.pop(key).is_some())
            .unwrap_or(false)
    }

    /// 清空缓存
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.read().map(|s| *s).unwrap_or_default()
    }
}

/// 计算两次扫描之间的元素差分
///
/// 元素按稳定id匹配；文本、innerHtml、序列化属性或内容类型
/// 任一不同即视为modified。没有上一次结果时退化为full_scan，
/// 全部元素视为新增——这永远不是错误。
pub fn diff_scans(current: &ScanResult, previous: Option<&ScanResult>) -> ScanDiff {
    let Some(previous) = previous else {
        debug!("无历史扫描结果，退化为全量扫描差分");
        return ScanDiff {
            kind: ScanDiffKind::FullScan,
            added: current.elements.clone(),
            modified: Vec::new(),
            removed: Vec::new(),
            unchanged: Vec::new(),
        };
    };

    let mut added = Vec::new();
    let mut modified = Vec::new();
    let mut unchanged = Vec::new();

    for element in &current.elements {
        match previous.elements.iter().find(|p| p.id == element.id) {
            None => added.push(element.clone()),
            Some(prev) if element_changed(element, prev) => modified.push(element.clone()),
            Some(_) => unchanged.push(element.id.clone()),
        }
    }

    let removed = previous
        .elements
        .iter()
        .filter(|p| !current.elements.iter().any(|c| c.id == p.id))
        .cloned()
        .collect();

    ScanDiff {
        kind: ScanDiffKind::Incremental,
        added,
        modified,
        removed,
        unchanged,
    }
}

fn element_changed(current: &ElementMetadata, previous: &ElementMetadata) -> bool {
    current.text_content != previous.text_content
        || current.inner_html != previous.inner_html
        || current.attributes_serialized() != previous.attributes_serialized()
        || current.content_type != previous.content_type
}
