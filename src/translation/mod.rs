//! # 翻译存储模块
//!
//! 每个语言一个JSON文件（`en.json`、`fr.json`...），点分键映射到
//! 嵌套对象。读取走三级回退：请求语言 → 默认语言 → 字面键本身，
//! 读取永不报错。写入前做键格式与内容安全校验，写入走原子落盘，
//! 语言文件在内存中按语言缓存。

use std::fs;
use std::path::PathBuf;

use dashmap::DashMap;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::core::{RetouchError, RetouchResult, TranslationConfig};
use crate::updater::atomic_write;

// 值里出现这些标签一律拒绝，与allow_html无关
const FORBIDDEN_TAGS: &[&str] = &[
    "<script", "<iframe", "<object", "<embed", "<form", "<input", "<textarea",
];

/// 翻译存储管理器
pub struct TranslationManager {
    dir: PathBuf,
    config: TranslationConfig,
    key_pattern: Regex,
    event_handler: Regex,
    /// 按语言缓存的已加载文档
    cache: DashMap<String, Value>,
}

impl TranslationManager {
    pub fn new(dir: impl Into<PathBuf>, config: TranslationConfig) -> Self {
        Self {
            dir: dir.into(),
            config,
            key_pattern: Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9._-]*$").unwrap(),
            event_handler: Regex::new(r"(?i)\bon\w+\s*=").unwrap(),
            cache: DashMap::new(),
        }
    }

    /// 读取翻译值
    ///
    /// 回退顺序：请求语言 → 默认语言 → 键本身。永不报错，
    /// 缺失的语言文件视为空文档。
    pub fn get(&self, key: &str, locale: &str) -> String {
        if let Some(value) = self.lookup(key, locale) {
            return value;
        }

        if locale != self.config.default_locale {
            if let Some(value) = self.lookup(key, &self.config.default_locale) {
                return value;
            }
        }

        key.to_string()
    }

    /// 某语言是否存在该键的显式翻译（不走回退）
    pub fn has(&self, key: &str, locale: &str) -> bool {
        self.lookup(key, locale).is_some()
    }

    /// 写入翻译值
    pub fn set(&self, locale: &str, key: &str, value: &str) -> RetouchResult<()> {
        self.validate_key(key)?;
        self.validate_value(value)?;

        let mut document = self.load(locale);
        set_nested(
            document.as_object_mut().ok_or_else(|| {
                RetouchError::Parse(format!("语言文件{}的顶层不是对象", locale))
            })?,
            key,
            value,
        )?;

        self.persist(locale, &document)?;
        debug!(locale = %locale, key = %key, "翻译已写入");
        Ok(())
    }

    /// 删除翻译键，返回是否确实存在过
    pub fn forget(&self, locale: &str, key: &str) -> RetouchResult<bool> {
        self.validate_key(key)?;

        let mut document = self.load(locale);
        let Some(root) = document.as_object_mut() else {
            return Ok(false);
        };

        let removed = remove_nested(root, key);
        if removed {
            self.persist(locale, &document)?;
        }
        Ok(removed)
    }

    /// 某语言的全部翻译，扁平化为点分键
    pub fn all(&self, locale: &str) -> Vec<(String, String)> {
        let document = self.load(locale);
        let mut flat = Vec::new();
        if let Some(root) = document.as_object() {
            flatten(root, String::new(), &mut flat);
        }
        flat.sort();
        flat
    }

    /// 导出某语言的完整JSON文档
    pub fn export(&self, locale: &str) -> Value {
        self.load(locale)
    }

    /// 导入翻译文档
    ///
    /// `merge`为true时逐键合并（导入值覆盖同名键），否则整体替换。
    /// 导入的每个值都经过与`set`相同的校验。
    pub fn import(&self, locale: &str, document: &Value, merge: bool) -> RetouchResult<usize> {
        let Some(incoming) = document.as_object() else {
            return Err(RetouchError::Parse("导入文档的顶层必须是对象".to_string()));
        };

        let mut flat = Vec::new();
        flatten(incoming, String::new(), &mut flat);
        for (key, value) in &flat {
            self.validate_key(key)?;
            self.validate_value(value)?;
        }

        let mut target = if merge {
            self.load(locale)
        } else {
            Value::Object(Map::new())
        };
        let root = target.as_object_mut().ok_or_else(|| {
            RetouchError::Parse(format!("语言文件{}的顶层不是对象", locale))
        })?;

        for (key, value) in &flat {
            set_nested(root, key, value)?;
        }

        self.persist(locale, &target)?;
        Ok(flat.len())
    }

    /// 列出有语言文件的全部语言
    pub fn available_locales(&self) -> Vec<String> {
        let mut locales = Vec::new();

        if let Ok(entries) = fs::read_dir(&self.dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == "json") {
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        locales.push(stem.to_string());
                    }
                }
            }
        }

        locales.sort();
        locales
    }

    fn lookup(&self, key: &str, locale: &str) -> Option<String> {
        let document = self.load(locale);
        let mut current = &document;

        for segment in key.split('.') {
            current = current.as_object()?.get(segment)?;
        }

        current.as_str().map(str::to_string)
    }

    fn load(&self, locale: &str) -> Value {
        if let Some(cached) = self.cache.get(locale) {
            return cached.clone();
        }

        let path = self.locale_path(locale);
        let document = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(value @ Value::Object(_)) => value,
                Ok(_) => {
                    warn!(locale = %locale, "语言文件顶层不是对象，按空文档处理");
                    Value::Object(Map::new())
                }
                Err(e) => {
                    warn!(locale = %locale, "语言文件解析失败，按空文档处理: {}", e);
                    Value::Object(Map::new())
                }
            },
            Err(_) => Value::Object(Map::new()),
        };

        self.cache.insert(locale.to_string(), document.clone());
        document
    }

    fn persist(&self, locale: &str, document: &Value) -> RetouchResult<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.locale_path(locale);

        if self.config.auto_backup && path.exists() {
            let snapshot = path.with_extension("json.bak");
            if let Err(e) = fs::copy(&path, &snapshot) {
                warn!(locale = %locale, "语言文件快照失败: {}", e);
            }
        }

        let mut raw = serde_json::to_vec_pretty(document)?;
        raw.push(b'\n');
        atomic_write(&path, &raw)?;

        self.cache.insert(locale.to_string(), document.clone());
        Ok(())
    }

    fn locale_path(&self, locale: &str) -> PathBuf {
        self.dir.join(format!("{}.json", locale))
    }

    fn validate_key(&self, key: &str) -> RetouchResult<()> {
        if !self.key_pattern.is_match(key) || key.contains("..") || key.ends_with('.') {
            return Err(RetouchError::InvalidKey(key.to_string()));
        }
        Ok(())
    }

    fn validate_value(&self, value: &str) -> RetouchResult<()> {
        if value.chars().count() > self.config.max_value_length {
            return Err(RetouchError::UnsafeContent(format!(
                "翻译值超过最大长度{}",
                self.config.max_value_length
            )));
        }

        let lowered = value.to_lowercase();

        for tag in FORBIDDEN_TAGS {
            if lowered.contains(tag) {
                return Err(RetouchError::UnsafeContent(format!(
                    "翻译值包含禁止的标签{}",
                    tag
                )));
            }
        }

        if lowered.contains("javascript:") || self.event_handler.is_match(value) {
            return Err(RetouchError::UnsafeContent(
                "翻译值包含脚本内容".to_string(),
            ));
        }

        if !self.config.allow_html && value.contains('<') && value.contains('>') {
            return Err(RetouchError::UnsafeContent(
                "翻译值不允许包含HTML".to_string(),
            ));
        }

        Ok(())
    }
}

/// 沿点分键写入嵌套对象，必要时创建中间层
///
/// 中间段已存在且不是对象时报`InvalidKey`——不会悄悄覆盖
/// 已有的叶子翻译。
fn set_nested(root: &mut Map<String, Value>, key: &str, value: &str) -> RetouchResult<()> {
    let segments: Vec<&str> = key.split('.').collect();
    let mut current = root;

    for segment in &segments[..segments.len() - 1] {
        let slot = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));

        current = match slot {
            Value::Object(map) => map,
            _ => {
                return Err(RetouchError::InvalidKey(format!(
                    "键{}与既有的叶子值冲突",
                    key
                )));
            }
        };
    }

    current.insert(
        segments[segments.len() - 1].to_string(),
        Value::String(value.to_string()),
    );
    Ok(())
}

fn remove_nested(root: &mut Map<String, Value>, key: &str) -> bool {
    let segments: Vec<&str> = key.split('.').collect();
    let mut current = root;

    for segment in &segments[..segments.len() - 1] {
        current = match current.get_mut(*segment) {
            Some(Value::Object(map)) => map,
            _ => return false,
        };
    }

    current.remove(segments[segments.len() - 1]).is_some()
}

fn flatten(map: &Map<String, Value>, prefix: String, out: &mut Vec<(String, String)>) {
    for (key, value) in map {
        let full = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };

        match value {
            Value::Object(nested) => flatten(nested, full, out),
            Value::String(s) => out.push((full, s.clone())),
            other => out.push((full, other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> (tempfile::TempDir, TranslationManager) {
        let tmp = tempfile::tempdir().unwrap();
        let manager = TranslationManager::new(tmp.path(), TranslationConfig::default());
        (tmp, manager)
    }

    #[test]
    fn test_set_and_get_nested() {
        let (_tmp, manager) = manager();

        manager.set("en", "messages.welcome", "Welcome!").unwrap();
        assert_eq!(manager.get("messages.welcome", "en"), "Welcome!");

        // 磁盘上是嵌套JSON
        let exported = manager.export("en");
        assert_eq!(exported["messages"]["welcome"], "Welcome!");
    }

    #[test]
    fn test_fallback_chain() {
        let (_tmp, manager) = manager();
        manager.set("en", "greeting.hello", "hello").unwrap();

        // fr缺失 → 回退到默认语言en
        assert_eq!(manager.get("greeting.hello", "fr"), "hello");
        // 两边都缺失 → 返回键本身
        assert_eq!(manager.get("a.b.c", "fr"), "a.b.c");
    }

    #[test]
    fn test_has_does_not_fall_back() {
        let (_tmp, manager) = manager();
        manager.set("en", "greeting.hello", "hello").unwrap();

        assert!(manager.has("greeting.hello", "en"));
        assert!(!manager.has("greeting.hello", "fr"));
    }

    #[test]
    fn test_invalid_keys_rejected() {
        let (_tmp, manager) = manager();

        for key in ["", "a b", "a..b", "a.b.", ".lead", "key$"] {
            assert!(
                matches!(manager.set("en", key, "v"), Err(RetouchError::InvalidKey(_))),
                "key {:?} should be rejected",
                key
            );
        }
    }

    #[test]
    fn test_unsafe_values_rejected() {
        let (_tmp, manager) = manager();

        for value in [
            "<script>alert(1)</script>",
            "<IFRAME src=x>",
            "click javascript:boom",
            r#"<b onclick="evil()">x</b>"#,
            // 事件处理器大小写不敏感
            r#"<b ONCLICK="evil()">x</b>"#,
        ] {
            assert!(matches!(
                manager.set("en", "k", value),
                Err(RetouchError::UnsafeContent(_))
            ));
        }
    }

    #[test]
    fn test_plain_html_rejected_unless_allowed() {
        let tmp = tempfile::tempdir().unwrap();

        let strict = TranslationManager::new(tmp.path(), TranslationConfig::default());
        assert!(strict.set("en", "k", "<b>bold</b>").is_err());

        let lenient = TranslationManager::new(
            tmp.path(),
            TranslationConfig {
                allow_html: true,
                ..TranslationConfig::default()
            },
        );
        assert!(lenient.set("en", "k", "<b>bold</b>").is_ok());
        // 允许HTML也不放行脚本类标签
        assert!(matches!(
            lenient.set("en", "k", "<script>x</script>"),
            Err(RetouchError::UnsafeContent(_))
        ));
    }

    #[test]
    fn test_value_length_limit() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = TranslationManager::new(
            tmp.path(),
            TranslationConfig {
                max_value_length: 5,
                ..TranslationConfig::default()
            },
        );

        assert!(manager.set("en", "k", "short").is_ok());
        assert!(matches!(
            manager.set("en", "k", "too long"),
            Err(RetouchError::UnsafeContent(_))
        ));
    }

    #[test]
    fn test_leaf_conflict_rejected() {
        let (_tmp, manager) = manager();
        manager.set("en", "nav.home", "Home").unwrap();

        // nav.home是叶子，不能再往下挂子键
        assert!(matches!(
            manager.set("en", "nav.home.label", "x"),
            Err(RetouchError::InvalidKey(_))
        ));
        // 原值不受影响
        assert_eq!(manager.get("nav.home", "en"), "Home");
    }

    #[test]
    fn test_forget() {
        let (_tmp, manager) = manager();
        manager.set("en", "nav.home", "Home").unwrap();

        assert!(manager.forget("en", "nav.home").unwrap());
        assert!(!manager.forget("en", "nav.home").unwrap());
        assert_eq!(manager.get("nav.home", "en"), "nav.home");
    }

    #[test]
    fn test_all_flattened() {
        let (_tmp, manager) = manager();
        manager.set("en", "nav.home", "Home").unwrap();
        manager.set("en", "nav.about", "About").unwrap();
        manager.set("en", "title", "Site").unwrap();

        let all = manager.all("en");
        assert_eq!(
            all,
            vec![
                ("nav.about".to_string(), "About".to_string()),
                ("nav.home".to_string(), "Home".to_string()),
                ("title".to_string(), "Site".to_string()),
            ]
        );
    }

    #[test]
    fn test_import_merge_and_replace() {
        let (_tmp, manager) = manager();
        manager.set("en", "keep.me", "original").unwrap();

        let incoming = serde_json::json!({"nav": {"home": "Home"}});

        let count = manager.import("en", &incoming, true).unwrap();
        assert_eq!(count, 1);
        assert_eq!(manager.get("keep.me", "en"), "original");
        assert_eq!(manager.get("nav.home", "en"), "Home");

        manager.import("en", &incoming, false).unwrap();
        // 整体替换后旧键消失
        assert_eq!(manager.get("keep.me", "en"), "keep.me");
    }

    #[test]
    fn test_import_validates_values() {
        let (_tmp, manager) = manager();
        let incoming = serde_json::json!({"bad": "<script>x</script>"});
        assert!(manager.import("en", &incoming, true).is_err());
    }

    #[test]
    fn test_available_locales() {
        let (_tmp, manager) = manager();
        manager.set("en", "a", "1").unwrap();
        manager.set("fr", "a", "2").unwrap();

        assert_eq!(manager.available_locales(), vec!["en", "fr"]);
    }

    #[test]
    fn test_corrupt_locale_file_treated_as_empty() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("en.json"), "{not json").unwrap();

        let manager = TranslationManager::new(tmp.path(), TranslationConfig::default());
        assert_eq!(manager.get("any.key", "en"), "any.key");
    }
}
