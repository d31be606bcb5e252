//! # 工具模块
//!
//! 这个模块包含各种工具函数和实用程序：
//!
//! - 内容哈希（缓存键、稳定元素ID）
//! - 校验和计算（备份完整性）
//! - 文本偏移与行号换算、上下文片段截取

use sha2::{Digest, Sha256};

/// 计算内容的blake3哈希（十六进制）
///
/// 扫描缓存键和稳定元素ID都基于这个哈希。
pub fn content_hash(content: &str) -> String {
    blake3::hash(content.as_bytes()).to_hex().to_string()
}

/// 内容哈希的短形式，用于元素ID和备份ID
pub fn short_hash(content: &str) -> String {
    content_hash(content)[..16].to_string()
}

/// 计算字节内容的SHA-256校验和（十六进制）
///
/// 备份记录使用SHA-256，恢复时必须匹配。
pub fn checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// 根据字节偏移计算1起始的行号
///
/// 行号 = 偏移之前的换行符数量 + 1。
pub fn line_number_at(content: &str, offset: usize) -> usize {
    let end = offset.min(content.len());
    content[..end].matches('\n').count() + 1
}

/// 截取匹配位置周围的上下文片段（前后各 `radius` 个字符）
///
/// 片段边界对齐到UTF-8字符边界，换行折叠为空格。
pub fn context_snippet(content: &str, offset: usize, len: usize, radius: usize) -> String {
    let mut start = offset.saturating_sub(radius);
    let mut end = (offset + len + radius).min(content.len());

    while start > 0 && !content.is_char_boundary(start) {
        start -= 1;
    }
    while end < content.len() && !content.is_char_boundary(end) {
        end += 1;
    }

    content[start..end].replace(['\n', '\r'], " ").trim().to_string()
}

/// 判断URL是否指向外部资源
///
/// 以协议开头（`scheme:`）或协议相对（`//`）的URL视为外部。
pub fn is_external_url(url: &str) -> bool {
    if url.starts_with("//") {
        return true;
    }

    // data: / mailto: 等也算带协议
    if let Some(colon) = url.find(':') {
        let scheme = &url[..colon];
        return !scheme.is_empty()
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.')
            && scheme.chars().next().is_some_and(|c| c.is_ascii_alphabetic());
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_stable() {
        assert_eq!(content_hash("hello"), content_hash("hello"));
        assert_ne!(content_hash("hello"), content_hash("hello "));
    }

    #[test]
    fn test_line_number_first_line() {
        assert_eq!(line_number_at("no newlines here", 10), 1);
    }

    #[test]
    fn test_line_number_counts_newlines() {
        let content = "line one\nline two\nline three";
        let offset = content.find("three").unwrap();
        assert_eq!(line_number_at(content, offset), 3);
    }

    #[test]
    fn test_line_number_offset_past_end() {
        assert_eq!(line_number_at("a\nb", 999), 2);
    }

    #[test]
    fn test_context_snippet_window() {
        let content = "aaaa __('key') bbbb";
        let snippet = context_snippet(content, 5, 9, 4);
        assert_eq!(snippet, "aaa __('key') bbb");
    }

    #[test]
    fn test_context_snippet_folds_newlines() {
        let content = "first\n__('key')\nlast";
        let snippet = context_snippet(content, 6, 9, 50);
        assert!(!snippet.contains('\n'));
        assert!(snippet.contains("first"));
        assert!(snippet.contains("last"));
    }

    #[test]
    fn test_is_external_url() {
        assert!(is_external_url("https://cdn.example.com/app.css"));
        assert!(is_external_url("//cdn.example.com/app.js"));
        assert!(is_external_url("data:image/png;base64,xyz"));
        assert!(!is_external_url("/css/app.css"));
        assert!(!is_external_url("images/logo.png"));
    }

    #[test]
    fn test_checksum_hex() {
        let sum = checksum(b"backup bytes");
        assert_eq!(sum.len(), 64);
        assert_eq!(sum, checksum(b"backup bytes"));
    }
}
