//! # 网络模块
//!
//! 远程页面抓取，供`scan_page`在扫描前取回渲染后的HTML。
//! 超时是可配置的（默认30秒），并作为独立的错误类型上浮，
//! 不与一般抓取失败混淆。

use std::time::Duration;

use tracing::debug;
use url::Url;

use crate::core::{RetouchError, RetouchResult};

const DEFAULT_USER_AGENT: &str = concat!("retouch/", env!("CARGO_PKG_VERSION"));

/// 抓取远程页面正文
///
/// 只接受http/https URL；超时返回`FetchTimeout`，其余网络失败
/// 返回`Fetch`。
pub fn fetch_page(
    url: &str,
    timeout: Duration,
    user_agent: Option<&str>,
) -> RetouchResult<String> {
    let parsed = Url::parse(url).map_err(|e| RetouchError::InvalidUrl(format!("{}: {}", url, e)))?;

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(RetouchError::InvalidUrl(format!(
            "不支持的协议 {}: {}",
            parsed.scheme(),
            url
        )));
    }

    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .user_agent(user_agent.unwrap_or(DEFAULT_USER_AGENT))
        .build()
        .map_err(|e| RetouchError::Fetch(format!("HTTP客户端构建失败: {}", e)))?;

    debug!(url = %url, timeout_secs = timeout.as_secs(), "开始抓取页面");

    let response = client.get(parsed).send().map_err(|e| {
        if e.is_timeout() {
            RetouchError::FetchTimeout(url.to_string())
        } else {
            RetouchError::Fetch(format!("{}: {}", url, e))
        }
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(RetouchError::Fetch(format!("{}: HTTP {}", url, status)));
    }

    response.text().map_err(|e| {
        if e.is_timeout() {
            RetouchError::FetchTimeout(url.to_string())
        } else {
            RetouchError::Fetch(format!("读取响应失败 {}: {}", url, e))
        }
    })
}
