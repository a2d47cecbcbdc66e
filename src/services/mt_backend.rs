//! MT 机翻后端服务 - 业务能力层
//!
//! 封装 Mtran 批量翻译接口。MT 引擎只支持中英互译，
//! 其他语言对在发请求之前就会被拒绝。

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{EngineError, EngineResult};
use crate::services::engine_selector::{is_mt_supported, normalize_lang_code};

/// MT 请求超时
const MT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// MT 后端能力
#[async_trait]
pub trait MtBackend: Send + Sync {
    /// 翻译单段文本
    ///
    /// # 参数
    /// - `text`: 待翻译文本
    /// - `source`: 源语言代码（接受别名，如 cmn / eng）
    /// - `target`: 目标语言代码
    async fn translate_text(&self, text: &str, source: &str, target: &str)
        -> EngineResult<String>;
}

// ========== 线上协议 ==========

#[derive(Debug, Serialize)]
struct MtBatchRequest<'a> {
    from: &'a str,
    to: &'a str,
    texts: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct MtBatchResponse {
    results: Vec<String>,
}

/// Mtran 翻译服务客户端
pub struct MtranClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl MtranClient {
    /// 创建新的 MT 客户端
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.mt_api_base_url.trim_end_matches('/').to_string(),
            token: config.mt_api_token.clone(),
        }
    }
}

#[async_trait]
impl MtBackend for MtranClient {
    async fn translate_text(
        &self,
        text: &str,
        source: &str,
        target: &str,
    ) -> EngineResult<String> {
        let source = normalize_lang_code(source);
        let target = normalize_lang_code(target);

        if !is_mt_supported(&source, &target) {
            return Err(EngineError::UnsupportedLanguagePair { source, target });
        }

        let url = format!("{}/translate/batch", self.base_url);
        let body = MtBatchRequest {
            from: &source,
            to: &target,
            texts: vec![text],
        };

        debug!(
            "调用 MT API: {} -> {}, 文本 {} 字符",
            source,
            target,
            text.chars().count()
        );

        // 鉴权头是裸 token，不带 Bearer 前缀
        let response = self
            .http
            .post(&url)
            .timeout(MT_REQUEST_TIMEOUT)
            .header("Content-Type", "application/json")
            .header("Authorization", &self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::transport("translate/batch", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            warn!("❌ MT API 请求失败: 状态码={}, 响应={}", status, error_text);
            return Err(EngineError::bad_response(
                "translate/batch",
                format!("状态码 {}: {}", status, error_text),
            ));
        }

        let parsed: MtBatchResponse = response
            .json()
            .await
            .map_err(|e| EngineError::bad_response("translate/batch", format!("解析响应失败: {}", e)))?;

        let translated = parsed.results.into_iter().next().unwrap_or_default();
        let trimmed = translated.trim();
        if trimmed.is_empty() {
            return Err(EngineError::EmptyResponse {
                context: "MT 翻译结果".to_string(),
            });
        }

        debug!("MT 翻译成功，返回 {} 字符", trimmed.chars().count());
        Ok(trimmed.to_string())
    }
}
