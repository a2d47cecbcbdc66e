//! 图片嵌入服务 - 业务能力层
//!
//! 把块内容里的图片引用转换成 LLM 可以直接消费的 data URL。
//! 图片块在发起任何网络调用之前必须先完成这一步，转换失败直接终止动作。

use std::path::Path;

use async_trait::async_trait;
use base64::Engine;
use regex::Regex;
use tracing::debug;

use crate::config::Config;
use crate::error::{EngineError, EngineResult};

/// 从块内容中提取第一个图片引用
///
/// 同时支持 Markdown 图片语法和 HTML `<img>` 标签，Markdown 优先。
pub fn extract_first_image_ref(content: &str) -> Option<String> {
    if let Ok(re) = Regex::new(r"!\[[^\]]*\]\(([^)]+)\)") {
        if let Some(url) = re
            .captures(content)
            .and_then(|cap| cap.get(1))
            .map(|m| m.as_str().trim())
            .filter(|url| !url.is_empty())
        {
            return Some(url.to_string());
        }
    }

    if let Ok(re) = Regex::new(r#"<img\s+[^>]*src="([^"]+)""#) {
        if let Some(url) = re
            .captures(content)
            .and_then(|cap| cap.get(1))
            .map(|m| m.as_str().trim())
            .filter(|url| !url.is_empty())
        {
            return Some(url.to_string());
        }
    }

    None
}

/// 图片嵌入能力
#[async_trait]
pub trait ImageEmbedder: Send + Sync {
    /// 把图片引用转换成 data URL
    async fn to_embeddable(&self, url: &str) -> EngineResult<String>;
}

/// 支持远程下载和本地资源目录读取的图片嵌入器
pub struct HttpImageEmbedder {
    http: reqwest::Client,
    asset_root: String,
}

impl HttpImageEmbedder {
    /// 创建新的图片嵌入器
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            asset_root: config.asset_root.clone(),
        }
    }

    /// 下载远程图片并编码成 data URL
    async fn fetch_remote(&self, url: &str) -> EngineResult<String> {
        debug!("下载远程图片: {}", url);

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| EngineError::image_conversion(format!("下载失败 ({}): {}", url, e)))?;

        if !response.status().is_success() {
            return Err(EngineError::image_conversion(format!(
                "下载失败 ({}): 状态码 {}",
                url,
                response.status()
            )));
        }

        let mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .filter(|v| v.starts_with("image/"))
            .unwrap_or_else(|| guess_mime(url).to_string());

        let bytes = response.bytes().await.map_err(|e| {
            EngineError::image_conversion(format!("读取图片数据失败 ({}): {}", url, e))
        })?;

        if bytes.is_empty() {
            return Err(EngineError::image_conversion(format!(
                "图片内容为空 ({})",
                url
            )));
        }

        let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
        Ok(format!("data:{};base64,{}", mime, encoded))
    }

    /// 读取资源目录下的本地图片并编码成 data URL
    async fn read_local(&self, relative: &str) -> EngineResult<String> {
        if self.asset_root.trim().is_empty() {
            return Err(EngineError::image_conversion(format!(
                "未配置资源目录，无法读取本地图片: {}",
                relative
            )));
        }

        let path = Path::new(&self.asset_root).join(relative.trim_start_matches('/'));
        debug!("读取本地图片: {}", path.display());

        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            EngineError::image_conversion(format!("读取本地图片失败 ({}): {}", path.display(), e))
        })?;

        if bytes.is_empty() {
            return Err(EngineError::image_conversion(format!(
                "图片内容为空 ({})",
                path.display()
            )));
        }

        let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
        Ok(format!("data:{};base64,{}", guess_mime(relative), encoded))
    }
}

#[async_trait]
impl ImageEmbedder for HttpImageEmbedder {
    async fn to_embeddable(&self, url: &str) -> EngineResult<String> {
        let url = url.trim();

        // data URL 本身就是可嵌入形态
        if url.starts_with("data:") {
            return Ok(url.to_string());
        }

        if url.starts_with("http://") || url.starts_with("https://") {
            return self.fetch_remote(url).await;
        }

        self.read_local(url).await
    }
}

/// 根据扩展名猜测 MIME 类型
fn guess_mime(path: &str) -> &'static str {
    let clean = path
        .split(|c: char| c == '?' || c == '#')
        .next()
        .unwrap_or("");
    let ext = clean.rsplit('.').next().unwrap_or("").to_lowercase();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        _ => "image/png",
    }
}
