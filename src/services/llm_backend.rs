//! LLM 后端服务 - 业务能力层
//!
//! 只负责"把一组消息发给大模型拿回文本"，不关心提示词内容和流程。
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点和模型
//! - 兼容 OpenAI API 的服务（如 DeepSeek, Doubao, Gemini 等）
//! - 流式调用由生产者任务把增量 chunk 推进有界通道，读端交给调用方

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImage,
        ChatCompletionRequestMessageContentPartText, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContent,
        ChatCompletionRequestUserMessageContentPart, CreateChatCompletionRequest,
        CreateChatCompletionRequestArgs, ImageDetail, ImageUrl,
    },
    Client,
};
use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{EngineError, EngineResult};
use crate::infrastructure::stream_consumer::{ChunkStream, CHUNK_CHANNEL_CAPACITY};
use crate::services::prompt_builder::{ChatMessage, ContentPart, MessageContent, MessageRole};

/// 一次 LLM 调用的参数
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// 覆盖默认模型（None 用配置里的模型）
    pub model: Option<String>,
}

/// LLM 后端能力
///
/// 测试用假后端和真实 OpenAI 兼容后端都实现这个 trait。
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// 非流式调用，直接返回完整文本
    async fn chat(&self, request: ChatRequest) -> EngineResult<String>;

    /// 流式调用，返回增量 chunk 通道的读端
    async fn stream_chat(&self, request: ChatRequest) -> EngineResult<ChunkStream>;
}

/// OpenAI 兼容的 LLM 后端
pub struct OpenAiChatBackend {
    client: Client<OpenAIConfig>,
    model_name: String,
}

impl OpenAiChatBackend {
    /// 创建新的 LLM 后端
    pub fn new(config: &Config) -> Self {
        // 配置 OpenAI 客户端（兼容 OpenAI API 的服务）
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        let client = Client::with_config(openai_config);

        Self {
            client,
            model_name: config.llm_model_name.clone(),
        }
    }

    /// 把内部消息模型转换成 async-openai 的请求
    fn build_request(
        &self,
        request: &ChatRequest,
        stream: bool,
    ) -> EngineResult<CreateChatCompletionRequest> {
        let mut messages = Vec::with_capacity(request.messages.len());

        for message in &request.messages {
            match (&message.role, &message.content) {
                (MessageRole::System, MessageContent::Text(text)) => {
                    let system_msg = ChatCompletionRequestSystemMessageArgs::default()
                        .content(text.as_str())
                        .build()
                        .map_err(|e| EngineError::InvalidRequest {
                            message: e.to_string(),
                        })?;
                    messages.push(ChatCompletionRequestMessage::System(system_msg));
                }
                (MessageRole::System, MessageContent::Parts(_)) => {
                    return Err(EngineError::InvalidRequest {
                        message: "系统消息不支持多部分内容".to_string(),
                    });
                }
                (MessageRole::User, MessageContent::Text(text)) => {
                    let user_msg = ChatCompletionRequestUserMessageArgs::default()
                        .content(text.as_str())
                        .build()
                        .map_err(|e| EngineError::InvalidRequest {
                            message: e.to_string(),
                        })?;
                    messages.push(ChatCompletionRequestMessage::User(user_msg));
                }
                (MessageRole::User, MessageContent::Parts(parts)) => {
                    // Vision 请求：文本和图片分成多个内容部分
                    let mut content_parts: Vec<ChatCompletionRequestUserMessageContentPart> =
                        Vec::with_capacity(parts.len());
                    for part in parts {
                        match part {
                            ContentPart::Text { text } => {
                                content_parts.push(
                                    ChatCompletionRequestUserMessageContentPart::Text(
                                        ChatCompletionRequestMessageContentPartText {
                                            text: text.clone(),
                                        },
                                    ),
                                );
                            }
                            ContentPart::ImageUrl { url } => {
                                content_parts.push(
                                    ChatCompletionRequestUserMessageContentPart::ImageUrl(
                                        ChatCompletionRequestMessageContentPartImage {
                                            image_url: ImageUrl {
                                                url: url.clone(),
                                                detail: Some(ImageDetail::Auto),
                                            },
                                        },
                                    ),
                                );
                            }
                        }
                    }

                    let user_msg = ChatCompletionRequestUserMessageArgs::default()
                        .content(ChatCompletionRequestUserMessageContent::Array(content_parts))
                        .build()
                        .map_err(|e| EngineError::InvalidRequest {
                            message: e.to_string(),
                        })?;
                    messages.push(ChatCompletionRequestMessage::User(user_msg));
                }
            }
        }

        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.model_name.clone());

        CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(messages)
            .temperature(request.temperature)
            .max_tokens(request.max_tokens)
            .stream(stream)
            .build()
            .map_err(|e| EngineError::InvalidRequest {
                message: e.to_string(),
            })
    }
}

#[async_trait]
impl ChatBackend for OpenAiChatBackend {
    async fn chat(&self, request: ChatRequest) -> EngineResult<String> {
        debug!(
            "调用 LLM API，模型: {}, 温度: {}, max_tokens: {}",
            request.model.as_deref().unwrap_or(&self.model_name),
            request.temperature,
            request.max_tokens
        );

        let model_for_log = request
            .model
            .clone()
            .unwrap_or_else(|| self.model_name.clone());
        let api_request = self.build_request(&request, false)?;

        let response = self.client.chat().create(api_request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            EngineError::transport("chat/completions", e)
        })?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .unwrap_or_default();

        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(EngineError::EmptyResponse {
                context: format!("模型 {}", model_for_log),
            });
        }

        debug!("LLM API 调用成功，返回 {} 字符", trimmed.chars().count());
        Ok(trimmed.to_string())
    }

    async fn stream_chat(&self, request: ChatRequest) -> EngineResult<ChunkStream> {
        debug!(
            "发起 LLM 流式调用，模型: {}",
            request.model.as_deref().unwrap_or(&self.model_name)
        );

        let api_request = self.build_request(&request, true)?;
        let client = self.client.clone();
        let (tx, rx) = mpsc::channel(CHUNK_CHANNEL_CAPACITY);

        // 生产者任务：把上游增量推进通道。读端被丢弃时 send 失败，任务随之退出，
        // 上游流也在这里随作用域释放。
        tokio::spawn(async move {
            let mut stream = match client.chat().create_stream(api_request).await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("LLM 流式连接失败: {}", e);
                    let _ = tx
                        .send(Err(EngineError::transport("chat/completions (stream)", e)))
                        .await;
                    return;
                }
            };

            while let Some(item) = stream.next().await {
                match item {
                    Ok(response) => {
                        for choice in response.choices {
                            if let Some(delta) = choice.delta.content {
                                if delta.is_empty() {
                                    continue;
                                }
                                if tx.send(Ok(delta)).await.is_err() {
                                    return;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx
                            .send(Err(EngineError::transport("chat/completions (stream)", e)))
                            .await;
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }
}
