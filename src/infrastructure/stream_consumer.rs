//! 流式响应消费 - 基础设施层
//!
//! ## 职责
//!
//! 独占一条 chunk 通道的读端，把增量文本拉完：
//! `Idle → Streaming → {Completed | Errored | Cancelled}`
//!
//! ## 核心规则
//!
//! 1. **每次拉取前先看取消令牌**：取消不是失败，静默收尾
//! 2. **逐块累积**：每收到一个 chunk 先追加到累积缓冲，再回调给上层
//! 3. **错误信息提取**：失败时尝试从不透明错误文本里抠出嵌套的
//!    `"message": "…"` 字段，给上层一个能看懂的错误串
//! 4. **读端释放有保证**：读端随本函数作用域结束而释放，三种终态一视同仁
//!
//! 本层不认识 Block / 翻译 / 解读等业务概念，只面对文本通道和回调。

use regex::Regex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{EngineError, EngineResult};

/// chunk 通道容量（有界，消费者落后时生产者挂起）
pub const CHUNK_CHANNEL_CAPACITY: usize = 32;

/// 流式文本通道的读端，每项是一个增量 chunk 或一个错误
pub type ChunkStream = mpsc::Receiver<EngineResult<String>>;

/// 消费阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    Idle,
    Streaming,
    Completed,
    Errored,
    Cancelled,
}

/// 消费结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    /// 正常走完，携带完整累积文本
    Completed(String),
    /// 被取消，不算失败
    Cancelled,
}

/// 流式响应消费器
pub struct StreamConsumer {
    phase: StreamPhase,
}

impl StreamConsumer {
    pub fn new() -> Self {
        Self {
            phase: StreamPhase::Idle,
        }
    }

    /// 当前所处阶段
    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    /// 拉完整条流
    ///
    /// # 参数
    /// - `source`: chunk 通道读端，本函数取得所有权，返回时随作用域释放
    /// - `cancel`: 取消令牌，每次拉取前优先检查
    /// - `on_chunk`: 每个 chunk 的回调，参数为（本次 chunk, 当前累积文本）
    ///
    /// # 返回
    /// 正常终止且累积文本非空返回 `Completed`；令牌被置位返回 `Cancelled`；
    /// 流中途报错或终止时累积为空则返回错误。
    pub async fn consume<F>(
        &mut self,
        mut source: ChunkStream,
        cancel: &CancellationToken,
        mut on_chunk: F,
    ) -> EngineResult<StreamOutcome>
    where
        F: FnMut(&str, &str),
    {
        self.phase = StreamPhase::Streaming;
        let mut accumulated = String::new();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.phase = StreamPhase::Cancelled;
                    return Ok(StreamOutcome::Cancelled);
                }
                next = source.recv() => match next {
                    Some(Ok(chunk)) => {
                        accumulated.push_str(&chunk);
                        on_chunk(&chunk, &accumulated);
                    }
                    Some(Err(e)) => {
                        self.phase = StreamPhase::Errored;
                        let raw = e.to_string();
                        let message = extract_error_message(&raw).unwrap_or(raw);
                        return Err(EngineError::StreamFailed { message });
                    }
                    None => {
                        let trimmed = accumulated.trim();
                        if trimmed.is_empty() {
                            self.phase = StreamPhase::Errored;
                            return Err(EngineError::EmptyResponse {
                                context: "流式响应".to_string(),
                            });
                        }
                        self.phase = StreamPhase::Completed;
                        return Ok(StreamOutcome::Completed(trimmed.to_string()));
                    }
                }
            }
        }
    }
}

impl Default for StreamConsumer {
    fn default() -> Self {
        Self::new()
    }
}

/// 从不透明的错误文本里提取嵌套的 `"message": "…"` 字段
///
/// 上游网关经常把真正的错误包在一层 JSON 里，整串返回给调用方
/// 只会看到一坨转义文本，这里尽量抠出人能读的那句。
pub fn extract_error_message(raw: &str) -> Option<String> {
    if let Ok(re) = Regex::new(r#""message"\s*:\s*"((?:[^"\\]|\\.)*)""#) {
        if let Some(caps) = re.captures(raw) {
            let message = caps.get(1)?.as_str().trim();
            if !message.is_empty() {
                return Some(message.replace("\\\"", "\"").replace("\\n", "\n"));
            }
        }
    }
    None
}
