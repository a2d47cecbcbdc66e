//! 集成测试公用的假后端和会话装配
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use block_translator::config::Config;
use block_translator::error::{EngineError, EngineResult};
use block_translator::infrastructure::{ChunkStream, CHUNK_CHANNEL_CAPACITY};
use block_translator::models::block::{Block, BlockType};
use block_translator::orchestrator::{ActionObserver, BlockSession};
use block_translator::services::{ChatBackend, ChatRequest, ImageEmbedder, MtBackend};
use block_translator::workflow::{ActionKind, BlockFlow};

// ========== 假 LLM 后端 ==========

/// 脚本化的 LLM 后端
///
/// 可配置固定回复、流式 chunk 序列、前 N 次调用注入失败、
/// 每次调用的耗时，并带一个在途并发水位计。
pub struct FakeChat {
    reply: String,
    chunks: Vec<String>,
    fail_first: AtomicUsize,
    delay: Duration,
    stall_stream: bool,
    gate_first_streams: AtomicUsize,
    gate: Arc<tokio::sync::Semaphore>,
    pub chat_calls: AtomicUsize,
    pub stream_calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl FakeChat {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            chunks: Vec::new(),
            fail_first: AtomicUsize::new(0),
            delay: Duration::ZERO,
            stall_stream: false,
            gate_first_streams: AtomicUsize::new(0),
            gate: Arc::new(tokio::sync::Semaphore::new(0)),
            chat_calls: AtomicUsize::new(0),
            stream_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// 流式回复按给定 chunk 序列交付（默认一整块交付 reply）
    pub fn with_chunks(mut self, chunks: &[&str]) -> Self {
        self.chunks = chunks.iter().map(|s| s.to_string()).collect();
        self
    }

    /// 前 n 次调用（chat 或 stream_chat 合计）注入可重试失败
    pub fn with_fail_first(self, n: usize) -> Self {
        self.fail_first.store(n, Ordering::SeqCst);
        self
    }

    /// 每次 chat 调用睡这么久再返回
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// 流式调用永不结束，每 20ms 吐一个 chunk（用于取消测试）
    pub fn with_stalling_stream(mut self) -> Self {
        self.stall_stream = true;
        self
    }

    /// 前 n 次流式调用先挂起，等 `release_stream` 放行后才交付 chunk 并正常结束
    pub fn with_gated_streams(self, n: usize) -> Self {
        self.gate_first_streams.store(n, Ordering::SeqCst);
        self
    }

    /// 放行一条被闸住的流
    pub fn release_stream(&self) {
        self.gate.add_permits(1);
    }

    pub fn network_calls(&self) -> usize {
        self.chat_calls.load(Ordering::SeqCst) + self.stream_calls.load(Ordering::SeqCst)
    }

    fn take_failure(&self) -> bool {
        self.fail_first
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChatBackend for FakeChat {
    async fn chat(&self, _request: ChatRequest) -> EngineResult<String> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        self.enter();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.exit();

        if self.take_failure() {
            return Err(EngineError::bad_response("fake-chat", "注入的失败"));
        }
        Ok(self.reply.clone())
    }

    async fn stream_chat(&self, _request: ChatRequest) -> EngineResult<ChunkStream> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(CHUNK_CHANNEL_CAPACITY);

        if self.take_failure() {
            let _ = tx
                .send(Err(EngineError::bad_response("fake-chat", "注入的失败")))
                .await;
            return Ok(rx);
        }

        let chunks = if self.chunks.is_empty() {
            vec![self.reply.clone()]
        } else {
            self.chunks.clone()
        };
        let stall = self.stall_stream;
        let gated = self
            .gate_first_streams
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        let gate = self.gate.clone();

        tokio::spawn(async move {
            if gated {
                let Ok(permit) = gate.acquire_owned().await else {
                    return;
                };
                permit.forget();
            }
            if stall {
                loop {
                    if tx.send(Ok("…".to_string())).await.is_err() {
                        return;
                    }
                    tokio::time::sleep(Duration::from_millis(20)).await;
                }
            }
            for chunk in chunks {
                if tx.send(Ok(chunk)).await.is_err() {
                    return;
                }
            }
        });

        Ok(rx)
    }
}

// ========== 假 MT 后端 ==========

pub struct FakeMt {
    reply: String,
    fail_first: AtomicUsize,
    pub calls: AtomicUsize,
}

impl FakeMt {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            fail_first: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_fail_first(self, n: usize) -> Self {
        self.fail_first.store(n, Ordering::SeqCst);
        self
    }
}

#[async_trait]
impl MtBackend for FakeMt {
    async fn translate_text(
        &self,
        _text: &str,
        _source: &str,
        _target: &str,
    ) -> EngineResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let should_fail = self
            .fail_first
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(EngineError::bad_response("fake-mt", "注入的失败"));
        }
        Ok(self.reply.clone())
    }
}

// ========== 假图片转换器 ==========

pub struct FakeEmbedder {
    fail: bool,
    pub calls: AtomicUsize,
}

impl FakeEmbedder {
    pub fn ok() -> Self {
        Self {
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ImageEmbedder for FakeEmbedder {
    async fn to_embeddable(&self, _url: &str) -> EngineResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(EngineError::image_conversion("注入的转换失败"));
        }
        Ok("data:image/png;base64,aGVsbG8=".to_string())
    }
}

// ========== 记录观察者 ==========

#[derive(Default)]
pub struct RecordingObserver {
    pub chunks: AtomicUsize,
    pub completed: AtomicUsize,
    pub errors: AtomicUsize,
    pub cancelled: AtomicUsize,
    pub notices: AtomicUsize,
}

impl ActionObserver for RecordingObserver {
    fn on_stream_chunk(&self, _block_index: usize, _chunk: &str, _accumulated: &str) {
        self.chunks.fetch_add(1, Ordering::SeqCst);
    }

    fn on_complete(&self, _block_index: usize, _kind: ActionKind, _result: &str) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    fn on_error(&self, _block_index: usize, _kind: ActionKind, _message: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
    }

    fn on_cancelled(&self, _block_index: usize, _kind: ActionKind) {
        self.cancelled.fetch_add(1, Ordering::SeqCst);
    }

    fn on_notice(&self, _block_index: usize, _message: &str) {
        self.notices.fetch_add(1, Ordering::SeqCst);
    }
}

// ========== 会话装配 ==========

pub fn text_block(index: usize, content: &str) -> Block {
    Block {
        index,
        block_type: BlockType::Text,
        content: content.to_string(),
        html_content: None,
    }
}

pub fn image_block(index: usize, content: &str) -> Block {
    Block {
        index,
        block_type: BlockType::Image,
        content: content.to_string(),
        html_content: None,
    }
}

pub fn test_config(preference: &str) -> Config {
    Config {
        engine_preference: preference.to_string(),
        ..Config::default()
    }
}

pub fn build_session(
    config: &Config,
    blocks: Vec<Block>,
    chat: Arc<FakeChat>,
    mt: Arc<FakeMt>,
    embedder: Arc<FakeEmbedder>,
    observer: Arc<RecordingObserver>,
) -> Arc<BlockSession> {
    let flow = BlockFlow::new(config, chat, mt, embedder);
    Arc::new(BlockSession::new(config, blocks, flow, observer))
}

/// 最常用的装配：文本块 + LLM 偏好 + 全部正常的假后端
pub fn simple_session(blocks: Vec<Block>, chat: Arc<FakeChat>) -> Arc<BlockSession> {
    let config = test_config("llm");
    build_session(
        &config,
        blocks,
        chat,
        Arc::new(FakeMt::new("mt 翻译结果")),
        Arc::new(FakeEmbedder::ok()),
        Arc::new(RecordingObserver::default()),
    )
}
