//! 块动作流程 - 流程层
//!
//! 核心职责：定义"一个块的一次动作"的完整处理流程
//!
//! 翻译流程顺序：
//! 1. 语言检测 → 引擎选择
//! 2. 图片块先做图片转换（失败直接终止，不发网络请求）
//! 3. MT 引擎优先直接返回；MT 失败回退 LLM（只回退一次）
//! 4. LLM 路径按交付方式走流式或阻塞调用

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{EngineError, EngineResult};
use crate::infrastructure::stream_consumer::{StreamConsumer, StreamOutcome};
use crate::models::block::{Block, BlockType};
use crate::services::engine_selector::{Engine, EnginePreference, EngineSelector};
use crate::services::image_embedder::{extract_first_image_ref, ImageEmbedder};
use crate::services::lang_detector::{DetectionResult, Lang, LangDetector};
use crate::services::llm_backend::{ChatBackend, ChatRequest};
use crate::services::mt_backend::MtBackend;
use crate::services::prompt_builder::{ChatMessage, PromptBuilder};
use crate::workflow::action_ctx::ActionCtx;

/// 翻译生成温度
const TRANSLATE_TEMPERATURE: f32 = 0.3;
/// 解读生成温度
const EXPLAIN_TEMPERATURE: f32 = 0.7;
/// 解读 max_tokens
const EXPLAIN_MAX_TOKENS: u32 = 4000;
/// 翻译 max_tokens 下限
const TRANSLATE_MIN_TOKENS: usize = 1000;
/// 翻译 max_tokens 上限
const TRANSLATE_MAX_TOKENS: usize = 8000;

/// 块动作处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowOutcome {
    /// 生成完成，携带最终文本
    Done(String),
    /// 中途被取消
    Cancelled,
}

/// 一次翻译的执行计划
///
/// 检测、选型、提示词构建都在派发网络请求之前完成。
struct TranslatePlan {
    engine: Engine,
    detection: DetectionResult,
    source_text: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
}

/// 块动作流程
///
/// - 编排单个块动作的完整流程
/// - 决定何时检测、何时选引擎、何时回退
/// - 不持有任何会话状态
/// - 只依赖业务能力（services）
pub struct BlockFlow {
    detector: LangDetector,
    selector: EngineSelector,
    prompt_builder: PromptBuilder,
    chat: Arc<dyn ChatBackend>,
    mt: Arc<dyn MtBackend>,
    embedder: Arc<dyn ImageEmbedder>,
    preference: EnginePreference,
    default_target: Lang,
    verbose_logging: bool,
}

impl BlockFlow {
    /// 创建新的块动作流程
    pub fn new(
        config: &Config,
        chat: Arc<dyn ChatBackend>,
        mt: Arc<dyn MtBackend>,
        embedder: Arc<dyn ImageEmbedder>,
    ) -> Self {
        let preference = match EnginePreference::parse(&config.engine_preference) {
            Some(p) => p,
            None => {
                warn!(
                    "未知的引擎偏好 '{}', 使用 auto",
                    config.engine_preference
                );
                EnginePreference::Auto
            }
        };
        let default_target = Lang::from_code(&config.default_target_lang).unwrap_or(Lang::Zh);

        Self {
            detector: LangDetector::new(),
            selector: EngineSelector::new(),
            prompt_builder: PromptBuilder::new(),
            chat,
            mt,
            embedder,
            preference,
            default_target,
            verbose_logging: config.verbose_logging,
        }
    }

    /// 执行可见翻译（流式交付）
    ///
    /// MT 路径一次性返回全文，不触发 `on_chunk`；
    /// LLM 路径每个增量都会回调一次 `on_chunk(chunk, accumulated)`。
    pub async fn run_translate<F>(
        &self,
        block: &Block,
        ctx: &ActionCtx,
        token: &CancellationToken,
        on_chunk: F,
    ) -> EngineResult<FlowOutcome>
    where
        F: FnMut(&str, &str),
    {
        let plan = self.prepare_translate(block, ctx).await?;

        // 派发前最后看一眼取消标志
        if token.is_cancelled() {
            info!("{} 动作在派发前已取消", ctx);
            return Ok(FlowOutcome::Cancelled);
        }

        // ========== MT 路径 ==========
        if plan.engine == Engine::Mt {
            match self.translate_with_mt(&plan, ctx).await {
                Ok(translated) => return Ok(FlowOutcome::Done(translated)),
                Err(e) => {
                    warn!("{} ⚠️ MT 翻译失败: {}，回退 LLM", ctx, e);
                }
            }
        }

        // ========== LLM 流式路径 ==========
        self.stream_llm(
            plan.messages,
            TRANSLATE_TEMPERATURE,
            plan.max_tokens,
            ctx,
            token,
            on_chunk,
        )
        .await
    }

    /// 执行后台翻译（阻塞交付，批量任务用）
    pub async fn run_translate_blocking(
        &self,
        block: &Block,
        ctx: &ActionCtx,
        token: &CancellationToken,
    ) -> EngineResult<FlowOutcome> {
        let plan = self.prepare_translate(block, ctx).await?;

        if token.is_cancelled() {
            info!("{} 动作在派发前已取消", ctx);
            return Ok(FlowOutcome::Cancelled);
        }

        if plan.engine == Engine::Mt {
            match self.translate_with_mt(&plan, ctx).await {
                Ok(translated) => return Ok(FlowOutcome::Done(translated)),
                Err(e) => {
                    warn!("{} ⚠️ MT 翻译失败: {}，回退 LLM", ctx, e);
                }
            }

            if token.is_cancelled() {
                return Ok(FlowOutcome::Cancelled);
            }
        }

        let request = ChatRequest {
            messages: plan.messages,
            temperature: TRANSLATE_TEMPERATURE,
            max_tokens: plan.max_tokens,
            model: None,
        };
        let text = self.chat.chat(request).await?;

        info!("{} ✓ LLM 翻译完成，{} 字符", ctx, text.chars().count());
        Ok(FlowOutcome::Done(text))
    }

    /// 执行解读（流式交付，只走 LLM）
    pub async fn run_explain<F>(
        &self,
        block: &Block,
        ctx: &ActionCtx,
        token: &CancellationToken,
        on_chunk: F,
    ) -> EngineResult<FlowOutcome>
    where
        F: FnMut(&str, &str),
    {
        let messages = if block.block_type == BlockType::Image {
            let data_url = self.embed_block_image(block, ctx).await?;
            self.prompt_builder.build_explain_messages_with_image(
                block.block_type,
                &block.content,
                &data_url,
            )
        } else {
            self.prompt_builder
                .build_explain_messages(block.block_type, block.translation_source())
        };

        if token.is_cancelled() {
            info!("{} 动作在派发前已取消", ctx);
            return Ok(FlowOutcome::Cancelled);
        }

        self.stream_llm(
            messages,
            EXPLAIN_TEMPERATURE,
            EXPLAIN_MAX_TOKENS,
            ctx,
            token,
            on_chunk,
        )
        .await
    }

    // ========== 内部流程步骤 ==========

    /// 翻译前准备：检测语言、选引擎、构建提示词
    ///
    /// 图片块在这里完成图片转换，转换失败时动作在发起任何网络请求之前终止。
    async fn prepare_translate(
        &self,
        block: &Block,
        ctx: &ActionCtx,
    ) -> EngineResult<TranslatePlan> {
        let source_text = block.translation_source().to_string();

        self.log_source(ctx, &source_text);

        // 语言检测（太短的内容直接用兜底结果）
        let detection = if self.detector.is_suitable_for_detection(&source_text) {
            self.detector.detect(&source_text)
        } else {
            debug!("{} 内容过短，跳过语言检测", ctx);
            self.detector.fallback(self.default_target)
        };

        // 引擎选择
        let selection = self
            .selector
            .select(block.block_type, &detection, self.preference);

        info!(
            "{} 🔍 {} -> {} (置信度: {}), 引擎: {}",
            ctx,
            detection.detected.name(),
            detection.target.name(),
            detection.confidence.name(),
            selection.engine.name()
        );
        if let Some(reason) = &selection.reason {
            info!("{} 💡 {}", ctx, reason);
        }

        // 图片块先转换图片
        let messages = if block.block_type == BlockType::Image {
            let data_url = self.embed_block_image(block, ctx).await?;
            self.prompt_builder.build_translate_messages_with_image(
                block.block_type,
                &block.content,
                &data_url,
                detection.target,
            )
        } else {
            let source_hint =
                (detection.detected != Lang::Unknown).then_some(detection.detected);
            self.prompt_builder.build_translate_messages(
                block.block_type,
                &source_text,
                detection.target,
                source_hint,
                Some(&detection),
            )
        };

        let max_tokens = translate_max_tokens(&source_text);

        Ok(TranslatePlan {
            engine: selection.engine,
            detection,
            source_text,
            messages,
            max_tokens,
        })
    }

    /// 调用 MT 引擎
    async fn translate_with_mt(
        &self,
        plan: &TranslatePlan,
        ctx: &ActionCtx,
    ) -> EngineResult<String> {
        let translated = self
            .mt
            .translate_text(
                &plan.source_text,
                plan.detection.detected.code(),
                plan.detection.target.code(),
            )
            .await?;

        info!(
            "{} ✓ MT 翻译完成，{} 字符",
            ctx,
            translated.chars().count()
        );
        Ok(translated)
    }

    /// 把块里的图片引用转换成可嵌入的 data URL
    async fn embed_block_image(&self, block: &Block, ctx: &ActionCtx) -> EngineResult<String> {
        let image_ref = extract_first_image_ref(&block.content)
            .ok_or_else(|| EngineError::image_conversion("图片块中找不到图片引用"))?;

        debug!("{} 转换图片: {}", ctx, image_ref);
        self.embedder.to_embeddable(&image_ref).await
    }

    /// 发起 LLM 流式调用并消费到结束
    async fn stream_llm<F>(
        &self,
        messages: Vec<ChatMessage>,
        temperature: f32,
        max_tokens: u32,
        ctx: &ActionCtx,
        token: &CancellationToken,
        on_chunk: F,
    ) -> EngineResult<FlowOutcome>
    where
        F: FnMut(&str, &str),
    {
        let request = ChatRequest {
            messages,
            temperature,
            max_tokens,
            model: None,
        };
        let source = self.chat.stream_chat(request).await?;

        let mut consumer = StreamConsumer::new();
        match consumer.consume(source, token, on_chunk).await? {
            StreamOutcome::Completed(text) => {
                info!("{} ✓ LLM 生成完成，{} 字符", ctx, text.chars().count());
                Ok(FlowOutcome::Done(text))
            }
            StreamOutcome::Cancelled => {
                info!("{} 流式生成已取消", ctx);
                Ok(FlowOutcome::Cancelled)
            }
        }
    }

    // ========== 日志辅助方法 ==========

    /// 显示内容预览
    fn log_source(&self, ctx: &ActionCtx, text: &str) {
        if !self.verbose_logging {
            return;
        }
        let preview = if text.chars().count() > 80 {
            text.chars().take(80).collect::<String>() + "..."
        } else {
            text.to_string()
        };
        info!("{} 内容: {}", ctx, preview);
    }
}

/// 按内容长度估算翻译所需的 max_tokens
fn translate_max_tokens(text: &str) -> u32 {
    text.chars()
        .count()
        .saturating_mul(4)
        .clamp(TRANSLATE_MIN_TOKENS, TRANSLATE_MAX_TOKENS) as u32
}
