//! 块会话 - 编排层
//!
//! ## 职责
//!
//! 本模块持有一份文档的所有块和全部动作状态，是单块动作的状态机。
//!
//! ## 核心功能
//!
//! 1. **守卫检查**：功能开关、进行中动作、已有结果三道守卫
//! 2. **状态登记**：同一个块同一时刻最多一个进行中动作
//! 3. **可见槽位**：界面一次只展示一个流式动作，后发起的顶掉前一个
//! 4. **结果存储**：翻译和解读结果按块索引各存一张表
//! 5. **取消**：每个动作持有自己的取消令牌，可见流可以随时取消
//!
//! ## 设计特点
//!
//! - 状态只在短临界区内持锁修改，绝不跨 await 持锁
//! - 取消令牌随动作登记一起存放，动作落账时一并注销
//! - 结果表按块索引写入，落账互不干扰；共享的只有可见槽位

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::Config;
use crate::error::{EngineError, EngineResult};
use crate::models::block::{Block, TranslatedBlock};
use crate::orchestrator::observer::ActionObserver;
use crate::workflow::action_ctx::{ActionCtx, ActionKind};
use crate::workflow::block_flow::{BlockFlow, FlowOutcome};

/// 动作的最终结局
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    /// 正常完成，结果已写入会话
    Completed,
    /// 守卫拒绝（功能关闭 / 动作进行中 / 结果已存在）
    Skipped,
    /// 中途被取消
    Cancelled,
}

/// 进行中动作的登记信息
///
/// 取消令牌直接放在登记里，动作注销时令牌一起消失。
#[derive(Debug)]
struct ActionRecord {
    kind: ActionKind,
    token: CancellationToken,
}

/// 动作状态表
#[derive(Debug, Default)]
struct ActionState {
    /// 进行中的动作，按块索引登记
    active: HashMap<usize, ActionRecord>,
    /// 已完成的翻译结果
    translations: HashMap<usize, String>,
    /// 已完成的解读结果
    explanations: HashMap<usize, String>,
}

/// 可见流式槽位
///
/// 只跟踪当前交互展示的那一个动作，后台批量任务从不触碰它。
#[derive(Debug, Clone, Default)]
pub struct StreamingState {
    pub is_streaming: bool,
    pub stream_content: String,
    pub stream_kind: Option<ActionKind>,
    pub streaming_block_index: Option<usize>,
    pub error: Option<String>,
}

/// 块会话
///
/// 一份文档对应一个会话，会话销毁时所有状态一起消失。
pub struct BlockSession {
    blocks: Vec<Block>,
    flow: BlockFlow,
    translation_enabled: bool,
    max_concurrent_blocks: usize,
    max_retries: usize,
    state: Mutex<ActionState>,
    streaming: Mutex<StreamingState>,
    batch_token: Mutex<CancellationToken>,
    observer: Arc<dyn ActionObserver>,
}

impl BlockSession {
    /// 创建新的块会话
    pub fn new(
        config: &Config,
        blocks: Vec<Block>,
        flow: BlockFlow,
        observer: Arc<dyn ActionObserver>,
    ) -> Self {
        Self {
            blocks,
            flow,
            translation_enabled: config.translation_enabled,
            max_concurrent_blocks: config.max_concurrent_blocks.max(1),
            max_retries: config.max_retries.max(1),
            state: Mutex::new(ActionState::default()),
            streaming: Mutex::new(StreamingState::default()),
            batch_token: Mutex::new(CancellationToken::new()),
            observer,
        }
    }

    // ========== 对外动作入口 ==========

    /// 翻译单个块（可见流式路径）
    pub async fn translate_block(&self, index: usize, force: bool) -> EngineResult<ActionOutcome> {
        self.run_action(
            index,
            ActionKind::Translate,
            force,
            true,
            CancellationToken::new(),
        )
        .await
    }

    /// 解读单个块（可见流式路径）
    pub async fn explain_block(&self, index: usize, force: bool) -> EngineResult<ActionOutcome> {
        self.run_action(
            index,
            ActionKind::Explain,
            force,
            true,
            CancellationToken::new(),
        )
        .await
    }

    /// 后台翻译单个块（阻塞路径，批量任务用）
    ///
    /// 不触碰可见槽位，取消令牌由批量调度器提供。
    pub(crate) async fn translate_block_background(
        &self,
        index: usize,
        token: CancellationToken,
    ) -> EngineResult<ActionOutcome> {
        self.run_action(index, ActionKind::Translate, false, false, token)
            .await
    }

    /// 取消当前可见流
    ///
    /// 只向可见槽位对应动作的令牌发信号并清空显示状态，
    /// 后台批量任务持有各自独立的令牌，不受影响。
    pub fn cancel_action(&self) -> bool {
        let target = {
            let streaming = self.lock_streaming();
            // 已落账的槽位只剩显示内容，没有可取消的流
            if !streaming.is_streaming {
                None
            } else {
                streaming.streaming_block_index.zip(streaming.stream_kind)
            }
        };
        let Some((index, kind)) = target else {
            return false;
        };

        {
            let state = self.lock_state();
            if let Some(record) = state.active.get(&index) {
                // 同索引的登记只在动作种类也对得上时才是这条可见流
                if record.kind == kind {
                    record.token.cancel();
                }
            }
        }

        {
            let mut streaming = self.lock_streaming();
            if streaming.streaming_block_index == Some(index) {
                *streaming = StreamingState::default();
            }
        }

        debug!("[块 {}] 🛑 已发出{}取消信号", index, kind.name());
        true
    }

    /// 取消当前批量翻译
    ///
    /// 向批次父令牌发信号，所有在途批量任务的子令牌随之置位；
    /// 已取消的块照常计入批量进度。可见流不受影响。
    pub fn cancel_batch(&self) {
        self.current_batch_token().cancel();
        debug!("🛑 已发出批量翻译取消信号");
    }

    // ========== 状态查询与清理 ==========

    /// 取某个块的翻译结果
    pub fn translation(&self, index: usize) -> Option<String> {
        self.lock_state().translations.get(&index).cloned()
    }

    /// 取某个块的解读结果
    pub fn explanation(&self, index: usize) -> Option<String> {
        self.lock_state().explanations.get(&index).cloned()
    }

    /// 某个块是否有动作进行中
    pub fn is_block_pending(&self, index: usize) -> bool {
        self.lock_state().active.contains_key(&index)
    }

    /// 当前进行中的块索引（升序）
    pub fn pending_blocks(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = self.lock_state().active.keys().copied().collect();
        indices.sort_unstable();
        indices
    }

    /// 可见槽位快照
    pub fn streaming_state(&self) -> StreamingState {
        self.lock_streaming().clone()
    }

    /// 已翻译的块数量
    pub fn translated_count(&self) -> usize {
        self.lock_state().translations.len()
    }

    /// 删除某个块的翻译结果
    pub fn clear_translation(&self, index: usize) -> bool {
        self.lock_state().translations.remove(&index).is_some()
    }

    /// 删除某个块的解读结果
    pub fn clear_explanation(&self, index: usize) -> bool {
        self.lock_state().explanations.remove(&index).is_some()
    }

    /// 清空所有翻译结果
    pub fn clear_all_translations(&self) {
        self.lock_state().translations.clear();
    }

    /// 清空所有解读结果
    pub fn clear_all_explanations(&self) {
        self.lock_state().explanations.clear();
    }

    /// 清空所有翻译和解读结果
    pub fn clear_all(&self) {
        let mut state = self.lock_state();
        state.translations.clear();
        state.explanations.clear();
    }

    /// 会话持有的块
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// 导出所有块及其翻译结果
    pub fn export_blocks(&self) -> Vec<TranslatedBlock> {
        let state = self.lock_state();
        self.blocks
            .iter()
            .map(|block| TranslatedBlock {
                index: block.index,
                block_type: block.block_type,
                content: block.content.clone(),
                translation: state.translations.get(&block.index).cloned(),
            })
            .collect()
    }

    // ========== 批量调度器接口 ==========

    pub(crate) fn concurrency_limit(&self) -> usize {
        self.max_concurrent_blocks
    }

    pub(crate) fn retry_budget(&self) -> usize {
        self.max_retries
    }

    pub(crate) fn block_indices(&self) -> Vec<usize> {
        self.blocks.iter().map(|b| b.index).collect()
    }

    /// 换上新的批量父令牌并返回它，上一轮的取消信号不会带进下一轮
    pub(crate) fn swap_batch_token(&self) -> CancellationToken {
        let mut slot = self
            .batch_token
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        *slot = CancellationToken::new();
        slot.clone()
    }

    pub(crate) fn current_batch_token(&self) -> CancellationToken {
        self.batch_token
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    // ========== 动作主流程 ==========

    /// 执行一次块动作：守卫 → 登记 → 派发 → 落账
    async fn run_action(
        &self,
        index: usize,
        kind: ActionKind,
        force: bool,
        visible: bool,
        token: CancellationToken,
    ) -> EngineResult<ActionOutcome> {
        let ctx = ActionCtx::new(index, kind);

        // ========== 守卫检查 ==========
        if !self.translation_enabled {
            self.notify_skip(index, &format!("翻译功能已关闭，跳过{}", kind.name()));
            return Ok(ActionOutcome::Skipped);
        }

        let Some(block) = self.find_block(index).cloned() else {
            let err = EngineError::ContentMissing { index };
            self.observer.on_notice(index, &err.to_string());
            return Err(err);
        };

        if block.translation_source().trim().is_empty() {
            let err = EngineError::ContentMissing { index };
            self.observer.on_notice(index, &err.to_string());
            return Err(err);
        }

        // 守卫判定和登记必须在同一个锁区间内完成
        {
            let mut state = self.lock_state();

            if let Some(record) = state.active.get(&index) {
                let msg = format!(
                    "该块已有{}进行中，忽略本次{}",
                    record.kind.name(),
                    kind.name()
                );
                drop(state);
                self.notify_skip(index, &msg);
                return Ok(ActionOutcome::Skipped);
            }

            let has_result = match kind {
                ActionKind::Translate => state.translations.contains_key(&index),
                ActionKind::Explain => state.explanations.contains_key(&index),
            };
            if has_result && !force {
                drop(state);
                self.notify_skip(
                    index,
                    &format!("{}结果已存在，跳过（可强制重新生成）", kind.name()),
                );
                return Ok(ActionOutcome::Skipped);
            }

            state.active.insert(
                index,
                ActionRecord {
                    kind,
                    token: token.clone(),
                },
            );
        }
        let guard = ActionGuard {
            session: self,
            index,
        };

        // ========== 占用可见槽位 ==========
        if visible {
            let mut streaming = self.lock_streaming();
            *streaming = StreamingState {
                is_streaming: true,
                stream_content: String::new(),
                stream_kind: Some(kind),
                streaming_block_index: Some(index),
                error: None,
            };
        }

        // ========== 派发 ==========
        let result = if visible {
            let on_chunk = |chunk: &str, accumulated: &str| {
                self.publish_chunk(index, kind, chunk, accumulated);
            };
            match kind {
                ActionKind::Translate => {
                    self.flow.run_translate(&block, &ctx, &token, on_chunk).await
                }
                ActionKind::Explain => self.flow.run_explain(&block, &ctx, &token, on_chunk).await,
            }
        } else {
            self.flow.run_translate_blocking(&block, &ctx, &token).await
        };

        // 先注销登记再落账，观察者回调看到的一定是已结束的动作
        drop(guard);

        // ========== 落账 ==========
        match result {
            Ok(FlowOutcome::Done(text)) => {
                // 可见动作只有仍占有槽位时才落账；槽位已被后来的动作接管时
                // 什么都不存、静默收场，完成回调绝不补发
                if visible && !self.owns_slot(index, kind) {
                    debug!("[块 {}] 槽位已被接管，丢弃过期的{}结果", index, kind.name());
                    self.observer.on_cancelled(index, kind);
                    return Ok(ActionOutcome::Cancelled);
                }
                {
                    let mut state = self.lock_state();
                    match kind {
                        ActionKind::Translate => state.translations.insert(index, text.clone()),
                        ActionKind::Explain => state.explanations.insert(index, text.clone()),
                    };
                }
                if visible {
                    self.settle_slot(index, kind, |slot| {
                        slot.is_streaming = false;
                        slot.stream_content = text.clone();
                        slot.error = None;
                    });
                }
                self.observer.on_complete(index, kind, &text);
                Ok(ActionOutcome::Completed)
            }
            Ok(FlowOutcome::Cancelled) => {
                if visible {
                    self.settle_slot(index, kind, |slot| {
                        *slot = StreamingState::default();
                    });
                }
                self.observer.on_cancelled(index, kind);
                Ok(ActionOutcome::Cancelled)
            }
            Err(e) => {
                let message = e.to_string();
                if visible {
                    self.settle_slot(index, kind, |slot| {
                        slot.is_streaming = false;
                        slot.error = Some(message.clone());
                    });
                }
                self.observer.on_error(index, kind, &message);
                Err(e)
            }
        }
    }

    // ========== 内部辅助 ==========

    fn find_block(&self, index: usize) -> Option<&Block> {
        self.blocks.iter().find(|b| b.index == index)
    }

    fn lock_state(&self) -> MutexGuard<'_, ActionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_streaming(&self) -> MutexGuard<'_, StreamingState> {
        self.streaming.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 增量只在本动作仍占有可见槽位时发布出去
    fn publish_chunk(&self, index: usize, kind: ActionKind, chunk: &str, accumulated: &str) {
        let owns_slot = {
            let mut streaming = self.lock_streaming();
            if streaming.streaming_block_index == Some(index)
                && streaming.stream_kind == Some(kind)
            {
                streaming.stream_content = accumulated.to_string();
                true
            } else {
                false
            }
        };

        if owns_slot {
            self.observer.on_stream_chunk(index, chunk, accumulated);
        }
    }

    /// 本动作是否仍占有可见槽位
    fn owns_slot(&self, index: usize, kind: ActionKind) -> bool {
        let streaming = self.lock_streaming();
        streaming.streaming_block_index == Some(index) && streaming.stream_kind == Some(kind)
    }

    /// 落账时更新可见槽位，槽位已被后来的动作接管时不做任何修改
    fn settle_slot<F>(&self, index: usize, kind: ActionKind, update: F)
    where
        F: FnOnce(&mut StreamingState),
    {
        let mut streaming = self.lock_streaming();
        if streaming.streaming_block_index == Some(index) && streaming.stream_kind == Some(kind) {
            update(&mut streaming);
        }
    }

    fn notify_skip(&self, index: usize, message: &str) {
        debug!("[块 {}] {}", index, message);
        self.observer.on_notice(index, message);
    }
}

/// 动作登记的 RAII 守卫，离开作用域时注销登记
struct ActionGuard<'a> {
    session: &'a BlockSession,
    index: usize,
}

impl Drop for ActionGuard<'_> {
    fn drop(&mut self) {
        self.session.lock_state().active.remove(&self.index);
    }
}
