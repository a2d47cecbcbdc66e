//! 批量翻译调度器 - 编排层
//!
//! ## 职责
//!
//! 本模块把一份文档的所有块推过翻译流程，是批量模式的"指挥中心"。
//!
//! ## 核心功能
//!
//! 1. **固定宽度工作池**：在途任务数始终压在并发上限以内
//! 2. **赛跑式补位**：谁先落账谁先腾位置，不做整批栅栏等待
//! 3. **单块重试**：传输类失败按 1s / 2s 退避重试，最多尝试配置的次数
//! 4. **失败隔离**：重试耗尽只记日志并计入已处理，不向调用方传播
//! 5. **进度回调**：每有一个块落账就回调一次 `(completed, total)`
//!
//! ## 设计特点
//!
//! - 批量路径只走阻塞派发，从不触碰可见流式槽位
//! - 每个块任务挂在批次父令牌下，取消批次即取消全部在途任务
//! - 调度器每次决策都向会话查询最新状态，不在任务创建时抓快照

use std::collections::VecDeque;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::orchestrator::session::{ActionOutcome, BlockSession};

/// 首次退避时长，之后每次翻倍
const BACKOFF_BASE_SECS: u64 = 1;

/// 单个块在批量模式下的最终归类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockOutcome {
    /// 拿到翻译结果
    Succeeded,
    /// 结果已存在或被守卫拒绝，未发起新工作
    Skipped,
    /// 重试耗尽或命中不可重试失败
    Failed,
    /// 批次被取消
    Cancelled,
}

/// 一次批量翻译的汇总
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl BatchSummary {
    fn record(&mut self, outcome: BlockOutcome) {
        match outcome {
            BlockOutcome::Succeeded => self.succeeded += 1,
            BlockOutcome::Skipped => self.skipped += 1,
            BlockOutcome::Failed => self.failed += 1,
            BlockOutcome::Cancelled => self.cancelled += 1,
        }
    }
}

/// 翻译会话里的全部块
///
/// 待办队列 + 在途集合：在途集合不满就从队列补位，然后等最先落账的
/// 那一个，再继续补位。稳态下在途任务数恰好等于并发上限。
///
/// 每个块落账（成功、跳过、失败、取消均算）都会触发一次
/// `on_progress(completed, total)`，completed 严格加一递增，最终到达 total。
pub async fn translate_all_blocks<F>(session: &BlockSession, mut on_progress: F) -> BatchSummary
where
    F: FnMut(usize, usize),
{
    let indices = session.block_indices();
    let total = indices.len();
    let limit = session.concurrency_limit();
    let batch_token = session.swap_batch_token();

    let mut summary = BatchSummary {
        total,
        ..Default::default()
    };

    if total == 0 {
        info!("📋 没有待翻译的块，批量翻译结束");
        return summary;
    }

    log_batch_start(total, limit);

    let mut pending: VecDeque<usize> = indices.into();
    let mut executing = FuturesUnordered::new();
    let mut completed = 0usize;

    while !pending.is_empty() || !executing.is_empty() {
        // 补位到并发上限
        while executing.len() < limit {
            let Some(index) = pending.pop_front() else {
                break;
            };
            let token = batch_token.child_token();
            executing.push(async move {
                let outcome = translate_with_retry(session, index, token).await;
                (index, outcome)
            });
        }

        // 等最先落账的任务
        let Some((index, outcome)) = executing.next().await else {
            break;
        };

        completed += 1;
        summary.record(outcome);
        debug!(
            "[块 {}] 批量进度 {}/{} ({:?})",
            index, completed, total, outcome
        );
        on_progress(completed, total);
    }

    log_batch_complete(&summary);
    summary
}

/// 带重试的单块翻译
///
/// 结果已存在时立即短路跳过；传输类失败按 2^(attempt-1) 秒退避后重试；
/// 校验类失败重试也不会有不同结果，一次就判死。无论成败，调用方都把
/// 这个块计入已处理。
async fn translate_with_retry(
    session: &BlockSession,
    index: usize,
    token: CancellationToken,
) -> BlockOutcome {
    // 幂等短路：已有结果的块不再发起任何调用
    if session.translation(index).is_some() {
        debug!("[块 {}] 已有翻译结果，跳过", index);
        return BlockOutcome::Skipped;
    }

    let budget = session.retry_budget();

    for attempt in 1..=budget {
        if token.is_cancelled() {
            return BlockOutcome::Cancelled;
        }

        match session
            .translate_block_background(index, token.child_token())
            .await
        {
            Ok(ActionOutcome::Completed) => return BlockOutcome::Succeeded,
            Ok(ActionOutcome::Skipped) => return BlockOutcome::Skipped,
            Ok(ActionOutcome::Cancelled) => return BlockOutcome::Cancelled,
            Err(e) if !e.is_retryable() => {
                error!("[块 {}] ❌ 翻译失败（不可重试）: {}", index, e);
                return BlockOutcome::Failed;
            }
            Err(e) => {
                if attempt == budget {
                    error!("[块 {}] ❌ 重试 {} 次后仍失败: {}", index, budget, e);
                    return BlockOutcome::Failed;
                }
                let delay = BACKOFF_BASE_SECS << (attempt - 1);
                warn!(
                    "[块 {}] ⚠️ 第 {} 次尝试失败: {}，{}s 后重试",
                    index, attempt, e, delay
                );
                tokio::select! {
                    _ = token.cancelled() => return BlockOutcome::Cancelled,
                    _ = tokio::time::sleep(Duration::from_secs(delay)) => {}
                }
            }
        }
    }

    BlockOutcome::Failed
}

// ========== 日志辅助函数 ==========

fn log_batch_start(total: usize, limit: usize) {
    info!("{}", "=".repeat(60));
    info!("📦 开始批量翻译: 共 {} 个块", total);
    info!("📊 最大并发数: {}", limit);
    info!("{}", "=".repeat(60));
}

fn log_batch_complete(summary: &BatchSummary) {
    info!("{}", "─".repeat(60));
    info!(
        "✓ 批量翻译完成: 成功 {} / 跳过 {} / 失败 {} / 取消 {} / 共 {}",
        summary.succeeded, summary.skipped, summary.failed, summary.cancelled, summary.total
    );
    info!("{}", "─".repeat(60));
}
