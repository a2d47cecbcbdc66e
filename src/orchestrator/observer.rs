//! 动作观察者 - 编排层
//!
//! 会话通过观察者把流式增量和动作终态交付给上层（CLI、界面、测试）。

use tracing::{error, info};

use crate::workflow::action_ctx::ActionKind;

/// 动作事件观察者
///
/// 所有方法都有空默认实现，观察者只需要实现自己关心的事件。
pub trait ActionObserver: Send + Sync {
    /// 流式增量到达（只有占有可见槽位的动作会触发）
    fn on_stream_chunk(&self, _block_index: usize, _chunk: &str, _accumulated: &str) {}

    /// 动作成功完成，结果已写入会话
    fn on_complete(&self, _block_index: usize, _kind: ActionKind, _result: &str) {}

    /// 动作失败
    fn on_error(&self, _block_index: usize, _kind: ActionKind, _message: &str) {}

    /// 动作被取消（不算失败，不附带错误）
    fn on_cancelled(&self, _block_index: usize, _kind: ActionKind) {}

    /// 轻量提示（守卫拒绝、内容缺失等非错误情况）
    fn on_notice(&self, _block_index: usize, _message: &str) {}
}

/// 不产生任何输出的观察者
#[derive(Debug, Default)]
pub struct NoopObserver;

impl ActionObserver for NoopObserver {}

/// 把动作终态写入日志的观察者（CLI 模式用）
#[derive(Debug, Default)]
pub struct LogObserver;

impl ActionObserver for LogObserver {
    fn on_complete(&self, block_index: usize, kind: ActionKind, result: &str) {
        info!(
            "[块 {}] ✅ {}完成，共 {} 字符",
            block_index,
            kind.name(),
            result.chars().count()
        );
    }

    fn on_error(&self, block_index: usize, kind: ActionKind, message: &str) {
        error!("[块 {}] ❌ {}失败: {}", block_index, kind.name(), message);
    }

    fn on_cancelled(&self, block_index: usize, kind: ActionKind) {
        info!("[块 {}] {}已取消", block_index, kind.name());
    }

    fn on_notice(&self, block_index: usize, message: &str) {
        info!("[块 {}] 💡 {}", block_index, message);
    }
}
