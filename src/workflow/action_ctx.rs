//! 块动作上下文
//!
//! 封装"我正在对哪个块执行什么动作"这一信息

use std::fmt::Display;

/// 块动作类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// 翻译
    Translate,
    /// 解读
    Explain,
}

impl ActionKind {
    /// 返回动作中文名称
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::Translate => "翻译",
            ActionKind::Explain => "解读",
        }
    }
}

impl Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// 块动作上下文
///
/// 包含执行单个块动作所需的上下文信息
#[derive(Debug, Clone, Copy)]
pub struct ActionCtx {
    /// 块索引
    pub block_index: usize,

    /// 动作类型
    pub kind: ActionKind,
}

impl ActionCtx {
    /// 创建新的动作上下文
    pub fn new(block_index: usize, kind: ActionKind) -> Self {
        Self { block_index, kind }
    }
}

impl Display for ActionCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[块 {} {}]", self.block_index, self.kind.name())
    }
}
