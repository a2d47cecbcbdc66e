//! # Block Translator
//!
//! 一个面向文档内容块的按需翻译 / 解读编排引擎
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（chunk 通道读端），只暴露能力
//! - `StreamConsumer` - 唯一的流读端 owner，提供增量消费能力
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单个 Block
//! - `LangDetector` - 语言检测能力
//! - `EngineSelector` - MT / LLM 引擎选型能力
//! - `PromptBuilder` - 提示词构建能力
//! - `ChatBackend` / `MtBackend` / `ImageEmbedder` - 三个后端能力
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个块"的一次动作的完整流程
//! - `ActionCtx` - 上下文封装（block_index + kind）
//! - `BlockFlow` - 流程编排（检测 → 选型 → 构建 → 派发 → 回退）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/session` - 块会话，单块动作的状态机
//! - `orchestrator/batch_runner` - 批量翻译调度器，固定宽度工作池
//! - `orchestrator/app` - CLI 应用入口，逐文档翻译和统计
//!
//! ## 模块结构

pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{EngineError, EngineResult};
pub use infrastructure::StreamConsumer;
pub use models::block::{Block, BlockDocument, BlockType};
pub use orchestrator::{
    translate_all_blocks, ActionObserver, ActionOutcome, App, BatchSummary, BlockSession,
    StreamingState,
};
pub use services::{ChatBackend, Engine, ImageEmbedder, LangDetector, MtBackend};
pub use workflow::{ActionCtx, ActionKind, BlockFlow, FlowOutcome};
