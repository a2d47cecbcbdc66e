//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责动作状态管理和批量调度，是整个引擎的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `session` - 块会话
//! - 持有一份文档的块列表和全部动作状态
//! - 守卫检查（功能开关 / 进行中 / 已有结果）
//! - 可见流式槽位管理
//! - 单块动作入口（翻译 / 解读 / 取消）
//!
//! ### `batch_runner` - 批量翻译调度器
//! - 固定宽度工作池（赛跑式补位）
//! - 单块重试与退避
//! - 失败隔离与进度回调
//!
//! ### `observer` - 动作观察者
//! - 流式增量和动作终态的交付通道
//!
//! ### `app` - 应用编排
//! - CLI 模式入口：扫描文档、逐份翻译、保存结果、汇总统计
//!
//! ## 层次关系
//!
//! ```text
//! app (处理 Vec<BlockDocument>)
//!     ↓
//! batch_runner (处理一份文档的 Vec<Block>)
//!     ↓
//! session (单块动作的状态机)
//!     ↓
//! workflow::BlockFlow (单个块的一次动作)
//!     ↓
//! services (能力层：检测 / 选型 / 提示词 / LLM / MT / 图片)
//!     ↓
//! infrastructure (基础设施：StreamConsumer)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一职责**：session 管状态，batch_runner 管调度，app 管生命周期
//! 2. **状态独占**：动作状态只归 session 所有，外部只能查询快照
//! 3. **向下依赖**：编排层 → workflow → services → infrastructure
//! 4. **无业务逻辑**：只做守卫、调度和统计，不做具体翻译判断

pub mod app;
pub mod batch_runner;
pub mod observer;
pub mod session;

// 重新导出主要类型
pub use app::App;
pub use batch_runner::{translate_all_blocks, BatchSummary};
pub use observer::{ActionObserver, LogObserver, NoopObserver};
pub use session::{ActionOutcome, BlockSession, StreamingState};
