//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量执行和轮次调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `app` - 应用入口
//! - 管理应用生命周期（初始化、运行）
//! - 加载需求文档并写入需求库
//! - 输出全局统计信息
//!
//! ### `round_loop` - 收敛循环
//! - 每轮 SELECT → GENERATE → REVIEW → UPDATE
//! - 维护失败列表和反馈表
//! - 达到最大轮次或全部通过后导出
//!
//! ### `batch_executor` - 批量执行器
//! - 控制并发数量（Semaphore）
//! - 单条失败不影响整批
//!
//! ## 层次关系
//!
//! ```text
//! app (加载需求 → 运行 → 统计)
//!     ↓
//! round_loop (多轮调度)
//!     ↓
//! batch_executor (单阶段并发)
//!     ↓
//! workflow::GenerationWorker / ReviewWorker (处理单个需求)
//!     ↓
//! services (能力层：llm / artifact)
//!     ↓
//! infrastructure (基础设施：RequirementStore)
//! ```

pub mod app;
pub mod batch_executor;
pub mod round_loop;

// 重新导出主要类型
pub use app::App;
pub use batch_executor::run_batch;
pub use round_loop::{
    select_requirements, LoopExit, Orchestrator, RoundReport, RoundState, RunSummary, RUN_SUMMARY_FILE,
};
