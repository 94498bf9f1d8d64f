//! # Req Test Gen
//!
//! 从需求文档生成 Playwright 测试代码，并通过"生成 → 评审"多轮迭代收敛
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有持久化资源，只暴露能力
//! - `RequirementStore` - 需求库（SQLite），需求状态的唯一权威来源
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单次请求
//! - `LlmService` - 调用兼容 OpenAI 的模型（实现 `ChatModel` 端口）
//! - `ArtifactWriter` - 写审计日志、测试套件和运行摘要
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个需求"在一轮中的处理
//! - `RequirementCtx` - 上下文封装（attempt + req_id）
//! - `GenerationWorker` - 生成候选代码
//! - `ReviewWorker` - 评审候选代码
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/app` - 应用入口，加载需求并输出统计
//! - `orchestrator/round_loop` - 多轮收敛循环
//! - `orchestrator/batch_executor` - 单阶段并发执行
//!
//! ## 模块结构

pub mod config;
pub mod error;
pub mod infrastructure;
pub mod logger;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use infrastructure::RequirementStore;
pub use models::{Requirement, RequirementDraft, RequirementStatus, ReviewVerdict};
pub use orchestrator::{App, Orchestrator, RunSummary};
pub use services::{ArtifactWriter, ChatModel, LlmService};
pub use workflow::{GenerationWorker, RequirementCtx, ReviewWorker};
