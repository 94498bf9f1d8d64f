//! 应用入口 - 编排层
//!
//! ## 职责
//!
//! 1. **应用初始化**：打开需求库、创建模型客户端、初始化运行日志
//! 2. **需求加载**：读取需求文档，切分后写入需求库
//! 3. **收敛循环**：委托 `Orchestrator` 执行多轮生成与评审
//! 4. **全局统计**：输出摘要并追加到运行日志
//!
//! 只有输入、配置和打开需求库的失败会让程序以非零状态退出；
//! 循环中的单条失败都只记录日志。

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::infrastructure::RequirementStore;
use crate::models::{load_requirements_from_document, RequirementDraft};
use crate::orchestrator::{Orchestrator, RunSummary};
use crate::services::artifact_writer::RUN_LOG_FILE;
use crate::services::{ArtifactWriter, ChatModel, LlmService};
use crate::utils::logging::{
    format_summary_line, log_requirements_loaded, log_startup, print_final_stats,
};

/// 应用主结构
pub struct App {
    config: Config,
    store: RequirementStore,
    model: Arc<dyn ChatModel>,
    artifacts: ArtifactWriter,
}

impl App {
    /// 初始化应用（使用真实的 LLM 服务）
    pub async fn initialize(config: Config) -> Result<Self> {
        let model: Arc<dyn ChatModel> = Arc::new(LlmService::new(&config));
        Self::with_model(config, model).await
    }

    /// 使用指定的模型端口初始化应用
    pub async fn with_model(config: Config, model: Arc<dyn ChatModel>) -> Result<Self> {
        log_startup(&config);

        let artifacts = ArtifactWriter::new(&config.output_dir);
        if let Err(e) = artifacts.init_run_log().await {
            warn!("⚠️ 初始化运行日志失败: {}", e);
        }

        // 打开需求库（失败即退出）
        let store = RequirementStore::open(&config.db_path)
            .with_context(|| format!("无法打开需求库: {}", config.db_path))?;
        info!("✓ 需求库已就绪: {}", config.db_path);

        Ok(Self {
            config,
            store,
            model,
            artifacts,
        })
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> Result<RunSummary> {
        // 加载需求文档（没有任何需求即退出）
        let drafts = load_requirements_from_document(Path::new(&self.config.document_path)).await?;
        let stored = self.store_requirements(&drafts).await;
        log_requirements_loaded(drafts.len(), stored);
        match self.store.count().await {
            Ok(total) => info!("📚 需求库中共有 {} 个需求", total),
            Err(e) => warn!("⚠️ 统计需求数量失败: {}", e),
        }

        let orchestrator = Orchestrator::new(
            &self.config,
            self.store.clone(),
            self.model.clone(),
            self.artifacts.clone(),
        );
        let summary = orchestrator.run().await.context("导出结果失败")?;

        if let Err(e) = self.artifacts.append_run_log(&format_summary_line(&summary)).await {
            warn!("⚠️ 写入运行日志失败: {}", e);
        }

        let log_path = self.artifacts.output_dir().join(RUN_LOG_FILE);
        print_final_stats(&summary, &log_path.display().to_string());

        Ok(summary)
    }

    /// 写入需求库，返回成功数量
    async fn store_requirements(&self, drafts: &[RequirementDraft]) -> usize {
        let mut stored = 0;
        for draft in drafts {
            match self.store.upsert_requirement(draft).await {
                Ok(()) => stored += 1,
                Err(e) => error!("[{}] 写入需求库失败: {}", draft.req_id, e),
            }
        }
        stored
    }
}
