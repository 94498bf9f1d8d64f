//! 收敛循环 - 编排层
//!
//! ## 职责
//!
//! 按轮次驱动"生成 → 评审"，直到所有需求通过或达到最大轮次，然后导出。
//!
//! ## 单轮状态机
//!
//! ```text
//! ROUND_START → SELECT → GENERATE → REVIEW → UPDATE → (CONTINUE | STOP)
//! ```
//!
//! - **SELECT**：第 1 轮选择库中所有未通过的需求；之后只选择上一轮失败的编号
//! - **GENERATE**：批量生成，每个条目带上反馈表中该编号的评审意见（如有）
//! - **REVIEW**：只评审本轮成功生成代码的编号
//! - **UPDATE**：重建失败列表和反馈表。反馈只保留本轮的评审原文，不累积
//! - 生成或评审调用出错的编号同样进入下一轮（没有反馈）
//!
//! 生成阶段全部完成后才开始评审，轮与轮之间也不重叠。
//! 编排层从不直接写需求状态，状态只由 worker 写入。

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::AppResult;
use crate::infrastructure::RequirementStore;
use crate::models::{Requirement, ReviewVerdict};
use crate::orchestrator::batch_executor::run_batch;
use crate::services::{ArtifactWriter, ChatModel};
use crate::utils::logging::{log_round_complete, log_round_start, truncate_text};
use crate::workflow::{GenerationWorker, RequirementCtx, ReviewWorker};

/// 运行摘要文件名
pub const RUN_SUMMARY_FILE: &str = "run_summary.json";

/// 编排器的工作集（不持久化）
#[derive(Debug, Default, Clone)]
pub struct RoundState {
    /// 已开始的轮次
    pub attempt: usize,
    /// 上一轮仍未通过的需求编号
    pub failing_ids: Vec<String>,
    /// 上一轮 `needs_fix` 的评审原文，只在下一轮生成时使用一次
    pub feedback: HashMap<String, String>,
}

/// 单轮统计
#[derive(Debug, Clone, Default, Serialize)]
pub struct RoundReport {
    pub attempt: usize,
    pub selected: Vec<String>,
    pub generated: Vec<String>,
    pub approved: Vec<String>,
    pub needs_fix: Vec<String>,
    /// 生成或评审调用失败的编号
    pub errored: Vec<String>,
}

/// 循环结束的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopExit {
    /// 没有剩余的失败需求
    Converged,
    /// 达到最大轮次
    RoundLimit,
    /// 读取需求库失败，循环提前结束
    StoreUnavailable,
}

impl LoopExit {
    pub fn decide(store_failed: bool, failing_ids: &[String]) -> Self {
        if store_failed {
            Self::StoreUnavailable
        } else if failing_ids.is_empty() {
            Self::Converged
        } else {
            Self::RoundLimit
        }
    }
}

/// 整次运行的摘要
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub rounds_executed: usize,
    pub max_rounds: usize,
    pub exit: LoopExit,
    pub total: usize,
    pub approved_ids: Vec<String>,
    pub unresolved_ids: Vec<String>,
    pub suite_path: Option<String>,
    pub rounds: Vec<RoundReport>,
    pub finished_at: String,
}

impl RunSummary {
    pub fn approved_count(&self) -> usize {
        self.approved_ids.len()
    }
}

/// 编排器
///
/// 持有本次运行所需的全部依赖，配置在构造时显式传入。
pub struct Orchestrator {
    store: RequirementStore,
    generator: GenerationWorker,
    reviewer: ReviewWorker,
    artifacts: ArtifactWriter,
    max_rounds: usize,
    max_concurrent_workers: usize,
    verbose_logging: bool,
}

impl Orchestrator {
    pub fn new(
        config: &Config,
        store: RequirementStore,
        model: Arc<dyn ChatModel>,
        artifacts: ArtifactWriter,
    ) -> Self {
        Self {
            generator: GenerationWorker::new(
                model.clone(),
                store.clone(),
                config.llm_model_name.clone(),
            ),
            reviewer: ReviewWorker::new(model, store.clone(), config.llm_model_name.clone()),
            store,
            artifacts,
            max_rounds: config.max_rounds,
            max_concurrent_workers: config.max_concurrent_workers,
            verbose_logging: config.verbose_logging,
        }
    }

    /// 执行完整的收敛循环并导出结果
    pub async fn run(&self) -> AppResult<RunSummary> {
        let mut state = RoundState::default();
        let mut rounds = Vec::new();
        let mut store_failed = false;

        while state.attempt < self.max_rounds {
            state.attempt += 1;
            log_round_start(state.attempt, self.max_rounds);

            let requirements = match self.store.fetch_all().await {
                Ok(requirements) => requirements,
                Err(e) => {
                    error!("读取需求库失败，提前结束循环: {}", e);
                    store_failed = true;
                    break;
                }
            };

            let selected = select_requirements(&requirements, state.attempt, &state.failing_ids);
            if selected.is_empty() {
                info!("✅ 没有需要处理的需求，全部通过评审");
                break;
            }

            let report = self.run_round(&selected, &mut state).await;
            log_round_complete(&report);
            rounds.push(report);

            if state.failing_ids.is_empty() {
                info!("✅ 本轮之后所有需求均已通过");
                break;
            }
        }

        let exit = LoopExit::decide(store_failed, &state.failing_ids);
        match exit {
            LoopExit::StoreUnavailable => warn!(
                "⚠️ 第 {} 轮未能执行，仍有 {} 个需求未通过",
                state.attempt,
                state.failing_ids.len()
            ),
            LoopExit::RoundLimit => warn!(
                "⚠️ 达到最大轮次 {}，仍有 {} 个需求未通过",
                self.max_rounds,
                state.failing_ids.len()
            ),
            LoopExit::Converged => {}
        }

        self.export(rounds, exit).await
    }

    /// 执行一轮 GENERATE → REVIEW → UPDATE
    async fn run_round(&self, selected: &[Requirement], state: &mut RoundState) -> RoundReport {
        let attempt = state.attempt;

        // ========== GENERATE ==========
        let generation_items: Vec<_> = selected
            .iter()
            .map(|requirement| {
                let feedback = state
                    .feedback
                    .get(&requirement.req_id)
                    .cloned()
                    .unwrap_or_default();
                (requirement.req_id.clone(), (requirement.clone(), feedback))
            })
            .collect();

        let generator = self.generator.clone();
        let generated = run_batch(
            generation_items,
            self.max_concurrent_workers,
            move |req_id, (requirement, feedback): (Requirement, String)| {
                let generator = generator.clone();
                async move {
                    let ctx = RequirementCtx::new(attempt, req_id);
                    generator.run(&requirement, &feedback, &ctx).await
                }
            },
        )
        .await;

        // ========== REVIEW ==========
        let review_items: Vec<_> = selected
            .iter()
            .filter_map(|requirement| {
                generated.get(&requirement.req_id).map(|code| {
                    (
                        requirement.req_id.clone(),
                        (requirement.user_actions.clone(), code.clone()),
                    )
                })
            })
            .collect();

        let reviewer = self.reviewer.clone();
        let reviews = run_batch(
            review_items,
            self.max_concurrent_workers,
            move |req_id, (user_actions, code): (String, String)| {
                let reviewer = reviewer.clone();
                async move {
                    let ctx = RequirementCtx::new(attempt, req_id);
                    reviewer.run(&user_actions, &code, &ctx).await
                }
            },
        )
        .await;

        // ========== UPDATE ==========
        let mut report = RoundReport {
            attempt,
            selected: selected.iter().map(|r| r.req_id.clone()).collect(),
            ..Default::default()
        };
        let mut failing_ids = Vec::new();
        let mut feedback = HashMap::new();

        for requirement in selected {
            let req_id = &requirement.req_id;
            let code = generated.get(req_id);
            if code.is_some() {
                report.generated.push(req_id.clone());
            }

            match (code, reviews.get(req_id)) {
                (Some(code), Some(verdict)) => {
                    self.save_attempt_log(attempt, req_id, code, verdict).await;

                    if verdict.is_approved() {
                        report.approved.push(req_id.clone());
                    } else {
                        if self.verbose_logging {
                            log_rejection(attempt, req_id, code, verdict);
                        }
                        report.needs_fix.push(req_id.clone());
                        failing_ids.push(req_id.clone());
                        feedback.insert(req_id.clone(), verdict.text.clone());
                    }
                }
                _ => {
                    report.errored.push(req_id.clone());
                    failing_ids.push(req_id.clone());
                }
            }
        }

        state.failing_ids = failing_ids;
        state.feedback = feedback;
        report
    }

    async fn save_attempt_log(&self, attempt: usize, req_id: &str, code: &str, verdict: &ReviewVerdict) {
        if let Err(e) = self
            .artifacts
            .save_attempt_log(attempt, req_id, code, &verdict.text)
            .await
        {
            error!("[第 {} 轮 {}] 写入审计日志失败: {}", attempt, req_id, e);
        }
    }

    /// 导出所有已通过的需求，写运行摘要
    async fn export(&self, rounds: Vec<RoundReport>, exit: LoopExit) -> AppResult<RunSummary> {
        let approved = self.store.fetch_approved().await?;
        let all = self.store.fetch_all().await?;

        let suite_path = if approved.is_empty() {
            warn!(
                "⚠️ 没有任何测试通过评审，请查看 {} 中的审计日志",
                self.artifacts.output_dir().display()
            );
            None
        } else {
            let path = self.artifacts.export_final_suite(&approved).await?;
            info!("📄 最终测试套件已保存: {}", path.display());
            Some(path.display().to_string())
        };

        let approved_ids: Vec<String> = approved.into_iter().map(|(req_id, _)| req_id).collect();
        let unresolved_ids = all
            .iter()
            .filter(|r| !r.status.is_approved())
            .map(|r| r.req_id.clone())
            .collect();

        let summary = RunSummary {
            rounds_executed: rounds.len(),
            max_rounds: self.max_rounds,
            exit,
            total: all.len(),
            approved_ids,
            unresolved_ids,
            suite_path,
            rounds,
            finished_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        };

        if let Err(e) = self.artifacts.write_json(RUN_SUMMARY_FILE, &summary).await {
            error!("写入运行摘要失败: {}", e);
        }

        Ok(summary)
    }
}

/// SELECT：决定本轮要处理的需求
///
/// 第 1 轮选择所有未通过的需求，之后只选择上一轮失败列表中的编号。
/// 已通过的需求永远不会被再次选中。
pub fn select_requirements(
    requirements: &[Requirement],
    attempt: usize,
    failing_ids: &[String],
) -> Vec<Requirement> {
    requirements
        .iter()
        .filter(|r| !r.status.is_approved())
        .filter(|r| attempt == 1 || failing_ids.contains(&r.req_id))
        .cloned()
        .collect()
}

fn log_rejection(attempt: usize, req_id: &str, code: &str, verdict: &ReviewVerdict) {
    info!("[第 {} 轮 {}] 评审意见:\n{}", attempt, req_id, verdict.text);
    info!(
        "[第 {} 轮 {}] 当前代码（前 1000 字符）:\n{}",
        attempt,
        req_id,
        truncate_text(code, 1000)
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RequirementStatus;

    fn requirement(id: &str, status: RequirementStatus) -> Requirement {
        Requirement {
            req_id: id.to_string(),
            feature_name: id.to_string(),
            description: String::new(),
            preconditions: String::new(),
            user_actions: id.to_string(),
            expected_behavior: String::new(),
            validation_handling: String::new(),
            full_content: id.to_string(),
            status,
            generated_code: None,
            review_result: None,
            created_at: String::new(),
        }
    }

    fn ids(requirements: &[Requirement]) -> Vec<&str> {
        requirements.iter().map(|r| r.req_id.as_str()).collect()
    }

    #[test]
    fn test_first_round_selects_everything_not_approved() {
        let all = vec![
            requirement("FR-1", RequirementStatus::Pending),
            requirement("FR-2", RequirementStatus::Approved),
            requirement("FR-3", RequirementStatus::NeedsFix),
        ];

        assert_eq!(ids(&select_requirements(&all, 1, &[])), vec!["FR-1", "FR-3"]);
    }

    #[test]
    fn test_later_rounds_select_only_failing_ids() {
        let all = vec![
            requirement("FR-1", RequirementStatus::NeedsFix),
            requirement("FR-2", RequirementStatus::Error),
            requirement("FR-3", RequirementStatus::NeedsFix),
        ];
        let failing = vec!["FR-3".to_string(), "FR-2".to_string()];

        assert_eq!(ids(&select_requirements(&all, 2, &failing)), vec!["FR-2", "FR-3"]);
        assert!(select_requirements(&all, 2, &[]).is_empty());
    }

    #[test]
    fn test_store_failure_is_not_reported_as_round_limit() {
        let failing = vec!["FR-1".to_string()];

        assert_eq!(LoopExit::decide(true, &failing), LoopExit::StoreUnavailable);
        assert_eq!(LoopExit::decide(true, &[]), LoopExit::StoreUnavailable);
        assert_eq!(LoopExit::decide(false, &failing), LoopExit::RoundLimit);
        assert_eq!(LoopExit::decide(false, &[]), LoopExit::Converged);
    }
}
