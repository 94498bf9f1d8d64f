//! 代码评审 - 流程层
//!
//! 为"一个需求"的候选代码给出结论：
//! 构建 prompt → 调用模型 → `PASS` 前缀分类 → 写入需求库

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::error::AppResult;
use crate::infrastructure::RequirementStore;
use crate::models::ReviewVerdict;
use crate::services::ChatModel;
use crate::workflow::RequirementCtx;

/// 评审阶段的系统提示词
pub const REVIEW_SYSTEM_PROMPT: &str = "You are a Senior QA Lead. \
     If the code matches the requirement perfectly and completely, reply starting with 'PASS'. \
     Otherwise, reply 'FIX: [list issues]'.";

/// 代码评审 worker
#[derive(Clone)]
pub struct ReviewWorker {
    model: Arc<dyn ChatModel>,
    store: RequirementStore,
    model_id: String,
}

impl ReviewWorker {
    pub fn new(model: Arc<dyn ChatModel>, store: RequirementStore, model_id: impl Into<String>) -> Self {
        Self {
            model,
            store,
            model_id: model_id.into(),
        }
    }

    /// 评审单个需求的候选代码
    ///
    /// 结论（`approved` / `needs_fix`）和评审原文写入需求库；
    /// 模型调用失败时需求被标记为 `error` 并返回错误。
    pub async fn run(
        &self,
        user_actions: &str,
        code: &str,
        ctx: &RequirementCtx,
    ) -> AppResult<ReviewVerdict> {
        info!("{} 🔍 正在评审...", ctx);

        let prompt = build_review_prompt(user_actions, code);

        let text = match self
            .model
            .chat(&self.model_id, REVIEW_SYSTEM_PROMPT, &prompt)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                warn!("{} ⚠️ 评审调用失败: {}", ctx, e);
                if let Err(store_err) = self.store.mark_error(&ctx.req_id, &e.to_string()).await {
                    error!("{} 记录错误状态失败: {}", ctx, store_err);
                }
                return Err(e);
            }
        };

        let verdict = ReviewVerdict::from_text(text);

        if let Err(e) = self
            .store
            .update_review(&ctx.req_id, &verdict.text, verdict.status)
            .await
        {
            error!("{} ❌ 保存评审结果失败: {}", ctx, e);
            return Err(e.into());
        }

        if verdict.is_approved() {
            info!("{} ✅ 评审通过", ctx);
        } else {
            info!("{} ❌ 评审未通过，需要修复", ctx);
        }

        Ok(verdict)
    }
}

/// 构建评审阶段的用户提示词
pub fn build_review_prompt(user_actions: &str, code: &str) -> String {
    format!("CODE:\n{}\n\nREQUIREMENT:\n{}", code, user_actions)
}
