//! 代码生成 - 流程层
//!
//! 为"一个需求"生成候选测试代码：
//! 构建 prompt → 调用模型 → 去掉 markdown 代码块 → 写入需求库
//!
//! 只负责生成，不判断通过与否。

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::error::AppResult;
use crate::infrastructure::RequirementStore;
use crate::models::Requirement;
use crate::services::ChatModel;
use crate::utils::logging::truncate_text;
use crate::workflow::RequirementCtx;

/// 生成阶段的系统提示词
pub const GENERATION_SYSTEM_PROMPT: &str = "You are an expert Playwright SDET. \
     You must follow the provided requirement fields strictly. \
     Return ONLY raw TypeScript code. No markdown, no explanations.";

/// 代码生成 worker
#[derive(Clone)]
pub struct GenerationWorker {
    model: Arc<dyn ChatModel>,
    store: RequirementStore,
    model_id: String,
}

impl GenerationWorker {
    pub fn new(model: Arc<dyn ChatModel>, store: RequirementStore, model_id: impl Into<String>) -> Self {
        Self {
            model,
            store,
            model_id: model_id.into(),
        }
    }

    /// 为单个需求生成代码
    ///
    /// 成功时代码已写入需求库且状态为 `code_generated`。
    /// 模型调用失败时需求被标记为 `error` 并返回错误。
    pub async fn run(
        &self,
        requirement: &Requirement,
        feedback: &str,
        ctx: &RequirementCtx,
    ) -> AppResult<String> {
        if feedback.is_empty() {
            info!("{} ✍️ 正在生成测试代码...", ctx);
        } else {
            info!("{} 🔧 根据评审意见修复代码...", ctx);
        }

        let prompt = build_generation_prompt(requirement, feedback);

        let response = match self
            .model
            .chat(&self.model_id, GENERATION_SYSTEM_PROMPT, &prompt)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("{} ⚠️ 代码生成失败: {}", ctx, e);
                if let Err(store_err) = self.store.mark_error(&ctx.req_id, &e.to_string()).await {
                    error!("{} 记录错误状态失败: {}", ctx, store_err);
                }
                return Err(e);
            }
        };

        let code = strip_code_fences(&response);

        if let Err(e) = self.store.update_code(&ctx.req_id, &code).await {
            error!("{} ❌ 保存生成代码失败: {}", ctx, e);
            return Err(e.into());
        }

        info!(
            "{} ✓ 代码已生成 ({} 字符): {}",
            ctx,
            code.chars().count(),
            truncate_text(code.lines().next().unwrap_or_default(), 60)
        );

        Ok(code)
    }
}

/// 构建生成阶段的用户提示词
///
/// 需求的五个字段逐条列出；`feedback` 为空时写 `None.`
pub fn build_generation_prompt(requirement: &Requirement, feedback: &str) -> String {
    let feedback = if feedback.trim().is_empty() {
        "None."
    } else {
        feedback
    };

    format!(
        r#"### STRICT REQUIREMENT TRACEABILITY TASK ###
Requirement Reference: {req_id}
Feature Name: {feature_name}

You must generate a Playwright TypeScript test covering every element:
1. DESCRIPTION: {description}
2. PRECONDITIONS: {preconditions}
3. USER ACTIONS: {user_actions}
4. EXPECTED BEHAVIOR: {expected_behavior}
5. VALIDATION/ERROR HANDLING: {validation_handling}

FEEDBACK TO FIX (fix these specific issues): {feedback}

OUTPUT: Raw TypeScript only. Start with: import {{ test, expect }} from '@playwright/test';"#,
        req_id = requirement.req_id,
        feature_name = requirement.feature_name,
        description = requirement.description,
        preconditions = requirement.preconditions,
        user_actions = requirement.user_actions,
        expected_behavior = requirement.expected_behavior,
        validation_handling = requirement.validation_handling,
        feedback = feedback,
    )
}

/// 去掉模型输出中的 markdown 代码块标记
pub fn strip_code_fences(text: &str) -> String {
    text.replace("```typescript", "")
        .replace("```ts", "")
        .replace("```", "")
        .trim()
        .to_string()
}
