//! LLM 服务 - 业务能力层
//!
//! 只负责"调用模型"能力，不关心流程
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点和模型
//! - 兼容 OpenAI API 的服务（如 Ollama, Azure, DeepSeek 等）

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult, LlmError};

/// 模型端口
///
/// `chat(model_id, system_prompt, user_prompt) → response_text`
///
/// 失败以 `Err` 返回，由发起调用的 worker 捕获，不会继续向上传播。
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn chat(&self, model_id: &str, system_prompt: &str, user_prompt: &str)
        -> AppResult<String>;
}

/// LLM 服务
///
/// 职责：
/// - 调用兼容 OpenAI 的 chat completion 接口
/// - 只处理单次请求
/// - 不认识需求、不关心轮次
pub struct LlmService {
    client: Client<OpenAIConfig>,
    temperature: f32,
    max_tokens: u32,
}

impl LlmService {
    /// 创建新的 LLM 服务
    pub fn new(config: &Config) -> Self {
        // 配置 OpenAI 客户端（兼容 OpenAI API 的服务）
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        Self {
            client: Client::with_config(openai_config),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    /// 构建请求消息列表
    fn build_messages(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> AppResult<Vec<ChatCompletionRequestMessage>> {
        let system_msg = ChatCompletionRequestSystemMessageArgs::default()
            .content(system_prompt)
            .build()
            .map_err(|e| LlmError::RequestBuildFailed(e.to_string()))?;

        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(user_prompt)
            .build()
            .map_err(|e| LlmError::RequestBuildFailed(e.to_string()))?;

        Ok(vec![
            ChatCompletionRequestMessage::System(system_msg),
            ChatCompletionRequestMessage::User(user_msg),
        ])
    }
}

#[async_trait]
impl ChatModel for LlmService {
    async fn chat(
        &self,
        model_id: &str,
        system_prompt: &str,
        user_prompt: &str,
    ) -> AppResult<String> {
        debug!("调用 LLM API，模型: {}", model_id);
        debug!("用户消息长度: {} 字符", user_prompt.len());

        let messages = self.build_messages(system_prompt, user_prompt)?;

        // 构建请求
        let request = CreateChatCompletionRequestArgs::default()
            .model(model_id)
            .messages(messages)
            .temperature(self.temperature)
            .max_completion_tokens(self.max_tokens)
            .build()
            .map_err(|e| LlmError::RequestBuildFailed(e.to_string()))?;

        // 调用 API（不设超时，慢调用会一直占用 worker 名额直到返回）
        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            AppError::llm_api_failed(model_id, e)
        })?;

        debug!("LLM API 调用成功");

        // 提取响应内容
        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| LlmError::EmptyContent {
                model: model_id.to_string(),
            })?;

        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_service() -> LlmService {
        LlmService::new(&Config {
            llm_api_base_url: "http://127.0.0.1:9/v1".to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn test_build_messages_has_system_then_user() {
        let service = create_test_service();
        let messages = service.build_messages("你是评审", "CODE: x").unwrap();

        assert_eq!(messages.len(), 2);
        assert!(matches!(messages[0], ChatCompletionRequestMessage::System(_)));
        assert!(matches!(messages[1], ChatCompletionRequestMessage::User(_)));
    }

    /// 需要本地运行兼容 OpenAI 的服务，手动执行：
    /// ```bash
    /// LLM_API_BASE_URL=http://localhost:11434/v1 cargo test test_chat_live -- --ignored --nocapture
    /// ```
    #[tokio::test]
    #[ignore]
    async fn test_chat_live() {
        let _ = tracing_subscriber::fmt::try_init();

        let config = Config::load().expect("配置加载失败");
        let service = LlmService::new(&config);

        let response = service
            .chat(
                &config.llm_model_name,
                "You are a terse assistant.",
                "Reply with the single word PASS.",
            )
            .await
            .expect("LLM 调用失败");

        println!("LLM 响应: {}", response);
        assert!(!response.is_empty());
    }
}
