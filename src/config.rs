//! 程序配置
//!
//! 配置作为显式的值传入 `App` / `Orchestrator`，不使用进程级全局变量。
//!
//! 加载顺序：默认值 → TOML 配置文件（`CONFIG_FILE`，可选）→ 环境变量覆盖

use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::ConfigError;

/// 程序配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 需求文档（已提取的纯文本）路径
    pub document_path: String,
    /// SQLite 数据库路径
    pub db_path: String,
    /// 产物输出目录
    pub output_dir: String,
    /// 最大轮次（硬上限）
    pub max_rounds: usize,
    /// 每个阶段同时调用模型的最大数量
    pub max_concurrent_workers: usize,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            document_path: "Requirement.txt".to_string(),
            db_path: "requirements.db".to_string(),
            output_dir: "outputs".to_string(),
            max_rounds: 3,
            max_concurrent_workers: 2,
            verbose_logging: false,
            llm_api_key: String::new(),
            llm_api_base_url: "http://localhost:11434/v1".to_string(),
            llm_model_name: "qwen2.5-coder:1.5b".to_string(),
            temperature: 0.2,
            max_tokens: 2048,
        }
    }
}

impl Config {
    /// 从配置文件（可选）和环境变量加载配置
    pub fn load() -> Result<Self, ConfigError> {
        let base = match std::env::var("CONFIG_FILE") {
            Ok(path) => Self::from_toml_file(&path)?,
            Err(_) => Self::default(),
        };
        let config = base.with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// 从 TOML 文件加载配置，缺失的字段使用默认值
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::InvalidValue {
            field: "CONFIG_FILE".to_string(),
            reason: format!("无法读取 {}: {}", path.display(), e),
        })?;
        Self::from_toml_str(&content).map_err(|source| ConfigError::TomlParseFailed {
            path: path.display().to_string(),
            source,
        })
    }

    /// 从 TOML 文本解析配置
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// 用环境变量覆盖已有配置
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        Ok(Self {
            document_path: env_string("REQUIREMENT_DOC").unwrap_or(self.document_path),
            db_path: env_string("DB_PATH").unwrap_or(self.db_path),
            output_dir: env_string("OUTPUT_DIR").unwrap_or(self.output_dir),
            max_rounds: env_parsed("MAX_ROUNDS", "usize")?.unwrap_or(self.max_rounds),
            max_concurrent_workers: env_parsed("MAX_CONCURRENT_WORKERS", "usize")?
                .unwrap_or(self.max_concurrent_workers),
            verbose_logging: env_parsed("VERBOSE_LOGGING", "bool")?
                .unwrap_or(self.verbose_logging),
            llm_api_key: env_string("LLM_API_KEY").unwrap_or(self.llm_api_key),
            llm_api_base_url: env_string("LLM_API_BASE_URL").unwrap_or(self.llm_api_base_url),
            llm_model_name: env_string("LLM_MODEL_NAME").unwrap_or(self.llm_model_name),
            temperature: env_parsed("LLM_TEMPERATURE", "f32")?.unwrap_or(self.temperature),
            max_tokens: env_parsed("LLM_MAX_TOKENS", "u32")?.unwrap_or(self.max_tokens),
        })
    }

    /// 校验配置
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_rounds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_rounds".to_string(),
                reason: "至少需要 1 轮".to_string(),
            });
        }
        if self.max_concurrent_workers == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_concurrent_workers".to_string(),
                reason: "并发数必须大于 0".to_string(),
            });
        }
        Ok(())
    }
}

fn env_string(var_name: &str) -> Option<String> {
    std::env::var(var_name).ok().filter(|v| !v.is_empty())
}

fn env_parsed<T: FromStr>(var_name: &str, expected_type: &str) -> Result<Option<T>, ConfigError> {
    match env_string(var_name) {
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::EnvVarParseFailed {
                var_name: var_name.to_string(),
                value,
                expected_type: expected_type.to_string(),
            }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.max_rounds, 3);
        assert_eq!(config.max_concurrent_workers, 2);
        tokio_test::assert_ok!(config.validate());
    }

    #[test]
    fn test_toml_missing_fields_fall_back_to_defaults() {
        let config = Config::from_toml_str(
            r#"
            max_rounds = 5
            llm_model_name = "deepseek-r1:1.5b"
            "#,
        )
        .unwrap();

        assert_eq!(config.max_rounds, 5);
        assert_eq!(config.llm_model_name, "deepseek-r1:1.5b");
        assert_eq!(config.db_path, "requirements.db");
        assert_eq!(config.max_concurrent_workers, 2);
    }

    #[test]
    fn test_validate_rejects_zero_rounds_and_workers() {
        let config = Config {
            max_rounds: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "max_rounds"
        ));

        let config = Config {
            max_concurrent_workers: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
