use thiserror::Error;

use crate::models::RequirementStatus;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 需求库错误
    #[error("需求库错误: {0}")]
    Store(#[from] StoreError),
    /// LLM 服务错误
    #[error("LLM错误: {0}")]
    Llm(#[from] LlmError),
    /// 文件操作错误
    #[error("文件错误: {0}")]
    File(#[from] FileError),
    /// 输入文档错误
    #[error("输入错误: {0}")]
    Input(#[from] InputError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
}

/// 需求库（SQLite）错误
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite 操作失败
    #[error("SQLite 操作失败: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// 无法创建数据库目录
    #[error("无法创建数据库目录: {0}")]
    Io(#[from] std::io::Error),
    /// 需求不存在
    #[error("需求不存在: {0}")]
    NotFound(String),
    /// 非法的状态迁移
    #[error("需求 {req_id} 不允许从 {from} 迁移到 {to}")]
    InvalidTransition {
        req_id: String,
        from: RequirementStatus,
        to: RequirementStatus,
    },
    /// 数据库中出现未知状态值
    #[error("未知的需求状态: {0}")]
    UnknownStatus(String),
    /// 阻塞任务执行失败
    #[error("数据库任务执行失败: {0}")]
    Join(String),
}

/// LLM 服务错误
#[derive(Debug, Error)]
pub enum LlmError {
    /// API 调用失败
    #[error("LLM API调用失败 (模型: {model}): {source}")]
    ApiCallFailed {
        model: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 请求构建失败
    #[error("LLM 请求构建失败: {0}")]
    RequestBuildFailed(String),
    /// 返回内容为空
    #[error("LLM返回内容为空 (模型: {model})")]
    EmptyContent { model: String },
}

/// 文件操作错误
#[derive(Debug, Error)]
pub enum FileError {
    /// 读取文件失败
    #[error("读取文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 写入文件失败
    #[error("写入文件失败 ({path}): {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 序列化失败
    #[error("序列化失败 ({path}): {source}")]
    SerializeFailed {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// 输入文档错误
#[derive(Debug, Error)]
pub enum InputError {
    /// 文档中没有找到任何需求
    #[error("文档中没有找到任何需求: {path}")]
    NoRequirements { path: String },
    /// 不支持的文档格式
    #[error("不支持的文档格式 (请先提取为纯文本): {path}")]
    UnsupportedDocument { path: String },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 配置文件解析失败
    #[error("配置文件解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    /// 配置值非法
    #[error("配置项 {field} 非法: {reason}")]
    InvalidValue { field: String, reason: String },
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建LLM API调用错误
    pub fn llm_api_failed(
        model: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Llm(LlmError::ApiCallFailed {
            model: model.into(),
            source: Box::new(source),
        })
    }

    /// 创建文件读取错误
    pub fn file_read_failed(path: impl Into<String>, source: std::io::Error) -> Self {
        AppError::File(FileError::ReadFailed {
            path: path.into(),
            source,
        })
    }

    /// 创建文件写入错误
    pub fn file_write_failed(path: impl Into<String>, source: std::io::Error) -> Self {
        AppError::File(FileError::WriteFailed {
            path: path.into(),
            source,
        })
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

/// 需求库结果类型
pub type StoreResult<T> = Result<T, StoreError>;
