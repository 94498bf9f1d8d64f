//! 需求处理上下文
//!
//! 封装"我正在第几轮处理哪个需求"这一信息

use std::fmt::Display;

/// 需求处理上下文
#[derive(Debug, Clone)]
pub struct RequirementCtx {
    /// 当前轮次（从1开始）
    pub attempt: usize,

    /// 需求编号
    pub req_id: String,
}

impl RequirementCtx {
    /// 创建新的需求上下文
    pub fn new(attempt: usize, req_id: impl Into<String>) -> Self {
        Self {
            attempt,
            req_id: req_id.into(),
        }
    }
}

impl Display for RequirementCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[第 {} 轮 {}]", self.attempt, self.req_id)
    }
}
