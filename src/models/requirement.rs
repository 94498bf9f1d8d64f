use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// 需求状态
///
/// 只能由生成/评审 worker 写入，编排层从不直接修改。
///
/// 合法迁移：
/// - `Pending → CodeGenerated | Error`
/// - `CodeGenerated → CodeGenerated | Approved | NeedsFix | Error`
/// - `NeedsFix → CodeGenerated | Error`
/// - `Error → CodeGenerated | Error`
/// - `Approved` 为终态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementStatus {
    Pending,
    CodeGenerated,
    Approved,
    NeedsFix,
    Error,
}

impl RequirementStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::CodeGenerated => "code_generated",
            Self::Approved => "approved",
            Self::NeedsFix => "needs_fix",
            Self::Error => "error",
        }
    }

    /// 是否允许从当前状态迁移到 `next`
    pub fn can_transition_to(self, next: RequirementStatus) -> bool {
        use RequirementStatus::*;
        matches!(
            (self, next),
            (Pending, CodeGenerated)
                | (Pending, Error)
                | (CodeGenerated, CodeGenerated)
                | (CodeGenerated, Approved)
                | (CodeGenerated, NeedsFix)
                | (CodeGenerated, Error)
                | (NeedsFix, CodeGenerated)
                | (NeedsFix, Error)
                | (Error, CodeGenerated)
                | (Error, Error)
        )
    }

    pub fn is_approved(self) -> bool {
        self == Self::Approved
    }
}

impl fmt::Display for RequirementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequirementStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "code_generated" => Ok(Self::CodeGenerated),
            "approved" => Ok(Self::Approved),
            "needs_fix" => Ok(Self::NeedsFix),
            "error" => Ok(Self::Error),
            other => Err(StoreError::UnknownStatus(other.to_string())),
        }
    }
}

/// 从文档中切分出来、尚未入库的需求内容
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementDraft {
    pub req_id: String,
    pub feature_name: String,
    pub description: String,
    pub preconditions: String,
    pub user_actions: String,
    pub expected_behavior: String,
    pub validation_handling: String,
    pub full_content: String,
}

impl RequirementDraft {
    /// 描述字段截取的最大字符数
    pub const DESCRIPTION_LEN: usize = 100;

    /// 由一段需求原文构造草稿，按固定规则填充各字段
    pub fn from_span(req_id: impl Into<String>, content: impl Into<String>) -> Self {
        let req_id = req_id.into();
        let content = content.into();
        Self {
            feature_name: req_id.clone(),
            description: content.chars().take(Self::DESCRIPTION_LEN).collect(),
            preconditions: "As per document".to_string(),
            user_actions: content.clone(),
            expected_behavior: "Verified".to_string(),
            validation_handling: "Standard".to_string(),
            full_content: content,
            req_id,
        }
    }
}

/// 需求库中的一条记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    pub req_id: String,
    pub feature_name: String,
    pub description: String,
    pub preconditions: String,
    pub user_actions: String,
    pub expected_behavior: String,
    pub validation_handling: String,
    pub full_content: String,
    pub status: RequirementStatus,
    pub generated_code: Option<String>,
    pub review_result: Option<String>,
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use RequirementStatus::*;

    const ALL: [RequirementStatus; 5] = [Pending, CodeGenerated, Approved, NeedsFix, Error];

    #[test]
    fn test_approved_is_terminal() {
        for next in ALL {
            assert!(!Approved.can_transition_to(next), "approved -> {}", next);
        }
    }

    #[test]
    fn test_review_only_follows_generation() {
        assert!(CodeGenerated.can_transition_to(Approved));
        assert!(CodeGenerated.can_transition_to(NeedsFix));
        assert!(!Pending.can_transition_to(Approved));
        assert!(!NeedsFix.can_transition_to(Approved));
        assert!(!Error.can_transition_to(NeedsFix));
    }

    #[test]
    fn test_failed_states_can_regenerate() {
        assert!(NeedsFix.can_transition_to(CodeGenerated));
        assert!(Error.can_transition_to(CodeGenerated));
        assert!(Pending.can_transition_to(CodeGenerated));
        // 上一次运行在生成与评审之间中断
        assert!(CodeGenerated.can_transition_to(CodeGenerated));
    }

    #[test]
    fn test_status_string_round_trip() {
        for status in ALL {
            assert_eq!(status.as_str().parse::<RequirementStatus>().unwrap(), status);
        }
        assert!(matches!(
            "done".parse::<RequirementStatus>(),
            Err(StoreError::UnknownStatus(s)) if s == "done"
        ));
    }

    #[test]
    fn test_draft_from_span_fills_fields() {
        let content = "FR-01 ".to_string() + &"x".repeat(150);
        let draft = RequirementDraft::from_span("FR-01", content.clone());

        assert_eq!(draft.feature_name, "FR-01");
        assert_eq!(draft.description.chars().count(), 100);
        assert_eq!(draft.user_actions, content);
        assert_eq!(draft.full_content, content);
        assert_eq!(draft.expected_behavior, "Verified");
    }
}
