use serde::{Deserialize, Serialize};

use crate::models::RequirementStatus;

/// 评审通过的前缀标记
pub const PASS_TOKEN: &str = "PASS";

/// 一次评审的结论
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewVerdict {
    /// `Approved` 或 `NeedsFix`
    pub status: RequirementStatus,
    /// 模型返回的原始评审文本
    pub text: String,
}

impl ReviewVerdict {
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            status: classify_verdict(&text),
            text,
        }
    }

    pub fn is_approved(&self) -> bool {
        self.status.is_approved()
    }
}

/// 评审文本分类
///
/// 去掉首尾空白后以 `PASS` 开头（不区分大小写）即为通过，其余一律需要修复。
pub fn classify_verdict(text: &str) -> RequirementStatus {
    let approved = text
        .trim()
        .get(..PASS_TOKEN.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(PASS_TOKEN));

    if approved {
        RequirementStatus::Approved
    } else {
        RequirementStatus::NeedsFix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_prefix_is_approved() {
        assert_eq!(classify_verdict("PASS"), RequirementStatus::Approved);
        assert_eq!(classify_verdict("PASS ..."), RequirementStatus::Approved);
        assert_eq!(classify_verdict("pass, looks good"), RequirementStatus::Approved);
        assert_eq!(classify_verdict("  \n Pass\n"), RequirementStatus::Approved);
    }

    #[test]
    fn test_anything_else_needs_fix() {
        assert_eq!(classify_verdict("FIX: missing assertion"), RequirementStatus::NeedsFix);
        assert_eq!(classify_verdict(""), RequirementStatus::NeedsFix);
        assert_eq!(classify_verdict("PAS"), RequirementStatus::NeedsFix);
        assert_eq!(classify_verdict("The code does not PASS"), RequirementStatus::NeedsFix);
        assert_eq!(classify_verdict("通过 PASS"), RequirementStatus::NeedsFix);
    }

    #[test]
    fn test_verdict_keeps_text_verbatim() {
        let verdict = ReviewVerdict::from_text("  FIX: add expect()  ");
        assert_eq!(verdict.text, "  FIX: add expect()  ");
        assert!(!verdict.is_approved());
    }
}
