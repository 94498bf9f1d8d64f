use crate::error::{AppError, AppResult, InputError};
use crate::models::RequirementDraft;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use tokio::fs;

/// 需求编号的起始标记，例如 `FR-G-01`
const REQ_ID_PATTERN: &str = r"FR-[\w]+[-\w]*";

fn req_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(REQ_ID_PATTERN).expect("需求编号正则无效"))
}

/// 读取需求文档（已提取的纯文本）并切分为需求草稿
pub async fn load_requirements_from_document(path: &Path) -> AppResult<Vec<RequirementDraft>> {
    let path_str = path.display().to_string();

    let is_pdf = path
        .extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
    if is_pdf {
        return Err(InputError::UnsupportedDocument { path: path_str }.into());
    }

    let bytes = fs::read(path)
        .await
        .map_err(|e| AppError::file_read_failed(&path_str, e))?;
    let text = String::from_utf8_lossy(&bytes);

    tracing::info!("已读取文档 {}，共 {} 个字符", path_str, text.chars().count());

    let drafts = segment_requirements(&text);
    if drafts.is_empty() {
        return Err(InputError::NoRequirements { path: path_str }.into());
    }

    Ok(drafts)
}

/// 按需求编号切分文档
///
/// 每个编号的内容从该编号开始，到下一个编号（或文末）为止。
/// 同一编号出现多次时后者覆盖前者，顺序保持首次出现的位置；空内容被跳过。
pub fn segment_requirements(text: &str) -> Vec<RequirementDraft> {
    let matches: Vec<_> = req_id_regex().find_iter(text).collect();
    let mut drafts: Vec<RequirementDraft> = Vec::with_capacity(matches.len());

    for (i, m) in matches.iter().enumerate() {
        let end = matches.get(i + 1).map_or(text.len(), |next| next.start());
        let content = text[m.start()..end].trim();
        if content.is_empty() {
            continue;
        }

        let draft = RequirementDraft::from_span(m.as_str(), content);
        match drafts.iter_mut().find(|d| d.req_id == draft.req_id) {
            Some(existing) => {
                tracing::warn!("文档中需求编号重复: {}，以后出现的内容为准", draft.req_id);
                *existing = draft;
            }
            None => drafts.push(draft),
        }
    }

    drafts
}
