//! 产物写入服务 - 业务能力层
//!
//! 只负责"把代码和评审写到磁盘"能力，不关心流程

use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{AppError, AppResult, FileError};

/// 最终测试套件文件名
pub const FINAL_SUITE_FILE: &str = "final_suite.ts";
/// 运行日志文件名
pub const RUN_LOG_FILE: &str = "run_log.txt";

/// 产物写入服务
///
/// 职责：
/// - 每轮每个需求写一份"代码 + 评审"审计日志
/// - 把通过评审的代码合并导出为一个测试套件
/// - 写运行日志和运行摘要
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    output_dir: PathBuf,
}

impl ArtifactWriter {
    /// 创建新的产物写入服务
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// 写入某一轮某个需求的审计日志
    ///
    /// 文件名：`attempt_{n}_{req_id}_log.txt`
    pub async fn save_attempt_log(
        &self,
        attempt: usize,
        req_id: &str,
        code: &str,
        review: &str,
    ) -> AppResult<PathBuf> {
        let path = self.output_dir.join(format!(
            "attempt_{}_{}_log.txt",
            attempt,
            sanitize_file_component(req_id)
        ));
        let content = format!("--- CODE ---\n{}\n\n--- REVIEW ---\n{}", code, review);
        self.write_file(&path, content.as_bytes()).await?;

        debug!("已写入审计日志: {}", path.display());
        Ok(path)
    }

    /// 导出最终测试套件
    ///
    /// 每个条目前加 `// Requirement: {req_id}` 注释，顺序与传入顺序一致
    pub async fn export_final_suite(&self, approved: &[(String, String)]) -> AppResult<PathBuf> {
        let path = self.output_dir.join(FINAL_SUITE_FILE);
        let content = render_suite(approved);
        self.write_file(&path, content.as_bytes()).await?;
        Ok(path)
    }

    /// 以 JSON 格式写入任意可序列化的内容
    pub async fn write_json<T: Serialize>(&self, file_name: &str, value: &T) -> AppResult<PathBuf> {
        let path = self.output_dir.join(file_name);
        let json = serde_json::to_string_pretty(value).map_err(|source| {
            AppError::File(FileError::SerializeFailed {
                path: path.display().to_string(),
                source,
            })
        })?;
        self.write_file(&path, json.as_bytes()).await?;
        Ok(path)
    }

    /// 初始化运行日志（覆盖旧文件）
    pub async fn init_run_log(&self) -> AppResult<PathBuf> {
        let path = self.output_dir.join(RUN_LOG_FILE);
        let header = format!(
            "{}\n需求测试生成日志 - {}\n{}\n\n",
            "=".repeat(60),
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            "=".repeat(60)
        );
        self.write_file(&path, header.as_bytes()).await?;
        Ok(path)
    }

    /// 追加一行到运行日志
    pub async fn append_run_log(&self, line: &str) -> AppResult<()> {
        let path = self.output_dir.join(RUN_LOG_FILE);
        self.ensure_dir().await?;

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| AppError::file_write_failed(path.display().to_string(), e))?;
        file.write_all(format!("{}\n", line).as_bytes())
            .await
            .map_err(|e| AppError::file_write_failed(path.display().to_string(), e))?;
        Ok(())
    }

    async fn ensure_dir(&self) -> AppResult<()> {
        fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| AppError::file_write_failed(self.output_dir.display().to_string(), e))
    }

    async fn write_file(&self, path: &Path, bytes: &[u8]) -> AppResult<()> {
        self.ensure_dir().await?;
        fs::write(path, bytes)
            .await
            .map_err(|e| AppError::file_write_failed(path.display().to_string(), e))
    }
}

/// 渲染合并后的测试套件内容
pub fn render_suite(approved: &[(String, String)]) -> String {
    approved
        .iter()
        .map(|(req_id, code)| format!("// Requirement: {}\n{}\n\n", req_id, code))
        .collect()
}

/// 文件名中只保留字母、数字、`-` 和 `_`
fn sanitize_file_component(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_suite_prefixes_each_entry() {
        let suite = render_suite(&[
            ("FR-G-01".to_string(), "test('a', () => {});".to_string()),
            ("FR-G-02".to_string(), "test('b', () => {});".to_string()),
        ]);

        assert_eq!(
            suite,
            "// Requirement: FR-G-01\ntest('a', () => {});\n\n\
             // Requirement: FR-G-02\ntest('b', () => {});\n\n"
        );
    }

    #[test]
    fn test_sanitize_file_component() {
        assert_eq!(sanitize_file_component("FR-G_01"), "FR-G_01");
        assert_eq!(sanitize_file_component("FR/../x"), "FR____x");
    }

    #[tokio::test]
    async fn test_attempt_log_and_suite_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(dir.path().join("outputs"));

        let log = writer
            .save_attempt_log(2, "FR-1", "code", "FIX: more asserts")
            .await
            .unwrap();
        assert!(log.ends_with("attempt_2_FR-1_log.txt"));
        assert_eq!(
            std::fs::read_to_string(&log).unwrap(),
            "--- CODE ---\ncode\n\n--- REVIEW ---\nFIX: more asserts"
        );

        let suite = writer
            .export_final_suite(&[("FR-1".to_string(), "code".to_string())])
            .await
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(suite).unwrap(),
            "// Requirement: FR-1\ncode\n\n"
        );
    }

    #[tokio::test]
    async fn test_run_log_header_then_append() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(dir.path());

        let path = writer.init_run_log().await.unwrap();
        writer.append_run_log("通过: 1/2").await.unwrap();

        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.starts_with(&"=".repeat(60)));
        assert!(content.ends_with("通过: 1/2\n"));
    }
}
