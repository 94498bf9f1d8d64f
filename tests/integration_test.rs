use std::sync::Arc;

use async_trait::async_trait;
use req_test_gen::orchestrator::RUN_SUMMARY_FILE;
use req_test_gen::services::artifact_writer::{FINAL_SUITE_FILE, RUN_LOG_FILE};
use req_test_gen::workflow::generation_worker::GENERATION_SYSTEM_PROMPT;
use req_test_gen::{logger, App, AppResult, ChatModel, Config};

/// 生成固定代码、评审全部通过的模型
struct AlwaysPass;

#[async_trait]
impl ChatModel for AlwaysPass {
    async fn chat(&self, _model_id: &str, system_prompt: &str, _user_prompt: &str) -> AppResult<String> {
        if system_prompt == GENERATION_SYSTEM_PROMPT {
            Ok("```ts\nimport { test, expect } from '@playwright/test';\n```".to_string())
        } else {
            Ok("PASS".to_string())
        }
    }
}

fn config_in(dir: &std::path::Path, document: &str) -> Config {
    let document_path = dir.join("Requirement.txt");
    std::fs::write(&document_path, document).unwrap();

    Config {
        document_path: document_path.display().to_string(),
        db_path: dir.join("data").join("requirements.db").display().to_string(),
        output_dir: dir.join("outputs").display().to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_app_end_to_end_with_stub_model() {
    logger::init();

    let dir = tempfile::tempdir().unwrap();
    let config = config_in(
        dir.path(),
        "Functional requirements\nFR-G-01 Home page lists examples.\nFR-G-02 Footer is visible.",
    );
    let output_dir = std::path::PathBuf::from(&config.output_dir);

    let summary = App::with_model(config, Arc::new(AlwaysPass))
        .await
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(summary.total, 2);
    assert_eq!(summary.approved_count(), 2);
    assert_eq!(summary.rounds_executed, 1);

    for file in [FINAL_SUITE_FILE, RUN_LOG_FILE, RUN_SUMMARY_FILE] {
        assert!(output_dir.join(file).exists(), "缺少输出文件: {}", file);
    }
    assert!(output_dir.join("attempt_1_FR-G-01_log.txt").exists());

    let run_log = std::fs::read_to_string(output_dir.join(RUN_LOG_FILE)).unwrap();
    assert!(run_log.contains("通过 2/2"));

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(output_dir.join(RUN_SUMMARY_FILE)).unwrap())
            .unwrap();
    assert_eq!(json["approved_ids"], serde_json::json!(["FR-G-01", "FR-G-02"]));
}

#[tokio::test]
async fn test_document_without_requirements_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path(), "This document has no identifiers at all.");

    let app = App::with_model(config, Arc::new(AlwaysPass)).await.unwrap();
    assert!(app.run().await.is_err());
}

#[tokio::test]
#[ignore] // 默认忽略，需要本地模型服务：cargo test -- --ignored
async fn test_live_model_round_trip() {
    // 初始化日志
    logger::init();

    // 加载配置
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::load().expect("加载配置失败");
    let local = config_in(dir.path(), "FR-LOGIN-1 The user can log in with valid credentials.");
    config.document_path = local.document_path;
    config.db_path = local.db_path;
    config.output_dir = local.output_dir;
    config.max_rounds = 1;

    let summary = App::initialize(config)
        .await
        .expect("初始化失败")
        .run()
        .await
        .expect("运行失败");

    assert_eq!(summary.total, 1);
    assert_eq!(summary.rounds_executed, 1);
}
