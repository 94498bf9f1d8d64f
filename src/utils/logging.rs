/// 日志工具模块
///
/// 提供日志格式化和输出的辅助函数
use tracing::info;

use crate::config::Config;
use crate::orchestrator::{RoundReport, RunSummary};

/// 记录程序启动信息
///
/// # 参数
/// - `config`: 当前配置
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 需求驱动测试生成模式");
    info!("📄 需求文档: {}", config.document_path);
    info!("🤖 模型: {} @ {}", config.llm_model_name, config.llm_api_base_url);
    info!(
        "📊 最大轮次: {} | 最大并发数: {}",
        config.max_rounds, config.max_concurrent_workers
    );
    info!("{}", "=".repeat(60));
}

/// 记录需求加载信息
///
/// # 参数
/// - `extracted`: 从文档中切分出的需求数
/// - `stored`: 成功写入需求库的数量
pub fn log_requirements_loaded(extracted: usize, stored: usize) {
    info!("✓ 从文档中提取到 {} 个需求", extracted);
    if stored < extracted {
        info!("⚠️ 其中 {} 个写入需求库失败", extracted - stored);
    }
    info!("💡 每轮先全部生成，再全部评审\n");
}

/// 记录轮次开始信息
///
/// # 参数
/// - `attempt`: 当前轮次
/// - `max_rounds`: 最大轮次
pub fn log_round_start(attempt: usize, max_rounds: usize) {
    info!("\n{}", "=".repeat(60));
    info!("🔄 开始第 {}/{} 轮", attempt, max_rounds);
    info!("{}", "=".repeat(60));
}

/// 记录轮次完成信息
pub fn log_round_complete(report: &RoundReport) {
    info!("\n{}", "─".repeat(60));
    info!(
        "✓ 第 {} 轮完成: 通过 {}/{} | 待修复 {} | 出错 {}",
        report.attempt,
        report.approved.len(),
        report.selected.len(),
        report.needs_fix.len(),
        report.errored.len()
    );
    info!("{}", "─".repeat(60));
}

/// 打印最终统计信息
///
/// # 参数
/// - `summary`: 运行摘要
/// - `log_file_path`: 运行日志路径
pub fn print_final_stats(summary: &RunSummary, log_file_path: &str) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!("完成时间: {}", summary.finished_at);
    info!("{}", "=".repeat(60));
    info!("🔁 执行轮次: {}/{}", summary.rounds_executed, summary.max_rounds);
    info!("✅ 通过: {}/{}", summary.approved_count(), summary.total);
    if !summary.unresolved_ids.is_empty() {
        info!("❌ 未通过: {}", summary.unresolved_ids.join(", "));
    }
    if let Some(path) = &summary.suite_path {
        info!("📄 测试套件: {}", path);
    }
    info!("{}", "=".repeat(60));
    info!("\n日志已保存至: {}", log_file_path);
}

/// 格式化写入运行日志的摘要行
pub fn format_summary_line(summary: &RunSummary) -> String {
    format!(
        "[{}] 轮次 {}/{} | 通过 {}/{} | 未通过: {}",
        summary.finished_at,
        summary.rounds_executed,
        summary.max_rounds,
        summary.approved_count(),
        summary.total,
        if summary.unresolved_ids.is_empty() {
            "无".to_string()
        } else {
            summary.unresolved_ids.join(", ")
        }
    )
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
