/// 日志工具模块
///
/// 提供日志初始化和输出的辅助函数
use anyhow::{anyhow, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// 初始化 tracing
///
/// 优先使用 `RUST_LOG`，未设置时使用配置的日志级别
///
/// # 参数
/// - `log_level`: 例如 `"info"` 或 `"rubric_grader=debug"`
pub fn init(log_level: &str) -> Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(log_level)
            .map_err(|e| anyhow!("无效的日志级别 '{}': {}", log_level, e))?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|e| anyhow!("日志初始化失败: {}", e))
}

/// 记录程序启动信息
///
/// # 参数
/// - `max_concurrent`: 最大并发数
/// - `ladder_len`: 评分梯队中的节点数
pub fn log_startup(max_concurrent: usize, ladder_len: usize) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - AI 评分模式");
    info!("📊 最大并发数: {}", max_concurrent);
    info!("🪜 评分梯队: {} 个模型", ladder_len);
    info!("{}", "=".repeat(60));
}

/// 记录答案加载信息
pub fn log_answers_loaded(total: usize, max_concurrent: usize) {
    info!("✓ 找到 {} 份待评分的答案", total);
    info!("📋 将以每批 {} 份的方式处理\n", max_concurrent);
}

/// 记录批次开始信息
///
/// # 参数
/// - `batch_num`: 批次编号
/// - `total_batches`: 批次总数
/// - `start`: 起始编号
/// - `end`: 结束编号
/// - `total`: 总数
pub fn log_batch_start(
    batch_num: usize,
    total_batches: usize,
    start: usize,
    end: usize,
    total: usize,
) {
    info!("\n{}", "=".repeat(60));
    info!("📦 开始处理第 {}/{} 批", batch_num, total_batches);
    info!("📄 本批答案: {}-{} / 共 {} 份", start, end, total);
    info!("{}", "=".repeat(60));
}

/// 记录批次完成信息
pub fn log_batch_complete(batch_num: usize, success: usize, total: usize) {
    info!("\n{}", "─".repeat(60));
    info!("✓ 第 {} 批完成: 成功 {}/{}", batch_num, success, total);
    info!("{}", "─".repeat(60));
}

/// 打印最终统计信息
///
/// # 参数
/// - `success`: 成功数量（含兜底）
/// - `fallback`: 兜底数量
/// - `failed`: 失败数量
/// - `total`: 总数
/// - `record_file`: 评分记录文件
pub fn print_final_stats(success: usize, fallback: usize, failed: usize, total: usize, record_file: &str) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部评分完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 成功: {}/{}", success, total);
    info!("🛟 兜底: {}", fallback);
    info!("❌ 失败: {}", failed);
    info!("{}", "=".repeat(60));
    info!("\n评分记录已保存至: {}", record_file);
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text_counts_chars() {
        assert_eq!(truncate_text("光合作用需要光照", 4), "光合作用...");
        assert_eq!(truncate_text("短", 4), "短");
    }
}
