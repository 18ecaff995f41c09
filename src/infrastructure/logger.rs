//! 日志基础设施

use tracing_subscriber::EnvFilter;

pub struct Logger;

impl Logger {
    /// 初始化全局 subscriber，`level` 可以是级别（`info`）也可以是完整的过滤表达式
    ///
    /// 重复调用不会 panic（测试里会多次初始化）。
    pub fn init(level: &str) {
        let filter = EnvFilter::try_new(format!("{},sqlx=warn", level))
            .unwrap_or_else(|_| EnvFilter::new("info"));

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init();
    }

    /// 启动横幅
    pub fn banner(title: &str) {
        tracing::info!("{}", "*".repeat(70));
        tracing::info!("{:*^70}", format!("  {}  ", title));
        tracing::info!("{}", "*".repeat(70));
    }
}
