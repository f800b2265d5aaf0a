//! 日志初始化
//!
//! 库内部只通过 `tracing` 宏输出日志；应用在启动时调用一次 [`init_logger`]
//! 安装 fmt 订阅者。`log` 生态的记录（如 serialport）经 `tracing-log` 桥接后一并输出。

use tracing_subscriber::EnvFilter;

/// 未设置 `RUST_LOG` 时使用的过滤规则
pub const DEFAULT_FILTER: &str = "info";

/// 日志初始化错误（重复初始化等）
pub type LoggerError = Box<dyn std::error::Error + Send + Sync>;

/// 按 `RUST_LOG` 初始化日志，未设置时使用 [`DEFAULT_FILTER`]
///
/// ```no_run
/// rvr_sdk::init_logger().ok();
/// tracing::info!("started");
/// ```
pub fn init_logger() -> Result<(), LoggerError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    install(filter)
}

/// 使用指定过滤规则初始化日志（忽略 `RUST_LOG`）
///
/// 规则语法与 `RUST_LOG` 相同，如 `"rvr_driver=debug,info"`。
pub fn init_logger_with_filter(filter: &str) -> Result<(), LoggerError> {
    install(EnvFilter::try_new(filter)?)
}

fn install(filter: EnvFilter) -> Result<(), LoggerError> {
    tracing_log::LogTracer::builder()
        .with_max_level(log::LevelFilter::Trace)
        .init()?;
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_filter_rejected() {
        assert!(init_logger_with_filter("rvr_driver=notalevel").is_err());
    }

    #[test]
    fn test_second_init_fails() {
        // 第一次调用可能与其他测试竞争，只检查第二次一定失败
        let _ = init_logger_with_filter("debug");
        assert!(init_logger().is_err());
    }
}
