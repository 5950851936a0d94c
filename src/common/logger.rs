use std::path::Path;

use colored::*;

/// 面向终端用户的传输输出，调试信息走 tracing
pub struct PrettyLogger;

impl PrettyLogger {
    pub fn success(message: impl AsRef<str>) {
        println!("{} {}", "✓".green().bold(), message.as_ref());
    }

    pub fn error(message: impl AsRef<str>) {
        eprintln!("{} {}", "✗".red().bold(), message.as_ref());
    }

    /// 显示已启动的传输数量
    pub fn transfers_started(started: usize, requested: usize) {
        println!(
            "{} 已启动 {}/{} 个传输",
            "⇣".blue().bold(),
            started.to_string().bold(),
            requested
        );
    }

    /// 中断信号到达时提示还有多少传输被取消
    pub fn interrupted(pending: usize) {
        println!(
            "\n{} 收到中断信号，取消 {} 个未完成的传输",
            "⚠".yellow().bold(),
            pending.to_string().yellow()
        );
    }

    /// 显示传输总结和输出目录
    pub fn transfer_summary(completed: usize, failed: usize, cancelled: usize, output_dir: &Path) {
        println!("{}", "─".repeat(50).bright_black());
        println!(
            "{} 完成 {} / 失败 {} / 取消 {}",
            "📦".green().bold(),
            completed.to_string().green(),
            failed.to_string().red(),
            cancelled.to_string().yellow()
        );
        println!(
            "{} {}: {}",
            "📁".blue().bold(),
            "输出目录".bold(),
            output_dir.display()
        );
    }
}

#[macro_export]
macro_rules! log_success {
    ($($arg:tt)*) => {
        $crate::common::logger::PrettyLogger::success(format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::common::logger::PrettyLogger::error(format!($($arg)*))
    };
}
