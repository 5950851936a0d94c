use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::Result;

pub const DEFAULT_LARGE_TRANSFER_THRESHOLD: u64 = 100 * 1024 * 1024;

/// 传输管理器配置，可从 JSON 文件加载，缺省字段使用默认值
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TransferConfig {
    /// 超过该大小（字节）的传输使用更密集的进度回报
    pub large_transfer_threshold: u64,
    pub fast_progress_interval_ms: u64,
    pub slow_progress_interval_ms: u64,
    pub connect_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            large_transfer_threshold: DEFAULT_LARGE_TRANSFER_THRESHOLD,
            fast_progress_interval_ms: 500,
            slow_progress_interval_ms: 1000,
            connect_timeout_secs: 10,
            user_agent: concat!("rangefetch/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl TransferConfig {
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("加载配置文件: {}", path.display());
        let data = tokio::fs::read(path).await?;
        let config = serde_json::from_slice(&data)?;
        Ok(config)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    // 大文件 500ms 一次，其余 1000ms 一次
    pub fn progress_interval(&self, total_size: u64) -> Duration {
        if total_size > self.large_transfer_threshold {
            Duration::from_millis(self.fast_progress_interval_ms)
        } else {
            Duration::from_millis(self.slow_progress_interval_ms)
        }
    }
}
