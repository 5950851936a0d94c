use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// 传输标识，与源条目的标识相同
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransferId(String);

impl TransferId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TransferId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TransferId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// --------------------------------------------------------------------
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TransferState {
    Queued,
    Downloading,
    Paused,
    Completed,
    Error,
    Cancelled,
}

impl TransferState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Cancelled)
    }
}

/// 待传输的条目；`reference` 对核心是不透明的，只交给定位器解析
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferItem {
    pub id: TransferId,
    pub reference: String,
}

impl TransferItem {
    pub fn new(id: impl Into<TransferId>, reference: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            reference: reference.into(),
        }
    }
}

/// 定位器解析出的资源信息，`size` 为 0 表示未知
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedResource {
    pub url: String,
    pub name: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    pub loaded: u64,
    pub total: u64,
    /// 0-100，总大小未知时为 0
    pub percentage: u32,
    /// 本次尝试开始以来的平均速度 字节/秒
    pub speed: u64,
    pub time_remaining: Option<Duration>,
}

/// 最终一次尝试组装出的数据，`offset` 是这段数据在资源中的起始位置
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub name: String,
    pub offset: u64,
    pub bytes: Bytes,
}

/// 推送给外部登记表的传输记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub id: TransferId,
    pub name: String,
    pub total_size: u64,
    pub state: TransferState,
    pub loaded: u64,
    pub speed: u64,
    pub queue_position: usize,
}
