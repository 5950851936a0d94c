use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("资源不可用: {0}")]
    ResourceUnavailable(String),

    #[error("传输失败{}: {message}", status_suffix(.status))]
    Transport {
        status: Option<u16>,
        message: String,
    },

    #[error("协议错误: {0}")]
    ProtocolViolation(String),

    #[error("无效的操作: {0}")]
    InvalidCommand(String),

    #[error("传输已取消")]
    Cancelled,

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("配置错误: {0}")]
    Config(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default()
}

impl TransferError {
    pub fn transport(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Transport {
            status,
            message: message.into(),
        }
    }

    // 任务未处于暂停状态时的恢复请求
    pub fn not_paused(id: impl std::fmt::Display) -> Self {
        Self::InvalidCommand(format!("任务未暂停: {}", id))
    }

    /// 主动取消（暂停、取消）引起的中止不应当作错误上报
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport { status, .. } => *status,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for TransferError {
    fn from(error: reqwest::Error) -> Self {
        TransferError::Transport {
            status: error.status().map(|s| s.as_u16()),
            message: error.to_string(),
        }
    }
}

impl From<serde_json::Error> for TransferError {
    fn from(e: serde_json::Error) -> Self {
        Self::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TransferError>;
