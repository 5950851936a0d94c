use std::sync::Arc;

use tokio::sync::mpsc;

use super::models::{Completion, ProgressSnapshot, TransferId, TransferState};

/// 传输通知的接收方
///
/// 所有回调都是即发即弃的：核心不等待回调返回，实现不应阻塞。
/// 同一传输的进度回调按已传输字节数非递减的顺序送达。
pub trait TransferObserver: Send + Sync {
    fn on_state(&self, _id: &TransferId, _state: TransferState) {}

    fn on_progress(&self, _id: &TransferId, _progress: &ProgressSnapshot) {}

    fn on_complete(&self, _id: &TransferId, _completion: Completion) {}

    fn on_error(&self, _id: &TransferId, _message: &str) {}
}

#[derive(Debug, Default)]
pub struct NoopObserver;

impl TransferObserver for NoopObserver {}

// 依次转发给多个观察者
impl TransferObserver for Vec<Arc<dyn TransferObserver>> {
    fn on_state(&self, id: &TransferId, state: TransferState) {
        for observer in self {
            observer.on_state(id, state);
        }
    }

    fn on_progress(&self, id: &TransferId, progress: &ProgressSnapshot) {
        for observer in self {
            observer.on_progress(id, progress);
        }
    }

    fn on_complete(&self, id: &TransferId, completion: Completion) {
        for observer in self {
            observer.on_complete(id, completion.clone());
        }
    }

    fn on_error(&self, id: &TransferId, message: &str) {
        for observer in self {
            observer.on_error(id, message);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransferEvent {
    State {
        id: TransferId,
        state: TransferState,
    },
    Progress {
        id: TransferId,
        progress: ProgressSnapshot,
    },
    Completed {
        id: TransferId,
        completion: Completion,
    },
    Failed {
        id: TransferId,
        message: String,
    },
}

impl TransferEvent {
    pub fn id(&self) -> &TransferId {
        match self {
            Self::State { id, .. }
            | Self::Progress { id, .. }
            | Self::Completed { id, .. }
            | Self::Failed { id, .. } => id,
        }
    }
}

/// 把回调转成事件写入无界通道，接收端关闭后事件直接丢弃
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<TransferEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TransferEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: TransferEvent) {
        let _ = self.tx.send(event);
    }
}

impl TransferObserver for ChannelObserver {
    fn on_state(&self, id: &TransferId, state: TransferState) {
        self.send(TransferEvent::State {
            id: id.clone(),
            state,
        });
    }

    fn on_progress(&self, id: &TransferId, progress: &ProgressSnapshot) {
        self.send(TransferEvent::Progress {
            id: id.clone(),
            progress: progress.clone(),
        });
    }

    fn on_complete(&self, id: &TransferId, completion: Completion) {
        self.send(TransferEvent::Completed {
            id: id.clone(),
            completion,
        });
    }

    fn on_error(&self, id: &TransferId, message: &str) {
        self.send(TransferEvent::Failed {
            id: id.clone(),
            message: message.to_string(),
        });
    }
}
