use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::config::TransferConfig;
use super::error::TransferError;
use super::fetcher::{FetchRequest, Fetcher};
use super::models::{
    Completion, LocatedResource, ProgressSnapshot, TransferId, TransferItem, TransferRecord,
    TransferState,
};
use super::progress::{self, ProgressThrottle};

/// 一次传输的可变状态，由管理器独占持有
///
/// 已传输字节数在暂停后保留，缓冲的数据不保留：恢复时只向服务器请求剩余部分。
pub struct TransferTask {
    item: TransferItem,
    seq: u64,
    loaded: AtomicU64,
    paused: AtomicBool,
    speed: AtomicU64,
    position: AtomicUsize,
    control: Mutex<TaskControl>,
}

struct TaskControl {
    url: String,
    name: String,
    total_size: u64,
    state: TransferState,
    cancel: CancellationToken,
    attempt: u64,
}

/// 一次执行尝试所需的参数
#[derive(Debug)]
pub(crate) struct Attempt {
    pub number: u64,
    pub request: FetchRequest,
    pub known_total: u64,
    pub name: String,
    pub cancel: CancellationToken,
}

#[derive(Debug)]
pub(crate) enum AttemptOutcome {
    Completed(Completion),
    /// 暂停或取消引起的中止，不上报
    Interrupted,
    Failed(TransferError),
}

/// 读循环向管理器汇报的出口
pub(crate) trait AttemptReporter: Send + Sync {
    fn downloading(&self, task: &TransferTask);

    fn progress(&self, task: &TransferTask, progress: &ProgressSnapshot);
}

impl TransferTask {
    pub(crate) fn new(item: TransferItem, located: LocatedResource, seq: u64) -> Self {
        Self {
            item,
            seq,
            loaded: AtomicU64::new(0),
            paused: AtomicBool::new(false),
            speed: AtomicU64::new(0),
            position: AtomicUsize::new(0),
            control: Mutex::new(TaskControl {
                url: located.url,
                name: located.name,
                total_size: located.size,
                state: TransferState::Queued,
                cancel: CancellationToken::new(),
                attempt: 0,
            }),
        }
    }

    pub fn id(&self) -> &TransferId {
        &self.item.id
    }

    pub(crate) fn seq(&self) -> u64 {
        self.seq
    }

    pub(crate) fn set_position(&self, position: usize) {
        self.position.store(position, Ordering::Relaxed);
    }

    pub fn state(&self) -> TransferState {
        self.control.lock().state
    }

    pub fn loaded_bytes(&self) -> u64 {
        self.loaded.load(Ordering::Acquire)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    // 总大小已知且已全部读到；此时范围请求只会得到 416
    pub(crate) fn is_fully_loaded(&self) -> bool {
        let total_size = self.control.lock().total_size;
        total_size > 0 && self.loaded_bytes() >= total_size
    }

    pub fn record(&self) -> TransferRecord {
        let control = self.control.lock();
        TransferRecord {
            id: self.item.id.clone(),
            name: control.name.clone(),
            total_size: control.total_size,
            state: control.state,
            loaded: self.loaded_bytes(),
            speed: self.speed.load(Ordering::Relaxed),
            queue_position: self.position.load(Ordering::Relaxed),
        }
    }

    // 新建任务的第一次尝试，从头开始
    pub(crate) fn initial_attempt(&self) -> Attempt {
        let control = self.control.lock();
        Attempt {
            number: control.attempt,
            request: FetchRequest::new(control.url.clone(), 0),
            known_total: control.total_size,
            name: control.name.clone(),
            cancel: control.cancel.clone(),
        }
    }

    /// 从暂停处继续：使用重新定位的 URL，从已传输字节数处发起范围请求
    ///
    /// 任务未暂停时返回 `None`。
    pub(crate) fn continue_attempt(&self, located: LocatedResource) -> Option<Attempt> {
        let mut control = self.control.lock();
        if !self.is_paused() || control.state != TransferState::Paused {
            return None;
        }

        control.url = located.url;
        if control.total_size == 0 {
            control.total_size = located.size;
        }
        control.attempt += 1;
        control.cancel = CancellationToken::new();
        control.state = TransferState::Downloading;
        self.paused.store(false, Ordering::Release);

        Some(Attempt {
            number: control.attempt,
            request: FetchRequest::new(control.url.clone(), self.loaded_bytes()),
            known_total: control.total_size,
            name: control.name.clone(),
            cancel: control.cancel.clone(),
        })
    }

    /// 设置暂停标记并中止进行中的请求；已暂停或已结束时返回 false
    pub(crate) fn pause(&self) -> bool {
        let mut control = self.control.lock();
        if control.state.is_terminal() || control.state == TransferState::Paused {
            return false;
        }
        self.paused.store(true, Ordering::Release);
        control.cancel.cancel();
        control.state = TransferState::Paused;
        true
    }

    // 强制暂停后标记为已取消，不论当前处于哪个阶段
    pub(crate) fn abort(&self) {
        let mut control = self.control.lock();
        self.paused.store(true, Ordering::Release);
        control.cancel.cancel();
        control.state = TransferState::Cancelled;
    }

    // 尝试仍然有效时才进入终态；数据已完整读完时晚到的暂停不拦截完成
    pub(crate) fn finish(&self, attempt: u64, state: TransferState) -> bool {
        let mut control = self.control.lock();
        if control.attempt != attempt || control.state.is_terminal() {
            return false;
        }
        if self.is_paused() && state != TransferState::Completed {
            return false;
        }
        control.state = state;
        true
    }

    fn mark_downloading(&self, attempt: u64, total_size: u64) -> bool {
        let mut control = self.control.lock();
        if control.attempt != attempt || self.is_paused() {
            return false;
        }
        control.total_size = total_size;
        control.state = TransferState::Downloading;
        true
    }

    // 已过期的尝试不能再改写计数
    fn advance(&self, attempt: u64, loaded: u64) -> bool {
        let control = self.control.lock();
        if control.attempt != attempt || self.is_paused() {
            return false;
        }
        self.loaded.store(loaded, Ordering::Release);
        true
    }
}

/// 执行一次尝试：打开流，逐块读取并累积，按节流间隔汇报进度
///
/// 每次读取前检查暂停标记，读取本身与取消令牌竞争，
/// 因此暂停或取消最迟在下一个块边界生效。中止时缓冲区随之丢弃。
pub(crate) async fn run_attempt(
    task: &TransferTask,
    attempt: Attempt,
    fetcher: &dyn Fetcher,
    config: &TransferConfig,
    reporter: &dyn AttemptReporter,
) -> AttemptOutcome {
    let Attempt {
        number,
        request,
        known_total,
        name,
        cancel,
    } = attempt;
    let id = task.id();
    let offset = request.offset;

    debug!("打开传输流: {}, URL: {}, 起点: {}", id, request.url, offset);

    let fetched = match fetcher.open(&request, &cancel).await {
        Ok(fetched) => fetched,
        Err(_) if cancel.is_cancelled() => return AttemptOutcome::Interrupted,
        Err(e) => return AttemptOutcome::Failed(e),
    };

    // 续传时以服务器声明的剩余长度为准，缺失时沿用已知大小
    let total_size = match (request.is_ranged(), fetched.content_length) {
        (true, Some(len)) => match len.checked_add(offset) {
            Some(total) => total,
            None => {
                return AttemptOutcome::Failed(TransferError::ProtocolViolation(format!(
                    "声明的长度超出范围: {} + {}",
                    len, offset
                )));
            }
        },
        (true, None) => known_total,
        (false, len) => len.unwrap_or(0),
    };
    if request.is_ranged() && known_total > 0 && total_size != known_total {
        warn!(
            "服务器报告的总大小与已知大小不一致: {}, 已知 {}, 服务器 {}",
            id, known_total, total_size
        );
    }

    if !task.mark_downloading(number, total_size) {
        return AttemptOutcome::Interrupted;
    }
    reporter.downloading(task);

    let started_at = Instant::now();
    let mut throttle = ProgressThrottle::new(total_size, config, started_at);
    let mut buffer: Vec<Bytes> = Vec::new();
    let mut loaded = offset;
    let mut body = fetched.body;

    loop {
        if task.is_paused() {
            debug!("检测到暂停: {}, 已传输 {} 字节", id, loaded);
            return AttemptOutcome::Interrupted;
        }

        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => return AttemptOutcome::Interrupted,
            chunk = body.next() => chunk,
        };

        let chunk = match chunk {
            Some(Ok(chunk)) => chunk,
            Some(Err(_)) if cancel.is_cancelled() => return AttemptOutcome::Interrupted,
            Some(Err(e)) => return AttemptOutcome::Failed(e),
            None => break,
        };

        loaded += chunk.len() as u64;
        buffer.push(chunk);
        if !task.advance(number, loaded) {
            return AttemptOutcome::Interrupted;
        }

        let now = Instant::now();
        if throttle.ready(now) {
            let progress = progress::snapshot(
                loaded,
                total_size,
                loaded - offset,
                now.duration_since(started_at),
            );
            task.speed.store(progress.speed, Ordering::Relaxed);
            reporter.progress(task, &progress);
        }
    }

    // 流已读完：之后才到的暂停不丢弃数据，取消由 finish 拦截
    let bytes = assemble(buffer);
    debug!("传输流结束: {}, 本次 {} 字节", id, bytes.len());

    AttemptOutcome::Completed(Completion {
        name,
        offset,
        bytes,
    })
}

fn assemble(mut buffer: Vec<Bytes>) -> Bytes {
    if buffer.len() == 1 {
        return buffer.pop().unwrap_or_default();
    }

    let size = buffer.iter().map(Bytes::len).sum();
    let mut out = BytesMut::with_capacity(size);
    for chunk in buffer.drain(..) {
        out.extend_from_slice(&chunk);
    }
    out.freeze()
}
