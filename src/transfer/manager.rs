use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::config::TransferConfig;
use super::error::{Result, TransferError};
use super::fetcher::Fetcher;
use super::locator::ResourceLocator;
use super::models::{
    LocatedResource, ProgressSnapshot, TransferId, TransferItem, TransferRecord, TransferState,
};
use super::observer::TransferObserver;
use super::registry::{NoopRegistry, TransferRegistry};
use super::task::{self, Attempt, AttemptOutcome, AttemptReporter, TransferTask};

type TaskTable = HashMap<TransferId, Arc<TransferTask>>;

/// 传输管理器：按标识登记进行中的任务，同一标识最多一个任务
///
/// 任务表是任务之间唯一共享的状态，所有插入和删除都经过同一把锁。
/// 锁只在同步代码中持有，从不跨越 await。
#[derive(Clone)]
pub struct TransferManager {
    tasks: Arc<Mutex<TaskTable>>, // transfer_id -> Task
    next_seq: Arc<AtomicU64>,
    locator: Arc<dyn ResourceLocator>,
    fetcher: Arc<dyn Fetcher>,
    observer: Arc<dyn TransferObserver>,
    registry: Arc<dyn TransferRegistry>,
    config: Arc<TransferConfig>,
    download_mode: Arc<watch::Sender<bool>>,
}

impl TransferManager {
    pub fn new(
        config: TransferConfig,
        locator: Arc<dyn ResourceLocator>,
        fetcher: Arc<dyn Fetcher>,
        observer: Arc<dyn TransferObserver>,
    ) -> Self {
        let (download_mode, _) = watch::channel(false);
        Self {
            tasks: Arc::new(Mutex::new(HashMap::new())),
            next_seq: Arc::new(AtomicU64::new(0)),
            locator,
            fetcher,
            observer,
            registry: Arc::new(NoopRegistry),
            config: Arc::new(config),
            download_mode: Arc::new(download_mode),
        }
    }

    pub fn with_registry(mut self, registry: Arc<dyn TransferRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// 开始传输
    ///
    /// 资源无法定位时立即失败且不创建任务；同一标识已有任务时什么也不做。
    /// 读循环总是在新的 tokio 任务中运行，调用方不会被阻塞。
    pub async fn start(&self, item: TransferItem) -> Result<()> {
        if self.is_active(&item.id) {
            debug!("任务已存在，忽略重复启动: {}", item.id);
            return Ok(());
        }

        let located = self.locate(&item).await?;
        self.launch(item, located, None);
        Ok(())
    }

    /// 暂停传输：设置暂停标记、中止进行中的请求，缓冲数据随读循环退出而丢弃
    pub fn pause(&self, id: &TransferId) {
        let Some(task) = self.get(id) else {
            debug!("暂停的任务不存在: {}", id);
            return;
        };

        if task.pause() {
            info!("⏸️ 暂停传输: {}, 已传输 {} 字节", id, task.loaded_bytes());
            self.publish(&task, TransferState::Paused);
        }
    }

    /// 恢复传输
    ///
    /// 没有任务时等同于 [`start`](Self::start)；任务未暂停时返回错误；
    /// 尚未传输任何字节或已读满总大小时丢弃旧任务重新开始；否则重新定位 URL 并发起范围请求。
    pub async fn resume(&self, item: TransferItem) -> Result<()> {
        let Some(task) = self.get(&item.id) else {
            debug!("恢复的任务不存在，按新任务启动: {}", item.id);
            return self.start(item).await;
        };

        if !task.is_paused() {
            let err = TransferError::not_paused(&item.id);
            warn!("{}", err);
            return Err(err);
        }

        let located = self.locate(&item).await?;

        if task.loaded_bytes() == 0 || task.is_fully_loaded() {
            info!(
                "没有可续传的剩余数据，重新开始: {}, 已传输 {} 字节",
                item.id,
                task.loaded_bytes()
            );
            self.launch(item, located, Some(&task));
            return Ok(());
        }

        let attempt = {
            let tasks = self.tasks.lock();
            match tasks.get(&item.id) {
                Some(current) if Arc::ptr_eq(current, &task) => task.continue_attempt(located),
                _ => {
                    debug!("任务在恢复前已被移除: {}", item.id);
                    return Ok(());
                }
            }
        };

        let Some(attempt) = attempt else {
            return Err(TransferError::not_paused(&item.id));
        };

        info!(
            "▶️ 恢复传输: {}, Range: bytes={}-",
            item.id, attempt.request.offset
        );
        self.spawn_attempt(task, attempt);
        Ok(())
    }

    /// 取消传输：强制暂停并从任务表移除，重复调用无副作用
    pub fn cancel(&self, id: &TransferId) {
        let removed = {
            let mut tasks = self.tasks.lock();
            let removed = tasks.remove(id);
            if removed.is_some() {
                self.reindex(&tasks);
            }
            removed
        };

        let Some(task) = removed else {
            debug!("取消的任务不存在: {}", id);
            return;
        };

        task.abort();
        info!("🛑 取消传输: {}", id);
        self.publish(&task, TransferState::Cancelled);
    }

    pub fn cancel_all(&self) {
        let ids: Vec<TransferId> = self.tasks.lock().keys().cloned().collect();
        info!("取消全部传输: {} 个", ids.len());
        for id in &ids {
            self.cancel(id);
        }
    }

    pub fn is_active(&self, id: &TransferId) -> bool {
        self.tasks.lock().contains_key(id)
    }

    pub fn active_count(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn state(&self, id: &TransferId) -> Option<TransferState> {
        self.get(id).map(|task| task.state())
    }

    pub fn loaded_bytes(&self, id: &TransferId) -> Option<u64> {
        self.get(id).map(|task| task.loaded_bytes())
    }

    pub fn snapshot(&self, id: &TransferId) -> Option<TransferRecord> {
        self.get(id).map(|task| task.record())
    }

    /// 是否处于下载模式：至少有一个任务在表中
    ///
    /// 这只是给宿主的建议信号，由宿主决定是否降低其他网络请求的优先级。
    pub fn is_download_mode(&self) -> bool {
        *self.download_mode.borrow()
    }

    pub fn subscribe_download_mode(&self) -> watch::Receiver<bool> {
        self.download_mode.subscribe()
    }

    fn get(&self, id: &TransferId) -> Option<Arc<TransferTask>> {
        self.tasks.lock().get(id).cloned()
    }

    async fn locate(&self, item: &TransferItem) -> Result<LocatedResource> {
        match self.locator.locate(item).await {
            Some(located) if !located.url.is_empty() => {
                debug!(
                    "定位资源: {} -> {}, 名称: {}, 大小: {}",
                    item.id, located.url, located.name, located.size
                );
                Ok(located)
            }
            _ => {
                let err = TransferError::ResourceUnavailable(format!("无法定位资源: {}", item.id));
                warn!("{}", err);
                self.observer.on_error(&item.id, &err.to_string());
                Err(err)
            }
        }
    }

    // 登记新任务并启动第一次尝试；`stale` 是被重新开始替换掉的旧任务
    fn launch(
        &self,
        item: TransferItem,
        located: LocatedResource,
        stale: Option<&Arc<TransferTask>>,
    ) {
        let task = {
            let mut tasks = self.tasks.lock();
            match (tasks.get(&item.id), stale) {
                (Some(current), Some(stale)) if Arc::ptr_eq(current, stale) => stale.abort(),
                (Some(_), _) => {
                    debug!("任务已存在，忽略重复启动: {}", item.id);
                    return;
                }
                (None, Some(_)) => {
                    debug!("任务在恢复前已被移除: {}", item.id);
                    return;
                }
                (None, None) => {}
            }

            let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
            let task = Arc::new(TransferTask::new(item, located, seq));
            tasks.insert(task.id().clone(), Arc::clone(&task));
            self.reindex(&tasks);
            task
        };

        info!("开始传输任务: {}", task.id());
        self.publish(&task, TransferState::Queued);

        let attempt = task.initial_attempt();
        self.spawn_attempt(task, attempt);
    }

    fn spawn_attempt(&self, task: Arc<TransferTask>, attempt: Attempt) {
        let manager = self.clone();
        tokio::spawn(async move {
            let number = attempt.number;
            let outcome = task::run_attempt(
                &task,
                attempt,
                manager.fetcher.as_ref(),
                &manager.config,
                &manager,
            )
            .await;
            manager.finish_attempt(&task, number, outcome);
        });
    }

    fn finish_attempt(&self, task: &Arc<TransferTask>, attempt: u64, outcome: AttemptOutcome) {
        let id = task.id();
        match outcome {
            AttemptOutcome::Interrupted => {
                debug!("传输中止: {}, 已传输 {} 字节", id, task.loaded_bytes());
            }
            AttemptOutcome::Completed(completion) => {
                if !self.retire(task, attempt, TransferState::Completed) {
                    debug!("丢弃过期的完成结果: {}", id);
                    return;
                }
                info!("✅ 传输完成: {}, 共 {} 字节", id, task.loaded_bytes());
                self.publish(task, TransferState::Completed);
                // 完成回调是任务生命周期的最后一步
                self.observer.on_complete(id, completion);
            }
            AttemptOutcome::Failed(e) => {
                if e.is_cancelled() || !self.retire(task, attempt, TransferState::Error) {
                    debug!("忽略已中止任务的错误: {}, {}", id, e);
                    return;
                }
                error!("❌ 传输失败: {}, 错误: {}", id, e);
                self.publish(task, TransferState::Error);
                self.observer.on_error(id, &e.to_string());
            }
        }
    }

    // 把任务移出任务表并进入终态；尝试已过期、任务已暂停或已被替换时返回 false
    fn retire(&self, task: &Arc<TransferTask>, attempt: u64, state: TransferState) -> bool {
        let mut tasks = self.tasks.lock();
        match tasks.get(task.id()) {
            Some(current) if Arc::ptr_eq(current, task) => {}
            _ => return false,
        }
        if !task.finish(attempt, state) {
            return false;
        }
        tasks.remove(task.id());
        self.reindex(&tasks);
        true
    }

    // 重新计算排队位置并刷新下载模式，调用方持有任务表锁
    fn reindex(&self, tasks: &TaskTable) {
        let mut ordered: Vec<&Arc<TransferTask>> = tasks.values().collect();
        ordered.sort_by_key(|task| task.seq());
        for (position, task) in ordered.into_iter().enumerate() {
            task.set_position(position);
        }

        let enabled = !tasks.is_empty();
        self.download_mode.send_if_modified(|mode| {
            if *mode == enabled {
                return false;
            }
            *mode = enabled;
            if enabled {
                info!("进入下载模式");
            } else {
                info!("退出下载模式");
            }
            true
        });
    }

    fn publish(&self, task: &TransferTask, state: TransferState) {
        self.registry.upsert(task.record());
        self.observer.on_state(task.id(), state);
    }
}

impl AttemptReporter for TransferManager {
    fn downloading(&self, task: &TransferTask) {
        debug!("开始读取数据: {}", task.id());
        self.publish(task, TransferState::Downloading);
    }

    fn progress(&self, task: &TransferTask, progress: &ProgressSnapshot) {
        self.observer.on_progress(task.id(), progress);
        self.registry.upsert(task.record());
    }
}
