#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use rangefetch::transfer::{
    ChannelObserver, FetchRequest, FetchedStream, Fetcher, LocatedResource, MemoryRegistry,
    ResourceLocator, TransferConfig, TransferError, TransferEvent, TransferId, TransferItem,
    TransferManager,
};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// 内存中的资源：按块切分，可以在某个偏移处卡住
#[derive(Debug, Clone)]
pub struct Resource {
    pub payload: Bytes,
    pub chunk_size: usize,
    /// 读到该偏移后不再产出数据，也不结束
    pub stall_at: Option<u64>,
    /// 每块之间的延迟
    pub delay: Duration,
    /// 是否在响应里声明长度
    pub declare_length: bool,
    /// 覆盖响应声明的长度
    pub declared_length: Option<u64>,
    /// 数据发完后不结束流
    pub hold_open: bool,
}

impl Resource {
    pub fn new(payload: &[u8], chunk_size: usize) -> Self {
        Self {
            payload: Bytes::copy_from_slice(payload),
            chunk_size,
            stall_at: None,
            delay: Duration::ZERO,
            declare_length: true,
            declared_length: None,
            hold_open: false,
        }
    }

    pub fn stall_at(mut self, offset: u64) -> Self {
        self.stall_at = Some(offset);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn without_length(mut self) -> Self {
        self.declare_length = false;
        self
    }

    pub fn declaring(mut self, length: u64) -> Self {
        self.declared_length = Some(length);
        self
    }

    pub fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }
}

enum Script {
    Serve(Resource),
    /// 按声明长度持续产出填充数据，不结束
    Endless { declared: u64, chunk: Bytes, delay: Duration },
    Status(u16),
}

/// 按 URL 返回脚本化响应，记录所有请求
#[derive(Default)]
pub struct ScriptedFetcher {
    scripts: Mutex<HashMap<String, Script>>,
    requests: Mutex<Vec<FetchRequest>>,
}

impl ScriptedFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn serve(&self, url: &str, resource: Resource) {
        self.scripts
            .lock()
            .insert(url.to_string(), Script::Serve(resource));
    }

    pub fn serve_endless(&self, url: &str, declared: u64, chunk_size: usize, delay: Duration) {
        self.scripts.lock().insert(
            url.to_string(),
            Script::Endless {
                declared,
                chunk: Bytes::from(vec![0u8; chunk_size]),
                delay,
            },
        );
    }

    pub fn fail_with_status(&self, url: &str, status: u16) {
        self.scripts
            .lock()
            .insert(url.to_string(), Script::Status(status));
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn open(
        &self,
        request: &FetchRequest,
        cancel: &CancellationToken,
    ) -> Result<FetchedStream, TransferError> {
        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }
        self.requests.lock().push(request.clone());

        let status = if request.is_ranged() { 206 } else { 200 };
        let scripts = self.scripts.lock();
        match scripts.get(&request.url) {
            Some(Script::Serve(resource)) => {
                let offset = request.offset as usize;
                let end = resource
                    .stall_at
                    .filter(|stall| *stall as usize > offset)
                    .map(|stall| stall as usize)
                    .unwrap_or(resource.payload.len());

                let chunks: Vec<Bytes> = resource.payload[offset..end]
                    .chunks(resource.chunk_size)
                    .map(Bytes::copy_from_slice)
                    .collect();
                let delay = resource.delay;
                let stalls = end < resource.payload.len() || resource.hold_open;

                let body = futures::stream::iter(chunks)
                    .then(move |chunk| async move {
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                        Ok::<_, TransferError>(chunk)
                    })
                    .chain(futures::stream::iter(stalls.then(|| ())).flat_map(|_| {
                        futures::stream::pending::<Result<Bytes, TransferError>>()
                    }));

                Ok(FetchedStream {
                    status,
                    content_length: resource.declared_length.or_else(|| {
                        resource
                            .declare_length
                            .then(|| (resource.payload.len() - offset) as u64)
                    }),
                    body: body.boxed(),
                })
            }
            Some(Script::Endless {
                declared,
                chunk,
                delay,
            }) => {
                let chunk = chunk.clone();
                let delay = *delay;
                let body = futures::stream::repeat(chunk).then(move |chunk| async move {
                    tokio::time::sleep(delay).await;
                    Ok::<_, TransferError>(chunk)
                });
                Ok(FetchedStream {
                    status,
                    content_length: Some(*declared),
                    body: body.boxed(),
                })
            }
            Some(Script::Status(code)) => Err(TransferError::transport(
                Some(*code),
                format!("HTTP 请求失败，状态码: {}", code),
            )),
            None => Err(TransferError::transport(Some(404), "未知的 URL")),
        }
    }
}

/// 把条目的 reference 当作 URL，记录定位次数；reference 为空时定位失败
#[derive(Default)]
pub struct StaticLocator {
    pub size: u64,
    calls: Mutex<u32>,
}

impl StaticLocator {
    pub fn new(size: u64) -> Arc<Self> {
        Arc::new(Self {
            size,
            calls: Mutex::new(0),
        })
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock()
    }
}

#[async_trait]
impl ResourceLocator for StaticLocator {
    async fn locate(&self, item: &TransferItem) -> Option<LocatedResource> {
        *self.calls.lock() += 1;
        if item.reference.is_empty() {
            return None;
        }
        Some(LocatedResource {
            url: item.reference.clone(),
            name: format!("{}.bin", item.id),
            size: self.size,
        })
    }
}

pub struct Harness {
    pub manager: TransferManager,
    pub fetcher: Arc<ScriptedFetcher>,
    pub locator: Arc<StaticLocator>,
    pub registry: Arc<MemoryRegistry>,
    pub events: UnboundedReceiver<TransferEvent>,
}

pub fn harness() -> Harness {
    harness_with(TransferConfig::default(), 0)
}

pub fn harness_with(config: TransferConfig, located_size: u64) -> Harness {
    let fetcher = ScriptedFetcher::new();
    let locator = StaticLocator::new(located_size);
    let registry = Arc::new(MemoryRegistry::new());
    let (observer, events) = ChannelObserver::new();
    let manager = TransferManager::new(config, locator.clone(), fetcher.clone(), Arc::new(observer))
        .with_registry(registry.clone());

    Harness {
        manager,
        fetcher,
        locator,
        registry,
        events,
    }
}

/// 等待满足条件的事件
pub async fn wait_for_event<F>(
    rx: &mut UnboundedReceiver<TransferEvent>,
    predicate: F,
    timeout_duration: Duration,
) -> Option<TransferEvent>
where
    F: Fn(&TransferEvent) -> bool,
{
    timeout(timeout_duration, async {
        while let Some(event) = rx.recv().await {
            if predicate(&event) {
                return Some(event);
            }
        }
        None
    })
    .await
    .unwrap_or(None)
}

/// 轮询直到任务的已传输字节数达到目标
pub async fn wait_for_loaded(manager: &TransferManager, id: &TransferId, target: u64) -> bool {
    timeout(Duration::from_secs(5), async {
        loop {
            if manager.loaded_bytes(id) == Some(target) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .is_ok()
}

/// 收集当前已到达的全部事件
pub async fn drain(rx: &mut UnboundedReceiver<TransferEvent>) -> Vec<TransferEvent> {
    // 让出执行权，使已完成的任务把事件送达
    tokio::time::sleep(Duration::from_millis(50)).await;
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
