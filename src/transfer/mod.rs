pub mod config;
pub mod destination;
pub mod error;
pub mod fetcher;
pub mod locator;
pub mod manager;
pub mod models;
pub mod observer;
pub mod progress;
pub mod registry;
pub mod task;

pub use config::TransferConfig;
pub use destination::FileDestination;
pub use error::{Result, TransferError};
pub use fetcher::{ChunkStream, FetchRequest, FetchedStream, Fetcher, HttpFetcher};
pub use locator::{ResourceLocator, UrlLocator};
pub use manager::TransferManager;
pub use models::{
    Completion, LocatedResource, ProgressSnapshot, TransferId, TransferItem, TransferRecord,
    TransferState,
};
pub use observer::{ChannelObserver, NoopObserver, TransferEvent, TransferObserver};
pub use registry::{MemoryRegistry, NoopRegistry, TransferRegistry};
