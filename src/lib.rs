pub mod common;
pub mod transfer;

pub use transfer::{
    TransferConfig, TransferError, TransferId, TransferItem, TransferManager, TransferState,
};
