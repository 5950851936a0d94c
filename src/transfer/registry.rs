use dashmap::DashMap;

use super::models::{TransferId, TransferRecord};

/// 外部传输登记表，核心只负责推送状态变化，从不读取
pub trait TransferRegistry: Send + Sync {
    fn upsert(&self, record: TransferRecord);
}

// 不保存任何记录
#[derive(Debug, Default)]
pub struct NoopRegistry;

impl TransferRegistry for NoopRegistry {
    fn upsert(&self, _record: TransferRecord) {}
}

/// 内存登记表，供界面层和测试观察传输记录
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    records: DashMap<TransferId, TransferRecord>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &TransferId) -> Option<TransferRecord> {
        self.records.get(id).map(|r| r.value().clone())
    }
}

impl TransferRegistry for MemoryRegistry {
    fn upsert(&self, record: TransferRecord) {
        self.records.insert(record.id.clone(), record);
    }
}
