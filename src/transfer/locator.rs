use async_trait::async_trait;
use tracing::debug;
use url::Url;

use super::models::{LocatedResource, TransferItem};

/// 资源定位器：把不透明的条目解析为可下载的 URL、文件名和大小
///
/// 返回 `None` 或空 URL 表示资源不可用。每次恢复都会重新调用，
/// 因为可续传的下载链接往往很快过期。
#[async_trait]
pub trait ResourceLocator: Send + Sync {
    async fn locate(&self, item: &TransferItem) -> Option<LocatedResource>;
}

// 把条目的 reference 直接当作 URL
#[derive(Debug, Clone, Default)]
pub struct UrlLocator;

impl UrlLocator {
    pub fn file_name(url: &Url) -> String {
        url.path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            .map(|s| s.to_string())
            .unwrap_or_else(|| "download".to_string())
    }
}

#[async_trait]
impl ResourceLocator for UrlLocator {
    async fn locate(&self, item: &TransferItem) -> Option<LocatedResource> {
        let url = match Url::parse(&item.reference) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => url,
            Ok(url) => {
                debug!("不支持的协议: {}", url.scheme());
                return None;
            }
            Err(e) => {
                debug!("URL 解析失败: {}, {}", item.reference, e);
                return None;
            }
        };

        Some(LocatedResource {
            name: Self::file_name(&url),
            url: url.to_string(),
            size: 0,
        })
    }
}
