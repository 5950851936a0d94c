//! 流式获取
//!
//! 发起普通或带 `Range` 的 GET 请求，把响应体暴露为字节块流，
//! 非 2xx（带范围时非 206）的响应作为错误返回。

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::StatusCode;
use reqwest::header::RANGE;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::error::{Result, TransferError};
use crate::common::client::HttpClient;

pub type ChunkStream = BoxStream<'static, Result<Bytes>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    /// 续传起点，0 表示从头开始
    pub offset: u64,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>, offset: u64) -> Self {
        Self {
            url: url.into(),
            offset,
        }
    }

    pub fn is_ranged(&self) -> bool {
        self.offset > 0
    }

    pub fn range_header(&self) -> Option<String> {
        self.is_ranged().then(|| format!("bytes={}-", self.offset))
    }
}

pub struct FetchedStream {
    pub status: u16,
    /// 响应声明的长度；对 206 响应而言只是剩余部分的长度
    pub content_length: Option<u64>,
    pub body: ChunkStream,
}

impl std::fmt::Debug for FetchedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchedStream")
            .field("status", &self.status)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// 打开字节流；`cancel` 触发时应尽快返回 [`TransferError::Cancelled`]
    async fn open(&self, request: &FetchRequest, cancel: &CancellationToken)
    -> Result<FetchedStream>;
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: HttpClient,
}

impl HttpFetcher {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }

    // 检查响应状态
    fn check_response_status(status: StatusCode, request: &FetchRequest) -> Result<()> {
        debug!("Response Status: {}", status);

        if request.is_ranged() {
            if status == StatusCode::PARTIAL_CONTENT {
                return Ok(());
            }
            warn!("❌ 范围请求未返回 206: {}, URL: {}", status, request.url);
            return Err(TransferError::transport(
                Some(status.as_u16()),
                format!(
                    "范围请求 bytes={}- 未被接受，状态码: {}，URL: {}",
                    request.offset, status, request.url
                ),
            ));
        }

        match status {
            StatusCode::NO_CONTENT => Err(TransferError::ProtocolViolation(format!(
                "响应缺少数据体 ({})，URL: {}",
                status, request.url
            ))),
            status if status.is_success() => Ok(()),
            _ => {
                warn!("❌ 非成功状态码: {}", status);
                Err(TransferError::transport(
                    Some(status.as_u16()),
                    format!("HTTP 请求失败，状态码: {}，URL: {}", status, request.url),
                ))
            }
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn open(
        &self,
        request: &FetchRequest,
        cancel: &CancellationToken,
    ) -> Result<FetchedStream> {
        let mut builder = self.client.inner.get(&request.url);
        if let Some(range) = request.range_header() {
            debug!("续传请求: {} Range: {}", request.url, range);
            builder = builder.header(RANGE, range);
        }

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransferError::Cancelled),
            response = builder.send() => response?,
        };

        let status = response.status();
        Self::check_response_status(status, request)?;

        let content_length = response.content_length();
        debug!("Content Length: {:?}", content_length);

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(TransferError::from))
            .boxed();

        Ok(FetchedStream {
            status: status.as_u16(),
            content_length,
            body,
        })
    }
}
