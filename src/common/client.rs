use reqwest::{
    Client, ClientBuilder,
    header::{ACCEPT, ACCEPT_ENCODING, HeaderMap, HeaderValue, USER_AGENT},
};
use tracing::{debug, error};

use crate::transfer::config::TransferConfig;
use crate::transfer::error::TransferError;

// 传输使用的 HTTP 客户端，携带默认请求头
#[derive(Debug, Clone)]
pub struct HttpClient {
    pub inner: Client,
}

impl HttpClient {
    // 按配置创建客户端；只限制连接超时，不限制整体请求时长
    pub fn new(config: &TransferConfig) -> Result<Self, TransferError> {
        let headers = Self::get_default_headers(&config.user_agent)?;

        let inner = ClientBuilder::new()
            .connect_timeout(config.connect_timeout())
            .default_headers(headers)
            .build()
            .map_err(|e| {
                error!("创建 HTTP 客户端失败: {}", e);
                TransferError::Config(format!("创建 HTTP 客户端失败: {}", e))
            })?;

        debug!("HTTP 客户端已创建, UA: {}", config.user_agent);
        Ok(Self { inner })
    }

    pub fn get_default_headers(user_agent: &str) -> Result<HeaderMap, TransferError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        // 原始字节流，Content-Length 与 Range 偏移才能对得上
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(user_agent)
                .map_err(|e| TransferError::Config(format!("无效的 User-Agent: {}", e)))?,
        );

        Ok(headers)
    }
}
