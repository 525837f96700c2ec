use std::collections::HashMap;

use reqwest::Method;
use serde_json::Value;
use thiserror::Error;

use crate::transport::{Response, Transport, TransportError};

/// 表示處理目錄操作時可能發生的錯誤類型。
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// 目錄無法取得或無法解析，客戶端無法在此狀態下運作。
    #[error("Directory unavailable at {url}: {reason}")]
    Unavailable { url: String, reason: String },
    /// 目錄中沒有列出此操作。
    #[error("Unknown operation: {0} is not listed in the directory")]
    UnknownOperation(String),
}

/// 簡化目錄操作結果的型別。
type DirectoryResult<T> = std::result::Result<T, DirectoryError>;

/// 伺服器公布的操作名稱與端點 URL 對照表，例如 `new-reg`、`new-authz`、`new-cert`。
///
/// 每個客戶端只取得一次，之後不再變動。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    url: String,
    endpoints: HashMap<String, String>,
}

impl Directory {
    /// 以未簽名的 GET 取得目錄。
    ///
    /// 同時回傳原始回應，讓呼叫端擷取第一個 nonce。
    pub fn fetch(transport: &dyn Transport, url: &str) -> DirectoryResult<(Self, Response)> {
        let unavailable = |reason: String| DirectoryError::Unavailable {
            url: url.to_string(),
            reason,
        };

        log::debug!("Fetching directory {url}");
        let response = transport
            .send(Method::GET, url, None)
            .map_err(|e: TransportError| unavailable(e.to_string()))?;
        if !response.is_success() {
            return Err(unavailable(format!(
                "status {}: {}",
                response.status,
                response.text()
            )));
        }

        let directory = Self::parse(url, &response.body).map_err(unavailable)?;
        Ok((directory, response))
    }

    /// 解析目錄 JSON，只保留字串值的項目（例如忽略 `meta`）。
    fn parse(url: &str, body: &[u8]) -> Result<Self, String> {
        let value: Value = serde_json::from_slice(body).map_err(|e| e.to_string())?;
        let object = value
            .as_object()
            .ok_or_else(|| "directory is not a JSON object".to_string())?;

        let endpoints: HashMap<String, String> = object
            .iter()
            .filter_map(|(name, value)| Some((name.clone(), value.as_str()?.to_string())))
            .collect();
        if endpoints.is_empty() {
            return Err("directory lists no endpoints".to_string());
        }

        Ok(Self {
            url: url.to_string(),
            endpoints,
        })
    }

    /// 取得操作對應的端點 URL。
    pub fn url_for(&self, operation: &str) -> DirectoryResult<&str> {
        self.endpoints
            .get(operation)
            .map(String::as_str)
            .ok_or_else(|| DirectoryError::UnknownOperation(operation.to_string()))
    }

    /// 目錄本身的 URL。
    pub fn url(&self) -> &str {
        &self.url
    }

    /// 目錄是否列出此操作。
    pub fn contains(&self, operation: &str) -> bool {
        self.endpoints.contains_key(operation)
    }
}
