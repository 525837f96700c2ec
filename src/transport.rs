//! HTTP 傳輸協作者。
//!
//! 核心流程只透過 [`Transport`] 介面送出請求，非 2xx 的回應會原樣回傳，
//! 由呼叫端依狀態碼與標頭決定下一步（例如註冊時的 409）。

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use reqwest::{
    blocking::Client,
    header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE},
    Method, StatusCode,
};
use serde::de::DeserializeOwned;
use thiserror::Error;

/// 傳輸層錯誤：連線失敗、逾時或無法建構請求。
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Invalid header {name}: {value}")]
    InvalidHeader { name: String, value: String },
    #[error("Transport failure: {0}")]
    Failed(String),
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// 一次 HTTP 往返的結果。
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    /// 多值且不分大小寫的標頭集合。
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Response {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// 取得第一個同名標頭的值；值不是合法字串時視為不存在。
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// 取得所有同名標頭的值。
    pub fn header_all(&self, name: &str) -> Vec<&str> {
        self.headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect()
    }

    /// 以 UTF-8（失敗字元以替代符號取代）讀取回應內容。
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> std::result::Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// 傳輸協作者介面。
pub trait Transport: std::fmt::Debug {
    /// 送出請求並回傳狀態碼、標頭與內容。帶有 `body` 時以 JOSE JSON 送出。
    fn send(&self, method: Method, url: &str, body: Option<&str>) -> Result<Response>;
}

/// 以 `reqwest` 阻塞式客戶端實作的傳輸層，會自動跟隨轉址。
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new() -> Result<Self> {
        Self::with_timeout(Self::DEFAULT_TIMEOUT)
    }

    /// 使用指定的單次請求逾時建立傳輸層。
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn send(&self, method: Method, url: &str, body: Option<&str>) -> Result<Response> {
        log::trace!("{method} {url}");
        let mut request = self.client.request(method, url);
        if let Some(body) = body {
            request = request
                .header(CONTENT_TYPE, "application/jose+json")
                .body(body.to_string());
        }

        let response = request.send()?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes()?.to_vec();

        Ok(Response {
            status,
            headers,
            body,
        })
    }
}

/// 已記錄的請求。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<String>,
}

/// 預先設定的模擬回應。
#[derive(Debug, Clone)]
pub struct MockResponse {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    failure: Option<String>,
}

impl MockResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
            failure: None,
        }
    }

    /// 模擬傳輸層失敗（例如連線被拒）。
    pub fn transport_error(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::new(0)
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn nonce(self, nonce: &str) -> Self {
        self.header("Replay-Nonce", nonce)
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn json(self, value: &serde_json::Value) -> Self {
        let body = value.to_string();
        self.header("Content-Type", "application/json").body(body)
    }

    fn to_response(&self) -> Result<Response> {
        if let Some(message) = &self.failure {
            return Err(TransportError::Failed(message.clone()));
        }

        let status = StatusCode::from_u16(self.status)
            .map_err(|e| TransportError::Failed(e.to_string()))?;
        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            let invalid = || TransportError::InvalidHeader {
                name: name.clone(),
                value: value.clone(),
            };
            headers.append(
                HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?,
                HeaderValue::from_str(value).map_err(|_| invalid())?,
            );
        }

        Ok(Response {
            status,
            headers,
            body: self.body.clone(),
        })
    }
}

#[derive(Debug, Default)]
struct MockState {
    routes: HashMap<(Method, String), VecDeque<MockResponse>>,
    requests: Vec<RecordedRequest>,
}

/// 依 (方法, URL) 回放預設回應並記錄所有請求的模擬傳輸層。
///
/// 同一路由可排入多個回應，依序取用，最後一個會持續重複；
/// 未設定的路由一律回傳 404。複製出的實例共享同一份狀態，
/// 因此可在交給客戶端後繼續檢查請求紀錄。
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 為指定路由排入一個回應。
    pub fn on(&self, method: Method, url: &str, response: MockResponse) -> &Self {
        self.state()
            .routes
            .entry((method, url.to_string()))
            .or_default()
            .push_back(response);
        self
    }

    /// 目前為止收到的所有請求。
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state().requests.clone()
    }

    /// 指定方法與 URL 的請求數量。
    pub fn count(&self, method: &Method, url: &str) -> usize {
        self.state()
            .requests
            .iter()
            .filter(|r| &r.method == method && r.url == url)
            .count()
    }
}

impl Transport for MockTransport {
    fn send(&self, method: Method, url: &str, body: Option<&str>) -> Result<Response> {
        let mut state = self.state();
        state.requests.push(RecordedRequest {
            method: method.clone(),
            url: url.to_string(),
            body: body.map(str::to_string),
        });

        let reply = match state.routes.get_mut(&(method, url.to_string())) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };

        match reply {
            Some(reply) => reply.to_response(),
            None => MockResponse::new(404).to_response(),
        }
    }
}
