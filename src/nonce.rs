use thiserror::Error;

use crate::transport::Response;

/// 回應中攜帶 nonce 的標頭名稱。
pub const REPLAY_NONCE: &str = "Replay-Nonce";

/// 表示在取得 Nonce 時可能發生的錯誤狀況。
#[derive(Error, Debug)]
pub enum NonceError {
    /// 尚未從伺服器取得任何 nonce。
    #[error("No Replay-Nonce has been received yet")]
    Missing,
}

/// 目前有效的防重放 nonce。
///
/// 永遠保存伺服器最近一次回傳的值：簽名時讀取，收到回應後替換。
/// 回應未攜帶 `Replay-Nonce` 時保持原值。錯誤回應也會帶來新的 nonce，
/// 因此每一次往返（無論成功與否）都必須呼叫 [`Nonce::observe`]。
#[derive(Debug, Clone, Default)]
pub struct Nonce {
    value: Option<String>,
}

impl Nonce {
    pub fn new() -> Self {
        Self::default()
    }

    /// 取得目前的 nonce。
    pub fn current(&self) -> Result<&str, NonceError> {
        self.value.as_deref().ok_or(NonceError::Missing)
    }

    /// 從回應中擷取新的 nonce；回傳是否有更新。
    pub fn observe(&mut self, response: &Response) -> bool {
        match response.header(REPLAY_NONCE) {
            Some(nonce) if !nonce.is_empty() => {
                log::trace!("Extracting new nonce");
                self.value = Some(nonce.to_string());
                true
            }
            _ => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MockResponse, MockTransport, Transport};
    use reqwest::Method;

    fn response(mock: MockResponse) -> Response {
        let transport = MockTransport::new();
        transport.on(Method::GET, "https://ca/", mock);
        transport.send(Method::GET, "https://ca/", None).unwrap()
    }

    #[test]
    fn test_missing_before_first_response() {
        let nonce = Nonce::new();
        assert!(nonce.is_empty());
        assert!(matches!(nonce.current(), Err(NonceError::Missing)));
    }

    #[test]
    fn test_observe_replaces_and_keeps() {
        let mut nonce = Nonce::new();
        assert!(nonce.observe(&response(MockResponse::new(200).nonce("first"))));
        assert_eq!(nonce.current().unwrap(), "first");

        assert!(!nonce.observe(&response(MockResponse::new(200))));
        assert_eq!(nonce.current().unwrap(), "first");

        assert!(nonce.observe(&response(MockResponse::new(400).nonce("after-error"))));
        assert_eq!(nonce.current().unwrap(), "after-error");
    }
}
