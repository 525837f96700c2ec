use serde::Serialize;
use thiserror::Error;

use crate::{base64::Base64, jwk::Jwk, signature::ALGORITHM};

/// 定義保護標頭產生過程中可能的錯誤類型。
#[derive(Debug, Error)]
pub enum ProtectionError {
    /// JSON 序列化錯誤
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// 自定義的結果型別，錯誤類型為 [`ProtectionError`]
type Result<T> = std::result::Result<T, ProtectionError>;

/// 未受保護的 JWS 標頭，隨請求一併送出：`{alg, jwk}`。
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Header {
    pub alg: String,
    pub jwk: Jwk,
}

/// 受保護的 JWS 標頭：`{alg, jwk, nonce}`。
///
/// 舊版協議不使用 `url` 與 `kid`，每個請求都攜帶完整的 `jwk`。
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProtectedHeader {
    /// 簽章演算法
    pub alg: String,
    /// 帳戶公鑰
    pub jwk: Jwk,
    /// 用於防止重放攻擊的隨機數
    pub nonce: String,
}

impl ProtectedHeader {
    /// 序列化為 JSON 後轉換為 Base64。
    pub fn to_base64(&self) -> Result<Base64> {
        Ok(Base64::new(serde_json::to_string(self)?))
    }
}

/// 保護標頭產生器，持有帳戶的 JWK，每次請求時填入當下的 nonce。
#[derive(Debug, Clone)]
pub struct Protection {
    jwk: Jwk,
}

impl Protection {
    pub fn new(jwk: Jwk) -> Self {
        Self { jwk }
    }

    /// 不含 nonce 的公開標頭。
    pub fn header(&self) -> Header {
        Header {
            alg: ALGORITHM.to_string(),
            jwk: self.jwk.clone(),
        }
    }

    /// 以指定 nonce 產生受保護標頭。
    pub fn create_header(&self, nonce: impl Into<String>) -> ProtectedHeader {
        ProtectedHeader {
            alg: ALGORITHM.to_string(),
            jwk: self.jwk.clone(),
            nonce: nonce.into(),
        }
    }
}
