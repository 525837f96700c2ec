use openssl::sha::sha256;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{base64::Base64, key_pair::KeyPair};

/// JWK 相關操作的錯誤類型。
#[derive(Debug, Error)]
pub enum JwkError {
    /// 金鑰轉換失敗。
    #[error("Failed to convert key: {0}")]
    KeyConversionError(String),
    /// 序列化錯誤。
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// RSA 公鑰的 JSON Web Key 表示。
///
/// 欄位宣告順序即序列化順序：`e`、`kty`、`n`。縮影（thumbprint）與簽名標頭中的
/// `jwk` 都由此結構產生，因此兩處的 JSON 完全一致，伺服器端重新計算的縮影也會相同。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    e: String,
    kty: String,
    n: String,
}

impl Jwk {
    /// 根據給定的金鑰對產生 JWK。
    pub fn new(key_pair: &KeyPair) -> Result<Self, JwkError> {
        let components = key_pair
            .rsa_components()
            .map_err(|e| JwkError::KeyConversionError(e.to_string()))?;

        Ok(Jwk {
            e: Base64::new(components.e).base64_url(),
            kty: "RSA".to_string(),
            n: Base64::new(components.n).base64_url(),
        })
    }

    /// 將 JWK 序列化為緊湊的 JSON 字串。
    pub fn to_json(&self) -> Result<String, JwkError> {
        serde_json::to_string(self).map_err(JwkError::from)
    }

    /// 以 SHA-256 雜湊 JWK 的 JSON 表示，並以 URL 安全 Base64 回傳。
    pub fn thumbprint(&self) -> Result<String, JwkError> {
        let hash = sha256(self.to_json()?.as_bytes());
        Ok(Base64::new(hash).base64_url())
    }
}
