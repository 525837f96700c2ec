//! 此模組負責組裝每個 API 呼叫所使用的 JWS 信封：
//! 公開標頭、受保護標頭、載荷與簽名。

use std::result;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::{
    base64::{Base64, DecodeError},
    key_pair::KeyPair,
    payload::{PayloadError, PayloadT},
    protection::{Header, Protection, ProtectionError},
    signature::{create_signature, SignatureError},
};

/// 表示與 JWS 相關的錯誤。
#[derive(Error, Debug)]
pub enum JwsError {
    #[error("Base64 decode error: {0}")]
    Base64DecodeError(#[from] DecodeError),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Protection error: {0}")]
    Protection(#[from] ProtectionError),
    #[error("{0}")]
    Signature(#[from] SignatureError),
    #[error("{0}")]
    Payload(#[from] PayloadError),
    #[error("Payload must serialize to a JSON object")]
    PayloadNotObject,
}

type Result<T> = result::Result<T, JwsError>;

/// 一個已簽名的 JWS 物件。
///
/// 除了 `protected`、`payload` 與 `signature` 三個編碼欄位外，
/// 舊版協議另外要求附上未受保護的 `header`。
#[derive(Serialize, Debug, Clone)]
pub struct Jws {
    header: Header,
    protected: String,
    payload: String,
    signature: String,
}

impl Jws {
    /// 簽署一個載荷。
    ///
    /// 載荷會先通過驗證，接著在 JSON 物件末端加入 `"resource": <resource>`，
    /// 然後與受保護標頭分別編碼，最後以帳戶金鑰簽署 `protected.payload`。
    ///
    /// # 錯誤
    ///
    /// - 載荷驗證失敗或不是 JSON 物件。
    /// - 簽名器失敗（[`JwsError::Signature`]），此錯誤不會自動重試。
    pub fn sign<P: PayloadT>(
        payload: &P,
        resource: &str,
        protection: &Protection,
        key_pair: &KeyPair,
        nonce: &str,
    ) -> Result<Self> {
        payload.validate()?;

        let mut value = serde_json::to_value(payload)?;
        value
            .as_object_mut()
            .ok_or(JwsError::PayloadNotObject)?
            .insert("resource".to_string(), Value::String(resource.to_string()));

        let payload_b64 = Base64::new(serde_json::to_string(&value)?);
        let header_b64 = protection.create_header(nonce).to_base64()?;
        let signature_b64 = create_signature(&header_b64, &payload_b64, key_pair)?;

        Ok(Jws {
            header: protection.header(),
            protected: header_b64.base64_url(),
            payload: payload_b64.base64_url(),
            signature: signature_b64.base64_url(),
        })
    }

    /// 將 `Jws` 實例序列化為 JSON 格式的字串。
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn protected(&self) -> &str {
        &self.protected
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }
}

/// 伺服器端看到的 JWS，僅用於檢視已送出的請求內容。
#[derive(Deserialize, Debug, Clone)]
pub struct ReceivedJws {
    pub protected: String,
    pub payload: String,
    pub signature: String,
}

impl ReceivedJws {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// 解碼後的受保護標頭。
    pub fn protected_header(&self) -> Result<Value> {
        Self::decode_part(&self.protected)
    }

    /// 解碼後的載荷。
    pub fn payload_json(&self) -> Result<Value> {
        Self::decode_part(&self.payload)
    }

    fn decode_part(part: &str) -> Result<Value> {
        let bytes = Base64::from_url(part)?.decode()?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{jwk::Jwk, payload::NewAuthorizationPayload};
    use openssl::{hash::MessageDigest, sign::Verifier};

    fn protection(key_pair: &KeyPair) -> Protection {
        Protection::new(Jwk::new(key_pair).unwrap())
    }

    #[test]
    fn test_resource_is_injected_last() {
        let key_pair = KeyPair::generate(2048).unwrap();
        let payload = NewAuthorizationPayload::new("example.com");
        let jws = Jws::sign(&payload, "new-authz", &protection(&key_pair), &key_pair, "n1")
            .unwrap();

        let decoded = Base64::from_url(jws.payload()).unwrap().decode().unwrap();
        assert_eq!(
            String::from_utf8(decoded).unwrap(),
            r#"{"identifier":{"type":"dns","value":"example.com"},"resource":"new-authz"}"#
        );
    }

    #[test]
    fn test_envelope_shape_and_signature() {
        let key_pair = KeyPair::generate(2048).unwrap();
        let jws = Jws::sign(
            &NewAuthorizationPayload::new("example.com"),
            "new-authz",
            &protection(&key_pair),
            &key_pair,
            "nonce-abc",
        )
        .unwrap();

        let json: Value = serde_json::from_str(&jws.to_json().unwrap()).unwrap();
        assert_eq!(json["header"]["alg"], "RS256");
        assert_eq!(json["header"]["jwk"]["kty"], "RSA");
        assert!(json["header"].get("nonce").is_none());

        let received = ReceivedJws::from_json(&jws.to_json().unwrap()).unwrap();
        let protected = received.protected_header().unwrap();
        assert_eq!(protected["nonce"], "nonce-abc");
        assert_eq!(protected["jwk"], json["header"]["jwk"]);

        let signature = Base64::from_url(jws.signature()).unwrap().decode().unwrap();
        let mut verifier = Verifier::new(MessageDigest::sha256(), &key_pair.pub_key).unwrap();
        verifier
            .update(format!("{}.{}", jws.protected(), jws.payload()).as_bytes())
            .unwrap();
        assert!(verifier.verify(&signature).unwrap());
    }

    #[test]
    fn test_invalid_payload_is_rejected_before_signing() {
        let key_pair = KeyPair::generate(2048).unwrap();
        let result = Jws::sign(
            &NewAuthorizationPayload::new(""),
            "new-authz",
            &protection(&key_pair),
            &key_pair,
            "n",
        );
        assert!(matches!(result, Err(JwsError::Payload(_))));
    }
}
