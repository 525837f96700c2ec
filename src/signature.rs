use openssl::{hash::MessageDigest, sign::Signer};
use thiserror::Error;

use crate::{base64::Base64, key_pair::KeyPair};

/// 簽名過程中 OpenSSL 回報的錯誤，通常代表金鑰已損毀或無法使用。
#[derive(Debug, Error)]
#[error("Signing error: {0}")]
pub struct SignatureError(#[from] openssl::error::ErrorStack);

/// JWS 標頭中使用的演算法識別。
pub const ALGORITHM: &str = "RS256";

/// 以 RSASSA-PKCS1-v1_5 + SHA-256 簽署 `header.payload`。
///
/// 兩個參數皆為已編碼的資料，簽名輸入使用它們的 URL 安全字串表示，
/// 回傳值為簽名位元組的 Base64 封裝。
pub fn create_signature(
    header_b64: &Base64,
    payload_b64: &Base64,
    key_pair: &KeyPair,
) -> Result<Base64, SignatureError> {
    let signing_input = format!("{}.{}", header_b64.base64_url(), payload_b64.base64_url());
    sign_bytes(signing_input.as_bytes(), key_pair)
}

fn sign_bytes(data: &[u8], key_pair: &KeyPair) -> Result<Base64, SignatureError> {
    let mut signer = Signer::new(MessageDigest::sha256(), &key_pair.pri_key)?;
    signer.update(data)?;
    Ok(Base64::new(signer.sign_to_vec()?))
}
