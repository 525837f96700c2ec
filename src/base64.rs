//! URL 安全的 Base64 編碼工具，所有簽名內容、token 與 CSR 都經由此處編碼。

use ::base64::{
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    Engine as _,
};
use thiserror::Error;

/// Base64 解碼失敗時回傳的錯誤。
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Invalid base64 input: {0}")]
    Invalid(#[from] ::base64::DecodeError),
}

/// 已編碼的 Base64 資料。
///
/// 內部保存原始位元組，可依需要輸出標準格式或 URL 安全格式。
///
/// ```
/// use racme_legacy::base64::Base64;
///
/// let b64 = Base64::new("Hello, World!");
/// assert_eq!(b64.as_str(), "SGVsbG8sIFdvcmxkIQ==");
/// assert_eq!(b64.base64_url(), "SGVsbG8sIFdvcmxkIQ");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Base64 {
    bytes: Vec<u8>,
    encoded: String,
}

impl Base64 {
    /// 根據輸入資料建立 Base64 編碼。
    pub fn new<T: AsRef<[u8]>>(input: T) -> Self {
        let bytes = input.as_ref().to_vec();
        let encoded = STANDARD.encode(&bytes);
        Self { bytes, encoded }
    }

    /// 從 URL 安全格式（無填充）的字串還原。
    ///
    /// # 錯誤
    ///
    /// 字串含有非 URL 安全字元或長度不合法時回傳 [`DecodeError`]。
    pub fn from_url(url_encoded: &str) -> Result<Self, DecodeError> {
        let bytes = URL_SAFE_NO_PAD.decode(url_encoded.trim_end_matches('='))?;
        Ok(Self::new(bytes))
    }

    /// 從標準 Base64 字串還原。
    pub fn from_encoded(encoded: &str) -> Result<Self, DecodeError> {
        let bytes = STANDARD.decode(encoded)?;
        Ok(Self::new(bytes))
    }

    /// 取得原始位元組。
    pub fn decode(&self) -> Result<Vec<u8>, DecodeError> {
        Ok(self.bytes.clone())
    }

    /// URL 安全格式：`+` → `-`，`/` → `_`，並移除 `=` 填充。
    pub fn base64_url(&self) -> String {
        URL_SAFE_NO_PAD.encode(&self.bytes)
    }

    /// 標準 Base64 字串。
    pub fn as_str(&self) -> &str {
        &self.encoded
    }
}
