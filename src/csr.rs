use std::result;

use openssl::{
    hash::MessageDigest,
    stack::Stack,
    x509::{extension::SubjectAlternativeName, X509NameBuilder, X509Req},
};
use thiserror::Error;

use crate::{
    key_pair::KeyPair,
    pem::{self, PemError},
};

/// 用於描述建立 CSR（證書簽名請求）過程中可能發生的錯誤。
#[derive(Debug, Error)]
pub enum CsrError {
    #[error("Openssl error: {0}")]
    OpensslError(#[from] openssl::error::ErrorStack),
    #[error("No SAN entries")]
    NoSanEntries,
    #[error("Common name {0} is not one of the SAN entries")]
    CommonNameNotInSan(String),
    #[error("{0}")]
    Pem(#[from] PemError),
}

/// 為簡化錯誤處理定義 Result 類型
type Result<T> = result::Result<T, CsrError>;

/// CSR 建構器：主體 CN 為主要網域，SAN 擴展列出所有網域，以 SHA-512 簽署。
///
/// # 範例
///
/// ```no_run
/// use racme_legacy::{csr::CSR, key_pair::KeyPair};
///
/// let key_pair = KeyPair::generate(2048)?;
/// let csr = CSR::new()
///     .set_san("example.com")
///     .set_san("www.example.com")
///     .build(&key_pair)?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct CSR {
    common_name: Option<String>,
    san_entries: Vec<String>,
}

impl CSR {
    pub fn new() -> Self {
        Self::default()
    }

    /// 新增一個 DNS 主體替代名稱 (SAN)。
    pub fn set_san(mut self, dns_name: &str) -> Self {
        self.san_entries.push(dns_name.to_string());
        self
    }

    /// 指定主體 CN；未指定時使用第一個 SAN。
    pub fn common_name(mut self, common_name: &str) -> Self {
        self.common_name = Some(common_name.to_string());
        self
    }

    /// 根據目前的設定以指定金鑰對簽署一個 X509 證書簽名請求。
    ///
    /// # 錯誤
    ///
    /// - 沒有任何 SAN 項目時回傳 [`CsrError::NoSanEntries`]。
    /// - 指定的 CN 不在 SAN 清單中時回傳 [`CsrError::CommonNameNotInSan`]。
    pub fn build(self, key_pair: &KeyPair) -> Result<X509Req> {
        let first = self.san_entries.first().ok_or(CsrError::NoSanEntries)?;
        let common_name = self.common_name.as_ref().unwrap_or(first);
        if !self.san_entries.contains(common_name) {
            return Err(CsrError::CommonNameNotInSan(common_name.clone()));
        }

        let mut req_builder = X509Req::builder()?;

        let mut name = X509NameBuilder::new()?;
        name.append_entry_by_text("CN", common_name)?;
        req_builder.set_subject_name(&name.build())?;

        let mut san_builder = SubjectAlternativeName::new();
        for entry in &self.san_entries {
            san_builder.dns(entry);
        }
        let san_extension = san_builder.build(&req_builder.x509v3_context(None))?;

        let mut stack = Stack::new()?;
        stack.push(san_extension)?;
        req_builder.add_extensions(&stack)?;

        req_builder.set_pubkey(&key_pair.pri_key)?;
        req_builder.sign(&key_pair.pri_key, MessageDigest::sha512())?;

        Ok(req_builder.build())
    }
}

/// 將 CSR 轉成 DER 位元組。
pub fn to_der(req: &X509Req) -> Result<Vec<u8>> {
    Ok(req.to_der()?)
}

/// 將 CSR 轉成 `CERTIFICATE REQUEST` PEM 區塊。
pub fn to_pem(req: &X509Req) -> Result<String> {
    Ok(pem::to_pem(pem::CERTIFICATE_REQUEST, &to_der(req)?)?)
}
