use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::base64::Base64;

/// 載荷驗證失敗。
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid payload: {0}")]
pub struct PayloadError(pub String);

/// 定義所有 API 載荷（Payload）必須實作的功能。
///
/// 載荷在簽名前都會先經過 [`PayloadT::validate`]，並由 JWS 建構器補上 `resource` 欄位。
pub trait PayloadT: Serialize {
    /// 將載荷轉換成 JSON 格式的字串。
    fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// 驗證載荷資料是否符合協議要求。
    fn validate(&self) -> Result<(), PayloadError>;
}

/// 將聯絡資訊補上 `mailto:` 前綴，已有前綴時保持原樣。
pub(crate) fn mailto(contact: &str) -> String {
    if contact.starts_with("mailto:") {
        contact.to_string()
    } else {
        format!("mailto:{}", contact)
    }
}

fn validate_contact(contact: &[String]) -> Result<(), PayloadError> {
    if contact.is_empty() || contact.iter().any(|c| c.trim_start_matches("mailto:").is_empty()) {
        return Err(PayloadError("Contact information is required".into()));
    }
    Ok(())
}

/// `new-reg` 請求的載荷。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRegistrationPayload {
    pub contact: Vec<String>,
}

impl NewRegistrationPayload {
    pub fn new(contact: &str) -> Self {
        Self {
            contact: vec![mailto(contact)],
        }
    }
}

impl PayloadT for NewRegistrationPayload {
    fn validate(&self) -> Result<(), PayloadError> {
        validate_contact(&self.contact)
    }
}

/// 同意服務條款時送往帳戶 URL 的 `reg` 載荷。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgreementPayload {
    pub contact: Vec<String>,
    pub agreement: String,
}

impl AgreementPayload {
    pub fn new(contact: &str, agreement: &str) -> Self {
        Self {
            contact: vec![mailto(contact)],
            agreement: agreement.to_string(),
        }
    }
}

impl PayloadT for AgreementPayload {
    fn validate(&self) -> Result<(), PayloadError> {
        validate_contact(&self.contact)?;
        if self.agreement.is_empty() {
            return Err(PayloadError("Agreement URL cannot be empty".into()));
        }
        Ok(())
    }
}

/// 識別項，本協議版本中類型固定為 `"dns"`。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    #[serde(rename = "type")]
    pub type_: String,
    pub value: String,
}

impl Identifier {
    pub fn dns(domain: &str) -> Self {
        Self {
            type_: "dns".to_string(),
            value: domain.to_string(),
        }
    }
}

/// `new-authz` 請求的載荷。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAuthorizationPayload {
    pub identifier: Identifier,
}

impl NewAuthorizationPayload {
    pub fn new(domain: &str) -> Self {
        Self {
            identifier: Identifier::dns(domain),
        }
    }
}

impl PayloadT for NewAuthorizationPayload {
    fn validate(&self) -> Result<(), PayloadError> {
        if self.identifier.type_ != "dns" {
            return Err(PayloadError("Identifier type must be 'dns'".into()));
        }
        if self.identifier.value.is_empty() {
            return Err(PayloadError("Identifier value cannot be empty".into()));
        }
        Ok(())
    }
}

/// 觸發挑戰驗證的載荷，內容為 `token.thumbprint`。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeResponsePayload {
    #[serde(rename = "keyAuthorization")]
    pub key_authorization: String,
}

impl ChallengeResponsePayload {
    pub fn new(key_authorization: impl Into<String>) -> Self {
        Self {
            key_authorization: key_authorization.into(),
        }
    }
}

impl PayloadT for ChallengeResponsePayload {
    fn validate(&self) -> Result<(), PayloadError> {
        match self.key_authorization.split_once('.') {
            Some((token, thumbprint)) if !token.is_empty() && !thumbprint.is_empty() => Ok(()),
            _ => Err(PayloadError(
                "Key authorization must be 'token.thumbprint'".into(),
            )),
        }
    }
}

/// `new-cert` 請求的載荷，CSR 以 DER 編碼後再做 URL 安全 Base64。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCertificatePayload {
    #[serde(rename = "csr")]
    csr_b64_str: String,
}

impl NewCertificatePayload {
    pub fn new(csr_der: &Base64) -> Self {
        Self {
            csr_b64_str: csr_der.base64_url(),
        }
    }
}

impl PayloadT for NewCertificatePayload {
    fn validate(&self) -> Result<(), PayloadError> {
        if self.csr_b64_str.is_empty() {
            return Err(PayloadError("CSR cannot be empty".into()));
        }
        Ok(())
    }
}
