use std::{convert::Infallible, fmt, str::FromStr};

use serde::{Deserialize, Deserializer};

/// 表示挑戰的類型，可用於選擇相應的驗證策略。
///
/// 本客戶端只會主動處理 [`ChallengeType::Http01`]；其他類型照常解析與保留，
/// 無法辨識的類型以 [`ChallengeType::Other`] 原樣保存。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChallengeType {
    Http01,
    Dns01,
    TlsAlpn01,
    Other(String),
}

impl ChallengeType {
    /// 返回挑戰類型對應的字串表示。
    pub fn as_str(&self) -> &str {
        match self {
            Self::Http01 => "http-01",
            Self::Dns01 => "dns-01",
            Self::TlsAlpn01 => "tls-alpn-01",
            Self::Other(name) => name,
        }
    }
}

impl FromStr for ChallengeType {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "http-01" => Self::Http01,
            "dns-01" => Self::Dns01,
            "tls-alpn-01" => Self::TlsAlpn01,
            other => Self::Other(other.to_string()),
        })
    }
}

impl fmt::Display for ChallengeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ChallengeType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(name.parse().unwrap_or_else(|never: Infallible| match never {}))
    }
}

/// 表示挑戰的狀態，用來追蹤挑戰進展。
///
/// 伺服器回報的狀態在本地只會被重新讀取，不會被修改。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChallengeStatus {
    #[default]
    Unknown,
    Pending,
    Processing,
    Valid,
    Invalid,
    Revoked,
    Deactivated,
    Expired,
}

impl ChallengeStatus {
    /// 根據字串返回對應的狀態，大小寫不敏感；無法辨識時為 [`ChallengeStatus::Unknown`]。
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pending" => Self::Pending,
            "processing" => Self::Processing,
            "valid" => Self::Valid,
            "invalid" => Self::Invalid,
            "revoked" => Self::Revoked,
            "deactivated" => Self::Deactivated,
            "expired" => Self::Expired,
            _ => Self::Unknown,
        }
    }

    /// 判斷該狀態是否為終結狀態，即無法再進行狀態轉換。
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Valid | Self::Invalid | Self::Revoked | Self::Deactivated | Self::Expired
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Valid => "valid",
            Self::Invalid => "invalid",
            Self::Revoked => "revoked",
            Self::Deactivated => "deactivated",
            Self::Expired => "expired",
        }
    }
}

impl<'de> Deserialize<'de> for ChallengeStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self::parse(&String::deserialize(deserializer)?))
    }
}

/// 授權中的單一挑戰。
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Challenge {
    #[serde(rename = "type")]
    pub challenge_type: ChallengeType,
    #[serde(default)]
    pub status: ChallengeStatus,
    pub token: String,
    /// 觸發與輪詢挑戰的 URL；舊版協議使用 `uri`，也接受 `url`。
    #[serde(alias = "url")]
    pub uri: String,
}

impl Challenge {
    /// 以帳戶金鑰縮影組出 key authorization：`token.thumbprint`。
    pub fn key_authorization(&self, thumbprint: &str) -> String {
        format!("{}.{}", self.token, thumbprint)
    }

    /// HTTP-01 驗證時呼叫端需要公開的檔案。
    pub fn file(&self, thumbprint: &str) -> ChallengeFile {
        ChallengeFile {
            filename: self.token.clone(),
            contents: self.key_authorization(thumbprint),
        }
    }
}

/// HTTP-01 驗證檔案。
///
/// 必須以 `http://{domain}/.well-known/acme-challenge/{filename}` 公開，內容為 `contents`。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeFile {
    pub filename: String,
    pub contents: String,
}

impl ChallengeFile {
    /// 檔案相對於網站根目錄的路徑。
    pub fn path(&self) -> String {
        format!("{}{}", WELL_KNOWN_PREFIX, self.filename)
    }
}

/// HTTP-01 驗證檔案所在的目錄。
pub const WELL_KNOWN_PREFIX: &str = "/.well-known/acme-challenge/";

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_legacy_uri_field() {
        let challenge: Challenge = serde_json::from_value(json!({
            "type": "http-01",
            "status": "pending",
            "uri": "https://ca/acme/challenge/abc/1",
            "token": "tok"
        }))
        .unwrap();

        assert_eq!(challenge.challenge_type, ChallengeType::Http01);
        assert_eq!(challenge.status, ChallengeStatus::Pending);
        assert_eq!(challenge.uri, "https://ca/acme/challenge/abc/1");
    }

    #[test]
    fn test_url_alias_and_unknown_values() {
        let challenge: Challenge = serde_json::from_value(json!({
            "type": "tls-sni-01",
            "status": "weird",
            "url": "https://ca/chall",
            "token": "t"
        }))
        .unwrap();

        assert_eq!(
            challenge.challenge_type,
            ChallengeType::Other("tls-sni-01".into())
        );
        assert_eq!(challenge.status, ChallengeStatus::Unknown);
        assert_eq!(challenge.uri, "https://ca/chall");
    }

    #[test]
    fn test_file_contents() {
        let challenge = Challenge {
            challenge_type: ChallengeType::Http01,
            status: ChallengeStatus::Pending,
            token: "tok".into(),
            uri: "https://ca/c".into(),
        };
        let file = challenge.file("thumb");
        assert_eq!(file.filename, "tok");
        assert_eq!(file.contents, "tok.thumb");
        assert_eq!(file.path(), "/.well-known/acme-challenge/tok");
    }

    #[test]
    fn test_status_terminal() {
        assert!(ChallengeStatus::parse("VALID").is_terminal());
        assert!(!ChallengeStatus::Pending.is_terminal());
        assert!(!ChallengeStatus::Unknown.is_terminal());
    }
}
