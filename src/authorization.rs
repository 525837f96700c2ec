use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::{
    challenge::{Challenge, ChallengeFile, ChallengeType},
    client::{Client, Result},
    payload::{Identifier, NewAuthorizationPayload},
};

/// 一個網域的授權，以及伺服器提供的所有挑戰。
///
/// 只存在於記憶體中；`thumbprint` 是建立授權時帳戶金鑰的縮影。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorization {
    pub identifier: Identifier,
    pub expires: Option<DateTime<Utc>>,
    pub challenges: Vec<Challenge>,
    pub thumbprint: String,
}

#[derive(Deserialize)]
struct AuthorizationResponse {
    identifier: Identifier,
    #[serde(default)]
    expires: Option<String>,
    #[serde(default)]
    challenges: Vec<Challenge>,
}

impl Authorization {
    /// 解析 `new-authz` 的回應內容。
    pub fn from_json(body: &[u8], thumbprint: &str) -> Result<Self> {
        let response: AuthorizationResponse = serde_json::from_slice(body)?;
        let expires = response.expires.as_deref().and_then(|expires| {
            DateTime::parse_from_rfc3339(expires)
                .map(|t| t.with_timezone(&Utc))
                .inspect_err(|e| log::warn!("Ignoring unparseable expiry {expires:?}: {e}"))
                .ok()
        });

        Ok(Self {
            identifier: response.identifier,
            expires,
            challenges: response.challenges,
            thumbprint: thumbprint.to_string(),
        })
    }

    pub fn domain(&self) -> &str {
        &self.identifier.value
    }

    /// 找出指定類型的挑戰。
    pub fn challenge(&self, challenge_type: &ChallengeType) -> Option<&Challenge> {
        self.challenges
            .iter()
            .find(|c| &c.challenge_type == challenge_type)
    }

    /// HTTP-01 挑戰需要公開的檔案；沒有 HTTP-01 挑戰時為 `None`。
    pub fn file(&self) -> Option<ChallengeFile> {
        self.challenge(&ChallengeType::Http01)
            .map(|c| c.file(&self.thumbprint))
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_some_and(|expires| expires <= now)
    }
}

impl Client {
    /// 依序為每個網域送出 `new-authz`，回傳順序與輸入相同。
    ///
    /// 任何一個網域失敗都會立即回傳錯誤，不會重試。
    pub fn authorize(&mut self, domains: &[&str]) -> Result<Vec<Authorization>> {
        let url = self.endpoint("new-authz")?;
        let thumbprint = self.thumbprint()?.to_string();

        domains
            .iter()
            .map(|domain| {
                let payload = NewAuthorizationPayload::new(domain);
                let response = self.request("new-authz", &payload, &url)?;
                let authorization = Authorization::from_json(&response.body, &thumbprint)?;
                log::debug!(
                    "Authorization for {} offers {} challenge(s)",
                    authorization.domain(),
                    authorization.challenges.len()
                );
                Ok(authorization)
            })
            .collect()
    }
}
