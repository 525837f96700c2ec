//! 挑戰驗證：自我檢查、觸發驗證與輪詢，並以固定間隔有限次重試。

use std::{fmt, thread, time::Duration};

use chrono::Utc;
use reqwest::{Method, StatusCode};
use serde::Deserialize;

use crate::{
    authorization::Authorization,
    challenge::{Challenge, ChallengeStatus, ChallengeType, WELL_KNOWN_PREFIX},
    client::{Client, ClientError, Result},
    payload::ChallengeResponsePayload,
};

/// 重試之間的等待方式。
pub trait Delay {
    fn sleep(&self, duration: Duration);
}

/// 以 [`thread::sleep`] 實際等待。
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadDelay;

impl Delay for ThreadDelay {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// 不等待，適合測試。
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelay;

impl Delay for NoDelay {
    fn sleep(&self, _duration: Duration) {}
}

/// 單一授權在一輪驗證中經過的狀態。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationState {
    Pending,
    /// 驗證檔案必須已由呼叫端公開。
    Publishing,
    /// 向網域本身取回驗證檔案（僅 HTTP-01）。
    SelfChecking,
    /// 以已簽名請求要求頒發機構開始驗證。
    Requesting,
    /// 讀取挑戰的最新狀態。
    Polling,
    Valid,
    Failed,
}

impl fmt::Display for ValidationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Publishing => "publishing",
            Self::SelfChecking => "self-checking",
            Self::Requesting => "requesting",
            Self::Polling => "polling",
            Self::Valid => "valid",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Deserialize)]
struct ChallengeUpdate {
    #[serde(default)]
    status: ChallengeStatus,
}

fn enter(domain: &str, state: ValidationState) -> ValidationState {
    log::trace!("{domain}: {state}");
    state
}

impl Client {
    /// 依序驗證每個授權中指定類型的挑戰。
    ///
    /// 每個授權最多進行 `max_retries` 輪，輪與輪之間等待設定的間隔（最後一輪之後不等待）。
    /// 任一授權用盡次數即回傳 [`ClientError::ValidationExhausted`]，之後的授權不會被處理。
    ///
    /// 呼叫前，HTTP-01 的驗證檔案（見 [`Authorization::file`]）必須已經公開。
    pub fn validate(
        &mut self,
        authorizations: &[Authorization],
        max_retries: u32,
        challenge_type: &ChallengeType,
    ) -> Result<()> {
        for authorization in authorizations {
            self.validate_authorization(authorization, max_retries, challenge_type)?;
        }
        Ok(())
    }

    fn validate_authorization(
        &mut self,
        authorization: &Authorization,
        max_retries: u32,
        challenge_type: &ChallengeType,
    ) -> Result<()> {
        let domain = authorization.domain();
        let challenge =
            authorization
                .challenge(challenge_type)
                .ok_or_else(|| ClientError::ChallengeNotFound {
                    domain: domain.to_string(),
                    challenge_type: challenge_type.to_string(),
                })?;
        if authorization.is_expired(Utc::now()) {
            log::warn!("Authorization for {domain} has expired, the authority will likely refuse it");
        }

        for attempt in 1..=max_retries {
            match self.attempt(authorization, challenge)? {
                ValidationState::Valid => {
                    log::debug!("{domain} validated after {attempt} attempt(s)");
                    return Ok(());
                }
                state => log::debug!("{domain}: attempt {attempt}/{max_retries} ended {state}"),
            }
            if attempt < max_retries {
                self.delay.sleep(self.backoff);
            }
        }

        log::warn!("Giving up on {domain} after {max_retries} attempt(s)");
        Err(ClientError::ValidationExhausted {
            domain: domain.to_string(),
            attempts: max_retries,
        })
    }

    /// 一輪驗證，回傳結束時的狀態（[`ValidationState::Valid`] 或 [`ValidationState::Failed`]）。
    fn attempt(
        &mut self,
        authorization: &Authorization,
        challenge: &Challenge,
    ) -> Result<ValidationState> {
        let domain = authorization.domain();
        enter(domain, ValidationState::Pending);
        enter(domain, ValidationState::Publishing);

        if challenge.challenge_type == ChallengeType::Http01 {
            enter(domain, ValidationState::SelfChecking);
            if !self.self_check(domain, challenge) {
                return Ok(enter(domain, ValidationState::Failed));
            }
        }

        enter(domain, ValidationState::Requesting);
        self.request_validation(challenge, &authorization.thumbprint)?;

        enter(domain, ValidationState::Polling);
        let state = match self.poll(challenge)? {
            ChallengeStatus::Valid => ValidationState::Valid,
            _ => ValidationState::Failed,
        };
        Ok(enter(domain, state))
    }

    /// 確認驗證檔案可以從網域本身取得。404 或連線失敗都視為尚未就緒。
    ///
    /// 這個請求不會送往頒發機構，因此不處理 nonce。
    fn self_check(&self, domain: &str, challenge: &Challenge) -> bool {
        let url = format!("http://{domain}{WELL_KNOWN_PREFIX}{}", challenge.token);
        match self.transport.send(Method::GET, &url, None) {
            Ok(response) if response.status == StatusCode::NOT_FOUND => {
                log::debug!("{url} is not published yet");
                false
            }
            Ok(_) => true,
            Err(e) => {
                log::warn!("Self-check of {url} failed: {e}");
                false
            }
        }
    }

    /// 送出 key authorization，要求頒發機構開始驗證。
    fn request_validation(&mut self, challenge: &Challenge, thumbprint: &str) -> Result<()> {
        let payload = ChallengeResponsePayload::new(challenge.key_authorization(thumbprint));
        self.request("challenge", &payload, &challenge.uri)?;
        Ok(())
    }

    /// 讀取挑戰目前的狀態。
    fn poll(&mut self, challenge: &Challenge) -> Result<ChallengeStatus> {
        let response = self.fetch(&challenge.uri)?;
        let update: ChallengeUpdate = response.json()?;
        Ok(update.status)
    }
}
