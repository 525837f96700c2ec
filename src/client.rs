//! 客戶端門面：設定、兩階段建構，以及所有已簽名請求共用的傳送流程。
//!
//! 各項協議操作分別實作於 [`account`](crate::account)、
//! [`authorization`](crate::authorization)、[`validation`](crate::validation)
//! 與 [`certificate`](crate::certificate) 模組中的 `impl Client` 區塊。

use std::{fmt, time::Duration};

use reqwest::Method;
use thiserror::Error;

use crate::{
    certificate::CertificateError,
    directory::{Directory, DirectoryError},
    jws::{Jws, JwsError},
    key_pair::{KeyError, KeyPair},
    nonce::{Nonce, NonceError},
    payload::PayloadT,
    protection::Protection,
    storage::{account_key_path, Storage, StorageError},
    transport::{HttpTransport, Response, Transport, TransportError},
    validation::{Delay, ThreadDelay},
};

/// 客戶端操作可能發生的錯誤。
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Directory unavailable at {url}: {reason}")]
    DirectoryUnavailable { url: String, reason: String },
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),
    #[error("Signing failure: {0}")]
    SigningFailure(JwsError),
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
    #[error("Authority rejected the request ({status}): {body}")]
    AuthorityRejected { status: u16, body: String },
    #[error("Validation of {domain} failed after {attempts} attempt(s)")]
    ValidationExhausted { domain: String, attempts: u32 },
    #[error("Certificate request failure: {0}")]
    CertificateRequestFailure(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Client is not bootstrapped")]
    NotBootstrapped,
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Key error: {0}")]
    Key(#[from] KeyError),
    #[error("Nonce error: {0}")]
    Nonce(#[from] NonceError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Missing {0} header")]
    MissingHeader(&'static str),
    #[error("Registration response carries no terms-of-service link")]
    MissingTermsOfService,
    #[error("No {challenge_type} challenge offered for {domain}")]
    ChallengeNotFound {
        domain: String,
        challenge_type: String,
    },
    #[error("Certificate error: {0}")]
    Certificate(#[from] CertificateError),
}

impl From<DirectoryError> for ClientError {
    fn from(e: DirectoryError) -> Self {
        match e {
            DirectoryError::Unavailable { url, reason } => {
                ClientError::DirectoryUnavailable { url, reason }
            }
            DirectoryError::UnknownOperation(op) => ClientError::UnknownOperation(op),
        }
    }
}

impl From<JwsError> for ClientError {
    fn from(e: JwsError) -> Self {
        match e {
            JwsError::Signature(_) => ClientError::SigningFailure(e),
            other => ClientError::InvalidPayload(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// 帳戶金鑰與憑證金鑰接受的最短 RSA 長度。
pub const MIN_KEY_BITS: u32 = 2048;

/// 憑證頒發機構的環境。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Live,
    Staging,
}

impl Mode {
    /// 此環境的目錄 URL。
    pub fn directory_url(&self) -> &'static str {
        match self {
            Mode::Live => "https://acme-v01.api.letsencrypt.org/directory",
            Mode::Staging => "https://acme-staging.api.letsencrypt.org/directory",
        }
    }
}

/// 用於構建 [`Client`] 實例的構造器，採用 builder 模式。
///
/// 必填項目為金鑰儲存（[`ClientBuilder::store`]）與帳戶識別（[`ClientBuilder::identity`]），
/// 其餘皆有預設值：
/// - 環境：[`Mode::Live`]
/// - 金鑰基底路徑：`"le"`
/// - 帳戶金鑰與憑證金鑰位數：`4096`
/// - 驗證重試間隔：1 秒
pub struct ClientBuilder {
    mode: Mode,
    directory_url: Option<String>,
    store: Option<Box<dyn Storage>>,
    base_path: String,
    identity: Option<String>,
    key_bits: u32,
    certificate_key_bits: u32,
    backoff: Duration,
    delay: Option<Box<dyn Delay>>,
    transport: Option<Box<dyn Transport>>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientBuilder {
    pub const DEFAULT_BASE_PATH: &'static str = "le";
    pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

    pub fn new() -> Self {
        Self {
            mode: Mode::default(),
            directory_url: None,
            store: None,
            base_path: Self::DEFAULT_BASE_PATH.to_string(),
            identity: None,
            key_bits: KeyPair::DEFAULT_BITS,
            certificate_key_bits: KeyPair::DEFAULT_BITS,
            backoff: Self::DEFAULT_BACKOFF,
            delay: None,
            transport: None,
        }
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// 直接指定目錄 URL，優先於 [`ClientBuilder::mode`]。
    pub fn directory_url(mut self, url: &str) -> Self {
        self.directory_url = Some(url.to_string());
        self
    }

    pub fn store(mut self, store: impl Storage + 'static) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    pub fn base_path(mut self, base_path: &str) -> Self {
        self.base_path = base_path.to_string();
        self
    }

    /// 帳戶識別，通常是聯絡用電子郵件；同時決定帳戶金鑰的儲存位置。
    pub fn identity(mut self, identity: &str) -> Self {
        self.identity = Some(identity.to_string());
        self
    }

    pub fn key_bits(mut self, key_bits: u32) -> Self {
        self.key_bits = key_bits;
        self
    }

    /// 每次申請憑證時產生的新金鑰位數。
    pub fn certificate_key_bits(mut self, bits: u32) -> Self {
        self.certificate_key_bits = bits;
        self
    }

    pub fn backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn delay(mut self, delay: impl Delay + 'static) -> Self {
        self.delay = Some(Box::new(delay));
        self
    }

    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Box::new(transport));
        self
    }

    /// 驗證設定並建立尚未連線的客戶端，不進行任何網路或儲存操作。
    ///
    /// # Errors
    ///
    /// 缺少儲存或帳戶識別、識別為空白、金鑰位數過小時回傳 [`ClientError::Configuration`]。
    pub fn build(self) -> Result<Client> {
        let store = self
            .store
            .ok_or_else(|| ClientError::Configuration("a key store is required".into()))?;
        let identity = self
            .identity
            .ok_or_else(|| ClientError::Configuration("an account identity is required".into()))?;
        if identity.trim().is_empty() {
            return Err(ClientError::Configuration(
                "account identity cannot be blank".into(),
            ));
        }
        if let Some(bits) = [self.key_bits, self.certificate_key_bits]
            .into_iter()
            .find(|bits| *bits < MIN_KEY_BITS)
        {
            return Err(ClientError::Configuration(format!(
                "RSA keys shorter than {MIN_KEY_BITS} bits are not accepted: {bits}"
            )));
        }

        let transport = match self.transport {
            Some(transport) => transport,
            None => Box::new(HttpTransport::new()?),
        };

        Ok(Client {
            transport,
            store,
            directory_url: self
                .directory_url
                .unwrap_or_else(|| self.mode.directory_url().to_string()),
            key_path: account_key_path(&self.base_path, &identity),
            identity,
            key_bits: self.key_bits,
            certificate_key_bits: self.certificate_key_bits,
            backoff: self.backoff,
            delay: self.delay.unwrap_or_else(|| Box::new(ThreadDelay)),
            nonce: Nonce::new(),
            session: None,
        })
    }

    /// [`ClientBuilder::build`] 後接著 [`Client::bootstrap`]。
    pub fn connect(self) -> Result<Client> {
        self.build()?.bootstrap()
    }
}

/// 連線後才存在的狀態：目錄與帳戶金鑰。
#[derive(Debug)]
pub(crate) struct Session {
    pub(crate) directory: Directory,
    pub(crate) key_pair: KeyPair,
    pub(crate) protection: Protection,
    pub(crate) thumbprint: String,
}

/// 與憑證頒發機構溝通的客戶端。
///
/// 所有操作都需要 `&mut self`，因此同一個客戶端同時最多只有一個已簽名請求，
/// nonce 嚴格依照「簽名 → 送出 → 擷取」的順序更新。
pub struct Client {
    pub(crate) transport: Box<dyn Transport>,
    store: Box<dyn Storage>,
    directory_url: String,
    key_path: String,
    pub(crate) identity: String,
    key_bits: u32,
    pub(crate) certificate_key_bits: u32,
    pub(crate) backoff: Duration,
    pub(crate) delay: Box<dyn Delay>,
    pub(crate) nonce: Nonce,
    pub(crate) session: Option<Session>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("directory_url", &self.directory_url)
            .field("identity", &self.identity)
            .field("key_path", &self.key_path)
            .field("bootstrapped", &self.session.is_some())
            .finish_non_exhaustive()
    }
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// 取得目錄、記下第一個 nonce，並載入（或產生並保存）帳戶金鑰。
    ///
    /// 目錄只在此處取得一次；無法取得時回傳 [`ClientError::DirectoryUnavailable`]。
    pub fn bootstrap(mut self) -> Result<Self> {
        let (directory, response) = Directory::fetch(&*self.transport, &self.directory_url)?;
        self.nonce.observe(&response);

        let key_pair = KeyPair::load_or_generate(&*self.store, &self.key_path, self.key_bits)?;
        let bits = key_pair.bits()?;
        if bits < MIN_KEY_BITS {
            return Err(ClientError::Configuration(format!(
                "stored account key at {} is only {bits} bits",
                self.key_path
            )));
        }
        let jwk = key_pair.jwk()?;
        let thumbprint = key_pair.thumbprint()?;
        log::debug!("Bootstrapped client for {} against {}", self.identity, directory.url());

        self.session = Some(Session {
            directory,
            key_pair,
            protection: Protection::new(jwk),
            thumbprint,
        });
        Ok(self)
    }

    pub(crate) fn session(&self) -> Result<&Session> {
        self.session.as_ref().ok_or(ClientError::NotBootstrapped)
    }

    /// 帳戶金鑰的縮影，用於組出 key authorization。
    pub fn thumbprint(&self) -> Result<&str> {
        Ok(&self.session()?.thumbprint)
    }

    pub fn directory(&self) -> Result<&Directory> {
        Ok(&self.session()?.directory)
    }

    /// 帳戶識別（聯絡用電子郵件）。
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// 目前持有的 nonce，僅供檢視。
    pub fn nonce(&self) -> Option<&str> {
        self.nonce.current().ok()
    }

    /// 以目錄中的操作名稱查出端點 URL。
    pub(crate) fn endpoint(&self, operation: &str) -> Result<String> {
        Ok(self.session()?.directory.url_for(operation)?.to_string())
    }

    /// 沒有可用 nonce 時，以未簽名的 HEAD 向目錄根取得一個。
    fn refresh_nonce(&mut self) -> Result<()> {
        log::debug!("No nonce available, requesting one from the directory");
        let response = self
            .transport
            .send(Method::HEAD, &self.directory_url, None)?;
        self.nonce.observe(&response);
        self.nonce.current()?;
        Ok(())
    }

    /// 簽署載荷並 POST 至 `url`，回傳原始回應。
    ///
    /// 無論狀態碼為何，回應的 `Replay-Nonce` 都會先被記下。
    pub(crate) fn send_signed<P: PayloadT>(
        &mut self,
        resource: &str,
        payload: &P,
        url: &str,
    ) -> Result<Response> {
        if self.nonce.is_empty() {
            self.refresh_nonce()?;
        }

        let session = self.session.as_ref().ok_or(ClientError::NotBootstrapped)?;
        let jws = Jws::sign(
            payload,
            resource,
            &session.protection,
            &session.key_pair,
            self.nonce.current()?,
        )?;
        let body = jws.to_json()?;

        log::debug!("POST {url} ({resource})");
        let response = self.transport.send(Method::POST, url, Some(&body))?;
        self.nonce.observe(&response);
        log::trace!("{resource} answered with {}", response.status);
        Ok(response)
    }

    /// 與 [`Client::send_signed`] 相同，但非 2xx 回應轉為 [`ClientError::AuthorityRejected`]。
    pub(crate) fn request<P: PayloadT>(
        &mut self,
        resource: &str,
        payload: &P,
        url: &str,
    ) -> Result<Response> {
        let response = self.send_signed(resource, payload, url)?;
        ensure_success(response)
    }

    /// 向頒發機構發出未簽名的 GET，同樣會記下 nonce。
    pub(crate) fn fetch(&mut self, url: &str) -> Result<Response> {
        log::debug!("GET {url}");
        let response = self.transport.send(Method::GET, url, None)?;
        self.nonce.observe(&response);
        ensure_success(response)
    }
}

fn ensure_success(response: Response) -> Result<Response> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(rejected(&response))
    }
}

/// 把非預期的回應轉成 [`ClientError::AuthorityRejected`]。
pub(crate) fn rejected(response: &Response) -> ClientError {
    ClientError::AuthorityRejected {
        status: response.status.as_u16(),
        body: response.text(),
    }
}
