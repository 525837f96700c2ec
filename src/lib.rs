//! # 舊版 ACME 憑證申請庫
//!
//! 本庫實作舊版 ACME 協議（目錄提供 `new-reg`、`new-authz`、`new-cert`，
//! 每個已簽名載荷都帶有 `resource` 欄位）的客戶端，流程分為五步：
//!
//! 1. **註冊**：[`Client::get_account`] / [`Client::register`] 送出 `new-reg`，
//!    帳戶已存在（409）時改為讀取既有的註冊資料。
//! 2. **同意條款**：[`Client::agree`]，已同意的帳戶不會產生任何請求。
//! 3. **授權**：[`Client::authorize`] 為每個網域取得挑戰。
//! 4. **驗證**：呼叫端先公開 [`Authorization::file`] 指出的檔案，
//!    再由 [`Client::validate`] 自我檢查、觸發驗證並輪詢，以固定間隔有限次重試。
//! 5. **簽發**：[`Client::get_certificate`] 產生新金鑰與 CSR，取回葉憑證與中繼憑證。
//!
//! 所有已簽名請求都透過同一個客戶端送出，nonce 依照「送出 → 擷取」的順序更新。
//! HTTP 與金鑰儲存都是可替換的協作者（[`transport::Transport`]、[`storage::Storage`]）。
//!
//! ## 示例
//!
//! ```no_run
//! use racme_legacy::{challenge::ChallengeType, storage::FileStorage, Client, Mode};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::builder()
//!         .mode(Mode::Staging)
//!         .store(FileStorage::open("/var/lib/racme")?)
//!         .identity("admin@example.com")
//!         .connect()?;
//!
//!     client.ensure_account()?;
//!
//!     let authorizations = client.authorize(&["example.com", "www.example.com"])?;
//!     for authorization in &authorizations {
//!         if let Some(file) = authorization.file() {
//!             // 將 file.contents 放到 http://{domain}{file.path()}
//!             println!("{} -> {}", file.path(), file.contents);
//!         }
//!     }
//!
//!     client.validate(&authorizations, 5, &ChallengeType::Http01)?;
//!
//!     let certificate = client.get_certificate(&["example.com", "www.example.com"], None)?;
//!     println!("{}", certificate.certificate);
//!     Ok(())
//! }
//! ```

pub mod account;
pub mod authorization;
pub mod base64;
pub mod certificate;
pub mod challenge;
pub mod client;
pub mod csr;
pub mod directory;
pub mod jwk;
pub mod jws;
pub mod key_pair;
pub mod link;
pub mod nonce;
pub mod payload;
pub mod pem;
pub mod protection;
pub mod signature;
pub mod storage;
pub mod transport;
pub mod validation;

pub use account::{Account, Registration};
pub use authorization::Authorization;
pub use certificate::Certificate;
pub use client::{Client, ClientBuilder, ClientError, Mode};
