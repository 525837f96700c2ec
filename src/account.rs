//! 帳戶註冊與服務條款同意。

use reqwest::StatusCode;
use serde_json::Value;

use crate::{
    client::{rejected, Client, ClientError, Result},
    link,
    payload::{mailto, AgreementPayload, NewRegistrationPayload},
    transport::Response,
};

/// 服務條款連結的 `rel` 值。
const TERMS_OF_SERVICE: &str = "terms-of-service";

/// 在頒發機構註冊的帳戶。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// 帳戶 URL，之後的 `reg` 請求都送往此處。
    pub account_reference: String,
    /// 註冊時使用的聯絡資訊（含 `mailto:` 前綴）。
    pub contact: String,
    /// 伺服器公布的服務條款 URL。
    pub terms_of_service: Option<String>,
    /// 是否已經同意服務條款。
    pub has_agreement: bool,
}

/// `new-reg` 的結果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// 新建立的帳戶，附帶帳戶 URL。
    Created(String),
    /// 此金鑰已註冊過（409），附帶既有帳戶的 URL。
    AlreadyExists(String),
    /// 其他被拒絕的情況。
    Rejected { status: u16, body: String },
}

impl Registration {
    /// 依狀態碼分類 `new-reg` 的回應；成功與衝突都必須帶有 `Location`。
    pub fn from_response(response: &Response) -> Result<Self> {
        let location = || {
            response
                .header("location")
                .map(str::to_string)
                .ok_or(ClientError::MissingHeader("Location"))
        };

        if response.is_success() {
            Ok(Registration::Created(location()?))
        } else if response.status == StatusCode::CONFLICT {
            Ok(Registration::AlreadyExists(location()?))
        } else {
            Ok(Registration::Rejected {
                status: response.status.as_u16(),
                body: response.text(),
            })
        }
    }
}

impl Client {
    /// 以設定的帳戶識別取得帳戶：未註冊時建立，已註冊時讀取既有的註冊資料。
    pub fn get_account(&mut self) -> Result<Account> {
        let identity = self.identity.clone();
        self.register(&identity)
    }

    /// 以指定的聯絡資訊送出 `new-reg`。
    ///
    /// 若帳戶已存在，會再以 `reg` 請求讀取註冊資料，
    /// 並依其中是否有 `agreement` 欄位判斷是否已同意服務條款。
    ///
    /// # Errors
    ///
    /// 伺服器拒絕時回傳 [`ClientError::AuthorityRejected`]；
    /// 缺少 `Location` 時回傳 [`ClientError::MissingHeader`]。
    pub fn register(&mut self, contact: &str) -> Result<Account> {
        let payload = NewRegistrationPayload::new(contact);
        let url = self.endpoint("new-reg")?;
        let response = self.send_signed("new-reg", &payload, &url)?;

        let (account_reference, has_agreement, response) =
            match Registration::from_response(&response)? {
                Registration::Created(location) => {
                    log::debug!("Registered new account {location}");
                    (location, false, response)
                }
                Registration::AlreadyExists(location) => {
                    log::debug!("Account already registered at {location}");
                    let response = self.request("reg", &payload, &location)?;
                    let registration: Value = response.json()?;
                    (location, registration.get("agreement").is_some(), response)
                }
                Registration::Rejected { .. } => return Err(rejected(&response)),
            };

        Ok(Account {
            account_reference,
            contact: mailto(contact),
            terms_of_service: link::find(&response, TERMS_OF_SERVICE),
            has_agreement,
        })
    }

    /// 同意服務條款。已同意的帳戶不會產生任何請求。
    ///
    /// # Errors
    ///
    /// 帳戶沒有服務條款連結時回傳 [`ClientError::MissingTermsOfService`]。
    pub fn agree(&mut self, account: &mut Account) -> Result<()> {
        if account.has_agreement {
            return Ok(());
        }

        let terms = account
            .terms_of_service
            .as_deref()
            .ok_or(ClientError::MissingTermsOfService)?;
        let payload = AgreementPayload::new(&account.contact, terms);
        self.request("reg", &payload, &account.account_reference)?;

        log::debug!("Agreed to {terms}");
        account.has_agreement = true;
        Ok(())
    }

    /// 取得帳戶並確保已同意服務條款。
    pub fn ensure_account(&mut self) -> Result<Account> {
        let mut account = self.get_account()?;
        self.agree(&mut account)?;
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use reqwest::Method;
    use serde_json::json;

    use super::*;
    use crate::{
        client::testing::*,
        jws::ReceivedJws,
        transport::{MockResponse, MockTransport},
    };

    const ACCOUNT: &str = "https://ca.test/acme/reg/42";
    const TOS_LINK: &str = "<https://ca.test/terms.pdf>;rel=\"terms-of-service\"";

    fn payload_of(transport: &MockTransport, url: &str) -> Vec<Value> {
        transport
            .requests()
            .iter()
            .filter(|r| r.method == Method::POST && r.url == url)
            .map(|r| {
                let body = r.body.as_deref().unwrap();
                ReceivedJws::from_json(body).unwrap().payload_json().unwrap()
            })
            .collect()
    }

    #[test]
    fn test_register_then_agree_once() {
        let transport = authority();
        transport
            .on(
                Method::POST,
                NEW_REG,
                MockResponse::new(201)
                    .nonce("n1")
                    .header("Location", ACCOUNT)
                    .header("Link", "<https://ca.test/acme/new-authz>;rel=\"next\"")
                    .header("Link", TOS_LINK),
            )
            .on(Method::POST, ACCOUNT, MockResponse::new(202).nonce("n2"));
        let mut client = client(&transport);

        let mut account = client.get_account().unwrap();
        assert_eq!(account.account_reference, ACCOUNT);
        assert_eq!(
            account.terms_of_service.as_deref(),
            Some("https://ca.test/terms.pdf")
        );
        assert!(!account.has_agreement);
        assert_eq!(
            payload_of(&transport, NEW_REG),
            vec![json!({ "contact": ["mailto:ops@example.com"], "resource": "new-reg" })]
        );

        client.agree(&mut account).unwrap();
        assert!(account.has_agreement);
        client.agree(&mut account).unwrap();

        assert_eq!(
            payload_of(&transport, ACCOUNT),
            vec![json!({
                "contact": ["mailto:ops@example.com"],
                "agreement": "https://ca.test/terms.pdf",
                "resource": "reg"
            })]
        );
    }

    #[test]
    fn test_conflict_reads_existing_registration() {
        let transport = authority();
        transport
            .on(
                Method::POST,
                NEW_REG,
                MockResponse::new(409).nonce("n1").header("Location", ACCOUNT),
            )
            .on(
                Method::POST,
                ACCOUNT,
                MockResponse::new(202)
                    .nonce("n2")
                    .header("Link", TOS_LINK)
                    .json(&json!({ "agreement": "https://ca.test/terms.pdf" })),
            );
        let mut client = client(&transport);

        let mut account = client.register("mailto:admin@example.com").unwrap();
        assert_eq!(account.account_reference, ACCOUNT);
        assert!(account.has_agreement);
        assert_eq!(
            account.terms_of_service.as_deref(),
            Some("https://ca.test/terms.pdf")
        );
        assert_eq!(
            payload_of(&transport, ACCOUNT),
            vec![json!({ "contact": ["mailto:admin@example.com"], "resource": "reg" })]
        );

        let before = transport.requests().len();
        client.agree(&mut account).unwrap();
        assert_eq!(transport.requests().len(), before);
    }

    #[test]
    fn test_conflict_without_agreement() {
        let transport = authority();
        transport
            .on(
                Method::POST,
                NEW_REG,
                MockResponse::new(409).header("Location", ACCOUNT),
            )
            .on(
                Method::POST,
                ACCOUNT,
                MockResponse::new(202)
                    .header("Link", TOS_LINK)
                    .json(&json!({ "contact": ["mailto:ops@example.com"] })),
            );
        let mut client = client(&transport);

        let account = client.ensure_account().unwrap();
        assert!(account.has_agreement);
        assert_eq!(payload_of(&transport, ACCOUNT).len(), 2);
    }

    #[test]
    fn test_rejected_registration() {
        let transport = authority();
        transport.on(
            Method::POST,
            NEW_REG,
            MockResponse::new(400).nonce("n1").body("bad contact"),
        );
        let mut client = client(&transport);

        let result = client.get_account();
        assert!(matches!(
            result,
            Err(ClientError::AuthorityRejected { status: 400, ref body }) if body == "bad contact"
        ));
        assert_eq!(client.nonce(), Some("n1"));
    }

    #[test]
    fn test_created_without_location() {
        let transport = authority();
        transport.on(Method::POST, NEW_REG, MockResponse::new(201));
        let mut client = client(&transport);
        assert!(matches!(
            client.get_account(),
            Err(ClientError::MissingHeader("Location"))
        ));
    }

    #[test]
    fn test_agree_without_terms() {
        let transport = authority();
        transport.on(
            Method::POST,
            NEW_REG,
            MockResponse::new(201).header("Location", ACCOUNT),
        );
        let mut client = client(&transport);

        let mut account = client.get_account().unwrap();
        assert_eq!(account.terms_of_service, None);
        assert!(matches!(
            client.agree(&mut account),
            Err(ClientError::MissingTermsOfService)
        ));
        assert_eq!(transport.count(&Method::POST, ACCOUNT), 0);
    }
}
