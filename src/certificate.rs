use chrono::{DateTime, TimeDelta, Utc};
use openssl::{asn1::Asn1Time, x509::X509};
use thiserror::Error;

use crate::{
    base64::Base64,
    client::{Client, ClientError, Result},
    csr::{self, CSR},
    key_pair::KeyPair,
    link,
    payload::NewCertificatePayload,
    pem::{self, CERTIFICATE},
};

/// 證書相關操作可能出現的錯誤類型
#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("Failed to parse certificate: {0}")]
    ParseError(#[from] openssl::error::ErrorStack),
    #[error("Invalid expiration timestamp")]
    InvalidTimestamp,
}

/// 中繼憑證連結的 `rel` 值。
const ISSUER: &str = "up";

/// 新簽發的憑證與其金鑰。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    /// 憑證私鑰（PKCS#8 PEM），與帳戶金鑰無關。
    pub private_key: String,
    /// 送出的 CSR（PEM）。
    pub csr: String,
    /// 葉憑證加上中繼憑證的 PEM 串接。
    pub certificate: String,
    /// 葉憑證的到期時間。
    pub expires: DateTime<Utc>,
}

impl Certificate {
    /// 讀取憑證的 `notAfter`。
    pub fn expiry_of(cert: &X509) -> std::result::Result<DateTime<Utc>, CertificateError> {
        let epoch = Asn1Time::from_unix(0)?;
        let diff = epoch.diff(cert.not_after())?;
        let seconds = i64::from(diff.days) * 86_400 + i64::from(diff.secs);
        DateTime::from_timestamp(seconds, 0).ok_or(CertificateError::InvalidTimestamp)
    }

    /// 判斷憑證是否會在 `window` 之內到期（已過期也算）。
    ///
    /// 給呼叫端決定是否重新申請；本庫不排程續約。
    pub fn expires_within(&self, window: TimeDelta) -> bool {
        self.expires - Utc::now() <= window
    }

    /// 解析串接中的第一張（葉）憑證。
    pub fn leaf(&self) -> std::result::Result<X509, CertificateError> {
        Ok(X509::from_pem(self.certificate.as_bytes())?)
    }
}

fn request_failure(e: impl std::fmt::Display) -> ClientError {
    ClientError::CertificateRequestFailure(e.to_string())
}

impl Client {
    /// 為 `domains` 申請一張憑證。
    ///
    /// 主體 CN 為 `primary`（預設為第一個網域），所有網域都列在 SAN 中。
    /// 每次都會產生新的憑證金鑰。回應中的 DER 轉為 PEM 後，
    /// 再依 `Link: <...>;rel="up"` 取回中繼憑證接在後面；沒有此連結時只回傳葉憑證。
    ///
    /// 不會重新檢查授權狀態，呼叫前必須已經通過 [`Client::validate`]。
    pub fn get_certificate(
        &mut self,
        domains: &[&str],
        primary: Option<&str>,
    ) -> Result<Certificate> {
        let first = domains
            .first()
            .copied()
            .ok_or_else(|| request_failure("at least one domain is required"))?;
        let primary = primary.unwrap_or(first);

        let key_pair = KeyPair::generate(self.certificate_key_bits)?;
        let req = domains
            .iter()
            .fold(CSR::new(), |csr, domain| csr.set_san(domain))
            .common_name(primary)
            .build(&key_pair)
            .map_err(request_failure)?;
        let der = csr::to_der(&req).map_err(request_failure)?;
        let csr_pem = csr::to_pem(&req).map_err(request_failure)?;

        let url = self.endpoint("new-cert")?;
        let payload = NewCertificatePayload::new(&Base64::new(&der));
        let response = self.request("new-cert", &payload, &url)?;

        let leaf = X509::from_der(&response.body).map_err(request_failure)?;
        let expires = Certificate::expiry_of(&leaf)?;
        let mut bundle = pem::to_pem(CERTIFICATE, &response.body).map_err(request_failure)?;
        if !bundle.ends_with('\n') {
            bundle.push('\n');
        }

        match link::find(&response, ISSUER) {
            Some(issuer_url) => {
                let issuer = self.fetch(&issuer_url)?;
                bundle.push_str(&pem::to_pem(CERTIFICATE, &issuer.body).map_err(request_failure)?);
            }
            None => log::warn!("No issuer link in new-cert response, returning leaf only"),
        }

        log::debug!("Issued certificate for {primary}, expires {expires}");
        Ok(Certificate {
            private_key: String::from_utf8_lossy(&key_pair.to_pem()?).into_owned(),
            csr: csr_pem,
            certificate: bundle,
            expires,
        })
    }
}

#[cfg(test)]
mod tests {
    use openssl::{
        asn1::Asn1Time,
        bn::BigNum,
        hash::MessageDigest,
        x509::{X509NameBuilder, X509Req},
    };
    use reqwest::Method;

    use super::*;
    use crate::{
        client::testing::*,
        csr::testing::{common_name, san_entries},
        jws::ReceivedJws,
        transport::{MockResponse, MockTransport},
    };

    const ISSUER_URL: &str = "https://ca.test/acme/issuer-cert";

    fn self_signed(common_name: &str, days: u32) -> Vec<u8> {
        let key_pair = KeyPair::generate(2048).unwrap();
        let mut name = X509NameBuilder::new().unwrap();
        name.append_entry_by_text("CN", common_name).unwrap();
        let name = name.build();

        let mut builder = X509::builder().unwrap();
        builder.set_version(2).unwrap();
        let serial = BigNum::from_u32(1).unwrap().to_asn1_integer().unwrap();
        builder.set_serial_number(&serial).unwrap();
        builder.set_subject_name(&name).unwrap();
        builder.set_issuer_name(&name).unwrap();
        builder.set_pubkey(&key_pair.pri_key).unwrap();
        builder.set_not_before(&Asn1Time::days_from_now(0).unwrap()).unwrap();
        builder.set_not_after(&Asn1Time::days_from_now(days).unwrap()).unwrap();
        builder.sign(&key_pair.pri_key, MessageDigest::sha256()).unwrap();
        builder.build().to_der().unwrap()
    }

    fn sent_csr(transport: &MockTransport) -> X509Req {
        let request = transport
            .requests()
            .into_iter()
            .find(|r| r.url == NEW_CERT)
            .unwrap();
        let payload = ReceivedJws::from_json(request.body.as_deref().unwrap())
            .unwrap()
            .payload_json()
            .unwrap();
        assert_eq!(payload["resource"], "new-cert");
        let der = Base64::from_url(payload["csr"].as_str().unwrap())
            .unwrap()
            .decode()
            .unwrap();
        X509Req::from_der(&der).unwrap()
    }

    #[test]
    fn test_issue_with_chain() {
        let leaf = self_signed("www.example.com", 90);
        let issuer = self_signed("Fake Intermediate", 365);
        let transport = authority();
        transport
            .on(
                Method::POST,
                NEW_CERT,
                MockResponse::new(201)
                    .nonce("n1")
                    .header("Link", "<https://ca.test/acme/revoke-cert>;rel=\"revoke\"")
                    .header("Link", &format!("<{ISSUER_URL}>;rel=\"up\""))
                    .body(leaf.clone()),
            )
            .on(Method::GET, ISSUER_URL, MockResponse::new(200).body(issuer.clone()));
        let mut client = client(&transport);

        let certificate = client
            .get_certificate(&["example.com", "www.example.com"], Some("www.example.com"))
            .unwrap();

        let blocks: Vec<&str> = certificate
            .certificate
            .split_inclusive("-----END CERTIFICATE-----")
            .filter(|b| b.contains("BEGIN"))
            .collect();
        assert_eq!(blocks.len(), 2);
        assert_eq!(pem::to_der(blocks[0]).unwrap(), leaf);
        assert_eq!(pem::to_der(blocks[1]).unwrap(), issuer);
        assert_eq!(certificate.leaf().unwrap().to_der().unwrap(), leaf);

        let req = sent_csr(&transport);
        assert_eq!(common_name(&req), "www.example.com");
        assert_eq!(
            san_entries(&req),
            vec!["DNS:example.com", "DNS:www.example.com"]
        );

        let cert_key = KeyPair::from_pem(certificate.private_key.as_bytes()).unwrap();
        assert!(req.verify(&cert_key.pub_key).unwrap());
        assert_ne!(
            cert_key.thumbprint().unwrap(),
            client.thumbprint().unwrap()
        );
        assert!(certificate.csr.starts_with("-----BEGIN CERTIFICATE REQUEST-----"));
    }

    #[test]
    fn test_expiry_and_leaf_only_bundle() {
        let leaf = self_signed("example.com", 90);
        let transport = authority();
        transport.on(Method::POST, NEW_CERT, MockResponse::new(201).body(leaf.clone()));
        let mut client = client(&transport);

        let certificate = client.get_certificate(&["example.com"], None).unwrap();
        assert_eq!(certificate.certificate.matches("BEGIN CERTIFICATE").count(), 1);

        let remaining = certificate.expires - Utc::now();
        assert!(remaining > TimeDelta::days(89) && remaining <= TimeDelta::days(90));
        assert!(certificate.expires_within(TimeDelta::days(100)));
        assert!(!certificate.expires_within(TimeDelta::days(30)));

        let req = sent_csr(&transport);
        assert_eq!(common_name(&req), "example.com");
        assert_eq!(san_entries(&req), vec!["DNS:example.com"]);
    }

    #[test]
    fn test_rejections_and_bad_input() {
        let transport = authority();
        transport.on(
            Method::POST,
            NEW_CERT,
            MockResponse::new(403).nonce("n1").body("unauthorized"),
        );
        let mut client = client(&transport);

        assert!(matches!(
            client.get_certificate(&[], None),
            Err(ClientError::CertificateRequestFailure(_))
        ));
        assert!(matches!(
            client.get_certificate(&["a.example"], Some("b.example")),
            Err(ClientError::CertificateRequestFailure(_))
        ));
        assert_eq!(transport.count(&Method::POST, NEW_CERT), 0);

        assert!(matches!(
            client.get_certificate(&["a.example"], None),
            Err(ClientError::AuthorityRejected { status: 403, .. })
        ));
    }

    #[test]
    fn test_undecodable_certificate_body() {
        let transport = authority();
        transport.on(Method::POST, NEW_CERT, MockResponse::new(201).body("not der"));
        let mut client = client(&transport);
        assert!(matches!(
            client.get_certificate(&["a.example"], None),
            Err(ClientError::CertificateRequestFailure(_))
        ));
    }

    #[test]
    fn test_failed_chain_fetch_propagates() {
        let transport = authority();
        transport.on(
            Method::POST,
            NEW_CERT,
            MockResponse::new(201)
                .header("Link", &format!("<{ISSUER_URL}>;rel=\"up\""))
                .body(self_signed("a.example", 30)),
        );
        let mut client = client(&transport);
        assert!(matches!(
            client.get_certificate(&["a.example"], None),
            Err(ClientError::AuthorityRejected { status: 404, .. })
        ));
    }
}
