//! DER 與 PEM 之間的轉換（每行 64 字元，標準 BEGIN/END 標記）。

use pem_rfc7468::LineEnding;
use thiserror::Error;

/// 憑證使用的 PEM 標籤。
pub const CERTIFICATE: &str = "CERTIFICATE";
/// CSR 使用的 PEM 標籤。
pub const CERTIFICATE_REQUEST: &str = "CERTIFICATE REQUEST";

#[derive(Debug, Error)]
#[error("PEM error: {0}")]
pub struct PemError(#[from] pem_rfc7468::Error);

/// 將 DER 位元組包裝成 PEM 區塊。
pub fn to_pem(label: &str, der: &[u8]) -> Result<String, PemError> {
    Ok(pem_rfc7468::encode_string(label, LineEnding::LF, der)?)
}

/// 解出 PEM 區塊中的 DER 位元組，忽略標籤內容。
///
/// 沒有內容行的區塊（由空的 DER 編碼而來）解為空的位元組。
pub fn to_der(pem: &str) -> Result<Vec<u8>, PemError> {
    let pem = pem.trim();
    match pem_rfc7468::decode_vec(pem.as_bytes()) {
        Ok((_label, der)) => Ok(der),
        Err(e) if is_empty_block(pem) => {
            log::trace!("Treating body-less PEM block as empty DER ({e})");
            Ok(Vec::new())
        }
        Err(e) => Err(e.into()),
    }
}

fn is_empty_block(pem: &str) -> bool {
    let lines: Vec<&str> = pem.lines().map(str::trim).collect();
    let [first, body @ .., last] = lines.as_slice() else {
        return false;
    };
    let label = |line: &str, marker: &str| {
        line.strip_prefix(marker)
            .and_then(|rest| rest.strip_suffix("-----"))
            .map(str::to_owned)
    };
    match (label(*first, "-----BEGIN "), label(*last, "-----END ")) {
        (Some(begin), Some(end)) => begin == end && body.iter().all(|l| l.is_empty()),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_arbitrary_payloads() {
        let payloads: Vec<Vec<u8>> = vec![
            vec![],
            vec![0x00],
            vec![0xff; 47],
            vec![0x30, 0x82, 0x01, 0x0a],
            (0..=255u8).collect(),
            (0..1000u32).map(|i| (i * 7 % 256) as u8).collect(),
        ];

        for der in payloads {
            let pem = to_pem(CERTIFICATE, &der).unwrap();
            assert_eq!(to_der(&pem).unwrap(), der);
        }
    }

    #[test]
    fn test_line_width_and_markers() {
        let pem = to_pem(CERTIFICATE, &[0xab; 200]).unwrap();
        let lines: Vec<&str> = pem.lines().collect();
        assert_eq!(lines.first(), Some(&"-----BEGIN CERTIFICATE-----"));
        assert_eq!(lines.last(), Some(&"-----END CERTIFICATE-----"));
        assert!(lines[1..lines.len() - 1].iter().all(|l| l.len() <= 64));
        assert_eq!(lines[1].len(), 64);
    }

    #[test]
    fn test_to_der_rejects_garbage() {
        assert!(to_der("not pem").is_err());
        assert!(to_der("-----BEGIN CERTIFICATE-----\n\n-----END X509 CRL-----\n").is_err());
        assert!(to_der("-----BEGIN CERTIFICATE-----\n!!!!\n-----END CERTIFICATE-----\n").is_err());
    }
}
