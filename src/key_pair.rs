use openssl::{
    error::ErrorStack,
    pkey::{Id, PKey, Private, Public},
    rsa::Rsa,
};
use thiserror::Error;

use crate::{
    jwk::{Jwk, JwkError},
    storage::{Storage, StorageError},
};

/// 鍵相關操作的錯誤列舉，涵蓋 OpenSSL、存儲與 JWK 錯誤。
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("OpenSSL error: {0}")]
    OpenSSL(#[from] ErrorStack),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Unsupported algorithm")]
    UnsupportedAlgorithm,
    #[error("JWK error: {0}")]
    JwkError(#[from] JwkError),
}

/// 本模組使用的結果類型，當中錯誤皆為 `KeyError`。
type Result<T> = std::result::Result<T, KeyError>;

/// RSA 公鑰的組成參數，皆為大端序的原始位元組。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsaComponents {
    pub n: Vec<u8>,
    pub e: Vec<u8>,
}

/// RSA 金鑰對。
///
/// 帳戶金鑰與憑證金鑰都使用此結構，兩者永遠是不同的實例。
#[derive(Debug, Clone)]
pub struct KeyPair {
    /// 私鑰，使用 OpenSSL 的 `PKey` 封裝。
    pub pri_key: PKey<Private>,
    /// 公鑰，從私鑰派生而來。
    pub pub_key: PKey<Public>,
}

impl KeyPair {
    /// 預設的 RSA 金鑰長度。
    pub const DEFAULT_BITS: u32 = 4096;

    /// 產生一組新的 RSA 金鑰對。
    pub fn generate(bits: u32) -> Result<Self> {
        log::debug!("Generating {bits}-bit RSA key");
        let pri_key = PKey::from_rsa(Rsa::generate(bits)?)?;
        let pub_key = Self::derive_public_key(&pri_key)?;
        Ok(Self { pri_key, pub_key })
    }

    /// 從儲存位置讀取私鑰；若不存在則產生新金鑰並以 PKCS#8 PEM 寫回。
    ///
    /// 已存在但無法解析的金鑰會直接回傳錯誤，不會被覆寫。
    pub fn load_or_generate(storage: &dyn Storage, path: &str, bits: u32) -> Result<Self> {
        match storage.read_file(path) {
            Ok(pem) => {
                log::debug!("Loading account key from {path}");
                return Self::from_pem(&pem);
            }
            Err(StorageError::NotFound(_)) => {}
            Err(e) => return Err(KeyError::Storage(e)),
        }

        let key_pair = Self::generate(bits)?;
        storage.write_file(path, &key_pair.to_pem()?)?;
        log::debug!("Stored new account key at {path}");
        Ok(key_pair)
    }

    /// 根據 PEM 格式的私鑰資料建立一組金鑰對。
    pub fn from_pem(pri_key_pem: &[u8]) -> Result<Self> {
        let pri_key = PKey::private_key_from_pem(pri_key_pem)?;
        let pub_key = Self::derive_public_key(&pri_key)?;
        Ok(Self { pri_key, pub_key })
    }

    /// 以 PKCS#8 PEM 匯出私鑰。
    pub fn to_pem(&self) -> Result<Vec<u8>> {
        Ok(self.pri_key.private_key_to_pem_pkcs8()?)
    }

    /// 根據私鑰派生出對應的公鑰，目前僅支援 RSA。
    fn derive_public_key(pri_key: &PKey<Private>) -> Result<PKey<Public>> {
        match pri_key.id() {
            Id::RSA => {
                let rsa = pri_key.rsa()?;
                let pub_rsa =
                    Rsa::from_public_components(rsa.n().to_owned()?, rsa.e().to_owned()?)?;
                Ok(PKey::from_rsa(pub_rsa)?)
            }
            _ => Err(KeyError::UnsupportedAlgorithm),
        }
    }

    /// 取得公鑰的模數與指數。
    pub fn rsa_components(&self) -> Result<RsaComponents> {
        let rsa = self.pub_key.rsa()?;
        Ok(RsaComponents {
            n: rsa.n().to_vec(),
            e: rsa.e().to_vec(),
        })
    }

    /// 公鑰的 JWK 表示。
    pub fn jwk(&self) -> Result<Jwk> {
        Ok(Jwk::new(self)?)
    }

    /// 計算金鑰的縮影（thumbprint），見 [`Jwk::thumbprint`]。
    pub fn thumbprint(&self) -> Result<String> {
        Ok(self.jwk()?.thumbprint()?)
    }

    /// 金鑰的位元長度。
    pub fn bits(&self) -> Result<u32> {
        Ok(self.pri_key.rsa()?.size() * 8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemStorage;

    #[test]
    fn test_load_or_generate_persists_key() {
        let storage = MemStorage::new();
        let first = KeyPair::load_or_generate(&storage, "le/user/account.pem", 2048).unwrap();
        assert!(storage.exists("le/user/account.pem").unwrap());

        let second = KeyPair::load_or_generate(&storage, "le/user/account.pem", 2048).unwrap();
        assert_eq!(
            first.rsa_components().unwrap(),
            second.rsa_components().unwrap()
        );
        assert_eq!(second.bits().unwrap(), 2048);
    }

    #[test]
    fn test_corrupted_key_is_not_overwritten() {
        let storage = MemStorage::new();
        storage.write_file("account.pem", b"not a key").unwrap();

        let result = KeyPair::load_or_generate(&storage, "account.pem", 2048);
        assert!(matches!(result, Err(KeyError::OpenSSL(_))));
        assert_eq!(storage.read_file("account.pem").unwrap(), b"not a key");
    }

    #[test]
    fn test_pem_round_trip() {
        let key_pair = KeyPair::generate(2048).unwrap();
        let restored = KeyPair::from_pem(&key_pair.to_pem().unwrap()).unwrap();
        assert_eq!(
            key_pair.rsa_components().unwrap(),
            restored.rsa_components().unwrap()
        );
    }
}
