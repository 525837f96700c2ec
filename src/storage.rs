//! 帳戶金鑰的儲存介面與兩種實作：以目錄為基礎的 [`FileStorage`] 與記憶體中的 [`MemStorage`]。

use std::{
    collections::HashMap,
    fmt, fs, io,
    path::{Component, Path, PathBuf},
    sync::{Arc, RwLock},
};

use thiserror::Error;

/// 儲存操作可能發生的錯誤類型。
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Key is invalid: {0}")]
    InvalidKey(String),
    #[error("Key not found: {0}")]
    NotFound(String),
    #[error("Lock poisoned")]
    LockPoisoned,
}

/// 儲存操作的結果類型，封裝 [`StorageError`]。
pub type Result<T> = std::result::Result<T, StorageError>;

/// 金鑰儲存協作者需要實作的介面。
///
/// key 為以 `/` 分隔的相對路徑，例如 `le/user-example-com/account.pem`。
pub trait Storage: Send + Sync + fmt::Debug {
    /// 讀取指定 key 所對應檔案的內容。
    fn read_file(&self, key: &str) -> Result<Vec<u8>>;

    /// 將資料寫入指定 key 所對應的檔案中，必要時建立父目錄。
    fn write_file(&self, key: &str, value: &[u8]) -> Result<()>;

    /// 檢查指定 key 是否存在。
    fn exists(&self, key: &str) -> Result<bool>;
}

/// 依據基底路徑與帳戶識別推導帳戶金鑰的儲存位置。
///
/// 識別字串會先轉為小寫，再將每一段連續的非 `[a-z0-9]` 字元折疊成單一 `-`。
///
/// ```
/// use racme_legacy::storage::account_key_path;
///
/// assert_eq!(
///     account_key_path("le", "Admin@Example.com"),
///     "le/admin-example-com/account.pem"
/// );
/// ```
pub fn account_key_path(base_path: &str, identity: &str) -> String {
    format!(
        "{}/{}/account.pem",
        base_path.trim_end_matches('/'),
        normalize_identity(identity)
    )
}

fn normalize_identity(identity: &str) -> String {
    let mut out = String::with_capacity(identity.len());
    let mut in_run = false;
    for c in identity.to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            out.push(c);
            in_run = false;
        } else if !in_run {
            out.push('-');
            in_run = true;
        }
    }
    out
}

/// key 正規化與驗證工具。
struct KeyUtils;

impl KeyUtils {
    /// 將 key 正規化為相對路徑，拒絕空字串、控制字元以及跳出根目錄的 `..`。
    fn normalize(key: &str) -> Result<PathBuf> {
        if key.is_empty() {
            return Err(StorageError::InvalidKey("Empty key".to_string()));
        }
        if key.contains('\0') || key.contains('\n') || key.contains('\r') {
            return Err(StorageError::InvalidKey(format!(
                "Invalid characters in key: {}",
                key
            )));
        }
        if key.ends_with('/') {
            return Err(StorageError::InvalidKey(format!(
                "File key cannot end with '/': {}",
                key
            )));
        }

        let mut normalized = PathBuf::new();
        for component in Path::new(key).components() {
            match component {
                Component::RootDir | Component::CurDir => {}
                Component::ParentDir => {
                    if !normalized.pop() {
                        return Err(StorageError::InvalidKey(format!(
                            "Cannot use '..' to escape root directory: {}",
                            key
                        )));
                    }
                }
                Component::Normal(name) => normalized.push(name),
                Component::Prefix(_) => {
                    return Err(StorageError::InvalidKey(format!("Invalid path: {}", key)))
                }
            }
        }

        if normalized.as_os_str().is_empty() {
            return Err(StorageError::InvalidKey(format!("Invalid path: {}", key)));
        }
        Ok(normalized)
    }
}

/// 以檔案系統目錄為根的儲存實作，每個 key 對應根目錄下的一個檔案。
#[derive(Debug)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    /// 開啟（必要時建立）根目錄。
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        fs::create_dir_all(root.as_ref())?;
        Ok(Self {
            root: root.as_ref().to_path_buf(),
        })
    }

    fn resolve(&self, key: &str) -> Result<PathBuf> {
        Ok(self.root.join(KeyUtils::normalize(key)?))
    }
}

impl Storage for FileStorage {
    fn read_file(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.resolve(key)?;
        match fs::read(&path) {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn write_file(&self, key: &str, value: &[u8]) -> Result<()> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        #[cfg(unix)]
        let mut file = {
            use std::os::unix::fs::OpenOptionsExt;
            fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o600)
                .open(&path)?
        };
        #[cfg(not(unix))]
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        io::Write::write_all(&mut file, value)?;
        file.sync_all()?;
        Ok(())
    }

    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.resolve(key)?.is_file())
    }
}

/// 基於記憶體的儲存實作，適合測試或不需要持久化的情境。
#[derive(Debug, Clone, Default)]
pub struct MemStorage {
    data: Arc<RwLock<HashMap<PathBuf, Vec<u8>>>>,
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemStorage {
    fn read_file(&self, key: &str) -> Result<Vec<u8>> {
        let path = KeyUtils::normalize(key)?;
        let data = self.data.read().map_err(|_| StorageError::LockPoisoned)?;
        data.get(&path)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    fn write_file(&self, key: &str, value: &[u8]) -> Result<()> {
        let path = KeyUtils::normalize(key)?;
        self.data
            .write()
            .map_err(|_| StorageError::LockPoisoned)?
            .insert(path, value.to_vec());
        Ok(())
    }

    fn exists(&self, key: &str) -> Result<bool> {
        let path = KeyUtils::normalize(key)?;
        Ok(self
            .data
            .read()
            .map_err(|_| StorageError::LockPoisoned)?
            .contains_key(&path))
    }
}
