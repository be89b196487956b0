use anyhow::{Context, Result};
use jsonwebtoken::{DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::models::{RecordId, Tokens, User};

/// What gets persisted between runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionData {
    pub access: Option<String>,
    pub refresh: Option<String>,
    pub user: Option<User>,
}

/// Claims read from the access token. The signature is not checked: the
/// client only needs the expiry and identity the server put there.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenClaims {
    #[serde(default)]
    pub user_id: Option<RecordId>,
    #[serde(default)]
    pub username: Option<String>,
    pub exp: i64,
}

pub trait SessionStore {
    fn load(&self) -> Result<SessionData>;
    fn save(&self, data: &SessionData) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

// --- File store ---

pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn default_path() -> PathBuf {
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "jobtrack") {
            proj_dirs.data_dir().join("session.json")
        } else {
            PathBuf::from("jobtrack-session.json")
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<SessionData> {
        if !self.path.exists() {
            return Ok(SessionData::default());
        }
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read session file: {}", self.path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Corrupt session file: {}", self.path.display()))
    }

    fn save(&self, data: &SessionData) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(data)?;
        write_private(&self.path, raw.as_bytes())
            .with_context(|| format!("Failed to write session file: {}", self.path.display()))?;
        tracing::debug!(path = %self.path.display(), "session saved");
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)
                .with_context(|| format!("Failed to remove session file: {}", self.path.display()))?;
        }
        tracing::debug!(path = %self.path.display(), "session cleared");
        Ok(())
    }
}

/// Writes `contents` readable by the owner only; the file holds live tokens.
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(contents)
}

// --- In-memory store ---

#[cfg(test)]
#[derive(Default)]
pub struct MemorySessionStore {
    data: RefCell<SessionData>,
}

#[cfg(test)]
impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<SessionData> {
        Ok(self.data.borrow().clone())
    }

    fn save(&self, data: &SessionData) -> Result<()> {
        *self.data.borrow_mut() = data.clone();
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.data.borrow_mut() = SessionData::default();
        Ok(())
    }
}

// --- Session ---

/// Tokens and user for the signed-in account, backed by a `SessionStore`.
/// Every write goes straight through to the store.
pub struct Session {
    store: Box<dyn SessionStore>,
    data: RefCell<SessionData>,
}

impl Session {
    pub fn new(store: Box<dyn SessionStore>) -> Result<Self> {
        let data = store.load()?;
        Ok(Self {
            store,
            data: RefCell::new(data),
        })
    }

    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self {
            store: Box::new(MemorySessionStore::default()),
            data: RefCell::new(SessionData::default()),
        }
    }

    pub fn access_token(&self) -> Option<String> {
        self.data.borrow().access.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.data.borrow().refresh.clone()
    }

    pub fn user(&self) -> Option<User> {
        self.data.borrow().user.clone()
    }

    pub fn store_login(&self, tokens: &Tokens, user: &User) -> Result<()> {
        let mut data = self.data.borrow_mut();
        data.access = Some(tokens.access.clone());
        data.refresh = Some(tokens.refresh.clone());
        data.user = Some(user.clone());
        self.store.save(&data)
    }

    /// Replaces the access token after a refresh. A rotated refresh token is
    /// stored too when the server sends one.
    pub fn set_tokens(&self, access: &str, refresh: Option<&str>) -> Result<()> {
        let mut data = self.data.borrow_mut();
        data.access = Some(access.to_string());
        if let Some(refresh) = refresh {
            data.refresh = Some(refresh.to_string());
        }
        self.store.save(&data)
    }

    pub fn set_user(&self, user: &User) -> Result<()> {
        let mut data = self.data.borrow_mut();
        data.user = Some(user.clone());
        self.store.save(&data)
    }

    pub fn clear(&self) -> Result<()> {
        *self.data.borrow_mut() = SessionData::default();
        self.store.clear()
    }

    pub fn claims(&self) -> Option<TokenClaims> {
        self.access_token().as_deref().and_then(decode_claims)
    }

    /// True when an access token is present and not past its `exp`.
    pub fn is_authenticated(&self) -> bool {
        self.claims()
            .map(|c| c.exp > chrono::Utc::now().timestamp())
            .unwrap_or(false)
    }
}

pub fn decode_claims(token: &str) -> Option<TokenClaims> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();
    jsonwebtoken::decode::<TokenClaims>(token, &DecodingKey::from_secret(&[]), &validation)
        .ok()
        .map(|data| data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header};

    fn token_expiring_in(secs: i64) -> String {
        let claims = serde_json::json!({
            "user_id": "u-1",
            "username": "sam",
            "exp": chrono::Utc::now().timestamp() + secs,
        });
        jsonwebtoken::encode(&Header::default(), &claims, &EncodingKey::from_secret(b"server-secret"))
            .unwrap()
    }

    fn sample_user() -> User {
        serde_json::from_str(r#"{"username": "sam", "email": "sam@example.com"}"#).unwrap()
    }

    #[test]
    fn test_store_login_then_clear() {
        let session = Session::in_memory();
        let tokens = Tokens {
            access: "a".to_string(),
            refresh: "r".to_string(),
        };
        session.store_login(&tokens, &sample_user()).unwrap();
        assert_eq!(session.access_token().as_deref(), Some("a"));
        assert_eq!(session.refresh_token().as_deref(), Some("r"));
        assert_eq!(session.user().unwrap().username, "sam");

        session.clear().unwrap();
        assert!(session.access_token().is_none());
        assert!(session.refresh_token().is_none());
        assert!(session.user().is_none());
    }

    #[test]
    fn test_set_tokens_keeps_refresh_unless_rotated() {
        let session = Session::in_memory();
        session
            .store_login(
                &Tokens {
                    access: "old".to_string(),
                    refresh: "r1".to_string(),
                },
                &sample_user(),
            )
            .unwrap();

        session.set_tokens("new", None).unwrap();
        assert_eq!(session.access_token().as_deref(), Some("new"));
        assert_eq!(session.refresh_token().as_deref(), Some("r1"));

        session.set_tokens("newer", Some("r2")).unwrap();
        assert_eq!(session.refresh_token().as_deref(), Some("r2"));
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        {
            let session = Session::new(Box::new(FileSessionStore::new(path.clone()))).unwrap();
            assert!(session.access_token().is_none());
            session
                .store_login(
                    &Tokens {
                        access: "a".to_string(),
                        refresh: "r".to_string(),
                    },
                    &sample_user(),
                )
                .unwrap();
        }
        assert!(path.exists());

        let reloaded = Session::new(Box::new(FileSessionStore::new(path.clone()))).unwrap();
        assert_eq!(reloaded.access_token().as_deref(), Some("a"));
        assert_eq!(reloaded.user().unwrap().email.as_deref(), Some("sam@example.com"));

        reloaded.clear().unwrap();
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_file_store_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{}").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        let store = FileSessionStore::new(path.clone());
        store.save(&SessionData::default()).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_file_store_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "not json").unwrap();

        let result = Session::new(Box::new(FileSessionStore::new(path)));
        assert!(result.is_err());
    }

    #[test]
    fn test_is_authenticated_checks_expiry() {
        let session = Session::in_memory();
        assert!(!session.is_authenticated());

        session.set_tokens(&token_expiring_in(3600), None).unwrap();
        assert!(session.is_authenticated());
        let claims = session.claims().unwrap();
        assert_eq!(claims.username.as_deref(), Some("sam"));
        assert_eq!(claims.user_id.as_ref().map(RecordId::as_str), Some("u-1"));

        session.set_tokens(&token_expiring_in(-60), None).unwrap();
        assert!(!session.is_authenticated());
    }

    #[test]
    fn test_garbage_token_is_not_authenticated() {
        let session = Session::in_memory();
        session.set_tokens("not-a-jwt", None).unwrap();
        assert!(session.claims().is_none());
        assert!(!session.is_authenticated());
    }
}
