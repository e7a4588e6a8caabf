use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use reqwest::header::{HeaderMap, HeaderValue, SET_COOKIE};
use serde::{Deserialize, Serialize};
use time::{macros::format_description, OffsetDateTime, PrimitiveDateTime};

/// Authenticated portal session: the cookie state handed out at login.
///
/// The contents are opaque to callers. A session is only meaningful to the
/// portal that issued it and is validated by probing, never by inspection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    cookies: BTreeMap<String, String>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn insert_cookie(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.cookies.insert(name.into(), value.into());
    }

    /// Merge the `Set-Cookie` headers of a portal response into the session.
    pub fn absorb(&mut self, headers: &HeaderMap) {
        let now = OffsetDateTime::now_utc();
        for raw in headers.get_all(SET_COOKIE) {
            let Ok(raw) = raw.to_str() else {
                continue;
            };
            let Some((name, value)) = parse_set_cookie(raw) else {
                continue;
            };

            if value.is_empty() || is_expired(raw, now) {
                self.cookies.remove(name);
            } else {
                self.cookies.insert(name.to_string(), value.to_string());
            }
        }
    }

    pub(crate) fn cookie_header(&self) -> Option<HeaderValue> {
        if self.cookies.is_empty() {
            return None;
        }

        let joined = self
            .cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ");
        HeaderValue::from_str(&joined).ok()
    }
}

fn parse_set_cookie(raw: &str) -> Option<(&str, &str)> {
    let pair = raw.split(';').next()?;
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name, value.trim().trim_matches('"')))
}

/// A cookie is gone once `Max-Age` is zero or negative, or its `Expires` date
/// is not after `now`. `Max-Age` wins over `Expires` when both are present.
fn is_expired(raw: &str, now: OffsetDateTime) -> bool {
    let mut expires = None;
    for attr in raw.split(';').skip(1) {
        let Some((key, value)) = attr.split_once('=') else {
            continue;
        };
        let (key, value) = (key.trim(), value.trim());
        if key.eq_ignore_ascii_case("max-age") {
            if let Ok(secs) = value.parse::<i64>() {
                return secs <= 0;
            }
        } else if key.eq_ignore_ascii_case("expires") {
            expires = parse_cookie_date(value);
        }
    }
    expires.is_some_and(|at| at <= now)
}

/// `Expires` dates in the IMF-fixdate form, or the older dashed form.
fn parse_cookie_date(value: &str) -> Option<OffsetDateTime> {
    PrimitiveDateTime::parse(
        value,
        format_description!("[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"),
    )
    .or_else(|_| {
        PrimitiveDateTime::parse(
            value,
            format_description!("[weekday repr:short], [day]-[month repr:short]-[year] [hour]:[minute]:[second] GMT"),
        )
    })
    .ok()
    .map(PrimitiveDateTime::assume_utc)
}

#[derive(thiserror::Error, Debug)]
pub enum SessionStoreError {
    #[error("session file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("session file {} does not hold a session: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode session: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Persistence for the single cached portal session.
pub trait SessionStore: Send + Sync {
    /// Returns `Ok(None)` when no session has been saved yet.
    fn load(&self) -> Result<Option<Session>, SessionStoreError>;

    fn save(&self, session: &Session) -> Result<(), SessionStoreError>;
}

/// Session store backed by one JSON file at a fixed path.
///
/// Not safe against concurrent importer runs sharing the same file.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> SessionStoreError {
        SessionStoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<Option<Session>, SessionStoreError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };

        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|source| SessionStoreError::Corrupt {
                path: self.path.clone(),
                source,
            })
    }

    fn save(&self, session: &Session) -> Result<(), SessionStoreError> {
        let encoded = serde_json::to_vec_pretty(session).map_err(SessionStoreError::Encode)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        write_private(&self.path, &encoded).map_err(|e| self.io_error(e))
    }
}

#[cfg(unix)]
fn write_private(path: &Path, contents: &[u8]) -> io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents)
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &[u8]) -> io::Result<()> {
    fs::write(path, contents)
}

/// In-process session store, for tests and embedders that manage persistence themselves.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    slot: Mutex<Option<Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: Session) -> Self {
        Self {
            slot: Mutex::new(Some(session)),
        }
    }

    pub fn current(&self) -> Option<Session> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<Option<Session>, SessionStoreError> {
        Ok(self.current())
    }

    fn save(&self, session: &Session) -> Result<(), SessionStoreError> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(session.clone());
        Ok(())
    }
}
