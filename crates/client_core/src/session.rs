use std::{
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use serde::{Deserialize, Serialize};
use shared::domain::UserType;

use crate::error::ClientError;

/// Bearer token plus the role claim returned at login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user_type: UserType,
}

/// Everything the client keeps between runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PersistedState {
    #[serde(default)]
    session: Option<Session>,
    #[serde(default)]
    remembered_email: Option<String>,
}

pub trait SessionStore: Send + Sync {
    fn load(&self) -> Result<Option<Session>, ClientError>;
    fn save(&self, session: &Session) -> Result<(), ClientError>;
    /// Drops the token and role; a remembered email survives.
    fn clear(&self) -> Result<(), ClientError>;
    fn remembered_email(&self) -> Result<Option<String>, ClientError>;
    fn remember_email(&self, email: &str) -> Result<(), ClientError>;
}

pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/barberconnect/session.json`, falling back to the working directory.
    pub fn default_location() -> PathBuf {
        dirs::config_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("barberconnect")
            .join("session.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<PersistedState, ClientError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(PersistedState::default()),
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(PersistedState::default()),
            Err(err) => Err(err.into()),
        }
    }

    fn write(&self, state: &PersistedState) -> Result<(), ClientError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_vec_pretty(state)?)?;
        Ok(())
    }

    fn update(&self, apply: impl FnOnce(&mut PersistedState)) -> Result<(), ClientError> {
        let mut state = self.read()?;
        apply(&mut state);
        self.write(&state)
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<Option<Session>, ClientError> {
        Ok(self.read()?.session)
    }

    fn save(&self, session: &Session) -> Result<(), ClientError> {
        self.update(|state| state.session = Some(session.clone()))
    }

    fn clear(&self) -> Result<(), ClientError> {
        self.update(|state| state.session = None)
    }

    fn remembered_email(&self) -> Result<Option<String>, ClientError> {
        Ok(self.read()?.remembered_email)
    }

    fn remember_email(&self, email: &str) -> Result<(), ClientError> {
        self.update(|state| state.remembered_email = Some(email.to_string()))
    }
}

#[derive(Default)]
pub struct MemorySessionStore {
    state: Mutex<PersistedState>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: Session) -> Self {
        Self {
            state: Mutex::new(PersistedState {
                session: Some(session),
                remembered_email: None,
            }),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut PersistedState) -> T) -> T {
        let mut guard = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<Option<Session>, ClientError> {
        Ok(self.with_state(|state| state.session.clone()))
    }

    fn save(&self, session: &Session) -> Result<(), ClientError> {
        self.with_state(|state| state.session = Some(session.clone()));
        Ok(())
    }

    fn clear(&self) -> Result<(), ClientError> {
        self.with_state(|state| state.session = None);
        Ok(())
    }

    fn remembered_email(&self) -> Result<Option<String>, ClientError> {
        Ok(self.with_state(|state| state.remembered_email.clone()))
    }

    fn remember_email(&self, email: &str) -> Result<(), ClientError> {
        self.with_state(|state| state.remembered_email = Some(email.to_string()));
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
