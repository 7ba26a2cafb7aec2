use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::{SessionState, StoreError};

pub const SESSION_FILE: &str = "session.json";

/// Reads and writes the [`SessionState`] JSON document.
#[derive(Clone, Debug)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<SessionState, StoreError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::FileNotFound(self.path.clone()))
            }
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let state = serde_json::from_str(&content).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })?;

        debug!("Loaded session from {}", self.path.display());
        Ok(state)
    }

    /// Like [`load`](Self::load), but any failure yields the default session.
    pub async fn load_or_default(&self) -> SessionState {
        match self.load().await {
            Ok(state) => {
                info!("Restored session from {}", self.path.display());
                state
            }
            Err(StoreError::FileNotFound(path)) => {
                info!("No session file at {}, starting fresh", path.display());
                SessionState::default()
            }
            Err(e) => {
                warn!("{}, using defaults", e);
                SessionState::default()
            }
        }
    }

    pub async fn save(&self, state: &SessionState) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(state)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| StoreError::Write {
                    path: self.path.clone(),
                    source,
                })?;
        }

        tokio::fs::write(&self.path, content)
            .await
            .map_err(|source| StoreError::Write {
                path: self.path.clone(),
                source,
            })?;

        info!("Session saved to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state() -> SessionState {
        SessionState {
            broker_host: "192.168.1.102".to_string(),
            broker_port: 1883,
            last_temp_setpoint: 12.5,
            last_humidity_setpoint: 78.0,
            last_heating_mode: true,
            log_file_path: Some(PathBuf::from("/var/log/chamber.csv")),
        }
    }

    #[tokio::test]
    async fn saved_session_loads_back_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join(SESSION_FILE));

        store.save(&sample_state()).await.unwrap();
        let restarted = SessionStore::new(dir.path().join(SESSION_FILE));

        assert_eq!(restarted.load().await.unwrap(), sample_state());
    }

    #[tokio::test]
    async fn file_uses_legacy_key_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join(SESSION_FILE));
        store.save(&sample_state()).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();

        assert_eq!(raw["broker_ip"], "192.168.1.102");
        assert_eq!(raw["broker_port"], 1883);
        assert_eq!(raw["lastTmpSetPoint"], 12.5);
        assert_eq!(raw["lastHumSetPoint"], 78.0);
        assert_eq!(raw["lastOpnHtnMde"], true);
        assert_eq!(raw["log_path"], "/var/log/chamber.csv");
    }

    #[tokio::test]
    async fn missing_file_is_reported_and_defaults_are_used() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("absent.json"));

        assert!(matches!(store.load().await, Err(StoreError::FileNotFound(_))));
        assert_eq!(store.load_or_default().await, SessionState::default());
    }

    #[tokio::test]
    async fn corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SESSION_FILE);
        std::fs::write(&path, "{ broker_ip: ").unwrap();
        let store = SessionStore::new(path);

        assert!(matches!(store.load().await, Err(StoreError::Parse { .. })));
        assert_eq!(store.load_or_default().await, SessionState::default());
    }

    #[tokio::test]
    async fn empty_log_path_disables_logging() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SESSION_FILE);
        std::fs::write(
            &path,
            r#"{"broker_ip":"10.0.0.5","broker_port":1884,"log_path":""}"#,
        )
        .unwrap();

        let state = SessionStore::new(path).load().await.unwrap();

        assert_eq!(state.broker_host, "10.0.0.5");
        assert_eq!(state.broker_port, 1884);
        assert_eq!(state.log_file_path, None);
        assert_eq!(state.last_temp_setpoint, 0.0);
    }

    #[tokio::test]
    async fn save_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("nested").join(SESSION_FILE));

        store.save(&SessionState::default()).await.unwrap();

        assert!(store.path().exists());
    }

    #[tokio::test]
    async fn unwritable_location_is_a_write_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();
        let store = SessionStore::new(blocker.join(SESSION_FILE));

        assert!(matches!(
            store.save(&SessionState::default()).await,
            Err(StoreError::Write { .. })
        ));
    }
}
