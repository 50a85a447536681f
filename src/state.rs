// src/state.rs
//! Durable relay state: per-source offsets and content fingerprints.
//!
//! Written as pretty JSON via temp file + fsync + rename, so a crash leaves
//! either the previous file or the new one, never a torn write.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{RelayError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    /// source id → last processed item id
    #[serde(default)]
    pub offsets: BTreeMap<String, i64>,
    /// fingerprint → first-seen unix seconds
    #[serde(default)]
    pub fingerprints: BTreeMap<String, i64>,
}

#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "relay_state.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Missing file → empty state. A file that exists but does not parse is
    /// an error: starting from scratch would silently re-bootstrap offsets.
    pub async fn load(&self) -> Result<PersistedState> {
        match fs::read_to_string(&self.path).await {
            Ok(s) if s.trim().is_empty() => Ok(PersistedState::default()),
            Ok(s) => serde_json::from_str(&s).map_err(|e| {
                RelayError::Configuration(format!(
                    "state file {} is unreadable: {e}",
                    self.path.display()
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "no state file yet, starting fresh");
                Ok(PersistedState::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn save(&self, state: &PersistedState) -> Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf);
        if let Some(dir) = &dir {
            fs::create_dir_all(dir).await?;
        }

        let bytes = serde_json::to_vec_pretty(state)?;
        let tmp = self.tmp_path();
        {
            let mut f = fs::File::create(&tmp).await?;
            f.write_all(&bytes).await?;
            f.sync_all().await?;
        }
        fs::rename(&tmp, &self.path).await?;

        // Persist the rename itself.
        #[cfg(unix)]
        if let Some(dir) = &dir {
            if let Ok(d) = fs::File::open(dir).await {
                let _ = d.sync_all().await;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let store = StateStore::new(tmp.path().join("nested/state.json"));
        assert_eq!(store.load().await.unwrap(), PersistedState::default());
    }

    #[tokio::test]
    async fn save_then_load_and_no_temp_left() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested/state.json");
        let store = StateStore::new(&path);

        let mut st = PersistedState::default();
        st.offsets.insert("news".into(), 42);
        st.fingerprints.insert("ab12".into(), 1_700_000_000);
        store.save(&st).await.unwrap();

        assert_eq!(store.load().await.unwrap(), st);
        assert!(!tmp.path().join("nested/state.json.tmp").exists());

        st.offsets.insert("news".into(), 43);
        store.save(&st).await.unwrap();
        assert_eq!(store.load().await.unwrap().offsets["news"], 43);
    }

    #[tokio::test]
    async fn corrupt_file_is_a_configuration_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("state.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = StateStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, RelayError::Configuration(_)));
    }

    #[tokio::test]
    async fn partial_documents_fill_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("state.json");
        std::fs::write(&path, r#"{"offsets": {"a": 3}}"#).unwrap();
        let st = StateStore::new(&path).load().await.unwrap();
        assert_eq!(st.offsets["a"], 3);
        assert!(st.fingerprints.is_empty());
    }
}
