use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;
use tradebot_core::domain::poll_data::PollData;
use tradebot_core::errors::StoreError;
use tradebot_core::ports::PollDataStore;

/// Poll data kept as a single JSON document. Writes go to a sibling temp
/// file that is renamed over the target, so a crash never leaves a torn file.
#[derive(Clone, Debug)]
pub struct FilePollDataStore {
    path: PathBuf,
}

impl FilePollDataStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|name| name.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_error(&self, error: std::io::Error) -> StoreError {
        StoreError::Io { path: self.path.display().to_string(), message: error.to_string() }
    }
}

#[async_trait]
impl PollDataStore for FilePollDataStore {
    async fn load(&self) -> Result<Option<PollData>, StoreError> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(self.io_error(error)),
        };
        if raw.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&raw).map(Some).map_err(|error| StoreError::Format(error.to_string()))
    }

    async fn save(&self, data: &PollData) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|error| self.io_error(error))?;
        }
        let encoded = serde_json::to_vec(data).map_err(|error| StoreError::Format(error.to_string()))?;
        let temp = self.temp_path();
        fs::write(&temp, encoded).await.map_err(|error| self.io_error(error))?;
        fs::rename(&temp, &self.path).await.map_err(|error| self.io_error(error))?;
        debug!(path = %self.path.display(), "poll data written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::FilePollDataStore;

    #[test]
    fn temp_file_sits_next_to_target() {
        let store = FilePollDataStore::new("files/polldata.json");
        assert_eq!(store.temp_path(), PathBuf::from("files/polldata.json.tmp"));
    }
}
