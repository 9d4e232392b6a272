use directories::ProjectDirs;
use pagemark_core::EditorConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_SCHEMA_VERSION: u32 = 1;
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("unable to resolve local config directory")]
    NoConfigDirectory,
    #[error("config schema version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Editor config persisted as a versioned JSON envelope
#[derive(Debug, Clone)]
pub struct ConfigStore {
    root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigEnvelope {
    version: u32,
    config: EditorConfig,
}

impl ConfigStore {
    pub fn from_default_project() -> Result<Self, StorageError> {
        let dirs = ProjectDirs::from("dev", "Pagemark", "Pagemark")
            .ok_or(StorageError::NoConfigDirectory)?;

        Ok(Self { root: dirs.config_dir().to_path_buf() })
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    /// Stored config, or defaults when nothing was saved yet
    pub fn load(&self) -> Result<EditorConfig, StorageError> {
        let path = self.config_path();
        if !path.exists() {
            log::debug!("no config at {}, using defaults", path.display());
            return Ok(EditorConfig::default());
        }
        load_file(&path)
    }

    pub fn save(&self, config: &EditorConfig) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root)?;

        let envelope = ConfigEnvelope { version: CONFIG_SCHEMA_VERSION, config: config.clone() };
        let bytes = serde_json::to_vec_pretty(&envelope)?;
        fs::write(self.config_path(), bytes)?;
        log::info!("saved config to {}", self.config_path().display());
        Ok(())
    }
}

/// Read a config envelope from an explicit path
pub fn load_file(path: &Path) -> Result<EditorConfig, StorageError> {
    let bytes = fs::read(path)?;
    let envelope: ConfigEnvelope = serde_json::from_slice(&bytes)?;
    if envelope.version > CONFIG_SCHEMA_VERSION {
        return Err(StorageError::UnsupportedVersion {
            found: envelope.version,
            supported: CONFIG_SCHEMA_VERSION,
        });
    }
    Ok(envelope.config)
}
