use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use tempfile::Builder;

use crate::error::KiraError;

const APP_DIR: &str = "kira-papers";
const SETTINGS_FILE: &str = "settings.json";
const CACHE_FILE: &str = "pubmed-cache.json";

#[derive(Debug, Clone)]
pub struct Store {
    config_root: Utf8PathBuf,
    cache_root: Utf8PathBuf,
}

impl Store {
    pub fn new() -> Result<Self, KiraError> {
        let dirs = BaseDirs::new().ok_or_else(|| {
            KiraError::Filesystem("unable to resolve home directory".to_string())
        })?;
        let config_root = Utf8PathBuf::from_path_buf(dirs.config_dir().join(APP_DIR))
            .map_err(|_| KiraError::Filesystem("invalid config path".to_string()))?;
        let cache_root = Utf8PathBuf::from_path_buf(dirs.cache_dir().join(APP_DIR))
            .map_err(|_| KiraError::Filesystem("invalid cache path".to_string()))?;

        Ok(Self {
            config_root,
            cache_root,
        })
    }

    pub fn new_with_paths(config_root: Utf8PathBuf, cache_root: Utf8PathBuf) -> Self {
        Self {
            config_root,
            cache_root,
        }
    }

    pub fn config_root(&self) -> &Utf8Path {
        &self.config_root
    }

    pub fn cache_root(&self) -> &Utf8Path {
        &self.cache_root
    }

    pub fn settings_path(&self) -> Utf8PathBuf {
        self.config_root.join(SETTINGS_FILE)
    }

    pub fn cache_path(&self) -> Utf8PathBuf {
        self.cache_root.join(CACHE_FILE)
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), KiraError> {
        let parent = path
            .parent()
            .ok_or_else(|| KiraError::Filesystem("invalid destination path".to_string()))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        let mut temp = Builder::new()
            .prefix("kira-papers")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        temp.write_all(content)
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        Ok(())
    }

    pub fn remove_if_exists(path: &Utf8Path) -> Result<bool, KiraError> {
        if !path.as_std_path().exists() {
            return Ok(false);
        }
        fs::remove_file(path.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        Ok(true)
    }
}
