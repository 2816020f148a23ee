use std::path::PathBuf;

use serde::Deserialize;

/// Blob storage configuration shared by everything that reads or writes file content.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Root directory of the content-addressed blob store. Default: "./data/files".
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
    /// Largest accepted upload in bytes. Default: 50 MiB.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("./data/files")
}
fn default_max_upload_bytes() -> u64 {
    50 * 1024 * 1024
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}
