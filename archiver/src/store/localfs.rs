//! Local-directory driver: single-node deployments and tests.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::{fs, io::AsyncWriteExt};

use super::{ObjectStore, StoreError};

pub struct LocalFsStore {
    root: PathBuf,
}

impl LocalFsStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl ObjectStore for LocalFsStore {
    async fn upload(
        &self,
        body: Vec<u8>,
        key: &str,
        _content_type: &str,
        _compressed: bool,
    ) -> Result<(), StoreError> {
        let path = self.path_for(key);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await?;
        }
        let mut f = fs::File::create(path).await?;
        f.write_all(&body).await?;
        f.flush().await?;
        Ok(())
    }
}
