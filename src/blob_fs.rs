//! Filesystem blob store.
//!
//! Objects live as plain files under a root directory. Writes go through a
//! temporary sibling and a rename so a reader never sees a half-written
//! artifact. Locations are `file://` URIs with an absolute path.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use tracing::debug;

use crate::models::BlobLocation;
use crate::traits::BlobStore;

const URI_SCHEME: &str = "file://";

pub struct FilesystemBlobStore {
    root: PathBuf,
}

impl FilesystemBlobStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn object_path(&self, object_name: &str) -> Result<PathBuf> {
        let name = object_name.trim_start_matches('/');
        if name.is_empty() || Path::new(name).components().any(|c| {
            matches!(
                c,
                std::path::Component::ParentDir | std::path::Component::RootDir
            )
        }) {
            bail!("invalid object name: '{}'", object_name);
        }
        Ok(self.root.join(name))
    }
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    fn name(&self) -> &str {
        "filesystem"
    }

    async fn put(&self, object_name: &str, body: &[u8]) -> Result<BlobLocation> {
        let path = self.object_path(object_name)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".partial");
        let tmp = PathBuf::from(tmp_name);
        tokio::fs::write(&tmp, body)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("Failed to move blob into place at {}", path.display()))?;

        let absolute = tokio::fs::canonicalize(&path)
            .await
            .with_context(|| format!("Failed to resolve {}", path.display()))?;
        debug!(path = %absolute.display(), bytes = body.len(), "blob written");

        Ok(BlobLocation {
            uri: format!("{}{}", URI_SCHEME, absolute.display()),
            size: body.len() as u64,
        })
    }

    async fn get(&self, location: &BlobLocation) -> Result<Vec<u8>> {
        let path = location
            .uri
            .strip_prefix(URI_SCHEME)
            .ok_or_else(|| anyhow!("not a filesystem blob: {}", location.uri))?;
        tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read blob {}", location.uri))
    }
}
