//! Filesystem-backed artifact storage.
//!
//! Artifacts live at `{root}/{filename}/{id}.xml`. Bodies are streamed into a
//! hidden temporary file and renamed into place once flushed, so readers never
//! observe a partially written artifact.

use std::{
    path::{Path, PathBuf},
    time::SystemTime,
};

use async_stream::stream;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use tokio::{
    fs,
    io::{AsyncReadExt, AsyncWriteExt},
};
use tracing::debug;
use uuid::Uuid;

use crate::{
    application::repos::{BlobStore, BlobStoreError, ByteStream},
    domain::artifact::{ArtifactId, ArtifactMeta},
};

const ARTIFACT_EXTENSION: &str = "xml";
const READ_CHUNK_BYTES: usize = 64 * 1024;

#[derive(Debug)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Initialise storage rooted at the provided directory, creating it if necessary.
    pub fn new(root: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn directory(&self, filename: &str) -> Result<PathBuf, BlobStoreError> {
        let valid = !filename.is_empty()
            && filename != "."
            && filename != ".."
            && !filename.starts_with('.')
            && !filename.contains(['/', '\\']);
        if !valid {
            return Err(BlobStoreError::InvalidName(filename.to_string()));
        }
        Ok(self.root.join(filename))
    }

    /// Locate the file holding `id`, scanning every filename directory.
    async fn locate(&self, id: ArtifactId) -> Result<Option<PathBuf>, BlobStoreError> {
        let target = format!("{id}.{ARTIFACT_EXTENSION}");
        let mut dirs = fs::read_dir(&self.root).await?;
        while let Some(dir) = dirs.next_entry().await? {
            if !dir.file_type().await?.is_dir() {
                continue;
            }
            let candidate = dir.path().join(&target);
            if fs::try_exists(&candidate).await? {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }
}

/// Stream `body` into `path`, returning its length and sha256 digest.
/// The caller owns removal of `path` when this fails.
async fn write_temporary(
    path: &Path,
    mut body: ByteStream,
) -> Result<(u64, Vec<u8>), BlobStoreError> {
    let mut file = fs::File::create(path).await?;
    let mut hasher = Sha256::new();
    let mut total_bytes: u64 = 0;

    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        if chunk.is_empty() {
            continue;
        }
        total_bytes = total_bytes
            .checked_add(chunk.len() as u64)
            .ok_or(BlobStoreError::SizeOverflow)?;
        file.write_all(&chunk).await?;
        hasher.update(&chunk);
    }

    if total_bytes == 0 {
        return Err(BlobStoreError::EmptyPayload);
    }

    file.flush().await?;
    file.sync_all().await?;
    Ok((total_bytes, hasher.finalize().to_vec()))
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn write_stream(
        &self,
        filename: &str,
        body: ByteStream,
    ) -> Result<ArtifactId, BlobStoreError> {
        let directory = self.directory(filename)?;
        fs::create_dir_all(&directory).await?;

        let id = ArtifactId::from_uuid(Uuid::new_v4());
        let temporary = directory.join(format!(".{id}.tmp"));
        let destination = directory.join(format!("{id}.{ARTIFACT_EXTENSION}"));

        let written = match write_temporary(&temporary, body).await {
            Ok(written) => fs::rename(&temporary, &destination)
                .await
                .map(|()| written)
                .map_err(BlobStoreError::Io),
            Err(err) => Err(err),
        };
        let (total_bytes, digest) = match written {
            Ok(written) => written,
            Err(err) => {
                let _ = fs::remove_file(&temporary).await;
                return Err(err);
            }
        };

        debug!(
            target = "sitemapd::infra::blob",
            artifact_id = %id,
            filename,
            bytes = total_bytes,
            sha256 = %hex::encode(&digest),
            "artifact stored"
        );

        Ok(id)
    }

    async fn remove(&self, id: ArtifactId) -> Result<(), BlobStoreError> {
        let Some(path) = self.locate(id).await? else {
            return Ok(());
        };
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(BlobStoreError::Io(err)),
        }
    }

    async fn list_metadata(&self, filename: &str) -> Result<Vec<ArtifactMeta>, BlobStoreError> {
        let directory = self.directory(filename)?;
        let mut entries = match fs::read_dir(&directory).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(BlobStoreError::Io(err)),
        };

        let mut metas = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(ARTIFACT_EXTENSION) {
                continue;
            }
            let Some(id) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.parse::<ArtifactId>().ok())
            else {
                continue;
            };

            let metadata = entry.metadata().await?;
            let created_at = metadata
                .modified()
                .map(OffsetDateTime::from)
                .unwrap_or_else(|_| OffsetDateTime::from(SystemTime::UNIX_EPOCH));
            metas.push(ArtifactMeta {
                id,
                filename: filename.to_string(),
                size_bytes: metadata.len(),
                created_at,
            });
        }

        metas.sort_by_key(|meta| meta.created_at);
        Ok(metas)
    }

    async fn read_stream(&self, id: ArtifactId) -> Result<ByteStream, BlobStoreError> {
        let path = self
            .locate(id)
            .await?
            .ok_or(BlobStoreError::NotFound(id))?;
        let mut file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(BlobStoreError::NotFound(id));
            }
            Err(err) => return Err(BlobStoreError::Io(err)),
        };

        let body = stream! {
            let mut buffer = vec![0u8; READ_CHUNK_BYTES];
            loop {
                match file.read(&mut buffer).await {
                    Ok(0) => break,
                    Ok(read) => {
                        yield Ok::<Bytes, BlobStoreError>(Bytes::copy_from_slice(&buffer[..read]));
                    }
                    Err(err) => {
                        yield Err(BlobStoreError::Io(err));
                        break;
                    }
                }
            }
        };

        Ok(Box::pin(body))
    }
}
