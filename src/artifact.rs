//! Annotated thumbnail storage, keyed by camera id.
//!
//! Writes replace any previous thumbnail for the same camera in a single
//! rename, so a reader sees either the old file or the new one, never a
//! partial write.

use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::record::validate_camera_id;

/// Directory name used under the data root for annotated thumbnails.
pub const BOUNDED_IMAGES_DIR: &str = "BoundedImages";

pub trait ArtifactStore: Send + Sync {
    fn has(&self, camera_id: &str) -> Result<bool>;

    fn write(&self, camera_id: &str, bytes: &[u8]) -> Result<()>;

    fn read(&self, camera_id: &str) -> Result<Vec<u8>>;
}

/// Thumbnails as `<root>/img{id}.jpg`.
pub struct FilesystemArtifactStore {
    root: PathBuf,
}

impl FilesystemArtifactStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create artifact dir {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, camera_id: &str) -> Result<PathBuf> {
        let id = validate_camera_id(camera_id)?;
        Ok(self.root.join(image_file_name(id)))
    }
}

impl ArtifactStore for FilesystemArtifactStore {
    fn has(&self, camera_id: &str) -> Result<bool> {
        Ok(self.path_for(camera_id)?.is_file())
    }

    fn write(&self, camera_id: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(camera_id)?;
        write_atomic(&path, bytes)
            .with_context(|| format!("failed to write thumbnail {}", path.display()))
    }

    fn read(&self, camera_id: &str) -> Result<Vec<u8>> {
        let path = self.path_for(camera_id)?;
        read_file(&path).with_context(|| format!("failed to read thumbnail {}", path.display()))
    }
}

/// Process-local store for tests and dry runs.
#[derive(Default)]
pub struct InMemoryArtifactStore {
    items: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.lock().map(|items| items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ArtifactStore for InMemoryArtifactStore {
    fn has(&self, camera_id: &str) -> Result<bool> {
        let items = self
            .items
            .lock()
            .map_err(|_| anyhow!("artifact store lock poisoned"))?;
        Ok(items.contains_key(camera_id))
    }

    fn write(&self, camera_id: &str, bytes: &[u8]) -> Result<()> {
        let mut items = self
            .items
            .lock()
            .map_err(|_| anyhow!("artifact store lock poisoned"))?;
        items.insert(camera_id.to_string(), bytes.to_vec());
        Ok(())
    }

    fn read(&self, camera_id: &str) -> Result<Vec<u8>> {
        let items = self
            .items
            .lock()
            .map_err(|_| anyhow!("artifact store lock poisoned"))?;
        items
            .get(camera_id)
            .cloned()
            .ok_or_else(|| anyhow!("no thumbnail for camera {}", camera_id))
    }
}

/// `img{id}.jpg`, the naming shared by captured and annotated images.
pub fn image_file_name(camera_id: &str) -> String {
    format!("img{}.jpg", camera_id)
}

pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let tmp_path = path.with_extension("tmp");
    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
    }
    fs::rename(tmp_path, path)?;
    Ok(())
}

pub(crate) fn read_file(path: &Path) -> Result<Vec<u8>> {
    let mut file = File::open(path)?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    Ok(buf)
}
