use anyhow::{Context, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::FrameSource;
use crate::artifact::{image_file_name, write_atomic};
use crate::record::{validate_camera_id, CameraRecord};

/// Directory name used under the data root for raw camera snapshots.
pub const CAPTURED_IMAGES_DIR: &str = "CapturedImages";

/// Snapshots stored as `<root>/img{id}.jpg`.
pub struct CapturedImageDir {
    root: PathBuf,
}

impl CapturedImageDir {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, camera_id: &str) -> Result<PathBuf> {
        let id = validate_camera_id(camera_id)?;
        Ok(self.root.join(image_file_name(id)))
    }

    /// Store a snapshot, replacing any previous one for the same camera.
    pub fn store(&self, camera_id: &str, bytes: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("failed to create {}", self.root.display()))?;
        let path = self.path_for(camera_id)?;
        write_atomic(&path, bytes)
            .with_context(|| format!("failed to write snapshot {}", path.display()))
    }

    /// Remove a camera's snapshot so a later load reports no data.
    /// A snapshot that is already gone is fine.
    pub fn discard(&self, camera_id: &str) -> Result<()> {
        let path = self.path_for(camera_id)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("failed to remove snapshot {}", path.display())),
        }
    }
}

impl FrameSource for CapturedImageDir {
    fn load(&self, record: &CameraRecord) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(&record.id)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("failed to read snapshot {}", path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> CameraRecord {
        CameraRecord::new(id, "cam", 40.0, -73.0, "https://cam/x.jpg")
    }

    #[test]
    fn missing_snapshot_is_none() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let dir = CapturedImageDir::new(temp_dir.path().join(CAPTURED_IMAGES_DIR));
        assert!(dir.load(&record("17"))?.is_none());
        Ok(())
    }

    #[test]
    fn stored_snapshot_loads_back() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let dir = CapturedImageDir::new(temp_dir.path().join(CAPTURED_IMAGES_DIR));
        dir.store("17", b"\xff\xd8jpeg")?;
        assert_eq!(dir.load(&record("17"))?, Some(b"\xff\xd8jpeg".to_vec()));
        assert!(dir.root().join("img17.jpg").is_file());
        Ok(())
    }

    #[test]
    fn discarded_snapshot_is_none() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let dir = CapturedImageDir::new(temp_dir.path().join(CAPTURED_IMAGES_DIR));
        dir.discard("17")?;
        dir.store("17", b"old")?;
        dir.discard("17")?;
        assert!(dir.load(&record("17"))?.is_none());
        Ok(())
    }

    #[test]
    fn unsafe_ids_are_rejected() {
        let dir = CapturedImageDir::new("/tmp/never-used");
        assert!(dir.load(&record("../17")).is_err());
    }
}
