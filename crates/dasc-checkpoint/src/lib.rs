use std::fs;
use std::io::Write;
use std::path::PathBuf;

use dasc_foundation::CheckpointError;
use dasc_types::{Carry, Checkpoint};
use ndarray::Array2;

/// Reads/writes the resume checkpoint (`last`) and the leftover-sample
/// sidecar (`carry.npy`). Reads tolerate absence; writes always overwrite.
pub trait CheckpointStore: Send {
    fn put(&self, checkpoint: Checkpoint) -> Result<(), CheckpointError>;
    fn get(&self) -> Result<Option<Checkpoint>, CheckpointError>;
    fn put_carry(&self, carry: &Carry) -> Result<(), CheckpointError>;
    fn get_carry(&self) -> Result<Option<Carry>, CheckpointError>;
    fn clear_carry(&self) -> Result<(), CheckpointError>;
    fn clear_last(&self) -> Result<(), CheckpointError>;
}

pub struct FileCheckpointStore {
    root: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn last_path(&self) -> PathBuf {
        self.root.join("last")
    }

    fn carry_path(&self) -> PathBuf {
        self.root.join("carry.npy")
    }

    /// Write-temp-then-rename so a reader never observes a half-written file.
    fn write_atomic(&self, path: &PathBuf, contents: &[u8]) -> Result<(), CheckpointError> {
        let tmp = path.with_extension("tmp");
        let mut file = fs::File::create(&tmp)
            .map_err(|e| CheckpointError::Write(format!("unable to create {}: {e}", tmp.display())))?;
        file.write_all(contents)
            .map_err(|e| CheckpointError::Write(format!("unable to write {}: {e}", tmp.display())))?;
        file.sync_all()
            .map_err(|e| CheckpointError::Write(format!("unable to fsync {}: {e}", tmp.display())))?;
        fs::rename(&tmp, path)
            .map_err(|e| CheckpointError::Write(format!("unable to rename {} to {}: {e}", tmp.display(), path.display())))?;
        Ok(())
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn put(&self, checkpoint: Checkpoint) -> Result<(), CheckpointError> {
        if let Some(parent) = self.root.parent() {
            let _ = parent;
        }
        fs::create_dir_all(&self.root)
            .map_err(|e| CheckpointError::Write(format!("unable to create checkpoint dir {}: {e}", self.root.display())))?;
        let contents = format!("{}\n{}\n", checkpoint.origin_time, checkpoint.cursor);
        self.write_atomic(&self.last_path(), contents.as_bytes())
    }

    fn get(&self) -> Result<Option<Checkpoint>, CheckpointError> {
        let path = self.last_path();
        if !path.is_file() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path)
            .map_err(|e| CheckpointError::Read(format!("unable to read {}: {e}", path.display())))?;
        let mut lines = text.lines();
        let origin_time: f64 = lines
            .next()
            .ok_or_else(|| CheckpointError::Read(format!("{} is empty", path.display())))?
            .trim()
            .parse()
            .map_err(|e| CheckpointError::Read(format!("malformed origin_time in {}: {e}", path.display())))?;
        let cursor: u32 = lines
            .next()
            .ok_or_else(|| CheckpointError::Read(format!("{} missing cursor line", path.display())))?
            .trim()
            .parse()
            .map_err(|e| CheckpointError::Read(format!("malformed cursor in {}: {e}", path.display())))?;
        Ok(Some(Checkpoint { origin_time, cursor }))
    }

    fn put_carry(&self, carry: &Carry) -> Result<(), CheckpointError> {
        fs::create_dir_all(&self.root)
            .map_err(|e| CheckpointError::Write(format!("unable to create checkpoint dir {}: {e}", self.root.display())))?;
        ndarray_npy::write_npy(self.carry_path(), &carry.matrix)
            .map_err(|e| CheckpointError::Write(format!("unable to write carry.npy: {e}")))
    }

    fn get_carry(&self) -> Result<Option<Carry>, CheckpointError> {
        let path = self.carry_path();
        if !path.is_file() {
            return Ok(None);
        }
        let matrix: Array2<f32> = ndarray_npy::read_npy(&path)
            .map_err(|e| CheckpointError::Read(format!("unable to read {}: {e}", path.display())))?;
        Ok(Some(Carry { matrix }))
    }

    fn clear_carry(&self) -> Result<(), CheckpointError> {
        remove_if_present(&self.carry_path())
    }

    fn clear_last(&self) -> Result<(), CheckpointError> {
        remove_if_present(&self.last_path())
    }
}

fn remove_if_present(path: &PathBuf) -> Result<(), CheckpointError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CheckpointError::Write(format!("unable to remove {}: {e}", path.display()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn put_then_get_round_trips() {
        let dir = tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        store
            .put(Checkpoint {
                origin_time: 1_700_000_000.0,
                cursor: 1500,
            })
            .unwrap();
        let checkpoint = store.get().unwrap().unwrap();
        assert_eq!(checkpoint.origin_time, 1_700_000_000.0);
        assert_eq!(checkpoint.cursor, 1500);
    }

    #[test]
    fn get_tolerates_absence() {
        let dir = tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        assert_eq!(store.get().unwrap(), None);
        assert_eq!(store.get_carry().unwrap(), None);
    }

    #[test]
    fn carry_round_trips_through_npy() {
        let dir = tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        let carry = Carry {
            matrix: Array2::from_shape_fn((3, 4), |(r, c)| (r * 4 + c) as f32),
        };
        store.put_carry(&carry).unwrap();
        let restored = store.get_carry().unwrap().unwrap();
        assert_eq!(restored.matrix, carry.matrix);
    }

    #[test]
    fn clear_carry_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        store.clear_carry().unwrap();
        store.clear_carry().unwrap();
    }
}
