//! Save blobs and the lock that guards the save file.
//!
//! The sync core never looks inside a save. It only moves bytes: the server
//! frames them after a `SaveUpdate` byte, the client reads the frame and
//! persists it under [`SaveLock`].
//!
//! # Framing
//!
//! ```text
//! ┌──────────────────┬──────────────────────────┐
//! │ Length (4 bytes) │ Save bytes (variable)    │
//! │ Big-endian u32   │ opaque                   │
//! └──────────────────┴──────────────────────────┘
//! ```
//!
//! # Persistence
//!
//! Received bytes go to `<path>.part` first and are renamed over the target,
//! so readers holding the lock only ever see a complete file.

use crate::error::{Error, Result};
use parking_lot::{ArcMutexGuard, Mutex, RawMutex};
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The whole persisted game as opaque bytes
#[derive(Clone, PartialEq, Eq)]
pub struct Save {
    bytes: Vec<u8>,
}

impl std::fmt::Debug for Save {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Save").field("len", &self.bytes.len()).finish()
    }
}

/// Exclusive lock shared by every reader and writer of one save file
///
/// Cloning yields another handle to the same lock. Guards own their share of
/// the lock, so they may outlive the handle they came from. The guard
/// releases on drop, including during unwinding.
#[derive(Clone, Default)]
pub struct SaveLock {
    inner: Arc<Mutex<()>>,
}

/// Held access to the save file
pub type SaveGuard = ArcMutexGuard<RawMutex, ()>;

impl SaveLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the save file is ours.
    pub fn lock(&self) -> SaveGuard {
        self.inner.lock_arc()
    }

    /// Take the lock only if nobody holds it.
    pub fn try_lock(&self) -> Option<SaveGuard> {
        self.inner.try_lock_arc()
    }
}

impl Save {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Read an existing save file from disk.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(fs::read(path)?))
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Write the length-prefixed frame.
    pub fn write_framed<W: Write>(&self, w: &mut W) -> Result<()> {
        let len = u32::try_from(self.bytes.len()).map_err(|_| Error::FrameTooLarge {
            len: self.bytes.len(),
            max: u32::MAX as usize,
        })?;
        w.write_all(&len.to_be_bytes())?;
        w.write_all(&self.bytes)?;
        Ok(())
    }

    /// Read one length-prefixed frame, refusing anything above `max_len`.
    pub fn read_framed<R: Read>(r: &mut R, max_len: usize) -> Result<Self> {
        let mut len_buf = [0u8; 4];
        r.read_exact(&mut len_buf)?;
        let len = u32::from_be_bytes(len_buf) as usize;

        if len > max_len {
            return Err(Error::FrameTooLarge { len, max: max_len });
        }

        let mut bytes = vec![0u8; len];
        r.read_exact(&mut bytes)?;
        Ok(Self::new(bytes))
    }

    /// Write the save to `path` while holding `lock`.
    pub fn persist(&self, path: &Path, lock: &SaveLock) -> Result<()> {
        let _guard = lock.lock();
        self.write_unlocked(path)
    }

    /// Read one frame from `r` and persist it to `path`, holding `lock` for
    /// the whole read-and-write.
    ///
    /// Returns the number of save bytes written.
    pub fn read_and_save<R: Read>(
        r: &mut R,
        path: &Path,
        lock: &SaveLock,
        max_len: usize,
    ) -> Result<usize> {
        let _guard = lock.lock();
        let save = Self::read_framed(r, max_len)?;
        save.write_unlocked(path)?;
        Ok(save.len())
    }

    fn write_unlocked(&self, path: &Path) -> Result<()> {
        let write_err = |source| Error::SaveWrite {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(write_err)?;
            }
        }

        let partial = partial_path(path);
        fs::write(&partial, &self.bytes).map_err(write_err)?;
        fs::rename(&partial, path).map_err(write_err)?;
        Ok(())
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Fault;
    use std::io::Cursor;
    use tempfile::TempDir;

    #[test]
    fn test_framed_round_trip() {
        let save = Save::new(b"GAME { version = 1.12.5 }".to_vec());
        let mut buf = Vec::new();
        save.write_framed(&mut buf).unwrap();
        assert_eq!(&buf[..4], &(save.len() as u32).to_be_bytes());

        let read = Save::read_framed(&mut Cursor::new(buf), 1024).unwrap();
        assert_eq!(read, save);
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut buf = Vec::new();
        Save::new(vec![7u8; 64]).write_framed(&mut buf).unwrap();

        let err = Save::read_framed(&mut Cursor::new(buf), 16).unwrap_err();
        assert!(matches!(err, Error::FrameTooLarge { len: 64, max: 16 }));
        assert_eq!(err.fault(), Fault::Protocol);
    }

    #[test]
    fn test_truncated_frame_is_transient() {
        let mut buf = Vec::new();
        Save::new(vec![1u8; 32]).write_framed(&mut buf).unwrap();
        buf.truncate(20);

        let err = Save::read_framed(&mut Cursor::new(buf), 1024).unwrap_err();
        assert_eq!(err.fault(), Fault::Transient);
    }

    #[test]
    fn test_read_and_save_writes_exact_bytes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("persistent.sfs");
        let lock = SaveLock::new();

        let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let mut buf = Vec::new();
        Save::new(payload.clone()).write_framed(&mut buf).unwrap();
        // a trailing byte belongs to the next message and must stay unread
        buf.push(0);

        let mut cursor = Cursor::new(buf);
        let written = Save::read_and_save(&mut cursor, &path, &lock, 1 << 20).unwrap();

        assert_eq!(written, payload.len());
        assert_eq!(fs::read(&path).unwrap(), payload);
        assert!(!partial_path(&path).exists());
        assert_eq!(cursor.position() as usize, payload.len() + 4);
    }

    #[test]
    fn test_lock_is_released_after_save() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("persistent.sfs");
        let lock = SaveLock::new();

        Save::new(b"abc".to_vec()).persist(&path, &lock).unwrap();
        assert!(lock.try_lock().is_some());
    }

    #[test]
    fn test_lock_is_released_after_failed_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("persistent.sfs");
        let lock = SaveLock::new();

        let result = Save::read_and_save(&mut Cursor::new(vec![0u8, 0]), &path, &lock, 1024);
        assert!(result.is_err());
        assert!(lock.try_lock().is_some());
        assert!(!path.exists());
    }

    #[test]
    fn test_guard_outlives_handle() {
        let lock = SaveLock::new();
        let guard = lock.clone().lock();
        assert!(lock.try_lock().is_none());
        drop(guard);
        assert!(lock.try_lock().is_some());
    }

    #[test]
    fn test_clones_share_one_lock() {
        let lock = SaveLock::new();
        let other = lock.clone();
        let _guard = lock.lock();
        assert!(other.try_lock().is_none());
    }

    #[test]
    fn test_write_failure_is_save_write() {
        let dir = TempDir::new().unwrap();
        // a regular file where a directory is expected
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"x").unwrap();
        let path = blocker.join("persistent.sfs");

        let err = Save::new(b"abc".to_vec())
            .persist(&path, &SaveLock::new())
            .unwrap_err();
        assert!(matches!(err, Error::SaveWrite { .. }));
    }

    #[test]
    fn test_debug_hides_contents() {
        let save = Save::new(vec![0u8; 3]);
        assert_eq!(format!("{:?}", save), "Save { len: 3 }");
    }
}
