//! Persistent cache: one file per fingerprint under a root directory.

use super::entry::ScaleResult;
use super::fingerprint::Fingerprint;
use super::CacheError;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// File extension of persisted entries
pub const EXTENSION: &str = "cache";

/// Fingerprint-addressed files on disk
///
/// Writes go to a temporary file in the same directory which is then
/// renamed over the target, so readers never observe a partial entry and
/// concurrent writers of the same fingerprint cannot interleave.
#[derive(Debug, Clone)]
pub struct DiskCache {
    root: PathBuf,
}

impl DiskCache {
    /// Open (and create if needed) a cache directory
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| CacheError::Io {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, fingerprint: Fingerprint) -> PathBuf {
        self.root.join(format!("{}.{}", fingerprint, EXTENSION))
    }

    /// Read an entry; a missing file is `Ok(None)`
    pub fn try_fetch(&self, fingerprint: Fingerprint) -> Result<Option<ScaleResult>, CacheError> {
        let path = self.path_for(fingerprint);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(CacheError::Io { path, source }),
        };
        ScaleResult::decode(&bytes).map(Some)
    }

    /// Read an entry, treating every failure as a miss
    pub fn fetch(&self, fingerprint: Fingerprint) -> Option<ScaleResult> {
        match self.try_fetch(fingerprint) {
            Ok(found) => found,
            Err(err) => {
                log::warn!("Disk cache entry {} unusable: {}", fingerprint, err);
                None
            }
        }
    }

    /// Write an entry, replacing any previous file atomically
    pub fn save(&self, fingerprint: Fingerprint, result: &ScaleResult) -> Result<(), CacheError> {
        let path = self.path_for(fingerprint);
        let io_err = |source: io::Error| CacheError::Io {
            path: path.clone(),
            source,
        };

        let mut file = tempfile::NamedTempFile::new_in(&self.root).map_err(io_err)?;
        file.write_all(&result.encode()).map_err(io_err)?;
        file.as_file().sync_data().map_err(io_err)?;
        file.persist(&path).map_err(|err| io_err(err.error))?;
        log::debug!("Saved {} ({} bytes) to disk cache", fingerprint, result.byte_size());
        Ok(())
    }

    pub fn remove(&self, fingerprint: Fingerprint) -> Result<(), CacheError> {
        let path = self.path_for(fingerprint);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CacheError::Io { path, source }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Extent, Vec2B, Vec2I};
    use crate::resample::PixelFormat;

    fn result() -> ScaleResult {
        ScaleResult {
            data: vec![7; 8 * 8 * 4],
            dimensions: Extent::new(8, 8),
            format: PixelFormat::Rgba8,
            wrapped: Vec2B::FALSE,
            padding: Vec2I::ZERO,
            block_padding: Vec2I::ZERO,
        }
    }

    #[test]
    fn test_save_and_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::open(dir.path().join("nested")).unwrap();
        let fp = Fingerprint(0xabcdef);

        assert!(cache.fetch(fp).is_none());
        cache.save(fp, &result()).unwrap();
        assert!(cache.path_for(fp).ends_with("0000000000abcdef.cache"));
        assert_eq!(cache.fetch(fp), Some(result()));

        // overwrite in place
        let mut other = result();
        other.data = vec![9; 8 * 8 * 4];
        cache.save(fp, &other).unwrap();
        assert_eq!(cache.fetch(fp), Some(other));

        cache.remove(fp).unwrap();
        assert!(cache.fetch(fp).is_none());
        cache.remove(fp).unwrap();
    }

    #[test]
    fn test_corrupt_entry_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::open(dir.path()).unwrap();
        let fp = Fingerprint(1);
        fs::write(cache.path_for(fp), b"garbage").unwrap();
        assert!(matches!(cache.try_fetch(fp), Err(CacheError::Corrupt(_))));
        assert!(cache.fetch(fp).is_none());

        let mut truncated = result().encode();
        truncated.truncate(truncated.len() - 4);
        fs::write(cache.path_for(fp), truncated).unwrap();
        assert!(cache.fetch(fp).is_none());
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::open(dir.path()).unwrap();
        for i in 0..4 {
            cache.save(Fingerprint(i), &result()).unwrap();
        }
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names.len(), 4);
        assert!(names.iter().all(|n| n.ends_with(".cache")));
    }
}
