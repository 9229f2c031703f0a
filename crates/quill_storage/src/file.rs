//! File-based page store for persistent storage.

use crate::error::{StorageError, StorageResult};
use crate::store::{pages_for, validate_page_size, PageId, PageStore};
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// A file-based page store.
///
/// Pages live at `page_id * page_size` in a single file. Data survives
/// process restarts.
///
/// # Durability
///
/// - `write_pages()` hands data to the OS
/// - `sync()` calls `File::sync_all()` to ensure data is on disk
///
/// # Locking
///
/// The file is locked exclusively for the lifetime of the store, so two
/// engines (in this or another process) can never share it.
///
/// # Example
///
/// ```no_run
/// use quill_storage::{FilePageStore, PageStore};
/// use std::path::Path;
///
/// let mut store = FilePageStore::open(Path::new("data.quill"), 4096).unwrap();
/// store.write_pages(0, b"persistent page").unwrap();
/// store.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FilePageStore {
    path: PathBuf,
    page_size: usize,
    file: Mutex<File>,
    page_count: u64,
}

impl FilePageStore {
    /// Opens or creates a page store at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The page size is invalid
    /// - The file cannot be opened or created
    /// - Another handle holds the lock (`Locked`)
    /// - The file length is not a multiple of `page_size` (`Misaligned`)
    pub fn open(path: &Path, page_size: usize) -> StorageResult<Self> {
        validate_page_size(page_size)?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        if file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked {
                path: path.to_path_buf(),
            });
        }

        let len = file.metadata()?.len();
        if len % page_size as u64 != 0 {
            return Err(StorageError::Misaligned { len, page_size });
        }
        let page_count = len / page_size as u64;
        debug!(path = %path.display(), page_size, page_count, "opened page store");

        Ok(Self {
            path: path.to_path_buf(),
            page_size,
            file: Mutex::new(file),
            page_count,
        })
    }

    /// Opens or creates a page store, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or the file cannot be opened.
    pub fn open_with_create_dirs(path: &Path, page_size: usize) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::open(path, page_size)
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PageStore for FilePageStore {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn page_count(&self) -> u64 {
        self.page_count
    }

    fn read_pages(&self, start: PageId, count: u64) -> StorageResult<Vec<u8>> {
        let end = start.saturating_add(count);
        if end > self.page_count {
            return Err(StorageError::PageOutOfRange {
                start,
                count,
                page_count: self.page_count,
            });
        }

        let mut buffer = vec![0u8; count as usize * self.page_size];
        if buffer.is_empty() {
            return Ok(buffer);
        }

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(start * self.page_size as u64))?;
        file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    fn write_pages(&mut self, start: PageId, data: &[u8]) -> StorageResult<()> {
        if start > self.page_count {
            return Err(StorageError::NonContiguousWrite {
                start,
                page_count: self.page_count,
            });
        }

        let pages = pages_for(data.len(), self.page_size);
        let mut run = Vec::with_capacity(pages as usize * self.page_size);
        run.extend_from_slice(data);
        run.resize(pages as usize * self.page_size, 0);

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(start * self.page_size as u64))?;
        file.write_all(&run)?;
        file.flush()?;

        self.page_count = self.page_count.max(start + pages);
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.file.lock().sync_all()?;
        Ok(())
    }

    fn truncate(&mut self, page_count: u64) -> StorageResult<()> {
        if page_count > self.page_count {
            return Err(StorageError::PageOutOfRange {
                start: self.page_count,
                count: page_count - self.page_count,
                page_count: self.page_count,
            });
        }

        let file = self.file.lock();
        file.set_len(page_count * self.page_size as u64)?;
        file.sync_all()?;
        self.page_count = page_count;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_create_new() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pages.quill");

        let store = FilePageStore::open(&path, 512).unwrap();
        assert_eq!(store.page_count(), 0);
        assert_eq!(store.page_size(), 512);
        assert!(path.exists());
    }

    #[test]
    fn file_write_and_read_run() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pages.quill");

        let mut store = FilePageStore::open(&path, 512).unwrap();
        store.write_pages(0, &[3u8; 700]).unwrap();
        store.write_pages(2, b"third").unwrap();
        assert_eq!(store.page_count(), 3);

        let run = store.read_pages(0, 2).unwrap();
        assert_eq!(&run[..700], &[3u8; 700]);
        assert!(run[700..].iter().all(|&b| b == 0));
        assert_eq!(&store.read_pages(2, 1).unwrap()[..5], b"third");
    }

    #[test]
    fn file_persistence_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pages.quill");

        {
            let mut store = FilePageStore::open(&path, 512).unwrap();
            store.write_pages(0, b"survives").unwrap();
            store.sync().unwrap();
        }

        let store = FilePageStore::open(&path, 512).unwrap();
        assert_eq!(store.page_count(), 1);
        assert_eq!(&store.read_pages(0, 1).unwrap()[..8], b"survives");
    }

    #[test]
    fn file_second_open_is_locked() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pages.quill");

        let _first = FilePageStore::open(&path, 512).unwrap();
        let second = FilePageStore::open(&path, 512);
        assert!(matches!(second, Err(StorageError::Locked { .. })));
    }

    #[test]
    fn file_misaligned_length_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pages.quill");
        std::fs::write(&path, [0u8; 100]).unwrap();

        let result = FilePageStore::open(&path, 512);
        assert!(matches!(result, Err(StorageError::Misaligned { len: 100, .. })));
    }

    #[test]
    fn file_write_with_hole_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pages.quill");

        let mut store = FilePageStore::open(&path, 512).unwrap();
        assert!(matches!(
            store.write_pages(1, b"x"),
            Err(StorageError::NonContiguousWrite { .. })
        ));
    }

    #[test]
    fn file_truncate() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pages.quill");

        let mut store = FilePageStore::open_with_create_dirs(&path, 512).unwrap();
        store.write_pages(0, &[1u8; 2048]).unwrap();
        store.truncate(2).unwrap();
        assert_eq!(store.page_count(), 2);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 1024);
    }

    #[test]
    fn file_open_with_create_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("deep").join("pages.quill");

        let store = FilePageStore::open_with_create_dirs(&path, 4096).unwrap();
        assert_eq!(store.path(), path.as_path());
    }
}
