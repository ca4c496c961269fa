//! In-memory virtual filesystem that backs opened portal items.
//!
//! Paths are slash-separated, absolute and case-sensitive. Every mutating call
//! publishes one batch of [`FileChangeEvent`]s to all watchers.

use std::collections::BTreeMap;

use time::OffsetDateTime;
use tokio::sync::mpsc;

const ROOT: &str = "/";

/// Virtual filesystem failure.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum FsError {
    #[error("File not found: {0}")]
    NotFound(String),
    #[error("File already exists: {0}")]
    AlreadyExists(String),
    #[error("Is a directory: {0}")]
    IsADirectory(String),
    #[error("Not a directory: {0}")]
    NotADirectory(String),
    #[error("Directory is not empty: {0}")]
    DirectoryNotEmpty(String),
    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FileType {
    File,
    Directory,
}

/// Metadata of one virtual entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FileStat {
    pub file_type: FileType,
    /// Content length in bytes; zero for directories.
    pub size: usize,
    pub ctime: OffsetDateTime,
    pub mtime: OffsetDateTime,
}

/// Existence rules for [`FileSystemProvider::write_file`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WriteOptions {
    /// Allow creating a missing file.
    pub create: bool,
    /// Allow replacing an existing file.
    pub overwrite: bool,
}

impl WriteOptions {
    /// Creates the file when missing and replaces it otherwise.
    pub const UPSERT: Self = Self {
        create: true,
        overwrite: true,
    };
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FileChangeKind {
    Created,
    Changed,
    Deleted,
}

/// One entry of a change batch.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FileChangeEvent {
    pub kind: FileChangeKind,
    pub path: String,
}

impl FileChangeEvent {
    fn new(kind: FileChangeKind, path: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}

/// Capability set a virtual filesystem exposes to the host: read, write,
/// list and watch.
pub trait FileSystemProvider: Send {
    /// Subscribes to change batches produced by later mutating calls.
    fn watch(&mut self) -> mpsc::UnboundedReceiver<Vec<FileChangeEvent>>;

    /// Returns metadata of `path`.
    ///
    /// # Errors
    /// Returns [`FsError::NotFound`] when `path` does not exist.
    fn stat(&self, path: &str) -> Result<FileStat, FsError>;

    /// Lists the direct children of a directory, sorted by name.
    ///
    /// # Errors
    /// Returns [`FsError::NotFound`] or [`FsError::NotADirectory`].
    fn read_directory(&self, path: &str) -> Result<Vec<(String, FileType)>, FsError>;

    /// Creates a directory and any missing parents. Existing directories are
    /// left untouched.
    ///
    /// # Errors
    /// Returns [`FsError::AlreadyExists`] when `path` is a file and
    /// [`FsError::NotADirectory`] when a parent is a file.
    fn create_directory(&mut self, path: &str) -> Result<(), FsError>;

    /// Returns the content of a file.
    ///
    /// # Errors
    /// Returns [`FsError::NotFound`] or [`FsError::IsADirectory`].
    fn read_file(&self, path: &str) -> Result<Vec<u8>, FsError>;

    /// Writes a file, creating missing parent directories.
    ///
    /// # Errors
    /// Returns [`FsError::NotFound`] when the file is missing and
    /// `options.create` is unset, [`FsError::AlreadyExists`] when it exists
    /// and `options.overwrite` is unset, and [`FsError::IsADirectory`] when
    /// `path` names a directory.
    fn write_file(
        &mut self,
        path: &str,
        content: &[u8],
        options: WriteOptions,
    ) -> Result<(), FsError>;

    /// Deletes a file or directory.
    ///
    /// # Errors
    /// Returns [`FsError::NotFound`] when `path` does not exist and
    /// [`FsError::DirectoryNotEmpty`] when a non-empty directory is deleted
    /// without `recursive`.
    fn delete(&mut self, path: &str, recursive: bool) -> Result<(), FsError>;

    /// Moves a file or directory subtree.
    ///
    /// # Errors
    /// Returns [`FsError::NotFound`] when `old_path` does not exist and
    /// [`FsError::AlreadyExists`] when `new_path` exists without `overwrite`.
    fn rename(&mut self, old_path: &str, new_path: &str, overwrite: bool) -> Result<(), FsError>;
}

#[derive(Clone, Debug)]
struct Entry {
    file_type: FileType,
    data: Vec<u8>,
    ctime: OffsetDateTime,
    mtime: OffsetDateTime,
}

impl Entry {
    fn new(file_type: FileType, data: Vec<u8>) -> Self {
        let now = OffsetDateTime::now_utc();

        Self {
            file_type,
            data,
            ctime: now,
            mtime: now,
        }
    }

    fn stat(&self) -> FileStat {
        FileStat {
            file_type: self.file_type,
            size: self.data.len(),
            ctime: self.ctime,
            mtime: self.mtime,
        }
    }
}

/// Process-lifetime [`FileSystemProvider`] keeping every entry in a map keyed
/// by normalized path.
pub struct MemFs {
    entries: BTreeMap<String, Entry>,
    watchers: Vec<mpsc::UnboundedSender<Vec<FileChangeEvent>>>,
}

impl Default for MemFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemFs {
    /// Creates a filesystem holding only the root directory.
    pub fn new() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(ROOT.to_string(), Entry::new(FileType::Directory, Vec::new()));

        Self {
            entries,
            watchers: Vec::new(),
        }
    }

    fn entry(&self, path: &str) -> Result<&Entry, FsError> {
        self.entries
            .get(path)
            .ok_or_else(|| FsError::NotFound(path.to_string()))
    }

    /// Creates every missing ancestor directory of `path`.
    fn ensure_parents(
        &mut self,
        path: &str,
        events: &mut Vec<FileChangeEvent>,
    ) -> Result<(), FsError> {
        for ancestor in ancestors(path) {
            match self.entries.get(&ancestor) {
                Some(entry) if entry.file_type == FileType::Directory => {}
                Some(_) => return Err(FsError::NotADirectory(ancestor)),
                None => {
                    self.entries
                        .insert(ancestor.clone(), Entry::new(FileType::Directory, Vec::new()));
                    events.push(FileChangeEvent::new(FileChangeKind::Created, ancestor));
                }
            }
        }

        Ok(())
    }

    /// Returns `path` and every key below it.
    fn subtree_keys(&self, path: &str) -> Vec<String> {
        let prefix = child_prefix(path);
        let mut keys = vec![path.to_string()];
        keys.extend(
            self.entries
                .range(prefix.clone()..)
                .map(|(key, _)| key)
                .take_while(|key| key.starts_with(&prefix))
                .cloned(),
        );

        keys
    }

    fn emit(&mut self, events: Vec<FileChangeEvent>) {
        if events.is_empty() {
            return;
        }

        self.watchers
            .retain(|watcher| watcher.send(events.clone()).is_ok());
    }
}

impl FileSystemProvider for MemFs {
    fn watch(&mut self) -> mpsc::UnboundedReceiver<Vec<FileChangeEvent>> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.watchers.push(sender);

        receiver
    }

    fn stat(&self, path: &str) -> Result<FileStat, FsError> {
        let path = normalize_path(path)?;

        Ok(self.entry(&path)?.stat())
    }

    fn read_directory(&self, path: &str) -> Result<Vec<(String, FileType)>, FsError> {
        let path = normalize_path(path)?;
        if self.entry(&path)?.file_type != FileType::Directory {
            return Err(FsError::NotADirectory(path));
        }

        let prefix = child_prefix(&path);
        let children = self
            .entries
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter_map(|(key, entry)| {
                let name = &key[prefix.len()..];
                (!name.is_empty() && !name.contains('/'))
                    .then(|| (name.to_string(), entry.file_type))
            })
            .collect();

        Ok(children)
    }

    fn create_directory(&mut self, path: &str) -> Result<(), FsError> {
        let path = normalize_path(path)?;
        match self.entries.get(&path) {
            Some(entry) if entry.file_type == FileType::Directory => return Ok(()),
            Some(_) => return Err(FsError::AlreadyExists(path)),
            None => {}
        }

        let mut events = Vec::new();
        self.ensure_parents(&path, &mut events)?;
        self.entries
            .insert(path.clone(), Entry::new(FileType::Directory, Vec::new()));
        events.push(FileChangeEvent::new(FileChangeKind::Created, path));
        self.emit(events);

        Ok(())
    }

    fn read_file(&self, path: &str) -> Result<Vec<u8>, FsError> {
        let path = normalize_path(path)?;
        let entry = self.entry(&path)?;
        if entry.file_type == FileType::Directory {
            return Err(FsError::IsADirectory(path));
        }

        Ok(entry.data.clone())
    }

    fn write_file(
        &mut self,
        path: &str,
        content: &[u8],
        options: WriteOptions,
    ) -> Result<(), FsError> {
        let path = normalize_path(path)?;
        let mut events = Vec::new();
        match self.entries.get_mut(&path) {
            Some(entry) if entry.file_type == FileType::Directory => {
                return Err(FsError::IsADirectory(path));
            }
            Some(_) if !options.overwrite => return Err(FsError::AlreadyExists(path)),
            Some(entry) => {
                entry.data = content.to_vec();
                entry.mtime = OffsetDateTime::now_utc();
                events.push(FileChangeEvent::new(FileChangeKind::Changed, path));
            }
            None if !options.create => return Err(FsError::NotFound(path)),
            None => {
                self.ensure_parents(&path, &mut events)?;
                self.entries
                    .insert(path.clone(), Entry::new(FileType::File, content.to_vec()));
                events.push(FileChangeEvent::new(FileChangeKind::Created, path));
            }
        }
        self.emit(events);

        Ok(())
    }

    fn delete(&mut self, path: &str, recursive: bool) -> Result<(), FsError> {
        let path = normalize_path(path)?;
        if path == ROOT {
            return Err(FsError::InvalidPath(path));
        }
        self.entry(&path)?;

        let keys = self.subtree_keys(&path);
        if keys.len() > 1 && !recursive {
            return Err(FsError::DirectoryNotEmpty(path));
        }

        let mut events = Vec::with_capacity(keys.len());
        for key in keys.into_iter().rev() {
            self.entries.remove(&key);
            events.push(FileChangeEvent::new(FileChangeKind::Deleted, key));
        }
        self.emit(events);

        Ok(())
    }

    fn rename(&mut self, old_path: &str, new_path: &str, overwrite: bool) -> Result<(), FsError> {
        let old_path = normalize_path(old_path)?;
        let new_path = normalize_path(new_path)?;
        if old_path == ROOT || new_path.starts_with(&child_prefix(&old_path)) {
            return Err(FsError::InvalidPath(new_path));
        }
        self.entry(&old_path)?;
        if old_path == new_path {
            return Ok(());
        }

        let mut events = Vec::new();
        if self.entries.contains_key(&new_path) {
            if !overwrite {
                return Err(FsError::AlreadyExists(new_path));
            }
            for key in self.subtree_keys(&new_path).into_iter().rev() {
                self.entries.remove(&key);
                events.push(FileChangeEvent::new(FileChangeKind::Deleted, key));
            }
        }
        self.ensure_parents(&new_path, &mut events)?;

        for key in self.subtree_keys(&old_path) {
            if let Some(entry) = self.entries.remove(&key) {
                let moved_key = format!("{new_path}{}", &key[old_path.len()..]);
                self.entries.insert(moved_key, entry);
            }
        }
        events.push(FileChangeEvent::new(FileChangeKind::Deleted, old_path));
        events.push(FileChangeEvent::new(FileChangeKind::Created, new_path));
        self.emit(events);

        Ok(())
    }
}

/// Normalizes `path` into `/segment/segment` form.
///
/// # Errors
/// Returns [`FsError::InvalidPath`] for empty paths and `..` segments.
pub fn normalize_path(path: &str) -> Result<String, FsError> {
    if path.trim().is_empty() {
        return Err(FsError::InvalidPath(path.to_string()));
    }

    let mut segments = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => return Err(FsError::InvalidPath(path.to_string())),
            segment => segments.push(segment),
        }
    }

    Ok(format!("/{}", segments.join("/")))
}

/// Returns the proper ancestors of a normalized path, outermost first,
/// excluding the root.
fn ancestors(path: &str) -> Vec<String> {
    let segments = path.trim_start_matches('/').split('/').collect::<Vec<_>>();

    (1..segments.len())
        .map(|depth| format!("/{}", segments[..depth].join("/")))
        .collect()
}

fn child_prefix(path: &str) -> String {
    if path == ROOT {
        return ROOT.to_string();
    }

    format!("{path}/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(
        receiver: &mut mpsc::UnboundedReceiver<Vec<FileChangeEvent>>,
    ) -> Vec<Vec<FileChangeEvent>> {
        let mut batches = Vec::new();
        while let Ok(batch) = receiver.try_recv() {
            batches.push(batch);
        }

        batches
    }

    #[test]
    fn test_write_then_read_returns_exact_bytes() {
        // Arrange
        let mut fs = MemFs::new();
        let content = [0_u8, 159, 146, 150, b'\n', 255];

        // Act
        fs.write_file("/portal/item.json", &content, WriteOptions::UPSERT)
            .expect("failed to write file");
        let read_back = fs.read_file("/portal/item.json").expect("failed to read file");

        // Assert
        assert_eq!(read_back, content);
    }

    #[test]
    fn test_write_without_create_fails_for_missing_file() {
        // Arrange
        let mut fs = MemFs::new();
        let options = WriteOptions {
            create: false,
            overwrite: true,
        };

        // Act
        let result = fs.write_file("/missing.json", b"{}", options);

        // Assert
        assert_eq!(result, Err(FsError::NotFound("/missing.json".to_string())));
    }

    #[test]
    fn test_write_without_overwrite_fails_for_existing_file() {
        // Arrange
        let mut fs = MemFs::new();
        fs.write_file("/a.json", b"{}", WriteOptions::UPSERT)
            .expect("failed to write file");
        let options = WriteOptions {
            create: true,
            overwrite: false,
        };

        // Act
        let result = fs.write_file("/a.json", b"[]", options);

        // Assert
        assert_eq!(result, Err(FsError::AlreadyExists("/a.json".to_string())));
        assert_eq!(fs.read_file("/a.json").expect("failed to read file"), b"{}");
    }

    #[test]
    fn test_write_to_directory_fails() {
        // Arrange
        let mut fs = MemFs::new();
        fs.create_directory("/portal").expect("failed to create dir");

        // Act
        let result = fs.write_file("/portal", b"{}", WriteOptions::UPSERT);

        // Assert
        assert_eq!(result, Err(FsError::IsADirectory("/portal".to_string())));
    }

    #[test]
    fn test_write_creates_parents_in_one_batch() {
        // Arrange
        let mut fs = MemFs::new();
        let mut receiver = fs.watch();

        // Act
        fs.write_file("portal/folder/item.json", b"{}", WriteOptions::UPSERT)
            .expect("failed to write file");
        fs.write_file("/portal/folder/item.json", b"[]", WriteOptions::UPSERT)
            .expect("failed to write file");

        // Assert
        let batches = drain(&mut receiver);
        assert_eq!(
            batches,
            vec![
                vec![
                    FileChangeEvent::new(FileChangeKind::Created, "/portal"),
                    FileChangeEvent::new(FileChangeKind::Created, "/portal/folder"),
                    FileChangeEvent::new(FileChangeKind::Created, "/portal/folder/item.json"),
                ],
                vec![FileChangeEvent::new(
                    FileChangeKind::Changed,
                    "/portal/folder/item.json"
                )],
            ]
        );
    }

    #[test]
    fn test_create_directory_is_idempotent() {
        // Arrange
        let mut fs = MemFs::new();
        let mut receiver = fs.watch();
        fs.create_directory("/portal").expect("failed to create dir");

        // Act
        let result = fs.create_directory("/portal/");

        // Assert
        assert_eq!(result, Ok(()));
        assert_eq!(drain(&mut receiver).len(), 1);
        assert_eq!(
            fs.stat("/portal").expect("failed to stat").file_type,
            FileType::Directory
        );
    }

    #[test]
    fn test_read_directory_lists_direct_children_sorted() {
        // Arrange
        let mut fs = MemFs::new();
        fs.write_file("/p/b.json", b"1", WriteOptions::UPSERT)
            .expect("failed to write file");
        fs.write_file("/p/a/c.json", b"2", WriteOptions::UPSERT)
            .expect("failed to write file");
        fs.write_file("/pq.json", b"3", WriteOptions::UPSERT)
            .expect("failed to write file");

        // Act
        let children = fs.read_directory("/p").expect("failed to list dir");
        let root_children = fs.read_directory("/").expect("failed to list root");

        // Assert
        assert_eq!(
            children,
            vec![
                ("a".to_string(), FileType::Directory),
                ("b.json".to_string(), FileType::File),
            ]
        );
        assert_eq!(
            root_children,
            vec![
                ("p".to_string(), FileType::Directory),
                ("pq.json".to_string(), FileType::File),
            ]
        );
    }

    #[test]
    fn test_delete_directory_requires_recursive_flag() {
        // Arrange
        let mut fs = MemFs::new();
        fs.write_file("/p/a.json", b"1", WriteOptions::UPSERT)
            .expect("failed to write file");
        let mut receiver = fs.watch();

        // Act
        let refused = fs.delete("/p", false);
        let deleted = fs.delete("/p", true);

        // Assert
        assert_eq!(refused, Err(FsError::DirectoryNotEmpty("/p".to_string())));
        assert_eq!(deleted, Ok(()));
        assert_eq!(
            drain(&mut receiver),
            vec![vec![
                FileChangeEvent::new(FileChangeKind::Deleted, "/p/a.json"),
                FileChangeEvent::new(FileChangeKind::Deleted, "/p"),
            ]]
        );
        assert_eq!(fs.read_file("/p/a.json"), Err(FsError::NotFound("/p/a.json".to_string())));
    }

    #[test]
    fn test_rename_moves_subtree() {
        // Arrange
        let mut fs = MemFs::new();
        fs.write_file("/old/x/a.json", b"1", WriteOptions::UPSERT)
            .expect("failed to write file");

        // Act
        fs.rename("/old", "/new/dir", false)
            .expect("failed to rename");

        // Assert
        assert_eq!(
            fs.read_file("/new/dir/x/a.json").expect("failed to read file"),
            b"1"
        );
        assert!(matches!(fs.stat("/old"), Err(FsError::NotFound(_))));
    }

    #[test]
    fn test_rename_refuses_existing_target_without_overwrite() {
        // Arrange
        let mut fs = MemFs::new();
        fs.write_file("/a.json", b"1", WriteOptions::UPSERT)
            .expect("failed to write file");
        fs.write_file("/b.json", b"2", WriteOptions::UPSERT)
            .expect("failed to write file");

        // Act
        let refused = fs.rename("/a.json", "/b.json", false);
        let replaced = fs.rename("/a.json", "/b.json", true);

        // Assert
        assert_eq!(refused, Err(FsError::AlreadyExists("/b.json".to_string())));
        assert_eq!(replaced, Ok(()));
        assert_eq!(fs.read_file("/b.json").expect("failed to read file"), b"1");
    }

    #[test]
    fn test_rename_over_directory_reports_replaced_entries() {
        // Arrange
        let mut fs = MemFs::new();
        fs.write_file("/d/x/inner.json", b"1", WriteOptions::UPSERT)
            .expect("failed to write file");
        fs.write_file("/src.json", b"2", WriteOptions::UPSERT)
            .expect("failed to write file");
        let mut receiver = fs.watch();

        // Act
        fs.rename("/src.json", "/d/x", true)
            .expect("failed to rename");

        // Assert
        assert_eq!(
            drain(&mut receiver),
            vec![vec![
                FileChangeEvent::new(FileChangeKind::Deleted, "/d/x/inner.json"),
                FileChangeEvent::new(FileChangeKind::Deleted, "/d/x"),
                FileChangeEvent::new(FileChangeKind::Deleted, "/src.json"),
                FileChangeEvent::new(FileChangeKind::Created, "/d/x"),
            ]]
        );
        assert!(matches!(fs.stat("/d/x/inner.json"), Err(FsError::NotFound(_))));
        assert_eq!(fs.read_file("/d/x").expect("failed to read file"), b"2");
    }

    #[test]
    fn test_paths_are_case_sensitive() {
        // Arrange
        let mut fs = MemFs::new();
        fs.write_file("/Item.json", b"1", WriteOptions::UPSERT)
            .expect("failed to write file");

        // Act
        let result = fs.read_file("/item.json");

        // Assert
        assert_eq!(result, Err(FsError::NotFound("/item.json".to_string())));
    }

    #[test]
    fn test_normalize_path_rejects_parent_segments() {
        // Arrange
        let path = "/a/../b";

        // Act
        let result = normalize_path(path);

        // Assert
        assert_eq!(result, Err(FsError::InvalidPath(path.to_string())));
        assert_eq!(normalize_path("a//b/").as_deref(), Ok("/a/b"));
    }
}
