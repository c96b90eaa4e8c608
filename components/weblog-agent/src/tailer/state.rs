// External crates
use std::fs::Metadata;
use std::path::Path;

/// What a path currently points at. `id` is `(device, inode)` on unix;
/// elsewhere it is constant and only truncation can be detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileIdentity {
    pub id: (u64, u64),
    pub len: u64,
}

impl FileIdentity {
    pub fn from_metadata(meta: &Metadata) -> Self {
        Self {
            id: file_id(meta),
            len: meta.len(),
        }
    }

    pub async fn of_path(path: &Path) -> std::io::Result<Self> {
        tokio::fs::metadata(path)
            .await
            .map(|meta| Self::from_metadata(&meta))
    }

    pub fn same_file(&self, other: &FileIdentity) -> bool {
        self.id == other.id
    }
}

#[cfg(unix)]
fn file_id(meta: &Metadata) -> (u64, u64) {
    use std::os::unix::fs::MetadataExt;
    (meta.dev(), meta.ino())
}

#[cfg(not(unix))]
fn file_id(_meta: &Metadata) -> (u64, u64) {
    (0, 0)
}
