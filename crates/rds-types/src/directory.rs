use std::collections::BTreeMap;

use bytes::Bytes;

/// One file's payload plus optional metadata.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectoryEntry<T> {
    pub data: T,
    pub content_type: Option<String>,
    /// Byte length. Mandatory on Swarm when `data` is a stream.
    pub size: Option<u64>,
}

impl<T> DirectoryEntry<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            content_type: None,
            size: None,
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Attach a path, producing the array-of-entries representation.
    pub fn at(self, path: impl Into<String>) -> DirectoryArrayEntry<T> {
        DirectoryArrayEntry {
            path: path.into(),
            data: self.data,
            content_type: self.content_type,
            size: self.size,
        }
    }
}

impl DirectoryEntry<Bytes> {
    /// Entry for fetched content, with `size` set to the content length.
    pub fn fetched(data: Bytes) -> Self {
        let size = data.len() as u64;
        Self::new(data).with_size(size)
    }
}

/// Mapping from relative path to file entry.
///
/// Keys are non-empty and never start with `/`. A key may contain `/` to
/// describe nesting (`folder/and/file`).
pub type Directory<T> = BTreeMap<String, DirectoryEntry<T>>;

/// A directory entry that carries its own path.
///
/// Used where construction order matters, e.g. streaming uploads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectoryArrayEntry<T> {
    pub path: String,
    pub data: T,
    pub content_type: Option<String>,
    pub size: Option<u64>,
}

impl<T> DirectoryArrayEntry<T> {
    pub fn new(path: impl Into<String>, data: T) -> Self {
        DirectoryEntry::new(data).at(path)
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Split into the path and the map-style entry.
    pub fn into_parts(self) -> (String, DirectoryEntry<T>) {
        (
            self.path,
            DirectoryEntry {
                data: self.data,
                content_type: self.content_type,
                size: self.size,
            },
        )
    }
}

/// Total content bytes in a fetched directory.
pub fn directory_size(dir: &Directory<Bytes>) -> u64 {
    dir.values().map(|e| e.data.len() as u64).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_roundtrips_through_array_form() {
        let entry = DirectoryEntry::new(Bytes::from_static(b"data"))
            .with_size(4)
            .with_content_type("text/plain");
        let array = entry.clone().at("folder/file");
        assert_eq!(array.path, "folder/file");
        let (path, back) = array.into_parts();
        assert_eq!(path, "folder/file");
        assert_eq!(back, entry);
    }

    #[test]
    fn fetched_entry_records_size() {
        let entry = DirectoryEntry::fetched(Bytes::from_static(b"data"));
        assert_eq!(entry.size, Some(4));
        assert_eq!(entry.content_type, None);
    }

    #[test]
    fn directory_size_sums_entries() {
        let mut dir = Directory::new();
        dir.insert("a".to_string(), DirectoryEntry::fetched(Bytes::from_static(b"12")));
        dir.insert("b".to_string(), DirectoryEntry::fetched(Bytes::from_static(b"345")));
        assert_eq!(directory_size(&dir), 5);
    }
}
