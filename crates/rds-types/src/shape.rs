//! Validation and normalization of `put` payloads.
//!
//! Every provider funnels its input through [`normalize`] before touching
//! the network, so malformed payloads fail fast and identically on every
//! backend. The rules are applied in a fixed order: text is turned into
//! bytes and a single-element entry list is collapsed to its only file
//! *before* the payload is classified. Reordering them would make a
//! one-element list look like a directory.

use bytes::Bytes;
use serde_json::{Map, Value};

use crate::content::{FileData, PutInput, PutOptions};
use crate::directory::{Directory, DirectoryArrayEntry, DirectoryEntry};
use crate::error::{RdsError, RdsResult};

const EMPTY_DIRECTORY: &str = "You passed empty Directory";
const EMPTY_PATH: &str = "Empty path (name of property) is not allowed!";
const WRONG_TYPE: &str =
    "data have to be string, Readable, Buffer, DirectoryArray or Directory object!";

/// Per-backend check applied to every leaf: `(path, data, declared size)`.
///
/// `path` is empty for a single unnamed file.
pub type LeafCheck = fn(&str, &FileData, Option<u64>) -> RdsResult<()>;

/// Accepts every leaf.
pub fn any_leaf(_path: &str, _data: &FileData, _size: Option<u64>) -> RdsResult<()> {
    Ok(())
}

/// Rejects streams whose size was not declared.
pub fn sized_streams(path: &str, data: &FileData, size: Option<u64>) -> RdsResult<()> {
    if !data.is_stream() || size.is_some() {
        return Ok(());
    }
    if path.is_empty() {
        Err(RdsError::value(
            "Missing \"size\" that is required for Readable streams",
        ))
    } else {
        Err(RdsError::value(format!(
            "Missing \"size\" that is required for Readable streams (path: {path})"
        )))
    }
}

/// A payload after normalization, ready for a backend specific upload.
#[derive(Debug)]
pub enum Upload {
    /// One file. `options.file_name` asks for it to be wrapped in a directory.
    Single { data: FileData, options: PutOptions },
    /// Two or more files, or a map with any number of files.
    Directory {
        entries: Vec<DirectoryArrayEntry<FileData>>,
        options: PutOptions,
    },
}

impl Upload {
    pub fn is_directory(&self) -> bool {
        matches!(self, Self::Directory { .. })
    }
}

/// Validate `input` and bring it into one of the two upload shapes.
pub fn normalize(input: PutInput, mut options: PutOptions, leaf: LeafCheck) -> RdsResult<Upload> {
    options.file_name = options.file_name.filter(|name| !name.is_empty());

    match input {
        PutInput::Text(text) => single(FileData::Bytes(Bytes::from(text)), options, leaf),
        PutInput::Bytes(b) => single(FileData::Bytes(b), options, leaf),
        PutInput::Stream(s) => single(FileData::Stream(s), options, leaf),
        PutInput::Entries(entries) if entries.len() == 1 => {
            let (data, options) = collapse(entries, options)?;
            single(data, options, leaf)
        }
        PutInput::Entries(entries) => directory(entries, options, leaf),
        PutInput::Directory(dir) => {
            let entries = dir.into_iter().map(|(path, e)| e.at(path)).collect();
            directory(entries, options, leaf)
        }
    }
}

/// Promote the sole entry of a one-element list to a single-file upload.
///
/// Metadata of the entry only fills options the caller left unset.
fn collapse(
    entries: Vec<DirectoryArrayEntry<FileData>>,
    mut options: PutOptions,
) -> RdsResult<(FileData, PutOptions)> {
    let entry = entries
        .into_iter()
        .next()
        .ok_or_else(|| RdsError::value(EMPTY_DIRECTORY))?;
    if options.file_name.is_none() && !entry.path.is_empty() {
        options.file_name = Some(entry.path);
    }
    if options.size.is_none() {
        options.size = entry.size;
    }
    if options.content_type.is_none() {
        options.content_type = entry.content_type;
    }
    Ok((entry.data, options))
}

fn single(data: FileData, options: PutOptions, leaf: LeafCheck) -> RdsResult<Upload> {
    leaf(options.file_name.as_deref().unwrap_or(""), &data, options.size)?;
    Ok(Upload::Single { data, options })
}

fn directory(
    entries: Vec<DirectoryArrayEntry<FileData>>,
    options: PutOptions,
    leaf: LeafCheck,
) -> RdsResult<Upload> {
    if options.file_name.is_some() {
        return Err(RdsError::value(
            "You are uploading directory, yet you specified fileName that is not applicable here!",
        ));
    }
    if options.size.is_some() {
        return Err(RdsError::value(
            "You are uploading directory, yet you specified size that is not applicable here!",
        ));
    }
    if entries.is_empty() {
        return Err(RdsError::value(EMPTY_DIRECTORY));
    }
    for entry in &entries {
        if entry.path.is_empty() {
            return Err(RdsError::value(EMPTY_PATH));
        }
        leaf(&entry.path, &entry.data, entry.size)?;
    }
    Ok(Upload::Directory { entries, options })
}

impl PutInput {
    /// Interpret a dynamically shaped document as a `put` payload.
    ///
    /// Strings are file content. Objects are path keyed directories whose
    /// values are `{ "data": ..., "contentType"?: ..., "size"?: ... }`.
    /// Arrays hold the same objects with an extra `"path"`. Leaf `data` is
    /// either a non-empty string or a non-empty array of bytes.
    ///
    /// `null`, numbers and booleans fail with a type error. Containers with
    /// malformed entries fail with a value error.
    pub fn from_value(value: Value) -> RdsResult<Self> {
        match value {
            Value::Null | Value::Bool(_) | Value::Number(_) => Err(RdsError::type_error(WRONG_TYPE)),
            Value::String(text) => Ok(Self::Text(text)),
            Value::Array(items) => items
                .into_iter()
                .map(array_entry)
                .collect::<RdsResult<Vec<_>>>()
                .map(Self::Entries),
            Value::Object(map) => map
                .into_iter()
                .map(|(path, value)| {
                    let entry = map_entry(&path, value)?;
                    Ok((path, entry))
                })
                .collect::<RdsResult<Directory<FileData>>>()
                .map(Self::Directory),
        }
    }
}

fn map_entry(path: &str, value: Value) -> RdsResult<DirectoryEntry<FileData>> {
    let Value::Object(mut fields) = value else {
        return Err(invalid_entry(path));
    };
    let data = fields
        .remove("data")
        .and_then(leaf_bytes)
        .ok_or_else(|| invalid_entry(path))?;
    let mut entry = DirectoryEntry::new(FileData::Bytes(data));
    entry.content_type = content_type_field(&fields);
    entry.size = fields.get("size").and_then(Value::as_u64);
    Ok(entry)
}

fn array_entry(value: Value) -> RdsResult<DirectoryArrayEntry<FileData>> {
    let path = value
        .get("path")
        .and_then(Value::as_str)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            RdsError::value(
                "Data has to be string, Buffer, Readable, Directory or DirectoryArray with non-empty \"path\"",
            )
        })?;
    let entry = map_entry(&path, value)?;
    Ok(entry.at(path))
}

fn content_type_field(fields: &Map<String, Value>) -> Option<String> {
    fields
        .get("contentType")
        .or_else(|| fields.get("content_type"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn leaf_bytes(value: Value) -> Option<Bytes> {
    match value {
        Value::String(s) if !s.is_empty() => Some(Bytes::from(s)),
        Value::Array(items) if !items.is_empty() => items
            .iter()
            .map(|v| v.as_u64().and_then(|n| u8::try_from(n).ok()))
            .collect::<Option<Vec<u8>>>()
            .map(Bytes::from),
        _ => None,
    }
}

fn invalid_entry(path: &str) -> RdsError {
    RdsError::value(format!("Entry with path {path} does not contain valid data!"))
}
