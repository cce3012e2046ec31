//! File metadata: the value passed between dispatcher and transports.
//!
//! Paths are fully qualified, `<mount>://<relative-path>`. The filename is
//! always derived from the path unless given explicitly, and the content
//! type is guessed from the extension for files whose path doesn't end in
//! a separator.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::mime::MimeTable;

/// Kind of filesystem entry.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum FileKind {
    /// Regular file.
    #[default]
    #[strum(to_string = "file")]
    File,
    /// Directory.
    #[serde(alias = "dir")]
    #[strum(to_string = "directory", serialize = "dir")]
    Directory,
}

impl FileKind {
    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, FileKind::File)
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, FileKind::Directory)
    }
}

/// Structured, possibly partial, metadata input.
///
/// Every field except `path` is optional; missing fields are derived or
/// defaulted when the [`FileMetadata`] is built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetadataFields {
    pub path: String,
    pub filename: Option<String>,
    pub kind: Option<FileKind>,
    pub size: Option<u64>,
    #[serde(alias = "mime")]
    pub content_type: Option<String>,
    pub id: Option<String>,
}

impl MetadataFields {
    /// Fields with only a path set.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }
}

/// Input to [`FileMetadata::build`]: a bare path or structured fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataInput {
    Path(String),
    Fields(MetadataFields),
}

impl From<&str> for MetadataInput {
    fn from(path: &str) -> Self {
        MetadataInput::Path(path.to_string())
    }
}

impl From<String> for MetadataInput {
    fn from(path: String) -> Self {
        MetadataInput::Path(path)
    }
}

impl From<&String> for MetadataInput {
    fn from(path: &String) -> Self {
        MetadataInput::Path(path.clone())
    }
}

impl From<MetadataFields> for MetadataInput {
    fn from(fields: MetadataFields) -> Self {
        MetadataInput::Fields(fields)
    }
}

impl From<&FileMetadata> for MetadataInput {
    fn from(meta: &FileMetadata) -> Self {
        MetadataInput::Fields(meta.to_fields())
    }
}

/// Metadata for one filesystem entry.
///
/// Fields are private: construct through [`FileMetadata::new`] or
/// [`FileMetadata::build`] so the filename and content type stay consistent
/// with the path. The serialized form is exactly
/// `{path, filename, kind, size, contentType, id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "MetadataFields")]
pub struct FileMetadata {
    path: String,
    filename: String,
    kind: FileKind,
    size: u64,
    content_type: Option<String>,
    id: Option<String>,
}

impl From<MetadataFields> for FileMetadata {
    fn from(fields: MetadataFields) -> Self {
        FileMetadata::build(fields, None, MimeTable::shared())
    }
}

impl FileMetadata {
    /// Build from a path or structured fields using the built-in type table.
    pub fn new(input: impl Into<MetadataInput>) -> Self {
        Self::build(input, None, MimeTable::shared())
    }

    /// Build with a hint.
    ///
    /// A hint containing `/` is taken as the content type (`"text/plain"`);
    /// otherwise it is parsed as a [`FileKind`] override (`"directory"`,
    /// `"dir"`, `"file"`). Unrecognized kind hints are ignored.
    pub fn with_hint(input: impl Into<MetadataInput>, hint: &str) -> Self {
        Self::build(input, Some(hint), MimeTable::shared())
    }

    /// Build a directory entry.
    pub fn directory(path: impl Into<String>) -> Self {
        Self::build(
            MetadataFields {
                path: path.into(),
                kind: Some(FileKind::Directory),
                ..Default::default()
            },
            None,
            MimeTable::shared(),
        )
    }

    /// Build against an explicit content-type table.
    pub fn build(input: impl Into<MetadataInput>, hint: Option<&str>, table: &MimeTable) -> Self {
        let fields = match input.into() {
            MetadataInput::Path(path) => MetadataFields::new(path),
            MetadataInput::Fields(fields) => fields,
        };

        let filename = fields
            .filename
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| basename(&fields.path).to_string());

        let mut meta = Self {
            path: fields.path,
            filename,
            kind: fields.kind.unwrap_or_default(),
            size: fields.size.unwrap_or(0),
            content_type: fields.content_type,
            id: fields.id,
        };

        if let Some(hint) = hint {
            if hint.contains('/') {
                meta.content_type = Some(hint.to_string());
            } else if let Ok(kind) = hint.parse::<FileKind>() {
                meta.kind = kind;
            }
        }

        if meta.content_type.is_none() && !meta.kind.is_dir() && !meta.path.ends_with('/') {
            meta.content_type = Some(table.guess(&meta.path).to_string());
        }

        meta
    }

    /// Fully qualified path, including the mount scheme.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Final path segment (or the explicit filename given at construction).
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn kind(&self) -> FileKind {
        self.kind
    }

    /// Size in bytes; 0 when unknown.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Opaque backend-assigned identifier.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }

    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    /// Mount name from the path scheme (`home` for `home:///a`).
    pub fn mount_name(&self) -> Option<&str> {
        split_scheme(&self.path).map(|(name, _)| name)
    }

    /// Path relative to the mount root (`/a` for `home:///a`).
    pub fn relative_path(&self) -> &str {
        split_scheme(&self.path)
            .map(|(_, rel)| rel)
            .unwrap_or(&self.path)
    }

    /// Set the size, returning the updated metadata.
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    /// Set the backend identifier, returning the updated metadata.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Merge extra fields into this entry.
    ///
    /// Only fields present in `extra` are written. A changed path re-derives
    /// the filename unless `extra` also carries one; an empty `extra.path`
    /// leaves the path alone.
    pub fn merge(&mut self, extra: MetadataFields) {
        if !extra.path.is_empty() && extra.path != self.path {
            self.path = extra.path;
            if extra.filename.is_none() {
                self.filename = basename(&self.path).to_string();
            }
        }
        if let Some(filename) = extra.filename.filter(|name| !name.is_empty()) {
            self.filename = filename;
        }
        if let Some(kind) = extra.kind {
            self.kind = kind;
        }
        if let Some(size) = extra.size {
            self.size = size;
        }
        if let Some(content_type) = extra.content_type {
            self.content_type = Some(content_type);
        }
        if let Some(id) = extra.id {
            self.id = Some(id);
        }
    }

    /// The normalized interchange shape: `{path, filename, kind, size, contentType, id}`.
    pub fn to_plain_object(&self) -> serde_json::Value {
        serde_json::json!({
            "path": self.path,
            "filename": self.filename,
            "kind": self.kind,
            "size": self.size,
            "contentType": self.content_type,
            "id": self.id,
        })
    }

    /// Every field as explicit [`MetadataFields`].
    pub fn to_fields(&self) -> MetadataFields {
        MetadataFields {
            path: self.path.clone(),
            filename: Some(self.filename.clone()),
            kind: Some(self.kind),
            size: Some(self.size),
            content_type: self.content_type.clone(),
            id: self.id.clone(),
        }
    }
}

/// Split `name://rest` into `("name", "rest")`.
///
/// Returns `None` for paths without a scheme.
pub fn split_scheme(path: &str) -> Option<(&str, &str)> {
    let (name, rest) = path.split_once("://")?;
    if name.is_empty() || name.contains('/') {
        return None;
    }
    Some((name, rest))
}

/// Final non-empty segment of the path, ignoring the scheme and trailing
/// separators. The mount root (`home:///`) has an empty basename.
pub fn basename(path: &str) -> &str {
    let rest = split_scheme(path).map(|(_, rest)| rest).unwrap_or(path);
    rest.trim_end_matches('/').rsplit('/').next().unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mime::DEFAULT_CONTENT_TYPE;

    #[test]
    fn test_derived_filename_and_type() {
        let meta = FileMetadata::new("home:///a/b/report.pdf");
        assert_eq!(meta.filename(), "report.pdf");
        assert_eq!(meta.content_type(), Some("application/pdf"));
        assert!(meta.is_file());
        assert_eq!(meta.size(), 0);
        assert_eq!(meta.mount_name(), Some("home"));
        assert_eq!(meta.relative_path(), "/a/b/report.pdf");
    }

    #[test]
    fn test_trailing_separator_skips_guess() {
        let meta = FileMetadata::new("home:///a/b/");
        assert_eq!(meta.filename(), "b");
        assert_eq!(meta.content_type(), None);
    }

    #[test]
    fn test_directory_skips_guess() {
        let meta = FileMetadata::directory("home:///photos.jpg");
        assert!(meta.is_dir());
        assert_eq!(meta.content_type(), None);

        let hinted = FileMetadata::with_hint("home:///music.mp3", "dir");
        assert!(hinted.is_dir());
        assert_eq!(hinted.content_type(), None);
    }

    #[test]
    fn test_content_type_hint() {
        let meta = FileMetadata::with_hint("home:///notes", "text/plain");
        assert_eq!(meta.content_type(), Some("text/plain"));
        assert!(meta.is_file());
    }

    #[test]
    fn test_unknown_extension_defaults() {
        let meta = FileMetadata::new("share:///blob");
        assert_eq!(meta.content_type(), Some(DEFAULT_CONTENT_TYPE));
    }

    #[test]
    fn test_fields_input_keeps_explicit_values() {
        let meta = FileMetadata::new(MetadataFields {
            path: "cloud:///x/y.txt".into(),
            filename: Some("Custom Name".into()),
            size: Some(42),
            id: Some("abc123".into()),
            ..Default::default()
        });
        assert_eq!(meta.filename(), "Custom Name");
        assert_eq!(meta.size(), 42);
        assert_eq!(meta.id(), Some("abc123"));
        assert_eq!(meta.content_type(), Some("text/plain"));
    }

    #[test]
    fn test_basename() {
        assert_eq!(basename("home:///a/b/c.txt"), "c.txt");
        assert_eq!(basename("home:///a/b/"), "b");
        assert_eq!(basename("home:///"), "");
        assert_eq!(basename("plain/path"), "path");
    }

    #[test]
    fn test_split_scheme() {
        assert_eq!(split_scheme("home:///a"), Some(("home", "/a")));
        assert_eq!(split_scheme("/no/scheme"), None);
        assert_eq!(split_scheme("a/b://c"), None);
    }

    #[test]
    fn test_merge_only_touches_given_fields() {
        let mut meta = FileMetadata::new("home:///a/report.pdf").with_id("id-1");
        meta.merge(MetadataFields {
            size: Some(1024),
            ..Default::default()
        });
        assert_eq!(meta.size(), 1024);
        assert_eq!(meta.path(), "home:///a/report.pdf");
        assert_eq!(meta.filename(), "report.pdf");
        assert_eq!(meta.id(), Some("id-1"));

        meta.merge(MetadataFields::new("home:///b/renamed.pdf"));
        assert_eq!(meta.filename(), "renamed.pdf");
        assert_eq!(meta.id(), Some("id-1"));
    }

    #[test]
    fn test_plain_object_shape() {
        let meta = FileMetadata::new("home:///a.txt");
        let value = meta.to_plain_object();
        let obj = value.as_object().unwrap();
        let mut keys: Vec<_> = obj.keys().map(String::as_str).collect();
        keys.sort();
        assert_eq!(keys, ["contentType", "filename", "id", "kind", "path", "size"]);
        assert_eq!(obj["kind"], "file");
        assert_eq!(obj["contentType"], "text/plain");
    }

    #[test]
    fn test_deserialize_derives_fields() {
        let meta: FileMetadata =
            serde_json::from_str(r#"{"path": "home:///pics/cat.png", "size": 7}"#).unwrap();
        assert_eq!(meta.filename(), "cat.png");
        assert_eq!(meta.content_type(), Some("image/png"));
        assert_eq!(meta.size(), 7);

        let dir: FileMetadata =
            serde_json::from_str(r#"{"path": "home:///pics", "kind": "dir"}"#).unwrap();
        assert!(dir.is_dir());
    }

    #[test]
    fn test_kind_strings() {
        assert_eq!(FileKind::Directory.to_string(), "directory");
        assert_eq!("DIR".parse::<FileKind>().unwrap(), FileKind::Directory);
        assert_eq!("file".parse::<FileKind>().unwrap(), FileKind::File);
        assert!("socket".parse::<FileKind>().is_err());
    }
}
