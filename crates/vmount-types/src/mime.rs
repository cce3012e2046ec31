//! Extension → content-type table.
//!
//! Used when a [`FileMetadata`](crate::FileMetadata) is built without an
//! explicit content type. Known extensions come from `mime_guess`; static
//! configuration may extend or override them.

use std::collections::HashMap;
use std::sync::OnceLock;

/// Content type used when no extension matches.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Extension → content-type lookup table.
///
/// Configured entries are consulted first, then the `mime_guess` database.
/// Keys are stored lowercase without the leading dot, so `".PDF"`, `"pdf"`
/// and `"Pdf"` all address the same entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimeTable {
    overrides: HashMap<String, String>,
    builtin: bool,
}

impl Default for MimeTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl MimeTable {
    /// A table with no built-in database. Only inserted entries resolve.
    pub fn empty() -> Self {
        Self {
            overrides: HashMap::new(),
            builtin: false,
        }
    }

    /// The `mime_guess` database with no overrides.
    pub fn builtin() -> Self {
        Self {
            overrides: HashMap::new(),
            builtin: true,
        }
    }

    /// Process-wide shared copy of the built-in table.
    pub fn shared() -> &'static MimeTable {
        static SHARED: OnceLock<MimeTable> = OnceLock::new();
        SHARED.get_or_init(Self::builtin)
    }

    /// Built-in table extended (and overridden) by `overrides`.
    pub fn with_overrides<I, K, V>(overrides: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut table = Self::builtin();
        for (ext, ty) in overrides {
            table.insert(ext.as_ref(), ty);
        }
        table
    }

    /// Add or replace a mapping.
    pub fn insert(&mut self, extension: &str, content_type: impl Into<String>) {
        self.overrides
            .insert(normalize_extension(extension), content_type.into());
    }

    /// Look up an extension (with or without the leading dot).
    pub fn lookup(&self, extension: &str) -> Option<&str> {
        let ext = normalize_extension(extension);
        if let Some(ty) = self.overrides.get(&ext) {
            return Some(ty.as_str());
        }
        if !self.builtin || ext.is_empty() {
            return None;
        }
        mime_guess::from_ext(&ext).first_raw()
    }

    /// Guess the content type of `path` from its extension.
    ///
    /// Returns [`DEFAULT_CONTENT_TYPE`] when the path has no extension or the
    /// extension is unknown.
    pub fn guess(&self, path: &str) -> &str {
        extension_of(path)
            .and_then(|ext| self.lookup(ext))
            .unwrap_or(DEFAULT_CONTENT_TYPE)
    }

    /// Number of configured overrides.
    pub fn len(&self) -> usize {
        self.overrides.len()
    }

    /// True if no overrides are configured.
    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }
}

fn normalize_extension(extension: &str) -> String {
    extension.trim_start_matches('.').to_ascii_lowercase()
}

/// Extension of the final path segment. Dotfiles (`.bashrc`) have none.
fn extension_of(path: &str) -> Option<&str> {
    let name = path.rsplit('/').next()?;
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_guess() {
        let table = MimeTable::builtin();
        assert_eq!(table.guess("home:///a/b/report.pdf"), "application/pdf");
        assert_eq!(table.guess("photo.JPG"), "image/jpeg");
        assert_eq!(table.guess("src/main.rs"), "text/x-rust");
        assert_eq!(
            table.guess("books.xlsx"),
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
        );
    }

    #[test]
    fn test_unknown_and_missing_extension() {
        let table = MimeTable::builtin();
        assert_eq!(table.guess("home:///README"), DEFAULT_CONTENT_TYPE);
        assert_eq!(table.guess("home:///.bashrc"), DEFAULT_CONTENT_TYPE);
        assert_eq!(table.guess("home:///blob.xyz123"), DEFAULT_CONTENT_TYPE);
        // Dots in directory names don't count
        assert_eq!(table.guess("home:///v1.2/notes"), DEFAULT_CONTENT_TYPE);
    }

    #[test]
    fn test_overrides() {
        let table = MimeTable::with_overrides([(".pdf", "application/x-pdf"), ("ABC", "text/vnd.abc")]);
        assert_eq!(table.guess("x.pdf"), "application/x-pdf");
        assert_eq!(table.guess("tune.abc"), "text/vnd.abc");
        assert_eq!(table.lookup(".Abc"), Some("text/vnd.abc"));
        assert_eq!(table.guess("x.png"), "image/png");
    }

    #[test]
    fn test_empty_table() {
        let mut table = MimeTable::empty();
        assert!(table.is_empty());
        assert_eq!(table.guess("x.pdf"), DEFAULT_CONTENT_TYPE);
        table.insert("pdf", "application/pdf");
        assert_eq!(table.len(), 1);
        assert_eq!(table.guess("x.pdf"), "application/pdf");
    }
}
