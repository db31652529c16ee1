//! Validated value types shared across the catalog crates.
//!
//! These newtypes exist so that the core engine never has to re-check the
//! shape of a value it already accepted: once a `NonEmptyText`, `FilePath` or
//! `DirectoryPath` has been constructed, every later consumer can rely on its
//! invariants.
//!
//! Paths use the storage-frontend convention: absolute, `/`-separated,
//! no trailing slash (the project root directory is the single exception,
//! spelled `/`). Containment checks are segment-aware, so `/data` contains
//! `/data/a.csv` but not `/database/a.csv`.

/// Errors that can occur when creating validated value types.
#[derive(Debug, thiserror::Error)]
pub enum TextError {
    /// The input text was empty or contained only whitespace
    #[error("Text cannot be empty")]
    Empty,
    /// The input was not an acceptable absolute path
    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

/// A string type that guarantees non-empty content.
///
/// Wraps a `String` and ensures it contains at least one non-whitespace
/// character. Input is trimmed of leading and trailing whitespace during
/// construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText` from the given input.
    ///
    /// The input is trimmed of leading and trailing whitespace. If the
    /// trimmed result is empty, an error is returned.
    ///
    /// # Errors
    ///
    /// Returns `TextError::Empty` if the trimmed input is empty.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the wrapper and returns the inner `String`.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for NonEmptyText {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for NonEmptyText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NonEmptyText::new(&s).map_err(serde::de::Error::custom)
    }
}

/// Validate and normalise a slash-separated absolute path.
///
/// Rules applied to both file and directory paths:
/// - must start with `/`
/// - no empty segments (`//`), no `.` or `..` segments
/// - trailing slashes are stripped
fn normalise_path(input: &str) -> Result<String, TextError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(TextError::Empty);
    }
    if !trimmed.starts_with('/') {
        return Err(TextError::InvalidPath(format!(
            "path must be absolute (start with '/'): '{}'",
            trimmed
        )));
    }

    let stripped = trimmed.trim_end_matches('/');
    if stripped.is_empty() {
        // The project root.
        return Ok("/".to_owned());
    }

    for segment in stripped[1..].split('/') {
        if segment.is_empty() {
            return Err(TextError::InvalidPath(format!(
                "path contains an empty segment: '{}'",
                trimmed
            )));
        }
        if segment == "." || segment == ".." {
            return Err(TextError::InvalidPath(format!(
                "path must not contain '.' or '..' segments: '{}'",
                trimmed
            )));
        }
    }

    Ok(stripped.to_owned())
}

/// An absolute, normalised directory path within a project.
///
/// Unique within the unremoved directories of one project. The project root
/// is spelled `/`; every other path has no trailing slash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DirectoryPath(String);

impl DirectoryPath {
    /// Parses and normalises a directory path.
    ///
    /// # Errors
    ///
    /// Returns `TextError` if the input is empty, relative, or contains
    /// empty / `.` / `..` segments.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        Ok(Self(normalise_path(input.as_ref())?))
    }

    /// The project root directory, `/`.
    pub fn root() -> Self {
        Self("/".to_owned())
    }

    /// Returns the path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if this is the project root.
    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// The parent directory path, or `None` for the root.
    pub fn parent(&self) -> Option<DirectoryPath> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) => Some(DirectoryPath::root()),
            Some(idx) => Some(DirectoryPath(self.0[..idx].to_owned())),
            None => None,
        }
    }

    /// Segment-aware containment check for a file path.
    ///
    /// `/data` contains `/data/a.csv` and `/data/sub/b.csv`, but not
    /// `/database/a.csv`. The root contains every file of the project.
    pub fn contains_file(&self, file: &FilePath) -> bool {
        self.contains_str(file.as_str())
    }

    /// Segment-aware containment check for a (strict) descendant directory.
    pub fn contains_dir(&self, other: &DirectoryPath) -> bool {
        if self == other {
            return false;
        }
        self.contains_str(other.as_str())
    }

    fn contains_str(&self, candidate: &str) -> bool {
        if self.is_root() {
            return candidate.starts_with('/');
        }
        candidate
            .strip_prefix(self.0.as_str())
            .is_some_and(|rest| rest.starts_with('/'))
    }
}

impl std::fmt::Display for DirectoryPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for DirectoryPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for DirectoryPath {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for DirectoryPath {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        DirectoryPath::new(&s).map_err(serde::de::Error::custom)
    }
}

/// An absolute, normalised file path within a project.
///
/// Unique within the unremoved files of one project. A file path is never
/// the root and never ends in `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FilePath(String);

impl FilePath {
    /// Parses and normalises a file path.
    ///
    /// # Errors
    ///
    /// Returns `TextError` if the input is empty, relative, the bare root,
    /// or contains empty / `.` / `..` segments.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let normalised = normalise_path(input.as_ref())?;
        if normalised == "/" {
            return Err(TextError::InvalidPath(
                "a file path cannot be the project root".to_owned(),
            ));
        }
        Ok(Self(normalised))
    }

    /// Returns the path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The directory this file lives in.
    pub fn directory(&self) -> DirectoryPath {
        match self.0.rfind('/') {
            Some(0) => DirectoryPath::root(),
            Some(idx) => DirectoryPath(self.0[..idx].to_owned()),
            // Unreachable: construction guarantees a leading '/'.
            None => DirectoryPath::root(),
        }
    }

    /// The final path segment.
    pub fn file_name(&self) -> &str {
        match self.0.rfind('/') {
            Some(idx) => &self.0[idx + 1..],
            None => &self.0,
        }
    }
}

impl std::fmt::Display for FilePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for FilePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for FilePath {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for FilePath {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        FilePath::new(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_empty_text_trims_input() {
        let text = NonEmptyText::new("  hello  ").unwrap();
        assert_eq!(text.as_str(), "hello");
    }

    #[test]
    fn non_empty_text_rejects_whitespace_only() {
        assert!(matches!(NonEmptyText::new("   "), Err(TextError::Empty)));
    }

    #[test]
    fn directory_path_normalises_trailing_slash() {
        let dir = DirectoryPath::new("/data/raw/").unwrap();
        assert_eq!(dir.as_str(), "/data/raw");
    }

    #[test]
    fn directory_path_rejects_relative() {
        assert!(DirectoryPath::new("data/raw").is_err());
    }

    #[test]
    fn directory_path_rejects_dot_segments() {
        assert!(DirectoryPath::new("/data/../raw").is_err());
        assert!(DirectoryPath::new("/data/./raw").is_err());
    }

    #[test]
    fn root_parses_from_slash() {
        let dir = DirectoryPath::new("/").unwrap();
        assert!(dir.is_root());
        assert_eq!(dir.parent(), None);
    }

    #[test]
    fn parent_chain_terminates_at_root() {
        let dir = DirectoryPath::new("/data/raw/2024").unwrap();
        let parent = dir.parent().unwrap();
        assert_eq!(parent.as_str(), "/data/raw");
        let grandparent = parent.parent().unwrap();
        assert_eq!(grandparent.as_str(), "/data");
        assert!(grandparent.parent().unwrap().is_root());
    }

    #[test]
    fn containment_is_segment_aware() {
        let dir = DirectoryPath::new("/data").unwrap();
        assert!(dir.contains_file(&FilePath::new("/data/a.csv").unwrap()));
        assert!(dir.contains_file(&FilePath::new("/data/sub/b.csv").unwrap()));
        assert!(!dir.contains_file(&FilePath::new("/database/a.csv").unwrap()));
    }

    #[test]
    fn root_contains_everything() {
        let root = DirectoryPath::root();
        assert!(root.contains_file(&FilePath::new("/a.csv").unwrap()));
        assert!(root.contains_dir(&DirectoryPath::new("/data").unwrap()));
        assert!(!root.contains_dir(&DirectoryPath::root()));
    }

    #[test]
    fn file_path_rejects_root() {
        assert!(FilePath::new("/").is_err());
    }

    #[test]
    fn file_directory_and_name() {
        let file = FilePath::new("/data/raw/obs.csv").unwrap();
        assert_eq!(file.directory().as_str(), "/data/raw");
        assert_eq!(file.file_name(), "obs.csv");

        let top = FilePath::new("/readme.md").unwrap();
        assert!(top.directory().is_root());
    }

    #[test]
    fn paths_round_trip_through_serde() {
        let dir = DirectoryPath::new("/data").unwrap();
        let json = serde_json::to_string(&dir).unwrap();
        assert_eq!(json, "\"/data\"");
        let back: DirectoryPath = serde_json::from_str(&json).unwrap();
        assert_eq!(back, dir);
    }
}
