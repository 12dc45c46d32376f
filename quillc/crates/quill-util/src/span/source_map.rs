//! Source map for managing source files and computing source locations.
//!
//! The REPL registers the interactive stream as the pseudo-file `stdIn`;
//! each `use "file"` adds the file it opens, so that error positions can
//! name the file they came from.

use std::sync::Arc;

use super::{FileId, Pos};

/// A source file with its content and metadata
#[derive(Clone)]
pub struct SourceFile {
    /// Unique file identifier
    id: FileId,
    /// File name (path or display name); `stdIn` for the REPL stream
    name: String,
    /// File content
    content: Arc<str>,
    /// Precomputed line start offsets
    line_starts: Arc<[usize]>,
}

impl SourceFile {
    /// Create a new source file
    pub fn new(id: usize, name: impl Into<String>, content: impl Into<Arc<str>>) -> Self {
        let content = content.into();
        let line_starts = Self::compute_line_starts(&content);
        Self {
            id: FileId(id),
            name: name.into(),
            content,
            line_starts,
        }
    }

    fn compute_line_starts(content: &str) -> Arc<[usize]> {
        let mut line_starts = vec![0];
        for (i, ch) in content.char_indices() {
            if ch == '\n' {
                line_starts.push(i + 1);
            }
        }
        line_starts.into()
    }

    #[inline]
    pub fn id(&self) -> FileId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Get the total number of lines
    #[inline]
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Convert a byte offset to 1-based (line, column) coordinates
    pub fn offset_to_line_col(&self, offset: usize) -> (u32, u32) {
        match self.line_starts.binary_search(&offset) {
            Ok(line) => (line as u32 + 1, 1),
            Err(insert_point) => {
                let line = insert_point - 1;
                let line_start = self.line_starts.get(line).copied().unwrap_or(0);
                ((line + 1) as u32, (offset - line_start + 1) as u32)
            }
        }
    }

    /// Get a specific source line (1-indexed), without its line terminator
    pub fn line_at(&self, line: usize) -> Option<&str> {
        if line == 0 {
            return None;
        }
        let start = self.line_starts.get(line - 1).copied()?;
        let end = self
            .line_starts
            .get(line)
            .copied()
            .unwrap_or(self.content.len());
        Some(self.content[start..end].trim_end_matches(['\n', '\r']))
    }

    /// Extract the source text a position covers
    pub fn extract(&self, pos: Pos) -> &str {
        &self.content[pos.start..pos.end]
    }
}

impl std::fmt::Debug for SourceFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceFile")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("line_count", &self.line_count())
            .finish()
    }
}

/// A source map managing the REPL stream and every `use`d file
///
/// # Examples
///
/// ```
/// use quill_util::span::SourceMap;
///
/// let mut map = SourceMap::new();
/// let file_id = map.add_file("queries.ql", "val x = 1;");
/// assert_eq!(map.get(file_id).unwrap().name(), "queries.ql");
/// ```
#[derive(Default)]
pub struct SourceMap {
    files: Vec<Arc<SourceFile>>,
}

impl SourceMap {
    #[inline]
    pub fn new() -> Self {
        Self { files: Vec::new() }
    }

    /// Add a new source file, returning its [`FileId`]
    pub fn add_file(&mut self, name: impl Into<String>, content: impl Into<Arc<str>>) -> FileId {
        let id = self.files.len();
        let file = SourceFile::new(id, name, content);
        let file_id = file.id();
        self.files.push(Arc::new(file));
        file_id
    }

    #[inline]
    pub fn get(&self, id: FileId) -> Option<Arc<SourceFile>> {
        self.files.get(id.0).cloned()
    }

    /// Display name for a file, `stdIn` when the id is unknown
    pub fn name_of(&self, id: FileId) -> &str {
        self.files.get(id.0).map_or("stdIn", |f| f.name())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_get_file() {
        let mut map = SourceMap::new();
        let id = map.add_file("a.ql", "val x = 1;");
        let file = map.get(id).unwrap();
        assert_eq!(file.name(), "a.ql");
        assert_eq!(file.content(), "val x = 1;");
    }

    #[test]
    fn test_sequential_file_ids() {
        let mut map = SourceMap::new();
        let a = map.add_file("a.ql", "");
        let b = map.add_file("b.ql", "");
        assert_eq!(a.index() + 1, b.index());
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_offset_to_line_col() {
        let file = SourceFile::new(0, "stdIn", "val x = 1;\nval y = 2;");
        assert_eq!(file.offset_to_line_col(0), (1, 1));
        assert_eq!(file.offset_to_line_col(4), (1, 5));
        assert_eq!(file.offset_to_line_col(11), (2, 1));
        assert_eq!(file.offset_to_line_col(15), (2, 5));
    }

    #[test]
    fn test_line_at() {
        let file = SourceFile::new(0, "stdIn", "first\nsecond\nthird");
        assert_eq!(file.line_at(1), Some("first"));
        assert_eq!(file.line_at(2), Some("second"));
        assert_eq!(file.line_at(3), Some("third"));
        assert_eq!(file.line_at(4), None);
        assert_eq!(file.line_at(0), None);
    }

    #[test]
    fn test_line_count() {
        let file = SourceFile::new(0, "stdIn", "a\nb\nc");
        assert_eq!(file.line_count(), 3);
    }

    #[test]
    fn test_extract() {
        let file = SourceFile::new(0, "stdIn", "val x = 1;");
        let pos = Pos::new(4, 5, 1, 5, 1, 6);
        assert_eq!(file.extract(pos), "x");
    }

    #[test]
    fn test_name_of_unknown() {
        let map = SourceMap::new();
        assert_eq!(map.name_of(FileId(9)), "stdIn");
    }
}
