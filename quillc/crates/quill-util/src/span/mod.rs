//! Span module - Source location tracking.
//!
//! This module provides types for representing source code locations.
//! A [`Pos`] names a contiguous range in one source file by start and end
//! line/column (both 1-based) plus byte offsets, and is carried by every
//! AST and core-IR node. The REPL renders positions in the
//! `stdIn:L.C-L.C` shape, so line/column pairs are first-class here
//! rather than being recomputed from byte offsets at print time.
//!
//! # Examples
//!
//! ```
//! use quill_util::span::{Pos, FileId};
//!
//! let pos = Pos::new(0, 5, 1, 1, 1, 6);
//! assert_eq!(pos.start_line, 1);
//! assert_eq!(pos.end_column, 6);
//! ```

mod source_map;

pub use source_map::{SourceFile, SourceMap};

use std::fmt;

/// A unique identifier for a source file
///
/// FileIds are assigned sequentially as files are added to the [`SourceMap`].
/// `FileId(0)` is reserved for the interactive standard input and renders
/// as `stdIn`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(pub usize);

impl FileId {
    /// The interactive standard-input pseudo-file
    pub const STDIN: FileId = FileId(0);

    #[inline]
    pub const fn new(id: usize) -> Self {
        Self(id)
    }

    #[inline]
    pub const fn index(&self) -> usize {
        self.0
    }
}

impl Default for FileId {
    #[inline]
    fn default() -> Self {
        Self::STDIN
    }
}

/// Source position range
///
/// A `Pos` represents a range in source code, identified by:
/// - Byte offsets (start, end)
/// - Start and end line/column numbers (1-based, for human-readable output)
/// - File ID (for `use`-included files)
///
/// # Examples
///
/// ```
/// use quill_util::span::Pos;
///
/// let a = Pos::new(0, 3, 1, 1, 1, 4);
/// let b = Pos::new(4, 7, 1, 5, 1, 8);
/// let merged = a.merge(b);
/// assert_eq!(merged.end_column, 8);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Pos {
    /// Start byte offset in source
    pub start: usize,
    /// End byte offset in source (exclusive)
    pub end: usize,
    /// Start line number (1-based)
    pub start_line: u32,
    /// Start column number (1-based)
    pub start_column: u32,
    /// End line number (1-based)
    pub end_line: u32,
    /// End column number (1-based, exclusive)
    pub end_column: u32,
    /// File identifier
    pub file_id: FileId,
}

impl Pos {
    /// Dummy position for synthesized nodes and tests
    pub const DUMMY: Pos = Pos {
        start: 0,
        end: 0,
        start_line: 0,
        start_column: 0,
        end_line: 0,
        end_column: 0,
        file_id: FileId::STDIN,
    };

    /// Create a new position range
    #[inline]
    pub fn new(
        start: usize,
        end: usize,
        start_line: u32,
        start_column: u32,
        end_line: u32,
        end_column: u32,
    ) -> Self {
        Self {
            start,
            end,
            start_line,
            start_column,
            end_line,
            end_column,
            file_id: FileId::STDIN,
        }
    }

    /// Create a position at a single point
    #[inline]
    pub fn point(offset: usize, line: u32, column: u32) -> Self {
        Self {
            start: offset,
            end: offset,
            start_line: line,
            start_column: column,
            end_line: line,
            end_column: column,
            file_id: FileId::STDIN,
        }
    }

    /// Returns true if this position is empty (start == end)
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Returns the length of the range in bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Merge two positions into a single position covering both
    ///
    /// The resulting position starts at the earlier start and ends at the
    /// later end. Both positions are expected to be in the same file; the
    /// merged position keeps `self`'s file.
    #[inline]
    pub fn merge(self, other: Pos) -> Pos {
        let (start, start_line, start_column) = if other.start < self.start {
            (other.start, other.start_line, other.start_column)
        } else {
            (self.start, self.start_line, self.start_column)
        };
        let (end, end_line, end_column) = if other.end > self.end {
            (other.end, other.end_line, other.end_column)
        } else {
            (self.end, self.end_line, self.end_column)
        };
        Pos {
            start,
            end,
            start_line,
            start_column,
            end_line,
            end_column,
            file_id: self.file_id,
        }
    }

    /// Set the file ID for this position
    #[inline]
    pub fn with_file_id(mut self, file_id: FileId) -> Self {
        self.file_id = file_id;
        self
    }
}

impl fmt::Display for Pos {
    /// Render in the `L.C-L.C` shape used by REPL error messages
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start_line == self.end_line && self.start_column == self.end_column {
            write!(f, "{}.{}", self.start_line, self.start_column)
        } else {
            write!(
                f,
                "{}.{}-{}.{}",
                self.start_line, self.start_column, self.end_line, self.end_column
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_id_new() {
        let id = FileId::new(5);
        assert_eq!(id.index(), 5);
    }

    #[test]
    fn test_file_id_default_is_stdin() {
        assert_eq!(FileId::default(), FileId::STDIN);
    }

    #[test]
    fn test_pos_new() {
        let pos = Pos::new(10, 20, 1, 11, 1, 21);
        assert_eq!(pos.start, 10);
        assert_eq!(pos.end, 20);
        assert_eq!(pos.start_line, 1);
        assert_eq!(pos.end_column, 21);
    }

    #[test]
    fn test_pos_point() {
        let pos = Pos::point(5, 2, 3);
        assert!(pos.is_empty());
        assert_eq!(pos.start_line, pos.end_line);
        assert_eq!(pos.start_column, 3);
    }

    #[test]
    fn test_pos_len() {
        let pos = Pos::new(10, 20, 1, 1, 1, 11);
        assert_eq!(pos.len(), 10);
        assert!(!pos.is_empty());
    }

    #[test]
    fn test_pos_merge_ordered() {
        let a = Pos::new(0, 3, 1, 1, 1, 4);
        let b = Pos::new(4, 7, 1, 5, 1, 8);
        let merged = a.merge(b);
        assert_eq!(merged.start, 0);
        assert_eq!(merged.end, 7);
        assert_eq!(merged.start_column, 1);
        assert_eq!(merged.end_column, 8);
    }

    #[test]
    fn test_pos_merge_reversed() {
        let a = Pos::new(4, 7, 2, 1, 2, 4);
        let b = Pos::new(0, 3, 1, 1, 1, 4);
        let merged = a.merge(b);
        assert_eq!(merged.start, 0);
        assert_eq!(merged.end, 7);
        assert_eq!(merged.start_line, 1);
        assert_eq!(merged.end_line, 2);
    }

    #[test]
    fn test_pos_display_range() {
        let pos = Pos::new(0, 9, 1, 2, 3, 4);
        assert_eq!(pos.to_string(), "1.2-3.4");
    }

    #[test]
    fn test_pos_display_point() {
        let pos = Pos::point(0, 7, 9);
        assert_eq!(pos.to_string(), "7.9");
    }

    #[test]
    fn test_pos_dummy() {
        assert_eq!(Pos::DUMMY.start, 0);
        assert_eq!(Pos::DUMMY.end, 0);
        assert_eq!(Pos::default(), Pos::DUMMY);
    }

    #[test]
    fn test_pos_with_file_id() {
        let pos = Pos::new(0, 1, 1, 1, 1, 2).with_file_id(FileId(3));
        assert_eq!(pos.file_id, FileId(3));
    }
}
