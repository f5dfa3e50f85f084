//! Line/character positions and editor-facing lookups.
//!
//! Columns are byte offsets within the line. Line breaks are `\n`, `\r\n` or
//! a lone `\r`.

use serde::{Deserialize, Serialize};
use xmlls_scanner::Span;

use crate::document::Document;
use crate::LocationError;

/// Zero-based line and character.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Position {
    pub line: usize,
    pub character: usize,
}

impl Position {
    pub fn new(line: usize, character: usize) -> Self {
        Self { line, character }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }
}

/// Offsets at which each line begins. Always starts with 0.
pub(crate) fn compute_line_starts(text: &str) -> Vec<usize> {
    let bytes = text.as_bytes();
    let mut starts = vec![0];
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\r' if bytes.get(i + 1) == Some(&b'\n') => {
                starts.push(i + 2);
                i += 2;
                continue;
            }
            b'\r' | b'\n' => starts.push(i + 1),
            _ => {}
        }
        i += 1;
    }
    starts
}

impl Document {
    fn line_starts(&self) -> &[usize] {
        self.line_starts.get_or_init(|| compute_line_starts(self.text()))
    }

    pub fn line_count(&self) -> usize {
        self.line_starts().len()
    }

    pub fn position_at(&self, offset: usize) -> Result<Position, LocationError> {
        if offset > self.len() {
            return Err(LocationError::OffsetOutOfRange {
                offset,
                length: self.len(),
            });
        }
        let starts = self.line_starts();
        let line = starts.partition_point(|&start| start <= offset) - 1;
        Ok(Position::new(line, offset - starts[line]))
    }

    /// Inverse of [`Document::position_at`]. A character may point at the
    /// line break itself but not past it.
    pub fn offset_at(&self, position: Position) -> Result<usize, LocationError> {
        let starts = self.line_starts();
        let Some(&line_start) = starts.get(position.line) else {
            return Err(LocationError::LineOutOfRange {
                line: position.line,
                line_count: starts.len(),
            });
        };
        let line_length = match starts.get(position.line + 1) {
            Some(&next) => next - line_start - 1,
            None => self.len() - line_start,
        };
        if position.character > line_length {
            return Err(LocationError::CharacterOutOfRange {
                line: position.line,
                character: position.character,
                line_length,
            });
        }
        Ok(line_start + position.character)
    }

    pub fn range_of(&self, span: Span) -> Result<Range, LocationError> {
        Ok(Range::new(self.position_at(span.start)?, self.position_at(span.end)?))
    }
}

/// Position in the partner tag name that mirrors `position`.
///
/// When the cursor is inside the name of an element's start tag, returns the
/// same relative position inside its end tag name, and vice versa. `None`
/// when the element is self-closed, lacks either tag, or the cursor is not
/// on the tag name.
pub fn get_matching_tag_position(
    document: &Document,
    position: Position,
) -> Result<Option<Position>, LocationError> {
    let offset = document.offset_at(position)?;
    let node = document.node(document.find_node_at(offset));
    let Some(element) = node.as_element() else {
        return Ok(None);
    };
    let (Some(tag), Some(start_open), Some(end_open)) = (
        element.tag_name.as_deref(),
        element.start_tag_open_offset,
        element.end_tag_open_offset,
    ) else {
        return Ok(None);
    };
    if element.self_closed {
        return Ok(None);
    }

    let start_name = start_open + 1;
    let end_name = end_open + 2;
    let len = tag.len();
    let target = if (start_name..=start_name + len).contains(&offset) {
        end_name + (offset - start_name)
    } else if (end_name..=end_name + len).contains(&offset) {
        start_name + (offset - end_name)
    } else {
        return Ok(None);
    };
    document.position_at(target).map(Some)
}
