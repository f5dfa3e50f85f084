//! Tolerant DOM for XML and DTD documents.
//!
//! Parsing never fails: malformed or partial text still produces a tree in
//! which every node carries exact byte offsets, so editor features keep
//! working while the user types.
//!
//! ```
//! use xmlls_dom::{get_matching_tag_position, parse, Position};
//!
//! let doc = parse("<root><child/></root>", "file:///a.xml");
//! let root = doc.document_element().unwrap();
//! assert_eq!(doc.node(root).name(), Some("root"));
//!
//! let end_tag = get_matching_tag_position(&doc, Position::new(0, 2)).unwrap();
//! assert_eq!(end_tag, Some(Position::new(0, 17)));
//! ```

pub mod document;
pub mod node;
pub mod parser;
pub mod position;

use thiserror::Error;

pub use document::Document;
pub use node::{
    AttlistAttribute, AttlistDecl, Attr, CharacterData, DeclParameter, DocumentType, Element,
    ElementDecl, EntityDecl, Node, NodeId, NodeKind, ProcessingInstruction,
};
pub use parser::{DocumentMode, DomParser, ParseState, TreeBuilder};
pub use position::{get_matching_tag_position, Position, Range};

/// Errors from converting between offsets and line/character positions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    #[error("offset {offset} is past the end of the document (length {length})")]
    OffsetOutOfRange { offset: usize, length: usize },

    #[error("line {line} does not exist (document has {line_count} lines)")]
    LineOutOfRange { line: usize, line_count: usize },

    #[error("character {character} is past the end of line {line} (length {line_length})")]
    CharacterOutOfRange {
        line: usize,
        character: usize,
        line_length: usize,
    },
}

/// Parse `text`; `.dtd`, `.ent` and `.mod` uris are parsed as DTD files.
pub fn parse(text: &str, uri: &str) -> Document {
    DomParser::parse(text, uri)
}
