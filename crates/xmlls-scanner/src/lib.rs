//! XML Scanner
//!
//! Tokenizes XML and DTD text into a stream of typed tokens with byte offsets.
//! The scanner is tolerant: it never fails, and malformed markup (unclosed
//! tags, missing quotes, half-typed declarations) is classified as the most
//! permissive token that applies.
//!
//! # Example
//!
//! ```
//! use xmlls_scanner::{Scanner, ScannerMode, TokenKind};
//!
//! let tokens = Scanner::tokenize("<a/>", ScannerMode::Xml);
//! assert_eq!(tokens[1].kind, TokenKind::StartTag);
//! assert_eq!(tokens[1].text, "a");
//! assert_eq!(tokens.last().unwrap().kind, TokenKind::Eos);
//! ```

pub mod scanner;
pub mod token;

pub use scanner::{Scanner, ScannerMode, ScannerState};
pub use token::{Span, Token, TokenKind};
