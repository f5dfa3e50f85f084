use serde::Serialize;

/// A half-open byte range `[start, end)` in source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// True when `offset` lies in `[start, end)`.
    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset < self.end
    }

    /// Slice of `source` covered by this span, empty if the span is out of bounds.
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        source.get(self.start..self.end).unwrap_or("")
    }
}

/// Token classification for XML and DTD text.
///
/// The set is closed: the tree builder matches it exhaustively. Kinds that only
/// formatting or DTD collaborators care about (`Whitespace`, `Unknown`,
/// attlist types, entity ids, ...) are still produced so the stream covers the
/// whole text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TokenKind {
    // Start tag
    StartTagOpen,
    StartTag,
    StartTagClose,
    StartTagSelfClose,

    // End tag
    EndTagOpen,
    EndTag,
    EndTagClose,

    // Attributes
    AttributeName,
    DelimiterAssign,
    AttributeValue,

    // Character data
    Content,
    Whitespace,
    Unknown,

    // Comment
    StartCommentTag,
    Comment,
    EndCommentTag,

    // CDATA
    CDataTagOpen,
    CDataContent,
    CDataTagClose,

    // Prolog and processing instructions
    StartPrologOrPi,
    PrologName,
    PiName,
    PiContent,
    PrologEnd,
    PiEnd,

    // <!DOCTYPE ...>
    DtdStartDoctypeTag,
    DtdDoctypeName,
    DtdDoctypeKindPublic,
    DtdDoctypeKindSystem,
    DtdDoctypePublicId,
    DtdDoctypeSystemId,
    DtdStartInternalSubset,
    DtdEndInternalSubset,
    DtdEndDoctypeTag,

    // <!ELEMENT ...>
    DtdStartElementDecl,
    DtdElementDeclName,
    DtdElementCategory,
    DtdElementContent,

    // <!ATTLIST ...>
    DtdStartAttlistDecl,
    DtdAttlistElementName,
    DtdAttlistAttributeName,
    DtdAttlistAttributeType,
    DtdAttlistAttributeValue,

    // <!ENTITY ...>
    DtdStartEntity,
    DtdEntityPercent,
    DtdEntityName,
    DtdEntityValue,
    DtdEntityKindPublic,
    DtdEntityKindSystem,
    DtdEntityPublicId,
    DtdEntitySystemId,

    DtdUnrecognizedParameters,
    DtdEndTag,

    // End of input
    Eos,
}

/// A token produced by the scanner, borrowing its text from the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub span: Span,
    pub text: &'a str,
}

impl<'a> Token<'a> {
    pub fn new(kind: TokenKind, span: Span, text: &'a str) -> Self {
        Self { kind, span, text }
    }

    pub fn start(&self) -> usize {
        self.span.start
    }

    pub fn end(&self) -> usize {
        self.span.end
    }
}

/// Characters allowed inside an XML name. Any non-ASCII char is accepted so
/// multi-byte names scan as a whole.
pub fn is_name_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '_' | ':' | '-' | '.') || !ch.is_ascii()
}

/// Characters allowed as the first char of an XML name.
pub fn is_name_start_char(ch: char) -> bool {
    ch.is_ascii_alphabetic() || matches!(ch, '_' | ':') || !ch.is_ascii()
}
