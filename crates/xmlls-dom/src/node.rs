//! Node tree for XML and DTD documents.
//!
//! Nodes live in an arena owned by [`Document`](crate::Document) and refer to
//! each other by [`NodeId`]. `parent` is a plain index used for upward lookup
//! only; ownership flows strictly downward through `children`.
//!
//! Every node records a half-open byte range `[start, end)` and whether its
//! terminating construct (end tag, `-->`, `]]>`, `?>`, `>`) was seen.

use serde::Serialize;
use xmlls_scanner::Span;

/// Index of a node in its document's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// The document node, root of every tree.
    pub const DOCUMENT: NodeId = NodeId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

/// A node in the document tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    pub start: usize,
    pub end: usize,
    pub closed: bool,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub kind: NodeKind,
}

/// The closed set of node variants.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum NodeKind {
    Document,
    Element(Element),
    Text,
    Comment(CharacterData),
    CData(CharacterData),
    ProcessingInstruction(ProcessingInstruction),
    DocumentType(DocumentType),
    ElementDecl(ElementDecl),
    AttlistDecl(AttlistDecl),
    EntityDecl(EntityDecl),
}

impl Node {
    pub fn new(kind: NodeKind, start: usize, end: usize) -> Self {
        Self {
            start,
            end,
            closed: false,
            parent: None,
            children: Vec::new(),
            kind,
        }
    }

    pub fn span(&self) -> Span {
        Span::new(self.start, self.end)
    }

    /// Node name: tag name, PI target, doctype or declaration name.
    pub fn name(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Element(element) => element.tag_name.as_deref(),
            NodeKind::ProcessingInstruction(pi) => pi.target.as_deref(),
            NodeKind::DocumentType(doctype) => doctype.name.as_ref().map(DeclParameter::text),
            NodeKind::ElementDecl(decl) => decl.name.as_ref().map(DeclParameter::text),
            NodeKind::AttlistDecl(decl) => decl.element_name.as_ref().map(DeclParameter::text),
            NodeKind::EntityDecl(decl) => decl.name.as_ref().map(DeclParameter::text),
            NodeKind::Document | NodeKind::Text | NodeKind::Comment(_) | NodeKind::CData(_) => None,
        }
    }

    pub fn is_document(&self) -> bool {
        matches!(self.kind, NodeKind::Document)
    }

    pub fn is_element(&self) -> bool {
        matches!(self.kind, NodeKind::Element(_))
    }

    pub fn is_text(&self) -> bool {
        matches!(self.kind, NodeKind::Text)
    }

    pub fn is_comment(&self) -> bool {
        matches!(self.kind, NodeKind::Comment(_))
    }

    pub fn is_cdata(&self) -> bool {
        matches!(self.kind, NodeKind::CData(_))
    }

    pub fn is_processing_instruction(&self) -> bool {
        matches!(&self.kind, NodeKind::ProcessingInstruction(pi) if !pi.is_prolog)
    }

    pub fn is_prolog(&self) -> bool {
        matches!(&self.kind, NodeKind::ProcessingInstruction(pi) if pi.is_prolog)
    }

    pub fn is_doctype(&self) -> bool {
        matches!(self.kind, NodeKind::DocumentType(_))
    }

    /// True for `<!ELEMENT`, `<!ATTLIST` and `<!ENTITY` declarations.
    pub fn is_dtd_decl(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::ElementDecl(_) | NodeKind::AttlistDecl(_) | NodeKind::EntityDecl(_)
        )
    }

    pub fn as_element(&self) -> Option<&Element> {
        match &self.kind {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn as_element_mut(&mut self) -> Option<&mut Element> {
        match &mut self.kind {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn as_processing_instruction(&self) -> Option<&ProcessingInstruction> {
        match &self.kind {
            NodeKind::ProcessingInstruction(pi) => Some(pi),
            _ => None,
        }
    }

    pub fn as_doctype(&self) -> Option<&DocumentType> {
        match &self.kind {
            NodeKind::DocumentType(doctype) => Some(doctype),
            _ => None,
        }
    }

    /// Inner range of a comment, CDATA section or processing instruction,
    /// excluding the delimiters.
    pub fn content(&self) -> Option<Span> {
        match &self.kind {
            NodeKind::Comment(data) | NodeKind::CData(data) => data.content,
            NodeKind::ProcessingInstruction(pi) => pi.content,
            _ => None,
        }
    }

    /// Attributes of an element, or pseudo-attributes of the prolog.
    pub fn attributes(&self) -> &[Attr] {
        match &self.kind {
            NodeKind::Element(element) => &element.attributes,
            NodeKind::ProcessingInstruction(pi) => &pi.attributes,
            _ => &[],
        }
    }

    pub(crate) fn attributes_mut(&mut self) -> Option<&mut Vec<Attr>> {
        match &mut self.kind {
            NodeKind::Element(element) => Some(&mut element.attributes),
            NodeKind::ProcessingInstruction(pi) => Some(&mut pi.attributes),
            _ => None,
        }
    }

    /// True when `offset` lies after `<` and up to `>` of the start tag.
    pub fn is_in_start_tag(&self, offset: usize) -> bool {
        match self.as_element() {
            Some(Element {
                start_tag_open_offset: Some(open),
                start_tag_close_offset: Some(close),
                ..
            }) => offset > *open && offset <= *close,
            _ => false,
        }
    }

    /// True when `offset` lies after `<` of the end tag and before the node end.
    pub fn is_in_end_tag(&self, offset: usize) -> bool {
        match self.as_element().and_then(|element| element.end_tag_open_offset) {
            Some(open) => offset > open && offset < self.end,
            None => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Elements and attributes
// ---------------------------------------------------------------------------

/// An element. Tag offsets stay `None` until the corresponding token is seen;
/// an element fabricated for an unmatched end tag has no start tag offsets.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Element {
    pub tag_name: Option<String>,
    pub attributes: Vec<Attr>,
    pub start_tag_open_offset: Option<usize>,
    pub start_tag_close_offset: Option<usize>,
    pub end_tag_open_offset: Option<usize>,
    pub end_tag_close_offset: Option<usize>,
    pub self_closed: bool,
}

impl Element {
    /// `p` in `p:name`.
    pub fn prefix(&self) -> Option<&str> {
        self.tag_name.as_deref()?.split_once(':').map(|(prefix, _)| prefix)
    }

    /// `name` in `p:name`, or the whole tag name without a prefix.
    pub fn local_name(&self) -> Option<&str> {
        let tag = self.tag_name.as_deref()?;
        Some(tag.split_once(':').map_or(tag, |(_, local)| local))
    }

    /// Case-insensitive tag name comparison used to pair end tags.
    pub fn is_same_tag(&self, name: &str) -> bool {
        self.tag_name
            .as_deref()
            .is_some_and(|tag| tag == name || tag.to_lowercase() == name.to_lowercase())
    }

    pub fn attribute(&self, name: &str) -> Option<&Attr> {
        self.attributes.iter().find(|attr| attr.name == name)
    }

    pub fn attribute_value(&self, name: &str) -> Option<&str> {
        self.attribute(name)?.value.as_deref()
    }

    pub fn has_start_tag(&self) -> bool {
        self.start_tag_open_offset.is_some()
    }

    pub fn has_end_tag(&self) -> bool {
        self.end_tag_open_offset.is_some()
    }
}

/// An attribute with the ranges of its name and (raw, quoted) value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attr {
    pub name: String,
    pub name_span: Span,
    pub value: Option<String>,
    pub value_span: Option<Span>,
}

impl Attr {
    pub fn new(name: impl Into<String>, name_span: Span) -> Self {
        Self {
            name: name.into(),
            name_span,
            value: None,
            value_span: None,
        }
    }

    /// Set the value from a raw token, stripping one pair of quotes.
    pub fn set_value(&mut self, raw: &str, span: Span) {
        self.value = Some(strip_quotes(raw).to_string());
        self.value_span = Some(span);
    }

    /// From the start of the name to the end of the value (or name).
    pub fn span(&self) -> Span {
        let end = self.value_span.map_or(self.name_span.end, |value| value.end);
        Span::new(self.name_span.start, end)
    }

    /// Inclusive on both ends so a cursor right after the value still counts.
    pub fn is_included(&self, offset: usize) -> bool {
        let span = self.span();
        span.start <= offset && offset <= span.end
    }
}

/// Insert `attr`, replacing an attribute of the same name in place.
/// Returns the index the attribute ended up at.
pub(crate) fn set_attribute(attributes: &mut Vec<Attr>, attr: Attr) -> usize {
    match attributes.iter().position(|existing| existing.name == attr.name) {
        Some(index) => {
            attributes[index] = attr;
            index
        }
        None => {
            attributes.push(attr);
            attributes.len() - 1
        }
    }
}

/// Strip a leading `"`/`'` and the matching trailing quote if present.
pub fn strip_quotes(raw: &str) -> &str {
    let Some(quote) = raw.chars().next().filter(|c| matches!(c, '"' | '\'')) else {
        return raw;
    };
    let inner = &raw[1..];
    inner.strip_suffix(quote).unwrap_or(inner)
}

// ---------------------------------------------------------------------------
// Character data and processing instructions
// ---------------------------------------------------------------------------

/// Comment or CDATA section; `content` excludes `<!--`/`-->` or `<![CDATA[`/`]]>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CharacterData {
    pub content: Option<Span>,
    /// Comments only: starts on the line where the previously closed element
    /// ended, as in `</a> <!-- note -->`. Formatters keep such comments in place.
    pub same_line_as_end_tag: bool,
}

/// `<?target ...?>`; the XML declaration `<?xml ...?>` is the prolog and has
/// its pseudo-attributes (`version`, `encoding`, ...) parsed as attributes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProcessingInstruction {
    pub target: Option<String>,
    pub is_prolog: bool,
    pub attributes: Vec<Attr>,
    pub content: Option<Span>,
    /// A bare `>` was seen inside the prolog.
    pub start_tag_closed: bool,
}

// ---------------------------------------------------------------------------
// DTD
// ---------------------------------------------------------------------------

/// A raw declaration parameter: a sub-range of the text and its content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeclParameter {
    pub span: Span,
    pub value: String,
}

impl DeclParameter {
    pub fn new(span: Span, value: impl Into<String>) -> Self {
        Self {
            span,
            value: value.into(),
        }
    }

    pub fn text(&self) -> &str {
        &self.value
    }

    /// The value without surrounding quotes (for ids and literal values).
    pub fn unquoted(&self) -> &str {
        strip_quotes(&self.value)
    }
}

/// `<!DOCTYPE name [PUBLIC "pub"] [SYSTEM] "sys" [ ... ]>`.
///
/// A standalone DTD file is parsed under a synthetic `DocumentType` spanning
/// the whole text.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DocumentType {
    pub name: Option<DeclParameter>,
    pub kind: Option<DeclParameter>,
    pub public_id: Option<DeclParameter>,
    pub system_id: Option<DeclParameter>,
    pub internal_subset_start: Option<usize>,
    pub internal_subset_end: Option<usize>,
    pub parameters: Vec<DeclParameter>,
}

impl DocumentType {
    pub fn internal_subset(&self) -> Option<Span> {
        Some(Span::new(self.internal_subset_start?, self.internal_subset_end?))
    }
}

/// `<!ELEMENT name EMPTY|ANY|(content)>`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElementDecl {
    /// The `ELEMENT` keyword.
    pub decl_type: DeclParameter,
    pub name: Option<DeclParameter>,
    pub category: Option<DeclParameter>,
    pub content: Option<DeclParameter>,
    pub parameters: Vec<DeclParameter>,
}

/// `<!ATTLIST element (name type default)*>`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttlistDecl {
    /// The `ATTLIST` keyword.
    pub decl_type: DeclParameter,
    pub element_name: Option<DeclParameter>,
    pub attributes: Vec<AttlistAttribute>,
    pub parameters: Vec<DeclParameter>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttlistAttribute {
    pub name: DeclParameter,
    pub attr_type: Option<DeclParameter>,
    pub default_value: Option<DeclParameter>,
}

/// `<!ENTITY [%] name "value">` or with a `PUBLIC`/`SYSTEM` external id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityDecl {
    /// The `ENTITY` keyword.
    pub decl_type: DeclParameter,
    pub percent: Option<DeclParameter>,
    pub name: Option<DeclParameter>,
    pub value: Option<DeclParameter>,
    pub kind: Option<DeclParameter>,
    pub public_id: Option<DeclParameter>,
    pub system_id: Option<DeclParameter>,
    pub parameters: Vec<DeclParameter>,
}

impl EntityDecl {
    pub fn is_parameter_entity(&self) -> bool {
        self.percent.is_some()
    }
}

/// The keyword of a declaration starting at `start` (`<!` + keyword).
pub(crate) fn decl_keyword(source: &str, start: usize, keyword: &str) -> DeclParameter {
    let span = Span::new(start + 2, start + 2 + keyword.len());
    DeclParameter::new(span, span.text(source))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn element(tag: &str) -> Element {
        Element {
            tag_name: Some(tag.to_string()),
            ..Element::default()
        }
    }

    #[test]
    fn test_prefix_and_local_name() {
        let el = element("xs:schema");
        assert_eq!(el.prefix(), Some("xs"));
        assert_eq!(el.local_name(), Some("schema"));

        let plain = element("root");
        assert_eq!(plain.prefix(), None);
        assert_eq!(plain.local_name(), Some("root"));
    }

    #[test]
    fn test_is_same_tag_ignores_case() {
        let el = element("Orange");
        assert!(el.is_same_tag("orange"));
        assert!(el.is_same_tag("ORANGE"));
        assert!(!el.is_same_tag("apple"));
        assert!(!Element::default().is_same_tag("a"));
    }

    #[test]
    fn test_strip_quotes() {
        assert_eq!(strip_quotes("\"1\""), "1");
        assert_eq!(strip_quotes("'2'"), "2");
        assert_eq!(strip_quotes("\"open"), "open");
        assert_eq!(strip_quotes("\""), "");
        assert_eq!(strip_quotes("bare"), "bare");
        assert_eq!(strip_quotes("'mixed\""), "mixed\"");
    }

    #[test]
    fn test_set_attribute_last_write_wins_in_place() {
        let mut attrs = Vec::new();
        assert_eq!(set_attribute(&mut attrs, Attr::new("x", Span::new(3, 4))), 0);
        assert_eq!(set_attribute(&mut attrs, Attr::new("y", Span::new(9, 10))), 1);
        assert_eq!(set_attribute(&mut attrs, Attr::new("x", Span::new(15, 16))), 0);
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs[0].name_span, Span::new(15, 16));
    }

    #[test]
    fn test_attr_span_and_inclusion() {
        let mut attr = Attr::new("x", Span::new(3, 4));
        assert_eq!(attr.span(), Span::new(3, 4));
        attr.set_value("\"1\"", Span::new(5, 8));
        assert_eq!(attr.value.as_deref(), Some("1"));
        assert_eq!(attr.span(), Span::new(3, 8));
        assert!(attr.is_included(3));
        assert!(attr.is_included(8));
        assert!(!attr.is_included(9));
    }

    #[test]
    fn test_in_start_and_end_tag() {
        // <a></a>
        let mut node = Node::new(
            NodeKind::Element(Element {
                tag_name: Some("a".into()),
                start_tag_open_offset: Some(0),
                start_tag_close_offset: Some(2),
                end_tag_open_offset: Some(3),
                end_tag_close_offset: Some(6),
                ..Element::default()
            }),
            0,
            7,
        );
        assert!(!node.is_in_start_tag(0));
        assert!(node.is_in_start_tag(1));
        assert!(node.is_in_start_tag(2));
        assert!(!node.is_in_start_tag(3));
        assert!(node.is_in_end_tag(5));
        assert!(!node.is_in_end_tag(7));

        node.kind = NodeKind::Text;
        assert!(!node.is_in_start_tag(1));
    }

    #[test]
    fn test_decl_parameter_unquoted() {
        let param = DeclParameter::new(Span::new(0, 7), "\"a.dtd\"");
        assert_eq!(param.unquoted(), "a.dtd");
        assert_eq!(param.text(), "\"a.dtd\"");
    }
}
