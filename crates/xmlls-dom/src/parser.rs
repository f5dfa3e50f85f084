use serde::Serialize;
use tracing::{debug, trace};
use xmlls_scanner::{Scanner, ScannerMode, Token, TokenKind};

use crate::document::Document;
use crate::node::{
    decl_keyword, set_attribute, AttlistAttribute, AttlistDecl, Attr, CharacterData,
    DeclParameter, DocumentType, Element, ElementDecl, EntityDecl, Node, NodeId, NodeKind,
    ProcessingInstruction,
};

/// Whether text is a regular XML document or a standalone DTD file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentMode {
    #[default]
    Xml,
    Dtd,
}

impl DocumentMode {
    /// DTD for uris ending in `.dtd`, `.ent` or `.mod` (any case).
    pub fn from_uri(uri: &str) -> Self {
        let path = uri.split(['?', '#']).next().unwrap_or(uri);
        let file = path.rsplit(['/', '\\']).next().unwrap_or(path);
        match file.rsplit_once('.') {
            Some((_, ext))
                if ["dtd", "ent", "mod"]
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known)) =>
            {
                Self::Dtd
            }
            _ => Self::Xml,
        }
    }

    pub fn scanner_mode(self) -> ScannerMode {
        match self {
            Self::Xml => ScannerMode::Xml,
            Self::Dtd => ScannerMode::Dtd,
        }
    }
}

/// Tree builder state, derived from the kind of the current node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ParseState {
    BuildingRoot,
    InsideElement,
    InsideComment,
    InsideCData,
    InsideProcessingInstruction,
    InsideDoctype,
    InsideDtdDecl,
}

pub struct DomParser;

impl DomParser {
    /// Parse `text`, choosing XML or DTD mode from the uri.
    pub fn parse(text: &str, uri: &str) -> Document {
        Self::parse_with_mode(text, uri, DocumentMode::from_uri(uri))
    }

    /// Parse `text` in an explicit mode. Never fails: every input yields a tree.
    pub fn parse_with_mode(text: &str, uri: &str, mode: DocumentMode) -> Document {
        debug!(uri, ?mode, len = text.len(), "parsing document");
        let mut builder = TreeBuilder::new(text, uri, mode);
        let mut scanner = Scanner::with_mode(text, mode.scanner_mode());
        loop {
            let token = scanner.next_token();
            if token.kind == TokenKind::Eos {
                break;
            }
            builder.apply(&token);
        }
        let document = builder.finish();
        debug!(uri, nodes = document.node_count(), "parsed document");
        document
    }
}

/// Folds a token stream into a [`Document`].
///
/// The builder keeps a cursor `curr` on the innermost open node. Openers push
/// a child and descend; closers mark `curr` closed and ascend to its parent.
/// Recovery never fails: stray end tags get a synthetic element, unclosed
/// nodes are stretched to the end of the text by [`TreeBuilder::finish`].
pub struct TreeBuilder {
    document: Document,
    curr: NodeId,
    pending_attr: Option<(NodeId, usize)>,
    end_tag_open_offset: Option<usize>,
    /// Last element ended by `/>` or an end tag's `>`.
    last_closed: Option<NodeId>,
}

impl TreeBuilder {
    pub fn new(text: &str, uri: &str, mode: DocumentMode) -> Self {
        let mut document = Document::new(text.to_string(), uri.to_string(), mode);
        let mut curr = NodeId::DOCUMENT;
        if mode == DocumentMode::Dtd {
            let doctype = Node::new(NodeKind::DocumentType(DocumentType::default()), 0, text.len());
            curr = document.push(NodeId::DOCUMENT, doctype);
        }
        Self {
            document,
            curr,
            pending_attr: None,
            end_tag_open_offset: None,
            last_closed: None,
        }
    }

    pub fn state(&self) -> ParseState {
        match self.current().kind {
            NodeKind::Document => ParseState::BuildingRoot,
            NodeKind::Element(_) | NodeKind::Text => ParseState::InsideElement,
            NodeKind::Comment(_) => ParseState::InsideComment,
            NodeKind::CData(_) => ParseState::InsideCData,
            NodeKind::ProcessingInstruction(_) => ParseState::InsideProcessingInstruction,
            NodeKind::DocumentType(_) => ParseState::InsideDoctype,
            NodeKind::ElementDecl(_) | NodeKind::AttlistDecl(_) | NodeKind::EntityDecl(_) => {
                ParseState::InsideDtdDecl
            }
        }
    }

    /// The innermost open node.
    pub fn current_node(&self) -> NodeId {
        self.curr
    }

    pub fn apply(&mut self, token: &Token<'_>) {
        let (start, end) = (token.start(), token.end());
        match token.kind {
            // Elements
            TokenKind::StartTagOpen => {
                self.set_end(self.curr, start);
                let element = Element {
                    start_tag_open_offset: Some(start),
                    ..Element::default()
                };
                self.open(NodeKind::Element(element), start, end);
            }
            TokenKind::StartTag => {
                if let Some(element) = self.current_mut().as_element_mut() {
                    element.tag_name = Some(token.text.to_string());
                    self.set_end(self.curr, end);
                }
            }
            TokenKind::StartTagClose => {
                let node = self.current_mut();
                match &mut node.kind {
                    NodeKind::Element(element) => element.start_tag_close_offset = Some(start),
                    NodeKind::ProcessingInstruction(pi) => pi.start_tag_closed = true,
                    _ => {}
                }
                self.set_end(self.curr, end);
            }
            TokenKind::StartTagSelfClose => {
                if let Some(element) = self.current_mut().as_element_mut() {
                    element.self_closed = true;
                }
                self.close_tag(end);
            }
            TokenKind::EndTagOpen => {
                self.end_tag_open_offset = Some(start);
                self.set_end(self.curr, start);
            }
            TokenKind::EndTag => self.end_tag(token),
            TokenKind::EndTagClose => {
                if let Some(element) = self.current_mut().as_element_mut() {
                    element.end_tag_close_offset = Some(start);
                }
                self.close_tag(end);
            }

            // Attributes
            TokenKind::AttributeName => {
                let attr = Attr::new(token.text, token.span);
                let curr = self.curr;
                if let Some(attributes) = self.current_mut().attributes_mut() {
                    let index = set_attribute(attributes, attr);
                    self.pending_attr = Some((curr, index));
                }
                self.set_end(curr, end);
            }
            TokenKind::AttributeValue => {
                if let Some((owner, index)) = self.pending_attr.take() {
                    let attr = self
                        .document
                        .node_mut(owner)
                        .attributes_mut()
                        .and_then(|attributes| attributes.get_mut(index));
                    if let Some(attr) = attr {
                        attr.set_value(token.text, token.span);
                    }
                }
                self.set_end(self.curr, end);
            }

            // Text
            TokenKind::Content => {
                if token.text.trim().is_empty() {
                    return;
                }
                let mut text = Node::new(NodeKind::Text, start, end);
                text.closed = true;
                self.document.push(self.curr, text);
            }

            // Character data
            TokenKind::StartCommentTag => {
                self.close_open_declaration(start);
                let data = CharacterData {
                    content: None,
                    same_line_as_end_tag: self.follows_on_same_line(start),
                };
                self.open(NodeKind::Comment(data), start, self.len());
            }
            TokenKind::Comment => {
                if let NodeKind::Comment(data) = &mut self.current_mut().kind {
                    data.content = Some(token.span);
                }
            }
            TokenKind::EndCommentTag => {
                if self.current().is_comment() {
                    self.close(end);
                }
            }
            TokenKind::CDataTagOpen => {
                self.open(NodeKind::CData(CharacterData::default()), start, self.len());
            }
            TokenKind::CDataContent => {
                if let NodeKind::CData(data) = &mut self.current_mut().kind {
                    data.content = Some(token.span);
                    self.set_end(self.curr, end);
                }
            }
            TokenKind::CDataTagClose => {
                if self.current().is_cdata() {
                    self.close(end);
                }
            }

            // Processing instructions
            TokenKind::StartPrologOrPi => {
                self.close_open_declaration(start);
                let pi = ProcessingInstruction::default();
                self.open(NodeKind::ProcessingInstruction(pi), start, self.len());
            }
            TokenKind::PrologName | TokenKind::PiName => {
                let is_prolog = token.kind == TokenKind::PrologName;
                if let NodeKind::ProcessingInstruction(pi) = &mut self.current_mut().kind {
                    pi.target = Some(token.text.to_string());
                    pi.is_prolog = is_prolog;
                }
            }
            TokenKind::PiContent => {
                if let NodeKind::ProcessingInstruction(pi) = &mut self.current_mut().kind {
                    pi.content = Some(token.span);
                }
            }
            TokenKind::PrologEnd | TokenKind::PiEnd => {
                if matches!(self.current().kind, NodeKind::ProcessingInstruction(_)) {
                    self.close(end);
                }
            }

            // Doctype
            TokenKind::DtdStartDoctypeTag => {
                self.open(NodeKind::DocumentType(DocumentType::default()), start, self.len());
            }
            TokenKind::DtdDoctypeName
            | TokenKind::DtdDoctypeKindPublic
            | TokenKind::DtdDoctypeKindSystem
            | TokenKind::DtdDoctypePublicId
            | TokenKind::DtdDoctypeSystemId => self.doctype_parameter(token),
            TokenKind::DtdStartInternalSubset => {
                if let NodeKind::DocumentType(doctype) = &mut self.current_mut().kind {
                    doctype.internal_subset_start = Some(start);
                }
            }
            TokenKind::DtdEndInternalSubset => {
                self.close_to_doctype(start);
                if let NodeKind::DocumentType(doctype) = &mut self.current_mut().kind {
                    doctype.internal_subset_end = Some(start);
                }
            }
            TokenKind::DtdEndDoctypeTag => {
                self.close_to_doctype(start);
                if self.current().is_doctype() {
                    self.close(end);
                }
            }

            // DTD declarations
            TokenKind::DtdStartElementDecl
            | TokenKind::DtdStartAttlistDecl
            | TokenKind::DtdStartEntity => self.start_declaration(token),
            TokenKind::DtdElementDeclName
            | TokenKind::DtdElementCategory
            | TokenKind::DtdElementContent
            | TokenKind::DtdAttlistElementName
            | TokenKind::DtdAttlistAttributeName
            | TokenKind::DtdAttlistAttributeType
            | TokenKind::DtdAttlistAttributeValue
            | TokenKind::DtdEntityPercent
            | TokenKind::DtdEntityName
            | TokenKind::DtdEntityValue
            | TokenKind::DtdEntityKindPublic
            | TokenKind::DtdEntityKindSystem
            | TokenKind::DtdEntityPublicId
            | TokenKind::DtdEntitySystemId
            | TokenKind::DtdUnrecognizedParameters => self.decl_parameter(token),
            TokenKind::DtdEndTag => {
                if self.current().is_dtd_decl() {
                    self.close(end);
                }
            }

            TokenKind::DelimiterAssign | TokenKind::Whitespace | TokenKind::Unknown | TokenKind::Eos => {}
        }
    }

    /// Stretch every node still open to the end of the text.
    pub fn finish(mut self) -> Document {
        let len = self.len();
        let mut node = self.curr;
        while let Some(parent) = self.document.parent(node) {
            trace!(node = node.index(), "unclosed at end of text");
            self.set_end(node, len);
            node = parent;
        }
        self.document
    }

    fn end_tag(&mut self, token: &Token<'_>) {
        let open = self.end_tag_open_offset.unwrap_or(token.start());
        let original = self.curr;
        let mut node = original;
        loop {
            let matches = self
                .document
                .node(node)
                .as_element()
                .is_some_and(|element| element.is_same_tag(token.text));
            if matches {
                break;
            }
            match self.document.parent(node) {
                Some(parent) => {
                    self.set_end(node, open);
                    node = parent;
                }
                None => break,
            }
        }

        if node != NodeId::DOCUMENT {
            let matched = self.document.node_mut(node);
            matched.closed = true;
            matched.end = token.end();
            if let Some(element) = matched.as_element_mut() {
                element.end_tag_open_offset = Some(open);
            }
            self.curr = node;
        } else {
            trace!(tag = token.text, offset = open, "unmatched end tag");
            let element = Element {
                tag_name: Some(token.text.to_string()),
                end_tag_open_offset: Some(open),
                ..Element::default()
            };
            let synthetic = Node::new(NodeKind::Element(element), open, token.end());
            self.curr = self.document.push(original, synthetic);
        }
    }

    fn start_declaration(&mut self, token: &Token<'_>) {
        self.close_to_doctype(token.start());
        if !self.current().is_doctype() {
            return;
        }
        let source = self.document.text();
        let start = token.start();
        let kind = match token.kind {
            TokenKind::DtdStartElementDecl => NodeKind::ElementDecl(ElementDecl {
                decl_type: decl_keyword(source, start, "ELEMENT"),
                name: None,
                category: None,
                content: None,
                parameters: Vec::new(),
            }),
            TokenKind::DtdStartAttlistDecl => NodeKind::AttlistDecl(AttlistDecl {
                decl_type: decl_keyword(source, start, "ATTLIST"),
                element_name: None,
                attributes: Vec::new(),
                parameters: Vec::new(),
            }),
            _ => NodeKind::EntityDecl(EntityDecl {
                decl_type: decl_keyword(source, start, "ENTITY"),
                percent: None,
                name: None,
                value: None,
                kind: None,
                public_id: None,
                system_id: None,
                parameters: Vec::new(),
            }),
        };
        let len = self.len();
        self.open(kind, start, len);
    }

    fn doctype_parameter(&mut self, token: &Token<'_>) {
        let NodeKind::DocumentType(doctype) = &mut self.current_mut().kind else {
            return;
        };
        let param = DeclParameter::new(token.span, token.text);
        let slot = match token.kind {
            TokenKind::DtdDoctypeName => &mut doctype.name,
            TokenKind::DtdDoctypeKindPublic | TokenKind::DtdDoctypeKindSystem => &mut doctype.kind,
            TokenKind::DtdDoctypePublicId => &mut doctype.public_id,
            _ => &mut doctype.system_id,
        };
        *slot = Some(param.clone());
        doctype.parameters.push(param);
    }

    fn decl_parameter(&mut self, token: &Token<'_>) {
        let param = DeclParameter::new(token.span, token.text);
        match &mut self.current_mut().kind {
            NodeKind::ElementDecl(decl) => {
                match token.kind {
                    TokenKind::DtdElementDeclName => decl.name = Some(param.clone()),
                    TokenKind::DtdElementCategory => decl.category = Some(param.clone()),
                    TokenKind::DtdElementContent => decl.content = Some(param.clone()),
                    _ => {}
                }
                decl.parameters.push(param);
            }
            NodeKind::AttlistDecl(decl) => {
                match token.kind {
                    TokenKind::DtdAttlistElementName => decl.element_name = Some(param.clone()),
                    TokenKind::DtdAttlistAttributeName => decl.attributes.push(AttlistAttribute {
                        name: param.clone(),
                        attr_type: None,
                        default_value: None,
                    }),
                    TokenKind::DtdAttlistAttributeType => {
                        if let Some(last) = decl.attributes.last_mut() {
                            last.attr_type = Some(param.clone());
                        }
                    }
                    TokenKind::DtdAttlistAttributeValue => {
                        if let Some(last) = decl.attributes.last_mut() {
                            last.default_value = Some(param.clone());
                        }
                    }
                    _ => {}
                }
                decl.parameters.push(param);
            }
            NodeKind::EntityDecl(decl) => {
                match token.kind {
                    TokenKind::DtdEntityPercent => decl.percent = Some(param.clone()),
                    TokenKind::DtdEntityName => decl.name = Some(param.clone()),
                    TokenKind::DtdEntityValue => decl.value = Some(param.clone()),
                    TokenKind::DtdEntityKindPublic | TokenKind::DtdEntityKindSystem => {
                        decl.kind = Some(param.clone())
                    }
                    TokenKind::DtdEntityPublicId => decl.public_id = Some(param.clone()),
                    TokenKind::DtdEntitySystemId => decl.system_id = Some(param.clone()),
                    _ => {}
                }
                decl.parameters.push(param);
            }
            NodeKind::DocumentType(doctype) if token.kind == TokenKind::DtdUnrecognizedParameters => {
                doctype.parameters.push(param);
            }
            _ => {}
        }
    }

    /// End an unterminated declaration just before `offset`, without marking
    /// it closed.
    fn close_open_declaration(&mut self, offset: usize) {
        if !self.current().is_dtd_decl() {
            return;
        }
        let Some(parent) = self.current().parent else {
            return;
        };
        let end = offset.saturating_sub(1).max(self.current().start);
        trace!(node = self.curr.index(), end, "declaration closed implicitly");
        self.set_end(self.curr, end);
        self.curr = parent;
    }

    /// End every node between `curr` and the enclosing doctype just before
    /// `offset`, leaving them unclosed. No-op outside a doctype.
    fn close_to_doctype(&mut self, offset: usize) {
        let doctype = std::iter::once(self.curr)
            .chain(self.document.ancestors(self.curr))
            .find(|&id| self.document.node(id).is_doctype());
        let Some(doctype) = doctype else {
            return;
        };
        while self.curr != doctype {
            let node = self.current();
            let Some(parent) = node.parent else {
                return;
            };
            let last_child_end = node.children.last().map(|&child| self.document.node(child).end);
            let end = offset
                .saturating_sub(1)
                .max(node.start)
                .max(last_child_end.unwrap_or(0));
            trace!(node = self.curr.index(), end, "closed implicitly before declaration");
            self.set_end(self.curr, end);
            self.curr = parent;
        }
    }

    /// Whether a node starting at `offset` begins on the line where the last
    /// closed element ended.
    fn follows_on_same_line(&self, offset: usize) -> bool {
        let Some(closed) = self.last_closed else {
            return false;
        };
        let end = self.document.node(closed).end;
        match (self.document.position_at(end), self.document.position_at(offset)) {
            (Ok(closed_at), Ok(starts_at)) => end <= offset && closed_at.line == starts_at.line,
            _ => false,
        }
    }

    /// Close an element tag and remember it for same-line comment detection.
    fn close_tag(&mut self, end: usize) {
        let closing = self.curr;
        self.close(end);
        if self.curr != closing {
            self.last_closed = Some(closing);
        }
    }

    fn open(&mut self, kind: NodeKind, start: usize, end: usize) {
        self.curr = self.document.push(self.curr, Node::new(kind, start, end));
    }

    /// Mark `curr` closed at `end` and ascend. The document node is never closed.
    fn close(&mut self, end: usize) {
        let node = self.document.node_mut(self.curr);
        let Some(parent) = node.parent else {
            return;
        };
        node.closed = true;
        node.end = end;
        self.curr = parent;
    }

    /// The document node keeps `[0, len)` regardless of what happens inside.
    fn set_end(&mut self, id: NodeId, end: usize) {
        if id != NodeId::DOCUMENT {
            self.document.node_mut(id).end = end;
        }
    }

    fn current(&self) -> &Node {
        self.document.node(self.curr)
    }

    fn current_mut(&mut self) -> &mut Node {
        self.document.node_mut(self.curr)
    }

    fn len(&self) -> usize {
        self.document.len()
    }
}
