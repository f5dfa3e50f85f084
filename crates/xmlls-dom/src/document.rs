use std::sync::OnceLock;

use xmlls_scanner::Span;

use crate::node::{Attr, Node, NodeId, NodeKind};
use crate::parser::DocumentMode;

pub const XML_SCHEMA_INSTANCE_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// A parsed document: the source text, its uri and the node arena.
///
/// Index 0 of the arena is always the document node spanning `[0, len)`.
/// The tree is immutable once built; reparse to reflect edits.
#[derive(Debug)]
pub struct Document {
    text: String,
    uri: String,
    mode: DocumentMode,
    nodes: Vec<Node>,
    pub(crate) line_starts: OnceLock<Vec<usize>>,
}

impl Document {
    pub(crate) fn new(text: String, uri: String, mode: DocumentMode) -> Self {
        let document = Node::new(NodeKind::Document, 0, text.len());
        Self {
            text,
            uri,
            mode,
            nodes: vec![document],
            line_starts: OnceLock::new(),
        }
    }

    /// Append `node` as the last child of `parent`.
    pub(crate) fn push(&mut self, parent: NodeId, mut node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        node.parent = Some(parent);
        self.nodes.push(node);
        self.nodes[parent.0].children.push(id);
        id
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn mode(&self) -> DocumentMode {
        self.mode
    }

    /// True for standalone DTD files (`.dtd`, `.ent`, `.mod`).
    pub fn is_dtd(&self) -> bool {
        self.mode == DocumentMode::Dtd
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn root(&self) -> NodeId {
        NodeId::DOCUMENT
    }

    /// Panics if `id` was not produced by this document.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// All nodes in creation order, which is document order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate().map(|(i, node)| (NodeId(i), node))
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    /// Ancestors of `id`, nearest first, ending with the document node.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), |&current| self.parent(current))
    }

    /// `id` and all nodes below it in pre-order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.children(current).iter().rev());
        }
        out
    }

    pub fn text_of(&self, span: Span) -> &str {
        span.text(&self.text)
    }

    /// Source text covered by the node.
    pub fn node_text(&self, id: NodeId) -> &str {
        self.text_of(self.node(id).span())
    }

    /// Text of a comment, CDATA or PI body.
    pub fn content_text(&self, id: NodeId) -> Option<&str> {
        self.node(id).content().map(|span| self.text_of(span))
    }

    /// The first element child of the document node.
    pub fn document_element(&self) -> Option<NodeId> {
        self.children(NodeId::DOCUMENT)
            .iter()
            .copied()
            .find(|&child| self.node(child).is_element())
    }

    pub fn doctype(&self) -> Option<NodeId> {
        self.children(NodeId::DOCUMENT)
            .iter()
            .copied()
            .find(|&child| self.node(child).is_doctype())
    }

    /// The prolog `<?xml ...?>`, if it is the first child.
    pub fn prolog(&self) -> Option<NodeId> {
        self.children(NodeId::DOCUMENT)
            .first()
            .copied()
            .filter(|&child| self.node(child).is_prolog())
    }

    // -----------------------------------------------------------------------
    // Namespaces and schema hints
    // -----------------------------------------------------------------------

    /// Namespace uri of an element: the nearest `xmlns:prefix` (or `xmlns`
    /// when unprefixed) declaration on the element or its ancestors.
    pub fn namespace_uri(&self, id: NodeId) -> Option<&str> {
        let element = self.node(id).as_element()?;
        let attr_name = match element.prefix() {
            Some(prefix) => format!("xmlns:{prefix}"),
            None => "xmlns".to_string(),
        };
        std::iter::once(id)
            .chain(self.ancestors(id))
            .filter_map(|node| self.node(node).as_element())
            .find_map(|element| element.attribute_value(&attr_name))
    }

    /// Prefix bound to the XML Schema instance namespace on the document
    /// element, usually `xsi`.
    pub fn schema_instance_prefix(&self) -> Option<&str> {
        let root = self.document_element()?;
        self.node(root).attributes().iter().find_map(|attr| {
            let prefix = attr.name.strip_prefix("xmlns:")?;
            (attr.value.as_deref() == Some(XML_SCHEMA_INSTANCE_NS)).then_some(prefix)
        })
    }

    /// `(namespace, location)` pairs from `xsi:schemaLocation`.
    pub fn schema_location(&self) -> Vec<(String, String)> {
        let Some(value) = self.schema_instance_attribute("schemaLocation") else {
            return Vec::new();
        };
        let words: Vec<&str> = value.split_whitespace().collect();
        words
            .chunks_exact(2)
            .map(|pair| (pair[0].to_string(), pair[1].to_string()))
            .collect()
    }

    pub fn no_namespace_schema_location(&self) -> Option<&str> {
        self.schema_instance_attribute("noNamespaceSchemaLocation")
    }

    fn schema_instance_attribute(&self, local: &str) -> Option<&str> {
        let prefix = self.schema_instance_prefix()?;
        let root = self.document_element()?;
        let name = format!("{prefix}:{local}");
        self.node(root).as_element()?.attribute_value(&name)
    }

    // -----------------------------------------------------------------------
    // Offset lookup
    // -----------------------------------------------------------------------

    /// Deepest node whose range contains `offset`, or the document node.
    pub fn find_node_at(&self, offset: usize) -> NodeId {
        let mut current = NodeId::DOCUMENT;
        while let Some(&child) = self
            .children(current)
            .iter()
            .find(|&&child| self.node(child).span().contains(offset))
        {
            current = child;
        }
        current
    }

    /// Node that ends at or before `offset`, descending into the last child
    /// that starts before it. Used for completion after a closed node.
    pub fn find_node_before(&self, offset: usize) -> NodeId {
        let mut current = NodeId::DOCUMENT;
        loop {
            let children = self.children(current);
            let index = children.partition_point(|&child| self.node(child).start < offset);
            let Some(&child) = index.checked_sub(1).and_then(|i| children.get(i)) else {
                return current;
            };
            let node = self.node(child);
            if offset >= node.end {
                let last_ends_with_child = node
                    .children
                    .last()
                    .is_some_and(|&last| self.node(last).end == node.end);
                if !last_ends_with_child {
                    return child;
                }
            }
            current = child;
        }
    }

    /// Attribute whose name or value range includes `offset`.
    pub fn find_attr_at(&self, offset: usize) -> Option<(NodeId, &Attr)> {
        let id = self.find_node_at(offset);
        self.node(id)
            .attributes()
            .iter()
            .find(|attr| attr.is_included(offset))
            .map(|attr| (id, attr))
    }
}

#[cfg(test)]
mod tests {
    use crate::{parse, NodeId};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_document_node_spans_text() {
        let doc = parse("<a/>", "file:///a.xml");
        let node = doc.node(NodeId::DOCUMENT);
        assert!(node.is_document());
        assert_eq!((node.start, node.end), (0, 4));
        assert_eq!(doc.parent(NodeId::DOCUMENT), None);
    }

    #[test]
    fn test_ancestors_and_descendants() {
        let doc = parse("<a><b><c/></b></a>", "test.xml");
        let a = doc.document_element().unwrap();
        let b = doc.children(a)[0];
        let c = doc.children(b)[0];
        assert_eq!(doc.ancestors(c).collect::<Vec<_>>(), vec![b, a, NodeId::DOCUMENT]);
        assert_eq!(doc.descendants(a), vec![a, b, c]);
        assert_eq!(doc.node_text(b), "<b><c/></b>");
    }

    #[test]
    fn test_document_element_skips_prolog_and_comments() {
        let doc = parse("<?xml version=\"1.0\"?>\n<!-- c -->\n<root/>", "test.xml");
        let root = doc.document_element().unwrap();
        assert_eq!(doc.node(root).name(), Some("root"));
        assert!(doc.prolog().is_some());
        assert_eq!(doc.doctype(), None);
    }

    #[test]
    fn test_namespace_uri_is_inherited() {
        let text = "<p:a xmlns:p=\"urn:p\" xmlns=\"urn:d\"><p:b/><c/></p:a>";
        let doc = parse(text, "test.xml");
        let a = doc.document_element().unwrap();
        let b = doc.children(a)[0];
        let c = doc.children(a)[1];
        assert_eq!(doc.namespace_uri(a), Some("urn:p"));
        assert_eq!(doc.namespace_uri(b), Some("urn:p"));
        assert_eq!(doc.namespace_uri(c), Some("urn:d"));
    }

    #[test]
    fn test_schema_hints() {
        let text = concat!(
            "<root xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\"\n",
            "  xsi:schemaLocation=\"urn:a a.xsd\n urn:b b.xsd\"\n",
            "  xsi:noNamespaceSchemaLocation=\"plain.xsd\"/>"
        );
        let doc = parse(text, "test.xml");
        assert_eq!(doc.schema_instance_prefix(), Some("xsi"));
        assert_eq!(
            doc.schema_location(),
            vec![
                ("urn:a".to_string(), "a.xsd".to_string()),
                ("urn:b".to_string(), "b.xsd".to_string()),
            ]
        );
        assert_eq!(doc.no_namespace_schema_location(), Some("plain.xsd"));
    }

    #[test]
    fn test_schema_hints_absent() {
        let doc = parse("<root xsi:schemaLocation=\"a b\"/>", "test.xml");
        assert_eq!(doc.schema_instance_prefix(), None);
        assert!(doc.schema_location().is_empty());
        assert_eq!(doc.no_namespace_schema_location(), None);
    }

    #[test]
    fn test_find_node_at() {
        let text = "<a><b>text</b></a>";
        let doc = parse(text, "test.xml");
        let a = doc.document_element().unwrap();
        let b = doc.children(a)[0];
        let t = doc.children(b)[0];
        assert_eq!(doc.find_node_at(0), a);
        assert_eq!(doc.find_node_at(4), b);
        assert_eq!(doc.find_node_at(7), t);
        assert_eq!(doc.find_node_at(text.len()), NodeId::DOCUMENT);
    }

    #[test]
    fn test_find_node_before() {
        let text = "<a><b/>  </a>";
        let doc = parse(text, "test.xml");
        let a = doc.document_element().unwrap();
        let b = doc.children(a)[0];
        assert_eq!(doc.find_node_before(8), b);
        assert_eq!(doc.find_node_before(2), a);
        assert_eq!(doc.find_node_before(0), NodeId::DOCUMENT);
    }

    #[test]
    fn test_find_attr_at() {
        let text = "<a x=\"1\" y='2'/>";
        let doc = parse(text, "test.xml");
        let (node, attr) = doc.find_attr_at(4).unwrap();
        assert_eq!(node, doc.document_element().unwrap());
        assert_eq!(attr.name, "x");
        let (_, attr) = doc.find_attr_at(12).unwrap();
        assert_eq!(attr.name, "y");
        assert!(doc.find_attr_at(1).is_none());
    }
}
