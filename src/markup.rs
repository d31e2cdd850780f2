use std::collections::BTreeMap;

/// Handle into a [`Document`] arena. Ids are only meaningful for the document
/// that produced them.
pub type NodeId = usize;

#[derive(Debug, Clone)]
enum NodeKind {
    Element {
        tag: String,
        attrs: BTreeMap<String, String>,
    },
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// The structured markup model: an arena of elements and text runs.
///
/// A paragraph's content is the ordered sequence of its text runs and injected
/// link elements; annotation operates on this structure, never on a serialized
/// markup string.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Document {
    pub fn new(root_tag: &str) -> Self {
        let root_node = Node {
            kind: NodeKind::Element {
                tag: root_tag.to_string(),
                attrs: BTreeMap::new(),
            },
            parent: None,
            children: Vec::new(),
        };
        Self {
            nodes: vec![root_node],
            root: 0,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push_node(NodeKind::Element {
            tag: tag.to_string(),
            attrs: BTreeMap::new(),
        })
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push_node(NodeKind::Text(text.to_string()))
    }

    fn push_node(&mut self, kind: NodeKind) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            kind,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        debug_assert!(self.nodes[child].parent.is_none(), "child already attached");
        self.nodes[child].parent = Some(parent);
        self.nodes[parent].children.push(child);
    }

    /// Creates an element and appends it to `parent` in one step.
    pub fn append_element(&mut self, parent: NodeId, tag: &str) -> NodeId {
        let node = self.create_element(tag);
        self.append_child(parent, node);
        node
    }

    /// Creates a text run and appends it to `parent` in one step.
    pub fn append_text(&mut self, parent: NodeId, text: &str) -> NodeId {
        let node = self.create_text(text);
        self.append_child(parent, node);
        node
    }

    pub fn set_attr(&mut self, node: NodeId, name: &str, value: impl Into<String>) {
        if let NodeKind::Element { attrs, .. } = &mut self.nodes[node].kind {
            attrs.insert(name.to_string(), value.into());
        }
    }

    pub fn attr(&self, node: NodeId, name: &str) -> Option<&str> {
        match &self.nodes.get(node)?.kind {
            NodeKind::Element { attrs, .. } => attrs.get(name).map(String::as_str),
            NodeKind::Text(_) => None,
        }
    }

    pub fn tag(&self, node: NodeId) -> Option<&str> {
        match &self.nodes.get(node)?.kind {
            NodeKind::Element { tag, .. } => Some(tag.as_str()),
            NodeKind::Text(_) => None,
        }
    }

    /// Attribute map of an element, in deterministic (sorted) order.
    pub fn attr_map(&self, node: NodeId) -> Option<&BTreeMap<String, String>> {
        match &self.nodes.get(node)?.kind {
            NodeKind::Element { attrs, .. } => Some(attrs),
            NodeKind::Text(_) => None,
        }
    }

    pub fn text(&self, node: NodeId) -> Option<&str> {
        match &self.nodes.get(node)?.kind {
            NodeKind::Text(text) => Some(text.as_str()),
            NodeKind::Element { .. } => None,
        }
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node].children
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node)?.parent
    }

    /// Every node under `root` (root excluded), preorder: document order.
    pub fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.nodes[root].children.iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(self.nodes[node].children.iter().rev().copied());
        }
        out
    }

    pub fn elements_by_tag(&self, root: NodeId, tag: &str) -> Vec<NodeId> {
        self.descendants(root)
            .into_iter()
            .filter(|&node| self.tag(node) == Some(tag))
            .collect()
    }

    /// Text runs under `root` in document order.
    pub fn text_runs(&self, root: NodeId) -> Vec<NodeId> {
        self.descendants(root)
            .into_iter()
            .filter(|&node| self.text(node).is_some())
            .collect()
    }

    /// Chain of ancestors from `node`'s parent up to the document root.
    pub fn ancestors(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut current = self.parent(node);
        while let Some(id) = current {
            out.push(id);
            current = self.parent(id);
        }
        out
    }

    /// `content` attributes of `<meta name="...">` markers under `root`, in
    /// document order.
    pub fn meta_content(&self, root: NodeId, name: &str) -> Vec<&str> {
        self.elements_by_tag(root, "meta")
            .into_iter()
            .filter(|&node| self.attr(node, "name") == Some(name))
            .filter_map(|node| self.attr(node, "content"))
            .collect()
    }

    /// Concatenation of every text run under `root`, document order.
    pub fn text_content(&self, root: NodeId) -> String {
        self.text_runs(root)
            .into_iter()
            .filter_map(|node| self.text(node))
            .collect()
    }

    /// Replaces `text[start..start + len]` of a text run with `replacement`,
    /// keeping the surrounding text as new runs on either side. The original
    /// run is detached. Indices are byte offsets and must fall on character
    /// boundaries (they always do when they come from a substring match).
    pub fn split_text_run(&mut self, run: NodeId, start: usize, len: usize, replacement: NodeId) {
        let text = match &self.nodes[run].kind {
            NodeKind::Text(text) => text.clone(),
            NodeKind::Element { .. } => {
                debug_assert!(false, "split_text_run on an element");
                return;
            }
        };
        let Some(parent) = self.nodes[run].parent else {
            debug_assert!(false, "split_text_run on a detached run");
            return;
        };
        let before = &text[..start];
        let after = &text[start + len..];

        let mut sequence = Vec::with_capacity(3);
        if !before.is_empty() {
            sequence.push(self.create_text(before));
        }
        sequence.push(replacement);
        if !after.is_empty() {
            sequence.push(self.create_text(after));
        }
        for &node in &sequence {
            self.nodes[node].parent = Some(parent);
        }
        self.nodes[run].parent = None;

        let children = &mut self.nodes[parent].children;
        let index = children
            .iter()
            .position(|&child| child == run)
            .unwrap_or(children.len());
        children.splice(index..index + 1, sequence);
    }
}

pub(crate) fn escape_text(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub(crate) fn escape_attr(input: &str) -> String {
    escape_text(input)
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}
