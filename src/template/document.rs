//! Compiled template documents and the flattening pass

use std::collections::{BTreeSet, HashMap};
use std::hash::{Hash, Hasher};

use crate::parser::ast::{print_tree, Syntax};

/// One compiled template: its nodes plus the references it still needs.
///
/// Equality and hashing consider the name only.
#[derive(Debug, Clone)]
pub struct Document {
    name: String,
    nodes: Vec<Syntax>,
    /// Every template name this document has ever required
    external_refs: BTreeSet<String>,
    /// Template names still required and not yet supplied
    unresolved_refs: BTreeSet<String>,
}

impl Document {
    /// Build a document from freshly parsed nodes; references come from the nodes alone
    pub fn new(name: impl Into<String>, nodes: Vec<Syntax>) -> Self {
        let refs: BTreeSet<String> = nodes
            .iter()
            .flat_map(|node| node.external_references())
            .collect();
        Self {
            name: name.into(),
            nodes,
            external_refs: refs.clone(),
            unresolved_refs: refs,
        }
    }

    /// Inline every node that requests one of `externals`.
    ///
    /// Nodes that request nothing, or only names missing from `externals`,
    /// are kept as they are. Adjacent raw nodes are merged afterwards.
    pub fn rebuild(&self, externals: &HashMap<String, Document>) -> Document {
        let mut nodes = Vec::with_capacity(self.nodes.len());
        let mut external_refs = self.external_refs.clone();
        let mut unresolved_refs = BTreeSet::new();

        for node in &self.nodes {
            let wanted = node.external_references();
            if wanted.is_empty() {
                nodes.push(node.clone());
                continue;
            }
            if !wanted.iter().any(|name| externals.contains_key(name)) {
                unresolved_refs.extend(wanted);
                nodes.push(node.clone());
                continue;
            }

            for inlined in node.inline(externals) {
                let revealed = inlined.external_references();
                external_refs.extend(revealed.iter().cloned());
                unresolved_refs.extend(revealed);
                nodes.push(inlined);
            }
        }

        Document {
            name: self.name.clone(),
            nodes: merge_raw(nodes),
            external_refs,
            unresolved_refs,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn nodes(&self) -> &[Syntax] {
        &self.nodes
    }

    pub fn external_refs(&self) -> &BTreeSet<String> {
        &self.external_refs
    }

    pub fn unresolved_refs(&self) -> &BTreeSet<String> {
        &self.unresolved_refs
    }

    /// True once no references remain; only flat documents may be serialized
    pub fn is_flat(&self) -> bool {
        self.unresolved_refs.is_empty()
    }

    /// Same document stored under another name
    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Indented description of the document's nodes
    pub fn tree(&self) -> String {
        print_tree(&self.nodes)
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Document {}

impl Hash for Document {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

fn merge_raw(nodes: Vec<Syntax>) -> Vec<Syntax> {
    let mut merged: Vec<Syntax> = Vec::with_capacity(nodes.len());
    for node in nodes {
        if let (Some(Syntax::Raw(prev)), Syntax::Raw(text)) = (merged.last_mut(), &node) {
            prev.push_str(text);
            continue;
        }
        merged.push(node);
    }
    merged
}
