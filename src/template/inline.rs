//! Reference discovery and inlining for syntax nodes

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::parser::ast::{Branch, Conditional, CustomTag, Export, Extend, Loop, Syntax};

use super::document::Document;

impl Syntax {
    /// Names of the templates this node needs before it can be serialized
    pub fn external_references(&self) -> BTreeSet<String> {
        let mut refs = BTreeSet::new();
        self.collect_references(&mut refs);
        refs
    }

    fn collect_references(&self, refs: &mut BTreeSet<String>) {
        match self {
            Syntax::Raw(_) | Syntax::Expression(_) | Syntax::Import(_) => {}
            Syntax::Extend(extend) => {
                refs.insert(extend.template.clone());
                for export in extend.exports.values() {
                    collect_all(&export.body, refs);
                }
            }
            Syntax::Loop(l) => collect_all(&l.body, refs),
            Syntax::Conditional(c) => {
                for branch in &c.branches {
                    collect_all(&branch.body, refs);
                }
            }
            Syntax::Export(export) => collect_all(&export.body, refs),
            Syntax::Custom(tag) => {
                if let Some(body) = &tag.body {
                    collect_all(body, refs);
                }
            }
        }
    }

    /// Replace every extend of a supplied template with that template's nodes.
    ///
    /// Returns the node unchanged when it requests none of `externals`.
    pub fn inline(&self, externals: &HashMap<String, Document>) -> Vec<Syntax> {
        self.inline_with(externals, &BTreeMap::new(), &mut Vec::new())
    }

    /// `expanding` holds the templates whose nodes are being inlined above
    /// this one; an extend of any of them is left in place.
    fn inline_with(
        &self,
        externals: &HashMap<String, Document>,
        imports: &BTreeMap<String, Export>,
        expanding: &mut Vec<String>,
    ) -> Vec<Syntax> {
        match self {
            Syntax::Raw(_) | Syntax::Expression(_) => vec![self.clone()],
            Syntax::Import(import) => match imports.get(&import.key) {
                Some(export) => export.body.clone(),
                None => vec![self.clone()],
            },
            Syntax::Extend(extend) => {
                let exports: BTreeMap<String, Export> = extend
                    .exports
                    .iter()
                    .map(|(key, export)| {
                        let body = inline_all(&export.body, externals, imports, expanding);
                        (key.clone(), Export { key: key.clone(), body })
                    })
                    .collect();

                match externals.get(&extend.template) {
                    Some(base) if !expanding.contains(&extend.template) => {
                        // Exports of the innermost extend shadow outer ones
                        let mut scope = imports.clone();
                        scope.extend(exports);
                        expanding.push(extend.template.clone());
                        let nodes = inline_all(base.nodes(), externals, &scope, expanding);
                        expanding.pop();
                        nodes
                    }
                    _ => vec![Syntax::Extend(Extend {
                        template: extend.template.clone(),
                        exports,
                    })],
                }
            }
            Syntax::Export(export) => vec![Syntax::Export(Export {
                key: export.key.clone(),
                body: inline_all(&export.body, externals, imports, expanding),
            })],
            Syntax::Loop(l) => vec![Syntax::Loop(Loop {
                variable: l.variable.clone(),
                collection: l.collection.clone(),
                body: inline_all(&l.body, externals, imports, expanding),
            })],
            Syntax::Conditional(c) => vec![Syntax::Conditional(Conditional {
                branches: c
                    .branches
                    .iter()
                    .map(|branch| Branch {
                        condition: branch.condition.clone(),
                        body: inline_all(&branch.body, externals, imports, expanding),
                    })
                    .collect(),
            })],
            Syntax::Custom(tag) => vec![Syntax::Custom(CustomTag {
                name: tag.name.clone(),
                params: tag.params.clone(),
                body: tag
                    .body
                    .as_ref()
                    .map(|body| inline_all(body, externals, imports, expanding)),
            })],
        }
    }
}

fn collect_all(nodes: &[Syntax], refs: &mut BTreeSet<String>) {
    for node in nodes {
        node.collect_references(refs);
    }
}

fn inline_all(
    nodes: &[Syntax],
    externals: &HashMap<String, Document>,
    imports: &BTreeMap<String, Export>,
    expanding: &mut Vec<String>,
) -> Vec<Syntax> {
    nodes
        .iter()
        .flat_map(|node| node.inline_with(externals, imports, expanding))
        .collect()
}
