//src/tree.rs

use std::collections::BTreeSet;

use crate::aggregate::is_indeterminate;
use crate::config::FailurePolicy;
use crate::error::{PipelineError, Result};
use crate::types::TaxId;

/// Display name for leaves whose taxid has no scientific name.
pub const UNKNOWN_LEAF: &str = "Unknown";

/// A read-only taxonomy handle, loaded once and passed down the pipeline.
pub trait Taxonomy {
    fn resolve_name_to_id(&self, name: &str) -> Result<Option<TaxId>>;
    fn resolve_id_to_name(&self, taxid: TaxId) -> Result<Option<String>>;
    /// The smallest tree connecting `taxids` inside the reference taxonomy.
    fn build_minimal_topology(&self, taxids: &BTreeSet<TaxId>) -> Result<TaxTree>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    pub name: String,
    pub taxid: Option<TaxId>,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
}

impl TreeNode {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Rooted tree stored as an arena; the root is always node 0.
#[derive(Debug, Clone, PartialEq)]
pub struct TaxTree {
    nodes: Vec<TreeNode>,
}

impl TaxTree {
    /// A tree whose nodes start out named by their taxid.
    pub fn with_root(taxid: TaxId) -> Self {
        Self {
            nodes: vec![TreeNode {
                name: taxid.to_string(),
                taxid: Some(taxid),
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    pub fn add_child(&mut self, parent: usize, taxid: TaxId) -> usize {
        let idx = self.nodes.len();
        self.nodes.push(TreeNode {
            name: taxid.to_string(),
            taxid: Some(taxid),
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent].children.push(idx);
        idx
    }

    pub fn root(&self) -> usize {
        0
    }

    pub fn node(&self, idx: usize) -> &TreeNode {
        &self.nodes[idx]
    }

    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Leaf indices in depth-first (drawing) order.
    pub fn leaves(&self) -> Vec<usize> {
        let mut out = Vec::new();
        let mut stack = vec![self.root()];
        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx];
            if node.is_leaf() {
                out.push(idx);
            }
            stack.extend(node.children.iter().rev());
        }
        out
    }

    pub fn leaf_names(&self) -> Vec<&str> {
        self.leaves().into_iter().map(|i| self.nodes[i].name.as_str()).collect()
    }

    /// Number of edges between the root and `idx`.
    pub fn depth(&self, mut idx: usize) -> usize {
        let mut depth = 0;
        while let Some(parent) = self.nodes[idx].parent {
            depth += 1;
            idx = parent;
        }
        depth
    }

    /// Newick text with leaf names only.
    pub fn to_newick(&self) -> String {
        let mut out = String::new();
        self.write_newick(self.root(), &mut out);
        out.push(';');
        out
    }

    fn write_newick(&self, idx: usize, out: &mut String) {
        let node = &self.nodes[idx];
        if node.is_leaf() {
            out.push_str(&newick_label(&node.name));
            return;
        }
        out.push('(');
        for (i, &child) in node.children.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            self.write_newick(child, out);
        }
        out.push(')');
    }
}

/// Quote a label when it holds whitespace or Newick punctuation.
fn newick_label(name: &str) -> String {
    let needs_quotes = name
        .chars()
        .any(|c| c.is_whitespace() || "()[]':;,".contains(c));
    if !needs_quotes {
        return name.to_string();
    }
    format!("'{}'", name.replace('\'', "''"))
}

/// A built tree plus the species that could not be placed on it.
#[derive(Debug)]
pub struct SpeciesTree {
    pub tree: TaxTree,
    pub unresolved: Vec<String>,
}

/// Build the taxonomy tree for a set of species labels.
///
/// 1. drop indeterminate ("sp.") labels
/// 2. append the outgroup, if any, so it takes part in the topology
/// 3. resolve every label to a taxid, dropping the ones that do not resolve
/// 4. build the minimal topology over the distinct taxids
/// 5. rename leaves from taxid to scientific name
pub fn build_species_tree<'a, I>(
    species: I,
    outgroup: Option<&str>,
    taxonomy: &dyn Taxonomy,
    policy: FailurePolicy,
) -> Result<SpeciesTree>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut names: Vec<&str> = species.into_iter().filter(|s| !is_indeterminate(s)).collect();
    if let Some(og) = outgroup {
        names.push(og);
    }

    let mut taxids = BTreeSet::new();
    let mut unresolved = Vec::new();
    for name in names {
        let resolved = match taxonomy.resolve_name_to_id(name) {
            Ok(found) => found,
            Err(e) if policy == FailurePolicy::Isolate => {
                log::warn!("Taxonomy lookup failed for {name}: {e}");
                None
            }
            Err(e) => return Err(e),
        };
        match resolved {
            Some(taxid) => {
                log::debug!("{name} -> taxid {taxid}");
                taxids.insert(taxid);
            }
            None => {
                log::warn!("No taxid found for {name}; leaving it out of the tree");
                unresolved.push(name.to_string());
            }
        }
    }

    if taxids.is_empty() {
        return Err(PipelineError::EmptyTopology);
    }

    let mut tree = taxonomy.build_minimal_topology(&taxids)?;
    relabel_leaves(&mut tree, taxonomy, policy)?;

    Ok(SpeciesTree { tree, unresolved })
}

/// Replace each leaf's taxid name with its scientific name, or `UNKNOWN_LEAF`.
pub fn relabel_leaves(tree: &mut TaxTree, taxonomy: &dyn Taxonomy, policy: FailurePolicy) -> Result<()> {
    for idx in tree.leaves() {
        let node = &mut tree.nodes[idx];
        let resolved = match node.taxid {
            Some(taxid) => match taxonomy.resolve_id_to_name(taxid) {
                Ok(name) => name,
                Err(e) if policy == FailurePolicy::Isolate => {
                    log::warn!("Name lookup failed for taxid {taxid}: {e}");
                    None
                }
                Err(e) => return Err(e),
            },
            None => None,
        };

        node.name = match resolved {
            Some(name) => name,
            None => {
                log::warn!("No scientific name for leaf {}; using '{}'", node.name, UNKNOWN_LEAF);
                UNKNOWN_LEAF.to_string()
            }
        };
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use ahash::AHashMap;
    use std::cell::RefCell;

    /// Star-shaped fake: every requested taxid hangs directly off a root (1).
    pub(crate) struct FakeTaxonomy {
        pub names: AHashMap<String, TaxId>,
        pub missing_reverse: Vec<TaxId>,
        pub requested: RefCell<Vec<BTreeSet<TaxId>>>,
    }

    impl FakeTaxonomy {
        pub(crate) fn new(pairs: &[(&str, TaxId)]) -> Self {
            Self {
                names: pairs.iter().map(|(n, id)| (n.to_string(), *id)).collect(),
                missing_reverse: Vec::new(),
                requested: RefCell::new(Vec::new()),
            }
        }
    }

    impl Taxonomy for FakeTaxonomy {
        fn resolve_name_to_id(&self, name: &str) -> Result<Option<TaxId>> {
            Ok(self.names.get(name).copied())
        }

        fn resolve_id_to_name(&self, taxid: TaxId) -> Result<Option<String>> {
            if self.missing_reverse.contains(&taxid) {
                return Ok(None);
            }
            Ok(self
                .names
                .iter()
                .filter(|(_, id)| **id == taxid)
                .map(|(n, _)| n.clone())
                .min())
        }

        fn build_minimal_topology(&self, taxids: &BTreeSet<TaxId>) -> Result<TaxTree> {
            self.requested.borrow_mut().push(taxids.clone());
            let mut tree = TaxTree::with_root(1);
            for &id in taxids {
                tree.add_child(0, id);
            }
            Ok(tree)
        }
    }

    #[test]
    fn test_newick_quotes_labels() {
        let mut tree = TaxTree::with_root(1);
        let inner = tree.add_child(0, 2);
        tree.add_child(inner, 3);
        tree.add_child(inner, 4);
        tree.add_child(0, 5);
        tree.nodes[2].name = "Homo sapiens".to_string();
        tree.nodes[3].name = "Mus".to_string();
        tree.nodes[4].name = "O'Brien's virus".to_string();

        assert_eq!(tree.to_newick(), "(('Homo sapiens',Mus),'O''Brien''s virus');");
        assert_eq!(tree.leaves(), vec![2, 3, 4]);
        assert_eq!(tree.depth(3), 2);
    }

    #[test]
    fn test_build_excludes_indeterminate_and_adds_outgroup() {
        let taxonomy = FakeTaxonomy::new(&[
            ("Homo sapiens", 9606),
            ("Mus musculus", 10090),
            ("Deinococcus radiodurans", 1299),
        ]);
        let species = ["Homo sapiens", "Bacillus sp.", "Mus musculus"];

        let built = build_species_tree(
            species.iter().copied(),
            Some("Deinococcus radiodurans"),
            &taxonomy,
            FailurePolicy::Abort,
        )
        .unwrap();

        let requested = taxonomy.requested.borrow();
        assert_eq!(requested[0], BTreeSet::from([1299, 9606, 10090]));
        assert!(built.unresolved.is_empty());
        assert!(built.tree.leaf_names().contains(&"Deinococcus radiodurans"));
        assert!(!built.tree.leaf_names().iter().any(|n| n.contains("sp.")));
    }

    #[test]
    fn test_unresolved_species_are_dropped() {
        let taxonomy = FakeTaxonomy::new(&[("Homo sapiens", 9606)]);
        let built = build_species_tree(
            ["Homo sapiens", "Imaginary beast"],
            None,
            &taxonomy,
            FailurePolicy::Abort,
        )
        .unwrap();
        assert_eq!(built.unresolved, vec!["Imaginary beast".to_string()]);
        assert_eq!(built.tree.leaf_names(), vec!["Homo sapiens"]);
    }

    #[test]
    fn test_nothing_resolved_is_empty_topology() {
        let taxonomy = FakeTaxonomy::new(&[]);
        let err = build_species_tree(["Imaginary beast"], None, &taxonomy, FailurePolicy::Abort).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyTopology));
    }

    #[test]
    fn test_missing_reverse_name_uses_placeholder() {
        let mut taxonomy = FakeTaxonomy::new(&[("Homo sapiens", 9606), ("Mus musculus", 10090)]);
        taxonomy.missing_reverse.push(10090);
        let built = build_species_tree(
            ["Homo sapiens", "Mus musculus"],
            None,
            &taxonomy,
            FailurePolicy::Abort,
        )
        .unwrap();
        assert_eq!(built.tree.leaf_names(), vec!["Homo sapiens", UNKNOWN_LEAF]);
    }
}
