//src/taxdb.rs

use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, BufRead};
use std::path::Path;

use ahash::{AHashMap, AHashSet};

use crate::error::{PipelineError, Result};
use crate::input::open_maybe_gz;
use crate::tree::{TaxTree, Taxonomy};
use crate::types::TaxId;

pub type ParentMap = AHashMap<TaxId, TaxId>;
pub type NameMap = AHashMap<TaxId, String>;

/// Parses a taxDB file in the format:
/// ```text
/// <taxid>\t<parentid>\t<taxname>\t<rank>
/// ```
/// Returns:
/// - a `ParentMap` mapping child_taxid -> parent_taxid
/// - a `NameMap` mapping taxid -> taxname
///
/// The rank column is required but not kept.
pub fn parse_taxdb<R: BufRead>(reader: R) -> io::Result<(ParentMap, NameMap)> {
    let mut parent_map: ParentMap = AHashMap::new();
    let mut name_map: NameMap = AHashMap::new();

    for line_result in reader.lines() {
        let line = line_result?;
        // e.g. "9606\t9605\tHomo sapiens\tspecies"
        let parts: Vec<&str> = line.split('\t').collect();

        // Skip malformed lines
        if parts.len() < 4 {
            continue;
        }

        let taxid: TaxId = parts[0].trim().parse().unwrap_or(0);
        let parentid: TaxId = parts[1].trim().parse().unwrap_or(0);

        if taxid != 0 {
            parent_map.insert(taxid, parentid);
            name_map.insert(taxid, parts[2].trim().to_string());
        }
    }
    Ok((parent_map, name_map))
}

/// Split one NCBI `.dmp` line (`a\t|\tb\t|\t...\t|`) into trimmed fields.
fn dmp_fields(line: &str) -> Vec<&str> {
    line.trim_end_matches(&['|', '\t', '\r', '\n'][..])
        .split("\t|\t")
        .map(str::trim)
        .collect()
}

/// Parses `nodes.dmp` into a parent map.
pub fn parse_nodes_dmp<R: BufRead>(reader: R) -> io::Result<ParentMap> {
    let mut parent_map = ParentMap::new();

    for line in reader.lines() {
        let line = line?;
        let fields = dmp_fields(&line);
        if fields.len() < 3 {
            continue;
        }
        let (Ok(taxid), Ok(parent)) = (fields[0].parse::<TaxId>(), fields[1].parse::<TaxId>()) else {
            continue;
        };
        parent_map.insert(taxid, parent);
    }
    Ok(parent_map)
}

/// Parses `names.dmp`: scientific names, plus synonyms usable for name lookup only.
pub fn parse_names_dmp<R: BufRead>(reader: R) -> io::Result<(NameMap, Vec<(String, TaxId)>)> {
    let mut name_map = NameMap::new();
    let mut synonyms = Vec::new();

    for line in reader.lines() {
        let line = line?;
        let fields = dmp_fields(&line);
        if fields.len() < 4 {
            continue;
        }
        let Ok(taxid) = fields[0].parse::<TaxId>() else {
            continue;
        };
        match fields[3] {
            "scientific name" => {
                name_map.insert(taxid, fields[1].to_string());
            }
            "synonym" | "equivalent name" | "genbank synonym" => {
                synonyms.push((fields[1].to_string(), taxid));
            }
            _ => {}
        }
    }
    Ok((name_map, synonyms))
}

/// A local, in-memory copy of the reference taxonomy.
pub struct TaxonomyDb {
    parent_map: ParentMap,
    name_map: NameMap,
    /// lowercased scientific names and synonyms -> taxid
    name_index: AHashMap<String, TaxId>,
}

/// Key used by the name index; lookups ignore case.
fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

impl TaxonomyDb {
    pub fn new(parent_map: ParentMap, name_map: NameMap) -> Self {
        // shared scientific names (e.g. a genus in two kingdoms) keep the smallest taxid
        let mut name_index: AHashMap<String, TaxId> = AHashMap::with_capacity(name_map.len());
        for (&taxid, name) in &name_map {
            name_index
                .entry(name_key(name))
                .and_modify(|id| *id = (*id).min(taxid))
                .or_insert(taxid);
        }

        Self {
            parent_map,
            name_map,
            name_index,
        }
    }

    /// Loads a taxDB file (optionally gzipped).
    pub fn from_taxdb<P: AsRef<Path>>(path: P) -> Result<Self> {
        let (parent_map, name_map) = parse_taxdb(open_maybe_gz(path.as_ref())?)?;
        log::info!("Loaded {} taxa from {}", parent_map.len(), path.as_ref().display());
        Ok(Self::new(parent_map, name_map))
    }

    /// Loads `nodes.dmp` and `names.dmp` (or their `.gz` versions) from an NCBI taxdump directory.
    pub fn from_ncbi_dump<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let pick = |name: &str| {
            let plain = dir.join(name);
            if plain.exists() {
                plain
            } else {
                dir.join(format!("{name}.gz"))
            }
        };

        let parent_map = parse_nodes_dmp(open_maybe_gz(pick("nodes.dmp"))?)?;
        let (name_map, synonyms) = parse_names_dmp(open_maybe_gz(pick("names.dmp"))?)?;
        log::info!("Loaded {} taxa from {}", parent_map.len(), dir.display());

        let mut db = Self::new(parent_map, name_map);
        db.add_synonyms(synonyms);
        Ok(db)
    }

    /// Synonyms never shadow a scientific name; the first synonym listed wins.
    pub fn add_synonyms(&mut self, synonyms: Vec<(String, TaxId)>) {
        for (name, taxid) in synonyms {
            self.name_index.entry(name_key(&name)).or_insert(taxid);
        }
    }

    pub fn len(&self) -> usize {
        self.parent_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent_map.is_empty()
    }

    /// `taxid` followed by its ancestors up to the root.
    ///
    /// A parent chain that loops back on itself is a broken taxonomy and is
    /// reported as a `Config` error.
    pub fn lineage(&self, taxid: TaxId) -> Result<Vec<TaxId>> {
        let mut lineage = vec![taxid];
        let mut seen = AHashSet::new();
        seen.insert(taxid);
        let mut current = taxid;

        while let Some(&parent) = self.parent_map.get(&current) {
            // root points to itself (or to 0)
            if parent == 0 || parent == current {
                break;
            }
            if !seen.insert(parent) {
                return Err(PipelineError::Config(format!(
                    "taxonomy has a parent cycle through taxid {parent} (reached from {taxid})"
                )));
            }
            lineage.push(parent);
            current = parent;
        }
        Ok(lineage)
    }
}

impl Taxonomy for TaxonomyDb {
    fn resolve_name_to_id(&self, name: &str) -> Result<Option<TaxId>> {
        Ok(self.name_index.get(&name_key(name)).copied())
    }

    fn resolve_id_to_name(&self, taxid: TaxId) -> Result<Option<String>> {
        Ok(self.name_map.get(&taxid).cloned())
    }

    /// Induced subtree over `taxids`: every lineage is merged, then internal
    /// nodes that were not asked for and have a single child are skipped.
    fn build_minimal_topology(&self, taxids: &BTreeSet<TaxId>) -> Result<TaxTree> {
        let mut targets = BTreeSet::new();
        for &taxid in taxids {
            if self.parent_map.contains_key(&taxid) {
                targets.insert(taxid);
            } else {
                log::warn!("taxid {taxid} is not in the taxonomy, ignoring it");
            }
        }
        if targets.is_empty() {
            return Err(PipelineError::EmptyTopology);
        }

        // children ordered by taxid keep the output stable
        let mut children: BTreeMap<TaxId, BTreeSet<TaxId>> = BTreeMap::new();
        let mut roots = BTreeSet::new();
        for &taxid in &targets {
            let lineage = self.lineage(taxid)?;
            for pair in lineage.windows(2) {
                children.entry(pair[1]).or_default().insert(pair[0]);
            }
            if let Some(&top) = lineage.last() {
                roots.insert(top);
            }
        }

        // disconnected lineages hang off a synthetic root 0
        let root = if roots.len() == 1 {
            roots.iter().next().copied().unwrap_or(0)
        } else {
            log::warn!("Lineages end in {} different roots", roots.len());
            children.insert(0, roots);
            0
        };

        let root = collapse(root, &children, &targets);
        let mut tree = TaxTree::with_root(root);
        let at = tree.root();
        graft(&mut tree, at, root, &children, &targets);
        Ok(tree)
    }
}

/// Walk down through unrequested single-child nodes.
fn collapse(mut taxid: TaxId, children: &BTreeMap<TaxId, BTreeSet<TaxId>>, targets: &BTreeSet<TaxId>) -> TaxId {
    loop {
        if targets.contains(&taxid) {
            return taxid;
        }
        match children.get(&taxid) {
            Some(kids) if kids.len() == 1 => match kids.iter().next() {
                Some(&only) => taxid = only,
                None => return taxid,
            },
            _ => return taxid,
        }
    }
}

fn graft(
    tree: &mut TaxTree,
    at: usize,
    taxid: TaxId,
    children: &BTreeMap<TaxId, BTreeSet<TaxId>>,
    targets: &BTreeSet<TaxId>,
) {
    let Some(kids) = children.get(&taxid) else {
        return;
    };
    for &kid in kids {
        let kid = collapse(kid, children, targets);
        let idx = tree.add_child(at, kid);
        graft(tree, idx, kid, children, targets);
    }
}
