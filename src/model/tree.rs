//! # Haplotype Tree
//!
//! Enumerates candidate haplotypes compatible with an incrementally
//! supplied allele stream over one contig. The tree is an arena of vertex
//! records indexed by integer handles: the root carries no allele, every
//! other vertex carries one, and a haplotype is the allele concatenation
//! along a root-to-leaf path. The frontier (leaf list) and the
//! haplotype-to-leaf cache are secondary indexes over the arena.
//!
//! Invariants:
//! - no two outgoing edges of a vertex carry the same allele
//! - every root-to-leaf path is position-sorted and non-overlapping
//! - no interior vertex appears in the frontier

use std::collections::HashMap;

use tracing::debug;

use crate::data::allele::ContigAllele;
use crate::data::haplotype::{have_same_alleles, Haplotype, HaplotypeRef};
use crate::data::{ContigRegion, Variant};
use crate::error::Result;

const ROOT: usize = 0;

#[derive(Clone, Debug)]
struct Vertex {
    allele: Option<ContigAllele>,
    parent: Option<usize>,
    children: Vec<usize>,
    live: bool,
}

/// How a single leaf accepts a new allele.
enum Extension {
    /// The allele continues the branch; the leaf moves down.
    Append,
    /// The allele conflicts with the branch tail and forks from the given
    /// ancestor; the original branch survives alongside the new leaf.
    Branch(usize),
    /// The leaf cannot take the allele.
    Skip,
}

#[derive(Clone, Debug)]
pub struct HaplotypeTree {
    contig: String,
    vertices: Vec<Vertex>,
    free: Vec<usize>,
    frontier: Vec<usize>,
    /// Materialised haplotype -> frontier vertices, filled by
    /// `extract_haplotypes`; short-circuits `prune_all`.
    leaf_cache: HashMap<Haplotype, Vec<usize>>,
}

impl HaplotypeTree {
    pub fn new(contig: impl Into<String>) -> Self {
        Self {
            contig: contig.into(),
            vertices: vec![Vertex {
                allele: None,
                parent: None,
                children: Vec::new(),
                live: true,
            }],
            free: Vec::new(),
            frontier: vec![ROOT],
            leaf_cache: HashMap::new(),
        }
    }

    pub fn contig(&self) -> &str {
        &self.contig
    }

    pub fn is_empty(&self) -> bool {
        self.vertices[ROOT].children.is_empty()
    }

    /// Number of root-to-leaf paths currently held.
    pub fn num_haplotypes(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            self.frontier.len()
        }
    }

    /// The smallest interval covering every allele in the tree, if any.
    pub fn encompassing_region(&self) -> Option<ContigRegion> {
        let mut region: Option<ContigRegion> = None;
        for v in self.vertices.iter().filter(|v| v.live) {
            if let Some(a) = &v.allele {
                region = Some(match region {
                    Some(r) => r.encompass(&a.region()),
                    None => a.region(),
                });
            }
        }
        region
    }

    /// Extend every compatible frontier branch with `allele`.
    ///
    /// A branch whose tail ends at or before the allele commits it (the
    /// leaf moves down); a branch whose tail conflicts with the allele
    /// forks from the deepest ancestor preceding the allele, keeping the
    /// original branch. Total: an inadmissible allele is a no-op.
    pub fn extend(&mut self, allele: &ContigAllele) {
        let mut i = 0;
        while i < self.frontier.len() {
            let leaf = self.frontier[i];
            match self.classify_extension(leaf, allele) {
                Extension::Append => {
                    let new = self.add_vertex(allele.clone(), leaf);
                    self.frontier[i] = new;
                    i += 1;
                }
                Extension::Branch(anchor) => {
                    let new = self.add_vertex(allele.clone(), anchor);
                    self.frontier.insert(i + 1, new);
                    i += 2;
                }
                Extension::Skip => i += 1,
            }
        }
        self.leaf_cache.clear();
    }

    /// Insert `allele` as a new leaf at every interior anchor that can take
    /// it, not only at the frontier. A no-op when no anchor admits it.
    pub fn splice(&mut self, allele: &ContigAllele) {
        if self.is_empty() {
            self.extend(allele);
            return;
        }
        let mut anchors: Vec<usize> = self
            .frontier
            .iter()
            .map(|&leaf| self.find_allele_before(leaf, allele))
            .collect();
        anchors.sort_unstable();
        anchors.dedup();
        for anchor in anchors {
            if self.allele_exists(anchor, allele) {
                continue;
            }
            let new = self.add_vertex(allele.clone(), anchor);
            if let Some(pos) = self.frontier.iter().position(|&l| l == anchor) {
                // the anchor was itself a leaf and is now interior
                self.frontier[pos] = new;
            } else {
                self.frontier.push(new);
            }
        }
        self.leaf_cache.clear();
    }

    /// Consume variants until the haplotype count would exceed
    /// `max_haplotypes`. The bound is a strict ceiling: a variant whose
    /// extension would overshoot is rolled back and returned unconsumed
    /// along with the rest of the stream.
    pub fn extend_until<I>(&mut self, variants: I, max_haplotypes: usize) -> Vec<Variant>
    where
        I: IntoIterator<Item = Variant>,
    {
        let mut iter = variants.into_iter();
        let mut remaining = Vec::new();
        while let Some(variant) = iter.next() {
            let checkpoint = (self.vertices.clone(), self.frontier.clone(), self.free.clone());
            self.extend(&variant.ref_allele());
            self.extend(&variant.alt_allele());
            if self.num_haplotypes() > max_haplotypes {
                self.vertices = checkpoint.0;
                self.frontier = checkpoint.1;
                self.free = checkpoint.2;
                debug!(
                    variant = %variant,
                    max_haplotypes,
                    "haplotype ceiling reached, deferring remaining candidates"
                );
                remaining.push(variant);
                remaining.extend(iter);
                break;
            }
            if self.num_haplotypes() == max_haplotypes {
                remaining.extend(iter);
                break;
            }
        }
        self.leaf_cache.clear();
        remaining
    }

    /// Materialise every frontier path over `window`, deduplicated by
    /// sequence equality. Fills the haplotype-to-leaf cache.
    pub fn extract_haplotypes(
        &mut self,
        window: ContigRegion,
        ref_seq: &[u8],
    ) -> Result<Vec<HaplotypeRef>> {
        self.leaf_cache.clear();
        let mut result: Vec<HaplotypeRef> = Vec::new();
        for &leaf in &self.frontier {
            if leaf == ROOT {
                continue;
            }
            let alleles: Vec<ContigAllele> = self
                .path_alleles(leaf)
                .into_iter()
                .filter(|a| window.contains(&a.region()))
                .collect();
            let haplotype = Haplotype::new(&self.contig, window, ref_seq, alleles)?;
            let leaves = self.leaf_cache.entry(haplotype.clone()).or_default();
            if leaves.is_empty() {
                result.push(HaplotypeRef::new(haplotype));
            }
            leaves.push(leaf);
        }
        Ok(result)
    }

    /// Remove every root-to-leaf path whose materialised haplotype equals
    /// `haplotype` (sequence equality). Relies on the leaf cache filled by
    /// the last `extract_haplotypes`; an unknown haplotype is a no-op.
    pub fn prune_all(&mut self, haplotype: &Haplotype) {
        match self.leaf_cache.remove(haplotype) {
            Some(leaves) => {
                for leaf in leaves {
                    self.remove_path(leaf);
                }
            }
            None => debug!("prune_all on haplotype absent from the leaf cache"),
        }
        self.restore_empty_frontier();
    }

    /// Remove every root-to-leaf path carrying the same committed allele
    /// list as `haplotype`, regardless of spelling.
    pub fn prune_unique(&mut self, haplotype: &Haplotype) {
        let matching: Vec<usize> = self
            .frontier
            .iter()
            .copied()
            .filter(|&leaf| {
                leaf != ROOT && self.path_alleles(leaf).as_slice() == haplotype.alleles()
            })
            .collect();
        for leaf in matching {
            self.remove_path(leaf);
        }
        self.leaf_cache.clear();
        self.restore_empty_frontier();
    }

    /// Drop the whole tree, keeping only the root.
    pub fn clear(&mut self) {
        self.vertices.truncate(1);
        self.vertices[ROOT].children.clear();
        self.free.clear();
        self.frontier.clear();
        self.frontier.push(ROOT);
        self.leaf_cache.clear();
    }

    // --- internals ---

    fn add_vertex(&mut self, allele: ContigAllele, parent: usize) -> usize {
        let vertex = Vertex {
            allele: Some(allele),
            parent: Some(parent),
            children: Vec::new(),
            live: true,
        };
        let id = match self.free.pop() {
            Some(slot) => {
                self.vertices[slot] = vertex;
                slot
            }
            None => {
                self.vertices.push(vertex);
                self.vertices.len() - 1
            }
        };
        self.vertices[parent].children.push(id);
        id
    }

    fn classify_extension(&self, leaf: usize, allele: &ContigAllele) -> Extension {
        if leaf == ROOT {
            return Extension::Append;
        }
        let leaf_allele = self.vertices[leaf]
            .allele
            .as_ref()
            .expect("non-root vertex carries an allele");
        if leaf_allele.region().is_before(&allele.region()) {
            return Extension::Append;
        }
        if leaf_allele == allele {
            return Extension::Skip;
        }
        if leaf_allele.region().overlaps(&allele.region()) {
            let anchor = self.find_allele_before(leaf, allele);
            if self.allele_exists(anchor, allele) {
                return Extension::Skip;
            }
            return Extension::Branch(anchor);
        }
        // the allele lies before the branch tail; only splice can retrofit it
        Extension::Skip
    }

    /// Deepest ancestor of `v` (inclusive) whose allele ends at or before
    /// the start of `allele`; the root when none does.
    fn find_allele_before(&self, mut v: usize, allele: &ContigAllele) -> usize {
        while v != ROOT {
            let a = self.vertices[v].allele.as_ref().unwrap();
            if a.region().is_before(&allele.region()) {
                return v;
            }
            v = self.vertices[v].parent.unwrap();
        }
        ROOT
    }

    fn allele_exists(&self, vertex: usize, allele: &ContigAllele) -> bool {
        self.vertices[vertex]
            .children
            .iter()
            .any(|&c| self.vertices[c].allele.as_ref() == Some(allele))
    }

    /// Alleles along the root-to-`leaf` path, position-sorted.
    fn path_alleles(&self, leaf: usize) -> Vec<ContigAllele> {
        let mut alleles = Vec::new();
        let mut v = leaf;
        while v != ROOT {
            let vertex = &self.vertices[v];
            alleles.push(vertex.allele.clone().unwrap());
            v = vertex.parent.unwrap();
        }
        alleles.reverse();
        alleles
    }

    /// Remove the path ending at `leaf` up to the first bifurcation.
    fn remove_path(&mut self, leaf: usize) {
        let Some(pos) = self.frontier.iter().position(|&l| l == leaf) else {
            return;
        };
        self.frontier.remove(pos);
        let mut v = leaf;
        loop {
            if v == ROOT || !self.vertices[v].live {
                break;
            }
            let parent = self.vertices[v].parent.unwrap();
            self.vertices[parent].children.retain(|&c| c != v);
            self.vertices[v].live = false;
            self.free.push(v);
            if parent == ROOT || !self.vertices[parent].children.is_empty() {
                break;
            }
            v = parent;
        }
    }

    fn restore_empty_frontier(&mut self) {
        if self.frontier.is_empty() {
            self.frontier.push(ROOT);
        }
    }
}

/// Extend a tree with both alleles of each variant in order.
pub fn extend_tree<'a>(variants: impl IntoIterator<Item = &'a Variant>, tree: &mut HaplotypeTree) {
    for variant in variants {
        tree.extend(&variant.ref_allele());
        tree.extend(&variant.alt_allele());
    }
}

/// Whether the extracted haplotype set contains one with the same alleles.
pub fn includes_same_alleles(haplotypes: &[HaplotypeRef], haplotype: &Haplotype) -> bool {
    haplotypes.iter().any(|h| have_same_alleles(h, haplotype))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ContigRegion;

    const REF: &[u8] = b"ACGTACGTAC";
    const WINDOW: ContigRegion = ContigRegion { begin: 0, end: 10 };

    fn snv(pos: u32, alt: u8) -> Variant {
        Variant::new("chr1", pos, &REF[pos as usize..pos as usize + 1], &[alt])
    }

    fn extract(tree: &mut HaplotypeTree) -> Vec<HaplotypeRef> {
        tree.extract_haplotypes(WINDOW, REF).unwrap()
    }

    #[test]
    fn test_single_variant_two_haplotypes() {
        let mut tree = HaplotypeTree::new("chr1");
        extend_tree([snv(2, b'A')].iter(), &mut tree);
        assert_eq!(tree.num_haplotypes(), 2);
        let haps = extract(&mut tree);
        assert_eq!(haps.len(), 2);
        let sequences: Vec<&[u8]> = haps.iter().map(|h| h.sequence()).collect();
        assert!(sequences.contains(&&b"ACGTACGTAC"[..]));
        assert!(sequences.contains(&&b"ACATACGTAC"[..]));
    }

    #[test]
    fn test_two_variants_four_haplotypes() {
        let mut tree = HaplotypeTree::new("chr1");
        extend_tree([snv(2, b'A'), snv(6, b'C')].iter(), &mut tree);
        assert_eq!(tree.num_haplotypes(), 4);
        assert_eq!(extract(&mut tree).len(), 4);
    }

    #[test]
    fn test_overlapping_alts_are_siblings() {
        // two alternative alleles at one locus never stack on one branch
        let mut tree = HaplotypeTree::new("chr1");
        let site = ContigRegion::new(2, 3);
        tree.extend(&ContigAllele::new(site, *b"G"));
        tree.extend(&ContigAllele::new(site, *b"A"));
        tree.extend(&ContigAllele::new(site, *b"T"));
        assert_eq!(tree.num_haplotypes(), 3);
        for h in extract(&mut tree) {
            assert!(h.alleles().len() <= 1);
        }
    }

    #[test]
    fn test_closure_under_extension() {
        // every haplotype assembled from the variants must be recoverable
        let variants = vec![snv(1, b'T'), snv(4, b'G'), snv(8, b'T')];
        let mut tree = HaplotypeTree::new("chr1");
        extend_tree(variants.iter(), &mut tree);
        let haps = extract(&mut tree);
        assert_eq!(haps.len(), 8);
        // spot-check the all-alt haplotype
        assert!(haps.iter().any(|h| h.sequence() == b"ATGTGCGTTC"));
    }

    #[test]
    fn test_extend_until_is_a_strict_ceiling() {
        let variants = vec![snv(1, b'T'), snv(4, b'G'), snv(8, b'T')];
        let mut tree = HaplotypeTree::new("chr1");
        let remaining = tree.extend_until(variants.clone(), 4);
        // two variants reach exactly four haplotypes; the third is deferred
        assert_eq!(tree.num_haplotypes(), 4);
        assert_eq!(remaining, vec![snv(8, b'T')]);

        // a ceiling the next extension would overshoot rolls back
        let mut tree = HaplotypeTree::new("chr1");
        let remaining = tree.extend_until(variants, 3);
        assert_eq!(tree.num_haplotypes(), 2);
        assert_eq!(remaining.len(), 2);
    }

    #[test]
    fn test_prune_all_then_extend_restores() {
        let mut tree = HaplotypeTree::new("chr1");
        extend_tree([snv(2, b'A')].iter(), &mut tree);
        let haps = extract(&mut tree);
        let alt = haps
            .iter()
            .find(|h| h.sequence() == b"ACATACGTAC")
            .unwrap()
            .clone();
        tree.prune_all(&alt);
        assert_eq!(tree.num_haplotypes(), 1);

        for allele in alt.alleles() {
            tree.extend(allele);
        }
        let restored = extract(&mut tree);
        assert!(restored.iter().any(|h| h.sequence() == alt.sequence()));
    }

    #[test]
    fn test_prune_unique_removes_by_allele_identity() {
        let mut tree = HaplotypeTree::new("chr1");
        extend_tree([snv(2, b'A')].iter(), &mut tree);
        let haps = extract(&mut tree);
        let alt = haps
            .iter()
            .find(|h| h.sequence() == b"ACATACGTAC")
            .unwrap()
            .clone();
        tree.prune_unique(&alt);
        assert_eq!(tree.num_haplotypes(), 1);
        let survivors = extract(&mut tree);
        assert!(!includes_same_alleles(&survivors, &alt));
    }

    #[test]
    fn test_prune_everything_resets_to_empty() {
        let mut tree = HaplotypeTree::new("chr1");
        extend_tree([snv(2, b'A')].iter(), &mut tree);
        let haps = extract(&mut tree);
        for h in &haps {
            tree.prune_all(h);
        }
        assert!(tree.is_empty());
        assert_eq!(tree.num_haplotypes(), 0);
        // the tree stays usable
        tree.extend(&snv(2, b'A').alt_allele());
        assert_eq!(tree.num_haplotypes(), 1);
    }

    #[test]
    fn test_splice_retrofits_late_allele() {
        let mut tree = HaplotypeTree::new("chr1");
        extend_tree([snv(6, b'C')].iter(), &mut tree);
        assert_eq!(tree.num_haplotypes(), 2);
        // a late-arriving allele before the committed site becomes a new leaf
        let late = ContigAllele::new(ContigRegion::new(2, 3), *b"A");
        tree.splice(&late);
        assert_eq!(tree.num_haplotypes(), 3);
        // splicing it again changes nothing
        tree.splice(&late);
        assert_eq!(tree.num_haplotypes(), 3);
    }

    #[test]
    fn test_clear() {
        let mut tree = HaplotypeTree::new("chr1");
        extend_tree([snv(2, b'A')].iter(), &mut tree);
        tree.clear();
        assert!(tree.is_empty());
        assert!(tree.encompassing_region().is_none());
    }
}
