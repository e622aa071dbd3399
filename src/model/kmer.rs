//! # Kmer Mapping
//!
//! Coarse mapping of reads onto candidate haplotypes ahead of the pair-HMM.
//! Haplotype sequences are indexed by 2-bit packed kmers; a read's kmer
//! hash list votes for alignment offsets and the top-scoring offsets are
//! handed to the alignment model. The offset counters are scratch buffers
//! reused across reads within a window.

use std::collections::HashMap;

/// Kmer length used for candidate mapping.
pub const KMER_SIZE: usize = 15;

/// Candidate offsets retained per read after voting.
pub const MAX_MAPPING_POSITIONS: usize = 10;

/// 2-bit encode a base; `None` for anything outside ACGT.
#[inline]
fn encode_base(base: u8) -> Option<u64> {
    match base {
        b'A' | b'a' => Some(0),
        b'C' | b'c' => Some(1),
        b'G' | b'g' => Some(2),
        b'T' | b't' => Some(3),
        _ => None,
    }
}

/// Rolling 2-bit perfect hashes of every kmer in `seq`; kmers containing
/// an ambiguous base hash to `None`.
pub fn compute_kmer_hashes(seq: &[u8]) -> Vec<Option<u64>> {
    if seq.len() < KMER_SIZE {
        return Vec::new();
    }
    let mask = (1u64 << (2 * KMER_SIZE)) - 1;
    let mut hashes = Vec::with_capacity(seq.len() - KMER_SIZE + 1);
    let mut hash = 0u64;
    let mut valid = 0usize; // run of unambiguous bases ending here
    for (i, &base) in seq.iter().enumerate() {
        match encode_base(base) {
            Some(code) => {
                hash = ((hash << 2) | code) & mask;
                valid += 1;
            }
            None => {
                hash = 0;
                valid = 0;
            }
        }
        if i + 1 >= KMER_SIZE {
            hashes.push(if valid >= KMER_SIZE { Some(hash) } else { None });
        }
    }
    hashes
}

/// Kmer position index over one haplotype sequence. The backing tables are
/// reused across haplotypes via [`KmerIndex::rebuild`].
#[derive(Debug, Default)]
pub struct KmerIndex {
    positions: HashMap<u64, Vec<u32>>,
}

impl KmerIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-index a haplotype sequence, recycling the allocation.
    pub fn rebuild(&mut self, sequence: &[u8]) {
        self.positions.clear();
        for (pos, hash) in compute_kmer_hashes(sequence).into_iter().enumerate() {
            if let Some(h) = hash {
                self.positions.entry(h).or_default().push(pos as u32);
            }
        }
    }

    pub fn get(&self, hash: u64) -> Option<&[u32]> {
        self.positions.get(&hash).map(|v| v.as_slice())
    }
}

/// Scratch counters for offset voting, reused across reads.
#[derive(Debug, Default)]
pub struct MappingCounts {
    counts: Vec<u32>,
    touched: Vec<usize>,
}

impl MappingCounts {
    pub fn new() -> Self {
        Self::default()
    }

    fn reset(&mut self, target_len: usize) {
        for &t in &self.touched {
            self.counts[t] = 0;
        }
        self.touched.clear();
        if self.counts.len() < target_len {
            self.counts.resize(target_len, 0);
        }
    }
}

/// Vote for alignment offsets of a read against an indexed haplotype.
///
/// Each matching kmer at read position `i` and target position `p` votes
/// for offset `p - i`. Returns up to [`MAX_MAPPING_POSITIONS`] offsets,
/// best-supported first. An empty result means no kmer anchored the read.
pub fn map_query_to_target(
    read_hashes: &[Option<u64>],
    index: &KmerIndex,
    counts: &mut MappingCounts,
    target_len: usize,
) -> Vec<usize> {
    counts.reset(target_len);
    for (i, hash) in read_hashes.iter().enumerate() {
        let Some(h) = hash else { continue };
        let Some(positions) = index.get(*h) else {
            continue;
        };
        for &p in positions {
            let p = p as usize;
            if p < i {
                continue;
            }
            let offset = p - i;
            if offset < counts.counts.len() {
                if counts.counts[offset] == 0 {
                    counts.touched.push(offset);
                }
                counts.counts[offset] += 1;
            }
        }
    }
    let mut offsets: Vec<(u32, usize)> = counts
        .touched
        .iter()
        .map(|&o| (counts.counts[o], o))
        .collect();
    offsets.sort_unstable_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    offsets
        .into_iter()
        .take(MAX_MAPPING_POSITIONS)
        .map(|(_, o)| o)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn random_seq(len: usize, seed: u64) -> Vec<u8> {
        // deterministic xorshift sequence, ACGT alphabet
        let mut state = seed;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                b"ACGT"[(state % 4) as usize]
            })
            .collect()
    }

    #[test]
    fn test_hashes_cover_sequence() {
        let seq = random_seq(50, 7);
        let hashes = compute_kmer_hashes(&seq);
        assert_eq!(hashes.len(), 50 - KMER_SIZE + 1);
        assert!(hashes.iter().all(|h| h.is_some()));
    }

    #[test]
    fn test_ambiguous_bases_poison_kmers() {
        let mut seq = random_seq(40, 11);
        seq[20] = b'N';
        let hashes = compute_kmer_hashes(&seq);
        // every kmer covering position 20 is None
        for (i, h) in hashes.iter().enumerate() {
            let covers = i <= 20 && 20 < i + KMER_SIZE;
            assert_eq!(h.is_none(), covers, "kmer at {}", i);
        }
    }

    #[test]
    fn test_short_sequence_has_no_kmers() {
        assert!(compute_kmer_hashes(b"ACGT").is_empty());
    }

    #[test]
    fn test_mapping_recovers_true_offset() {
        let target = random_seq(200, 3);
        let read = target[60..130].to_vec();
        let mut index = KmerIndex::new();
        index.rebuild(&target);
        let mut counts = MappingCounts::new();
        let offsets = map_query_to_target(
            &compute_kmer_hashes(&read),
            &index,
            &mut counts,
            target.len(),
        );
        assert_eq!(offsets.first().copied(), Some(60));
    }

    #[test]
    fn test_counters_reset_between_reads() {
        let target = random_seq(120, 5);
        let mut index = KmerIndex::new();
        index.rebuild(&target);
        let mut counts = MappingCounts::new();

        let read_a = target[10..60].to_vec();
        let first = map_query_to_target(
            &compute_kmer_hashes(&read_a),
            &index,
            &mut counts,
            target.len(),
        );
        let read_b = target[40..100].to_vec();
        let second = map_query_to_target(
            &compute_kmer_hashes(&read_b),
            &index,
            &mut counts,
            target.len(),
        );
        assert_eq!(first.first().copied(), Some(10));
        assert_eq!(second.first().copied(), Some(40));
    }
}
