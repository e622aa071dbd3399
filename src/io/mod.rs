//! # IO Module
//!
//! Collaborator interfaces of the inference core, plus the thin in-memory
//! implementations the binary and the tests drive it with. Real BAM/CRAM
//! and VCF plumbing live outside the core; the caller only ever sees these
//! traits and hands finished records to a [`VcfRecordBuilder`].

pub mod candidates;

use std::collections::BTreeMap;

use crate::data::{AlignedRead, GenomicRegion, SampleName, Variant};
use crate::error::{Result, SomavarError};

/// Read-only reference genome.
pub trait ReferenceGenome: Send + Sync {
    fn fetch_sequence(&self, region: &GenomicRegion) -> Result<Vec<u8>>;
    fn contigs(&self) -> Vec<(String, u32)>;
}

/// Source of aligned reads, sorted by start position.
pub trait ReadPipe: Send + Sync {
    fn samples(&self) -> &[SampleName];
    fn fetch_reads(&self, sample: &str, region: &GenomicRegion) -> Result<Vec<AlignedRead>>;
}

/// Source of candidate variants, sorted.
pub trait CandidateGenerator: Send + Sync {
    fn generate_candidates(&self, region: &GenomicRegion) -> Result<Vec<Variant>>;
}

/// Reference genome held in memory, loaded from FASTA text.
#[derive(Debug, Default)]
pub struct InMemoryReference {
    contigs: BTreeMap<String, Vec<u8>>,
}

impl InMemoryReference {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, contig: impl Into<String>, sequence: impl Into<Vec<u8>>) {
        self.contigs.insert(contig.into(), sequence.into());
    }

    /// Parse FASTA text; the contig name is the first word of each header.
    pub fn from_fasta_str(text: &str) -> Result<Self> {
        let mut reference = Self::new();
        let mut name: Option<String> = None;
        let mut sequence = Vec::new();
        for line in text.lines() {
            let line = line.trim();
            if let Some(header) = line.strip_prefix('>') {
                if let Some(previous) = name.take() {
                    reference.contigs.insert(previous, std::mem::take(&mut sequence));
                }
                let contig = header
                    .split_whitespace()
                    .next()
                    .ok_or_else(|| SomavarError::config("empty FASTA header"))?;
                name = Some(contig.to_string());
            } else if !line.is_empty() {
                if name.is_none() {
                    return Err(SomavarError::config("FASTA sequence before first header"));
                }
                sequence.extend(line.bytes().map(|b| b.to_ascii_uppercase()));
            }
        }
        if let Some(previous) = name {
            reference.contigs.insert(previous, sequence);
        }
        Ok(reference)
    }
}

impl ReferenceGenome for InMemoryReference {
    fn fetch_sequence(&self, region: &GenomicRegion) -> Result<Vec<u8>> {
        let sequence = self.contigs.get(&region.contig).ok_or_else(|| {
            SomavarError::bad_region(
                region.contig.clone(),
                region.begin(),
                region.end(),
                "unknown contig",
            )
        })?;
        if region.end() as usize > sequence.len() {
            return Err(SomavarError::bad_region(
                region.contig.clone(),
                region.begin(),
                region.end(),
                "region past contig end",
            ));
        }
        Ok(sequence[region.begin() as usize..region.end() as usize].to_vec())
    }

    fn contigs(&self) -> Vec<(String, u32)> {
        self.contigs
            .iter()
            .map(|(name, seq)| (name.clone(), seq.len() as u32))
            .collect()
    }
}

/// Read pipe over in-memory per-sample read lists.
#[derive(Debug, Default)]
pub struct InMemoryReadPipe {
    samples: Vec<SampleName>,
    reads: BTreeMap<SampleName, Vec<AlignedRead>>,
}

impl InMemoryReadPipe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sample's reads; kept sorted by start position.
    pub fn add_sample(&mut self, sample: impl Into<SampleName>, mut reads: Vec<AlignedRead>) {
        let sample = sample.into();
        reads.sort_by_key(|r| r.start);
        if !self.samples.contains(&sample) {
            self.samples.push(sample.clone());
        }
        self.reads.entry(sample).or_default().extend(reads);
    }
}

impl ReadPipe for InMemoryReadPipe {
    fn samples(&self) -> &[SampleName] {
        &self.samples
    }

    fn fetch_reads(&self, sample: &str, region: &GenomicRegion) -> Result<Vec<AlignedRead>> {
        let reads = self
            .reads
            .get(sample)
            .ok_or_else(|| SomavarError::config(format!("unknown sample: {sample}")))?;
        Ok(reads
            .iter()
            .filter(|r| r.contig == region.contig && r.region().overlaps(&region.interval))
            .cloned()
            .collect())
    }
}

/// Minimal SAM-text reader for the standalone binary: mandatory columns
/// only, one sample per file. Unmapped and malformed records are skipped.
pub fn read_sam_str(text: &str) -> Result<Vec<AlignedRead>> {
    use crate::data::read::Cigar;
    let mut reads = Vec::new();
    for line in text.lines() {
        if line.is_empty() || line.starts_with('@') {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 11 {
            return Err(SomavarError::config(format!(
                "SAM record with {} fields",
                fields.len()
            )));
        }
        let flags: u16 = fields[1]
            .parse()
            .map_err(|_| SomavarError::config("bad SAM flags"))?;
        if flags & 0x4 != 0 || fields[5] == "*" {
            continue;
        }
        let pos: u32 = fields[3]
            .parse()
            .map_err(|_| SomavarError::config("bad SAM position"))?;
        let bases = fields[9].as_bytes().to_vec();
        let qualities: Vec<u8> = fields[10].bytes().map(|q| q.saturating_sub(33)).collect();
        if bases.len() != qualities.len() {
            return Err(SomavarError::config("SEQ/QUAL length mismatch"));
        }
        reads.push(AlignedRead {
            name: fields[0].to_string(),
            contig: fields[2].to_string(),
            start: pos.saturating_sub(1),
            cigar: Cigar::parse(fields[5])?,
            bases,
            qualities,
            mapping_quality: fields[4].parse().unwrap_or(0),
            is_reverse: flags & 0x10 != 0,
        });
    }
    reads.sort_by_key(|r| (r.contig.clone(), r.start));
    Ok(reads)
}

/// One output record in the shape the VCF writer consumes.
#[derive(Clone, Debug)]
pub struct VcfRecord {
    pub chrom: String,
    /// 1-based position
    pub pos: u32,
    pub ref_bases: String,
    pub alt_bases: Vec<String>,
    pub qual: f64,
    pub filter: String,
    pub samples: Vec<VcfSampleField>,
}

#[derive(Clone, Debug)]
pub struct VcfSampleField {
    pub sample: SampleName,
    pub gt: String,
    pub gq: f64,
    pub model_posteriors: [f64; 3],
    pub somatic: bool,
    pub phase_set: Option<u32>,
    pub phase_quality: Option<f64>,
}

/// Builder the caller feeds per-site fields into.
#[derive(Clone, Debug, Default)]
pub struct VcfRecordBuilder {
    chrom: Option<String>,
    pos: Option<u32>,
    ref_bases: Option<String>,
    alt_bases: Vec<String>,
    qual: Option<f64>,
    samples: Vec<VcfSampleField>,
}

impl VcfRecordBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chrom(mut self, chrom: impl Into<String>) -> Self {
        self.chrom = Some(chrom.into());
        self
    }

    /// 1-based position.
    pub fn pos(mut self, pos: u32) -> Self {
        self.pos = Some(pos);
        self
    }

    pub fn alleles(mut self, ref_bases: impl Into<String>, alt_bases: impl Into<String>) -> Self {
        self.ref_bases = Some(ref_bases.into());
        self.alt_bases.push(alt_bases.into());
        self
    }

    pub fn qual(mut self, qual: f64) -> Self {
        self.qual = Some(qual);
        self
    }

    pub fn sample(mut self, field: VcfSampleField) -> Self {
        self.samples.push(field);
        self
    }

    pub fn build(self) -> Result<VcfRecord> {
        Ok(VcfRecord {
            chrom: self
                .chrom
                .ok_or_else(|| SomavarError::config("record missing CHROM"))?,
            pos: self
                .pos
                .ok_or_else(|| SomavarError::config("record missing POS"))?,
            ref_bases: self
                .ref_bases
                .ok_or_else(|| SomavarError::config("record missing REF"))?,
            alt_bases: self.alt_bases,
            qual: self.qual.unwrap_or(0.0),
            filter: "PASS".to_string(),
            samples: self.samples,
        })
    }
}

impl VcfRecord {
    /// Tab-separated VCF body line.
    pub fn to_line(&self) -> String {
        let alts = if self.alt_bases.is_empty() {
            ".".to_string()
        } else {
            self.alt_bases.join(",")
        };
        let ref_bases = if self.ref_bases.is_empty() {
            ".".to_string()
        } else {
            self.ref_bases.clone()
        };
        let mut line = format!(
            "{}\t{}\t.\t{}\t{}\t{:.2}\t{}\tSOMATIC={}",
            self.chrom,
            self.pos,
            ref_bases,
            alts,
            self.qual,
            self.filter,
            u8::from(self.samples.iter().any(|s| s.somatic)),
        );
        line.push_str("\tGT:GQ:MP:PS:PQ");
        for sample in &self.samples {
            let ps = sample
                .phase_set
                .map_or(".".to_string(), |p| p.to_string());
            let pq = sample
                .phase_quality
                .map_or(".".to_string(), |q| format!("{q:.1}"));
            line.push_str(&format!(
                "\t{}:{:.1}:{:.3},{:.3},{:.3}:{}:{}",
                sample.gt,
                sample.gq,
                sample.model_posteriors[0],
                sample.model_posteriors[1],
                sample.model_posteriors[2],
                ps,
                pq
            ));
        }
        line
    }
}
