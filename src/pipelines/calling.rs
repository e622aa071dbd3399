//! # Calling Pipeline
//!
//! Windowed orchestration of the cancer caller. Independent genomic
//! windows fan out over the rayon pool; inside a window the pipeline is
//! single-threaded. Finished windows may complete out of order, so the
//! emitting side holds a reorder buffer keyed by window index and flushes
//! records strictly in genomic order. Cancellation is cooperative: a
//! shared flag checked at window boundaries and inside the VB loops;
//! partial window results are discarded.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::caller::call::CallSet;
use crate::caller::{CancerCaller, Phaser};
use crate::data::haplotype::{Haplotype, HaplotypeRef};
use crate::data::read::transform_reads;
use crate::data::{GenomicRegion, SampleName, Variant};
use crate::error::{Result, SomavarError};
use crate::io::{
    CandidateGenerator, ReadPipe, ReferenceGenome, VcfRecord, VcfRecordBuilder, VcfSampleField,
};
use crate::model::likelihood::LikelihoodCache;
use crate::model::pair_hmm::PairHmmParams;
use crate::model::tree::HaplotypeTree;

#[derive(Clone, Copy, Debug)]
pub struct WindowConfig {
    /// window length in reference bases
    pub window_size: u32,
    /// haplotype ceiling handed to the tree per window
    pub max_haplotypes: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            window_size: 1000,
            max_haplotypes: 128,
        }
    }
}

/// Destination of finished records, fed strictly in genomic order.
pub trait RecordSink: Send {
    fn emit(&mut self, record: VcfRecord) -> Result<()>;
}

impl RecordSink for Vec<VcfRecord> {
    fn emit(&mut self, record: VcfRecord) -> Result<()> {
        self.push(record);
        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
pub struct CallingSummary {
    pub windows: usize,
    pub records: usize,
    /// windows recovered or failed, with the reason
    pub failures: Vec<(String, String)>,
}

pub struct CallingPipeline {
    caller: CancerCaller,
    phaser: Phaser,
    window_config: WindowConfig,
    pair_hmm: PairHmmParams,
    cancel: Arc<AtomicBool>,
}

impl CallingPipeline {
    pub fn new(caller: CancerCaller, phaser: Phaser, window_config: WindowConfig) -> Self {
        Self {
            caller,
            phaser,
            window_config,
            pair_hmm: PairHmmParams::default(),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shared flag for cooperative cancellation.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// Call every window of `region` (or of every contig when `None`),
    /// emitting records in genomic order.
    pub fn run(
        &self,
        reference: &dyn ReferenceGenome,
        reads: &dyn ReadPipe,
        candidates: &dyn CandidateGenerator,
        region: Option<GenomicRegion>,
        sink: &mut dyn RecordSink,
    ) -> Result<CallingSummary> {
        let windows = self.plan_windows(reference, region)?;
        info!(windows = windows.len(), "starting calling pipeline");

        let mut summary = CallingSummary {
            windows: windows.len(),
            ..Default::default()
        };
        let (sender, receiver) = mpsc::channel::<(usize, Result<Vec<VcfRecord>>)>();

        std::thread::scope(|scope| -> Result<()> {
            scope.spawn(|| {
                windows
                    .par_iter()
                    .enumerate()
                    .for_each_with(sender, |sender, (index, window)| {
                        let result = if self.cancel.load(Ordering::Relaxed) {
                            Ok(Vec::new())
                        } else {
                            self.process_window(window, reference, reads, candidates)
                        };
                        // receiver hanging up means emission already failed
                        let _ = sender.send((index, result));
                    });
            });

            // reorder buffer: flush the lowest outstanding window first
            let mut pending: BTreeMap<usize, Result<Vec<VcfRecord>>> = BTreeMap::new();
            let mut next = 0usize;
            for (index, result) in receiver {
                pending.insert(index, result);
                while let Some(result) = pending.remove(&next) {
                    match result {
                        Ok(records) => {
                            for record in records {
                                summary.records += 1;
                                sink.emit(record)?;
                            }
                        }
                        Err(error) => {
                            let window = &windows[next];
                            if error.is_recoverable() {
                                debug!(window = %window, %error, "window recovered with no calls");
                            } else {
                                warn!(window = %window, %error, "window failed");
                            }
                            summary.failures.push((window.to_string(), error.to_string()));
                        }
                    }
                    next += 1;
                }
            }
            Ok(())
        })?;

        info!(
            records = summary.records,
            failures = summary.failures.len(),
            "calling pipeline finished"
        );
        Ok(summary)
    }

    fn plan_windows(
        &self,
        reference: &dyn ReferenceGenome,
        region: Option<GenomicRegion>,
    ) -> Result<Vec<GenomicRegion>> {
        let spans: Vec<(String, u32, u32)> = match region {
            Some(r) => {
                if r.is_empty() {
                    return Err(SomavarError::bad_region(
                        r.contig.clone(),
                        r.begin(),
                        r.end(),
                        "empty calling region",
                    ));
                }
                vec![(r.contig.clone(), r.begin(), r.end())]
            }
            None => reference
                .contigs()
                .into_iter()
                .map(|(name, len)| (name, 0, len))
                .collect(),
        };
        let size = self.window_config.window_size.max(1);
        let mut windows = Vec::new();
        for (contig, begin, end) in spans {
            let mut cursor = begin;
            while cursor < end {
                let stop = (cursor + size).min(end);
                windows.push(GenomicRegion::new(contig.clone(), cursor, stop)?);
                cursor = stop;
            }
        }
        Ok(windows)
    }

    fn process_window(
        &self,
        window: &GenomicRegion,
        reference: &dyn ReferenceGenome,
        reads: &dyn ReadPipe,
        candidates: &dyn CandidateGenerator,
    ) -> Result<Vec<VcfRecord>> {
        let variants = candidates.generate_candidates(window)?;
        if variants.is_empty() {
            return Ok(Vec::new());
        }

        // fetch and transform reads in the caller's sample order
        let mut fetched: Vec<(SampleName, Vec<crate::data::AlignedRead>)> = Vec::new();
        for sample in self.caller.samples() {
            let mut reads = reads.fetch_reads(sample, window)?;
            transform_reads(&mut reads);
            fetched.push((sample.clone(), reads));
        }
        if fetched.iter().all(|(_, r)| r.is_empty()) {
            return Err(SomavarError::insufficient_coverage(window.to_string()));
        }

        // the haplotype window must cover every candidate allele
        let hap_end = variants
            .iter()
            .map(|v| v.region().end)
            .max()
            .unwrap_or(window.end())
            .max(window.end());
        let hap_window = GenomicRegion::new(window.contig.clone(), window.begin(), hap_end)?;
        let ref_seq = reference.fetch_sequence(&hap_window)?;

        let mut tree = HaplotypeTree::new(window.contig.clone());
        let deferred = tree.extend_until(variants.clone(), self.window_config.max_haplotypes);
        if !deferred.is_empty() {
            warn!(
                window = %window,
                deferred = deferred.len(),
                "haplotype ceiling reached; deferring candidates"
            );
        }
        let mut haplotypes = tree.extract_haplotypes(hap_window.interval, &ref_seq)?;
        let reference_haplotype = HaplotypeRef::new(Haplotype::reference(
            window.contig.clone(),
            hap_window.interval,
            &ref_seq,
        ));
        if !haplotypes.contains(&reference_haplotype) {
            haplotypes.insert(0, reference_haplotype.clone());
        }
        if haplotypes.len() < 2 {
            return Err(SomavarError::degenerate(
                "window produced no alternative haplotypes",
            ));
        }

        let mut cache = LikelihoodCache::new(self.pair_hmm);
        cache.populate(&fetched, &haplotypes)?;

        let latents =
            self.caller
                .infer_latents(&haplotypes, &reference_haplotype, &cache, Some(&self.cancel))?;
        if self.cancel.load(Ordering::Relaxed) {
            return Ok(Vec::new());
        }
        let called = variants
            .iter()
            .filter(|v| !deferred.contains(v))
            .cloned()
            .collect::<Vec<Variant>>();
        let mut calls = self.caller.call_variants(&called, &latents)?;

        // phase the called genotypes
        let model_posteriors = self.caller.calculate_model_posteriors(&latents);
        let genotype_posteriors =
            self.caller.germline_genotype_posteriors(&latents, &model_posteriors);
        let per_sample: Vec<(SampleName, Vec<_>)> = self
            .caller
            .samples()
            .iter()
            .map(|s| (s.clone(), genotype_posteriors.clone()))
            .collect();
        let phase_set = self
            .phaser
            .force_phase(hap_window.interval, &called, &per_sample);
        for call in &mut calls.variants {
            let position = call.variant.region().begin;
            for sample_call in &mut call.samples {
                if let Some(region) = phase_set.region_at(&sample_call.sample, position) {
                    sample_call.phase_set = Some(region.region.begin + 1);
                    sample_call.phase_quality = Some(region.score);
                }
            }
        }

        self.build_records(window, &calls)
    }

    fn build_records(&self, window: &GenomicRegion, calls: &CallSet) -> Result<Vec<VcfRecord>> {
        let mut records = Vec::with_capacity(calls.variants.len() + calls.reference.len());
        for call in &calls.variants {
            let mut builder = VcfRecordBuilder::new()
                .chrom(window.contig.clone())
                .pos(call.variant.region().begin + 1)
                .alleles(
                    String::from_utf8_lossy(call.variant.ref_bases()).to_string(),
                    String::from_utf8_lossy(call.variant.alt_bases()).to_string(),
                )
                .qual(call.quality.value());
            for sample in &call.samples {
                builder = builder.sample(VcfSampleField {
                    sample: sample.sample.clone(),
                    gt: sample.genotype.gt_string(),
                    gq: sample.genotype_quality.value(),
                    model_posteriors: sample.model_posteriors,
                    somatic: call.somatic.is_some(),
                    phase_set: sample.phase_set,
                    phase_quality: sample.phase_quality.map(|q| q.value()),
                });
            }
            records.push(builder.build()?);
        }
        for refcall in &calls.reference {
            let record = VcfRecordBuilder::new()
                .chrom(window.contig.clone())
                .pos(refcall.variant.region().begin + 1)
                .alleles(
                    String::from_utf8_lossy(refcall.variant.ref_bases()).to_string(),
                    ".".to_string(),
                )
                .qual(refcall.quality.value())
                .build()?;
            records.push(record);
        }
        records.sort_by_key(|r| r.pos);
        Ok(records)
    }
}
