//! # Application Entry Point
//!
//! Parses the configuration, initialises logging and the thread pool,
//! wires the in-memory collaborators to the calling pipeline and writes
//! the resulting records.

use std::fs;
use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use somavar::caller::Phaser;
use somavar::config::{parse_region, Config};
use somavar::data::GenomicRegion;
use somavar::io::candidates::{PileupCandidateGenerator, PileupCandidateParams};
use somavar::io::{read_sam_str, InMemoryReadPipe, InMemoryReference, ReadPipe, ReferenceGenome, VcfRecord};
use somavar::pipelines::{CallingPipeline, RecordSink};
use somavar::utils::Phred;
use somavar::CancerCaller;

struct LineSink {
    out: Box<dyn Write + Send>,
}

impl RecordSink for LineSink {
    fn emit(&mut self, record: VcfRecord) -> somavar::Result<()> {
        writeln!(self.out, "{}", record.to_line()).map_err(somavar::SomavarError::from)
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::parse_and_validate()?;
    rayon::ThreadPoolBuilder::new()
        .num_threads(config.nthreads())
        .thread_name(|i| format!("somavar-worker-{i}"))
        .build_global()
        .context("failed to build thread pool")?;

    let reference = Arc::new(InMemoryReference::from_fasta_str(
        &fs::read_to_string(&config.reference).context("reading reference")?,
    )?);

    let mut pipe = InMemoryReadPipe::new();
    let tumour_reads = read_sam_str(&fs::read_to_string(&config.reads).context("reading reads")?)?;
    info!(sample = %config.sample, reads = tumour_reads.len(), "loaded tumour reads");
    pipe.add_sample(config.sample.clone(), tumour_reads);
    if let Some(path) = &config.normal_reads {
        let normal_reads =
            read_sam_str(&fs::read_to_string(path).context("reading normal reads")?)?;
        info!(sample = %config.normal_sample_name, reads = normal_reads.len(), "loaded normal reads");
        pipe.add_sample(config.normal_sample_name.clone(), normal_reads);
    }
    let pipe = Arc::new(pipe);

    let region = match &config.region {
        Some(text) => {
            let (contig, span) = parse_region(text)?;
            let (begin, end) = match span {
                Some(span) => span,
                None => {
                    let length = reference
                        .contigs()
                        .iter()
                        .find(|(name, _)| *name == contig)
                        .map(|(_, len)| *len)
                        .context("region contig not in reference")?;
                    (0, length)
                }
            };
            Some(GenomicRegion::new(contig, begin, end)?)
        }
        None => None,
    };

    let caller = CancerCaller::new(pipe.samples().to_vec(), config.caller_params())?;
    let phaser = Phaser::new(Phred(config.min_phase_score));
    let pipeline = CallingPipeline::new(caller, phaser, config.window_config());
    let generator = PileupCandidateGenerator::new(
        reference.clone(),
        pipe.clone(),
        PileupCandidateParams::default(),
    );

    let out: Box<dyn Write + Send> = match &config.out {
        Some(path) => Box::new(fs::File::create(path).context("creating output")?),
        None => Box::new(std::io::stdout()),
    };
    let mut sink = LineSink { out };

    let summary = pipeline.run(
        reference.as_ref(),
        pipe.as_ref(),
        &generator,
        region,
        &mut sink,
    )?;
    info!(
        windows = summary.windows,
        records = summary.records,
        failures = summary.failures.len(),
        "done"
    );
    Ok(())
}
