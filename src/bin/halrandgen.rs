//! Generate a random, structurally valid alignment file.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use halign::alignment::Alignment;
use halign::randgen::{create_random_alignment, RandGenOptions};
use halign::storage::BackendKind;
use halign::validate::validate;

#[derive(Parser)]
#[command(name = "halrandgen", version, about = "Generate a random alignment file")]
struct Cli {
    /// Output alignment file
    hal_file: PathBuf,

    #[arg(long = "numGenomes", default_value_t = 5)]
    num_genomes: usize,

    /// Average children per ancestor
    #[arg(long = "meanDegree", default_value_t = 2.0)]
    mean_degree: f64,

    #[arg(long = "maxBranchLength", default_value_t = 0.1)]
    max_branch_length: f64,

    #[arg(long = "minSegments", default_value_t = 2)]
    min_segments: usize,

    #[arg(long = "maxSegments", default_value_t = 10)]
    max_segments: usize,

    #[arg(long = "minSegmentLength", default_value_t = 2)]
    min_segment_length: u64,

    #[arg(long = "maxSegmentLength", default_value_t = 20)]
    max_segment_length: u64,

    #[arg(long = "seed", default_value_t = 0)]
    seed: u64,

    /// Write the memory-mapped container instead of the chunked one
    #[arg(long = "mmap")]
    mmap: bool,
}

fn run(cli: Cli) -> Result<()> {
    let backend = if cli.mmap {
        BackendKind::Mmap
    } else {
        BackendKind::Chunked
    };
    let mut aln = Alignment::create(&cli.hal_file, backend)
        .with_context(|| format!("creating {}", cli.hal_file.display()))?;
    let opts = RandGenOptions {
        max_genomes: cli.num_genomes,
        mean_degree: cli.mean_degree,
        max_branch_length: cli.max_branch_length,
        min_segments: cli.min_segments,
        max_segments: cli.max_segments,
        min_segment_length: cli.min_segment_length,
        max_segment_length: cli.max_segment_length,
        seed: cli.seed,
        ..Default::default()
    };
    create_random_alignment(&mut aln, &opts)?;
    validate(&aln)?;
    info!(
        "generated {} genomes, tree {}",
        aln.num_genomes(),
        aln.newick()
    );
    aln.close()?;
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("halrandgen: {err:#}");
        std::process::exit(1);
    }
}
