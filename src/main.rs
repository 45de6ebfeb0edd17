use std::collections::HashSet;
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use halign::alignment::Alignment;
use halign::liftover::{liftover_bed, open_bed_input};
use halign::mapped_segment::MapOptions;
use halign::paf_export::{export_paf, PafOptions};
use halign::stats::{genome_table, sampled_coverage, sampled_identity};
use halign::storage::AccessMode;
use halign::tree::GenomeId;
use halign::validate::validate;

/// Wall/CPU timing reported at exit when logging is on.
struct TimingContext {
    start_time: Instant,
    start_cpu: f64,
}

impl TimingContext {
    fn new() -> Self {
        Self {
            start_time: Instant::now(),
            start_cpu: Self::cpu_time(),
        }
    }

    /// Current user+system CPU time in seconds.
    fn cpu_time() -> f64 {
        unsafe {
            let mut usage: libc::rusage = std::mem::zeroed();
            libc::getrusage(libc::RUSAGE_SELF, &mut usage);
            let user = usage.ru_utime.tv_sec as f64 + usage.ru_utime.tv_usec as f64 / 1_000_000.0;
            let system = usage.ru_stime.tv_sec as f64 + usage.ru_stime.tv_usec as f64 / 1_000_000.0;
            user + system
        }
    }

    fn report(&self, phase: &str) {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        let cpu = Self::cpu_time() - self.start_cpu;
        info!("{phase}: {elapsed:.3}s wall, {cpu:.3}s cpu");
    }
}

#[derive(Parser)]
#[command(name = "halign", version, about = "Query hierarchical whole-genome alignments")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Page-cache budget hint for the storage backend, in bytes
    #[arg(long = "cacheBytes", global = true)]
    cache_bytes: Option<u64>,

    /// Load the whole file into memory up front
    #[arg(long = "inMemory", global = true)]
    in_memory: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Print the genome table, tree and metadata of an alignment
    Stats {
        hal_file: PathBuf,
        /// Restrict the table to the subtree under this genome
        #[arg(long = "root")]
        root: Option<String>,
        /// Print sequence names only
        #[arg(long = "onlySequenceNames")]
        only_sequence_names: bool,
        /// Sampled coverage/identity of refGenome against each leaf
        #[arg(long = "refGenome")]
        ref_genome: Option<String>,
        /// Number of sampled positions for coverage and identity
        #[arg(long = "numSamples", default_value_t = 1000)]
        num_samples: u64,
        #[arg(long = "seed", default_value_t = 0)]
        seed: u64,
    },
    /// Check every structural invariant of an alignment
    Validate { hal_file: PathBuf },
    /// Lift BED intervals from one genome to another
    Liftover {
        hal_file: PathBuf,
        src_genome: String,
        input_bed: PathBuf,
        tgt_genome: String,
        /// Output BED; stdout when omitted
        #[arg(long = "outBed")]
        out_bed: Option<PathBuf>,
        /// Suppress paralogy expansion
        #[arg(long = "noDupes")]
        no_dupes: bool,
        /// Report paralogs coalescing at or below this ancestor
        #[arg(long = "coalescenceLimit")]
        coalescence_limit: Option<String>,
        /// Drop mappings shorter than this
        #[arg(long = "minLength", default_value_t = 0)]
        min_length: u64,
    },
    /// Export alignment blocks as PAF anchored at a reference genome
    Paf {
        hal_file: PathBuf,
        #[arg(long = "refGenome")]
        ref_genome: String,
        /// Comma-separated targets; all leaves when omitted
        #[arg(long = "targetGenomes")]
        target_genomes: Option<String>,
        /// Anchor on this genome's subtree only
        #[arg(long = "rootGenome")]
        root_genome: Option<String>,
        /// Include duplications
        #[arg(long = "dupes")]
        dupes: bool,
        /// Largest gap bridged within one record
        #[arg(long = "maxGap", default_value_t = 100)]
        max_gap: u64,
    },
}

fn open(path: &PathBuf) -> Result<Alignment> {
    Alignment::open(path, AccessMode::ReadOnly)
        .with_context(|| format!("opening {}", path.display()))
}

fn subtree_ids(aln: &Alignment, root: GenomeId) -> Vec<GenomeId> {
    let mut ids = vec![root];
    let mut i = 0;
    while i < ids.len() {
        ids.extend_from_slice(aln.tree().children(ids[i]));
        i += 1;
    }
    ids
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Stats {
            hal_file,
            root,
            only_sequence_names,
            ref_genome,
            num_samples,
            seed,
        } => {
            let aln = open(&hal_file)?;
            let scope: Vec<GenomeId> = match &root {
                Some(name) => subtree_ids(&aln, aln.genome_id(name)?),
                None => aln.tree().ids().collect(),
            };
            let in_scope: HashSet<GenomeId> = scope.iter().copied().collect();

            if only_sequence_names {
                for &id in &scope {
                    for seq in aln.genome(id).sequences() {
                        println!("{}", seq.name);
                    }
                }
                return Ok(());
            }

            println!("hal v{}", halign::alignment::FORMAT_VERSION);
            println!("{}", aln.newick());
            println!();
            println!("GenomeName, NumChildren, Length, NumSequences, NumTopSegments, NumBottomSegments");
            for row in genome_table(&aln) {
                if in_scope.contains(&aln.genome_id(&row.name)?) {
                    println!("{row}");
                }
            }

            if let Some(ref_name) = ref_genome {
                let ref_id = aln.genome_id(&ref_name)?;
                println!();
                println!("Genome, Coverage({ref_name}), Identity({ref_name})");
                for &id in &scope {
                    if id == ref_id || !aln.tree().is_leaf(id) {
                        continue;
                    }
                    let cov = sampled_coverage(&aln, ref_id, id, num_samples, seed)?;
                    let ident = sampled_identity(&aln, ref_id, id, num_samples, seed)?;
                    println!(
                        "{}, {:.4}, {}",
                        aln.genome(id).name(),
                        cov,
                        ident.map_or("n/a".to_string(), |i| format!("{i:.4}"))
                    );
                }
            }
            Ok(())
        }
        Command::Validate { hal_file } => {
            let aln = open(&hal_file)?;
            validate(&aln)?;
            println!("File valid");
            Ok(())
        }
        Command::Liftover {
            hal_file,
            src_genome,
            input_bed,
            tgt_genome,
            out_bed,
            no_dupes,
            coalescence_limit,
            min_length,
        } => {
            let aln = open(&hal_file)?;
            let src = aln.genome_id(&src_genome)?;
            let tgt = aln.genome_id(&tgt_genome)?;
            let opts = MapOptions {
                do_dupes: !no_dupes,
                min_length,
                coalescence_limit: coalescence_limit
                    .map(|name| aln.genome_id(&name))
                    .transpose()?,
                mrca: None,
            };
            let input = open_bed_input(&input_bed)?;
            let lifted = match out_bed {
                Some(path) => {
                    let mut out = std::fs::File::create(&path)
                        .with_context(|| format!("creating {}", path.display()))?;
                    liftover_bed(&aln, src, tgt, input, &mut out, &opts)?
                }
                None => {
                    let stdout = std::io::stdout();
                    let mut out = stdout.lock();
                    let n = liftover_bed(&aln, src, tgt, input, &mut out, &opts)?;
                    out.flush()?;
                    n
                }
            };
            info!("lifted {lifted} intervals from {src_genome} to {tgt_genome}");
            Ok(())
        }
        Command::Paf {
            hal_file,
            ref_genome,
            target_genomes,
            root_genome,
            dupes,
            max_gap,
        } => {
            let aln = open(&hal_file)?;
            let ref_id = aln.genome_id(&ref_genome)?;
            let scope: HashSet<GenomeId> = match &root_genome {
                Some(name) => subtree_ids(&aln, aln.genome_id(name)?).into_iter().collect(),
                None => aln.tree().ids().collect(),
            };
            let targets: Vec<GenomeId> = match target_genomes {
                Some(list) => list
                    .split(',')
                    .map(|name| aln.genome_id(name.trim()))
                    .collect::<halign::error::Result<_>>()?,
                None => aln
                    .tree()
                    .ids()
                    .filter(|&id| aln.tree().is_leaf(id) && scope.contains(&id))
                    .collect(),
            };
            if targets.is_empty() {
                bail!("no target genomes to export");
            }
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            let opts = PafOptions {
                do_dupes: dupes,
                max_gap,
                min_length: 0,
            };
            let written = export_paf(&aln, ref_id, &targets, &mut out, &opts)?;
            out.flush()?;
            info!("wrote {written} PAF records");
            Ok(())
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    if let Some(bytes) = cli.cache_bytes {
        info!("cacheBytes={bytes} (advisory; arrays are fully resident)");
    }
    if cli.in_memory {
        info!("inMemory set (arrays are always fully resident)");
    }
    let timing = TimingContext::new();
    let result = run(cli);
    timing.report("total");
    if let Err(err) = result {
        eprintln!("halign: {err:#}");
        std::process::exit(1);
    }
}
