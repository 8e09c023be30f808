use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use distsim::{
    apss::Strategy,
    codec::delta::DeltaColumns,
    jobs::{AllPairsConfig, ConvertConfig, CountConfig, SortConfig},
    record::{Format, Layout},
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Distributional similarity: counting, sorting and all-pairs search", long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Only report errors
    #[arg(short = 'q', long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Count entries, features and events in a file of `entry feature` instances
    Count(CountArgs),
    /// Score all pairs of entries in an events file
    Allpairs(AllPairsArgs),
    /// Sort a weighted file by key, summing repeated keys
    Sort(SortArgs),
    /// Re-encode a weighted file
    Convert(ConvertArgs),
}

/// Options shared by every job.
#[derive(Args, Debug)]
struct Common {
    /// Enumerator table for entries, loaded if present and saved after the run
    #[arg(long, value_name = "PATH")]
    entries_index: Option<PathBuf>,

    /// Enumerator table for features
    #[arg(long, value_name = "PATH")]
    features_index: Option<PathBuf>,

    /// Entries and features share one enumerator
    #[arg(long)]
    combined: bool,

    /// Directory for intermediate files
    #[arg(long, value_name = "DIR")]
    temp_dir: Option<PathBuf>,

    /// Leave intermediate files behind
    #[arg(long)]
    keep_temporary: bool,

    /// Character set of every file
    #[arg(long, default_value = "UTF-8")]
    charset: String,
}

/// How a file is encoded on disk.
#[derive(Args, Debug, Clone, Copy)]
struct FormatArgs {
    /// Entry and feature columns hold ids
    #[arg(long)]
    enumerated: bool,

    /// Entry columns hold ids
    #[arg(long)]
    enumerated_entries: bool,

    /// Feature columns hold ids
    #[arg(long)]
    enumerated_features: bool,

    /// One line per key, holding all of its records
    #[arg(long)]
    compact: bool,

    /// Delta encode the leading id column
    #[arg(long)]
    delta_leading: bool,

    /// Delta encode the trailing id columns
    #[arg(long)]
    delta_trailing: bool,
}

impl From<FormatArgs> for Format {
    fn from(a: FormatArgs) -> Self {
        Format {
            enumerated_entries: a.enumerated || a.enumerated_entries,
            enumerated_features: a.enumerated || a.enumerated_features,
            compact: a.compact,
            delta: DeltaColumns::new(a.delta_leading, a.delta_trailing),
        }
    }
}

/// Chunking and parallelism of the external pipeline.
#[derive(Args, Debug)]
struct Pipeline {
    /// Records per sorted chunk
    #[arg(long, value_name = "N")]
    chunk_size: Option<usize>,

    /// Worker threads
    #[arg(long, value_name = "N")]
    threads: Option<usize>,

    /// Abort on the first malformed record instead of skipping it
    #[arg(long)]
    strict: bool,
}

#[derive(Args, Debug)]
struct CountArgs {
    /// Instances file
    input: PathBuf,
    /// Entries output
    entries: PathBuf,
    /// Features output
    features: PathBuf,
    /// Events output
    events: PathBuf,

    #[command(flatten)]
    format: FormatArgs,
    #[command(flatten)]
    pipeline: Pipeline,
    #[command(flatten)]
    common: Common,
}

#[derive(Args, Debug)]
struct AllPairsArgs {
    /// Events file, sorted by entry
    input: PathBuf,
    /// Similarities output
    output: PathBuf,

    /// Second events file, compared against the first
    #[arg(long, value_name = "PATH")]
    input_b: Option<PathBuf>,

    /// Features file, needed by weightings that use feature marginals
    #[arg(long, value_name = "PATH")]
    features: Option<PathBuf>,

    /// Similarity measure (cosine, jaccard, dice, lin, precision, recall)
    #[arg(short, long, default_value = "lin")]
    measure: String,

    /// Swap the operands of the measure
    #[arg(long)]
    reversed: bool,

    /// Feature weighting (null, positive, logproduct, geomean, pmi)
    #[arg(short, long, default_value = "null")]
    weighting: String,

    /// Lowest score written
    #[arg(long, value_name = "SCORE", allow_negative_numbers = true)]
    min_similarity: Option<f64>,

    /// Highest score written
    #[arg(long, value_name = "SCORE", allow_negative_numbers = true)]
    max_similarity: Option<f64>,

    /// Also write each entry's similarity with itself
    #[arg(long)]
    identity: bool,

    /// Search strategy: naive or inverted
    #[arg(long, default_value = "inverted")]
    algorithm: Strategy,

    /// Entries of the first input scored per task
    #[arg(long, value_name = "N")]
    chunk_size: Option<usize>,

    /// Worker threads
    #[arg(long, value_name = "N")]
    threads: Option<usize>,

    #[command(flatten)]
    format: FormatArgs,
    #[command(flatten)]
    common: Common,
}

#[derive(Args, Debug)]
struct SortArgs {
    /// File to sort
    input: PathBuf,
    /// Sorted output
    output: PathBuf,

    /// entries, features or events
    #[arg(short, long, default_value = "events")]
    layout: Layout,

    #[command(flatten)]
    format: FormatArgs,
    #[command(flatten)]
    pipeline: Pipeline,
    #[command(flatten)]
    common: Common,
}

#[derive(Args, Debug)]
struct ConvertArgs {
    input: PathBuf,
    output: PathBuf,

    /// instances, entries, features, events or similarities
    #[arg(short, long, default_value = "events")]
    layout: Layout,

    /// Encoding of the input
    #[command(flatten)]
    from: FromFormat,

    /// Encoding of the output
    #[command(flatten)]
    to: FormatArgs,

    /// Skip malformed records instead of aborting
    #[arg(long)]
    skip_malformed: bool,

    #[command(flatten)]
    common: Common,
}

/// Input encoding of `convert`; the output uses the plain format flags.
#[derive(Args, Debug, Clone, Copy)]
struct FromFormat {
    #[arg(long)]
    from_enumerated: bool,
    #[arg(long)]
    from_enumerated_entries: bool,
    #[arg(long)]
    from_enumerated_features: bool,
    #[arg(long)]
    from_compact: bool,
    #[arg(long)]
    from_delta_leading: bool,
    #[arg(long)]
    from_delta_trailing: bool,
}

impl From<FromFormat> for Format {
    fn from(a: FromFormat) -> Self {
        FormatArgs {
            enumerated: a.from_enumerated,
            enumerated_entries: a.from_enumerated_entries,
            enumerated_features: a.from_enumerated_features,
            compact: a.from_compact,
            delta_leading: a.from_delta_leading,
            delta_trailing: a.from_delta_trailing,
        }
        .into()
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    let default = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);
    match cli.command {
        Commands::Count(args) => count(args),
        Commands::Allpairs(args) => allpairs(args),
        Commands::Sort(args) => sort(args),
        Commands::Convert(args) => convert(args),
    }
}

fn count(args: CountArgs) -> Result<()> {
    let mut c = CountConfig::new(args.input, args.entries, args.features, args.events);
    c.format = args.format.into();
    apply_pipeline(&args.pipeline, &mut c.chunk_size, &mut c.threads, &mut c.skip_malformed);
    c.entries_index = args.common.entries_index;
    c.features_index = args.common.features_index;
    c.combined = args.common.combined;
    c.keep_temporary = args.common.keep_temporary;
    c.charset = args.common.charset;
    if let Some(dir) = args.common.temp_dir {
        c.temp_dir = dir;
    }
    let stats = c.run().context("count failed")?;
    tracing::info!(
        instances = stats.instances,
        skipped = stats.skipped,
        entries = stats.entries,
        features = stats.features,
        events = stats.events,
        "count finished"
    );
    Ok(())
}

fn allpairs(args: AllPairsArgs) -> Result<()> {
    let mut c = AllPairsConfig::new(args.input, args.output);
    c.input_b = args.input_b;
    c.features = args.features;
    c.format = args.format.into();
    c.measure = args.measure;
    c.measure_reversed = args.reversed;
    c.weighting = args.weighting;
    if let Some(min) = args.min_similarity {
        c.min_similarity = min;
    }
    if let Some(max) = args.max_similarity {
        c.max_similarity = max;
    }
    c.include_identity = args.identity;
    c.algorithm = args.algorithm;
    if let Some(n) = args.chunk_size {
        c.chunk_size = n;
    }
    if let Some(n) = args.threads {
        c.threads = n;
    }
    c.entries_index = args.common.entries_index;
    c.features_index = args.common.features_index;
    c.combined = args.common.combined;
    c.keep_temporary = args.common.keep_temporary;
    c.charset = args.common.charset;
    if let Some(dir) = args.common.temp_dir {
        c.temp_dir = dir;
    }
    let stats = c.run().context("all-pairs search failed")?;
    tracing::info!(chunks = stats.chunks, entries = stats.entries, pairs = stats.pairs, "all-pairs finished");
    Ok(())
}

fn sort(args: SortArgs) -> Result<()> {
    let mut c = SortConfig::new(args.input, args.output, args.layout);
    c.format = args.format.into();
    apply_pipeline(&args.pipeline, &mut c.chunk_size, &mut c.threads, &mut c.skip_malformed);
    c.entries_index = args.common.entries_index;
    c.features_index = args.common.features_index;
    c.combined = args.common.combined;
    c.keep_temporary = args.common.keep_temporary;
    c.charset = args.common.charset;
    if let Some(dir) = args.common.temp_dir {
        c.temp_dir = dir;
    }
    let stats = c.run().context("sort failed")?;
    tracing::info!(chunks = stats.chunks, records = stats.records, skipped = stats.skipped, "sort finished");
    Ok(())
}

fn convert(args: ConvertArgs) -> Result<()> {
    let mut c = ConvertConfig::new(args.input, args.output, args.layout);
    c.from = args.from.into();
    c.to = args.to.into();
    c.skip_malformed = args.skip_malformed;
    c.entries_index = args.common.entries_index;
    c.features_index = args.common.features_index;
    c.combined = args.common.combined;
    c.keep_temporary = args.common.keep_temporary;
    c.charset = args.common.charset;
    if let Some(dir) = args.common.temp_dir {
        c.temp_dir = dir;
    }
    let n = c.run().context("convert failed")?;
    tracing::info!(records = n, "convert finished");
    Ok(())
}

fn apply_pipeline(p: &Pipeline, chunk_size: &mut usize, threads: &mut usize, skip_malformed: &mut bool) {
    if let Some(n) = p.chunk_size {
        *chunk_size = n;
    }
    if let Some(n) = p.threads {
        *threads = n;
    }
    *skip_malformed = !p.strict;
}
