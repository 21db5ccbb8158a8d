//! The command line interface of the unitigger crate.
//! It reads fragments and overlaps from a text file, builds unitigs and writes them as text.

#![warn(missing_docs)]

#[macro_use]
extern crate log;

use clap::Parser;
use libunitigger::io::{open_input, read_graph, write_blessed_overlaps, write_chunks};
use libunitigger::{
    initialise_logging, log_memory_usage, EdgeSortStrategy, SlopTolerance, Unitigger,
    UnitiggerConfiguration,
};
use simplelog::LevelFilter;
use std::fs::File;
use std::io::{BufWriter, Write};

/// The command line parser.
#[derive(Parser)]
#[clap(
    version = env!("CARGO_PKG_VERSION"),
    author = "Sebastian Schmidt <sebastian.schmidt@helsinki.fi>",
    about = "Unitigger: lays out fragments into unitigs using their overlap graph.",
)]
pub struct Cli {
    /// Text file containing FRG, DEL and OVL records, optionally gzipped.
    #[clap(long)]
    input: String,

    /// Write the unitigs to this file instead of standard output.
    #[clap(long)]
    output: Option<String>,

    /// Write the overlaps blessed by unique unitigs to this file.
    #[clap(long)]
    blessed_overlaps_out: Option<String>,

    /// Write the final fragment and overlap label counts to this file.
    #[clap(long)]
    label_report_out: Option<String>,

    /// The number of threads used for transitive edge reduction.
    #[clap(short, long, default_value = "1")]
    threads: usize,

    /// The maximum number of edges in a path proving an overlap to be transitively inferable.
    #[clap(long, default_value = "100")]
    walk_depth: usize,

    /// The maximum number of edges explored per candidate overlap.
    #[clap(long, default_value = "1000")]
    work_limit: usize,

    /// The genome length in base pairs.
    /// If not given, the fragment arrival rate is estimated from the unitigs.
    #[clap(long)]
    genome_length: Option<u64>,

    /// Recalibrate the estimated fragment arrival rate from the local rates of long unitigs.
    #[clap(long)]
    recalibrate: bool,

    /// Do not remove transitively inferable overlaps.
    #[clap(long)]
    no_dechord: bool,

    /// Do not ignore hanging fragments competing with thru fragments.
    #[clap(long)]
    no_aggressive_spurs: bool,

    /// Unitigs with an A-statistic of at least this value are unique.
    #[clap(long, default_value = "5.0")]
    unique_cutoff: f32,

    /// Keep at most this many dovetail and containment overlaps per fragment-end.
    #[clap(long, default_value = "1000000")]
    degree_cutoff: usize,

    /// Ignore overlaps with a quality value above this.
    #[clap(long)]
    max_overlap_error: Option<u32>,

    /// Constant slop in base pairs when comparing overlap paths.
    #[clap(long, default_value = "20")]
    slop_alpha: i64,

    /// Slop per base pair of overlap when comparing overlap paths, times 256.
    #[clap(long, default_value = "17")]
    slop_epsilon_256: i64,

    /// How the edge array is sorted.
    #[clap(long, default_value = "InPlaceCyclePermutation")]
    edge_sort_strategy: EdgeSortStrategy,

    /// Apply transitive reduction results and pack the edges after every block of this many fragments.
    #[clap(long)]
    transitive_block_size: Option<usize>,

    /// The number of fragments to reserve memory for.
    #[clap(long, default_value = "40000")]
    expected_fragments: usize,

    /// The number of directed edges to reserve memory for.
    #[clap(long, default_value = "40000")]
    expected_edges: usize,

    /// The log level.
    #[clap(long, default_value = "Info")]
    log_level: LevelFilter,
}

impl Cli {
    fn configuration(&self) -> UnitiggerConfiguration {
        UnitiggerConfiguration {
            threads: self.threads,
            walk_depth: self.walk_depth,
            work_limit_per_candidate_edge: self.work_limit,
            slop: SlopTolerance {
                alpha: self.slop_alpha,
                epsilon_256: self.slop_epsilon_256,
            },
            dechord_the_graph: !self.no_dechord,
            aggressive_spur_fragment_marking: !self.no_aggressive_spurs,
            cutoff_fragment_end_degree: self.degree_cutoff,
            overlap_error_threshold: self.max_overlap_error,
            nbase_in_genome: self.genome_length.unwrap_or(0),
            recalibrate_global_arrival_rate: self.recalibrate,
            cgb_unique_cutoff: self.unique_cutoff,
            edge_sort_strategy: self.edge_sort_strategy,
            expected_fragments: self.expected_fragments,
            expected_edges: self.expected_edges,
            transitive_block_size: self.transitive_block_size,
        }
    }
}

fn create_output(path: &str) -> libunitigger::Result<BufWriter<File>> {
    info!("Writing {path:?}");
    Ok(BufWriter::new(File::create(path)?))
}

fn run(opts: &Cli) -> libunitigger::Result<()> {
    let configuration = opts.configuration();

    info!("Reading fragments and overlaps from {:?}", opts.input);
    let (mut graph, _) = read_graph(open_input(&opts.input)?, &configuration)?;
    log_memory_usage("reading the input");

    let output = Unitigger::new(configuration).run(&mut graph)?;
    if !output.occurrences.is_clean() {
        warn!("Unitig quality control: {}", output.occurrences);
    }

    if let Some(path) = &opts.output {
        let mut writer = create_output(path)?;
        write_chunks(&mut writer, &graph, &output.chunks)?;
        writer.flush()?;
    } else {
        let stdout = std::io::stdout();
        let mut writer = BufWriter::new(stdout.lock());
        write_chunks(&mut writer, &graph, &output.chunks)?;
        writer.flush()?;
    }

    if let Some(path) = &opts.blessed_overlaps_out {
        let mut writer = create_output(path)?;
        let written = write_blessed_overlaps(&mut writer, &graph)?;
        writer.flush()?;
        info!("Wrote {written} blessed overlaps");
    }

    if let Some(path) = &opts.label_report_out {
        let mut writer = create_output(path)?;
        write!(writer, "{}", output.labels)?;
        writer.flush()?;
    }

    Ok(())
}

fn main() {
    let opts = Cli::parse();
    initialise_logging(opts.log_level);

    if let Err(error) = run(&opts) {
        error!("{error}");
        std::process::exit(1);
    }
    info!("Done");
}
