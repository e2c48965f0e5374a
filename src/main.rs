// ========================================================================================
//
//                        THE LDSCAN ORCHESTRATOR
//
// ========================================================================================
//
// The thin conductor of the application. Its responsibilities end at parsing
// arguments, freezing them into the immutable `EngineConfig`, opening the
// record source, and dispatching into the pipeline. Configuration-class
// failures end the process with a non-zero exit before a single byte of data
// output is produced; diagnostics go to stderr and never into the report
// stream.

use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process;
use std::time::Instant;

use clap::Parser;

use ldscan::pipeline;
use ldscan::source::RecordSource;
use ldscan::types::{EngineConfig, Mode, Region};

#[derive(Parser, Debug)]
#[clap(
    name = "ldscan",
    version,
    about = "Pairwise linkage-disequilibrium (r^2) calculation over a variant table."
)]
struct Args {
    /// Input variant table. Reads standard input when omitted.
    input: Option<PathBuf>,

    /// Restrict the computation to chrom:start-end (inclusive bounds).
    #[clap(long)]
    region: Option<String>,

    /// Sliding-window capacity in variants (streaming mode).
    #[clap(long, default_value_t = 1000, value_parser = clap::value_parser!(u64).range(1..))]
    window_size: u64,

    /// Only report pairs with r^2 at or above this value. Values outside
    /// [0, 1] are clamped.
    #[clap(long, default_value_t = 0.0)]
    min_r2: f64,

    /// Skip pairs farther apart than this on the same chromosome. 0 means
    /// unlimited.
    #[clap(long, default_value_t = 0)]
    max_distance: u64,

    /// Worker threads for matrix row computation. 0 auto-detects.
    #[clap(long, default_value_t = 0)]
    threads: usize,

    /// Pair-enumeration strategy.
    #[clap(long, value_enum, default_value_t = Mode::Streaming)]
    mode: Mode,

    /// Suppress per-record warnings on stderr.
    #[clap(long, short)]
    quiet: bool,
}

fn main() {
    let start_time = Instant::now();
    let args = Args::parse();

    // Quiet mode narrows the stderr stream to hard errors; it never touches
    // the data stream on stdout.
    let default_filter = if args.quiet { "error" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();

    let region = match args.region.as_deref().map(Region::parse).transpose() {
        Ok(region) => region,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    let config = EngineConfig::new(
        region,
        args.window_size as usize,
        args.min_r2,
        args.max_distance,
        args.threads,
        args.mode,
        args.quiet,
    );

    let mut source = match &args.input {
        Some(path) => match RecordSource::open_path(path) {
            Ok(source) => source,
            Err(e) => {
                eprintln!("Error: {e}");
                process::exit(1);
            }
        },
        None => RecordSource::from_stdin(),
    };

    let stdout = io::stdout();
    let sink = BufWriter::new(stdout.lock());
    if let Err(e) = pipeline::run(&config, &mut source, sink) {
        eprintln!("Error: {e}");
        process::exit(1);
    }

    if !config.quiet {
        let mut stderr = io::stderr();
        // Timing is informational; ignore a closed stderr.
        let _ = writeln!(stderr, "ldscan finished in {:.2?}", start_time.elapsed());
    }
}
