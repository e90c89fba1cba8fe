use clap::Parser;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

use semispace_example::{Machine, Scenario, ScenarioConfig};
use semispace_gc::{assert_no_live_frames, HeapOptionsBuilder, DEFAULT_HEAP_SIZE};

/// Raw command line arguments.
#[derive(Parser)]
#[command(about)]
pub struct Args {
    /// The heap size in bytes, covering both semispaces.
    #[arg(long)]
    pub heap_size: Option<usize>,

    /// Run a full collection before every allocation
    #[arg(long, default_value_t = cfg!(feature = "gc_stress_test"))]
    pub stress: bool,

    /// Fill the abandoned semispace with garbage after every collection
    #[arg(long, default_value_t = cfg!(feature = "gc_stress_test"))]
    pub poison: bool,

    /// Log every collection. RUST_LOG overrides this.
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Scenarios to run, in order. Runs all of them if none are given.
    #[arg(long, value_enum)]
    pub scenario: Vec<Scenario>,

    /// Amount of work done by the list and churn scenarios
    #[arg(long, default_value_t = 1000)]
    pub iterations: usize,

    /// Seed for the churn scenario
    #[arg(long, default_value_t = 0)]
    pub seed: u64,
}

/// Create heap options from command line arguments.
fn options_from_args(args: &Args) -> HeapOptionsBuilder {
    HeapOptionsBuilder::new()
        .heap_size(args.heap_size.unwrap_or(DEFAULT_HEAP_SIZE))
        .gc_stress_test(args.stress)
        .poison_from_space(args.poison)
}

fn init_logging(verbose: bool) {
    let default_level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };

    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

pub fn print_error_message_and_exit(message: &str) -> ! {
    eprintln!("{message}");
    std::process::exit(1);
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    let options = options_from_args(&args).build();
    let config = ScenarioConfig {
        iterations: args.iterations,
        seed: args.seed,
    };

    let scenarios = if args.scenario.is_empty() {
        Scenario::ALL.to_vec()
    } else {
        args.scenario.clone()
    };

    // Every scenario gets a fresh heap so that their statistics stay separate
    for scenario in scenarios {
        let mut machine = match Machine::new(options.clone()) {
            Ok(machine) => machine,
            Err(err) => print_error_message_and_exit(&err.to_string()),
        };

        match scenario.run(&mut machine, &config) {
            Ok(report) => println!("{report}"),
            Err(err) => print_error_message_and_exit(&format!("{scenario} failed: {err}")),
        }
    }

    #[cfg(feature = "handle_stats")]
    println!("{:?}", semispace_gc::handle_stats());

    assert_no_live_frames();
}
