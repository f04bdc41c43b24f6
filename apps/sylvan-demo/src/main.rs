//! Sylvan paging demo
//!
//! Flies a camera over procedural terrain while one active manager pages
//! terrain tiles and two reactive managers plant grass and trees on them.
//! Nothing is rendered; paging statistics are logged instead.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p sylvan-demo -- [OPTIONS]
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod flythrough;
mod params;

use tracing_subscriber::EnvFilter;

use crate::flythrough::Flythrough;
use crate::params::DemoParams;

fn main() -> anyhow::Result<()> {
    // Check for help flag before doing any work
    if std::env::args().any(|arg| arg == "-h" || arg == "--help") {
        print_help();
        return Ok(());
    }

    init_logging();

    let params = DemoParams::from_args();
    params.validate()?;
    tracing::info!("Sylvan demo: {params:?}");

    let mut flythrough = Flythrough::new(&params)?;
    flythrough.run(&params);
    Ok(())
}

fn init_logging() {
    #[cfg(feature = "profiling-tracy")]
    let default_filter = "info,sylvan_paging=trace,sylvan_vegetation=trace,sylvan_demo=trace";
    #[cfg(not(feature = "profiling-tracy"))]
    let default_filter = "info";

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();
}

fn print_help() {
    eprintln!(
        "Sylvan headless paging fly-through

USAGE:
    cargo run -p sylvan-demo -- [OPTIONS]

WORLD OPTIONS:
    --seed <N>              Terrain and density seed (default: 42)
    --radius <N>            Terrain pages on each side of the camera (default: 3)
    --cache-time <SECS>     Keep evicted pages reusable this long (default: off)
    --archive <DIR>         Persist generated grass and tree pages under DIR

FLIGHT OPTIONS:
    --frames <N>            Frames to simulate (default: 1800)
    --speed <UNITS>         Camera speed in units per second (default: 40)
    --teleport-at <FRAME>   Jump across the map at this frame (default: frames / 2)
    --log-every <N>         Log statistics every N frames (default: 120)

EXECUTOR OPTIONS:
    --threads <N>           Worker threads, 0 for one per core (default: 0)
    --inline                Generate pages on the main thread

OTHER:
    -h, --help              Print this help message

EXAMPLES:
    # Default flight
    cargo run -p sylvan-demo

    # Short deterministic run with a page archive
    cargo run -p sylvan-demo -- --inline --frames 300 --archive target/pages

ENVIRONMENT VARIABLES:
    RUST_LOG                Set log level (e.g., info, debug, trace)"
    );
}
