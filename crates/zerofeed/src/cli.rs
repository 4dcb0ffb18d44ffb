//! Command-line interface.

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "zerofeed",
    version,
    about = "Incrementally convert a Python package index into signed Zero Install feeds"
)]
pub struct Cli {
    /// Number of concurrent feed workers [default: 2 x CPU count]
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub workers: Option<u32>,

    /// PyPI mirror to download release artifacts from
    #[arg(long, value_name = "URL")]
    pub pypi_mirror: Option<String>,

    /// Increase stderr verbosity (-v: errors and lifecycle, -vv: everything)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Base URI under which the generated files will be hosted
    #[arg(long, default_value = "https://zerofeed.github.io")]
    pub base_uri: String,

    /// XML-RPC endpoint of the upstream index
    #[arg(long, default_value = "https://pypi.org/pypi")]
    pub pypi_uri: String,

    /// Directory the feeds and their logs are written to
    #[arg(long, default_value = "feeds")]
    pub feeds_dir: PathBuf,

    /// Durable state file
    #[arg(long, default_value = "state.json")]
    pub state_file: PathBuf,
}

impl Cli {
    /// The effective worker count: the flag, or twice the CPU count.
    pub fn worker_count(&self) -> usize {
        match self.workers {
            Some(workers) => workers as usize,
            None => {
                2 * std::thread::available_parallelism()
                    .map(std::num::NonZeroUsize::get)
                    .unwrap_or(1)
            }
        }
    }
}
