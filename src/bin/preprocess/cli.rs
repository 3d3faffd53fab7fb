/// Command line interface for `preprocess` executable
#[derive(clap::Parser, Debug, Clone)]
#[clap(
    name = "preprocess",
    about = "Flat-field correct the sinograms of a tomographic acquisition",
)]
pub (super) struct Cli {
    /// HDF5 file with projections and flat/dark reference groups
    pub input: PathBuf,

    /// HDF5 output file for corrected sinograms
    pub output: PathBuf,

    /// TOML run configuration. Built-in defaults when absent
    #[clap(short, long)]
    pub config: Option<PathBuf>,

    /// Sinograms to process, e.g. `100..200`, `100..` or `..`
    #[clap(short, long, value_parser = parse_bounds::<usize>, default_value = "..")]
    pub sinograms: BoundPair<usize>,

    /// Directory where correction plans are kept between runs
    #[clap(long)]
    pub cache: Option<PathBuf>,

    /// Append flat/dark status lines to this file
    #[clap(short, long)]
    pub log: Option<PathBuf>,

    /// Maximum number of rayon threads. Overrides the configuration file
    #[clap(short = 'j', long)]
    pub threads: Option<usize>,

    /// Log level when `RUST_LOG` is not set
    #[clap(long, default_value = "info")]
    pub verbosity: String,
}

// ----- Imports -----------------------------------------------------------------------------------------
use std::path::PathBuf;
use tomoprep::utils::{parse_bounds, BoundPair};
