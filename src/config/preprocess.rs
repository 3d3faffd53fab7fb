//! Configuration file parser for sinogram preprocessing

use std::fmt;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::dff::AirWindows;
use crate::volume::AxisOrder;

#[derive(Deserialize, Debug, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {

    /// Physical layout of every volume in the input file
    #[serde(default)]
    pub axis_order: AxisOrder,

    /// Look for flat (and dark) fields acquired after the projections
    #[serde(default)]
    pub flat_end: bool,

    /// Worker threads; all available cores when absent
    pub threads: Option<usize>,

    /// Sinograms processed between two progress reports
    #[serde(default = "default_batch")]
    pub batch: usize,

    /// Dynamic (eigen) flat fielding. Conventional flat fielding when absent.
    pub dynamic: Option<Dynamic>,

    /// Air columns used for per-row normalization
    #[serde(default)]
    pub air: AirWindows,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Dynamic {
    /// Synthetic data sets drawn during parallel analysis
    #[serde(default = "default_repetitions")]
    pub repetitions: usize,

    /// Decimation applied before estimating the eigen flat-field weights
    #[serde(default = "default_downsample")]
    pub downsample: usize,

    /// Seed of the parallel analysis random stream
    #[serde(default)]
    pub seed: u64,
}

impl Default for Dynamic {
    fn default() -> Self {
        Self {
            repetitions: default_repetitions(),
            downsample : default_downsample(),
            seed: 0,
        }
    }
}

fn default_batch      () -> usize { 64 }
fn default_repetitions() -> usize { 10 }
fn default_downsample () -> usize {  2 }

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Toml(toml::de::Error),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e)        => write!(f, "couldn't read config file: {e}"),
            ConfigError::Toml(e)      => write!(f, "malformed config file: {e}"),
            ConfigError::Invalid(why) => write!(f, "invalid configuration: {why}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error>  for ConfigError { fn from(e: std::io::Error ) -> Self { Self::Io  (e) } }
impl From<toml::de::Error> for ConfigError { fn from(e: toml::de::Error) -> Self { Self::Toml(e) } }

impl Config {
    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.batch == 0 {
            return Err(ConfigError::Invalid("`batch` must be at least 1".into()))
        }
        if self.threads == Some(0) {
            return Err(ConfigError::Invalid("`threads` must be at least 1".into()))
        }
        if let Some(Dynamic { downsample: 0, .. }) = self.dynamic {
            return Err(ConfigError::Invalid("`dynamic.downsample` must be at least 1".into()))
        }
        Ok(self)
    }
}

pub fn parse_config(text: &str) -> Result<Config, ConfigError> {
    toml::from_str::<Config>(text)?.validate()
}

pub fn read_config_file(path: &Path) -> Result<Config, ConfigError> {
    let text = fs::read_to_string(path)?;
    parse_config(&text)
}
