mod exports;
pub use exports::*;

pub mod types;
pub mod error;
pub mod volume;
pub mod status;
pub mod extract;
pub mod plan;
pub mod optimize;
pub mod eff;
pub mod dff;
pub mod flat_fielding;
pub mod pipeline;
pub mod config;
pub mod io;
pub mod utils;
