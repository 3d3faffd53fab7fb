pub use crate::types::{Image, Stack, EPS};
pub use crate::error::AccessError;
pub use crate::volume::{AxisOrder, Storage, Volume};
pub use crate::plan::CorrectionPlan;
pub use crate::eff::EigenFlatFields;
pub use crate::dff::AirWindows;
