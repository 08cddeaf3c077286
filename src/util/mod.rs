pub mod abort_result;
pub mod axis;
pub mod pier_side;

pub use abort_result::AbortResult;
pub use axis::{Axis, AxisPair};
pub use pier_side::PierSide;
