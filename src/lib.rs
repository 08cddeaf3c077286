//! Back-end-agnostic motion-control core for an equatorial or Alt/Az
//! telescope mount: coordinate transforms, tracking rate composition,
//! periodic error correction, a three-phase cancellable slew state
//! machine, and the Command Queue that serialises everything onto a single
//! blocking hardware link.
//!
//! Consumers drive the mount entirely through [`controller::MountCore`];
//! every other module is a pure function library or an internal worker the
//! façade owns.

pub mod astro_math;
pub mod config;
pub mod controller;
pub mod coords;
pub mod error;
pub mod pec;
pub mod position;
pub mod predictor;
pub mod queue;
pub mod rates;
pub mod slew;
pub mod snapshot;
pub mod tracking;
pub mod transport;
pub mod util;

pub use config::Config;
pub use controller::{MountCore, SlewHandle};
pub use error::{CoreError, CoreResult};
pub use snapshot::Snapshot;
