//! Unit observations and their classification

mod classify;
mod name;
mod observation;

pub use classify::{classify, Classification, FailureReason, Verdict};
pub use name::service_unit_name;
pub use observation::{ActiveState, ExecMainCode, UnitObservation};
