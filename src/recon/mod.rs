//! License reconciliation: normalize two API record sets, compare them by
//! login, and render the comparison as report artifacts.

pub mod model;
pub mod normalize;
pub mod reconcile;
pub mod report;

pub use model::{Origin, Record};
pub use normalize::{normalize, DroppedRecord, FieldMap};
pub use reconcile::reconcile;
pub use report::{emit, write_artifacts, Format, Metrics, RunContext};
