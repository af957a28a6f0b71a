//! Data models for the quota monitor
//!
//! Quota definitions are loaded once and never mutated. Utilization results are
//! produced per cycle and only read by consolidation and storage.

mod alert;
mod health;
mod quota;
mod report;
mod resource;
mod utilization;

pub use alert::*;
pub use health::*;
pub use quota::*;
pub use report::*;
pub use resource::*;
pub use utilization::*;
