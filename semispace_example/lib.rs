//! Sample host for the semispace collector: a toy object model, and the scenarios the `example`
//! binary runs against it.

pub mod objects;
pub mod scenarios;

pub use objects::{Machine, Runtime};
pub use scenarios::{Report, Scenario, ScenarioConfig, ScenarioError};
