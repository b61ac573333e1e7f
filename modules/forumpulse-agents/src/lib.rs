//! The pipeline workers, their shared dependency container, and the
//! scheduler that drives them.
//!
//! Each worker module exposes `run(deps, now) -> Result<usize>` returning the
//! number of units it processed. Zero is a legitimate "nothing to do" outcome
//! logged at debug, never an error.

pub mod author_integrity;
pub mod backfill;
pub mod deps;
pub mod formulas;
pub mod metric_gardener;
pub mod metric_mapper;
pub mod moderator;
pub mod normalizer;
pub mod opinion_analyst;
pub mod rollup_accountant;
pub mod scheduler;
pub mod supervisor;
pub mod thread_harvester;
pub mod trend_scout;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use deps::Deps;
pub use scheduler::{Job, RetryPolicy, Scheduler};
