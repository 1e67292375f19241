//! Job, batch, and phase execution.
//!
//! `PhaseRunner` drives phases in order; each batch goes to `BatchExecutor`,
//! which fans jobs out to a `JobRunner` and collects one result per job.

mod batch;
mod exec;
mod phase;
mod report;

pub use batch::{plan_groups, BatchExecutor};
pub use exec::{DryRunRunner, JobRunner, ProvisionRunner, RunSettings};
pub use phase::{Batch, Phase, PhaseRunner};
pub use report::{PhaseReport, PhaseStatus, RunReport, StepKind, StepRecord, Totals};
