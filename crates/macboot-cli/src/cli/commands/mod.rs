//! CLI command handlers, one per file.

mod check;
mod checksum;
mod run;

pub use check::run_check;
pub use checksum::run_checksum;
pub use run::{run_plan, RunArgs};

#[cfg(test)]
pub(crate) use check::describe_plan;
