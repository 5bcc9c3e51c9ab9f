//! Runner abstraction: the seam between the agent's task state machine and
//! the external interactive CLI that does the real work.
//!
//! A [`ComponentRunner`] spawns the CLI for `(prompt, options)` and hands
//! back a [`RunnerHandle`] — a line stream plus exit status plus kill. A
//! [`StreamParser`] turns each raw line into zero or more normalized
//! [`ToolEvent`]s. Concrete providers register in a [`RunnerRegistry`]
//! keyed by agent kind; the core never sees provider specifics.

pub mod event;
pub mod parsers;
pub mod process;
pub mod registry;
pub mod traits;

pub use event::ToolEvent;
pub use process::{ProcessRunner, ProcessRunnerConfig};
pub use registry::{ProviderEntry, RunnerRegistry};
pub use traits::{ComponentRunner, RunnerHandle, RunnerOptions, StreamParser};
