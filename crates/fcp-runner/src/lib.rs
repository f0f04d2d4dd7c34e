//! FCP protocol runner.
//!
//! Ties the front end and the runtime together: resolves and loads imports,
//! evaluates inputs and library definitions, runs the simulation tasks
//! against a [`Model`](fcp_eval::Model), then post-processes results into
//! the protocol's declared outputs and plots.
//!
//! # Example
//!
//! ```ignore
//! let resolver = FileResolver::new();
//! let runner = ProtocolRunner::new(&resolver, RunnerConfig::default());
//! let mut model = LinearOdeModel::new(1.0);
//! let outcome = runner.run_file("protocols/timecourse.txt", &mut model)?;
//! println!("{}", outcome.outputs_json());
//! ```

mod config;
mod error;
mod resolver;
mod runner;

pub use config::RunnerConfig;
pub use error::{RunError, RunResult};
pub use resolver::{FileResolver, ImportResolver, MemoryResolver};
pub use runner::{source_digest, ProtocolRunner, RunOutcome};
