//! FCP runtime.
//!
//! Evaluates parsed protocols: the value model ([`Value`], [`NdArray`]),
//! lexically scoped [`Environment`]s with prefix delegation, the
//! tree-walking [`Evaluator`] for the post-processing language, and the
//! [`SimulationEngine`] that drives a [`Model`] through ranges and
//! modifiers while collecting result arrays.
//!
//! # Example
//!
//! ```ignore
//! let mut model = LinearOdeModel::new(1.0);
//! let mut evaluator = Evaluator::new(source);
//! let mut engine = SimulationEngine::new(&mut model, &mut evaluator, EngineConfig::default());
//! let results = engine.run(&simulation, &env)?;
//! ```

pub mod array;
pub mod env;
pub mod error;
pub mod evaluator;
pub mod model;
pub mod modifier;
pub mod ops;
pub mod range;
pub mod simulation;
pub mod value;

pub use array::{DimSlice, IndexPolicy, NdArray};
pub use env::Environment;
pub use error::{ErrorKind, EvalError, EvalResult};
pub use evaluator::{Evaluator, Trace};
pub use model::{LinearOdeModel, Model, ModelError};
pub use range::{Stepper, StepperState};
pub use simulation::{EngineConfig, SimulationEngine, DEFAULT_GROWTH_BATCH};
pub use value::{Closure, ClosureBody, Value};
