//! The model a protocol drives.
//!
//! Solver internals are out of scope: a model is an opaque, stateful
//! collaborator that can be stepped through time, queried for its named
//! outputs, and have variables set and states saved and restored.

use crate::env::Environment;
use crate::value::Value;
use fcp_types::ast::ModifierWhen;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("simulation to t={time} did not converge: {reason}")]
    NonConvergence { time: f64, reason: String },
    #[error("the model has no variable named '{0}'")]
    UnknownVariable(String),
    #[error("no model state was saved as '{0}'")]
    UnknownState(String),
}

pub trait Model {
    /// Start a new time course at `time` without changing the state.
    fn set_initial_time(&mut self, time: f64) -> Result<(), ModelError>;

    /// Advance the state to `end_time`.
    fn simulate(&mut self, end_time: f64) -> Result<(), ModelError>;

    /// The model's current outputs, by name.
    fn get_outputs(&self) -> Result<Environment, ModelError>;

    fn set_variable(
        &mut self,
        when: ModifierWhen,
        env: &Environment,
        name: &str,
        value: f64,
    ) -> Result<(), ModelError>;

    fn save_state(&mut self, when: ModifierWhen, name: &str) -> Result<(), ModelError>;

    /// Restore a saved state, or the initial state when `name` is `None`.
    fn reset_state(&mut self, when: ModifierWhen, name: Option<&str>) -> Result<(), ModelError>;
}

/// `dy/dt = a`, integrated exactly.
///
/// Variables are `a` (the slope) and `y` (the state). Outputs are both,
/// as simple values.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearOdeModel {
    a: f64,
    y: f64,
    time: f64,
    initial_y: f64,
    saved: BTreeMap<String, f64>,
}

impl LinearOdeModel {
    pub fn new(a: f64) -> Self {
        Self::with_initial_state(a, 0.0)
    }

    pub fn with_initial_state(a: f64, y: f64) -> Self {
        Self {
            a,
            y,
            time: 0.0,
            initial_y: y,
            saved: BTreeMap::new(),
        }
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn time(&self) -> f64 {
        self.time
    }
}

impl Model for LinearOdeModel {
    fn set_initial_time(&mut self, time: f64) -> Result<(), ModelError> {
        self.time = time;
        Ok(())
    }

    fn simulate(&mut self, end_time: f64) -> Result<(), ModelError> {
        let y = self.y + self.a * (end_time - self.time);
        if !y.is_finite() {
            return Err(ModelError::NonConvergence {
                time: end_time,
                reason: format!("state became {y}"),
            });
        }
        self.y = y;
        self.time = end_time;
        Ok(())
    }

    fn get_outputs(&self) -> Result<Environment, ModelError> {
        let outputs = Environment::new();
        outputs.overwrite("a", Value::Simple(self.a));
        outputs.overwrite("y", Value::Simple(self.y));
        Ok(outputs)
    }

    fn set_variable(
        &mut self,
        _when: ModifierWhen,
        _env: &Environment,
        name: &str,
        value: f64,
    ) -> Result<(), ModelError> {
        match name {
            "a" => self.a = value,
            "y" => self.y = value,
            _ => return Err(ModelError::UnknownVariable(name.to_string())),
        }
        Ok(())
    }

    fn save_state(&mut self, _when: ModifierWhen, name: &str) -> Result<(), ModelError> {
        self.saved.insert(name.to_string(), self.y);
        Ok(())
    }

    fn reset_state(&mut self, _when: ModifierWhen, name: Option<&str>) -> Result<(), ModelError> {
        self.y = match name {
            None => self.initial_y,
            Some(name) => *self
                .saved
                .get(name)
                .ok_or_else(|| ModelError::UnknownState(name.to_string()))?,
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_integration() {
        let mut model = LinearOdeModel::new(2.0);
        model.set_initial_time(1.0).unwrap();
        model.simulate(4.0).unwrap();
        assert_eq!(model.y(), 6.0);
        assert_eq!(model.time(), 4.0);
    }

    #[test]
    fn test_save_and_reset() {
        let mut model = LinearOdeModel::new(1.0);
        model.simulate(2.0).unwrap();
        model.save_state(ModifierWhen::AtEnd, "two").unwrap();
        model.simulate(5.0).unwrap();
        model.reset_state(ModifierWhen::AtStart, Some("two")).unwrap();
        assert_eq!(model.y(), 2.0);
        model.reset_state(ModifierWhen::AtStart, None).unwrap();
        assert_eq!(model.y(), 0.0);
        assert_eq!(
            model.reset_state(ModifierWhen::AtStart, Some("never")),
            Err(ModelError::UnknownState("never".into()))
        );
    }

    #[test]
    fn test_unknown_variable() {
        let mut model = LinearOdeModel::new(1.0);
        let env = Environment::new();
        assert!(model.set_variable(ModifierWhen::AtStart, &env, "a", 3.0).is_ok());
        assert_eq!(
            model.set_variable(ModifierWhen::AtStart, &env, "b", 3.0),
            Err(ModelError::UnknownVariable("b".into()))
        );
    }

    #[test]
    fn test_outputs() {
        let model = LinearOdeModel::with_initial_state(0.5, 3.0);
        let outputs = model.get_outputs().unwrap();
        assert_eq!(outputs.names(), vec!["a".to_string(), "y".to_string()]);
        assert_eq!(outputs.lookup("y").unwrap(), Value::Simple(3.0));
    }
}
