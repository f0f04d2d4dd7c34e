//! Iteration ranges.
//!
//! A [`Stepper`] drives one dimension of a simulation. It is built from the
//! parsed range, initialised once against an environment, then reset and
//! stepped. While stepping it keeps its variable bound in the environment
//! it was initialised with, so modifiers and `while` conditions see the
//! current value.

use crate::array::NdArray;
use crate::env::Environment;
use crate::error::{EvalError, EvalResult};
use crate::evaluator::Evaluator;
use crate::value::Value;
use fcp_types::ast::{Expr, Range, RangeKind};

/// Largest gap allowed between `start + n * step` and `end` for a uniform
/// range to be accepted.
const UNIFORM_TOLERANCE: f64 = 1e-10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepperState {
    Uninitialised,
    Initialised,
    Iterating,
    Exhausted,
}

#[derive(Debug, Clone)]
enum Stepping {
    Uniform { start: f64, step: f64, points: usize },
    Vector(Vec<f64>),
    While { condition: Expr, batch: usize },
}

#[derive(Debug)]
pub struct Stepper {
    name: String,
    units: String,
    kind: RangeKind,
    stepping: Option<Stepping>,
    env: Environment,
    state: StepperState,
    count: usize,
    current: f64,
    output_points: usize,
    growth_batch: usize,
}

impl Stepper {
    /// `growth_batch` is how many output points a `while` range reserves at
    /// a time.
    pub fn new(range: &Range, growth_batch: usize) -> Self {
        Self {
            name: range.name.name.clone(),
            units: range.units.name.clone(),
            kind: range.kind.clone(),
            stepping: None,
            env: Environment::new(),
            state: StepperState::Uninitialised,
            count: 0,
            current: 0.0,
            output_points: 0,
            growth_batch: growth_batch.max(1),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn units(&self) -> &str {
        &self.units
    }

    pub fn state(&self) -> StepperState {
        self.state
    }

    pub fn is_while(&self) -> bool {
        matches!(self.kind, RangeKind::While(_))
    }

    /// Resolve bounds (uniform) or values (vector) once, and remember `env`
    /// as the scope the range variable is bound in.
    pub fn initialise(&mut self, evaluator: &mut Evaluator, env: &Environment) -> EvalResult<()> {
        let stepping = match &self.kind {
            RangeKind::Uniform { start, step, end } => {
                let start = evaluator.eval_expr(start, env)?.expect_number("a range start")?;
                let step = match step {
                    Some(step) => evaluator.eval_expr(step, env)?.expect_number("a range step")?,
                    None => 1.0,
                };
                let end = evaluator.eval_expr(end, env)?.expect_number("a range end")?;
                Stepping::Uniform {
                    start,
                    step,
                    points: uniform_points(start, step, end)?,
                }
            }
            RangeKind::Vector(values) => {
                let array = evaluator.eval_expr(values, env)?.expect_array("a vector range")?;
                if array.ndim() > 1 {
                    return Err(EvalError::shape(format!(
                        "a vector range needs a 1-d array, not {} dimensions",
                        array.ndim()
                    )));
                }
                Stepping::Vector(NdArray::clone(&array).into_data())
            }
            RangeKind::While(condition) => Stepping::While {
                condition: condition.clone(),
                batch: self.growth_batch,
            },
        };
        self.output_points = match &stepping {
            Stepping::Uniform { points, .. } => *points,
            Stepping::Vector(values) => values.len(),
            Stepping::While { batch, .. } => *batch,
        };
        tracing::debug!(range = %self.name, points = self.output_points, "range initialised");
        self.stepping = Some(stepping);
        self.env = env.clone();
        self.state = StepperState::Initialised;
        Ok(())
    }

    /// Start a fresh iteration at the first value.
    pub fn reset(&mut self) -> EvalResult<()> {
        let Some(stepping) = &self.stepping else {
            return Err(self.not_initialised());
        };
        self.count = 0;
        if let Stepping::While { batch, .. } = stepping {
            self.output_points = *batch;
        }
        if self.output_points == 0 {
            self.state = StepperState::Exhausted;
            return Ok(());
        }
        self.current = self.value_at(0);
        self.state = StepperState::Iterating;
        self.env.overwrite(&self.name, Value::Simple(self.current));
        Ok(())
    }

    pub fn at_end(&self) -> bool {
        self.state == StepperState::Exhausted
    }

    /// Move to the next value. A `while` range evaluates its condition with
    /// the new value bound and stops when it is false. Its condition must
    /// also hold for the first value, or the range is an error.
    pub fn step(&mut self, evaluator: &mut Evaluator) -> EvalResult<()> {
        if self.state != StepperState::Iterating {
            return Err(EvalError::shape(format!(
                "range '{}' cannot step while {:?}",
                self.name, self.state
            )));
        }
        let condition = match &self.stepping {
            Some(Stepping::While { condition, .. }) => Some(condition.clone()),
            _ => None,
        };
        if let (Some(condition), 0) = (&condition, self.count) {
            if !evaluator
                .eval_expr(condition, &self.env)?
                .is_truthy("a while condition")?
            {
                return Err(EvalError::shape(format!(
                    "the condition of while range '{}' must hold initially",
                    self.name
                )));
            }
        }
        self.count += 1;
        if condition.is_none() && self.count >= self.output_points {
            self.state = StepperState::Exhausted;
            return Ok(());
        }
        self.current = self.value_at(self.count);
        self.env.overwrite(&self.name, Value::Simple(self.current));
        tracing::trace!(range = %self.name, count = self.count, value = self.current, "range step");

        if let Some(condition) = condition {
            if !evaluator
                .eval_expr(&condition, &self.env)?
                .is_truthy("a while condition")?
            {
                self.output_points = self.count;
                self.state = StepperState::Exhausted;
            } else if self.count == self.output_points {
                self.output_points += self.growth_batch;
                tracing::debug!(range = %self.name, points = self.output_points, "while range grown");
            }
        }
        Ok(())
    }

    pub fn current_value(&self) -> f64 {
        self.current
    }

    /// Position of the current value along this range's result dimension.
    pub fn current_output_number(&self) -> usize {
        self.count
    }

    /// Fixed for uniform and vector ranges. For a `while` range this is an
    /// estimate until iteration halts, then the actual count.
    pub fn number_of_output_points(&self) -> usize {
        self.output_points
    }

    fn value_at(&self, k: usize) -> f64 {
        match &self.stepping {
            Some(Stepping::Uniform { start, step, .. }) => start + k as f64 * step,
            Some(Stepping::Vector(values)) => values[k],
            Some(Stepping::While { .. }) | None => k as f64,
        }
    }

    fn not_initialised(&self) -> EvalError {
        EvalError::shape(format!("range '{}' has not been initialised", self.name))
    }
}

/// Number of points in `start:step:end`, both ends included. The step
/// must head towards `end` and divide the interval into whole steps.
fn uniform_points(start: f64, step: f64, end: f64) -> EvalResult<usize> {
    let span = end - start;
    if step == 0.0 || !step.is_finite() || !span.is_finite() {
        return Err(EvalError::shape(format!(
            "a uniform range cannot step from {start} to {end} by {step}"
        )));
    }
    if span * step < 0.0 {
        return Err(EvalError::shape(format!(
            "a step of {step} never reaches {end} from {start}"
        )));
    }
    let n = (span / step).round();
    if (n * step - span).abs() > UNIFORM_TOLERANCE {
        return Err(EvalError::shape(format!(
            "a step of {step} does not divide the range {start} to {end}"
        )));
    }
    Ok(n as usize + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fcp_types::ast::{Ident, NumberLit};
    use fcp_types::{SourceFile, Span};
    use std::rc::Rc;

    fn number(x: f64) -> Expr {
        Expr::new(
            fcp_types::ast::ExprKind::Number(NumberLit {
                text: x.to_string(),
                value: x,
                units: None,
            }),
            Span::point(1, 1),
        )
    }

    fn uniform(start: f64, step: f64, end: f64) -> Range {
        Range {
            name: Ident::new("t", Span::point(1, 1)),
            units: Ident::new("ms", Span::point(1, 1)),
            kind: RangeKind::Uniform {
                start: number(start),
                step: Some(number(step)),
                end: number(end),
            },
            span: Span::point(1, 1),
        }
    }

    fn evaluator() -> Evaluator {
        Evaluator::new(Rc::new(SourceFile::new("test.txt", "")))
    }

    #[test]
    fn test_uniform_points() {
        assert_eq!(uniform_points(0.0, 1.0, 5.0).unwrap(), 6);
        assert_eq!(uniform_points(0.0, 0.1, 1.0).unwrap(), 11);
        assert_eq!(uniform_points(5.0, -1.0, 0.0).unwrap(), 6);
        assert_eq!(uniform_points(2.0, 1.0, 2.0).unwrap(), 1);
        assert!(uniform_points(0.0, -1.0, 5.0).is_err());
        assert!(uniform_points(0.0, 2.0, 5.0).is_err());
        assert!(uniform_points(0.0, 0.0, 5.0).is_err());
    }

    #[test]
    fn test_uniform_iteration() {
        let mut ev = evaluator();
        let env = Environment::new();
        let mut range = Stepper::new(&uniform(0.0, 1.0, 5.0), 1000);
        assert_eq!(range.state(), StepperState::Uninitialised);
        range.initialise(&mut ev, &env).unwrap();
        range.reset().unwrap();
        let mut seen = Vec::new();
        while !range.at_end() {
            seen.push((range.current_output_number(), range.current_value()));
            assert_eq!(env.lookup("t").unwrap(), Value::Simple(range.current_value()));
            range.step(&mut ev).unwrap();
        }
        assert_eq!(seen.len(), 6);
        assert_eq!(seen[5], (5, 5.0));
        assert_eq!(range.number_of_output_points(), 6);
        assert_eq!(range.state(), StepperState::Exhausted);
    }

    #[test]
    fn test_reset_before_initialise_fails() {
        let mut range = Stepper::new(&uniform(0.0, 1.0, 5.0), 1000);
        assert!(range.reset().is_err());
    }
}
