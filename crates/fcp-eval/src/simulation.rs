//! The simulation engine.
//!
//! Runs a simulation task against a [`Model`]. Each level of a (possibly
//! nested) simulation pushes one [`Stepper`] onto a stack, outermost first.
//! Every time the innermost level records, each model output is written
//! into a result array indexed by the current position of every range on
//! the stack, so a result's shape is the ranges' point counts followed by
//! the output's own shape.
//!
//! A named simulation's results so far are visible to its own outermost
//! `while` condition as `name:output`, with the leading dimension trimmed
//! to the rows recorded.

use crate::array::{fmt_shape, NdArray};
use crate::env::Environment;
use crate::error::{EvalError, EvalResult};
use crate::evaluator::Evaluator;
use crate::model::Model;
use crate::modifier;
use crate::range::Stepper;
use crate::value::Value;
use fcp_types::ast::{Modifier, NestedTarget, Range, Simulation, SimulationKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default number of output points a `while` range reserves at a time.
pub const DEFAULT_GROWTH_BATCH: usize = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Output points a `while` range reserves each time it fills up.
    pub while_growth_batch: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            while_growth_batch: DEFAULT_GROWTH_BATCH,
        }
    }
}

pub struct SimulationEngine<'a> {
    model: &'a mut dyn Model,
    evaluator: &'a mut Evaluator,
    config: EngineConfig,
    /// Named simulations seen so far, for `nests name`.
    definitions: BTreeMap<String, Simulation>,
    time: f64,
    /// Where the running simulation publishes its partial results.
    live: Option<Environment>,
}

impl<'a> SimulationEngine<'a> {
    pub fn new(model: &'a mut dyn Model, evaluator: &'a mut Evaluator, config: EngineConfig) -> Self {
        Self {
            model,
            evaluator,
            config,
            definitions: BTreeMap::new(),
            time: 0.0,
            live: None,
        }
    }

    /// Model time after the last step taken.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Run one simulation task and return its results, one array per model
    /// output. Range variables are bound in a child of `env`.
    pub fn run(&mut self, sim: &Simulation, env: &Environment) -> EvalResult<Environment> {
        if let Some(name) = &sim.name {
            self.definitions.insert(name.name.clone(), sim.clone());
        }
        let label = sim.name.as_ref().map_or("<anonymous>", |n| n.name.as_str());
        tracing::debug!(simulation = label, "running simulation");

        let scope = env.child();
        let live = match &sim.name {
            Some(name) => {
                let live = Environment::new();
                scope.add_delegatee(&name.name, live.clone())?;
                Some(live)
            }
            None => None,
        };
        let outer_live = std::mem::replace(&mut self.live, live);
        let mut stack = Vec::new();
        let mut results = ResultsBuffer::default();
        let outcome = self
            .run_level(sim, &scope, &mut stack, &mut results)
            .map_err(|err| err.at(self.evaluator.location(sim.span)));
        self.live = outer_live;
        outcome?;
        results.into_environment()
    }

    fn run_level(
        &mut self,
        sim: &Simulation,
        env: &Environment,
        stack: &mut Vec<Stepper>,
        results: &mut ResultsBuffer,
    ) -> EvalResult<()> {
        match &sim.kind {
            SimulationKind::Timecourse { range, modifiers } => {
                self.run_timecourse(range, modifiers, env, stack, results)
            }
            SimulationKind::Nested {
                range,
                modifiers,
                nested,
            } => {
                let inner = match nested.as_ref() {
                    NestedTarget::Simulation(inner) => {
                        if let Some(name) = &inner.name {
                            self.definitions.insert(name.name.clone(), inner.clone());
                        }
                        inner.clone()
                    }
                    NestedTarget::Reference(name) => {
                        self.definitions.get(&name.name).cloned().ok_or_else(|| {
                            EvalError::name(format!("no simulation named '{}'", name.name))
                        })?
                    }
                };
                self.run_nested(range, modifiers, &inner, env, stack, results)
            }
            SimulationKind::OneStep(step) => {
                let step = match step {
                    Some(step) => self
                        .evaluator
                        .eval_expr(step, env)?
                        .expect_number("a oneStep step")?,
                    None => 0.0,
                };
                let end = self.time + step;
                self.model.simulate(end)?;
                self.time = end;
                self.record(stack, results)
            }
        }
    }

    fn push_range(
        &mut self,
        range: &Range,
        env: &Environment,
        stack: &mut Vec<Stepper>,
    ) -> EvalResult<usize> {
        let mut stepper = Stepper::new(range, self.config.while_growth_batch);
        if stepper.is_while() && !stack.is_empty() {
            return Err(EvalError::shape(format!(
                "while range '{}' may only be the outermost range",
                stepper.name()
            ))
            .at(self.evaluator.location(range.span)));
        }
        stepper
            .initialise(self.evaluator, env)
            .and_then(|()| stepper.reset())
            .map_err(|err| err.at(self.evaluator.location(range.span)))?;
        stack.push(stepper);
        Ok(stack.len() - 1)
    }

    fn run_timecourse(
        &mut self,
        range: &Range,
        modifiers: &[Modifier],
        env: &Environment,
        stack: &mut Vec<Stepper>,
        results: &mut ResultsBuffer,
    ) -> EvalResult<()> {
        let level = self.push_range(range, env, stack)?;
        self.time = stack[level].current_value();
        self.model.set_initial_time(self.time)?;

        while !stack[level].at_end() {
            let first = stack[level].current_output_number() == 0;
            modifier::apply_loop_hooks(modifiers, first, self.model, self.evaluator, env)?;
            self.record(stack, results)?;
            self.publish_live(stack, results);
            stack[level].step(self.evaluator)?;
            if !stack[level].at_end() {
                let next = stack[level].current_value();
                self.model.simulate(next)?;
                self.time = next;
            }
        }
        modifier::apply_end_hooks(modifiers, self.model, self.evaluator, env)?;
        self.finish_level(stack, results)
    }

    fn run_nested(
        &mut self,
        range: &Range,
        modifiers: &[Modifier],
        inner: &Simulation,
        env: &Environment,
        stack: &mut Vec<Stepper>,
        results: &mut ResultsBuffer,
    ) -> EvalResult<()> {
        let level = self.push_range(range, env, stack)?;
        while !stack[level].at_end() {
            let first = stack[level].current_output_number() == 0;
            modifier::apply_loop_hooks(modifiers, first, self.model, self.evaluator, env)?;
            self.run_level(inner, env, stack, results)
                .map_err(|err| err.at(self.evaluator.location(inner.span)))?;
            self.publish_live(stack, results);
            stack[level].step(self.evaluator)?;
        }
        modifier::apply_end_hooks(modifiers, self.model, self.evaluator, env)?;
        self.finish_level(stack, results)
    }

    /// Pop a finished range. When it was a `while` range, its final count
    /// is now known and the results are trimmed to it.
    fn finish_level(&mut self, stack: &mut Vec<Stepper>, results: &mut ResultsBuffer) -> EvalResult<()> {
        if let Some(stepper) = stack.pop() {
            if stack.is_empty() && stepper.is_while() {
                results.resize_leading(stepper.number_of_output_points());
            }
            tracing::debug!(range = stepper.name(), points = stepper.number_of_output_points(), "range finished");
        }
        Ok(())
    }

    /// Before an outermost `while` range tests its condition, expose the
    /// rows recorded so far.
    fn publish_live(&self, stack: &[Stepper], results: &ResultsBuffer) {
        let (Some(live), [outer, ..]) = (&self.live, stack) else {
            return;
        };
        if stack.len() == 1 && outer.is_while() {
            results.publish(outer.current_output_number() + 1, live);
        }
    }

    fn record(&mut self, stack: &[Stepper], results: &mut ResultsBuffer) -> EvalResult<()> {
        let outputs = self.model.get_outputs()?;
        let position: Vec<usize> = stack.iter().map(Stepper::current_output_number).collect();
        let extents: Vec<usize> = stack.iter().map(Stepper::number_of_output_points).collect();
        tracing::trace!(?position, time = self.time, "recording outputs");
        results.record(&position, &extents, &outputs)
    }
}

/// Result arrays being filled in place. Allocated on the first record,
/// once the outputs' shapes are known; unvisited entries stay NaN.
#[derive(Debug, Default)]
struct ResultsBuffer {
    arrays: Option<BTreeMap<String, NdArray>>,
}

impl ResultsBuffer {
    fn record(&mut self, position: &[usize], extents: &[usize], outputs: &Environment) -> EvalResult<()> {
        let outputs = outputs
            .bindings()
            .into_iter()
            .map(|(name, value)| {
                let array = value.expect_array(&format!("model output '{name}'"));
                array.map(|array| (name, array))
            })
            .collect::<EvalResult<Vec<_>>>()?;

        let arrays = self.arrays.get_or_insert_with(|| {
            outputs
                .iter()
                .map(|(name, value)| {
                    let mut shape = extents.to_vec();
                    shape.extend_from_slice(value.shape());
                    (name.clone(), NdArray::filled(shape, f64::NAN))
                })
                .collect()
        });

        for (name, value) in outputs {
            let array = arrays.get_mut(&name).ok_or_else(|| {
                EvalError::name(format!("model output '{name}' appeared part way through a run"))
            })?;
            if let (Some(&wanted), Some(&have)) = (extents.first(), array.shape().first()) {
                if wanted > have {
                    array.resize_leading(wanted, f64::NAN);
                }
            }
            let shape = array.shape();
            let fits = shape.len() >= position.len()
                && position.iter().zip(shape).all(|(p, n)| p < n)
                && extents.iter().zip(shape).skip(1).all(|(e, n)| e == n);
            if !fits {
                return Err(EvalError::shape(format!(
                    "cannot record output '{name}' at {} in results of shape {}",
                    fmt_shape(position),
                    fmt_shape(array.shape())
                )));
            }
            array.write_block(position, &value)?;
        }
        Ok(())
    }

    fn resize_leading(&mut self, extent: usize) {
        if let Some(arrays) = &mut self.arrays {
            for array in arrays.values_mut() {
                array.resize_leading(extent, f64::NAN);
            }
        }
    }

    /// Bind each result, cut to its first `rows` rows, in `live`.
    fn publish(&self, rows: usize, live: &Environment) {
        live.clear();
        for (name, array) in self.arrays.iter().flatten() {
            let mut shape = array.shape().to_vec();
            let Some(first) = shape.first_mut() else {
                continue;
            };
            *first = rows.min(*first);
            let len: usize = shape.iter().product();
            if let Ok(trimmed) = NdArray::new(shape, array.data()[..len].to_vec()) {
                live.overwrite(name, Value::array(trimmed));
            }
        }
    }

    fn into_environment(self) -> EvalResult<Environment> {
        let env = Environment::new();
        for (name, array) in self.arrays.unwrap_or_default() {
            env.define(&name, Value::array(array))?;
        }
        Ok(env)
    }
}
