//! Applying range modifiers to the model.

use crate::env::Environment;
use crate::error::{EvalError, EvalResult};
use crate::evaluator::Evaluator;
use crate::model::Model;
use fcp_types::ast::{Modifier, ModifierAction, ModifierWhen};

/// Apply the modifiers that fire at the top of a loop iteration: every
/// `each loop` modifier, and `at start` ones on the first iteration only.
pub fn apply_loop_hooks(
    modifiers: &[Modifier],
    first_iteration: bool,
    model: &mut dyn Model,
    evaluator: &mut Evaluator,
    env: &Environment,
) -> EvalResult<()> {
    for modifier in modifiers {
        let fires = match modifier.when {
            ModifierWhen::EveryLoop => true,
            ModifierWhen::AtStart => first_iteration,
            ModifierWhen::AtEnd => false,
        };
        if fires {
            apply(modifier, model, evaluator, env)?;
        }
    }
    Ok(())
}

/// Apply the `at end` modifiers once a range is exhausted.
pub fn apply_end_hooks(
    modifiers: &[Modifier],
    model: &mut dyn Model,
    evaluator: &mut Evaluator,
    env: &Environment,
) -> EvalResult<()> {
    for modifier in modifiers.iter().filter(|m| m.when == ModifierWhen::AtEnd) {
        apply(modifier, model, evaluator, env)?;
    }
    Ok(())
}

pub fn apply(
    modifier: &Modifier,
    model: &mut dyn Model,
    evaluator: &mut Evaluator,
    env: &Environment,
) -> EvalResult<()> {
    let when = modifier.when;
    let result = match &modifier.action {
        ModifierAction::SetVariable { name, value } => {
            let value = evaluator
                .eval_expr(value, env)?
                .expect_number("a modifier's new value")?;
            tracing::trace!(variable = %name.name, value, "set model variable");
            model.set_variable(when, env, &name.name, value)
        }
        ModifierAction::SaveState(name) => {
            tracing::trace!(state = %name.name, "save model state");
            model.save_state(when, &name.name)
        }
        ModifierAction::ResetState(name) => {
            tracing::trace!(state = ?name.as_ref().map(|n| &n.name), "reset model state");
            model.reset_state(when, name.as_ref().map(|n| n.name.as_str()))
        }
    };
    result.map_err(|err| EvalError::from(err).at(evaluator.location(modifier.span)))
}
