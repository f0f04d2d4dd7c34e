//! The protocol pipeline.
//!
//! ```text
//! parse → inputs → imports → library → model interface → tasks
//!       → post-processing → outputs → plots
//! ```
//!
//! Imported protocols go through the first four stages only. A prefixed
//! import is reachable as `prefix:name` and can be pulled into later
//! sections with `use imports prefix`; an unprefixed import's library is
//! merged into the importer's scope.

use crate::config::RunnerConfig;
use crate::error::{RunError, RunResult};
use crate::resolver::ImportResolver;
use fcp_eval::{
    Environment, EvalError, EvalResult, Evaluator, Model, SimulationEngine, Trace, Value,
};
use fcp_parser::{parse_protocol, ParserConfig};
use fcp_types::ast::{
    Block, ModelInterfaceKind, ModifierWhen, OutputItem, OutputSpec, Plot, PlotItem,
    PostProcessingItem, Protocol, Stmt, StmtKind,
};
use fcp_types::SourceFile;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::rc::Rc;

/// Everything a completed run produced.
#[derive(Debug)]
pub struct RunOutcome {
    /// Declared outputs, by output name.
    pub outputs: Environment,
    /// The declarations behind `outputs`, in declaration order.
    pub output_specs: Vec<OutputSpec>,
    /// Results of each named simulation.
    pub results: BTreeMap<String, Environment>,
    pub plots: Vec<Plot>,
    pub traces: Vec<Trace>,
    /// SHA-256 of the protocol source, hex encoded.
    pub digest: String,
}

impl RunOutcome {
    /// Declared outputs as a JSON object of `name -> value`.
    pub fn outputs_json(&self) -> serde_json::Value {
        let map = self
            .outputs
            .bindings()
            .into_iter()
            .map(|(name, value)| (name, value.to_json()))
            .collect::<serde_json::Map<_, _>>();
        serde_json::Value::Object(map)
    }
}

/// SHA-256 of protocol source text, hex encoded.
pub fn source_digest(source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// A protocol that has been parsed and had its inputs, imports and library
/// evaluated.
struct Loaded {
    protocol: Protocol,
    source: Rc<SourceFile>,
    /// Library scope; its parent holds the inputs.
    env: Environment,
    /// Prefixed imports, for `use imports`.
    imports: BTreeMap<String, Rc<Loaded>>,
}

impl Loaded {
    fn import(&self, prefix: &str) -> RunResult<&Rc<Loaded>> {
        self.imports
            .get(prefix)
            .ok_or_else(|| RunError::UnknownImport(prefix.to_string()))
    }
}

pub struct ProtocolRunner<'r> {
    resolver: &'r dyn ImportResolver,
    config: RunnerConfig,
    parser_config: ParserConfig,
}

impl<'r> ProtocolRunner<'r> {
    pub fn new(resolver: &'r dyn ImportResolver, config: RunnerConfig) -> Self {
        Self {
            resolver,
            config,
            parser_config: ParserConfig::default(),
        }
    }

    pub fn with_parser_config(mut self, parser_config: ParserConfig) -> Self {
        self.parser_config = parser_config;
        self
    }

    /// Read a protocol file from disk and run it.
    pub fn run_file(&self, path: &str, model: &mut dyn Model) -> RunResult<RunOutcome> {
        let text = std::fs::read_to_string(path).map_err(|source| RunError::Io {
            path: path.to_string(),
            source,
        })?;
        self.run(SourceFile::new(path, text), model)
    }

    /// Run a protocol end to end against `model`.
    #[tracing::instrument(level = "debug", skip_all, fields(protocol = %source.name))]
    pub fn run(&self, source: SourceFile, model: &mut dyn Model) -> RunResult<RunOutcome> {
        let digest = source_digest(&source.source);
        let overrides = self
            .config
            .input_overrides
            .iter()
            .map(|(name, value)| (name.clone(), Value::Simple(*value)))
            .collect();
        let mut traces = Vec::new();
        let mut chain = vec![source.name.clone()];
        let main = self.load(source, overrides, &mut chain, &mut traces)?;
        let env = main.env.clone();

        self.apply_model_interface(&main, model)?;

        let mut evaluator = Evaluator::new(Rc::clone(&main.source));
        let mut results = BTreeMap::new();
        if let Some(tasks) = &main.protocol.tasks {
            let mut engine =
                SimulationEngine::new(model, &mut evaluator, self.config.engine_config());
            for sim in &tasks.simulations {
                let sim_results = engine.run(sim, &env)?;
                if let Some(name) = &sim.name {
                    env.add_delegatee(&name.name, sim_results.clone())?;
                    results.insert(name.name.clone(), sim_results);
                }
            }
        }
        traces.extend(evaluator.take_traces());

        run_post_processing(&main, &env, &mut traces)?;

        let outputs = Environment::new();
        let mut output_specs = Vec::new();
        collect_outputs(&main, &env, &outputs, &mut output_specs)?;

        let mut plots = Vec::new();
        collect_plots(&main, &outputs, &mut plots)?;

        tracing::debug!(
            outputs = outputs.len(),
            simulations = results.len(),
            "protocol finished"
        );
        Ok(RunOutcome {
            outputs,
            output_specs,
            results,
            plots,
            traces,
            digest,
        })
    }

    /// Parse a protocol and evaluate its inputs, imports and library.
    /// `chain` holds the files currently being loaded, outermost first.
    fn load(
        &self,
        source: SourceFile,
        overrides: BTreeMap<String, Value>,
        chain: &mut Vec<String>,
        traces: &mut Vec<Trace>,
    ) -> RunResult<Loaded> {
        let protocol = parse_protocol(&source, &self.parser_config)?;
        let source = Rc::new(source);
        let mut evaluator = Evaluator::new(Rc::clone(&source));

        let inputs = Environment::new();
        run_inputs(&mut evaluator, protocol.inputs.as_ref(), &inputs, overrides)?;
        let env = inputs.child();

        let mut imports = BTreeMap::new();
        for import in &protocol.imports {
            let imported_source = self.resolver.resolve(&source, &import.source)?;
            if chain.contains(&imported_source.name) {
                let mut cycle = chain.clone();
                cycle.push(imported_source.name);
                return Err(RunError::ImportCycle(cycle));
            }

            let scratch = env.child();
            for stmt in &import.set_inputs {
                exec_top_level(&mut evaluator, stmt, &scratch)?;
            }
            let set_inputs = scratch.bindings().into_iter().collect();

            tracing::debug!(import = %import.source, "loading import");
            chain.push(imported_source.name.clone());
            let loaded = self.load(imported_source, set_inputs, chain, traces)?;
            chain.pop();

            match &import.prefix {
                Some(prefix) => {
                    env.add_delegatee(&prefix.name, loaded.env.clone())?;
                    imports.insert(prefix.name.clone(), Rc::new(loaded));
                }
                None => env.merge(&loaded.env)?,
            }
        }

        if let Some(library) = &protocol.library {
            for stmt in &library.stmts {
                exec_top_level(&mut evaluator, stmt, &env)?;
            }
        }
        traces.extend(evaluator.take_traces());

        Ok(Loaded {
            protocol,
            source,
            env,
            imports,
        })
    }

    /// Give the model the initial values declared for its inputs.
    fn apply_model_interface(&self, loaded: &Loaded, model: &mut dyn Model) -> RunResult<()> {
        let Some(interface) = &loaded.protocol.model_interface else {
            return Ok(());
        };
        for entry in &interface.entries {
            match &entry.kind {
                ModelInterfaceKind::Input {
                    name,
                    initial: Some(initial),
                    ..
                } => {
                    tracing::debug!(input = %name.name, value = initial.value, "model input");
                    model
                        .set_variable(
                            ModifierWhen::AtStart,
                            &loaded.env,
                            &name.name,
                            initial.value,
                        )
                        .map_err(|err| {
                            EvalError::from(err).at(loaded.source.location(entry.span))
                        })?;
                }
                ModelInterfaceKind::UseImports(prefix) => {
                    let imported = loaded.import(&prefix.name)?;
                    self.apply_model_interface(imported, model)?;
                }
                // Structural edits belong to the model adapter.
                _ => {}
            }
        }
        Ok(())
    }
}

/// Run the `inputs` block. An input named in `overrides` takes the given
/// value instead of its own; overriding a name the block does not define
/// is an error.
fn run_inputs(
    evaluator: &mut Evaluator,
    inputs: Option<&Block>,
    env: &Environment,
    mut overrides: BTreeMap<String, Value>,
) -> EvalResult<()> {
    for stmt in inputs.map(|b| b.stmts.as_slice()).unwrap_or_default() {
        if let StmtKind::Assign { targets, .. } = &stmt.kind {
            if let [target] = targets.as_slice() {
                if let Some(value) = overrides.remove(&target.name) {
                    tracing::debug!(input = %target.name, %value, "input overridden");
                    env.define(&target.name, value)
                        .map_err(|err| err.at(evaluator.location(stmt.span)))?;
                    continue;
                }
            }
        }
        exec_top_level(evaluator, stmt, env)?;
    }
    match overrides.into_keys().next() {
        Some(name) => Err(EvalError::name(format!(
            "cannot set '{name}': {} has no such input",
            evaluator.source().name
        ))),
        None => Ok(()),
    }
}

/// Execute a statement outside any function.
fn exec_top_level(evaluator: &mut Evaluator, stmt: &Stmt, env: &Environment) -> EvalResult<()> {
    match evaluator.exec_stmt(stmt, env)? {
        None => Ok(()),
        Some(_) => Err(EvalError::type_error("'return' is only allowed inside a function")
            .at(evaluator.location(stmt.span))),
    }
}

fn run_post_processing(loaded: &Loaded, env: &Environment, traces: &mut Vec<Trace>) -> RunResult<()> {
    let Some(section) = &loaded.protocol.post_processing else {
        return Ok(());
    };
    let mut evaluator = Evaluator::new(Rc::clone(&loaded.source));
    for item in &section.items {
        match item {
            PostProcessingItem::UseImports(use_imports) => {
                let imported = loaded.import(&use_imports.prefix.name)?;
                run_post_processing(imported, env, traces)?;
            }
            PostProcessingItem::Stmt(stmt) => exec_top_level(&mut evaluator, stmt, env)?,
        }
    }
    traces.extend(evaluator.take_traces());
    Ok(())
}

fn collect_outputs(
    loaded: &Loaded,
    env: &Environment,
    outputs: &Environment,
    specs: &mut Vec<OutputSpec>,
) -> RunResult<()> {
    let Some(section) = &loaded.protocol.outputs else {
        return Ok(());
    };
    for item in &section.items {
        match item {
            OutputItem::UseImports(use_imports) => {
                let imported = loaded.import(&use_imports.prefix.name)?;
                collect_outputs(imported, env, outputs, specs)?;
            }
            OutputItem::Output(spec) => {
                let reference = spec.reference.as_ref().unwrap_or(&spec.name);
                let at = || loaded.source.location(spec.span);
                let value = env.try_lookup(&reference.name).ok_or_else(|| {
                    EvalError::name(format!(
                        "output '{}' refers to '{}', which is not defined",
                        spec.name.name, reference.name
                    ))
                    .at(at())
                })?;
                outputs
                    .define(&spec.name.name, value)
                    .map_err(|err| err.at(at()))?;
                specs.push(spec.clone());
            }
        }
    }
    Ok(())
}

/// Gather plots, checking that every curve names a declared output.
fn collect_plots(loaded: &Loaded, outputs: &Environment, plots: &mut Vec<Plot>) -> RunResult<()> {
    let Some(section) = &loaded.protocol.plots else {
        return Ok(());
    };
    for item in &section.items {
        match item {
            PlotItem::UseImports(use_imports) => {
                let imported = loaded.import(&use_imports.prefix.name)?;
                collect_plots(imported, outputs, plots)?;
            }
            PlotItem::Plot(plot) => {
                let names = plot.curves.iter().flat_map(|c| c.y.iter().chain([&c.x]));
                for name in names {
                    if !outputs.is_defined_locally(&name.name) {
                        return Err(EvalError::name(format!(
                            "plot \"{}\" uses '{}', which is not an output",
                            plot.title, name.name
                        ))
                        .at(loaded.source.location(name.span))
                        .into());
                    }
                }
                plots.push(plot.clone());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_digest() {
        assert_eq!(
            source_digest(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_ne!(source_digest("a"), source_digest("b"));
    }
}
