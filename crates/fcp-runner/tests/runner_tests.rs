//! End-to-end tests: whole protocols run against the linear reference model,
//! with imports served from memory.

use fcp_eval::{ErrorKind, LinearOdeModel, Value};
use fcp_runner::{MemoryResolver, ProtocolRunner, RunError, RunOutcome, RunnerConfig};
use fcp_types::SourceFile;
use pretty_assertions::assert_eq;
use serde_json::json;

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

fn try_run_with(
    source: &str,
    resolver: &MemoryResolver,
    config: RunnerConfig,
) -> Result<RunOutcome, RunError> {
    let mut model = LinearOdeModel::new(1.0);
    ProtocolRunner::new(resolver, config).run(SourceFile::new("main.txt", source), &mut model)
}

fn run(source: &str) -> RunOutcome {
    try_run_with(source, &MemoryResolver::new(), RunnerConfig::default())
        .unwrap_or_else(|e| panic!("run failed:\n{e}"))
}

fn eval_kind(result: Result<RunOutcome, RunError>) -> ErrorKind {
    match result {
        Err(RunError::Eval(err)) => err.kind,
        other => panic!("expected an evaluation error, got {other:?}"),
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Inputs
// ══════════════════════════════════════════════════════════════════════════════

const SCALED: &str = "inputs {\n    scale = 2\n}\npost-processing {\n    x = scale * 3\n}\noutputs {\n    x units dimensionless\n}\n";

#[test]
fn inputs_feed_post_processing() {
    let outcome = run(SCALED);
    assert_eq!(outcome.outputs.lookup("x").unwrap(), Value::Simple(6.0));
}

#[test]
fn input_override_replaces_default() {
    let outcome = try_run_with(
        SCALED,
        &MemoryResolver::new(),
        RunnerConfig::default().with_input("scale", 5.0),
    )
    .unwrap();
    assert_eq!(outcome.outputs.lookup("x").unwrap(), Value::Simple(15.0));
}

#[test]
fn override_of_unknown_input_is_rejected() {
    let result = try_run_with(
        SCALED,
        &MemoryResolver::new(),
        RunnerConfig::default().with_input("nope", 1.0),
    );
    assert_eq!(eval_kind(result), ErrorKind::Name);
}

// ══════════════════════════════════════════════════════════════════════════════
// Imports
// ══════════════════════════════════════════════════════════════════════════════

const DOUBLING_LIBRARY: &str = "library {\n    def double(x): x * 2\n}\n";

#[test]
fn prefixed_import_is_reached_through_its_prefix() {
    let resolver = MemoryResolver::new().with_file("lib.txt", DOUBLING_LIBRARY);
    let outcome = try_run_with(
        "import lib = \"lib.txt\"\nlibrary {\n    four = lib:double(2)\n}\noutputs {\n    four units dimensionless\n}\n",
        &resolver,
        RunnerConfig::default(),
    )
    .unwrap();
    assert_eq!(outcome.outputs.lookup("four").unwrap(), Value::Simple(4.0));
}

#[test]
fn unprefixed_import_is_merged() {
    let resolver = MemoryResolver::new().with_file("lib.txt", DOUBLING_LIBRARY);
    let outcome = try_run_with(
        "import \"lib.txt\"\nlibrary {\n    four = double(2)\n}\noutputs {\n    four units dimensionless\n}\n",
        &resolver,
        RunnerConfig::default(),
    )
    .unwrap();
    assert_eq!(outcome.outputs.lookup("four").unwrap(), Value::Simple(4.0));
}

#[test]
fn import_can_set_inputs() {
    let resolver = MemoryResolver::new().with_file(
        "scaler.txt",
        "inputs {\n    factor = 2\n}\nlibrary {\n    def scale(x): x * factor\n}\n",
    );
    let outcome = try_run_with(
        "import s = \"scaler.txt\" {\n    factor = 10\n}\nlibrary {\n    y = s:scale(3)\n}\noutputs {\n    y units dimensionless\n}\n",
        &resolver,
        RunnerConfig::default(),
    )
    .unwrap();
    assert_eq!(outcome.outputs.lookup("y").unwrap(), Value::Simple(30.0));
}

#[test]
fn import_cycle_is_detected() {
    let resolver = MemoryResolver::new()
        .with_file("a.txt", "import \"b.txt\"\n")
        .with_file("b.txt", "import \"a.txt\"\n");
    let err = try_run_with("import \"a.txt\"\n", &resolver, RunnerConfig::default()).unwrap_err();
    assert_eq!(
        err.to_string(),
        "import cycle: main.txt -> a.txt -> b.txt -> a.txt"
    );
}

#[test]
fn missing_import_is_reported() {
    let err = try_run_with(
        "import \"gone.txt\"\n",
        &MemoryResolver::new(),
        RunnerConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, RunError::ImportNotFound(uri) if uri == "gone.txt"));
}

#[test]
fn use_imports_pulls_in_outputs() {
    let resolver = MemoryResolver::new().with_file(
        "shared.txt",
        "library {\n    answer = 42\n}\noutputs {\n    answer units dimensionless\n}\n",
    );
    let outcome = try_run_with(
        "import shared = \"shared.txt\"\nlibrary {\n    answer = shared:answer\n}\noutputs {\n    use imports shared\n}\n",
        &resolver,
        RunnerConfig::default(),
    )
    .unwrap();
    assert_eq!(outcome.outputs.lookup("answer").unwrap(), Value::Simple(42.0));
    assert_eq!(outcome.output_specs.len(), 1);
}

#[test]
fn use_imports_with_unknown_prefix() {
    let err = try_run_with(
        "outputs {\n    use imports nowhere\n}\n",
        &MemoryResolver::new(),
        RunnerConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, RunError::UnknownImport(prefix) if prefix == "nowhere"));
}

// ══════════════════════════════════════════════════════════════════════════════
// Full pipeline
// ══════════════════════════════════════════════════════════════════════════════

const TIMECOURSE: &str = r#"model interface {
    input a = 2
}
tasks {
    simulation sim = timecourse {
        range t units ms uniform 0:1:2
    }
}
post-processing {
    doubled = sim:y * 2
}
outputs {
    doubled units dimensionless
    trajectory = sim:y units dimensionless "State"
}
plots {
    plot "State" {
        doubled against trajectory
    }
}
"#;

#[test]
fn full_protocol_run() {
    let outcome = run(TIMECOURSE);
    assert_eq!(
        outcome.outputs_json(),
        json!({
            "doubled": [0.0, 4.0, 8.0],
            "trajectory": [0.0, 2.0, 4.0],
        })
    );
    assert_eq!(outcome.results.keys().collect::<Vec<_>>(), vec!["sim"]);
    assert_eq!(outcome.plots.len(), 1);
    assert_eq!(
        outcome.output_specs[1].description.as_deref(),
        Some("State")
    );
}

#[test]
fn while_range_stops_on_its_own_results() {
    let outcome = run(
        "tasks {\n    simulation sim = timecourse {\n        range n units dimensionless while sim:y[-1] < 3\n    }\n}\noutputs {\n    trajectory = sim:y units dimensionless\n}\n",
    );
    assert_eq!(
        outcome.outputs_json(),
        json!({ "trajectory": [0.0, 1.0, 2.0, 3.0] })
    );
}

#[test]
fn digest_is_sha256_hex() {
    let outcome = run(TIMECOURSE);
    assert_eq!(outcome.digest.len(), 64);
    assert!(outcome.digest.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(outcome.digest, fcp_runner::source_digest(TIMECOURSE));
}

#[test]
fn undefined_output_is_a_name_error() {
    let result = try_run_with(
        "outputs {\n    missing units dimensionless\n}\n",
        &MemoryResolver::new(),
        RunnerConfig::default(),
    );
    assert_eq!(eval_kind(result), ErrorKind::Name);
}

#[test]
fn plot_of_non_output_is_a_name_error() {
    let result = try_run_with(
        "library {\n    x = 1\n}\noutputs {\n    x units dimensionless\n}\nplots {\n    plot \"bad\" {\n        x against t\n    }\n}\n",
        &MemoryResolver::new(),
        RunnerConfig::default(),
    );
    assert_eq!(eval_kind(result), ErrorKind::Name);
}

#[test]
fn top_level_return_is_rejected() {
    let result = try_run_with(
        "post-processing {\n    return 1\n}\n",
        &MemoryResolver::new(),
        RunnerConfig::default(),
    );
    assert_eq!(eval_kind(result), ErrorKind::Type);
}

#[test]
fn traces_are_collected() {
    let outcome = run("library {\n    a = 2\n    x = a? + 1\n}\n");
    assert_eq!(outcome.traces.len(), 1);
    assert_eq!(outcome.traces[0].value, Value::Simple(2.0));
}

#[test]
fn parse_errors_surface_as_parse() {
    let err = try_run_with(
        "library {\n    x = \n}\n",
        &MemoryResolver::new(),
        RunnerConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, RunError::Parse(_)));
}
