//! Document emission tests.
//!
//! Covers:
//! 1. MathML and csymbol vocabulary for every expression form
//! 2. View and index normalisation
//! 3. Section elements, attributes and ordering
//! 4. Source locations on every element
//! 5. XML and JSON output

use fcp_document::{build_document, emit_expression, to_xml, DocumentError, Element};
use fcp_parser::{parse_expression, ParserConfig};
use fcp_types::{ErrorCode, SourceFile};
use pretty_assertions::assert_eq;

// ─────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────

fn doc(source: &str) -> Element {
    let sf = SourceFile::new("test.txt", source);
    build_document(&sf, &ParserConfig::default())
        .unwrap_or_else(|e| panic!("failed to build document: {e}"))
}

fn expr_doc(source: &str) -> Element {
    let sf = SourceFile::new("test.txt", source);
    let expr = parse_expression(&sf, &ParserConfig::default())
        .unwrap_or_else(|e| panic!("failed to parse {source:?}: {e}"));
    emit_expression(&expr, &sf)
}

/// Compact rendering: `(head args)` for applies, `#sym[text]` for
/// csymbols, bare text for `cn`/`ci`, `name(children)` otherwise.
fn sexp(el: &Element) -> String {
    let children = || el.children.iter().map(sexp).collect::<Vec<_>>().join(" ");
    match (el.name.as_str(), el.csymbol_name()) {
        (_, Some(sym)) => match &el.text {
            Some(text) => format!("#{sym}[{text}]"),
            None => format!("#{sym}"),
        },
        ("cn" | "ci", _) => el.text.clone().unwrap_or_default(),
        ("apply", _) => format!("({})", children()),
        _ if el.children.is_empty() => el.name.clone(),
        _ => format!("{}({})", el.name, children()),
    }
}

fn shown(source: &str) -> String {
    sexp(&expr_doc(source))
}

fn names(el: &Element) -> Vec<&str> {
    el.children.iter().map(|c| c.name.as_str()).collect()
}

fn child<'a>(el: &'a Element, name: &str) -> &'a Element {
    el.find(name)
        .unwrap_or_else(|| panic!("no <{name}> under <{}>", el.name))
}

const FULL_PROTOCOL: &str = r#"namespace oxmeta = "https://chaste.comlab.ox.ac.uk/cellml/ns/oxford-metadata"

inputs {
    max_time = 10
}

import std = "BasicLibrary.txt"
import "Other.txt" {
    threshold = 2
}

library {
    def double(x): x * 2
}

units {
    mV = milli volt "millivolts"
    per_ms = ms^-1
    degF = (5/9) kelvin + 459.67
}

model interface {
    independent var units ms
    input oxmeta:stim_amplitude units mV = -25.5
    output oxmeta:membrane_voltage units mV
    var local units mV = 0
    define diff(oxmeta:membrane_voltage; oxmeta:time) = 0 :: mV
    convert mV to ms by lambda rhs: rhs * 1
}

tasks {
    simulation sim = timecourse {
        range time units ms uniform 0:1:max_time
        modifiers {
            at start set oxmeta:stim_amplitude = 1
            at each loop save as state1
            at end reset to state1
        }
    }
    simulation outer = nested {
        range n units dimensionless vector [1, 2, 3]
        nests sim
    }
    simulation inner = nested {
        range k units dimensionless while k < 4
        nests simulation timecourse {
            range t units ms uniform 0:5
        }
    }
    simulation oneStep 1
}

post-processing {
    use imports std
    V = sim:membrane_voltage
    peak = MathML:max(V)
}

outputs {
    V = sim:oxmeta:membrane_voltage units mV "Membrane voltage"
    peak units mV
    raw = sim:time
}

plots {
    plot "Voltage" {
        V against raw
    }
}
"#;

// ─────────────────────────────────────────────────────────────────────
// Expressions
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_operators_are_mathml_applies() {
    assert_eq!(shown("1 + x * 2"), "(plus 1 (times x 2))");
    assert_eq!(shown("not a && b"), "(and (not a) b)");
    assert_eq!(shown("MathML:max(a, MathML:pi)"), "(max a pi)");
}

#[test]
fn test_literals() {
    assert_eq!(
        shown(r#"f("hi", null, default)"#),
        "(f #string[hi] #null #defaultParameter)"
    );
    assert_eq!(shown("(1, 2)"), "(#tuple 1 2)");
    assert_eq!(shown("[1, 2]"), "(#newArray 1 2)");

    let number = expr_doc("1.5 :: ms");
    assert_eq!(number.name, "cn");
    assert_eq!(number.text.as_deref(), Some("1.5"));
    assert_eq!(number.attribute("cellml:units"), Some("ms"));
}

#[test]
fn test_builtin_calls_use_csymbols() {
    assert_eq!(shown("map(f, a)"), "(#map f a)");
    assert_eq!(shown("fold(f, a, 0)"), "(#fold f a 0)");
    assert_eq!(shown("find(a)"), "(#find a)");
    assert_eq!(shown("g(1)"), "(g 1)");
}

#[test]
fn test_wrap_and_accessor() {
    assert_eq!(shown("@2:+"), "#wrap/2[plus]");
    assert_eq!(shown("@1:MathML:sin"), "#wrap/1[sin]");
    assert_eq!(shown("a.SHAPE"), "(#accessor[SHAPE] a)");
}

#[test]
fn test_if_becomes_piecewise() {
    assert_eq!(
        shown("if x then 1 else 2"),
        "piecewise(piece(1 x) otherwise(2))"
    );
}

#[test]
fn test_lambda_params_and_defaults() {
    assert_eq!(
        shown("lambda a, b=2: a + b"),
        "lambda(bvar(a) semantics(bvar(b) annotation-xml(2)) (plus a b))"
    );
    assert_eq!(
        shown("lambda a {\n    return a\n}"),
        "lambda(bvar(a) (#statementList (#return a)))"
    );
}

#[test]
fn test_comprehension_loops() {
    assert_eq!(
        shown("[i * 2 for i in 0:3]"),
        "(#newArray domainofapplication((#tuple 0 1 3 #string[i])) (times i 2))"
    );
    assert_eq!(
        shown("[i for 1$ i in 0:2:4]"),
        "(#newArray domainofapplication((#tuple 1 0 2 4 #string[i])) i)"
    );
}

#[test]
fn test_view_normalisation() {
    assert_eq!(
        shown("a[1:3]"),
        "(#view a (#tuple 1 1 3) (#tuple #null #null 1 #null))"
    );
    assert_eq!(
        shown("a[2]"),
        "(#view a (#tuple 2 0 2) (#tuple #null #null 1 #null))"
    );
    assert_eq!(
        shown("a[0$ 2]"),
        "(#view a (#tuple 0 2 0 2) (#tuple #null #null 1 #null))"
    );
    assert_eq!(
        shown("a[:]"),
        "(#view a (#tuple #null 1 #null) (#tuple #null #null 1 #null))"
    );
}

#[test]
fn test_generic_view_dimension_suppresses_default_tuple() {
    assert_eq!(
        shown("a[1$ 0][*$ 0:2:10]"),
        "(#view a (#tuple 1 0 0 0) (#tuple #null 0 2 10))"
    );
}

#[test]
fn test_index_modes() {
    assert_eq!(shown("a{i}"), "(#index a i)");
    assert_eq!(shown("a{i, shrink: 1}"), "(#index a i 1 1)");
    assert_eq!(
        shown("a{i, pad: 0 = -1}"),
        "(#index a i 0 #defaultParameter 1 -1)"
    );
}

#[test]
fn test_trace_marker_attribute() {
    let traced = expr_doc("x?");
    assert_eq!(traced.attribute("proto:trace"), Some("1"));
    let plain = expr_doc("x");
    assert_eq!(plain.attribute("proto:trace"), None);
}

// ─────────────────────────────────────────────────────────────────────
// Sections
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_empty_protocol_has_no_sections() {
    let root = doc("");
    assert_eq!(root.name, "protocol");
    assert!(root.children.is_empty());
    assert!(root.attributes.is_empty());
}

#[test]
fn test_section_order() {
    let root = doc(FULL_PROTOCOL);
    assert_eq!(
        names(&root),
        vec![
            "inputs",
            "import",
            "import",
            "library",
            "units",
            "modelInterface",
            "simulations",
            "post-processing",
            "outputVariables",
            "plots",
        ]
    );
    assert_eq!(
        root.attribute("xmlns:oxmeta"),
        Some("https://chaste.comlab.ox.ac.uk/cellml/ns/oxford-metadata")
    );
}

#[test]
fn test_imports() {
    let root = doc(FULL_PROTOCOL);
    let imports: Vec<&Element> = root.find_all("import").collect();
    assert_eq!(imports[0].attribute("source"), Some("BasicLibrary.txt"));
    assert_eq!(imports[0].attribute("prefix"), Some("std"));
    assert_eq!(imports[1].attribute("mergeDefinitions"), Some("true"));
    let set = child(imports[1], "setInput");
    assert_eq!(set.attribute("name"), Some("threshold"));
    assert_eq!(sexp(&set.children[0]), "2");
}

#[test]
fn test_units_are_cellml() {
    let root = doc(FULL_PROTOCOL);
    let units = child(&root, "units");
    assert_eq!(units.children.len(), 3);
    assert!(units.children.iter().all(|u| u.ns == fcp_document::Namespace::CellMl));

    let mv = &units.children[0];
    assert_eq!(mv.attribute("name"), Some("mV"));
    assert_eq!(mv.attribute("description"), Some("millivolts"));
    let unit = child(mv, "unit");
    assert_eq!(unit.attribute("prefix"), Some("milli"));
    assert_eq!(unit.attribute("units"), Some("volt"));

    assert_eq!(child(&units.children[1], "unit").attribute("exponent"), Some("-1"));

    let degf = child(&units.children[2], "unit");
    assert_eq!(degf.attribute("multiplier"), Some("0.5555555555555556"));
    assert_eq!(degf.attribute("units"), Some("kelvin"));
    assert_eq!(degf.attribute("offset"), Some("459.67"));
}

#[test]
fn test_model_interface_entries() {
    let root = doc(FULL_PROTOCOL);
    let interface = child(&root, "modelInterface");
    assert_eq!(
        names(interface),
        vec![
            "setIndependentVariableUnits",
            "specifyInputVariable",
            "specifyOutputVariable",
            "declareNewVariable",
            "addOrReplaceEquation",
            "unitsConversionRule",
        ]
    );
    let input = &interface.children[1];
    assert_eq!(input.attribute("name"), Some("oxmeta:stim_amplitude"));
    assert_eq!(input.attribute("units"), Some("mV"));
    assert_eq!(input.attribute("initial_value"), Some("-25.5"));

    let equation = &interface.children[4].children[0];
    assert_eq!(
        sexp(equation),
        "(eq (diff bvar(oxmeta:time) oxmeta:membrane_voltage) 0)"
    );
    assert_eq!(equation.children[2].attribute("cellml:units"), Some("mV"));

    let rule = &interface.children[5];
    assert_eq!(rule.attribute("actualDimensions"), Some("mV"));
    assert_eq!(rule.attribute("desiredDimensions"), Some("ms"));
    assert_eq!(sexp(&rule.children[0]), "lambda(bvar(rhs) (times rhs 1))");
}

#[test]
fn test_simulations() {
    let root = doc(FULL_PROTOCOL);
    let sims = child(&root, "simulations");
    assert_eq!(
        names(sims),
        vec![
            "timecourseSimulation",
            "nestedSimulation",
            "nestedSimulation",
            "oneStep"
        ]
    );

    let timecourse = &sims.children[0];
    assert_eq!(timecourse.attribute("prefix"), Some("sim"));
    let stepper = child(timecourse, "uniformStepper");
    assert_eq!(stepper.attribute("name"), Some("time"));
    assert_eq!(stepper.attribute("units"), Some("ms"));
    assert_eq!(sexp(child(stepper, "start")), "start(0)");
    assert_eq!(sexp(child(stepper, "stop")), "stop(max_time)");
    assert_eq!(sexp(child(stepper, "step")), "step(1)");

    let modifiers = child(timecourse, "modifiers");
    assert_eq!(names(modifiers), vec!["setVariable", "saveState", "resetState"]);
    let when = |i: usize| child(&modifiers.children[i], "when").text.clone();
    assert_eq!(when(0).as_deref(), Some("AT_START_ONLY"));
    assert_eq!(when(1).as_deref(), Some("EVERY_LOOP"));
    assert_eq!(when(2).as_deref(), Some("AT_END"));
    assert_eq!(
        child(&modifiers.children[2], "state").text.as_deref(),
        Some("state1")
    );

    let outer = &sims.children[1];
    assert_eq!(outer.attribute("prefix"), Some("outer"));
    assert!(outer.find("modifiers").is_none());
    let reference = &child(outer, "nests").children[0];
    assert_eq!(reference.name, "simulationRef");
    assert_eq!(reference.attribute("name"), Some("sim"));

    let inner = &sims.children[2];
    assert!(inner.find("whileStepper").is_some());
    let nested = &child(inner, "nests").children[0];
    assert_eq!(nested.name, "timecourseSimulation");
    assert_eq!(nested.attribute("prefix"), None);
    assert_eq!(
        sexp(child(child(nested, "uniformStepper"), "step")),
        "step(1)"
    );

    assert_eq!(sexp(&sims.children[3]), "oneStep(step(1))");
}

#[test]
fn test_post_processing_groups_statements() {
    let root = doc(FULL_PROTOCOL);
    let post = child(&root, "post-processing");
    assert_eq!(names(post), vec!["useImports", "apply"]);
    assert_eq!(post.children[0].attribute("prefix"), Some("std"));
    assert_eq!(
        sexp(&post.children[1]),
        "(#statementList (eq V sim:membrane_voltage) (eq peak (max V)))"
    );
}

#[test]
fn test_outputs_and_plots() {
    let root = doc(FULL_PROTOCOL);
    let outputs = child(&root, "outputVariables");
    assert_eq!(names(outputs), vec!["raw", "postprocessed", "raw"]);

    let v = &outputs.children[0];
    assert_eq!(v.attribute("ref"), Some("sim:oxmeta:membrane_voltage"));
    assert_eq!(v.attribute("units"), Some("millivolts"));
    assert_eq!(v.attribute("description"), Some("Membrane voltage"));
    assert_eq!(outputs.children[1].attribute("units"), Some("millivolts"));
    assert_eq!(outputs.children[2].attribute("units"), None);

    let plot = child(child(&root, "plots"), "plot");
    assert_eq!(child(plot, "title").text.as_deref(), Some("Voltage"));
    assert_eq!(sexp(child(plot, "curve")), "curve(y x)");
    let curve = child(plot, "curve");
    assert_eq!(child(curve, "y").text.as_deref(), Some("V"));
    assert_eq!(child(curve, "x").text.as_deref(), Some("raw"));
}

#[test]
fn test_assignment_forms() {
    let root = doc("library {\n    a, b = 1, 2\n    def f(x): x\n    assert a\n}\n");
    let list = &child(&root, "library").children[0];
    assert_eq!(
        sexp(list),
        "(#statementList (eq (#tuple a b) (#tuple 1 2)) (eq f lambda(bvar(x) x)) (#assert a))"
    );
}

// ─────────────────────────────────────────────────────────────────────
// Locations
// ─────────────────────────────────────────────────────────────────────

fn assert_all_located(el: &Element) {
    assert!(el.loc.is_some(), "<{}> has no location", el.name);
    for child in &el.children {
        assert_all_located(child);
    }
}

#[test]
fn test_every_element_is_located() {
    assert_all_located(&doc(FULL_PROTOCOL));
}

#[test]
fn test_location_format() {
    let root = doc("inputs {\n    x = 1\n}\n");
    assert_eq!(root.loc.as_deref(), Some("test.txt:1:1\tinputs {"));

    let inputs = child(&root, "inputs");
    assert_eq!(inputs.loc.as_deref(), Some("test.txt:1:8\tinputs {"));

    let assignment = &inputs.children[0].children[1];
    assert_eq!(assignment.loc.as_deref(), Some("test.txt:2:5\t    x = 1"));
    // The synthesised `eq` head shares its statement's location.
    assert_eq!(assignment.children[0].loc, assignment.loc);
    assert_eq!(
        assignment.children[2].loc.as_deref(),
        Some("test.txt:2:9\t    x = 1")
    );
}

// ─────────────────────────────────────────────────────────────────────
// Output formats and errors
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_xml_output() {
    let xml = to_xml(&doc(FULL_PROTOCOL));
    assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<protocol "));
    assert!(xml.contains("<cellml:units name=\"mV\" description=\"millivolts\""));
    assert!(xml.contains("<m:csymbol definitionURL=\"https://chaste.cs.ox.ac.uk/nss/protocol/statementList\""));
    assert!(xml.contains("proto:loc=\"test.txt:4:5&#9;    max_time = 10\""));
    assert!(xml.ends_with("</protocol>\n"));
}

#[test]
fn test_json_round_trip() {
    let root = doc(FULL_PROTOCOL);
    let json = root.to_json().unwrap();
    assert_eq!(Element::from_json(&json).unwrap(), root);
}

#[test]
fn test_parse_errors_pass_through() {
    let sf = SourceFile::new("bad.txt", "inputs {\n    x = )\n}\n");
    match build_document(&sf, &ParserConfig::default()) {
        Err(DocumentError::Parse(err)) => {
            assert_eq!(err.code, ErrorCode::UNEXPECTED_TOKEN);
            assert_eq!(err.file, "bad.txt");
        }
        other => panic!("expected a parse error, got {other:?}"),
    }
}
