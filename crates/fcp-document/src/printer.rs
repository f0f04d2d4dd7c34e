//! Compact-syntax printer.
//!
//! Renders a syntax tree back to protocol source. Parentheses are added
//! only where the grammar needs them, so re-parsing the output yields a
//! tree that emits the same document.

use fcp_types::ast::*;

const INDENT: &str = "    ";

// Binding strength of each expression form, loosest first. An operand is
// parenthesised when it binds more loosely than its position requires.
const PREC_OPEN: u8 = 0;
const PREC_LOGICAL: u8 = 1;
const PREC_RELATIONAL: u8 = 2;
const PREC_NOT: u8 = 3;
const PREC_ADDITIVE: u8 = 4;
const PREC_MULTIPLICATIVE: u8 = 5;
const PREC_UNARY: u8 = 6;
const PREC_POWER: u8 = 7;
const PREC_INDEX: u8 = 8;
const PREC_VIEW: u8 = 9;
const PREC_ACCESSOR: u8 = 10;
const PREC_ATOM: u8 = 11;

/// Render a whole protocol file.
pub fn print_protocol(protocol: &Protocol) -> String {
    let mut printer = Printer::default();
    printer.protocol(protocol);
    printer.out
}

/// Render one expression on a single line (lambda blocks excepted).
pub fn print_expression(expr: &Expr) -> String {
    Printer::default().expr(expr)
}

/// Render a statement list, one statement per line.
pub fn print_statements(block: &Block) -> String {
    let mut printer = Printer::default();
    printer.stmts(&block.stmts);
    printer.out
}

#[derive(Default)]
struct Printer {
    out: String,
    indent: usize,
}

impl Printer {
    fn line(&mut self, text: impl AsRef<str>) {
        self.out.push_str(&INDENT.repeat(self.indent));
        self.out.push_str(text.as_ref());
        self.out.push('\n');
    }

    fn open(&mut self, header: impl AsRef<str>) {
        self.line(format!("{} {{", header.as_ref()));
        self.indent += 1;
    }

    fn close(&mut self) {
        self.indent = self.indent.saturating_sub(1);
        self.line("}");
    }

    /// Blank line between top-level sections.
    fn section_break(&mut self) {
        if !self.out.is_empty() && !self.out.ends_with("\n\n") {
            self.out.push('\n');
        }
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Sections
    // ══════════════════════════════════════════════════════════════════════════

    fn protocol(&mut self, p: &Protocol) {
        for ns in &p.namespaces {
            self.line(format!("namespace {} = {}", ns.prefix.name, quote(&ns.uri)));
        }
        if let Some(inputs) = &p.inputs {
            self.section_break();
            self.open("inputs");
            self.stmts(&inputs.stmts);
            self.close();
        }
        if !p.imports.is_empty() {
            self.section_break();
            for import in &p.imports {
                self.import(import);
            }
        }
        if let Some(library) = &p.library {
            self.section_break();
            self.open("library");
            self.stmts(&library.stmts);
            self.close();
        }
        if let Some(units) = &p.units {
            self.section_break();
            self.open("units");
            for item in &units.items {
                match item {
                    UnitsItem::UseImports(u) => self.use_imports(u),
                    UnitsItem::Def(def) => self.line(units_def(def)),
                }
            }
            self.close();
        }
        if let Some(interface) = &p.model_interface {
            self.section_break();
            self.open("model interface");
            for entry in &interface.entries {
                let text = self.model_interface_entry(&entry.kind);
                self.line(text);
            }
            self.close();
        }
        if let Some(tasks) = &p.tasks {
            self.section_break();
            self.open("tasks");
            for sim in &tasks.simulations {
                self.simulation("", sim);
            }
            self.close();
        }
        if let Some(post) = &p.post_processing {
            self.section_break();
            self.open("post-processing");
            for item in &post.items {
                match item {
                    PostProcessingItem::UseImports(u) => self.use_imports(u),
                    PostProcessingItem::Stmt(stmt) => self.stmt(stmt),
                }
            }
            self.close();
        }
        if let Some(outputs) = &p.outputs {
            self.section_break();
            self.open("outputs");
            for item in &outputs.items {
                match item {
                    OutputItem::UseImports(u) => self.use_imports(u),
                    OutputItem::Output(spec) => self.line(output_spec(spec)),
                }
            }
            self.close();
        }
        if let Some(plots) = &p.plots {
            self.section_break();
            self.open("plots");
            for item in &plots.items {
                match item {
                    PlotItem::UseImports(u) => self.use_imports(u),
                    PlotItem::Plot(plot) => {
                        self.open(format!("plot {}", quote(&plot.title)));
                        for curve in &plot.curves {
                            let ys: Vec<&str> = curve.y.iter().map(|y| y.name.as_str()).collect();
                            self.line(format!("{} against {}", ys.join(", "), curve.x.name));
                        }
                        self.close();
                    }
                }
            }
            self.close();
        }
    }

    fn import(&mut self, import: &Import) {
        let mut header = String::from("import ");
        if let Some(prefix) = &import.prefix {
            header.push_str(&format!("{} = ", prefix.name));
        }
        header.push_str(&quote(&import.source));
        if import.set_inputs.is_empty() {
            self.line(header);
        } else {
            self.open(header);
            self.stmts(&import.set_inputs);
            self.close();
        }
    }

    fn use_imports(&mut self, use_imports: &UseImports) {
        self.line(format!("use imports {}", use_imports.prefix.name));
    }

    fn model_interface_entry(&self, kind: &ModelInterfaceKind) -> String {
        match kind {
            ModelInterfaceKind::UseImports(prefix) => format!("use imports {}", prefix.name),
            ModelInterfaceKind::IndependentVarUnits(units) => {
                format!("independent var units {}", units.name)
            }
            ModelInterfaceKind::Input {
                name,
                units,
                initial,
            } => format!(
                "input {}{}{}",
                name.name,
                units_suffix(units.as_ref()),
                initial_suffix(initial.as_ref())
            ),
            ModelInterfaceKind::Output { name, units } => {
                format!("output {}{}", name.name, units_suffix(units.as_ref()))
            }
            ModelInterfaceKind::Var {
                name,
                units,
                initial,
            } => format!(
                "var {} units {}{}",
                name.name,
                units.name,
                initial_suffix(initial.as_ref())
            ),
            ModelInterfaceKind::Define { target, value } => {
                let target = match target {
                    DefineTarget::Variable(var) => var.name.clone(),
                    DefineTarget::Derivative { variable, bvar } => {
                        format!("diff({}; {})", variable.name, bvar.name)
                    }
                };
                format!("define {target} = {}", self.expr(value))
            }
            ModelInterfaceKind::Convert { from, to, rule } => {
                format!("convert {} to {} by {}", from.name, to.name, self.lambda(rule))
            }
        }
    }

    /// `lead` is `nests ` when the simulation is the body of a nested one.
    fn simulation(&mut self, lead: &str, sim: &Simulation) {
        let mut header = format!("{lead}simulation ");
        if let Some(name) = &sim.name {
            header.push_str(&format!("{} = ", name.name));
        }
        match &sim.kind {
            SimulationKind::Timecourse { range, modifiers } => {
                self.open(format!("{header}timecourse"));
                self.simulation_head(range, modifiers);
                self.close();
            }
            SimulationKind::Nested {
                range,
                modifiers,
                nested,
            } => {
                self.open(format!("{header}nested"));
                self.simulation_head(range, modifiers);
                match nested.as_ref() {
                    NestedTarget::Simulation(inner) => self.simulation("nests ", inner),
                    NestedTarget::Reference(name) => self.line(format!("nests {}", name.name)),
                }
                self.close();
            }
            SimulationKind::OneStep(step) => match step {
                Some(step) => {
                    let step = self.expr(step);
                    self.line(format!("{header}oneStep {step}"));
                }
                None => self.line(format!("{header}oneStep")),
            },
        }
    }

    fn simulation_head(&mut self, range: &Range, modifiers: &[Modifier]) {
        let kind = match &range.kind {
            RangeKind::Uniform { start, step, end } => {
                format!("uniform {}", self.range_bounds(start, step.as_ref(), end))
            }
            RangeKind::Vector(values) => format!("vector {}", self.expr(values)),
            RangeKind::While(condition) => format!("while {}", self.expr(condition)),
        };
        self.line(format!(
            "range {} units {} {kind}",
            range.name.name, range.units.name
        ));
        if modifiers.is_empty() {
            return;
        }
        self.open("modifiers");
        for modifier in modifiers {
            let when = match modifier.when {
                ModifierWhen::AtStart => "start",
                ModifierWhen::EveryLoop => "each loop",
                ModifierWhen::AtEnd => "end",
            };
            let action = match &modifier.action {
                ModifierAction::SetVariable { name, value } => {
                    format!("set {} = {}", name.name, self.expr(value))
                }
                ModifierAction::SaveState(name) => format!("save as {}", name.name),
                ModifierAction::ResetState(Some(name)) => format!("reset to {}", name.name),
                ModifierAction::ResetState(None) => "reset".to_string(),
            };
            self.line(format!("at {when} {action}"));
        }
        self.close();
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Statements
    // ══════════════════════════════════════════════════════════════════════════

    fn stmts(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.stmt(stmt);
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Assign { targets, values } => {
                let targets: Vec<&str> = targets.iter().map(|t| t.name.as_str()).collect();
                let values = self.expr_list(values);
                self.line(format!("{} = {values}", targets.join(", ")));
            }
            StmtKind::Return(values) => {
                let values = self.expr_list(values);
                self.line(format!("return {values}"));
            }
            StmtKind::Assert(expr) => {
                let expr = self.expr(expr);
                self.line(format!("assert {expr}"));
            }
            StmtKind::FunctionDef { name, lambda } => {
                let params = self.params(&lambda.params);
                match &lambda.body {
                    LambdaBody::Expr(body) => {
                        let body = self.expr(body);
                        self.line(format!("def {}({params}): {body}", name.name));
                    }
                    LambdaBody::Block(block) => {
                        self.open(format!("def {}({params})", name.name));
                        self.stmts(&block.stmts);
                        self.close();
                    }
                }
            }
        }
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Expressions
    // ══════════════════════════════════════════════════════════════════════════

    fn expr(&self, expr: &Expr) -> String {
        if expr.traced {
            let body = Expr::new(expr.kind.clone(), expr.span);
            let text = self.expr(&body);
            return if precedence(&body) == PREC_ATOM {
                format!("{text}?")
            } else {
                format!("({text})?")
            };
        }
        match &expr.kind {
            ExprKind::Number(lit) => match &lit.units {
                Some(units) => format!("{}::{}", lit.text, units.name),
                None => lit.text.clone(),
            },
            ExprKind::Constant(constant) => format!("MathML:{}", constant.mathml_name()),
            ExprKind::Variable(name) => name.clone(),
            ExprKind::StringLit(value) => quote(value),
            ExprKind::Null => "null".to_string(),
            ExprKind::Default => "default".to_string(),
            ExprKind::Operator { op, operands } => self.operator(*op, operands),
            ExprKind::Tuple(items) => match items.as_slice() {
                [only] => format!("({},)", self.expr(only)),
                _ => format!("({})", self.expr_list(items)),
            },
            ExprKind::Lambda(lambda) => self.lambda(lambda),
            ExprKind::FunctionCall { callee, args } => {
                format!("{}({})", callee.name, self.expr_list(args))
            }
            ExprKind::Accessor { target, accessor } => {
                format!("{}.{}", self.operand(target, PREC_ACCESSOR), accessor.name())
            }
            ExprKind::Array(items) => format!("[{}]", self.expr_list(items)),
            ExprKind::Comprehension { generator, loops } => {
                let mut text = format!("[{}", self.expr(generator));
                for l in loops {
                    text.push_str(" for ");
                    if let Some(dim) = &l.dimension {
                        text.push_str(&format!("{}$ ", self.operand(dim, PREC_LOGICAL)));
                    }
                    text.push_str(&format!(
                        "{} in {}",
                        l.variable.name,
                        self.range_bounds(&l.start, l.step.as_ref(), &l.end)
                    ));
                }
                text.push(']');
                text
            }
            ExprKind::View { target, specs } => {
                let mut text = self.operand(target, PREC_ACCESSOR);
                for spec in specs {
                    text.push_str(&self.view_spec(spec));
                }
                text
            }
            ExprKind::Index {
                target,
                indices,
                mode,
            } => {
                let target = self.operand(target, PREC_INDEX);
                let indices = self.expr(indices);
                match mode {
                    IndexMode::Plain => format!("{target}{{{indices}}}"),
                    IndexMode::Shrink { dimension } => {
                        format!("{target}{{{indices}, shrink: {}}}", self.expr(dimension))
                    }
                    IndexMode::Pad { dimension, value } => format!(
                        "{target}{{{indices}, pad: {} = {}}}",
                        self.expr(dimension),
                        self.expr(value)
                    ),
                }
            }
            ExprKind::If {
                condition,
                then_branch,
                else_branch,
            } => format!(
                "if {} then {} else {}",
                self.expr(condition),
                self.expr(then_branch),
                self.expr(else_branch)
            ),
            ExprKind::Wrap { arity, op } => match op.symbol() {
                Some(symbol) => format!("@{arity}:{symbol}"),
                None => format!("@{arity}:MathML:{}", op.mathml_name()),
            },
        }
    }

    fn operator(&self, op: Operator, operands: &[Expr]) -> String {
        match (op.symbol(), operands) {
            (Some(_), [operand]) if op == Operator::Minus => {
                let text = self.operand(operand, PREC_UNARY);
                if text.starts_with('-') {
                    format!("-({text})")
                } else {
                    format!("-{text}")
                }
            }
            (Some(_), [operand]) if op == Operator::Not => {
                format!("not {}", self.operand(operand, PREC_NOT))
            }
            (Some(symbol), [left, right]) if op != Operator::Not => {
                let level = binary_precedence(op);
                let (left_min, right_min) = if op == Operator::Power {
                    (PREC_POWER, PREC_INDEX)
                } else {
                    (level, level + 1)
                };
                format!(
                    "{} {symbol} {}",
                    self.operand(left, left_min),
                    self.operand(right, right_min)
                )
            }
            _ => format!("MathML:{}({})", op.mathml_name(), self.expr_list(operands)),
        }
    }

    /// Print `expr`, parenthesised if it binds more loosely than `min`.
    fn operand(&self, expr: &Expr, min: u8) -> String {
        let text = self.expr(expr);
        if precedence(expr) < min {
            format!("({text})")
        } else {
            text
        }
    }

    fn expr_list(&self, exprs: &[Expr]) -> String {
        exprs
            .iter()
            .map(|e| self.expr(e))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn params(&self, params: &[Param]) -> String {
        params
            .iter()
            .map(|param| match &param.default {
                Some(default) => format!("{}={}", param.name.name, self.operand(default, PREC_LOGICAL)),
                None => param.name.name.clone(),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn lambda(&self, lambda: &Lambda) -> String {
        let params = self.params(&lambda.params);
        let head = if params.is_empty() {
            "lambda".to_string()
        } else {
            format!("lambda {params}")
        };
        match &lambda.body {
            LambdaBody::Expr(body) => {
                let colon = match lambda.params.last() {
                    Some(Param {
                        default: Some(_), ..
                    }) if ends_with_word(&head) => " :",
                    _ => ":",
                };
                format!("{head}{colon} {}", self.expr(body))
            }
            LambdaBody::Block(block) => {
                let mut inner = Printer {
                    out: String::new(),
                    indent: self.indent + 1,
                };
                inner.stmts(&block.stmts);
                format!(
                    "{head} {{\n{}{}}}",
                    inner.out,
                    INDENT.repeat(self.indent)
                )
            }
        }
    }

    fn view_spec(&self, spec: &ViewSpec) -> String {
        let mut text = String::from("[");
        match &spec.dimension {
            Some(ViewDimension::Pinned(dim)) => {
                text.push_str(&format!("{}$ ", self.operand(dim, PREC_LOGICAL)));
            }
            Some(ViewDimension::Generic) => text.push_str("*$ "),
            None => {}
        }
        let bound = |e: &Option<Expr>| match e {
            Some(e) => self.operand(e, PREC_LOGICAL),
            None => String::new(),
        };
        let parts = match &spec.slice {
            Slice::Single(value) => vec![bound(value)],
            Slice::Range { start, end } => vec![bound(start), bound(end)],
            Slice::Stepped { start, step, end } => vec![bound(start), bound(step), bound(end)],
        };
        text.push_str(&colon_join(&parts));
        text.push(']');
        text
    }

    fn range_bounds(&self, start: &Expr, step: Option<&Expr>, end: &Expr) -> String {
        let mut parts = vec![self.operand(start, PREC_LOGICAL)];
        if let Some(step) = step {
            parts.push(self.operand(step, PREC_LOGICAL));
        }
        parts.push(self.operand(end, PREC_LOGICAL));
        colon_join(&parts)
    }
}

fn precedence(expr: &Expr) -> u8 {
    if expr.traced {
        return PREC_ATOM;
    }
    match &expr.kind {
        ExprKind::If { .. } | ExprKind::Lambda(_) => PREC_OPEN,
        ExprKind::Number(lit) if lit.text.starts_with('-') => PREC_UNARY,
        ExprKind::Operator { op, operands } => match (op.symbol(), operands.len()) {
            (Some(_), 1) if *op == Operator::Minus => PREC_UNARY,
            (Some(_), 1) if *op == Operator::Not => PREC_NOT,
            (Some(_), 2) if *op != Operator::Not => binary_precedence(*op),
            _ => PREC_ATOM,
        },
        ExprKind::Index { .. } => PREC_INDEX,
        ExprKind::View { .. } => PREC_VIEW,
        ExprKind::Accessor { .. } => PREC_ACCESSOR,
        _ => PREC_ATOM,
    }
}

fn binary_precedence(op: Operator) -> u8 {
    match op {
        Operator::And | Operator::Or => PREC_LOGICAL,
        Operator::Plus | Operator::Minus => PREC_ADDITIVE,
        Operator::Times | Operator::Divide => PREC_MULTIPLICATIVE,
        Operator::Power => PREC_POWER,
        _ => PREC_RELATIONAL,
    }
}

/// Whether `text` ends in a name that a following `:` could qualify.
fn ends_with_word(text: &str) -> bool {
    let head = text.trim_end_matches(|c: char| c.is_ascii_alphanumeric() || c == '_');
    text[head.len()..]
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
}

/// Join slice or range parts with `:`, keeping empty slots from fusing into
/// `::` and names from fusing into `prefix:name`.
fn colon_join(parts: &[String]) -> String {
    let mut text = String::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            if text.ends_with(':') || ends_with_word(&text) {
                text.push(' ');
            }
            text.push(':');
        }
        text.push_str(part);
    }
    text
}

fn quote(value: &str) -> String {
    let mut text = String::with_capacity(value.len() + 2);
    text.push('"');
    for ch in value.chars() {
        match ch {
            '\\' => text.push_str("\\\\"),
            '"' => text.push_str("\\\""),
            '\n' => text.push_str("\\n"),
            '\t' => text.push_str("\\t"),
            _ => text.push(ch),
        }
    }
    text.push('"');
    text
}

fn units_suffix(units: Option<&Ident>) -> String {
    units.map(|u| format!(" units {}", u.name)).unwrap_or_default()
}

fn initial_suffix(initial: Option<&NumberLit>) -> String {
    initial.map(|n| format!(" = {}", n.text)).unwrap_or_default()
}

fn units_def(def: &UnitsDef) -> String {
    let refs: Vec<String> = def.refs.iter().map(unit_ref).collect();
    let mut text = format!("{} = {}", def.name.name, refs.join(" . "));
    if let Some(description) = &def.description {
        text.push(' ');
        text.push_str(&quote(description));
    }
    text
}

fn unit_ref(unit: &UnitRef) -> String {
    let mut parts = Vec::new();
    if let Some(multiplier) = &unit.multiplier {
        parts.push(multiplier.clone());
    }
    if let Some(prefix) = &unit.prefix {
        parts.push(prefix.clone());
    }
    match &unit.exponent {
        Some(exponent) => parts.push(format!("{}^{exponent}", unit.base.name)),
        None => parts.push(unit.base.name.clone()),
    }
    if let Some(offset) = &unit.offset {
        match offset.strip_prefix('-') {
            Some(magnitude) => parts.push(format!("- {magnitude}")),
            None => parts.push(format!("+ {offset}")),
        }
    }
    parts.join(" ")
}

fn output_spec(spec: &OutputSpec) -> String {
    let mut text = spec.name.name.clone();
    if let Some(reference) = &spec.reference {
        text.push_str(&format!(" = {}", reference.name));
    }
    text.push_str(&units_suffix(spec.units.as_ref()));
    if let Some(description) = &spec.description {
        text.push(' ');
        text.push_str(&quote(description));
    }
    text
}
