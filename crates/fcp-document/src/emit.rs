//! Syntax tree → structured document.
//!
//! Expressions become MathML subtrees; constructs MathML has no element
//! for are written as `apply` over a protocol csymbol (`tuple`, `newArray`,
//! `view`, `index`, `accessor`, `wrap/N`, `statementList`, `return`,
//! `assert`, `null`, `defaultParameter`, `string`, `map`, `fold`, `find`).
//! Every element carries the location of the construct it came from;
//! elements synthesised for normalisation inherit their parent's location.

use fcp_types::ast::*;
use fcp_types::{SourceFile, Span};

use crate::element::Element;

/// Build the document for a parsed protocol. Absent sections produce no
/// elements.
pub fn emit_protocol(protocol: &Protocol, source: &SourceFile) -> Element {
    Emitter { source }.protocol(protocol)
}

/// Build the MathML subtree for a single expression.
pub fn emit_expression(expr: &Expr, source: &SourceFile) -> Element {
    Emitter { source }.expr(expr)
}

/// Build a `statementList` apply for a statement block.
pub fn emit_statements(block: &Block, source: &SourceFile) -> Element {
    Emitter { source }.statement_list(block)
}

struct Emitter<'a> {
    source: &'a SourceFile,
}

impl Emitter<'_> {
    /// Stamp `span`'s location on `el` and on every descendant that has
    /// none yet.
    fn finish(&self, mut el: Element, span: Span) -> Element {
        fill_location(&mut el, &self.source.location(span));
        el
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Sections
    // ══════════════════════════════════════════════════════════════════════════

    fn protocol(&self, p: &Protocol) -> Element {
        let mut root = Element::proto("protocol");
        for ns in &p.namespaces {
            root = root.attr(format!("xmlns:{}", ns.prefix.name), ns.uri.clone());
        }
        if let Some(inputs) = &p.inputs {
            root = root.child(self.finish(
                Element::proto("inputs").child(self.statement_list(inputs)),
                inputs.span,
            ));
        }
        root = root.children(p.imports.iter().map(|i| self.import(i)));
        if let Some(library) = &p.library {
            root = root.child(self.finish(
                Element::proto("library").child(self.statement_list(library)),
                library.span,
            ));
        }
        if let Some(units) = &p.units {
            root = root.child(self.units(units));
        }
        if let Some(interface) = &p.model_interface {
            root = root.child(self.model_interface(interface));
        }
        if let Some(tasks) = &p.tasks {
            let sims = tasks.simulations.iter().map(|s| self.simulation(s));
            root = root.child(self.finish(Element::proto("simulations").children(sims), tasks.span));
        }
        if let Some(post) = &p.post_processing {
            root = root.child(self.post_processing(post));
        }
        if let Some(outputs) = &p.outputs {
            root = root.child(self.outputs(outputs));
        }
        if let Some(plots) = &p.plots {
            root = root.child(self.plots(plots));
        }
        self.finish(root, p.span)
    }

    fn import(&self, import: &Import) -> Element {
        let mut el = Element::proto("import").attr("source", import.source.clone());
        el = match &import.prefix {
            Some(prefix) => el.attr("prefix", prefix.name.clone()),
            None => el.attr("mergeDefinitions", "true"),
        };
        for stmt in &import.set_inputs {
            let StmtKind::Assign { targets, values } = &stmt.kind else {
                continue;
            };
            if let (Some(target), Some(value)) = (targets.first(), values.first()) {
                let set = Element::proto("setInput")
                    .attr("name", target.name.clone())
                    .child(self.expr(value));
                el = el.child(self.finish(set, stmt.span));
            }
        }
        self.finish(el, import.span)
    }

    fn use_imports(&self, use_imports: &UseImports) -> Element {
        self.finish(
            Element::proto("useImports").attr("prefix", use_imports.prefix.name.clone()),
            use_imports.span,
        )
    }

    // ── Units ──────────────────────────────────────────────────────────────

    fn units(&self, units: &UnitsSection) -> Element {
        let items = units.items.iter().map(|item| match item {
            UnitsItem::UseImports(u) => self.use_imports(u),
            UnitsItem::Def(def) => self.units_def(def),
        });
        self.finish(Element::proto("units").children(items), units.span)
    }

    fn units_def(&self, def: &UnitsDef) -> Element {
        let mut el = Element::cellml("units").attr("name", def.name.name.clone());
        if let Some(description) = &def.description {
            el = el.attr("description", description.clone());
        }
        let refs = def.refs.iter().map(|r| self.unit_ref(r));
        self.finish(el.children(refs), def.span)
    }

    fn unit_ref(&self, unit: &UnitRef) -> Element {
        let mut el = Element::cellml("unit");
        if let Some(prefix) = &unit.prefix {
            el = el.attr("prefix", prefix.clone());
        }
        el = el.attr("units", unit.base.name.clone());
        for (key, value) in [
            ("exponent", &unit.exponent),
            ("multiplier", &unit.multiplier),
            ("offset", &unit.offset),
        ] {
            if let Some(value) = value {
                el = el.attr(key, value.clone());
            }
        }
        self.finish(el, unit.span)
    }

    // ── Model interface ────────────────────────────────────────────────────

    fn model_interface(&self, interface: &ModelInterface) -> Element {
        let entries = interface
            .entries
            .iter()
            .map(|e| self.model_interface_entry(e));
        self.finish(
            Element::proto("modelInterface").children(entries),
            interface.span,
        )
    }

    fn model_interface_entry(&self, entry: &ModelInterfaceEntry) -> Element {
        let el = match &entry.kind {
            ModelInterfaceKind::UseImports(prefix) => {
                Element::proto("useImports").attr("prefix", prefix.name.clone())
            }
            ModelInterfaceKind::IndependentVarUnits(units) => {
                Element::proto("setIndependentVariableUnits").attr("units", units.name.clone())
            }
            ModelInterfaceKind::Input {
                name,
                units,
                initial,
            } => with_variable_attrs(
                Element::proto("specifyInputVariable"),
                name,
                units.as_ref(),
                initial.as_ref(),
            ),
            ModelInterfaceKind::Output { name, units } => with_variable_attrs(
                Element::proto("specifyOutputVariable"),
                name,
                units.as_ref(),
                None,
            ),
            ModelInterfaceKind::Var {
                name,
                units,
                initial,
            } => with_variable_attrs(
                Element::proto("declareNewVariable"),
                name,
                Some(units),
                initial.as_ref(),
            ),
            ModelInterfaceKind::Define { target, value } => {
                let lhs = match target {
                    DefineTarget::Variable(var) => ci(&var.name),
                    DefineTarget::Derivative { variable, bvar } => Element::mathml("apply")
                        .child(Element::mathml("diff"))
                        .child(Element::mathml("bvar").child(ci(&bvar.name)))
                        .child(ci(&variable.name)),
                };
                let equation = apply(Element::mathml("eq"), [lhs, self.expr(value)]);
                Element::proto("addOrReplaceEquation").child(equation)
            }
            ModelInterfaceKind::Convert { from, to, rule } => {
                Element::proto("unitsConversionRule")
                    .attr("actualDimensions", from.name.clone())
                    .attr("desiredDimensions", to.name.clone())
                    .child(self.lambda(rule))
            }
        };
        self.finish(el, entry.span)
    }

    // ── Simulations ────────────────────────────────────────────────────────

    fn simulation(&self, sim: &Simulation) -> Element {
        let (name, children) = match &sim.kind {
            SimulationKind::Timecourse { range, modifiers } => {
                let mut children = vec![self.range(range)];
                children.extend(self.modifiers(modifiers));
                ("timecourseSimulation", children)
            }
            SimulationKind::Nested {
                range,
                modifiers,
                nested,
            } => {
                let mut children = vec![self.range(range)];
                children.extend(self.modifiers(modifiers));
                let inner = match nested.as_ref() {
                    NestedTarget::Simulation(inner) => self.simulation(inner),
                    NestedTarget::Reference(name) => self.finish(
                        Element::proto("simulationRef").attr("name", name.name.clone()),
                        name.span,
                    ),
                };
                children.push(Element::proto("nests").child(inner));
                ("nestedSimulation", children)
            }
            SimulationKind::OneStep(step) => {
                let children = step
                    .iter()
                    .map(|s| Element::proto("step").child(self.expr(s)))
                    .collect();
                ("oneStep", children)
            }
        };
        let mut el = Element::proto(name);
        if let Some(prefix) = &sim.name {
            el = el.attr("prefix", prefix.name.clone());
        }
        self.finish(el.children(children), sim.span)
    }

    fn range(&self, range: &Range) -> Element {
        let el = match &range.kind {
            RangeKind::Uniform { start, step, end } => {
                let step = match step {
                    Some(step) => self.expr(step),
                    None => cn("1"),
                };
                Element::proto("uniformStepper")
                    .child(Element::proto("start").child(self.expr(start)))
                    .child(Element::proto("stop").child(self.expr(end)))
                    .child(Element::proto("step").child(step))
            }
            RangeKind::Vector(values) => {
                Element::proto("vectorStepper").child(Element::proto("value").child(self.expr(values)))
            }
            RangeKind::While(condition) => Element::proto("whileStepper")
                .child(Element::proto("condition").child(self.expr(condition))),
        };
        self.finish(
            el.attr("name", range.name.name.clone())
                .attr("units", range.units.name.clone()),
            range.span,
        )
    }

    fn modifiers(&self, modifiers: &[Modifier]) -> Option<Element> {
        if modifiers.is_empty() {
            return None;
        }
        Some(Element::proto("modifiers").children(modifiers.iter().map(|m| self.modifier(m))))
    }

    fn modifier(&self, modifier: &Modifier) -> Element {
        let when = Element::proto("when").with_text(match modifier.when {
            ModifierWhen::AtStart => "AT_START_ONLY",
            ModifierWhen::EveryLoop => "EVERY_LOOP",
            ModifierWhen::AtEnd => "AT_END",
        });
        let el = match &modifier.action {
            ModifierAction::SetVariable { name, value } => Element::proto("setVariable")
                .child(when)
                .child(Element::proto("name").with_text(name.name.clone()))
                .child(Element::proto("value").child(self.expr(value))),
            ModifierAction::SaveState(name) => Element::proto("saveState")
                .child(when)
                .child(Element::proto("name").with_text(name.name.clone())),
            ModifierAction::ResetState(state) => {
                let el = Element::proto("resetState").child(when);
                match state {
                    Some(state) => el.child(Element::proto("state").with_text(state.name.clone())),
                    None => el,
                }
            }
        };
        self.finish(el, modifier.span)
    }

    // ── Post-processing, outputs, plots ────────────────────────────────────

    /// Runs of statements are grouped into statement lists; `use imports`
    /// may sit between them.
    fn post_processing(&self, post: &PostProcessing) -> Element {
        let mut children = Vec::new();
        let mut run: Vec<&Stmt> = Vec::new();
        for item in &post.items {
            match item {
                PostProcessingItem::UseImports(u) => {
                    if !run.is_empty() {
                        children.push(self.statement_run(&run));
                        run.clear();
                    }
                    children.push(self.use_imports(u));
                }
                PostProcessingItem::Stmt(stmt) => run.push(stmt),
            }
        }
        if !run.is_empty() {
            children.push(self.statement_run(&run));
        }
        self.finish(Element::proto("post-processing").children(children), post.span)
    }

    fn statement_run(&self, stmts: &[&Stmt]) -> Element {
        let span = match (stmts.first(), stmts.last()) {
            (Some(first), Some(last)) => first.span.merge(last.span),
            _ => Span::point(1, 1),
        };
        self.finish(
            apply(
                Element::csymbol("statementList"),
                stmts.iter().map(|s| self.stmt(s)),
            ),
            span,
        )
    }

    fn outputs(&self, outputs: &OutputsSection) -> Element {
        let items = outputs.items.iter().map(|item| match item {
            OutputItem::UseImports(u) => self.use_imports(u),
            OutputItem::Output(spec) => self.output_spec(spec),
        });
        self.finish(Element::proto("outputVariables").children(items), outputs.span)
    }

    fn output_spec(&self, spec: &OutputSpec) -> Element {
        let mut el = match &spec.reference {
            Some(reference) => Element::proto("raw")
                .attr("name", spec.name.name.clone())
                .attr("ref", reference.name.clone()),
            None => Element::proto("postprocessed").attr("name", spec.name.name.clone()),
        };
        if let Some(label) = &spec.units_label {
            el = el.attr("units", label.clone());
        }
        if let Some(description) = &spec.description {
            el = el.attr("description", description.clone());
        }
        self.finish(el, spec.span)
    }

    fn plots(&self, plots: &PlotsSection) -> Element {
        let items = plots.items.iter().map(|item| match item {
            PlotItem::UseImports(u) => self.use_imports(u),
            PlotItem::Plot(plot) => {
                let curves = plot.curves.iter().map(|curve| {
                    let ys = curve
                        .y
                        .iter()
                        .map(|y| Element::proto("y").with_text(y.name.clone()));
                    self.finish(
                        Element::proto("curve")
                            .children(ys)
                            .child(Element::proto("x").with_text(curve.x.name.clone())),
                        curve.span,
                    )
                });
                self.finish(
                    Element::proto("plot")
                        .child(Element::proto("title").with_text(plot.title.clone()))
                        .children(curves),
                    plot.span,
                )
            }
        });
        self.finish(Element::proto("plots").children(items), plots.span)
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Statements
    // ══════════════════════════════════════════════════════════════════════════

    fn statement_list(&self, block: &Block) -> Element {
        self.finish(
            apply(
                Element::csymbol("statementList"),
                block.stmts.iter().map(|s| self.stmt(s)),
            ),
            block.span,
        )
    }

    fn stmt(&self, stmt: &Stmt) -> Element {
        let el = match &stmt.kind {
            StmtKind::Assign { targets, values } => {
                let lhs = maybe_tuple(
                    targets
                        .iter()
                        .map(|t| self.finish(ci(&t.name), t.span))
                        .collect(),
                );
                let rhs = maybe_tuple(values.iter().map(|v| self.expr(v)).collect());
                apply(Element::mathml("eq"), [lhs, rhs])
            }
            StmtKind::Return(values) => {
                apply(Element::csymbol("return"), values.iter().map(|v| self.expr(v)))
            }
            StmtKind::Assert(expr) => apply(Element::csymbol("assert"), [self.expr(expr)]),
            StmtKind::FunctionDef { name, lambda } => apply(
                Element::mathml("eq"),
                [self.finish(ci(&name.name), name.span), self.lambda(lambda)],
            ),
        };
        self.finish(el, stmt.span)
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Expressions
    // ══════════════════════════════════════════════════════════════════════════

    fn expr(&self, expr: &Expr) -> Element {
        let mut el = match &expr.kind {
            ExprKind::Number(lit) => {
                let el = cn(&lit.text);
                match &lit.units {
                    Some(units) => el.attr("cellml:units", units.name.clone()),
                    None => el,
                }
            }
            ExprKind::Constant(constant) => Element::mathml(constant.mathml_name()),
            ExprKind::Variable(name) => ci(name),
            ExprKind::StringLit(value) => Element::csymbol("string").with_text(value.clone()),
            ExprKind::Null => Element::csymbol("null"),
            ExprKind::Default => Element::csymbol("defaultParameter"),
            ExprKind::Operator { op, operands } => apply(
                Element::mathml(op.mathml_name()),
                operands.iter().map(|o| self.expr(o)),
            ),
            ExprKind::Tuple(items) => tuple(items.iter().map(|i| self.expr(i)).collect()),
            ExprKind::Lambda(lambda) => self.lambda(lambda),
            ExprKind::FunctionCall { callee, args } => {
                let func = match callee.name.as_str() {
                    "map" | "fold" | "find" => Element::csymbol(&callee.name),
                    _ => ci(&callee.name),
                };
                apply(
                    self.finish(func, callee.span),
                    args.iter().map(|a| self.expr(a)),
                )
            }
            ExprKind::Accessor { target, accessor } => apply(
                Element::csymbol("accessor").with_text(accessor.name()),
                [self.expr(target)],
            ),
            ExprKind::Array(items) => apply(
                Element::csymbol("newArray"),
                items.iter().map(|i| self.expr(i)),
            ),
            ExprKind::Comprehension { generator, loops } => {
                let domain = Element::mathml("domainofapplication")
                    .children(loops.iter().map(|l| self.comprehension_loop(l)));
                apply(
                    Element::csymbol("newArray"),
                    [domain, self.expr(generator)],
                )
            }
            ExprKind::View { target, specs } => self.view(target, specs),
            ExprKind::Index {
                target,
                indices,
                mode,
            } => {
                let mut content = vec![self.expr(target), self.expr(indices)];
                match mode {
                    IndexMode::Plain => {}
                    IndexMode::Shrink { dimension } => {
                        content.push(self.expr(dimension));
                        content.push(cn("1"));
                    }
                    IndexMode::Pad { dimension, value } => {
                        content.push(self.expr(dimension));
                        content.push(Element::csymbol("defaultParameter"));
                        content.push(cn("1"));
                        content.push(self.expr(value));
                    }
                }
                apply(Element::csymbol("index"), content)
            }
            ExprKind::If {
                condition,
                then_branch,
                else_branch,
            } => Element::mathml("piecewise")
                .child(
                    Element::mathml("piece")
                        .child(self.expr(then_branch))
                        .child(self.expr(condition)),
                )
                .child(Element::mathml("otherwise").child(self.expr(else_branch))),
            ExprKind::Wrap { arity, op } => {
                Element::csymbol(&format!("wrap/{arity}")).with_text(op.mathml_name())
            }
        };
        if expr.traced {
            el = el.attr("proto:trace", "1");
        }
        self.finish(el, expr.span)
    }

    fn lambda(&self, lambda: &Lambda) -> Element {
        let mut el = Element::mathml("lambda");
        for param in &lambda.params {
            let bvar = Element::mathml("bvar").child(self.finish(ci(&param.name.name), param.name.span));
            el = el.child(match &param.default {
                None => bvar,
                Some(default) => Element::mathml("semantics")
                    .child(bvar)
                    .child(Element::mathml("annotation-xml").child(self.expr(default))),
            });
        }
        let body = match &lambda.body {
            LambdaBody::Expr(expr) => self.expr(expr),
            LambdaBody::Block(block) => self.statement_list(block),
        };
        self.finish(el.child(body), lambda.span)
    }

    /// `(dim?, start, step, end, "var")`; a missing step is 1.
    fn comprehension_loop(&self, l: &ComprehensionLoop) -> Element {
        let mut parts = Vec::new();
        if let Some(dimension) = &l.dimension {
            parts.push(self.expr(dimension));
        }
        parts.push(self.expr(&l.start));
        parts.push(match &l.step {
            Some(step) => self.expr(step),
            None => cn("1"),
        });
        parts.push(self.expr(&l.end));
        parts.push(Element::csymbol("string").with_text(l.variable.name.clone()));
        self.finish(tuple(parts), l.span)
    }

    /// Each spec becomes a `(dim?, start, step, end)` tuple: a single value
    /// `v` is `(v, 0, v)`, a two-part range has step 1, and empty slots are
    /// `null`. Unless some spec is generic (`*$`), a final
    /// `(null, null, 1, null)` takes everything else.
    fn view(&self, target: &Expr, specs: &[ViewSpec]) -> Element {
        let mut content = vec![self.expr(target)];
        let mut generic = false;
        for spec in specs {
            let mut parts = Vec::new();
            match &spec.dimension {
                Some(ViewDimension::Pinned(dim)) => parts.push(self.expr(dim)),
                Some(ViewDimension::Generic) => {
                    generic = true;
                    parts.push(null());
                }
                None => {}
            }
            match &spec.slice {
                Slice::Single(value) => {
                    parts.push(self.optional(value));
                    parts.push(cn("0"));
                    parts.push(self.optional(value));
                }
                Slice::Range { start, end } => {
                    parts.push(self.optional(start));
                    parts.push(cn("1"));
                    parts.push(self.optional(end));
                }
                Slice::Stepped { start, step, end } => {
                    parts.push(self.optional(start));
                    parts.push(self.optional(step));
                    parts.push(self.optional(end));
                }
            }
            content.push(self.finish(tuple(parts), spec.span));
        }
        if !generic {
            content.push(tuple(vec![null(), null(), cn("1"), null()]));
        }
        apply(Element::csymbol("view"), content)
    }

    fn optional(&self, expr: &Option<Expr>) -> Element {
        match expr {
            Some(expr) => self.expr(expr),
            None => null(),
        }
    }
}

fn fill_location(el: &mut Element, loc: &str) {
    if el.loc.is_some() {
        return;
    }
    el.loc = Some(loc.to_string());
    for child in &mut el.children {
        fill_location(child, loc);
    }
}

fn with_variable_attrs(
    el: Element,
    name: &Ident,
    units: Option<&Ident>,
    initial: Option<&NumberLit>,
) -> Element {
    let mut el = el.attr("name", name.name.clone());
    if let Some(units) = units {
        el = el.attr("units", units.name.clone());
    }
    if let Some(initial) = initial {
        el = el.attr("initial_value", initial.text.clone());
    }
    el
}

fn apply(head: Element, args: impl IntoIterator<Item = Element>) -> Element {
    Element::mathml("apply").child(head).children(args)
}

fn tuple(items: Vec<Element>) -> Element {
    apply(Element::csymbol("tuple"), items)
}

fn maybe_tuple(mut items: Vec<Element>) -> Element {
    if items.len() == 1 {
        if let Some(only) = items.pop() {
            return only;
        }
    }
    tuple(items)
}

fn cn(text: &str) -> Element {
    Element::mathml("cn").with_text(text)
}

fn ci(name: &str) -> Element {
    Element::mathml("ci").with_text(name)
}

fn null() -> Element {
    Element::csymbol("null")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_location_keeps_existing() {
        let mut el = Element::mathml("apply")
            .child(Element::mathml("plus"))
            .child(cn("1").at("own"));
        fill_location(&mut el, "outer");
        assert_eq!(el.loc.as_deref(), Some("outer"));
        assert_eq!(el.children[0].loc.as_deref(), Some("outer"));
        assert_eq!(el.children[1].loc.as_deref(), Some("own"));
    }

    #[test]
    fn test_maybe_tuple() {
        assert_eq!(maybe_tuple(vec![cn("1")]).name, "cn");
        let pair = maybe_tuple(vec![cn("1"), cn("2")]);
        assert_eq!(pair.children[0].csymbol_name(), Some("tuple"));
        assert_eq!(pair.children.len(), 3);
    }
}
