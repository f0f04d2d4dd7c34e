//! Protocol-level parsing: sections, model interface, tasks, outputs.
//!
//! Sections are all optional but must appear in a fixed order:
//! namespaces, inputs, imports, library, units, model interface, tasks,
//! post-processing, outputs, plots.

use fcp_lexer::token::TokenKind;
use fcp_types::ast::*;
use fcp_types::ErrorCode;

use crate::parser::{PResult, Parser};

/// SI prefixes accepted in units definitions.
const SI_PREFIXES: &[&str] = &[
    "deka", "hecto", "kilo", "mega", "giga", "tera", "peta", "exa", "zetta", "yotta", "deci",
    "centi", "milli", "micro", "nano", "pico", "femto", "atto", "zepto", "yocto",
];

impl<'src> Parser<'src> {
    pub(crate) fn parse_protocol_file(&mut self) -> PResult<Protocol> {
        self.skip_newlines();
        let start = self.current_span();

        let mut namespaces = Vec::new();
        while self.at_word("namespace") {
            namespaces.push(self.parse_namespace()?);
            self.skip_newlines();
        }

        let inputs = self.optional_section("inputs", |p| {
            p.advance();
            p.parse_simple_assignments()
        })?;

        let mut imports = Vec::new();
        while self.at_word("import") {
            imports.push(self.parse_import()?);
            self.skip_newlines();
        }

        let library = self.optional_section("library", |p| {
            p.advance();
            p.parse_block()
        })?;
        let units = self.optional_section("units", |p| p.parse_units())?;

        let model_interface = if self.at_word("model") && self.peek_at(1).is_word("interface") {
            let section = self.parse_model_interface()?;
            self.skip_newlines();
            Some(section)
        } else {
            None
        };

        let tasks = self.optional_section("tasks", |p| p.parse_tasks())?;

        let post_processing = if self.at_post_processing() {
            let section = self.parse_post_processing()?;
            self.skip_newlines();
            Some(section)
        } else {
            None
        };

        let outputs = self.optional_section("outputs", |p| p.parse_outputs())?;
        let plots = self.optional_section("plots", |p| p.parse_plots())?;

        self.expect_end()?;
        tracing::debug!(
            namespaces = namespaces.len(),
            imports = imports.len(),
            simulations = self.context.simulations.len(),
            "parsed protocol"
        );
        Ok(Protocol {
            namespaces,
            inputs,
            imports,
            library,
            units,
            model_interface,
            tasks,
            post_processing,
            outputs,
            plots,
            span: start.merge(self.previous_span()),
        })
    }

    /// Parse a section introduced by `word` if it is next.
    fn optional_section<T>(
        &mut self,
        word: &str,
        section: impl FnOnce(&mut Self) -> PResult<T>,
    ) -> PResult<Option<T>> {
        if !self.at_word(word) {
            return Ok(None);
        }
        let parsed = section(self)?;
        self.skip_newlines();
        Ok(Some(parsed))
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Namespaces & Imports
    // ══════════════════════════════════════════════════════════════════════════

    /// `namespace prefix = "uri"`
    fn parse_namespace(&mut self) -> PResult<NamespaceDecl> {
        let start = self.expect_word("namespace")?;
        let prefix = self.expect_identifier()?;
        self.expect(&TokenKind::Eq)?;
        let uri = self.expect_string()?;
        self.context.prefixes.insert(prefix.name.clone());
        Ok(NamespaceDecl {
            prefix,
            uri,
            span: start.merge(self.previous_span()),
        })
    }

    /// `import [prefix =] "source" [{ name = expr ... }]`
    fn parse_import(&mut self) -> PResult<Import> {
        let start = self.expect_word("import")?;
        let prefix = if matches!(self.peek_kind(), TokenKind::Identifier(_))
            && self.peek_at(1).kind == TokenKind::Eq
        {
            let prefix = self.expect_identifier()?;
            self.advance();
            self.context.prefixes.insert(prefix.name.clone());
            Some(prefix)
        } else {
            None
        };
        let source = self.expect_string()?;
        let set_inputs = if self.at_after_newlines(&TokenKind::LBrace) {
            self.parse_simple_assignments()?.stmts
        } else {
            Vec::new()
        };
        Ok(Import {
            prefix,
            source,
            set_inputs,
            span: start.merge(self.previous_span()),
        })
    }

    fn at_use_imports(&self) -> bool {
        self.at_word("use") && self.peek_at(1).is_word("imports")
    }

    /// `use imports prefix`
    fn parse_use_imports(&mut self) -> PResult<UseImports> {
        let start = self.expect_word("use")?;
        self.expect_word("imports")?;
        let prefix = self.expect_identifier()?;
        let span = start.merge(prefix.span);
        Ok(UseImports { prefix, span })
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Units
    // ══════════════════════════════════════════════════════════════════════════

    fn parse_units(&mut self) -> PResult<UnitsSection> {
        let start = self.expect_word("units")?;
        let (items, body) = self.parse_braced(|p| {
            if p.at_use_imports() {
                Ok(UnitsItem::UseImports(p.parse_use_imports()?))
            } else {
                Ok(UnitsItem::Def(p.parse_units_def()?))
            }
        })?;
        Ok(UnitsSection {
            items,
            span: start.merge(body),
        })
    }

    /// `name = ref . ref ... ["description"]`
    fn parse_units_def(&mut self) -> PResult<UnitsDef> {
        let name = self.expect_identifier()?;
        self.expect(&TokenKind::Eq)?;
        let mut refs = vec![self.parse_unit_ref()?];
        while self.eat(&TokenKind::Dot) {
            refs.push(self.parse_unit_ref()?);
        }
        let description = match self.peek_kind() {
            TokenKind::StringLit(_) => Some(self.expect_string()?),
            _ => None,
        };
        if let Some(description) = &description {
            self.context
                .unit_descriptions
                .insert(name.name.clone(), description.clone());
        }
        let span = name.span.merge(self.previous_span());
        Ok(UnitsDef {
            name,
            refs,
            description,
            span,
        })
    }

    /// `[multiplier] [siPrefix] base [^ exponent] [(+|-) offset]`
    fn parse_unit_ref(&mut self) -> PResult<UnitRef> {
        let start = self.current_span();
        let multiplier = match self.peek_kind() {
            TokenKind::Number(_) | TokenKind::Minus | TokenKind::LParen => {
                Some(self.parse_units_number(false)?)
            }
            _ => None,
        };
        let prefix = match self.peek_kind() {
            TokenKind::Identifier(word)
                if SI_PREFIXES.contains(&word.as_str())
                    && matches!(self.peek_at(1).kind, TokenKind::Identifier(_)) =>
            {
                Some(self.expect_identifier()?.name)
            }
            _ => None,
        };
        let base = self.expect_identifier()?;
        let exponent = if self.eat(&TokenKind::Caret) {
            Some(self.parse_signed_number()?.text)
        } else {
            None
        };
        let offset = match self.peek_kind() {
            TokenKind::Plus | TokenKind::Minus => {
                let negate = self.advance().kind == TokenKind::Minus;
                Some(self.parse_units_number(negate)?)
            }
            _ => None,
        };
        Ok(UnitRef {
            multiplier,
            prefix,
            base,
            exponent,
            offset,
            span: start.merge(self.previous_span()),
        })
    }

    /// A number, or a parenthesised constant expression folded to its value.
    fn parse_units_number(&mut self, negate: bool) -> PResult<String> {
        if !self.at(&TokenKind::LParen) {
            let literal = self.parse_signed_number()?;
            return Ok(if negate {
                negated_text(&literal.text)
            } else {
                literal.text
            });
        }
        let open = self.advance().span;
        let expr = self.parse_expr()?;
        let close = self.expect(&TokenKind::RParen)?.span;
        let Some(value) = fold_constant(&expr) else {
            return Err(self
                .error_at(
                    ErrorCode::INVALID_UNITS_EXPRESSION,
                    "units factors must be constant arithmetic",
                    open.merge(close),
                )
                .into());
        };
        let value = if negate { -value } else { value };
        Ok(format_value(value))
    }

    /// `[-]number`
    fn parse_signed_number(&mut self) -> PResult<NumberLit> {
        let negative = self.eat(&TokenKind::Minus);
        let TokenKind::Number(text) = self.peek_kind().clone() else {
            return Err(self.unexpected("number"));
        };
        let span = self.advance().span;
        let value: f64 = text.parse().map_err(|_| {
            self.error_at(
                ErrorCode::INVALID_NUMBER,
                format!("invalid number '{text}'"),
                span,
            )
        })?;
        Ok(if negative {
            NumberLit {
                text: format!("-{text}"),
                value: -value,
                units: None,
            }
        } else {
            NumberLit {
                text,
                value,
                units: None,
            }
        })
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Model Interface
    // ══════════════════════════════════════════════════════════════════════════

    fn parse_model_interface(&mut self) -> PResult<ModelInterface> {
        let start = self.expect_word("model")?;
        self.expect_word("interface")?;
        let (entries, body) = self.parse_braced(|p| p.parse_model_interface_entry())?;
        Ok(ModelInterface {
            entries,
            span: start.merge(body),
        })
    }

    fn parse_model_interface_entry(&mut self) -> PResult<ModelInterfaceEntry> {
        let start = self.current_span();
        let kind = if self.at_use_imports() {
            ModelInterfaceKind::UseImports(self.parse_use_imports()?.prefix)
        } else if self.eat_word("independent") {
            self.expect_word("var")?;
            self.expect_word("units")?;
            ModelInterfaceKind::IndependentVarUnits(self.expect_identifier()?)
        } else if self.eat_word("input") {
            let name = self.expect_qualified_identifier()?;
            let units = self.parse_optional_units()?;
            let initial = self.parse_optional_initial()?;
            ModelInterfaceKind::Input {
                name,
                units,
                initial,
            }
        } else if self.eat_word("output") {
            let name = self.expect_qualified_identifier()?;
            let units = self.parse_optional_units()?;
            ModelInterfaceKind::Output { name, units }
        } else if self.eat_word("var") {
            let name = self.expect_identifier()?;
            self.expect_word("units")?;
            let units = self.expect_identifier()?;
            let initial = self.parse_optional_initial()?;
            ModelInterfaceKind::Var {
                name,
                units,
                initial,
            }
        } else if self.eat_word("define") {
            let target = self.parse_define_target()?;
            self.expect(&TokenKind::Eq)?;
            let value = self.parse_expr()?;
            ModelInterfaceKind::Define { target, value }
        } else if self.eat_word("convert") {
            let from = self.expect_identifier()?;
            self.expect_word("to")?;
            let to = self.expect_identifier()?;
            self.expect_word("by")?;
            let rule = self.parse_lambda()?;
            ModelInterfaceKind::Convert { from, to, rule }
        } else {
            return Err(self.unexpected("model interface entry"));
        };
        Ok(ModelInterfaceEntry {
            kind,
            span: start.merge(self.previous_span()),
        })
    }

    /// `diff(var; bvar)` or a plain variable.
    fn parse_define_target(&mut self) -> PResult<DefineTarget> {
        if self.at_word("diff") && self.peek_at(1).kind == TokenKind::LParen && !self.peek_at(1).spaced {
            self.advance();
            self.advance();
            let variable = self.expect_qualified_identifier()?;
            self.expect(&TokenKind::Semicolon)?;
            let bvar = self.expect_qualified_identifier()?;
            self.expect(&TokenKind::RParen)?;
            return Ok(DefineTarget::Derivative { variable, bvar });
        }
        Ok(DefineTarget::Variable(self.expect_qualified_identifier()?))
    }

    fn parse_optional_units(&mut self) -> PResult<Option<Ident>> {
        if self.eat_word("units") {
            Ok(Some(self.expect_identifier()?))
        } else {
            Ok(None)
        }
    }

    fn parse_optional_initial(&mut self) -> PResult<Option<NumberLit>> {
        if self.eat(&TokenKind::Eq) {
            Ok(Some(self.parse_signed_number()?))
        } else {
            Ok(None)
        }
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Tasks
    // ══════════════════════════════════════════════════════════════════════════

    fn parse_tasks(&mut self) -> PResult<Tasks> {
        let start = self.expect_word("tasks")?;
        let (simulations, body) = self.parse_braced(|p| p.parse_simulation())?;
        Ok(Tasks {
            simulations,
            span: start.merge(body),
        })
    }

    /// `simulation [name =] (timecourse | nested | oneStep) ...`
    fn parse_simulation(&mut self) -> PResult<Simulation> {
        let start = self.expect_word("simulation")?;
        let name = if matches!(self.peek_kind(), TokenKind::Identifier(_))
            && self.peek_at(1).kind == TokenKind::Eq
        {
            let name = self.expect_identifier()?;
            self.advance();
            // The range's own `while` condition may read `name:` results.
            self.context.prefixes.insert(name.name.clone());
            Some(name)
        } else {
            None
        };

        let kind = if self.eat_word("timecourse") {
            let (range, modifiers) = self.parse_simulation_head()?;
            self.skip_newlines();
            self.expect(&TokenKind::RBrace)?;
            SimulationKind::Timecourse { range, modifiers }
        } else if self.eat_word("nested") {
            let (range, modifiers) = self.parse_simulation_head()?;
            self.skip_newlines();
            self.expect_word("nests")?;
            let nested = self.parse_nested_target()?;
            self.skip_newlines();
            self.expect(&TokenKind::RBrace)?;
            SimulationKind::Nested {
                range,
                modifiers,
                nested: Box::new(nested),
            }
        } else if self.eat_word("oneStep") {
            let step = match self.peek_kind() {
                TokenKind::Newline | TokenKind::RBrace | TokenKind::Eof => None,
                _ => Some(self.parse_expr()?),
            };
            SimulationKind::OneStep(step)
        } else {
            return Err(self.unexpected("'timecourse', 'nested' or 'oneStep'"));
        };

        if let Some(name) = &name {
            self.context.simulations.insert(name.name.clone());
        }
        Ok(Simulation {
            name,
            kind,
            span: start.merge(self.previous_span()),
        })
    }

    /// `{ range ... [modifiers { ... }]`, leaving the closing brace.
    fn parse_simulation_head(&mut self) -> PResult<(Range, Vec<Modifier>)> {
        self.skip_newlines();
        self.expect(&TokenKind::LBrace)?;
        self.skip_newlines();
        let range = self.parse_range()?;
        self.skip_newlines();
        let modifiers = if self.at_word("modifiers") {
            self.advance();
            self.parse_braced(|p| p.parse_modifier())?.0
        } else {
            Vec::new()
        };
        Ok((range, modifiers))
    }

    fn parse_nested_target(&mut self) -> PResult<NestedTarget> {
        if self.at_word("simulation") {
            let inner = self.nested(|p| p.parse_simulation())?;
            return Ok(NestedTarget::Simulation(inner));
        }
        if self.at_word("protocol") {
            return Err(self
                .error_at_current(
                    ErrorCode::UNEXPECTED_TOKEN,
                    "nested protocols are not supported",
                )
                .expecting("'simulation' or the name of an earlier simulation")
                .into());
        }
        let reference = self.expect_identifier()?;
        if !self.context.simulations.contains(&reference.name) {
            return Err(self
                .error_at(
                    ErrorCode::UNKNOWN_SIMULATION,
                    format!("no earlier simulation is named '{}'", reference.name),
                    reference.span,
                )
                .into());
        }
        Ok(NestedTarget::Reference(reference))
    }

    /// `range name units u (uniform a:[s:]b | vector expr | while expr)`
    fn parse_range(&mut self) -> PResult<Range> {
        let start = self.expect_word("range")?;
        let name = self.expect_identifier()?;
        self.expect_word("units")?;
        let units = self.expect_identifier()?;
        let kind = if self.eat_word("uniform") {
            let (first, step, end) = self.parse_numeric_range()?;
            RangeKind::Uniform {
                start: first,
                step,
                end,
            }
        } else if self.eat_word("vector") {
            RangeKind::Vector(self.parse_expr()?)
        } else if self.eat_word("while") {
            RangeKind::While(self.parse_expr()?)
        } else {
            return Err(self.unexpected("'uniform', 'vector' or 'while'"));
        };
        Ok(Range {
            name,
            units,
            kind,
            span: start.merge(self.previous_span()),
        })
    }

    /// `at (start | each loop | end) (set x = e | save as n | reset [to n])`
    fn parse_modifier(&mut self) -> PResult<Modifier> {
        let start = self.expect_word("at")?;
        let when = if self.eat_word("start") {
            ModifierWhen::AtStart
        } else if self.eat_word("each") {
            self.expect_word("loop")?;
            ModifierWhen::EveryLoop
        } else if self.eat_word("end") {
            ModifierWhen::AtEnd
        } else {
            return Err(self.unexpected("'start', 'each loop' or 'end'"));
        };

        let action = if self.eat_word("set") {
            let name = self.expect_qualified_identifier()?;
            self.expect(&TokenKind::Eq)?;
            let value = self.parse_expr()?;
            ModifierAction::SetVariable { name, value }
        } else if self.eat_word("save") {
            self.expect_word("as")?;
            ModifierAction::SaveState(self.expect_identifier()?)
        } else if self.eat_word("reset") {
            if self.eat_word("to") {
                ModifierAction::ResetState(Some(self.expect_identifier()?))
            } else {
                ModifierAction::ResetState(None)
            }
        } else {
            return Err(self.unexpected("'set', 'save as' or 'reset'"));
        };

        Ok(Modifier {
            when,
            action,
            span: start.merge(self.previous_span()),
        })
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Post-processing, Outputs, Plots
    // ══════════════════════════════════════════════════════════════════════════

    /// `post-processing`, written without spaces around the hyphen.
    fn at_post_processing(&self) -> bool {
        self.at_word("post")
            && self.peek_at(1).kind == TokenKind::Minus
            && !self.peek_at(1).spaced
            && self.peek_at(2).is_word("processing")
            && !self.peek_at(2).spaced
    }

    fn parse_post_processing(&mut self) -> PResult<PostProcessing> {
        let start = self.current_span();
        for _ in 0..3 {
            self.advance();
        }
        let (items, body) = self.parse_braced(|p| {
            if p.at_use_imports() {
                Ok(PostProcessingItem::UseImports(p.parse_use_imports()?))
            } else {
                Ok(PostProcessingItem::Stmt(p.parse_statement()?))
            }
        })?;
        Ok(PostProcessing {
            items,
            span: start.merge(body),
        })
    }

    fn parse_outputs(&mut self) -> PResult<OutputsSection> {
        let start = self.expect_word("outputs")?;
        let (items, body) = self.parse_braced(|p| {
            if p.at_use_imports() {
                Ok(OutputItem::UseImports(p.parse_use_imports()?))
            } else {
                Ok(OutputItem::Output(p.parse_output_spec()?))
            }
        })?;
        Ok(OutputsSection {
            items,
            span: start.merge(body),
        })
    }

    /// `name units u ["desc"]` or `name = ref [units u] ["desc"]`
    fn parse_output_spec(&mut self) -> PResult<OutputSpec> {
        let name = self.expect_identifier()?;
        let (reference, units) = if self.eat(&TokenKind::Eq) {
            let reference = self.expect_qualified_identifier()?;
            (Some(reference), self.parse_optional_units()?)
        } else {
            self.expect_word("units")?;
            (None, Some(self.expect_identifier()?))
        };
        let description = match self.peek_kind() {
            TokenKind::StringLit(_) => Some(self.expect_string()?),
            _ => None,
        };
        let units_label = units.as_ref().map(|u| {
            self.context
                .unit_descriptions
                .get(&u.name)
                .cloned()
                .unwrap_or_else(|| u.name.clone())
        });
        let span = name.span.merge(self.previous_span());
        Ok(OutputSpec {
            name,
            reference,
            units,
            units_label,
            description,
            span,
        })
    }

    fn parse_plots(&mut self) -> PResult<PlotsSection> {
        let start = self.expect_word("plots")?;
        let (items, body) = self.parse_braced(|p| {
            if p.at_use_imports() {
                Ok(PlotItem::UseImports(p.parse_use_imports()?))
            } else {
                Ok(PlotItem::Plot(p.parse_plot()?))
            }
        })?;
        Ok(PlotsSection {
            items,
            span: start.merge(body),
        })
    }

    /// `plot "title" { y1, y2 against x ... }`
    fn parse_plot(&mut self) -> PResult<Plot> {
        let start = self.expect_word("plot")?;
        let title = self.expect_string()?;
        let (curves, body) = self.parse_braced(|p| p.parse_curve())?;
        Ok(Plot {
            title,
            curves,
            span: start.merge(body),
        })
    }

    fn parse_curve(&mut self) -> PResult<Curve> {
        let first = self.expect_identifier()?;
        let start = first.span;
        let mut y = vec![first];
        while self.eat(&TokenKind::Comma) {
            y.push(self.expect_identifier()?);
        }
        self.expect_word("against")?;
        let x = self.expect_identifier()?;
        let span = start.merge(x.span);
        Ok(Curve { y, x, span })
    }
}

fn negated_text(text: &str) -> String {
    match text.strip_prefix('-') {
        Some(positive) => positive.to_string(),
        None => format!("-{text}"),
    }
}

/// Evaluate constant arithmetic over literals and MathML constants.
fn fold_constant(expr: &Expr) -> Option<f64> {
    match &expr.kind {
        ExprKind::Number(lit) if lit.units.is_none() => Some(lit.value),
        ExprKind::Constant(constant) => Some(constant.value()),
        ExprKind::Operator { op, operands } => {
            let values = operands
                .iter()
                .map(fold_constant)
                .collect::<Option<Vec<f64>>>()?;
            match (op, values.as_slice()) {
                (Operator::Minus, [x]) => Some(-x),
                (Operator::Plus, [a, b]) => Some(a + b),
                (Operator::Minus, [a, b]) => Some(a - b),
                (Operator::Times, [a, b]) => Some(a * b),
                (Operator::Divide, [a, b]) => Some(a / b),
                (Operator::Power, [a, b]) => Some(a.powf(*b)),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Render a folded value: plain decimal in the everyday range, exponent
/// notation outside it.
fn format_value(value: f64) -> String {
    let magnitude = value.abs();
    if magnitude != 0.0 && !(1e-4..1e15).contains(&magnitude) {
        format!("{value:e}")
    } else {
        format!("{value}")
    }
}
