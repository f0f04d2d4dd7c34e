//! Tree-walking evaluator for the post-processing language.
//!
//! Expressions and statements are evaluated directly from the syntax tree
//! against an explicit [`Environment`]. Errors pick up the location of the
//! innermost failing expression, then of every enclosing statement and
//! call site on the way out.

use crate::array::{DimSlice, IndexPolicy, NdArray};
use crate::env::Environment;
use crate::error::{ErrorKind, EvalError, EvalResult};
use crate::ops;
use crate::value::{Closure, ClosureBody, Value};
use fcp_types::ast::*;
use fcp_types::{SourceFile, Span};
use std::collections::BTreeMap;
use std::rc::Rc;

/// A value recorded by the `?` trace marker.
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    pub location: String,
    pub value: Value,
}

pub struct Evaluator {
    source: Rc<SourceFile>,
    traces: Vec<Trace>,
}

impl Evaluator {
    pub fn new(source: Rc<SourceFile>) -> Self {
        Self {
            source,
            traces: Vec::new(),
        }
    }

    pub fn source(&self) -> &Rc<SourceFile> {
        &self.source
    }

    /// Switch the file locations are reported against, returning the
    /// previous one.
    pub fn set_source(&mut self, source: Rc<SourceFile>) -> Rc<SourceFile> {
        std::mem::replace(&mut self.source, source)
    }

    pub fn location(&self, span: Span) -> String {
        self.source.location(span)
    }

    pub fn traces(&self) -> &[Trace] {
        &self.traces
    }

    pub fn take_traces(&mut self) -> Vec<Trace> {
        std::mem::take(&mut self.traces)
    }

    // ══════════════════════════════════════════════════════════════════════
    // Expressions
    // ══════════════════════════════════════════════════════════════════════

    pub fn eval_expr(&mut self, expr: &Expr, env: &Environment) -> EvalResult<Value> {
        let value = self.eval_kind(expr, env).map_err(|err| {
            if err.locations.is_empty() {
                err.at(self.location(expr.span))
            } else {
                err
            }
        })?;
        if expr.traced {
            self.record_trace(expr.span, &value);
        }
        Ok(value)
    }

    fn eval_kind(&mut self, expr: &Expr, env: &Environment) -> EvalResult<Value> {
        match &expr.kind {
            ExprKind::Number(lit) => Ok(Value::Simple(lit.value)),
            ExprKind::Constant(constant) => Ok(Value::Simple(constant.value())),
            ExprKind::Variable(name) => env.lookup(name),
            ExprKind::StringLit(s) => Ok(Value::String(s.clone())),
            ExprKind::Null => Ok(Value::Null),
            ExprKind::Default => Ok(Value::Default),
            ExprKind::Operator { op, operands } => {
                let args = self.eval_all(operands, env)?;
                ops::apply(*op, &args)
            }
            ExprKind::Tuple(items) => Ok(Value::Tuple(self.eval_all(items, env)?)),
            ExprKind::Lambda(lambda) => self.make_closure(lambda, env),
            ExprKind::FunctionCall { callee, args } => self.eval_call(callee, args, env, expr.span),
            ExprKind::Accessor { target, accessor } => {
                let value = self.eval_expr(target, env)?;
                access(&value, *accessor)
            }
            ExprKind::Array(items) => {
                let mut arrays = Vec::with_capacity(items.len());
                for item in items {
                    let array = self.eval_expr(item, env)?.expect_array("an array element")?;
                    arrays.push(NdArray::clone(&array));
                }
                Ok(Value::array(NdArray::stack(&arrays)?))
            }
            ExprKind::Comprehension { generator, loops } => {
                self.eval_comprehension(generator, loops, env)
            }
            ExprKind::View { target, specs } => self.eval_view(target, specs, env),
            ExprKind::Index {
                target,
                indices,
                mode,
            } => self.eval_index(target, indices, mode, env),
            ExprKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.eval_expr(condition, env)?.is_truthy("an if condition")? {
                    self.eval_expr(then_branch, env)
                } else {
                    self.eval_expr(else_branch, env)
                }
            }
            ExprKind::Wrap { arity, op } => Ok(Value::Lambda(Rc::new(Closure {
                params: (1..=*arity).map(|i| format!("_{i}")).collect(),
                defaults: vec![None; *arity],
                body: ClosureBody::Operator(*op),
                env: env.clone(),
                source: Rc::clone(&self.source),
            }))),
        }
    }

    fn eval_all(&mut self, exprs: &[Expr], env: &Environment) -> EvalResult<Vec<Value>> {
        exprs.iter().map(|e| self.eval_expr(e, env)).collect()
    }

    fn record_trace(&mut self, span: Span, value: &Value) {
        let location = self.location(span);
        tracing::info!(target: "fcp::trace", location = %location, value = %value, "traced value");
        self.traces.push(Trace {
            location,
            value: value.clone(),
        });
    }

    /// A whole number, for positions and dimensions.
    fn eval_integer(&mut self, expr: &Expr, env: &Environment, what: &str) -> EvalResult<i64> {
        let x = self.eval_expr(expr, env)?.expect_number(what)?;
        if !x.is_finite() || x.fract() != 0.0 {
            return Err(EvalError::type_error(format!(
                "{what} must be a whole number, not {x}"
            )));
        }
        Ok(x as i64)
    }

    fn eval_dimension(&mut self, expr: &Expr, env: &Environment) -> EvalResult<usize> {
        let dim = self.eval_integer(expr, env, "a dimension")?;
        usize::try_from(dim)
            .map_err(|_| EvalError::shape(format!("dimension {dim} is negative")))
    }

    // ── Functions ────────────────────────────────────────────────────────

    fn make_closure(&mut self, lambda: &Lambda, env: &Environment) -> EvalResult<Value> {
        let mut defaults = Vec::with_capacity(lambda.params.len());
        for param in &lambda.params {
            defaults.push(match &param.default {
                Some(default) => Some(self.eval_expr(default, env)?),
                None => None,
            });
        }
        let body = match &lambda.body {
            LambdaBody::Expr(expr) => ClosureBody::Expr(Expr::clone(expr)),
            LambdaBody::Block(block) => ClosureBody::Block(block.clone()),
        };
        Ok(Value::Lambda(Rc::new(Closure {
            params: lambda.params.iter().map(|p| p.name.name.clone()).collect(),
            defaults,
            body,
            env: env.clone(),
            source: Rc::clone(&self.source),
        })))
    }

    fn eval_call(
        &mut self,
        callee: &Ident,
        args: &[Expr],
        env: &Environment,
        span: Span,
    ) -> EvalResult<Value> {
        let values = self.eval_all(args, env)?;
        let result = match callee.name.as_str() {
            "map" => self.builtin_map(values),
            "fold" => self.builtin_fold(values),
            "find" => builtin_find(values),
            name => {
                let func = env.lookup(name)?;
                self.call(&func, values)
            }
        };
        result.map_err(|err| err.at(self.location(span)))
    }

    /// Call a function value. Arguments passed as `default`, and trailing
    /// arguments left out, take the parameter's default.
    pub fn call(&mut self, func: &Value, args: Vec<Value>) -> EvalResult<Value> {
        let Value::Lambda(closure) = func else {
            return Err(EvalError::type_error(format!(
                "cannot call a {}",
                func.type_name()
            )));
        };
        if args.len() > closure.params.len() {
            return Err(EvalError::arity(format!(
                "function takes {} argument(s) but {} were given",
                closure.params.len(),
                args.len()
            )));
        }

        let scope = closure.env.child();
        let mut bound = Vec::with_capacity(closure.params.len());
        for (i, param) in closure.params.iter().enumerate() {
            let value = match args.get(i) {
                Some(Value::Default) | None => closure.defaults[i].clone().ok_or_else(|| {
                    EvalError::arity(format!("no value given for parameter '{param}'"))
                })?,
                Some(value) => value.clone(),
            };
            bound.push(value.clone());
            scope.define(param, value)?;
        }

        let previous = self.set_source(Rc::clone(&closure.source));
        let result = match &closure.body {
            ClosureBody::Expr(expr) => self.eval_expr(expr, &scope),
            ClosureBody::Block(block) => self
                .exec_block(block, &scope)
                .map(|returned| returned.unwrap_or(Value::Null)),
            ClosureBody::Operator(op) => ops::apply(*op, &bound),
        };
        self.set_source(previous);
        result
    }

    fn expect_function<'v>(&self, value: &'v Value, what: &str) -> EvalResult<&'v Value> {
        match value {
            Value::Lambda(_) => Ok(value),
            other => Err(EvalError::type_error(format!(
                "{what} must be a function, not {}",
                other.type_name()
            ))),
        }
    }

    /// `map(f, a1, ..., an)`: call `f` elementwise over same-shaped arrays.
    fn builtin_map(&mut self, args: Vec<Value>) -> EvalResult<Value> {
        let Some((func, arrays)) = args.split_first() else {
            return Err(EvalError::arity("map needs a function and at least one array"));
        };
        let func = self.expect_function(func, "the first argument to map")?;
        if arrays.is_empty() {
            return Err(EvalError::arity("map needs at least one array"));
        }
        let arrays = arrays
            .iter()
            .map(|a| a.expect_array("an argument to map"))
            .collect::<EvalResult<Vec<_>>>()?;
        let shape = arrays[0].shape().to_vec();
        if let Some(other) = arrays.iter().find(|a| a.shape() != shape.as_slice()) {
            return Err(EvalError::shape(format!(
                "map arguments have shapes {} and {}",
                crate::array::fmt_shape(&shape),
                crate::array::fmt_shape(other.shape())
            )));
        }
        let mut data = Vec::with_capacity(arrays[0].len());
        for i in 0..arrays[0].len() {
            let inputs = arrays.iter().map(|a| Value::Simple(a.data()[i])).collect();
            let out = self.call(func, inputs)?;
            data.push(out.expect_number("the result of a mapped function")?);
        }
        Ok(Value::array(NdArray::new(shape, data)?))
    }

    /// `fold(f, a, init=null, dim=last)`: reduce along one dimension, which
    /// is kept with extent 1.
    fn builtin_fold(&mut self, args: Vec<Value>) -> EvalResult<Value> {
        if !(2..=4).contains(&args.len()) {
            return Err(EvalError::arity(format!(
                "fold takes 2 to 4 arguments, not {}",
                args.len()
            )));
        }
        let func = self.expect_function(&args[0], "the first argument to fold")?;
        let array = args[1].expect_array("the second argument to fold")?;
        let init = match args.get(2) {
            None | Some(Value::Null) | Some(Value::Default) => None,
            Some(v) => Some(v.expect_number("a fold's initial value")?),
        };
        let last = array.ndim().checked_sub(1).ok_or_else(|| {
            EvalError::shape("cannot fold a 0-dimensional array")
        })?;
        let dim = match args.get(3) {
            None | Some(Value::Default) => last,
            Some(v) => {
                let d = v.expect_number("a fold's dimension")?;
                if d < 0.0 || d.fract() != 0.0 || d as usize > last {
                    return Err(EvalError::shape(format!(
                        "cannot fold over dimension {d} of an array with {} dimensions",
                        array.ndim()
                    )));
                }
                d as usize
            }
        };
        if init.is_none() && array.shape()[dim] == 0 {
            return Err(EvalError::shape(format!(
                "cannot fold over empty dimension {dim} without an initial value"
            )));
        }

        let mut data = Vec::new();
        for (_, strip) in array.strips(dim) {
            let (mut acc, rest) = match init {
                Some(init) => (init, strip.as_slice()),
                None => (strip[0], &strip[1..]),
            };
            for &x in rest {
                acc = self
                    .call(func, vec![Value::Simple(acc), Value::Simple(x)])?
                    .expect_number("the result of a folded function")?;
            }
            data.push(acc);
        }
        let mut shape = array.shape().to_vec();
        shape[dim] = 1;
        Ok(Value::array(NdArray::new(shape, data)?))
    }

    // ── Arrays ───────────────────────────────────────────────────────────

    fn eval_comprehension(
        &mut self,
        generator: &Expr,
        loops: &[ComprehensionLoop],
        env: &Environment,
    ) -> EvalResult<Value> {
        struct Loop {
            name: String,
            values: Vec<f64>,
        }

        // Evaluate every loop's range, then lay the loops out over result
        // dimensions: pinned loops first, unpinned ones fill the gaps in
        // order, and any gap left over takes a dimension of the generated
        // value.
        let mut evaluated = Vec::with_capacity(loops.len());
        let mut pins: BTreeMap<usize, usize> = BTreeMap::new();
        let mut unpinned = Vec::new();
        for (k, l) in loops.iter().enumerate() {
            let dim = match &l.dimension {
                Some(d) => Some(self.eval_dimension(d, env)?),
                None => None,
            };
            let start = self.eval_expr(&l.start, env)?.expect_number("a range start")?;
            let step = match &l.step {
                Some(step) => self.eval_expr(step, env)?.expect_number("a range step")?,
                None => 1.0,
            };
            let end = self.eval_expr(&l.end, env)?.expect_number("a range end")?;
            let values = range_values(start, step, end)
                .map_err(|err| err.at(self.location(l.span)))?;
            evaluated.push(Loop {
                name: l.variable.name.clone(),
                values,
            });
            match dim {
                Some(d) => {
                    if pins.insert(d, k).is_some() {
                        return Err(EvalError::shape(format!(
                            "dimension {d} is given more than one range"
                        ))
                        .at(self.location(l.span)));
                    }
                }
                None => unpinned.push(k),
            }
        }
        let mut assigned = pins;
        let mut next = 0;
        for k in unpinned {
            while assigned.contains_key(&next) {
                next += 1;
            }
            assigned.insert(next, k);
            next += 1;
        }
        let ranged_rank = assigned.keys().next_back().map_or(0, |&d| d + 1);
        let gaps = ranged_rank - assigned.len();

        let loop_slots: Vec<usize> = assigned.values().copied().collect();
        let extents: Vec<usize> = loop_slots.iter().map(|&k| evaluated[k].values.len()).collect();

        let mut slots: Vec<Option<usize>> = Vec::new();
        let mut result: Option<(NdArray, Vec<usize>)> = None;
        for combo in crate::array::Indices::new(extents) {
            let scope = env.child();
            for (pos, &k) in loop_slots.iter().enumerate() {
                let l = &evaluated[k];
                scope.define(&l.name, Value::Simple(l.values[combo[pos]]))?;
            }
            let sub = self.eval_expr(generator, &scope)?.expect_array("a generated element")?;

            if result.is_none() {
                if sub.ndim() < gaps {
                    return Err(EvalError::shape(format!(
                        "the generated value has {} dimension(s), too few to fill {gaps} unranged dimension(s)",
                        sub.ndim()
                    )));
                }
                slots = (0..ranged_rank).map(|d| assigned.get(&d).copied()).collect();
                let mut shape = Vec::with_capacity(slots.len() + sub.ndim());
                let mut next_gap = 0;
                for slot in &slots {
                    match slot {
                        Some(k) => shape.push(evaluated[*k].values.len()),
                        None => {
                            shape.push(sub.shape()[next_gap]);
                            next_gap += 1;
                        }
                    }
                }
                shape.extend_from_slice(&sub.shape()[gaps..]);
                result = Some((NdArray::filled(shape, 0.0), sub.shape().to_vec()));
            }
            let Some((out, sub_shape)) = &mut result else {
                continue;
            };
            if sub.shape() != sub_shape.as_slice() {
                return Err(EvalError::shape(format!(
                    "generated values have shapes {} and {}",
                    crate::array::fmt_shape(sub_shape),
                    crate::array::fmt_shape(sub.shape())
                )));
            }

            let mut target = Vec::with_capacity(out.ndim());
            for sub_idx in sub.indices() {
                target.clear();
                let (mut pos, mut gap) = (0, 0);
                for slot in &slots {
                    if slot.is_some() {
                        target.push(combo[pos]);
                        pos += 1;
                    } else {
                        target.push(sub_idx[gap]);
                        gap += 1;
                    }
                }
                target.extend_from_slice(&sub_idx[gaps..]);
                if let Some(x) = sub.get(&sub_idx) {
                    out.set(&target, x);
                }
            }
        }
        match result {
            Some((out, _)) => Ok(Value::array(out)),
            None => Err(EvalError::shape("an array comprehension needs at least one range")),
        }
    }

    fn eval_view(&mut self, target: &Expr, specs: &[ViewSpec], env: &Environment) -> EvalResult<Value> {
        let array = self.eval_expr(target, env)?.expect_array("the target of a view")?;
        let ndim = array.ndim();
        let mut pinned: Vec<Option<DimSlice>> = vec![None; ndim];
        let mut unpinned = Vec::new();
        let mut generic = None;
        for spec in specs {
            let slice = self
                .eval_slice(&spec.slice, env)
                .map_err(|err| err.at(self.location(spec.span)))?;
            match &spec.dimension {
                Some(ViewDimension::Pinned(dim)) => {
                    let d = self.eval_dimension(dim, env)?;
                    let slot = pinned.get_mut(d).ok_or_else(|| {
                        EvalError::shape(format!(
                            "cannot view dimension {d} of an array with {ndim} dimensions"
                        ))
                    })?;
                    if slot.is_some() {
                        return Err(EvalError::shape(format!(
                            "dimension {d} is viewed more than once"
                        )));
                    }
                    *slot = Some(slice);
                }
                Some(ViewDimension::Generic) => {
                    if generic.replace(slice).is_some() {
                        return Err(EvalError::shape("a view may have only one generic slice"));
                    }
                }
                None => unpinned.push(slice),
            }
        }

        let default = generic.unwrap_or(DimSlice::ALL);
        let mut unpinned = unpinned.into_iter();
        let slices: Vec<DimSlice> = pinned
            .into_iter()
            .map(|slot| slot.or_else(|| unpinned.next()).unwrap_or(default))
            .collect();
        let surplus = unpinned.count();
        if surplus > 0 {
            return Err(EvalError::shape(format!(
                "a view of an array with {ndim} dimension(s) was given {surplus} slice(s) too many"
            )));
        }
        Ok(Value::array(array.view(&slices)?))
    }

    fn eval_slice(&mut self, slice: &Slice, env: &Environment) -> EvalResult<DimSlice> {
        let bound = |this: &mut Self, e: &Option<Expr>| -> EvalResult<Option<i64>> {
            match e {
                Some(e) => Ok(Some(this.eval_integer(e, env, "a view position")?)),
                None => Ok(None),
            }
        };
        Ok(match slice {
            Slice::Single(None) => DimSlice::ALL,
            Slice::Single(Some(at)) => DimSlice::At(self.eval_integer(at, env, "a view position")?),
            Slice::Range { start, end } => DimSlice::Range {
                start: bound(self, start)?,
                step: 1,
                end: bound(self, end)?,
            },
            Slice::Stepped { start, step, end } => {
                let start = bound(self, start)?;
                let step = bound(self, step)?.unwrap_or(1);
                let end = bound(self, end)?;
                match (step, start, end) {
                    (0, Some(s), Some(e)) if s == e => DimSlice::At(s),
                    (0, _, _) => {
                        return Err(EvalError::shape(
                            "a zero step needs equal start and end positions",
                        ))
                    }
                    _ => DimSlice::Range { start, step, end },
                }
            }
        })
    }

    fn eval_index(
        &mut self,
        target: &Expr,
        indices: &Expr,
        mode: &IndexMode,
        env: &Environment,
    ) -> EvalResult<Value> {
        let array = match self.eval_expr(target, env)? {
            Value::Array(array) => array,
            other => {
                return Err(EvalError::type_error(format!(
                    "cannot index a {}",
                    other.type_name()
                )))
            }
        };
        let positions = self.eval_expr(indices, env)?.expect_array("index positions")?;
        let (dim, policy) = match mode {
            IndexMode::Plain => (None, IndexPolicy::Plain),
            IndexMode::Shrink { dimension } => {
                (Some(self.eval_dimension(dimension, env)?), IndexPolicy::Shrink)
            }
            IndexMode::Pad { dimension, value } => {
                let dim = self.eval_dimension(dimension, env)?;
                let fill = self.eval_expr(value, env)?.expect_number("a pad value")?;
                (Some(dim), IndexPolicy::Pad(fill))
            }
        };
        let dim = match dim {
            Some(dim) => dim,
            None => array
                .ndim()
                .checked_sub(1)
                .ok_or_else(|| EvalError::shape("cannot index a 0-dimensional array"))?,
        };
        Ok(Value::array(array.index(&positions, dim, policy)?))
    }

    // ══════════════════════════════════════════════════════════════════════
    // Statements
    // ══════════════════════════════════════════════════════════════════════

    /// Execute statements in order. Returns the value of a `return`, if one
    /// was reached.
    pub fn exec_block(&mut self, block: &Block, env: &Environment) -> EvalResult<Option<Value>> {
        self.exec_stmts(&block.stmts, env)
    }

    pub fn exec_stmts(&mut self, stmts: &[Stmt], env: &Environment) -> EvalResult<Option<Value>> {
        for stmt in stmts {
            if let Some(returned) = self.exec_stmt(stmt, env)? {
                return Ok(Some(returned));
            }
        }
        Ok(None)
    }

    pub fn exec_stmt(&mut self, stmt: &Stmt, env: &Environment) -> EvalResult<Option<Value>> {
        self.exec_stmt_kind(&stmt.kind, env)
            .map_err(|err| err.at(self.location(stmt.span)))
    }

    fn exec_stmt_kind(&mut self, kind: &StmtKind, env: &Environment) -> EvalResult<Option<Value>> {
        match kind {
            StmtKind::Assign { targets, values } => {
                let values = self.eval_all(values, env)?;
                for (target, value) in targets.iter().zip(destructure(targets.len(), values)?) {
                    env.define(&target.name, value)?;
                }
                Ok(None)
            }
            StmtKind::Return(exprs) => {
                let mut values = self.eval_all(exprs, env)?;
                Ok(Some(if values.len() == 1 {
                    values.remove(0)
                } else {
                    Value::Tuple(values)
                }))
            }
            StmtKind::Assert(condition) => {
                if self.eval_expr(condition, env)?.is_truthy("an assertion")? {
                    Ok(None)
                } else {
                    Err(EvalError::new(ErrorKind::Assertion, "assertion is false"))
                }
            }
            StmtKind::FunctionDef { name, lambda } => {
                let closure = self.make_closure(lambda, env)?;
                env.define(&name.name, closure)?;
                Ok(None)
            }
        }
    }
}

/// Match assigned values to targets. A single tuple value spreads over
/// several targets; several values for one target make a tuple.
fn destructure(targets: usize, mut values: Vec<Value>) -> EvalResult<Vec<Value>> {
    if values.len() == targets {
        return Ok(values);
    }
    match (targets, values.len()) {
        (1, _) => Ok(vec![Value::Tuple(values)]),
        (_, 1) => match values.remove(0) {
            Value::Tuple(items) if items.len() == targets => Ok(items),
            Value::Tuple(items) => Err(EvalError::arity(format!(
                "cannot assign a tuple of {} item(s) to {targets} names",
                items.len()
            ))),
            other => Err(EvalError::arity(format!(
                "cannot assign a single {} to {targets} names",
                other.type_name()
            ))),
        },
        (t, v) => Err(EvalError::arity(format!(
            "cannot assign {v} values to {t} names"
        ))),
    }
}

fn access(value: &Value, accessor: Accessor) -> EvalResult<Value> {
    let flag = |b: bool| Ok(Value::Simple(if b { 1.0 } else { 0.0 }));
    match accessor {
        Accessor::IsSimpleValue => flag(matches!(value, Value::Simple(_))),
        Accessor::IsArray => flag(matches!(value, Value::Array(_))),
        Accessor::IsString => flag(matches!(value, Value::String(_))),
        Accessor::IsTuple => flag(matches!(value, Value::Tuple(_))),
        Accessor::IsFunction => flag(matches!(value, Value::Lambda(_))),
        Accessor::IsNull => flag(matches!(value, Value::Null)),
        Accessor::IsDefault => flag(matches!(value, Value::Default)),
        Accessor::NumDims | Accessor::NumElements | Accessor::Shape => {
            let Value::Array(array) = value else {
                return Err(EvalError::type_error(format!(
                    "{} applies only to arrays, not a {}",
                    accessor.name(),
                    value.type_name()
                )));
            };
            Ok(match accessor {
                Accessor::NumDims => Value::Simple(array.ndim() as f64),
                Accessor::NumElements => Value::Simple(array.len() as f64),
                _ => Value::array(NdArray::vector(
                    array.shape().iter().map(|&n| n as f64).collect(),
                )),
            })
        }
    }
}

fn builtin_find(args: Vec<Value>) -> EvalResult<Value> {
    match args.as_slice() {
        [array] => Ok(Value::array(array.expect_array("the argument to find")?.find())),
        _ => Err(EvalError::arity(format!(
            "find takes 1 argument, not {}",
            args.len()
        ))),
    }
}

/// `start, start + step, ...` up to but excluding `end`.
pub(crate) fn range_values(start: f64, step: f64, end: f64) -> EvalResult<Vec<f64>> {
    if step == 0.0 || !step.is_finite() {
        return Err(EvalError::shape(format!("a range step cannot be {step}")));
    }
    let mut values = Vec::new();
    let mut k = 0.0;
    loop {
        let x = start + k * step;
        if (step > 0.0 && x >= end) || (step < 0.0 && x <= end) {
            break;
        }
        values.push(x);
        k += 1.0;
    }
    if values.is_empty() {
        return Err(EvalError::shape(format!(
            "the range {start}:{step}:{end} is empty"
        )));
    }
    Ok(values)
}
