//! Syntax tree for the protocol language.
//!
//! Every node carries a [`Span`]. Nodes own their children outright; no node
//! refers back to the parser or to an enclosing scope.

use crate::Span;
use std::fmt;

// ══════════════════════════════════════════════════════════════════════════════
// Identifiers
// ══════════════════════════════════════════════════════════════════════════════

/// A spanned identifier. May be prefix-qualified (`oxmeta:membrane_voltage`).
#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

impl Ident {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            span,
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Operators
// ══════════════════════════════════════════════════════════════════════════════

/// Every operator the language can apply: the infix/prefix operators and
/// the MathML function vocabulary reachable through `MathML:name`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Plus,
    Minus,
    Times,
    Divide,
    Power,
    Eq,
    Neq,
    Lt,
    Gt,
    Leq,
    Geq,
    Not,
    And,
    Or,
    Quotient,
    Rem,
    Max,
    Min,
    Root,
    Xor,
    Abs,
    Floor,
    Ceiling,
    Exp,
    Ln,
    Log,
    Sin,
    Cos,
    Tan,
    Sec,
    Csc,
    Cot,
    Sinh,
    Cosh,
    Tanh,
    Sech,
    Csch,
    Coth,
    Arcsin,
    Arccos,
    Arctan,
    Arccosh,
    Arccot,
    Arccoth,
    Arccsc,
    Arccsch,
    Arcsec,
    Arcsech,
    Arcsinh,
    Arctanh,
}

/// MathML element name for each operator.
const OPERATOR_NAMES: &[(Operator, &str)] = &[
    (Operator::Plus, "plus"),
    (Operator::Minus, "minus"),
    (Operator::Times, "times"),
    (Operator::Divide, "divide"),
    (Operator::Power, "power"),
    (Operator::Eq, "eq"),
    (Operator::Neq, "neq"),
    (Operator::Lt, "lt"),
    (Operator::Gt, "gt"),
    (Operator::Leq, "leq"),
    (Operator::Geq, "geq"),
    (Operator::Not, "not"),
    (Operator::And, "and"),
    (Operator::Or, "or"),
    (Operator::Quotient, "quotient"),
    (Operator::Rem, "rem"),
    (Operator::Max, "max"),
    (Operator::Min, "min"),
    (Operator::Root, "root"),
    (Operator::Xor, "xor"),
    (Operator::Abs, "abs"),
    (Operator::Floor, "floor"),
    (Operator::Ceiling, "ceiling"),
    (Operator::Exp, "exp"),
    (Operator::Ln, "ln"),
    (Operator::Log, "log"),
    (Operator::Sin, "sin"),
    (Operator::Cos, "cos"),
    (Operator::Tan, "tan"),
    (Operator::Sec, "sec"),
    (Operator::Csc, "csc"),
    (Operator::Cot, "cot"),
    (Operator::Sinh, "sinh"),
    (Operator::Cosh, "cosh"),
    (Operator::Tanh, "tanh"),
    (Operator::Sech, "sech"),
    (Operator::Csch, "csch"),
    (Operator::Coth, "coth"),
    (Operator::Arcsin, "arcsin"),
    (Operator::Arccos, "arccos"),
    (Operator::Arctan, "arctan"),
    (Operator::Arccosh, "arccosh"),
    (Operator::Arccot, "arccot"),
    (Operator::Arccoth, "arccoth"),
    (Operator::Arccsc, "arccsc"),
    (Operator::Arccsch, "arccsch"),
    (Operator::Arcsec, "arcsec"),
    (Operator::Arcsech, "arcsech"),
    (Operator::Arcsinh, "arcsinh"),
    (Operator::Arctanh, "arctanh"),
];

impl Operator {
    /// The MathML element name (`plus`, `leq`, `arctanh`, ...).
    pub fn mathml_name(self) -> &'static str {
        OPERATOR_NAMES
            .iter()
            .find(|(op, _)| *op == self)
            .map(|(_, name)| *name)
            .unwrap_or("unknown")
    }

    /// Look up a function from the `MathML:` vocabulary. Only the named
    /// functions are reachable this way; infix operators are not.
    pub fn from_mathml_function(name: &str) -> Option<Operator> {
        OPERATOR_NAMES
            .iter()
            .skip_while(|(op, _)| *op != Operator::Quotient)
            .find(|(_, n)| *n == name)
            .map(|(op, _)| *op)
    }

    /// Map an infix/prefix symbol to its operator.
    pub fn from_symbol(symbol: &str) -> Option<Operator> {
        Some(match symbol {
            "+" => Operator::Plus,
            "-" => Operator::Minus,
            "*" => Operator::Times,
            "/" => Operator::Divide,
            "^" => Operator::Power,
            "==" => Operator::Eq,
            "!=" => Operator::Neq,
            "<" => Operator::Lt,
            ">" => Operator::Gt,
            "<=" => Operator::Leq,
            ">=" => Operator::Geq,
            "not" => Operator::Not,
            "&&" => Operator::And,
            "||" => Operator::Or,
            _ => return None,
        })
    }

    /// The surface symbol for operators written infix or prefix.
    pub fn symbol(self) -> Option<&'static str> {
        Some(match self {
            Operator::Plus => "+",
            Operator::Minus => "-",
            Operator::Times => "*",
            Operator::Divide => "/",
            Operator::Power => "^",
            Operator::Eq => "==",
            Operator::Neq => "!=",
            Operator::Lt => "<",
            Operator::Gt => ">",
            Operator::Leq => "<=",
            Operator::Geq => ">=",
            Operator::Not => "not",
            Operator::And => "&&",
            Operator::Or => "||",
            _ => return None,
        })
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.symbol() {
            Some(symbol) => write!(f, "{symbol}"),
            None => write!(f, "MathML:{}", self.mathml_name()),
        }
    }
}

/// MathML constants reachable as `MathML:pi` etc.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constant {
    Pi,
    ExponentialE,
    Infinity,
    NotANumber,
    True,
    False,
}

impl Constant {
    pub fn from_name(name: &str) -> Option<Constant> {
        Some(match name {
            "pi" => Constant::Pi,
            "exponentiale" => Constant::ExponentialE,
            "infinity" => Constant::Infinity,
            "notanumber" => Constant::NotANumber,
            "true" => Constant::True,
            "false" => Constant::False,
            _ => return None,
        })
    }

    pub fn mathml_name(self) -> &'static str {
        match self {
            Constant::Pi => "pi",
            Constant::ExponentialE => "exponentiale",
            Constant::Infinity => "infinity",
            Constant::NotANumber => "notanumber",
            Constant::True => "true",
            Constant::False => "false",
        }
    }

    pub fn value(self) -> f64 {
        match self {
            Constant::Pi => std::f64::consts::PI,
            Constant::ExponentialE => std::f64::consts::E,
            Constant::Infinity => f64::INFINITY,
            Constant::NotANumber => f64::NAN,
            Constant::True => 1.0,
            Constant::False => 0.0,
        }
    }
}

/// Type-introspection and structural accessors (`x.SHAPE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accessor {
    IsSimpleValue,
    IsArray,
    IsString,
    IsTuple,
    IsFunction,
    IsNull,
    IsDefault,
    NumDims,
    NumElements,
    Shape,
}

impl Accessor {
    pub const ALL: [Accessor; 10] = [
        Accessor::IsSimpleValue,
        Accessor::IsArray,
        Accessor::IsString,
        Accessor::IsTuple,
        Accessor::IsFunction,
        Accessor::IsNull,
        Accessor::IsDefault,
        Accessor::NumDims,
        Accessor::NumElements,
        Accessor::Shape,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Accessor::IsSimpleValue => "IS_SIMPLE_VALUE",
            Accessor::IsArray => "IS_ARRAY",
            Accessor::IsString => "IS_STRING",
            Accessor::IsTuple => "IS_TUPLE",
            Accessor::IsFunction => "IS_FUNCTION",
            Accessor::IsNull => "IS_NULL",
            Accessor::IsDefault => "IS_DEFAULT",
            Accessor::NumDims => "NUM_DIMS",
            Accessor::NumElements => "NUM_ELEMENTS",
            Accessor::Shape => "SHAPE",
        }
    }

    pub fn from_name(name: &str) -> Option<Accessor> {
        Self::ALL.into_iter().find(|a| a.name() == name)
    }

    /// Structural accessors only apply to arrays.
    pub fn is_structural(self) -> bool {
        matches!(
            self,
            Accessor::NumDims | Accessor::NumElements | Accessor::Shape
        )
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Expressions
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
    /// Set by the trailing `?` marker.
    pub traced: bool,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self {
            kind,
            span,
            traced: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Number(NumberLit),
    Constant(Constant),
    Variable(String),
    StringLit(String),
    Null,
    Default,
    /// Operator application: infix, prefix, or `MathML:fn(args)`.
    Operator {
        op: Operator,
        operands: Vec<Expr>,
    },
    Tuple(Vec<Expr>),
    Lambda(Box<Lambda>),
    FunctionCall {
        callee: Ident,
        args: Vec<Expr>,
    },
    Accessor {
        target: Box<Expr>,
        accessor: Accessor,
    },
    Array(Vec<Expr>),
    Comprehension {
        generator: Box<Expr>,
        loops: Vec<ComprehensionLoop>,
    },
    View {
        target: Box<Expr>,
        specs: Vec<ViewSpec>,
    },
    Index {
        target: Box<Expr>,
        indices: Box<Expr>,
        mode: IndexMode,
    },
    If {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
    /// `@N:op` is an operator wrapped into an N-ary closure.
    Wrap {
        arity: usize,
        op: Operator,
    },
}

/// A numeric literal; the source text is kept for document emission.
#[derive(Debug, Clone, PartialEq)]
pub struct NumberLit {
    pub text: String,
    pub value: f64,
    pub units: Option<Ident>,
}

/// `for [dim$] var in start:[step:]end`
#[derive(Debug, Clone, PartialEq)]
pub struct ComprehensionLoop {
    pub dimension: Option<Expr>,
    pub variable: Ident,
    pub start: Expr,
    pub step: Option<Expr>,
    pub end: Expr,
    pub span: Span,
}

/// One bracketed slice in a view: `[dim$ start:step:end]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewSpec {
    pub dimension: Option<ViewDimension>,
    pub slice: Slice,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewDimension {
    Pinned(Expr),
    /// `*$` applies to every dimension not otherwise specified.
    Generic,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Slice {
    /// `[i]`
    Single(Option<Expr>),
    /// `[a:b]`
    Range {
        start: Option<Expr>,
        end: Option<Expr>,
    },
    /// `[a:s:b]`
    Stepped {
        start: Option<Expr>,
        step: Option<Expr>,
        end: Option<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum IndexMode {
    Plain,
    Shrink { dimension: Box<Expr> },
    Pad { dimension: Box<Expr>, value: Box<Expr> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lambda {
    pub params: Vec<Param>,
    pub body: LambdaBody,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: Ident,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LambdaBody {
    Expr(Box<Expr>),
    Block(Block),
}

// ══════════════════════════════════════════════════════════════════════════════
// Statements
// ══════════════════════════════════════════════════════════════════════════════

/// A statement list.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// `a = e` or `a, b = e1, e2`
    Assign {
        targets: Vec<Ident>,
        values: Vec<Expr>,
    },
    Return(Vec<Expr>),
    Assert(Expr),
    /// `def f(params): e` is sugar for assigning a lambda.
    FunctionDef { name: Ident, lambda: Lambda },
}

// ══════════════════════════════════════════════════════════════════════════════
// Protocol
// ══════════════════════════════════════════════════════════════════════════════

/// A parsed protocol file. Every section is optional.
#[derive(Debug, Clone, PartialEq)]
pub struct Protocol {
    pub namespaces: Vec<NamespaceDecl>,
    pub inputs: Option<Block>,
    pub imports: Vec<Import>,
    pub library: Option<Block>,
    pub units: Option<UnitsSection>,
    pub model_interface: Option<ModelInterface>,
    pub tasks: Option<Tasks>,
    pub post_processing: Option<PostProcessing>,
    pub outputs: Option<OutputsSection>,
    pub plots: Option<PlotsSection>,
    pub span: Span,
}

/// `namespace oxmeta = "uri"`
#[derive(Debug, Clone, PartialEq)]
pub struct NamespaceDecl {
    pub prefix: Ident,
    pub uri: String,
    pub span: Span,
}

/// `import [prefix =] "source" [{ name = expr ... }]`
#[derive(Debug, Clone, PartialEq)]
pub struct Import {
    pub prefix: Option<Ident>,
    pub source: String,
    pub set_inputs: Vec<Stmt>,
    pub span: Span,
}

/// `use imports prefix`
#[derive(Debug, Clone, PartialEq)]
pub struct UseImports {
    pub prefix: Ident,
    pub span: Span,
}

// ── Units ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct UnitsSection {
    pub items: Vec<UnitsItem>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UnitsItem {
    UseImports(UseImports),
    Def(UnitsDef),
}

/// `mV = milli volt "millivolts"`
#[derive(Debug, Clone, PartialEq)]
pub struct UnitsDef {
    pub name: Ident,
    pub refs: Vec<UnitRef>,
    pub description: Option<String>,
    pub span: Span,
}

/// One factor of a units definition. Numeric parts are kept as text.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitRef {
    pub multiplier: Option<String>,
    pub prefix: Option<String>,
    pub base: Ident,
    pub exponent: Option<String>,
    pub offset: Option<String>,
    pub span: Span,
}

// ── Model interface ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct ModelInterface {
    pub entries: Vec<ModelInterfaceEntry>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelInterfaceEntry {
    pub kind: ModelInterfaceKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModelInterfaceKind {
    UseImports(Ident),
    IndependentVarUnits(Ident),
    Input {
        name: Ident,
        units: Option<Ident>,
        initial: Option<NumberLit>,
    },
    Output {
        name: Ident,
        units: Option<Ident>,
    },
    Var {
        name: Ident,
        units: Ident,
        initial: Option<NumberLit>,
    },
    Define {
        target: DefineTarget,
        value: Expr,
    },
    Convert {
        from: Ident,
        to: Ident,
        rule: Lambda,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum DefineTarget {
    Variable(Ident),
    /// `diff(var; bvar)`
    Derivative { variable: Ident, bvar: Ident },
}

// ── Simulations ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Tasks {
    pub simulations: Vec<Simulation>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Simulation {
    pub name: Option<Ident>,
    pub kind: SimulationKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SimulationKind {
    Timecourse {
        range: Range,
        modifiers: Vec<Modifier>,
    },
    Nested {
        range: Range,
        modifiers: Vec<Modifier>,
        nested: Box<NestedTarget>,
    },
    OneStep(Option<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum NestedTarget {
    Simulation(Simulation),
    /// `nests name` names a simulation declared earlier in the same tasks block.
    Reference(Ident),
}

/// `range name units u (uniform a:b:c | vector e | while e)`
#[derive(Debug, Clone, PartialEq)]
pub struct Range {
    pub name: Ident,
    pub units: Ident,
    pub kind: RangeKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RangeKind {
    Uniform {
        start: Expr,
        step: Option<Expr>,
        end: Expr,
    },
    Vector(Expr),
    While(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Modifier {
    pub when: ModifierWhen,
    pub action: ModifierAction,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModifierWhen {
    AtStart,
    EveryLoop,
    AtEnd,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModifierAction {
    SetVariable { name: Ident, value: Expr },
    SaveState(Ident),
    ResetState(Option<Ident>),
}

// ── Post-processing, outputs, plots ────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct PostProcessing {
    pub items: Vec<PostProcessingItem>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PostProcessingItem {
    UseImports(UseImports),
    Stmt(Stmt),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputsSection {
    pub items: Vec<OutputItem>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutputItem {
    UseImports(UseImports),
    Output(OutputSpec),
}

/// `name units u "desc"` or `name = ref [units u] "desc"`
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSpec {
    pub name: Ident,
    pub reference: Option<Ident>,
    pub units: Option<Ident>,
    /// The units as displayed: the units definition's description when one
    /// was declared, otherwise the raw units name.
    pub units_label: Option<String>,
    pub description: Option<String>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlotsSection {
    pub items: Vec<PlotItem>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlotItem {
    UseImports(UseImports),
    Plot(Plot),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Plot {
    pub title: String,
    pub curves: Vec<Curve>,
    pub span: Span,
}

/// `y1, y2 against x`
#[derive(Debug, Clone, PartialEq)]
pub struct Curve {
    pub y: Vec<Ident>,
    pub x: Ident,
    pub span: Span,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mathml_function_lookup_excludes_infix_operators() {
        assert_eq!(Operator::from_mathml_function("max"), Some(Operator::Max));
        assert_eq!(Operator::from_mathml_function("arctanh"), Some(Operator::Arctanh));
        assert_eq!(Operator::from_mathml_function("plus"), None);
        assert_eq!(Operator::from_mathml_function("nonsense"), None);
    }

    #[test]
    fn test_operator_symbols() {
        for symbol in ["+", "-", "*", "/", "^", "==", "!=", "<", ">", "<=", ">=", "not", "&&", "||"] {
            let op = Operator::from_symbol(symbol).unwrap();
            assert_eq!(op.symbol(), Some(symbol));
        }
        assert_eq!(Operator::Max.symbol(), None);
        assert_eq!(Operator::Max.to_string(), "MathML:max");
        assert_eq!(Operator::Leq.mathml_name(), "leq");
    }

    #[test]
    fn test_accessor_names() {
        for accessor in Accessor::ALL {
            assert_eq!(Accessor::from_name(accessor.name()), Some(accessor));
        }
        assert!(Accessor::Shape.is_structural());
        assert!(!Accessor::IsNull.is_structural());
    }

    #[test]
    fn test_constants() {
        assert_eq!(Constant::from_name("pi"), Some(Constant::Pi));
        assert_eq!(Constant::True.value(), 1.0);
        assert!(Constant::NotANumber.value().is_nan());
    }
}
