//! Filter syntax tree produced by the parser.

use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl ArithOp {
    pub fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::Rem => "%",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Assignment operators. `Arith` covers `+=`, `-=` and friends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Set,
    Update,
    Arith(ArithOp),
    Alternative,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObjectKey {
    Literal(String),
    /// Computed key: `(expr)`, `$var`, or an interpolated string.
    Dynamic(Filter),
}

#[derive(Debug, Clone, PartialEq)]
pub enum StringPart {
    Literal(String),
    Interp(Filter),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `.`
    Identity,
    /// `..`
    RecurseDefault,
    /// `target[key]`; `.foo` is `Index(Identity, Literal("foo"))`.
    Index(Box<Filter>, Box<Filter>),
    /// `target[from:to]`
    Slice(Box<Filter>, Option<Box<Filter>>, Option<Box<Filter>>),
    /// `target[]`
    Iterate(Box<Filter>),
    Pipe(Box<Filter>, Box<Filter>),
    Comma(Box<Filter>, Box<Filter>),
    Literal(Value),
    /// String literal, optionally prefixed by `@format`.
    Str(Vec<StringPart>, Option<String>),
    /// Bare `@format`.
    Format(String),
    Array(Option<Box<Filter>>),
    Object(Vec<(ObjectKey, Filter)>),
    Neg(Box<Filter>),
    Arith(ArithOp, Box<Filter>, Box<Filter>),
    Compare(CompareOp, Box<Filter>, Box<Filter>),
    And(Box<Filter>, Box<Filter>),
    Or(Box<Filter>, Box<Filter>),
    Alternative(Box<Filter>, Box<Filter>),
    Assign(AssignOp, Box<Filter>, Box<Filter>),
    /// `elif` chains are nested `If`s in the else branch.
    If {
        cond: Box<Filter>,
        then_branch: Box<Filter>,
        else_branch: Option<Box<Filter>>,
    },
    /// `try body catch handler`; postfix `?` is a `Try` without handler.
    Try {
        body: Box<Filter>,
        handler: Option<Box<Filter>>,
    },
    Reduce {
        source: Box<Filter>,
        var: String,
        init: Box<Filter>,
        update: Box<Filter>,
    },
    Foreach {
        source: Box<Filter>,
        var: String,
        init: Box<Filter>,
        update: Box<Filter>,
        extract: Option<Box<Filter>>,
    },
    Var(String),
    Call {
        name: String,
        args: Vec<Filter>,
    },
}

impl Filter {
    pub fn field(name: impl Into<String>) -> Filter {
        Filter::Index(
            Box::new(Filter::Identity),
            Box::new(Filter::Literal(Value::String(name.into()))),
        )
    }

    pub fn call(name: impl Into<String>, args: Vec<Filter>) -> Filter {
        Filter::Call {
            name: name.into(),
            args,
        }
    }

    pub fn pipe(lhs: Filter, rhs: Filter) -> Filter {
        Filter::Pipe(Box::new(lhs), Box::new(rhs))
    }
}
