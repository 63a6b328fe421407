//! Syntax tree of the statement language

use std::rc::Rc;

use num_bigint::BigInt;

use crate::ops::{BinaryOp, CompareOp};

/// Literal constants.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// `None`
    None,
    /// `True` / `False`
    Bool(bool),
    /// Integer fitting a machine word
    Int(i64),
    /// Integer beyond a machine word
    Long(BigInt),
    /// Float
    Float(f64),
    /// String
    Str(String),
    /// Bytes
    Bytes(Vec<u8>),
}

/// Comparison operators, including membership and identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    /// `<`, `<=`, `==`, `!=`, `>`, `>=`
    Rich(CompareOp),
    /// `in`
    In,
    /// `not in`
    NotIn,
    /// `is`
    Is,
    /// `is not`
    IsNot,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `-x`
    Neg,
    /// `+x`
    Pos,
    /// `~x`
    Invert,
    /// `not x`
    Not,
}

/// A lambda parameter.
#[derive(Debug, Clone)]
pub struct Param {
    /// Parameter name
    pub name: String,
    /// Default value expression
    pub default: Option<Expr>,
}

/// `lambda params: body`
#[derive(Debug)]
pub struct LambdaDef {
    /// Positional parameters
    pub params: Vec<Param>,
    /// `*args` name
    pub varargs: Option<String>,
    /// `**kwargs` name
    pub kwargs: Option<String>,
    /// Body expression
    pub body: Expr,
    /// Line the lambda was written on
    pub line: usize,
}

/// Call argument.
#[derive(Debug, Clone)]
pub enum Arg {
    /// `f(x)`
    Positional(Expr),
    /// `f(*xs)`
    Star(Expr),
    /// `f(name=x)`
    Keyword(String, Expr),
    /// `f(**kw)`
    DoubleStar(Expr),
}

/// Expressions.
#[derive(Debug, Clone)]
pub enum Expr {
    /// Constant
    Literal(Literal),
    /// Variable reference
    Name(String),
    /// `[a, b]`
    List(Vec<Expr>),
    /// `(a, b)`
    Tuple(Vec<Expr>),
    /// `{k: v}`
    Dict(Vec<(Expr, Expr)>),
    /// `{a, b}`
    Set(Vec<Expr>),
    /// `obj.name`
    Attribute(Box<Expr>, String),
    /// `obj[index]`
    Subscript(Box<Expr>, Box<Expr>),
    /// `start:stop:step` inside a subscript
    Slice(Option<Box<Expr>>, Option<Box<Expr>>, Option<Box<Expr>>),
    /// `f(args)`
    Call(Box<Expr>, Vec<Arg>),
    /// Unary operator
    Unary(UnaryOp, Box<Expr>),
    /// Binary operator
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    /// Chained comparison `a < b < c`
    Compare(Box<Expr>, Vec<(CmpOp, Expr)>),
    /// `a and b`
    And(Box<Expr>, Box<Expr>),
    /// `a or b`
    Or(Box<Expr>, Box<Expr>),
    /// `a if cond else b`
    IfElse(Box<Expr>, Box<Expr>, Box<Expr>),
    /// `lambda`
    Lambda(Rc<LambdaDef>),
}

/// Statement kinds.
#[derive(Debug, Clone)]
pub enum StmtKind {
    /// `pass`
    Pass,
    /// Expression evaluated for effect
    Expr(Expr),
    /// `a = b = value`
    Assign(Vec<Expr>, Expr),
    /// `a += value`
    AugAssign(Expr, BinaryOp, Expr),
    /// `del a, b[0]`
    Delete(Vec<Expr>),
    /// `raise [exc [from cause]]`
    Raise(Option<Expr>, Option<Expr>),
    /// `assert test[, message]`
    Assert(Expr, Option<Expr>),
    /// `import a.b [as c]`
    Import(Vec<(String, Option<String>)>),
    /// `from a import b [as c]`
    FromImport(String, Vec<(String, Option<String>)>),
    /// `global a, b`, accepted and ignored at module level
    Global(Vec<String>),
}

/// A statement with its location.
#[derive(Debug, Clone)]
pub struct Stmt {
    /// What it does
    pub kind: StmtKind,
    /// 1-based line
    pub line: usize,
    /// 0-based column of the first token
    pub col: usize,
}
