//! Source evaluation
//!
//! A small line-oriented statement language: assignments (including
//! attribute, item and unpacking targets), augmented assignment, `del`,
//! `raise`, `assert`, `import`, `pass` and expression statements, over an
//! expression grammar with literals, containers, attribute access,
//! subscription and slicing, calls, `lambda`, arithmetic, comparisons and
//! boolean operators.

pub mod ast;
mod exec;
pub mod lexer;
pub mod parser;

pub use parser::{parse_expression, parse_module};
