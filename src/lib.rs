//! An interpreter for a small dynamically-typed scripting language with
//! Kotlin-flavoured syntax: newline-terminated statements, `when` matching,
//! ranges, array and string slicing, safe navigation (`?.`) with an Elvis
//! fallback (`?:`) and Kotlin-style trailing lambdas with an implicit `it`
//! parameter.
//!
//! The pipeline is conventional: a scanner turns source text into tokens, a
//! recursive-descent parser builds a statement tree and a tree-walking
//! evaluator runs it.  Use [`interpreter::Interpreter`] to drive the whole
//! thing.

#![warn(rust_2018_idioms)]
#![warn(missing_debug_implementations)]

pub mod diag;
pub mod interpreter;

mod ast;
mod env;
mod eval;
mod parser;
mod scanner;
mod token;
mod value;
