//! Expression and statement tree produced by the parser.
//!
//! Nodes keep the tokens they were built from so the evaluator can report
//! errors at the exact point of failure rather than at statement start.

use crate::token::Token;

#[derive(Debug, PartialEq, Clone)]
pub enum Stmt {
    Expression(Expr),
    Var(Token, Option<Expr>),
    For {
        variable: Token,
        iterable: Expr,
        body: Expr,
    },
    Function {
        name: Token,
        params: Vec<Token>,
        body: Expr,
    },
    Break(Token),
    Continue(Token),
    Return(Token, Option<Expr>),
    // Statement form of `when`: same node as the expression form but a
    // non-matching one without `else` is a no-op instead of an error.
    When(Expr),
}

#[derive(Debug, PartialEq, Clone)]
pub enum Expr {
    Literal(Lit),
    Variable(Token),
    Assign(Token, Box<Expr>),
    Unary(Token, Box<Expr>),
    Binary(Box<Expr>, Token, Box<Expr>),
    Grouping(Box<Expr>),
    Call {
        callee: Box<Expr>,
        paren: Token,
        arguments: Vec<Expr>,
    },
    Get {
        object: Box<Expr>,
        name: Token,
        safe: bool,
    },
    Subscription {
        left: Box<Expr>,
        bracket: Token,
        index: Box<Expr>,
    },
    Slice {
        left: Box<Expr>,
        bracket: Token,
        start: Box<Expr>,
        end: Box<Expr>,
        close: Token,
    },
    Function {
        params: Vec<Token>,
        body: Box<Expr>,
    },
    Block(Vec<Stmt>),
    When {
        keyword: Token,
        initializer: Option<Box<Expr>>,
        cases: Vec<WhenCase>,
        else_branch: Option<Box<Expr>>,
    },
}

#[derive(Debug, PartialEq, Clone)]
pub struct WhenCase {
    pub condition: Expr,
    pub result: Expr,
}

#[derive(Debug, PartialEq, Clone)]
pub enum Lit {
    Nil,
    Bool(bool),
    Int(i64),
    Number(f64),
    Str(String),
    // Members are arbitrary expressions evaluated eagerly, in order.
    List(Vec<Expr>),
}
