//! Runtime values.

use std::fmt;
use std::rc::Rc;

use crate::ast::Expr;
use crate::env::Environment;
use crate::token::Token;

/// A value produced by evaluation.
///
/// Scalars are cheap to clone; strings, arrays and functions share their
/// payload through `Rc`.  `Maybe` marks a value reached through the `?.`
/// operator, so that later member accesses on it can short-circuit to nil
/// instead of failing.
#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Number(f64),
    Str(Rc<str>),
    Array(Rc<Vec<Value>>),
    Function(Rc<Function>),
    Builtin(Builtin),
    Method(Rc<BoundMethod>),
    Maybe(Box<Value>),
}

/// User-defined function: a name (absent for literals), parameters, the body
/// expression and the environment captured at definition.
#[derive(Debug)]
pub struct Function {
    pub name: Option<String>,
    pub params: Vec<Token>,
    pub body: Expr,
    pub closure: Rc<Environment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Print,
    Clock,
}

/// A method plucked off a receiver, ready to be called.
#[derive(Debug)]
pub struct BoundMethod {
    pub receiver: Value,
    pub method: Method,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Let,
    Map,
    Filter,
    Fold,
    Scan,
    Split,
}

impl Value {
    /// Nil and false are falsey, everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        match self.unboxed() {
            Value::Nil => false,
            Value::Bool(b) => *b,
            _ => true,
        }
    }

    /// Strips the safe-navigation wrapper, if any.
    pub fn unboxed(&self) -> &Value {
        match self {
            Value::Maybe(inner) => inner.unboxed(),
            other => other,
        }
    }

    /// Looks up a member on this value.  Unknown names yield `None`; the
    /// caller decides whether that is nil or an error.
    pub fn get(&self, name: &str) -> Option<Value> {
        match self {
            Value::Maybe(inner) => match inner.as_ref() {
                Value::Nil => Some(self.clone()),
                other => other.get(name),
            },
            Value::Array(members) => match name {
                "length" => Some(Value::Int(members.len() as i64)),
                "map" => Some(self.bind(Method::Map)),
                "filter" => Some(self.bind(Method::Filter)),
                "fold" => Some(self.bind(Method::Fold)),
                "scan" => Some(self.bind(Method::Scan)),
                "let" => Some(self.bind(Method::Let)),
                _ => None,
            },
            Value::Str(s) => match name {
                "length" => Some(Value::Int(s.chars().count() as i64)),
                "split" => Some(self.bind(Method::Split)),
                "let" => Some(self.bind(Method::Let)),
                _ => None,
            },
            _ => match name {
                "let" => Some(self.bind(Method::Let)),
                _ => None,
            },
        }
    }

    fn bind(&self, method: Method) -> Value {
        Value::Method(Rc::new(BoundMethod {
            receiver: self.clone(),
            method,
        }))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self.unboxed(), other.unboxed()) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            // Mixed numerics compare by value.
            (Value::Int(a), Value::Number(b)) | (Value::Number(b), Value::Int(a)) => {
                *a as f64 == *b
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a == b,
            (Value::Method(a), Value::Method(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Number(n) => write!(f, "{}", n),
            Value::Str(s) => write!(f, "{}", s),
            Value::Array(members) => {
                write!(f, "[")?;
                for (i, member) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", member)?;
                }
                write!(f, "]")
            }
            Value::Function(fun) => write!(
                f,
                "function {}/{}",
                fun.name.as_deref().unwrap_or("<anonymous>"),
                fun.params.len()
            ),
            Value::Builtin(Builtin::Print) => write!(f, "function print"),
            Value::Builtin(Builtin::Clock) => write!(f, "function clock"),
            Value::Method(bound) => {
                let name = match bound.method {
                    Method::Let => "let",
                    Method::Map => "map",
                    Method::Filter => "filter",
                    Method::Fold => "fold",
                    Method::Scan => "scan",
                    Method::Split => "split",
                };
                write!(f, "method {}", name)
            }
            Value::Maybe(inner) => write!(f, "{}", inner),
        }
    }
}
