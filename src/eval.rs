//! Tree-walking evaluator.
//!
//! Expressions and statements are evaluated directly off the tree.  The
//! non-value exits (runtime errors, `break`, `continue`, `return`) all
//! travel through [`Unwind`] on the error channel; loops catch the loop
//! signals, the call machinery catches returns, and anything escaping to
//! the top level is converted into a runtime error there.

use std::io::Write;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

use crate::ast::{Expr, Lit, Stmt, WhenCase};
use crate::env::Environment;
use crate::token::{Token, TokenKind};
use crate::value::{Builtin, Function, Method, Value};

/// A runtime failure, anchored at the token to blame.
#[derive(Debug)]
pub struct RuntimeError {
    pub token: Token,
    pub kind: RuntimeErrorKind,
}

#[derive(Debug, Error)]
pub enum RuntimeErrorKind {
    #[error("{0} is not a number")]
    NotNumber(Value),
    #[error("{0} is not an integer")]
    NotInteger(Value),
    #[error("Undefined variable '{0}'")]
    UndefinedVariable(String),
    #[error("Mismatched types {0} + {1}")]
    MismatchedTypes(Value, Value),
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Integer overflow")]
    IntegerOverflow,
    #[error("{0} is not callable")]
    NotCallable(Value),
    #[error("Expected {expected} arguments but got {got}")]
    ArityMismatch { expected: usize, got: usize },
    #[error("{0} is not indexable")]
    NotIndexable(Value),
    #[error("Index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: i64, len: usize },
    #[error("Invalid slice range")]
    InvalidSliceRange,
    #[error("{0} is null")]
    NullAccess(Value),
    #[error("when expression must be exhaustive")]
    NonExhaustiveWhen,
    #[error("{0} is not iterable")]
    NotIterable(Value),
    #[error("'break' outside of a loop")]
    BreakOutsideLoop,
    #[error("'continue' outside of a loop")]
    ContinueOutsideLoop,
    #[error("'return' outside of a function")]
    ReturnOutsideFunction,
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

/// Non-local exits.  Only `Error` may reach the top level; the loop and
/// return signals are caught by their enclosing construct or turned into
/// errors at the boundary they illegally crossed.
#[derive(Debug)]
pub(crate) enum Unwind {
    Error(RuntimeError),
    Break(Token),
    Continue(Token),
    Return(Token, Value),
}

impl From<RuntimeError> for Unwind {
    fn from(error: RuntimeError) -> Unwind {
        Unwind::Error(error)
    }
}

type EResult<T> = Result<T, Unwind>;

/// Evaluates a program, writing `print` output to `output`.
#[derive(Debug)]
pub struct Evaluator<'t, W: Write> {
    output: &'t mut W,
    globals: Rc<Environment>,
}

impl<'t, W: Write> Evaluator<'t, W> {
    pub fn new(output: &'t mut W) -> Evaluator<'t, W> {
        let globals = Environment::new();
        globals.define("print", Value::Builtin(Builtin::Print));
        globals.define("clock", Value::Builtin(Builtin::Clock));
        Evaluator { output, globals }
    }

    pub fn interpret(&mut self, statements: &[Stmt]) -> Result<(), RuntimeError> {
        let env = self.globals.clone();
        for statement in statements {
            if let Err(unwind) = self.execute(statement, &env) {
                return Err(match unwind {
                    Unwind::Error(error) => error,
                    Unwind::Break(token) => error_at(&token, RuntimeErrorKind::BreakOutsideLoop),
                    Unwind::Continue(token) => {
                        error_at(&token, RuntimeErrorKind::ContinueOutsideLoop)
                    }
                    Unwind::Return(token, _) => {
                        error_at(&token, RuntimeErrorKind::ReturnOutsideFunction)
                    }
                });
            }
        }
        Ok(())
    }

    /// Executes one statement, yielding its value so that the last statement
    /// of a block can provide the block's value.
    fn execute(&mut self, statement: &Stmt, env: &Rc<Environment>) -> EResult<Value> {
        match statement {
            Stmt::Expression(expr) => self.evaluate(expr, env),
            Stmt::Var(name, initializer) => {
                let value = match initializer {
                    Some(expr) => self.evaluate(expr, env)?,
                    None => Value::Nil,
                };
                env.define(&name.lexeme, value);
                Ok(Value::Nil)
            }
            Stmt::For {
                variable,
                iterable,
                body,
            } => self.execute_for(variable, iterable, body, env),
            Stmt::Function { name, params, body } => {
                let function = Value::Function(Rc::new(Function {
                    name: Some(name.lexeme.clone()),
                    params: params.clone(),
                    body: body.clone(),
                    closure: env.clone(),
                }));
                env.define(&name.lexeme, function);
                Ok(Value::Nil)
            }
            Stmt::Break(keyword) => Err(Unwind::Break(keyword.clone())),
            Stmt::Continue(keyword) => Err(Unwind::Continue(keyword.clone())),
            Stmt::Return(keyword, value) => {
                let value = match value {
                    Some(expr) => self.evaluate(expr, env)?,
                    None => Value::Nil,
                };
                Err(Unwind::Return(keyword.clone(), value))
            }
            Stmt::When(expr) => match expr {
                Expr::When {
                    keyword,
                    initializer,
                    cases,
                    else_branch,
                } => self.evaluate_when(
                    keyword,
                    initializer.as_deref(),
                    cases,
                    else_branch.as_deref(),
                    false,
                    env,
                ),
                other => self.evaluate(other, env),
            },
        }
    }

    fn execute_for(
        &mut self,
        variable: &Token,
        iterable: &Expr,
        body: &Expr,
        env: &Rc<Environment>,
    ) -> EResult<Value> {
        let items = match self.evaluate(iterable, env)?.unboxed() {
            Value::Array(members) => members.clone(),
            other => {
                return Err(error_at(variable, RuntimeErrorKind::NotIterable(other.clone())).into())
            }
        };

        // One environment reused across iterations; the loop variable is
        // rebound each time round.
        let loop_env = Environment::with_enclosing(env.clone());
        for item in items.iter() {
            loop_env.define(&variable.lexeme, item.clone());
            match self.evaluate(body, &loop_env) {
                Ok(_) => {}
                Err(Unwind::Break(_)) => break,
                Err(Unwind::Continue(_)) => continue,
                Err(other) => return Err(other),
            }
        }
        Ok(Value::Nil)
    }

    fn evaluate(&mut self, expr: &Expr, env: &Rc<Environment>) -> EResult<Value> {
        match expr {
            Expr::Literal(lit) => self.literal(lit, env),
            Expr::Variable(name) => env.get(&name.lexeme).ok_or_else(|| {
                error_at(
                    name,
                    RuntimeErrorKind::UndefinedVariable(name.lexeme.clone()),
                )
                .into()
            }),
            Expr::Assign(name, value) => {
                let value = self.evaluate(value, env)?;
                if !env.assign(&name.lexeme, value.clone()) {
                    return Err(error_at(
                        name,
                        RuntimeErrorKind::UndefinedVariable(name.lexeme.clone()),
                    )
                    .into());
                }
                Ok(value)
            }
            Expr::Unary(operator, right) => {
                let right = self.evaluate(right, env)?;
                match operator.kind {
                    TokenKind::Bang => Ok(Value::Bool(!right.is_truthy())),
                    TokenKind::Minus => match right.unboxed() {
                        Value::Int(n) => match n.checked_neg() {
                            Some(n) => Ok(Value::Int(n)),
                            None => {
                                Err(error_at(operator, RuntimeErrorKind::IntegerOverflow).into())
                            }
                        },
                        Value::Number(n) => Ok(Value::Number(-n)),
                        other => Err(
                            error_at(operator, RuntimeErrorKind::NotNumber(other.clone())).into()
                        ),
                    },
                    _ => unreachable!("parser produced bad unary operator"),
                }
            }
            Expr::Binary(left, operator, right) => {
                // Elvis short-circuits: the fallback is only evaluated when
                // the left side is nil.
                if operator.kind == TokenKind::Elvis {
                    let left = self.evaluate(left, env)?;
                    return if matches!(left.unboxed(), Value::Nil) {
                        self.evaluate(right, env)
                    } else {
                        Ok(left)
                    };
                }
                let left = self.evaluate(left, env)?;
                let right = self.evaluate(right, env)?;
                binary_op(operator, left, right)
            }
            Expr::Grouping(inner) => self.evaluate(inner, env),
            Expr::Call {
                callee,
                paren,
                arguments,
            } => {
                let callee = self.evaluate(callee, env)?;
                // A call reached through `?.` on nil is itself swallowed.
                if let Value::Maybe(inner) = &callee {
                    if matches!(inner.unboxed(), Value::Nil) {
                        return Ok(Value::Maybe(Box::new(Value::Nil)));
                    }
                }
                let mut args = Vec::with_capacity(arguments.len());
                for argument in arguments {
                    args.push(self.evaluate(argument, env)?);
                }
                self.call_value(&callee, args, paren)
            }
            Expr::Get { object, name, safe } => {
                let object = self.evaluate(object, env)?;
                // Only a bare nil receiver is an error: a Maybe wrapping nil
                // swallows any further member access, safe or not.
                if matches!(object, Value::Nil) {
                    return if *safe {
                        Ok(Value::Maybe(Box::new(Value::Nil)))
                    } else {
                        Err(error_at(name, RuntimeErrorKind::NullAccess(object)).into())
                    };
                }
                let member = object.get(&name.lexeme).unwrap_or(Value::Nil);
                Ok(if *safe && !matches!(member, Value::Maybe(_)) {
                    Value::Maybe(Box::new(member))
                } else {
                    member
                })
            }
            Expr::Subscription {
                left,
                bracket,
                index,
            } => {
                let left = self.evaluate(left, env)?;
                let index = self.evaluate(index, env)?;
                let index = integer(bracket, &index)?;
                subscript(&left, index, bracket)
            }
            Expr::Slice {
                left,
                bracket,
                start,
                end,
                close,
            } => {
                let left = self.evaluate(left, env)?;
                let start = self.evaluate(start, env)?;
                let start = integer(bracket, &start)?;
                let end = self.evaluate(end, env)?;
                let end = integer(bracket, &end)?;
                slice(&left, start, end, bracket, close)
            }
            Expr::Function { params, body } => Ok(Value::Function(Rc::new(Function {
                name: None,
                params: params.clone(),
                body: (**body).clone(),
                closure: env.clone(),
            }))),
            Expr::Block(statements) => {
                let block_env = Environment::with_enclosing(env.clone());
                let mut value = Value::Nil;
                for statement in statements {
                    value = self.execute(statement, &block_env)?;
                }
                Ok(value)
            }
            Expr::When {
                keyword,
                initializer,
                cases,
                else_branch,
            } => self.evaluate_when(
                keyword,
                initializer.as_deref(),
                cases,
                else_branch.as_deref(),
                true,
                env,
            ),
        }
    }

    fn literal(&mut self, lit: &Lit, env: &Rc<Environment>) -> EResult<Value> {
        Ok(match lit {
            Lit::Nil => Value::Nil,
            Lit::Bool(b) => Value::Bool(*b),
            Lit::Int(n) => Value::Int(*n),
            Lit::Number(n) => Value::Number(*n),
            Lit::Str(s) => Value::Str(Rc::from(s.as_str())),
            Lit::List(members) => {
                let mut values = Vec::with_capacity(members.len());
                for member in members {
                    values.push(self.evaluate(member, env)?);
                }
                Value::Array(Rc::new(values))
            }
        })
    }

    /// Invokes `callee` with already-evaluated arguments.  `paren` anchors
    /// arity and type errors at the call site.
    fn call_value(&mut self, callee: &Value, args: Vec<Value>, paren: &Token) -> EResult<Value> {
        match callee.unboxed() {
            Value::Function(function) => {
                let function = function.clone();
                if args.len() != function.params.len() {
                    return Err(error_at(
                        paren,
                        RuntimeErrorKind::ArityMismatch {
                            expected: function.params.len(),
                            got: args.len(),
                        },
                    )
                    .into());
                }
                // Parameters bind in a fresh child of the environment the
                // function closed over, not the caller's.
                let call_env = Environment::with_enclosing(function.closure.clone());
                for (param, arg) in function.params.iter().zip(args) {
                    call_env.define(&param.lexeme, arg);
                }
                match self.evaluate(&function.body, &call_env) {
                    Err(Unwind::Return(_, value)) => Ok(value),
                    Err(Unwind::Break(token)) => {
                        Err(error_at(&token, RuntimeErrorKind::BreakOutsideLoop).into())
                    }
                    Err(Unwind::Continue(token)) => {
                        Err(error_at(&token, RuntimeErrorKind::ContinueOutsideLoop).into())
                    }
                    other => other,
                }
            }
            Value::Builtin(Builtin::Print) => {
                let mut text = String::new();
                for arg in &args {
                    text.push_str(&arg.to_string());
                }
                writeln!(self.output, "{}", text)
                    .map_err(|e| error_at(paren, RuntimeErrorKind::Io(e)))?;
                Ok(Value::Nil)
            }
            Value::Builtin(Builtin::Clock) => {
                let now = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs_f64())
                    .unwrap_or(0.0);
                Ok(Value::Number(now))
            }
            Value::Method(bound) => {
                let bound = bound.clone();
                self.call_method(&bound.receiver, bound.method, args, paren)
            }
            other => Err(error_at(paren, RuntimeErrorKind::NotCallable(other.clone())).into()),
        }
    }

    fn call_method(
        &mut self,
        receiver: &Value,
        method: Method,
        mut args: Vec<Value>,
        paren: &Token,
    ) -> EResult<Value> {
        let arity = match method {
            Method::Fold | Method::Scan => 2,
            _ => 1,
        };
        if args.len() != arity {
            return Err(error_at(
                paren,
                RuntimeErrorKind::ArityMismatch {
                    expected: arity,
                    got: args.len(),
                },
            )
            .into());
        }

        match method {
            Method::Let => {
                let f = args.remove(0);
                self.call_value(&f, vec![receiver.unboxed().clone()], paren)
            }
            Method::Map => {
                let f = args.remove(0);
                let members = receiver_array(receiver, paren)?;
                let mut mapped = Vec::with_capacity(members.len());
                for member in members.iter() {
                    mapped.push(self.call_value(&f, vec![member.clone()], paren)?);
                }
                Ok(Value::Array(Rc::new(mapped)))
            }
            Method::Filter => {
                let f = args.remove(0);
                let members = receiver_array(receiver, paren)?;
                let mut kept = vec![];
                for member in members.iter() {
                    // Only a literal `true` keeps the element; other truthy
                    // results do not.
                    let verdict = self.call_value(&f, vec![member.clone()], paren)?;
                    if matches!(verdict.unboxed(), Value::Bool(true)) {
                        kept.push(member.clone());
                    }
                }
                Ok(Value::Array(Rc::new(kept)))
            }
            Method::Fold => {
                let f = args.remove(0);
                let mut accumulator = args.remove(0);
                let members = receiver_array(receiver, paren)?;
                for member in members.iter() {
                    accumulator = self.call_value(&f, vec![accumulator, member.clone()], paren)?;
                }
                Ok(accumulator)
            }
            Method::Scan => {
                let f = args.remove(0);
                let mut accumulator = args.remove(0);
                let members = receiver_array(receiver, paren)?;
                let mut scanned = Vec::with_capacity(members.len());
                for member in members.iter() {
                    accumulator = self.call_value(&f, vec![accumulator, member.clone()], paren)?;
                    scanned.push(accumulator.clone());
                }
                Ok(Value::Array(Rc::new(scanned)))
            }
            Method::Split => {
                let separator = args.remove(0);
                let (s, separator) = match (receiver.unboxed(), separator.unboxed()) {
                    (Value::Str(s), Value::Str(sep)) => (s.clone(), sep.clone()),
                    (_, sep) => {
                        return Err(error_at(
                            paren,
                            RuntimeErrorKind::MismatchedTypes(
                                receiver.unboxed().clone(),
                                sep.clone(),
                            ),
                        )
                        .into())
                    }
                };
                let pieces: Vec<Value> = s
                    .split(&*separator)
                    .map(|piece| Value::Str(Rc::from(piece)))
                    .collect();
                Ok(Value::Array(Rc::new(pieces)))
            }
        }
    }

    fn evaluate_when(
        &mut self,
        keyword: &Token,
        initializer: Option<&Expr>,
        cases: &[WhenCase],
        else_branch: Option<&Expr>,
        is_expression: bool,
        env: &Rc<Environment>,
    ) -> EResult<Value> {
        let subject = match initializer {
            Some(expr) => Some(self.evaluate(expr, env)?),
            None => None,
        };
        for case in cases {
            let condition = self.evaluate(&case.condition, env)?;
            // A case matches the subject by equality; a literal `true`
            // condition acts as a guard and always matches.
            let matched = match &subject {
                Some(subject) => *subject == condition || condition == Value::Bool(true),
                None => condition == Value::Bool(true),
            };
            if matched {
                return self.evaluate(&case.result, env);
            }
        }
        if let Some(else_branch) = else_branch {
            return self.evaluate(else_branch, env);
        }
        if is_expression {
            Err(error_at(keyword, RuntimeErrorKind::NonExhaustiveWhen).into())
        } else {
            Ok(Value::Nil)
        }
    }
}

fn error_at(token: &Token, kind: RuntimeErrorKind) -> RuntimeError {
    RuntimeError {
        token: token.clone(),
        kind,
    }
}

fn number(token: &Token, value: &Value) -> Result<f64, Unwind> {
    match value.unboxed() {
        Value::Int(n) => Ok(*n as f64),
        Value::Number(n) => Ok(*n),
        other => Err(error_at(token, RuntimeErrorKind::NotNumber(other.clone())).into()),
    }
}

/// Coerces to an integer; floats are accepted when they have no fraction.
fn integer(token: &Token, value: &Value) -> Result<i64, Unwind> {
    match value.unboxed() {
        Value::Int(n) => Ok(*n),
        Value::Number(n) if n.fract() == 0.0 => Ok(*n as i64),
        other => Err(error_at(token, RuntimeErrorKind::NotInteger(other.clone())).into()),
    }
}

fn binary_op(operator: &Token, left: Value, right: Value) -> EResult<Value> {
    use TokenKind::*;
    match operator.kind {
        EqualEqual => Ok(Value::Bool(left == right)),
        BangEqual => Ok(Value::Bool(left != right)),
        Greater => Ok(Value::Bool(
            number(operator, &left)? > number(operator, &right)?,
        )),
        GreaterEqual => Ok(Value::Bool(
            number(operator, &left)? >= number(operator, &right)?,
        )),
        Less => Ok(Value::Bool(
            number(operator, &left)? < number(operator, &right)?,
        )),
        LessEqual => Ok(Value::Bool(
            number(operator, &left)? <= number(operator, &right)?,
        )),
        Plus => add(operator, left, right),
        Minus => arithmetic(operator, left, right, i64::checked_sub, |a, b| a - b),
        Star => arithmetic(operator, left, right, i64::checked_mul, |a, b| a * b),
        Slash => {
            let divisor = number(operator, &right)?;
            if divisor == 0.0 {
                return Err(error_at(operator, RuntimeErrorKind::DivisionByZero).into());
            }
            Ok(Value::Number(number(operator, &left)? / divisor))
        }
        Range => {
            let from = integer(operator, &left)?;
            let to = integer(operator, &right)?;
            // An inverted range is empty, not an error.
            let members: Vec<Value> = (from..=to).map(Value::Int).collect();
            Ok(Value::Array(Rc::new(members)))
        }
        _ => unreachable!("parser produced bad binary operator"),
    }
}

// `+` is overloaded: numeric addition, string concatenation when either
// side is a string, and array concatenation.
fn add(operator: &Token, left: Value, right: Value) -> EResult<Value> {
    match (left.unboxed(), right.unboxed()) {
        (Value::Int(a), Value::Int(b)) => match a.checked_add(*b) {
            Some(sum) => Ok(Value::Int(sum)),
            None => Err(error_at(operator, RuntimeErrorKind::IntegerOverflow).into()),
        },
        (Value::Int(_), Value::Number(_))
        | (Value::Number(_), Value::Int(_))
        | (Value::Number(_), Value::Number(_)) => Ok(Value::Number(
            number(operator, &left)? + number(operator, &right)?,
        )),
        (Value::Str(_), _) | (_, Value::Str(_)) => {
            Ok(Value::Str(Rc::from(format!("{}{}", left, right))))
        }
        (Value::Array(a), Value::Array(b)) => {
            let mut members = a.as_ref().clone();
            members.extend(b.iter().cloned());
            Ok(Value::Array(Rc::new(members)))
        }
        (a, b) => Err(error_at(
            operator,
            RuntimeErrorKind::MismatchedTypes(a.clone(), b.clone()),
        )
        .into()),
    }
}

// Integer-preserving arithmetic: Int op Int stays Int, any float operand
// promotes the result.  Integer overflow is a runtime error.
fn arithmetic(
    operator: &Token,
    left: Value,
    right: Value,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> EResult<Value> {
    match (left.unboxed(), right.unboxed()) {
        (Value::Int(a), Value::Int(b)) => match int_op(*a, *b) {
            Some(n) => Ok(Value::Int(n)),
            None => Err(error_at(operator, RuntimeErrorKind::IntegerOverflow).into()),
        },
        _ => Ok(Value::Number(float_op(
            number(operator, &left)?,
            number(operator, &right)?,
        ))),
    }
}

fn subscript(left: &Value, index: i64, bracket: &Token) -> EResult<Value> {
    match left.unboxed() {
        Value::Array(members) => {
            let i = checked_index(bracket, index, members.len())?;
            Ok(members[i].clone())
        }
        Value::Str(s) => {
            let i = checked_index(bracket, index, s.chars().count())?;
            let c = s.chars().nth(i).unwrap_or_default();
            Ok(Value::Str(Rc::from(c.to_string())))
        }
        other => Err(error_at(bracket, RuntimeErrorKind::NotIndexable(other.clone())).into()),
    }
}

// Slices are half-open; an end of -1 means "to the end".
fn slice(left: &Value, start: i64, end: i64, bracket: &Token, close: &Token) -> EResult<Value> {
    match left.unboxed() {
        Value::Array(members) => {
            let (start, end) = checked_range(close, start, end, members.len())?;
            Ok(Value::Array(Rc::new(members[start..end].to_vec())))
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let (start, end) = checked_range(close, start, end, chars.len())?;
            let sliced: String = chars[start..end].iter().collect();
            Ok(Value::Str(Rc::from(sliced)))
        }
        other => Err(error_at(bracket, RuntimeErrorKind::NotIndexable(other.clone())).into()),
    }
}

fn receiver_array(receiver: &Value, paren: &Token) -> Result<Rc<Vec<Value>>, Unwind> {
    match receiver.unboxed() {
        Value::Array(members) => Ok(members.clone()),
        other => Err(error_at(paren, RuntimeErrorKind::NotIndexable(other.clone())).into()),
    }
}

fn checked_index(token: &Token, index: i64, len: usize) -> Result<usize, Unwind> {
    if index < 0 || index as usize >= len {
        return Err(error_at(token, RuntimeErrorKind::IndexOutOfBounds { index, len }).into());
    }
    Ok(index as usize)
}

fn checked_range(
    token: &Token,
    start: i64,
    end: i64,
    len: usize,
) -> Result<(usize, usize), Unwind> {
    let end = if end == -1 { len as i64 } else { end };
    if start < 0 || end < start || end as usize > len {
        return Err(error_at(token, RuntimeErrorKind::InvalidSliceRange).into());
    }
    Ok((start as usize, end as usize))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::TestReporter;
    use crate::parser::Parser;
    use crate::scanner::Scanner;
    use pretty_assertions::assert_eq;

    fn eval_last(input: &str) -> Result<Value, RuntimeError> {
        let mut reporter = TestReporter::new();
        let tokens = Scanner::new("test", input, &mut reporter).scan_tokens();
        let statements = Parser::new(tokens, &mut reporter).parse();
        assert!(
            reporter.diagnostics.is_empty(),
            "unexpected diagnostics: {:?}",
            reporter.diagnostics
        );

        let mut output = vec![];
        let mut evaluator = Evaluator::new(&mut output);
        let env = evaluator.globals.clone();
        let mut value = Value::Nil;
        for statement in &statements {
            value = evaluator.execute(statement, &env).map_err(|u| match u {
                Unwind::Error(e) => e,
                Unwind::Break(t) => error_at(&t, RuntimeErrorKind::BreakOutsideLoop),
                Unwind::Continue(t) => error_at(&t, RuntimeErrorKind::ContinueOutsideLoop),
                Unwind::Return(t, _) => error_at(&t, RuntimeErrorKind::ReturnOutsideFunction),
            })?;
        }
        Ok(value)
    }

    fn eval_ok(input: &str) -> Value {
        match eval_last(input) {
            Ok(value) => value,
            Err(e) => panic!("unexpected runtime error: {}", e.kind),
        }
    }

    fn eval_err(input: &str) -> RuntimeError {
        match eval_last(input) {
            Ok(value) => panic!("expected runtime error, got {}", value),
            Err(e) => e,
        }
    }

    fn str_value(s: &str) -> Value {
        Value::Str(Rc::from(s))
    }

    fn int_array(ns: &[i64]) -> Value {
        Value::Array(Rc::new(ns.iter().copied().map(Value::Int).collect()))
    }

    #[test]
    fn integer_arithmetic_stays_integral() {
        assert_eq!(eval_ok("1 + 2 * 3"), Value::Int(7));
        assert_eq!(eval_ok("10 - 4"), Value::Int(6));
    }

    #[test]
    fn float_operand_promotes() {
        assert_eq!(eval_ok("1 + 2.5"), Value::Number(3.5));
        assert_eq!(eval_ok("2 * 1.5"), Value::Number(3.0));
    }

    #[test]
    fn division_is_always_floating_point() {
        assert_eq!(eval_ok("7 / 2"), Value::Number(3.5));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        let error = eval_err("1 / 0");
        assert!(matches!(error.kind, RuntimeErrorKind::DivisionByZero));
        assert_eq!(error.token.lexeme, "/");
    }

    #[test]
    fn string_concatenation_accepts_any_operand() {
        assert_eq!(eval_ok("\"a\" + 1"), str_value("a1"));
        assert_eq!(eval_ok("1 + \"a\""), str_value("1a"));
        assert_eq!(eval_ok("\"a\" + nil"), str_value("anil"));
    }

    #[test]
    fn array_concatenation() {
        assert_eq!(eval_ok("[1] + [2, 3]"), int_array(&[1, 2, 3]));
    }

    #[test]
    fn integer_overflow_is_an_error() {
        let error = eval_err("9223372036854775807 + 1");
        assert!(matches!(error.kind, RuntimeErrorKind::IntegerOverflow));
        assert_eq!(error.token.lexeme, "+");
        assert!(matches!(
            eval_err("0 - 9223372036854775807 - 2").kind,
            RuntimeErrorKind::IntegerOverflow
        ));
        assert!(matches!(
            eval_err("9223372036854775807 * 2").kind,
            RuntimeErrorKind::IntegerOverflow
        ));
        assert!(matches!(
            eval_err("-(0 - 9223372036854775807 - 1)").kind,
            RuntimeErrorKind::IntegerOverflow
        ));
    }

    #[test]
    fn adding_bool_and_number_is_mismatched_types() {
        let error = eval_err("true + 1");
        assert!(matches!(error.kind, RuntimeErrorKind::MismatchedTypes(..)));
    }

    #[test]
    fn comparisons_coerce_numerics() {
        assert_eq!(eval_ok("1 < 1.5"), Value::Bool(true));
        assert_eq!(eval_ok("2 >= 2"), Value::Bool(true));
    }

    #[test]
    fn equality_is_cross_numeric() {
        assert_eq!(eval_ok("1 == 1.0"), Value::Bool(true));
        assert_eq!(eval_ok("1 != 2"), Value::Bool(true));
    }

    #[test]
    fn negation_and_not() {
        assert_eq!(eval_ok("-3"), Value::Int(-3));
        assert_eq!(eval_ok("!nil"), Value::Bool(true));
        assert_eq!(eval_ok("!0"), Value::Bool(false));
    }

    #[test]
    fn range_is_inclusive() {
        assert_eq!(eval_ok("1..4"), int_array(&[1, 2, 3, 4]));
    }

    #[test]
    fn inverted_range_is_empty() {
        assert_eq!(eval_ok("4..1"), int_array(&[]));
    }

    #[test]
    fn variables_define_and_assign() {
        assert_eq!(eval_ok("var a = 1; a = a + 1; a"), Value::Int(2));
    }

    #[test]
    fn assigning_undefined_variable_fails() {
        let error = eval_err("ghost = 1");
        assert!(matches!(
            error.kind,
            RuntimeErrorKind::UndefinedVariable(ref name) if name == "ghost"
        ));
    }

    #[test]
    fn block_yields_last_statement_value() {
        assert_eq!(eval_ok("var a = { 1; 2 }; a"), Value::Int(2));
    }

    #[test]
    fn elvis_falls_back_on_nil_only() {
        assert_eq!(eval_ok("nil ?: 2"), Value::Int(2));
        assert_eq!(eval_ok("false ?: 2"), Value::Bool(false));
        assert_eq!(eval_ok("1 ?: 2"), Value::Int(1));
    }

    #[test]
    fn elvis_does_not_evaluate_fallback_eagerly() {
        // The undefined variable on the right would fail if evaluated.
        assert_eq!(eval_ok("1 ?: ghost"), Value::Int(1));
    }

    #[test]
    fn function_call_and_return() {
        assert_eq!(
            eval_ok("fun add(a, b) { return a + b }\nadd(1, 2)"),
            Value::Int(3)
        );
    }

    #[test]
    fn function_body_value_is_implicit_return() {
        assert_eq!(eval_ok("fun two() { 2 }\ntwo()"), Value::Int(2));
    }

    #[test]
    fn arity_is_checked() {
        let error = eval_err("fun f(a) { a }\nf(1, 2)");
        assert!(matches!(
            error.kind,
            RuntimeErrorKind::ArityMismatch {
                expected: 1,
                got: 2
            }
        ));
    }

    #[test]
    fn closures_capture_their_defining_environment() {
        let input = "\
var a = 1
fun get() { a }
a = 2
get()";
        assert_eq!(eval_ok(input), Value::Int(2));
    }

    #[test]
    fn for_iterates_array_elements() {
        let input = "\
var total = 0
for (n in [1, 2, 3]) { total = total + n }
total";
        assert_eq!(eval_ok(input), Value::Int(6));
    }

    #[test]
    fn break_stops_and_continue_skips() {
        let input = "\
var total = 0
for (n in 1..10) {
    when { n == 3 -> { continue } }
    when { n == 5 -> { break } }
    total = total + n
}
total";
        assert_eq!(eval_ok(input), Value::Int(1 + 2 + 4));
    }

    #[test]
    fn break_at_top_level_is_an_error() {
        let error = eval_err("break");
        assert!(matches!(error.kind, RuntimeErrorKind::BreakOutsideLoop));
    }

    #[test]
    fn return_outside_function_is_an_error() {
        let error = eval_err("return 1");
        assert!(matches!(
            error.kind,
            RuntimeErrorKind::ReturnOutsideFunction
        ));
    }

    #[test]
    fn for_requires_an_array() {
        let error = eval_err("for (x in 5) { x }");
        assert!(matches!(error.kind, RuntimeErrorKind::NotIterable(_)));
    }

    #[test]
    fn subscription_and_bounds() {
        assert_eq!(eval_ok("[10, 20, 30][1]"), Value::Int(20));
        let error = eval_err("[10][3]");
        assert!(matches!(
            error.kind,
            RuntimeErrorKind::IndexOutOfBounds { index: 3, len: 1 }
        ));
    }

    #[test]
    fn string_subscription_yields_one_character() {
        assert_eq!(eval_ok("\"abc\"[1]"), str_value("b"));
    }

    #[test]
    fn slices_are_half_open() {
        assert_eq!(eval_ok("[10, 20, 30, 40][1:3]"), int_array(&[20, 30]));
        assert_eq!(eval_ok("[10, 20, 30, 40][:2]"), int_array(&[10, 20]));
        assert_eq!(eval_ok("[10, 20, 30, 40][2:]"), int_array(&[30, 40]));
        assert_eq!(eval_ok("\"hello\"[1:3]"), str_value("el"));
    }

    #[test]
    fn backwards_slice_is_an_error() {
        let error = eval_err("[1, 2, 3][2:1]");
        assert!(matches!(error.kind, RuntimeErrorKind::InvalidSliceRange));
    }

    #[test]
    fn indexing_a_number_fails() {
        let error = eval_err("5[0]");
        assert!(matches!(error.kind, RuntimeErrorKind::NotIndexable(_)));
    }

    #[test]
    fn array_members_and_methods() {
        assert_eq!(eval_ok("[1, 2, 3].length"), Value::Int(3));
        assert_eq!(
            eval_ok("[1, 2, 3].map(fun(x) { x * 2 })"),
            int_array(&[2, 4, 6])
        );
        assert_eq!(
            eval_ok("(1..6).filter(fun(x) { x > 3 })"),
            int_array(&[4, 5, 6])
        );
        assert_eq!(
            eval_ok("[1, 2, 3].fold(fun(acc, x) { acc + x }, 10)"),
            Value::Int(16)
        );
        assert_eq!(
            eval_ok("[1, 2, 3].scan(fun(acc, x) { acc + x }, 0)"),
            int_array(&[1, 3, 6])
        );
    }

    #[test]
    fn filter_keeps_only_literal_true_results() {
        assert_eq!(eval_ok("[1, 2].filter(fun(x) { 1 })"), int_array(&[]));
        assert_eq!(eval_ok("[1, 2].filter(fun(x) { x == 2 })"), int_array(&[2]));
    }

    #[test]
    fn string_split_and_length() {
        assert_eq!(eval_ok("\"a,b\".split(\",\").length"), Value::Int(2));
        assert_eq!(eval_ok("\"héllo\".length"), Value::Int(5));
    }

    #[test]
    fn let_applies_a_function_to_its_receiver() {
        assert_eq!(eval_ok("3.let(fun(x) { x + 1 })"), Value::Int(4));
    }

    #[test]
    fn unknown_member_is_nil() {
        assert_eq!(eval_ok("[1].whatever"), Value::Nil);
    }

    #[test]
    fn member_access_on_nil_fails() {
        let error = eval_err("nil.length");
        assert!(matches!(error.kind, RuntimeErrorKind::NullAccess(_)));
        assert_eq!(error.token.lexeme, "length");
    }

    #[test]
    fn safe_navigation_swallows_nil() {
        assert_eq!(eval_ok("nil?.length ?: -1"), Value::Int(-1));
        assert_eq!(eval_ok("\"ab\"?.length"), Value::Int(2));
    }

    #[test]
    fn safe_navigation_swallows_chained_calls() {
        assert_eq!(eval_ok("nil?.split(\",\") ?: -1"), Value::Int(-1));
    }

    #[test]
    fn maybe_defers_later_member_access() {
        assert_eq!(eval_ok("nil?.foo.bar ?: -1"), Value::Int(-1));
        assert_eq!(eval_ok("nil?.foo?.bar ?: -1"), Value::Int(-1));
        assert_eq!(eval_ok("nil?.foo.bar.baz ?: -1"), Value::Int(-1));
    }

    #[test]
    fn trailing_block_binds_it() {
        assert_eq!(eval_ok("[1, 2, 3].map { it * it }"), int_array(&[1, 4, 9]));
    }

    #[test]
    fn when_expression_matches_subject_by_equality() {
        let input = "\
var x = 2
when(x) {
    1 -> \"one\"
    2 -> \"two\"
    else -> \"many\"
}";
        assert_eq!(eval_ok(input), str_value("two"));
    }

    #[test]
    fn when_guard_arm_matches_on_literal_true() {
        let input = "\
var x = 7
when(x) {
    x > 5 -> \"big\"
    else -> \"small\"
}";
        assert_eq!(eval_ok(input), str_value("big"));
    }

    #[test]
    fn when_without_subject_uses_guards() {
        assert_eq!(
            eval_ok("when { 1 > 2 -> \"a\"\n2 > 1 -> \"b\" }"),
            str_value("b")
        );
    }

    #[test]
    fn non_exhaustive_when_expression_fails() {
        let error = eval_err("var x = when(3) { 1 -> \"one\" }");
        assert!(matches!(error.kind, RuntimeErrorKind::NonExhaustiveWhen));
    }

    #[test]
    fn non_matching_when_statement_is_a_no_op() {
        assert_eq!(eval_ok("when(3) { 1 -> \"one\" }\n42"), Value::Int(42));
    }

    #[test]
    fn print_writes_to_the_output_sink() {
        let input = "print(\"x = \" + 1)";
        let mut reporter = TestReporter::new();
        let tokens = Scanner::new("test", input, &mut reporter).scan_tokens();
        let statements = Parser::new(tokens, &mut reporter).parse();

        let mut output = vec![];
        let mut evaluator = Evaluator::new(&mut output);
        evaluator.interpret(&statements).unwrap();
        assert_eq!(String::from_utf8(output).unwrap(), "x = 1\n");
    }

    #[test]
    fn calling_a_number_fails() {
        let error = eval_err("5(1)");
        assert!(matches!(error.kind, RuntimeErrorKind::NotCallable(_)));
    }

    #[test]
    fn recursion_works() {
        let input = "\
fun fib(n) {
    when {
        n < 2 -> { return n }
    }
    return fib(n - 1) + fib(n - 2)
}
fib(10)";
        assert_eq!(eval_ok(input), Value::Int(55));
    }
}
