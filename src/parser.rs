//! Recursive-descent parser.
//!
//! Consumes the full token sequence and produces a best-effort statement
//! list: statements that fail to parse are reported through the error
//! reporter, the parser synchronizes to the next statement boundary, and
//! parsing continues.  A single malformed statement therefore never takes
//! the rest of the program down with it.

use std::fmt;

use crate::ast::{Expr, Lit, Stmt, WhenCase};
use crate::diag::ErrorReporter;
use crate::token::{Token, TokenKind};

/// Marker for an aborted parse; the diagnostic has already been reported.
pub(crate) struct ParseInterrupt;

type PResult<T> = Result<T, ParseInterrupt>;

pub struct Parser<'r> {
    tokens: Vec<Token>,
    current: usize,
    reporter: &'r mut dyn ErrorReporter,
}

impl fmt::Debug for Parser<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parser")
            .field("current", &self.current)
            .field("tokens", &self.tokens.len())
            .finish()
    }
}

impl<'r> Parser<'r> {
    pub fn new(tokens: Vec<Token>, reporter: &'r mut dyn ErrorReporter) -> Parser<'r> {
        Parser {
            tokens,
            current: 0,
            reporter,
        }
    }

    // program → declaration* EOF
    pub fn parse(mut self) -> Vec<Stmt> {
        let mut statements = vec![];
        loop {
            self.skip_terminators();
            if self.is_at_end() {
                break;
            }
            if let Some(stmt) = self.declaration() {
                statements.push(stmt);
            }
        }
        statements
    }

    // declaration → varDecl | forStmt | funDecl | returnStmt | breakStmt
    //             | continueStmt | whenStmt | statement
    fn declaration(&mut self) -> Option<Stmt> {
        match self.declaration_inner() {
            Ok(stmt) => Some(stmt),
            Err(ParseInterrupt) => {
                self.synchronize();
                None
            }
        }
    }

    fn declaration_inner(&mut self) -> PResult<Stmt> {
        let stmt = match self.peek().kind {
            TokenKind::Var => {
                self.advance();
                self.var_declaration()?
            }
            TokenKind::For => {
                self.advance();
                self.for_statement()?
            }
            // `fun` followed by a name declares a function; a bare `fun`
            // starts a function literal expression.
            TokenKind::Fun if self.peek_next().kind == TokenKind::Identifier => {
                self.advance();
                self.function_declaration()?
            }
            TokenKind::Return => {
                self.advance();
                self.return_statement()?
            }
            TokenKind::Break => {
                self.advance();
                Stmt::Break(self.previous().clone())
            }
            TokenKind::Continue => {
                self.advance();
                Stmt::Continue(self.previous().clone())
            }
            TokenKind::When => {
                self.advance();
                Stmt::When(self.when_expression()?)
            }
            _ => Stmt::Expression(self.expression()?),
        };
        self.skip_terminators();
        Ok(stmt)
    }

    fn var_declaration(&mut self) -> PResult<Stmt> {
        let name = self.consume(TokenKind::Identifier, "Expected variable name")?;
        let initializer = if self.match_kind(TokenKind::Equal) {
            Some(self.expression()?)
        } else {
            None
        };
        Ok(Stmt::Var(name, initializer))
    }

    // forStmt → "for" "(" "var"? IDENTIFIER "in" expression ")" block
    fn for_statement(&mut self) -> PResult<Stmt> {
        self.consume(TokenKind::LeftParen, "Expected '(' after 'for'")?;
        self.match_kind(TokenKind::Var);
        let variable = self.consume(TokenKind::Identifier, "Expected loop variable name")?;
        self.consume(TokenKind::In, "Expected 'in' after loop variable")?;
        let iterable = self.expression()?;
        self.consume(TokenKind::RightParen, "Expected ')' after loop iterable")?;
        self.consume(TokenKind::LeftBrace, "Expected '{' before loop body")?;
        let body = self.block()?;
        Ok(Stmt::For {
            variable,
            iterable,
            body,
        })
    }

    fn function_declaration(&mut self) -> PResult<Stmt> {
        let name = self.consume(TokenKind::Identifier, "Expected function name")?;
        let params = self.parameter_list()?;
        self.consume(TokenKind::LeftBrace, "Expected '{' before function body")?;
        let body = self.block()?;
        Ok(Stmt::Function { name, params, body })
    }

    fn parameter_list(&mut self) -> PResult<Vec<Token>> {
        self.consume(TokenKind::LeftParen, "Expected '(' before parameters")?;
        let mut params = vec![];
        if !self.check(TokenKind::RightParen) {
            loop {
                params.push(self.consume(TokenKind::Identifier, "Expected parameter name")?);
                if !self.match_kind(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expected ')' after parameters")?;
        Ok(params)
    }

    fn return_statement(&mut self) -> PResult<Stmt> {
        let keyword = self.previous().clone();
        let value = if self.peek().kind.is_terminator()
            || self.check(TokenKind::RightBrace)
            || self.is_at_end()
        {
            None
        } else {
            Some(self.expression()?)
        };
        Ok(Stmt::Return(keyword, value))
    }

    // expression → block | assignment
    fn expression(&mut self) -> PResult<Expr> {
        if self.match_kind(TokenKind::LeftBrace) {
            return self.block();
        }
        self.assignment()
    }

    // The opening brace has already been consumed.
    fn block(&mut self) -> PResult<Expr> {
        let mut statements = vec![];
        loop {
            self.skip_terminators();
            if self.check(TokenKind::RightBrace) || self.is_at_end() {
                break;
            }
            if let Some(stmt) = self.declaration() {
                statements.push(stmt);
            }
        }
        self.consume(TokenKind::RightBrace, "Expected '}' after block")?;
        Ok(Expr::Block(statements))
    }

    // assignment → subscription "=" assignment | elvis
    //
    // Only a bare variable is a valid assignment target.  Anything else is
    // reported but parsing continues with the right-hand value standing in
    // for the whole expression, so one bad target does not abort the
    // statement.
    fn assignment(&mut self) -> PResult<Expr> {
        let expr = self.elvis()?;
        if self.match_kind(TokenKind::Equal) {
            let equals = self.previous().clone();
            let value = self.assignment()?;
            return Ok(match expr {
                Expr::Variable(name) => Expr::Assign(name, Box::new(value)),
                _ => {
                    self.reporter.error(
                        equals.offset,
                        equals.length(),
                        &equals.location,
                        "Invalid assignment target",
                    );
                    value
                }
            });
        }
        Ok(expr)
    }

    // elvis → equality ( "?:" equality )*
    fn elvis(&mut self) -> PResult<Expr> {
        self.binary_zero_or_more(Self::equality, &[TokenKind::Elvis])
    }

    // equality → comparison ( ( "!=" | "==" ) comparison )*
    fn equality(&mut self) -> PResult<Expr> {
        self.binary_zero_or_more(
            Self::comparison,
            &[TokenKind::BangEqual, TokenKind::EqualEqual],
        )
    }

    // comparison → range ( ( ">" | ">=" | "<" | "<=" ) range )*
    fn comparison(&mut self) -> PResult<Expr> {
        self.binary_zero_or_more(
            Self::range,
            &[
                TokenKind::Less,
                TokenKind::LessEqual,
                TokenKind::Greater,
                TokenKind::GreaterEqual,
            ],
        )
    }

    // range → term ( ".." term )*
    fn range(&mut self) -> PResult<Expr> {
        self.binary_zero_or_more(Self::term, &[TokenKind::Range])
    }

    // term → factor ( ( "-" | "+" ) factor )*
    fn term(&mut self) -> PResult<Expr> {
        self.binary_zero_or_more(Self::factor, &[TokenKind::Minus, TokenKind::Plus])
    }

    // factor → unary ( ( "/" | "*" ) unary )*
    fn factor(&mut self) -> PResult<Expr> {
        self.binary_zero_or_more(Self::unary, &[TokenKind::Slash, TokenKind::Star])
    }

    fn binary_zero_or_more(
        &mut self,
        next: fn(&mut Self) -> PResult<Expr>,
        kinds: &[TokenKind],
    ) -> PResult<Expr> {
        let mut expr = next(self)?;
        while self.match_kinds(kinds) {
            let operator = self.previous().clone();
            let right = next(self)?;
            expr = Expr::Binary(Box::new(expr), operator, Box::new(right));
        }
        Ok(expr)
    }

    // unary → ( "!" | "-" ) unary | call
    fn unary(&mut self) -> PResult<Expr> {
        if self.match_kinds(&[TokenKind::Bang, TokenKind::Minus]) {
            let operator = self.previous().clone();
            let right = self.unary()?;
            return Ok(Expr::Unary(operator, Box::new(right)));
        }
        self.call()
    }

    // call → primary ( "(" arguments? ")" | "{" block "}" | "." IDENTIFIER
    //       | "?." IDENTIFIER | "[" index-or-slice "]" )*
    //
    // All postfix forms share one loop so calls, member accesses and
    // subscriptions chain freely.  A bare trailing block is sugar for
    // calling with a single one-parameter function literal whose parameter
    // is named `it`.
    fn call(&mut self) -> PResult<Expr> {
        let mut expr = self.primary()?;
        loop {
            if self.match_kind(TokenKind::LeftParen) {
                expr = self.finish_call(expr)?;
            } else if self.match_kind(TokenKind::LeftBrace) {
                let brace = self.previous().clone();
                let body = self.block()?;
                let param = Token::new(
                    TokenKind::Identifier,
                    "it",
                    brace.offset,
                    brace.location.clone(),
                );
                let lambda = Expr::Function {
                    params: vec![param],
                    body: Box::new(body),
                };
                expr = Expr::Call {
                    callee: Box::new(expr),
                    paren: brace,
                    arguments: vec![lambda],
                };
            } else if self.match_kind(TokenKind::Dot) {
                let name = self.consume(TokenKind::Identifier, "Expected member name after '.'")?;
                expr = Expr::Get {
                    object: Box::new(expr),
                    name,
                    safe: false,
                };
            } else if self.match_kind(TokenKind::SafeNavigation) {
                let name =
                    self.consume(TokenKind::Identifier, "Expected member name after '?.'")?;
                expr = Expr::Get {
                    object: Box::new(expr),
                    name,
                    safe: true,
                };
            } else if self.match_kind(TokenKind::LeftBracket) {
                let bracket = self.previous().clone();
                expr = self.finish_subscription(expr, bracket)?;
            } else {
                break;
            }
        }
        Ok(expr)
    }

    // The opening bracket has been consumed.  Three slice forms are
    // distinguished by the position of the colon: `[:e]` slices from the
    // start, `[s:]` to the end (a -1 sentinel) and `[s:e]` in between.
    // Without a colon it is a plain subscription.
    fn finish_subscription(&mut self, left: Expr, bracket: Token) -> PResult<Expr> {
        if self.match_kind(TokenKind::Colon) {
            let end = self.expression()?;
            let close = self.consume(TokenKind::RightBracket, "Expected ']' after slice")?;
            return Ok(Expr::Slice {
                left: Box::new(left),
                bracket,
                start: Box::new(Expr::Literal(Lit::Int(0))),
                end: Box::new(end),
                close,
            });
        }

        let start = self.expression()?;
        if self.match_kind(TokenKind::Colon) {
            let end = if self.check(TokenKind::RightBracket) {
                Expr::Literal(Lit::Int(-1))
            } else {
                self.expression()?
            };
            let close = self.consume(TokenKind::RightBracket, "Expected ']' after slice")?;
            Ok(Expr::Slice {
                left: Box::new(left),
                bracket,
                start: Box::new(start),
                end: Box::new(end),
                close,
            })
        } else {
            self.consume(TokenKind::RightBracket, "Expected ']' after index")?;
            Ok(Expr::Subscription {
                left: Box::new(left),
                bracket,
                index: Box::new(start),
            })
        }
    }

    fn finish_call(&mut self, callee: Expr) -> PResult<Expr> {
        let mut arguments = vec![];
        if !self.check(TokenKind::RightParen) {
            loop {
                arguments.push(self.expression()?);
                if !self.match_kind(TokenKind::Comma) {
                    break;
                }
            }
        }
        let paren = self.consume(TokenKind::RightParen, "Expected ')' after arguments")?;
        Ok(Expr::Call {
            callee: Box::new(callee),
            paren,
            arguments,
        })
    }

    // primary → NUMBER | STRING | "true" | "false" | "nil" | IDENTIFIER
    //         | "[" list-members? "]" | "(" expression ")"
    //         | whenExpr | "fun" "(" parameters? ")" block
    fn primary(&mut self) -> PResult<Expr> {
        if self.match_kind(TokenKind::False) {
            return Ok(Expr::Literal(Lit::Bool(false)));
        }
        if self.match_kind(TokenKind::True) {
            return Ok(Expr::Literal(Lit::Bool(true)));
        }
        if self.match_kind(TokenKind::Nil) {
            return Ok(Expr::Literal(Lit::Nil));
        }
        if self.match_kind(TokenKind::Str) {
            return Ok(Expr::Literal(Lit::Str(self.previous().lexeme.clone())));
        }
        if self.match_kind(TokenKind::Number) {
            return self.number_literal();
        }
        if self.match_kind(TokenKind::Identifier) {
            return Ok(Expr::Variable(self.previous().clone()));
        }
        if self.match_kind(TokenKind::LeftBracket) {
            return self.list_literal();
        }
        if self.match_kind(TokenKind::LeftParen) {
            let expr = self.expression()?;
            self.consume(TokenKind::RightParen, "Expected ')' after expression")?;
            return Ok(Expr::Grouping(Box::new(expr)));
        }
        if self.match_kind(TokenKind::When) {
            return self.when_expression();
        }
        if self.match_kind(TokenKind::Fun) {
            let params = self.parameter_list()?;
            self.consume(TokenKind::LeftBrace, "Expected '{' before function body")?;
            let body = self.block()?;
            return Ok(Expr::Function {
                params,
                body: Box::new(body),
            });
        }

        Err(self.error(self.peek().clone(), "Expected expression"))
    }

    // The number lexeme is type-tagged here: a decimal point selects the
    // float interpretation, otherwise the literal is an integer.
    fn number_literal(&mut self) -> PResult<Expr> {
        let token = self.previous().clone();
        if token.lexeme.contains('.') {
            match token.lexeme.parse::<f64>() {
                Ok(n) => Ok(Expr::Literal(Lit::Number(n))),
                Err(_) => Err(self.error(token, "Invalid number literal")),
            }
        } else {
            match token.lexeme.parse::<i64>() {
                Ok(n) => Ok(Expr::Literal(Lit::Int(n))),
                Err(_) => Err(self.error(token, "Invalid number literal")),
            }
        }
    }

    fn list_literal(&mut self) -> PResult<Expr> {
        let mut members = vec![];
        while !self.check(TokenKind::RightBracket) && !self.is_at_end() {
            members.push(self.expression()?);
            if !self.match_kind(TokenKind::Comma) {
                break;
            }
        }
        self.consume(TokenKind::RightBracket, "Expected ']' after list members")?;
        Ok(Expr::Literal(Lit::List(members)))
    }

    // whenExpr → "when" ( "(" expression ")" )? "{" whenCase* "}"
    // whenCase → ( "else" | expression ) "->" expression
    //
    // The `when` keyword has already been consumed.
    fn when_expression(&mut self) -> PResult<Expr> {
        let keyword = self.previous().clone();
        let initializer = if self.match_kind(TokenKind::LeftParen) {
            let init = self.expression()?;
            self.consume(TokenKind::RightParen, "Expected ')' after when subject")?;
            Some(Box::new(init))
        } else {
            None
        };

        self.consume(TokenKind::LeftBrace, "Expected '{' before when cases")?;
        let mut cases = vec![];
        let mut else_branch = None;
        loop {
            self.skip_terminators();
            if self.check(TokenKind::RightBrace) || self.is_at_end() {
                break;
            }
            if self.match_kind(TokenKind::Else) {
                self.consume(TokenKind::PointTo, "Expected '->' after 'else'")?;
                else_branch = Some(Box::new(self.expression()?));
                continue;
            }
            let condition = self.expression()?;
            self.consume(TokenKind::PointTo, "Expected '->' after when condition")?;
            let result = self.expression()?;
            cases.push(WhenCase { condition, result });
        }
        self.consume(TokenKind::RightBrace, "Expected '}' after when cases")?;

        Ok(Expr::When {
            keyword,
            initializer,
            cases,
            else_branch,
        })
    }

    /// Discard tokens until a statement boundary so that one syntax error
    /// does not cascade into spurious ones.
    fn synchronize(&mut self) {
        self.advance();
        while !self.is_at_end() {
            if self.previous().kind.is_terminator() {
                return;
            }
            if self.peek().kind.is_synchronizing() {
                return;
            }
            self.advance();
        }
    }

    fn skip_terminators(&mut self) {
        while self.peek().kind.is_terminator() {
            self.advance();
        }
    }

    fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current.min(self.tokens.len() - 1)]
    }

    fn peek_next(&self) -> &Token {
        &self.tokens[(self.current + 1).min(self.tokens.len() - 1)]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current - 1]
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn match_kind(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn match_kinds(&mut self, kinds: &[TokenKind]) -> bool {
        for &kind in kinds {
            if self.check(kind) {
                self.advance();
                return true;
            }
        }
        false
    }

    fn consume(&mut self, expected: TokenKind, message: &str) -> PResult<Token> {
        if self.check(expected) {
            self.advance();
            Ok(self.previous().clone())
        } else {
            Err(self.error(self.peek().clone(), message))
        }
    }

    fn error(&mut self, at: Token, message: &str) -> ParseInterrupt {
        self.reporter
            .error(at.offset, at.length().max(1), &at.location, message);
        ParseInterrupt
    }
}
