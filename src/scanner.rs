//! Lexical analyzer.
//!
//! Turns a source string into a sequence of tokens terminated by an EOF
//! token whose offset equals the source length.  Lexical errors are reported
//! through the error reporter and scanning resumes at the next character, so
//! a single bad lexeme never aborts the whole scan.

use std::rc::Rc;

use crate::diag::ErrorReporter;
use crate::token::{Token, TokenKind};

pub struct Scanner<'s, 'r> {
    source: &'s str,
    location: Rc<str>,
    reporter: &'r mut dyn ErrorReporter,
    start: usize,
    current: usize,

    // One-token-kind memory driving the significant-newline heuristic: a
    // newline terminates a statement only after a token that can end one.
    newline_relevant: bool,
}

impl<'s, 'r> Scanner<'s, 'r> {
    pub fn new(
        location: &str,
        source: &'s str,
        reporter: &'r mut dyn ErrorReporter,
    ) -> Scanner<'s, 'r> {
        Scanner {
            source,
            location: Rc::from(location),
            reporter,
            start: 0,
            current: 0,
            newline_relevant: false,
        }
    }

    /// Scan the whole source.  Always produces a trailing EOF token.
    pub fn scan_tokens(mut self) -> Vec<Token> {
        let mut tokens = vec![];
        while self.current < self.source.len() {
            self.start = self.current;
            if let Some(token) = self.scan_next_lexeme() {
                self.newline_relevant = token.kind.ends_statement();
                tokens.push(token);
            }
        }

        tokens.push(Token::new(
            TokenKind::Eof,
            "",
            self.source.len(),
            self.location.clone(),
        ));
        tokens
    }

    // Not all lexemes turn into tokens: whitespace, comments and bad input
    // produce nothing.
    fn scan_next_lexeme(&mut self) -> Option<Token> {
        let c = self.advance();
        match c {
            '(' => Some(self.simple_token(TokenKind::LeftParen)),
            ')' => Some(self.simple_token(TokenKind::RightParen)),
            '{' => Some(self.simple_token(TokenKind::LeftBrace)),
            '}' => Some(self.simple_token(TokenKind::RightBrace)),
            '[' => Some(self.simple_token(TokenKind::LeftBracket)),
            ']' => Some(self.simple_token(TokenKind::RightBracket)),
            ',' => Some(self.simple_token(TokenKind::Comma)),
            '.' => {
                let kind = if self.match_char('.') {
                    TokenKind::Range
                } else {
                    TokenKind::Dot
                };
                Some(self.simple_token(kind))
            }
            '-' => {
                let kind = if self.match_char('>') {
                    TokenKind::PointTo
                } else {
                    TokenKind::Minus
                };
                Some(self.simple_token(kind))
            }
            '+' => Some(self.simple_token(TokenKind::Plus)),
            ':' => Some(self.simple_token(TokenKind::Colon)),
            ';' => Some(self.simple_token(TokenKind::Semicolon)),
            '*' => Some(self.simple_token(TokenKind::Star)),
            '\n' => {
                if self.newline_relevant {
                    Some(Token::new(
                        TokenKind::Newline,
                        "",
                        self.start,
                        self.location.clone(),
                    ))
                } else {
                    None
                }
            }
            '!' => {
                let kind = if self.match_char('=') {
                    TokenKind::BangEqual
                } else {
                    TokenKind::Bang
                };
                Some(self.simple_token(kind))
            }
            '=' => {
                let kind = if self.match_char('=') {
                    TokenKind::EqualEqual
                } else {
                    TokenKind::Equal
                };
                Some(self.simple_token(kind))
            }
            '<' => {
                let kind = if self.match_char('=') {
                    TokenKind::LessEqual
                } else {
                    TokenKind::Less
                };
                Some(self.simple_token(kind))
            }
            '>' => {
                let kind = if self.match_char('=') {
                    TokenKind::GreaterEqual
                } else {
                    TokenKind::Greater
                };
                Some(self.simple_token(kind))
            }
            '?' => {
                if self.match_char(':') {
                    Some(self.simple_token(TokenKind::Elvis))
                } else if self.match_char('.') {
                    Some(self.simple_token(TokenKind::SafeNavigation))
                } else {
                    self.error_at(self.start, &format!("Invalid character {}", c));
                    None
                }
            }
            '/' => {
                if self.peek(0) == Some('/') {
                    self.scan_line_comment();
                    None
                } else if self.peek(0) == Some('*') {
                    self.scan_block_comment();
                    None
                } else {
                    Some(self.simple_token(TokenKind::Slash))
                }
            }
            ' ' | '\r' | '\t' => None,
            '"' => self.scan_string_literal(),
            'a'..='z' | 'A'..='Z' | '_' => Some(self.scan_identifier()),
            '0'..='9' => Some(self.scan_number()),
            _ => {
                self.error_at(self.start, &format!("Invalid character {}", c));
                None
            }
        }
    }

    fn scan_line_comment(&mut self) {
        while let Some(c) = self.peek(0) {
            if c == '\n' {
                break;
            }
            self.advance();
        }
    }

    // Block comments nest.
    fn scan_block_comment(&mut self) {
        let mut level = 1;
        while level > 0 {
            match self.peek(0) {
                Some('*') => {
                    self.advance();
                    if self.match_char('/') {
                        level -= 1;
                    }
                }
                Some('/') => {
                    self.advance();
                    if self.match_char('*') {
                        level += 1;
                    }
                }
                Some(_) => {
                    self.advance();
                }
                None => {
                    self.error_at(self.current, "Unterminated block comment");
                    break;
                }
            }
        }
    }

    // The produced token's lexeme is the unescaped string content; its
    // offset points at the opening quote.
    fn scan_string_literal(&mut self) -> Option<Token> {
        let mut content = String::new();
        loop {
            match self.peek(0) {
                None => {
                    self.error_at(self.current, "Unterminated string literal");
                    return None;
                }
                Some('"') => break,
                Some('\n') => {
                    self.error_at(self.current, "Newline in string literal");
                    return None;
                }
                Some('\\') => {
                    self.advance();
                    match self.peek(0) {
                        Some('n') => content.push('\n'),
                        Some('t') => content.push('\t'),
                        Some('r') => content.push('\r'),
                        Some('"') => content.push('"'),
                        Some('\\') => content.push('\\'),
                        _ => {
                            self.error_at(self.current, "Invalid escape sequence");
                            return None;
                        }
                    }
                    self.advance();
                }
                Some(c) => {
                    content.push(c);
                    self.advance();
                }
            }
        }

        // Closing quote.
        self.advance();
        Some(Token::new(
            TokenKind::Str,
            content,
            self.start,
            self.location.clone(),
        ))
    }

    fn scan_identifier(&mut self) -> Token {
        while let Some(c) = self.peek(0) {
            if c.is_ascii_alphanumeric() || c == '_' {
                self.advance();
            } else {
                break;
            }
        }

        let lexeme = &self.source[self.start..self.current];
        let kind = keyword_kind(lexeme).unwrap_or(TokenKind::Identifier);
        Token::new(kind, lexeme, self.start, self.location.clone())
    }

    fn scan_number(&mut self) -> Token {
        while matches!(self.peek(0), Some('0'..='9')) {
            self.advance();
        }

        // A decimal point only belongs to the number when followed by a
        // digit; otherwise it is left for the next lexeme.
        if self.peek(0) == Some('.') && matches!(self.peek(1), Some('0'..='9')) {
            self.advance();
            while matches!(self.peek(0), Some('0'..='9')) {
                self.advance();
            }
        }

        self.simple_token(TokenKind::Number)
    }

    fn simple_token(&self, kind: TokenKind) -> Token {
        Token::new(
            kind,
            &self.source[self.start..self.current],
            self.start,
            self.location.clone(),
        )
    }

    /// Consume and return the next character.  Callers check for end of
    /// input first.
    fn advance(&mut self) -> char {
        let c = self.source[self.current..]
            .chars()
            .next()
            .expect("advance past end of source");
        self.current += c.len_utf8();
        c
    }

    fn peek(&self, lookahead: usize) -> Option<char> {
        self.source[self.current..].chars().nth(lookahead)
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.peek(0) == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error_at(&mut self, offset: usize, message: &str) {
        self.reporter.error(offset, 1, &self.location, message);
    }
}

fn keyword_kind(lexeme: &str) -> Option<TokenKind> {
    let kind = match lexeme {
        "and" => TokenKind::And,
        "break" => TokenKind::Break,
        "class" => TokenKind::Class,
        "continue" => TokenKind::Continue,
        "else" => TokenKind::Else,
        "false" => TokenKind::False,
        "for" => TokenKind::For,
        "fun" => TokenKind::Fun,
        "if" => TokenKind::If,
        "in" => TokenKind::In,
        "nil" => TokenKind::Nil,
        "or" => TokenKind::Or,
        "return" => TokenKind::Return,
        "super" => TokenKind::Super,
        "this" => TokenKind::This,
        "true" => TokenKind::True,
        "var" => TokenKind::Var,
        "when" | "switch" => TokenKind::When,
        "while" => TokenKind::While,
        _ => return None,
    };
    Some(kind)
}
