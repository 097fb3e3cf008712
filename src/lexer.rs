use std::{iter::Peekable, str::CharIndices};

use log::trace;

use crate::token::{Span, Token, TokenKind, TokenList};

/// Hand-written scanner producing the token stream the parser consumes.
///
/// Lexing never fails: characters that start no token and unterminated string
/// literals become `TokenKind::Error` tokens, which the parser reports as
/// unexpected tokens.
pub struct Lexer<'a> {
    input: &'a str,
    chars: Peekable<CharIndices<'a>>,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
            line: 1,
            column: 0,
        }
    }

    pub fn next_token(&mut self) -> Token<'a> {
        self.skip_trivia();

        let Some(&(start_idx, ch)) = self.chars.peek() else {
            let index = self.input.len();
            return Token::new(
                TokenKind::EOF,
                "",
                Span {
                    start: index,
                    end: index,
                    line: self.line,
                    column: self.column,
                },
            );
        };

        let line = self.line;
        let column = self.column;
        match ch {
            '"' => self.read_string(start_idx, line, column),
            c if c.is_alphabetic() || c == '_' => self.read_identifier(start_idx, line, column),
            c if c.is_ascii_digit() => self.read_integer(start_idx, line, column),
            _ => {
                self.advance_char();
                let kind = match ch {
                    '+' => TokenKind::Plus,
                    '-' => TokenKind::Minus,
                    '*' => TokenKind::Star,
                    '/' => TokenKind::Slash,
                    ':' => TokenKind::Colon,
                    ',' => TokenKind::Comma,
                    '(' => TokenKind::LParen,
                    ')' => TokenKind::RParen,
                    '[' => TokenKind::LBracket,
                    ']' => TokenKind::RBracket,
                    '{' => TokenKind::LBrace,
                    '}' => TokenKind::RBrace,
                    '=' => self.with_equal(TokenKind::EqualEqual, TokenKind::Equal),
                    '!' => self.with_equal(TokenKind::BangEqual, TokenKind::Not),
                    '<' => self.with_equal(TokenKind::LessEqual, TokenKind::Less),
                    '>' => self.with_equal(TokenKind::GreaterEqual, TokenKind::Greater),
                    _ => TokenKind::Error,
                };
                self.token_from(kind, start_idx, line, column)
            }
        }
    }

    fn with_equal(&mut self, with: TokenKind, without: TokenKind) -> TokenKind {
        if matches!(self.chars.peek(), Some(&(_, '='))) {
            self.advance_char();
            with
        } else {
            without
        }
    }

    fn skip_trivia(&mut self) {
        while let Some(&(index, c)) = self.chars.peek() {
            if c.is_whitespace() {
                self.advance_char();
            } else if c == '/' && self.input[index..].starts_with("//") {
                while let Some(&(_, c)) = self.chars.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.advance_char();
                }
            } else {
                break;
            }
        }
    }

    fn read_identifier(&mut self, start: usize, line: usize, column: usize) -> Token<'a> {
        self.advance_char(); // Consume first char
        while let Some(&(_, c)) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' {
                self.advance_char();
            } else {
                break;
            }
        }

        let end = self.current_index();
        let ident = &self.input[start..end];
        let kind = match ident {
            "var" => TokenKind::Var,
            "function" => TokenKind::Function,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "for" => TokenKind::For,
            "in" => TokenKind::In,
            "print" => TokenKind::Print,
            "return" => TokenKind::Return,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "null" => TokenKind::Null,
            "not" => TokenKind::Not,
            _ => TokenKind::Identifier,
        };
        self.token_from(kind, start, line, column)
    }

    fn read_integer(&mut self, start: usize, line: usize, column: usize) -> Token<'a> {
        self.advance_char(); // Consume first digit
        while let Some(&(_, c)) = self.chars.peek() {
            if c.is_ascii_digit() {
                self.advance_char();
            } else {
                break;
            }
        }
        self.token_from(TokenKind::Integer, start, line, column)
    }

    /// String tokens carry the text between the quotes; there are no escapes.
    fn read_string(&mut self, start: usize, line: usize, column: usize) -> Token<'a> {
        self.advance_char(); // Consume opening quote
        while let Some(&(idx, c)) = self.chars.peek() {
            if c == '"' {
                self.advance_char(); // Consume closing quote
                return Token::new(
                    TokenKind::String,
                    &self.input[start + 1..idx],
                    Span {
                        start,
                        end: idx + 1,
                        line,
                        column,
                    },
                );
            }
            if c == '\n' {
                break;
            }
            self.advance_char();
        }
        self.token_from(TokenKind::Error, start, line, column)
    }

    fn token_from(&mut self, kind: TokenKind, start: usize, line: usize, column: usize) -> Token<'a> {
        let end = self.current_index();
        Token::new(
            kind,
            &self.input[start..end],
            Span {
                start,
                end,
                line,
                column,
            },
        )
    }

    fn current_index(&mut self) -> usize {
        match self.chars.peek() {
            Some(&(idx, _)) => idx,
            None => self.input.len(),
        }
    }

    fn advance_char(&mut self) -> Option<char> {
        let (_, ch) = self.chars.next()?;
        if ch == '\n' {
            self.line += 1;
            self.column = 0;
        } else {
            self.column += 1;
        }
        Some(ch)
    }
}

pub fn tokenize(input: &str) -> TokenList<'_> {
    let mut lexer = Lexer::new(input);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token();
        let is_eof = matches!(token.kind, TokenKind::EOF);
        tokens.push(token);
        if is_eof {
            break;
        }
    }
    trace!("lexed {} tokens", tokens.len());
    TokenList::new(tokens)
}
