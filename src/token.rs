#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
}

impl Span {
    /// Span running from the start of `self` to the end of `other`.
    pub fn to(self, other: Span) -> Span {
        Span {
            start: self.start,
            end: other.end.max(self.start),
            line: self.line,
            column: self.column,
        }
    }

    /// Zero-width span at the start of `self`.
    pub fn start_point(self) -> Span {
        Span {
            end: self.start,
            ..self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Identifier,
    Integer,
    String,

    // Keywords
    Var,
    Function,
    If,
    Else,
    For,
    In,
    Print,
    Return,
    True,
    False,
    Null,
    Not, // `not` or `!`

    // Operators
    Plus,         // +
    Minus,        // -
    Star,         // *
    Slash,        // /
    Equal,        // =
    EqualEqual,   // ==
    BangEqual,    // !=
    Less,         // <
    LessEqual,    // <=
    Greater,      // >
    GreaterEqual, // >=

    // Delimiters
    Colon,    // :
    Comma,    // ,
    LParen,   // (
    RParen,   // )
    LBracket, // [
    RBracket, // ]
    LBrace,   // {
    RBrace,   // }

    // Structural
    Error,
    EOF,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    pub span: Span,
}

impl<'a> Token<'a> {
    pub fn new(kind: TokenKind, text: &'a str, span: Span) -> Self {
        Self { kind, text, span }
    }
}

/// Rewindable cursor over a lexed token sequence.
///
/// The sequence always ends with a single `EOF` token; consuming at the end
/// keeps returning it without moving the cursor.
#[derive(Debug, Clone)]
pub struct TokenList<'a> {
    tokens: Vec<Token<'a>>,
    position: usize,
}

impl<'a> TokenList<'a> {
    pub fn new(mut tokens: Vec<Token<'a>>) -> Self {
        if !matches!(tokens.last(), Some(token) if token.kind == TokenKind::EOF) {
            let end = tokens.last().map(|token| token.span.end).unwrap_or(0);
            tokens.push(Token::new(
                TokenKind::EOF,
                "",
                Span {
                    start: end,
                    end,
                    ..Span::default()
                },
            ));
        }
        Self {
            tokens,
            position: 0,
        }
    }

    pub fn current_token(&self) -> Token<'a> {
        self.tokens[self.position]
    }

    pub fn consume_token(&mut self) -> Token<'a> {
        let token = self.current_token();
        if self.position + 1 < self.tokens.len() {
            self.position += 1;
        }
        token
    }

    pub fn matches(&self, kinds: &[TokenKind]) -> bool {
        kinds.contains(&self.current_token().kind)
    }

    pub fn match_and_consume(&mut self, kind: TokenKind) -> bool {
        if self.current_token().kind == kind {
            self.consume_token();
            true
        } else {
            false
        }
    }

    pub fn has_more_tokens(&self) -> bool {
        self.current_token().kind != TokenKind::EOF
    }

    pub fn reset(&mut self) {
        self.position = 0;
    }

    /// Most recently consumed token, or the current one if nothing was consumed.
    pub fn last_token(&self) -> Token<'a> {
        self.tokens[self.position.saturating_sub(1)]
    }

    pub fn kinds(&self) -> impl Iterator<Item = TokenKind> + '_ {
        self.tokens.iter().map(|token| token.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(kind: TokenKind, text: &str, start: usize) -> Token<'_> {
        Token::new(
            kind,
            text,
            Span {
                start,
                end: start + text.len(),
                line: 1,
                column: start,
            },
        )
    }

    #[test]
    fn appends_eof_and_stays_on_it() {
        let mut tokens = TokenList::new(vec![token(TokenKind::Integer, "1", 0)]);
        assert!(tokens.has_more_tokens());
        assert_eq!(tokens.consume_token().kind, TokenKind::Integer);
        assert!(!tokens.has_more_tokens());
        assert_eq!(tokens.consume_token().kind, TokenKind::EOF);
        assert_eq!(tokens.current_token().kind, TokenKind::EOF);
    }

    #[test]
    fn reset_rewinds_to_first_token() {
        let mut tokens = TokenList::new(vec![
            token(TokenKind::Identifier, "x", 0),
            token(TokenKind::Equal, "=", 2),
        ]);
        assert!(tokens.match_and_consume(TokenKind::Identifier));
        assert!(!tokens.match_and_consume(TokenKind::Identifier));
        assert!(tokens.matches(&[TokenKind::Plus, TokenKind::Equal]));
        assert_eq!(tokens.last_token().text, "x");

        tokens.reset();
        assert_eq!(tokens.current_token().text, "x");
        assert_eq!(tokens.last_token().text, "x");
    }
}
