//! Token representation.

use crate::Keyword;

/// Kind of a scanned token.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum TokenKind {
    /// Unquoted identifier that is not a recognized keyword.
    Ident,
    /// Double-quoted identifier (quotes included in the token range).
    QuotedIdent,
    /// Recognized keyword.
    Keyword(Keyword),
    /// String literal: single-quoted or dollar-quoted. The literal body
    /// (without delimiters) is available via [`Token::body`].
    StringLit,
    /// Numeric literal.
    Number,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `,`
    Comma,
    /// `;`
    Semicolon,
    /// Any other operator or punctuation run.
    Operator,
}

/// One token: a kind plus byte offsets into the scanned text.
///
/// `start..end` is the full raw token including delimiters.
/// `body_start..body_end` is the delimiter-free payload for string literals
/// and quoted identifiers; for all other kinds it equals the full range.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
    body_start: usize,
    body_end: usize,
}

impl Token {
    pub(crate) fn new(kind: TokenKind, start: usize, end: usize) -> Self {
        Token {
            kind,
            start,
            end,
            body_start: start,
            body_end: end,
        }
    }

    pub(crate) fn with_body(
        kind: TokenKind,
        start: usize,
        end: usize,
        body_start: usize,
        body_end: usize,
    ) -> Self {
        Token {
            kind,
            start,
            end,
            body_start,
            body_end,
        }
    }

    /// Byte range of the delimiter-free token payload.
    pub fn body(&self) -> (usize, usize) {
        (self.body_start, self.body_end)
    }

    /// Raw token text.
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start..self.end]
    }

    /// Delimiter-free payload text (same as [`Token::text`] for tokens
    /// without delimiters).
    pub fn body_text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.body_start..self.body_end]
    }

    /// True for the token kinds that can carry a secret: string literals
    /// and identifiers (quoted or not).
    pub fn is_secret_bearing(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::StringLit | TokenKind::Ident | TokenKind::QuotedIdent
        )
    }
}
