//! The scanner proper: a single forward pass over raw statement bytes.

use core::fmt;

use memchr::{memchr, memmem};

use crate::keyword::keyword_lookup;
use crate::token::{Token, TokenKind};

/// Scan failure. The offset is the byte position of the construct that
/// could not be completed.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ScanError {
    UnterminatedString(usize),
    UnterminatedQuotedIdent(usize),
    UnterminatedComment(usize),
    UnterminatedDollarQuote(usize),
}

impl ScanError {
    /// Byte offset of the offending construct.
    pub fn offset(&self) -> usize {
        match *self {
            ScanError::UnterminatedString(at)
            | ScanError::UnterminatedQuotedIdent(at)
            | ScanError::UnterminatedComment(at)
            | ScanError::UnterminatedDollarQuote(at) => at,
        }
    }
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanError::UnterminatedString(at) => {
                write!(f, "unterminated string literal at offset {at}")
            }
            ScanError::UnterminatedQuotedIdent(at) => {
                write!(f, "unterminated quoted identifier at offset {at}")
            }
            ScanError::UnterminatedComment(at) => {
                write!(f, "unterminated block comment at offset {at}")
            }
            ScanError::UnterminatedDollarQuote(at) => {
                write!(f, "unterminated dollar-quoted string at offset {at}")
            }
        }
    }
}

impl std::error::Error for ScanError {}

/// Re-entrant tokenizer over a borrowed statement.
///
/// ```
/// use tern_sqlscan::{Scanner, TokenKind};
///
/// let mut scanner = Scanner::new("SET ROLE alice;");
/// let first = scanner.next_token().ok().flatten();
/// assert!(first.is_some_and(|t| matches!(t.kind, TokenKind::Keyword(_))));
/// ```
#[derive(Clone, Debug)]
pub struct Scanner<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(source: &'a str) -> Self {
        Scanner {
            source,
            bytes: source.as_bytes(),
            pos: 0,
        }
    }

    /// The text this scanner was created over.
    pub fn source(&self) -> &'a str {
        self.source
    }

    /// Produce the next token, `Ok(None)` at end of input.
    pub fn next_token(&mut self) -> Result<Option<Token>, ScanError> {
        loop {
            self.skip_whitespace();
            let start = self.pos;
            let Some(&b) = self.bytes.get(self.pos) else {
                return Ok(None);
            };

            match b {
                b'-' if self.peek_at(self.pos + 1) == Some(b'-') => {
                    self.skip_line_comment();
                }
                b'/' if self.peek_at(self.pos + 1) == Some(b'*') => {
                    self.skip_block_comment()?;
                }
                b'\'' => return self.scan_quoted(start, b'\'').map(Some),
                b'"' => return self.scan_quoted(start, b'"').map(Some),
                b'$' => return self.scan_dollar(start).map(Some),
                b'(' => return Ok(Some(self.single(TokenKind::LParen))),
                b')' => return Ok(Some(self.single(TokenKind::RParen))),
                b',' => return Ok(Some(self.single(TokenKind::Comma))),
                b';' => return Ok(Some(self.single(TokenKind::Semicolon))),
                b'0'..=b'9' => return Ok(Some(self.scan_number(start))),
                b'.' if self.peek_at(self.pos + 1).is_some_and(|c| c.is_ascii_digit()) => {
                    return Ok(Some(self.scan_number(start)));
                }
                _ if is_ident_start(b) => return Ok(Some(self.scan_ident(start))),
                _ => return Ok(Some(self.scan_operator(start))),
            }
        }
    }

    fn peek_at(&self, at: usize) -> Option<u8> {
        self.bytes.get(at).copied()
    }

    fn single(&mut self, kind: TokenKind) -> Token {
        let start = self.pos;
        self.pos += 1;
        Token::new(kind, start, self.pos)
    }

    fn skip_whitespace(&mut self) {
        while self
            .peek_at(self.pos)
            .is_some_and(|b| b.is_ascii_whitespace())
        {
            self.pos += 1;
        }
    }

    fn skip_line_comment(&mut self) {
        match memchr(b'\n', &self.bytes[self.pos..]) {
            Some(rel) => self.pos += rel + 1,
            None => self.pos = self.bytes.len(),
        }
    }

    /// Block comments nest, per SQL convention.
    fn skip_block_comment(&mut self) -> Result<(), ScanError> {
        let open = self.pos;
        self.pos += 2;
        let mut depth = 1usize;
        while depth > 0 {
            let Some(b) = self.peek_at(self.pos) else {
                return Err(ScanError::UnterminatedComment(open));
            };
            if b == b'*' && self.peek_at(self.pos + 1) == Some(b'/') {
                depth -= 1;
                self.pos += 2;
            } else if b == b'/' && self.peek_at(self.pos + 1) == Some(b'*') {
                depth += 1;
                self.pos += 2;
            } else {
                self.pos += 1;
            }
        }
        Ok(())
    }

    /// Scan a `'...'` literal or `"..."` identifier, with `''`/`""`
    /// doubling. The body range excludes the outer delimiters but keeps
    /// doubled quotes verbatim.
    fn scan_quoted(&mut self, start: usize, quote: u8) -> Result<Token, ScanError> {
        self.pos += 1;
        loop {
            let Some(rel) = memchr(quote, &self.bytes[self.pos..]) else {
                // Nothing recoverable follows an unterminated literal;
                // consume the rest so iteration ends.
                self.pos = self.bytes.len();
                return Err(if quote == b'\'' {
                    ScanError::UnterminatedString(start)
                } else {
                    ScanError::UnterminatedQuotedIdent(start)
                });
            };
            self.pos += rel + 1;
            // A doubled quote is an escaped quote, not a terminator.
            if self.peek_at(self.pos) == Some(quote) {
                self.pos += 1;
                continue;
            }
            let kind = if quote == b'\'' {
                TokenKind::StringLit
            } else {
                TokenKind::QuotedIdent
            };
            return Ok(Token::with_body(kind, start, self.pos, start + 1, self.pos - 1));
        }
    }

    /// Scan `$tag$ ... $tag$` (tag possibly empty) or a positional
    /// parameter `$1`. A lone `$` falls back to an operator token.
    fn scan_dollar(&mut self, start: usize) -> Result<Token, ScanError> {
        let mut tag_end = start + 1;
        while self.peek_at(tag_end).is_some_and(is_ident_cont) {
            tag_end += 1;
        }
        if self.peek_at(tag_end) == Some(b'$') {
            let delim = &self.bytes[start..=tag_end];
            let body_start = tag_end + 1;
            let Some(rel) = memmem::find(&self.bytes[body_start..], delim) else {
                self.pos = self.bytes.len();
                return Err(ScanError::UnterminatedDollarQuote(start));
            };
            let body_end = body_start + rel;
            self.pos = body_end + delim.len();
            return Ok(Token::with_body(
                TokenKind::StringLit,
                start,
                self.pos,
                body_start,
                body_end,
            ));
        }
        if self.peek_at(start + 1).is_some_and(|b| b.is_ascii_digit()) {
            self.pos = start + 1;
            while self.peek_at(self.pos).is_some_and(|b| b.is_ascii_digit()) {
                self.pos += 1;
            }
            return Ok(Token::new(TokenKind::Number, start, self.pos));
        }
        self.pos = start + 1;
        Ok(Token::new(TokenKind::Operator, start, self.pos))
    }

    fn scan_number(&mut self, start: usize) -> Token {
        self.pos += 1;
        while self
            .peek_at(self.pos)
            .is_some_and(|b| b.is_ascii_digit() || b == b'.')
        {
            self.pos += 1;
        }
        if self.peek_at(self.pos).is_some_and(|b| b == b'e' || b == b'E') {
            let mut ahead = self.pos + 1;
            if self.peek_at(ahead).is_some_and(|b| b == b'+' || b == b'-') {
                ahead += 1;
            }
            if self.peek_at(ahead).is_some_and(|b| b.is_ascii_digit()) {
                self.pos = ahead;
                while self.peek_at(self.pos).is_some_and(|b| b.is_ascii_digit()) {
                    self.pos += 1;
                }
            }
        }
        Token::new(TokenKind::Number, start, self.pos)
    }

    fn scan_ident(&mut self, start: usize) -> Token {
        self.pos += 1;
        while self.peek_at(self.pos).is_some_and(is_ident_cont) {
            self.pos += 1;
        }
        let text = &self.source[start..self.pos];
        match keyword_lookup(text) {
            Some(kw) => Token::new(TokenKind::Keyword(kw), start, self.pos),
            None => Token::new(TokenKind::Ident, start, self.pos),
        }
    }

    /// Consume a run of operator characters as one token, stopping before
    /// anything that opens a comment.
    fn scan_operator(&mut self, start: usize) -> Token {
        self.pos += 1;
        while let Some(b) = self.peek_at(self.pos) {
            if !is_operator_byte(b) {
                break;
            }
            let two_ahead = self.peek_at(self.pos + 1);
            if (b == b'-' && two_ahead == Some(b'-')) || (b == b'/' && two_ahead == Some(b'*')) {
                break;
            }
            self.pos += 1;
        }
        Token::new(TokenKind::Operator, start, self.pos)
    }
}

impl Iterator for Scanner<'_> {
    type Item = Result<Token, ScanError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token().transpose()
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b >= 0x80
}

fn is_ident_cont(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80
}

fn is_operator_byte(b: u8) -> bool {
    matches!(
        b,
        b'+' | b'-'
            | b'*'
            | b'/'
            | b'<'
            | b'>'
            | b'='
            | b'~'
            | b'!'
            | b'@'
            | b'#'
            | b'%'
            | b'^'
            | b'&'
            | b'|'
            | b'`'
            | b'?'
            | b':'
            | b'.'
            | b'['
            | b']'
    )
}
