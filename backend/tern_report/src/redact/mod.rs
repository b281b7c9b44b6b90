//! Statement redaction: masks password-class literals in SQL text before
//! the text reaches any log or client.
//!
//! The scanner tokenizes the statement with `tern_sqlscan`, classifies its
//! shape from the leading keywords, and collects an ordered list of
//! `(start, end, replacement)` edits. The edits are applied in one pass
//! that builds a fresh `String`, with a running length accumulator in
//! place of in-place shifting. Secrets are replaced by a fixed-width run
//! of `*`, so the masked text never reveals the secret's length.
//!
//! Any tokenizer error abandons the whole attempt: the caller gets `None`
//! and must treat the text as unmaskable, and every engine frame pushed
//! during the attempt is discarded so the caller's own in-progress report
//! is untouched.

use smallvec::SmallVec;

use tern_sqlscan::{Keyword, Scanner, Token, TokenKind};

use crate::engine::ReportEngine;
use crate::{here, Severity};

/// Candidate spans buffered between flush points. Statements rarely have
/// more than this many sensitive tokens between flushes; hitting the
/// limit forces an early flush rather than dropping candidates.
pub(crate) const SPAN_SLOTS: usize = 16;

/// Child-statement nesting bound.
const MAX_CHILD_DEPTH: usize = 8;

/// Functions whose string arguments are connection strings and must be
/// masked whole.
const SENSITIVE_FUNCTIONS: &[&str] = &["dblink_connect"];

/// Functions whose second argument is SQL text to redact recursively.
const CHILD_TEXT_FUNCTIONS: &[&str] = &["exec_on_extension", "exec_hadoop_sql"];

/// Functions whose entire argument list is sensitive.
const ENCRYPT_ALL_FUNCTIONS: &[&str] = &["gs_encrypt_aes128", "gs_decrypt_aes128"];

/// Option keys carrying secrets in `OPTIONS (...)` lists.
const SERVER_OPTION_KEYS: &[&str] = &["password", "secret_access_key"];
const DATA_SOURCE_OPTION_KEYS: &[&str] = &["username", "password"];

/// Mask the given statement. `None` means nothing needed masking, a scan
/// failed (the text is then presumed not to be parseable SQL), or a
/// redaction is already running on this engine.
pub(crate) fn mask_statement(engine: &mut ReportEngine, statement: &str) -> Option<String> {
    if engine.redacting {
        return None;
    }
    engine.redacting = true;
    let checkpoint = engine.save_for_redaction();

    let masked = match scan_statement(statement, engine.config.mask_width, 0) {
        Ok(Some(edits)) => Some(apply_edits(statement, &edits)),
        Ok(None) => None,
        Err(Abort::Scan) => None,
        Err(Abort::Mismatch) => {
            // A child statement produced edits outside its own span.
            // Report it so the inconsistency is on record, then absorb
            // the report along with everything else from this attempt.
            if engine.begin_report(Severity::Error, here!()) {
                engine.set_message("child statement redaction produced inconsistent offsets");
            }
            None
        }
    };

    engine.restore_after_redaction(checkpoint);
    engine.redacting = false;
    masked
}

enum Abort {
    /// Tokenizer failure; the text cannot be scanned.
    Scan,
    /// Internal consistency failure while splicing child edits.
    Mismatch,
}

#[derive(Clone, Debug)]
struct Edit {
    start: usize,
    end: usize,
    replacement: String,
}

/// One buffered masking candidate.
#[derive(Copy, Clone, Debug)]
struct Span {
    start: usize,
    end: usize,
}

/// Statement shapes that change which keywords open a sensitive context.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
enum Shape {
    /// CREATE/ALTER USER, ROLE or GROUP.
    Role { alter: bool },
    /// SET [LOCAL|SESSION] ROLE / SET SESSION AUTHORIZATION.
    SessionRole,
    /// CREATE DATABASE LINK.
    DatabaseLink,
    /// CREATE/ALTER SERVER, FOREIGN TABLE or DATA SOURCE with an
    /// OPTIONS list.
    Options { keys: &'static [&'static str] },
    /// CREATE FUNCTION/PROCEDURE; the AS body is a child statement.
    Function,
    Plain,
}

impl Shape {
    fn role_like(self) -> bool {
        matches!(
            self,
            Shape::Role { .. } | Shape::SessionRole | Shape::DatabaseLink
        )
    }
}

/// Scan one statement (or child statement) and produce its edits, with
/// offsets relative to `source`. `Ok(None)` means no edits.
fn scan_statement(
    source: &str,
    mask_width: usize,
    depth: usize,
) -> Result<Option<Vec<Edit>>, Abort> {
    if depth > MAX_CHILD_DEPTH {
        return Err(Abort::Scan);
    }
    let tokens: Vec<Token> = Scanner::new(source)
        .collect::<Result<_, _>>()
        .map_err(|_| Abort::Scan)?;

    let mut scan = Scan {
        source,
        mask_width,
        depth,
        spans: SmallVec::new(),
        edits: Vec::new(),
    };

    let mut start = 0;
    for (i, token) in tokens.iter().enumerate() {
        if token.kind == TokenKind::Semicolon {
            scan.statement(&tokens[start..i])?;
            start = i + 1;
        }
    }
    scan.statement(&tokens[start..])?;

    if scan.edits.is_empty() {
        Ok(None)
    } else {
        Ok(Some(scan.edits))
    }
}

struct Scan<'a> {
    source: &'a str,
    mask_width: usize,
    depth: usize,
    spans: SmallVec<[Span; SPAN_SLOTS]>,
    edits: Vec<Edit>,
}

impl Scan<'_> {
    /// Process one semicolon-delimited statement.
    fn statement(&mut self, tokens: &[Token]) -> Result<(), Abort> {
        let shape = classify(tokens, self.source);
        let mut i = 0;
        while i < tokens.len() {
            match tokens[i].kind {
                TokenKind::Keyword(Keyword::Password | Keyword::Encrypted)
                    if shape.role_like() =>
                {
                    self.flush();
                    i = self.buffer_secret(tokens, i + 1);
                    continue;
                }
                TokenKind::Keyword(Keyword::Identified)
                    if shape.role_like()
                        && kw_at(tokens, i + 1) == Some(Keyword::By) =>
                {
                    self.flush();
                    i = self.buffer_secret(tokens, i + 2);
                    continue;
                }
                TokenKind::Keyword(Keyword::Replace)
                    if shape == (Shape::Role { alter: true }) =>
                {
                    self.flush();
                    i = self.buffer_secret(tokens, i + 1);
                    continue;
                }
                TokenKind::Keyword(Keyword::Options) => {
                    if let Shape::Options { keys } = shape {
                        i = self.options_list(tokens, i + 1, keys);
                        continue;
                    }
                }
                TokenKind::Keyword(Keyword::Do) => {
                    if let Some(lit) = tokens.get(i + 1).filter(|t| t.kind == TokenKind::StringLit)
                    {
                        self.child(lit)?;
                        i += 2;
                        continue;
                    }
                }
                TokenKind::Keyword(Keyword::Execute) => {
                    let mut j = i + 1;
                    if kw_at(tokens, j) == Some(Keyword::Immediate) {
                        j += 1;
                    }
                    if let Some(lit) = tokens.get(j).filter(|t| t.kind == TokenKind::StringLit) {
                        self.child(lit)?;
                        i = j + 1;
                        continue;
                    }
                }
                TokenKind::Keyword(Keyword::As) if shape == Shape::Function => {
                    if let Some(lit) = tokens.get(i + 1).filter(|t| t.kind == TokenKind::StringLit)
                    {
                        self.child(lit)?;
                        i += 2;
                        continue;
                    }
                }
                TokenKind::Ident if tokens.get(i + 1).is_some_and(|t| t.kind == TokenKind::LParen) =>
                {
                    let name = tokens[i].text(self.source);
                    if name_in(name, SENSITIVE_FUNCTIONS) {
                        i = self.function_args(tokens, i + 2, ArgPolicy::Strings)?;
                        continue;
                    }
                    if name_in(name, ENCRYPT_ALL_FUNCTIONS) {
                        i = self.function_args(tokens, i + 2, ArgPolicy::All)?;
                        continue;
                    }
                    if name_in(name, CHILD_TEXT_FUNCTIONS) {
                        i = self.function_args(tokens, i + 2, ArgPolicy::SecondIsChild)?;
                        continue;
                    }
                }
                _ => {}
            }
            i += 1;
        }
        self.flush();
        Ok(())
    }

    /// Buffer the secret token at `at`, if there is one. Returns the
    /// index after the consumed token.
    fn buffer_secret(&mut self, tokens: &[Token], at: usize) -> usize {
        let Some(token) = tokens.get(at) else {
            return at;
        };
        match token.kind {
            TokenKind::StringLit | TokenKind::QuotedIdent => {
                let (start, end) = token.body();
                self.push_span(Span { start, end });
            }
            // Unquoted secrets may contain operator characters, and an
            // already-masked `********` run scans as an operator; both
            // take the word-boundary path.
            TokenKind::Ident | TokenKind::Number | TokenKind::Operator => {
                let (start, end) = self.word_boundaries(token);
                self.push_span(Span { start, end });
            }
            _ => return at,
        }
        at + 1
    }

    /// A password the tokenizer split (it may contain operator
    /// characters) is re-joined by scanning outward to the nearest
    /// whitespace, quote, or list punctuation.
    fn word_boundaries(&self, token: &Token) -> (usize, usize) {
        let bytes = self.source.as_bytes();
        let mut start = token.start;
        while start > 0 && !is_word_edge(bytes[start - 1]) {
            start -= 1;
        }
        let mut end = token.end;
        while end < bytes.len() && !is_word_edge(bytes[end]) && bytes[end] != b';' {
            end += 1;
        }
        (start, end)
    }

    fn push_span(&mut self, span: Span) {
        if self.spans.len() == SPAN_SLOTS {
            self.flush();
        }
        self.spans.push(span);
    }

    /// Convert buffered spans into masking edits.
    fn flush(&mut self) {
        for span in self.spans.drain(..) {
            self.edits.push(Edit {
                start: span.start,
                end: span.end,
                replacement: "*".repeat(self.mask_width),
            });
        }
    }

    /// Walk an `OPTIONS ( key 'value', ... )` list, buffering the values
    /// of sensitive keys. `at` points at the opening parenthesis.
    /// Returns the index after the closing parenthesis.
    fn options_list(&mut self, tokens: &[Token], at: usize, keys: &[&str]) -> usize {
        if tokens.get(at).map(|t| t.kind) != Some(TokenKind::LParen) {
            return at;
        }
        let mut depth = 1;
        let mut i = at + 1;
        while i < tokens.len() {
            match tokens[i].kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                // Option keys arrive as plain identifiers or, for words
                // like `password`, as keywords.
                TokenKind::Ident | TokenKind::Keyword(_)
                    if name_in(tokens[i].text(self.source), keys) =>
                {
                    i = self.buffer_secret(tokens, i + 1);
                    continue;
                }
                _ => {}
            }
            i += 1;
        }
        self.flush();
        i + 1
    }

    /// Walk a function argument list according to `policy`. `at` points
    /// just past the opening parenthesis. Returns the index after the
    /// closing parenthesis.
    fn function_args(
        &mut self,
        tokens: &[Token],
        at: usize,
        policy: ArgPolicy,
    ) -> Result<usize, Abort> {
        let mut depth = 1;
        let mut arg = 1;
        let mut i = at;
        while i < tokens.len() {
            let token = &tokens[i];
            match token.kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                TokenKind::Comma if depth == 1 => arg += 1,
                _ => match policy {
                    ArgPolicy::Strings if token.kind == TokenKind::StringLit => {
                        let (start, end) = token.body();
                        self.push_span(Span { start, end });
                    }
                    ArgPolicy::All if token.is_secret_bearing() => {
                        let (start, end) = token.body();
                        self.push_span(Span { start, end });
                    }
                    ArgPolicy::SecondIsChild
                        if arg == 2 && token.kind == TokenKind::StringLit =>
                    {
                        self.child(token)?;
                    }
                    _ => {}
                },
            }
            i += 1;
        }
        self.flush();
        Ok(i + 1)
    }

    /// Recursively redact the body of a string literal holding SQL, and
    /// splice the child's edits into this scan at the literal's offset.
    ///
    /// Single-quoted children use doubled-quote escaping, which the inner
    /// scan cannot see through; those are scanned over a copy with quote
    /// and concatenation characters blanked out. Blanking preserves every
    /// offset, so the child's edits apply to the original text unchanged.
    fn child(&mut self, literal: &Token) -> Result<(), Abort> {
        let (start, end) = literal.body();
        let body = &self.source[start..end];
        let single_quoted = self.source.as_bytes()[literal.start] == b'\'';

        let child_edits = if single_quoted {
            let blanked = blank_quotes(body);
            let result = scan_statement(&blanked, self.mask_width, self.depth + 1);
            wipe(blanked);
            result?
        } else {
            scan_statement(body, self.mask_width, self.depth + 1)?
        };

        let Some(child_edits) = child_edits else {
            return Ok(());
        };
        for edit in child_edits {
            // Child offsets must land inside the literal body.
            if edit.end > body.len() || edit.start > edit.end {
                return Err(Abort::Mismatch);
            }
            self.edits.push(Edit {
                start: start + edit.start,
                end: start + edit.end,
                replacement: edit.replacement,
            });
        }
        Ok(())
    }
}

#[derive(Copy, Clone, Eq, PartialEq)]
enum ArgPolicy {
    /// Mask every string-literal argument whole.
    Strings,
    /// Mask every argument.
    All,
    /// The second argument is SQL text; redact it recursively.
    SecondIsChild,
}

fn classify(tokens: &[Token], source: &str) -> Shape {
    match kw_at(tokens, 0) {
        Some(Keyword::Create) => {
            let mut j = 1;
            // CREATE OR REPLACE ...
            if tokens
                .get(j)
                .is_some_and(|t| t.kind == TokenKind::Ident && t.text(source).eq_ignore_ascii_case("or"))
                && kw_at(tokens, j + 1) == Some(Keyword::Replace)
            {
                j += 2;
            }
            match kw_at(tokens, j) {
                Some(Keyword::User | Keyword::Role | Keyword::Group) => {
                    Shape::Role { alter: false }
                }
                Some(Keyword::Database) if kw_at(tokens, j + 1) == Some(Keyword::Link) => {
                    Shape::DatabaseLink
                }
                Some(Keyword::Server) => Shape::Options {
                    keys: SERVER_OPTION_KEYS,
                },
                Some(Keyword::Foreign) if kw_at(tokens, j + 1) == Some(Keyword::Table) => {
                    Shape::Options {
                        keys: SERVER_OPTION_KEYS,
                    }
                }
                Some(Keyword::Data) if kw_at(tokens, j + 1) == Some(Keyword::Source) => {
                    Shape::Options {
                        keys: DATA_SOURCE_OPTION_KEYS,
                    }
                }
                Some(Keyword::Function | Keyword::Procedure) => Shape::Function,
                _ => Shape::Plain,
            }
        }
        Some(Keyword::Alter) => match kw_at(tokens, 1) {
            Some(Keyword::User | Keyword::Role | Keyword::Group) => Shape::Role { alter: true },
            Some(Keyword::Server) => Shape::Options {
                keys: SERVER_OPTION_KEYS,
            },
            Some(Keyword::Foreign) if kw_at(tokens, 2) == Some(Keyword::Table) => Shape::Options {
                keys: SERVER_OPTION_KEYS,
            },
            Some(Keyword::Data) if kw_at(tokens, 2) == Some(Keyword::Source) => Shape::Options {
                keys: DATA_SOURCE_OPTION_KEYS,
            },
            Some(Keyword::Function | Keyword::Procedure) => Shape::Function,
            _ => Shape::Plain,
        },
        Some(Keyword::Set) => {
            let mut j = 1;
            if matches!(kw_at(tokens, j), Some(Keyword::Local | Keyword::Session)) {
                j += 1;
            }
            match kw_at(tokens, j) {
                Some(Keyword::Role | Keyword::Authorization) => Shape::SessionRole,
                _ => Shape::Plain,
            }
        }
        _ => Shape::Plain,
    }
}

fn kw_at(tokens: &[Token], at: usize) -> Option<Keyword> {
    match tokens.get(at)?.kind {
        TokenKind::Keyword(kw) => Some(kw),
        _ => None,
    }
}

fn name_in(name: &str, set: &[&str]) -> bool {
    set.iter().any(|s| s.eq_ignore_ascii_case(name))
}

fn is_word_edge(b: u8) -> bool {
    b.is_ascii_whitespace() || matches!(b, b'\'' | b'"' | b'(' | b')' | b',')
}

/// Apply ordered, non-overlapping edits, building the masked copy in one
/// pass. `cursor` carries the running position in the source; edit
/// offsets never need correction because the output is built fresh.
fn apply_edits(source: &str, edits: &[Edit]) -> String {
    let mut out = String::with_capacity(source.len());
    let mut cursor = 0;
    for edit in edits {
        if edit.start < cursor {
            // Overlapping edits should be impossible; keep the earlier
            // one rather than corrupt the output.
            continue;
        }
        out.push_str(&source[cursor..edit.start]);
        out.push_str(&edit.replacement);
        cursor = edit.end;
    }
    out.push_str(&source[cursor..]);
    out
}

/// Blank out single quotes and concatenation bars, preserving length.
fn blank_quotes(body: &str) -> String {
    body.chars()
        .map(|c| if c == '\'' || c == '|' { ' ' } else { c })
        .collect()
}

/// Best-effort zeroing of a scratch buffer that held secret text.
fn wipe(buf: String) {
    let mut bytes = buf.into_bytes();
    for b in &mut bytes {
        *b = 0;
    }
}
