//! Low-level SQL tokenizer for terndb.
//!
//! Produces a flat stream of `(kind, offsets)` tokens over raw statement
//! text without building any syntax tree. The same scanner backs normal
//! query lexing and the security-sensitive statement redaction pass, so it
//! must be re-entrant: a [`Scanner`] is a plain value over a `&str` with no
//! shared state, and any number of scanners may be live at once (including
//! recursively, for statements embedded in string literals).
//!
//! The scanner is byte-oriented. SQL keywords and identifiers are ASCII;
//! multi-byte UTF-8 sequences can only appear inside literals, quoted
//! identifiers, and comments, where the scanner only looks for ASCII
//! delimiter bytes. Offsets are therefore always valid `char` boundaries
//! of the original text at token edges.

mod keyword;
mod scanner;
mod token;

pub use keyword::Keyword;
pub use scanner::{ScanError, Scanner};
pub use token::{Token, TokenKind};
