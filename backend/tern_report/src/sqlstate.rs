//! Five-character SQLSTATE condition codes.

use core::fmt;
use core::str;

use crate::Severity;

/// A SQLSTATE code: five characters from `[0-9A-Z]`.
///
/// Stored inline; copying one is free and comparing two is a word compare.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct SqlState([u8; 5]);

impl SqlState {
    pub const SUCCESSFUL_COMPLETION: SqlState = SqlState::new(*b"00000");
    pub const WARNING: SqlState = SqlState::new(*b"01000");
    pub const FEATURE_NOT_SUPPORTED: SqlState = SqlState::new(*b"0A000");
    pub const INVALID_PASSWORD: SqlState = SqlState::new(*b"28P01");
    pub const SYNTAX_ERROR: SqlState = SqlState::new(*b"42601");
    pub const INSUFFICIENT_RESOURCES: SqlState = SqlState::new(*b"53000");
    pub const OUT_OF_MEMORY: SqlState = SqlState::new(*b"53200");
    pub const ADMIN_SHUTDOWN: SqlState = SqlState::new(*b"57P01");
    pub const CRASH_SHUTDOWN: SqlState = SqlState::new(*b"57P02");
    pub const CANNOT_CONNECT_NOW: SqlState = SqlState::new(*b"57P03");
    pub const INTERNAL_ERROR: SqlState = SqlState::new(*b"XX000");
    pub const DATA_CORRUPTED: SqlState = SqlState::new(*b"XX001");

    pub const fn new(code: [u8; 5]) -> Self {
        SqlState(code)
    }

    /// The default code for a report whose author set none: internal error
    /// for `Error` and above, plain warning for `Warning`, success below.
    pub fn default_for(severity: Severity) -> Self {
        if severity >= Severity::Error {
            SqlState::INTERNAL_ERROR
        } else if severity == Severity::Warning {
            SqlState::WARNING
        } else {
            SqlState::SUCCESSFUL_COMPLETION
        }
    }

    pub fn is_success(self) -> bool {
        self == SqlState::SUCCESSFUL_COMPLETION
    }

    /// The code as text, e.g. `"42601"`.
    pub fn as_str(&self) -> &str {
        // The constructors only admit ASCII codes.
        str::from_utf8(&self.0).unwrap_or("XX000")
    }
}

impl fmt::Display for SqlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
