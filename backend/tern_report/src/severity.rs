//! Severity levels and routing predicates.

use core::fmt;

/// Severity of a report, ordered from least to most severe.
///
/// `Log` sits between the debug levels and `Info` in the enum order, but
/// server-log routing treats it specially: see [`Severity::passes_log_floor`].
/// The `Verbose` pseudo-level used by maintenance commands is normalized to
/// `Info` before any routing decision and never appears in a finished record.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub enum Severity {
    /// Most detailed tracing.
    Debug5,
    Debug4,
    Debug3,
    Debug2,
    /// Least detailed tracing.
    Debug1,
    /// Server-operator information. Never sent to clients by default.
    Log,
    /// Information requested by the client (e.g. maintenance progress).
    Info,
    /// Helpful-but-unrequested information for the client.
    Notice,
    /// Unexpected but non-fatal condition.
    Warning,
    /// Aborts the current operation via a non-local exit.
    Error,
    /// Aborts the whole session.
    Fatal,
    /// Takes down the process group; something shared is corrupted.
    Panic,
}

impl Severity {
    /// Whether a report at `self` reaches the server log when the log
    /// floor is `floor`.
    ///
    /// Only the `Log` level itself is sorted out of order: it counts as
    /// sitting between `Error` and `Fatal`, so an operator who asks for
    /// `Error` and above still gets `Log` lines while a `Fatal` floor
    /// suppresses them. Every other severity compares against the floor
    /// in plain enum order. Client routing uses the plain order for
    /// everything.
    pub fn passes_log_floor(self, floor: Severity) -> bool {
        if self == Severity::Log {
            floor == Severity::Log || floor <= Severity::Error
        } else {
            self >= floor
        }
    }

    /// Severity word for log lines and client reports.
    ///
    /// All debug levels collapse to `DEBUG`; clients and operators don't
    /// care which of the five tracing levels produced a line.
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Debug5
            | Severity::Debug4
            | Severity::Debug3
            | Severity::Debug2
            | Severity::Debug1 => "DEBUG",
            Severity::Log => "LOG",
            Severity::Info => "INFO",
            Severity::Notice => "NOTICE",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
            Severity::Panic => "PANIC",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn enum_order_is_escalation_order() {
        assert!(Severity::Debug5 < Severity::Debug1);
        assert!(Severity::Debug1 < Severity::Log);
        assert!(Severity::Log < Severity::Info);
        assert!(Severity::Warning < Severity::Error);
        assert!(Severity::Error < Severity::Fatal);
        assert!(Severity::Fatal < Severity::Panic);
    }

    #[test]
    fn log_sorts_between_error_and_fatal_for_the_server_log() {
        // An Error floor still admits Log lines.
        assert!(Severity::Log.passes_log_floor(Severity::Error));
        assert!(Severity::Log.passes_log_floor(Severity::Log));
        // A Fatal floor suppresses them.
        assert!(!Severity::Log.passes_log_floor(Severity::Fatal));
        // Only the message side sorts out of order: a Log floor compares
        // in plain enum order and admits everything from Log up.
        assert!(Severity::Error.passes_log_floor(Severity::Log));
        assert!(Severity::Warning.passes_log_floor(Severity::Log));
        assert!(Severity::Info.passes_log_floor(Severity::Log));
        assert!(!Severity::Debug1.passes_log_floor(Severity::Log));
    }

    #[test]
    fn debug_levels_collapse_in_display() {
        assert_eq!(Severity::Debug5.to_string(), "DEBUG");
        assert_eq!(Severity::Debug1.to_string(), "DEBUG");
        assert_eq!(Severity::Panic.to_string(), "PANIC");
    }
}
