//! Reporting configuration.

use bitflags::bitflags;
use rustc_hash::FxHashMap;

use crate::internal_code::InternalCodeTable;
use crate::{ModuleId, Severity};

bitflags! {
    /// Where server-log output goes. Several destinations may be active
    /// at once.
    #[derive(Copy, Clone, Eq, PartialEq, Debug)]
    pub struct Destination: u8 {
        const STDERR = 1 << 0;
        const SYSLOG = 1 << 1;
        const CSVLOG = 1 << 2;
        /// Accepted for configuration compatibility; no writer is wired
        /// to it on this platform.
        const EVENTLOG = 1 << 3;
    }
}

/// How much detail a serialized report carries. Applied independently to
/// the server log and the client channel.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub enum Verbosity {
    /// Message, code and positions only.
    Terse,
    /// Adds detail, hint and context fields.
    #[default]
    Default,
    /// Adds source file, line and function.
    Verbose,
}

/// Tunable reporting behavior. Built once at session start; the engine
/// takes it by value.
#[derive(Clone, Debug)]
pub struct ReportConfig {
    /// Minimum severity that reaches the server log.
    pub log_floor: Severity,
    /// Minimum severity that reaches the client.
    pub client_floor: Severity,
    /// Per-module overrides of `log_floor`. Modules not listed use the
    /// global floor.
    pub module_floors: FxHashMap<ModuleId, Severity>,
    pub destinations: Destination,
    /// A log collector owns stderr, so stderr-bound output must be framed
    /// into chunks instead of written directly.
    pub collector_active: bool,
    /// Template for the per-line prefix, with `%`-codes.
    pub line_prefix: String,
    /// Attach a captured backtrace to reports at or above this severity.
    pub backtrace_floor: Option<Severity>,
    /// Log the active statement alongside reports at or above this
    /// severity.
    pub statement_floor: Severity,
    pub log_verbosity: Verbosity,
    pub client_verbosity: Verbosity,
    /// Width of the fixed mask substituted for redacted secrets.
    pub mask_width: usize,
    /// Treat every `Error` as session-fatal (single-user and bootstrap
    /// processing).
    pub exit_on_any_error: bool,
    /// Numeric code table for client tooling, keyed by raise site.
    pub internal_codes: InternalCodeTable,
}

impl Default for ReportConfig {
    fn default() -> Self {
        ReportConfig {
            log_floor: Severity::Warning,
            client_floor: Severity::Notice,
            module_floors: FxHashMap::default(),
            destinations: Destination::STDERR,
            collector_active: false,
            line_prefix: String::new(),
            backtrace_floor: None,
            statement_floor: Severity::Error,
            log_verbosity: Verbosity::Default,
            client_verbosity: Verbosity::Default,
            mask_width: 8,
            exit_on_any_error: false,
            internal_codes: InternalCodeTable::default(),
        }
    }
}

impl ReportConfig {
    /// Whether a report from `module` at `severity` belongs in the server
    /// log.
    pub fn log_enabled(&self, severity: Severity, module: ModuleId) -> bool {
        severity.passes_log_floor(self.log_floor) && self.module_allows(severity, module)
    }

    /// Per-module floor check. Every sink applies it on top of its own
    /// routing, so one chatty module can be quieted everywhere at once.
    pub fn module_allows(&self, severity: Severity, module: ModuleId) -> bool {
        match self.module_floors.get(&module) {
            Some(&floor) => severity.passes_log_floor(floor),
            None => true,
        }
    }

    /// Whether `severity` belongs on the client channel. `Log` never
    /// routes to clients regardless of the floor.
    pub fn client_enabled(&self, severity: Severity) -> bool {
        severity != Severity::Log && severity >= self.client_floor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_floor_tightens_the_global_one() {
        let mut config = ReportConfig {
            log_floor: Severity::Debug1,
            ..ReportConfig::default()
        };
        config
            .module_floors
            .insert(ModuleId::Autovacuum, Severity::Error);

        assert!(config.log_enabled(Severity::Debug1, ModuleId::Executor));
        assert!(!config.log_enabled(Severity::Warning, ModuleId::Autovacuum));
        assert!(config.log_enabled(Severity::Error, ModuleId::Autovacuum));
    }

    #[test]
    fn log_severity_never_reaches_clients() {
        let config = ReportConfig {
            client_floor: Severity::Debug5,
            ..ReportConfig::default()
        };
        assert!(!config.client_enabled(Severity::Log));
        assert!(config.client_enabled(Severity::Info));
    }
}
