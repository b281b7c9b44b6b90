//! Error reporting and diagnostic emission for the terndb backend.
//!
//! This crate owns the path from a raised condition to its delivery:
//!
//! - [`ReportEngine`] assembles reports on a bounded frame stack, applies
//!   the mandatory severity escalations, and routes finished records.
//! - The sink layer fans a record out to the server log (console,
//!   collector pipe, syslog, CSV) and to the client protocol channel.
//! - The redaction scanner masks password-class literals out of any SQL
//!   text before it reaches a log or a client.
//! - The fatal path turns `Error` into a typed non-local exit
//!   ([`Thrown`]), `Fatal` into a clean process exit, and `Panic` into an
//!   abort, with guarantees that the engine's own failures can neither
//!   recurse without bound nor grow memory without bound.
//!
//! A typical raise site:
//!
//! ```
//! use tern_report::{here, ReportConfig, ReportEngine, SessionInfo, Severity, SinkSet, Thrown};
//!
//! fn check(len: usize, engine: &mut ReportEngine) -> Result<(), Thrown> {
//!     if len > 64 {
//!         if engine.begin_report(Severity::Warning, here!()) {
//!             engine.set_message("identifier will be truncated");
//!             engine.set_hint("maximum identifier length is 64");
//!             engine.finish_report()?;
//!         }
//!     }
//!     Ok(())
//! }
//!
//! let mut engine = ReportEngine::new(
//!     ReportConfig::default(),
//!     SessionInfo::default(),
//!     SinkSet::console_only(Box::new(Vec::new())),
//! );
//! assert!(check(80, &mut engine).is_ok());
//! ```

pub mod config;
pub mod engine;
pub mod record;
pub mod region;
pub mod session;
pub mod sink;

mod internal_code;
mod line_prefix;
mod module;
mod os_error;
mod redact;
mod severity;
mod sqlstate;

pub use config::{Destination, ReportConfig, Verbosity};
pub use engine::{
    startup_failure, ProcessTermination, RecoveryToken, ReportEngine, Termination, Thrown,
    STACK_FRAMES_MAX,
};
pub use internal_code::InternalCodeTable;
pub use module::ModuleId;
pub use os_error::expand_os_error;
pub use record::{ErrorRecord, SourceLocation};
pub use region::ErrorRegion;
pub use session::{ProcessRole, SessionInfo};
pub use severity::Severity;
pub use sink::{
    ChunkFlags, ChunkedTransport, ClientChannel, MessageKind, SinkSet, SyslogSeverity,
    SyslogWriter,
};
pub use sqlstate::SqlState;
