//! The severity engine: report construction, escalation, fan-out, and the
//! fatal path.
//!
//! A report lives as a frame on a bounded stack between
//! [`ReportEngine::begin_report`] and [`ReportEngine::finish_report`].
//! Between the two, typed setters fill in the record. Closing a frame
//! routes it to the sinks and, for `Error` and above, takes the
//! appropriate exit: a typed non-local exit ([`Thrown`]) for `Error`,
//! process exit for `Fatal`, abort for `Panic`.

use std::backtrace::Backtrace;
use std::io::Write as _;

use thiserror::Error;

use crate::config::ReportConfig;
use crate::internal_code;
use crate::os_error::{current_os_error, expand_os_error};
use crate::record::{ErrorRecord, SourceLocation};
use crate::redact;
use crate::region::ErrorRegion;
use crate::session::{ProcessRole, SessionInfo};
use crate::sink::{self, EmitState, SinkSet};
use crate::{ModuleId, Severity, SqlState};

/// Maximum simultaneously open report frames. Nesting deeper than this
/// means the engine is failing to report its own failures; the only safe
/// move left is to abort.
pub const STACK_FRAMES_MAX: usize = 20;

/// Nested `finish_report` depth beyond which the engine stops trusting
/// its collaborators: context callbacks are skipped, the statement is
/// dropped from output, and client text is squashed to ASCII.
const RECURSION_TROUBLE_DEPTH: u32 = 2;

/// The non-local exit of an `Error`-severity report.
///
/// Carries no payload: the record stays on the engine's frame stack,
/// where the recovery point retrieves it with
/// [`ReportEngine::copy_record`] and clears it with
/// [`ReportEngine::flush_state`].
#[derive(Copy, Clone, Eq, PartialEq, Error, Debug)]
#[error("error report raised; unwinding to the active recovery point")]
pub struct Thrown(());

/// Process-termination seam. Production code uses
/// [`ProcessTermination`]; tests substitute a double that panics so the
/// exit can be observed.
pub trait Termination {
    fn exit(&self, status: i32) -> !;
    fn abort(&self) -> !;
}

/// Terminates the real process.
#[derive(Copy, Clone, Debug, Default)]
pub struct ProcessTermination;

impl Termination for ProcessTermination {
    fn exit(&self, status: i32) -> ! {
        std::process::exit(status)
    }

    fn abort(&self) -> ! {
        std::process::abort()
    }
}

/// Proof that a recovery point is registered. Returned by
/// [`ReportEngine::push_recovery_point`] and surrendered to
/// [`ReportEngine::pop_recovery_point`].
#[must_use]
#[derive(Debug)]
pub struct RecoveryToken {
    depth: usize,
}

/// Engine state snapshotted around a redaction attempt, so a scan
/// failure can be absorbed without disturbing the caller's in-progress
/// report.
#[derive(Copy, Clone, Debug)]
pub(crate) struct RedactionCheckpoint {
    stack_len: usize,
    recursion_depth: u32,
    interrupt_holdoff: u32,
    callbacks: usize,
}

type ContextCallback = Box<dyn Fn() -> Option<String> + Send>;

/// One execution context's error-reporting state. Owned exclusively by
/// one connection or worker; nothing here is shared or locked.
pub struct ReportEngine {
    pub(crate) config: ReportConfig,
    pub(crate) session: SessionInfo,
    pub(crate) sinks: SinkSet,
    pub(crate) region: ErrorRegion,
    pub(crate) emit_state: EmitState,
    pub(crate) redacting: bool,
    termination: Box<dyn Termination + Send>,
    stack: Vec<ErrorRecord>,
    recursion_depth: u32,
    recovery_points: usize,
    critical_section: u32,
    interrupt_holdoff: u32,
    exiting: bool,
    statement: Option<String>,
    context_callbacks: Vec<ContextCallback>,
    fatal_cleanup: Option<Box<dyn FnMut() + Send>>,
    defer_client_flush: bool,
    // Set by the last delivered report when it asked to skip the
    // post-report interrupt check; holds until the next report opens.
    skip_interrupt_check: bool,
}

impl ReportEngine {
    pub fn new(config: ReportConfig, session: SessionInfo, sinks: SinkSet) -> Self {
        ReportEngine::with_termination(config, session, sinks, Box::new(ProcessTermination))
    }

    pub fn with_termination(
        config: ReportConfig,
        session: SessionInfo,
        sinks: SinkSet,
        termination: Box<dyn Termination + Send>,
    ) -> Self {
        ReportEngine {
            config,
            session,
            sinks,
            region: ErrorRegion::new(),
            emit_state: EmitState::default(),
            redacting: false,
            termination,
            stack: Vec::with_capacity(STACK_FRAMES_MAX),
            recursion_depth: 0,
            recovery_points: 0,
            critical_section: 0,
            interrupt_holdoff: 0,
            exiting: false,
            statement: None,
            context_callbacks: Vec::new(),
            fatal_cleanup: None,
            defer_client_flush: false,
            skip_interrupt_check: false,
        }
    }

    // --- frame lifecycle ---------------------------------------------

    /// Open a report frame. Returns false when the report can be
    /// rejected outright (sub-`Error` severity that no sink wants), in
    /// which case no frame exists and the caller must skip the setters
    /// and `finish_report`.
    pub fn begin_report(&mut self, severity: Severity, location: SourceLocation) -> bool {
        let os_error = current_os_error();
        let severity = self.escalate(severity);

        let output_to_server = severity.passes_log_floor(self.config.log_floor);
        let output_to_client = self.client_routing(severity);

        if severity < Severity::Error && !output_to_server && !output_to_client {
            return false;
        }

        if self.recursion_depth > 0 && severity >= Severity::Error {
            // Failing while reporting a failure: formatting scratch may
            // hold a half-built message, reclaim it before going on.
            self.region.reset();
            // Deep in recursion the likeliest culprits are the context
            // callbacks and a long captured statement; abandon both.
            if self.in_recursion_trouble() {
                self.context_callbacks.clear();
                self.statement = None;
            }
        }
        if self.stack.len() >= STACK_FRAMES_MAX {
            self.stack_overflow();
        }

        let mut record = ErrorRecord::new(severity, location, os_error);
        record.output_to_server = output_to_server;
        record.output_to_client = output_to_client;
        self.stack.push(record);
        self.skip_interrupt_check = false;
        true
    }

    /// Open a maintenance-progress report: `Info` severity with client
    /// delivery forced, so the requesting client always sees it.
    pub fn begin_verbose_report(&mut self, location: SourceLocation) -> bool {
        let has_channel = self.session.has_client && self.sinks.client.is_some();
        if !self.begin_report(Severity::Info, location) {
            return false;
        }
        if let Some(top) = self.stack.last_mut() {
            top.handle_in_client = true;
            top.output_to_client = top.output_to_client || has_channel;
        }
        true
    }

    /// Final severity after the mandatory escalations.
    fn escalate(&self, requested: Severity) -> Severity {
        if requested < Severity::Error {
            return requested;
        }
        let mut severity = requested;
        if self.critical_section > 0 {
            severity = Severity::Panic;
        }
        if severity == Severity::Error {
            if self.recovery_points == 0 || self.exiting {
                severity = Severity::Fatal;
            }
            if self.config.exit_on_any_error && self.session.role != ProcessRole::Postmaster {
                severity = if self.session.role.prefers_graceful_shutdown() {
                    Severity::Fatal
                } else {
                    Severity::Panic
                };
            }
        }
        // A report opened while a graver one is still pending can never
        // close below the pending one's severity. Runs after the
        // promotions so a pending Fatal cannot cap a forced Panic.
        for frame in &self.stack {
            if frame.severity > severity {
                severity = frame.severity;
            }
        }
        severity
    }

    fn client_routing(&self, severity: Severity) -> bool {
        if !self.session.has_client || self.sinks.client.is_none() {
            return false;
        }
        if self.session.role.suppresses_client_errors() {
            return false;
        }
        // Until authentication completes, and over relay connections,
        // only hard errors cross the wire.
        if severity < Severity::Error
            && (!self.session.client_auth_complete || self.session.from_relay)
        {
            return false;
        }
        // Info is by definition requested by the client.
        severity == Severity::Info || self.config.client_enabled(severity)
    }

    /// Close the top frame: run context callbacks, capture a backtrace
    /// if configured, fan out to the sinks, and take the exit the final
    /// severity demands. `Error` returns `Err(Thrown)` with the frame
    /// left in place for the recovery point.
    pub fn finish_report(&mut self) -> Result<(), Thrown> {
        debug_assert!(!self.stack.is_empty(), "finish_report without a frame");
        if self.stack.is_empty() {
            return Ok(());
        }
        self.recursion_depth += 1;

        if !self.in_recursion_trouble() {
            self.run_context_callbacks();
        }
        self.capture_backtrace();

        let severity = match self.stack.last() {
            Some(top) => top.severity,
            None => {
                self.recursion_depth -= 1;
                return Ok(());
            }
        };

        if severity == Severity::Error {
            // The non-local exit path: interrupts and critical sections
            // do not survive the unwind.
            self.interrupt_holdoff = 0;
            self.critical_section = 0;
            self.recursion_depth -= 1;
            return Err(Thrown(()));
        }

        let Some(mut record) = self.stack.pop() else {
            self.recursion_depth -= 1;
            return Ok(());
        };
        self.emit(&mut record);

        match record.severity {
            Severity::Fatal => {
                if let Some(mut cleanup) = self.fatal_cleanup.take() {
                    cleanup();
                }
                self.flush_sinks();
                self.termination.exit(1)
            }
            Severity::Panic => {
                let _ = self.sinks.console.flush();
                self.termination.abort()
            }
            _ => {
                self.skip_interrupt_check = record.ignore_interrupt;
                self.recursion_depth -= 1;
                Ok(())
            }
        }
    }

    /// `begin_report` + message + `finish_report` in one call, for
    /// simple diagnostics.
    pub fn report(
        &mut self,
        severity: Severity,
        location: SourceLocation,
        message: impl Into<String>,
    ) -> Result<(), Thrown> {
        if !self.begin_report(severity, location) {
            return Ok(());
        }
        self.set_message(message);
        self.finish_report()
    }

    fn run_context_callbacks(&mut self) {
        if self.context_callbacks.is_empty() {
            return;
        }
        // Newest callback first: innermost context is most specific.
        let mut lines: Vec<String> = Vec::new();
        for callback in self.context_callbacks.iter().rev() {
            if let Some(line) = callback() {
                lines.push(line);
            }
        }
        if lines.is_empty() {
            return;
        }
        if let Some(top) = self.stack.last_mut() {
            for line in lines {
                match top.context.as_mut() {
                    Some(context) => {
                        context.push('\n');
                        context.push_str(&line);
                    }
                    None => top.context = Some(line),
                }
            }
        }
    }

    fn capture_backtrace(&mut self) {
        let Some(floor) = self.config.backtrace_floor else {
            return;
        };
        if let Some(top) = self.stack.last_mut() {
            if top.severity >= floor && top.backtrace.is_none() {
                top.backtrace = Some(Backtrace::force_capture().to_string());
            }
        }
    }

    /// Fan the record out to the server log and the client channel.
    fn emit(&mut self, record: &mut ErrorRecord) {
        if record.output_to_server && self.config.log_enabled(record.severity, record.module) {
            let statement = self.statement_for_log(record);
            sink::send_to_server_log(
                &mut self.sinks,
                &mut self.emit_state,
                &mut self.region,
                &self.config,
                &self.session,
                record,
                statement.as_deref(),
            );
        }

        if (record.output_to_client || record.handle_in_client)
            && self.config.module_allows(record.severity, record.module)
        {
            if let Some(query) = record.internal_query.take() {
                let masked = redact::mask_statement(self, &query);
                record.internal_query = Some(masked.unwrap_or(query));
            }
            let code = internal_code::resolve(&self.config.internal_codes, record);
            let ascii_only = self.in_recursion_trouble();
            let verbosity = self.config.client_verbosity;
            // Retry coordination batches notices, never errors.
            let deferred = self.defer_client_flush && record.severity < Severity::Error;
            if let Some(channel) = self.sinks.client.as_deref_mut() {
                sink::client::emit(channel, verbosity, record, code, ascii_only);
                if !deferred {
                    channel.flush();
                }
            }
            // A Fatal send means the session is over; anything still
            // buffered must go out now, and so must whatever follows.
            if record.severity == Severity::Fatal {
                self.defer_client_flush = false;
            }
        }
    }

    /// The redacted statement to attach to a server log entry, or `None`
    /// when statement logging is off for this record.
    fn statement_for_log(&mut self, record: &ErrorRecord) -> Option<String> {
        if record.hide_statement || self.in_recursion_trouble() {
            return None;
        }
        if !record.severity.passes_log_floor(self.config.statement_floor) {
            return None;
        }
        let statement = self.statement.clone()?;
        let mut text = redact::mask_statement(self, &statement).unwrap_or(statement);
        if record.status_code == SqlState::SYNTAX_ERROR {
            // The offending text is quoted inside the message already;
            // keep the STATEMENT line single-line.
            text = text.replace('\n', "*");
        }
        Some(text)
    }

    /// Emit the pending `Error` frame from a recovery point, without
    /// popping it.
    pub fn emit_current_report(&mut self) {
        let Some(mut record) = self.stack.last().cloned() else {
            return;
        };
        self.emit(&mut record);
        // Keep the lazily-resolved code cached on the live frame.
        if let Some(top) = self.stack.last_mut() {
            top.internal_code = record.internal_code;
        }
    }

    fn flush_sinks(&mut self) {
        let _ = self.sinks.console.flush();
        if let Some(transport) = self.sinks.transport.as_deref_mut() {
            transport.flush();
        }
        if let Some(channel) = self.sinks.client.as_deref_mut() {
            channel.flush();
        }
    }

    /// The frame stack cannot grow further; the engine itself is broken.
    fn stack_overflow(&mut self) -> ! {
        self.stack.clear();
        let _ = self
            .sinks
            .console
            .write_all(b"PANIC:  error reporting stack overflow\n");
        let _ = self.sinks.console.flush();
        self.termination.abort()
    }

    // --- recovery ----------------------------------------------------

    /// Register a recovery point: a place prepared to catch [`Thrown`],
    /// retrieve the record, and restore its own state.
    pub fn push_recovery_point(&mut self) -> RecoveryToken {
        self.recovery_points += 1;
        RecoveryToken {
            depth: self.recovery_points,
        }
    }

    pub fn pop_recovery_point(&mut self, token: RecoveryToken) {
        debug_assert_eq!(
            token.depth, self.recovery_points,
            "recovery points popped out of order"
        );
        self.recovery_points = self.recovery_points.saturating_sub(1);
    }

    /// Deep copy of the pending frame, for recovery code that wants to
    /// inspect or re-raise it after `flush_state`.
    pub fn copy_record(&self) -> Option<ErrorRecord> {
        self.stack.last().cloned()
    }

    /// Reset the engine after recovery: all frames dropped, recursion
    /// cleared, formatting scratch shrunk back to its reserve.
    pub fn flush_state(&mut self) {
        self.stack.clear();
        self.recursion_depth = 0;
        self.redacting = false;
        self.skip_interrupt_check = false;
        self.region.reset_and_shrink();
    }

    /// Re-raise a copied `Error` record. With no recovery point left the
    /// record is promoted to `Fatal` in place, its routing recomputed,
    /// and finished (which does not return).
    pub fn rethrow(
        &mut self,
        mut record: ErrorRecord,
    ) -> Result<core::convert::Infallible, Thrown> {
        debug_assert_eq!(record.severity, Severity::Error, "rethrow of a non-error");
        if self.stack.len() >= STACK_FRAMES_MAX {
            self.stack_overflow();
        }
        if self.recovery_points == 0 {
            record.severity = Severity::Fatal;
            record.output_to_server = Severity::Fatal.passes_log_floor(self.config.log_floor);
            record.output_to_client = self.client_routing(Severity::Fatal);
            self.stack.push(record);
            // Fatal: exits the process (or unwinds the test double).
            let _ = self.finish_report();
        } else {
            self.stack.push(record);
        }
        Err(Thrown(()))
    }

    // --- counters and collaborators ----------------------------------

    /// Inside a critical section every `Error` becomes `Panic`; shared
    /// state is mid-change and cannot be trusted for recovery.
    pub fn enter_critical_section(&mut self) {
        self.critical_section += 1;
    }

    pub fn exit_critical_section(&mut self) {
        debug_assert!(self.critical_section > 0);
        self.critical_section = self.critical_section.saturating_sub(1);
    }

    pub fn hold_interrupts(&mut self) {
        self.interrupt_holdoff += 1;
    }

    pub fn resume_interrupts(&mut self) {
        debug_assert!(self.interrupt_holdoff > 0);
        self.interrupt_holdoff = self.interrupt_holdoff.saturating_sub(1);
    }

    /// Whether a caller may act on a pending cancel request: never while
    /// interrupts are held, a critical section is open, or this engine
    /// is itself mid-report.
    pub fn interrupts_ok(&self) -> bool {
        self.interrupt_holdoff == 0
            && self.critical_section == 0
            && self.recursion_depth == 0
            && !self.skip_interrupt_check
    }

    /// Mark session shutdown in progress: further `Error` reports are
    /// promoted to `Fatal`, since there is nothing left to recover to.
    pub fn begin_exit(&mut self) {
        self.exiting = true;
    }

    pub fn set_statement(&mut self, statement: Option<String>) {
        self.statement = statement;
    }

    pub fn statement(&self) -> Option<&str> {
        self.statement.as_deref()
    }

    pub fn push_context_callback(
        &mut self,
        callback: impl Fn() -> Option<String> + Send + 'static,
    ) {
        self.context_callbacks.push(Box::new(callback));
    }

    pub fn pop_context_callback(&mut self) {
        self.context_callbacks.pop();
    }

    /// Hook run once on the `Fatal` path before sinks are flushed, for
    /// releasing resources that must not outlive the session.
    pub fn on_fatal_cleanup(&mut self, cleanup: impl FnMut() + Send + 'static) {
        self.fatal_cleanup = Some(Box::new(cleanup));
    }

    /// Under retry coordination, client notices are encoded but not
    /// flushed until [`ReportEngine::flush_client`].
    pub fn set_defer_client_flush(&mut self, defer: bool) {
        self.defer_client_flush = defer;
    }

    pub fn flush_client(&mut self) {
        if let Some(channel) = self.sinks.client.as_deref_mut() {
            channel.flush();
        }
    }

    /// Redact password-class literals out of `statement`. `None` means
    /// nothing needed masking or the text could not be scanned.
    pub fn redact_statement(&mut self, statement: &str) -> Option<String> {
        redact::mask_statement(self, statement)
    }

    pub fn config(&self) -> &ReportConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ReportConfig {
        &mut self.config
    }

    pub fn session(&self) -> &SessionInfo {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut SessionInfo {
        &mut self.session
    }

    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    pub fn recursion_depth(&self) -> u32 {
        self.recursion_depth
    }

    pub(crate) fn in_recursion_trouble(&self) -> bool {
        self.recursion_depth > RECURSION_TROUBLE_DEPTH
    }

    // --- field setters (apply to the top frame) ----------------------

    fn top(&mut self) -> Option<&mut ErrorRecord> {
        debug_assert!(!self.stack.is_empty(), "setter without an open frame");
        self.stack.last_mut()
    }

    /// Set the primary message. `%m` expands to the OS error captured at
    /// `begin_report`; `%%` is a literal percent.
    pub fn set_message(&mut self, text: impl Into<String>) {
        let text = text.into();
        if let Some(top) = self.top() {
            top.message = Some(expand_os_error(&text, top.os_error));
        }
    }

    pub fn set_detail(&mut self, text: impl Into<String>) {
        let text = text.into();
        if let Some(top) = self.top() {
            top.detail = Some(expand_os_error(&text, top.os_error));
        }
    }

    /// Server-log-only detail; preferred over the plain detail there.
    pub fn set_detail_log(&mut self, text: impl Into<String>) {
        let text = text.into();
        if let Some(top) = self.top() {
            top.detail_log = Some(expand_os_error(&text, top.os_error));
        }
    }

    pub fn set_hint(&mut self, text: impl Into<String>) {
        let text = text.into();
        if let Some(top) = self.top() {
            top.hint = Some(expand_os_error(&text, top.os_error));
        }
    }

    /// Append a context line (most recent last; callbacks prepend their
    /// own lines at finish time).
    pub fn append_context(&mut self, text: impl Into<String>) {
        let text = text.into();
        if let Some(top) = self.top() {
            let line = expand_os_error(&text, top.os_error);
            match top.context.as_mut() {
                Some(context) => {
                    context.push('\n');
                    context.push_str(&line);
                }
                None => top.context = Some(line),
            }
        }
    }

    pub fn set_status_code(&mut self, code: SqlState) {
        if let Some(top) = self.top() {
            top.status_code = code;
        }
    }

    pub fn set_module(&mut self, module: ModuleId) {
        if let Some(top) = self.top() {
            top.module = module;
        }
    }

    pub fn set_cursor_position(&mut self, position: u32) {
        if let Some(top) = self.top() {
            top.cursor_position = Some(position);
        }
    }

    pub fn set_internal_position(&mut self, position: u32) {
        if let Some(top) = self.top() {
            top.internal_position = Some(position);
        }
    }

    pub fn set_internal_query(&mut self, query: impl Into<String>) {
        let query = query.into();
        if let Some(top) = self.top() {
            top.internal_query = Some(query);
        }
    }

    pub fn set_hide_statement(&mut self, hide: bool) {
        if let Some(top) = self.top() {
            top.hide_statement = hide;
        }
    }

    /// Ask the caller's post-report interrupt check to stand down once.
    /// Used by reports raised from code that cannot tolerate a cancel
    /// firing right after delivery.
    pub fn set_ignore_interrupt(&mut self, ignore: bool) {
        if let Some(top) = self.top() {
            top.ignore_interrupt = ignore;
        }
    }

    /// Force client delivery of this report as an out-of-band notice.
    pub fn set_handle_in_client(&mut self, handle: bool) {
        let has_channel = self.session.has_client && self.sinks.client.is_some();
        if let Some(top) = self.top() {
            top.handle_in_client = handle;
            if handle {
                top.output_to_client = top.output_to_client || has_channel;
            }
        }
    }

    // --- redaction absorption ----------------------------------------

    pub(crate) fn save_for_redaction(&self) -> RedactionCheckpoint {
        RedactionCheckpoint {
            stack_len: self.stack.len(),
            recursion_depth: self.recursion_depth,
            interrupt_holdoff: self.interrupt_holdoff,
            callbacks: self.context_callbacks.len(),
        }
    }

    pub(crate) fn restore_after_redaction(&mut self, checkpoint: RedactionCheckpoint) {
        self.stack.truncate(checkpoint.stack_len);
        self.recursion_depth = checkpoint.recursion_depth;
        self.interrupt_holdoff = checkpoint.interrupt_holdoff;
        self.context_callbacks.truncate(checkpoint.callbacks);
    }
}

impl core::fmt::Debug for ReportEngine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ReportEngine")
            .field("stack_depth", &self.stack.len())
            .field("recursion_depth", &self.recursion_depth)
            .field("recovery_points", &self.recovery_points)
            .field("critical_section", &self.critical_section)
            .field("interrupt_holdoff", &self.interrupt_holdoff)
            .finish_non_exhaustive()
    }
}

/// Last-resort failure path for code that runs before any engine (or
/// sink) exists: write to the raw diagnostic channel and terminate.
pub fn startup_failure(location: SourceLocation, message: &str) -> ! {
    let mut stderr = std::io::stderr();
    let _ = writeln!(
        stderr,
        "FATAL:  {message} ({}:{})",
        location.file_name(),
        location.line
    );
    let _ = stderr.flush();
    std::process::exit(2)
}

#[cfg(test)]
mod tests;
