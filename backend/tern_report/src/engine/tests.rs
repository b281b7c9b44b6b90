#![expect(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]

use std::any::Any;
use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq;

use super::*;
use crate::here;
use crate::sink::{ClientChannel, MessageKind};

/// Console double that stays inspectable after the engine takes
/// ownership of its clone.
#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Client double recording one line per protocol event.
#[derive(Clone, Default)]
struct SharedClient(Arc<Mutex<Vec<String>>>);

impl SharedClient {
    fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

impl ClientChannel for SharedClient {
    fn begin(&mut self, kind: MessageKind) {
        self.0.lock().unwrap().push(format!("begin:{kind:?}"));
    }
    fn field(&mut self, tag: u8, value: &str) {
        self.0.lock().unwrap().push(format!("{}={value}", tag as char));
    }
    fn raw(&mut self, text: &str) {
        self.0.lock().unwrap().push(format!("raw:{text}"));
    }
    fn end(&mut self) {
        self.0.lock().unwrap().push("end".to_owned());
    }
    fn flush(&mut self) {
        self.0.lock().unwrap().push("flush".to_owned());
    }
}

/// Termination double: panics so tests can observe the exit with
/// `catch_unwind`.
struct PanicExit;

impl Termination for PanicExit {
    fn exit(&self, status: i32) -> ! {
        panic!("exit({status})")
    }

    fn abort(&self) -> ! {
        panic!("abort")
    }
}

fn engine_with(config: ReportConfig) -> (ReportEngine, SharedBuf) {
    let buf = SharedBuf::default();
    let engine = ReportEngine::with_termination(
        config,
        SessionInfo::default(),
        SinkSet::console_only(Box::new(buf.clone())),
        Box::new(PanicExit),
    );
    (engine, buf)
}

fn test_engine() -> (ReportEngine, SharedBuf) {
    engine_with(ReportConfig::default())
}

fn with_client(mut engine: ReportEngine) -> (ReportEngine, SharedClient) {
    let client = SharedClient::default();
    engine.sinks.client = Some(Box::new(client.clone()));
    engine.session.has_client = true;
    engine.session.client_auth_complete = true;
    (engine, client)
}

fn unwind_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(s) => *s,
        Err(payload) => payload
            .downcast::<&str>()
            .map(|s| (*s).to_owned())
            .unwrap_or_default(),
    }
}

#[test]
fn warning_reaches_the_console() {
    let (mut engine, buf) = test_engine();
    engine
        .report(Severity::Warning, here!(), "disk 90%% full")
        .unwrap();
    assert_eq!(buf.contents(), "0 [UNKNOWN] WARNING:  disk 90% full\n");
    assert_eq!(engine.stack_depth(), 0);
}

#[test]
fn fast_reject_pushes_no_frame() {
    let (mut engine, buf) = engine_with(ReportConfig {
        log_floor: Severity::Panic,
        ..ReportConfig::default()
    });
    assert!(!engine.begin_report(Severity::Notice, here!()));
    assert_eq!(engine.stack_depth(), 0);
    assert_eq!(buf.contents(), "");
}

#[test]
fn error_throws_and_leaves_the_frame_pending() {
    let (mut engine, _) = test_engine();
    let rp = engine.push_recovery_point();

    assert!(engine.begin_report(Severity::Error, here!()));
    engine.set_message("division by zero");
    assert_eq!(engine.finish_report(), Err(Thrown(())));
    assert_eq!(engine.stack_depth(), 1);

    let record = engine.copy_record().unwrap();
    assert_eq!(record.severity, Severity::Error);
    assert_eq!(record.message.as_deref(), Some("division by zero"));

    engine.flush_state();
    engine.pop_recovery_point(rp);
    assert_eq!(engine.stack_depth(), 0);
    assert_eq!(engine.recursion_depth(), 0);
}

#[test]
fn error_without_a_recovery_point_exits_as_fatal() {
    let (mut engine, buf) = test_engine();
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        assert!(engine.begin_report(Severity::Error, here!()));
        engine.set_message("unhandled");
        let _ = engine.finish_report();
    }));
    let message = unwind_message(outcome.unwrap_err());
    assert_eq!(message, "exit(1)");
    assert!(buf.contents().contains("FATAL:  unhandled"));
}

#[test]
fn critical_section_promotes_errors_to_panic() {
    let (mut engine, _) = test_engine();
    let rp = engine.push_recovery_point();
    engine.enter_critical_section();

    assert!(engine.begin_report(Severity::Error, here!()));
    assert_eq!(engine.copy_record().unwrap().severity, Severity::Panic);

    engine.flush_state();
    engine.exit_critical_section();
    engine.pop_recovery_point(rp);
}

#[test]
fn a_pending_graver_frame_escalates_new_reports() {
    let (mut engine, _) = test_engine();
    let rp = engine.push_recovery_point();

    assert!(engine.begin_report(Severity::Fatal, here!()));
    assert!(engine.begin_report(Severity::Error, here!()));
    assert_eq!(engine.copy_record().unwrap().severity, Severity::Fatal);

    engine.flush_state();
    engine.pop_recovery_point(rp);
}

#[test]
fn exit_on_any_error_forces_the_hard_path() {
    let (mut engine, _) = engine_with(ReportConfig {
        exit_on_any_error: true,
        ..ReportConfig::default()
    });
    let rp = engine.push_recovery_point();
    assert!(engine.begin_report(Severity::Error, here!()));
    assert_eq!(engine.copy_record().unwrap().severity, Severity::Panic);
    engine.flush_state();

    // Writer-class processes get the graceful variant so buffers flush.
    engine.session_mut().role = crate::session::ProcessRole::Checkpointer;
    assert!(engine.begin_report(Severity::Error, here!()));
    assert_eq!(engine.copy_record().unwrap().severity, Severity::Fatal);
    engine.flush_state();
    engine.pop_recovery_point(rp);
}

#[test]
fn frame_stack_overflow_aborts() {
    let (mut engine, _) = test_engine();
    let rp = engine.push_recovery_point();
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        for _ in 0..=STACK_FRAMES_MAX {
            assert!(engine.begin_report(Severity::Warning, here!()));
        }
    }));
    assert_eq!(unwind_message(outcome.unwrap_err()), "abort");
    engine.pop_recovery_point(rp);
}

#[test]
fn context_callbacks_run_newest_first() {
    let (mut engine, buf) = test_engine();
    engine.push_context_callback(|| Some("outer scope".to_owned()));
    engine.push_context_callback(|| Some("inner scope".to_owned()));
    engine.report(Severity::Warning, here!(), "w").unwrap();
    assert!(buf
        .contents()
        .contains("CONTEXT:  inner scope\nouter scope\n"));
}

#[test]
fn statement_is_redacted_in_the_log() {
    let (mut engine, buf) = test_engine();
    engine.set_statement(Some("CREATE USER alice PASSWORD 'Secret123';".to_owned()));
    let rp = engine.push_recovery_point();

    assert!(engine.begin_report(Severity::Error, here!()));
    engine.set_message("role exists");
    assert!(engine.finish_report().is_err());
    engine.emit_current_report();

    let log = buf.contents();
    assert!(log.contains("ERROR:  role exists"));
    assert!(log.contains("STATEMENT:  CREATE USER alice PASSWORD '********';"));
    assert!(!log.contains("Secret123"));

    engine.flush_state();
    engine.pop_recovery_point(rp);
}

#[test]
fn syntax_errors_keep_the_statement_single_line() {
    let (mut engine, buf) = test_engine();
    engine.set_statement(Some("SELECT\n1".to_owned()));
    let rp = engine.push_recovery_point();

    assert!(engine.begin_report(Severity::Error, here!()));
    engine.set_status_code(SqlState::SYNTAX_ERROR);
    engine.set_message("syntax error");
    assert!(engine.finish_report().is_err());
    engine.emit_current_report();

    assert!(buf.contents().contains("STATEMENT:  SELECT*1\n"));
    engine.flush_state();
    engine.pop_recovery_point(rp);
}

#[test]
fn hide_statement_suppresses_the_statement_line() {
    let (mut engine, buf) = test_engine();
    engine.set_statement(Some("SELECT 1".to_owned()));
    let rp = engine.push_recovery_point();

    assert!(engine.begin_report(Severity::Error, here!()));
    engine.set_message("boom");
    engine.set_hide_statement(true);
    assert!(engine.finish_report().is_err());
    engine.emit_current_report();

    assert!(!buf.contents().contains("STATEMENT:"));
    engine.flush_state();
    engine.pop_recovery_point(rp);
}

#[test]
fn recursion_trouble_drops_statement_and_context_but_still_emits() {
    let (mut engine, buf) = engine_with(ReportConfig {
        statement_floor: Severity::Debug5,
        ..ReportConfig::default()
    });
    engine.set_statement(Some("SELECT 1".to_owned()));
    engine.push_context_callback(|| Some("while testing".to_owned()));
    engine.recursion_depth = 3;

    engine
        .report(Severity::Warning, here!(), "still reporting")
        .unwrap();

    let log = buf.contents();
    assert!(log.contains("WARNING:  still reporting"));
    assert!(!log.contains("STATEMENT:"));
    assert!(!log.contains("CONTEXT:"));
    assert_eq!(engine.recursion_depth(), 3);
}

#[test]
fn fatal_cleanup_hook_runs_before_exit() {
    let (mut engine, _) = test_engine();
    let ran = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&ran);
    engine.on_fatal_cleanup(move || flag.store(true, Ordering::SeqCst));

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let _ = engine.report(Severity::Fatal, here!(), "shutting down");
    }));
    assert_eq!(unwind_message(outcome.unwrap_err()), "exit(1)");
    assert!(ran.load(Ordering::SeqCst));
}

#[test]
fn copy_record_is_a_deep_copy() {
    let (mut engine, _) = test_engine();
    let rp = engine.push_recovery_point();

    assert!(engine.begin_report(Severity::Error, here!()));
    engine.set_message("original");
    engine.set_detail("with detail");
    assert!(engine.finish_report().is_err());

    let copy = engine.copy_record().unwrap();
    engine.flush_state();
    assert_eq!(copy.message.as_deref(), Some("original"));
    assert_eq!(copy.detail.as_deref(), Some("with detail"));

    engine.pop_recovery_point(rp);
}

#[test]
fn rethrow_with_a_recovery_point_rethrows() {
    let (mut engine, _) = test_engine();
    let rp = engine.push_recovery_point();

    assert!(engine.begin_report(Severity::Error, here!()));
    engine.set_message("first pass");
    assert!(engine.finish_report().is_err());
    let record = engine.copy_record().unwrap();
    engine.flush_state();

    assert_eq!(engine.rethrow(record), Err(Thrown(())));
    assert_eq!(engine.stack_depth(), 1);

    engine.flush_state();
    engine.pop_recovery_point(rp);
}

#[test]
fn rethrow_with_no_recovery_point_promotes_to_fatal() {
    let (mut engine, buf) = test_engine();
    let rp = engine.push_recovery_point();
    assert!(engine.begin_report(Severity::Error, here!()));
    engine.set_message("cannot continue");
    assert!(engine.finish_report().is_err());
    let record = engine.copy_record().unwrap();
    engine.flush_state();
    engine.pop_recovery_point(rp);

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let _ = engine.rethrow(record);
    }));
    assert_eq!(unwind_message(outcome.unwrap_err()), "exit(1)");
    assert!(buf.contents().contains("FATAL:  cannot continue"));
}

#[test]
fn verbose_reports_force_client_delivery() {
    let (engine, _) = test_engine();
    let (mut engine, client) = with_client(engine);

    assert!(engine.begin_verbose_report(here!()));
    engine.set_message("vacuuming \"t\"");
    engine.finish_report().unwrap();

    let events = client.events();
    assert!(events.contains(&"begin:Notice".to_owned()));
    assert!(events.contains(&"S=INFO".to_owned()));
    assert!(events.contains(&"M=vacuuming \"t\"".to_owned()));
    assert!(events.contains(&"flush".to_owned()));
}

#[test]
fn pre_auth_clients_see_errors_only() {
    let (engine, _) = test_engine();
    let (mut engine, client) = with_client(engine);
    engine.session_mut().client_auth_complete = false;

    engine.report(Severity::Notice, here!(), "settings loaded").unwrap();
    assert_eq!(client.events(), Vec::<String>::new());

    let rp = engine.push_recovery_point();
    assert!(engine.begin_report(Severity::Error, here!()));
    engine.set_message("password authentication failed");
    assert!(engine.finish_report().is_err());
    engine.emit_current_report();
    assert!(client.events().contains(&"S=ERROR".to_owned()));

    engine.flush_state();
    engine.pop_recovery_point(rp);
}

#[test]
fn relay_connections_suppress_notices() {
    let (engine, _) = test_engine();
    let (mut engine, client) = with_client(engine);
    engine.session_mut().from_relay = true;

    engine.report(Severity::Notice, here!(), "chatter").unwrap();
    assert_eq!(client.events(), Vec::<String>::new());
}

#[test]
fn deferred_client_flush_waits_for_the_sync_point() {
    let (engine, _) = test_engine();
    let (mut engine, client) = with_client(engine);
    engine.set_defer_client_flush(true);

    engine.report(Severity::Notice, here!(), "buffered").unwrap();
    let events = client.events();
    assert!(events.contains(&"M=buffered".to_owned()));
    assert!(!events.contains(&"flush".to_owned()));

    engine.flush_client();
    assert!(client.events().contains(&"flush".to_owned()));
}

#[test]
fn internal_code_is_resolved_lazily_and_cached() {
    let location = SourceLocation {
        file: "executor.rs",
        line: 10,
        function: "run",
    };
    let mut config = ReportConfig::default();
    config.internal_codes.insert(("executor.rs", 10), 4242);

    let (engine, _) = engine_with(config);
    let (mut engine, client) = with_client(engine);
    let rp = engine.push_recovery_point();

    assert!(engine.begin_report(Severity::Error, location));
    engine.set_message("boom");
    assert!(engine.finish_report().is_err());
    assert_eq!(engine.copy_record().unwrap().internal_code, None);

    engine.emit_current_report();
    assert!(client.events().contains(&"c=4242".to_owned()));
    assert_eq!(engine.copy_record().unwrap().internal_code, Some(4242));

    engine.flush_state();
    engine.pop_recovery_point(rp);
}

#[test]
fn percent_m_expands_in_setters() {
    let (mut engine, buf) = test_engine();
    assert!(engine.begin_report(Severity::Warning, here!()));
    engine.set_message("could not open control file: %m");
    engine.finish_report().unwrap();
    let line = buf.contents();
    assert!(!line.contains("%m"));
    assert!(line.starts_with("0 [UNKNOWN] WARNING:  could not open control file: "));
}

#[test]
fn interrupt_gating() {
    let (mut engine, _) = test_engine();
    assert!(engine.interrupts_ok());
    engine.hold_interrupts();
    assert!(!engine.interrupts_ok());
    engine.resume_interrupts();
    engine.enter_critical_section();
    assert!(!engine.interrupts_ok());
    engine.exit_critical_section();
    assert!(engine.interrupts_ok());
}

#[test]
fn error_finish_clears_holdoff_and_critical_counters() {
    let (mut engine, _) = test_engine();
    let rp = engine.push_recovery_point();
    engine.hold_interrupts();

    assert!(engine.begin_report(Severity::Error, here!()));
    engine.set_message("x");
    assert!(engine.finish_report().is_err());
    // The unwind path must not leave interrupts held.
    engine.flush_state();
    assert!(engine.interrupts_ok());
    engine.pop_recovery_point(rp);
}

#[test]
fn module_floor_gates_the_client_channel_too() {
    let mut config = ReportConfig::default();
    config
        .module_floors
        .insert(ModuleId::Executor, Severity::Error);
    let (engine, _) = engine_with(config);
    let (mut engine, client) = with_client(engine);

    assert!(engine.begin_report(Severity::Notice, here!()));
    engine.set_module(ModuleId::Executor);
    engine.set_message("row estimate off");
    engine.finish_report().unwrap();
    assert_eq!(client.events(), Vec::<String>::new());

    // An unlisted module is untouched by the override.
    engine.report(Severity::Notice, here!(), "loaded").unwrap();
    assert!(client.events().contains(&"M=loaded".to_owned()));
}

#[test]
fn retry_mode_still_flushes_errors_immediately() {
    let (engine, _) = test_engine();
    let (mut engine, client) = with_client(engine);
    engine.set_defer_client_flush(true);
    let rp = engine.push_recovery_point();

    assert!(engine.begin_report(Severity::Error, here!()));
    engine.set_message("deadlock detected");
    assert!(engine.finish_report().is_err());
    engine.emit_current_report();

    let events = client.events();
    assert!(events.contains(&"M=deadlock detected".to_owned()));
    assert!(events.contains(&"flush".to_owned()));

    engine.flush_state();
    engine.pop_recovery_point(rp);
}

#[test]
fn a_fatal_report_forces_the_client_flush() {
    let (engine, _) = test_engine();
    let (mut engine, client) = with_client(engine);
    engine.set_defer_client_flush(true);

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let _ = engine.report(Severity::Fatal, here!(), "terminating connection");
    }));
    assert_eq!(unwind_message(outcome.unwrap_err()), "exit(1)");
    assert!(client.events().contains(&"flush".to_owned()));
}

#[test]
fn multiline_parts_get_tab_continuations() {
    let (mut engine, buf) = test_engine();
    assert!(engine.begin_report(Severity::Warning, here!()));
    engine.set_message("first line\nsecond line");
    engine.set_detail("one\ntwo");
    engine.finish_report().unwrap();

    let log = buf.contents();
    assert!(log.contains("WARNING:  first line\n\tsecond line\n"));
    assert!(log.contains("DETAIL:  one\n\ttwo\n"));
}

#[test]
fn ignore_interrupt_suppresses_the_post_report_check() {
    let (mut engine, _) = test_engine();
    assert!(engine.begin_report(Severity::Warning, here!()));
    engine.set_message("conflict with recovery");
    engine.set_ignore_interrupt(true);
    engine.finish_report().unwrap();
    assert!(!engine.interrupts_ok());

    // The suppression lasts for one report only.
    engine.report(Severity::Warning, here!(), "next").unwrap();
    assert!(engine.interrupts_ok());
}

#[test]
fn reentrant_errors_drop_context_sources_at_open() {
    let (mut engine, _) = test_engine();
    let rp = engine.push_recovery_point();
    engine.set_statement(Some("SELECT 1".to_owned()));
    engine.push_context_callback(|| Some("while testing".to_owned()));
    engine.recursion_depth = 3;

    assert!(engine.begin_report(Severity::Error, here!()));
    assert!(engine.statement().is_none());
    assert!(engine.context_callbacks.is_empty());

    engine.flush_state();
    engine.pop_recovery_point(rp);
}

#[test]
fn pending_fatal_does_not_cap_a_forced_panic() {
    let (mut engine, _) = engine_with(ReportConfig {
        exit_on_any_error: true,
        ..ReportConfig::default()
    });
    let rp = engine.push_recovery_point();

    assert!(engine.begin_report(Severity::Fatal, here!()));
    assert!(engine.begin_report(Severity::Error, here!()));
    assert_eq!(engine.copy_record().unwrap().severity, Severity::Panic);

    engine.flush_state();
    engine.pop_recovery_point(rp);
}

#[test]
fn session_exit_promotes_errors_to_fatal() {
    let (mut engine, _) = test_engine();
    let rp = engine.push_recovery_point();
    engine.begin_exit();
    assert!(engine.begin_report(Severity::Error, here!()));
    assert_eq!(engine.copy_record().unwrap().severity, Severity::Fatal);
    engine.flush_state();
    engine.pop_recovery_point(rp);
}
