//! Server log message assembly and destination fan-out.

use core::fmt::Write as _;
use std::io::Write as _;

use crate::config::{Destination, ReportConfig, Verbosity};
use crate::line_prefix;
use crate::record::ErrorRecord;
use crate::region::ErrorRegion;
use crate::session::SessionInfo;
use crate::sink::{csv, pipe, syslog, EmitState, SinkSet};

/// Format one record and write it to every enabled server log
/// destination.
///
/// `statement` is the active statement text, already redacted by the
/// caller; `None` suppresses the `STATEMENT:` part.
#[expect(clippy::too_many_arguments, reason = "Split borrows of the engine")]
pub(crate) fn send_to_server_log(
    sinks: &mut SinkSet,
    emit_state: &mut EmitState,
    region: &mut ErrorRegion,
    config: &ReportConfig,
    session: &SessionInfo,
    record: &ErrorRecord,
    statement: Option<&str>,
) {
    emit_state.log_line_number += 1;
    let line_number = emit_state.log_line_number;

    let mut buf = region.take();
    let prefix = |buf: &mut String| {
        line_prefix::append(buf, &config.line_prefix, session, record, line_number);
    };

    prefix(&mut buf);
    let _ = write!(buf, "{}:  ", record.severity);
    append_with_tabs(&mut buf, record.message_text());
    buf.push('\n');

    if config.log_verbosity != Verbosity::Terse {
        if let Some(detail) = record.detail_for_log() {
            prefix(&mut buf);
            buf.push_str("DETAIL:  ");
            append_with_tabs(&mut buf, detail);
            buf.push('\n');
        }
        if let Some(hint) = record.hint.as_deref() {
            prefix(&mut buf);
            buf.push_str("HINT:  ");
            append_with_tabs(&mut buf, hint);
            buf.push('\n');
        }
        if let Some(query) = record.internal_query.as_deref() {
            prefix(&mut buf);
            buf.push_str("QUERY:  ");
            append_with_tabs(&mut buf, query);
            buf.push('\n');
        }
        if let Some(context) = record.context.as_deref() {
            prefix(&mut buf);
            buf.push_str("CONTEXT:  ");
            append_with_tabs(&mut buf, context);
            buf.push('\n');
        }
        if let Some(backtrace) = record.backtrace.as_deref() {
            prefix(&mut buf);
            buf.push_str("BACKTRACE:  ");
            append_with_tabs(&mut buf, backtrace);
            buf.push('\n');
        }
    }
    if config.log_verbosity == Verbosity::Verbose {
        prefix(&mut buf);
        let _ = writeln!(
            buf,
            "LOCATION:  {}, {}:{}",
            record.location.function,
            record.location.file_name(),
            record.location.line
        );
    }
    if let Some(statement) = statement {
        prefix(&mut buf);
        buf.push_str("STATEMENT:  ");
        append_with_tabs(&mut buf, statement);
        buf.push('\n');
    }

    if config.destinations.contains(Destination::SYSLOG) {
        if let Some(writer) = sinks.syslog.as_deref_mut() {
            emit_state.syslog_message_id += 1;
            syslog::emit(writer, record.severity, emit_state.syslog_message_id, &buf);
        }
    }

    let mut stderr_written = false;
    if config.destinations.contains(Destination::STDERR) {
        match sinks.transport.as_deref_mut() {
            Some(transport) if config.collector_active => {
                pipe::write_chunks(transport, session.process_id, buf.as_bytes(), false);
            }
            _ => {
                write_console(sinks, &buf);
            }
        }
        stderr_written = true;
    }

    if config.destinations.contains(Destination::CSVLOG) {
        match sinks.transport.as_deref_mut() {
            Some(transport) if config.collector_active => {
                emit_state.csv_line_number += 1;
                let mut line = String::with_capacity(buf.len() + 128);
                csv::append_line(
                    &mut line,
                    session,
                    record,
                    statement,
                    emit_state.csv_line_number,
                );
                pipe::write_chunks(transport, session.process_id, line.as_bytes(), true);
            }
            _ => {
                // No collector to build the CSV file; fall back to the
                // plain rendition unless stderr already carried it.
                if !stderr_written {
                    write_console(sinks, &buf);
                }
            }
        }
    }

    region.put_back(buf);
}

/// Append `text` with a tab after every embedded newline, so a
/// continuation line cannot be mistaken for the start of a new entry.
fn append_with_tabs(buf: &mut String, text: &str) {
    for ch in text.chars() {
        buf.push(ch);
        if ch == '\n' {
            buf.push('\t');
        }
    }
}

/// Best-effort console write. A failing stderr must never turn into a
/// further error report.
fn write_console(sinks: &mut SinkSet, text: &str) {
    let _ = sinks.console.write_all(text.as_bytes());
    let _ = sinks.console.flush();
}
