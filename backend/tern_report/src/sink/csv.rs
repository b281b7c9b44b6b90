//! CSV log line assembly.
//!
//! One record per line, 25 comma-separated columns, in the fixed order
//! the log analyzer expects:
//!
//! log time, node name, user name, database name, process id,
//! connection from, session id, per-destination line number, command tag,
//! session start time, transaction id, query id, module, severity,
//! SQLSTATE, message, detail, hint, internal query, internal query
//! position, context, statement, statement position, raise location,
//! application name.

use core::fmt::Write as _;

use chrono::Local;

use crate::record::ErrorRecord;
use crate::session::SessionInfo;

#[cfg(test)]
const COLUMN_COUNT: usize = 25;

/// Append one full CSV record (trailing newline included) to `out`.
pub(crate) fn append_line(
    out: &mut String,
    session: &SessionInfo,
    record: &ErrorRecord,
    statement: Option<&str>,
    line_number: u64,
) {
    push_field(out, &Local::now().format("%Y-%m-%d %H:%M:%S%.3f %Z").to_string());
    out.push(',');
    push_field(out, &session.node_name);
    out.push(',');
    push_field(out, &session.user_name);
    out.push(',');
    push_field(out, &session.database_name);
    out.push(',');
    let _ = write!(out, "{}", session.process_id);
    out.push(',');
    if session.has_client {
        let mut endpoint = session.remote_host.clone();
        if !session.remote_port.is_empty() {
            let _ = write!(endpoint, ":{}", session.remote_port);
        }
        push_field(out, &endpoint);
    }
    out.push(',');
    let _ = write!(out, "{:x}.{:x}", session.session_start.timestamp(), session.process_id);
    out.push(',');
    let _ = write!(out, "{line_number}");
    out.push(',');
    push_field(out, &session.command_tag);
    out.push(',');
    push_field(out, &session.session_start.format("%Y-%m-%d %H:%M:%S %Z").to_string());
    out.push(',');
    let _ = write!(out, "{}", session.transaction_id);
    out.push(',');
    let _ = write!(out, "{}", session.query_id);
    out.push(',');
    push_field(out, record.module.as_str());
    out.push(',');
    out.push_str(record.severity.as_str());
    out.push(',');
    out.push_str(record.status_code.as_str());
    out.push(',');
    push_field(out, record.message_text());
    out.push(',');
    push_opt(out, record.detail_for_log());
    out.push(',');
    push_opt(out, record.hint.as_deref());
    out.push(',');
    push_opt(out, record.internal_query.as_deref());
    out.push(',');
    push_opt_num(out, record.internal_position);
    out.push(',');
    push_opt(out, record.context.as_deref());
    out.push(',');
    push_opt(out, statement);
    out.push(',');
    push_opt_num(out, statement.and(record.cursor_position));
    out.push(',');
    let location = format!(
        "{}, {}:{}",
        record.location.function,
        record.location.file_name(),
        record.location.line
    );
    push_field(out, &location);
    out.push(',');
    push_field(out, &session.application_name);
    out.push('\n');
}

fn push_opt(out: &mut String, value: Option<&str>) {
    if let Some(value) = value {
        push_field(out, value);
    }
}

fn push_opt_num(out: &mut String, value: Option<u32>) {
    if let Some(value) = value {
        let _ = write!(out, "{value}");
    }
}

/// Append one field, quoting it if it contains a comma, quote, or
/// line break. Embedded quotes are doubled.
fn push_field(out: &mut String, value: &str) {
    let needs_quoting = value
        .chars()
        .any(|c| matches!(c, ',' | '"' | '\n' | '\r'));
    if !needs_quoting {
        out.push_str(value);
        return;
    }
    out.push('"');
    for c in value.chars() {
        if c == '"' {
            out.push('"');
        }
        out.push(c);
    }
    out.push('"');
}
