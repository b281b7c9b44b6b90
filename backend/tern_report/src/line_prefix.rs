//! Log line prefix expansion.
//!
//! The prefix template is a string with `%`-codes, expanded once per
//! emitted log line. Unknown codes expand to nothing, and `%q` truncates
//! the rest of the template for processes with no connected client, so
//! operators can write one template that works for backends and
//! background processes alike. The query id and `[module]` tag follow
//! the template unconditionally; log analyzers key on them.

use chrono::Local;

use crate::record::ErrorRecord;
use crate::session::SessionInfo;

/// Append the expanded prefix for one log line to `out`.
///
/// `line_number` is the per-destination running line counter, already
/// incremented for this line.
pub(crate) fn append(
    out: &mut String,
    template: &str,
    session: &SessionInfo,
    record: &ErrorRecord,
    line_number: u64,
) {
    use core::fmt::Write as _;

    let mut chars = template.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let Some(code) = chars.next() else {
            break;
        };
        match code {
            'a' => out.push_str(&session.application_name),
            'u' => out.push_str(&session.user_name),
            'd' => out.push_str(&session.database_name),
            'c' => {
                let _ = write!(
                    out,
                    "{:x}.{:x}",
                    session.session_start.timestamp(),
                    session.process_id
                );
            }
            'p' => {
                let _ = write!(out, "{}", session.process_id);
            }
            'l' => {
                let _ = write!(out, "{line_number}");
            }
            'm' => {
                let _ = write!(out, "{}", Local::now().format("%Y-%m-%d %H:%M:%S%.3f %Z"));
            }
            't' => {
                let _ = write!(out, "{}", Local::now().format("%Y-%m-%d %H:%M:%S %Z"));
            }
            's' => {
                let _ = write!(
                    out,
                    "{}",
                    session.session_start.format("%Y-%m-%d %H:%M:%S %Z")
                );
            }
            'i' => out.push_str(&session.command_tag),
            'r' => {
                if session.has_client {
                    out.push_str(&session.remote_host);
                    if !session.remote_port.is_empty() {
                        let _ = write!(out, "({})", session.remote_port);
                    }
                }
            }
            'h' => {
                if session.has_client {
                    out.push_str(&session.remote_host);
                }
            }
            // Stop expanding here for processes without a client.
            'q' => {
                if !session.has_client {
                    break;
                }
            }
            'v' => out.push_str(&session.virtual_txid),
            'x' => {
                let _ = write!(out, "{}", session.transaction_id);
            }
            'e' => out.push_str(record.status_code.as_str()),
            'n' => out.push_str(&session.node_name),
            'S' => {
                let _ = write!(out, "{}", session.session_id);
            }
            '%' => out.push('%'),
            _ => {}
        }
    }

    let _ = write!(out, "{} ", session.query_id);
    let _ = write!(out, "[{}] ", record.module);
}
