//! Syslog output: severity mapping and message splitting.

use crate::Severity;

/// The syslog priorities this subsystem emits at.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum SyslogSeverity {
    Debug,
    Info,
    Notice,
    Warning,
    Err,
    Crit,
}

/// A connected syslog daemon (or a test double).
pub trait SyslogWriter {
    fn log(&mut self, severity: SyslogSeverity, line: &str);
}

/// Report severities map down onto the syslog scale; syslog has no
/// equivalent of the `Log`/`Info` distinction, and `Panic` is the only
/// thing worth `Crit`.
pub(crate) fn map_severity(severity: Severity) -> SyslogSeverity {
    match severity {
        Severity::Debug5
        | Severity::Debug4
        | Severity::Debug3
        | Severity::Debug2
        | Severity::Debug1 => SyslogSeverity::Debug,
        Severity::Log | Severity::Info => SyslogSeverity::Info,
        Severity::Notice | Severity::Warning => SyslogSeverity::Notice,
        Severity::Error => SyslogSeverity::Warning,
        Severity::Fatal => SyslogSeverity::Err,
        Severity::Panic => SyslogSeverity::Crit,
    }
}

/// Many syslog implementations truncate long lines, so split on this
/// boundary (conservatively below the common 1024-byte limit, leaving
/// room for the daemon's own prefix).
const SPLIT_LIMIT: usize = 900;

/// Emit one report to syslog, split into numbered lines.
///
/// The text is broken at newlines, then over-long lines are broken again
/// at whitespace where possible. Every line is tagged `[id-seq]` so the
/// parts can be reunited; single-part messages get a plain `[id]`.
pub(crate) fn emit(
    writer: &mut dyn SyslogWriter,
    severity: Severity,
    message_id: u64,
    text: &str,
) {
    let mapped = map_severity(severity);

    let mut parts: Vec<&str> = Vec::new();
    for line in text.lines() {
        let mut rest = line;
        while rest.len() > SPLIT_LIMIT {
            let cut = split_point(rest);
            let (head, tail) = rest.split_at(cut);
            parts.push(head);
            rest = tail.trim_start();
        }
        if !rest.is_empty() || parts.is_empty() {
            parts.push(rest);
        }
    }
    if parts.is_empty() {
        parts.push("");
    }

    if parts.len() == 1 {
        writer.log(mapped, &format!("[{message_id}] {}", parts[0]));
        return;
    }
    for (i, part) in parts.iter().enumerate() {
        writer.log(mapped, &format!("[{message_id}-{}] {part}", i + 1));
    }
}

/// Find a byte index at or below the limit that is both a char boundary
/// and, preferably, a whitespace break.
fn split_point(line: &str) -> usize {
    let window = &line[..floor_char_boundary(line, SPLIT_LIMIT)];
    match window.rfind(char::is_whitespace) {
        Some(at) if at > 0 => at,
        _ => window.len(),
    }
}

fn floor_char_boundary(s: &str, mut at: usize) -> usize {
    if at >= s.len() {
        return s.len();
    }
    while !s.is_char_boundary(at) {
        at -= 1;
    }
    at
}
