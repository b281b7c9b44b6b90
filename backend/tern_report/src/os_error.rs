//! OS error capture and `%m` expansion in report messages.

use std::io;

/// The OS error code in effect right now, for capture at report start.
/// Report text is built later, after intervening calls may have clobbered
/// the thread's error state, so the engine snapshots this eagerly.
pub(crate) fn current_os_error() -> i32 {
    io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

/// Expand `%m` directives in `fmt` into the description of `os_error`,
/// and collapse `%%` into a literal `%`. Any other `%` sequence is kept
/// verbatim.
pub fn expand_os_error(fmt: &str, os_error: i32) -> String {
    if !fmt.contains('%') {
        return fmt.to_owned();
    }
    let mut out = String::with_capacity(fmt.len() + 16);
    let mut chars = fmt.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('m') => {
                chars.next();
                out.push_str(&describe_os_error(os_error));
            }
            Some('%') => {
                chars.next();
                out.push('%');
            }
            _ => out.push('%'),
        }
    }
    out
}

fn describe_os_error(os_error: i32) -> String {
    if os_error == 0 {
        return "operation completed successfully".to_owned();
    }
    io::Error::from_raw_os_error(os_error).to_string()
}
