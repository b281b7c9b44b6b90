//! Client-bound report emission.

use std::borrow::Cow;

use crate::config::Verbosity;
use crate::record::ErrorRecord;
use crate::{ModuleId, Severity};

/// Whether a client message is an error response or an out-of-band
/// notice. Everything below `Error` travels as a notice.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum MessageKind {
    Error,
    Notice,
}

/// The frontend protocol connection (or a test double).
///
/// Modern protocol messages are a sequence of single-byte-tagged fields;
/// the legacy protocol carries one flattened string instead, sent via
/// [`ClientChannel::raw`].
pub trait ClientChannel {
    fn begin(&mut self, kind: MessageKind);
    fn field(&mut self, tag: u8, value: &str);
    /// Legacy flattened message body.
    fn raw(&mut self, text: &str);
    fn end(&mut self);
    fn flush(&mut self);
    fn protocol_major(&self) -> u32 {
        3
    }
}

/// Serialize one record onto the client channel. Does not flush; the
/// engine decides when (notices can be batched under retry).
///
/// With `ascii_only` set, all text fields are squashed to ASCII. Used
/// when the engine is recursing through its own failures and can no
/// longer trust encoding conversion.
pub(crate) fn emit(
    channel: &mut dyn ClientChannel,
    verbosity: Verbosity,
    record: &ErrorRecord,
    internal_code: u32,
    ascii_only: bool,
) {
    let kind = if record.severity >= Severity::Error {
        MessageKind::Error
    } else {
        MessageKind::Notice
    };

    if channel.protocol_major() < 3 {
        use core::fmt::Write as _;

        let mut text = String::with_capacity(record.message_text().len() + 16);
        text.push_str(record.severity.as_str());
        text.push_str(":  ");
        text.push_str(&clean(record.message_text(), ascii_only));
        if let Some(position) = record.cursor_position.or(record.internal_position) {
            let _ = write!(text, " at character {position}");
        }
        text.push('\n');
        channel.begin(kind);
        channel.raw(&text);
        channel.end();
        return;
    }

    channel.begin(kind);
    channel.field(b'S', record.severity.as_str());
    channel.field(b'C', record.status_code.as_str());
    channel.field(b'M', &clean(record.message_text(), ascii_only));
    if internal_code != 0 {
        channel.field(b'c', &internal_code.to_string());
    }
    if record.module != ModuleId::Unknown {
        channel.field(b'm', record.module.as_str());
    }

    if verbosity != Verbosity::Terse {
        if let Some(detail) = record.detail.as_deref() {
            channel.field(b'D', &clean(detail, ascii_only));
        }
        if let Some(hint) = record.hint.as_deref() {
            channel.field(b'H', &clean(hint, ascii_only));
        }
        if let Some(context) = record.context.as_deref() {
            channel.field(b'W', &clean(context, ascii_only));
        }
        if let Some(query) = record.internal_query.as_deref() {
            channel.field(b'q', &clean(query, ascii_only));
        }
    }
    if let Some(position) = record.cursor_position {
        channel.field(b'P', &position.to_string());
    }
    if let Some(position) = record.internal_position {
        channel.field(b'p', &position.to_string());
    }
    if verbosity == Verbosity::Verbose {
        channel.field(b'F', record.location.file);
        channel.field(b'L', &record.location.line.to_string());
        channel.field(b'R', record.location.function);
    }
    channel.end();
}

fn clean(text: &str, ascii_only: bool) -> Cow<'_, str> {
    if !ascii_only || text.is_ascii() {
        return Cow::Borrowed(text);
    }
    Cow::Owned(
        text.chars()
            .map(|c| if c.is_ascii() { c } else { '?' })
            .collect(),
    )
}
