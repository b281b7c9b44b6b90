//! Output sinks: fan-out of finished reports to the server log
//! destinations and the client channel.

pub(crate) mod csv;
mod pipe;
mod server_log;
mod syslog;

pub mod client;

use std::io;

pub use client::{ClientChannel, MessageKind};
pub use pipe::{ChunkFlags, ChunkedTransport, CHUNK_SIZE, MAX_CHUNK_PAYLOAD};
pub use syslog::{SyslogSeverity, SyslogWriter};

pub(crate) use server_log::send_to_server_log;

/// The wired-up output channels of one process.
///
/// `console` is always present (a backend with no collector writes
/// straight to its stderr); the rest are optional and skipped when
/// absent, whatever the configured destinations say.
pub struct SinkSet {
    pub console: Box<dyn io::Write + Send>,
    pub syslog: Option<Box<dyn SyslogWriter + Send>>,
    pub transport: Option<Box<dyn ChunkedTransport + Send>>,
    pub client: Option<Box<dyn ClientChannel + Send>>,
}

impl SinkSet {
    /// Console only; the usual setup for tools and tests.
    pub fn console_only(console: Box<dyn io::Write + Send>) -> Self {
        SinkSet {
            console,
            syslog: None,
            transport: None,
            client: None,
        }
    }

    pub fn stderr() -> Self {
        SinkSet::console_only(Box::new(io::stderr()))
    }
}

impl core::fmt::Debug for SinkSet {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SinkSet")
            .field("syslog", &self.syslog.is_some())
            .field("transport", &self.transport.is_some())
            .field("client", &self.client.is_some())
            .finish()
    }
}

/// Per-process emission counters: running line numbers for the prefix
/// `%l` code and syslog part tagging.
#[derive(Debug, Default)]
pub(crate) struct EmitState {
    pub log_line_number: u64,
    pub csv_line_number: u64,
    pub syslog_message_id: u64,
}
