//! The error record: one in-flight or captured report.

use crate::{ModuleId, Severity, SqlState};

/// Where in the source a report originated.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct SourceLocation {
    pub file: &'static str,
    pub line: u32,
    pub function: &'static str,
}

impl SourceLocation {
    /// Final path component of `file`; log output never shows the full
    /// build-tree path.
    pub fn file_name(&self) -> &'static str {
        self.file.rsplit(['/', '\\']).next().unwrap_or(self.file)
    }
}

/// Capture the current source location for a report.
#[macro_export]
macro_rules! here {
    () => {
        $crate::SourceLocation {
            file: file!(),
            line: line!(),
            function: module_path!(),
        }
    };
}

/// Everything known about one report.
///
/// Records live on the engine's bounded frame stack while being assembled
/// and are deep-copied out by recovery code via
/// [`ReportEngine::copy_record`](crate::ReportEngine::copy_record);
/// a copied record shares no storage with the engine.
#[derive(Clone, Debug)]
pub struct ErrorRecord {
    pub severity: Severity,
    pub location: SourceLocation,
    pub module: ModuleId,
    pub status_code: SqlState,
    /// Numeric code for client tooling, resolved lazily from the source
    /// location on first client emission. `None` means not yet resolved.
    pub internal_code: Option<u32>,
    /// OS error code snapshotted when the report was opened, consumed by
    /// `%m` expansion in the message fields.
    pub os_error: i32,
    pub output_to_server: bool,
    pub output_to_client: bool,
    /// Deliver to the client as an out-of-band notice even when severity
    /// alone would not route there.
    pub handle_in_client: bool,
    /// Suppress the active statement text in log output.
    pub hide_statement: bool,
    /// Skip the interrupt check that normally follows a delivered
    /// sub-`Error` report.
    pub ignore_interrupt: bool,
    pub message: Option<String>,
    pub detail: Option<String>,
    /// Server-log-only variant of the detail; wins over `detail` there.
    pub detail_log: Option<String>,
    pub hint: Option<String>,
    pub context: Option<String>,
    pub backtrace: Option<String>,
    /// 1-based character index into the active statement.
    pub cursor_position: Option<u32>,
    /// 1-based character index into `internal_query`.
    pub internal_position: Option<u32>,
    /// Internally-generated statement the positions refer to.
    pub internal_query: Option<String>,
}

impl ErrorRecord {
    pub(crate) fn new(severity: Severity, location: SourceLocation, os_error: i32) -> Self {
        ErrorRecord {
            severity,
            location,
            module: ModuleId::Unknown,
            status_code: SqlState::default_for(severity),
            internal_code: None,
            os_error,
            output_to_server: false,
            output_to_client: false,
            handle_in_client: false,
            hide_statement: false,
            ignore_interrupt: false,
            message: None,
            detail: None,
            detail_log: None,
            hint: None,
            context: None,
            backtrace: None,
            cursor_position: None,
            internal_position: None,
            internal_query: None,
        }
    }

    /// The primary message, or a placeholder when the author set none.
    pub fn message_text(&self) -> &str {
        self.message.as_deref().unwrap_or("missing error text")
    }

    /// The detail to show in the server log: the log-only variant when
    /// present, otherwise the client-visible one.
    pub fn detail_for_log(&self) -> Option<&str> {
        self.detail_log.as_deref().or(self.detail.as_deref())
    }
}
