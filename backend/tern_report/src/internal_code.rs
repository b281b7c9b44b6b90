//! Internal numeric error codes, resolved lazily by source location.
//!
//! Client tooling wants a stable numeric code per raise site. Looking the
//! code up costs a hash probe, and most reports never reach a client, so
//! the engine defers resolution until the first client emission and caches
//! the result in the record.

use rustc_hash::FxHashMap;

use crate::record::{ErrorRecord, SourceLocation};
use crate::Severity;

/// Raise-site table: `(file, line)` to numeric code.
pub type InternalCodeTable = FxHashMap<(&'static str, u32), u32>;

/// Code reported for raise sites absent from the table, and for all
/// reports below `Error`.
pub const UNASSIGNED_CODE: u32 = 0;

/// Resolve and cache the record's internal code. Idempotent: a record
/// that already carries a code keeps it.
pub(crate) fn resolve(table: &InternalCodeTable, record: &mut ErrorRecord) -> u32 {
    if let Some(code) = record.internal_code {
        return code;
    }
    let code = if record.severity >= Severity::Error {
        lookup(table, record.location)
    } else {
        UNASSIGNED_CODE
    };
    record.internal_code = Some(code);
    code
}

fn lookup(table: &InternalCodeTable, location: SourceLocation) -> u32 {
    table
        .get(&(location.file, location.line))
        .copied()
        .unwrap_or(UNASSIGNED_CODE)
}
