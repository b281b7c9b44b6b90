//! Backend module tags for per-module log filtering.

use core::fmt;

/// Originating backend module of a report.
///
/// Operators can lower or raise the log floor for individual modules.
/// Untagged reports carry [`ModuleId::Unknown`] and answer only to the
/// global floor.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub enum ModuleId {
    #[default]
    Unknown,
    All,
    Autovacuum,
    Checkpoint,
    Executor,
    Optimizer,
    Replication,
    Storage,
    Transaction,
    Comm,
    Mem,
    Wlm,
}

impl ModuleId {
    pub fn as_str(self) -> &'static str {
        match self {
            ModuleId::Unknown => "UNKNOWN",
            ModuleId::All => "ALL",
            ModuleId::Autovacuum => "AUTOVAC",
            ModuleId::Checkpoint => "CKPT",
            ModuleId::Executor => "EXECUTOR",
            ModuleId::Optimizer => "OPT",
            ModuleId::Replication => "REPL",
            ModuleId::Storage => "STORAGE",
            ModuleId::Transaction => "XACT",
            ModuleId::Comm => "COMM",
            ModuleId::Mem => "MEM",
            ModuleId::Wlm => "WLM",
        }
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
