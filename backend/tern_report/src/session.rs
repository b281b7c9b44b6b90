//! Identity of the reporting process and its client session.

use chrono::{DateTime, Local};

/// What kind of backend process is reporting.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub enum ProcessRole {
    Postmaster,
    #[default]
    Backend,
    Checkpointer,
    BackgroundWriter,
    WalReceiveWriter,
    DataReceiveWriter,
    WorkloadManager,
    Monitor,
}

impl ProcessRole {
    /// Auxiliary writer processes shut down gracefully on a forced exit:
    /// they get `Fatal` instead of `Panic` so buffers are flushed.
    pub(crate) fn prefers_graceful_shutdown(self) -> bool {
        matches!(
            self,
            ProcessRole::Checkpointer
                | ProcessRole::BackgroundWriter
                | ProcessRole::WalReceiveWriter
                | ProcessRole::DataReceiveWriter
        )
    }

    /// Internal maintenance roles never push their errors at a client,
    /// even when a channel is wired up.
    pub(crate) fn suppresses_client_errors(self) -> bool {
        matches!(self, ProcessRole::WorkloadManager | ProcessRole::Monitor)
    }
}

/// Per-session identity consumed by log line prefixes and client reports.
#[derive(Clone, Debug)]
pub struct SessionInfo {
    pub role: ProcessRole,
    pub node_name: String,
    pub application_name: String,
    pub user_name: String,
    pub database_name: String,
    pub remote_host: String,
    pub remote_port: String,
    /// A frontend is connected. Several prefix codes and all client
    /// emission are gated on this.
    pub has_client: bool,
    /// Authentication has finished. Before that, only `Error`-and-above
    /// reports may reach the client.
    pub client_auth_complete: bool,
    /// The "client" is a coordinating relay node, which resends notices
    /// itself; sub-error chatter is suppressed toward it.
    pub from_relay: bool,
    pub process_id: u32,
    pub session_id: u64,
    pub session_start: DateTime<Local>,
    /// Tag of the command being executed, e.g. `SELECT`.
    pub command_tag: String,
    pub virtual_txid: String,
    pub transaction_id: u64,
    /// Debug id of the query being executed, 0 when idle.
    pub query_id: u64,
}

impl Default for SessionInfo {
    fn default() -> Self {
        SessionInfo {
            role: ProcessRole::default(),
            node_name: String::new(),
            application_name: String::new(),
            user_name: String::new(),
            database_name: String::new(),
            remote_host: String::new(),
            remote_port: String::new(),
            has_client: false,
            client_auth_complete: false,
            from_relay: false,
            process_id: std::process::id(),
            session_id: 0,
            session_start: Local::now(),
            command_tag: String::new(),
            virtual_txid: String::new(),
            transaction_id: 0,
            query_id: 0,
        }
    }
}
