use thiserror::Error;

/// Failures that carry structured payload beyond a context string. All of
/// them terminate the process once they reach the top-level handler; the
/// connection path retries internally before producing one.
#[derive(Error, Debug)]
pub enum BackupError {
    #[error("no replica source configured for database '{0}'")]
    UnknownDatabase(String),

    #[error("could not connect to {host}:{port} after {attempts} attempts")]
    ConnectionExhausted {
        host: String,
        port: u16,
        attempts: u32,
    },

    #[error("backup container '{0}' is not running")]
    ContainerUnavailable(String),

    #[error("could not determine processor count from runner output '{0}'")]
    ProcessorCount(String),

    #[error("backup tool did not report success; last line: '{last_line}'\nlog tail:\n{log_tail}")]
    ToolFailed { last_line: String, log_tail: String },

    #[error("uploaded object not found at key {0}")]
    UploadNotVerified(String),
}
