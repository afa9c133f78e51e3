use thiserror::Error;

/// Errors surfaced by engine operations. Probe-level failures (tool absent,
/// unparseable output) are handled inside the collectors and never reach
/// this type; only operation-level conditions do.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{tool} not found in PATH")]
    ToolMissing { tool: &'static str },

    #[error("{tool} failed: {detail}")]
    ToolFailed { tool: String, detail: String },

    #[error("{tool} output did not match the expected grammar: {detail}")]
    ParseUnexpected { tool: &'static str, detail: String },

    #[error("no device or entity matches '{0}'")]
    NotFound(String),

    #[error("{0}")]
    Precondition(String),

    #[error("failed to export pool '{pool}': {detail}")]
    PoolExport { pool: String, detail: String },

    #[error("failed to import pool '{pool}': {detail}")]
    PoolImport { pool: String, detail: String },

    #[error("LED control failed on {sg_device} slot {slot}: {detail}")]
    LedControl {
        sg_device: String,
        slot: u32,
        detail: String,
    },

    #[error("permission denied (root required): {0}")]
    PermissionDenied(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Process exit code for this error. 0 is success and never produced
    /// here; 1 is reserved for unrecoverable failures (a pool left
    /// part-exported, an LED left lit, I/O trouble).
    pub fn exit_code(&self) -> i32 {
        match self {
            EngineError::NotFound(_) => 2,
            EngineError::Precondition(_) => 3,
            EngineError::ToolMissing { .. } => 4,
            EngineError::PermissionDenied(_) => 5,
            EngineError::ToolFailed { .. }
            | EngineError::ParseUnexpected { .. }
            | EngineError::PoolExport { .. }
            | EngineError::PoolImport { .. }
            | EngineError::LedControl { .. }
            | EngineError::Io(_) => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_distinguish_categories() {
        assert_eq!(EngineError::NotFound("x".into()).exit_code(), 2);
        assert_eq!(EngineError::Precondition("x".into()).exit_code(), 3);
        assert_eq!(EngineError::ToolMissing { tool: "sg_ses" }.exit_code(), 4);
        assert_eq!(EngineError::PermissionDenied("x".into()).exit_code(), 5);
        assert_eq!(
            EngineError::PoolExport { pool: "tank".into(), detail: "busy".into() }.exit_code(),
            1
        );
        assert_eq!(
            EngineError::ParseUnexpected { tool: "lsblk", detail: "not json".into() }.exit_code(),
            1
        );
    }
}
