pub mod refine;
pub mod solvers;

/// How a command that produced its outputs ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Success,
    /// Outputs were written, but some regions failed or too many were non-optimal.
    PartialSuccess,
}

impl CommandStatus {
    pub fn exit_code(self) -> i32 {
        match self {
            CommandStatus::Success => 0,
            CommandStatus::PartialSuccess => 2,
        }
    }
}
