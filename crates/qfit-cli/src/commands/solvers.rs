use super::CommandStatus;
use crate::error::Result;
use qfit::engine::config::SolverKind;
use qfit::engine::solver;
use tracing::info;

pub async fn run() -> Result<CommandStatus> {
    for line in capability_lines() {
        println!("{}", line);
    }
    info!(available = ?solver::available_solvers(), "Reported solver capabilities.");
    Ok(CommandStatus::Success)
}

fn capability_lines() -> Vec<String> {
    [SolverKind::Exact, SolverKind::Relaxed]
        .into_iter()
        .map(|kind| {
            let status = if solver::is_available(kind) {
                "available"
            } else {
                "not compiled in (falls back to relaxed)"
            };
            let default = if kind == SolverKind::default() {
                " [default]"
            } else {
                ""
            };
            format!("{:<8} {}{}", kind, status, default)
        })
        .collect()
}
