pub mod progress;
pub mod report;
