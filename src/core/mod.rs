//! 核心编排层：错误、循环状态、会话监管、会话构建与编排

pub mod builder;
pub mod error;
pub mod orchestrator;
pub mod session_supervisor;
pub mod state;

pub use builder::SessionBuilder;
pub use error::StudyError;
pub use orchestrator::{Reply, SessionSummary, StudySession};
pub use session_supervisor::{CancelHandle, SessionSupervisor};
pub use state::{LoopState, TurnOutcome};
