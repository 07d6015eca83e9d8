pub mod approval;
pub mod config;
pub mod error;
pub mod logging;
pub mod notify;
pub mod orchestrator;
pub mod photo;
pub mod repository;
pub mod request;
pub mod sort;
pub mod utils;
pub mod validation;

pub use approval::{Action, ApprovalStatus, Role};
pub use error::{ActionFailure, OrchestratorError};
pub use orchestrator::{ActorContext, RequestOrchestrator};
