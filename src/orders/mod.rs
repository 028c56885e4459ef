pub mod notifier;
pub mod orchestrator;
pub mod queue;
pub mod request;
