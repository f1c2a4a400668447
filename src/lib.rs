pub mod config;
pub mod errors;
pub mod limiter;
pub mod linker;
pub mod locator;
pub mod logging;
pub mod orchestrator;
pub mod pipeline;
pub mod retrieval;
pub mod semantic;
pub mod synthesis;
pub mod types;
