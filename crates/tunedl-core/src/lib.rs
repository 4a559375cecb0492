pub mod config;
pub mod logging;

pub mod control;
pub mod engine;
pub mod error;
pub mod job;
pub mod library;
pub mod package;
pub mod pipeline;
pub mod resolver;
pub mod scheduler;
pub mod storage;
pub mod store;
pub mod url_model;

pub use engine::{JobManager, JobManagerBuilder};
pub use error::{EngineError, ErrorKind};
