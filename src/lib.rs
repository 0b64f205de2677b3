pub mod engine;
pub mod error;
pub mod import;
pub mod json_format;
pub mod msq;
pub mod query;
pub mod render;
pub mod scheduler;
pub mod score;
pub mod session;
pub mod settings;
pub mod sound;
pub mod timer;
pub mod types;
pub mod viewport;
