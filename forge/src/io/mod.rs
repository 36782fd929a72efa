pub mod codex;
pub mod completion;
pub mod config;
pub mod gemini;
pub mod policy;
pub mod process;
pub mod prompt;
pub mod schema;
pub mod session_log;
