pub mod jsonl;
pub mod scripted;

pub use jsonl::JsonLinesSource;
pub use scripted::ScriptedSource;
