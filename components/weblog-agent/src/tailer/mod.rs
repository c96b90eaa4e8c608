pub mod models;
pub mod reader;
pub mod state;
pub mod tailer;
pub mod wakeups;
