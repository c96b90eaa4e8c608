pub mod control;
pub mod pipeline;
pub mod worker;
