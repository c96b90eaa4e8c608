pub mod candidates;
pub mod fields;
pub mod parser;
pub mod pattern;
