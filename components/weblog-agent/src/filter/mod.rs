pub mod errors;
pub mod expression;
pub mod filter;
pub mod matcher;
