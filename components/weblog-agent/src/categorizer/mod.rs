pub mod categorizer;
