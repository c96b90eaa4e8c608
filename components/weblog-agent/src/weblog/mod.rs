pub mod weblog;
