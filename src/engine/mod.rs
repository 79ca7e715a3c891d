//! Engine module: command-line surface and run handler

pub mod arg_parser;
pub mod handlers;

pub use arg_parser::Cli;
pub use handlers::{handle_run, setup_config};
