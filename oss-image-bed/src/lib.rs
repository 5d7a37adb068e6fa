pub mod cli;
pub mod client;
pub mod load_config;
pub mod progress;

pub use cli::{run, Cli, Commands};
