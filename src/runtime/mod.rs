/// Runtime module - Gateway

mod non_interactive;
mod repl;
mod runner;

pub use non_interactive::{NonInteractiveResult, NonInteractiveRunner};
pub use repl::{format_message, Repl, ReplCommand};
pub use runner::{connect, load_runtime_config, Runner};
