use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "threadline")]
#[command(version)]
#[command(about = "Terminal client for persistent assistant conversations", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Session to open (defaults to a new one on first message)
    #[arg(short, long)]
    pub session: Option<String>,

    /// Pick a previous session to resume (shows selection UI)
    #[arg(long, conflicts_with = "session")]
    pub resume: bool,

    /// Poll for replies instead of streaming them
    #[arg(long)]
    pub no_stream: bool,

    /// Non-interactive prompt to send
    #[arg(short, long, conflicts_with = "resume")]
    pub prompt: Option<String>,

    /// Output format for non-interactive mode
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, requires = "prompt")]
    pub output_format: OutputFormat,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize configuration
    Init,
    /// Manage sessions
    Sessions {
        #[command(subcommand)]
        action: SessionAction,
    },
    /// Start a chat session (default)
    Chat,
    /// Show version information
    Version,
    /// Check configuration and service reachability
    Status,
}

#[derive(Subcommand, Debug)]
pub enum SessionAction {
    /// List sessions on the service
    List,
    /// Create a new session
    Create,
    /// Delete a session
    Delete {
        /// Session id
        id: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Plain text output
    Text,
    /// JSON structured output
    Json,
    /// Markdown formatted output
    Markdown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_prompt_mode() {
        let cli = Cli::parse_from([
            "threadline",
            "-p",
            "hello",
            "--output-format",
            "json",
            "--no-stream",
        ]);
        assert_eq!(cli.prompt.as_deref(), Some("hello"));
        assert_eq!(cli.output_format, OutputFormat::Json);
        assert!(cli.no_stream);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_parse_sessions_delete() {
        let cli = Cli::parse_from(["threadline", "sessions", "delete", "s_1"]);
        match cli.command {
            Some(Commands::Sessions {
                action: SessionAction::Delete { id },
            }) => assert_eq!(id, "s_1"),
            other => panic!("Expected sessions delete, got {:?}", other),
        }
    }

    #[test]
    fn test_resume_conflicts_with_session() {
        let result = Cli::try_parse_from(["threadline", "--resume", "--session", "s_1"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_output_format_requires_prompt() {
        let result = Cli::try_parse_from(["threadline", "--output-format", "json"]);
        assert!(result.is_err());
    }
}
