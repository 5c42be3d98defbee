use anyhow::Result;
use colored::Colorize;
use std::sync::Arc;
use std::time::Duration;

use crate::{
    app::{
        get_config_dir, init_config, resolve_assistant, Config, CredentialResolver,
        EnvCredentialResolver,
    },
    constants::HEALTH_CHECK_TIMEOUT_SECS,
    runtime::{connect, load_runtime_config},
    session::SessionId,
    transport::{HttpTransport, Transport},
};

use super::{Cli, Commands, SessionAction};

/// Handle CLI subcommands. Returns `false` when the chat should start.
pub async fn handle_command(command: &Commands, cli: &Cli) -> Result<bool> {
    match command {
        Commands::Init => {
            println!("Initializing threadline configuration...");
            init_config()?;
            println!("Configuration initialized successfully!");
            Ok(true)
        }
        Commands::Sessions { action } => {
            let config = load_runtime_config(cli.config.as_deref())?;
            manage_sessions(action, &config).await?;
            Ok(true)
        }
        Commands::Version => {
            show_version();
            Ok(true)
        }
        Commands::Status => {
            let config = load_runtime_config(cli.config.as_deref())?;
            show_status(&config).await;
            Ok(true)
        }
        Commands::Chat => Ok(false),
    }
}

async fn manage_sessions(action: &SessionAction, config: &Config) -> Result<()> {
    let orchestrator = connect(config, true)?;
    match action {
        SessionAction::List => {
            let sessions = orchestrator.list_sessions().await?;
            if sessions.is_empty() {
                println!("No sessions found.");
            }
            for session in sessions {
                println!("  • {}", session.summary());
            }
        }
        SessionAction::Create => {
            let session = orchestrator.create_session().await?;
            println!("Created session {}", session.id.as_str().green());
        }
        SessionAction::Delete { id } => {
            orchestrator.delete_session(&SessionId::new(id.as_str())).await?;
            println!("Deleted session {}", id);
        }
    }
    Ok(())
}

/// Show version information
pub fn show_version() {
    println!("threadline v{}", env!("CARGO_PKG_VERSION"));
    println!("   Terminal client for persistent assistant conversations");
}

/// Show configuration, credential and service status
async fn show_status(config: &Config) {
    println!("threadline Status:");
    println!();

    match get_config_dir() {
        Ok(dir) => {
            let config_path = dir.join("config.toml");
            if config_path.exists() {
                println!("  [OK] Configuration: {}", config_path.display());
            } else {
                println!("  [WARNING] Configuration: Not found (using defaults)");
            }
        }
        Err(e) => println!("  [WARNING] Configuration: {}", e),
    }

    println!("  Service: {}", config.api.base_url);

    match resolve_assistant(config) {
        Ok(assistant) => println!("  [OK] Assistant: {}", assistant.as_str().green()),
        Err(e) => println!("  [ERROR] Assistant: {}", e),
    }

    let resolver = EnvCredentialResolver::new(config.api.credential_env.clone());
    if let Err(e) = resolver.resolve() {
        println!("  [ERROR] Credential: {}", e);
        println!();
        return;
    }
    println!("  [OK] Credential: {} is set", resolver.var());

    let transport = match HttpTransport::new(
        config.api.base_url.clone(),
        Arc::new(resolver),
        Some(Duration::from_secs(HEALTH_CHECK_TIMEOUT_SECS)),
    ) {
        Ok(transport) => transport,
        Err(e) => {
            println!("  [ERROR] HTTP client: {}", e);
            return;
        }
    };
    match transport.list_sessions().await {
        Ok(sessions) => println!(
            "  [OK] Service: reachable ({} sessions)",
            sessions.len()
        ),
        Err(e) => println!("  [ERROR] Service: {}", e),
    }

    println!();
}
