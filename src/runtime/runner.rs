use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;
use std::sync::Arc;

use super::non_interactive::NonInteractiveRunner;
use super::repl::Repl;
use crate::{
    app::{
        load_config, load_config_file, ClientSettings, Config, EnvCredentialResolver,
        StaticCredentialResolver,
    },
    cli::{handle_command, Cli},
    conversation::ConversationOrchestrator,
    session::{select_session, SessionId},
    transport::HttpTransport,
    utils::{log_info, log_status, log_warn},
};

/// Load the config named on the command line, or the layered default
pub fn load_runtime_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => load_config_file(path),
        None => match load_config() {
            Ok(config) => Ok(config),
            Err(e) => {
                log_warn("[config]", format!("{:#}. Using defaults.", e));
                Ok(Config::default())
            }
        },
    }
}

/// Resolve credentials and build an orchestrator talking HTTP
pub fn connect(config: &Config, no_stream: bool) -> Result<ConversationOrchestrator> {
    let resolver = EnvCredentialResolver::new(config.api.credential_env.clone());
    let settings = ClientSettings::resolve(config, &resolver)?;

    let transport = HttpTransport::new(
        settings.base_url.clone(),
        Arc::new(StaticCredentialResolver::new(settings.credential.clone())),
        settings.request_timeout,
    )?
    .with_streaming(!no_stream);

    Ok(ConversationOrchestrator::from_settings(
        Arc::new(transport),
        &settings,
    ))
}

/// Main runtime entry point
pub struct Runner {
    cli: Cli,
}

impl Runner {
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    pub async fn run(self) -> Result<()> {
        if let Some(command) = &self.cli.command {
            if handle_command(command, &self.cli).await? {
                return Ok(());
            }
        }

        let config = load_runtime_config(self.cli.config.as_deref())?;
        let orchestrator = connect(&config, self.cli.no_stream)?;

        if let Some(prompt) = &self.cli.prompt {
            return self.run_prompt(orchestrator, prompt).await;
        }

        self.open_initial_session(&orchestrator).await?;
        let mut repl = Repl::new(Arc::new(orchestrator), config.ui.show_timestamps);
        repl.run().await
    }

    async fn run_prompt(&self, orchestrator: ConversationOrchestrator, prompt: &str) -> Result<()> {
        if let Some(id) = &self.cli.session {
            orchestrator.select_session(&SessionId::new(id.as_str()));
        }

        let runner = NonInteractiveRunner::new(orchestrator);
        let result = runner.execute(prompt).await?;
        println!("{}", runner.format_result(&result, self.cli.output_format));

        if result.error.is_some() {
            std::process::exit(1);
        }
        Ok(())
    }

    async fn open_initial_session(&self, orchestrator: &ConversationOrchestrator) -> Result<()> {
        let session = if let Some(id) = &self.cli.session {
            Some(SessionId::new(id.as_str()))
        } else if self.cli.resume {
            let sessions = orchestrator
                .list_sessions()
                .await
                .context("Failed to list sessions")?;
            select_session(sessions)?.map(|s| s.id)
        } else {
            None
        };

        match session {
            Some(id) => {
                orchestrator.select_session(&id);
                orchestrator
                    .load_history()
                    .await
                    .with_context(|| format!("Failed to load session {}", id))?;
                log_info("[session]", format!("resumed {}", id));
                log_status(format!("Resumed session {}", id.as_str().green()));
            }
            None => log_status("New conversation; a session is created on the first message."),
        }
        Ok(())
    }
}
