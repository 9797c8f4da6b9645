use anyhow::{Context, Result};
use std::io::{self, BufRead, Write};
use std::sync::Arc;

use proto_agent::agent::{Agent, AgentConfig};
use proto_agent::confirmation::{ConfirmationRequest, Confirmer, Decision};
use proto_agent::constants::API_KEY_ENV_VARS;
use proto_agent::logging::{log_info, log_warn, setup_session_file_logging};
use proto_agent::provider::{ProviderConfig, ProviderFactory};
use proto_agent::tools::{FileOperationToolkit, ToolRegistry};

use crate::cli::Config;

/// Asks on stderr, reads the answer from stdin
struct StdinConfirmer;

impl Confirmer for StdinConfirmer {
    fn confirm(&mut self, request: &ConfirmationRequest) -> Decision {
        eprint!("{} ", request.prompt());
        let _ = io::stderr().flush();

        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            Ok(_) => Decision::from_answer(&answer),
            Err(e) => {
                log_warn(&format!("Failed to read confirmation answer: {e}"));
                Decision::Deny
            }
        }
    }
}

/// First non-empty key among the supported environment variables
pub fn get_api_key() -> Result<String> {
    API_KEY_ENV_VARS
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|value| !value.trim().is_empty())
        .with_context(|| {
            format!(
                "No API key found. Set one of: {}",
                API_KEY_ENV_VARS.join(", ")
            )
        })
}

pub async fn run_app(config: Config) -> Result<()> {
    let session_id = uuid::Uuid::new_v4().to_string();
    setup_session_file_logging(&session_id).context("Failed to setup session file logging")?;

    let api_key = get_api_key()?;
    log_info(&format!(
        "Starting session {session_id} in {}",
        config.working_directory
    ));

    let agent_config = AgentConfig::new(api_key, &config.working_directory)?
        .with_model(config.model.clone())
        .with_max_iterations(config.max_iterations)
        .with_verbose(config.verbose)
        .with_allow_exec(config.allow_exec);

    let toolkit = if config.read_only {
        FileOperationToolkit::read_only()
    } else {
        FileOperationToolkit::new()
    };
    let mut registry = ToolRegistry::new();
    toolkit
        .register(&mut registry)
        .context("Failed to register file tools")?;

    let provider = ProviderFactory::create_provider(ProviderConfig {
        model: agent_config.model().to_string(),
        api_key: agent_config.api_key().to_string(),
    })
    .context("Failed to initialize AI provider")?;

    if config.verbose {
        println!("User prompt: {}\n", config.prompt);
    }

    let mut agent = Agent::new(agent_config, Arc::new(registry), provider);
    let response = agent.run(&config.prompt, &mut StdinConfirmer).await?;

    println!("{}", response.text);

    if agent.config().verbose() {
        let tokens =
            |count: Option<u32>| count.map_or_else(|| "N/A".to_string(), |c| c.to_string());
        println!("Prompt tokens: {}", tokens(response.usage.prompt_tokens));
        println!("Response tokens: {}", tokens(response.usage.completion_tokens));
    }

    Ok(())
}
