use clap::{Arg, ArgMatches, Command};
use proto_agent::constants::{DEFAULT_MAX_ITERATIONS, get_default_model};

#[derive(Debug, Clone)]
pub struct Config {
    pub prompt: String,
    pub working_directory: String,
    pub verbose: bool,
    pub allow_exec: bool, // true = run scripts without asking
    pub read_only: bool,  // true = register only read and list
    pub model: String,
    pub max_iterations: usize,
}

impl Config {
    pub fn from_args() -> Self {
        let matches = Self::build_cli().get_matches();
        Self::from_matches(&matches)
    }

    fn from_matches(matches: &ArgMatches) -> Self {
        let prompt_parts: Vec<String> = matches
            .get_many::<String>("prompt")
            .unwrap_or_default()
            .cloned()
            .collect();

        Self {
            prompt: prompt_parts.join(" "),
            working_directory: matches
                .get_one::<String>("working-directory")
                .cloned()
                .unwrap_or_else(|| ".".to_string()),
            verbose: matches.get_flag("verbose"),
            allow_exec: matches.get_flag("allow-exec"),
            read_only: matches.get_flag("read-only"),
            model: matches
                .get_one::<String>("model")
                .cloned()
                .unwrap_or_else(get_default_model),
            max_iterations: matches
                .get_one::<usize>("max-iterations")
                .copied()
                .unwrap_or(DEFAULT_MAX_ITERATIONS),
        }
    }

    fn build_cli() -> Command {
        Command::new("proto-agent")
            .version(env!("PROTO_AGENT_VERSION"))
            .about("Coding agent that reads, writes and runs files inside one working directory")
            .arg(
                Arg::new("prompt")
                    .help("Prompt text for the agent")
                    .num_args(1..)
                    .required(true),
            )
            .arg(
                Arg::new("working-directory")
                    .short('w')
                    .long("working-directory")
                    .help("Directory the agent's tools are confined to")
                    .value_name("DIR")
                    .default_value("."),
            )
            .arg(
                Arg::new("verbose")
                    .short('v')
                    .long("verbose")
                    .help("Print the prompt, token counts and tool call details")
                    .action(clap::ArgAction::SetTrue),
            )
            .next_help_heading("Tool Options")
            .arg(
                Arg::new("allow-exec")
                    .short('a')
                    .long("allow-exec")
                    .help("Run scripts without asking for confirmation")
                    .action(clap::ArgAction::SetTrue),
            )
            .arg(
                Arg::new("read-only")
                    .long("read-only")
                    .help("Only expose the read and list tools")
                    .action(clap::ArgAction::SetTrue),
            )
            .next_help_heading("Model Options")
            .arg(
                Arg::new("model")
                    .short('m')
                    .long("model")
                    .help("Model to use. Defaults to PROTO_AGENT_MODEL or the built-in default")
                    .value_name("MODEL"),
            )
            .arg(
                Arg::new("max-iterations")
                    .long("max-iterations")
                    .help("Maximum number of tool rounds before giving up")
                    .value_name("N")
                    .value_parser(clap::value_parser!(usize)),
            )
    }
}
