pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tarla_core::config::{ConfigOverrides, LlmProvider, LoadOptions};

use crate::commands::ask::AskArgs;

#[derive(Debug, Parser)]
#[command(
    name = "tarla",
    about = "Tarla farm advisory operator CLI",
    long_about = "Ask the advisory engine a question against a farm fixture, inspect the rule table, and inspect effective configuration.",
    after_help = "Examples:\n  tarla ask --farm fixtures/farm.toml \"Should I irrigate my cotton?\"\n  tarla rules --category irrigation\n  tarla config"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to a tarla.toml config file")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Override the log level (trace|debug|info|warn|error)")]
    log_level: Option<String>,
    #[arg(long, global = true, help = "Override the generation provider (ollama|openai|disabled)")]
    llm_provider: Option<LlmProvider>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Run one advisory turn against a farm fixture and print the response as JSON")]
    Ask {
        #[arg(long, help = "TOML fixture with the farm profile, soil, crop and weather")]
        farm: PathBuf,
        #[arg(long, help = "Conversation id recorded on the response")]
        conversation: Option<String>,
        #[arg(long, help = "Intent of the previous turn, used to resolve follow-ups")]
        prior_intent: Option<String>,
        #[arg(help = "The farmer's question")]
        query: String,
    },
    #[command(about = "List the loaded advisory rules, optionally for one category")]
    Rules {
        #[arg(long, help = "Only list rules for this category")]
        category: Option<String>,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
}

impl Cli {
    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            config_path: self.config.clone(),
            require_file: self.config.is_some(),
            overrides: ConfigOverrides {
                log_level: self.log_level.clone(),
                llm_provider: self.llm_provider,
                ..ConfigOverrides::default()
            },
        }
    }
}

pub fn run() -> ExitCode {
    run_with(Cli::parse())
}

pub fn run_with(cli: Cli) -> ExitCode {
    let options = cli.load_options();

    let result = match cli.command {
        Command::Ask { farm, conversation, prior_intent, query } => commands::ask::run(AskArgs {
            farm,
            query,
            conversation_id: conversation,
            prior_intent,
            options,
        }),
        Command::Rules { category } => commands::rules::run(category.as_deref(), options),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run(options) }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
