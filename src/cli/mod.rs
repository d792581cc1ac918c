//! Command-line interface definitions and handlers.

use clap::{Parser, Subcommand};

use crate::config::Config;

/// chirp feedback gateway
#[derive(Parser, Debug)]
#[command(name = "chirp", version, about = "Feedback chat gateway")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the gateway server (default)
    Start,
    /// Configuration inspection
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the resolved configuration (secrets redacted)
    Show,
}

/// Print the resolved configuration with credentials redacted.
///
/// Mirrors what the environment-check endpoint of the original widget
/// backend reported: which collaborators are configured, and which
/// domains are trusted.
pub fn handle_config_show(config: &Config) {
    println!("bind: {}", config.bind);
    match &config.gemini {
        Some(gemini) => println!("ai: configured (model {})", gemini.model),
        None => println!("ai: not configured (set GEMINI_API_KEY)"),
    }
    match &config.github {
        Some(github) => {
            println!(
                "issue tracker: configured (default repo: {}, mention: {})",
                github.default_repository.as_deref().unwrap_or("<none>"),
                if github.mention.is_empty() {
                    "<disabled>"
                } else {
                    &github.mention
                },
            );
        }
        None => println!("issue tracker: not configured (set GITHUB_TOKEN)"),
    }
    if config.trust_table.is_empty() {
        println!("trust table: empty (set DOMAIN_API_MAPPINGS)");
    } else {
        println!(
            "trust table: {} domain(s): {}",
            config.trust_table.domain_count(),
            config.trust_table.domains().join(", "),
        );
    }
}
