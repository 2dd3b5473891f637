use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::request::RequestArgs;

#[derive(Parser, Debug)]
#[command(name = "gatekeep")]
#[command(version)]
#[command(about = "Evaluate specificity-ranked authorization rules")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Decide a request: prints allow/deny, exits 0 on allow and 1 on deny
    Check {
        /// Rule file (JSON or YAML); defaults to the configured rules path
        #[arg(long)]
        rules: Option<PathBuf>,
        #[command(flatten)]
        request: RequestArgs,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show which rules applied, were skipped, and why one won
    Explain {
        /// Rule file (JSON or YAML); defaults to the configured rules path
        #[arg(long)]
        rules: Option<PathBuf>,
        #[command(flatten)]
        request: RequestArgs,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Compile every rule in a file and report errors
    Validate {
        /// Rule file (JSON or YAML); defaults to the configured rules path
        #[arg(long)]
        rules: Option<PathBuf>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Compile a matcher and print its canonical form and specificity
    ///
    /// Several matchers are compiled as a list matcher (any of them).
    Score {
        /// Matcher expression(s), e.g. '.role IS admin'
        #[arg(required = true)]
        matchers: Vec<String>,
    },
}
