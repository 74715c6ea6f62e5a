// tisdk/src/cli.rs
//! Command-line argument structure.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use tisdk_common::config::Config;
use tisdk_common::error::Result;

pub mod module;
pub mod sdk;

use crate::cli::module::ModuleCommand;
use crate::cli::sdk::SdkCommand;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, name = "tisdk", bin_name = "tisdk")]
#[command(propagate_version = true)]
pub struct CliArgs {
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Install, remove and browse SDKs
    #[command(subcommand)]
    Sdk(SdkCommand),
    /// Install and remove native modules
    #[command(subcommand)]
    Module(ModuleCommand),
}

impl Command {
    pub async fn run(&self, config: &Config) -> Result<()> {
        match self {
            Self::Sdk(command) => command.run(config).await,
            Self::Module(command) => command.run(config).await,
        }
    }
}

/// Flags shared by `sdk install` and `module install`.
#[derive(Args, Debug, Clone, Default)]
pub struct InstallFlags {
    /// Replace an existing installation
    #[arg(long)]
    pub overwrite: bool,
    /// Keep the downloaded archive
    #[arg(long)]
    pub keep: bool,
    /// Directory to download archives to
    #[arg(long, value_name = "DIR")]
    pub download_dir: Option<PathBuf>,
    /// Install root; defaults to the first install location
    #[arg(long, value_name = "DIR")]
    pub install_dir: Option<PathBuf>,
}
