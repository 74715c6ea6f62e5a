// tisdk/src/cli/module.rs
use clap::{Args, Subcommand};
use colored::Colorize;
use tisdk_common::config::Config;
use tisdk_common::error::Result;
use tisdk_core::{get_installed_modules, install_module, uninstall_module, ModuleInstallRequest};

use crate::cli::InstallFlags;
use crate::progress::terminal_progress;

#[derive(Subcommand, Debug)]
pub enum ModuleCommand {
    /// Install the modules and plugins in a zip file or URL
    Install(ModuleInstall),
    /// Remove installed modules by id, id@version or path
    Uninstall { name_or_path: String },
    /// List installed modules
    List {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
pub struct ModuleInstall {
    /// Zip file, file:// URI or http(s) URL
    pub uri: String,
    #[command(flatten)]
    pub flags: InstallFlags,
}

impl ModuleCommand {
    pub async fn run(&self, config: &Config) -> Result<()> {
        match self {
            Self::Install(args) => {
                let request = ModuleInstallRequest {
                    uri: args.uri.clone(),
                    install_dir: args.flags.install_dir.clone(),
                    download_dir: args.flags.download_dir.clone(),
                    overwrite: args.flags.overwrite,
                    keep: args.flags.keep,
                    on_progress: Some(terminal_progress()),
                };
                let modules = install_module(config, request).await?;
                if modules.is_empty() {
                    println!("{}", "No modules installed, plugins only".yellow());
                }
                for module in modules {
                    println!(
                        "✓ Installed {}@{} ({}) to {}",
                        module.moduleid.green(),
                        module.version,
                        module.platform,
                        module.path.display()
                    );
                }
                Ok(())
            }
            Self::Uninstall { name_or_path } => {
                for module in uninstall_module(name_or_path, config).await? {
                    println!(
                        "✓ Uninstalled {}@{} ({})",
                        module.moduleid.green(),
                        module.version,
                        module.platform
                    );
                }
                Ok(())
            }
            Self::List { json } => {
                let modules = get_installed_modules(config).await?;
                if *json {
                    println!("{}", serde_json::to_string_pretty(&modules)?);
                    return Ok(());
                }
                if modules.is_empty() {
                    println!("{}", "No modules installed".yellow());
                    return Ok(());
                }
                for module in &modules {
                    println!(
                        "{:<32} {:<10} {:<10} {}",
                        module.moduleid.bold(),
                        module.version,
                        module.platform,
                        module.path.display()
                    );
                }
                Ok(())
            }
        }
    }
}
