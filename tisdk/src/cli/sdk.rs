// tisdk/src/cli/sdk.rs
use clap::{Args, Subcommand};
use colored::Colorize;
use tisdk_common::config::Config;
use tisdk_common::error::Result;
use tisdk_core::{get_installed_sdks, install_sdk, uninstall_sdk, InstallRequest};
use tisdk_net::{build_http_client, fetch_branches, fetch_builds, fetch_releases};
use tracing::debug;

use crate::cli::InstallFlags;
use crate::progress::terminal_progress;

#[derive(Subcommand, Debug)]
pub enum SdkCommand {
    /// Install an SDK from a release, CI branch or build, zip file or URL
    Install(SdkInstall),
    /// Remove installed SDKs by name or path
    Uninstall {
        name_or_path: String,
    },
    /// List installed SDKs
    List {
        #[arg(long)]
        json: bool,
    },
    /// List released SDK versions for this platform
    Releases {
        #[arg(long)]
        json: bool,
    },
    /// List CI branches
    Branches,
    /// List CI builds of a branch (the default branch when omitted)
    Builds {
        branch: Option<String>,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
pub struct SdkInstall {
    /// Version, `latest`, branch, `branch:commit`, build name, zip file or URL
    pub uri: Option<String>,
    #[command(flatten)]
    pub flags: InstallFlags,
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

impl SdkCommand {
    pub async fn run(&self, config: &Config) -> Result<()> {
        match self {
            Self::Install(args) => args.run(config).await,
            Self::Uninstall { name_or_path } => {
                for sdk in uninstall_sdk(name_or_path, config).await? {
                    println!(
                        "✓ Uninstalled SDK {} ({})",
                        sdk.name.green(),
                        sdk.path.display()
                    );
                }
                Ok(())
            }
            Self::List { json } => {
                let sdks = get_installed_sdks(config).await?;
                if *json {
                    return print_json(&sdks);
                }
                if sdks.is_empty() {
                    println!("{}", "No SDKs installed".yellow());
                    return Ok(());
                }
                for sdk in &sdks {
                    println!(
                        "{:<28} {:<10} {}",
                        sdk.name.bold(),
                        sdk.version().unwrap_or("-"),
                        sdk.path.display()
                    );
                }
                Ok(())
            }
            Self::Releases { json } => {
                let client = build_http_client(&config.network)?;
                let releases = fetch_releases(&client, &config.urls).await?;
                let sorted = releases.sorted();
                if *json {
                    return print_json(&sorted);
                }
                let latest = releases.latest().map(|r| r.label.as_str());
                for release in sorted {
                    let marker = if Some(release.label.as_str()) == latest {
                        " (latest)".cyan().to_string()
                    } else {
                        String::new()
                    };
                    println!("{:<16}{} {}", release.label.bold(), marker, release.url);
                }
                Ok(())
            }
            Self::Branches => {
                let client = build_http_client(&config.network)?;
                let branches = fetch_branches(&client, &config.urls).await?;
                for branch in branches.search_order() {
                    if branch == branches.default_branch {
                        println!("{} {}", branch.bold(), "(default)".cyan());
                    } else {
                        println!("{branch}");
                    }
                }
                Ok(())
            }
            Self::Builds { branch, json } => {
                let client = build_http_client(&config.network)?;
                let branch = match branch {
                    Some(branch) => branch.clone(),
                    None => fetch_branches(&client, &config.urls).await?.default_branch,
                };
                debug!("Listing builds for branch {}", branch);
                let builds = fetch_builds(&client, &config.urls, &branch).await?;
                let sorted = builds.sorted();
                if *json {
                    return print_json(&sorted);
                }
                for build in sorted {
                    println!(
                        "{:<32} {} {} {}",
                        build.name.bold(),
                        build.date.format("%Y-%m-%d %H:%M"),
                        build.githash.chars().take(8).collect::<String>(),
                        build.url
                    );
                }
                Ok(())
            }
        }
    }
}

impl SdkInstall {
    pub async fn run(&self, config: &Config) -> Result<()> {
        let request = InstallRequest {
            uri: self.uri.clone(),
            install_dir: self.flags.install_dir.clone(),
            download_dir: self.flags.download_dir.clone(),
            overwrite: self.flags.overwrite,
            keep: self.flags.keep,
            on_progress: Some(terminal_progress()),
        };
        let sdk = install_sdk(config, request).await?;
        println!(
            "✓ Installed SDK {} to {}",
            sdk.name.green(),
            sdk.path.display()
        );
        Ok(())
    }
}
