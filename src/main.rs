mod astro_math;
pub mod config;
mod credentials;
mod finding_chart;
mod fritz;
mod observability;
mod paths;
mod util;
mod wiserep;

#[cfg(test)]
#[macro_use]
extern crate assert_float_eq;

#[cfg(test)]
mod test_util;

use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use config::Config;
use credentials::CredentialResolver;
use eyre::{bail, WrapErr};
use fritz::FritzClient;
use observability::{Observability, Site};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use util::*;
use wiserep::{TnsClient, Upload, UploadOutcome, WiserepClient};

/// Plan and report follow-up observations of ZTF transients
#[derive(Parser)]
#[command(name = "followup", version)]
struct Cli {
    /// Configuration file, defaults to the per-user config directory
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print target info, plot visibility and optionally fetch finding charts
    Plan {
        #[arg(required = true)]
        names: Vec<String>,
        /// Evening the night starts on, today (UTC) if not given
        #[arg(short, long)]
        date: Option<NaiveDate>,
        #[arg(short, long, default_value = "not")]
        site: String,
        /// Also plot the configured standard stars
        #[arg(long)]
        standards: bool,
        #[arg(long)]
        finding_charts: bool,
        #[arg(long)]
        no_plot: bool,
    },
    /// Download the finding chart of one source
    Finder {
        name: String,
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },
    /// Upload a reduced spectrum to WISeREP (sandbox unless --production)
    Upload {
        name: String,
        spectrum: PathBuf,
        #[arg(short, long, value_enum, default_value_t = Quality::Medium)]
        quality: Quality,
        #[arg(long)]
        production: bool,
    },
    /// Plot the visibility of the configured standard stars
    Standards {
        #[arg(short, long)]
        date: Option<NaiveDate>,
        #[arg(short, long, default_value = "not")]
        site: String,
    },
}

fn credential_dir(config_path: Option<&Path>) -> eyre::Result<PathBuf> {
    match config_path.and_then(Path::parent) {
        Some(dir) if !dir.as_os_str().is_empty() => Ok(dir.to_path_buf()),
        Some(_) => Ok(PathBuf::from(".")),
        None => Config::directory().wrap_err("Couldn't locate the configuration directory"),
    }
}

fn ztf_name(name: &str) -> eyre::Result<&str> {
    if !is_ztf_name(name) {
        bail!("{:?} is not a valid ZTF name", name);
    }
    Ok(name)
}

fn fritz_client(config: &Config, credentials: &CredentialResolver) -> eyre::Result<FritzClient> {
    let token = credentials
        .token(Service::Fritz)
        .wrap_err("Couldn't get the Fritz token")?;
    Ok(FritzClient::new(&config.fritz, &token)?)
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).wrap_err("Couldn't load configuration")?;
    let credentials = CredentialResolver::from_env(credential_dir(cli.config.as_deref())?);
    let base_dir = config.output.base_dir.clone();
    let format = config.output.plot_format;

    match cli.command {
        Command::Plan {
            names,
            date,
            site,
            standards,
            finding_charts,
            no_plot,
        } => {
            let (valid, malformed) = partition_names(names.as_slice());
            if !malformed.is_empty() {
                warn!("Skipping malformed ZTF names: {}", malformed.join(", "));
            }
            if valid.is_empty() {
                bail!("No valid ZTF names given");
            }

            let site = Site::lookup(&site, &config.sites)?;
            let fritz = fritz_client(&config, &credentials)?;
            let obs = Observability::from_catalog(&fritz, &valid, date, site)
                .await
                .wrap_err("Couldn't look up the targets on Fritz")?;
            obs.print_info();

            if !no_plot {
                obs.plot_targets(&base_dir, format)?;
            }
            if standards {
                obs.plot_standards(&config.standards, &base_dir, format)?;
            }
            if finding_charts {
                for ztf_id in &valid {
                    finding_chart::download(&fritz, &base_dir, ztf_id, obs.date())
                        .await
                        .wrap_err_with(|| format!("Couldn't download the finding chart of {}", ztf_id))?;
                }
            }
        }
        Command::Finder { name, date } => {
            let ztf_id = ztf_name(&name)?;
            let fritz = fritz_client(&config, &credentials)?;
            let date = date.unwrap_or_else(|| Utc::now().date_naive());
            let path = finding_chart::download(&fritz, &base_dir, ztf_id, date).await?;
            println!("{}", path.display());
        }
        Command::Upload {
            name,
            spectrum,
            quality,
            production,
        } => {
            let ztf_id = ztf_name(&name)?;
            let fritz = fritz_client(&config, &credentials)?;
            let tns = TnsClient::new(
                &config.tns,
                &credentials
                    .token(Service::Tns)
                    .wrap_err("Couldn't get the TNS token")?,
            )?;
            let wiserep = WiserepClient::new(
                &config.wiserep,
                &credentials
                    .token(Service::Wiserep)
                    .wrap_err("Couldn't get the WISeREP token")?,
                production,
            )?;
            if production {
                info!("Uploading to the production WISeREP server");
            }

            let upload = Upload {
                catalog: &fritz,
                tns: &tns,
                wiserep: &wiserep,
                template: &config.report,
            };
            match upload.run(ztf_id, &spectrum, quality).await? {
                UploadOutcome::NoTnsMatch => {
                    println!("{} has no TNS counterpart, nothing uploaded", ztf_id)
                }
                UploadOutcome::Accepted {
                    iau_name,
                    report_id,
                    feedback,
                } => {
                    println!("{} accepted as {} (report {})", ztf_id, iau_name, report_id);
                    println!("{}", serde_json::to_string_pretty(&feedback)?);
                }
            }
        }
        Command::Standards { date, site } => {
            let site = Site::lookup(&site, &config.sites)?;
            Observability::new(vec![], date, site).plot_standards(
                &config.standards,
                &base_dir,
                format,
            )?;
        }
    }

    Ok(())
}
