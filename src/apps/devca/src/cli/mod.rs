use crate::{
    AppConfig, DevCa, IssueRequest,
    config::expand_home_in_path,
    utils::{PRIVATE_FILE_MODE, PUBLIC_FILE_MODE, write_file},
};

use anyhow::Result;
use clap::{Parser, Subcommand};
use confique::Config;
use std::path::{Path, PathBuf};
use tracing::info;

// Re-export PartialAppConfig for public usage
pub use crate::config::confique_app_config_layer::AppConfigLayer as PartialAppConfig;

#[cfg(test)]
mod tests;

#[derive(Parser)]
#[command(name = "devca")]
#[command(about = "A development certificate authority for local services")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "$HOME/.devca/config.toml")]
    config_path: PathBuf,

    /// Configuration object
    #[command(flatten)]
    config: PartialAppConfig,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Internal helper struct that holds the resolved configuration
pub struct ResolvedCli {
    command: Commands,
    config: AppConfig,
}

#[derive(Subcommand)]
enum Commands {
    /// Issue a certificate for a service
    Issue {
        /// Name of the service the certificate is for
        #[arg(long)]
        name: String,
        /// Hostname or IP address the certificate is valid for (repeatable)
        #[arg(long = "san", required = true)]
        sans: Vec<String>,
        /// Legacy service IP, added to the IP addresses
        #[arg(long)]
        ip: Option<String>,
        /// Directory to write <name>.crt and <name>.key to instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// List issued certificates
    List,
    /// Print the certificate with the given serial number
    Show { serial: String },
    /// Print the root certificate
    Root {
        /// File to write the root certificate to instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let log_level = if self.verbose { "debug" } else { "info" };
        tracing_subscriber::fmt()
            .with_env_filter(format!("devca={},{}", log_level, log_level))
            .with_writer(std::io::stderr)
            .init();

        let resolved_cli = self.resolve_config()?;
        resolved_cli.handle().await
    }

    /// Load the configuration and resolve all $HOME placeholders
    fn resolve_config(self) -> Result<ResolvedCli> {
        let config_path = expand_home_in_path(&self.config_path)?;

        let config = AppConfig::builder()
            .preloaded(self.config)
            .env()
            .file(&config_path)
            .load()?
            .with_resolved_paths()?;

        Ok(ResolvedCli {
            command: self.command,
            config,
        })
    }
}

impl ResolvedCli {
    async fn handle(&self) -> Result<()> {
        let devca = DevCa::from_config(&self.config).await?;

        match &self.command {
            Commands::Issue {
                name,
                sans,
                ip,
                out,
            } => {
                let mut request = IssueRequest::new(name.clone(), sans.clone());
                if let Some(ip) = ip {
                    request = request.with_service_ip(ip.clone());
                }
                let bundle = devca.issue_certificate(&request).await?;

                match out {
                    Some(dir) => {
                        let (cert_path, key_path) = write_bundle(dir, name, &bundle).await?;
                        info!("Certificate written to {:?}", cert_path);
                        info!("Private key written to {:?}", key_path);
                    }
                    None => {
                        print!("{}", bundle.certificate_pem);
                        print!("{}", bundle.private_key_pem);
                    }
                }
                info!("Serial number: {}", bundle.serial_number);
            }
            Commands::List => {
                let records = devca.list_issued().await;
                if records.is_empty() {
                    info!("No certificates issued yet");
                }
                for record in records {
                    println!(
                        "{}\t{}\t{}\t{}",
                        record.serial_number,
                        record.service_name,
                        record.expires_at.to_rfc3339(),
                        record.domains.join(",")
                    );
                }
            }
            Commands::Show { serial } => match devca.get_by_serial(serial).await {
                Some(record) => print!("{}", record.certificate),
                None => anyhow::bail!("No certificate with serial {}", serial),
            },
            Commands::Root { out } => {
                let pem = devca.root_certificate_pem().await;
                match out {
                    Some(path) => {
                        write_file(path, pem.as_bytes(), PUBLIC_FILE_MODE).await?;
                        info!("Root certificate written to {:?}", path);
                    }
                    None => print!("{}", pem),
                }
            }
        }

        Ok(())
    }
}

async fn write_bundle(
    dir: &Path,
    name: &str,
    bundle: &crate::IssuedBundle,
) -> Result<(PathBuf, PathBuf)> {
    tokio::fs::create_dir_all(dir).await?;
    let cert_path = dir.join(format!("{name}.crt"));
    let key_path = dir.join(format!("{name}.key"));
    write_file(&cert_path, bundle.certificate_pem.as_bytes(), PUBLIC_FILE_MODE).await?;
    write_file(&key_path, bundle.private_key_pem.as_bytes(), PRIVATE_FILE_MODE).await?;
    Ok((cert_path, key_path))
}
