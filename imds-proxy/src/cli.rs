use {
    crate::{config::Config, error::ConfigError, server::FailurePolicy},
    clap::Parser,
    std::{net::IpAddr, path::PathBuf},
};

/// Serve AWS credentials from the standard provider chain on an EC2 instance metadata compatible endpoint.
#[derive(Debug, Parser)]
#[command(name = "imds-proxy", version, about)]
pub struct Args {
    /// Configuration file (TOML).
    #[arg(short, long, value_name = "FILENAME", env = "IMDS_PROXY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Disable shared configuration (force use of EC2/ECS metadata, ignore AWS_PROFILE, etc.).
    #[arg(long)]
    pub disable_shared_config: bool,

    /// Address to listen on.
    #[arg(long, value_name = "IP")]
    pub address: Option<IpAddr>,

    /// Port to listen on.
    #[arg(short, long)]
    pub port: Option<u16>,

    /// What to do when the provider chain cannot produce credentials for a request.
    #[arg(long, value_enum, value_name = "POLICY")]
    pub on_resolve_error: Option<FailurePolicy>,
}

impl Args {
    /// Read the configuration file, if any, and apply command line overrides.
    pub fn load_config(&self) -> Result<Config, ConfigError> {
        let mut config = match &self.config {
            Some(path) => Config::read_file(path)?,
            None => Config::default(),
        };

        if self.disable_shared_config {
            config.disable_shared_config = true;
        }

        if let Some(address) = self.address {
            config.address = address;
        }

        if let Some(port) = self.port {
            config.port = port;
        }

        if let Some(policy) = self.on_resolve_error {
            config.on_resolve_error = policy;
        }

        Ok(config)
    }
}
