use {
    crate::{
        error::ConfigError,
        server::{FailurePolicy, ServerOptions},
    },
    imds_proxy_credentials::{DEFAULT_RESOLVE_TIMEOUT, SharedConfig},
    serde::Deserialize,
    std::{
        fs,
        net::{IpAddr, Ipv4Addr, SocketAddr},
        path::Path,
        time::Duration,
    },
};

const DEFAULT_PORT: u16 = 2345;

#[inline]
const fn get_default_port() -> u16 {
    DEFAULT_PORT
}

#[inline]
const fn get_default_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

#[inline]
const fn get_default_threads() -> usize {
    2
}

#[inline]
const fn get_default_read_timeout() -> Duration {
    Duration::from_secs(30)
}

#[inline]
const fn get_default_write_timeout() -> Duration {
    Duration::from_secs(30)
}

#[inline]
const fn get_default_idle_timeout() -> Duration {
    Duration::from_secs(60)
}

#[inline]
const fn get_default_shutdown_timeout() -> Duration {
    Duration::from_secs(5)
}

#[inline]
const fn get_default_resolve_timeout() -> Duration {
    DEFAULT_RESOLVE_TIMEOUT
}

/// The configuration for the proxy as specified by the user. Every field is optional in the file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "get_default_address")]
    pub address: IpAddr,

    #[serde(default = "get_default_port")]
    pub port: u16,

    #[serde(default = "get_default_threads")]
    pub threads: usize,

    /// Ignore `AWS_PROFILE` and the shared config/credentials files.
    #[serde(default)]
    pub disable_shared_config: bool,

    #[serde(default)]
    pub on_resolve_error: FailurePolicy,

    #[serde(default = "get_default_read_timeout", with = "humantime_serde")]
    pub read_timeout: Duration,

    #[serde(default = "get_default_write_timeout", with = "humantime_serde")]
    pub write_timeout: Duration,

    #[serde(default = "get_default_idle_timeout", with = "humantime_serde")]
    pub idle_timeout: Duration,

    #[serde(default = "get_default_shutdown_timeout", with = "humantime_serde")]
    pub shutdown_timeout: Duration,

    #[serde(default = "get_default_resolve_timeout", with = "humantime_serde")]
    pub resolve_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: get_default_address(),
            port: get_default_port(),
            threads: get_default_threads(),
            disable_shared_config: false,
            on_resolve_error: FailurePolicy::default(),
            read_timeout: get_default_read_timeout(),
            write_timeout: get_default_write_timeout(),
            idle_timeout: get_default_idle_timeout(),
            shutdown_timeout: get_default_shutdown_timeout(),
            resolve_timeout: get_default_resolve_timeout(),
        }
    }
}

impl Config {
    pub fn read_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(Into::into)
    }

    /// Validate the configuration and fill in the derived values.
    pub fn resolve(&self) -> Result<ResolvedConfig, ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidPort);
        }

        if self.threads == 0 {
            return Err(ConfigError::InvalidThreads);
        }

        for (name, timeout) in [
            ("read_timeout", self.read_timeout),
            ("write_timeout", self.write_timeout),
            ("idle_timeout", self.idle_timeout),
            ("shutdown_timeout", self.shutdown_timeout),
            ("resolve_timeout", self.resolve_timeout),
        ] {
            if timeout.is_zero() {
                return Err(ConfigError::InvalidTimeout(name));
            }
        }

        Ok(ResolvedConfig {
            address: SocketAddr::new(self.address, self.port),
            threads: self.threads,
            shared_config: SharedConfig::from_disabled_flag(self.disable_shared_config),
            resolve_timeout: self.resolve_timeout,
            server: ServerOptions {
                read_timeout: self.read_timeout,
                write_timeout: self.write_timeout,
                idle_timeout: self.idle_timeout,
                shutdown_timeout: self.shutdown_timeout,
                failure_policy: self.on_resolve_error,
            },
        })
    }
}

/// The validated configuration.
#[derive(Clone, Debug)]
pub struct ResolvedConfig {
    pub address: SocketAddr,
    pub threads: usize,
    pub shared_config: SharedConfig,
    pub resolve_timeout: Duration,
    pub server: ServerOptions,
}
