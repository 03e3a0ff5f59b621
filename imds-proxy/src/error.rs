use {
    imds_proxy_credentials::ResolveError,
    std::{
        error::Error,
        fmt::{Display, Formatter, Result as FmtResult},
        io::Error as IOError,
        net::SocketAddr,
    },
    toml::de::Error as TomlDeError,
};

#[derive(Debug)]
pub enum ConfigError {
    DeserError(TomlDeError),
    IO(IOError),
    InvalidPort,
    InvalidThreads,
    InvalidTimeout(&'static str),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            Self::DeserError(e) => write!(f, "Deserialization error: {e}"),
            Self::IO(e) => write!(f, "I/O error: {e}"),
            Self::InvalidPort => write!(f, "Invalid port"),
            Self::InvalidThreads => write!(f, "Invalid thread count: at least one worker thread is required"),
            Self::InvalidTimeout(name) => write!(f, "Invalid {name}: must be greater than zero"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::DeserError(e) => Some(e),
            Self::IO(e) => Some(e),
            _ => None,
        }
    }
}

impl From<IOError> for ConfigError {
    fn from(e: IOError) -> Self {
        Self::IO(e)
    }
}

impl From<TomlDeError> for ConfigError {
    fn from(e: TomlDeError) -> Self {
        Self::DeserError(e)
    }
}

#[derive(Debug)]
pub enum ServerError {
    /// The listener could not be bound.
    Bind(SocketAddr, IOError),

    /// The provider chain failed while serving a request and resolution failures are fatal.
    Credentials(ResolveError),
}

impl Display for ServerError {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            Self::Bind(addr, e) => write!(f, "Unable to listen on {addr}: {e}"),
            Self::Credentials(e) => write!(f, "{e}"),
        }
    }
}

impl Error for ServerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Bind(_, e) => Some(e),
            Self::Credentials(e) => Some(e),
        }
    }
}

impl From<ResolveError> for ServerError {
    fn from(e: ResolveError) -> Self {
        Self::Credentials(e)
    }
}
