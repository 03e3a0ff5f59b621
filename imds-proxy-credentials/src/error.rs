use {
    aws_credential_types::provider::error::CredentialsError,
    aws_smithy_types::error::display::DisplayErrorContext,
    std::{
        error::Error,
        fmt::{Display, Formatter, Result as FmtResult},
        time::Duration,
    },
};

/// Failure to produce credentials for a single request.
#[derive(Debug)]
pub enum ResolveError {
    /// No provider in the chain could produce credentials.
    Credentials(CredentialsError),

    /// The provider chain did not answer within the resolution timeout.
    TimedOut(Duration),
}

impl ResolveError {
    /// The `Code` reported to callers when failures are answered instead of being fatal.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Credentials(_) => "CredentialsUnavailable",
            Self::TimedOut(_) => "CredentialsTimeout",
        }
    }
}

impl Display for ResolveError {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            // DisplayErrorContext walks the whole source chain so every provider's reason is reported.
            Self::Credentials(e) => write!(f, "Unable to resolve credentials: {}", DisplayErrorContext(e)),
            Self::TimedOut(d) => write!(f, "Credential provider chain did not respond within {}ms", d.as_millis()),
        }
    }
}

impl Error for ResolveError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Credentials(e) => Some(e),
            Self::TimedOut(_) => None,
        }
    }
}

impl From<CredentialsError> for ResolveError {
    fn from(e: CredentialsError) -> Self {
        Self::Credentials(e)
    }
}
