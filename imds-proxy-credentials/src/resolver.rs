use {
    crate::{CredentialRecord, ResolveError, SharedConfig, build_provider_chain},
    aws_credential_types::{
        Credentials,
        provider::{ProvideCredentials, SharedCredentialsProvider},
    },
    chrono::{DateTime, TimeDelta, Utc},
    log::debug,
    std::{
        fmt::{Debug, Formatter, Result as FmtResult},
        time::Duration,
    },
    tokio::time::timeout,
};

/// Expiration reported for credentials whose provider has no expiry (e.g. static keys), so callers re-poll soon.
pub const FALLBACK_EXPIRATION: Duration = Duration::from_secs(5 * 60);

/// Default bound on a single call into the provider chain.
pub const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Turns provider chain results into [CredentialRecord]s.
///
/// The provider is called on every [resolve][CredentialResolver::resolve]; nothing is cached here.
#[derive(Clone)]
pub struct CredentialResolver {
    provider: SharedCredentialsProvider,
    timeout: Duration,
}

impl CredentialResolver {
    pub fn new(provider: impl ProvideCredentials + 'static, timeout: Duration) -> Self {
        Self {
            provider: SharedCredentialsProvider::new(provider),
            timeout,
        }
    }

    /// Create a resolver backed by the AWS provider chain for the given shared-configuration mode.
    pub async fn from_chain(shared_config: SharedConfig, timeout: Duration) -> Self {
        Self {
            provider: build_provider_chain(shared_config).await,
            timeout,
        }
    }

    #[inline]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Ask the provider chain for credentials and render them as an instance metadata credential document.
    pub async fn resolve(&self) -> Result<CredentialRecord, ResolveError> {
        let credentials = match timeout(self.timeout, self.provider.provide_credentials()).await {
            Ok(result) => result?,
            Err(_) => return Err(ResolveError::TimedOut(self.timeout)),
        };

        Ok(assemble(&credentials, Utc::now()))
    }
}

impl Debug for CredentialResolver {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        f.debug_struct("CredentialResolver")
            .field("provider", &self.provider)
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn assemble(credentials: &Credentials, now: DateTime<Utc>) -> CredentialRecord {
    let expiration = match credentials.expiry() {
        Some(expiry) => DateTime::<Utc>::from(expiry),
        None => {
            debug!("Provider reported no expiration; substituting {}s", FALLBACK_EXPIRATION.as_secs());
            now + TimeDelta::seconds(FALLBACK_EXPIRATION.as_secs() as i64)
        }
    };

    CredentialRecord::new(
        credentials.access_key_id(),
        credentials.secret_access_key(),
        credentials.session_token().unwrap_or_default(),
        now,
        expiration,
    )
}
