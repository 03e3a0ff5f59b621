use {
    aws_config::{
        default_provider::credentials::DefaultCredentialsChain, ecs::EcsCredentialsProvider,
        environment::EnvironmentVariableCredentialsProvider, imds::credentials::ImdsCredentialsProvider,
        meta::credentials::CredentialsProviderChain,
    },
    aws_credential_types::provider::SharedCredentialsProvider,
    log::debug,
    std::{env, ffi::OsString},
};

/// Variable the AWS SDKs read for the container credentials endpoint path.
pub const CONTAINER_CREDENTIALS_RELATIVE_URI_VAR: &str = "AWS_CONTAINER_CREDENTIALS_RELATIVE_URI";

/// Alternate spelling set by some Terraform/GitLab runner setups that never export the canonical variable.
pub const CONTAINER_CREDENTIALS_ALIAS_VAR: &str = "AWS_CRED_CONTAINER_RELATIVE_URI";

/// Whether profile-based ("shared") configuration participates in credential resolution.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SharedConfig {
    /// Environment, shared config/credentials files (including SSO and assume-role profiles), web identity,
    /// container credentials, then instance metadata.
    #[default]
    Enabled,

    /// Environment, container credentials, then instance metadata. `AWS_PROFILE` and profile files are ignored.
    Disabled,
}

impl SharedConfig {
    pub fn from_disabled_flag(disabled: bool) -> Self {
        if disabled {
            Self::Disabled
        } else {
            Self::Enabled
        }
    }
}

/// Copy `AWS_CRED_CONTAINER_RELATIVE_URI` into `AWS_CONTAINER_CREDENTIALS_RELATIVE_URI` if it is set and non-empty.
///
/// The canonical variable is overwritten even when it already has a value. Returns `true` if the alias was applied.
///
/// # Safety
/// This modifies the process environment. It must be called before any other thread exists, i.e. before the async
/// runtime is built.
pub unsafe fn apply_container_credentials_alias() -> bool {
    match container_uri_from_alias(|name| env::var_os(name)) {
        Some(value) => {
            debug!("Setting {CONTAINER_CREDENTIALS_RELATIVE_URI_VAR} from {CONTAINER_CREDENTIALS_ALIAS_VAR}");
            // SAFETY: the caller guarantees no other thread is reading or writing the environment.
            unsafe { env::set_var(CONTAINER_CREDENTIALS_RELATIVE_URI_VAR, value) };
            true
        }
        None => false,
    }
}

/// The value the canonical container URI variable should take, if the alias is set to something non-empty.
fn container_uri_from_alias(lookup: impl Fn(&str) -> Option<OsString>) -> Option<OsString> {
    lookup(CONTAINER_CREDENTIALS_ALIAS_VAR).filter(|value| !value.is_empty())
}

/// Build the provider chain for the given shared-configuration mode.
///
/// Construction never fails: a chain that cannot find credentials reports that on each resolution instead.
pub async fn build_provider_chain(shared_config: SharedConfig) -> SharedCredentialsProvider {
    match shared_config {
        SharedConfig::Enabled => {
            debug!("Building default credential provider chain");
            SharedCredentialsProvider::new(DefaultCredentialsChain::builder().build().await)
        }
        SharedConfig::Disabled => {
            debug!("Building credential provider chain without shared configuration");
            let chain = CredentialsProviderChain::first_try("Environment", EnvironmentVariableCredentialsProvider::new())
                .or_else("EcsContainer", EcsCredentialsProvider::builder().build())
                .or_else("Ec2InstanceMetadata", ImdsCredentialsProvider::builder().build());
            SharedCredentialsProvider::new(chain)
        }
    }
}
