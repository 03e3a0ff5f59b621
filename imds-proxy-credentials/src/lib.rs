//! Resolution of AWS credentials through the standard provider chain, rendered as the JSON document served by the
//! EC2 instance metadata service (IMDS) credential endpoint.

mod chain;
mod error;
mod record;
mod resolver;

pub use self::{
    chain::{
        CONTAINER_CREDENTIALS_ALIAS_VAR, CONTAINER_CREDENTIALS_RELATIVE_URI_VAR, SharedConfig,
        apply_container_credentials_alias, build_provider_chain,
    },
    error::ResolveError,
    record::{CODE_SUCCESS, CREDENTIAL_TYPE_AWS_HMAC, CredentialRecord, ErrorRecord},
    resolver::{CredentialResolver, DEFAULT_RESOLVE_TIMEOUT, FALLBACK_EXPIRATION},
};
