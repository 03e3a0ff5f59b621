//! A local stand-in for the EC2 instance metadata service credential endpoint.
//!
//! Every `GET`, on any path, resolves credentials through the AWS provider chain and returns them as an IMDS
//! credential document. Nothing is cached; each request calls the chain anew.

mod cli;
mod config;
mod error;
mod routes;
mod server;
mod stream;

pub use self::{
    cli::Args,
    config::{Config, ResolvedConfig},
    error::{ConfigError, ServerError},
    server::{FailurePolicy, MetadataServer, ServerOptions, ServerState, ShutdownOutcome, bind, interrupt},
};
