use {
    clap::Parser,
    env_logger::Env,
    imds_proxy::{Args, MetadataServer, ResolvedConfig, ServerError, ShutdownOutcome, bind, interrupt},
    imds_proxy_credentials::{
        CONTAINER_CREDENTIALS_ALIAS_VAR, CONTAINER_CREDENTIALS_RELATIVE_URI_VAR, CredentialResolver,
        apply_container_credentials_alias,
    },
    log::{debug, error, info},
    std::process::exit,
    tokio::runtime::Builder as RuntimeBuilder,
};

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = match args.load_config().and_then(|config| config.resolve()) {
        Ok(c) => c,
        Err(e) => {
            error!("Invalid configuration: {e}");
            exit(2);
        }
    };
    debug!("Resolved configuration: {config:?}");

    // SAFETY: the runtime has not been built yet, so this is the only thread touching the environment.
    if unsafe { apply_container_credentials_alias() } {
        info!("Using {CONTAINER_CREDENTIALS_ALIAS_VAR} as {CONTAINER_CREDENTIALS_RELATIVE_URI_VAR}");
    }

    let runtime = match RuntimeBuilder::new_multi_thread()
        .worker_threads(config.threads)
        .thread_name("imds-proxy")
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!("Unable to create runtime: {e}");
            exit(1);
        }
    };

    match runtime.block_on(run(config)) {
        // A drain cut short by the deadline still counts as a normal shutdown.
        Ok(_) => exit(0),
        Err(e) => {
            error!("{e}");
            exit(1);
        }
    }
}

async fn run(config: ResolvedConfig) -> Result<ShutdownOutcome, ServerError> {
    let listener = bind(config.address).await?;
    info!("Listening on {}", config.address);

    let resolver = CredentialResolver::from_chain(config.shared_config, config.resolve_timeout).await;
    debug!("Credential resolver: {resolver:?}");

    MetadataServer::new(resolver, config.server).serve(listener, interrupt()).await
}
