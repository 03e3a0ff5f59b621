use {
    crate::{
        error::ServerError,
        routes::{AppState, router},
        stream::DeadlineStream,
    },
    axum::Router,
    clap::ValueEnum,
    hyper::server::conn::http1,
    hyper_util::{
        rt::TokioIo,
        server::graceful::GracefulShutdown,
        service::TowerToHyperService,
    },
    imds_proxy_credentials::{CredentialResolver, ResolveError},
    log::{debug, error, info, warn},
    serde::Deserialize,
    std::{
        fmt::{Display, Formatter, Result as FmtResult},
        future::{Future, pending},
        net::SocketAddr,
        time::Duration,
    },
    tokio::{
        net::{TcpListener, TcpStream},
        signal,
        sync::{
            mpsc::{Receiver, channel},
            watch,
        },
        task::JoinSet,
        time::sleep,
    },
};

const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

type ConnectionIo = TokioIo<DeadlineStream<TcpStream>>;

/// What happens when the provider chain cannot produce credentials for a request.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop serving and exit with an error; the failing request gets no response.
    #[default]
    Exit,

    /// Answer the failing request with HTTP 500 and keep serving.
    Respond,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ServerOptions {
    /// Time allowed for a new connection to start its first request, and for a request to arrive completely once
    /// its first byte has been read.
    pub read_timeout: Duration,

    /// Time allowed from the first byte of a request until its response is completely written. Resolution happens
    /// inside this window, so a response that misses it is dropped along with the connection.
    pub write_timeout: Duration,

    /// Time a keep-alive connection may wait for its next request.
    pub idle_timeout: Duration,

    /// Time in-flight requests are given to finish after an interrupt.
    pub shutdown_timeout: Duration,

    pub failure_policy: FailurePolicy,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(60),
            shutdown_timeout: Duration::from_secs(5),
            failure_policy: FailurePolicy::Exit,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ServerState {
    Running,
    Draining,
    Stopped,
}

/// How the drain after an interrupt ended.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ShutdownOutcome {
    /// Every in-flight connection finished.
    Drained,

    /// The shutdown deadline passed and remaining connections were abandoned.
    DeadlineElapsed,
}

impl Display for ShutdownOutcome {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            Self::Drained => f.write_str("all connections drained"),
            Self::DeadlineElapsed => f.write_str("shutdown deadline elapsed"),
        }
    }
}

/// Bind the listening socket. Failure here is a startup error.
pub async fn bind(address: SocketAddr) -> Result<TcpListener, ServerError> {
    TcpListener::bind(address).await.map_err(|e| ServerError::Bind(address, e))
}

/// Resolves on the first interrupt (SIGINT, Ctrl-C).
///
/// Only the interrupt triggers a graceful drain. SIGTERM, SIGQUIT, and SIGKILL keep their default behavior and end
/// the process immediately.
pub async fn interrupt() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Interrupt received"),
        Err(e) => {
            error!("Unable to listen for interrupt signal: {e}");
            pending::<()>().await
        }
    }
}

/// The instance metadata credential endpoint.
pub struct MetadataServer {
    router: Router,
    fatal_rx: Receiver<ResolveError>,
    options: ServerOptions,
    state: watch::Sender<ServerState>,
}

impl MetadataServer {
    pub fn new(resolver: CredentialResolver, options: ServerOptions) -> Self {
        let (fatal_tx, fatal_rx) = channel(1);
        let router = router(AppState::new(resolver, options.failure_policy, fatal_tx));

        Self {
            router,
            fatal_rx,
            options,
            state: watch::Sender::new(ServerState::Running),
        }
    }

    /// Follow the server through `Running`, `Draining`, and `Stopped`.
    pub fn subscribe(&self) -> watch::Receiver<ServerState> {
        self.state.subscribe()
    }

    /// Serve connections from `listener` until `shutdown` resolves, then drain in-flight connections for at most
    /// the shutdown timeout.
    ///
    /// With [FailurePolicy::Exit], a resolution failure stops the server at once: the listener is closed, every
    /// connection is aborted, and the error is returned.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<ShutdownOutcome, ServerError>
    where
        F: Future<Output = ()>,
    {
        let Self {
            router,
            mut fatal_rx,
            options,
            state,
        } = self;

        // Request and keep-alive deadlines are enforced by DeadlineStream. No timer is given to hyper, so its own
        // header timeout, which would also cut idle keep-alive connections at the read timeout, stays off. Half-close
        // keeps hyper from reading while a request is being resolved; that read would run against the read timeout.
        let mut http = http1::Builder::new();
        http.half_close(true);

        let graceful = GracefulShutdown::new();
        // Dropping the set aborts whatever is still running, which is how connections are abandoned.
        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        enter(&state, ServerState::Running);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,

                Some(e) = fatal_rx.recv() => return Err(fatal(&state, e)),

                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!("Accepted connection from {peer}");
                        let service = TowerToHyperService::new(router.clone());
                        let conn = graceful.watch(http.serve_connection(wrap_stream(stream, &options), service));
                        connections.spawn(async move {
                            if let Err(e) = conn.await {
                                debug!("Connection from {peer} closed: {e}");
                            }
                        });
                    }
                    Err(e) => {
                        warn!("Unable to accept connection: {e}");
                        sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },

                Some(_) = connections.join_next(), if !connections.is_empty() => (),
            }
        }

        enter(&state, ServerState::Draining);
        drop(listener);

        let outcome = tokio::select! {
            _ = graceful.shutdown() => ShutdownOutcome::Drained,
            _ = sleep(options.shutdown_timeout) => {
                warn!("{} connection(s) still open after {}ms; abandoning", connections.len(), options.shutdown_timeout.as_millis());
                ShutdownOutcome::DeadlineElapsed
            }
            Some(e) = fatal_rx.recv() => return Err(fatal(&state, e)),
        };

        connections.abort_all();
        enter(&state, ServerState::Stopped);
        info!("AWS credential proxy shut down: {outcome}");
        Ok(outcome)
    }
}

fn wrap_stream(stream: TcpStream, options: &ServerOptions) -> ConnectionIo {
    TokioIo::new(DeadlineStream::new(stream, options.read_timeout, options.write_timeout, options.idle_timeout))
}

// Logged by whoever handles the returned error.
fn fatal(state: &watch::Sender<ServerState>, e: ResolveError) -> ServerError {
    enter(state, ServerState::Stopped);
    e.into()
}

fn enter(state: &watch::Sender<ServerState>, next: ServerState) {
    debug!("Server state: {next:?}");
    state.send_replace(next);
}
