use {
    aws_credential_types::{
        Credentials,
        provider::{ProvideCredentials, error::CredentialsError, future},
    },
    chrono::{DateTime, Utc},
    imds_proxy::{FailurePolicy, MetadataServer, ServerError, ServerOptions, ServerState, ShutdownOutcome, bind},
    imds_proxy_credentials::{CredentialRecord, CredentialResolver},
    pretty_assertions::assert_eq,
    std::{net::SocketAddr, time::Duration},
    tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::{TcpListener, TcpStream},
        sync::{oneshot, watch},
        task::JoinHandle,
        time::{Instant, sleep, timeout},
    },
};

#[derive(Debug)]
struct DelayedProvider {
    delay: Duration,
    fail: bool,
}

impl ProvideCredentials for DelayedProvider {
    fn provide_credentials<'a>(&'a self) -> future::ProvideCredentials<'a>
    where
        Self: 'a,
    {
        future::ProvideCredentials::new(async move {
            sleep(self.delay).await;
            if self.fail {
                Err(CredentialsError::not_loaded("no providers in chain provided credentials"))
            } else {
                Ok(Credentials::new("AKIDEXAMPLE", "secret", Some("token".to_string()), None, "delayed"))
            }
        })
    }
}

struct Running {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    state: watch::Receiver<ServerState>,
    handle: JoinHandle<Result<ShutdownOutcome, ServerError>>,
}

async fn start(delay: Duration, fail: bool, shutdown_timeout: Duration) -> Running {
    let options = ServerOptions {
        shutdown_timeout,
        failure_policy: FailurePolicy::Exit,
        ..ServerOptions::default()
    };
    start_with(delay, fail, options).await
}

async fn start_with(delay: Duration, fail: bool, options: ServerOptions) -> Running {
    let listener: TcpListener = bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let resolver = CredentialResolver::new(
        DelayedProvider {
            delay,
            fail,
        },
        Duration::from_secs(30),
    );

    let server = MetadataServer::new(resolver, options);
    let state = server.subscribe();
    let (shutdown, rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(server.serve(listener, async move {
        let _ = rx.await;
    }));

    Running {
        addr,
        shutdown,
        state,
        handle,
    }
}

/// Read one `Content-Length` delimited response from a keep-alive connection. Returns `None` if the server closed
/// the connection first.
async fn read_response(stream: &mut TcpStream) -> Option<String> {
    let mut raw = Vec::new();
    let mut chunk = [0u8; 1024];

    loop {
        let text = String::from_utf8_lossy(&raw).into_owned();
        if let Some((head, body)) = text.split_once("\r\n\r\n") {
            let length = head
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length").then(|| value.trim().parse::<usize>().ok())?
                })
                .unwrap_or(0);
            if body.len() >= length {
                return Some(text);
            }
        }

        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return None,
            Ok(n) => raw.extend_from_slice(&chunk[..n]),
        }
    }
}

const KEEP_ALIVE_GET: &[u8] = b"GET / HTTP/1.1\r\nHost: 169.254.169.254\r\n\r\n";

/// Send a single request and read until the server closes the connection.
async fn send(addr: SocketAddr, method: &str, path: &str) -> std::io::Result<String> {
    let mut stream = TcpStream::connect(addr).await?;
    stream
        .write_all(format!("{method} {path} HTTP/1.1\r\nHost: 169.254.169.254\r\nConnection: close\r\n\r\n").as_bytes())
        .await?;
    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await?;
    Ok(String::from_utf8_lossy(&raw).into_owned())
}

fn split_response(response: &str) -> (&str, &str) {
    response.split_once("\r\n\r\n").expect("complete HTTP response")
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 2))]
async fn test_get_credentials() {
    let server = start(Duration::ZERO, false, Duration::from_secs(5)).await;

    for path in ["/", "/latest/meta-data/iam/security-credentials/gitlab-runner"] {
        let served_at = Utc::now();
        let response = send(server.addr, "GET", path).await.unwrap();
        let (head, body) = split_response(&response);
        assert!(head.starts_with("HTTP/1.1 200 OK"), "{head}");
        assert!(head.to_ascii_lowercase().contains("content-type: application/json"), "{head}");

        let record: CredentialRecord = serde_json::from_str(body).unwrap();
        assert_eq!(record.code, "Success");
        assert_eq!(record.r#type, "AWS-HMAC");
        assert_eq!(record.access_key_id, "AKIDEXAMPLE");
        assert_eq!(record.secret_access_key, "secret");
        assert_eq!(record.token, "token");

        let last_updated = DateTime::parse_from_rfc3339(&record.last_updated).unwrap().with_timezone(&Utc);
        assert!((last_updated - served_at).num_milliseconds().abs() <= 1000);
        let expiration = DateTime::parse_from_rfc3339(&record.expiration).unwrap().with_timezone(&Utc);
        assert_eq!((expiration - last_updated).num_seconds(), 300);
    }

    let response = send(server.addr, "POST", "/").await.unwrap();
    assert!(response.starts_with("HTTP/1.1 405"), "{response}");

    server.shutdown.send(()).unwrap();
    assert_eq!(server.handle.await.unwrap().unwrap(), ShutdownOutcome::Drained);
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 2))]
async fn test_shutdown_stops_accepting() {
    let server = start(Duration::ZERO, false, Duration::from_secs(5)).await;
    server.shutdown.send(()).unwrap();
    assert_eq!(server.handle.await.unwrap().unwrap(), ShutdownOutcome::Drained);

    assert!(TcpStream::connect(server.addr).await.is_err());
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 2))]
async fn test_in_flight_request_drains() {
    let server = start(Duration::from_millis(500), false, Duration::from_secs(5)).await;

    let addr = server.addr;
    let client = tokio::spawn(async move { send(addr, "GET", "/").await });
    // Let the request reach the handler before interrupting.
    sleep(Duration::from_millis(100)).await;

    let started = Instant::now();
    server.shutdown.send(()).unwrap();
    assert_eq!(server.handle.await.unwrap().unwrap(), ShutdownOutcome::Drained);
    assert!(started.elapsed() < Duration::from_secs(5));

    let response = client.await.unwrap().unwrap();
    assert!(response.starts_with("HTTP/1.1 200 OK"), "{response}");
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 2))]
async fn test_drain_deadline_elapses() {
    let server = start(Duration::from_secs(20), false, Duration::from_millis(300)).await;

    let addr = server.addr;
    let client = tokio::spawn(async move { send(addr, "GET", "/").await });
    sleep(Duration::from_millis(100)).await;

    let started = Instant::now();
    server.shutdown.send(()).unwrap();
    assert_eq!(server.handle.await.unwrap().unwrap(), ShutdownOutcome::DeadlineElapsed);
    assert!(started.elapsed() < Duration::from_secs(2));

    // The abandoned request never gets a response.
    match timeout(Duration::from_secs(2), client).await.unwrap().unwrap() {
        Ok(response) => assert!(!response.starts_with("HTTP/1.1"), "{response}"),
        Err(_) => (),
    }
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 2))]
async fn test_resolution_failure_is_fatal() {
    let server = start(Duration::ZERO, true, Duration::from_secs(5)).await;

    let addr = server.addr;
    let client = tokio::spawn(async move { send(addr, "GET", "/").await });

    let result = timeout(Duration::from_secs(5), server.handle).await.unwrap().unwrap();
    assert!(matches!(result, Err(ServerError::Credentials(_))), "{result:?}");
    assert_eq!(*server.state.borrow(), ServerState::Stopped);

    match timeout(Duration::from_secs(2), client).await.unwrap().unwrap() {
        Ok(response) => assert!(!response.starts_with("HTTP/1.1"), "{response}"),
        Err(_) => (),
    }

    assert!(TcpStream::connect(addr).await.is_err());
    drop(server.shutdown);
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 2))]
async fn test_keep_alive_survives_gap_longer_than_read_timeout() {
    let options = ServerOptions {
        read_timeout: Duration::from_millis(300),
        idle_timeout: Duration::from_secs(5),
        ..ServerOptions::default()
    };
    let server = start_with(Duration::ZERO, false, options).await;

    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    stream.write_all(KEEP_ALIVE_GET).await.unwrap();
    let first = read_response(&mut stream).await.expect("first response");
    assert!(first.starts_with("HTTP/1.1 200 OK"), "{first}");

    sleep(Duration::from_secs(1)).await;

    stream.write_all(KEEP_ALIVE_GET).await.unwrap();
    let second = read_response(&mut stream).await.expect("keep-alive connection closed before the idle timeout");
    assert!(second.starts_with("HTTP/1.1 200 OK"), "{second}");

    server.shutdown.send(()).unwrap();
    assert_eq!(server.handle.await.unwrap().unwrap(), ShutdownOutcome::Drained);
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 2))]
async fn test_idle_keep_alive_connection_is_closed() {
    let options = ServerOptions {
        idle_timeout: Duration::from_millis(300),
        ..ServerOptions::default()
    };
    let server = start_with(Duration::ZERO, false, options).await;

    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    stream.write_all(KEEP_ALIVE_GET).await.unwrap();
    assert!(read_response(&mut stream).await.is_some());

    // The server hangs up on its own once the idle timeout passes.
    let closed = timeout(Duration::from_secs(3), read_response(&mut stream)).await.unwrap();
    assert!(closed.is_none());

    server.shutdown.send(()).unwrap();
    server.handle.await.unwrap().unwrap();
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 2))]
async fn test_slow_request_is_cut_off() {
    let options = ServerOptions {
        read_timeout: Duration::from_millis(300),
        ..ServerOptions::default()
    };
    let server = start_with(Duration::ZERO, false, options).await;

    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    stream.write_all(b"GET / HTTP/1.1\r\nHost: 169.").await.unwrap();
    let response = timeout(Duration::from_secs(3), read_response(&mut stream)).await.unwrap();
    assert!(!response.is_some_and(|r| r.starts_with("HTTP/1.1 200")));

    server.shutdown.send(()).unwrap();
    server.handle.await.unwrap().unwrap();
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 2))]
async fn test_state_transitions() {
    let mut server = start(Duration::from_millis(500), false, Duration::from_secs(5)).await;
    assert_eq!(*server.state.borrow(), ServerState::Running);

    let addr = server.addr;
    let client = tokio::spawn(async move { send(addr, "GET", "/").await });
    sleep(Duration::from_millis(100)).await;

    server.shutdown.send(()).unwrap();
    server.state.wait_for(|s| *s == ServerState::Draining).await.unwrap();

    assert_eq!(server.handle.await.unwrap().unwrap(), ShutdownOutcome::Drained);
    assert_eq!(*server.state.borrow(), ServerState::Stopped);
    assert!(client.await.unwrap().unwrap().starts_with("HTTP/1.1 200 OK"));
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 2))]
async fn test_resolution_may_outlast_read_timeout() {
    let options = ServerOptions {
        read_timeout: Duration::from_millis(200),
        ..ServerOptions::default()
    };
    let server = start_with(Duration::from_millis(600), false, options).await;

    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    stream.write_all(KEEP_ALIVE_GET).await.unwrap();
    let response = read_response(&mut stream).await.expect("response");
    assert!(response.starts_with("HTTP/1.1 200 OK"), "{response}");

    server.shutdown.send(()).unwrap();
    server.handle.await.unwrap().unwrap();
}
