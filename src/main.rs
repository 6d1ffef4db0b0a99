//! wirecall - framed RPC over TCP
//!
//! `wirecall serve` runs an echo node; `wirecall call` issues a single call against one.

mod config;

use clap::{Parser, Subcommand};
use config::Config;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tracing_subscriber::EnvFilter;
use wirecall_protocol::{Envelope, EnvelopeCodec, JsonRegistry, Payload};
use wirecall_rpc::{Endpoint, ReplyContext, RpcError};
use wirecall_session::{Session, SessionConfig};

/// How long shutdown waits for closed sessions to flush their queues.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Type name of the echo payload; also the method name it is served under.
const ECHO_TYPE: &str = "wirecall.Echo";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Echo {
    message: String,
}

type RpcSession = Session<Envelope<Payload>>;
type Sessions = Arc<Mutex<HashMap<String, RpcSession>>>;

#[derive(Parser)]
#[command(name = "wirecall")]
#[command(about = "Framed request/response messaging over TCP")]
#[command(version)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, env = "WIRECALL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an echo node
    Serve {
        /// Address to listen on (overrides network.bind_addr)
        #[arg(short, long)]
        bind: Option<SocketAddr>,
    },

    /// Send one echo call and print the reply
    Call {
        /// Node address
        #[arg(short, long, default_value = "127.0.0.1:7700")]
        addr: SocketAddr,

        /// Message to send
        #[arg(short, long)]
        message: String,

        /// Call timeout in milliseconds (overrides rpc.default_timeout_ms)
        #[arg(short, long)]
        timeout_ms: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match Config::load(cli.config.as_deref()) {
        Ok(c) => {
            if let Some(path) = &cli.config {
                tracing::info!("Loaded config from {}", path.display());
            }
            c
        }
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            return Err(e.into());
        }
    };

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(addr) = bind {
                config.network.bind_addr = addr;
            }

            let listener = TcpListener::bind(config.network.bind_addr).await?;
            tracing::info!("Starting wirecall node");
            tracing::info!("  Bind address: {}", listener.local_addr()?);
            tracing::info!("  Max connections: {}", config.network.max_connections);
            tracing::info!("  Send queue: {}", config.session.send_queue_capacity);

            let shutdown = async {
                tokio::signal::ctrl_c().await.ok();
                tracing::info!("Received shutdown signal, stopping node...");
            };
            serve(listener, &config, shutdown).await?;
            tracing::info!("Node stopped");
        }
        Commands::Call {
            addr,
            message,
            timeout_ms,
        } => {
            let timeout = timeout_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| config.rpc.default_timeout());
            let reply = call(addr, &config.session, message, timeout).await?;
            println!("{}", reply);
        }
    }

    Ok(())
}

fn registry() -> Arc<JsonRegistry> {
    let mut registry = JsonRegistry::new();
    registry.register::<Echo>(ECHO_TYPE);
    Arc::new(registry)
}

fn echo_endpoint() -> Arc<Endpoint<Payload>> {
    let endpoint = Arc::new(Endpoint::new());
    endpoint
        .server()
        .register(ECHO_TYPE, |data: Payload, ctx: ReplyContext<Payload>| {
            if let Err(e) = ctx.reply_ok(data) {
                tracing::warn!("Failed to reply to request {}: {}", ctx.sequence(), e);
            }
        });
    endpoint
}

/// Accepts connections until `shutdown` resolves, then closes every session
/// and waits (up to [`SHUTDOWN_GRACE`]) for their write workers to finish.
async fn serve(
    listener: TcpListener,
    config: &Config,
    shutdown: impl Future<Output = ()>,
) -> std::io::Result<()> {
    let registry = registry();
    let endpoint = echo_endpoint();
    let sessions: Sessions = Arc::default();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        if sessions.lock().len() >= config.network.max_connections {
                            tracing::warn!("Connection limit reached, rejecting {}", addr);
                            continue;
                        }
                        if let Err(e) =
                            open_session(stream, &registry, &endpoint, &sessions, &config.session)
                        {
                            tracing::warn!("Failed to start session for {}: {}", addr, e);
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Accept error: {}", e);
                    }
                }
            }
            _ = &mut shutdown => break,
        }
    }

    let open: Vec<RpcSession> = sessions.lock().values().cloned().collect();
    tracing::info!("Closing {} session(s)", open.len());
    for session in open {
        session.close("node shutting down");
    }

    // Close callbacks remove sessions once their transports are shut down.
    let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
        while !sessions.lock().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    if drained.is_err() {
        tracing::warn!(
            "{} session(s) still open after {:?}",
            sessions.lock().len(),
            SHUTDOWN_GRACE
        );
    }

    Ok(())
}

fn open_session(
    stream: TcpStream,
    registry: &Arc<JsonRegistry>,
    endpoint: &Arc<Endpoint<Payload>>,
    sessions: &Sessions,
    config: &SessionConfig,
) -> Result<(), RpcError> {
    let session = Session::with_config(stream, EnvelopeCodec::new(registry.clone()), config);
    let id = session.id().to_string();

    let tracked = sessions.clone();
    let closed_id = id.clone();
    session.set_close_callback(move |_reason| {
        tracked.lock().remove(&closed_id);
    });

    tracing::info!("[{}] Connection from {:?}", id, session.remote_addr());
    tracing::debug!(
        "[{}] Send queue capacity: {}",
        id,
        session.send_queue_capacity()
    );
    sessions.lock().insert(id, session.clone());

    if let Err(e) = endpoint.attach(&session) {
        session.close(e.to_string());
        return Err(e);
    }
    Ok(())
}

/// Dials `addr`, sends one echo call and returns the echoed message.
async fn call(
    addr: SocketAddr,
    config: &SessionConfig,
    message: String,
    timeout: Duration,
) -> Result<String, Box<dyn std::error::Error>> {
    let stream = TcpStream::connect(addr).await?;
    let session = Session::with_config(stream, EnvelopeCodec::new(registry()), config);
    let endpoint: Arc<Endpoint<Payload>> = Arc::new(Endpoint::new());
    endpoint.attach(&session)?;

    let result = endpoint
        .client()
        .call(&session, ECHO_TYPE, Payload::new(Echo { message }), timeout)
        .await;
    session.close("call finished");

    match result?.downcast::<Echo>() {
        Ok(echo) => Ok(echo.message),
        Err(other) => Err(format!("unexpected reply type {}", other.type_name()).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::sync::oneshot;
    use tokio::task::JoinHandle;
    use wirecall_protocol::{Codec, Request};

    async fn start_node(config: Config) -> (SocketAddr, oneshot::Sender<()>) {
        let (addr, stop, _node) = spawn_node(config).await;
        (addr, stop)
    }

    async fn spawn_node(config: Config) -> (SocketAddr, oneshot::Sender<()>, JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let node = tokio::spawn(async move {
            let shutdown = async {
                let _ = stop_rx.await;
            };
            serve(listener, &config, shutdown).await.unwrap();
        });

        (addr, stop_tx, node)
    }

    #[tokio::test]
    async fn test_shutdown_closes_open_connections() {
        let (addr, stop, node) = spawn_node(Config::default()).await;

        // Complete one echo round trip so the node has a started session.
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = Envelope::Request(Request::new(
            1,
            ECHO_TYPE,
            Payload::new(Echo {
                message: "hi".to_string(),
            }),
        ));
        let encoded = EnvelopeCodec::new(registry()).encode(&request).unwrap();
        stream.write_all(&encoded).await.unwrap();

        let mut buf = vec![0u8; 1024];
        let n = tokio::time::timeout(Duration::from_secs(2), stream.read(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert!(n > 0);

        stop.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(2), node)
            .await
            .unwrap()
            .unwrap();

        // The node only returns after the session's transport was shut down.
        let n = tokio::time::timeout(Duration::from_millis(500), stream.read(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_echo_call() {
        let (addr, _stop) = start_node(Config::default()).await;

        let reply = call(
            addr,
            &SessionConfig::default(),
            "hello".to_string(),
            Duration::from_secs(2),
        )
        .await
        .unwrap();
        assert_eq!(reply, "hello");
    }

    #[tokio::test]
    async fn test_sequential_calls() {
        let (addr, _stop) = start_node(Config::default()).await;

        for i in 0..5 {
            let message = format!("msg-{}", i);
            let reply = call(addr, &SessionConfig::default(), message.clone(), Duration::from_secs(2))
                .await
                .unwrap();
            assert_eq!(reply, message);
        }
    }

    #[tokio::test]
    async fn test_call_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = call(
            addr,
            &SessionConfig::default(),
            "hello".to_string(),
            Duration::from_millis(200),
        )
        .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_parses_call() {
        let cli = Cli::try_parse_from([
            "wirecall", "call", "--addr", "127.0.0.1:9000", "--message", "hi",
        ])
        .unwrap();
        match cli.command {
            Commands::Call {
                addr,
                message,
                timeout_ms,
            } => {
                assert_eq!(addr.port(), 9000);
                assert_eq!(message, "hi");
                assert_eq!(timeout_ms, None);
            }
            Commands::Serve { .. } => panic!("expected call"),
        }
    }
}
