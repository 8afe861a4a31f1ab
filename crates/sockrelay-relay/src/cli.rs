//! CLI module for the relay directions and the fake server.
//!
//! Used by the `sockrelay` binary; each `run_*` function owns process-level
//! concerns (logging, metrics exporter, signals) and then hands a
//! cancellation token to the relay.

use std::io;
use std::path::{Path, PathBuf};

use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use sockrelay_core::defaults::DEFAULT_FAKE_SOCKET_PATH;

use crate::config::{
    LoggingConfig, RelayFile, RelayOverrides, normalize_log_level, resolve_settings,
};
use crate::direction::{tcp_to_tcp, tcp_to_unix, unix_to_tcp};
use crate::endpoint::remove_socket_file;
use crate::engine::DuplexRelay;
use crate::error::RelayError;
use crate::fake::run_fake_server;

/// Flags shared by every relay direction.
#[derive(Args, Debug, Clone, Default)]
pub struct CommonArgs {
    /// Optional TOML config file; flags take precedence over it
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: RelayOverrides,

    /// Serve Prometheus metrics on this address (e.g. 127.0.0.1:9100)
    #[arg(long)]
    pub metrics_listen: Option<String>,
}

/// Relay from a TCP source to a TCP destination.
#[derive(Args, Debug, Clone)]
pub struct TcpToTcpArgs {
    /// Source TCP address in `host:port` format
    #[arg(long)]
    pub src: String,

    /// Destination TCP address to listen on, in `host:port` format
    #[arg(long)]
    pub dst: String,

    #[command(flatten)]
    pub common: CommonArgs,
}

/// Relay from a TCP source to a Unix domain socket.
#[derive(Args, Debug, Clone)]
pub struct TcpToUnixArgs {
    /// Source TCP address in `host:port` format
    #[arg(long)]
    pub src: String,

    /// Unix socket path to listen on
    #[arg(long)]
    pub dst: PathBuf,

    #[command(flatten)]
    pub common: CommonArgs,
}

/// Relay from a Unix domain socket to a TCP destination.
#[derive(Args, Debug, Clone)]
pub struct UnixToTcpArgs {
    /// Existing Unix socket path to dial
    #[arg(long)]
    pub src: PathBuf,

    /// Destination TCP address to listen on, in `host:port` format
    #[arg(long)]
    pub dst: String,

    #[command(flatten)]
    pub common: CommonArgs,
}

/// Fake Unix socket server.
#[derive(Args, Debug, Clone)]
pub struct FakeArgs {
    /// Socket path to serve on
    #[arg(long, default_value = DEFAULT_FAKE_SOCKET_PATH)]
    pub path: PathBuf,

    /// Log level override (e.g. "info", "debug", "trace")
    #[arg(long, env = "LOG_LEVEL")]
    pub log_level: Option<String>,
}

pub async fn run_tcp_to_tcp(args: TcpToTcpArgs) -> Result<(), Box<dyn std::error::Error>> {
    let file = resolve(&args.common)?;
    let relay = tcp_to_tcp(&args.src, &args.dst, &file.relay)?;
    start(&file, &args.common);
    run_until_signal(relay, None).await
}

pub async fn run_tcp_to_unix(args: TcpToUnixArgs) -> Result<(), Box<dyn std::error::Error>> {
    let file = resolve(&args.common)?;
    let relay = tcp_to_unix(&args.src, args.dst.clone(), &file.relay)?;
    start(&file, &args.common);
    run_until_signal(relay, Some(args.dst.as_path())).await
}

pub async fn run_unix_to_tcp(args: UnixToTcpArgs) -> Result<(), Box<dyn std::error::Error>> {
    let file = resolve(&args.common)?;
    let relay = unix_to_tcp(args.src, &args.dst, &file.relay)?;
    start(&file, &args.common);
    run_until_signal(relay, None).await
}

pub async fn run_fake(args: FakeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let level = args
        .log_level
        .as_deref()
        .map(normalize_log_level)
        .transpose()?;
    init_tracing(&LoggingConfig {
        level,
        format: None,
    });

    let shutdown = spawn_shutdown_handler();
    run_fake_server(&args.path, shutdown).await?;
    Ok(())
}

fn resolve(common: &CommonArgs) -> Result<RelayFile, RelayError> {
    Ok(resolve_settings(
        common.config.as_deref(),
        &common.overrides,
    )?)
}

/// Logging and the optional metrics exporter, once validation has passed.
fn start(file: &RelayFile, common: &CommonArgs) {
    init_tracing(&file.logging);

    if let Some(listen) = &common.metrics_listen {
        match sockrelay_metrics::init_prometheus(listen) {
            Ok(()) => info!("metrics exporter listening on {}", listen),
            Err(e) => warn!("failed to start metrics exporter: {}", e),
        }
    }
}

/// Run `relay` until SIGINT/SIGTERM, then remove `socket_path` if the relay
/// created it.
async fn run_until_signal(
    relay: DuplexRelay,
    socket_path: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let shutdown = spawn_shutdown_handler();
    let result = relay.relay(shutdown).await;

    if let Some(path) = socket_path {
        // A path that was already taken belongs to someone else.
        let foreign = matches!(
            &result,
            Err(RelayError::Listen { source, .. }) if source.kind() == io::ErrorKind::AddrInUse
        );
        if !foreign {
            remove_socket_file(path);
        }
    }

    result.map_err(|e| Box::new(e) as Box<dyn std::error::Error>)
}

/// Cancel the returned token on the first SIGINT or SIGTERM.
fn spawn_shutdown_handler() -> CancellationToken {
    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();

    tokio::spawn(async move {
        shutdown_signal_handler().await;
        info!("shutdown signal received");
        shutdown_signal.cancel();
    });

    shutdown
}

/// Wait for shutdown signals (SIGTERM, SIGINT).
async fn shutdown_signal_handler() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Initialize the tracing subscriber.
///
/// Logs go to stderr. `format` is one of json, compact or pretty (the
/// default); `level` is a level name (see [`normalize_log_level`]) or an
/// `EnvFilter` directive, and defaults to info.
/// A subscriber installed earlier (e.g. by a test harness) is left alone.
pub fn init_tracing(config: &LoggingConfig) {
    let level = match config.level.as_deref().map(normalize_log_level) {
        Some(Ok(level)) => level,
        Some(Err(e)) => {
            eprintln!("{e}, using info");
            "info".to_string()
        }
        None => "info".to_string(),
    };
    let filter = EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("info"));

    let result = match config.format.as_deref().unwrap_or("pretty") {
        "json" => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(io::stderr))
            .try_init(),
        "compact" => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact().with_writer(io::stderr))
            .try_init(),
        _ => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(io::stderr))
            .try_init(),
    };

    if let Err(e) = result {
        eprintln!("tracing already initialized: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[command(subcommand)]
        command: TestCommand,
    }

    #[derive(clap::Subcommand, Debug)]
    enum TestCommand {
        TcpToTcp(TcpToTcpArgs),
        TcpToUnix(TcpToUnixArgs),
        UnixToTcp(UnixToTcpArgs),
        Fake(FakeArgs),
    }

    #[test]
    fn test_parse_tcp_to_unix_flags() {
        let cli = TestCli::try_parse_from([
            "sockrelay",
            "tcp-to-unix",
            "--src",
            "127.0.0.1:8080",
            "--dst",
            "/tmp/relay.sock",
            "--buffer-size",
            "4096",
            "--health-check-interval",
            "5m",
        ])
        .unwrap();

        let TestCommand::TcpToUnix(args) = cli.command else {
            panic!("wrong subcommand");
        };
        assert_eq!(args.src, "127.0.0.1:8080");
        assert_eq!(args.dst, PathBuf::from("/tmp/relay.sock"));
        assert_eq!(args.common.overrides.buffer_size, Some(4096));
        assert_eq!(
            args.common.overrides.health_check_interval,
            Some(std::time::Duration::from_secs(300))
        );

        let file = resolve(&args.common).unwrap();
        assert_eq!(file.relay.buffer_size, 4096);
    }

    #[test]
    fn test_src_and_dst_required() {
        assert!(TestCli::try_parse_from(["sockrelay", "tcp-to-tcp", "--src", "a:1"]).is_err());
        assert!(TestCli::try_parse_from(["sockrelay", "unix-to-tcp", "--dst", "a:1"]).is_err());
    }

    #[test]
    fn test_defaults_without_flags() {
        let cli = TestCli::try_parse_from([
            "sockrelay",
            "tcp-to-tcp",
            "--src",
            "127.0.0.1:1",
            "--dst",
            "127.0.0.1:2",
        ])
        .unwrap();
        let TestCommand::TcpToTcp(args) = cli.command else {
            panic!("wrong subcommand");
        };
        let file = resolve(&args.common).unwrap();
        assert_eq!(file.relay.buffer_size, 16384);
        assert_eq!(
            file.relay.health_check_interval,
            std::time::Duration::from_secs(30)
        );
    }

    #[test]
    fn test_fake_default_path() {
        let cli = TestCli::try_parse_from(["sockrelay", "fake"]).unwrap();
        let TestCommand::Fake(args) = cli.command else {
            panic!("wrong subcommand");
        };
        assert_eq!(args.path, PathBuf::from("./test.sock"));
    }

    #[tokio::test]
    async fn test_socket_in_use_is_not_removed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dst.sock");
        let _owner = tokio::net::UnixListener::bind(&path).unwrap();

        let relay = tcp_to_unix(
            "127.0.0.1:1",
            path.clone(),
            &crate::config::RelaySettings::default(),
        )
        .unwrap();
        let err = run_until_signal(relay, Some(path.as_path())).await.unwrap_err();
        assert!(err.to_string().contains("unix socket"));
        assert!(path.exists());
    }
}
