//! sockrelay CLI.
//!
//! - `sockrelay tcp-to-tcp` - Relay a TCP source to a TCP listener
//! - `sockrelay tcp-to-unix` - Relay a TCP source to a Unix socket listener
//! - `sockrelay unix-to-tcp` - Relay a Unix socket source to a TCP listener
//! - `sockrelay fake` - Serve a greeting on a Unix socket, for manual testing

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use sockrelay_relay::cli::{FakeArgs, TcpToTcpArgs, TcpToUnixArgs, UnixToTcpArgs};

/// sockrelay CLI.
#[derive(Parser)]
#[command(
    name = "sockrelay",
    version,
    about = "Relay byte streams between TCP and Unix domain sockets",
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Relay from a TCP source to a TCP destination.
    #[command(name = "tcp-to-tcp")]
    TcpToTcp(TcpToTcpArgs),

    /// Relay from a TCP source to a unix domain socket.
    #[command(name = "tcp-to-unix")]
    TcpToUnix(TcpToUnixArgs),

    /// Relay from a unix domain socket to a TCP destination.
    #[command(name = "unix-to-tcp")]
    UnixToTcp(UnixToTcpArgs),

    /// Fake unix domain socket server.
    #[command(name = "fake")]
    Fake(FakeArgs),

    /// Print version information.
    #[command(name = "version")]
    Version,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::TcpToTcp(args) => sockrelay_relay::cli::run_tcp_to_tcp(args).await,
        Commands::TcpToUnix(args) => sockrelay_relay::cli::run_tcp_to_unix(args).await,
        Commands::UnixToTcp(args) => sockrelay_relay::cli::run_unix_to_tcp(args).await,
        Commands::Fake(args) => sockrelay_relay::cli::run_fake(args).await,
        Commands::Version => {
            println!("{} {}", sockrelay_core::PROJECT_NAME, sockrelay_core::VERSION);
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
