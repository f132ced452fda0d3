use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};

use crate::exit::{CliError, CliResult, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod decode;
pub mod get;
pub mod serve;
pub mod set;
pub mod version;
pub mod watch;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a router accepting INDI clients.
    Serve(ServeArgs),
    /// Connect to a server and print every property event.
    Watch(WatchArgs),
    /// Print a snapshot of a server's properties.
    Get(GetArgs),
    /// Request new element values and wait for the driver's answer.
    Set(SetArgs),
    /// Decode an INDI byte stream from a file or stdin.
    Decode(DecodeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Decode(args) => decode::run(args, format),
        Command::Version(args) => version::run(args, format),
        Command::Serve(args) => block_on(serve::run(args)),
        Command::Watch(args) => block_on(watch::run(args, format)),
        Command::Get(args) => block_on(get::run(args, format)),
        Command::Set(args) => block_on(set::run(args, format)),
    }
}

fn block_on<F>(future: F) -> CliResult<i32>
where
    F: std::future::Future<Output = CliResult<i32>>,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::new(INTERNAL, format!("runtime setup failed: {err}")))?;
    runtime.block_on(future)
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to accept clients on.
    #[arg(long, default_value = "0.0.0.0:7624", env = "INDIWIRE_LISTEN")]
    pub listen: SocketAddr,
    /// Chain another INDI server (HOST:PORT). Repeatable.
    #[arg(long, value_name = "HOST:PORT")]
    pub upstream: Vec<String>,
}

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Server address (HOST:PORT).
    pub addr: String,
    /// Only print events of this device.
    #[arg(long)]
    pub device: Option<String>,
    /// Only print events of this vector.
    #[arg(long)]
    pub vector: Option<String>,
    /// Exit after printing N events.
    #[arg(long)]
    pub count: Option<usize>,
    /// Also receive BLOBs on a second connection.
    #[arg(long)]
    pub blobs: bool,
}

#[derive(Args, Debug)]
pub struct GetArgs {
    /// Server address (HOST:PORT).
    pub addr: String,
    /// Only show this device.
    #[arg(long)]
    pub device: Option<String>,
    /// Quiet period after the last definition before printing (e.g. 500ms).
    #[arg(long, default_value = "500ms")]
    pub settle: String,
    /// Maximum time to wait for the first definition (e.g. 5s).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct SetArgs {
    /// Server address (HOST:PORT).
    pub addr: String,
    pub device: String,
    pub vector: String,
    /// Element assignments, e.g. CONNECT=On or EXPOSURE=1.5. BLOB
    /// elements take `@path`.
    #[arg(required = true, value_name = "NAME=VALUE")]
    pub values: Vec<String>,
    /// Maximum time to wait for the definition and for the answer (e.g. 5s).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// File to decode. Default: stdin.
    pub file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Also show protocol and wire defaults.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `500ms`, `5s` or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
