mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "indiwire", version, about = "INDI protocol router and client CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    match cmd::run(cli.command, format) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_serve_with_upstreams() {
        let cli = Cli::try_parse_from([
            "indiwire",
            "serve",
            "--listen",
            "127.0.0.1:7625",
            "--upstream",
            "observatory:7624",
            "--upstream",
            "dome:7624",
        ])
        .expect("serve args should parse");

        match cli.command {
            Command::Serve(args) => {
                assert_eq!(args.listen.port(), 7625);
                assert_eq!(args.upstream.len(), 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn set_requires_an_assignment() {
        let err = Cli::try_parse_from(["indiwire", "set", "localhost:7624", "CCD", "CONNECTION"])
            .expect_err("missing values should fail");
        assert_eq!(
            err.kind(),
            clap::error::ErrorKind::MissingRequiredArgument
        );

        let cli = Cli::try_parse_from([
            "indiwire",
            "set",
            "localhost:7624",
            "CCD",
            "CONNECTION",
            "CONNECT=On",
            "--timeout",
            "3s",
        ])
        .expect("set args should parse");
        assert!(matches!(cli.command, Command::Set(_)));
    }

    #[test]
    fn global_format_after_subcommand() {
        let cli = Cli::try_parse_from([
            "indiwire",
            "watch",
            "localhost:7624",
            "--device",
            "CCD",
            "--format",
            "json",
        ])
        .expect("watch args should parse");
        assert_eq!(cli.format, Some(OutputFormat::Json));
        assert!(matches!(cli.command, Command::Watch(_)));
    }
}
