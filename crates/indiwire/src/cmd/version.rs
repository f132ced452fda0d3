use indiwire_client::DEFAULT_PORT;
use indiwire_message::{DecoderConfig, PROTOCOL_VERSION};
use serde::Serialize;

use crate::cmd::VersionArgs;
use crate::exit::{CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::OutputFormat;

/// Protocol and wire defaults this build speaks.
#[derive(Debug, Serialize)]
struct VersionInfo {
    name: &'static str,
    version: &'static str,
    protocol: &'static str,
    default_port: u16,
    max_pending_bytes: usize,
    os: &'static str,
    arch: &'static str,
}

impl VersionInfo {
    fn current() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            protocol: PROTOCOL_VERSION,
            default_port: DEFAULT_PORT,
            max_pending_bytes: DecoderConfig::default().max_pending,
            os: std::env::consts::OS,
            arch: std::env::consts::ARCH,
        }
    }
}

pub fn run(args: VersionArgs, format: OutputFormat) -> CliResult<i32> {
    let info = VersionInfo::current();
    if !args.extended {
        println!("{} {}", info.name, info.version);
        return Ok(SUCCESS);
    }

    match format {
        OutputFormat::Json => {
            let line = serde_json::to_string(&info)
                .map_err(|err| CliError::new(INTERNAL, format!("encode version: {err}")))?;
            println!("{line}");
        }
        _ => {
            println!("version: {}", info.version);
            println!("protocol: {}", info.protocol);
            println!("default_port: {}", info.default_port);
            println!("max_pending_bytes: {}", info.max_pending_bytes);
            println!("platform: {}-{}", info.os, info.arch);
        }
    }
    Ok(SUCCESS)
}
