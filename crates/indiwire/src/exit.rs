use std::fmt;
use std::io;

use indiwire_client::ClientError;
use indiwire_message::{CodecError, ErrorClass};
use indiwire_router::RouterError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::AddrInUse
        | io::ErrorKind::AddrNotAvailable => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn codec_error(context: &str, err: CodecError) -> CliError {
    match err {
        CodecError::Io(source) => io_error(context, source),
        other => {
            let code = match other.class() {
                ErrorClass::Decode | ErrorClass::UnknownMessage | ErrorClass::Validation => {
                    DATA_INVALID
                }
                ErrorClass::ConnectionClosed => FAILURE,
            };
            CliError::new(code, format!("{context}: {other}"))
        }
    }
}

pub fn client_error(context: &str, err: ClientError) -> CliError {
    match err {
        ClientError::Io(source) => io_error(context, source),
        ClientError::Codec(err) => codec_error(context, err),
        ClientError::Timeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        ClientError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
        ClientError::UnknownDevice(_)
        | ClientError::UnknownVector { .. }
        | ClientError::UnknownElement { .. }
        | ClientError::ReadOnly(_) => CliError::new(USAGE, format!("{context}: {err}")),
        other => CliError::new(DATA_INVALID, format!("{context}: {other}")),
    }
}

pub fn router_error(context: &str, err: RouterError) -> CliError {
    match err {
        RouterError::Io(source) | RouterError::Bind { source, .. } => io_error(context, source),
        RouterError::Codec(err) => codec_error(context, err),
        RouterError::Property(err) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
    }
}
