use std::fs::File;
use std::io::{self, Read};

use indiwire_message::{CodecError, MessageReader};
use tracing::info;

use crate::cmd::DecodeArgs;
use crate::exit::{codec_error, io_error, CliResult, SUCCESS};
use crate::output::{print_message, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let input: Box<dyn Read> = match &args.file {
        Some(path) => Box::new(
            File::open(path).map_err(|err| io_error(&format!("open {}", path.display()), err))?,
        ),
        None => Box::new(io::stdin().lock()),
    };

    let mut reader = MessageReader::new(input);
    let mut decoded = 0usize;
    loop {
        match reader.read_message() {
            Ok(msg) => {
                print_message(&msg, format);
                decoded += 1;
            }
            Err(CodecError::ConnectionClosed) => break,
            Err(err) => return Err(codec_error("decode failed", err)),
        }
    }

    info!(decoded, rejected = reader.rejected(), "end of input");
    Ok(SUCCESS)
}
