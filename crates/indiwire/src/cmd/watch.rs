use indiwire_client::{connect_with_config, ClientConfig, EventFilter};
use tokio::sync::mpsc;
use tracing::info;

use crate::cmd::WatchArgs;
use crate::exit::{client_error, CliResult, FAILURE, SUCCESS};
use crate::output::{print_event, OutputFormat};

pub async fn run(args: WatchArgs, format: OutputFormat) -> CliResult<i32> {
    let config = ClientConfig {
        blob_connection: args.blobs,
        ..ClientConfig::default()
    };
    let mut connection = connect_with_config(&args.addr, config)
        .await
        .map_err(|err| client_error("connect failed", err))?;

    let mut filter = EventFilter::new();
    if let Some(device) = &args.device {
        filter = filter.device(device.clone());
    }
    if let Some(vector) = &args.vector {
        filter = filter.vector(vector.clone());
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let subscription = connection.client().subscribe(filter, move |event| {
        let _ = tx.send(event.clone());
    });

    let mut printed = 0usize;
    let code = loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break SUCCESS };
                print_event(&event, format);
                printed += 1;
                if args.count.is_some_and(|count| printed >= count) {
                    break SUCCESS;
                }
            }
            _ = connection.closed() => {
                info!(addr = %args.addr, "server closed the connection");
                break FAILURE;
            }
            _ = tokio::signal::ctrl_c() => break SUCCESS,
        }
    };

    connection.client().unsubscribe(subscription);
    connection.close();
    Ok(code)
}
