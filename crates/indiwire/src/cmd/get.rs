use indiwire_client::{connect, Client, EventFilter, RemoteVector};
use indiwire_property::EventKind;
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::cmd::{parse_duration, GetArgs};
use crate::exit::{client_error, CliError, CliResult, SUCCESS, TIMEOUT};
use crate::output::{print_vectors, OutputFormat};

pub async fn run(args: GetArgs, format: OutputFormat) -> CliResult<i32> {
    let settle = parse_duration(&args.settle)?;
    let limit = parse_duration(&args.timeout)?;

    let connection = connect(&args.addr)
        .await
        .map_err(|err| client_error("connect failed", err))?;
    let client = connection.client();

    let mut filter = EventFilter::new().kind(EventKind::Definition);
    if let Some(device) = &args.device {
        filter = filter.device(device.clone());
    }
    let (tx, mut rx) = mpsc::unbounded_channel();
    let subscription = client.subscribe(filter, move |_| {
        let _ = tx.send(());
    });

    // Definitions may already be in the mirror before the subscription.
    if snapshot(client, args.device.as_deref()).is_empty() {
        match timeout(limit, rx.recv()).await {
            Ok(Some(())) => {}
            _ => {
                return Err(CliError::new(
                    TIMEOUT,
                    format!("no definitions received within {limit:?}"),
                ))
            }
        }
    }
    while let Ok(Some(())) = timeout(settle, rx.recv()).await {}
    client.unsubscribe(subscription);

    print_vectors(&snapshot(client, args.device.as_deref()), format);
    connection.close();
    Ok(SUCCESS)
}

fn snapshot(client: &Client, device: Option<&str>) -> Vec<RemoteVector> {
    client
        .devices()
        .into_iter()
        .filter(|d| device.is_none_or(|name| d.name == name))
        .flat_map(|d| d.vectors)
        .collect()
}
