use std::path::Path;

use indiwire_client::{
    connect, ClientEvent, Condition, EventFilter, RemoteElement, RemoteVector, WaitOptions,
};
use indiwire_message::number::{parse_any, parse_number};
use indiwire_message::{Blob, PropertyKind, State, SwitchState};
use indiwire_property::{EventKind, Value};
use tracing::{info, warn};

use crate::cmd::{parse_duration, SetArgs};
use crate::exit::{client_error, io_error, CliError, CliResult, FAILURE, SUCCESS, USAGE};
use crate::output::{print_vectors, OutputFormat};

pub async fn run(args: SetArgs, format: OutputFormat) -> CliResult<i32> {
    let limit = parse_duration(&args.timeout)?;
    let assignments = args
        .values
        .iter()
        .map(|raw| parse_assignment(raw))
        .collect::<CliResult<Vec<_>>>()?;

    let connection = connect(&args.addr)
        .await
        .map_err(|err| client_error("connect failed", err))?;
    let client = connection.client();
    let filter = EventFilter::new()
        .device(args.device.clone())
        .vector(args.vector.clone());

    let vector = match client.vector(&args.device, &args.vector) {
        Some(vector) => vector,
        None => match client
            .wait_for_event(
                filter.clone().kind(EventKind::Definition),
                Condition::check(|_| true),
                WaitOptions::with_timeout(limit),
            )
            .await
            .map_err(|err| client_error("waiting for definition", err))?
        {
            ClientEvent::Definition { vector } => vector,
            other => {
                return Err(CliError::new(
                    FAILURE,
                    format!("unexpected event while waiting for definition: {other}"),
                ))
            }
        },
    };

    for (name, raw) in &assignments {
        let element = vector.element(name).ok_or_else(|| {
            CliError::new(
                USAGE,
                format!("{}.{} has no element {name}", vector.device, vector.name),
            )
        })?;
        let value = parse_value(&vector, element, raw)?;
        client
            .set_new_value(&args.device, &args.vector, name, value)
            .map_err(|err| client_error("staging value failed", err))?;
    }

    // Subscribe before submitting so the answer cannot slip past.
    let answer = client.wait_for_event(
        filter.clone(),
        Condition::check(|event| {
            !matches!(
                event,
                ClientEvent::Definition { .. }
                    | ClientEvent::StateUpdate {
                        new: State::Busy,
                        ..
                    }
            )
        }),
        WaitOptions::with_timeout(limit).without_polling(),
    );
    let (answer, submitted) = tokio::join!(answer, async {
        client.submit(&args.device, &args.vector)
    });
    let sent = submitted.map_err(|err| client_error("submit failed", err))?;
    info!(device = %args.device, vector = %args.vector, elements = sent, "submitted");
    answer.map_err(|err| client_error("waiting for answer", err))?;

    while client
        .vector(&args.device, &args.vector)
        .is_some_and(|v| v.state == State::Busy)
    {
        client
            .wait_for_event(
                filter.clone().kind(EventKind::StateUpdate),
                Condition::state_differs(State::Busy),
                WaitOptions::with_timeout(limit).without_polling(),
            )
            .await
            .map_err(|err| client_error("waiting for completion", err))?;
    }

    let finished: Vec<RemoteVector> = client
        .vector(&args.device, &args.vector)
        .into_iter()
        .collect();
    print_vectors(&finished, format);
    connection.close();

    match finished.first().map(|v| v.state) {
        Some(State::Alert) => {
            warn!(device = %args.device, vector = %args.vector, "driver reported Alert");
            Ok(FAILURE)
        }
        _ => Ok(SUCCESS),
    }
}

fn parse_assignment(raw: &str) -> CliResult<(String, String)> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => Err(CliError::new(
            USAGE,
            format!("expected NAME=VALUE, got {raw:?}"),
        )),
    }
}

fn parse_value(vector: &RemoteVector, element: &RemoteElement, raw: &str) -> CliResult<Value> {
    let invalid = || {
        CliError::new(
            USAGE,
            format!("invalid {} value for {}: {raw:?}", vector.kind, element.name),
        )
    };
    match vector.kind {
        PropertyKind::Number => {
            let parsed = match &element.number {
                Some(attrs) => parse_number(raw, &attrs.format),
                None => parse_any(raw),
            };
            parsed.map(Value::Number).ok_or_else(invalid)
        }
        PropertyKind::Text => Ok(Value::Text(raw.to_string())),
        PropertyKind::Switch => raw
            .parse::<SwitchState>()
            .map(Value::Switch)
            .map_err(|_| invalid()),
        PropertyKind::Blob => {
            let path = raw.strip_prefix('@').ok_or_else(invalid)?;
            let data = std::fs::read(path).map_err(|err| io_error(&format!("read {path}"), err))?;
            let format = Path::new(path)
                .extension()
                .map(|ext| format!(".{}", ext.to_string_lossy()))
                .unwrap_or_default();
            Ok(Value::from(Blob::new(format, data)))
        }
        PropertyKind::Light => Err(CliError::new(
            USAGE,
            format!("{}.{} is a light vector and cannot be set", vector.device, vector.name),
        )),
    }
}

#[cfg(test)]
mod tests {
    use indiwire_client::NumberAttrs;

    use super::*;

    fn vector(kind: PropertyKind, element: RemoteElement) -> RemoteVector {
        RemoteVector {
            device: "Mount".into(),
            name: "COORD".into(),
            label: None,
            group: None,
            kind,
            state: State::Idle,
            perm: None,
            rule: None,
            timeout: None,
            timestamp: None,
            message: None,
            elements: vec![element],
        }
    }

    fn element(number: Option<NumberAttrs>) -> RemoteElement {
        RemoteElement {
            name: "RA".into(),
            label: None,
            value: Value::Number(0.0),
            pending: None,
            number,
        }
    }

    #[test]
    fn assignments_split_on_first_equals() {
        assert_eq!(
            parse_assignment("NAME=a=b").expect("parses"),
            ("NAME".to_string(), "a=b".to_string())
        );
        assert!(parse_assignment("=On").is_err());
        assert!(parse_assignment("CONNECT").is_err());
    }

    #[test]
    fn numbers_follow_the_element_format() {
        let attrs = NumberAttrs {
            format: "%10.6m".into(),
            min: 0.0,
            max: 24.0,
            step: 0.0,
        };
        let el = element(Some(attrs));
        let vec = vector(PropertyKind::Number, el.clone());
        assert_eq!(
            parse_value(&vec, &el, "12:30:00").expect("sexagesimal"),
            Value::Number(12.5)
        );
        let plain = element(None);
        assert_eq!(
            parse_value(&vec, &plain, "1.5").expect("decimal"),
            Value::Number(1.5)
        );
        assert_eq!(parse_value(&vec, &plain, "fast").expect_err("bad").code, USAGE);
    }

    #[test]
    fn switches_and_lights() {
        let el = element(None);
        let switches = vector(PropertyKind::Switch, el.clone());
        assert_eq!(
            parse_value(&switches, &el, "On").expect("switch"),
            Value::Switch(SwitchState::On)
        );
        assert!(parse_value(&switches, &el, "maybe").is_err());

        let lights = vector(PropertyKind::Light, el.clone());
        assert_eq!(parse_value(&lights, &el, "Ok").expect_err("light").code, USAGE);
    }
}
