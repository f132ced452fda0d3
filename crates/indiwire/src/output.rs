use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use indiwire_client::{ClientEvent, RemoteVector};
use indiwire_message::{now, to_bytes, Message};
use indiwire_property::BusEvent;
use serde::Serialize;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct EventOutput<'a> {
    schema_id: &'a str,
    kind: &'a str,
    device: &'a str,
    vector: &'a str,
    element: Option<&'a str>,
    old: Option<String>,
    new: Option<String>,
    timestamp: String,
}

pub fn print_event(event: &ClientEvent, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let (old, new) = match event {
                ClientEvent::Definition { vector } => (None, Some(vector.state.to_string())),
                ClientEvent::StateUpdate { old, new, .. } => {
                    (Some(old.to_string()), Some(new.to_string()))
                }
                ClientEvent::ValueUpdate { old, new, .. } => {
                    (old.as_ref().map(ToString::to_string), Some(new.to_string()))
                }
            };
            let out = EventOutput {
                schema_id: "https://schemas.3leaps.dev/indiwire/cli/v1/client-event.schema.json",
                kind: event.kind().as_str(),
                device: event.device(),
                vector: event.vector(),
                element: event.element(),
                old,
                new,
                timestamp: now(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["KIND", "DEVICE", "VECTOR", "EVENT"])
                .add_row(vec![
                    event.kind().as_str().to_string(),
                    event.device().to_string(),
                    event.vector().to_string(),
                    event.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => println!("{event}"),
    }
}

#[derive(Serialize)]
struct ElementOutput<'a> {
    name: &'a str,
    label: Option<&'a str>,
    value: String,
}

#[derive(Serialize)]
struct VectorOutput<'a> {
    device: &'a str,
    name: &'a str,
    label: Option<&'a str>,
    group: Option<&'a str>,
    kind: &'a str,
    state: &'a str,
    perm: Option<&'a str>,
    elements: Vec<ElementOutput<'a>>,
}

#[derive(Serialize)]
struct SnapshotOutput<'a> {
    schema_id: &'a str,
    vectors: Vec<VectorOutput<'a>>,
}

pub fn print_vectors(vectors: &[RemoteVector], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = SnapshotOutput {
                schema_id: "https://schemas.3leaps.dev/indiwire/cli/v1/property-snapshot.schema.json",
                vectors: vectors.iter().map(vector_output).collect(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["DEVICE", "VECTOR", "KIND", "STATE", "PERM", "ELEMENTS"]);
            for vector in vectors {
                table.add_row(vec![
                    vector.device.clone(),
                    vector.name.clone(),
                    vector.kind.to_string(),
                    vector.state.to_string(),
                    vector.perm.map(|p| p.to_string()).unwrap_or_default(),
                    element_summary(vector, "\n"),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            for vector in vectors {
                println!(
                    "{}.{} [{}] {} {}",
                    vector.device,
                    vector.name,
                    vector.kind,
                    vector.state,
                    element_summary(vector, " ")
                );
            }
        }
    }
}

fn vector_output(vector: &RemoteVector) -> VectorOutput<'_> {
    VectorOutput {
        device: &vector.device,
        name: &vector.name,
        label: vector.label.as_deref(),
        group: vector.group.as_deref(),
        kind: vector.kind.as_str(),
        state: vector.state.as_str(),
        perm: vector.perm.map(|p| p.as_str()),
        elements: vector
            .elements
            .iter()
            .map(|e| ElementOutput {
                name: &e.name,
                label: e.label.as_deref(),
                value: e.value.to_string(),
            })
            .collect(),
    }
}

fn element_summary(vector: &RemoteVector, separator: &str) -> String {
    vector
        .elements
        .iter()
        .map(|e| format!("{}={}", e.name, e.value))
        .collect::<Vec<_>>()
        .join(separator)
}

#[derive(Serialize)]
struct MessageOutput<'a> {
    tag: &'a str,
    device: Option<&'a str>,
    name: Option<&'a str>,
    from_device: bool,
    from_client: bool,
    blob: bool,
}

pub fn print_message(msg: &Message, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = MessageOutput {
                tag: msg.tag_name(),
                device: msg.device(),
                name: msg.name(),
                from_device: msg.from_device(),
                from_client: msg.from_client(),
                blob: msg.is_blob(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table | OutputFormat::Pretty => {
            println!(
                "{} device={} name={}",
                msg.tag_name(),
                msg.device().unwrap_or("-"),
                msg.name().unwrap_or("-")
            );
        }
        OutputFormat::Raw => print_raw(&to_bytes(msg)),
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.write_all(b"\n");
    let _ = out.flush();
}
