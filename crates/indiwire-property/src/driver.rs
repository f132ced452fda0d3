use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use indiwire_message::{now, GetProperties, Message, MessageSink, NewVector, Notice};
use tracing::{debug, info, warn};

use crate::bus::{EventBus, EventKind, SubscriptionId};
use crate::definition::DriverDef;
use crate::element::Element;
use crate::error::{PropertyError, Result};
use crate::event::PropertyEvent;
use crate::group::{Group, GroupShared};
use crate::vector::Vector;

pub(crate) struct DeviceShared {
    pub(crate) name: String,
    sink: MessageSink,
    pub(crate) bus: EventBus<PropertyEvent>,
}

impl DeviceShared {
    pub(crate) fn send(&self, msg: Message) {
        debug!(device = %self.name, tag = msg.tag_name(), name = ?msg.name(), "outbound");
        (self.sink)(msg);
    }
}

/// A live device: its property tree plus the sink its messages go to.
#[derive(Clone)]
pub struct Driver {
    device: Arc<DeviceShared>,
    groups: Vec<Group>,
    vectors: Vec<Vector>,
    by_name: HashMap<String, usize>,
}

impl Driver {
    pub(crate) fn new(def: DriverDef, sink: MessageSink) -> Result<Self> {
        def.validate()?;
        let device = Arc::new(DeviceShared {
            name: def.name,
            sink,
            bus: EventBus::new(),
        });

        let mut groups = Vec::with_capacity(def.groups.len());
        let mut vectors = Vec::new();
        let mut by_name = HashMap::new();
        for group in def.groups {
            let shared = Arc::new(GroupShared::new(
                group.name,
                group.enabled,
                Arc::clone(&device),
            ));
            let members: Vec<Vector> = group
                .vectors
                .into_iter()
                .map(|v| Vector::new(v, Arc::clone(&shared)))
                .collect();
            for vector in &members {
                by_name.insert(vector.name().to_string(), vectors.len());
                vectors.push(vector.clone());
            }
            groups.push(Group::new(shared, members));
        }

        info!(device = %device.name, groups = groups.len(), vectors = vectors.len(), "driver built");
        Ok(Self {
            device,
            groups,
            vectors,
            by_name,
        })
    }

    pub fn name(&self) -> &str {
        &self.device.name
    }

    /// True if a message addressed to `device` is meant for this driver.
    pub fn accepts(&self, device: Option<&str>) -> bool {
        device.map_or(true, |d| d == self.device.name)
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.name() == name)
    }

    pub fn vectors(&self) -> &[Vector] {
        &self.vectors
    }

    pub fn vector(&self, name: &str) -> Option<&Vector> {
        self.by_name.get(name).map(|&i| &self.vectors[i])
    }

    pub fn element(&self, vector: &str, element: &str) -> Option<Element> {
        self.vector(vector)?.element(element)
    }

    pub fn events(&self) -> &EventBus<PropertyEvent> {
        &self.device.bus
    }

    /// Observe events from anywhere in the device.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&PropertyEvent) + Send + Sync + 'static,
    {
        self.device.bus.subscribe(kind, handler)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.device.bus.unsubscribe(id)
    }

    /// Send every vector definition, hidden ones as `delProperty`.
    pub fn announce(&self) {
        for vector in &self.vectors {
            vector.send_definition();
        }
    }

    /// Send a timestamped free-text `message` attributed to this device.
    pub fn notify(&self, text: impl Into<String>) {
        self.device.send(Message::Notice(Notice {
            device: Some(self.device.name.clone()),
            timestamp: Some(now()),
            message: Some(text.into()),
        }));
    }

    /// Handle a message routed to this driver from a client.
    pub fn handle_client_message(&self, msg: &Message) -> Result<()> {
        if !self.accepts(msg.device()) {
            return Ok(());
        }
        match msg {
            Message::GetProperties(get) => self.handle_get_properties(get),
            Message::New(new) => self.handle_new(new),
            other => {
                debug!(device = %self.device.name, tag = other.tag_name(), "ignoring client message");
                Ok(())
            }
        }
    }

    fn handle_get_properties(&self, get: &GetProperties) -> Result<()> {
        match &get.name {
            None => {
                self.announce();
                Ok(())
            }
            Some(name) => {
                let vector = self
                    .vector(name)
                    .ok_or_else(|| PropertyError::UnknownVector(name.clone()))?;
                vector.send_definition();
                Ok(())
            }
        }
    }

    fn handle_new(&self, new: &NewVector) -> Result<()> {
        let vector = self
            .vector(&new.name)
            .ok_or_else(|| PropertyError::UnknownVector(new.name.clone()))?;
        vector.apply_new(new).inspect_err(|err| {
            warn!(device = %self.device.name, vector = %new.name, error = %err, "client write failed");
        })
    }
}

impl fmt::Debug for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver")
            .field("name", &self.device.name)
            .field("groups", &self.groups)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use indiwire_message::sink::Recorder;
    use indiwire_message::{NewElements, OneSwitch, State, SwitchState};

    use super::*;
    use crate::definition::{ElementDef, GroupDef, VectorDef};
    use crate::standard;
    use crate::value::Value;

    fn build() -> (Driver, Recorder) {
        let recorder = Recorder::new();
        let driver = DriverDef::new("Camera")
            .group(
                GroupDef::new("Main Control")
                    .vector(standard::connection())
                    .vector(VectorDef::text("NAME").element(ElementDef::text("NICK"))),
            )
            .group(
                GroupDef::new("Options")
                    .vector(VectorDef::number("GAIN").element(ElementDef::number("VALUE"))),
            )
            .build(recorder.sink())
            .expect("valid driver");
        (driver, recorder)
    }

    fn def_names(messages: &[Message]) -> Vec<(&'static str, String)> {
        messages
            .iter()
            .map(|m| (m.tag_name(), m.name().unwrap_or_default().to_string()))
            .collect()
    }

    #[test]
    fn get_properties_sends_all_definitions() {
        let (driver, recorder) = build();
        driver
            .handle_client_message(&Message::GetProperties(GetProperties::all()))
            .expect("handled");
        assert_eq!(
            def_names(&recorder.take()),
            vec![
                ("defSwitchVector", "CONNECTION".to_string()),
                ("defTextVector", "NAME".to_string()),
                ("defNumberVector", "GAIN".to_string()),
            ]
        );
    }

    #[test]
    fn get_properties_for_one_vector() {
        let (driver, recorder) = build();
        let msg = Message::GetProperties(GetProperties::new(
            Some("Camera".into()),
            Some("GAIN".into()),
        ));
        driver.handle_client_message(&msg).expect("handled");
        assert_eq!(
            def_names(&recorder.take()),
            vec![("defNumberVector", "GAIN".to_string())]
        );

        let unknown = Message::GetProperties(GetProperties::new(None, Some("NOPE".into())));
        assert!(matches!(
            driver.handle_client_message(&unknown),
            Err(PropertyError::UnknownVector(_))
        ));
    }

    #[test]
    fn messages_for_other_devices_are_ignored() {
        let (driver, recorder) = build();
        let msg = Message::GetProperties(GetProperties::new(Some("Mount".into()), None));
        driver.handle_client_message(&msg).expect("handled");
        assert!(recorder.is_empty());
    }

    #[test]
    fn disabled_group_hides_its_vectors() {
        let (driver, recorder) = build();
        let group = driver.group("Options").expect("group");

        group.set_enabled(false);
        let sent = recorder.take();
        assert_eq!(sent.len(), 1);
        assert!(matches!(&sent[0], Message::DelProperty(del) if del.name.as_deref() == Some("GAIN")));
        assert!(!driver.vector("GAIN").expect("vector").enabled());

        driver.announce();
        let sent = recorder.take();
        assert!(matches!(sent.last(), Some(Message::DelProperty(_))));

        group.set_enabled(true);
        let sent = recorder.take();
        assert_eq!(
            def_names(&sent),
            vec![
                ("defNumberVector", "GAIN".to_string()),
                ("setNumberVector", "GAIN".to_string()),
            ]
        );
    }

    #[test]
    fn new_switch_vector_connects() {
        let (driver, recorder) = build();
        let msg = Message::New(NewVector {
            device: "Camera".into(),
            name: "CONNECTION".into(),
            timestamp: None,
            elements: NewElements::Switch(vec![OneSwitch {
                name: "CONNECT".into(),
                value: SwitchState::On,
            }]),
        });
        driver.handle_client_message(&msg).expect("handled");

        let connection = driver.vector("CONNECTION").expect("vector");
        assert_eq!(connection.selected(), vec!["CONNECT".to_string()]);
        assert_eq!(connection.state(), State::Ok);
        assert_eq!(recorder.len(), 1);
    }

    #[test]
    fn new_vector_for_unknown_name_fails() {
        let (driver, _) = build();
        let msg = Message::New(NewVector {
            device: "Camera".into(),
            name: "MISSING".into(),
            timestamp: None,
            elements: NewElements::Switch(Vec::new()),
        });
        assert!(matches!(
            driver.handle_client_message(&msg),
            Err(PropertyError::UnknownVector(_))
        ));
    }

    #[test]
    fn notify_sends_notice() {
        let (driver, recorder) = build();
        driver.notify("exposure done");
        match recorder.take().as_slice() {
            [Message::Notice(notice)] => {
                assert_eq!(notice.device.as_deref(), Some("Camera"));
                assert_eq!(notice.message.as_deref(), Some("exposure done"));
                assert!(notice.timestamp.is_some());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn lookup_helpers() {
        let (driver, _) = build();
        assert_eq!(driver.name(), "Camera");
        assert!(driver.accepts(None));
        assert!(driver.accepts(Some("Camera")));
        assert!(!driver.accepts(Some("Mount")));
        assert_eq!(driver.groups().len(), 2);
        assert_eq!(driver.vectors().len(), 3);
        assert_eq!(
            driver.element("NAME", "NICK").expect("element").current(),
            Value::Text(String::new())
        );
        assert!(driver.element("NAME", "MISSING").is_none());
    }
}
