//! The client handle: mirror, subscriptions, waits and writes.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use indiwire_message::number::format_number;
use indiwire_message::{
    now, BlobEnable, EnableBlob, GetProperties, Message, MessageSink, NewElements, NewVector,
    OneBlob, OneNumber, OneSwitch, OneText, PropertyKind,
};
use indiwire_property::{EventBus, PropertyError, SubscriptionId, Value};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{ClientError, Result};
use crate::event::{ClientEvent, Condition, EventFilter};
use crate::lock;
use crate::mirror::{Mirror, RemoteDevice, RemoteVector};

/// Periodic `getProperties` re-requests while waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingConfig {
    pub initial_delay: Duration,
    pub interval: Duration,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    pub timeout: Duration,
    /// `None` disables polling.
    pub polling: Option<PollingConfig>,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            polling: Some(PollingConfig::default()),
        }
    }
}

impl WaitOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    pub fn without_polling(mut self) -> Self {
        self.polling = None;
        self
    }
}

struct ClientInner {
    mirror: Mutex<Mirror>,
    bus: EventBus<ClientEvent>,
    control: MessageSink,
    blob: Option<MessageSink>,
}

/// A passive observer of remote devices.
///
/// Feed it every inbound message with [`process_message`](Self::process_message);
/// it sends through the control sink given at construction.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    pub fn new(control: MessageSink) -> Self {
        Self::build(control, None)
    }

    /// A client with a second connection dedicated to BLOB traffic.
    pub fn with_blob_sink(control: MessageSink, blob: MessageSink) -> Self {
        Self::build(control, Some(blob))
    }

    fn build(control: MessageSink, blob: Option<MessageSink>) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                mirror: Mutex::new(Mirror::new()),
                bus: EventBus::new(),
                control,
                blob,
            }),
        }
    }

    /// Send a message on the control connection.
    pub fn send(&self, msg: Message) {
        debug!(tag = msg.tag_name(), device = ?msg.device(), "client outbound");
        (self.inner.control)(msg);
    }

    /// Ask for definitions, optionally narrowed to a device or vector.
    pub fn handshake(&self, device: Option<&str>, name: Option<&str>) {
        self.send(Message::GetProperties(GetProperties::new(
            device.map(str::to_string),
            name.map(str::to_string),
        )));
    }

    /// Update the mirror from one inbound message and raise the resulting
    /// events. Invalid messages are logged and dropped.
    pub fn process_message(&self, msg: &Message) {
        let applied = {
            let mut mirror = lock(&self.inner.mirror);
            match msg {
                Message::Def(def) => mirror.apply_def(def),
                Message::Set(set) => mirror.apply_set(set),
                Message::DelProperty(del) => {
                    mirror.apply_del(del);
                    return;
                }
                Message::PingRequest(ping) => {
                    drop(mirror);
                    self.send(Message::PingReply(ping.clone()));
                    return;
                }
                Message::Notice(notice) => {
                    info!(device = ?notice.device, timestamp = ?notice.timestamp, message = ?notice.message, "device message");
                    return;
                }
                other => {
                    debug!(tag = other.tag_name(), "ignoring message not meant for clients");
                    return;
                }
            }
        };

        match applied {
            Ok(applied) => {
                if let Some(device) = &applied.new_device {
                    self.blob_handshake(device);
                }
                for event in &applied.events {
                    self.inner.bus.raise(event);
                }
            }
            Err(err) => {
                warn!(tag = msg.tag_name(), device = ?msg.device(), vector = ?msg.name(), error = %err, "dropping invalid message");
            }
        }
    }

    /// Keep BLOBs off the control connection; route them to the BLOB
    /// connection when there is one.
    fn blob_handshake(&self, device: &str) {
        self.send(Message::EnableBlob(EnableBlob {
            device: device.to_string(),
            name: None,
            value: BlobEnable::Never,
        }));
        if let Some(blob) = &self.inner.blob {
            blob(Message::EnableBlob(EnableBlob {
                device: device.to_string(),
                name: None,
                value: BlobEnable::Only,
            }));
        }
    }

    /// Call `handler` for every event matching `filter`.
    pub fn subscribe<F>(&self, filter: EventFilter, handler: F) -> SubscriptionId
    where
        F: Fn(&ClientEvent) + Send + Sync + 'static,
    {
        let kinds = filter.kinds();
        self.inner.bus.subscribe_kinds(&kinds, move |event| {
            if filter.matches(event) {
                handler(event);
            }
        })
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.bus.unsubscribe(id)
    }

    /// Wait until an event matching `filter` satisfies `condition`.
    ///
    /// With polling enabled, `getProperties` for the filtered device and
    /// vector is re-sent periodically until the wait ends. The temporary
    /// subscription and poller are removed however the wait ends, including
    /// when the returned future is dropped.
    pub async fn wait_for_event(
        &self,
        filter: EventFilter,
        condition: Condition,
        options: WaitOptions,
    ) -> Result<ClientEvent> {
        let (tx, rx) = oneshot::channel();
        let tx = Mutex::new(Some(tx));
        let id = self.subscribe(filter.clone(), move |event| {
            if condition.matches(event) {
                if let Some(tx) = lock(&tx).take() {
                    let _ = tx.send(event.clone());
                }
            }
        });
        let _subscription = Unsubscribe {
            client: self.clone(),
            id,
        };
        let _poller = options
            .polling
            .map(|polling| AbortOnDrop(tokio::spawn(self.clone().poll(filter, polling))));

        match tokio::time::timeout(options.timeout, rx).await {
            Ok(Ok(event)) => Ok(event),
            Ok(Err(_)) => Err(ClientError::ConnectionClosed),
            Err(_) => Err(ClientError::Timeout(options.timeout)),
        }
    }

    async fn poll(self, filter: EventFilter, polling: PollingConfig) {
        tokio::time::sleep(polling.initial_delay).await;
        loop {
            debug!(device = ?filter.device, vector = ?filter.vector, "polling for state");
            self.handshake(filter.device.as_deref(), filter.vector.as_deref());
            tokio::time::sleep(polling.interval).await;
        }
    }

    /// Snapshot of every known device.
    pub fn devices(&self) -> Vec<RemoteDevice> {
        lock(&self.inner.mirror).devices().cloned().collect()
    }

    pub fn device(&self, name: &str) -> Option<RemoteDevice> {
        lock(&self.inner.mirror).device(name).cloned()
    }

    pub fn vector(&self, device: &str, name: &str) -> Option<RemoteVector> {
        lock(&self.inner.mirror).vector(device, name).cloned()
    }

    /// Stage a value for the next [`submit`](Self::submit) of its vector.
    pub fn set_new_value(
        &self,
        device: &str,
        vector: &str,
        element: &str,
        value: impl Into<Value>,
    ) -> Result<()> {
        let value = value.into();
        let mut mirror = lock(&self.inner.mirror);
        let target = mirror
            .device_mut(device)
            .ok_or_else(|| ClientError::UnknownDevice(device.to_string()))?
            .vector_mut(vector)
            .ok_or_else(|| ClientError::UnknownVector {
                device: device.to_string(),
                vector: vector.to_string(),
            })?;
        if !target.is_writable() {
            return Err(ClientError::ReadOnly(vector.to_string()));
        }
        let kind = target.kind;
        let slot = target
            .element_mut(element)
            .ok_or_else(|| ClientError::UnknownElement {
                vector: vector.to_string(),
                element: element.to_string(),
            })?;
        if value.kind() != kind {
            return Err(PropertyError::KindMismatch {
                element: element.to_string(),
                expected: kind,
                found: value.kind(),
            }
            .into());
        }
        slot.pending = Some(value);
        Ok(())
    }

    /// Send a `new*Vector` with every staged value of the vector and clear
    /// them. Returns the number of elements sent.
    pub fn submit(&self, device: &str, vector: &str) -> Result<usize> {
        let msg = {
            let mut mirror = lock(&self.inner.mirror);
            let target = mirror
                .device_mut(device)
                .ok_or_else(|| ClientError::UnknownDevice(device.to_string()))?
                .vector_mut(vector)
                .ok_or_else(|| ClientError::UnknownVector {
                    device: device.to_string(),
                    vector: vector.to_string(),
                })?;
            let mut staged = Vec::new();
            for element in &mut target.elements {
                if let Some(value) = element.pending.take() {
                    let format = element.number.as_ref().map(|n| n.format.clone());
                    staged.push((element.name.clone(), value, format));
                }
            }
            if staged.is_empty() {
                debug!(device, vector, "nothing staged, not submitting");
                return Ok(0);
            }
            new_vector(device, vector, target.kind, staged)?
        };

        let count = match &msg.elements {
            NewElements::Number(items) => items.len(),
            NewElements::Text(items) => items.len(),
            NewElements::Switch(items) => items.len(),
            NewElements::Blob(items) => items.len(),
        };
        self.send(Message::New(msg));
        Ok(count)
    }
}

fn new_vector(
    device: &str,
    vector: &str,
    kind: PropertyKind,
    staged: Vec<(String, Value, Option<String>)>,
) -> Result<NewVector> {
    let elements = match kind {
        PropertyKind::Number => NewElements::Number(
            staged
                .into_iter()
                .filter_map(|(name, value, format)| {
                    let number = value.as_number()?;
                    let value = match format {
                        Some(format) => format_number(number, &format),
                        None => number.to_string(),
                    };
                    Some(OneNumber { name, value })
                })
                .collect(),
        ),
        PropertyKind::Text => NewElements::Text(
            staged
                .into_iter()
                .filter_map(|(name, value, _)| {
                    let value = value.as_text()?.to_string();
                    Some(OneText { name, value })
                })
                .collect(),
        ),
        PropertyKind::Switch => NewElements::Switch(
            staged
                .into_iter()
                .filter_map(|(name, value, _)| {
                    Some(OneSwitch {
                        name,
                        value: value.as_switch()?,
                    })
                })
                .collect(),
        ),
        PropertyKind::Blob => NewElements::Blob(
            staged
                .into_iter()
                .filter_map(|(name, value, _)| {
                    Some(OneBlob {
                        name,
                        blob: value.as_blob()?.clone(),
                    })
                })
                .collect(),
        ),
        PropertyKind::Light => return Err(ClientError::ReadOnly(vector.to_string())),
    };
    Ok(NewVector {
        device: device.to_string(),
        name: vector.to_string(),
        timestamp: Some(now()),
        elements,
    })
}

struct Unsubscribe {
    client: Client,
    id: SubscriptionId,
}

impl Drop for Unsubscribe {
    fn drop(&mut self) {
        self.client.unsubscribe(self.id);
    }
}

struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("devices", &lock(&self.inner.mirror).devices().count())
            .field("subscriptions", &self.inner.bus.handler_count())
            .field("blob_connection", &self.inner.blob.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use futures_util::FutureExt;
    use indiwire_message::sink::Recorder;
    use indiwire_message::{
        DefElements, DefSwitch, DefVector, OneElements, Permission, Ping, SetVector, State,
        SwitchRule, SwitchState,
    };
    use indiwire_property::EventKind;

    use super::*;

    fn def_connection() -> Message {
        Message::Def(DefVector {
            device: "CCD".into(),
            name: "CONNECTION".into(),
            label: None,
            group: None,
            state: State::Idle,
            perm: Some(Permission::ReadWrite),
            rule: Some(SwitchRule::OneOfMany),
            timeout: Some(0.0),
            timestamp: None,
            message: None,
            elements: DefElements::Switch(vec![
                DefSwitch {
                    name: "CONNECT".into(),
                    label: None,
                    value: SwitchState::Off,
                },
                DefSwitch {
                    name: "DISCONNECT".into(),
                    label: None,
                    value: SwitchState::On,
                },
            ]),
        })
    }

    fn set_connected() -> Message {
        Message::Set(SetVector {
            device: "CCD".into(),
            name: "CONNECTION".into(),
            state: State::Ok,
            timeout: None,
            timestamp: None,
            message: None,
            elements: OneElements::Switch(vec![
                OneSwitch {
                    name: "CONNECT".into(),
                    value: SwitchState::On,
                },
                OneSwitch {
                    name: "DISCONNECT".into(),
                    value: SwitchState::Off,
                },
            ]),
        })
    }

    #[test]
    fn first_definition_disables_blobs() {
        let control = Recorder::new();
        let blob = Recorder::new();
        let client = Client::with_blob_sink(control.sink(), blob.sink());

        client.process_message(&def_connection());
        client.process_message(&def_connection());

        assert!(matches!(
            control.take().as_slice(),
            [Message::EnableBlob(EnableBlob { value: BlobEnable::Never, .. })]
        ));
        assert!(matches!(
            blob.take().as_slice(),
            [Message::EnableBlob(EnableBlob { value: BlobEnable::Only, .. })]
        ));
    }

    #[test]
    fn ping_is_answered() {
        let control = Recorder::new();
        let client = Client::new(control.sink());
        client.process_message(&Message::PingRequest(Ping { uid: "42".into() }));
        assert_eq!(
            control.take(),
            vec![Message::PingReply(Ping { uid: "42".into() })]
        );
    }

    #[test]
    fn subscription_filters_events() {
        let client = Client::new(Recorder::new().sink());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let id = client.subscribe(
            EventFilter::new().element("CONNECT").kind(EventKind::Change),
            move |event| log.lock().expect("lock").push(event.clone()),
        );

        client.process_message(&def_connection());
        client.process_message(&set_connected());
        assert_eq!(seen.lock().expect("lock").len(), 2);

        assert!(client.unsubscribe(id));
        client.process_message(&def_connection());
        assert_eq!(seen.lock().expect("lock").len(), 2);
    }

    #[test]
    fn staged_values_are_submitted_once() {
        let control = Recorder::new();
        let client = Client::new(control.sink());
        client.process_message(&def_connection());
        control.take();

        client
            .set_new_value("CCD", "CONNECTION", "CONNECT", SwitchState::On)
            .expect("stage");
        assert_eq!(client.submit("CCD", "CONNECTION").expect("submit"), 1);
        assert_eq!(client.submit("CCD", "CONNECTION").expect("submit"), 0);

        match control.take().as_slice() {
            [Message::New(new)] => {
                assert_eq!(new.name, "CONNECTION");
                assert_eq!(new.elements.names(), vec!["CONNECT"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn staging_checks_names_and_kinds() {
        let client = Client::new(Recorder::new().sink());
        client.process_message(&def_connection());

        assert!(matches!(
            client.set_new_value("Mount", "CONNECTION", "CONNECT", SwitchState::On),
            Err(ClientError::UnknownDevice(_))
        ));
        assert!(matches!(
            client.set_new_value("CCD", "NOPE", "CONNECT", SwitchState::On),
            Err(ClientError::UnknownVector { .. })
        ));
        assert!(matches!(
            client.set_new_value("CCD", "CONNECTION", "NOPE", SwitchState::On),
            Err(ClientError::UnknownElement { .. })
        ));
        assert!(matches!(
            client.set_new_value("CCD", "CONNECTION", "CONNECT", 1.0),
            Err(ClientError::Property(PropertyError::KindMismatch { .. }))
        ));
    }

    #[tokio::test]
    async fn wait_resolves_on_matching_event() {
        let client = Client::new(Recorder::new().sink());
        client.process_message(&def_connection());

        let waiter = {
            let client = client.clone();
            tokio::spawn(async move {
                client
                    .wait_for_event(
                        EventFilter::new().vector("CONNECTION").element("CONNECT"),
                        Condition::value_equals(SwitchState::On),
                        WaitOptions::with_timeout(Duration::from_secs(5)).without_polling(),
                    )
                    .await
            })
        };
        tokio::task::yield_now().await;
        while client.inner.bus.handler_count() == 0 {
            tokio::task::yield_now().await;
        }
        client.process_message(&set_connected());

        let event = waiter.await.expect("join").expect("event");
        assert_eq!(event.element(), Some("CONNECT"));
        assert_eq!(client.inner.bus.handler_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_times_out_and_cleans_up() {
        let client = Client::new(Recorder::new().sink());
        let result = client
            .wait_for_event(
                EventFilter::new().device("CCD"),
                Condition::state_equals(State::Ok),
                WaitOptions::with_timeout(Duration::from_millis(50)).without_polling(),
            )
            .await;
        assert!(matches!(result, Err(ClientError::Timeout(_))));
        assert_eq!(client.inner.bus.handler_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_wait_removes_subscription_and_poller() {
        let control = Recorder::new();
        let client = Client::new(control.sink());
        let before = client.inner.bus.handler_count();
        let options = WaitOptions {
            timeout: Duration::from_secs(60),
            polling: Some(PollingConfig {
                initial_delay: Duration::from_millis(100),
                interval: Duration::from_millis(100),
            }),
        };

        let wait = client.wait_for_event(
            EventFilter::new().device("CCD"),
            Condition::state_equals(State::Ok),
            options,
        );
        assert!(wait.now_or_never().is_none());
        assert_eq!(client.inner.bus.handler_count(), before);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(control.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn polling_resends_get_properties() {
        let control = Recorder::new();
        let client = Client::new(control.sink());
        let options = WaitOptions {
            timeout: Duration::from_millis(3500),
            polling: Some(PollingConfig {
                initial_delay: Duration::from_secs(1),
                interval: Duration::from_secs(1),
            }),
        };
        let result = client
            .wait_for_event(
                EventFilter::new().device("CCD").vector("CONNECTION"),
                Condition::state_equals(State::Ok),
                options,
            )
            .await;
        assert!(matches!(result, Err(ClientError::Timeout(_))));

        let sent = control.take();
        assert_eq!(sent.len(), 3);
        assert!(sent.iter().all(|m| matches!(
            m,
            Message::GetProperties(get)
                if get.device.as_deref() == Some("CCD") && get.name.as_deref() == Some("CONNECTION")
        )));
    }
}
