//! The driver/client exchange.
//!
//! Every endpoint registers and gets a mailbox. [`Router::dispatch`] hands a
//! message to the mailboxes of its recipients and never performs their I/O,
//! so a slow connection only backs up its own queue.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use indiwire_message::{BlobEnable, Message};
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

use crate::lock;

/// Receiving end of an endpoint's queue.
pub type Mailbox = mpsc::UnboundedReceiver<Arc<Message>>;

/// Identity of a registered endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeerId(u64);

impl PeerId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

/// Which devices a driver endpoint receives client traffic for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceFilter {
    /// Every device; used by proxies.
    All,
    Device(String),
}

impl DeviceFilter {
    /// Messages without a device are accepted by every driver.
    pub fn accepts(&self, device: Option<&str>) -> bool {
        match (self, device.filter(|d| !d.is_empty())) {
            (_, None) | (DeviceFilter::All, _) => true,
            (DeviceFilter::Device(name), Some(device)) => name == device,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Policy for devices a client never sent `enableBLOB` for.
    pub default_blob_policy: BlobEnable,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            default_blob_policy: BlobEnable::Never,
        }
    }
}

/// Whether a device message goes to a client with the given policy.
///
/// BLOB payloads go to `Also` and `Only` clients; everything else goes to
/// `Never` clients only.
pub fn blob_policy_allows(policy: BlobEnable, is_blob: bool) -> bool {
    match policy {
        BlobEnable::Never => !is_blob,
        BlobEnable::Also | BlobEnable::Only => is_blob,
    }
}

struct DriverEntry {
    name: String,
    filter: DeviceFilter,
    tx: mpsc::UnboundedSender<Arc<Message>>,
}

struct ClientEntry {
    name: String,
    blob: HashMap<String, BlobEnable>,
    tx: mpsc::UnboundedSender<Arc<Message>>,
}

#[derive(Default)]
struct Tables {
    drivers: BTreeMap<PeerId, DriverEntry>,
    clients: BTreeMap<PeerId, ClientEntry>,
}

struct RouterInner {
    config: RouterConfig,
    next_id: AtomicU64,
    tables: Mutex<Tables>,
}

/// Relays messages between drivers and clients.
///
/// Cheap to clone; all clones share the same tables.
#[derive(Clone)]
pub struct Router {
    inner: Arc<RouterInner>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    pub fn new() -> Self {
        Self::with_config(RouterConfig::default())
    }

    pub fn with_config(config: RouterConfig) -> Self {
        Self {
            inner: Arc::new(RouterInner {
                config,
                next_id: AtomicU64::new(1),
                tables: Mutex::new(Tables::default()),
            }),
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.inner.config
    }

    fn next_id(&self) -> PeerId {
        PeerId(self.inner.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Register a driver endpoint receiving client messages for `filter`.
    pub fn register_driver(&self, name: impl Into<String>, filter: DeviceFilter) -> (PeerId, Mailbox) {
        let id = self.next_id();
        let name = name.into();
        let (tx, rx) = mpsc::unbounded_channel();
        info!(peer = %id, driver = %name, filter = ?filter, "driver registered");
        lock(&self.inner.tables)
            .drivers
            .insert(id, DriverEntry { name, filter, tx });
        (id, rx)
    }

    /// Register a client endpoint with an empty BLOB policy row.
    pub fn register_client(&self, name: impl Into<String>) -> (PeerId, Mailbox) {
        let id = self.next_id();
        let name = name.into();
        let (tx, rx) = mpsc::unbounded_channel();
        info!(peer = %id, client = %name, "client registered");
        lock(&self.inner.tables).clients.insert(
            id,
            ClientEntry {
                name,
                blob: HashMap::new(),
                tx,
            },
        );
        (id, rx)
    }

    /// Remove an endpoint and its BLOB policies. Its mailbox ends once
    /// drained.
    pub fn unregister(&self, id: PeerId) -> bool {
        let mut tables = lock(&self.inner.tables);
        if let Some(driver) = tables.drivers.remove(&id) {
            info!(peer = %id, driver = %driver.name, "driver unregistered");
            return true;
        }
        if let Some(client) = tables.clients.remove(&id) {
            info!(peer = %id, client = %client.name, "client unregistered");
            return true;
        }
        false
    }

    /// Effective BLOB policy of `client` for `device`; `None` for
    /// anything that is not a registered client.
    pub fn blob_policy(&self, client: PeerId, device: &str) -> Option<BlobEnable> {
        let tables = lock(&self.inner.tables);
        let entry = tables.clients.get(&client)?;
        Some(
            entry
                .blob
                .get(device)
                .copied()
                .unwrap_or(self.inner.config.default_blob_policy),
        )
    }

    pub fn driver_count(&self) -> usize {
        lock(&self.inner.tables).drivers.len()
    }

    pub fn client_count(&self) -> usize {
        lock(&self.inner.tables).clients.len()
    }

    /// Deliver `msg` from `sender` to every eligible endpoint and return
    /// how many mailboxes accepted it.
    ///
    /// Client-originated messages go to drivers accepting the message's
    /// device; `enableBLOB` first updates the sender's policy. Device
    /// messages go to clients whose BLOB policy for the device admits
    /// them. The sender never receives its own message, and a registered
    /// endpoint only routes in the direction of its role.
    pub fn dispatch(&self, msg: Message, sender: PeerId) -> usize {
        let msg = Arc::new(msg);
        let mut tables = lock(&self.inner.tables);
        let sender_is_driver = tables.drivers.contains_key(&sender);
        let sender_is_client = tables.clients.contains_key(&sender);
        let mut delivered = 0;

        if msg.from_client() && !sender_is_driver {
            if let Message::EnableBlob(enable) = msg.as_ref() {
                if let Some(client) = tables.clients.get_mut(&sender) {
                    debug!(peer = %sender, device = %enable.device, policy = %enable.value, "BLOB policy updated");
                    client.blob.insert(enable.device.clone(), enable.value);
                }
            }
            let device = msg.device();
            for (id, driver) in &tables.drivers {
                if *id != sender && driver.filter.accepts(device) {
                    delivered += deliver(*id, &driver.tx, &msg);
                }
            }
        }

        if msg.from_device() && !sender_is_client {
            let is_blob = msg.is_blob();
            let default = self.inner.config.default_blob_policy;
            for (id, client) in &tables.clients {
                if *id == sender {
                    continue;
                }
                let policy = msg
                    .device()
                    .and_then(|device| client.blob.get(device))
                    .copied()
                    .unwrap_or(default);
                if blob_policy_allows(policy, is_blob) {
                    delivered += deliver(*id, &client.tx, &msg);
                }
            }
        }

        trace!(peer = %sender, tag = msg.tag_name(), device = ?msg.device(), delivered, "dispatched");
        delivered
    }
}

fn deliver(id: PeerId, tx: &mpsc::UnboundedSender<Arc<Message>>, msg: &Arc<Message>) -> usize {
    match tx.send(Arc::clone(msg)) {
        Ok(()) => 1,
        Err(_) => {
            debug!(peer = %id, "mailbox closed, message dropped");
            0
        }
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tables = lock(&self.inner.tables);
        f.debug_struct("Router")
            .field("drivers", &tables.drivers.len())
            .field("clients", &tables.clients.len())
            .field("config", &self.inner.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use indiwire_message::{
        Blob, EnableBlob, GetProperties, NewElements, NewVector, OneBlob, OneElements, OneSwitch,
        SetVector, State, SwitchState,
    };

    use super::*;

    fn set_switch(device: &str) -> Message {
        Message::Set(SetVector {
            device: device.into(),
            name: "CONNECTION".into(),
            state: State::Ok,
            timeout: None,
            timestamp: None,
            message: None,
            elements: OneElements::Switch(vec![OneSwitch {
                name: "CONNECT".into(),
                value: SwitchState::On,
            }]),
        })
    }

    fn set_blob(device: &str) -> Message {
        Message::Set(SetVector {
            device: device.into(),
            name: "CCD1".into(),
            state: State::Ok,
            timeout: None,
            timestamp: None,
            message: None,
            elements: OneElements::Blob(vec![OneBlob {
                name: "CCD1".into(),
                blob: Blob::new(".fits", b"SIMPLE".to_vec()),
            }]),
        })
    }

    fn enable(device: &str, value: BlobEnable) -> Message {
        Message::EnableBlob(EnableBlob {
            device: device.into(),
            name: None,
            value,
        })
    }

    fn drain(mailbox: &mut Mailbox) -> Vec<Arc<Message>> {
        let mut out = Vec::new();
        while let Ok(msg) = mailbox.try_recv() {
            out.push(msg);
        }
        out
    }

    #[test]
    fn client_messages_reach_accepting_drivers() {
        let router = Router::new();
        let (_ccd, mut ccd_box) = router.register_driver("CCD", DeviceFilter::Device("CCD".into()));
        let (_mount, mut mount_box) =
            router.register_driver("Mount", DeviceFilter::Device("Mount".into()));
        let (_proxy, mut proxy_box) = router.register_driver("proxy", DeviceFilter::All);
        let (client, _client_box) = router.register_client("gui");

        let get = Message::GetProperties(GetProperties::new(Some("CCD".into()), None));
        assert_eq!(router.dispatch(get, client), 2);
        assert_eq!(drain(&mut ccd_box).len(), 1);
        assert!(drain(&mut mount_box).is_empty());
        assert_eq!(drain(&mut proxy_box).len(), 1);

        assert_eq!(
            router.dispatch(Message::GetProperties(GetProperties::all()), client),
            3
        );
    }

    #[test]
    fn client_get_properties_is_not_echoed_to_clients() {
        let router = Router::new();
        let (a, mut a_box) = router.register_client("a");
        let (_b, mut b_box) = router.register_client("b");
        router.dispatch(Message::GetProperties(GetProperties::all()), a);
        assert!(drain(&mut a_box).is_empty());
        assert!(drain(&mut b_box).is_empty());
    }

    #[test]
    fn default_policy_withholds_blobs() {
        let router = Router::new();
        let (driver, _driver_box) = router.register_driver("CCD", DeviceFilter::Device("CCD".into()));
        let (client, mut client_box) = router.register_client("gui");
        assert_eq!(router.blob_policy(client, "CCD"), Some(BlobEnable::Never));

        router.dispatch(set_blob("CCD"), driver);
        router.dispatch(set_switch("CCD"), driver);
        let got = drain(&mut client_box);
        assert_eq!(got.len(), 1);
        assert!(!got[0].is_blob());
    }

    #[test]
    fn only_policy_receives_blobs_alone() {
        let router = Router::new();
        let (driver, _driver_box) = router.register_driver("CCD", DeviceFilter::Device("CCD".into()));
        let (client, mut client_box) = router.register_client("blob");
        router.dispatch(enable("CCD", BlobEnable::Only), client);
        assert_eq!(router.blob_policy(client, "CCD"), Some(BlobEnable::Only));

        router.dispatch(set_switch("CCD"), driver);
        router.dispatch(set_blob("CCD"), driver);
        let got = drain(&mut client_box);
        assert_eq!(got.len(), 1);
        assert!(got[0].is_blob());
    }

    #[test]
    fn also_policy_receives_blobs_but_not_property_chatter() {
        let router = Router::new();
        let (driver, _driver_box) = router.register_driver("CCD", DeviceFilter::Device("CCD".into()));
        let (client, mut client_box) = router.register_client("gui");
        router.dispatch(enable("CCD", BlobEnable::Also), client);

        router.dispatch(set_blob("CCD"), driver);
        assert_eq!(router.dispatch(set_switch("CCD"), driver), 0);
        let received = drain(&mut client_box);
        assert_eq!(received.len(), 1);
        assert!(received[0].is_blob());

        // Policies are per device.
        router.dispatch(set_blob("Guider"), driver);
        assert!(drain(&mut client_box).is_empty());
    }

    #[test]
    fn enable_blob_is_forwarded_to_the_driver() {
        let router = Router::new();
        let (_driver, mut driver_box) =
            router.register_driver("CCD", DeviceFilter::Device("CCD".into()));
        let (client, _client_box) = router.register_client("gui");
        assert_eq!(router.dispatch(enable("CCD", BlobEnable::Also), client), 1);
        assert!(matches!(
            drain(&mut driver_box)[0].as_ref(),
            Message::EnableBlob(_)
        ));
    }

    #[test]
    fn new_blob_from_client_goes_to_driver() {
        let router = Router::new();
        let (_driver, mut driver_box) =
            router.register_driver("CCD", DeviceFilter::Device("CCD".into()));
        let (client, _client_box) = router.register_client("gui");
        let upload = Message::New(NewVector {
            device: "CCD".into(),
            name: "UPLOAD".into(),
            timestamp: None,
            elements: NewElements::Blob(vec![OneBlob {
                name: "FILE".into(),
                blob: Blob::new(".txt", b"hello".to_vec()),
            }]),
        });
        assert_eq!(router.dispatch(upload, client), 1);
        assert_eq!(drain(&mut driver_box).len(), 1);
    }

    #[test]
    fn unregister_and_closed_mailboxes() {
        let router = Router::new();
        let (driver, _driver_box) = router.register_driver("CCD", DeviceFilter::Device("CCD".into()));
        let (gone, gone_box) = router.register_client("gone");
        let (kept, mut kept_box) = router.register_client("kept");
        drop(gone_box);

        assert_eq!(router.dispatch(set_switch("CCD"), driver), 1);
        assert_eq!(drain(&mut kept_box).len(), 1);

        assert!(router.unregister(gone));
        assert!(!router.unregister(gone));
        assert_eq!(router.client_count(), 1);
        assert_eq!(router.blob_policy(gone, "CCD"), None);
        assert!(router.unregister(kept));
        assert!(router.unregister(driver));
        assert_eq!(router.driver_count(), 0);
    }

    #[test]
    fn filter_accepts() {
        let ccd = DeviceFilter::Device("CCD".into());
        assert!(ccd.accepts(Some("CCD")));
        assert!(ccd.accepts(None));
        assert!(ccd.accepts(Some("")));
        assert!(!ccd.accepts(Some("Mount")));
        assert!(DeviceFilter::All.accepts(Some("Mount")));
    }

    #[test]
    fn policy_table() {
        assert!(blob_policy_allows(BlobEnable::Never, false));
        assert!(!blob_policy_allows(BlobEnable::Never, true));
        assert!(blob_policy_allows(BlobEnable::Also, true));
        assert!(!blob_policy_allows(BlobEnable::Also, false));
        assert!(blob_policy_allows(BlobEnable::Only, true));
        assert!(!blob_policy_allows(BlobEnable::Only, false));
    }
}
