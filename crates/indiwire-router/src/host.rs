//! In-process drivers on a router.

use std::fmt;
use std::sync::{Arc, Mutex};

use indiwire_client::Client;
use indiwire_message::MessageSink;
use indiwire_property::{Driver, DriverDef};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::Result;
use crate::lock;
use crate::router::{DeviceFilter, PeerId, Router};

/// Runs a [`Driver`] as a router endpoint.
///
/// The driver's outbound messages are dispatched on its behalf, and a task
/// feeds it every client message routed to its device. Dropping the host
/// stops that task and unregisters the driver and its snooping clients.
pub struct DriverHost {
    driver: Driver,
    id: PeerId,
    router: Router,
    inbound: JoinHandle<()>,
    snoops: Mutex<Vec<(PeerId, JoinHandle<()>)>>,
}

impl DriverHost {
    /// Build the driver from `def` and register it under its device name.
    ///
    /// Must be called within a Tokio runtime.
    pub fn attach(router: &Router, def: DriverDef) -> Result<Self> {
        let name = def.name.clone();
        let (id, mut mailbox) = router.register_driver(name.clone(), DeviceFilter::Device(name));
        let driver = match def.build(dispatcher(router, id)) {
            Ok(driver) => driver,
            Err(err) => {
                router.unregister(id);
                return Err(err.into());
            }
        };

        let inbound = {
            let driver = driver.clone();
            tokio::spawn(async move {
                while let Some(msg) = mailbox.recv().await {
                    if let Err(err) = driver.handle_client_message(&msg) {
                        debug!(device = %driver.name(), tag = msg.tag_name(), error = %err, "client message not applied");
                    }
                }
            })
        };

        info!(peer = %id, device = %driver.name(), "driver attached");
        Ok(Self {
            driver,
            id,
            router: router.clone(),
            inbound,
            snoops: Mutex::new(Vec::new()),
        })
    }

    pub fn driver(&self) -> &Driver {
        &self.driver
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    /// Observe another device through the router.
    ///
    /// The returned client is registered as an ordinary client and has
    /// already asked for the device's definitions (or one vector's).
    pub fn snoop(&self, device: &str, vector: Option<&str>) -> Client {
        let (id, mut mailbox) = self
            .router
            .register_client(format!("{} snooping {device}", self.driver.name()));
        let client = Client::new(dispatcher(&self.router, id));
        let task = {
            let client = client.clone();
            tokio::spawn(async move {
                while let Some(msg) = mailbox.recv().await {
                    client.process_message(&msg);
                }
            })
        };
        lock(&self.snoops).push((id, task));

        debug!(device = %self.driver.name(), snooped = device, vector = ?vector, "snooping");
        client.handshake(Some(device), vector);
        client
    }
}

/// A sink dispatching every message on behalf of `id`.
fn dispatcher(router: &Router, id: PeerId) -> MessageSink {
    let router = router.clone();
    Arc::new(move |msg| {
        router.dispatch(msg, id);
    })
}

impl Drop for DriverHost {
    fn drop(&mut self) {
        self.inbound.abort();
        self.router.unregister(self.id);
        for (id, task) in lock(&self.snoops).drain(..) {
            task.abort();
            self.router.unregister(id);
        }
    }
}

impl fmt::Debug for DriverHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverHost")
            .field("id", &self.id)
            .field("device", &self.driver.name())
            .field("snoops", &lock(&self.snoops).len())
            .finish()
    }
}
