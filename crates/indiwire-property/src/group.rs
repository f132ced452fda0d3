use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::bus::{EventBus, EventKind, SubscriptionId};
use crate::driver::DeviceShared;
use crate::event::PropertyEvent;
use crate::vector::Vector;

pub(crate) struct GroupShared {
    pub(crate) name: String,
    pub(crate) enabled: AtomicBool,
    pub(crate) bus: EventBus<PropertyEvent>,
    pub(crate) device: Arc<DeviceShared>,
}

impl GroupShared {
    pub(crate) fn new(name: String, enabled: bool, device: Arc<DeviceShared>) -> Self {
        Self {
            name,
            enabled: AtomicBool::new(enabled),
            bus: EventBus::new(),
            device,
        }
    }

    pub(crate) fn enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

/// A named set of vectors, shown together by clients.
#[derive(Clone)]
pub struct Group {
    shared: Arc<GroupShared>,
    vectors: Vec<Vector>,
}

impl Group {
    pub(crate) fn new(shared: Arc<GroupShared>, vectors: Vec<Vector>) -> Self {
        Self { shared, vectors }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn enabled(&self) -> bool {
        self.shared.enabled()
    }

    /// Show or hide every vector of the group. Each vector re-emits its
    /// definition (a `delProperty` when hidden) followed by its values.
    pub fn set_enabled(&self, enabled: bool) {
        self.shared.enabled.store(enabled, Ordering::SeqCst);
        tracing::debug!(device = %self.shared.device.name, group = %self.shared.name, enabled, "group toggled");
        for vector in &self.vectors {
            vector.send_definition();
            vector.send_update();
        }
    }

    pub fn vectors(&self) -> &[Vector] {
        &self.vectors
    }

    pub fn vector(&self, name: &str) -> Option<&Vector> {
        self.vectors.iter().find(|v| v.name() == name)
    }

    pub fn events(&self) -> &EventBus<PropertyEvent> {
        &self.shared.bus
    }

    /// Observe events of every element and vector in the group.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&PropertyEvent) + Send + Sync + 'static,
    {
        self.shared.bus.subscribe(kind, handler)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.shared.bus.unsubscribe(id)
    }
}

impl fmt::Debug for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Group")
            .field("name", &self.shared.name)
            .field("enabled", &self.enabled())
            .field("vectors", &self.vectors.len())
            .finish()
    }
}
