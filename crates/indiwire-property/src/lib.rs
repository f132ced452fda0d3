//! Device-side INDI property model.
//!
//! A driver is a tree of groups, vectors and elements built from a
//! declarative [`DriverDef`]. Elements hold typed values; every mutation
//! goes through the vector so switch rules hold, and every committed change
//! is pushed to the driver's outbound [`MessageSink`] as a `set*Vector`.
//!
//! Each node owns an [`EventBus`]. Driver code reacts to client writes by
//! subscribing to [`EventKind::Write`] on an element (optionally calling
//! [`PreventDefault::prevent`] to commit later) and to reads, changes and
//! state updates the same way.
//!
//! [`MessageSink`]: indiwire_message::MessageSink

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod bus;
pub mod definition;
pub mod driver;
pub mod element;
pub mod error;
pub mod event;
pub mod group;
pub mod standard;
pub mod value;
pub mod vector;

pub use bus::{BoxFuture, BusEvent, EventBus, EventKind, SubscriptionId};
pub use definition::{DriverDef, ElementDef, GroupDef, NumberSpec, VectorDef};
pub use driver::Driver;
pub use element::Element;
pub use error::{PropertyError, Result};
pub use event::{PreventDefault, PropertyEvent};
pub use group::Group;
pub use standard::DriverInterface;
pub use value::Value;
pub use vector::Vector;

/// Lock a mutex, recovering the data if a handler panicked while holding it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
