//! INDI message routing.
//!
//! A [`Router`] relays messages between driver endpoints and client
//! endpoints, applying each client's per-device BLOB policy. Endpoints are
//! fed through mailboxes, so dispatch never waits on a connection.
//!
//! Around it:
//! - [`TcpServer`] serves INDI clients over TCP
//! - [`DriverHost`] runs an in-process [`Driver`](indiwire_property::Driver)
//!   and hands out snooping clients
//! - [`UpstreamProxy`] chains another INDI server in as a driver for all of
//!   its devices

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod connection;
pub mod error;
pub mod host;
pub mod listener;
pub mod proxy;
pub mod router;

pub use connection::{serve_client, serve_tcp_client};
pub use error::{Result, RouterError};
pub use host::DriverHost;
pub use listener::{ServerConfig, TcpServer};
pub use proxy::UpstreamProxy;
pub use router::{blob_policy_allows, DeviceFilter, Mailbox, PeerId, Router, RouterConfig};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
