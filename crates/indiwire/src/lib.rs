//! INDI instrument-control protocol for Rust.
//!
//! INDI drivers expose hardware as named property vectors; clients discover
//! them, watch their state and request changes, all as XML fragments over a
//! byte stream, usually through a central server.
//!
//! # Crate Structure
//!
//! - [`message`]: typed messages, XML codec, stream decoder, number formats
//! - [`property`]: device-side property tree with rule enforcement and events
//! - [`client`]: remote mirror, subscriptions and condition waits
//! - [`router`]: driver/client exchange, TCP server, upstream proxy

/// Re-export message types.
pub mod message {
    pub use indiwire_message::*;
}

/// Re-export property model types.
pub mod property {
    pub use indiwire_property::*;
}

/// Re-export client types.
pub mod client {
    pub use indiwire_client::*;
}

/// Re-export router types.
pub mod router {
    pub use indiwire_router::*;
}
