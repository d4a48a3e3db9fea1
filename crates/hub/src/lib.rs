//! Relay hub: the session registry, broadcast fan-out, and the TCP relay
//! server that wires accept → handshake → register → receive loop.
//!
//! Lifecycle per connection:
//! 1. Accept, send the `NICK` handshake request
//! 2. Read the nickname under a bounded timeout, validate, register
//! 3. Announce the join, enter the read loop (one task per connection)
//! 4. Each inbound line passes the moderation gate before fan-out
//! 5. On any exit path: unregister (idempotent), announce the departure
//!
//! The registry is the only shared mutable state; all mutation and the
//! snapshot used for fan-out go through [`state::HubState`].

pub mod error;
pub mod server;
pub mod state;

pub use {
    error::RelayError,
    server::{Relay, RelayOptions},
    state::{HubState, Session},
};
