//! Connection state machine: role, lifecycle states, the data-phase
//! [`Connection`] and the full-lifecycle [`WSConnection`] façade.

mod role;
mod state;

#[allow(clippy::module_inception)]
mod connection;

pub use connection::{Connection, ConnectionEvents, Events, WSConnection};
pub use role::Role;
pub use state::ConnectionState;
