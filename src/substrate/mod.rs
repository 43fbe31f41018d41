//! Timer substrates: where the single armed timer actually lives.
//!
//! [`LocalTimer`] keeps it in a tokio task; [`RemoteTimer`] hands it to a
//! timer service over HTTP and listens for fires on an event stream.

pub mod local;
pub mod remote;
pub mod sse;

pub use local::LocalTimer;
pub use remote::RemoteTimer;
