//! Network Module
//!
//! Serving the protocol over a transport.
//!
//! ## Architecture
//! - `Session`: one command loop per channel (stdio of a spawned remote,
//!   or one TCP connection)
//! - `Server`: single acceptor thread, one session thread per connection
//! - Commands routed through a chain of `CommandHandler`s

mod server;
mod session;

pub use server::Server;
pub use session::{CommandHandler, Flow, Handled, Session};
