//! Remote Module
//!
//! Both ends of remote storage access.
//!
//! ## Roles
//! - `StorageDispatcher`: server side, executes commands on a local `Storage`
//! - `RemoteStorage`: client side, implements `Storage` over a `Channel`
//! - `RemoteRead` / `RemoteWrite`: block streams seen as `Read` / `Write`
//!
//! A driver may itself talk to a server whose dispatcher wraps another
//! `RemoteStorage`, so requests can hop across several hosts. Faults carry
//! a `raised from <role> protocol on '<host>'` prefix per hop.

mod dispatcher;
mod driver;
mod read;
mod write;

pub use dispatcher::StorageDispatcher;
pub use driver::RemoteStorage;
pub use read::RemoteRead;
pub use write::RemoteWrite;
