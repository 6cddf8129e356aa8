// src/lib.rs
//! Remote Names: shortest unambiguous names for the objects of a running
//! target application.
//!
//! The target exposes its object tree through an [`Introspector`]. A
//! [`NameRegister`] walks that tree, keeps it up to date from the events sent
//! by the target, and answers which qualified name (`Dialog/Ok button`) tells
//! an object apart from every other object with the same name.

pub mod config;
pub mod error;
pub mod events;
pub mod path;
pub mod register;
pub mod remote;

pub use config::RegisterConfig;
pub use error::{RemoteError, Result};
pub use events::{Event, EventKind, EventReceiver, EventSender, RemoteEvent, SystemEvent};
pub use register::{NameEvent, NameRegister};
pub use remote::{Introspector, ObjectId, ObjectMapper, RemoteObject};

use once_cell::sync::Lazy;
use std::future::Future;
use tokio::task::JoinHandle;

/// Runtime used when the register is driven from outside a tokio context.
pub(crate) static RUNTIME: Lazy<tokio::runtime::Runtime> = Lazy::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("remote-names")
        .enable_all()
        .build()
        .expect("failed to build the remote-names runtime")
});

/// Spawn on the current runtime, or on the shared one if there is none.
pub(crate) fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => handle.spawn(future),
        Err(_) => RUNTIME.spawn(future),
    }
}

/// Install a plain `fmt` subscriber writing to stderr.
#[cfg(feature = "logging")]
pub fn init_logging(max_level: tracing::Level) {
    let _ = tracing_subscriber::fmt()
        .with_max_level(max_level)
        .with_writer(std::io::stderr)
        .try_init();
}
