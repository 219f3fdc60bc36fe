//! Network infrastructure for the classification server.
//!
//! # Sub-modules
//!
//! - **`registry`** – Shared [`ServerState`]: the running flag and the closer
//!   of every live session, guarded by one mutex.
//! - **`stats`**    – Lock-free counters of how sessions ended.
//! - **`listener`** – Binds the listening socket and runs the accept loop,
//!   spawning one named thread per connection.
//! - **`server`**   – The [`Server`] handle: starts the listener thread and
//!   coordinates graceful shutdown.
//!
//! # Threading model (for beginners)
//!
//! ```text
//! main ──► Server::start ──► petal-listener ──accept──► petal-session-1
//!                                   │                   petal-session-2
//!                                   │                   ...
//! main ──► Server::stop ────────────┴── closes every socket, joins every thread
//! ```
//!
//! All socket I/O is blocking.  A session stuck in `read` is released by
//! shutting its socket down from the stopping thread, which makes the read
//! return and the session end with `ConnectionLost`.

pub mod listener;
pub mod registry;
pub mod server;
pub mod stats;

pub use registry::{RegistrationGuard, ServerState, SessionCloser, SessionSocket};
pub use server::{Server, ServerError};
pub use stats::{ServerStats, StatsSnapshot};
