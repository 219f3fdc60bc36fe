//! Server handle: startup and graceful shutdown.
//!
//! # Shutdown sequence (for beginners)
//!
//! A blocking `accept` or `read` does not notice a flag being flipped, so
//! stopping a thread-per-connection server means waking every blocked call:
//!
//! 1. Under the registry lock, set `running = false` and shut down every
//!    registered session socket.  Sessions blocked in `read` see EOF and end
//!    with `ConnectionLost`.
//! 2. Shut down a cloned handle of the listening socket, then make one
//!    loopback connection to it.  Either wakes the blocked `accept`, and the
//!    accept loop exits because `running` is false.
//! 3. Join the listener thread, then every session thread it handed back.
//!
//! `stop()` returns only after step 3.  A second call does no work of its
//! own but still returns only once the first has finished.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use socket2::Socket;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::application::inference::InferenceAdapter;
use crate::application::session::SessionSettings;
use crate::infrastructure::network::listener::{self, SessionContext};
use crate::infrastructure::network::registry::ServerState;
use crate::infrastructure::network::stats::{ServerStats, StatsSnapshot};

/// How long the loopback wake-up connection may take.
const WAKE_TIMEOUT: Duration = Duration::from_secs(1);

/// Errors that can occur while starting the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed to spawn listener thread: {0}")]
    Spawn(#[source] io::Error),
}

/// A running classification server.
///
/// Dropping the handle stops the server.
pub struct Server {
    local_addr: SocketAddr,
    state: Arc<ServerState>,
    stats: Arc<ServerStats>,
    /// Clone of the listening socket, used only to shut it down.
    wake: Socket,
    listener: Mutex<Option<JoinHandle<Vec<JoinHandle<()>>>>>,
    stopped: Mutex<bool>,
    stopped_cv: Condvar,
}

impl Server {
    /// Binds `addr` and starts accepting connections on a background thread.
    ///
    /// Port `0` picks an ephemeral port; see [`local_addr`](Server::local_addr).
    pub fn start(
        addr: SocketAddr,
        adapter: Arc<InferenceAdapter>,
        settings: SessionSettings,
    ) -> Result<Self, ServerError> {
        let bind_err = |source| ServerError::Bind { addr, source };
        let socket = listener::bind(addr).map_err(bind_err)?;
        let wake = socket.try_clone().map_err(bind_err)?;
        let tcp: TcpListener = socket.into();
        let local_addr = tcp.local_addr().map_err(bind_err)?;

        let state = ServerState::new();
        let stats = Arc::new(ServerStats::default());
        let ctx = Arc::new(SessionContext {
            adapter,
            settings,
            stats: Arc::clone(&stats),
        });

        let loop_state = Arc::clone(&state);
        let handle = thread::Builder::new()
            .name("petal-listener".to_string())
            .spawn(move || listener::accept_loop(tcp, loop_state, ctx))
            .map_err(ServerError::Spawn)?;

        info!(%local_addr, "server listening");
        Ok(Self {
            local_addr,
            state,
            stats,
            wake,
            listener: Mutex::new(Some(handle)),
            stopped: Mutex::new(false),
            stopped_cv: Condvar::new(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Number of sessions currently registered.
    pub fn active_sessions(&self) -> usize {
        self.state.active_sessions()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Stops accepting, force-closes every live session and joins all threads.
    ///
    /// A call made while another one is in progress waits for it to finish.
    pub fn stop(&self) {
        let Some(closed) = self.state.begin_shutdown() else {
            debug!("stop requested on a server that is already stopping");
            self.wait();
            return;
        };
        info!(closed_sessions = closed, "shutting down");

        if let Err(e) = self.wake.shutdown(Shutdown::Both) {
            debug!(error = %e, "listening socket shutdown failed");
        }
        wake_accept(self.local_addr);

        let handle = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            match handle.join() {
                Ok(sessions) => {
                    for session in sessions {
                        if session.join().is_err() {
                            error!("session thread panicked");
                        }
                    }
                }
                Err(_) => error!("listener thread panicked"),
            }
        }

        *self.stopped.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.stopped_cv.notify_all();
        info!("server stopped");
    }

    /// Blocks until [`stop`](Server::stop) has finished.
    pub fn wait(&self) {
        let mut stopped = self.stopped.lock().unwrap_or_else(PoisonError::into_inner);
        while !*stopped {
            stopped = self
                .stopped_cv
                .wait(stopped)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Connects to the listener once so a blocked `accept` returns.
fn wake_accept(addr: SocketAddr) {
    let mut target = addr;
    if target.ip().is_unspecified() {
        target.set_ip(match addr {
            SocketAddr::V4(_) => Ipv4Addr::LOCALHOST.into(),
            SocketAddr::V6(_) => Ipv6Addr::LOCALHOST.into(),
        });
    }
    match TcpStream::connect_timeout(&target, WAKE_TIMEOUT) {
        Ok(stream) => drop(stream),
        Err(e) => debug!(error = %e, "wake-up connection not accepted"),
    }
}
