//! Active-session registry and the running flag.
//!
//! The listener registers a [`SessionCloser`] for every accepted socket and
//! the shutdown path closes them all.  Both happen under the same mutex, so a
//! connection is either registered before shutdown (and gets closed by it)
//! or rejected after it.  There is no window in which a session can start
//! unseen by `stop()`.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;
use uuid::Uuid;

use crate::application::session::SessionStream;

/// Shuts both directions of `stream` down.  Closing twice is not an error.
pub fn close_socket(stream: &TcpStream) -> io::Result<()> {
    match stream.shutdown(Shutdown::Both) {
        Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
        other => other,
    }
}

/// An accepted connection as seen by its session.
///
/// Shares a flag with its [`SessionCloser`] so the session can tell a
/// shutdown-forced EOF from the peer hanging up.
#[derive(Debug)]
pub struct SessionSocket {
    stream: TcpStream,
    forced: Arc<AtomicBool>,
}

impl SessionSocket {
    /// Wraps `stream` and creates the closer the registry will hold for it.
    pub fn new(stream: TcpStream) -> io::Result<(Self, SessionCloser)> {
        let forced = Arc::new(AtomicBool::new(false));
        let closer = SessionCloser {
            stream: stream.try_clone()?,
            forced: Arc::clone(&forced),
        };
        Ok((Self { stream, forced }, closer))
    }
}

impl Read for SessionSocket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Write for SessionSocket {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

impl SessionStream for SessionSocket {
    fn close(&self) -> io::Result<()> {
        close_socket(&self.stream)
    }

    fn force_closed(&self) -> bool {
        self.forced.load(Ordering::Acquire)
    }
}

/// A cloned socket handle that can only close the session's connection.
#[derive(Debug)]
pub struct SessionCloser {
    stream: TcpStream,
    forced: Arc<AtomicBool>,
}

impl SessionCloser {
    /// Marks the session as force-closed, then shuts its socket down.
    pub fn close(&self) -> io::Result<()> {
        self.forced.store(true, Ordering::Release);
        close_socket(&self.stream)
    }
}

#[derive(Debug)]
struct Registry {
    running: bool,
    sessions: HashMap<Uuid, SessionCloser>,
}

/// Running flag plus the closers of all live sessions.
#[derive(Debug)]
pub struct ServerState {
    inner: Mutex<Registry>,
}

impl ServerState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Registry {
                running: true,
                sessions: HashMap::new(),
            }),
        })
    }

    // A panic while holding the lock leaves the map consistent, so a
    // poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    /// Records a new session.
    ///
    /// Returns `false`, after closing the connection, if the server is
    /// already stopping; the caller must not start the session then.
    pub fn register(&self, id: Uuid, closer: SessionCloser) -> bool {
        let mut registry = self.lock();
        if !registry.running {
            let _ = closer.close();
            return false;
        }
        registry.sessions.insert(id, closer);
        true
    }

    pub fn deregister(&self, id: Uuid) {
        self.lock().sessions.remove(&id);
    }

    pub fn active_sessions(&self) -> usize {
        self.lock().sessions.len()
    }

    /// Flips the running flag and closes every registered session.
    ///
    /// Returns the number of sessions closed, or `None` if shutdown had
    /// already begun.
    pub fn begin_shutdown(&self) -> Option<usize> {
        let mut registry = self.lock();
        if !registry.running {
            return None;
        }
        registry.running = false;
        for (id, closer) in &registry.sessions {
            if let Err(e) = closer.close() {
                debug!(session = %id, error = %e, "closing session socket failed");
            }
        }
        Some(registry.sessions.len())
    }
}

/// Deregisters a session when dropped, on every exit path of its thread.
#[derive(Debug)]
pub struct RegistrationGuard {
    state: Arc<ServerState>,
    id: Uuid,
}

impl RegistrationGuard {
    pub fn new(state: Arc<ServerState>, id: Uuid) -> Self {
        Self { state, id }
    }
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        self.state.deregister(self.id);
    }
}
