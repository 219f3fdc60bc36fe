//! Listening socket and accept loop.
//!
//! The accept loop runs on its own thread (`petal-listener`).  For every
//! connection it registers a closer with [`ServerState`] and spawns a named
//! session thread.  It returns the join handles of the sessions still running
//! when it exits, so the shutdown path can wait for them.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, error, info, warn};

use crate::application::inference::InferenceAdapter;
use crate::application::session::{Session, SessionSettings};
use crate::domain::connection::ConnectionInfo;
use crate::infrastructure::network::registry::{
    close_socket, RegistrationGuard, ServerState, SessionSocket,
};
use crate::infrastructure::network::stats::ServerStats;

/// Pause after a failed `accept` before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Everything a session thread needs besides its socket.
#[derive(Debug)]
pub struct SessionContext {
    pub adapter: Arc<InferenceAdapter>,
    pub settings: SessionSettings,
    pub stats: Arc<ServerStats>,
}

#[cfg(unix)]
fn max_backlog() -> i32 {
    libc::SOMAXCONN
}

#[cfg(not(unix))]
fn max_backlog() -> i32 {
    i32::MAX
}

/// Creates a blocking listening socket with `SO_REUSEADDR` and the
/// platform's maximum backlog.
pub fn bind(addr: SocketAddr) -> io::Result<Socket> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(max_backlog())?;
    Ok(socket)
}

/// Accepts connections until the server stops.
pub fn accept_loop(
    listener: TcpListener,
    state: Arc<ServerState>,
    ctx: Arc<SessionContext>,
) -> Vec<JoinHandle<()>> {
    let mut sessions: Vec<JoinHandle<()>> = Vec::new();
    let mut accepted: u64 = 0;

    loop {
        match listener.accept() {
            Ok((stream, peer)) => {
                if !state.is_running() {
                    debug!(%peer, "connection arrived during shutdown, closing");
                    let _ = close_socket(&stream);
                    break;
                }
                sessions.retain(|handle| !handle.is_finished());
                accepted += 1;
                if let Some(handle) = spawn_session(stream, peer, accepted, &state, &ctx) {
                    sessions.push(handle);
                }
            }
            Err(e) => {
                if !state.is_running() {
                    debug!(error = %e, "accept interrupted by shutdown");
                    break;
                }
                error!(error = %e, "accept failed");
                thread::sleep(ACCEPT_BACKOFF);
            }
        }
    }

    sessions.retain(|handle| !handle.is_finished());
    info!(remaining = sessions.len(), "listener stopped");
    sessions
}

fn spawn_session(
    stream: TcpStream,
    peer: SocketAddr,
    n: u64,
    state: &Arc<ServerState>,
    ctx: &Arc<SessionContext>,
) -> Option<JoinHandle<()>> {
    let info = ConnectionInfo::new(peer);
    let (socket, closer) = match SessionSocket::new(stream) {
        Ok(pair) => pair,
        Err(e) => {
            warn!(%peer, error = %e, "cannot clone socket, dropping connection");
            return None;
        }
    };
    if !state.register(info.id, closer) {
        return None;
    }

    let guard = RegistrationGuard::new(Arc::clone(state), info.id);
    let ctx = Arc::clone(ctx);
    let spawned = thread::Builder::new()
        .name(format!("petal-session-{n}"))
        .spawn(move || {
            let _guard = guard;
            serve(info, socket, &ctx);
        });
    match spawned {
        Ok(handle) => Some(handle),
        Err(e) => {
            // The closure was dropped: the guard deregistered and the socket closed.
            error!(%peer, error = %e, "failed to spawn session thread");
            None
        }
    }
}

/// Runs one session and records how it ended.
fn serve(info: ConnectionInfo, socket: SessionSocket, ctx: &SessionContext) {
    info!(session = %info.id, peer = %info.peer, "connection established");
    let outcome = Session::new(info, socket).run(&ctx.adapter, &ctx.settings);
    match &outcome {
        Ok(result) => {
            debug!(session = %info.id, index = result.index, "session complete")
        }
        Err(e) => warn!(
            session = %info.id,
            peer = %info.peer,
            kind = ?e.kind(),
            error = %e,
            "session failed"
        ),
    }
    ctx.stats.record(&outcome);
}
