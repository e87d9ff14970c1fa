//! TCP listener and accept loop.
//!
//! # Lifecycle
//!
//! ```text
//! Idle ──► Starting ──► Ready ──► Failed     (accept error: server stops itself)
//!                         └─────► Cancelled  (explicit stop)
//! ```
//!
//! `Starting` and bind failures are reported by the caller around
//! [`bind_listener`]; `Ready` and `Cancelled` are reported by the accept task
//! spawned in [`spawn_acceptor`].  An accept failure is handed to the owner,
//! which stops the server and then reports `Failed`.
//!
//! # SO_REUSEADDR (for beginners)
//!
//! After a server closes, the kernel keeps its port in `TIME_WAIT` for a
//! while.  Without `SO_REUSEADDR`, restarting the server in that window fails
//! with "address already in use".  The option lets the new socket bind anyway.
//! It does **not** allow two live listeners on the same port.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::application::event_loop::{EventSender, ListenerState, ServerEvent};
use crate::infrastructure::network::tcp_channel::accept_connection;

const BACKLOG: u32 = 1024;

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The socket could not be created, configured or bound.
    #[error("failed to bind {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    /// The bound socket could not report its local address.
    #[error("could not read listener address: {0}")]
    LocalAddr(#[source] io::Error),
    /// `accept` returned an error; the listener is no longer usable.
    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),
}

/// Binds a listening socket on `addr`.
///
/// Port 0 binds an ephemeral port; read it back from
/// [`ListenerHandle::local_addr`].
///
/// # Errors
///
/// Returns [`ListenerError::BindFailed`] if any step of socket setup fails.
pub fn bind_listener(addr: SocketAddr, reuse_address: bool) -> Result<TcpListener, ListenerError> {
    let bind_err = |source| ListenerError::BindFailed { addr, source };

    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(bind_err)?;
    socket.set_reuseaddr(reuse_address).map_err(bind_err)?;
    socket.bind(addr).map_err(bind_err)?;
    socket.listen(BACKLOG).map_err(bind_err)
}

/// A running accept loop.
///
/// Dropping the handle also stops the loop; [`cancel`](Self::cancel) stops it
/// and waits for the task to finish.
pub struct ListenerHandle {
    local_addr: SocketAddr,
    cancel_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl ListenerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting and waits for the accept task to exit.
    pub async fn cancel(mut self) {
        self.cancel_tx.send_replace(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.cancel_tx.send_replace(true);
    }
}

/// Starts the accept loop for `listener`.
///
/// Every accepted connection is passed to
/// [`accept_connection`], which queues it on `events`.  If `accept` fails, the
/// loop sends the error on `failure` and exits; when `failure` has no
/// receiver it publishes [`ListenerState::Failed`] itself.
///
/// # Errors
///
/// Returns [`ListenerError::LocalAddr`] if the bound address cannot be read.
pub fn spawn_acceptor(
    listener: TcpListener,
    events: EventSender,
    failure: oneshot::Sender<ListenerError>,
) -> Result<ListenerHandle, ListenerError> {
    let local_addr = listener.local_addr().map_err(ListenerError::LocalAddr)?;
    let (cancel_tx, cancel_rx) = watch::channel(false);

    let _ = events.send(ServerEvent::ListenerStateChanged {
        state: ListenerState::Ready,
        local_addr: Some(local_addr),
    });
    info!("listening on {local_addr}");

    let task = tokio::spawn(accept_loop(listener, events, cancel_rx, failure));
    Ok(ListenerHandle {
        local_addr,
        cancel_tx,
        task: Some(task),
    })
}

async fn accept_loop(
    listener: TcpListener,
    events: EventSender,
    mut cancel_rx: watch::Receiver<bool>,
    failure: oneshot::Sender<ListenerError>,
) {
    let mut failure = Some(failure);
    loop {
        tokio::select! {
            _ = cancel_rx.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    if !accept_connection(stream, peer, &events) {
                        // Event loop gone; nobody can use new clients.
                        break;
                    }
                }
                Err(e) => {
                    error!("accept failed: {e}");
                    let reason = e.to_string();
                    // The owner publishes `Failed` once it has stopped; report
                    // it here only if nobody is listening for the failure.
                    let delivered = failure
                        .take()
                        .is_some_and(|tx| tx.send(ListenerError::Accept(e)).is_ok());
                    if !delivered {
                        let _ = events.send(ServerEvent::ListenerStateChanged {
                            state: ListenerState::Failed(reason),
                            local_addr: None,
                        });
                    }
                    return;
                }
            },
        }
    }
    info!("listener cancelled");
    let _ = events.send(ServerEvent::ListenerStateChanged {
        state: ListenerState::Cancelled,
        local_addr: None,
    });
}
