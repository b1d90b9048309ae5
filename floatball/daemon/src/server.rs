//! Daemon Server Implementation
//!
//! Hosts one [`OverlayCoordinator`] and lets presentation clients drive it
//! over a Unix socket:
//! - Accepts connections and checks the peer UID
//! - Gives every connection its own [`SourceId`]
//! - Forwards the attached surface's signals back to its client
//! - Detaches the source when the connection closes
//!
//! # Connection Layout
//!
//! ```text
//!   client ──frames──► reader loop ──► coordinator.handle_send   (inline)
//!                          │      └──► coordinator.handle_invoke (own task)
//!                          │
//!   client ◄──frames── writer task ◄── mpsc ◄── replies
//!                                          ◄── signal forwarder ◄── factory hub
//! ```
//!
//! Invokes run on their own task so a toggle (which waits out two fades)
//! never stalls pointer and drag frames arriving on the same connection.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use dashmap::DashMap;
use serde_json::Value;
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

use floatball_core::transport::{read_frame, write_frame};
use floatball_core::{
    ChannelDirection, CoordinatorFrame, HeadlessSurfaceFactory, OverlayConfig,
    OverlayCoordinator, SharedPointer, SourceId, SurfaceFrame, SurfaceKind, SurfaceSignal,
};

/// Outbound frames buffered per connection
const OUTBOUND_CAPACITY: usize = 256;

/// How often the accept loop re-checks the shutdown flags
const ACCEPT_POLL: Duration = Duration::from_millis(100);

/// Connection state tracking
struct ConnectionState {
    /// When the connection was established
    connected_at: Instant,
    /// Remote peer UID (from `SO_PEERCRED`)
    peer_uid: Option<u32>,
    /// Handle to abort the connection task
    abort_handle: tokio::task::AbortHandle,
}

/// Everything a connection handler needs
#[derive(Clone)]
struct Shared {
    coordinator: Arc<OverlayCoordinator>,
    factory: Arc<HeadlessSurfaceFactory>,
    pointer: SharedPointer,
    connection_states: Arc<DashMap<SourceId, ConnectionState>>,
}

/// The daemon server
pub struct DaemonServer {
    socket_path: PathBuf,
    max_connections: usize,
    shared: Shared,
}

impl DaemonServer {
    /// Create a server for `config`
    pub fn new(config: &OverlayConfig) -> Self {
        let factory = Arc::new(HeadlessSurfaceFactory::new());
        let pointer = SharedPointer::new();
        let coordinator = Arc::new(OverlayCoordinator::new(
            config,
            factory.clone(),
            Arc::new(pointer.clone()),
        ));

        Self {
            socket_path: config.socket_path.clone(),
            max_connections: config.max_connections,
            shared: Shared {
                coordinator,
                factory,
                pointer,
                connection_states: Arc::new(DashMap::new()),
            },
        }
    }

    /// Get peer credentials from Unix socket
    fn get_peer_uid(stream: &UnixStream) -> Option<u32> {
        use std::os::unix::io::AsRawFd;

        let fd = stream.as_raw_fd();
        // SAFETY: ucred is plain old data; all-zero is a valid value.
        let mut cred: libc::ucred = unsafe { std::mem::zeroed() };
        let mut len = libc::socklen_t::try_from(std::mem::size_of::<libc::ucred>()).ok()?;

        // SAFETY: fd is a live socket owned by `stream`; cred/len point to
        // properly sized, writable memory.
        let result = unsafe {
            libc::getsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_PEERCRED,
                std::ptr::addr_of_mut!(cred).cast::<libc::c_void>(),
                &mut len,
            )
        };

        (result == 0).then_some(cred.uid)
    }

    /// Create the socket directory and clear a stale socket file
    fn prepare_socket(&self) -> Result<()> {
        if let Some(parent) = self.socket_path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create socket directory: {parent:?}"))?;
                info!(path = ?parent, "Created socket directory");
            }
        }

        if self.socket_path.exists() {
            warn!(path = ?self.socket_path, "Removing stale socket file");
            fs::remove_file(&self.socket_path).with_context(|| {
                format!("Failed to remove stale socket: {:?}", self.socket_path)
            })?;
        }

        Ok(())
    }

    /// Run until `shutdown` is set or a client asks to quit
    pub async fn run(&mut self, shutdown: Arc<AtomicBool>) -> Result<()> {
        self.prepare_socket()?;

        let listener = UnixListener::bind(&self.socket_path)
            .with_context(|| format!("Failed to bind to {:?}", self.socket_path))?;
        info!(path = ?self.socket_path, "Listening for connections");

        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(&self.socket_path, perms)
                .context("Failed to restrict socket permissions")?;
        }

        self.shared
            .coordinator
            .start()
            .await
            .context("Failed to create the primary surface")?;
        info!("Overlay coordinator started");

        // SAFETY: getuid has no preconditions and cannot fail.
        let our_uid = unsafe { libc::getuid() };

        loop {
            if shutdown.load(Ordering::SeqCst) {
                info!("Shutdown requested, stopping accept loop");
                break;
            }
            if self.shared.coordinator.is_quit_requested() {
                info!("Client requested quit, stopping accept loop");
                break;
            }

            let stream = match tokio::time::timeout(ACCEPT_POLL, listener.accept()).await {
                Ok(Ok((stream, _addr))) => stream,
                Ok(Err(e)) => {
                    error!(error = %e, "Accept failed");
                    continue;
                }
                Err(_) => continue,
            };

            if self.connection_count() >= self.max_connections {
                warn!(
                    max_connections = self.max_connections,
                    "Connection limit reached, rejecting new connection"
                );
                continue;
            }

            let peer_uid = Self::get_peer_uid(&stream);
            if let Some(uid) = peer_uid {
                if uid != our_uid && uid != 0 {
                    warn!(
                        peer_uid = uid,
                        our_uid = our_uid,
                        "Rejecting connection from different user"
                    );
                    continue;
                }
            }

            let source = SourceId::new();
            info!(
                source = %source,
                peer_uid = ?peer_uid,
                active_connections = self.connection_count() + 1,
                "New connection accepted"
            );

            // Handler removes its own state on exit; it must not start first.
            let (registered_tx, registered_rx) = oneshot::channel();
            let task = tokio::spawn(
                handle_connection(source, stream, self.shared.clone(), registered_rx)
                    .instrument(tracing::info_span!("connection", %source)),
            );
            self.shared.connection_states.insert(
                source,
                ConnectionState {
                    connected_at: Instant::now(),
                    peer_uid,
                    abort_handle: task.abort_handle(),
                },
            );
            let _ = registered_tx.send(());
        }

        self.shutdown()
    }

    /// Abort connections, tear down surfaces, remove the socket
    fn shutdown(&mut self) -> Result<()> {
        info!("Initiating graceful shutdown");

        let sources: Vec<SourceId> = self
            .shared
            .connection_states
            .iter()
            .map(|r| *r.key())
            .collect();
        for source in sources {
            if let Some((_, state)) = self.shared.connection_states.remove(&source) {
                info!(
                    source = %source,
                    peer_uid = ?state.peer_uid,
                    uptime_secs = state.connected_at.elapsed().as_secs(),
                    "Aborting connection"
                );
                state.abort_handle.abort();
            }
            self.shared.coordinator.detach(&source);
        }

        self.shared.coordinator.shutdown();

        if self.socket_path.exists() {
            fs::remove_file(&self.socket_path)
                .with_context(|| format!("Failed to remove socket: {:?}", self.socket_path))?;
            info!(path = ?self.socket_path, "Socket file removed");
        }

        info!("Shutdown complete");
        Ok(())
    }

    /// Number of connected clients
    pub fn connection_count(&self) -> usize {
        self.shared.connection_states.len()
    }
}

/// Serve one client until it detaches or disconnects
async fn handle_connection(
    source: SourceId,
    stream: UnixStream,
    shared: Shared,
    registered: oneshot::Receiver<()>,
) {
    let _ = registered.await;
    debug!("Connection handler started");

    let (mut reader, writer) = stream.into_split();
    let (tx, rx) = mpsc::channel::<CoordinatorFrame>(OUTBOUND_CAPACITY);
    let writer_task = tokio::spawn(write_loop(writer, rx).in_current_span());
    let mut forwarder: Option<JoinHandle<()>> = None;

    loop {
        let frame = match read_frame::<_, SurfaceFrame>(&mut reader).await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                info!("Client disconnected (EOF)");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Failed to read frame, closing connection");
                break;
            }
        };

        match frame {
            SurfaceFrame::Attach { surface } => {
                if let Err(e) = shared.coordinator.attach(source, surface).await {
                    warn!(surface = %surface, error = %e, "Attach failed");
                    continue;
                }
                if let Some(previous) = forwarder.take() {
                    previous.abort();
                }
                forwarder = Some(tokio::spawn(
                    forward_signals(
                        surface,
                        shared.factory.subscribe(surface),
                        Arc::clone(&shared.coordinator),
                        tx.clone(),
                    )
                    .in_current_span(),
                ));
                if tx.send(CoordinatorFrame::Attached { surface }).await.is_err() {
                    break;
                }
            }
            SurfaceFrame::Send { channel, payload } => {
                shared.coordinator.handle_send(source, &channel, payload);
            }
            SurfaceFrame::Invoke {
                request_id,
                channel,
                payload,
            } => {
                let coordinator = Arc::clone(&shared.coordinator);
                let tx = tx.clone();
                tokio::spawn(
                    async move {
                        let value = coordinator
                            .handle_invoke(source, &channel, payload)
                            .await
                            .unwrap_or(Value::Null);
                        // Client may already be gone
                        let _ = tx.send(CoordinatorFrame::Reply { request_id, value }).await;
                    }
                    .in_current_span(),
                );
            }
            SurfaceFrame::Pointer { x, y } => shared.pointer.move_to(x, y),
            SurfaceFrame::Blur => shared.coordinator.handle_blur(&source),
            SurfaceFrame::Detach => {
                info!("Client detached");
                break;
            }
        }
    }

    if let Some(forwarder) = forwarder {
        forwarder.abort();
    }
    shared.coordinator.detach(&source);
    drop(tx);
    // In-flight invokes hold senders; the writer drains until they finish.
    if let Err(e) = writer_task.await {
        debug!(error = %e, "Writer task ended abnormally");
    }

    shared.connection_states.remove(&source);
    info!(
        active_connections = shared.connection_states.len(),
        "Connection handler finished"
    );
}

async fn write_loop(mut writer: OwnedWriteHalf, mut rx: mpsc::Receiver<CoordinatorFrame>) {
    while let Some(frame) = rx.recv().await {
        if let Err(e) = write_frame(&mut writer, &frame).await {
            warn!(error = %e, "Write failed, dropping outbound frames");
            break;
        }
    }
}

/// Relay a surface's presentation signals to its client
async fn forward_signals(
    surface: SurfaceKind,
    mut signals: broadcast::Receiver<SurfaceSignal>,
    coordinator: Arc<OverlayCoordinator>,
    tx: mpsc::Sender<CoordinatorFrame>,
) {
    loop {
        match signals.recv().await {
            Ok(signal) => {
                if !coordinator
                    .allow_list()
                    .allows(ChannelDirection::Listen, signal.channel())
                {
                    continue;
                }
                if tx.send(CoordinatorFrame::signal(signal)).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(surface = %surface, skipped, "Signal subscriber lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use floatball_core::TransitionTiming;
    use tokio::net::unix::OwnedReadHalf;

    fn fast_config(socket_path: PathBuf) -> OverlayConfig {
        let mut config = OverlayConfig::default();
        config.socket_path = socket_path;
        config.timing = TransitionTiming {
            settle_delay: Duration::from_millis(1),
            fade_in: Duration::from_millis(5),
            fade_out: Duration::from_millis(5),
        };
        config.primary.position = floatball_core::Position::new(1000, 500);
        config
    }

    async fn connect(path: &std::path::Path) -> UnixStream {
        for _ in 0..200 {
            if let Ok(stream) = UnixStream::connect(path).await {
                return stream;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("daemon socket never came up at {path:?}");
    }

    async fn next_reply(reader: &mut OwnedReadHalf) -> (u64, Value) {
        loop {
            match read_frame::<_, CoordinatorFrame>(reader).await.unwrap() {
                Some(CoordinatorFrame::Reply { request_id, value }) => return (request_id, value),
                Some(_) => {}
                None => panic!("connection closed before reply"),
            }
        }
    }

    #[tokio::test]
    async fn test_toggle_over_socket() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("overlay.sock");
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut server = DaemonServer::new(&fast_config(socket_path.clone()));
        let server_task = {
            let shutdown = Arc::clone(&shutdown);
            tokio::spawn(async move { server.run(shutdown).await })
        };

        let (mut reader, mut writer) = connect(&socket_path).await.into_split();
        write_frame(
            &mut writer,
            &SurfaceFrame::Attach {
                surface: SurfaceKind::Primary,
            },
        )
        .await
        .unwrap();
        assert_eq!(
            read_frame::<_, CoordinatorFrame>(&mut reader).await.unwrap(),
            Some(CoordinatorFrame::Attached {
                surface: SurfaceKind::Primary
            })
        );

        write_frame(
            &mut writer,
            &SurfaceFrame::Invoke {
                request_id: 1,
                channel: "app:input:toggle".to_string(),
                payload: Value::Null,
            },
        )
        .await
        .unwrap();
        assert_eq!(next_reply(&mut reader).await, (1, Value::Bool(true)));

        write_frame(
            &mut writer,
            &SurfaceFrame::Invoke {
                request_id: 2,
                channel: "app:window:get-position".to_string(),
                payload: Value::Null,
            },
        )
        .await
        .unwrap();
        assert_eq!(
            next_reply(&mut reader).await,
            (2, serde_json::json!([1000, 500]))
        );

        write_frame(
            &mut writer,
            &SurfaceFrame::Invoke {
                request_id: 3,
                channel: "app:shell:exec".to_string(),
                payload: Value::Null,
            },
        )
        .await
        .unwrap();
        assert_eq!(next_reply(&mut reader).await, (3, Value::Null));

        write_frame(&mut writer, &SurfaceFrame::Detach).await.unwrap();
        shutdown.store(true, Ordering::SeqCst);
        server_task.await.unwrap().unwrap();
        assert!(!socket_path.exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_short_lived_connections_release_their_slots() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("overlay.sock");
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut config = fast_config(socket_path.clone());
        config.max_connections = 2;
        let mut server = DaemonServer::new(&config);
        let states = Arc::clone(&server.shared.connection_states);
        let server_task = {
            let shutdown = Arc::clone(&shutdown);
            tokio::spawn(async move { server.run(shutdown).await })
        };

        // Connect and hang up immediately, well past the cap
        for _ in 0..10 {
            drop(connect(&socket_path).await);
        }

        // Leaked states would hold the cap forever and lock this client out
        let mut client = None;
        for _ in 0..100 {
            let (mut reader, mut writer) = connect(&socket_path).await.into_split();
            let attach = SurfaceFrame::Attach {
                surface: SurfaceKind::Primary,
            };
            if write_frame(&mut writer, &attach).await.is_ok() {
                if let Ok(Some(CoordinatorFrame::Attached { .. })) =
                    read_frame::<_, CoordinatorFrame>(&mut reader).await
                {
                    client = Some((reader, writer));
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(client.is_some(), "client never admitted");

        // Only the attached client remains once the hang-ups are handled
        let mut settled = false;
        for _ in 0..200 {
            if states.len() == 1 {
                settled = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(settled, "{} connection state(s) registered", states.len());

        shutdown.store(true, Ordering::SeqCst);
        server_task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_quit_channel_stops_server() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("overlay.sock");

        let mut server = DaemonServer::new(&fast_config(socket_path.clone()));
        let server_task =
            tokio::spawn(async move { server.run(Arc::new(AtomicBool::new(false))).await });

        let (_reader, mut writer) = connect(&socket_path).await.into_split();
        write_frame(
            &mut writer,
            &SurfaceFrame::Send {
                channel: "app:quit".to_string(),
                payload: Value::Null,
            },
        )
        .await
        .unwrap();

        tokio::time::timeout(Duration::from_secs(5), server_task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
