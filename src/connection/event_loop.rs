//! Reconnecting event loop.
//!
//! One tokio task owns the transport session, the matcher registry and the
//! reconnect timer. Everything that touches them arrives as a
//! [`LoopCommand`] and is handled in order, so dispatch passes never
//! interleave and a matcher is always registered before the frame it is
//! paired with is written.
//!
//! # Cycle
//!
//! ```text
//!   ┌──► open (first attempt immediately) ──ok──► serve ──closed──┐
//!   │                │                                            │
//!   │              error                                          │
//!   │                ▼                                            │
//!   └──── sleep(reconnect_delay) ◄────────────────────────────────┘
//! ```
//!
//! Commands are handled in every phase. While no session is open, sends
//! fail with [`Error::NotConnected`] and registrations are kept for later.
//! `Shutdown`, or every handle being dropped, ends the cycle from any phase.

// ============================================================================
// Imports
// ============================================================================

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::frame::{Direction, Frame};
use crate::identifiers::ListenerId;
use crate::matcher::MatcherRegistry;
use crate::matcher::listener::Listener;
use crate::transport::{Session, Transport, WireFrame};

use super::options::ConnectionOptions;
use super::readiness::Readiness;

// ============================================================================
// Types
// ============================================================================

/// Observer callback type.
///
/// Called for every frame sent or received, on the event loop task.
pub type FrameObserver = Box<dyn Fn(Direction, &Frame) + Send + Sync>;

/// Installed observer; cloned out of the slot before each call.
pub(crate) type ObserverFn = Arc<dyn Fn(Direction, &Frame) + Send + Sync>;

/// Observer slot shared between handles and the event loop.
pub(crate) type SharedObserver = Arc<Mutex<Option<ObserverFn>>>;

// ============================================================================
// LoopCommand
// ============================================================================

/// Who learns whether a send worked.
pub(crate) enum SendReply {
    /// Fire-and-forget send; only the write result is reported.
    Ack(oneshot::Sender<Result<()>>),
    /// Request; the listener is registered before the write.
    Response(Box<dyn Listener>),
}

impl SendReply {
    /// Reports a send that never reached the session.
    fn fail(self, error: Error) {
        match self {
            Self::Ack(ack) => {
                let _ = ack.send(Err(error));
            }
            Self::Response(listener) => listener.fail(error),
        }
    }
}

/// Internal commands for the event loop.
pub(crate) enum LoopCommand {
    /// Write a frame to the current session.
    Send { frame: Frame, reply: SendReply },
    /// Add a matcher without sending anything.
    Register(Box<dyn Listener>),
    /// Remove a matcher.
    Cancel(ListenerId),
    /// Stop the event loop.
    Shutdown,
}

/// Whether the event loop keeps running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Shutdown,
}

// ============================================================================
// EventLoop
// ============================================================================

/// State owned by the event loop task.
pub(crate) struct EventLoop {
    transport: Arc<dyn Transport>,
    endpoint: Url,
    options: ConnectionOptions,
    commands: mpsc::UnboundedReceiver<LoopCommand>,
    readiness: watch::Sender<Readiness>,
    dispatcher: Dispatcher,
}

impl EventLoop {
    /// Creates the event loop; nothing happens until [`run`](Self::run).
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        endpoint: Url,
        options: ConnectionOptions,
        commands: mpsc::UnboundedReceiver<LoopCommand>,
        readiness: watch::Sender<Readiness>,
        pending: Arc<AtomicUsize>,
        observer: SharedObserver,
    ) -> Self {
        let max_pending = options.max_pending;
        Self {
            transport,
            endpoint,
            options,
            commands,
            readiness,
            dispatcher: Dispatcher {
                registry: MatcherRegistry::new(),
                pending,
                max_pending,
                observer,
            },
        }
    }

    /// Runs the connect / serve / reconnect cycle until shutdown.
    pub(crate) async fn run(self) {
        let Self {
            transport,
            endpoint,
            options,
            mut commands,
            readiness,
            mut dispatcher,
        } = self;

        info!(%endpoint, "Event loop started");

        'cycle: loop {
            let generation = readiness.borrow().generation;
            readiness.send_modify(Readiness::attempting);
            debug!(%generation, %endpoint, "Opening session");

            let opened = {
                let open = open_session(transport.as_ref(), &endpoint, options.connect_timeout);
                tokio::pin!(open);

                loop {
                    tokio::select! {
                        result = &mut open => break result,
                        command = commands.recv() => {
                            if dispatcher.handle_offline(command) == Flow::Shutdown {
                                break 'cycle;
                            }
                        }
                    }
                }
            };

            match opened {
                Ok(mut session) => {
                    info!(%generation, %endpoint, "Session open");
                    readiness.send_modify(Readiness::opened);

                    if dispatcher.serve(session.as_mut(), &mut commands).await == Flow::Shutdown {
                        if let Err(e) = session.close().await {
                            debug!(error = %e, "Session close failed");
                        }
                        break 'cycle;
                    }

                    readiness.send_modify(Readiness::closed);
                }
                Err(e) => {
                    warn!(%generation, %endpoint, error = %e, "Session failed to open");
                    readiness.send_modify(|r| r.failed(&e));
                }
            }

            debug!(
                delay_ms = millis(options.reconnect_delay),
                pending = dispatcher.registry.len(),
                "Reconnecting after delay"
            );

            let delay = sleep(options.reconnect_delay);
            tokio::pin!(delay);

            loop {
                tokio::select! {
                    () = &mut delay => break,
                    command = commands.recv() => {
                        if dispatcher.handle_offline(command) == Flow::Shutdown {
                            break 'cycle;
                        }
                    }
                }
            }
        }

        readiness.send_modify(Readiness::shut_down);
        dispatcher.fail_pending();

        debug!(%endpoint, "Event loop terminated");
    }
}

/// Opens a session, bounded by `connect_timeout`.
async fn open_session(
    transport: &dyn Transport,
    endpoint: &Url,
    connect_timeout: Option<Duration>,
) -> Result<Box<dyn Session>> {
    match connect_timeout {
        Some(limit) => timeout(limit, transport.open(endpoint))
            .await
            .map_err(|_| Error::connection_timeout(millis(limit)))?,
        None => transport.open(endpoint).await,
    }
}

/// Converts a duration to whole milliseconds, saturating.
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Registry plus the hooks around it.
struct Dispatcher {
    /// Pending matchers.
    registry: MatcherRegistry,
    /// Mirror of `registry.len()` readable by handles.
    pending: Arc<AtomicUsize>,
    /// Optional cap on pending matchers.
    max_pending: Option<usize>,
    /// Optional frame observer.
    observer: SharedObserver,
}

impl Dispatcher {
    /// Serves an open session until it closes or shutdown is requested.
    async fn serve(
        &mut self,
        session: &mut dyn Session,
        commands: &mut mpsc::UnboundedReceiver<LoopCommand>,
    ) -> Flow {
        loop {
            tokio::select! {
                inbound = session.recv() => {
                    match inbound {
                        Some(Ok(wire)) => self.handle_incoming_frame(wire),
                        Some(Err(e)) => {
                            warn!(error = %e, "Session failed");
                            return Flow::Continue;
                        }
                        None => {
                            debug!("Session closed by remote");
                            return Flow::Continue;
                        }
                    }
                }

                command = commands.recv() => {
                    match command {
                        Some(LoopCommand::Send { frame, reply }) => {
                            self.handle_send_command(session, frame, reply).await;
                        }
                        Some(LoopCommand::Register(listener)) => {
                            self.register(listener);
                        }
                        Some(LoopCommand::Cancel(id)) => self.cancel(id),
                        Some(LoopCommand::Shutdown) => {
                            debug!("Shutdown command received");
                            return Flow::Shutdown;
                        }
                        None => {
                            debug!("Command channel closed");
                            return Flow::Shutdown;
                        }
                    }
                }
            }
        }
    }

    /// Handles a command while no session is open.
    fn handle_offline(&mut self, command: Option<LoopCommand>) -> Flow {
        match command {
            Some(LoopCommand::Send { frame, reply }) => {
                debug!(%frame, "Send rejected while disconnected");
                reply.fail(Error::NotConnected);
            }
            Some(LoopCommand::Register(listener)) => {
                self.register(listener);
            }
            Some(LoopCommand::Cancel(id)) => self.cancel(id),
            Some(LoopCommand::Shutdown) => {
                debug!("Shutdown command received");
                return Flow::Shutdown;
            }
            None => {
                debug!("Command channel closed");
                return Flow::Shutdown;
            }
        }
        Flow::Continue
    }

    /// Decodes an inbound frame and runs one dispatch pass.
    fn handle_incoming_frame(&mut self, wire: WireFrame) {
        let frame = match Frame::decode(wire) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Dropping inbound frame");
                return;
            }
        };

        debug!(%frame, "Receive");
        self.observe(Direction::Received, &frame);

        self.registry.dispatch(&frame);
        self.sync_pending();
    }

    /// Registers the paired listener, then writes the frame.
    async fn handle_send_command(
        &mut self,
        session: &mut dyn Session,
        frame: Frame,
        reply: SendReply,
    ) {
        let wire = match frame.encode() {
            Ok(wire) => wire,
            Err(e) => {
                reply.fail(e);
                return;
            }
        };

        let (ack, registered) = match reply {
            SendReply::Ack(ack) => (Some(ack), None),
            SendReply::Response(listener) => {
                let id = listener.id();
                if !self.register(listener) {
                    return;
                }
                (None, Some(id))
            }
        };

        debug!(%frame, "Send");
        self.observe(Direction::Sent, &frame);

        let result = session.send(wire).await;

        match (result, ack, registered) {
            (Ok(()), Some(ack), _) => {
                let _ = ack.send(Ok(()));
            }
            (Ok(()), None, _) => {}
            (Err(e), Some(ack), _) => {
                warn!(error = %e, "Failed to send frame");
                let _ = ack.send(Err(e));
            }
            (Err(e), None, Some(id)) => {
                warn!(error = %e, %id, "Failed to send request");
                self.registry.fail(id, e);
                self.sync_pending();
            }
            (Err(e), None, None) => warn!(error = %e, "Failed to send frame"),
        }
    }

    /// Appends a listener to the registry unless the cap is reached.
    ///
    /// Returns `false` if the listener was rejected with `TooManyPending`.
    fn register(&mut self, listener: Box<dyn Listener>) -> bool {
        if let Some(max) = self.max_pending {
            let pending = self.registry.len();
            if pending >= max {
                warn!(id = %listener.id(), pending, max, "Too many pending matchers");
                listener.fail(Error::too_many_pending(pending, max));
                return false;
            }
        }

        self.registry.insert(listener);
        self.sync_pending();
        true
    }

    /// Removes a listener if it is still pending.
    fn cancel(&mut self, id: ListenerId) {
        if self.registry.cancel(id) {
            debug!(%id, "Matcher cancelled");
            self.sync_pending();
        }
    }

    /// Fails all pending listeners with `ConnectionClosed`.
    fn fail_pending(&mut self) {
        let count = self.registry.fail_all(|| Error::ConnectionClosed);
        self.sync_pending();

        if count > 0 {
            debug!(count, "Failed pending matchers on shutdown");
        }
    }

    /// Publishes the registry size.
    fn sync_pending(&self) {
        self.pending.store(self.registry.len(), Ordering::Release);
    }

    /// Hands a frame to the observer, if any.
    ///
    /// The slot is unlocked before the call, so the observer may replace or
    /// clear itself.
    fn observe(&self, direction: Direction, frame: &Frame) {
        let observer = self.observer.lock().clone();
        if let Some(observer) = observer
            && catch_unwind(AssertUnwindSafe(|| observer(direction, frame))).is_err()
        {
            warn!(?direction, "Frame observer panicked");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::fmt;

    use tracing::field::{Field, Visit};
    use tracing::{Event, Level, Subscriber};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

    use crate::connection::Connection;
    use crate::transport::MemoryTransport;

    /// Records the level and message of every event.
    struct Capture(Arc<Mutex<Vec<(Level, String)>>>);

    struct MessageVisitor(String);

    impl Visit for MessageVisitor {
        fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
            if field.name() == "message" {
                self.0 = format!("{value:?}");
            }
        }
    }

    impl<S: Subscriber> Layer<S> for Capture {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            let mut visitor = MessageVisitor(String::new());
            event.record(&mut visitor);
            self.0.lock().push((*event.metadata().level(), visitor.0));
        }
    }

    #[test]
    fn test_millis_saturates() {
        assert_eq!(millis(Duration::from_millis(1500)), 1500);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_scheduling_logged_at_debug() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let subscriber = tracing_subscriber::registry().with(Capture(Arc::clone(&events)));
        let _guard = tracing::subscriber::set_default(subscriber);

        let (transport, mut relay) = MemoryTransport::pair();
        let connection = Connection::builder()
            .url("ws://relay.test")
            .transport(Arc::new(transport))
            .connect()
            .unwrap();

        relay.next_open().await.expect("first attempt").refuse("offline");
        let _retry = relay.next_open().await.expect("retry attempt");

        let captured = events.lock();
        let level = captured
            .iter()
            .find(|(_, message)| message == "Reconnecting after delay")
            .map(|(level, _)| *level);
        assert_eq!(level, Some(Level::DEBUG));

        drop(captured);
        connection.shutdown();
    }
}
