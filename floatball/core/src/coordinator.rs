//! Overlay Coordinator - Command Dispatch
//!
//! The single entry point presentation clients talk to. Every channel message
//! is checked against the [`ChannelAllowList`] and then routed to the drag
//! tracker, the toggle coordinator, or the position facade.
//!
//! # Message Flow
//!
//! ```text
//! client ──(source, channel, payload)──► OverlayCoordinator
//!                                            │ allow-list
//!        ┌───────────────┬──────────────────┼─────────────────┐
//!        ▼               ▼                  ▼                 ▼
//!   DragTracker   ToggleCoordinator   PositionFacade    log forwarding
//! ```
//!
//! Nothing here returns an error to the client. Unlisted channels and
//! malformed payloads are dropped; the client sees no reply (invoke) or
//! nothing at all (send).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Notify;

use crate::channels::{Channel, ChannelAllowList, ChannelDirection};
use crate::config::OverlayConfig;
use crate::drag::DragTracker;
use crate::error::CoordinatorError;
use crate::fade::FadeController;
use crate::messages::{LogLevel, LogPayload};
use crate::pointer::PointerSource;
use crate::position::PositionFacade;
use crate::surface::SurfaceKind;
use crate::surface_registry::{SourceId, SurfaceFactory, SurfaceRegistry};
use crate::toggle::{ToggleCoordinator, ToggleState};

/// Payload of the set-position channel
#[derive(Debug, Deserialize)]
struct MoveRequest {
    x: f64,
    y: f64,
}

/// Coordinates the Primary and Companion surfaces
pub struct OverlayCoordinator {
    registry: SurfaceRegistry,
    fades: FadeController,
    drags: DragTracker,
    toggles: ToggleCoordinator,
    positions: PositionFacade,
    allow_list: ChannelAllowList,
    quit: Notify,
    quit_flag: AtomicBool,
}

impl OverlayCoordinator {
    /// Build a coordinator from configuration
    #[must_use]
    pub fn new(
        config: &OverlayConfig,
        factory: Arc<dyn SurfaceFactory>,
        pointer: Arc<dyn PointerSource>,
    ) -> Self {
        let registry =
            SurfaceRegistry::with_specs(factory, config.primary.clone(), config.companion.clone());
        let fades = FadeController::new(config.timing);

        Self {
            drags: DragTracker::new(pointer, config.drag_sample_interval),
            toggles: ToggleCoordinator::new(registry.clone(), fades),
            positions: PositionFacade::new(registry.clone()),
            allow_list: ChannelAllowList::new(),
            quit: Notify::new(),
            quit_flag: AtomicBool::new(false),
            registry,
            fades,
        }
    }

    /// Surface registry
    #[must_use]
    pub fn registry(&self) -> &SurfaceRegistry {
        &self.registry
    }

    /// Channel allow-list
    #[must_use]
    pub fn allow_list(&self) -> &ChannelAllowList {
        &self.allow_list
    }

    /// Drag tracker
    #[must_use]
    pub fn drags(&self) -> &DragTracker {
        &self.drags
    }

    /// Current toggle state
    #[must_use]
    pub fn toggle_state(&self) -> ToggleState {
        self.toggles.state()
    }

    /// Create the Primary surface and reveal it
    ///
    /// # Errors
    ///
    /// Returns an error if the Primary surface cannot be created.
    pub async fn start(&self) -> Result<(), CoordinatorError> {
        let primary = self.registry.ensure(SurfaceKind::Primary).await?;
        tracing::info!(position = %primary.position(), "Revealing primary surface");
        primary.raise();
        self.fades.fade_in(primary.as_ref()).await;
        Ok(())
    }

    /// Bind a client to the surface it renders
    ///
    /// Attaching to Companion creates it (hidden) if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if Companion has to be created and creation fails.
    pub async fn attach(&self, source: SourceId, kind: SurfaceKind) -> Result<(), CoordinatorError> {
        if kind == SurfaceKind::Companion {
            self.registry.ensure(SurfaceKind::Companion).await?;
        }
        self.registry.bind(source, kind);
        tracing::info!(source = %source, surface = %kind, "Client attached");
        Ok(())
    }

    /// Forget a client: stop its drag and drop its binding
    pub fn detach(&self, source: &SourceId) {
        self.drags.stop_drag(source);
        if let Some(kind) = self.registry.unbind(source) {
            tracing::info!(source = %source, surface = %kind, "Client detached");
        }
    }

    /// A client's surface lost focus
    ///
    /// Primary is raised again so it stays above other always-on-top windows.
    /// Companion losing focus changes nothing.
    pub fn handle_blur(&self, source: &SourceId) {
        if self.registry.kind_of(source) != Some(SurfaceKind::Primary) {
            return;
        }
        if let Some(primary) = self.registry.live(SurfaceKind::Primary) {
            tracing::trace!(source = %source, "Primary blurred, raising");
            primary.raise();
        }
    }

    /// Handle a fire-and-forget message from `source`
    pub fn handle_send(&self, source: SourceId, channel: &str, payload: Value) {
        let Some(channel) = self.allow_list.permit(ChannelDirection::Send, channel) else {
            return;
        };

        match channel {
            Channel::SetPosition => match serde_json::from_value::<MoveRequest>(payload) {
                Ok(MoveRequest { x, y }) => {
                    self.positions.move_to(&source, x, y);
                }
                Err(e) => {
                    tracing::warn!(source = %source, channel = %channel, error = %e, "Malformed payload dropped");
                }
            },
            Channel::DragStart => match self.registry.resolve(&source) {
                Some(surface) => self.drags.start_drag(source, surface),
                None => {
                    tracing::debug!(source = %source, "Drag start without a live surface");
                }
            },
            Channel::DragStop => self.drags.stop_drag(&source),
            Channel::Quit => self.request_quit(),
            Channel::Log => match serde_json::from_value::<LogPayload>(payload) {
                Ok(log) => self.forward_log(&source, &log),
                Err(e) => {
                    tracing::warn!(source = %source, channel = %channel, error = %e, "Malformed payload dropped");
                }
            },
            Channel::RestoreMain | Channel::MinimizeToMini | Channel::ToggleDevtools => {
                tracing::debug!(source = %source, channel = %channel, "No handler for channel, ignoring");
            }
            other => {
                tracing::debug!(channel = %other, "Not a send channel");
            }
        }
    }

    /// Handle a request from `source`
    ///
    /// Returns `None` when the request is dropped (unlisted channel).
    pub async fn handle_invoke(
        &self,
        source: SourceId,
        channel: &str,
        _payload: Value,
    ) -> Option<Value> {
        let channel = self.allow_list.permit(ChannelDirection::Invoke, channel)?;

        match channel {
            Channel::GetPosition => {
                let [x, y] = self.positions.position_of(&source).to_array();
                Some(Value::from(vec![x, y]))
            }
            Channel::InputToggle => {
                let visible = match self.toggles.request_toggle().await {
                    Ok(outcome) => outcome.companion_visible(),
                    Err(e) => {
                        tracing::warn!(error = %e, "Toggle failed");
                        false
                    }
                };
                Some(Value::Bool(visible))
            }
            Channel::InputFocus => Some(Value::Bool(self.toggles.request_focus())),
            other => {
                tracing::debug!(channel = %other, "Not an invoke channel");
                None
            }
        }
    }

    fn forward_log(&self, source: &SourceId, log: &LogPayload) {
        let surface = self
            .registry
            .kind_of(source)
            .map_or("unknown", SurfaceKind::name);
        let message = log.message();

        match log.level {
            LogLevel::Error => tracing::error!(target: "surface", surface, "{message}"),
            LogLevel::Warn => tracing::warn!(target: "surface", surface, "{message}"),
            LogLevel::Info | LogLevel::Log => {
                tracing::info!(target: "surface", surface, "{message}");
            }
        }
    }

    fn request_quit(&self) {
        tracing::info!("Quit requested by client");
        self.quit_flag.store(true, Ordering::SeqCst);
        self.quit.notify_waiters();
        // Also leave a permit for a waiter that has not started waiting yet
        self.quit.notify_one();
    }

    /// Whether a client has asked the host process to quit
    #[must_use]
    pub fn is_quit_requested(&self) -> bool {
        self.quit_flag.load(Ordering::SeqCst)
    }

    /// Wait until a client asks the host process to quit
    pub async fn quit_requested(&self) {
        if self.is_quit_requested() {
            return;
        }
        self.quit.notified().await;
    }

    /// Stop all drags and tear down both surfaces
    pub fn shutdown(&self) {
        self.drags.stop_all();
        self.registry.destroy(SurfaceKind::Primary);
        tracing::info!("Overlay coordinator shut down");
    }
}

impl std::fmt::Debug for OverlayCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayCoordinator")
            .field("registry", &self.registry)
            .field("drags", &self.drags)
            .field("toggle_state", &self.toggles.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Position;
    use crate::pointer::SharedPointer;
    use crate::surface::{
        HeadlessSurface, HeadlessSurfaceFactory, SurfaceError, SurfaceHandle, SurfaceSpec,
    };
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::time::Duration;
    use tracing::field::{Field, Visit};
    use tracing::{Event, Level, Subscriber};
    use tracing_subscriber::layer::{Context, Layer};
    use tracing_subscriber::prelude::*;

    /// Factory that keeps the concrete surfaces it hands out
    #[derive(Default)]
    struct KeepingFactory {
        created: Mutex<Vec<Arc<HeadlessSurface>>>,
    }

    impl KeepingFactory {
        fn last(&self, kind: SurfaceKind) -> Arc<HeadlessSurface> {
            self.created
                .lock()
                .iter()
                .rev()
                .find(|s| s.kind() == kind)
                .cloned()
                .unwrap()
        }
    }

    #[async_trait]
    impl SurfaceFactory for KeepingFactory {
        async fn create(
            &self,
            kind: SurfaceKind,
            spec: &SurfaceSpec,
        ) -> Result<Arc<dyn SurfaceHandle>, SurfaceError> {
            let surface = Arc::new(HeadlessSurface::new(kind, spec.clone()));
            self.created.lock().push(Arc::clone(&surface));
            Ok(surface)
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    struct CapturedLog {
        target: String,
        level: Level,
        surface: Option<String>,
        message: String,
    }

    #[derive(Default)]
    struct LogFields {
        surface: Option<String>,
        message: String,
    }

    impl Visit for LogFields {
        fn record_str(&mut self, field: &Field, value: &str) {
            if field.name() == "surface" {
                self.surface = Some(value.to_string());
            }
        }

        fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
            if field.name() == "message" {
                self.message = format!("{value:?}");
            }
        }
    }

    /// Layer recording every event it sees
    #[derive(Clone, Default)]
    struct CaptureLayer {
        events: Arc<Mutex<Vec<CapturedLog>>>,
    }

    impl CaptureLayer {
        fn surface_logs(&self) -> Vec<CapturedLog> {
            self.events
                .lock()
                .iter()
                .filter(|e| e.target == "surface")
                .cloned()
                .collect()
        }
    }

    impl<S: Subscriber> Layer<S> for CaptureLayer {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            let mut fields = LogFields::default();
            event.record(&mut fields);
            self.events.lock().push(CapturedLog {
                target: event.metadata().target().to_string(),
                level: *event.metadata().level(),
                surface: fields.surface,
                message: fields.message,
            });
        }
    }

    fn coordinator() -> (OverlayCoordinator, SharedPointer) {
        let pointer = SharedPointer::new();
        let coordinator = OverlayCoordinator::new(
            &OverlayConfig::default(),
            Arc::new(HeadlessSurfaceFactory::new()),
            Arc::new(pointer.clone()),
        );
        (coordinator, pointer)
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_reveals_primary() {
        let (coordinator, _) = coordinator();
        coordinator.start().await.unwrap();

        let primary = coordinator.registry().live(SurfaceKind::Primary).unwrap();
        assert!(primary.is_visible());
        assert!(coordinator.registry().get(SurfaceKind::Companion).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_and_set_position() {
        let (coordinator, _) = coordinator();
        coordinator.start().await.unwrap();
        let ball = SourceId::new();
        coordinator.attach(ball, SurfaceKind::Primary).await.unwrap();

        coordinator.handle_send(ball, "app:window:set-position", json!({"x": 10.6, "y": 20.2}));

        assert_eq!(
            coordinator
                .handle_invoke(ball, "app:window:get-position", Value::Null)
                .await,
            Some(json!([11, 20]))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbound_source_reads_origin() {
        let (coordinator, _) = coordinator();
        coordinator.start().await.unwrap();

        assert_eq!(
            coordinator
                .handle_invoke(SourceId::new(), "app:window:get-position", Value::Null)
                .await,
            Some(json!([0, 0]))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_set_position_dropped() {
        let (coordinator, _) = coordinator();
        coordinator.start().await.unwrap();
        let ball = SourceId::new();
        coordinator.attach(ball, SurfaceKind::Primary).await.unwrap();

        coordinator.handle_send(ball, "app:window:set-position", json!({"x": "left"}));
        coordinator.handle_send(ball, "app:window:set-position", Value::Null);

        let primary = coordinator.registry().live(SurfaceKind::Primary).unwrap();
        assert_eq!(primary.position(), Position::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unlisted_channels_dropped() {
        let (coordinator, _) = coordinator();
        coordinator.start().await.unwrap();
        let ball = SourceId::new();
        coordinator.attach(ball, SurfaceKind::Primary).await.unwrap();

        assert_eq!(
            coordinator
                .handle_invoke(ball, "app:fs:read", json!("/etc/passwd"))
                .await,
            None
        );
        // Send channel used as invoke
        assert_eq!(
            coordinator
                .handle_invoke(ball, "app:drag:start", Value::Null)
                .await,
            None
        );
        coordinator.handle_send(ball, "app:input:toggle", Value::Null);
        assert!(coordinator.registry().get(SurfaceKind::Companion).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drag_channels() {
        let (coordinator, pointer) = coordinator();
        coordinator.start().await.unwrap();
        let ball = SourceId::new();
        coordinator.attach(ball, SurfaceKind::Primary).await.unwrap();

        coordinator.handle_send(ball, "app:drag:start", Value::Null);
        assert!(coordinator.drags().is_dragging(&ball));

        pointer.move_to(30.0, 40.0);
        tokio::time::sleep(Duration::from_millis(20)).await;
        coordinator.handle_send(ball, "app:drag:stop", Value::Null);

        let primary = coordinator.registry().live(SurfaceKind::Primary).unwrap();
        assert_eq!(primary.position(), Position::new(30, 40));
        assert!(!coordinator.drags().is_dragging(&ball));
    }

    #[tokio::test(start_paused = true)]
    async fn test_detach_stops_drag() {
        let (coordinator, _) = coordinator();
        coordinator.start().await.unwrap();
        let ball = SourceId::new();
        coordinator.attach(ball, SurfaceKind::Primary).await.unwrap();
        coordinator.handle_send(ball, "app:drag:start", Value::Null);

        coordinator.detach(&ball);

        assert!(!coordinator.drags().is_dragging(&ball));
        assert_eq!(coordinator.registry().kind_of(&ball), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attach_companion_creates_it_hidden() {
        let (coordinator, _) = coordinator();
        let panel = SourceId::new();

        coordinator.attach(panel, SurfaceKind::Companion).await.unwrap();

        let companion = coordinator.registry().live(SurfaceKind::Companion).unwrap();
        assert!(!companion.is_visible());
    }

    #[tokio::test(start_paused = true)]
    async fn test_focus_channel() {
        let (coordinator, _) = coordinator();
        coordinator.start().await.unwrap();
        let ball = SourceId::new();

        assert_eq!(
            coordinator
                .handle_invoke(ball, "app:input:focus", Value::Null)
                .await,
            Some(Value::Bool(false))
        );

        coordinator
            .attach(SourceId::new(), SurfaceKind::Companion)
            .await
            .unwrap();
        assert_eq!(
            coordinator
                .handle_invoke(ball, "app:input:focus", Value::Null)
                .await,
            Some(Value::Bool(true))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_quit_channel() {
        let (coordinator, _) = coordinator();
        assert!(!coordinator.is_quit_requested());

        coordinator.handle_send(SourceId::new(), "app:quit", Value::Null);

        assert!(coordinator.is_quit_requested());
        tokio::time::timeout(Duration::from_millis(10), coordinator.quit_requested())
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_ignored_and_log_channels_are_harmless() {
        let (coordinator, _) = coordinator();
        coordinator.start().await.unwrap();
        let ball = SourceId::new();
        coordinator.attach(ball, SurfaceKind::Primary).await.unwrap();

        coordinator.handle_send(ball, "app:window:restore-main", Value::Null);
        coordinator.handle_send(ball, "app:toggle-devtools", Value::Null);
        coordinator.handle_send(ball, "app:log", json!({"level": "warn", "args": ["hi", 1]}));
        coordinator.handle_send(ball, "app:log", json!("not an object"));

        assert!(!coordinator.is_quit_requested());
        assert!(coordinator.registry().live(SurfaceKind::Primary).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_log_channel_forwards_with_level_and_surface() {
        let (coordinator, _) = coordinator();
        let ball = SourceId::new();
        coordinator.attach(ball, SurfaceKind::Primary).await.unwrap();
        let stranger = SourceId::new();

        let capture = CaptureLayer::default();
        let subscriber = tracing_subscriber::registry().with(capture.clone());
        tracing::subscriber::with_default(subscriber, || {
            coordinator.handle_send(ball, "app:log", json!({"level": "error", "args": ["boom", 1]}));
            coordinator.handle_send(ball, "app:log", json!({"level": "warn", "args": ["careful"]}));
            coordinator.handle_send(ball, "app:log", json!({"level": "info", "args": ["fyi"]}));
            coordinator.handle_send(stranger, "app:log", json!({"level": "verbose", "args": ["hi"]}));
        });

        let logs = capture.surface_logs();
        let summary: Vec<_> = logs
            .iter()
            .map(|l| (l.level, l.surface.as_deref(), l.message.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (Level::ERROR, Some("primary"), "boom 1"),
                (Level::WARN, Some("primary"), "careful"),
                (Level::INFO, Some("primary"), "fyi"),
                (Level::INFO, Some("unknown"), "hi"),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_raises_primary() {
        let factory = Arc::new(KeepingFactory::default());
        let coordinator = OverlayCoordinator::new(
            &OverlayConfig::default(),
            factory.clone(),
            Arc::new(SharedPointer::new()),
        );

        coordinator.start().await.unwrap();

        assert_eq!(factory.last(SurfaceKind::Primary).raise_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blur_raises_only_primary() {
        let factory = Arc::new(KeepingFactory::default());
        let coordinator = OverlayCoordinator::new(
            &OverlayConfig::default(),
            factory.clone(),
            Arc::new(SharedPointer::new()),
        );
        coordinator.start().await.unwrap();
        let ball = SourceId::new();
        let panel = SourceId::new();
        coordinator.attach(ball, SurfaceKind::Primary).await.unwrap();
        coordinator.attach(panel, SurfaceKind::Companion).await.unwrap();

        coordinator.handle_blur(&ball);
        coordinator.handle_blur(&panel);
        coordinator.handle_blur(&SourceId::new());

        assert_eq!(factory.last(SurfaceKind::Primary).raise_count(), 2);
        assert_eq!(factory.last(SurfaceKind::Companion).raise_count(), 0);

        coordinator.shutdown();
        coordinator.handle_blur(&ball);
        assert_eq!(factory.last(SurfaceKind::Primary).raise_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_destroys_both() {
        let (coordinator, _) = coordinator();
        coordinator.start().await.unwrap();
        coordinator
            .attach(SourceId::new(), SurfaceKind::Companion)
            .await
            .unwrap();
        let primary = coordinator.registry().live(SurfaceKind::Primary).unwrap();
        let companion = coordinator.registry().live(SurfaceKind::Companion).unwrap();

        coordinator.shutdown();

        assert!(primary.is_destroyed());
        assert!(companion.is_destroyed());
    }
}
