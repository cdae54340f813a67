//! Session management
//!
//! One session per host view: a display sink, the line editor feeding it and
//! a dispatch worker that routes submitted lines one at a time, in the order
//! they were submitted. The manager binds sessions to views and keeps their
//! sinks fitted to the views' sizes.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::line_editor::{KeyInput, LineEditor};
use super::router::CommandRouter;
use super::sink::{lock_sink, DisplaySink, HostView, SharedSink, SinkHandle, ViewId};

/// Title of the welcome banner
pub const BANNER_TITLE: &str = "Welcome to ideterm";

/// Delay before the fit that follows an expand/collapse transition
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(250);

/// Geometry used until the host view can be measured
const FALLBACK_GEOMETRY: (u16, u16) = (80, 24);

/// A terminal session bound to one host view
pub struct Session {
    id: u64,
    view: ViewId,
    sink: SharedSink,
    editor: LineEditor,
    alive: Arc<AtomicBool>,
    /// Submitted lines waiting for the dispatch worker
    queue: Option<UnboundedSender<String>>,
    /// Prompt redraw requests from write-backs
    redraw_rx: Receiver<()>,
    worker: Option<JoinHandle<()>>,
}

impl Session {
    fn spawn(
        id: u64,
        view: ViewId,
        sink: DisplaySink,
        router: Arc<CommandRouter>,
        runtime: &Handle,
    ) -> Self {
        let sink: SharedSink = Arc::new(Mutex::new(sink));
        let alive = Arc::new(AtomicBool::new(true));
        let (redraw_tx, redraw_rx) = mpsc::channel();
        let (queue, lines) = unbounded_channel();

        let out = SinkHandle::new(sink.clone(), alive.clone(), redraw_tx);
        let worker = runtime.spawn(dispatch_loop(router, lines, out));

        Self {
            id,
            view,
            sink,
            editor: LineEditor::new(),
            alive,
            queue: Some(queue),
            redraw_rx,
            worker: Some(worker),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn view(&self) -> ViewId {
        self.view
    }

    pub fn sink(&self) -> &SharedSink {
        &self.sink
    }

    pub fn editor(&self) -> &LineEditor {
        &self.editor
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Feed a key to the line editor; a submitted line is queued for routing
    pub fn handle_key(&mut self, key: KeyInput) {
        if !self.is_alive() {
            return;
        }
        let submitted = {
            let mut sink = lock_sink(&self.sink);
            self.editor.handle_key(key, &mut sink)
        };

        let Some(line) = submitted else {
            return;
        };
        debug!("Session {} submitted '{}'", self.id, line);
        let queued = self
            .queue
            .as_ref()
            .is_some_and(|queue| queue.send(line).is_ok());
        if !queued {
            warn!("Session {} dispatch worker is gone; line dropped", self.id);
        }
    }

    /// Redraw the prompt if write-backs asked for it.
    /// Returns true when something was redrawn.
    pub fn process_events(&mut self) -> bool {
        let mut requested = false;
        loop {
            match self.redraw_rx.try_recv() {
                Ok(()) => requested = true,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    // Worker gone; nothing more will arrive
                    break;
                }
            }
        }

        if requested && self.is_alive() {
            let mut sink = lock_sink(&self.sink);
            self.editor.redraw(&mut sink);
        }
        requested
    }

    /// Wipe the sink and redraw the prompt with the current input
    pub fn clear(&mut self) {
        if !self.is_alive() {
            return;
        }
        let mut sink = lock_sink(&self.sink);
        sink.clear();
        self.editor.redraw(&mut sink);
    }

    /// Scroll the view into scrollback (positive) or back towards live (negative)
    pub fn scroll(&mut self, lines: isize) {
        let mut sink = lock_sink(&self.sink);
        let screen = &mut sink.state_mut().screen;
        if lines >= 0 {
            screen.scroll_view_up(lines.unsigned_abs());
        } else {
            screen.scroll_view_down(lines.unsigned_abs());
        }
    }

    /// Stop routing, drop pending write-backs and release the sink
    pub fn dispose(&mut self) {
        if !self.alive.swap(false, Ordering::SeqCst) {
            return;
        }
        self.queue = None;
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
        lock_sink(&self.sink).release();
        info!("Session {} disposed", self.id);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Route queued lines one at a time, rendering each result before the next
async fn dispatch_loop(
    router: Arc<CommandRouter>,
    mut lines: UnboundedReceiver<String>,
    out: SinkHandle,
) {
    while let Some(line) = lines.recv().await {
        let result = router.route(&line, &out).await;
        if !out.is_alive() {
            break;
        }
        if !result.is_silent() {
            out.emit(|sink| result.render(sink));
        }
    }
}

struct Binding {
    session: Session,
    /// Last size seen by the resize observer
    observed: Option<(u16, u16)>,
    /// When the post-transition fit is due
    settle_at: Option<Instant>,
}

/// Fit the sink to the host, logging failures
fn fit(session: &Session, host: &dyn HostView) {
    match lock_sink(&session.sink).resize_to_fit(host) {
        Ok(true) => {
            let size = host.content_size().unwrap_or_default();
            debug!("Session {} fitted to {}x{}", session.id, size.0, size.1);
        }
        Ok(false) => {}
        Err(e) => warn!("Session {} fit failed: {}", session.id, e),
    }
}

/// Binds sessions to host views
pub struct SessionManager {
    bindings: HashMap<ViewId, Binding>,
    next_id: u64,
    router: Arc<CommandRouter>,
    runtime: Handle,
    settle_delay: Duration,
    scrollback: usize,
}

impl SessionManager {
    pub fn new(router: Arc<CommandRouter>, runtime: Handle) -> Self {
        Self {
            bindings: HashMap::new(),
            next_id: 1,
            router,
            runtime,
            settle_delay: DEFAULT_SETTLE_DELAY,
            scrollback: super::term::DEFAULT_SCROLLBACK,
        }
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_scrollback(mut self, lines: usize) -> Self {
        self.scrollback = lines;
        self
    }

    /// Start a session on `host`, or return the one already bound to it
    pub fn start(&mut self, host: &dyn HostView) -> &mut Session {
        let view = host.view_id();
        let binding = match self.bindings.entry(view) {
            Entry::Occupied(entry) => {
                debug!("View {} already has session {}", view, entry.get().session.id);
                entry.into_mut()
            }
            Entry::Vacant(entry) => {
                let id = self.next_id;
                self.next_id += 1;

                let (cols, rows) = FALLBACK_GEOMETRY;
                let mut sink = DisplaySink::new(cols, rows, self.scrollback);
                if let Err(e) = sink.resize_to_fit(host) {
                    warn!("Session {} initial fit failed: {}", id, e);
                }
                sink.write_banner(BANNER_TITLE, self.router.banner_subtitle());

                let session = Session::spawn(id, view, sink, self.router.clone(), &self.runtime);
                info!(
                    "Session {} started on view {} ({} mode)",
                    id,
                    view,
                    self.router.policy().name()
                );
                entry.insert(Binding {
                    session,
                    observed: host.content_size(),
                    settle_at: None,
                })
            }
        };
        &mut binding.session
    }

    /// Dispose the session bound to `view`. False if there was none.
    pub fn dispose(&mut self, view: ViewId) -> bool {
        match self.bindings.remove(&view) {
            Some(mut binding) => {
                binding.session.dispose();
                true
            }
            None => false,
        }
    }

    pub fn session(&self, view: ViewId) -> Option<&Session> {
        self.bindings.get(&view).map(|b| &b.session)
    }

    pub fn session_mut(&mut self, view: ViewId) -> Option<&mut Session> {
        self.bindings.get_mut(&view).map(|b| &mut b.session)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Deliver a key to the session on `view`. False if none is bound.
    pub fn dispatch_key(&mut self, view: ViewId, key: KeyInput) -> bool {
        match self.session_mut(view) {
            Some(session) => {
                session.handle_key(key);
                true
            }
            None => false,
        }
    }

    /// Resize observer: fit when the host size changed since the last
    /// observation, and run any settled fit that has come due.
    pub fn observe(&mut self, host: &dyn HostView, now: Instant) {
        let Some(binding) = self.bindings.get_mut(&host.view_id()) else {
            return;
        };

        let size = host.content_size();
        if size != binding.observed {
            binding.observed = size;
            fit(&binding.session, host);
        }

        if binding.settle_at.is_some_and(|due| now >= due) {
            binding.settle_at = None;
            debug!("Session {} settled fit", binding.session.id);
            fit(&binding.session, host);
        }
    }

    /// Window-resize fallback: fit unconditionally
    pub fn window_resized(&mut self, host: &dyn HostView) {
        if let Some(binding) = self.bindings.get_mut(&host.view_id()) {
            binding.observed = host.content_size();
            fit(&binding.session, host);
        }
    }

    /// Request a fit once an expand/collapse transition has settled
    pub fn schedule_settled_fit(&mut self, view: ViewId, now: Instant) {
        if let Some(binding) = self.bindings.get_mut(&view) {
            binding.settle_at = Some(now + self.settle_delay);
        }
    }

    pub fn settle_pending(&self, view: ViewId) -> bool {
        self.bindings
            .get(&view)
            .is_some_and(|b| b.settle_at.is_some())
    }

    /// Apply pending redraw requests of every session.
    /// Returns true if any session redrew.
    pub fn process_events(&mut self) -> bool {
        let mut redrawn = false;
        for binding in self.bindings.values_mut() {
            redrawn |= binding.session.process_events();
        }
        redrawn
    }

    /// Dispose every session
    pub fn shutdown(&mut self) {
        for (_, mut binding) in self.bindings.drain() {
            binding.session.dispose();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::router::{CommandExecutor, RouteError, RoutingPolicy};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    struct TestHost {
        id: ViewId,
        size: Option<(u16, u16)>,
    }

    impl HostView for TestHost {
        fn view_id(&self) -> ViewId {
            self.id
        }

        fn content_size(&self) -> Option<(u16, u16)> {
            self.size
        }
    }

    fn host(id: ViewId) -> TestHost {
        TestHost {
            id,
            size: Some((60, 20)),
        }
    }

    /// Replies `<command>-out`; commands starting with "slow" take longer
    #[derive(Default)]
    struct EchoExecutor {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CommandExecutor for EchoExecutor {
        async fn execute(&self, command: &str) -> Result<String, RouteError> {
            self.calls.lock().unwrap().push(command.to_string());
            if command.starts_with("slow") {
                tokio::time::sleep(Duration::from_millis(60)).await;
            }
            Ok(format!("{command}-out"))
        }
    }

    /// Blocks every command until released
    #[derive(Default)]
    struct GatedExecutor {
        started: AtomicUsize,
        gate: Notify,
    }

    #[async_trait]
    impl CommandExecutor for GatedExecutor {
        async fn execute(&self, command: &str) -> Result<String, RouteError> {
            self.started.fetch_add(1, Ordering::SeqCst);
            self.gate.notified().await;
            Ok(format!("{command}-out"))
        }
    }

    fn manager(executor: Arc<dyn CommandExecutor>) -> SessionManager {
        let router = Arc::new(CommandRouter::new(executor, RoutingPolicy::Direct));
        SessionManager::new(router, Handle::current())
    }

    fn submit(manager: &mut SessionManager, view: ViewId, line: &str) {
        for ch in line.chars() {
            manager.dispatch_key(view, KeyInput::char(ch));
        }
        manager.dispatch_key(view, KeyInput::Enter);
    }

    fn text(manager: &SessionManager, view: ViewId) -> Vec<String> {
        manager
            .session(view)
            .map(|s| lock_sink(s.sink()).text())
            .unwrap_or_default()
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_start_is_idempotent_per_view() {
        let mut manager = manager(Arc::new(EchoExecutor::default()));
        let view = host(1);

        let first = manager.start(&view).id();
        let second = manager.start(&view).id();

        assert_eq!(first, second);
        assert_eq!(manager.len(), 1);
        let banners = text(&manager, 1)
            .iter()
            .filter(|row| row.contains(BANNER_TITLE))
            .count();
        assert_eq!(banners, 1);
        assert_eq!(
            manager.session(1).map(|s| lock_sink(s.sink()).geometry()),
            Some((60, 20))
        );
    }

    #[tokio::test]
    async fn test_results_render_in_submission_order() {
        let executor = Arc::new(EchoExecutor::default());
        let mut manager = manager(executor.clone());
        manager.start(&host(1));

        submit(&mut manager, 1, "slow");
        submit(&mut manager, 1, "fast");

        wait_until(|| text(&manager, 1).iter().any(|row| row == "fast-out")).await;
        manager.process_events();

        let rows = text(&manager, 1);
        let slow = rows.iter().position(|row| row == "slow-out");
        let fast = rows.iter().position(|row| row == "fast-out");
        assert!(slow.is_some() && slow < fast, "rows: {rows:?}");
        assert_eq!(*executor.calls.lock().unwrap(), ["slow", "fast"]);
        assert_eq!(rows.last().map(String::as_str), Some("❯"));
    }

    #[tokio::test]
    async fn test_prompt_is_redrawn_with_pending_input() {
        let mut manager = manager(Arc::new(EchoExecutor::default()));
        manager.start(&host(1));

        submit(&mut manager, 1, "ls");
        for ch in "pw".chars() {
            manager.dispatch_key(1, KeyInput::char(ch));
        }
        wait_until(|| text(&manager, 1).iter().any(|row| row == "ls-out")).await;

        assert!(manager.process_events());
        let rows = text(&manager, 1);
        assert_eq!(rows.last().map(String::as_str), Some("❯ pw"));
    }

    #[tokio::test]
    async fn test_late_response_after_dispose_is_dropped() {
        let executor = Arc::new(GatedExecutor::default());
        let mut manager = manager(executor.clone());
        manager.start(&host(1));
        submit(&mut manager, 1, "ls");
        wait_until(|| executor.started.load(Ordering::SeqCst) == 1).await;

        let sink = manager.session(1).map(|s| s.sink().clone()).unwrap();
        assert!(manager.dispose(1));
        let written = lock_sink(&sink).bytes_written();

        executor.gate.notify_waiters();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let sink = lock_sink(&sink);
        assert!(sink.is_released());
        assert_eq!(sink.bytes_written(), written);
        assert!(!manager.dispatch_key(1, KeyInput::Enter));
    }

    #[tokio::test]
    async fn test_start_after_dispose_creates_fresh_session() {
        let mut manager = manager(Arc::new(EchoExecutor::default()));
        let view = host(3);
        let old_id = manager.start(&view).id();
        submit(&mut manager, 3, "pwd");

        manager.dispose(3);
        assert!(manager.is_empty());
        assert!(!manager.dispose(3));

        let session = manager.start(&view);
        assert_ne!(session.id(), old_id);
        assert!(session.is_alive());
        assert!(session.editor().history().is_empty());
    }

    #[tokio::test]
    async fn test_observer_fits_on_change_and_after_settle() {
        let mut manager = manager(Arc::new(EchoExecutor::default()));
        let mut view = host(1);
        manager.start(&view);
        let geometry = |m: &SessionManager| m.session(1).map(|s| lock_sink(s.sink()).geometry());

        let now = Instant::now();
        view.size = Some((60, 8));
        manager.observe(&view, now);
        assert_eq!(geometry(&manager), Some((60, 8)));

        manager.schedule_settled_fit(1, now);
        manager.observe(&view, now + Duration::from_millis(100));
        assert!(manager.settle_pending(1));
        manager.observe(&view, now + Duration::from_millis(300));
        assert!(!manager.settle_pending(1));

        view.size = None;
        manager.window_resized(&view);
        assert_eq!(geometry(&manager), Some((60, 8)));
    }

    #[tokio::test]
    async fn test_clear_keeps_pending_input() {
        let mut manager = manager(Arc::new(EchoExecutor::default()));
        manager.start(&host(1));
        for ch in "ec".chars() {
            manager.dispatch_key(1, KeyInput::char(ch));
        }

        if let Some(session) = manager.session_mut(1) {
            session.clear();
        }

        assert_eq!(text(&manager, 1), vec!["❯ ec"]);
    }
}
