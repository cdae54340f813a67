//! Application event loop
//!
//! Polls crossterm events, feeds them to the session bound to the terminal
//! panel, drives the panel animation and resize observation, and renders.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyEvent, KeyEventKind, MouseEvent};
use tokio::runtime::Handle;
use tracing::info;

use crate::config::Config;
use crate::core::router::CommandRouter;
use crate::core::session::SessionManager;
use crate::core::sink::{lock_sink, ViewId};
use crate::ui::{AppAction, KeyMapper, Renderer, Status, TerminalPanel};

/// View id of the bottom terminal panel
pub const PANEL_VIEW: ViewId = 1;

pub struct App {
    manager: SessionManager,
    panel: TerminalPanel,
    renderer: Renderer,
    mode: &'static str,
    needs_render: bool,
}

impl App {
    pub fn new(
        config: &Config,
        router: Arc<CommandRouter>,
        runtime: Handle,
        renderer: Renderer,
        screen: (u16, u16),
    ) -> Self {
        let mode = router.policy().name();
        let manager = SessionManager::new(router, runtime)
            .with_settle_delay(config.settle_delay())
            .with_scrollback(config.terminal.scrollback);
        let panel = TerminalPanel::new(
            PANEL_VIEW,
            screen,
            config.terminal.collapsed_rows,
            config.terminal.start_expanded,
        );

        Self {
            manager,
            panel,
            renderer,
            mode,
            needs_render: true,
        }
    }

    pub fn panel(&self) -> &TerminalPanel {
        &self.panel
    }

    pub fn manager(&self) -> &SessionManager {
        &self.manager
    }

    /// Bind the terminal session to the panel
    pub fn start(&mut self) {
        self.manager.start(&self.panel);
        self.needs_render = true;
    }

    /// Run until the user quits
    pub fn run(&mut self) -> anyhow::Result<()> {
        let poll_timeout = Duration::from_millis(10);
        self.start();

        loop {
            self.update(Instant::now());

            if self.needs_render {
                self.render()?;
                self.needs_render = false;
            }

            if !event::poll(poll_timeout)? {
                continue;
            }
            let keep_running = match event::read()? {
                Event::Key(key_event) => {
                    // Only process key press events
                    if key_event.kind != KeyEventKind::Press {
                        continue;
                    }
                    self.handle_key(&key_event, Instant::now())
                }
                Event::Mouse(mouse_event) => {
                    self.handle_mouse(&mouse_event);
                    true
                }
                Event::Resize(cols, rows) => {
                    self.handle_resize(cols, rows);
                    true
                }
                _ => true,
            };
            if !keep_running {
                info!("Quit requested");
                break;
            }
        }

        self.manager.shutdown();
        Ok(())
    }

    /// Advance the animation, observe the panel size and apply write-backs
    pub fn update(&mut self, now: Instant) {
        if self.panel.tick(now) {
            self.needs_render = true;
        }
        self.manager.observe(&self.panel, now);
        if self.manager.process_events() {
            self.needs_render = true;
        }
    }

    /// Handle a key press. Returns false when the app should quit.
    pub fn handle_key(&mut self, key_event: &KeyEvent, now: Instant) -> bool {
        self.needs_render = true;
        match KeyMapper::action(key_event) {
            Some(action) => self.handle_action(action, now),
            None => {
                self.manager
                    .dispatch_key(PANEL_VIEW, KeyMapper::map(key_event));
                true
            }
        }
    }

    fn handle_mouse(&mut self, mouse_event: &MouseEvent) {
        if let Some(action) = KeyMapper::mouse_action(mouse_event) {
            self.handle_action(action, Instant::now());
            self.needs_render = true;
        }
    }

    /// Window-resize fallback of the resize observer
    pub fn handle_resize(&mut self, cols: u16, rows: u16) {
        self.panel.set_screen_size(cols, rows);
        self.manager.window_resized(&self.panel);
        self.needs_render = true;
    }

    fn handle_action(&mut self, action: AppAction, now: Instant) -> bool {
        match action {
            AppAction::Quit => return false,
            AppAction::ToggleExpand => {
                let expanded = self.panel.toggle(now);
                self.manager.schedule_settled_fit(PANEL_VIEW, now);
                info!("Terminal panel {}", if expanded { "expanded" } else { "collapsed" });
            }
            AppAction::CycleTheme => {
                let scheme = self.renderer.scheme().next();
                info!("Color scheme: {}", scheme.name);
                self.renderer.set_scheme(scheme);
            }
            AppAction::ClearTerminal => {
                if let Some(session) = self.manager.session_mut(PANEL_VIEW) {
                    session.clear();
                }
            }
            AppAction::ScrollUp(lines) => {
                if let Some(session) = self.manager.session_mut(PANEL_VIEW) {
                    session.scroll(lines as isize);
                }
            }
            AppAction::ScrollDown(lines) => {
                if let Some(session) = self.manager.session_mut(PANEL_VIEW) {
                    session.scroll(-(lines as isize));
                }
            }
        }
        true
    }

    fn render(&mut self) -> anyhow::Result<()> {
        let Some(session) = self.manager.session(PANEL_VIEW) else {
            return Ok(());
        };
        let status = Status { mode: self.mode };
        let sink = lock_sink(session.sink());
        self.renderer.render(&self.panel, sink.state(), &status)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ColorScheme;
    use crate::core::router::{CommandExecutor, RouteError, RoutingPolicy};
    use async_trait::async_trait;
    use crossterm::event::{KeyCode, KeyModifiers};

    struct NullExecutor;

    #[async_trait]
    impl CommandExecutor for NullExecutor {
        async fn execute(&self, _command: &str) -> Result<String, RouteError> {
            Ok(String::new())
        }
    }

    fn app() -> App {
        let router = Arc::new(CommandRouter::new(Arc::new(NullExecutor), RoutingPolicy::Direct));
        let renderer = Renderer::new(ColorScheme::default_scheme());
        let mut app = App::new(&Config::default(), router, Handle::current(), renderer, (80, 31));
        app.start();
        app
    }

    fn key(code: KeyCode, mods: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, mods)
    }

    fn sink_geometry(app: &App) -> Option<(u16, u16)> {
        app.manager()
            .session(PANEL_VIEW)
            .map(|s| lock_sink(s.sink()).geometry())
    }

    #[tokio::test]
    async fn test_session_fits_panel_on_start() {
        let app = app();
        assert_eq!(sink_geometry(&app), Some((80, 9)));
    }

    #[tokio::test]
    async fn test_toggle_refits_during_and_after_animation() {
        let mut app = app();
        let start = Instant::now();

        assert!(app.handle_key(&key(KeyCode::Char('e'), KeyModifiers::CONTROL), start));
        assert!(app.manager().settle_pending(PANEL_VIEW));

        app.update(start + Duration::from_millis(100));
        assert_eq!(sink_geometry(&app), Some((80, 19)));

        app.update(start + Duration::from_millis(300));
        assert_eq!(sink_geometry(&app), Some((80, 29)));
        assert!(!app.manager().settle_pending(PANEL_VIEW));
    }

    #[tokio::test]
    async fn test_resize_refits() {
        let mut app = app();
        app.handle_resize(100, 20);
        assert_eq!(sink_geometry(&app), Some((100, 9)));
    }

    #[tokio::test]
    async fn test_keys_reach_line_editor_and_quit_stops() {
        let mut app = app();
        let now = Instant::now();
        for ch in "pwd".chars() {
            app.handle_key(&key(KeyCode::Char(ch), KeyModifiers::NONE), now);
        }
        // Unbound chord is ignored by the editor
        app.handle_key(&key(KeyCode::Char('c'), KeyModifiers::CONTROL), now);

        let line = app
            .manager()
            .session(PANEL_VIEW)
            .map(|s| s.editor().line().as_str().to_string());
        assert_eq!(line.as_deref(), Some("pwd"));
        assert!(!app.handle_key(&key(KeyCode::Char('q'), KeyModifiers::CONTROL), now));
    }

    #[tokio::test]
    async fn test_theme_cycles() {
        let mut app = app();
        app.handle_key(&key(KeyCode::Char('t'), KeyModifiers::CONTROL), Instant::now());
        assert_eq!(app.renderer.scheme().name, "tokyo-night");
    }
}
