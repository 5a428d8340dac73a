use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, Instant};

/// Park interval used when no deadline is armed. The select arm is disabled
/// in that state; this only exists so the sleep future can be constructed.
const PARKED: Duration = Duration::from_secs(24 * 60 * 60);

// ============================================================================
// Public Types
// ============================================================================

/// The qualifying input events. Anything here counts as guest activity and
/// restarts the idle deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    PointerDown,
    PointerMove,
    KeyDown,
    KeyPress,
    Scroll,
    TouchStart,
    TouchMove,
    Click,
    ContextMenu,
    Wheel,
}

/// Edge-triggered idle/active transitions. Each edge is delivered exactly
/// once: repeated timer expiries while already idle are suppressed, as are
/// repeated activity bursts while already active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivitySignal {
    Idle,
    Active,
}

/// Monitor configuration. Replacing it (via [`MonitorHandle::configure`])
/// always cancels the pending deadline before arming a new one.
#[derive(Debug, Clone)]
pub struct IdleConfig {
    /// How long without qualifying input before the idle edge fires.
    pub timeout: Duration,
    /// Master switch. Disabling forces an active transition and tears down
    /// the timer; re-enabling starts a fresh deadline.
    pub enabled: bool,
    /// Location prefixes where the monitor goes inert (e.g. the partner
    /// management surface).
    pub excluded_prefixes: Vec<String>,
}

enum Command {
    Input(InputKind),
    Location(String),
    SetEnabled(bool),
    Configure(IdleConfig),
    Reset,
}

// ============================================================================
// IdleMonitor
// ============================================================================

/// Converts raw input events into a binary idle/active signal on a
/// resettable deadline.
///
/// One tokio task owns the single pending timer; there is no background
/// polling. The returned [`MonitorHandle`] is the disposer: dropping it
/// closes the command channel, which ends the task and cancels whatever
/// deadline was pending, so every exit path tears the timer down.
pub struct IdleMonitor {
    config: IdleConfig,
    location: String,
    idle: bool,
    deadline: Option<Instant>,
    commands: mpsc::UnboundedReceiver<Command>,
    signals: mpsc::UnboundedSender<ActivitySignal>,
    idle_tx: watch::Sender<bool>,
}

/// Owner-side handle to a running monitor. All methods are non-blocking;
/// commands are applied by the monitor task in arrival order.
pub struct MonitorHandle {
    commands: mpsc::UnboundedSender<Command>,
    idle_rx: watch::Receiver<bool>,
}

impl IdleMonitor {
    /// Start a monitor task. Idle/active edges are delivered on `signals`.
    ///
    /// If the config arms the monitor (enabled, location `/` not excluded),
    /// the first deadline starts immediately.
    pub fn spawn(
        config: IdleConfig,
        signals: mpsc::UnboundedSender<ActivitySignal>,
    ) -> MonitorHandle {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (idle_tx, idle_rx) = watch::channel(false);

        let monitor = IdleMonitor {
            config,
            location: "/".to_string(),
            idle: false,
            deadline: None,
            commands: command_rx,
            signals,
            idle_tx,
        };
        tokio::spawn(monitor.run());

        MonitorHandle {
            commands: command_tx,
            idle_rx,
        }
    }

    async fn run(mut self) {
        if self.armed() {
            self.rearm();
        }

        loop {
            let deadline = self
                .deadline
                .unwrap_or_else(|| Instant::now() + PARKED);

            tokio::select! {
                cmd = self.commands.recv() => {
                    match cmd {
                        Some(cmd) => self.handle(cmd),
                        // Handle dropped: tear down
                        None => break,
                    }
                }
                _ = sleep_until(deadline), if self.deadline.is_some() => {
                    // Single-shot: the deadline is consumed whether or not an
                    // edge fires, so an already-idle monitor never re-fires
                    self.deadline = None;
                    self.mark_idle();
                }
            }
        }
    }

    fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Input(_) | Command::Reset => {
                if self.armed() {
                    self.mark_active();
                    self.rearm();
                }
                // While disabled or on an excluded location the listeners are
                // conceptually torn down: events are ignored
            }
            Command::Location(location) => {
                self.location = location;
                self.reconcile(false);
            }
            Command::SetEnabled(enabled) => {
                self.config.enabled = enabled;
                self.reconcile(false);
            }
            Command::Configure(config) => {
                self.config = config;
                // Re-configuration always cancels the previous deadline
                // before arming a new one
                self.reconcile(true);
            }
        }
    }

    /// Bring the timer in line with the current config/location. When the
    /// monitor is inert the stored flag is forced active; when armed, the
    /// deadline restarts without a transition.
    fn reconcile(&mut self, reconfigured: bool) {
        if self.armed() {
            if reconfigured {
                tracing::debug!(timeout_ms = self.config.timeout.as_millis() as u64, "Idle monitor reconfigured");
            }
            self.rearm();
        } else {
            self.mark_active();
            self.deadline = None;
        }
    }

    fn armed(&self) -> bool {
        self.config.enabled && !self.excluded()
    }

    fn excluded(&self) -> bool {
        self.config
            .excluded_prefixes
            .iter()
            .any(|prefix| self.location.starts_with(prefix.as_str()))
    }

    fn rearm(&mut self) {
        self.deadline = Some(Instant::now() + self.config.timeout);
    }

    fn mark_idle(&mut self) {
        if !self.idle {
            self.idle = true;
            let _ = self.idle_tx.send(true);
            tracing::debug!(location = %self.location, "Guest went idle");
            if self.signals.send(ActivitySignal::Idle).is_err() {
                tracing::debug!("Activity signal receiver dropped");
            }
        }
    }

    fn mark_active(&mut self) {
        if self.idle {
            self.idle = false;
            let _ = self.idle_tx.send(false);
            tracing::debug!("Guest became active");
            if self.signals.send(ActivitySignal::Active).is_err() {
                tracing::debug!("Activity signal receiver dropped");
            }
        }
    }
}

impl MonitorHandle {
    /// Report a qualifying input event.
    pub fn input(&self, kind: InputKind) {
        let _ = self.commands.send(Command::Input(kind));
    }

    /// Report a location change (logical path string).
    pub fn set_location(&self, location: impl Into<String>) {
        let _ = self.commands.send(Command::Location(location.into()));
    }

    /// Toggle the monitor without replacing the rest of the config.
    pub fn set_enabled(&self, enabled: bool) {
        let _ = self.commands.send(Command::SetEnabled(enabled));
    }

    /// Replace the whole config; cancels and re-arms the deadline.
    pub fn configure(&self, config: IdleConfig) {
        let _ = self.commands.send(Command::Configure(config));
    }

    /// Explicit external wake, equivalent to a qualifying input event.
    pub fn reset(&self) {
        let _ = self.commands.send(Command::Reset);
    }

    /// Current value of the idle flag.
    pub fn is_idle(&self) -> bool {
        *self.idle_rx.borrow()
    }
}

// ============================================================================
// Tests
// ============================================================================
