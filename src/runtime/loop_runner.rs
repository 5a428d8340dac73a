//! Main event loop for the kiosk runtime.
//!
//! Multiplexes terminal input, activity monitor edges, and store change
//! notifications. Raw terminal input stands in for the kiosk's touch layer:
//! every key, tap, and wheel event counts as guest activity.

use std::io;
use std::time::Duration;

use anyhow::Result;
use crossterm::{
    event::{
        DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, KeyModifiers,
        MouseEventKind,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode},
};
use futures::StreamExt;
use tokio::sync::broadcast;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

use super::Kiosk;
use crate::engagement::activity::{ActivitySignal, IdleConfig, InputKind};
use crate::engagement::navigation::NavigationPath;
use crate::engagement::screensaver::{ActivationTrigger, ScreenState};
use crate::storage::keys;

/// Result of handling an input event.
pub enum Action {
    /// Continue the event loop and process more events.
    Continue,
    /// Exit the runtime and restore the terminal.
    Quit,
}

/// Runs the kiosk event loop.
///
/// Uses `tokio::select!` to multiplex four event sources:
/// - **Terminal input**: crossterm's async event stream, mapped to the
///   monitor's qualifying input kinds
/// - **Activity edges**: idle/active signals from the monitor task
/// - **Store changes**: record-change notifications driving live
///   reconfiguration
/// - **Unix signals**: SIGTERM/SIGINT for graceful shutdown
///
/// # Panic Safety
///
/// Installs a panic hook that restores the terminal state before unwinding,
/// ensuring the terminal is not left in raw mode on panic.
pub async fn run(kiosk: &mut Kiosk) -> Result<()> {
    // Install panic hook BEFORE touching the terminal
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), DisableMouseCapture);
        original_hook(panic_info);
    }));

    enable_raw_mode()?;
    execute!(io::stdout(), EnableMouseCapture)?;

    let mut event_stream = crossterm::event::EventStream::new();
    let mut changes = kiosk.store.subscribe();
    let mut watching_changes = true;

    // Signal handlers for graceful shutdown (Unix only)
    // On non-Unix platforms, these become pending futures that never complete
    #[cfg(unix)]
    let mut sigterm = signal(SignalKind::terminate())?;
    #[cfg(unix)]
    let mut sigint = signal(SignalKind::interrupt())?;

    loop {
        #[cfg(unix)]
        let sigterm_fut = sigterm.recv();
        #[cfg(not(unix))]
        let sigterm_fut = std::future::pending::<Option<()>>();

        #[cfg(unix)]
        let sigint_fut = sigint.recv();
        #[cfg(not(unix))]
        let sigint_fut = std::future::pending::<Option<()>>();

        tokio::select! {
            biased;  // Process in order listed for predictable behavior

            _ = sigterm_fut => {
                tracing::info!("Received SIGTERM, shutting down gracefully");
                break;
            }

            _ = sigint_fut => {
                tracing::info!("Received SIGINT, shutting down gracefully");
                break;
            }

            maybe_event = event_stream.next() => {
                if let Some(Ok(event)) = maybe_event {
                    match handle_input(kiosk, &event).await {
                        Action::Quit => break,
                        Action::Continue => {}
                    }
                }
            }

            Some(edge) = kiosk.signals.recv() => {
                handle_activity_edge(kiosk, edge).await;
            }

            change = changes.recv(), if watching_changes => {
                match change {
                    Ok(key) => handle_store_change(kiosk, &key).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "Missed store notifications, reloading settings");
                        handle_store_change(kiosk, keys::SCREENSAVER_SETTINGS).await;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        watching_changes = false;
                    }
                }
            }
        }
    }

    disable_raw_mode()?;
    execute!(io::stdout(), DisableMouseCapture)?;
    Ok(())
}

/// Map a terminal event to the monitor's qualifying input kinds. Focus and
/// resize events are not guest activity.
fn input_kind(event: &Event) -> Option<InputKind> {
    match event {
        Event::Key(key) => match key.kind {
            KeyEventKind::Press => Some(InputKind::KeyDown),
            KeyEventKind::Repeat => Some(InputKind::KeyPress),
            KeyEventKind::Release => None,
        },
        Event::Mouse(mouse) => match mouse.kind {
            MouseEventKind::Down(_) => Some(InputKind::PointerDown),
            MouseEventKind::Up(_) => Some(InputKind::Click),
            MouseEventKind::Drag(_) => Some(InputKind::TouchMove),
            MouseEventKind::Moved => Some(InputKind::PointerMove),
            MouseEventKind::ScrollUp
            | MouseEventKind::ScrollDown
            | MouseEventKind::ScrollLeft
            | MouseEventKind::ScrollRight => Some(InputKind::Wheel),
        },
        // Focus, resize, and any future event kinds are not guest activity
        _ => None,
    }
}

/// Feed the event to the monitor, then apply the runtime's own key bindings.
async fn handle_input(kiosk: &mut Kiosk, event: &Event) -> Action {
    if let Some(kind) = input_kind(event) {
        kiosk.monitor.input(kind);
    }

    let Event::Key(key) = event else {
        return Action::Continue;
    };
    if key.kind != KeyEventKind::Press {
        return Action::Continue;
    }

    match key.code {
        KeyCode::Char('q') => return Action::Quit,
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            return Action::Quit;
        }
        // Preview from the management surface: enters Ambient without
        // touching the activation stats
        KeyCode::Char('p') => {
            if kiosk
                .controller
                .enter_ambient(ActivationTrigger::Preview)
                .await
                .is_some()
            {
                log_ambient_view(kiosk);
            }
        }
        // Explicit exit from the ambient surface. This is the only way out
        // of a preview: the guest never went idle, so no active edge is
        // coming from the monitor.
        KeyCode::Esc => {
            kiosk.controller.exit_ambient();
            kiosk.monitor.reset();
        }
        // Open the current sponsored campaign
        KeyCode::Char('o') => {
            if let Some(ads) = &kiosk.ads {
                ads.click_current().await;
            }
        }
        _ => {}
    }
    Action::Continue
}

async fn handle_activity_edge(kiosk: &mut Kiosk, edge: ActivitySignal) {
    if let Some(state) = kiosk.controller.handle_signal(edge).await {
        match state {
            ScreenState::Ambient => log_ambient_view(kiosk),
            ScreenState::Interactive => {
                tracing::info!("Returning to the interactive guide");
            }
        }
    }
}

/// React to a record change written by another surface. Only the screensaver
/// settings drive live reconfiguration; everything else is re-read by its
/// owner on its own schedule.
async fn handle_store_change(kiosk: &mut Kiosk, key: &str) {
    if key != keys::SCREENSAVER_SETTINGS {
        return;
    }
    let Some(settings) = kiosk.controller.reload_settings().await else {
        return;
    };

    kiosk.monitor.configure(IdleConfig {
        timeout: Duration::from_secs(settings.timeout_secs),
        enabled: settings.enabled,
        excluded_prefixes: kiosk.excluded_prefixes.clone(),
    });
    if let Some(ads) = &mut kiosk.ads {
        ads.set_rotation_interval(Duration::from_secs(settings.rotation_secs));
    }
    if !settings.enabled {
        kiosk.controller.exit_ambient();
    }
}

fn log_ambient_view(kiosk: &Kiosk) {
    let view = kiosk.controller.ambient_view(&kiosk.history, &kiosk.prefs);
    tracing::info!(
        greeting = %view.greeting,
        suggested = ?view.suggested_categories,
        "Ambient surface engaged"
    );

    let show_continue = kiosk
        .prefs
        .prefs()
        .display_preferences
        .show_continue_reading;
    if let Some(item) = view.continue_item.filter(|_| show_continue) {
        let target = NavigationPath::for_entry(&item);
        tracing::info!(
            subject = %item.subject.name,
            target = %target.location(),
            "Continue tile ready"
        );
    }

    if let Some(campaign) = kiosk.ads.as_ref().and_then(|ads| ads.current()) {
        tracing::info!(
            campaign = %campaign.campaign_name,
            media = campaign.media_type.label(),
            "Sponsored slide showing"
        );
    }
}
