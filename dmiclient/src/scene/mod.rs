//! Scene-state machine for the cabinet UI.
//!
//! Tracks the UI's high-level mode (menu, overlay, starting, in-app, idle)
//! and is driven from two directions: local UI intent (the request methods)
//! and protocol events from the process manager (drained from the inbound
//! queue once per [`SceneStateMachine::tick`]). All transitions happen on
//! the caller's execution context; the socket reader only ever enqueues.
//!
//! Transitions do not touch UI objects directly. Each one returns
//! [`SceneEffect`] values describing what the UI collaborator should do.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

use crate::protocol::{valid_app_id, PmEvent};
use crate::utils::SceneError;

/// The UI's current high-level mode. Exactly one is current at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneState {
    /// One-shot intermediate used to sequence a menu reload; resolves to
    /// [`SceneState::InMenu`] on the next tick.
    EnableMenuTransient,
    InMenu,
    InfoOverlay,
    StartingApp,
    InApp,
    Idle,
}

/// Why an app start did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StartFailure {
    /// The process manager reported `app_started:false`.
    Failed,
    /// The process manager does not know the requested app.
    NotFound,
}

/// Crash notice retained for later display. The protocol carries no app id
/// with `app_crashed`, so the most recently started app is recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrashContext {
    pub app_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Side effects for the UI collaborator to carry out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "effect", content = "data", rename_all = "snake_case")]
pub enum SceneEffect {
    /// Reload the menu scene before scrolling resumes.
    ReloadMenu,
    /// Enable scrolling/input on the menu.
    EnableScroll,
    /// Show the info overlay for the given app.
    ShowOverlay(String),
    HideOverlay,
    /// Show the loading indicator for the app being started.
    ShowLoading(String),
    HideLoading,
    /// Transmit `start_app:<id>` to the process manager.
    SendStart(String),
    /// Surface a failed launch to the user.
    StartFailed {
        app_id: Option<String>,
        reason: StartFailure,
    },
}

/// The scene state machine.
///
/// Uninitialized (`state() == None`) until the first request after startup,
/// which is always the menu flow. There is no terminal state; the machine
/// runs for the process lifetime.
pub struct SceneStateMachine {
    state: Option<SceneState>,
    last_running_app: Option<String>,
    last_crash: Option<CrashContext>,
    inbound: UnboundedReceiver<PmEvent>,
}

impl SceneStateMachine {
    /// Creates the machine around the inbound protocol-event queue produced
    /// by [`crate::client::PmClient`].
    pub fn new(inbound: UnboundedReceiver<PmEvent>) -> Self {
        Self {
            state: None,
            last_running_app: None,
            last_crash: None,
            inbound,
        }
    }

    pub fn state(&self) -> Option<SceneState> {
        self.state
    }

    /// Id of the most recently requested app start, retained across state
    /// transitions until the next start request.
    pub fn last_running_app(&self) -> Option<&str> {
        self.last_running_app.as_deref()
    }

    /// The most recent crash notice, if any.
    pub fn last_crash(&self) -> Option<&CrashContext> {
        self.last_crash.as_ref()
    }

    /// UI requests the menu (startup, return from a game, wake from idle).
    pub fn request_menu(&mut self) -> Vec<SceneEffect> {
        self.set_state(SceneState::EnableMenuTransient);
        vec![SceneEffect::ReloadMenu]
    }

    /// UI opens the "more info" overlay for an app.
    pub fn open_info(&mut self, app_id: &str) -> Result<Vec<SceneEffect>, SceneError> {
        if app_id.trim().is_empty() {
            return Err(SceneError::MissingAppId);
        }
        self.set_state(SceneState::InfoOverlay);
        Ok(vec![SceneEffect::ShowOverlay(app_id.to_string())])
    }

    /// UI closes the info overlay, resuming the menu.
    pub fn close_overlay(&mut self) -> Vec<SceneEffect> {
        if self.state != Some(SceneState::InfoOverlay) {
            debug!(state = ?self.state, "close_overlay outside overlay, ignoring");
            return Vec::new();
        }
        self.set_state(SceneState::InMenu);
        vec![SceneEffect::HideOverlay, SceneEffect::EnableScroll]
    }

    /// UI confirms an app selection.
    ///
    /// Rejects empty and wire-unsafe ids before anything reaches the socket,
    /// and rejects a new start while one is still unanswered: the protocol
    /// has no correlation ids, so overlapping starts would be ambiguous.
    pub fn start_app(&mut self, app_id: &str) -> Result<Vec<SceneEffect>, SceneError> {
        if app_id.is_empty() {
            return Err(SceneError::MissingAppId);
        }
        if !valid_app_id(app_id) {
            return Err(SceneError::InvalidAppId(app_id.to_string()));
        }
        if self.state == Some(SceneState::StartingApp) {
            return Err(SceneError::StartPending);
        }

        info!(app_id, "starting app");
        self.last_running_app = Some(app_id.to_string());
        self.set_state(SceneState::StartingApp);
        Ok(vec![
            SceneEffect::ShowLoading(app_id.to_string()),
            SceneEffect::SendStart(app_id.to_string()),
        ])
    }

    /// One cooperative step: resolves a pending menu transient, then drains
    /// every queued protocol event. Call periodically from the owner's
    /// execution context; this is the only place protocol events mutate
    /// scene state.
    pub fn tick(&mut self) -> Vec<SceneEffect> {
        let mut effects = Vec::new();

        if self.state == Some(SceneState::EnableMenuTransient) {
            self.set_state(SceneState::InMenu);
            effects.push(SceneEffect::EnableScroll);
        }

        loop {
            match self.inbound.try_recv() {
                Ok(event) => self.dispatch(event, &mut effects),
                Err(TryRecvError::Empty) => break,
                // Client gone; the queue simply stays empty from here on.
                Err(TryRecvError::Disconnected) => break,
            }
        }

        effects
    }

    fn dispatch(&mut self, event: PmEvent, effects: &mut Vec<SceneEffect>) {
        match event {
            PmEvent::Boot => info!("process manager booted"),
            PmEvent::AppStarted { success: true } => {
                self.set_state(SceneState::InApp);
                effects.push(SceneEffect::HideLoading);
            }
            PmEvent::AppStarted { success: false } => {
                self.fail_start(StartFailure::Failed, effects);
            }
            PmEvent::AppNotFound => {
                self.fail_start(StartFailure::NotFound, effects);
            }
            PmEvent::Activate => {
                self.set_state(SceneState::EnableMenuTransient);
                effects.push(SceneEffect::ReloadMenu);
            }
            // No transition is defined for deactivate; the process manager
            // follows up with idle_enter or activate.
            PmEvent::Deactivate => debug!("deactivate received"),
            PmEvent::IdleEnter => self.set_state(SceneState::Idle),
            PmEvent::IdleExit => {
                self.set_state(SceneState::EnableMenuTransient);
                effects.push(SceneEffect::ReloadMenu);
            }
            PmEvent::AppCrashed => {
                warn!(app_id = ?self.last_running_app, "app crashed");
                self.last_crash = Some(CrashContext {
                    app_id: self.last_running_app.clone(),
                    occurred_at: Utc::now(),
                });
            }
            // Intentionally inert: closing is followed by activate/idle
            // events that drive the actual transition.
            PmEvent::AppClosed => debug!("app_closed received"),
            PmEvent::Unrecognized(raw) => {
                debug!(message = %raw, "dropping unrecognized message");
            }
        }
    }

    fn fail_start(&mut self, reason: StartFailure, effects: &mut Vec<SceneEffect>) {
        warn!(app_id = ?self.last_running_app, ?reason, "app start failed");
        self.set_state(SceneState::InMenu);
        effects.push(SceneEffect::HideLoading);
        effects.push(SceneEffect::StartFailed {
            app_id: self.last_running_app.clone(),
            reason,
        });
    }

    fn set_state(&mut self, next: SceneState) {
        if self.state != Some(next) {
            debug!(from = ?self.state, to = ?next, "scene state change");
            self.state = Some(next);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::{self, UnboundedSender};

    fn machine() -> (UnboundedSender<PmEvent>, SceneStateMachine) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, SceneStateMachine::new(rx))
    }

    /// Drives the machine into the menu, as the UI does at startup.
    fn machine_in_menu() -> (UnboundedSender<PmEvent>, SceneStateMachine) {
        let (tx, mut scene) = machine();
        scene.request_menu();
        scene.tick();
        assert_eq!(scene.state(), Some(SceneState::InMenu));
        (tx, scene)
    }

    #[test]
    fn starts_uninitialized_and_enters_menu_via_transient() {
        let (_tx, mut scene) = machine();
        assert_eq!(scene.state(), None);

        let effects = scene.request_menu();
        assert_eq!(scene.state(), Some(SceneState::EnableMenuTransient));
        assert_eq!(effects, vec![SceneEffect::ReloadMenu]);

        let effects = scene.tick();
        assert_eq!(scene.state(), Some(SceneState::InMenu));
        assert_eq!(effects, vec![SceneEffect::EnableScroll]);
    }

    #[test]
    fn successful_start_ends_in_app() {
        let (tx, mut scene) = machine_in_menu();

        let effects = scene.start_app("pacman").unwrap();
        assert_eq!(scene.state(), Some(SceneState::StartingApp));
        assert_eq!(
            effects,
            vec![
                SceneEffect::ShowLoading("pacman".to_string()),
                SceneEffect::SendStart("pacman".to_string()),
            ]
        );

        tx.send(PmEvent::AppStarted { success: true }).unwrap();
        let effects = scene.tick();
        assert_eq!(scene.state(), Some(SceneState::InApp));
        assert_eq!(effects, vec![SceneEffect::HideLoading]);
        assert_eq!(scene.last_running_app(), Some("pacman"));
    }

    #[test]
    fn failed_start_returns_to_menu() {
        let (tx, mut scene) = machine_in_menu();
        scene.start_app("pacman").unwrap();

        tx.send(PmEvent::AppStarted { success: false }).unwrap();
        let effects = scene.tick();
        assert_eq!(scene.state(), Some(SceneState::InMenu));
        assert_eq!(
            effects,
            vec![
                SceneEffect::HideLoading,
                SceneEffect::StartFailed {
                    app_id: Some("pacman".to_string()),
                    reason: StartFailure::Failed,
                },
            ]
        );
    }

    #[test]
    fn unknown_app_returns_to_menu() {
        let (tx, mut scene) = machine_in_menu();
        scene.start_app("missingno").unwrap();

        tx.send(PmEvent::AppNotFound).unwrap();
        let effects = scene.tick();
        assert_eq!(scene.state(), Some(SceneState::InMenu));
        assert!(effects.contains(&SceneEffect::StartFailed {
            app_id: Some("missingno".to_string()),
            reason: StartFailure::NotFound,
        }));
    }

    #[test]
    fn overlapping_start_is_rejected() {
        let (_tx, mut scene) = machine_in_menu();
        scene.start_app("pacman").unwrap();

        let second = scene.start_app("tetris");
        assert_eq!(second.unwrap_err(), SceneError::StartPending);
        assert_eq!(scene.state(), Some(SceneState::StartingApp));
        assert_eq!(scene.last_running_app(), Some("pacman"));
    }

    #[test]
    fn bad_app_ids_fail_fast() {
        let (_tx, mut scene) = machine_in_menu();
        assert_eq!(scene.start_app("").unwrap_err(), SceneError::MissingAppId);
        assert_eq!(
            scene.start_app("has space").unwrap_err(),
            SceneError::InvalidAppId("has space".to_string())
        );
        // Nothing was recorded and the state is untouched.
        assert_eq!(scene.state(), Some(SceneState::InMenu));
        assert_eq!(scene.last_running_app(), None);
    }

    #[test]
    fn unrecognized_message_changes_nothing() {
        let (tx, mut scene) = machine_in_menu();
        scene.start_app("pacman").unwrap();

        tx.send(PmEvent::Unrecognized("frobnicate".to_string()))
            .unwrap();
        let effects = scene.tick();
        assert_eq!(scene.state(), Some(SceneState::StartingApp));
        assert_eq!(scene.last_running_app(), Some("pacman"));
        assert!(effects.is_empty());
    }

    #[test]
    fn idle_enter_is_idempotent() {
        let (tx, mut scene) = machine_in_menu();

        tx.send(PmEvent::IdleEnter).unwrap();
        scene.tick();
        assert_eq!(scene.state(), Some(SceneState::Idle));

        tx.send(PmEvent::IdleEnter).unwrap();
        let effects = scene.tick();
        assert_eq!(scene.state(), Some(SceneState::Idle));
        assert!(effects.is_empty());
    }

    #[test]
    fn idle_exit_reenters_menu_flow() {
        let (tx, mut scene) = machine_in_menu();
        tx.send(PmEvent::IdleEnter).unwrap();
        scene.tick();

        tx.send(PmEvent::IdleExit).unwrap();
        let effects = scene.tick();
        assert_eq!(scene.state(), Some(SceneState::EnableMenuTransient));
        assert_eq!(effects, vec![SceneEffect::ReloadMenu]);

        let effects = scene.tick();
        assert_eq!(scene.state(), Some(SceneState::InMenu));
        assert_eq!(effects, vec![SceneEffect::EnableScroll]);
    }

    #[test]
    fn activate_reenters_menu_flow_from_in_app() {
        let (tx, mut scene) = machine_in_menu();
        scene.start_app("pacman").unwrap();
        tx.send(PmEvent::AppStarted { success: true }).unwrap();
        scene.tick();

        tx.send(PmEvent::Activate).unwrap();
        scene.tick();
        assert_eq!(scene.state(), Some(SceneState::EnableMenuTransient));
        scene.tick();
        assert_eq!(scene.state(), Some(SceneState::InMenu));
    }

    #[test]
    fn crash_is_recorded_without_a_state_change() {
        let (tx, mut scene) = machine_in_menu();
        scene.start_app("example-app").unwrap();
        tx.send(PmEvent::AppStarted { success: true }).unwrap();
        scene.tick();

        tx.send(PmEvent::AppCrashed).unwrap();
        scene.tick();
        assert_eq!(scene.state(), Some(SceneState::InApp));
        let crash = scene.last_crash().expect("crash context recorded");
        assert_eq!(crash.app_id.as_deref(), Some("example-app"));
    }

    #[test]
    fn app_closed_is_inert() {
        let (tx, mut scene) = machine_in_menu();
        scene.start_app("pacman").unwrap();
        tx.send(PmEvent::AppStarted { success: true }).unwrap();
        scene.tick();

        tx.send(PmEvent::AppClosed).unwrap();
        let effects = scene.tick();
        assert_eq!(scene.state(), Some(SceneState::InApp));
        assert!(effects.is_empty());
    }

    #[test]
    fn overlay_opens_and_closes_around_the_menu() {
        let (_tx, mut scene) = machine_in_menu();

        let effects = scene.open_info("pacman").unwrap();
        assert_eq!(scene.state(), Some(SceneState::InfoOverlay));
        assert_eq!(effects, vec![SceneEffect::ShowOverlay("pacman".to_string())]);

        let effects = scene.close_overlay();
        assert_eq!(scene.state(), Some(SceneState::InMenu));
        assert_eq!(
            effects,
            vec![SceneEffect::HideOverlay, SceneEffect::EnableScroll]
        );
    }

    #[test]
    fn close_overlay_outside_overlay_is_a_noop() {
        let (_tx, mut scene) = machine_in_menu();
        assert!(scene.close_overlay().is_empty());
        assert_eq!(scene.state(), Some(SceneState::InMenu));
    }

    // The console's --json mode prints states and effects as JSON lines;
    // pin the wire shapes it emits.
    #[test]
    fn states_and_effects_serialize_as_json() {
        assert_eq!(
            serde_json::to_value(SceneState::InMenu).unwrap(),
            serde_json::json!("in_menu")
        );
        assert_eq!(
            serde_json::to_value(SceneEffect::HideLoading).unwrap(),
            serde_json::json!({"effect": "hide_loading"})
        );
        assert_eq!(
            serde_json::to_value(SceneEffect::ShowLoading("pacman".to_string())).unwrap(),
            serde_json::json!({"effect": "show_loading", "data": "pacman"})
        );
        assert_eq!(
            serde_json::to_value(SceneEffect::StartFailed {
                app_id: Some("pacman".to_string()),
                reason: StartFailure::NotFound,
            })
            .unwrap(),
            serde_json::json!({
                "effect": "start_failed",
                "data": {"app_id": "pacman", "reason": "not_found"},
            })
        );
    }
}
