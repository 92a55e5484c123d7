use serde::Serialize;

/// A decoded inbound message from the process manager.
///
/// One event per received line. Unknown text is preserved in
/// [`PmEvent::Unrecognized`] so callers can log it; it never fails decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum PmEvent {
    /// The process manager finished booting.
    Boot,
    /// Outcome of an earlier `start_app` request.
    AppStarted { success: bool },
    /// The requested app is not known to the process manager.
    AppNotFound,
    /// The running app exited normally.
    AppClosed,
    /// The running app exited abnormally.
    AppCrashed,
    /// The cabinet should (re)enter the menu flow.
    Activate,
    /// The cabinet should leave the foreground.
    Deactivate,
    /// Idle mode begins.
    IdleEnter,
    /// Idle mode ends.
    IdleExit,
    /// Text that matches no known event. Logged and otherwise ignored.
    Unrecognized(String),
}

impl PmEvent {
    /// Decodes one line of wire text. `line` must already be stripped of
    /// its newline terminator.
    pub fn decode(line: &str) -> Self {
        match line {
            "boot" => PmEvent::Boot,
            "app_started:true" => PmEvent::AppStarted { success: true },
            "app_started:false" => PmEvent::AppStarted { success: false },
            // "game_not_found" is the historical spelling, still emitted by
            // older process-manager builds.
            "app_not_found" | "game_not_found" => PmEvent::AppNotFound,
            "app_closed" => PmEvent::AppClosed,
            "app_crashed" => PmEvent::AppCrashed,
            "activate" => PmEvent::Activate,
            "deactivate" => PmEvent::Deactivate,
            "idle_enter" => PmEvent::IdleEnter,
            "idle_exit" => PmEvent::IdleExit,
            other => PmEvent::Unrecognized(other.to_string()),
        }
    }

    /// Returns `false` for text that matched no known event.
    pub fn is_recognized(&self) -> bool {
        !matches!(self, PmEvent::Unrecognized(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_the_full_vocabulary() {
        assert_eq!(PmEvent::decode("boot"), PmEvent::Boot);
        assert_eq!(
            PmEvent::decode("app_started:true"),
            PmEvent::AppStarted { success: true }
        );
        assert_eq!(
            PmEvent::decode("app_started:false"),
            PmEvent::AppStarted { success: false }
        );
        assert_eq!(PmEvent::decode("app_not_found"), PmEvent::AppNotFound);
        assert_eq!(PmEvent::decode("app_closed"), PmEvent::AppClosed);
        assert_eq!(PmEvent::decode("app_crashed"), PmEvent::AppCrashed);
        assert_eq!(PmEvent::decode("activate"), PmEvent::Activate);
        assert_eq!(PmEvent::decode("deactivate"), PmEvent::Deactivate);
        assert_eq!(PmEvent::decode("idle_enter"), PmEvent::IdleEnter);
        assert_eq!(PmEvent::decode("idle_exit"), PmEvent::IdleExit);
    }

    #[test]
    fn decodes_legacy_game_not_found_alias() {
        assert_eq!(PmEvent::decode("game_not_found"), PmEvent::AppNotFound);
    }

    #[test]
    fn unknown_text_is_preserved_not_rejected() {
        let event = PmEvent::decode("frobnicate");
        assert_eq!(event, PmEvent::Unrecognized("frobnicate".to_string()));
        assert!(!event.is_recognized());
    }

    #[test]
    fn decoding_is_case_sensitive() {
        assert!(!PmEvent::decode("Boot").is_recognized());
        assert!(!PmEvent::decode("IDLE_ENTER").is_recognized());
    }
}
