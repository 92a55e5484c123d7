//! Wire vocabulary spoken over the process-manager socket.
//!
//! The protocol is plain ASCII text, one command or event per
//! newline-terminated line. Outbound commands are encoded by
//! [`PmCommand`], inbound lines are decoded into [`PmEvent`].

pub mod command;
pub mod event;

pub use command::PmCommand;
pub use event::PmEvent;

/// Checks whether an app id can safely appear on the wire.
///
/// Ids are embedded verbatim in `start_app:<id>` lines, so they must be
/// non-empty printable ASCII without whitespace or the ':' separator.
pub fn valid_app_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_graphic() && c != ':')
}
