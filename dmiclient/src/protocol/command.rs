use crate::utils::ClientError;

use super::valid_app_id;

/// An outbound command for the process manager.
///
/// Commands are fire-and-forget: no acknowledgement exists at this layer.
/// A launch status, if any, arrives later as an independent [`super::PmEvent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PmCommand {
    /// Ask the process manager to launch the named application.
    StartApp(String),
}

impl PmCommand {
    /// Builds a start command, rejecting ids that cannot appear on the wire.
    pub fn start_app(app_id: impl Into<String>) -> Result<Self, ClientError> {
        let app_id = app_id.into();
        if !valid_app_id(&app_id) {
            return Err(ClientError::InvalidCommand(format!(
                "app id {:?} is not wire-safe",
                app_id
            )));
        }
        Ok(PmCommand::StartApp(app_id))
    }

    /// Encodes the command as its wire text, without the trailing newline.
    pub fn encode(&self) -> String {
        match self {
            PmCommand::StartApp(app_id) => format!("start_app:{}", app_id),
        }
    }
}
