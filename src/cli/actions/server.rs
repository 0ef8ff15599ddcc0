use crate::api;
use crate::cli::{actions::Action, globals::GlobalArgs};
use crate::config::AuthConfig;
use anyhow::Result;

/// Handle the server action.
///
/// # Errors
/// Returns an error if the server fails to start.
pub async fn handle(action: Action, globals: &GlobalArgs) -> Result<()> {
    match action {
        Action::Server { port, dsn } => {
            let config = AuthConfig::new();
            api::new(port, dsn, globals, config).await?;
        }
    }

    Ok(())
}
