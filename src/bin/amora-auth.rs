use amora_auth::cli::{actions, actions::Action, start, telemetry};
use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let (action, globals) = start()?;

    let result = match action {
        Action::Server { .. } => actions::server::handle(action, &globals).await,
    };

    telemetry::shutdown_tracer();

    result
}
