use crate::api;
use crate::cli::{actions::Action, globals::GlobalArgs, telemetry};
use anyhow::Result;

/// Handle the server action
pub async fn handle(action: Action, globals: &GlobalArgs) -> Result<()> {
    match action {
        Action::Server { port, dsn } => {
            let result = api::new(port, dsn, globals).await;
            telemetry::shutdown_tracer();
            result?;
        }
    }

    Ok(())
}
