use std::{process::ExitCode, sync::Arc};

use anyhow::Context;
use api::{
    config::Config,
    database::{Database, DynamoConnector},
    logging, AppState,
};
use axum::Router;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    logging::init(&config)?;

    if let Err(err) = run(config).await {
        let error = format!("{err:#}");
        tracing::error!(error = %error, "Failed to start server");
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

async fn run(config: Config) -> anyhow::Result<()> {
    let database = Arc::new(Database::new(DynamoConnector::from_config(&config)));
    database.connect_at_startup().await;

    let app = api::app(Router::new(), AppState { database });

    if config.runs_on_lambda() {
        tracing::info!("Serving requests from the Lambda runtime");

        let app = tower::ServiceBuilder::new()
            .layer(axum_aws_lambda::LambdaLayer::default())
            .service(app);

        return lambda_http::run(app)
            .await
            .map_err(|err| anyhow::anyhow!("Lambda runtime stopped: {err}"));
    }

    let listener = TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("Could not bind port {}", config.port))?;
    tracing::info!("Server is running on port {}", config.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Could not listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
