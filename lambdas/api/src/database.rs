use std::error::Error as StdError;

use anyhow::Context;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::error::ProvideErrorMetadata;
use domain::Error;
use tokio::sync::OnceCell;

use crate::config::Config;

/// Opens a connection to the document database.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Handle: Clone + Send + Sync + 'static;

    async fn connect(&self) -> anyhow::Result<Self::Handle>;
}

/// Connect-once guard around a [`Connector`].
///
/// The first successful `ensure_connected` stores the handle; later calls
/// return it without connecting again. A failed attempt leaves the gate
/// unconnected.
pub struct DatabaseGate<C: Connector> {
    connector: C,
    handle: OnceCell<C::Handle>,
}

impl<C: Connector> DatabaseGate<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            handle: OnceCell::new(),
        }
    }

    pub async fn ensure_connected(&self) -> anyhow::Result<&C::Handle> {
        self.handle
            .get_or_try_init(|| async {
                let handle = self.connector.connect().await?;
                tracing::info!("Connected to DynamoDB");
                Ok::<_, anyhow::Error>(handle)
            })
            .await
    }

    /// Connects once at startup. A failure is logged and leaves the gate
    /// unconnected; the service keeps running and reports it on `/health`.
    pub async fn connect_at_startup(&self) -> bool {
        match self.ensure_connected().await {
            Ok(_) => true,
            Err(err) => {
                let error = format!("{err:#}");
                tracing::error!(error = %error, "Error connecting to DynamoDB");
                false
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.handle.initialized()
    }

    pub fn handle(&self) -> Option<&C::Handle> {
        self.handle.get()
    }
}

/// Client plus the table this service works against.
#[derive(Clone, Debug)]
pub struct DynamoDb {
    pub client: aws_sdk_dynamodb::Client,
    pub table: String,
}

#[derive(Clone, Debug)]
pub struct DynamoConnector {
    endpoint: Option<String>,
    table: String,
}

impl DynamoConnector {
    pub fn new(endpoint: Option<String>, table: impl Into<String>) -> Self {
        Self {
            endpoint,
            table: table.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.dynamodb_endpoint.clone(), config.dynamodb_table.clone())
    }
}

#[async_trait]
impl Connector for DynamoConnector {
    type Handle = DynamoDb;

    async fn connect(&self) -> anyhow::Result<DynamoDb> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(endpoint) = &self.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let config = loader.load().await;
        let client = aws_sdk_dynamodb::Client::new(&config);

        client
            .list_tables()
            .limit(1)
            .send()
            .await
            .context("Error connecting to DynamoDB")?;

        Ok(DynamoDb {
            client,
            table: self.table.clone(),
        })
    }
}

pub type Database = DatabaseGate<DynamoConnector>;

/// Sorts a DynamoDB failure into the error taxonomy: request shape problems
/// reported by the service become [`Error::Schema`], the rest are unexpected.
pub fn classify_sdk_error<E>(err: E) -> Error
where
    E: ProvideErrorMetadata + StdError + Send + Sync + 'static,
{
    if err.code() == Some("ValidationException") {
        let details = err.message().unwrap_or("Invalid request").to_string();
        return Error::schema(details);
    }
    Error::Unexpected(anyhow::Error::new(err))
}
