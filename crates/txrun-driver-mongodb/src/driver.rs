//! MongoDB client setup

use async_trait::async_trait;
use bson::{Document, doc};
use mongodb::options::{ClientOptions, ServerApi, ServerApiVersion};
use mongodb::{Client, Collection, Database};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use txrun_core::{Result, SessionSource, TxrunError};

use crate::MongoSession;
use crate::error::map_mongo_error;

/// Default MongoDB port
pub const DEFAULT_PORT: u16 = 27017;

/// Settings used to reach a MongoDB deployment
///
/// Either supply `uri` directly (for example an Atlas `mongodb+srv://`
/// string) or describe the deployment field by field and let
/// [`ConnectionSettings::connection_string`] assemble the URI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Full connection string; when set, the host fields are ignored
    pub uri: Option<String>,
    /// Seed list as `host` or `host:port`
    pub hosts: Vec<String>,
    /// Database used for `ping` and collection access
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub auth_source: Option<String>,
    pub replica_set: Option<String>,
    pub tls: bool,
    pub app_name: Option<String>,
    /// Declare Stable API version 1 to the server
    pub stable_api: bool,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            uri: None,
            hosts: vec![format!("localhost:{DEFAULT_PORT}")],
            database: "admin".to_string(),
            username: None,
            password: None,
            auth_source: None,
            replica_set: None,
            tls: false,
            app_name: None,
            stable_api: true,
        }
    }
}

impl ConnectionSettings {
    /// Settings that use `uri` as-is
    pub fn from_uri(uri: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            uri: Some(uri.into()),
            database: database.into(),
            ..Default::default()
        }
    }

    pub fn with_hosts<I, H>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = H>,
        H: Into<String>,
    {
        self.hosts = hosts.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_replica_set(mut self, replica_set: impl Into<String>) -> Self {
        self.replica_set = Some(replica_set.into());
        self
    }

    pub fn with_tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = Some(app_name.into());
        self
    }

    pub fn with_stable_api(mut self, stable_api: bool) -> Self {
        self.stable_api = stable_api;
        self
    }

    /// Build the `mongodb://` connection string for these settings
    pub fn connection_string(&self) -> String {
        if let Some(uri) = self.uri.as_deref().filter(|u| !u.is_empty()) {
            return uri.to_string();
        }

        let username = self.username.as_deref().filter(|s| !s.is_empty());
        let password = self.password.as_deref().filter(|s| !s.is_empty());

        let mut conn_str = String::from("mongodb://");

        if let Some(user) = username {
            conn_str.push_str(&encode_component(user));
            if let Some(pass) = password {
                conn_str.push(':');
                conn_str.push_str(&encode_component(pass));
            }
            conn_str.push('@');
        }

        let hosts: Vec<String> = self
            .hosts
            .iter()
            .map(|h| h.trim())
            .filter(|h| !h.is_empty())
            .map(with_default_port)
            .collect();
        if hosts.is_empty() {
            conn_str.push_str(&with_default_port("localhost"));
        } else {
            conn_str.push_str(&hosts.join(","));
        }

        conn_str.push('/');
        conn_str.push_str(&self.database);

        let mut options = Vec::new();
        if username.is_some() {
            let auth_source = self.auth_source.as_deref().unwrap_or("admin");
            options.push(format!("authSource={}", encode_component(auth_source)));
        }
        if let Some(rs) = &self.replica_set {
            options.push(format!("replicaSet={}", encode_component(rs)));
        }
        if self.tls {
            options.push("tls=true".to_string());
        }
        if let Some(app) = &self.app_name {
            options.push(format!("appName={}", encode_component(app)));
        }

        if !options.is_empty() {
            conn_str.push('?');
            conn_str.push_str(&options.join("&"));
        }

        conn_str
    }
}

fn with_default_port(host: &str) -> String {
    // Bracketed IPv6 literals carry their own colons
    let has_port = match host.rfind(']') {
        Some(end) => host[end..].contains(':'),
        None => host.contains(':'),
    };
    if has_port {
        host.to_string()
    } else {
        format!("{host}:{DEFAULT_PORT}")
    }
}

/// Percent-encoding for userinfo and option values
/// Unreserved URI characters stay literal; everything else is percent-encoded.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

pub(crate) fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, URI_COMPONENT).to_string()
}

/// Connected MongoDB client bound to one database
#[derive(Debug, Clone)]
pub struct MongoClient {
    client: Client,
    database: String,
}

impl MongoClient {
    /// Parse the settings and build a client.
    ///
    /// The driver connects lazily; call [`MongoClient::ping`] to verify the
    /// deployment is reachable.
    #[tracing::instrument(skip(settings), fields(database = %settings.database))]
    pub async fn connect(settings: &ConnectionSettings) -> Result<Self> {
        tracing::debug!("connecting to MongoDB");

        let connection_string = settings.connection_string();
        let mut client_options = ClientOptions::parse(connection_string.as_str())
            .await
            .map_err(|e| {
                TxrunError::Configuration(format!("Failed to parse MongoDB options: {}", e))
            })?;

        if settings.stable_api {
            let server_api = ServerApi::builder().version(ServerApiVersion::V1).build();
            client_options.server_api = Some(server_api);
        }
        if client_options.app_name.is_none() {
            client_options.app_name = settings.app_name.clone();
        }

        let client = Client::with_options(client_options).map_err(|e| {
            TxrunError::Connection(format!("Failed to create MongoDB client: {}", e))
        })?;

        Ok(Self::from_client(client, settings.database.clone()))
    }

    /// Wrap an existing driver client
    pub fn from_client(client: Client, database: impl Into<String>) -> Self {
        Self {
            client,
            database: database.into(),
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn database_name(&self) -> &str {
        &self.database
    }

    pub fn database(&self) -> Database {
        self.client.database(&self.database)
    }

    pub fn collection(&self, name: &str) -> Collection<Document> {
        self.database().collection(name)
    }

    /// Run `{ ping: 1 }` against the configured database
    #[tracing::instrument(skip(self), fields(database = %self.database))]
    pub async fn ping(&self) -> Result<()> {
        self.database()
            .run_command(doc! { "ping": 1_i64 })
            .await
            .map_err(map_mongo_error)?;
        tracing::debug!("MongoDB ping succeeded");
        Ok(())
    }

    /// Start a session whose operations target the configured database
    #[tracing::instrument(skip(self), fields(database = %self.database))]
    pub async fn start_session(&self) -> Result<MongoSession> {
        let session = self
            .client
            .start_session()
            .await
            .map_err(map_mongo_error)?;
        Ok(MongoSession::new(session, self.database.clone()))
    }

    /// Shut down the client, waiting for outstanding sessions to be released
    pub async fn shutdown(self) {
        tracing::debug!(database = %self.database, "shutting down MongoDB client");
        self.client.shutdown().await;
    }
}

#[async_trait]
impl SessionSource for MongoClient {
    type Session = MongoSession;

    async fn start_session(&self) -> Result<MongoSession> {
        MongoClient::start_session(self).await
    }
}
