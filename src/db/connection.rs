use std::fmt;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use postgres_native_tls::MakeTlsConnector;
use serde::{Deserialize, Serialize};
use tokio_postgres::{NoTls, SimpleQueryMessage};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::types::WireValue;

use super::manager::{Connection, ConnectionManager, QueryOutput};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const ACQUIRE_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password: String,
    #[serde(default)]
    pub ssl_mode: SslMode,
    /// Accept invalid/self-signed certificates. Ignored by the verifying
    /// modes.
    #[serde(default)]
    pub accept_invalid_certs: bool,
    /// Optional path to a CA bundle (PEM). The system store is used when
    /// unset.
    #[serde(default)]
    pub ca_cert_path: Option<String>,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

fn default_pool_size() -> usize {
    8
}

/// SSL/TLS connection modes, as in libpq's `sslmode`:
/// - `Disable`: No SSL (unencrypted)
/// - `Prefer`: Try SSL first, fall back to non-SSL (default)
/// - `Require`: Require SSL but don't verify certificate
/// - `VerifyCa`: Require SSL and verify the server certificate is signed by a trusted CA
/// - `VerifyFull`: Like VerifyCa, but also verify the server hostname matches the certificate
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
pub enum SslMode {
    Disable,
    #[default]
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

impl SslMode {
    fn keyword(self) -> &'static str {
        match self {
            SslMode::Disable => "disable",
            SslMode::Prefer => "prefer",
            SslMode::Require => "require",
            SslMode::VerifyCa => "verify-ca",
            SslMode::VerifyFull => "verify-full",
        }
    }
}

impl ConnectionConfig {
    pub fn connection_string(&self) -> String {
        format!(
            "host={} port={} dbname={} user={} password={} sslmode={} connect_timeout=10",
            quote_conn_value(&self.host),
            self.port,
            quote_conn_value(&self.database),
            quote_conn_value(&self.username),
            quote_conn_value(&self.password),
            self.ssl_mode.keyword()
        )
    }

    pub fn display_string(&self) -> String {
        format!(
            "{}@{}:{}/{}",
            self.username, self.host, self.port, self.database
        )
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            name: String::from("local"),
            host: String::from("localhost"),
            port: 5432,
            database: String::from("postgres"),
            username: String::from("postgres"),
            password: String::new(),
            ssl_mode: SslMode::default(),
            accept_invalid_certs: false,
            ca_cert_path: None,
            pool_size: default_pool_size(),
        }
    }
}

/// Pooled PostgreSQL connections speaking the simple query protocol, so
/// every value comes back as text for the adapters to decode.
pub struct PgManager {
    pool: Pool,
    label: String,
}

impl PgManager {
    pub fn new(config: &ConnectionConfig) -> anyhow::Result<Self> {
        let pg_config: tokio_postgres::Config = config
            .connection_string()
            .parse()
            .context("Invalid connection settings")?;
        let manager_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
            ..Default::default()
        };
        let manager = match config.ssl_mode {
            SslMode::Disable => Manager::from_config(pg_config, NoTls, manager_config),
            SslMode::Prefer | SslMode::Require => {
                Manager::from_config(pg_config, build_tls_connector(config, false)?, manager_config)
            }
            SslMode::VerifyCa | SslMode::VerifyFull => {
                Manager::from_config(pg_config, build_tls_connector(config, true)?, manager_config)
            }
        };
        let pool = Pool::builder(manager)
            .max_size(config.pool_size.max(1))
            .build()
            .context("Failed to build connection pool")?;
        Ok(Self {
            pool,
            label: config.display_string(),
        })
    }
}

impl fmt::Debug for PgManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgManager").field("target", &self.label).finish()
    }
}

#[async_trait]
impl ConnectionManager for PgManager {
    /// Retries with a doubling pause when the server cannot be reached.
    async fn acquire(&self) -> Result<Box<dyn Connection>> {
        let mut pause = Duration::from_millis(200);
        let mut attempt = 1;
        loop {
            let err = match tokio::time::timeout(CONNECT_TIMEOUT, self.pool.get()).await {
                Ok(Ok(client)) => return Ok(Box::new(PgConnection { client })),
                Ok(Err(err)) => err.to_string(),
                Err(_) => format!("timed out after {}s", CONNECT_TIMEOUT.as_secs()),
            };
            if attempt >= ACQUIRE_ATTEMPTS {
                return Err(Error::Connection(format!("{}: {}", self.label, err)));
            }
            warn!(target_db = %self.label, attempt, error = %err, "connection failed; retrying");
            tokio::time::sleep(pause).await;
            pause *= 2;
            attempt += 1;
        }
    }

    async fn release(&self, connection: Box<dyn Connection>) -> Result<()> {
        // Dropping the pooled object hands it back to the pool.
        drop(connection);
        Ok(())
    }

    fn describe(&self) -> String {
        format!("postgres {}", self.label)
    }
}

struct PgConnection {
    client: Object,
}

#[async_trait]
impl Connection for PgConnection {
    async fn execute(&mut self, sql: &str) -> Result<QueryOutput> {
        let messages = self.client.simple_query(sql).await?;
        let mut output = QueryOutput::default();
        for message in messages {
            match message {
                SimpleQueryMessage::Row(row) => {
                    if output.columns.is_empty() {
                        output.columns = row.columns().iter().map(|c| c.name().to_string()).collect();
                    }
                    output
                        .rows
                        .push((0..row.len()).map(|i| WireValue::from(row.get(i))).collect());
                }
                SimpleQueryMessage::CommandComplete(count) => {
                    output.affected = Some(output.affected.unwrap_or(0) + count);
                }
                _ => {}
            }
        }
        debug!(rows = output.rows.len(), affected = ?output.affected, "statement done");
        Ok(output)
    }
}

/// Build a TLS connector with appropriate certificate configuration.
/// `strict_verify` is set for verify-ca/verify-full.
fn build_tls_connector(config: &ConnectionConfig, strict_verify: bool) -> anyhow::Result<MakeTlsConnector> {
    let mut builder = native_tls::TlsConnector::builder();

    if config.accept_invalid_certs && !strict_verify {
        builder.danger_accept_invalid_certs(true);
        builder.danger_accept_invalid_hostnames(true);
    } else if let Some(ca_path) = &config.ca_cert_path {
        let pem = std::fs::read_to_string(ca_path)
            .with_context(|| format!("Failed to read CA certificate file: {}", ca_path))?;
        let blocks = pem_blocks(&pem);
        if blocks.is_empty() {
            anyhow::bail!("No valid certificates found in {}", ca_path);
        }
        for block in blocks {
            let cert = native_tls::Certificate::from_pem(block.as_bytes())
                .context("Failed to parse certificate")?;
            builder.add_root_certificate(cert);
        }
    }

    let connector = builder.build().context("Failed to build TLS connector")?;
    Ok(MakeTlsConnector::new(connector))
}

/// Split a PEM bundle into one block per certificate.
fn pem_blocks(pem: &str) -> Vec<String> {
    const BEGIN: &str = "-----BEGIN CERTIFICATE-----";
    const END: &str = "-----END CERTIFICATE-----";
    let mut blocks = Vec::new();
    let mut rest = pem;
    while let Some(start) = rest.find(BEGIN) {
        let Some(len) = rest[start..].find(END) else {
            break;
        };
        let end = start + len + END.len();
        blocks.push(format!("{}\n", &rest[start..end]));
        rest = &rest[end..];
    }
    blocks
}

/// Quote a value for use in a libpq key=value connection string.
/// Wraps in single quotes and escapes backslashes and single quotes.
fn quote_conn_value(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{}'", escaped)
}
