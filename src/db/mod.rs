/// Execution side: the connection-manager contract, the [`Database`]
/// facade that compiles and runs statements, and two managers (a
/// PostgreSQL pool and an in-memory recorder for dry runs and tests).
mod connection;
mod database;
mod manager;
mod recording;

pub use connection::{ConnectionConfig, PgManager, SslMode};
pub use database::{Database, DdlLock};
pub use manager::{Connection, ConnectionManager, QueryOutput};
pub use recording::RecordingManager;
