use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;

use super::SourceDescriptor;
use crate::config::PostgisSettings;
use crate::error::CadgisError;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_CONNECTIONS: u32 = 2;

/// Parameters of a database connection.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ConnectionParams {
    /// Server host name.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Database name.
    pub database: String,
    /// User name.
    pub username: String,
    password: Option<String>,
}

impl std::fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl ConnectionParams {
    /// Parameters of the configured database.
    pub fn from_settings(settings: &PostgisSettings) -> Result<Self, CadgisError> {
        settings.validate()?;
        Ok(Self {
            host: settings.host.clone(),
            port: settings.port,
            database: settings.database.clone(),
            username: settings.username.clone(),
            password: settings.password.clone(),
        })
    }

    /// Parameters of the database a layer was imported from. The port and password are not
    /// recorded with the layer and are taken from the settings.
    pub fn for_source(descriptor: &SourceDescriptor, settings: &PostgisSettings) -> Self {
        Self {
            host: descriptor.host.clone(),
            port: settings.port,
            database: descriptor.database.clone(),
            username: descriptor.username.clone(),
            password: settings.password.clone(),
        }
    }

    fn options(&self) -> PgConnectOptions {
        let options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&self.username)
            .application_name("cadgis");

        match &self.password {
            Some(password) => options.password(password),
            None => options,
        }
    }

    /// Opens a connection pool. Every failure is reported as a connection error.
    pub async fn connect(&self) -> Result<PgPool, CadgisError> {
        log::debug!(
            "Connecting to {}@{}:{}/{}",
            self.username,
            self.host,
            self.port,
            self.database
        );

        PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_with(self.options())
            .await
            .map_err(|err| {
                CadgisError::Connection(format!(
                    "{}@{}:{}/{}: {err}",
                    self.username, self.host, self.port, self.database
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn settings() -> PostgisSettings {
        PostgisSettings {
            host: "db.local".into(),
            port: 6543,
            database: "gis".into(),
            username: "editor".into(),
            password: Some("secret".into()),
        }
    }

    #[test]
    fn incomplete_settings() {
        let mut settings = settings();
        settings.database.clear();
        assert_matches!(
            ConnectionParams::from_settings(&settings),
            Err(CadgisError::Settings(_))
        );
    }

    #[test]
    fn source_params_use_configured_port_and_password() {
        let descriptor = SourceDescriptor {
            host: "archive.local".into(),
            database: "survey".into(),
            username: "reader".into(),
            schema: "public".into(),
            table: "trees".into(),
            geom_column: "geom".into(),
            geom_type: "POINT".into(),
            srid: 27700,
            import_sql: None,
        };

        let params = ConnectionParams::for_source(&descriptor, &settings());
        assert_eq!(params.host, "archive.local");
        assert_eq!(params.database, "survey");
        assert_eq!(params.username, "reader");
        assert_eq!(params.port, 6543);
        assert_eq!(params.password.as_deref(), Some("secret"));
        assert!(!format!("{params:?}").contains("secret"));
    }
}
