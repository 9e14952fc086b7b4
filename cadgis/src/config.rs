//! Settings persisted between sessions.
//!
//! Settings live in `settings.json` inside the settings directory, next to the layer ledger.
//! The directory is, in order of precedence, the one given explicitly, the one named by the
//! `CADGIS_HOME` environment variable, or `cadgis` in the platform configuration directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CadgisError;
use crate::ledger::LedgerStore;

/// File name of the settings in the settings directory.
pub const SETTINGS_FILE: &str = "settings.json";

/// Environment variable that overrides the settings directory.
pub const HOME_ENV: &str = "CADGIS_HOME";

/// Coordinate system features are drawn in unless the operator chooses another one.
pub const DEFAULT_TARGET_EPSG: i32 = cadgis_types::crs::DEFAULT_EPSG;

/// Settings of the application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Feature service portal.
    pub arcgis: ArcGisSettings,
    /// Relational store.
    pub postgis: PostgisSettings,
    /// Coordinate system of the drawing.
    pub target_epsg: i32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            arcgis: ArcGisSettings::default(),
            postgis: PostgisSettings::default(),
            target_epsg: DEFAULT_TARGET_EPSG,
        }
    }
}

/// Feature service portal settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArcGisSettings {
    /// Portal REST root, e.g. `https://www.arcgis.com/sharing/rest`.
    pub portal_url: String,
    /// Referer the access token is bound to.
    pub referer: String,
    /// Account name.
    pub username: Option<String>,
    /// Account password.
    pub password: Option<String>,
    /// Lifetime of requested tokens in minutes.
    pub token_expiration: u32,
    /// Number of features requested per page.
    pub page_size: u32,
    /// Maximum number of pages read from a single layer.
    pub max_pages: u32,
}

impl Default for ArcGisSettings {
    fn default() -> Self {
        Self {
            portal_url: "https://www.arcgis.com/sharing/rest".into(),
            referer: "https://www.arcgis.com".into(),
            username: None,
            password: None,
            token_expiration: 60,
            page_size: 1000,
            max_pages: 100,
        }
    }
}

impl ArcGisSettings {
    /// Account name and password, if both are set.
    pub fn credentials(&self) -> Result<(&str, &str), CadgisError> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(password)) if !user.trim().is_empty() && !password.is_empty() => {
                Ok((user, password))
            }
            _ => Err(CadgisError::Settings(
                "feature service credentials are not set, run `login` first".into(),
            )),
        }
    }
}

/// Relational store settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostgisSettings {
    /// Server host name.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Database name.
    pub database: String,
    /// User name.
    pub username: String,
    /// Password.
    pub password: Option<String>,
}

impl Default for PostgisSettings {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 5432,
            database: String::new(),
            username: String::new(),
            password: None,
        }
    }
}

impl PostgisSettings {
    /// Returns an error if the settings cannot be used to connect.
    pub fn validate(&self) -> Result<(), CadgisError> {
        let missing: Vec<_> = [
            ("host", &self.host),
            ("database", &self.database),
            ("username", &self.username),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect();

        match missing.is_empty() {
            true => Ok(()),
            false => Err(CadgisError::Settings(format!(
                "database settings are incomplete, missing {}; run `pg-login` first",
                missing.join(", ")
            ))),
        }
    }
}

/// Settings directory.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    dir: PathBuf,
}

impl SettingsStore {
    /// Store in the given directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Finds the settings directory. See the module documentation for the order.
    pub fn locate(explicit: Option<PathBuf>) -> Result<Self, CadgisError> {
        if let Some(dir) = explicit {
            return Ok(Self::new(dir));
        }

        if let Some(dir) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
            return Ok(Self::new(dir));
        }

        dirs::config_dir()
            .map(|dir| Self::new(dir.join("cadgis")))
            .ok_or_else(|| {
                CadgisError::Settings(format!(
                    "cannot determine the settings directory, set {HOME_ENV}"
                ))
            })
    }

    /// Settings directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the settings file.
    pub fn settings_path(&self) -> PathBuf {
        self.dir.join(SETTINGS_FILE)
    }

    /// Reads the settings. Missing file or missing values give defaults.
    pub fn load(&self) -> Result<Settings, CadgisError> {
        let path = self.settings_path();
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No settings at {path:?}, using defaults");
                Ok(Settings::default())
            }
            Err(err) => Err(CadgisError::io(path, err)),
        }
    }

    /// Writes the settings.
    pub fn save(&self, settings: &Settings) -> Result<(), CadgisError> {
        std::fs::create_dir_all(&self.dir).map_err(|err| CadgisError::io(&self.dir, err))?;
        let path = self.settings_path();
        let text = serde_json::to_string_pretty(settings)?;
        std::fs::write(&path, text).map_err(|err| CadgisError::io(path, err))
    }

    /// Ledger stored in this directory.
    pub fn ledger(&self) -> LedgerStore {
        LedgerStore::in_dir(&self.dir)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn defaults() {
        let settings = Settings::default();
        assert_eq!(settings.target_epsg, 27700);
        assert_eq!(settings.postgis.port, 5432);
        assert_eq!(settings.arcgis.token_expiration, 60);
    }

    #[test]
    fn partial_file_uses_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{"postgis": {"host": "db", "database": "gis"}}"#)
                .expect("parsed");

        assert_eq!(settings.postgis.host, "db");
        assert_eq!(settings.postgis.port, 5432);
        assert_eq!(settings.target_epsg, 27700);
        assert_matches!(settings.postgis.validate(), Err(CadgisError::Settings(msg)) if msg.contains("username"));
    }

    #[test]
    fn missing_credentials() {
        let mut settings = ArcGisSettings::default();
        assert_matches!(settings.credentials(), Err(CadgisError::Settings(_)));

        settings.username = Some("surveyor".into());
        settings.password = Some("secret".into());
        assert_eq!(settings.credentials().ok(), Some(("surveyor", "secret")));
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = SettingsStore::locate(Some(dir.path().join("cfg"))).expect("store");
        assert_eq!(store.load().expect("defaults"), Settings::default());

        let mut settings = Settings::default();
        settings.target_epsg = 3857;
        settings.postgis.username = "gis".into();
        store.save(&settings).expect("saved");

        assert_eq!(store.load().expect("loaded"), settings);
        assert_eq!(
            store.ledger().path(),
            dir.path().join("cfg").join("pg_layer_metadata.json")
        );
    }
}
