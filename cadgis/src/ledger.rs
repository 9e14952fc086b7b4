//! Layer metadata ledger: what was imported into which layer, so it can be refreshed later.
//!
//! The ledger is a JSON array of [`LayerMeta`] records stored next to the settings. It is read
//! and written as a whole; concurrent writers overwrite each other.
//!
//! Layers are identified by name ignoring case, the way drawing layers are, so `Roads` and
//! `roads` share one record.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CadgisError;

/// File name of the ledger in the settings directory.
pub const LEDGER_FILE: &str = "pg_layer_metadata.json";

/// Record of a layer imported from a relational source.
///
/// Every field is always written, `null` when absent. Credentials other than the user name are
/// never stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LayerMeta {
    /// Name of the drawing layer.
    pub acad_layer: String,
    /// Database server.
    #[serde(default)]
    pub host: Option<String>,
    /// Database name.
    #[serde(default)]
    pub database: Option<String>,
    /// User the import was done with.
    #[serde(default)]
    pub username: Option<String>,
    /// Table schema.
    #[serde(default)]
    pub schema: Option<String>,
    /// Table name.
    #[serde(default)]
    pub table: Option<String>,
    /// Geometry column.
    #[serde(default)]
    pub geom_column: Option<String>,
    /// Declared geometry type of the column.
    #[serde(default)]
    pub geom_type: Option<String>,
    /// Coordinate system of the stored geometries.
    #[serde(default)]
    pub srid: Option<i32>,
    /// Query used for the import, when the layer was not imported as a whole table.
    #[serde(default)]
    pub import_sql: Option<String>,
    /// Document the layer belongs to.
    #[serde(default)]
    pub dwg_file: Option<String>,
    /// Time of the last import.
    #[serde(default, with = "last_imported")]
    pub last_imported: Option<DateTime<Utc>>,
}

impl LayerMeta {
    /// Returns true if the record belongs to the document. Records without a document belong to
    /// every document. Paths are compared ignoring case.
    pub fn belongs_to(&self, document: Option<&str>) -> bool {
        match (self.document(), document) {
            (None, _) => true,
            (Some(own), Some(document)) => own.eq_ignore_ascii_case(document),
            (Some(_), None) => false,
        }
    }

    fn document(&self) -> Option<&str> {
        self.dwg_file.as_deref().filter(|doc| !doc.is_empty())
    }
}

mod last_imported {
    use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(value) => {
                serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let Some(text) = Option::<String>::deserialize(deserializer)? else {
            return Ok(None);
        };

        parse(&text).map(Some).map_err(serde::de::Error::custom)
    }

    // Timestamps without an offset are taken as UTC.
    pub(super) fn parse(text: &str) -> Result<DateTime<Utc>, String> {
        if let Ok(value) = DateTime::parse_from_rfc3339(text) {
            return Ok(value.with_timezone(&Utc));
        }

        NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|value| value.and_utc())
            .map_err(|err| format!("invalid LastImported value '{text}': {err}"))
    }
}

/// Set of layer records, at most one per layer name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ledger {
    entries: Vec<LayerMeta>,
}

impl Ledger {
    /// Empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the record, replacing the record of the same layer (names compared ignoring case).
    /// Returns the replaced record.
    pub fn upsert(&mut self, meta: LayerMeta) -> Option<LayerMeta> {
        let replaced = self.remove(&meta.acad_layer);
        self.entries.push(meta);
        replaced
    }

    /// Removes the record of the layer.
    pub fn remove(&mut self, layer: &str) -> Option<LayerMeta> {
        let index = self
            .entries
            .iter()
            .position(|meta| meta.acad_layer.eq_ignore_ascii_case(layer))?;
        Some(self.entries.remove(index))
    }

    /// Record of the layer.
    pub fn get(&self, layer: &str) -> Option<&LayerMeta> {
        self.entries
            .iter()
            .find(|meta| meta.acad_layer.eq_ignore_ascii_case(layer))
    }

    /// All records.
    pub fn list(&self) -> &[LayerMeta] {
        &self.entries
    }

    /// Records that can be refreshed in the document.
    pub fn for_document<'a>(
        &'a self,
        document: Option<&'a str>,
    ) -> impl Iterator<Item = &'a LayerMeta> + 'a {
        self.entries
            .iter()
            .filter(move |meta| meta.belongs_to(document))
    }

    /// Removes records of documents that are not open. Records without a document are kept.
    /// Returns the number of removed records.
    pub fn prune<S: AsRef<str>>(&mut self, open_documents: &[S]) -> usize {
        let before = self.entries.len();
        self.entries.retain(|meta| match meta.document() {
            None => true,
            Some(document) => open_documents
                .iter()
                .any(|open| open.as_ref().eq_ignore_ascii_case(document)),
        });

        before - self.entries.len()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no records.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Ledger file.
#[derive(Debug, Clone)]
pub struct LedgerStore {
    path: PathBuf,
}

impl LedgerStore {
    /// Ledger stored in the settings directory.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::at(dir.as_ref().join(LEDGER_FILE))
    }

    /// Ledger stored in the given file.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the ledger file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the ledger. A missing file is an empty ledger.
    pub fn load(&self) -> Result<Ledger, CadgisError> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) if text.trim().is_empty() => Ok(Ledger::new()),
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Ledger::new()),
            Err(err) => Err(CadgisError::io(&self.path, err)),
        }
    }

    /// Writes the ledger, creating the directory if needed.
    pub fn save(&self, ledger: &Ledger) -> Result<(), CadgisError> {
        if let Some(dir) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|err| CadgisError::io(dir, err))?;
        }

        let text = serde_json::to_string_pretty(ledger)?;
        std::fs::write(&self.path, text).map_err(|err| CadgisError::io(&self.path, err))
    }

    /// Loads the ledger, applies the change and saves it.
    pub fn update<R>(&self, change: impl FnOnce(&mut Ledger) -> R) -> Result<R, CadgisError> {
        let mut ledger = self.load()?;
        let result = change(&mut ledger);
        self.save(&ledger)?;
        Ok(result)
    }
}
