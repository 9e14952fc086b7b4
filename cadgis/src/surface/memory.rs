use std::path::{Path, PathBuf};

use cadgis_types::Point3d;
use serde::{Deserialize, Serialize};

use super::{DrawingSurface, Label, LayerHandle, SymbolDefinition};
use crate::error::CadgisError;

/// Entity of a [`Drawing`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Entity {
    /// Point.
    Point {
        /// Layer name.
        layer: String,
        /// Position.
        position: Point3d,
    },
    /// Polyline.
    Polyline {
        /// Layer name.
        layer: String,
        /// Vertices in order.
        vertices: Vec<Point3d>,
        /// Whether the last vertex connects to the first one.
        closed: bool,
    },
    /// Placed symbol.
    SymbolInstance {
        /// Layer name.
        layer: String,
        /// Symbol name.
        symbol: String,
        /// Insertion point.
        position: Point3d,
        /// Texts of the symbol's slots.
        labels: Vec<Label>,
    },
}

impl Entity {
    /// Name of the layer the entity is on.
    pub fn layer(&self) -> &str {
        match self {
            Entity::Point { layer, .. }
            | Entity::Polyline { layer, .. }
            | Entity::SymbolInstance { layer, .. } => layer,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct DrawingContent {
    #[serde(default)]
    layers: Vec<String>,
    #[serde(default)]
    symbols: Vec<SymbolDefinition>,
    #[serde(default)]
    entities: Vec<Entity>,
}

/// In-memory drawing document stored as a JSON file.
///
/// Transactions are implemented by keeping a copy of the document taken when the transaction
/// began.
#[derive(Debug, Clone, Default)]
pub struct Drawing {
    path: Option<PathBuf>,
    content: DrawingContent,
    snapshot: Option<DrawingContent>,
}

impl Drawing {
    /// Creates an empty unsaved drawing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a drawing file. A file that does not exist yet gives an empty drawing that will be
    /// created on [`Drawing::save`].
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CadgisError> {
        let path = path.as_ref();
        let content = match std::fs::read_to_string(path) {
            Ok(text) => serde_json::from_str(&text)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                log::info!("Drawing {path:?} does not exist, creating a new one");
                DrawingContent::default()
            }
            Err(err) => return Err(CadgisError::io(path, err)),
        };

        Ok(Self {
            path: Some(path.to_path_buf()),
            content,
            snapshot: None,
        })
    }

    /// Writes the drawing to the file it was opened from.
    pub fn save(&self) -> Result<(), CadgisError> {
        let Some(path) = &self.path else {
            return Err(CadgisError::Surface("drawing has no file path".into()));
        };
        if self.in_transaction() {
            return Err(CadgisError::Surface(
                "cannot save a drawing with an open transaction".into(),
            ));
        }

        if let Some(folder) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(folder).map_err(|err| CadgisError::io(folder, err))?;
        }

        let text = serde_json::to_string_pretty(&self.content)?;
        std::fs::write(path, text).map_err(|err| CadgisError::io(path, err))?;
        log::debug!("Drawing saved to {path:?}");
        Ok(())
    }

    /// Sets the file the drawing is saved to.
    pub fn set_path(&mut self, path: impl Into<PathBuf>) {
        self.path = Some(path.into());
    }

    /// File the drawing is saved to.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns true if a transaction is open.
    pub fn in_transaction(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Names of the layers in creation order.
    pub fn layer_names(&self) -> impl Iterator<Item = &str> {
        self.content.layers.iter().map(String::as_str)
    }

    /// All entities in creation order.
    pub fn entities(&self) -> &[Entity] {
        &self.content.entities
    }

    /// Entities on the layer, compared ignoring case.
    pub fn entities_on<'a>(&'a self, layer: &'a str) -> impl Iterator<Item = &'a Entity> + 'a {
        self.content
            .entities
            .iter()
            .filter(move |entity| entity.layer().eq_ignore_ascii_case(layer))
    }

    fn check_transaction(&self) -> Result<(), CadgisError> {
        match self.in_transaction() {
            true => Ok(()),
            false => Err(CadgisError::Surface("no open transaction".into())),
        }
    }

    fn layer_name(&self, layer: LayerHandle) -> Result<String, CadgisError> {
        self.content
            .layers
            .get(layer.0)
            .cloned()
            .ok_or_else(|| CadgisError::Surface(format!("invalid layer handle {}", layer.0)))
    }

    fn push(&mut self, entity: Entity) -> Result<(), CadgisError> {
        self.check_transaction()?;
        self.content.entities.push(entity);
        Ok(())
    }
}

impl DrawingSurface for Drawing {
    fn document_id(&self) -> Option<String> {
        self.path.as_ref().map(|path| path.display().to_string())
    }

    fn begin_transaction(&mut self) -> Result<(), CadgisError> {
        if self.in_transaction() {
            return Err(CadgisError::Surface(
                "a transaction is already open".into(),
            ));
        }

        self.snapshot = Some(self.content.clone());
        Ok(())
    }

    fn commit(&mut self) -> Result<(), CadgisError> {
        self.check_transaction()?;
        self.snapshot = None;
        Ok(())
    }

    fn rollback(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            self.content = snapshot;
        }
    }

    fn ensure_layer(&mut self, name: &str) -> Result<LayerHandle, CadgisError> {
        if let Some(index) = self
            .content
            .layers
            .iter()
            .position(|layer| layer.eq_ignore_ascii_case(name))
        {
            return Ok(LayerHandle(index));
        }

        self.check_transaction()?;
        if name.trim().is_empty() {
            return Err(CadgisError::Surface("layer name cannot be empty".into()));
        }

        self.content.layers.push(name.to_string());
        Ok(LayerHandle(self.content.layers.len() - 1))
    }

    fn clear_layer(&mut self, layer: LayerHandle) -> Result<usize, CadgisError> {
        self.check_transaction()?;
        let name = self.layer_name(layer)?;
        let before = self.content.entities.len();
        self.content
            .entities
            .retain(|entity| !entity.layer().eq_ignore_ascii_case(&name));

        Ok(before - self.content.entities.len())
    }

    fn emit_point(&mut self, layer: LayerHandle, position: Point3d) -> Result<(), CadgisError> {
        let layer = self.layer_name(layer)?;
        self.push(Entity::Point { layer, position })
    }

    fn emit_polyline(
        &mut self,
        layer: LayerHandle,
        vertices: &[Point3d],
        closed: bool,
    ) -> Result<(), CadgisError> {
        let layer = self.layer_name(layer)?;
        self.push(Entity::Polyline {
            layer,
            vertices: vertices.to_vec(),
            closed,
        })
    }

    fn emit_symbol_instance(
        &mut self,
        layer: LayerHandle,
        symbol: &str,
        position: Point3d,
        labels: Vec<Label>,
    ) -> Result<(), CadgisError> {
        let layer = self.layer_name(layer)?;
        if !self.content.symbols.iter().any(|s| s.name == symbol) {
            return Err(CadgisError::UnknownSymbol(symbol.to_string()));
        }

        self.push(Entity::SymbolInstance {
            layer,
            symbol: symbol.to_string(),
            position,
            labels,
        })
    }

    fn symbols(&self) -> Vec<SymbolDefinition> {
        self.content.symbols.clone()
    }

    fn define_symbol(&mut self, definition: SymbolDefinition) -> Result<bool, CadgisError> {
        self.check_transaction()?;
        if self
            .content
            .symbols
            .iter()
            .any(|symbol| symbol.name == definition.name)
        {
            return Ok(false);
        }

        self.content.symbols.push(definition);
        Ok(true)
    }
}
