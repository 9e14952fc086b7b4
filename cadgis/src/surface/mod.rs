//! Drawing surface is the document features are drawn into.
//!
//! [`DrawingSurface`] is the narrow contract the pipeline needs from a CAD document: layers,
//! three kinds of primitives, a table of symbol definitions, and transactions. All mutations
//! happen between [`DrawingSurface::begin_transaction`] and [`DrawingSurface::commit`]; use
//! [`Transaction`] to make sure an interrupted import leaves the document unchanged.

mod memory;

use cadgis_types::Point3d;
use serde::{Deserialize, Serialize};

pub use memory::{Drawing, Entity};

use crate::error::CadgisError;

/// Reference to a layer of a surface, valid for the surface that returned it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct LayerHandle(pub usize);

/// Definition of a reusable symbol (a CAD block).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolDefinition {
    /// Name of the symbol, unique in a document.
    pub name: String,
    /// Text slots each inserted instance of the symbol carries.
    #[serde(default)]
    pub label_slots: Vec<LabelSlot>,
}

/// Text slot of a symbol (a block attribute definition).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSlot {
    /// Slot identifier.
    pub tag: String,
    /// Text used when no attribute is mapped to the slot.
    #[serde(default)]
    pub default_text: String,
}

/// Text of a slot on a placed symbol instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    /// Slot identifier.
    pub tag: String,
    /// Text.
    pub text: String,
}

/// Document that features are drawn into.
pub trait DrawingSurface {
    /// Identifier of the document, usually its file path. `None` for unsaved documents.
    fn document_id(&self) -> Option<String>;

    /// Starts a transaction. Transactions cannot be nested.
    fn begin_transaction(&mut self) -> Result<(), CadgisError>;
    /// Makes all the changes since [`DrawingSurface::begin_transaction`] permanent.
    fn commit(&mut self) -> Result<(), CadgisError>;
    /// Discards all the changes since [`DrawingSurface::begin_transaction`]. Does nothing if no
    /// transaction is open.
    fn rollback(&mut self);

    /// Returns the layer with the given name, creating it if it does not exist. Layer names are
    /// compared ignoring case.
    fn ensure_layer(&mut self, name: &str) -> Result<LayerHandle, CadgisError>;
    /// Removes all entities from the layer and returns their count.
    fn clear_layer(&mut self, layer: LayerHandle) -> Result<usize, CadgisError>;

    /// Adds a point entity.
    fn emit_point(&mut self, layer: LayerHandle, position: Point3d) -> Result<(), CadgisError>;
    /// Adds a polyline entity. A closed polyline connects its last vertex with the first one.
    fn emit_polyline(
        &mut self,
        layer: LayerHandle,
        vertices: &[Point3d],
        closed: bool,
    ) -> Result<(), CadgisError>;
    /// Adds an instance of a defined symbol.
    fn emit_symbol_instance(
        &mut self,
        layer: LayerHandle,
        symbol: &str,
        position: Point3d,
        labels: Vec<Label>,
    ) -> Result<(), CadgisError>;

    /// Symbols defined in the document.
    fn symbols(&self) -> Vec<SymbolDefinition>;
    /// Adds a symbol definition. Returns `false` and keeps the existing definition if a symbol
    /// with the same name is already defined.
    fn define_symbol(&mut self, definition: SymbolDefinition) -> Result<bool, CadgisError>;

    /// Symbol with the given name.
    fn symbol(&self, name: &str) -> Option<SymbolDefinition> {
        self.symbols()
            .into_iter()
            .find(|symbol| symbol.name == name)
    }
}

/// Open transaction of a [`DrawingSurface`].
///
/// Dropping the guard without calling [`Transaction::commit`] rolls the transaction back, so
/// every exit path of the code holding it (including `?` and panics) leaves the surface as it
/// was before.
pub struct Transaction<'a, S: DrawingSurface + ?Sized> {
    surface: &'a mut S,
    finished: bool,
}

impl<'a, S: DrawingSurface + ?Sized> Transaction<'a, S> {
    /// Begins a transaction on the surface.
    pub fn begin(surface: &'a mut S) -> Result<Self, CadgisError> {
        surface.begin_transaction()?;
        Ok(Self {
            surface,
            finished: false,
        })
    }

    /// Commits the transaction. If the commit fails, the transaction is rolled back.
    pub fn commit(mut self) -> Result<(), CadgisError> {
        self.surface.commit()?;
        self.finished = true;
        Ok(())
    }

    /// Rolls the transaction back.
    pub fn rollback(mut self) {
        self.surface.rollback();
        self.finished = true;
    }
}

impl<S: DrawingSurface + ?Sized> Drop for Transaction<'_, S> {
    fn drop(&mut self) {
        if !self.finished {
            log::debug!("Transaction was not committed, rolling back");
            self.surface.rollback();
        }
    }
}

impl<S: DrawingSurface + ?Sized> std::ops::Deref for Transaction<'_, S> {
    type Target = S;

    fn deref(&self) -> &Self::Target {
        &*self.surface
    }
}

impl<S: DrawingSurface + ?Sized> std::ops::DerefMut for Transaction<'_, S> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.surface
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropped_transaction_rolls_back() {
        let mut drawing = Drawing::new();
        {
            let mut transaction = Transaction::begin(&mut drawing).expect("begin");
            let layer = transaction.ensure_layer("roads").expect("layer");
            transaction
                .emit_point(layer, Point3d::new(1.0, 2.0, 0.0))
                .expect("point");
        }

        assert!(!drawing.in_transaction());
        assert_eq!(drawing.layer_names().count(), 0);
        assert!(drawing.entities().is_empty());
    }

    #[test]
    fn committed_transaction_is_kept() {
        let mut drawing = Drawing::new();
        let mut transaction = Transaction::begin(&mut drawing).expect("begin");
        let layer = transaction.ensure_layer("roads").expect("layer");
        transaction
            .emit_polyline(
                layer,
                &[Point3d::new(0.0, 0.0, 0.0), Point3d::new(1.0, 1.0, 0.0)],
                false,
            )
            .expect("polyline");
        transaction.commit().expect("commit");

        assert_eq!(drawing.entities_on("ROADS").count(), 1);
    }

    #[test]
    fn early_return_rolls_back() {
        fn failing_import(drawing: &mut Drawing) -> Result<(), CadgisError> {
            let mut transaction = Transaction::begin(drawing)?;
            let layer = transaction.ensure_layer("points")?;
            transaction.emit_point(layer, Point3d::new(0.0, 0.0, 0.0))?;
            transaction.emit_symbol_instance(layer, "missing", Point3d::new(0.0, 0.0, 0.0), vec![])?;
            transaction.commit()
        }

        let mut drawing = Drawing::new();
        assert!(failing_import(&mut drawing).is_err());
        assert!(drawing.entities().is_empty());
        assert!(!drawing.in_transaction());
    }
}
