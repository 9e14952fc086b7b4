//! Symbolization of point layers.
//!
//! Point features can be drawn as bare points or as instances of a symbol defined in the drawing.
//! [`resolve`] turns the operator's [`SymbolChoice`] into a [`SymbolBinding`] that is applied to
//! every feature of the imported batch.

use serde::{Deserialize, Serialize};

use crate::error::CadgisError;
use crate::surface::{DrawingSurface, SymbolDefinition};

/// Attribute keys starting with this prefix (ignoring case) are service bookkeeping fields and
/// cannot be used for labels.
pub const RESERVED_PREFIX: &str = "ESRI";

/// How point features of a batch are drawn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolBinding {
    /// Draw symbol instances instead of bare points.
    pub use_symbol: bool,
    /// Name of the symbol. Always set when `use_symbol` is true.
    pub symbol_name: Option<String>,
    /// Attribute whose value fills the symbol's label slots. When `None`, slots keep their
    /// default text.
    pub label_attribute: Option<String>,
}

impl SymbolBinding {
    /// Binding that draws bare points.
    pub fn points() -> Self {
        Self::default()
    }

    /// Binding that draws the given symbol.
    pub fn symbol(name: impl Into<String>, label_attribute: Option<String>) -> Self {
        Self {
            use_symbol: true,
            symbol_name: Some(name.into()),
            label_attribute,
        }
    }
}

/// Operator's choice for a point layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolChoice {
    /// Draw bare points.
    Decline,
    /// Draw the named symbol.
    Use {
        /// Symbol name.
        symbol: String,
        /// Attribute used for the labels.
        label_attribute: Option<String>,
    },
}

/// Attribute keys that can be used for labels: the keys of a sample feature without the
/// reserved ones and without `excluded` (compared ignoring case).
pub fn label_candidates<'a>(
    keys: impl IntoIterator<Item = &'a str>,
    excluded: &[&str],
) -> Vec<String> {
    keys.into_iter()
        .filter(|key| !is_reserved(key))
        .filter(|key| !excluded.iter().any(|ex| ex.eq_ignore_ascii_case(key)))
        .map(str::to_string)
        .collect()
}

fn is_reserved(key: &str) -> bool {
    key.get(..RESERVED_PREFIX.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(RESERVED_PREFIX))
}

/// Resolves the operator's choice against the symbols defined in the drawing and the label
/// candidates of the batch (see [`label_candidates`]).
///
/// A chosen label attribute is matched ignoring case and the binding carries the key as the
/// source spells it. The attribute is ignored for symbols without label slots.
pub fn resolve(
    symbols: &[SymbolDefinition],
    candidates: &[String],
    choice: SymbolChoice,
) -> Result<SymbolBinding, CadgisError> {
    let (symbol, label_attribute) = match choice {
        SymbolChoice::Decline => return Ok(SymbolBinding::points()),
        SymbolChoice::Use {
            symbol,
            label_attribute,
        } => (symbol, label_attribute),
    };

    let Some(definition) = symbols.iter().find(|def| def.name == symbol) else {
        return Err(CadgisError::UnknownSymbol(symbol));
    };

    if definition.label_slots.is_empty() {
        if label_attribute.is_some() {
            log::debug!("Symbol '{symbol}' has no label slots, label attribute is ignored");
        }
        return Ok(SymbolBinding::symbol(symbol, None));
    }

    let Some(attribute) = label_attribute else {
        return Ok(SymbolBinding::symbol(symbol, None));
    };

    let key = candidates
        .iter()
        .find(|key| **key == attribute)
        .or_else(|| candidates.iter().find(|key| key.eq_ignore_ascii_case(&attribute)));

    match key {
        Some(key) => Ok(SymbolBinding::symbol(symbol, Some(key.clone()))),
        None => Err(CadgisError::InvalidLabelAttribute {
            attribute,
            available: candidates.to_vec(),
        }),
    }
}

/// Symbol definitions bundled with the crate.
pub fn standard_symbols() -> Result<Vec<SymbolDefinition>, CadgisError> {
    Ok(serde_json::from_str(include_str!(
        "assets/standard_symbols.json"
    ))?)
}

/// Session state of the standard symbol library.
///
/// The library is imported into the drawing the first time a point layer is symbolized in a
/// session. Symbols that the drawing already defines are kept as they are.
#[derive(Debug, Default)]
pub struct SymbolLibrary {
    loaded: bool,
}

impl SymbolLibrary {
    /// Library that has not been loaded yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the library was imported in this session.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Imports the standard symbols into the surface unless that was already done. Must be called
    /// inside a transaction. Returns the number of newly defined symbols.
    pub fn ensure_loaded<S: DrawingSurface + ?Sized>(
        &mut self,
        surface: &mut S,
    ) -> Result<usize, CadgisError> {
        if self.loaded {
            return Ok(0);
        }

        let mut defined = 0;
        for definition in standard_symbols()? {
            if surface.define_symbol(definition)? {
                defined += 1;
            }
        }

        log::info!("Standard symbol library loaded, {defined} new symbols");
        self.loaded = true;
        Ok(defined)
    }

    /// Forgets that the library was loaded, after the transaction that loaded it was rolled back.
    pub(crate) fn invalidate(&mut self) {
        self.loaded = false;
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::surface::{Drawing, LabelSlot, Transaction};

    fn symbols() -> Vec<SymbolDefinition> {
        vec![
            SymbolDefinition {
                name: "Tree".into(),
                label_slots: vec![LabelSlot {
                    tag: "SPECIES".into(),
                    default_text: "TREE".into(),
                }],
            },
            SymbolDefinition {
                name: "Gully".into(),
                label_slots: vec![],
            },
        ]
    }

    fn candidates() -> Vec<String> {
        label_candidates(
            ["OBJECTID", "Species", "ESRI_OID", "esriShape", "geom"],
            &["GEOM"],
        )
    }

    #[test]
    fn candidates_exclude_reserved_keys() {
        assert_eq!(candidates(), vec!["OBJECTID", "Species"]);
    }

    #[test]
    fn declined_binding() {
        let binding = resolve(&symbols(), &candidates(), SymbolChoice::Decline).expect("binding");
        assert_eq!(binding, SymbolBinding::points());
        assert!(!binding.use_symbol);
    }

    #[test]
    fn unknown_symbol() {
        let choice = SymbolChoice::Use {
            symbol: "Lamp".into(),
            label_attribute: None,
        };
        assert_matches!(
            resolve(&symbols(), &candidates(), choice),
            Err(CadgisError::UnknownSymbol(name)) if name == "Lamp"
        );
    }

    #[test]
    fn symbol_without_slots_ignores_attribute() {
        let choice = SymbolChoice::Use {
            symbol: "Gully".into(),
            label_attribute: Some("Species".into()),
        };
        assert_eq!(
            resolve(&symbols(), &candidates(), choice).expect("binding"),
            SymbolBinding::symbol("Gully", None)
        );
    }

    #[test]
    fn label_attribute_is_validated() {
        let choice = SymbolChoice::Use {
            symbol: "Tree".into(),
            label_attribute: Some("species".into()),
        };
        assert_eq!(
            resolve(&symbols(), &candidates(), choice).expect("binding"),
            SymbolBinding::symbol("Tree", Some("Species".into()))
        );

        let choice = SymbolChoice::Use {
            symbol: "Tree".into(),
            label_attribute: Some("ESRI_OID".into()),
        };
        assert_matches!(
            resolve(&symbols(), &candidates(), choice),
            Err(CadgisError::InvalidLabelAttribute { attribute, available })
                if attribute == "ESRI_OID" && available.len() == 2
        );
    }

    #[test]
    fn missing_attribute_keeps_default_text() {
        let choice = SymbolChoice::Use {
            symbol: "Tree".into(),
            label_attribute: None,
        };
        assert_eq!(
            resolve(&symbols(), &candidates(), choice).expect("binding"),
            SymbolBinding::symbol("Tree", None)
        );
    }

    #[test]
    fn library_is_loaded_once() {
        let mut drawing = Drawing::new();
        let mut library = SymbolLibrary::new();
        let count = standard_symbols().expect("bundled symbols").len();

        let mut transaction = Transaction::begin(&mut drawing).expect("begin");
        transaction
            .define_symbol(SymbolDefinition {
                name: "Tree".into(),
                label_slots: vec![],
            })
            .expect("defined");
        assert_eq!(library.ensure_loaded(&mut *transaction).ok(), Some(count - 1));
        assert_eq!(library.ensure_loaded(&mut *transaction).ok(), Some(0));
        transaction.commit().expect("commit");

        assert!(library.is_loaded());
        assert_eq!(drawing.symbols().len(), count);
        assert_eq!(
            drawing.symbol("Tree").map(|s| s.label_slots.len()),
            Some(0)
        );
    }
}
