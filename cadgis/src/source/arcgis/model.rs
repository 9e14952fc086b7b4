//! JSON documents of the portal and feature service REST API.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CadgisError;

/// Error codes the services use for invalid and missing tokens.
const AUTH_ERROR_CODES: [i64; 2] = [498, 499];

#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UserInfo {
    pub username: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ContentResponse {
    pub folders: Vec<Folder>,
    pub items: Vec<Item>,
}

/// Folder of the user's content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    /// Folder id. Empty for the root folder.
    #[serde(default)]
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub title: String,
}

impl Folder {
    /// The root of the user's content, which is not listed among the folders.
    pub fn root() -> Self {
        Self {
            id: String::new(),
            title: "Root".into(),
        }
    }
}

/// Content item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Item id.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub title: String,
    /// Item type, e.g. `Feature Service`.
    #[serde(default, rename = "type")]
    pub item_type: String,
}

impl Item {
    /// Returns true if the item is a feature service.
    pub fn is_feature_service(&self) -> bool {
        self.item_type.eq_ignore_ascii_case("Feature Service")
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ItemDetails {
    pub url: Option<String>,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ServiceLayers {
    pub layers: Vec<ServiceLayer>,
}

/// A feature service with its layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInfo {
    /// Item title.
    pub title: String,
    /// Service root url.
    pub url: String,
    /// Layers of the service.
    pub layers: Vec<ServiceLayer>,
}

/// Layer of a feature service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceLayer {
    /// Layer id inside the service.
    pub id: i64,
    /// Layer name.
    #[serde(default)]
    pub name: Option<String>,
    /// Declared geometry type, e.g. `esriGeometryPoint`.
    #[serde(default)]
    pub geometry_type: Option<String>,
}

impl ServiceLayer {
    /// Name of the drawing layer: the layer name, or `{service title}_{id}` if the layer has no
    /// name.
    pub fn layer_name(&self, service_title: &str) -> String {
        match self.name.as_deref().filter(|name| !name.trim().is_empty()) {
            Some(name) => name.to_string(),
            None => format!("{service_title}_{}", self.id),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct QueryResponse {
    pub geometry_type: Option<String>,
    pub spatial_reference: Option<SpatialReference>,
    pub has_z: bool,
    pub fields: Vec<Field>,
    pub features: Vec<EsriFeature>,
    pub exceeded_transfer_limit: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SpatialReference {
    pub wkid: Option<i32>,
    pub latest_wkid: Option<i32>,
}

impl SpatialReference {
    pub fn epsg(&self) -> Option<i32> {
        self.latest_wkid.or(self.wkid)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Field {
    pub name: String,
    #[serde(default, rename = "type")]
    pub field_type: String,
}

impl Field {
    pub fn is_date(&self) -> bool {
        self.field_type == "esriFieldTypeDate"
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct EsriFeature {
    pub attributes: Map<String, Value>,
    pub geometry: Option<Value>,
}

/// Splits a service response into its payload and the error envelope.
///
/// Services report most failures with status 200 and a body of the form
/// `{"error": {"code": 400, "message": "..."}}`.
pub(crate) fn check_envelope(value: Value) -> Result<Value, CadgisError> {
    let Some(error) = value.get("error") else {
        return Ok(value);
    };

    let code = error.get("code").and_then(Value::as_i64);
    let mut message = error
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string();
    if let Some(details) = error.get("details").and_then(Value::as_array) {
        let details: Vec<_> = details.iter().filter_map(Value::as_str).collect();
        if !details.is_empty() {
            message = format!("{message} ({})", details.join("; "));
        }
    }

    let message = match code {
        Some(code) => format!("{message} [code {code}]"),
        None => message,
    };

    match code {
        Some(code) if AUTH_ERROR_CODES.contains(&code) => Err(CadgisError::Connection(message)),
        _ => Err(CadgisError::Query(message)),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    #[test]
    fn error_envelopes() {
        let ok = check_envelope(json!({"layers": []}));
        assert_matches!(ok, Ok(value) if value["layers"].is_array());

        let invalid_token = json!({"error": {"code": 498, "message": "Invalid token.", "details": []}});
        assert_matches!(
            check_envelope(invalid_token),
            Err(CadgisError::Connection(msg)) if msg == "Invalid token. [code 498]"
        );

        let bad_query = json!({"error": {"code": 400, "message": "Unable to complete operation.", "details": ["Invalid where clause"]}});
        assert_matches!(
            check_envelope(bad_query),
            Err(CadgisError::Query(msg)) if msg.contains("Invalid where clause")
        );
    }

    #[test]
    fn content_listing() {
        let content: ContentResponse = serde_json::from_value(json!({
            "username": "surveyor",
            "folders": [{"id": "f1", "title": "Utilities"}],
            "items": [
                {"id": "a", "title": "Trees", "type": "Feature Service"},
                {"id": "b", "title": "Basemap", "type": "Vector Tile Service"},
                {"id": "c", "title": "Drains", "type": "feature service"}
            ]
        }))
        .expect("parsed");

        assert_eq!(content.folders.len(), 1);
        let services: Vec<_> = content
            .items
            .iter()
            .filter(|item| item.is_feature_service())
            .map(|item| item.id.as_str())
            .collect();
        assert_eq!(services, vec!["a", "c"]);
    }

    #[test]
    fn layer_names() {
        let named = ServiceLayer {
            id: 0,
            name: Some("Trees".into()),
            geometry_type: None,
        };
        let unnamed = ServiceLayer {
            id: 3,
            name: None,
            geometry_type: None,
        };
        assert_eq!(named.layer_name("Survey"), "Trees");
        assert_eq!(unnamed.layer_name("Survey"), "Survey_3");
    }

    #[test]
    fn spatial_reference() {
        let response: QueryResponse = serde_json::from_value(json!({
            "geometryType": "esriGeometryPoint",
            "spatialReference": {"wkid": 102100, "latestWkid": 3857},
            "fields": [{"name": "planted", "type": "esriFieldTypeDate"}],
            "features": [],
            "exceededTransferLimit": true
        }))
        .expect("parsed");

        assert_eq!(response.spatial_reference.and_then(|sr| sr.epsg()), Some(3857));
        assert!(response.exceeded_transfer_limit);
        assert!(response.fields[0].is_date());
        assert!(!response.has_z);
    }
}
