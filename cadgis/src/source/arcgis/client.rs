use async_trait::async_trait;
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::geometry::parse_geometry;
use super::model::{
    check_envelope, ContentResponse, EsriFeature, Field, Folder, Item, ItemDetails, QueryResponse,
    ServiceInfo, ServiceLayer, ServiceLayers, TokenResponse, UserInfo,
};
use crate::config::ArcGisSettings;
use crate::error::CadgisError;
use crate::feature::{AttributeValue, Attributes, FeatureRecord};
use crate::source::{FeatureBatch, FeatureSource};

/// Coordinate system assumed when a layer does not report one.
pub const DEFAULT_SOURCE_EPSG: i32 = 3857;

/// Client of a portal and the feature services it hosts.
#[derive(Debug, Clone)]
pub struct ArcGisClient {
    http: reqwest::Client,
    settings: ArcGisSettings,
    token: Option<String>,
}

impl ArcGisClient {
    /// Creates a client. No request is made until [`ArcGisClient::login`] is called.
    pub fn new(settings: ArcGisSettings) -> Result<Self, CadgisError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("cadgis/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            settings,
            token: None,
        })
    }

    /// Requests an access token with the credentials from the settings.
    pub async fn login(&mut self) -> Result<(), CadgisError> {
        let (username, password) = self.settings.credentials()?;
        let url = format!("{}/generateToken", self.settings.portal_url);
        let expiration = self.settings.token_expiration.to_string();
        let form = [
            ("username", username),
            ("password", password),
            ("referer", self.settings.referer.as_str()),
            ("expiration", expiration.as_str()),
            ("f", "json"),
        ];

        let response: TokenResponse = self.send(self.http.post(&url).form(&form)).await?;
        match response.token.filter(|token| !token.trim().is_empty()) {
            Some(token) => {
                log::info!("Logged in to {} as {username}", self.settings.portal_url);
                self.token = Some(token);
                Ok(())
            }
            None => Err(CadgisError::Connection(
                "login failed, check the credentials".into(),
            )),
        }
    }

    /// Returns true if a token was obtained.
    pub fn is_logged_in(&self) -> bool {
        self.token.is_some()
    }

    /// Folders of the user's content. The root folder comes first.
    pub async fn folders(&self) -> Result<Vec<Folder>, CadgisError> {
        let content = self.content(None).await?;
        let mut folders = Vec::with_capacity(content.folders.len() + 1);
        folders.push(Folder::root());
        folders.extend(content.folders);
        Ok(folders)
    }

    /// Feature services in the folder. An empty id is the root folder.
    pub async fn feature_services(&self, folder_id: &str) -> Result<Vec<Item>, CadgisError> {
        let folder = Some(folder_id).filter(|id| !id.is_empty());
        let content = self.content(folder).await?;
        Ok(content
            .items
            .into_iter()
            .filter(Item::is_feature_service)
            .collect())
    }

    /// Url and layers of a feature service item.
    pub async fn service_info(&self, item_id: &str) -> Result<ServiceInfo, CadgisError> {
        let details: ItemDetails = self
            .get(&format!("{}/content/items/{item_id}", self.settings.portal_url))
            .await?;
        let Some(url) = details.url.filter(|url| !url.is_empty()) else {
            return Err(CadgisError::Query(format!(
                "item {item_id} has no service url"
            )));
        };

        let url = url.trim_end_matches('/').to_string();
        let layers: ServiceLayers = self.get(&url).await?;
        Ok(ServiceInfo {
            title: details.title,
            url,
            layers: layers.layers,
        })
    }

    /// Reads all features of a service layer, page by page.
    pub async fn query_layer(
        &self,
        service_url: &str,
        layer: &ServiceLayer,
        layer_name: &str,
    ) -> Result<FeatureBatch, CadgisError> {
        let url = format!("{service_url}/{}/query", layer.id);
        let page_size = self.settings.page_size.max(1);
        let mut pages = vec![];

        for page in 0..self.settings.max_pages.max(1) {
            let offset = (page * page_size).to_string();
            let count = page_size.to_string();
            let request = self.authorized(self.http.get(&url)).query(&[
                ("where", "1=1"),
                ("outFields", "*"),
                ("returnGeometry", "true"),
                ("resultOffset", offset.as_str()),
                ("resultRecordCount", count.as_str()),
            ]);

            let response: QueryResponse = self.send(request).await?;
            let more = response.exceeded_transfer_limit && !response.features.is_empty();
            log::debug!(
                "Layer '{layer_name}': page {page} has {} features",
                response.features.len()
            );
            pages.push(response);

            if !more {
                return Ok(batch_from_pages(layer_name, layer, pages));
            }
        }

        log::warn!(
            "Layer '{layer_name}' has more than {} pages, the rest of the features is not read",
            self.settings.max_pages
        );
        Ok(batch_from_pages(layer_name, layer, pages))
    }

    async fn content(&self, folder_id: Option<&str>) -> Result<ContentResponse, CadgisError> {
        let user: UserInfo = self
            .get(&format!("{}/community/self", self.settings.portal_url))
            .await?;
        let url = match folder_id {
            Some(folder) => format!(
                "{}/content/users/{}/{folder}",
                self.settings.portal_url, user.username
            ),
            None => format!("{}/content/users/{}", self.settings.portal_url, user.username),
        };

        self.get(&url).await
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.query(&[("f", "json")]);
        match &self.token {
            Some(token) => request.query(&[("token", token)]),
            None => request,
        }
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T, CadgisError> {
        if self.token.is_none() {
            return Err(CadgisError::Connection("not logged in".into()));
        }

        self.send(self.authorized(self.http.get(url))).await
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, CadgisError> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CadgisError::Connection(format!(
                "{} returned {status}",
                response.url()
            )));
        }

        let value: Value = response.json().await?;
        serde_json::from_value(check_envelope(value)?)
            .map_err(|err| CadgisError::Query(format!("unexpected response: {err}")))
    }
}

/// Request for one layer of a feature service.
#[derive(Debug, Clone)]
pub struct LayerRequest {
    /// Service root url.
    pub service_url: String,
    /// Title of the service item, used to name unnamed layers.
    pub service_title: String,
    /// The layer.
    pub layer: ServiceLayer,
}

#[async_trait]
impl FeatureSource for ArcGisClient {
    type Request = LayerRequest;

    async fn fetch(&self, request: &LayerRequest) -> Result<FeatureBatch, CadgisError> {
        let layer_name = request.layer.layer_name(&request.service_title);
        self.query_layer(&request.service_url, &request.layer, &layer_name)
            .await
            .map_err(|err| err.in_layer(&layer_name))
    }
}

/// Walks all layers of a feature service.
#[derive(Debug)]
pub struct ServiceWalker<'a> {
    client: &'a ArcGisClient,
}

impl<'a> ServiceWalker<'a> {
    /// Walker that uses the given logged in client.
    pub fn new(client: &'a ArcGisClient) -> Self {
        Self { client }
    }

    /// Reads every layer of the service item. Layers without features give empty batches.
    pub async fn fetch_service(&self, item_id: &str) -> Result<Vec<FeatureBatch>, CadgisError> {
        let service = self.client.service_info(item_id).await?;
        if service.layers.is_empty() {
            log::warn!("Service '{}' has no layers", service.title);
        }

        let mut batches = Vec::with_capacity(service.layers.len());
        for layer in service.layers {
            let request = LayerRequest {
                service_url: service.url.clone(),
                service_title: service.title.clone(),
                layer,
            };
            batches.push(self.client.fetch(&request).await?);
        }

        Ok(batches)
    }
}

pub(crate) fn batch_from_pages(
    layer_name: &str,
    layer: &ServiceLayer,
    pages: Vec<QueryResponse>,
) -> FeatureBatch {
    let declared = layer
        .geometry_type
        .clone()
        .or_else(|| pages.iter().find_map(|page| page.geometry_type.clone()));
    let source_epsg = pages
        .iter()
        .find_map(|page| page.spatial_reference.and_then(|sr| sr.epsg()))
        .unwrap_or(DEFAULT_SOURCE_EPSG);

    let mut features = vec![];
    for page in pages {
        for feature in page.features {
            features.push(convert_feature(layer_name, feature, &page.fields, page.has_z));
        }
    }

    FeatureBatch::new(layer_name, declared.as_deref(), source_epsg, features)
}

fn convert_feature(
    layer_name: &str,
    feature: EsriFeature,
    fields: &[Field],
    has_z: bool,
) -> FeatureRecord {
    let attributes: Attributes = feature
        .attributes
        .iter()
        .map(|(key, value)| {
            let is_date = fields.iter().any(|f| f.name == *key && f.is_date());
            let value = match (is_date, value.as_i64()) {
                (true, Some(millis)) => AttributeValue::from_epoch_millis(millis),
                _ => AttributeValue::from_json(value),
            };
            (key.clone(), value)
        })
        .collect();

    let geometry = match feature.geometry.as_ref().map(|g| parse_geometry(g, has_z)) {
        None => None,
        Some(Ok(geometry)) => geometry.and_then(|g| g.non_degenerate()),
        Some(Err(err)) => {
            log::warn!("Layer '{layer_name}': feature geometry is ignored: {err}");
            None
        }
    };

    FeatureRecord::new(attributes, geometry)
}

#[cfg(test)]
mod tests {
    use cadgis_types::{Geom, GeometryKind};
    use serde_json::json;

    use super::*;

    fn page(value: Value) -> QueryResponse {
        serde_json::from_value(value).expect("valid page")
    }

    #[test]
    fn pages_make_one_batch() {
        let layer = ServiceLayer {
            id: 0,
            name: None,
            geometry_type: None,
        };
        let first = page(json!({
            "geometryType": "esriGeometryPoint",
            "spatialReference": {"wkid": 27700},
            "fields": [{"name": "planted", "type": "esriFieldTypeDate"}],
            "features": [
                {"attributes": {"OBJECTID": 1, "planted": 1700000000000_i64}, "geometry": {"x": 1.0, "y": 2.0}},
                {"attributes": {"OBJECTID": 2, "planted": null}, "geometry": {"paths": "bad"}}
            ],
            "exceededTransferLimit": true
        }));
        let second = page(json!({
            "features": [
                {"attributes": {"OBJECTID": 3}}
            ]
        }));

        let batch = batch_from_pages("Trees", &layer, vec![first, second]);
        assert_eq!(batch.layer_name, "Trees");
        assert_eq!(batch.kind, GeometryKind::Point);
        assert_eq!(batch.source_epsg, 27700);
        assert_eq!(batch.features.len(), 3);
        assert!(matches!(batch.features[0].geometry, Some(Geom::Point(_))));
        assert!(batch.features[1].geometry.is_none());
        assert!(batch.features[2].geometry.is_none());
        assert_eq!(
            batch.features[0]
                .attributes
                .get("planted")
                .map(ToString::to_string),
            Some("2023-11-14T22:13:20Z".to_string())
        );
        assert_eq!(
            batch.features[1].attributes.get("planted"),
            Some(&AttributeValue::Null)
        );
    }

    #[test]
    fn default_source_system() {
        let layer = ServiceLayer {
            id: 1,
            name: Some("Roads".into()),
            geometry_type: Some("esriGeometryPolyline".into()),
        };
        let batch = batch_from_pages("Roads", &layer, vec![page(json!({"features": []}))]);

        assert!(batch.is_empty());
        assert_eq!(batch.source_epsg, DEFAULT_SOURCE_EPSG);
        assert_eq!(batch.kind, GeometryKind::Line);
    }

    #[tokio::test]
    async fn requests_require_login() {
        let client = ArcGisClient::new(ArcGisSettings::default()).expect("client");
        assert!(!client.is_logged_in());
        assert!(matches!(
            client.folders().await,
            Err(CadgisError::Connection(_))
        ));

        let mut client = ArcGisClient::new(ArcGisSettings::default()).expect("client");
        assert!(matches!(client.login().await, Err(CadgisError::Settings(_))));
    }
}
