//! Axum lookup service: cached coaster stats merged into live upstream records.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::{header, HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use coaster_adapters::{CoasterApi, HttpCoasterApi, UpstreamError, DEFAULT_API_BASE};
use coaster_core::{CoasterId, CoasterRecord, ImageManifest, StatName, StatTable, StatTables};
use coaster_storage::{read_json_file, HttpClientConfig};
use coaster_sync::IMAGE_MANIFEST_FILE;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;
use serde_json::{json, Map, Value as JsonValue};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tracing::{debug, info, warn};

pub const CRATE_NAME: &str = "coaster-web";

#[derive(Debug, Clone)]
pub struct LookupConfig {
    pub api_base: String,
    pub data_dir: PathBuf,
    pub images_dir: PathBuf,
    pub image_base_url: String,
    pub cache_max_age_secs: u64,
    pub cache_swr_secs: u64,
    pub port: u16,
    pub user_agent: String,
    pub http_timeout_secs: u64,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            data_dir: PathBuf::from("./data"),
            images_dir: PathBuf::from("./data/images"),
            image_base_url: "/images".to_string(),
            cache_max_age_secs: 3600,
            cache_swr_secs: 86_400,
            port: 8000,
            user_agent: "coaster-stats-lookup/0.1".to_string(),
            http_timeout_secs: 30,
        }
    }
}

impl LookupConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_base: std::env::var("COASTER_API_BASE").unwrap_or(defaults.api_base),
            data_dir: std::env::var("COASTER_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            images_dir: std::env::var("COASTER_IMAGES_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.images_dir),
            image_base_url: std::env::var("COASTER_IMAGE_BASE_URL")
                .unwrap_or(defaults.image_base_url),
            cache_max_age_secs: std::env::var("COASTER_CACHE_MAX_AGE_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.cache_max_age_secs),
            cache_swr_secs: std::env::var("COASTER_CACHE_SWR_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.cache_swr_secs),
            port: std::env::var("COASTER_WEB_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.port),
            user_agent: std::env::var("COASTER_USER_AGENT").unwrap_or(defaults.user_agent),
            http_timeout_secs: std::env::var("COASTER_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.http_timeout_secs),
        }
    }

    pub fn http_client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            timeout: Duration::from_secs(self.http_timeout_secs),
            user_agent: Some(self.user_agent.clone()),
            concurrency: 64,
        }
    }

    pub fn cache_control(&self) -> String {
        format!(
            "public, max-age={}, stale-while-revalidate={}",
            self.cache_max_age_secs, self.cache_swr_secs
        )
    }
}

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("no coaster data is loaded")]
    NoData,
    #[error("no coasters found for statistic `{stat}`")]
    UnknownStat { stat: String },
    #[error("coaster `{id}` not found")]
    UnknownCoaster { id: String },
    #[error("expected the random route, a `stat` query or an `id` query")]
    InvalidRequest,
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

impl LookupError {
    pub fn status(&self) -> StatusCode {
        match self {
            LookupError::NoData => StatusCode::INTERNAL_SERVER_ERROR,
            LookupError::UnknownStat { .. } | LookupError::UnknownCoaster { .. } => {
                StatusCode::NOT_FOUND
            }
            LookupError::InvalidRequest => StatusCode::BAD_REQUEST,
            LookupError::Upstream(err) => {
                StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::BAD_GATEWAY)
            }
        }
    }
}

impl IntoResponse for LookupError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Which coaster a request asks for. Checked in field order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupRequest {
    pub random: bool,
    pub stat: Option<String>,
    pub id: Option<String>,
}

impl LookupRequest {
    pub fn random() -> Self {
        Self {
            random: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct LookupQuery {
    stat: Option<String>,
    id: Option<String>,
}

impl From<LookupQuery> for LookupRequest {
    fn from(query: LookupQuery) -> Self {
        Self {
            random: false,
            stat: query.stat.filter(|s| !s.trim().is_empty()),
            id: query.id.filter(|s| !s.trim().is_empty()),
        }
    }
}

/// Stat tables and image manifest loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct LookupData {
    stats: StatTables,
    images: ImageManifest,
    known_ids: Vec<CoasterId>,
    stat_ids: BTreeMap<StatName, Vec<CoasterId>>,
}

impl LookupData {
    pub fn new(stats: StatTables, images: ImageManifest) -> Self {
        let known_ids = stats.known_ids().into_iter().collect();
        let stat_ids = stats
            .non_empty()
            .map(|(stat, table)| (stat, table.keys().copied().collect()))
            .collect();
        Self {
            stats,
            images,
            known_ids,
            stat_ids,
        }
    }

    /// Read every persisted table from `data_dir`. Missing files load as empty tables and
    /// unreadable ones are skipped with a warning.
    pub async fn load(data_dir: &Path) -> Self {
        let mut stats = StatTables::new();
        for stat in StatName::ALL {
            let path = data_dir.join(stat.file_name());
            match read_json_file::<StatTable>(&path).await {
                Ok(Some(table)) => stats.replace_table(stat, table),
                Ok(None) => debug!(path = %path.display(), "no table for stat"),
                Err(err) => {
                    let message = format!("{err:#}");
                    warn!(path = %path.display(), error = %message, "skipping unreadable stat table");
                }
            }
        }

        let manifest_path = data_dir.join(IMAGE_MANIFEST_FILE);
        let images = match read_json_file::<ImageManifest>(&manifest_path).await {
            Ok(manifest) => manifest.unwrap_or_default(),
            Err(err) => {
                let message = format!("{err:#}");
                warn!(path = %manifest_path.display(), error = %message, "skipping unreadable image manifest");
                ImageManifest::new()
            }
        };

        let data = Self::new(stats, images);
        info!(
            known_coasters = data.known_ids.len(),
            tables = data.stat_ids.len(),
            images = data.images.len(),
            "lookup data loaded"
        );
        data
    }

    pub fn known_ids(&self) -> &[CoasterId] {
        &self.known_ids
    }

    pub fn is_empty(&self) -> bool {
        self.known_ids.is_empty()
    }

    /// Pick the coaster ID a request refers to, without touching upstream.
    pub fn resolve<R: Rng + ?Sized>(
        &self,
        request: &LookupRequest,
        rng: &mut R,
    ) -> Result<CoasterId, LookupError> {
        if self.known_ids.is_empty() {
            return Err(LookupError::NoData);
        }

        if request.random {
            return self.known_ids.choose(rng).copied().ok_or(LookupError::NoData);
        }

        if let Some(stat) = &request.stat {
            return stat
                .parse::<StatName>()
                .ok()
                .and_then(|name| self.stat_ids.get(&name))
                .and_then(|ids| ids.choose(rng).copied())
                .ok_or_else(|| LookupError::UnknownStat { stat: stat.clone() });
        }

        if let Some(raw) = &request.id {
            return raw
                .parse::<CoasterId>()
                .ok()
                .filter(|id| id.to_string() == *raw)
                .filter(|id| self.known_ids.binary_search(id).is_ok())
                .ok_or_else(|| LookupError::UnknownCoaster { id: raw.clone() });
        }

        Err(LookupError::InvalidRequest)
    }

    /// Live record plus `imageUrl` and the cached `stats` for `id`.
    pub fn merge(&self, id: CoasterId, record: CoasterRecord, image_base_url: &str) -> JsonValue {
        let image_url = match self.images.get(&id) {
            Some(file_name) => Some(format!(
                "{}/{}",
                image_base_url.trim_end_matches('/'),
                file_name
            )),
            None => record.picture_url().map(ToString::to_string),
        };
        let stats = self
            .stats
            .stats_for(id)
            .into_iter()
            .map(|(stat, value)| {
                let value = serde_json::to_value(value).unwrap_or(JsonValue::Null);
                (stat.as_str().to_string(), value)
            })
            .collect::<Map<_, _>>();

        let mut body = record.into_fields();
        body.insert(
            "imageUrl".to_string(),
            image_url.map_or(JsonValue::Null, JsonValue::String),
        );
        body.insert("stats".to_string(), JsonValue::Object(stats));
        JsonValue::Object(body)
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: LookupConfig,
    pub data: LookupData,
    pub api: Arc<dyn CoasterApi>,
}

impl AppState {
    pub fn new(config: LookupConfig, data: LookupData, api: Arc<dyn CoasterApi>) -> Self {
        Self { config, data, api }
    }
}

pub fn app(state: AppState) -> Router {
    let state = Arc::new(state);
    Router::new()
        .route("/api/coasters", get(coaster_handler))
        .route("/api/coasters/random", get(random_coaster_handler))
        .nest_service("/images", ServeDir::new(&state.config.images_dir))
        .route("/health", get(health_handler))
        .layer(middleware::map_response_with_state(
            state.clone(),
            lookup_headers,
        ))
        .with_state(state)
}

pub async fn serve_from_env() -> anyhow::Result<()> {
    let config = LookupConfig::from_env();
    let api = HttpCoasterApi::new(config.api_base.clone(), config.http_client_config())?;
    let data = LookupData::load(&config.data_dir).await;
    if data.is_empty() {
        warn!(data_dir = %config.data_dir.display(), "no coaster data loaded; lookups will fail");
    }

    let port = config.port;
    let state = AppState::new(config, data, Arc::new(api));
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "lookup service listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

/// Resolve, re-fetch live and merge. The cache never stands in for the live record.
pub async fn lookup_coaster(
    state: &AppState,
    request: &LookupRequest,
) -> Result<JsonValue, LookupError> {
    let id = {
        let mut rng = rand::thread_rng();
        state.data.resolve(request, &mut rng)?
    };
    let record = state.api.fetch_coaster(id).await.map_err(|err| {
        if !err.is_not_found() {
            warn!(id, error = %err, "live fetch failed");
        }
        err
    })?;
    Ok(state.data.merge(id, record, &state.config.image_base_url))
}

async fn coaster_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LookupQuery>,
) -> Response {
    respond(&state, LookupRequest::from(query)).await
}

async fn random_coaster_handler(State(state): State<Arc<AppState>>) -> Response {
    respond(&state, LookupRequest::random()).await
}

async fn respond(state: &AppState, request: LookupRequest) -> Response {
    match lookup_coaster(state, &request).await {
        Ok(body) => Json(body).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Response {
    Json(json!({
        "status": "ok",
        "knownCoasters": state.data.known_ids().len(),
    }))
    .into_response()
}

async fn lookup_headers(State(state): State<Arc<AppState>>, mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    if let Ok(value) = HeaderValue::from_str(&state.config.cache_control()) {
        headers.insert(header::CACHE_CONTROL, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use coaster_adapters::FixtureCoasterApi;
    use coaster_core::StatValue;
    use coaster_storage::write_json_file;
    use http_body_util::BodyExt;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tower::ServiceExt;

    fn sample_tables() -> (StatTables, ImageManifest) {
        let mut stats = StatTables::new();
        stats.insert(StatName::Name, 1, "Millennium Force".into());
        stats.insert(StatName::Height, 1, 310.0.into());
        stats.insert(StatName::Name, 2, "Dueling Dragons".into());
        stats.insert(StatName::Speed, 2, 55.0.into());
        stats.insert(StatName::Name, 3, "Wooden Wonder".into());
        stats.insert(StatName::Height, 3, 98.5.into());
        stats.insert(StatName::Name, 4, "Gone Coaster".into());
        let images = [(1, "1.png".to_string())].into();
        (stats, images)
    }

    fn sample_api() -> FixtureCoasterApi {
        FixtureCoasterApi::new()
            .with_record(
                1,
                json!({
                    "id": 1,
                    "name": "Millennium Force",
                    "make": "Intamin",
                    "stats": {"height": "310 ft", "elements": ["Airtime"]},
                    "mainPicture": {"url": "https://img.example/mf.jpg"}
                }),
            )
            .with_record(
                2,
                json!({"id": 2, "name": "Dueling Dragons", "mainPicture": {"url": "https://img.example/dd.jpg"}}),
            )
            .with_record(3, json!({"id": 3, "name": "Wooden Wonder"}))
            .with_status(4, 503)
    }

    fn state_with(api: Arc<FixtureCoasterApi>, images_dir: PathBuf) -> AppState {
        let (stats, images) = sample_tables();
        let config = LookupConfig {
            images_dir,
            ..LookupConfig::default()
        };
        AppState::new(config, LookupData::new(stats, images), api)
    }

    async fn send(app: Router, uri: &str) -> Response {
        app.oneshot(axum::http::Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, JsonValue) {
        let resp = send(app, uri).await;
        let status = resp.status();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[test]
    fn stat_lookup_always_lands_on_a_coaster_with_that_stat() {
        let (stats, images) = sample_tables();
        let data = LookupData::new(stats, images);
        let mut rng = StdRng::seed_from_u64(7);
        let request = LookupRequest {
            stat: Some("height".into()),
            ..LookupRequest::default()
        };
        for _ in 0..500 {
            let id = data.resolve(&request, &mut rng).unwrap();
            assert!(data.stats.value(StatName::Height, id).is_some());
        }

        let mut seen = std::collections::BTreeSet::new();
        for _ in 0..500 {
            seen.insert(data.resolve(&LookupRequest::random(), &mut rng).unwrap());
        }
        assert_eq!(seen.into_iter().collect::<Vec<_>>(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn resolution_order_and_failures() {
        let (stats, images) = sample_tables();
        let data = LookupData::new(stats, images);
        let mut rng = StdRng::seed_from_u64(1);

        let both = LookupRequest {
            stat: Some("speed".into()),
            id: Some("1".into()),
            ..LookupRequest::default()
        };
        assert_eq!(data.resolve(&both, &mut rng).unwrap(), 2);

        let by_id = LookupRequest {
            id: Some("3".into()),
            ..LookupRequest::default()
        };
        assert_eq!(data.resolve(&by_id, &mut rng).unwrap(), 3);

        let unknown_stat = LookupRequest {
            stat: Some("drop".into()),
            ..LookupRequest::default()
        };
        assert!(matches!(
            data.resolve(&unknown_stat, &mut rng),
            Err(LookupError::UnknownStat { .. })
        ));

        for raw in ["99", "abc", "-1", "03", "+3", " 3", "3 "] {
            let request = LookupRequest {
                id: Some(raw.into()),
                ..LookupRequest::default()
            };
            assert!(matches!(
                data.resolve(&request, &mut rng),
                Err(LookupError::UnknownCoaster { .. })
            ));
        }

        assert!(matches!(
            data.resolve(&LookupRequest::default(), &mut rng),
            Err(LookupError::InvalidRequest)
        ));
        assert!(matches!(
            LookupData::default().resolve(&LookupRequest::random(), &mut rng),
            Err(LookupError::NoData)
        ));
    }

    #[tokio::test]
    async fn local_image_wins_over_live_picture() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(state_with(Arc::new(sample_api()), dir.path().to_path_buf()));

        let (status, body) = get_json(app.clone(), "/api/coasters?id=1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["imageUrl"], json!("/images/1.png"));
        assert_eq!(body["make"], json!("Intamin"));
        assert_eq!(body["stats"], json!({"name": "Millennium Force", "height": 310}));

        let (_, body) = get_json(app.clone(), "/api/coasters?id=2").await;
        assert_eq!(body["imageUrl"], json!("https://img.example/dd.jpg"));
        assert_eq!(body["stats"], json!({"name": "Dueling Dragons", "speed": 55}));

        let (_, body) = get_json(app, "/api/coasters?id=3").await;
        assert_eq!(body["imageUrl"], JsonValue::Null);
        assert_eq!(body["stats"]["height"], json!(98.5));
    }

    #[tokio::test]
    async fn live_fields_pass_through_even_when_null_or_oddly_shaped() {
        let dir = tempfile::tempdir().unwrap();
        let live = json!({
            "id": 3,
            "name": "Wooden Wonder",
            "park": "Lakeside",
            "mainPicture": null,
            "country": null,
            "status": {"state": "Operating", "date": {"opened": "2000", "closed": null}}
        });
        let api = Arc::new(FixtureCoasterApi::new().with_record(3, live.clone()));
        let app = app(state_with(api, dir.path().to_path_buf()));

        let (status, body) = get_json(app, "/api/coasters?id=3").await;
        assert_eq!(status, StatusCode::OK);
        let mut expected = live;
        expected["imageUrl"] = JsonValue::Null;
        expected["stats"] = json!({"name": "Wooden Wonder", "height": 98.5});
        assert_eq!(body, expected);
    }

    #[tokio::test]
    async fn unknown_id_is_rejected_before_upstream() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(sample_api());
        let app = app(state_with(api.clone(), dir.path().to_path_buf()));

        let (status, body) = get_json(app.clone(), "/api/coasters?id=12345").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("12345"));

        let (status, _) = get_json(app.clone(), "/api/coasters?stat=inversions").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = get_json(app, "/api/coasters?stat=bogus").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(api.coaster_calls(), 0);
    }

    #[tokio::test]
    async fn upstream_failures_pass_their_status_through() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(FixtureCoasterApi::new().with_status(4, 503));
        let app = app(state_with(api.clone(), dir.path().to_path_buf()));

        let (status, body) = get_json(app.clone(), "/api/coasters?id=4").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body["error"].is_string());

        let (status, _) = get_json(app, "/api/coasters?id=1").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(api.coaster_calls(), 2);
    }

    #[tokio::test]
    async fn requests_without_a_known_shape_are_bad_requests() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(state_with(Arc::new(sample_api()), dir.path().to_path_buf()));
        let (status, _) = get_json(app.clone(), "/api/coasters").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = get_json(app, "/api/coasters?stat=&id=").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn empty_data_answers_500_on_every_route() {
        let api = Arc::new(sample_api());
        let state = AppState::new(LookupConfig::default(), LookupData::default(), api.clone());
        let app = app(state);
        for uri in [
            "/api/coasters/random",
            "/api/coasters?stat=height",
            "/api/coasters?id=1",
            "/api/coasters",
        ] {
            let (status, body) = get_json(app.clone(), uri).await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "{uri}");
            assert!(body["error"].is_string());
        }
        assert_eq!(api.coaster_calls(), 0);
    }

    #[tokio::test]
    async fn responses_carry_cors_and_cache_headers() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(state_with(Arc::new(sample_api()), dir.path().to_path_buf()));
        for uri in ["/api/coasters/random", "/api/coasters?id=999"] {
            let resp = app
                .clone()
                .oneshot(axum::http::Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(resp.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
            assert_eq!(
                resp.headers()[header::CACHE_CONTROL],
                "public, max-age=3600, stale-while-revalidate=86400"
            );
        }
    }

    #[tokio::test]
    async fn cached_images_are_served_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let images_dir = dir.path().join("images");
        std::fs::create_dir_all(&images_dir).unwrap();
        std::fs::write(images_dir.join("1.png"), b"\x89PNG").unwrap();
        std::fs::write(dir.path().join("secret.txt"), b"keep out").unwrap();
        let app = app(state_with(Arc::new(sample_api()), images_dir));

        let resp = send(app.clone(), "/images/1.png").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/png");
        assert_eq!(resp.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"\x89PNG");

        for uri in ["/images/..%2Fsecret.txt", "/images/2.jpg"] {
            let resp = send(app.clone(), uri).await;
            assert_eq!(resp.status(), StatusCode::NOT_FOUND, "{uri}");
        }
    }

    #[tokio::test]
    async fn load_reads_persisted_tables_and_tolerates_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path();
        let heights: StatTable = [(10, StatValue::from(200.0))].into();
        write_json_file(&data_dir.join(StatName::Height.file_name()), &heights)
            .await
            .unwrap();
        let countries: StatTable = [(11, StatValue::from("Japan"))].into();
        write_json_file(&data_dir.join(StatName::Country.file_name()), &countries)
            .await
            .unwrap();
        std::fs::write(data_dir.join(StatName::Speed.file_name()), "{broken").unwrap();
        let manifest: ImageManifest = [(10, "10.jpg".to_string())].into();
        write_json_file(&data_dir.join(IMAGE_MANIFEST_FILE), &manifest)
            .await
            .unwrap();

        let data = LookupData::load(data_dir).await;
        assert_eq!(data.known_ids(), &[10, 11]);
        assert!(data.stats.table(StatName::Speed).is_none());
        assert_eq!(data.images.get(&10).map(String::as_str), Some("10.jpg"));

        let empty = LookupData::load(&data_dir.join("missing")).await;
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn health_reports_known_coasters() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(state_with(Arc::new(sample_api()), dir.path().to_path_buf()));
        let (status, body) = get_json(app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok", "knownCoasters": 4}));
    }
}
