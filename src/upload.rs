//! Photo uploads.
//!
//! [`UploadClient`] posts a file to the upload proxy and gets back a content
//! identifier. [`serve`] is that proxy: a single `POST /api/files` endpoint
//! that forwards the file to the pinning service.

use crate::error::{Error, Result};
use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use log::{error, info};
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const PINATA_UPLOAD_URL: &str = "https://uploads.pinata.cloud/v3/files";
/// Largest form body the proxy accepts; comfortably above phone camera photos.
const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Somewhere a photo can be stored, yielding its content identifier.
pub trait PhotoStore {
    async fn pin(&self, path: &Path) -> Result<String>;
}

#[derive(Debug, Serialize, Deserialize)]
struct ProxyBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub struct UploadClient {
    client: Client,
    url: String,
}

impl UploadClient {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    pub async fn upload(&self, path: &Path) -> Result<String> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "photo".to_string());
        info!("Uploading {} ({} bytes)", file_name, bytes.len());

        let form = Form::new().part("file", Part::bytes(bytes).file_name(file_name));
        let response = self
            .client
            .post(&self.url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Upload(e.to_string()))?;
        let status = response.status();
        let body: ProxyBody = response
            .json()
            .await
            .map_err(|e| Error::Upload(format!("HTTP {status}: unreadable response: {e}")))?;
        interpret(status, body)
    }
}

impl PhotoStore for UploadClient {
    async fn pin(&self, path: &Path) -> Result<String> {
        self.upload(path).await
    }
}

fn interpret(status: reqwest::StatusCode, body: ProxyBody) -> Result<String> {
    if !status.is_success() {
        let reason = body.error.unwrap_or_else(|| format!("HTTP {status}"));
        return Err(Error::Upload(reason));
    }
    match body.cid {
        Some(cid) if !cid.is_empty() => Ok(cid),
        _ => Err(Error::Upload("No CID returned from upload".into())),
    }
}

// --- proxy server ---

#[derive(Clone)]
pub struct ProxyState {
    client: Client,
    jwt: String,
    pin_url: String,
}

impl ProxyState {
    pub fn new(jwt: String) -> Result<Self> {
        Self::with_pin_url(jwt, PINATA_UPLOAD_URL)
    }

    pub fn with_pin_url(jwt: String, pin_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            jwt,
            pin_url: pin_url.to_string(),
        })
    }
}

#[derive(Debug)]
enum ProxyError {
    NoFile,
    TooLarge,
    Upstream(String),
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ProxyError::NoFile => (StatusCode::BAD_REQUEST, "No file provided"),
            ProxyError::TooLarge => (StatusCode::PAYLOAD_TOO_LARGE, "File too large"),
            ProxyError::Upstream(reason) => {
                error!("Upload proxy failed: {}", reason);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            }
        };
        let body = ProxyBody {
            cid: None,
            error: Some(message.to_string()),
        };
        (status, Json(body)).into_response()
    }
}

struct UploadedFile {
    name: String,
    content_type: Option<String>,
    bytes: Vec<u8>,
}

#[derive(Deserialize)]
struct PinataResponse {
    data: PinataFile,
}

#[derive(Deserialize)]
struct PinataFile {
    cid: String,
}

pub fn router(state: ProxyState) -> Router {
    Router::new()
        .route("/api/files", post(upload_file))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

pub async fn serve(bind: &str, state: ProxyState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("Upload proxy listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn upload_file(
    State(state): State<ProxyState>,
    mut multipart: Multipart,
) -> std::result::Result<Json<ProxyBody>, ProxyError> {
    let file = read_file_field(&mut multipart)
        .await?
        .ok_or(ProxyError::NoFile)?;
    let cid = pin_upstream(&state, file).await?;
    info!("Pinned upload as {}", cid);
    Ok(Json(ProxyBody {
        cid: Some(cid),
        error: None,
    }))
}

async fn read_file_field(
    multipart: &mut Multipart,
) -> std::result::Result<Option<UploadedFile>, ProxyError> {
    while let Some(field) = multipart.next_field().await.map_err(|e| body_error(&e))? {
        if field.name() != Some("file") {
            continue;
        }
        let name = field.file_name().unwrap_or("upload").to_string();
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.map_err(|e| body_error(&e))?;
        return Ok(Some(UploadedFile {
            name,
            content_type,
            bytes: bytes.to_vec(),
        }));
    }
    Ok(None)
}

fn body_error(err: &MultipartError) -> ProxyError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ProxyError::TooLarge
    } else {
        ProxyError::Upstream(format!("malformed form body: {err}"))
    }
}

async fn pin_upstream(state: &ProxyState, file: UploadedFile) -> std::result::Result<String, ProxyError> {
    let mut part = Part::bytes(file.bytes).file_name(file.name);
    if let Some(content_type) = file.content_type.as_deref() {
        part = part
            .mime_str(content_type)
            .map_err(|e| ProxyError::Upstream(format!("bad content type: {e}")))?;
    }
    let form = Form::new().part("file", part).text("network", "public");

    let response = state
        .client
        .post(&state.pin_url)
        .bearer_auth(&state.jwt)
        .multipart(form)
        .send()
        .await
        .map_err(|e| ProxyError::Upstream(e.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        return Err(ProxyError::Upstream(format!("pinning service returned {status}")));
    }
    let pinned: PinataResponse = response
        .json()
        .await
        .map_err(|e| ProxyError::Upstream(format!("pinning response: {e}")))?;
    Ok(pinned.data.cid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    async fn fake_pinata(cid: &'static str) -> String {
        let app = Router::new().route(
            "/v3/files",
            post(move || async move { Json(json!({ "data": { "cid": cid, "name": "fern.jpg" } })) }),
        );
        format!("{}/v3/files", spawn(app).await)
    }

    fn temp_file(name: &str, contents: &[u8]) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("plantsoul-{}-{name}", std::process::id()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn temp_photo(name: &str) -> std::path::PathBuf {
        temp_file(name, b"not really a jpeg")
    }

    #[test]
    fn test_interpret_proxy_responses() {
        let ok = interpret(
            reqwest::StatusCode::OK,
            ProxyBody {
                cid: Some("bafy".into()),
                error: None,
            },
        );
        assert_eq!(ok.unwrap(), "bafy");

        let missing = interpret(
            reqwest::StatusCode::OK,
            ProxyBody {
                cid: Some(String::new()),
                error: None,
            },
        );
        assert_eq!(
            missing.unwrap_err().to_string(),
            "upload failed: No CID returned from upload"
        );

        let failed = interpret(
            reqwest::StatusCode::BAD_REQUEST,
            ProxyBody {
                cid: None,
                error: Some("No file provided".into()),
            },
        );
        assert_eq!(failed.unwrap_err().to_string(), "upload failed: No file provided");
    }

    #[test]
    fn test_proxy_error_statuses() {
        assert_eq!(ProxyError::NoFile.into_response().status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ProxyError::TooLarge.into_response().status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            ProxyError::Upstream("boom".into()).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_upload_through_proxy() {
        let pin_url = fake_pinata("bafyfakecid").await;
        let state = ProxyState::with_pin_url("test-jwt".into(), &pin_url).unwrap();
        let proxy = spawn(router(state)).await;

        let client = UploadClient::new(&format!("{proxy}/api/files"), Duration::from_secs(5)).unwrap();
        let photo = temp_photo("fern.jpg");
        let cid = client.upload(&photo).await.unwrap();
        assert_eq!(cid, "bafyfakecid");
        let _ = std::fs::remove_file(photo);
    }

    #[tokio::test]
    async fn test_photo_over_two_megabytes_is_accepted() {
        let pin_url = fake_pinata("bafybig").await;
        let state = ProxyState::with_pin_url("test-jwt".into(), &pin_url).unwrap();
        let proxy = spawn(router(state)).await;

        let client = UploadClient::new(&format!("{proxy}/api/files"), Duration::from_secs(10)).unwrap();
        let photo = temp_file("big.jpg", &vec![0xAB; 3 * 1024 * 1024]);
        let cid = client.upload(&photo).await.unwrap();
        assert_eq!(cid, "bafybig");
        let _ = std::fs::remove_file(photo);
    }

    #[tokio::test]
    async fn test_missing_file_field_is_400() {
        let state = ProxyState::with_pin_url("test-jwt".into(), "http://127.0.0.1:9/v3/files").unwrap();
        let proxy = spawn(router(state)).await;

        let form = Form::new().text("species", "Ficus");
        let response = Client::new()
            .post(format!("{proxy}/api/files"))
            .multipart(form)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 400);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body, json!({ "error": "No file provided" }));
    }

    #[tokio::test]
    async fn test_upstream_failure_is_500() {
        let state = ProxyState::with_pin_url("test-jwt".into(), "http://127.0.0.1:9/v3/files").unwrap();
        let proxy = spawn(router(state)).await;

        let client = UploadClient::new(&format!("{proxy}/api/files"), Duration::from_secs(5)).unwrap();
        let photo = temp_photo("cactus.jpg");
        let err = client.upload(&photo).await.unwrap_err();
        assert_eq!(err.to_string(), "upload failed: Internal Server Error");
        let _ = std::fs::remove_file(photo);
    }
}
