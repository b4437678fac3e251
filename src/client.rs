use std::time::Duration;

use futures::{StreamExt, stream::BoxStream};
use reqwest::{
    Body, Client, Method, RequestBuilder,
    header::{CONTENT_TYPE, HeaderMap},
    multipart::{Form, Part},
};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use url::Url;

use crate::error::{ClientError, ClientResult, MediaError};
use crate::media::{self, MediaFile};
use crate::rest_types::{
    Acknowledgement, CancellationRequest, DonationConfirmation, DonationIntentRequest,
    DonationIntentResponse, DriveFolder, DriveImage, DriveSyncRequest, FoldersResponse,
    GalleryFolder, GalleryImage, HealthResponse, ImagesResponse, MemoriesResponse, MemoryRow,
    MemoryType, MessagesResponse, NewMessage, PastMemory, Stats, StatsResponse, TextMemory,
};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(300);

const PREVIEW_CHARS: usize = 200;
const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

pub const GALLERY_FOLDERS_ROUTE: &str = "gallery/folders";
pub const GALLERY_IMAGES_ROUTE: &str = "gallery/images";
pub const MESSAGES_ROUTE: &str = "messages";
pub const MEMORIES_ROUTE: &str = "memories";
pub const TEXT_MEMORY_ROUTE: &str = "memories/text";
pub const PHOTO_MEMORIES_ROUTE: &str = "memories/photos";
pub const VIDEO_MEMORY_ROUTE: &str = "memories/videos";
pub const PAST_MEMORY_ROUTE: &str = "memories/past";
pub const CANCEL_RESERVATION_ROUTE: &str = "cancel-reservation";
pub const DONATION_INTENT_ROUTE: &str = "donations/create-intent";
pub const DONATION_CONFIRM_ROUTE: &str = "donations/confirm";
pub const STATS_ROUTE: &str = "stats";
pub const DRIVE_FOLDERS_ROUTE: &str = "gallery/drive/folders";
pub const DRIVE_IMAGES_ROUTE: &str = "gallery/drive/images";
pub const DRIVE_SYNC_ROUTE: &str = "gallery/drive/sync";
pub const HEALTH_ROUTE: &str = "health";

/// Query parameters; `None` and empty values are dropped before encoding.
pub type Query<'a> = [(&'a str, Option<String>)];

pub enum RequestBody {
    Json(Value),
    /// Sent as-is so the transport picks the multipart boundary.
    Multipart(Form),
}

#[derive(Default)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<RequestBody>,
}

impl RequestOptions {
    pub fn post_json(body: Value) -> Self {
        Self {
            method: Method::POST,
            headers: HeaderMap::new(),
            body: Some(RequestBody::Json(body)),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UploadProgress {
    pub bytes_sent: u64,
    pub bytes_total: u64,
}

impl UploadProgress {
    pub fn percent(&self) -> f32 {
        if self.bytes_total == 0 {
            return 0.0;
        }
        (self.bytes_sent as f32 / self.bytes_total as f32) * 100.0
    }
}

#[derive(Debug)]
pub enum UploadEvent {
    Progress(UploadProgress),
    Complete(Value),
}

/// Text fields and file attachments of one multipart submission.
#[derive(Debug, Default)]
pub struct UploadPayload {
    fields: Vec<(String, String)>,
    files: Vec<(String, MediaFile)>,
}

impl UploadPayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub fn file(mut self, field: impl Into<String>, file: MediaFile) -> Self {
        self.files.push((field.into(), file));
        self
    }

    /// Validates and compresses every photo before building the payload.
    /// Fails without producing a payload if any single photo is rejected.
    pub fn photos(name: &str, caption: &str, photos: &[MediaFile]) -> Result<Self, MediaError> {
        let compressed = media::prepare_photos(photos)?;
        let payload = Self::new().text("name", name).text("caption", caption);
        Ok(compressed
            .into_iter()
            .fold(payload, |payload, photo| payload.file("photos[]", photo)))
    }

    pub fn video(name: &str, caption: &str, video: MediaFile) -> Result<Self, MediaError> {
        let video = media::prepare_video(video)?;
        Ok(Self::new()
            .text("name", name)
            .text("caption", caption)
            .file("video", video))
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|(_, f)| f.len()).sum()
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    fn into_form(self, progress_tx: mpsc::Sender<u64>) -> ClientResult<Form> {
        let mut form = Form::new();
        for (name, value) in self.fields {
            form = form.text(name, value);
        }

        for (field, file) in self.files {
            let len = file.len();
            let chunks: Vec<Vec<u8>> = file
                .bytes
                .chunks(UPLOAD_CHUNK_SIZE)
                .map(|chunk| chunk.to_vec())
                .collect();

            let tx = progress_tx.clone();
            let stream = futures::stream::iter(chunks).map(move |chunk| {
                let _ = tx.try_send(chunk.len() as u64);
                Ok::<_, std::io::Error>(chunk)
            });

            let part = Part::stream_with_length(Body::wrap_stream(stream), len)
                .file_name(file.name)
                .mime_str(&file.mime)
                .map_err(|source| ClientError::NetworkError { source })?;
            form = form.part(field, part);
        }

        Ok(form)
    }
}

fn server_message(body: &Value) -> Option<String> {
    body.get("message")
        .or_else(|| body.get("error"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn preview(body: &str) -> String {
    let mut preview: String = body.chars().take(PREVIEW_CHARS).collect();
    if body.chars().count() > PREVIEW_CHARS {
        preview.push_str("...");
    }
    preview
}

pub struct CelebrationClient {
    client: Client,
    base_url: Url,
    request_timeout: Duration,
    upload_timeout: Duration,
}

impl CelebrationClient {
    pub fn new(mut base_url: Url) -> Self {
        // Url::join drops the last segment unless the base ends with a slash
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Self {
            client: Client::new(),
            base_url,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            upload_timeout: DEFAULT_UPLOAD_TIMEOUT,
        }
    }

    pub fn with_timeouts(mut self, request_timeout: Duration, upload_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self.upload_timeout = upload_timeout;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn endpoint_url(&self, path: &str, query: &Query<'_>) -> ClientResult<Url> {
        let mut url = self
            .base_url
            .join(path.trim_start_matches('/'))
            .map_err(|source| ClientError::InvalidPath {
                path: path.to_string(),
                source: Some(source),
            })?;

        // absolute URLs and `..` segments must not escape the base
        if url.origin() != self.base_url.origin() || !url.path().starts_with(self.base_url.path()) {
            return Err(ClientError::InvalidPath {
                path: path.to_string(),
                source: None,
            });
        }

        let params: Vec<(&str, &str)> = query
            .iter()
            .filter_map(|(key, value)| {
                value
                    .as_deref()
                    .filter(|v| !v.is_empty())
                    .map(|v| (*key, v))
            })
            .collect();

        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params);
        }

        Ok(url)
    }

    pub async fn request(&self, path: &str, options: RequestOptions) -> ClientResult<Value> {
        let url = self.endpoint_url(path, &[])?;
        self.send(url, options).await
    }

    pub async fn get(&self, path: &str, query: &Query<'_>) -> ClientResult<Value> {
        let url = self.endpoint_url(path, query)?;
        self.send(url, RequestOptions::default()).await
    }

    pub async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> ClientResult<Value> {
        let body = serde_json::to_value(body)?;
        self.request(path, RequestOptions::post_json(body)).await
    }

    async fn get_as<T: DeserializeOwned>(&self, path: &str, query: &Query<'_>) -> ClientResult<T> {
        Ok(serde_json::from_value(self.get(path, query).await?)?)
    }

    async fn post_as<T, B>(&self, path: &str, body: &B) -> ClientResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        Ok(serde_json::from_value(self.post(path, body).await?)?)
    }

    fn builder(&self, url: Url, options: RequestOptions) -> RequestBuilder {
        let builder = self
            .client
            .request(options.method, url)
            .headers(options.headers);
        match options.body {
            Some(RequestBody::Json(body)) => builder.json(&body),
            Some(RequestBody::Multipart(form)) => builder.multipart(form),
            None => builder,
        }
    }

    async fn send(&self, url: Url, options: RequestOptions) -> ClientResult<Value> {
        debug!(method = %options.method, %url, "sending request");

        let builder = self.builder(url.clone(), options);

        // Dropping the round trip on timeout cancels the underlying request
        match tokio::time::timeout(self.request_timeout, Self::round_trip(builder)).await {
            Ok(result) => {
                if let Err(e) = &result {
                    warn!(%url, error = %e, "request failed");
                }
                result
            }
            Err(_) => {
                warn!(%url, "request timed out");
                Err(ClientError::Timeout {
                    after: self.request_timeout,
                })
            }
        }
    }

    async fn round_trip(builder: RequestBuilder) -> ClientResult<Value> {
        let response = builder
            .send()
            .await
            .map_err(|source| ClientError::ConnectionError { source })?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let body = response
            .text()
            .await
            .map_err(|source| ClientError::ConnectionError { source })?;

        if !content_type.contains("application/json") {
            return Err(ClientError::NonJsonResponse {
                content_type,
                preview: preview(&body),
            });
        }

        let body: Value = serde_json::from_str(&body)?;

        if !status.is_success() {
            return Err(ClientError::HttpError {
                status: status.as_u16(),
                message: server_message(&body).unwrap_or_else(|| status.to_string()),
            });
        }

        Ok(body)
    }

    async fn send_upload(&self, url: Url, form: Form) -> ClientResult<Value> {
        let options = RequestOptions {
            method: Method::POST,
            headers: HeaderMap::new(),
            body: Some(RequestBody::Multipart(form)),
        };
        let response = self
            .builder(url, options)
            .send()
            .await
            .map_err(|source| ClientError::NetworkError { source })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| ClientError::NetworkError { source })?;

        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .as_ref()
                .and_then(server_message)
                .unwrap_or_else(|| status.to_string());
            return Err(ClientError::UploadError {
                status: status.as_u16(),
                message,
            });
        }

        Ok(serde_json::from_str(&body)?)
    }

    /// POSTs `payload` as multipart, streaming progress as file bytes are handed
    /// to the transport. The final event is `Complete` with the parsed response.
    pub fn upload_events<'a>(
        &'a self,
        path: &'a str,
        payload: UploadPayload,
    ) -> BoxStream<'a, ClientResult<UploadEvent>> {
        let stream = async_stream::try_stream! {
            let url = self.endpoint_url(path, &[])?;
            let bytes_total = payload.total_bytes();

            yield UploadEvent::Progress(UploadProgress {
                bytes_sent: 0,
                bytes_total,
            });

            debug!(%url, files = payload.file_count(), bytes_total, "starting upload");

            let (progress_tx, mut progress_rx) = mpsc::channel::<u64>(64);
            let form = payload.into_form(progress_tx)?;

            let upload_fut = tokio::time::timeout(self.upload_timeout, self.send_upload(url, form));
            tokio::pin!(upload_fut);

            let mut bytes_sent = 0u64;
            let upload_result = loop {
                tokio::select! {
                    biased;
                    result = &mut upload_fut => {
                        break result;
                    }
                    Some(bytes) = progress_rx.recv() => {
                        bytes_sent += bytes;
                        yield UploadEvent::Progress(UploadProgress {
                            bytes_sent,
                            bytes_total,
                        });
                    }
                }
            };

            let body = upload_result.map_err(|_| {
                warn!(path, "upload timed out");
                ClientError::UploadTimeout { after: self.upload_timeout }
            })??;

            yield UploadEvent::Complete(body);
        };

        Box::pin(stream)
    }

    /// Runs an upload to completion, reporting percentages to `on_progress`.
    ///
    /// Progress values are hints: they are not guaranteed to reach 100 before
    /// the response arrives.
    pub async fn upload_with_progress<F>(
        &self,
        path: &str,
        payload: UploadPayload,
        mut on_progress: F,
    ) -> ClientResult<Value>
    where
        F: FnMut(f32),
    {
        let mut events = self.upload_events(path, payload);
        while let Some(event) = events.next().await {
            match event? {
                UploadEvent::Progress(p) => on_progress(p.percent()),
                UploadEvent::Complete(body) => return Ok(body),
            }
        }
        Err(ClientError::UploadError {
            status: 0,
            message: "Upload ended without a server response".to_string(),
        })
    }

    pub async fn gallery_folders(&self) -> ClientResult<Vec<GalleryFolder>> {
        let response: FoldersResponse<GalleryFolder> =
            self.get_as(GALLERY_FOLDERS_ROUTE, &[]).await?;
        Ok(response.folders)
    }

    pub async fn gallery_images(&self, folder: &str) -> ClientResult<Vec<GalleryImage>> {
        let response: ImagesResponse<GalleryImage> = self
            .get_as(GALLERY_IMAGES_ROUTE, &[("folder", Some(folder.to_string()))])
            .await?;
        Ok(response.images)
    }

    pub async fn messages(
        &self,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> ClientResult<MessagesResponse> {
        self.get_as(
            MESSAGES_ROUTE,
            &[
                ("limit", limit.map(|l| l.to_string())),
                ("offset", offset.map(|o| o.to_string())),
            ],
        )
        .await
    }

    pub async fn submit_message(&self, message: &NewMessage) -> ClientResult<Acknowledgement> {
        self.post_as(MESSAGES_ROUTE, message).await
    }

    pub async fn memories(
        &self,
        kind: Option<MemoryType>,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> ClientResult<Vec<MemoryRow>> {
        let response: MemoriesResponse = self
            .get_as(
                MEMORIES_ROUTE,
                &[
                    ("type", kind.map(|k| k.to_string())),
                    ("limit", limit.map(|l| l.to_string())),
                    ("offset", offset.map(|o| o.to_string())),
                ],
            )
            .await?;
        Ok(response.memories)
    }

    pub async fn submit_text_memory(&self, memory: &TextMemory) -> ClientResult<Acknowledgement> {
        self.post_as(TEXT_MEMORY_ROUTE, memory).await
    }

    /// Compresses the photos and uploads them as one submission. Nothing is sent
    /// if any photo fails validation or compression.
    pub async fn submit_photo_memories<F>(
        &self,
        name: &str,
        caption: &str,
        photos: &[MediaFile],
        on_progress: F,
    ) -> ClientResult<Acknowledgement>
    where
        F: FnMut(f32),
    {
        let payload = UploadPayload::photos(name, caption, photos)?;
        let body = self
            .upload_with_progress(PHOTO_MEMORIES_ROUTE, payload, on_progress)
            .await?;
        Ok(serde_json::from_value(body)?)
    }

    pub async fn submit_video_memory<F>(
        &self,
        name: &str,
        caption: &str,
        video: MediaFile,
        on_progress: F,
    ) -> ClientResult<Acknowledgement>
    where
        F: FnMut(f32),
    {
        let payload = UploadPayload::video(name, caption, video)?;
        let body = self
            .upload_with_progress(VIDEO_MEMORY_ROUTE, payload, on_progress)
            .await?;
        Ok(serde_json::from_value(body)?)
    }

    pub async fn submit_past_memory(&self, memory: &PastMemory) -> ClientResult<Acknowledgement> {
        self.post_as(PAST_MEMORY_ROUTE, memory).await
    }

    pub async fn cancel_reservation(
        &self,
        request: &CancellationRequest,
    ) -> ClientResult<Acknowledgement> {
        self.post_as(CANCEL_RESERVATION_ROUTE, request).await
    }

    pub async fn create_donation_intent(
        &self,
        request: &DonationIntentRequest,
    ) -> ClientResult<DonationIntentResponse> {
        self.post_as(DONATION_INTENT_ROUTE, request).await
    }

    pub async fn confirm_donation(&self, payment_intent_id: &str) -> ClientResult<Acknowledgement> {
        let request = DonationConfirmation {
            payment_intent_id: payment_intent_id.to_string(),
        };
        self.post_as(DONATION_CONFIRM_ROUTE, &request).await
    }

    pub async fn stats(&self) -> ClientResult<Stats> {
        let response: StatsResponse = self.get_as(STATS_ROUTE, &[]).await?;
        Ok(response.stats)
    }

    pub async fn drive_folders(&self) -> ClientResult<Vec<DriveFolder>> {
        let response: FoldersResponse<DriveFolder> = self.get_as(DRIVE_FOLDERS_ROUTE, &[]).await?;
        Ok(response.folders)
    }

    pub async fn drive_images(&self, folder_id: &str) -> ClientResult<Vec<DriveImage>> {
        let response: ImagesResponse<DriveImage> = self
            .get_as(DRIVE_IMAGES_ROUTE, &[("folderId", Some(folder_id.to_string()))])
            .await?;
        Ok(response.images)
    }

    pub async fn drive_sync(&self, folder_id: Option<&str>) -> ClientResult<Value> {
        let request = DriveSyncRequest {
            folder_id: folder_id.map(str::to_string),
        };
        self.post(DRIVE_SYNC_ROUTE, &request).await
    }

    pub async fn health(&self) -> ClientResult<HealthResponse> {
        self.get_as(HEALTH_ROUTE, &[]).await
    }

    /// POSTs `alert` as JSON to an external webhook. This is the only call that
    /// leaves the base origin; the response body is ignored.
    pub async fn send_alert<B: Serialize + ?Sized>(
        &self,
        webhook: &Url,
        alert: &B,
        timeout: Duration,
    ) -> ClientResult<()> {
        let request = self.client.post(webhook.clone()).json(alert).send();
        let response = tokio::time::timeout(timeout, request)
            .await
            .map_err(|_| ClientError::Timeout { after: timeout })?
            .map_err(|source| ClientError::ConnectionError { source })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::HttpError {
                status: status.as_u16(),
                message: status.to_string(),
            });
        }
        Ok(())
    }
}
