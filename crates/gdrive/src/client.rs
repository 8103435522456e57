//! Drive v2 REST client
//!
//! Implements [`DriveApi`] over reqwest. Uploads use the resumable
//! protocol so that an interrupted transfer continues from the last byte
//! the service persisted instead of starting over.

use std::io::SeekFrom;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use dg_core::{
    Config, ContainerId, DriveApi, Error, ErrorKind, FOLDER_MIME_TYPE, ListPage, Query,
    RemoteObject, Result,
};
use futures::StreamExt;
use reqwest::header::{CONTENT_RANGE, LOCATION, RANGE};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::auth::Credentials;
use crate::wire::{
    DriveFile, FileList, NewFile, ParentReference, content_range, parse_error_body, resume_offset,
};

pub const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v2";
pub const DRIVE_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v2";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("drivegate/", env!("CARGO_PKG_VERSION"));

/// Build the HTTP client shared by authentication and Drive requests
pub fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(CONNECT_TIMEOUT)
        // A 308 from an upload session is a status report, not a redirect
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|e| Error::Config(format!("cannot build HTTP client: {e}")))
}

/// Result of sending one chunk (or a status query) to an upload session
#[derive(Debug)]
enum ChunkOutcome {
    Complete(RemoteObject),
    Incomplete(u64),
}

/// Drive client bound to one set of credentials
pub struct DriveClient {
    http: reqwest::Client,
    credentials: Credentials,
    api_base: String,
    upload_base: String,
    chunk_size: u64,
    resume_attempts: u32,
    request_timeout: Duration,
}

impl DriveClient {
    pub fn new(http: reqwest::Client, credentials: Credentials, config: &Config) -> Self {
        Self {
            http,
            credentials,
            api_base: DRIVE_API_BASE.to_string(),
            upload_base: DRIVE_UPLOAD_BASE.to_string(),
            chunk_size: config.chunk_size_bytes,
            resume_attempts: config.upload_resume_attempts,
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }

    /// Point the client at different endpoints (proxies, test servers)
    pub fn with_base_urls(mut self, api_base: impl Into<String>, upload_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self.upload_base = upload_base.into().trim_end_matches('/').to_string();
        self
    }

    fn files_url(&self) -> String {
        format!("{}/files", self.api_base)
    }

    fn file_url(&self, id: &str) -> String {
        format!("{}/files/{}", self.api_base, urlencoding::encode(id))
    }

    fn upload_url(&self) -> String {
        format!("{}/files?uploadType=resumable", self.upload_base)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http.request(method, url)
    }

    /// Send an authorized request built by `build`.
    ///
    /// A 401 renews the credentials and sends the request once more. Other
    /// statuses are returned unchecked.
    async fn dispatch<F>(&self, context: &str, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let token = self.credentials.access_token().await?;
        let response = build()
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| Error::transport(context, e))?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let Some(token) = self.credentials.renew(&token).await? else {
            return Ok(response);
        };
        build()
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| Error::transport(context, e))
    }

    async fn send<F>(&self, context: &str, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let response = self.dispatch(context, build).await?;
        check_status(context, response).await
    }

    async fn start_upload(
        &self,
        parent: &ContainerId,
        title: &str,
        mime_type: &str,
        total: u64,
    ) -> Result<String> {
        let body = NewFile {
            title,
            mime_type: Some(mime_type),
            parents: vec![ParentReference {
                id: parent.as_str().to_string(),
            }],
        };
        let url = self.upload_url();
        let response = self
            .send("start upload", || {
                self.request(Method::POST, &url)
                    .timeout(self.request_timeout)
                    .header("X-Upload-Content-Type", mime_type)
                    .header("X-Upload-Content-Length", total)
                    .json(&body)
            })
            .await?;

        response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| Error::Transient("upload session has no Location header".to_string()))
    }

    async fn send_chunk(
        &self,
        session_uri: &str,
        body: Vec<u8>,
        range: String,
    ) -> Result<ChunkOutcome> {
        let context = "upload chunk";
        let response = self
            .dispatch(context, || {
                self.request(Method::PUT, session_uri)
                    .timeout(self.request_timeout)
                    .header(CONTENT_RANGE, &range)
                    .body(body.clone())
            })
            .await?;

        if response.status() == StatusCode::PERMANENT_REDIRECT {
            let range = response.headers().get(RANGE).and_then(|v| v.to_str().ok());
            return Ok(ChunkOutcome::Incomplete(resume_offset(range)?));
        }

        let file: DriveFile = check_status(context, response)
            .await?
            .json()
            .await
            .map_err(|e| Error::transport(context, e))?;
        Ok(ChunkOutcome::Complete(file.into()))
    }

    async fn read_chunk(file: &mut File, offset: u64, len: u64) -> Result<Vec<u8>> {
        file.seek(SeekFrom::Start(offset)).await?;
        let mut buf = Vec::with_capacity(len as usize);
        (&mut *file).take(len).read_to_end(&mut buf).await?;
        if (buf.len() as u64) < len {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "source file shrank during upload",
            )));
        }
        Ok(buf)
    }
}

async fn check_status(context: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::from_provider(context, parse_error_body(status.as_u16(), &body)))
}

fn list_params(query: &Query, page_token: Option<String>, page_size: u32) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("q", query.render()),
        ("maxResults", page_size.to_string()),
    ];
    if let Some(token) = page_token {
        params.push(("pageToken", token));
    }
    params
}

#[async_trait]
impl DriveApi for DriveClient {
    async fn list_children(
        &self,
        query: &Query,
        page_token: Option<String>,
        page_size: u32,
    ) -> Result<ListPage> {
        let url = self.files_url();
        let params = list_params(query, page_token, page_size);
        let list: FileList = self
            .send("list files", || {
                self.request(Method::GET, &url)
                    .timeout(self.request_timeout)
                    .query(&params)
            })
            .await?
            .json()
            .await
            .map_err(|e| Error::transport("list files", e))?;

        Ok(ListPage {
            items: list.items.into_iter().map(Into::into).collect(),
            next_page_token: list.next_page_token,
        })
    }

    async fn create_folder(&self, parent: &ContainerId, title: &str) -> Result<RemoteObject> {
        let body = NewFile {
            title,
            mime_type: Some(FOLDER_MIME_TYPE),
            parents: vec![ParentReference {
                id: parent.as_str().to_string(),
            }],
        };
        let url = self.files_url();
        let file: DriveFile = self
            .send("create folder", || {
                self.request(Method::POST, &url)
                    .timeout(self.request_timeout)
                    .json(&body)
            })
            .await?
            .json()
            .await
            .map_err(|e| Error::transport("create folder", e))?;
        Ok(file.into())
    }

    async fn upload_file(
        &self,
        parent: &ContainerId,
        title: &str,
        source: &Path,
    ) -> Result<RemoteObject> {
        let total = tokio::fs::metadata(source).await?.len();
        let mime_type = mime_guess::from_path(title)
            .first_or_octet_stream()
            .to_string();
        let session_uri = self.start_upload(parent, title, &mime_type, total).await?;
        tracing::debug!(title, total, "Upload session opened");

        let mut file = File::open(source).await?;
        let mut offset = 0u64;
        let mut resumes = 0u32;

        loop {
            let len = self.chunk_size.min(total - offset);
            let body = Self::read_chunk(&mut file, offset, len).await?;

            let outcome = match self
                .send_chunk(&session_uri, body, content_range(offset, len, total))
                .await
            {
                Ok(outcome) => outcome,
                Err(e) if e.kind() == ErrorKind::Transient && resumes < self.resume_attempts => {
                    resumes += 1;
                    tracing::warn!(title, offset, attempt = resumes, error = %e, "Resuming interrupted upload");
                    self.send_chunk(&session_uri, Vec::new(), content_range(0, 0, total))
                        .await?
                }
                Err(e) => return Err(e),
            };

            match outcome {
                ChunkOutcome::Complete(object) => {
                    tracing::debug!(title, id = %object.id, "Upload complete");
                    return Ok(object);
                }
                ChunkOutcome::Incomplete(next) if next > total => {
                    return Err(Error::Transient(format!(
                        "upload session reports {next} bytes of {total}"
                    )));
                }
                ChunkOutcome::Incomplete(next) => {
                    tracing::trace!(title, next, total, "Chunk persisted");
                    offset = next;
                }
            }
        }
    }

    async fn download(
        &self,
        id: &str,
        acknowledge_abuse: bool,
        sink: &mut File,
    ) -> Result<u64> {
        let url = self.file_url(id);
        let response = self
            .send("download", || {
                let request = self.request(Method::GET, &url).query(&[("alt", "media")]);
                if acknowledge_abuse {
                    request.query(&[("acknowledgeAbuse", "true")])
                } else {
                    request
                }
            })
            .await?;

        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::transport("download", e))?;
            sink.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        sink.flush().await?;
        Ok(written)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let url = self.file_url(id);
        self.send("delete", || {
            self.request(Method::DELETE, &url)
                .timeout(self.request_timeout)
        })
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthMethod, Authenticator, Session, StoredToken};
    use crate::stub::{Recorded, Reply, StubServer};
    use jiff::Timestamp;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn client() -> DriveClient {
        DriveClient::new(
            reqwest::Client::new(),
            Credentials::fixed(Session::new("token", None)),
            &Config::default(),
        )
    }

    fn stub_client(server: &StubServer, credentials: Credentials, config: &Config) -> DriveClient {
        DriveClient::new(reqwest::Client::new(), credentials, config)
            .with_base_urls(server.url("/drive"), server.url("/up"))
    }

    fn small_chunks(resume_attempts: u32) -> Config {
        Config {
            chunk_size_bytes: 4,
            upload_resume_attempts: resume_attempts,
            ..Config::default()
        }
    }

    fn uploaded(size: usize) -> Reply {
        Reply::json(
            200,
            serde_json::json!({
                "id": "up1",
                "title": "vol1",
                "mimeType": "application/octet-stream",
                "fileSize": size.to_string(),
                "parents": [{"id": "0Bdest"}],
            }),
        )
    }

    /// Resumable upload endpoint. Each data chunk persists at most `accept`
    /// bytes; data chunks for which `fail` holds are persisted but answered
    /// with a 503.
    fn upload_session(accept: usize, fail: fn(usize) -> bool) -> impl Fn(&Recorded) -> Reply {
        let persisted = Mutex::new(Vec::<u8>::new());
        let data_chunks = AtomicUsize::new(0);

        move |request: &Recorded| {
            if request.method == "POST" {
                let host = request.header("host").unwrap_or_default();
                return Reply::status(200).header("Location", format!("http://{host}/session"));
            }

            let range = request.header("content-range").unwrap_or_default();
            let (span, total) = range
                .strip_prefix("bytes ")
                .and_then(|r| r.split_once('/'))
                .unwrap();
            let total: usize = total.parse().unwrap();
            let mut persisted = persisted.lock().unwrap();

            if span != "*" {
                let n = data_chunks.fetch_add(1, Ordering::SeqCst);
                let start: usize = span.split_once('-').unwrap().0.parse().unwrap();
                assert_eq!(start, persisted.len(), "chunk does not continue the session");
                let keep = request.body.len().min(accept);
                persisted.extend_from_slice(&request.body[..keep]);
                if fail(n) {
                    return Reply::status(503);
                }
            }

            if persisted.len() == total {
                uploaded(total)
            } else if persisted.is_empty() {
                Reply::status(308)
            } else {
                Reply::status(308).header("Range", format!("bytes=0-{}", persisted.len() - 1))
            }
        }
    }

    fn chunk_ranges(server: &StubServer) -> Vec<String> {
        server
            .requests()
            .iter()
            .filter(|r| r.method == "PUT")
            .map(|r| r.header("content-range").unwrap_or_default().to_string())
            .collect()
    }

    fn source(temp: &TempDir, content: &[u8]) -> std::path::PathBuf {
        let path = temp.path().join("vol1");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_urls() {
        let client = client();
        assert_eq!(client.files_url(), "https://www.googleapis.com/drive/v2/files");
        assert_eq!(
            client.file_url("0B1"),
            "https://www.googleapis.com/drive/v2/files/0B1"
        );
        assert_eq!(
            client.upload_url(),
            "https://www.googleapis.com/upload/drive/v2/files?uploadType=resumable"
        );
    }

    #[test]
    fn test_file_url_encodes_id() {
        assert_eq!(
            client().file_url("a/b"),
            "https://www.googleapis.com/drive/v2/files/a%2Fb"
        );
    }

    #[test]
    fn test_with_base_urls_trims_slash() {
        let client = client().with_base_urls("http://127.0.0.1:9000/drive/v2/", "http://127.0.0.1:9000/up/");
        assert_eq!(client.files_url(), "http://127.0.0.1:9000/drive/v2/files");
        assert_eq!(
            client.upload_url(),
            "http://127.0.0.1:9000/up/files?uploadType=resumable"
        );
    }

    #[test]
    fn test_list_params() {
        let query = Query::children_of(&ContainerId::new("0Bdest")).title("it's");
        let params = list_params(&query, None, 1000);
        assert_eq!(
            params,
            vec![
                ("q", "'0Bdest' in parents and trashed = false and title = 'it\\'s'".to_string()),
                ("maxResults", "1000".to_string()),
            ]
        );

        let params = list_params(&query, Some("tok".to_string()), 10);
        assert_eq!(params.last(), Some(&("pageToken", "tok".to_string())));
    }

    #[test]
    fn test_http_client_builds() {
        assert!(http_client().is_ok());
    }

    #[tokio::test]
    async fn test_read_chunk() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("src");
        std::fs::write(&path, b"0123456789").unwrap();
        let mut file = File::open(&path).await.unwrap();

        assert_eq!(DriveClient::read_chunk(&mut file, 4, 3).await.unwrap(), b"456");
        assert_eq!(DriveClient::read_chunk(&mut file, 0, 2).await.unwrap(), b"01");
        assert!(DriveClient::read_chunk(&mut file, 8, 5).await.is_err());
    }

    #[tokio::test]
    async fn test_upload_sends_sequential_chunks() {
        let server = StubServer::start(upload_session(usize::MAX, |_| false)).await;
        let client = stub_client(&server, Credentials::fixed(Session::new("t", None)), &small_chunks(3));
        let temp = TempDir::new().unwrap();

        let object = client
            .upload_file(&ContainerId::new("0Bdest"), "vol1", &source(&temp, b"0123456789"))
            .await
            .unwrap();

        assert_eq!(object.id, "up1");
        assert_eq!(object.size, Some(10));
        assert_eq!(
            chunk_ranges(&server),
            ["bytes 0-3/10", "bytes 4-7/10", "bytes 8-9/10"]
        );

        let requests = server.requests();
        let start = &requests[0];
        assert_eq!(start.target, "/up/files?uploadType=resumable");
        assert_eq!(start.header("x-upload-content-length"), Some("10"));
        assert_eq!(start.header("authorization"), Some("Bearer t"));
        assert!(start.body_text().contains(r#""title":"vol1""#));
        let sent: Vec<u8> = requests[1..].iter().flat_map(|r| r.body.clone()).collect();
        assert_eq!(sent, b"0123456789");
    }

    #[tokio::test]
    async fn test_upload_resends_unacknowledged_bytes() {
        let server = StubServer::start(upload_session(2, |_| false)).await;
        let client = stub_client(&server, Credentials::fixed(Session::new("t", None)), &small_chunks(3));
        let temp = TempDir::new().unwrap();

        client
            .upload_file(&ContainerId::new("0Bdest"), "vol1", &source(&temp, b"0123456789"))
            .await
            .unwrap();

        assert_eq!(
            chunk_ranges(&server),
            [
                "bytes 0-3/10",
                "bytes 2-5/10",
                "bytes 4-7/10",
                "bytes 6-9/10",
                "bytes 8-9/10",
            ]
        );
    }

    #[tokio::test]
    async fn test_upload_resumes_after_interruption() {
        let server = StubServer::start(upload_session(usize::MAX, |n| n == 1)).await;
        let client = stub_client(&server, Credentials::fixed(Session::new("t", None)), &small_chunks(3));
        let temp = TempDir::new().unwrap();

        let object = client
            .upload_file(&ContainerId::new("0Bdest"), "vol1", &source(&temp, b"0123456789"))
            .await
            .unwrap();

        assert_eq!(object.size, Some(10));
        assert_eq!(
            chunk_ranges(&server),
            ["bytes 0-3/10", "bytes 4-7/10", "bytes */10", "bytes 8-9/10"]
        );
    }

    #[tokio::test]
    async fn test_upload_gives_up_after_resume_limit() {
        let server = StubServer::start(upload_session(usize::MAX, |_| true)).await;
        let client = stub_client(&server, Credentials::fixed(Session::new("t", None)), &small_chunks(1));
        let temp = TempDir::new().unwrap();

        let err = client
            .upload_file(&ContainerId::new("0Bdest"), "vol1", &source(&temp, b"0123456789"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Transient);
        assert_eq!(
            chunk_ranges(&server),
            ["bytes 0-3/10", "bytes */10", "bytes 4-7/10"]
        );
    }

    #[tokio::test]
    async fn test_empty_upload_finalizes_with_status_range() {
        let server = StubServer::start(upload_session(usize::MAX, |_| false)).await;
        let client = stub_client(&server, Credentials::fixed(Session::new("t", None)), &small_chunks(3));
        let temp = TempDir::new().unwrap();

        let object = client
            .upload_file(&ContainerId::new("0Bdest"), "vol1", &source(&temp, b""))
            .await
            .unwrap();

        assert_eq!(object.size, Some(0));
        assert_eq!(chunk_ranges(&server), ["bytes */0"]);
    }

    #[tokio::test]
    async fn test_download_streams_into_sink() {
        let server = StubServer::start(|_| Reply::status(200).body(b"archive bytes".to_vec())).await;
        let client = stub_client(&server, Credentials::fixed(Session::new("t", None)), &Config::default());
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out");
        let mut sink = File::create(&path).await.unwrap();

        let written = client.download("f1", true, &mut sink).await.unwrap();

        assert_eq!(written, 13);
        assert_eq!(std::fs::read(&path).unwrap(), b"archive bytes");
        let target = &server.requests()[0].target;
        assert!(target.starts_with("/drive/files/f1?"));
        assert!(target.contains("alt=media"));
        assert!(target.contains("acknowledgeAbuse=true"));
    }

    #[tokio::test]
    async fn test_download_abuse_refusal() {
        let server = StubServer::start(|_| {
            Reply::json(
                403,
                serde_json::json!({"error": {
                    "code": 403,
                    "message": "This file has been identified as malware or spam",
                    "errors": [{"reason": "abuse"}],
                }}),
            )
        })
        .await;
        let client = stub_client(&server, Credentials::fixed(Session::new("t", None)), &Config::default());
        let temp = TempDir::new().unwrap();
        let mut sink = File::create(temp.path().join("out")).await.unwrap();

        let err = client.download("f1", false, &mut sink).await.unwrap_err();

        assert!(matches!(err, Error::AbuseFlagged(_)));
        assert!(!server.requests()[0].target.contains("acknowledgeAbuse"));
    }

    /// Drive endpoint accepting only `Bearer fresh`, plus a token endpoint
    /// that issues it
    async fn token_checking_server() -> StubServer {
        StubServer::start(|request| {
            if request.path() == "/token" {
                return Reply::json(200, serde_json::json!({"access_token": "fresh", "expires_in": 3600}));
            }
            if request.header("authorization") == Some("Bearer fresh") {
                Reply::status(204)
            } else {
                Reply::json(401, serde_json::json!({"error": {"code": 401, "message": "Invalid Credentials"}}))
            }
        })
        .await
    }

    fn refreshable(server: &StubServer, temp: &TempDir, session: Session) -> Credentials {
        let token_file = temp.path().join("token.json");
        StoredToken {
            access_token: session.access_token().to_string(),
            refresh_token: Some("r".to_string()),
            expires_at: session.expires_at(),
        }
        .save(&token_file)
        .unwrap();

        Credentials::refreshable(
            Authenticator::new(reqwest::Client::new()).with_token_uri(server.url("/token")),
            AuthMethod::InstalledApp {
                client_id: "1234.apps.googleusercontent.com".to_string(),
                client_secret: "s3cret".to_string(),
                token_file,
                code: None,
            },
            session,
        )
    }

    fn request_lines(server: &StubServer) -> Vec<String> {
        server
            .requests()
            .iter()
            .map(|r| format!("{} {}", r.method, r.path()))
            .collect()
    }

    #[tokio::test]
    async fn test_expired_session_is_refreshed_before_request() {
        let server = token_checking_server().await;
        let temp = TempDir::new().unwrap();
        let expired = Session::new("stale", Timestamp::from_second(1_600_000_000).ok());
        let client = stub_client(&server, refreshable(&server, &temp, expired), &Config::default());

        client.delete("x").await.unwrap();

        assert_eq!(request_lines(&server), ["POST /token", "DELETE /drive/files/x"]);
    }

    #[tokio::test]
    async fn test_rejected_token_is_renewed_once() {
        let server = token_checking_server().await;
        let temp = TempDir::new().unwrap();
        let client = stub_client(
            &server,
            refreshable(&server, &temp, Session::new("stale", None)),
            &Config::default(),
        );

        client.delete("x").await.unwrap();
        client.delete("y").await.unwrap();

        assert_eq!(
            request_lines(&server),
            [
                "DELETE /drive/files/x",
                "POST /token",
                "DELETE /drive/files/x",
                "DELETE /drive/files/y",
            ]
        );
    }

    #[tokio::test]
    async fn test_rejected_fixed_token_is_auth_error() {
        let server = token_checking_server().await;
        let client = stub_client(&server, Credentials::fixed(Session::new("stale", None)), &Config::default());

        let err = client.delete("x").await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::AuthorizationError);
        assert_eq!(request_lines(&server), ["DELETE /drive/files/x"]);
    }
}
