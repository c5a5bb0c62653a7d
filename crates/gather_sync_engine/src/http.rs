//! HTTP transport implementation.
//!
//! The actual HTTP client is abstracted via a trait so different
//! libraries (reqwest, hyper, ureq) can sit underneath. This layer owns
//! the wire conventions: JSON bodies, the freshness token as an entity
//! tag echoed through `If-None-Match`, and the idempotency key as a
//! request header.

use crate::error::{SyncError, SyncResult};
use crate::transport::{CacheToken, Fetched, SyncTransport};
use gather_sync_protocol::{
    IdempotencyKey, MediaDto, ProfileDto, ProfileUpdate, SettingsDto, SettingsUpdate, TagDto,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::RwLock;
use uuid::Uuid;

/// Name of the request header carrying the idempotency key.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// A raw HTTP response as the client trait reports it.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Entity tag from the response, if any.
    pub etag: Option<String>,
    /// Response body.
    pub body: Vec<u8>,
}

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP transport. Errors
/// returned as `Err(String)` mean the request never completed (DNS,
/// connect, read); completed requests report their status in the
/// [`HttpResponse`] regardless of code.
pub trait HttpClient: Send + Sync {
    /// Sends a GET request, echoing `if_none_match` when present.
    fn get(&self, url: &str, if_none_match: Option<&str>) -> Result<HttpResponse, String>;

    /// Sends a PUT request with a JSON body and an idempotency key header.
    fn put(&self, url: &str, body: Vec<u8>, idempotency_key: &str)
        -> Result<HttpResponse, String>;

    /// Sends a POST request with a JSON body and an idempotency key header.
    fn post(
        &self,
        url: &str,
        body: Vec<u8>,
        idempotency_key: &str,
    ) -> Result<HttpResponse, String>;

    /// Checks if the client is connected/healthy.
    fn is_healthy(&self) -> bool;
}

impl<C: HttpClient> HttpClient for &C {
    fn get(&self, url: &str, if_none_match: Option<&str>) -> Result<HttpResponse, String> {
        (**self).get(url, if_none_match)
    }

    fn put(
        &self,
        url: &str,
        body: Vec<u8>,
        idempotency_key: &str,
    ) -> Result<HttpResponse, String> {
        (**self).put(url, body, idempotency_key)
    }

    fn post(
        &self,
        url: &str,
        body: Vec<u8>,
        idempotency_key: &str,
    ) -> Result<HttpResponse, String> {
        (**self).post(url, body, idempotency_key)
    }

    fn is_healthy(&self) -> bool {
        (**self).is_healthy()
    }
}

impl<C: HttpClient> HttpClient for std::sync::Arc<C> {
    fn get(&self, url: &str, if_none_match: Option<&str>) -> Result<HttpResponse, String> {
        (**self).get(url, if_none_match)
    }

    fn put(
        &self,
        url: &str,
        body: Vec<u8>,
        idempotency_key: &str,
    ) -> Result<HttpResponse, String> {
        (**self).put(url, body, idempotency_key)
    }

    fn post(
        &self,
        url: &str,
        body: Vec<u8>,
        idempotency_key: &str,
    ) -> Result<HttpResponse, String> {
        (**self).post(url, body, idempotency_key)
    }

    fn is_healthy(&self) -> bool {
        (**self).is_healthy()
    }
}

/// HTTP-based sync transport.
///
/// Uses JSON encoding for request/response bodies.
pub struct HttpTransport<C: HttpClient> {
    /// Base URL of the remote store (e.g., "https://api.gather.example").
    base_url: String,
    /// HTTP client implementation.
    client: C,
    /// Last error message.
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a new HTTP transport.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into(),
            client,
            last_error: RwLock::new(None),
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the last error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().unwrap().clone()
    }

    fn set_error(&self, err: &str) {
        *self.last_error.write().unwrap() = Some(err.to_string());
    }

    fn clear_error(&self) {
        *self.last_error.write().unwrap() = None;
    }

    fn check_connected(&self) -> SyncResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(SyncError::transport_retryable("transport disconnected"))
        }
    }

    /// Records a request that never completed.
    ///
    /// Such failures are transient; the next request goes out normally
    /// and clears the recorded error if it completes.
    fn transport_failure(&self, err: String) -> SyncError {
        self.set_error(&err);
        SyncError::transport_retryable(err)
    }

    fn get_json<Res>(&self, endpoint: &str, token: Option<&CacheToken>) -> SyncResult<Fetched<Res>>
    where
        Res: DeserializeOwned,
    {
        self.check_connected()?;

        let url = format!("{}{}", self.base_url, endpoint);
        let response = self
            .client
            .get(&url, token.map(CacheToken::as_str))
            .map_err(|e| self.transport_failure(e))?;
        self.clear_error();

        if response.status == 304 {
            return Ok(Fetched::NotModified);
        }
        check_status(&response)?;

        let body: Res = serde_json::from_slice(&response.body)?;
        Ok(Fetched::Changed {
            body,
            token: response.etag.map(CacheToken::new),
        })
    }

    fn put_json<Req, Res>(&self, endpoint: &str, request: &Req, key: &str) -> SyncResult<Res>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        self.check_connected()?;

        let body = serde_json::to_vec(request)?;
        let url = format!("{}{}", self.base_url, endpoint);
        let response = self
            .client
            .put(&url, body, key)
            .map_err(|e| self.transport_failure(e))?;
        self.clear_error();

        check_status(&response)?;
        Ok(serde_json::from_slice(&response.body)?)
    }

    fn post_json<Req, Res>(&self, endpoint: &str, request: &Req, key: &str) -> SyncResult<Res>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        self.check_connected()?;

        let body = serde_json::to_vec(request)?;
        let url = format!("{}{}", self.base_url, endpoint);
        let response = self
            .client
            .post(&url, body, key)
            .map_err(|e| self.transport_failure(e))?;
        self.clear_error();

        check_status(&response)?;
        Ok(serde_json::from_slice(&response.body)?)
    }
}

/// Maps a completed response's status to the error taxonomy.
///
/// Server-side failures and throttling are transient; any other
/// non-success status is a definitive rejection of this payload.
fn check_status(response: &HttpResponse) -> SyncResult<()> {
    match response.status {
        200..=299 => Ok(()),
        408 | 429 | 500..=599 => Err(SyncError::transport_retryable(format!(
            "server returned status {}",
            response.status
        ))),
        status => Err(SyncError::Rejected(format!(
            "status {}: {}",
            status,
            String::from_utf8_lossy(&response.body)
        ))),
    }
}

impl<C: HttpClient> SyncTransport for HttpTransport<C> {
    fn fetch_profile(
        &self,
        owner: Uuid,
        token: Option<&CacheToken>,
    ) -> SyncResult<Fetched<ProfileDto>> {
        self.get_json(&format!("/v1/users/{owner}/profile"), token)
    }

    fn fetch_settings(
        &self,
        owner: Uuid,
        token: Option<&CacheToken>,
    ) -> SyncResult<Fetched<SettingsDto>> {
        self.get_json(&format!("/v1/users/{owner}/settings"), token)
    }

    fn fetch_system_tags(&self, token: Option<&CacheToken>) -> SyncResult<Fetched<Vec<TagDto>>> {
        self.get_json("/v1/tags/system", token)
    }

    fn push_profile(&self, id: Uuid, update: &ProfileUpdate) -> SyncResult<ProfileDto> {
        self.put_json(
            &format!("/v1/profiles/{id}"),
            update,
            update.idempotency_key.as_str(),
        )
    }

    fn push_settings(&self, id: Uuid, update: &SettingsUpdate) -> SyncResult<SettingsDto> {
        self.put_json(
            &format!("/v1/settings/{id}"),
            update,
            update.idempotency_key.as_str(),
        )
    }

    fn push_media(&self, snapshot: &MediaDto, key: &IdempotencyKey) -> SyncResult<MediaDto> {
        self.post_json("/v1/media", snapshot, key.as_str())
    }

    fn is_connected(&self) -> bool {
        self.client.is_healthy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use gather_sync_protocol::{SnapshotMeta, SyncMetadata};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    struct TestClient {
        response: Mutex<Option<HttpResponse>>,
        healthy: AtomicBool,
        seen_if_none_match: Mutex<Option<Option<String>>>,
        seen_key: Mutex<Option<String>>,
    }

    impl TestClient {
        fn new() -> Self {
            Self {
                response: Mutex::new(None),
                healthy: AtomicBool::new(true),
                seen_if_none_match: Mutex::new(None),
                seen_key: Mutex::new(None),
            }
        }

        fn set_response(&self, response: HttpResponse) {
            *self.response.lock().unwrap() = Some(response);
        }

        fn take_response(&self) -> Result<HttpResponse, String> {
            self.response
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| "no response set".to_string())
        }
    }

    impl HttpClient for TestClient {
        fn get(&self, _url: &str, if_none_match: Option<&str>) -> Result<HttpResponse, String> {
            *self.seen_if_none_match.lock().unwrap() =
                Some(if_none_match.map(ToOwned::to_owned));
            self.take_response()
        }

        fn put(
            &self,
            _url: &str,
            _body: Vec<u8>,
            idempotency_key: &str,
        ) -> Result<HttpResponse, String> {
            *self.seen_key.lock().unwrap() = Some(idempotency_key.to_owned());
            self.take_response()
        }

        fn post(
            &self,
            _url: &str,
            _body: Vec<u8>,
            idempotency_key: &str,
        ) -> Result<HttpResponse, String> {
            *self.seen_key.lock().unwrap() = Some(idempotency_key.to_owned());
            self.take_response()
        }

        fn is_healthy(&self) -> bool {
            self.healthy.load(Ordering::SeqCst)
        }
    }

    fn profile_body() -> Vec<u8> {
        let meta = SyncMetadata::new(Utc.timestamp_opt(100, 0).unwrap());
        let dto = ProfileDto {
            meta: SnapshotMeta::from(&meta),
            username: None,
            display_name: "Alex".into(),
            avatar_url: None,
            bio: None,
            age_years: None,
            gender: None,
            is_verified: false,
        };
        serde_json::to_vec(&dto).unwrap()
    }

    #[test]
    fn fetch_echoes_token_and_captures_new_one() {
        let client = TestClient::new();
        client.set_response(HttpResponse {
            status: 200,
            etag: Some("W/\"v2\"".into()),
            body: profile_body(),
        });
        let transport = HttpTransport::new("https://api.gather.example", &client);

        let token = CacheToken::new("W/\"v1\"");
        let fetched = transport
            .fetch_profile(Uuid::new_v4(), Some(&token))
            .unwrap();

        assert_eq!(
            client.seen_if_none_match.lock().unwrap().clone().unwrap(),
            Some("W/\"v1\"".to_owned())
        );
        match fetched {
            Fetched::Changed { token, .. } => assert_eq!(token.unwrap().as_str(), "W/\"v2\""),
            Fetched::NotModified => panic!("expected changed fetch"),
        }
    }

    #[test]
    fn not_modified_short_circuits() {
        let client = TestClient::new();
        client.set_response(HttpResponse {
            status: 304,
            etag: None,
            body: Vec::new(),
        });
        let transport = HttpTransport::new("https://api.gather.example", &client);

        let fetched = transport.fetch_profile(Uuid::new_v4(), None).unwrap();
        assert!(fetched.is_not_modified());
    }

    #[test]
    fn server_errors_are_retryable() {
        let client = TestClient::new();
        client.set_response(HttpResponse {
            status: 503,
            etag: None,
            body: Vec::new(),
        });
        let transport = HttpTransport::new("https://api.gather.example", &client);

        let err = transport.fetch_system_tags(None).unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn client_errors_are_definitive_rejections() {
        let client = TestClient::new();
        client.set_response(HttpResponse {
            status: 422,
            etag: None,
            body: b"display_name must not be empty".to_vec(),
        });
        let transport = HttpTransport::new("https://api.gather.example", &client);

        let meta = SyncMetadata::new(Utc.timestamp_opt(100, 0).unwrap());
        let dto = ProfileDto {
            meta: SnapshotMeta::from(&meta),
            username: None,
            display_name: String::new(),
            avatar_url: None,
            bio: None,
            age_years: None,
            gender: None,
            is_verified: false,
        };
        let update = ProfileUpdate::from_snapshot(&dto, IdempotencyKey::mint());

        let err = transport.push_profile(meta.id, &update).unwrap_err();
        assert!(matches!(err, SyncError::Rejected(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn idempotency_key_travels_as_header() {
        let client = TestClient::new();
        client.set_response(HttpResponse {
            status: 200,
            etag: None,
            body: profile_body(),
        });
        let transport = HttpTransport::new("https://api.gather.example", &client);

        let meta = SyncMetadata::new(Utc.timestamp_opt(100, 0).unwrap());
        let dto = ProfileDto {
            meta: SnapshotMeta::from(&meta),
            username: None,
            display_name: "Alex".into(),
            avatar_url: None,
            bio: None,
            age_years: None,
            gender: None,
            is_verified: false,
        };
        let key = IdempotencyKey::mint();
        let update = ProfileUpdate::from_snapshot(&dto, key.clone());

        transport.push_profile(meta.id, &update).unwrap();
        assert_eq!(
            client.seen_key.lock().unwrap().clone().unwrap(),
            key.as_str()
        );
    }

    #[test]
    fn failed_request_records_error_and_allows_the_next_one() {
        let client = TestClient::new();
        // No response set: the client reports a failed request.
        let transport = HttpTransport::new("https://api.gather.example", &client);

        let err = transport.fetch_system_tags(None).unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(transport.last_error(), Some("no response set".into()));

        // The failure was transient; a later request must go out
        // instead of short-circuiting on stale connection state.
        assert!(transport.is_connected());
        client.set_response(HttpResponse {
            status: 200,
            etag: None,
            body: profile_body(),
        });
        assert!(transport.fetch_profile(Uuid::new_v4(), None).is_ok());
        assert_eq!(transport.last_error(), None);
    }

    #[test]
    fn malformed_success_body_is_a_decode_error() {
        let client = TestClient::new();
        client.set_response(HttpResponse {
            status: 200,
            etag: Some("W/\"v9\"".into()),
            body: b"<html>proxy error</html>".to_vec(),
        });
        let transport = HttpTransport::new("https://api.gather.example", &client);

        let err = transport.fetch_system_tags(None).unwrap_err();
        assert!(matches!(err, SyncError::Decode(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn unhealthy_client_reports_disconnected() {
        let client = TestClient::new();
        client.healthy.store(false, Ordering::SeqCst);
        let transport = HttpTransport::new("https://api.gather.example", &client);
        assert!(!transport.is_connected());
    }
}
