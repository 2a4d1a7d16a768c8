//! HTTP collaborator used for asset web pages, file downloads and tracker calls
//!
//! Every request is a single blocking attempt with its own timeout. The
//! outcome is always a [`Downloaded`] value: failures are reported in
//! `error` rather than returned as `Err`, so callers can map them onto
//! asset and balance states.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ServerError;

/// Content types the wallet knows how to cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MimeType {
    Pdf,
    Zip,
    Gif,
    Html,
    Jpeg,
    Png,
    Csv,
    JavaScript,
    Text,
    Json,
    MsWord,
    Rtf,
    Gzip,
    Tar,
    Bmp,
    Tiff,
}

// First match wins in both directions, so canonical spellings come first.
const MIME_TABLE: &[(MimeType, &str, &str)] = &[
    (MimeType::Pdf, "application/pdf", ".pdf"),
    (MimeType::Zip, "application/zip", ".zip"),
    (MimeType::Gif, "image/gif", ".gif"),
    (MimeType::Html, "text/html", ".html"),
    (MimeType::Jpeg, "image/jpeg", ".jpg"),
    (MimeType::Png, "image/png", ".png"),
    (MimeType::Csv, "text/csv", ".csv"),
    (MimeType::JavaScript, "text/javascript", ".js"),
    (MimeType::Text, "text/plain", ".txt"),
    (MimeType::Json, "application/json", ".json"),
    (MimeType::MsWord, "application/msword", ".doc"),
    (MimeType::Rtf, "application/rtf", ".rtf"),
    (MimeType::Gzip, "application/x-gzip", ".gz"),
    (MimeType::Tar, "application/x-tar", ".tar"),
    (MimeType::Bmp, "image/bmp", ".bmp"),
    (MimeType::Tiff, "image/tiff", ".tif"),
    (MimeType::Text, "application/plain", ".text"),
    (MimeType::Rtf, "application/x-rtf", ".rtf"),
    (MimeType::Rtf, "text/richtext", ".rtx"),
    (MimeType::Gzip, "application/gzip", ".gzip"),
    (MimeType::Jpeg, "image/pjpeg", ".jpeg"),
    (MimeType::Jpeg, "image/jpeg", ".jpe"),
    (MimeType::Jpeg, "image/pjpeg", ".jfif"),
    (MimeType::Png, "image/x-png", ".x-png"),
    (MimeType::Bmp, "image/x-windows-bmp", ".bmp"),
    (MimeType::Tiff, "image/x-tiff", ".tiff"),
    (MimeType::Html, "text/html", ".htm"),
    (MimeType::Html, "text/html", ".shtml"),
];

impl MimeType {
    /// Resolve a `Content-Type` header value, ignoring parameters such as `charset`
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        MIME_TABLE
            .iter()
            .find(|(_, ty, _)| *ty == essence)
            .map(|(mime, _, _)| *mime)
    }

    /// Resolve a file extension, with or without the leading dot
    pub fn from_extension(extension: &str) -> Option<Self> {
        let ext = extension.trim().to_ascii_lowercase();
        let ext = if ext.starts_with('.') {
            ext
        } else {
            format!(".{}", ext)
        };
        MIME_TABLE
            .iter()
            .find(|(_, _, e)| *e == ext)
            .map(|(mime, _, _)| *mime)
    }

    /// Canonical content type, e.g. `application/pdf`
    pub fn content_type(&self) -> &'static str {
        self.entry().1
    }

    /// Canonical file extension including the dot, e.g. `.pdf`
    pub fn extension(&self) -> &'static str {
        self.entry().2
    }

    fn entry(&self) -> &'static (MimeType, &'static str, &'static str) {
        MIME_TABLE
            .iter()
            .find(|(mime, _, _)| mime == self)
            .unwrap_or(&MIME_TABLE[0])
    }
}

/// Result of a single HTTP request
#[derive(Debug, Clone, Default)]
pub struct Downloaded {
    /// Response body (empty when the body was written to `file_path`)
    pub contents: Vec<u8>,
    pub mime_type: Option<MimeType>,
    /// HTTP status, 0 if no response was received
    pub response_code: u16,
    pub error: Option<ServerError>,
    /// Where the body was cached, if a destination prefix was requested
    pub file_path: Option<PathBuf>,
}

impl Downloaded {
    /// A failed request
    pub fn failed(error: ServerError, response_code: u16) -> Self {
        Self {
            error: Some(error),
            response_code,
            ..Default::default()
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Body as text, replacing invalid UTF-8
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.contents).into_owned()
    }
}

/// Blocking HTTP client
pub trait HttpClient: Send + Sync {
    /// GET `url`; when `dest_prefix` is set the body is stored at
    /// `<dest_prefix><extension of the response MIME type>`
    fn fetch(&self, url: &str, timeout: Duration, dest_prefix: Option<&Path>) -> Downloaded;

    /// POST `body` to `url` with extra headers
    fn post(&self, url: &str, timeout: Duration, body: &str, headers: &[(&str, &str)])
        -> Downloaded;
}

/// Prepend `http://` to URLs that have no scheme
pub fn add_http_if_missing(url: &str) -> String {
    match url.find("://") {
        Some(pos) if pos > 0 => url.to_string(),
        _ => format!("http://{}", url),
    }
}

/// Path for a cached file: `<prefix><ext>`
pub fn cached_file_path(prefix: &Path, mime: MimeType) -> PathBuf {
    let mut path = prefix.as_os_str().to_owned();
    path.push(mime.extension());
    PathBuf::from(path)
}

/// [`HttpClient`] backed by `reqwest::blocking`
pub struct ReqwestClient {
    client: reqwest::blocking::Client,
}

impl ReqwestClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
        }
    }

    fn finish(
        &self,
        url: &str,
        result: reqwest::Result<reqwest::blocking::Response>,
        dest_prefix: Option<&Path>,
    ) -> Downloaded {
        let response = match result {
            Ok(response) => response,
            Err(e) => {
                log::error!("Network request: {} - FAILURE, Error: {}", url, e);
                let error = if e.is_connect() || e.is_timeout() {
                    ServerError::ServerCannotConnect
                } else {
                    ServerError::Unknown
                };
                return Downloaded::failed(error, 0);
            }
        };

        let status = response.status().as_u16();
        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(MimeType::from_content_type);

        if let Some(error) = ServerError::from_http_status(status) {
            log::error!("Network request: {} - FAILURE, Response code: {}", url, status);
            return Downloaded {
                mime_type,
                ..Downloaded::failed(error, status)
            };
        }

        let body = match response.bytes() {
            Ok(body) => body.to_vec(),
            Err(e) => {
                log::error!("Network request: {} - FAILURE, Error: {}", url, e);
                return Downloaded::failed(ServerError::ResponseParseError, status);
            }
        };
        log::info!("Network request: {} - SUCCESS, Content size: {}", url, body.len());

        match dest_prefix {
            None => Downloaded {
                contents: body,
                mime_type,
                response_code: status,
                error: None,
                file_path: None,
            },
            Some(prefix) => {
                // Files are cached by extension, so an unrecognised type cannot be stored
                let Some(mime) = mime_type else {
                    log::error!("Network request: {} - unsupported content type", url);
                    return Downloaded::failed(ServerError::ResponseInvalid, status);
                };
                let path = cached_file_path(prefix, mime);
                if let Err(e) = fs::write(&path, &body) {
                    log::error!("Cannot store {}: {}", path.display(), e);
                    return Downloaded::failed(ServerError::Unknown, status);
                }
                Downloaded {
                    contents: Vec::new(),
                    mime_type,
                    response_code: status,
                    error: None,
                    file_path: Some(path),
                }
            }
        }
    }
}

impl Default for ReqwestClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient for ReqwestClient {
    fn fetch(&self, url: &str, timeout: Duration, dest_prefix: Option<&Path>) -> Downloaded {
        let url = add_http_if_missing(url);
        let result = self.client.get(&url).timeout(timeout).send();
        self.finish(&url, result, dest_prefix)
    }

    fn post(
        &self,
        url: &str,
        timeout: Duration,
        body: &str,
        headers: &[(&str, &str)],
    ) -> Downloaded {
        let url = add_http_if_missing(url);
        let mut request = self
            .client
            .post(&url)
            .timeout(timeout)
            .body(body.to_string());
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        let result = request.send();
        self.finish(&url, result, None)
    }
}
