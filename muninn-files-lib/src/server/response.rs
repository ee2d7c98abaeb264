#![forbid(unsafe_code)]

use http::StatusCode;

use crate::error::RequestError;

const HTML_UTF8: &str = "text/html; charset=utf-8";
const OCTET_STREAM: &str = "application/octet-stream";

/// A complete response ready for the wire. Every response carries a
/// Content-Length and closes the connection.
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    content_type: &'static str,
    attachment_name: Option<String>,
    body: Vec<u8>,
}

impl Response {
    pub fn new(status: StatusCode, content_type: &'static str, body: Vec<u8>) -> Self {
        Self {
            status,
            content_type,
            attachment_name: None,
            body,
        }
    }

    pub fn html(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self::new(status, HTML_UTF8, body.into())
    }

    /// Octet-stream body delivered with an attachment disposition so
    /// browsers save it instead of rendering it.
    pub fn attachment(filename: String, body: Vec<u8>) -> Self {
        Self {
            status: StatusCode::OK,
            content_type: OCTET_STREAM,
            attachment_name: Some(filename),
            body,
        }
    }

    pub fn bad_request() -> Self {
        Self::html(StatusCode::BAD_REQUEST, "Bad Request")
    }

    pub fn not_found() -> Self {
        Self::html(
            StatusCode::NOT_FOUND,
            "<html><body><h1>404 Not Found</h1></body></html>",
        )
    }

    pub fn too_many_requests() -> Self {
        Self::html(
            StatusCode::TOO_MANY_REQUESTS,
            "<html><body><h1>429 Too Many Requests</h1></body></html>",
        )
    }

    pub fn internal_error() -> Self {
        Self::html(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
    }

    /// The canned response for a failed request, or `None` when the
    /// connection should close without writing anything.
    pub fn for_error(err: &RequestError) -> Option<Self> {
        err.status().map(|status| match status {
            StatusCode::BAD_REQUEST => Self::bad_request(),
            StatusCode::NOT_FOUND => Self::not_found(),
            StatusCode::TOO_MANY_REQUESTS => Self::too_many_requests(),
            _ => Self::internal_error(),
        })
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Encode the status line, headers, and body into one buffer.
    pub fn into_bytes(self) -> Vec<u8> {
        let reason = self.status.canonical_reason().unwrap_or("");
        let mut head = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\n",
            self.status.as_u16(),
            reason,
            self.content_type
        );
        if let Some(name) = &self.attachment_name {
            head.push_str(&format!(
                "Content-Disposition: attachment; filename=\"{name}\"\r\n"
            ));
        }
        head.push_str(&format!(
            "Content-Length: {}\r\nConnection: close\r\n\r\n",
            self.body.len()
        ));
        let mut bytes = head.into_bytes();
        bytes.extend_from_slice(&self.body);
        bytes
    }
}
