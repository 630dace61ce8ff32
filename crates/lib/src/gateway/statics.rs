//! Static file serving for the plain-HTTP path.

use crate::gateway::server::SERVER_IDENT;
use axum::body::Body;
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::Response;
use std::path::Path;

/// Extension-based MIME lookup with a catch-all for unknown types.
fn mime_type(path: &str) -> &'static str {
    let ext = match path.rfind('.') {
        Some(pos) => &path[pos..],
        None => "",
    };
    match ext.to_ascii_lowercase().as_str() {
        ".htm" | ".html" | ".php" => "text/html",
        ".css" => "text/css",
        ".txt" => "text/plain",
        ".js" => "application/javascript",
        ".json" => "application/json",
        ".xml" => "application/xml",
        ".swf" => "application/x-shockwave-flash",
        ".flv" => "video/x-flv",
        ".png" => "image/png",
        ".jpe" | ".jpeg" | ".jpg" => "image/jpeg",
        ".gif" => "image/gif",
        ".bmp" => "image/bmp",
        ".ico" => "image/vnd.microsoft.icon",
        ".tiff" | ".tif" => "image/tiff",
        ".svg" | ".svgz" => "image/svg+xml",
        _ => "application/text",
    }
}

fn text_response(status: StatusCode, body: String) -> Response {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html"));
    headers.insert(header::SERVER, HeaderValue::from_static(SERVER_IDENT));
    response
}

fn bad_request(why: &str) -> Response {
    text_response(StatusCode::BAD_REQUEST, why.to_string())
}

pub fn not_found(target: &str) -> Response {
    text_response(
        StatusCode::NOT_FOUND,
        format!("The resource '{}' was not found.", target),
    )
}

fn server_error(what: &str) -> Response {
    text_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("An error occurred: '{}'", what),
    )
}

/// Serve `target` from under `doc_root`. GET and HEAD only; the target must
/// be absolute and must not climb out of the root. A trailing slash serves
/// the directory's `index.html`.
pub async fn serve(doc_root: &Path, method: &Method, target: &str) -> Response {
    if *method != Method::GET && *method != Method::HEAD {
        return bad_request("Unknown HTTP method");
    }
    if target.is_empty() || !target.starts_with('/') || target.contains("..") {
        return bad_request("Illegal request target");
    }

    let mut path = doc_root.join(&target[1..]);
    if target.ends_with('/') {
        path.push("index.html");
    }

    let contents = match tokio::fs::read(&path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return not_found(target),
        Err(e) => return server_error(&e.to_string()),
    };

    let mime = mime_type(&path.to_string_lossy());
    let length = contents.len();
    let body = if *method == Method::HEAD {
        Body::empty()
    } else {
        Body::from(contents)
    };
    let mut response = Response::new(body);
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(mime));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    headers.insert(header::SERVER, HeaderValue::from_static(SERVER_IDENT));
    response
}
