//! Response writing
//!
//! Turns a routed request into the bytes written back to the client:
//! a local file, a directory listing, a relayed upstream payload, or an
//! error page. Error pages prefer the per-server configured file and
//! fall back to a built-in HTML page.

use std::fs;
use std::path::Path;

use tracing::{debug, error};

use crate::config::{Config, LocationKind, ServerConfig};
use crate::http::{Method, Request, Response, Status};
use crate::proxy;
use crate::server::router::RoutedRequest;

/// Produce the full response bytes for a routed request
pub fn respond(routed: &RoutedRequest, config: &Config) -> Vec<u8> {
    let server = routed.server(config);

    if let Some(request_error) = routed.error {
        return error_response(request_error.status(), server);
    }

    let (Some(request), Some(location)) = (routed.request.as_ref(), routed.location(config))
    else {
        // A routed request without an error always carries both
        return error_response(Status::INTERNAL_SERVER_ERROR, server);
    };

    match location.kind {
        LocationKind::Proxy => {
            match proxy::forward(
                &routed.raw,
                &location.uri,
                &location.upstream_key(),
                routed.proxy_addr,
            ) {
                Ok(payload) => payload,
                Err(e) => {
                    error!(upstream = %location.upstream_key(), "proxy failure: {e}");
                    error_response(Status::BAD_GATEWAY, server)
                }
            }
        }
        LocationKind::Cgi => error_response(Status::NOT_IMPLEMENTED, server),
        LocationKind::Root | LocationKind::Alias => {
            serve_local(request, routed.target_path.as_deref(), server)
        }
    }
}

fn serve_local(
    request: &Request,
    target: Option<&Path>,
    server: Option<&ServerConfig>,
) -> Vec<u8> {
    let Some(path) = target else {
        return error_response(Status::NOT_FOUND, server);
    };

    match request.method {
        Method::Delete => match fs::remove_file(path) {
            Ok(()) => {
                debug!(path = %path.display(), "deleted");
                finish(Status::NO_CONTENT, "text/plain", Vec::new(), false)
            }
            Err(e) => {
                error!(path = %path.display(), "delete failed: {e}");
                error_response(Status::INTERNAL_SERVER_ERROR, server)
            }
        },
        ref method => {
            let head_only = *method == Method::Head;
            if path.is_dir() {
                // Only reachable with autoindex enabled
                match render_autoindex(path, &request.uri) {
                    Ok(listing) => finish(Status::OK, "text/html", listing, head_only),
                    Err(e) => {
                        error!(path = %path.display(), "listing failed: {e}");
                        error_response(Status::INTERNAL_SERVER_ERROR, server)
                    }
                }
            } else {
                match fs::read(path) {
                    Ok(body) => finish(Status::OK, content_type(path), body, head_only),
                    Err(e) => {
                        error!(path = %path.display(), "read failed: {e}");
                        error_response(Status::NOT_FOUND, server)
                    }
                }
            }
        }
    }
}

/// Render an error status, preferring the server's configured page file
pub fn error_response(status: Status, server: Option<&ServerConfig>) -> Vec<u8> {
    if let Some(page) = server.and_then(|s| s.error_page(status.code())) {
        if let Ok(body) = fs::read(page) {
            return finish(status, "text/html", body, false);
        }
        debug!(page = %page.display(), "configured error page unreadable, using built-in");
    }
    finish(status, "text/html", builtin_page(status).into_bytes(), false)
}

fn builtin_page(status: Status) -> String {
    format!(
        "<html>\n<head><title>{code} {reason}</title></head>\n\
         <body>\n<h1>{code} {reason}</h1>\n<hr>\n<p>pollserv</p>\n</body>\n</html>\n",
        code = status.code(),
        reason = status.reason_phrase()
    )
}

fn finish(status: Status, content_type: &str, body: Vec<u8>, head_only: bool) -> Vec<u8> {
    let mut builder = Response::builder()
        .status(status)
        .header("Content-Type", content_type)
        .header("Content-Length", body.len().to_string())
        .header("Connection", "close");
    if !head_only {
        builder = builder.body(body);
    }
    builder.build().to_wire()
}

fn render_autoindex(dir: &Path, uri: &str) -> std::io::Result<Vec<u8>> {
    let base = uri.trim_end_matches('/');

    let mut names: Vec<String> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let mut name = entry.file_name().to_string_lossy().into_owned();
        if entry.file_type()?.is_dir() {
            name.push('/');
        }
        names.push(name);
    }
    names.sort();

    let mut page = format!(
        "<html>\n<head><title>Index of {base}/</title></head>\n\
         <body>\n<h1>Index of {base}/</h1>\n<hr>\n<ul>\n"
    );
    for name in names {
        page.push_str(&format!("<li><a href=\"{base}/{name}\">{name}</a></li>\n"));
    }
    page.push_str("</ul>\n<hr>\n</body>\n</html>\n");

    Ok(page.into_bytes())
}

fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html") | Some("htm") => "text/html",
        Some("css") => "text/css",
        Some("js") => "application/javascript",
        Some("json") => "application/json",
        Some("txt") => "text/plain",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}
