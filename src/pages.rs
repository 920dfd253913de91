//! Page shell served for every navigation the edge guard admits.
//!
//! Rendering the clinic UI happens client-side; the server only hands out a
//! bootstrap document naming the requested path.

use axum::{
    http::{Uri, header},
    response::{IntoResponse, Response},
};

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub async fn shell(uri: Uri) -> Response {
    let path = escape(uri.path());
    let html = format!(
        "<!doctype html><html><head><meta charset=\"utf-8\"><title>{path}</title></head>\
         <body data-path=\"{path}\"><div id=\"app\"></div></body></html>"
    );
    (
        [
            (header::CONTENT_TYPE, "text/html; charset=utf-8"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        html,
    )
        .into_response()
}
