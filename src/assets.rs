// Copyright 2020-2023 Tauri Programme within The Commons Conservancy
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! The frontend asset bundle and the custom protocol serving it.
//!
//! Every file under `frontend/` is embedded into the binary by the build script and exposed by
//! [`AssetBundle::embedded`]. The bundle is addressed like a virtual filesystem root: lookups are
//! exact, case-sensitive matches and nothing outside the root is reachable.

use std::{borrow::Cow, collections::BTreeMap, sync::Arc};

use http::{
  header::{ALLOW, CONTENT_TYPE},
  HeaderValue, Method, Request, Response, StatusCode,
};
use percent_encoding::percent_decode_str;

use crate::{Error, Result};

/// Scheme of the custom protocol the bundle is served under.
pub const PROTOCOL_SCHEME: &str = "webshell";

/// Document loaded when the webview opens the bundle, and served for directory paths.
pub const ENTRY_DOCUMENT: &str = "index.html";

static EMBEDDED: &[(&str, &[u8])] = include!(concat!(env!("OUT_DIR"), "/embedded_assets.rs"));

/// A single embedded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
  content: Cow<'static, [u8]>,
  mime_type: &'static str,
}

impl Asset {
  pub fn new(path: &str, content: impl Into<Cow<'static, [u8]>>) -> Self {
    Self {
      content: content.into(),
      mime_type: mime_type_for(path),
    }
  }

  pub fn content(&self) -> &[u8] {
    &self.content
  }

  pub fn mime_type(&self) -> &'static str {
    self.mime_type
  }
}

/// Immutable mapping from relative path to file content.
///
/// Cloning is cheap and every clone sees the same files.
#[derive(Debug, Clone, Default)]
pub struct AssetBundle {
  files: Arc<BTreeMap<String, Asset>>,
}

impl AssetBundle {
  /// The bundle generated from `frontend/` at build time.
  pub fn embedded() -> Self {
    Self::from_entries(EMBEDDED.iter().copied())
  }

  /// Builds a bundle from `(relative path, content)` pairs. Later duplicates win.
  pub fn from_entries<I, P, C>(entries: I) -> Self
  where
    I: IntoIterator<Item = (P, C)>,
    P: Into<String>,
    C: Into<Cow<'static, [u8]>>,
  {
    let files = entries
      .into_iter()
      .map(|(path, content)| {
        let path = path.into();
        let asset = Asset::new(&path, content);
        (path, asset)
      })
      .collect();
    Self {
      files: Arc::new(files),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.files.is_empty()
  }

  pub fn len(&self) -> usize {
    self.files.len()
  }

  /// Relative paths of every file, sorted.
  pub fn paths(&self) -> impl Iterator<Item = &str> {
    self.files.keys().map(String::as_str)
  }

  /// Resolves a request path to its asset.
  ///
  /// The path may carry one leading `/` and percent-encoded characters. An empty path or one
  /// ending in `/` resolves to [`ENTRY_DOCUMENT`] in that directory. Paths that would leave the
  /// bundle root fail with [`Error::AssetLoad`], unknown paths with [`Error::AssetNotFound`].
  pub fn resolve(&self, path: &str) -> Result<&Asset> {
    let normalized = normalize(path)?;
    self
      .files
      .get(&normalized)
      .ok_or(Error::AssetNotFound(normalized))
  }

  /// Answers a custom protocol request from the bundle.
  pub fn respond<B>(&self, request: &Request<B>) -> Response<Cow<'static, [u8]>> {
    let path = request.uri().path();
    let method = request.method();

    if method != Method::GET && method != Method::HEAD {
      let mut response = Response::new(Cow::Borrowed(&b"Method Not Allowed"[..]));
      *response.status_mut() = StatusCode::METHOD_NOT_ALLOWED;
      response
        .headers_mut()
        .insert(ALLOW, HeaderValue::from_static("GET, HEAD"));
      return response;
    }

    match self.resolve(path) {
      Ok(asset) => {
        let body = if method == Method::HEAD {
          Cow::Borrowed(&[][..])
        } else {
          asset.content.clone()
        };
        let mut response = Response::new(body);
        response
          .headers_mut()
          .insert(CONTENT_TYPE, HeaderValue::from_static(asset.mime_type));
        response
      }
      Err(e) => {
        tracing::debug!(path, error = %e, "asset request failed");
        let mut response = Response::new(Cow::Borrowed(&b"Not Found"[..]));
        *response.status_mut() = StatusCode::NOT_FOUND;
        response
          .headers_mut()
          .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        response
      }
    }
  }
}

/// URL of `path` under the custom protocol `scheme`.
///
/// WebView2 and Android only accept custom schemes through the `http://<scheme>.localhost` form.
pub fn protocol_url(scheme: &str, path: &str) -> String {
  let path = path.trim_start_matches('/');
  if cfg!(any(target_os = "windows", target_os = "android")) {
    format!("http://{scheme}.localhost/{path}")
  } else {
    format!("{scheme}://localhost/{path}")
  }
}

fn normalize(path: &str) -> Result<String> {
  let decoded = percent_decode_str(path)
    .decode_utf8()
    .map_err(|_| Error::AssetLoad(format!("{path:?} is not valid UTF-8")))?;
  let relative = decoded.strip_prefix('/').unwrap_or(&decoded);

  let mut normalized = relative.to_string();
  if normalized.is_empty() || normalized.ends_with('/') {
    normalized.push_str(ENTRY_DOCUMENT);
  }

  let escapes = normalized.split('/').any(|segment| {
    segment.is_empty()
      || segment == "."
      || segment == ".."
      || segment.contains(['\\', '\0', ':'])
  });
  if escapes {
    return Err(Error::AssetLoad(format!(
      "{path:?} escapes the bundle root"
    )));
  }

  Ok(normalized)
}

fn mime_type_for(path: &str) -> &'static str {
  let extension = path
    .rsplit_once('.')
    .map(|(_, ext)| ext.to_ascii_lowercase())
    .unwrap_or_default();

  match extension.as_str() {
    "html" | "htm" => "text/html",
    "css" => "text/css",
    "js" | "mjs" => "text/javascript",
    "json" | "map" => "application/json",
    "txt" => "text/plain",
    "xml" => "application/xml",
    "png" => "image/png",
    "jpg" | "jpeg" => "image/jpeg",
    "gif" => "image/gif",
    "webp" => "image/webp",
    "svg" => "image/svg+xml",
    "ico" => "image/x-icon",
    "woff" => "font/woff",
    "woff2" => "font/woff2",
    "ttf" => "font/ttf",
    "otf" => "font/otf",
    "wasm" => "application/wasm",
    "mp4" => "video/mp4",
    "webm" => "video/webm",
    _ => "application/octet-stream",
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use rstest::rstest;

  fn bundle() -> AssetBundle {
    AssetBundle::from_entries([
      ("index.html", b"<h1>root</h1>".to_vec()),
      ("main.js", b"console.log(1)".to_vec()),
      ("docs/index.html", b"<h1>docs</h1>".to_vec()),
      ("img/My Logo.svg", b"<svg/>".to_vec()),
    ])
  }

  #[rstest]
  #[case("index.html", "<h1>root</h1>")]
  #[case("/index.html", "<h1>root</h1>")]
  #[case("", "<h1>root</h1>")]
  #[case("/", "<h1>root</h1>")]
  #[case("/docs/", "<h1>docs</h1>")]
  #[case("/img/My%20Logo.svg", "<svg/>")]
  fn resolves_bundled_paths(#[case] path: &str, #[case] expected: &str) {
    let bundle = bundle();
    assert_eq!(bundle.resolve(path).unwrap().content(), expected.as_bytes());
  }

  #[test]
  fn resolve_is_deterministic() {
    let bundle = bundle();
    let first = bundle.resolve("main.js").unwrap().clone();
    let second = bundle.resolve("main.js").unwrap();
    assert_eq!(&first, second);
  }

  #[rstest]
  #[case("Index.html")]
  #[case("main.JS")]
  #[case("missing.css")]
  #[case("docs")]
  fn unknown_or_differently_cased_paths_are_not_found(#[case] path: &str) {
    assert!(matches!(
      bundle().resolve(path),
      Err(Error::AssetNotFound(_))
    ));
  }

  #[rstest]
  #[case("../Cargo.toml")]
  #[case("/docs/../../secret")]
  #[case("docs/./index.html")]
  #[case("%2e%2e/secret")]
  #[case("docs%2f..%2f..%2fsecret")]
  #[case("//etc/passwd")]
  #[case("docs\\..\\index.html")]
  #[case("C:/Windows/win.ini")]
  #[case("main.js%00.html")]
  fn escaping_paths_are_rejected(#[case] path: &str) {
    assert!(matches!(bundle().resolve(path), Err(Error::AssetLoad(_))));
  }

  #[test]
  fn invalid_utf8_is_rejected() {
    assert!(matches!(
      bundle().resolve("/%ff%fe"),
      Err(Error::AssetLoad(_))
    ));
  }

  #[rstest]
  #[case("index.html", "text/html")]
  #[case("app.MJS", "text/javascript")]
  #[case("style.css", "text/css")]
  #[case("logo.svg", "image/svg+xml")]
  #[case("module.wasm", "application/wasm")]
  #[case("LICENSE", "application/octet-stream")]
  fn infers_mime_type_from_extension(#[case] path: &str, #[case] mime: &str) {
    assert_eq!(Asset::new(path, Vec::<u8>::new()).mime_type(), mime);
  }

  #[test]
  fn responds_with_content_and_type() {
    let request = Request::get("webshell://localhost/main.js").body(()).unwrap();
    let response = bundle().respond(&request);
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "text/javascript");
    assert_eq!(response.body().as_ref(), b"console.log(1)");
  }

  #[test]
  fn head_request_has_no_body() {
    let request = Request::head("webshell://localhost/").body(()).unwrap();
    let response = bundle().respond(&request);
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "text/html");
    assert!(response.body().is_empty());
  }

  #[rstest]
  #[case("webshell://localhost/nope.html")]
  #[case("webshell://localhost/../../etc/passwd")]
  fn missing_or_escaping_paths_are_404(#[case] uri: &str) {
    let request = Request::get(uri).body(()).unwrap();
    let response = bundle().respond(&request);
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.body().as_ref(), b"Not Found");
  }

  #[test]
  fn non_get_requests_are_405() {
    let request = Request::post("webshell://localhost/index.html")
      .body(Vec::<u8>::new())
      .unwrap();
    let response = bundle().respond(&request);
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(response.headers()[ALLOW], "GET, HEAD");
  }

  #[test]
  fn clones_share_files() {
    let bundle = bundle();
    let clone = bundle.clone();
    assert!(Arc::ptr_eq(&bundle.files, &clone.files));
    assert_eq!(clone.len(), 4);
    assert_eq!(
      clone.paths().collect::<Vec<_>>(),
      vec!["docs/index.html", "img/My Logo.svg", "index.html", "main.js"]
    );
  }

  #[test]
  fn embedded_bundle_has_entry_document() {
    let bundle = AssetBundle::embedded();
    assert_eq!(bundle.resolve("/").unwrap().mime_type(), "text/html");
    assert!(bundle.resolve("main.js").is_ok());
  }

  #[test]
  fn protocol_url_shape() {
    let url = protocol_url(PROTOCOL_SCHEME, "/index.html");
    if cfg!(target_os = "windows") {
      assert_eq!(url, "http://webshell.localhost/index.html");
    } else {
      assert_eq!(url, "webshell://localhost/index.html");
    }
  }
}
