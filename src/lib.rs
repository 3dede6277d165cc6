// Copyright 2020-2023 Tauri Programme within The Commons Conservancy
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Webshell is a minimal desktop application shell.
//!
//! It opens one native window hosting a webview, serves an [`AssetBundle`] embedded at build time
//! (or navigates to a start URL), and exposes the methods of explicitly constructed [`Binding`]s
//! to frontend code. Here's the whole wiring of a typical application:
//!
//! ```no_run
//! use webshell::{AppConfig, AssetBundle, Binding, Bridge};
//!
//! struct App;
//!
//! impl App {
//!   fn greet(&self, name: &str) -> String {
//!     format!("Hello, {name}!")
//!   }
//! }
//!
//! fn main() -> webshell::Result<()> {
//!   let mut bridge = Bridge::new();
//!   bridge.bind(
//!     Binding::new("App", App)
//!       .method("Greet", |app, (name,): (String,)| app.greet(&name))
//!       .build()?,
//!   )?;
//!
//!   let config = AppConfig::new("Hello")
//!     .size(1024, 768)
//!     .assets(AssetBundle::embedded());
//!
//!   let status = webshell::run(config, bridge);
//!   std::process::exit(status.code());
//! }
//! ```
//!
//! Frontend code then calls `await window.backend.App.Greet("World")`.
//!
//! ## Feature flags
//!
//! - `native`: The [tao] + [wry] host used by [`run`]. Enabled by default. Without it only the
//!   platform independent parts (bundle, bridge, shell driven by a custom [`Native`]) are built.
//!
//! [tao]: https://crates.io/crates/tao
//! [wry]: https://crates.io/crates/wry

#![allow(clippy::new_without_default)]
#![allow(clippy::type_complexity)]

pub mod assets;
pub mod bridge;
pub mod config;
pub mod native;
pub mod shell;

pub use assets::{Asset, AssetBundle};
pub use bridge::{
  Binding, BindingBuilder, Bridge, CallError, CallRequest, CallResponse, Outcome, Shared,
};
pub use config::{AppConfig, ConfigFile, ContentSource, PlatformOptions, WindowIcon};
pub use native::{EventSink, Flow, Native, ScriptTarget, ShellEvent, WebViewSetup};
#[cfg(feature = "native")]
pub use shell::run;
pub use shell::{run_with, ExitStatus};

/// Convenient type alias of Result type for webshell.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by webshell.
///
/// Failures of a single bridge call are [`CallError`]s instead; they never leave the bridge.
#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum Error {
  #[error("Invalid app configuration: {0}")]
  InvalidConfig(String),
  #[error("Failed to initialize the {0}")]
  Initialization(String),
  #[error("Failed to load window icon: {0}")]
  Icon(String),
  #[error("Failed to evaluate script: {0}")]
  Script(String),
  #[error("Failed to load assets: {0}")]
  AssetLoad(String),
  #[error("Asset not found: {0}")]
  AssetNotFound(String),
  #[error("Duplicate binding registered: {0}")]
  DuplicateBinding(String),
  #[error("Duplicate method registered: {binding}.{method}")]
  DuplicateMethod { binding: String, method: String },
  #[error(transparent)]
  Config(#[from] toml::de::Error),
  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),
}

impl Error {
  /// The process exit status this error maps to when it aborts startup.
  pub fn exit_status(&self) -> ExitStatus {
    match self {
      Error::AssetLoad(_) | Error::AssetNotFound(_) => ExitStatus::ASSET_LOAD_FAILED,
      _ => ExitStatus::INITIALIZATION_FAILED,
    }
  }
}
