// Copyright 2020-2023 Tauri Programme within The Commons Conservancy
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! The windowing layer the shell drives.
//!
//! [`Native`] is what [`run_with`](crate::run_with) needs from a platform: one window, one webview
//! attached to it, and an event loop delivering [`ShellEvent`]s. The default implementation,
//! [`Desktop`], is built on [tao] and [wry].
//!
//! [tao]: https://crates.io/crates/tao
//! [wry]: https://crates.io/crates/wry

#[cfg(feature = "native")]
mod desktop;

#[cfg(feature = "native")]
pub use desktop::{Desktop, DesktopSink, DesktopWebView};

use crate::{AppConfig, AssetBundle, CallResponse, PlatformOptions, Result, WindowIcon};

/// Platform option keys the desktop host understands.
pub const KNOWN_PLATFORM_OPTIONS: &[&str] = &[
  "transparent",
  "devtools",
  "always_on_top",
  "maximized",
  "focused",
];

/// Events the event loop hands to the shell.
#[derive(Debug)]
pub enum ShellEvent {
  /// A raw IPC message posted by the page.
  Ipc(String),
  /// The reply of a call that ran off the loop.
  Reply(CallResponse),
  /// The user asked to close the window.
  CloseRequested,
}

/// What the shell wants the event loop to do after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
  Continue,
  Exit,
}

/// Posts events to the event loop from any thread.
pub trait EventSink: Clone + Send + 'static {
  /// Returns `false` once the loop is gone.
  fn post(&self, event: ShellEvent) -> bool;
}

/// A webview scripts can be evaluated in.
pub trait ScriptTarget {
  fn evaluate_script(&self, js: &str) -> Result<()>;
}

/// Everything needed to set up the webview.
pub struct WebViewSetup<'a> {
  /// URL loaded first.
  pub url: String,
  /// Bundle served under `scheme`, if the content comes from the bundle.
  pub assets: Option<AssetBundle>,
  pub scheme: &'static str,
  /// Runs before any page script on every navigation.
  pub initialization_script: String,
  /// Replaces the engine's user agent when set.
  pub user_agent: Option<&'a str>,
  pub platform: &'a PlatformOptions,
}

/// A windowing backend.
///
/// Window and webview handles release their native resources when dropped. The shell drops the
/// webview before the window, once each.
pub trait Native {
  type Window;
  type WebView: ScriptTarget;
  type Sink: EventSink;

  /// Creates the window described by `config`, with `icon` already decoded from `config.icon`.
  fn create_window(
    &mut self,
    config: &AppConfig,
    icon: Option<WindowIcon>,
  ) -> Result<Self::Window>;

  /// Creates the webview inside `window`. IPC messages from the page must reach the event loop as
  /// [`ShellEvent::Ipc`].
  fn create_webview(
    &mut self,
    window: &Self::Window,
    setup: WebViewSetup<'_>,
  ) -> Result<Self::WebView>;

  fn sink(&self) -> Self::Sink;

  /// Blocks running the event loop until `handler` returns [`Flow::Exit`].
  fn run(&mut self, handler: &mut dyn FnMut(ShellEvent) -> Flow) -> Result<()>;
}
