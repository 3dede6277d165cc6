// Copyright 2020-2023 Tauri Programme within The Commons Conservancy
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Application configuration.
//!
//! [`AppConfig`] is assembled once at process start, usually from template values baked into the
//! binary, optionally overridden by a [`ConfigFile`].

use std::{
  collections::BTreeMap,
  fs,
  path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::{AssetBundle, Error, Result};

/// Configuration of the shell: window, content source and platform flags.
#[derive(Debug, Clone)]
pub struct AppConfig {
  /// Window title.
  pub title: String,
  /// Window width in logical pixels.
  pub width: u32,
  /// Window height in logical pixels.
  pub height: u32,
  /// Bundled frontend, served when `start_url` is empty.
  pub assets: Option<AssetBundle>,
  /// Remote start URL. Empty means "serve the bundle".
  pub start_url: String,
  /// Opaque flags only a given platform host interprets.
  pub platform: PlatformOptions,
  /// Whether the window is resizable.
  pub resizable: bool,
  /// Whether to show window decorations (title bar, borders).
  pub decorations: bool,
  /// Whether the window covers the whole monitor it opens on.
  pub fullscreen: bool,
  /// User agent the webview sends instead of the engine's default.
  pub user_agent: Option<String>,
  /// PNG or ICO file used as the window icon.
  pub icon: Option<PathBuf>,
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      title: "webshell".to_string(),
      width: 1024,
      height: 768,
      assets: None,
      start_url: String::new(),
      platform: PlatformOptions::default(),
      resizable: true,
      decorations: true,
      fullscreen: false,
      user_agent: None,
      icon: None,
    }
  }
}

impl AppConfig {
  /// Creates a configuration with the given window title and default values otherwise.
  pub fn new(title: impl Into<String>) -> Self {
    Self {
      title: title.into(),
      ..Default::default()
    }
  }

  /// Sets the window title.
  pub fn title(mut self, title: impl Into<String>) -> Self {
    self.title = title.into();
    self
  }

  /// Sets the window size.
  pub fn size(mut self, width: u32, height: u32) -> Self {
    self.width = width;
    self.height = height;
    self
  }

  /// Sets the asset bundle.
  pub fn assets(mut self, assets: AssetBundle) -> Self {
    self.assets = Some(assets);
    self
  }

  /// Sets the start URL. An empty string keeps the bundle as content source.
  pub fn start_url(mut self, url: impl Into<String>) -> Self {
    self.start_url = url.into();
    self
  }

  /// Sets a platform flag, see [`PlatformOptions`].
  pub fn platform_option(mut self, key: impl Into<String>, value: bool) -> Self {
    self.platform.set(key, value);
    self
  }

  /// Sets whether the window is resizable.
  pub fn resizable(mut self, resizable: bool) -> Self {
    self.resizable = resizable;
    self
  }

  /// Sets whether to show window decorations.
  pub fn decorations(mut self, decorations: bool) -> Self {
    self.decorations = decorations;
    self
  }

  /// Sets whether the window opens fullscreen.
  pub fn fullscreen(mut self, fullscreen: bool) -> Self {
    self.fullscreen = fullscreen;
    self
  }

  /// Sets the webview user agent. An empty string keeps the default.
  pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
    let user_agent = user_agent.into();
    self.user_agent = (!user_agent.is_empty()).then_some(user_agent);
    self
  }

  /// Sets the window icon file.
  pub fn icon(mut self, path: impl Into<PathBuf>) -> Self {
    self.icon = Some(path.into());
    self
  }

  /// Checks the window parameters. A zero sized or untitled window is never created.
  pub fn validate(&self) -> Result<()> {
    if self.width == 0 || self.height == 0 {
      return Err(Error::InvalidConfig(format!(
        "window size must be positive, got {}x{}",
        self.width, self.height
      )));
    }
    if self.title.trim().is_empty() {
      return Err(Error::InvalidConfig("window title is empty".into()));
    }
    Ok(())
  }

  /// The content the webview loads.
  ///
  /// A non-empty start URL wins over the bundle. Having neither is an [`Error::AssetLoad`].
  pub fn content_source(&self) -> Result<ContentSource> {
    if !self.start_url.is_empty() {
      return Ok(ContentSource::Url(self.start_url.clone()));
    }
    match &self.assets {
      Some(bundle) if bundle.is_empty() => Err(Error::AssetLoad("asset bundle is empty".into())),
      Some(bundle) => Ok(ContentSource::Assets(bundle.clone())),
      None => Err(Error::AssetLoad(
        "no asset bundle and no start URL configured".into(),
      )),
    }
  }
}

/// A decoded window icon in 8-bit RGBA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowIcon {
  pub rgba: Vec<u8>,
  pub width: u32,
  pub height: u32,
}

impl WindowIcon {
  /// Decodes a PNG or ICO file.
  pub fn load(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    let image = image::open(path)
      .map_err(|e| Error::Icon(format!("{}: {e}", path.display())))?
      .into_rgba8();
    let (width, height) = image.dimensions();
    Ok(Self {
      rgba: image.into_raw(),
      width,
      height,
    })
  }
}

/// Where the webview gets its content from.
#[derive(Debug, Clone)]
pub enum ContentSource {
  /// Serve the bundle through the custom protocol.
  Assets(AssetBundle),
  /// Navigate to a URL.
  Url(String),
}

/// Boolean flags passed through to the platform host.
///
/// A key may be scoped to one operating system with a `<os>.` prefix, where `<os>` is a value of
/// [`std::env::consts::OS`] such as `windows`, `macos` or `linux`. The scoped key wins over the
/// unscoped one on that platform and is invisible everywhere else. Keys no host knows are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct PlatformOptions(BTreeMap<String, bool>);

const OS_PREFIXES: &[&str] = &[
  "windows", "macos", "linux", "ios", "android", "freebsd", "dragonfly", "openbsd", "netbsd",
];

impl PlatformOptions {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn set(&mut self, key: impl Into<String>, value: bool) {
    self.0.insert(key.into(), value);
  }

  /// Looks up `key` for the current platform.
  pub fn get(&self, key: &str) -> Option<bool> {
    let scoped = format!("{}.{key}", std::env::consts::OS);
    self
      .0
      .get(&scoped)
      .or_else(|| self.0.get(key))
      .copied()
  }

  /// Looks up `key`, defaulting to `false`.
  pub fn flag(&self, key: &str) -> bool {
    self.get(key).unwrap_or(false)
  }

  /// Keys applying to the current platform that are not in `known`.
  pub fn unrecognized<'a>(&'a self, known: &[&str]) -> Vec<&'a str> {
    self
      .0
      .keys()
      .filter(|key| match key.split_once('.') {
        Some((os, rest)) if OS_PREFIXES.contains(&os) => {
          os == std::env::consts::OS && !known.contains(&rest)
        }
        _ => !known.contains(&key.as_str()),
      })
      .map(String::as_str)
      .collect()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn merge(&mut self, other: PlatformOptions) {
    self.0.extend(other.0);
  }
}

/// Overrides read from a TOML file.
///
/// ```toml
/// title = "My App"
/// url = ""
///
/// [window]
/// width = 1280
/// height = 800
/// resizable = true
/// frameless = false
/// fullscreen = false
/// user_agent = "MyApp/1.0"
/// icon = "icons/app.png"
///
/// [platform]
/// transparent = false
/// "windows.transparent" = true
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
  pub title: Option<String>,
  pub url: Option<String>,
  pub window: WindowSection,
  pub platform: PlatformOptions,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WindowSection {
  pub width: Option<u32>,
  pub height: Option<u32>,
  pub resizable: Option<bool>,
  pub frameless: Option<bool>,
  pub fullscreen: Option<bool>,
  pub user_agent: Option<String>,
  /// Relative paths are resolved against the directory of the file.
  pub icon: Option<PathBuf>,
}

impl ConfigFile {
  pub fn from_toml(source: &str) -> Result<Self> {
    Ok(toml::from_str(source)?)
  }

  pub fn load(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    let source = fs::read_to_string(path)?;
    let mut file = Self::from_toml(&source)?;
    if let (Some(icon), Some(dir)) = (&mut file.window.icon, path.parent()) {
      if icon.is_relative() {
        *icon = dir.join(&*icon);
      }
    }
    Ok(file)
  }

  /// Applies every value present in the file over `config`.
  pub fn apply(self, mut config: AppConfig) -> AppConfig {
    if let Some(title) = self.title {
      config.title = title;
    }
    if let Some(url) = self.url {
      config.start_url = url;
    }
    if let Some(width) = self.window.width {
      config.width = width;
    }
    if let Some(height) = self.window.height {
      config.height = height;
    }
    if let Some(resizable) = self.window.resizable {
      config.resizable = resizable;
    }
    if let Some(frameless) = self.window.frameless {
      config.decorations = !frameless;
    }
    if let Some(fullscreen) = self.window.fullscreen {
      config.fullscreen = fullscreen;
    }
    if let Some(user_agent) = self.window.user_agent {
      config = config.user_agent(user_agent);
    }
    if let Some(icon) = self.window.icon {
      config.icon = Some(icon);
    }
    config.platform.merge(self.platform);
    config
  }
}
