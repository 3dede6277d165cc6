// Copyright 2020-2023 Tauri Programme within The Commons Conservancy
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use tracing_subscriber::EnvFilter;
use webshell::{AppConfig, AssetBundle, Binding, Bridge, ConfigFile};

// Substituted by the app generator before compilation.
const APP_NAME: &str = "{{APP_NAME}}";
const START_URL: &str = "{{URL}}";

const DEFAULT_TITLE: &str = "webshell";

/// The object exposed to the frontend as `window.backend.App`.
struct App;

impl App {
  fn greet(&self, name: &str) -> String {
    format!("Hello, {name}!")
  }
}

#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
  /// TOML file with window and platform overrides.
  #[arg(long)]
  config: Option<PathBuf>,
  /// Load this URL instead of the bundled frontend.
  #[arg(long)]
  url: Option<String>,
  /// Window title.
  #[arg(long)]
  title: Option<String>,
  /// Window width in logical pixels.
  #[arg(long)]
  width: Option<u32>,
  /// Window height in logical pixels.
  #[arg(long)]
  height: Option<u32>,
  /// Open the window fullscreen.
  #[arg(long)]
  fullscreen: bool,
  /// User agent the webview sends.
  #[arg(long)]
  user_agent: Option<String>,
  /// PNG or ICO file used as the window icon.
  #[arg(long)]
  icon: Option<PathBuf>,
}

fn main() -> ExitCode {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("webshell=info")),
    )
    .init();

  let cli = Cli::parse();

  let config = match configure(cli) {
    Ok(config) => config,
    Err(e) => {
      tracing::error!(error = %e, "failed to load configuration");
      return e.exit_status().into();
    }
  };

  let bridge = match bind() {
    Ok(bridge) => bridge,
    Err(e) => {
      tracing::error!(error = %e, "failed to bind backend");
      return e.exit_status().into();
    }
  };

  webshell::run(config, bridge).into()
}

fn configure(cli: Cli) -> webshell::Result<AppConfig> {
  let mut config = AppConfig::new(template_value(APP_NAME).unwrap_or(DEFAULT_TITLE))
    .size(1024, 768)
    .assets(AssetBundle::embedded())
    .start_url(template_value(START_URL).unwrap_or_default())
    .platform_option("windows.transparent", false);

  if let Some(path) = &cli.config {
    config = ConfigFile::load(path)?.apply(config);
  }
  if let Some(url) = cli.url {
    config.start_url = url;
  }
  if let Some(title) = cli.title {
    config.title = title;
  }
  if let Some(width) = cli.width {
    config.width = width;
  }
  if let Some(height) = cli.height {
    config.height = height;
  }
  if cli.fullscreen {
    config.fullscreen = true;
  }
  if let Some(user_agent) = cli.user_agent {
    config = config.user_agent(user_agent);
  }
  if let Some(icon) = cli.icon {
    config.icon = Some(icon);
  }
  Ok(config)
}

fn bind() -> webshell::Result<Bridge> {
  let mut bridge = Bridge::new();
  bridge.bind(
    Binding::new("App", App)
      .method("Greet", |app, (name,): (String,)| app.greet(&name))
      .build()?,
  )?;
  Ok(bridge)
}

// A token the generator did not substitute counts as unset.
fn template_value(value: &'static str) -> Option<&'static str> {
  let unset = value.is_empty() || (value.starts_with("{{") && value.ends_with("}}"));
  (!unset).then_some(value)
}
