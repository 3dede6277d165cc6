// Copyright 2020-2023 Tauri Programme within The Commons Conservancy
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! The host shell: window and webview lifecycle around the bridge.

use std::process::ExitCode;

use crate::{
  assets::{protocol_url, ENTRY_DOCUMENT, PROTOCOL_SCHEME},
  AppConfig, Bridge, CallResponse, ContentSource, Error, EventSink, Flow, Native, Result,
  ScriptTarget, ShellEvent, WebViewSetup, WindowIcon,
};

/// Outcome of [`run`], meant to become the process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus(i32);

impl ExitStatus {
  /// The window was closed normally.
  pub const SUCCESS: ExitStatus = ExitStatus(0);
  /// The window or webview could not be created, or the configuration was invalid.
  pub const INITIALIZATION_FAILED: ExitStatus = ExitStatus(1);
  /// There was nothing to load: no bundle root and no start URL.
  pub const ASSET_LOAD_FAILED: ExitStatus = ExitStatus(2);

  pub fn code(self) -> i32 {
    self.0
  }

  pub fn is_success(self) -> bool {
    self == Self::SUCCESS
  }
}

impl From<ExitStatus> for ExitCode {
  fn from(status: ExitStatus) -> Self {
    ExitCode::from(status.0.clamp(0, u8::MAX as i32) as u8)
  }
}

/// Runs the shell on the [tao] + [wry] host until the window closes.
///
/// Must be called on the main thread. Startup failures are logged and returned as a non-zero
/// status; the caller decides how to exit.
///
/// [tao]: https://crates.io/crates/tao
/// [wry]: https://crates.io/crates/wry
#[cfg(feature = "native")]
pub fn run(config: AppConfig, bridge: Bridge) -> ExitStatus {
  match crate::native::Desktop::new() {
    Ok(native) => run_with(native, config, bridge),
    Err(e) => fail(e),
  }
}

/// Runs the shell on `native` until the window closes.
pub fn run_with<N: Native>(mut native: N, config: AppConfig, bridge: Bridge) -> ExitStatus {
  match serve(&mut native, &config, &bridge) {
    Ok(()) => {
      tracing::info!("window closed");
      ExitStatus::SUCCESS
    }
    Err(e) => fail(e),
  }
}

fn fail(e: Error) -> ExitStatus {
  let status = e.exit_status();
  tracing::error!(error = %e, code = status.code(), "shell failed to start");
  status
}

fn serve<N: Native>(native: &mut N, config: &AppConfig, bridge: &Bridge) -> Result<()> {
  config.validate()?;
  let setup = prepare(config, bridge)?;
  tracing::info!(title = %config.title, url = %setup.url, "starting shell");

  let icon = config.icon.as_deref().map(WindowIcon::load).transpose()?;
  let window = native.create_window(config, icon)?;
  let webview = native.create_webview(&window, setup)?;
  let sink = native.sink();

  native.run(&mut |event| match event {
    ShellEvent::Ipc(message) => {
      let sink = sink.clone();
      let reply = bridge.handle(&message, move |reply| {
        if !sink.post(ShellEvent::Reply(reply)) {
          tracing::debug!("event loop gone, dropping reply");
        }
      });
      if let Some(reply) = reply {
        deliver(&webview, &reply);
      }
      Flow::Continue
    }
    ShellEvent::Reply(reply) => {
      deliver(&webview, &reply);
      Flow::Continue
    }
    ShellEvent::CloseRequested => Flow::Exit,
  })?;

  drop(webview);
  drop(window);
  Ok(())
}

fn prepare<'a>(config: &'a AppConfig, bridge: &Bridge) -> Result<WebViewSetup<'a>> {
  let (url, assets) = match config.content_source()? {
    ContentSource::Url(url) => (url, None),
    ContentSource::Assets(bundle) => {
      bundle.resolve(ENTRY_DOCUMENT).map_err(|e| {
        Error::AssetLoad(format!("bundle root can't be resolved: {e}"))
      })?;
      (protocol_url(PROTOCOL_SCHEME, ENTRY_DOCUMENT), Some(bundle))
    }
  };

  Ok(WebViewSetup {
    url,
    assets,
    scheme: PROTOCOL_SCHEME,
    initialization_script: bridge.init_script(),
    user_agent: config.user_agent.as_deref(),
    platform: &config.platform,
  })
}

fn deliver<W: ScriptTarget>(webview: &W, reply: &CallResponse) {
  let _span = tracing::debug_span!("webshell::eval", id = reply.id).entered();
  if let Err(e) = webview.evaluate_script(&reply.to_script()) {
    tracing::warn!(id = reply.id, error = %e, "failed to deliver bridge reply");
  }
}
