// Copyright 2020-2023 Tauri Programme within The Commons Conservancy
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

use std::panic::{self, AssertUnwindSafe};

use tao::{
  dpi::LogicalSize,
  event::{Event, StartCause, WindowEvent},
  event_loop::{ControlFlow, EventLoop, EventLoopBuilder, EventLoopProxy},
  platform::run_return::EventLoopExtRunReturn,
  window::{Fullscreen, Icon, Window, WindowBuilder},
};
use wry::{http::Request, WebView, WebViewBuilder};

use super::{
  EventSink, Flow, Native, ScriptTarget, ShellEvent, WebViewSetup, KNOWN_PLATFORM_OPTIONS,
};
use crate::{AppConfig, Error, Result, WindowIcon};

/// The [tao] + [wry] host.
///
/// [tao]: https://crates.io/crates/tao
/// [wry]: https://crates.io/crates/wry
pub struct Desktop {
  event_loop: EventLoop<ShellEvent>,
}

impl Desktop {
  /// Creates the event loop. Must be called on the main thread.
  pub fn new() -> Result<Self> {
    // tao panics when the windowing system can't be reached (no display, no GTK).
    let event_loop = panic::catch_unwind(AssertUnwindSafe(|| {
      EventLoopBuilder::<ShellEvent>::with_user_event().build()
    }))
    .map_err(|_| Error::Initialization("event loop".into()))?;
    Ok(Self { event_loop })
  }
}

/// Posts [`ShellEvent`]s through the tao event loop proxy.
#[derive(Clone)]
pub struct DesktopSink(EventLoopProxy<ShellEvent>);

impl EventSink for DesktopSink {
  fn post(&self, event: ShellEvent) -> bool {
    self.0.send_event(event).is_ok()
  }
}

pub struct DesktopWebView(WebView);

impl ScriptTarget for DesktopWebView {
  fn evaluate_script(&self, js: &str) -> Result<()> {
    self
      .0
      .evaluate_script(js)
      .map_err(|e| Error::Script(e.to_string()))
  }
}

impl Native for Desktop {
  type Window = Window;
  type WebView = DesktopWebView;
  type Sink = DesktopSink;

  fn create_window(&mut self, config: &AppConfig, icon: Option<WindowIcon>) -> Result<Window> {
    let platform = &config.platform;
    let ignored = platform.unrecognized(KNOWN_PLATFORM_OPTIONS);
    if !ignored.is_empty() {
      tracing::debug!(?ignored, "ignoring platform options this host does not know");
    }

    let icon = icon
      .map(|icon| Icon::from_rgba(icon.rgba, icon.width, icon.height))
      .transpose()
      .map_err(|e| Error::Icon(e.to_string()))?;

    WindowBuilder::new()
      .with_title(config.title.as_str())
      .with_inner_size(LogicalSize::new(config.width, config.height))
      .with_resizable(config.resizable)
      .with_decorations(config.decorations)
      .with_fullscreen(config.fullscreen.then(|| Fullscreen::Borderless(None)))
      .with_window_icon(icon)
      .with_transparent(platform.flag("transparent"))
      .with_always_on_top(platform.flag("always_on_top"))
      .with_maximized(platform.flag("maximized"))
      .with_focused(platform.get("focused").unwrap_or(true))
      .build(&self.event_loop)
      .map_err(|e| Error::Initialization(format!("window: {e}")))
  }

  fn create_webview(&mut self, window: &Window, setup: WebViewSetup<'_>) -> Result<DesktopWebView> {
    let proxy = self.event_loop.create_proxy();
    let mut builder = WebViewBuilder::new()
      .with_initialization_script(setup.initialization_script.as_str())
      .with_ipc_handler(move |request: Request<String>| {
        let _span = tracing::trace_span!("webshell::ipc::forward").entered();
        let _ = proxy.send_event(ShellEvent::Ipc(request.into_body()));
      })
      .with_transparent(setup.platform.flag("transparent"))
      .with_devtools(
        setup
          .platform
          .get("devtools")
          .unwrap_or(cfg!(debug_assertions)),
      )
      .with_url(setup.url.as_str());

    if let Some(user_agent) = setup.user_agent {
      builder = builder.with_user_agent(user_agent);
    }

    if let Some(assets) = setup.assets {
      builder = builder.with_custom_protocol(setup.scheme.to_string(), move |_id, request| {
        assets.respond(&request)
      });
    }

    #[cfg(not(linux))]
    let webview = builder.build(window);
    #[cfg(linux)]
    let webview = {
      use tao::platform::unix::WindowExtUnix;
      use wry::WebViewBuilderExtUnix;
      let vbox = window
        .default_vbox()
        .ok_or_else(|| Error::Initialization("webview: window has no GTK container".into()))?;
      builder.build_gtk(vbox)
    };

    webview
      .map(DesktopWebView)
      .map_err(|e| Error::Initialization(format!("webview: {e}")))
  }

  fn sink(&self) -> DesktopSink {
    DesktopSink(self.event_loop.create_proxy())
  }

  fn run(&mut self, handler: &mut dyn FnMut(ShellEvent) -> Flow) -> Result<()> {
    let mut exited = false;
    self.event_loop.run_return(|event, _, control_flow| {
      if exited {
        return;
      }

      let flow = match event {
        Event::NewEvents(StartCause::Init) => {
          tracing::debug!("event loop started");
          Flow::Continue
        }
        Event::WindowEvent {
          event: WindowEvent::CloseRequested,
          ..
        } => handler(ShellEvent::CloseRequested),
        Event::UserEvent(event) => handler(event),
        _ => Flow::Continue,
      };

      *control_flow = match flow {
        Flow::Continue => ControlFlow::Wait,
        Flow::Exit => {
          exited = true;
          ControlFlow::Exit
        }
      };
    });
    Ok(())
  }
}
