// Copyright 2020-2023 Tauri Programme within The Commons Conservancy
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! A resource-tracking windowing backend for driving the shell in tests.

#![allow(dead_code)]

use std::{
  cell::RefCell,
  rc::Rc,
  sync::{
    atomic::{AtomicUsize, Ordering},
    mpsc::{channel, Receiver, Sender},
    Arc,
  },
  time::{Duration, Instant},
};

use webshell::{
  AppConfig, AssetBundle, Error, EventSink, Flow, Native, Result, ScriptTarget, ShellEvent,
  WebViewSetup, WindowIcon,
};

/// What the fake saw, shared with the test after the backend is consumed.
#[derive(Clone, Default)]
pub struct Probe {
  pub log: Rc<RefCell<Vec<&'static str>>>,
  pub scripts: Rc<RefCell<Vec<String>>>,
  pub evaluated_at: Rc<RefCell<Vec<Instant>>>,
  pub started_at: Rc<RefCell<Option<Instant>>>,
  pub window: Rc<RefCell<Option<RecordedWindow>>>,
  pub setup: Rc<RefCell<Option<Recorded>>>,
  /// Events the sink failed to post because the loop was gone.
  pub undelivered: Arc<AtomicUsize>,
}

impl Probe {
  pub fn log(&self) -> Vec<&'static str> {
    self.log.borrow().clone()
  }

  pub fn scripts(&self) -> Vec<String> {
    self.scripts.borrow().clone()
  }

  pub fn setup(&self) -> Recorded {
    self.setup.borrow().clone().expect("no webview was created")
  }

  pub fn window(&self) -> RecordedWindow {
    self.window.borrow().clone().expect("no window was created")
  }

  /// Time from loop start to each evaluated script.
  pub fn latencies(&self) -> Vec<Duration> {
    let started = self.started_at.borrow().expect("loop never started");
    self
      .evaluated_at
      .borrow()
      .iter()
      .map(|at| at.duration_since(started))
      .collect()
  }

  pub fn undelivered(&self) -> usize {
    self.undelivered.load(Ordering::SeqCst)
  }
}

#[derive(Clone)]
pub struct RecordedWindow {
  pub title: String,
  pub fullscreen: bool,
  pub icon_size: Option<(u32, u32)>,
}

#[derive(Clone)]
pub struct Recorded {
  pub url: String,
  pub assets: Option<AssetBundle>,
  pub scheme: &'static str,
  pub initialization_script: String,
  pub user_agent: Option<String>,
  pub transparent: bool,
}

pub struct FakeNative {
  probe: Probe,
  tx: Sender<ShellEvent>,
  rx: Receiver<ShellEvent>,
  fail_window: bool,
  fail_webview: bool,
  close_after_scripts: Option<usize>,
}

impl FakeNative {
  pub fn new() -> (Self, Probe) {
    let (tx, rx) = channel();
    let probe = Probe::default();
    let native = Self {
      probe: probe.clone(),
      tx,
      rx,
      fail_window: false,
      fail_webview: false,
      close_after_scripts: None,
    };
    (native, probe)
  }

  pub fn fail_window(mut self) -> Self {
    self.fail_window = true;
    self
  }

  pub fn fail_webview(mut self) -> Self {
    self.fail_webview = true;
    self
  }

  /// Requests close once the webview evaluated `count` scripts.
  pub fn close_after_scripts(mut self, count: usize) -> Self {
    self.close_after_scripts = Some(count);
    self
  }

  /// Queues an IPC message as if the page posted it.
  pub fn post(self, message: &str) -> Self {
    self.tx.send(ShellEvent::Ipc(message.to_string())).unwrap();
    self
  }

  pub fn close(self) -> Self {
    self.tx.send(ShellEvent::CloseRequested).unwrap();
    self
  }
}

pub struct FakeWindow {
  log: Rc<RefCell<Vec<&'static str>>>,
}

impl Drop for FakeWindow {
  fn drop(&mut self) {
    self.log.borrow_mut().push("window destroyed");
  }
}

pub struct FakeWebView {
  log: Rc<RefCell<Vec<&'static str>>>,
  scripts: Rc<RefCell<Vec<String>>>,
  evaluated_at: Rc<RefCell<Vec<Instant>>>,
}

impl ScriptTarget for FakeWebView {
  fn evaluate_script(&self, js: &str) -> Result<()> {
    self.evaluated_at.borrow_mut().push(Instant::now());
    self.scripts.borrow_mut().push(js.to_string());
    Ok(())
  }
}

impl Drop for FakeWebView {
  fn drop(&mut self) {
    self.log.borrow_mut().push("webview destroyed");
  }
}

#[derive(Clone)]
pub struct FakeSink {
  tx: Sender<ShellEvent>,
  undelivered: Arc<AtomicUsize>,
}

impl EventSink for FakeSink {
  fn post(&self, event: ShellEvent) -> bool {
    let posted = self.tx.send(event).is_ok();
    if !posted {
      self.undelivered.fetch_add(1, Ordering::SeqCst);
    }
    posted
  }
}

impl Native for FakeNative {
  type Window = FakeWindow;
  type WebView = FakeWebView;
  type Sink = FakeSink;

  fn create_window(
    &mut self,
    config: &AppConfig,
    icon: Option<WindowIcon>,
  ) -> Result<FakeWindow> {
    if self.fail_window {
      return Err(Error::Initialization("window: no display".into()));
    }
    *self.probe.window.borrow_mut() = Some(RecordedWindow {
      title: config.title.clone(),
      fullscreen: config.fullscreen,
      icon_size: icon.map(|icon| (icon.width, icon.height)),
    });
    self.probe.log.borrow_mut().push("window created");
    Ok(FakeWindow {
      log: self.probe.log.clone(),
    })
  }

  fn create_webview(
    &mut self,
    _window: &FakeWindow,
    setup: WebViewSetup<'_>,
  ) -> Result<FakeWebView> {
    if self.fail_webview {
      return Err(Error::Initialization("webview: runtime missing".into()));
    }
    *self.probe.setup.borrow_mut() = Some(Recorded {
      url: setup.url,
      assets: setup.assets,
      scheme: setup.scheme,
      initialization_script: setup.initialization_script,
      user_agent: setup.user_agent.map(str::to_owned),
      transparent: setup.platform.flag("transparent"),
    });
    self.probe.log.borrow_mut().push("webview created");
    Ok(FakeWebView {
      log: self.probe.log.clone(),
      scripts: self.probe.scripts.clone(),
      evaluated_at: self.probe.evaluated_at.clone(),
    })
  }

  fn sink(&self) -> FakeSink {
    FakeSink {
      tx: self.tx.clone(),
      undelivered: self.probe.undelivered.clone(),
    }
  }

  fn run(&mut self, handler: &mut dyn FnMut(ShellEvent) -> Flow) -> Result<()> {
    self.probe.log.borrow_mut().push("loop started");
    *self.probe.started_at.borrow_mut() = Some(Instant::now());
    while let Ok(event) = self.rx.recv_timeout(Duration::from_secs(5)) {
      if handler(event) == Flow::Exit {
        break;
      }
      if let Some(count) = self.close_after_scripts {
        if self.probe.scripts.borrow().len() >= count {
          self.tx.send(ShellEvent::CloseRequested).unwrap();
        }
      }
    }
    self.probe.log.borrow_mut().push("loop exited");
    Ok(())
  }
}

pub fn bundle() -> AssetBundle {
  AssetBundle::from_entries([
    ("index.html", b"<script src=\"main.js\"></script>".to_vec()),
    ("main.js", b"window.backend.App.Greet('World')".to_vec()),
  ])
}

pub fn config() -> AppConfig {
  AppConfig::new("Test").size(800, 600).assets(bundle())
}
