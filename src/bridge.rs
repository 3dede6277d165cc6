// Copyright 2020-2023 Tauri Programme within The Commons Conservancy
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! The call bridge between frontend code and bound Rust objects.
//!
//! Each [`Binding`] wraps one live object and a static table of named methods. The [`Bridge`]
//! collects the bindings, generates the script exposing them to the page as
//! `window.backend.<Binding>.<Method>(...args)`, and turns IPC messages into method calls.
//!
//! Messages are JSON [`CallRequest`]s posted through `window.ipc.postMessage`. The result is
//! evaluated back into the page as a [`CallResponse`] passed to `window.__webshell.settle`, which
//! resolves or rejects the promise the frontend got from its call.

use std::{
  any::Any,
  collections::BTreeMap,
  convert::Infallible,
  fmt::Display,
  panic::{self, AssertUnwindSafe},
  sync::{Arc, Mutex, PoisonError},
  thread,
};

use crossbeam_channel::{Receiver, Sender};
use once_cell::unsync::OnceCell;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// A frontend originated call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRequest {
  /// Correlates the reply with the pending frontend promise.
  pub id: u64,
  pub binding: String,
  pub method: String,
  #[serde(default)]
  pub args: Vec<Value>,
}

/// The reply to a [`CallRequest`], serialized as `{"id":1,"ok":...}` or `{"id":1,"error":"..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallResponse {
  pub id: u64,
  #[serde(flatten)]
  pub outcome: Outcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
  Ok(Value),
  Error(String),
}

impl CallResponse {
  pub fn ok(id: u64, value: Value) -> Self {
    Self {
      id,
      outcome: Outcome::Ok(value),
    }
  }

  pub fn error(id: u64, error: CallError) -> Self {
    Self {
      id,
      outcome: Outcome::Error(error.to_string()),
    }
  }

  pub fn is_ok(&self) -> bool {
    matches!(self.outcome, Outcome::Ok(_))
  }

  /// The script settling the pending frontend call.
  pub fn to_script(&self) -> String {
    let reply = serde_json::to_string(self).unwrap_or_else(|e| {
      format!(
        r#"{{"id":{},"error":"failed to serialize reply: {}"}}"#,
        self.id,
        e.to_string().replace(['"', '\\'], "'")
      )
    });
    format!("window.__webshell.settle({reply})")
  }
}

/// Why a single bridge call failed. Delivered to the frontend as a rejection.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
  #[error("malformed bridge message: {0}")]
  Malformed(String),
  #[error("unknown binding: {0}")]
  UnknownBinding(String),
  #[error("unknown method: {0}")]
  UnknownMethod(String),
  #[error("invalid arguments for {method}: {reason}")]
  InvalidArguments { method: String, reason: String },
  #[error("{0}")]
  Failed(String),
  #[error("{method} panicked: {message}")]
  Panicked { method: String, message: String },
  #[error("failed to serialize the result of {method}: {reason}")]
  Serialize { method: String, reason: String },
  #[error("failed to offload {method}: {reason}")]
  Offload { method: String, reason: String },
}

type Invoke = Arc<dyn Fn(Vec<Value>) -> std::result::Result<Value, CallError> + Send + Sync>;

struct Method {
  invoke: Invoke,
  offload: bool,
}

/// A named object whose methods are callable from the frontend.
pub struct Binding {
  name: String,
  methods: BTreeMap<String, Method>,
}

impl Binding {
  /// Starts binding `object` under `name`.
  ///
  /// The object lives as long as the binding. Methods registered with [`BindingBuilder::method`]
  /// and [`BindingBuilder::try_method`] lock it for their whole run, so they never overlap.
  pub fn new<T: Send + 'static>(name: impl Into<String>, object: T) -> BindingBuilder<T> {
    BindingBuilder {
      name: name.into(),
      object: Shared(Arc::new(Mutex::new(object))),
      methods: BTreeMap::new(),
      duplicate: None,
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  /// Method names, sorted.
  pub fn methods(&self) -> impl Iterator<Item = &str> {
    self.methods.keys().map(String::as_str)
  }
}

/// A bound object as seen by methods running on a worker thread.
///
/// The object is locked only while a closure passed to [`Shared::with`] runs. Keep those
/// sections short: calls on the event loop wait for them.
pub struct Shared<T>(Arc<Mutex<T>>);

impl<T> Clone for Shared<T> {
  fn clone(&self) -> Self {
    Self(self.0.clone())
  }
}

impl<T> Shared<T> {
  /// Runs `f` with the object locked.
  pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
    let mut object = self.0.lock().unwrap_or_else(PoisonError::into_inner);
    f(&mut *object)
  }
}

/// Builder returned by [`Binding::new`].
///
/// Arguments arrive as a JSON array and are decoded into the method's argument type, usually a
/// tuple: `(String,)` for one argument, `(i64, i64)` for two, `()` for none. Return values are
/// serialized with serde.
pub struct BindingBuilder<T> {
  name: String,
  object: Shared<T>,
  methods: BTreeMap<String, Method>,
  duplicate: Option<String>,
}

impl<T: Send + 'static> BindingBuilder<T> {
  /// Registers a method that cannot fail.
  pub fn method<A, R, F>(self, name: &str, f: F) -> Self
  where
    A: DeserializeOwned + 'static,
    R: Serialize + 'static,
    F: Fn(&mut T, A) -> R + Send + Sync + 'static,
  {
    self.register(name, false, move |shared: &Shared<T>, args: A| {
      shared.with(|object| Ok::<_, Infallible>(f(object, args)))
    })
  }

  /// Registers a method whose error is delivered to the frontend as a rejection.
  pub fn try_method<A, R, E, F>(self, name: &str, f: F) -> Self
  where
    A: DeserializeOwned + 'static,
    R: Serialize + 'static,
    E: Display + 'static,
    F: Fn(&mut T, A) -> std::result::Result<R, E> + Send + Sync + 'static,
  {
    self.register(name, false, move |shared: &Shared<T>, args: A| {
      shared.with(|object| f(object, args))
    })
  }

  /// Registers a method that runs on a worker thread instead of the event loop.
  ///
  /// Use it for blocking work. The method gets a [`Shared`] handle and locks the object only
  /// where it needs to, so calls on the loop are not held up by the blocking part. The reply is
  /// posted back to the loop when the method returns. At most [`WORKER_THREADS`] offloaded calls
  /// run at once and [`WORKER_QUEUE`] more may wait; calls beyond that are rejected.
  pub fn spawn_method<A, R, E, F>(self, name: &str, f: F) -> Self
  where
    A: DeserializeOwned + 'static,
    R: Serialize + 'static,
    E: Display + 'static,
    F: Fn(&Shared<T>, A) -> std::result::Result<R, E> + Send + Sync + 'static,
  {
    self.register(name, true, f)
  }

  fn register<A, R, E, F>(mut self, name: &str, offload: bool, f: F) -> Self
  where
    A: DeserializeOwned + 'static,
    R: Serialize + 'static,
    E: Display + 'static,
    F: Fn(&Shared<T>, A) -> std::result::Result<R, E> + Send + Sync + 'static,
  {
    let object = self.object.clone();
    let qualified = format!("{}.{}", self.name, name);

    let invoke: Invoke = Arc::new(move |args: Vec<Value>| -> std::result::Result<Value, CallError> {
      let args: A = decode_args(args).map_err(|e| CallError::InvalidArguments {
        method: qualified.clone(),
        reason: e.to_string(),
      })?;

      let outcome = panic::catch_unwind(AssertUnwindSafe(|| f(&object, args)));

      match outcome {
        Ok(Ok(value)) => serde_json::to_value(value).map_err(|e| CallError::Serialize {
          method: qualified.clone(),
          reason: e.to_string(),
        }),
        Ok(Err(e)) => Err(CallError::Failed(e.to_string())),
        Err(payload) => Err(CallError::Panicked {
          method: qualified.clone(),
          message: panic_message(&*payload),
        }),
      }
    });

    if self
      .methods
      .insert(name.to_string(), Method { invoke, offload })
      .is_some()
    {
      self.duplicate.get_or_insert_with(|| name.to_string());
    }
    self
  }

  /// Finishes the binding. Fails if a method name was registered twice.
  pub fn build(self) -> Result<Binding> {
    if let Some(method) = self.duplicate {
      return Err(Error::DuplicateMethod {
        binding: self.name,
        method,
      });
    }
    Ok(Binding {
      name: self.name,
      methods: self.methods,
    })
  }
}

// `()` only deserializes from `null`, so an empty argument list is tried as that first.
fn decode_args<A: DeserializeOwned>(args: Vec<Value>) -> serde_json::Result<A> {
  if args.is_empty() {
    if let Ok(unit) = serde_json::from_value(Value::Null) {
      return Ok(unit);
    }
  }
  serde_json::from_value(Value::Array(args))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
  if let Some(message) = payload.downcast_ref::<&str>() {
    message.to_string()
  } else if let Some(message) = payload.downcast_ref::<String>() {
    message.clone()
  } else {
    "unknown panic".to_string()
  }
}

/// Number of threads running offloaded calls.
pub const WORKER_THREADS: usize = 4;
/// Number of offloaded calls that may wait for a free worker.
pub const WORKER_QUEUE: usize = 64;

type Job = Box<dyn FnOnce() + Send>;

// Threads exit once the sender is dropped and the queue is drained.
struct Workers {
  jobs: Sender<Job>,
}

impl Workers {
  fn start(count: usize) -> std::io::Result<Self> {
    let (jobs, queue) = crossbeam_channel::bounded::<Job>(WORKER_QUEUE);
    for index in 0..count {
      let queue = queue.clone();
      thread::Builder::new()
        .name(format!("webshell worker {index}"))
        .spawn(move || work(queue))?;
    }
    tracing::debug!(threads = count, "started bridge workers");
    Ok(Self { jobs })
  }
}

fn work(queue: Receiver<Job>) {
  for job in queue {
    if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
      tracing::error!("offloaded call panicked while delivering its reply");
    }
  }
}

/// The set of bindings exposed to the frontend. Fixed once the shell runs.
#[derive(Default)]
pub struct Bridge {
  bindings: BTreeMap<String, Binding>,
  workers: OnceCell<Workers>,
}

const INIT_SCRIPT: &str = r#"
(function () {
  if (window.__webshell) return;

  var methods = __WEBSHELL_METHODS__;
  var pending = new Map();
  var nextId = 1;

  function call(binding, method, args) {
    return new Promise(function (resolve, reject) {
      var id = nextId++;
      pending.set(id, { resolve: resolve, reject: reject });
      try {
        window.ipc.postMessage(JSON.stringify({ id: id, binding: binding, method: method, args: args }));
      } catch (e) {
        pending.delete(id);
        reject(e);
      }
    });
  }

  Object.defineProperty(window, '__webshell', {
    value: Object.freeze({
      settle: function (reply) {
        var entry = pending.get(reply.id);
        if (!entry) return;
        pending.delete(reply.id);
        if ('error' in reply) {
          entry.reject(new Error(reply.error));
        } else {
          entry.resolve(reply.ok);
        }
      }
    })
  });

  var backend = {};
  Object.keys(methods).forEach(function (binding) {
    var namespace = {};
    methods[binding].forEach(function (method) {
      namespace[method] = function () {
        return call(binding, method, Array.prototype.slice.call(arguments));
      };
    });
    backend[binding] = Object.freeze(namespace);
  });
  Object.defineProperty(window, 'backend', { value: Object.freeze(backend) });
})();
"#;

impl Bridge {
  pub fn new() -> Self {
    Self::default()
  }

  /// Adds a binding. Binding names are unique.
  pub fn bind(&mut self, binding: Binding) -> Result<&mut Self> {
    if self.bindings.contains_key(&binding.name) {
      return Err(Error::DuplicateBinding(binding.name));
    }
    self.bindings.insert(binding.name.clone(), binding);
    Ok(self)
  }

  pub fn is_empty(&self) -> bool {
    self.bindings.is_empty()
  }

  /// Binding name to sorted method names.
  pub fn method_table(&self) -> BTreeMap<&str, Vec<&str>> {
    self
      .bindings
      .values()
      .map(|binding| (binding.name(), binding.methods().collect()))
      .collect()
  }

  /// Script defining `window.backend` for the current method table.
  pub fn init_script(&self) -> String {
    let table = serde_json::to_string(&self.method_table()).unwrap_or_else(|_| "{}".into());
    INIT_SCRIPT.replace("__WEBSHELL_METHODS__", &table)
  }

  /// Invokes the requested method on the calling thread, offloaded methods included.
  pub fn call(&self, request: CallRequest) -> CallResponse {
    match self.lookup(&request.binding, &request.method) {
      Ok(method) => reply(request.id, (method.invoke)(request.args)),
      Err(e) => CallResponse::error(request.id, e),
    }
  }

  /// Handles a raw IPC message.
  ///
  /// Returns the reply for calls completed on the calling thread. Offloaded calls are queued for
  /// the worker threads, return `None` and hand their reply to `defer` from the worker. A full
  /// queue is answered with an error right away. A message without a usable `id` cannot be
  /// answered and is dropped.
  pub fn handle<F>(&self, raw: &str, defer: F) -> Option<CallResponse>
  where
    F: FnOnce(CallResponse) + Send + 'static,
  {
    let _span = tracing::debug_span!("webshell::ipc::handle").entered();

    let request = match serde_json::from_str::<CallRequest>(raw) {
      Ok(request) => request,
      Err(e) => {
        let id = serde_json::from_str::<Value>(raw)
          .ok()
          .and_then(|message| message.get("id").and_then(Value::as_u64));
        return match id {
          Some(id) => Some(CallResponse::error(id, CallError::Malformed(e.to_string()))),
          None => {
            tracing::warn!(error = %e, "dropping bridge message without an id");
            None
          }
        };
      }
    };

    let method = match self.lookup(&request.binding, &request.method) {
      Ok(method) => method,
      Err(e) => {
        tracing::debug!(id = request.id, error = %e, "bridge call rejected");
        return Some(CallResponse::error(request.id, e));
      }
    };

    if !method.offload {
      return Some(reply(request.id, (method.invoke)(request.args)));
    }

    let invoke = method.invoke.clone();
    let CallRequest {
      id,
      binding,
      method,
      args,
    } = request;
    let qualified = format!("{binding}.{method}");
    let job: Job = Box::new(move || defer(reply(id, invoke(args))));

    let queued = self
      .workers
      .get_or_try_init(|| Workers::start(WORKER_THREADS))
      .map_err(|e| e.to_string())
      .and_then(|workers| workers.jobs.try_send(job).map_err(|e| e.to_string()));

    match queued {
      Ok(()) => None,
      Err(reason) => {
        tracing::warn!(id, method = %qualified, %reason, "offloaded call rejected");
        Some(CallResponse::error(
          id,
          CallError::Offload {
            method: qualified,
            reason,
          },
        ))
      }
    }
  }

  fn lookup(&self, binding: &str, method: &str) -> std::result::Result<&Method, CallError> {
    let target = self
      .bindings
      .get(binding)
      .ok_or_else(|| CallError::UnknownBinding(binding.to_string()))?;
    target
      .methods
      .get(method)
      .ok_or_else(|| CallError::UnknownMethod(format!("{binding}.{method}")))
  }
}

fn reply(id: u64, result: std::result::Result<Value, CallError>) -> CallResponse {
  match result {
    Ok(value) => CallResponse::ok(id, value),
    Err(e) => {
      tracing::debug!(id, error = %e, "bridge call failed");
      CallResponse::error(id, e)
    }
  }
}
