//! # deskvisor
//!
//! **Deskvisor** is a small runtime for desktop companion daemons: it reacts to
//! system and desktop events (power, audio, keyboard layout, network, ...) by
//! running user callbacks, and it keeps the helper programs those events come
//! from alive.
//!
//! ## Architecture
//! ```text
//!   user plugin ──► Runtime::on / Runtime::inject        (declaration time)
//!                        │                │
//!                        ▼                ▼
//!              ListenerRegistry      ObjectRegistry
//!        (one Listener per key)      (shared singletons)
//!                        │
//!   Runtime::run ──► start listeners as tracked tasks ───────────────┐
//!                        │                                           │
//!     Listener ── ctx.trigger(payload) ──► Dispatcher                │
//!                                            ├─ suppress duplicates  │
//!                                            └─ for each Callback:   │
//!                                                 materialize()      │
//!                                                 call(event).await  │
//!                                                                    ▼
//!   SupervisedProcess ── watcher / backoff / periodic restart ──► TaskSet
//!                                                                    │
//!   SIGINT/SIGTERM or fatal error ──► cancel ──► wait (grace) ◄──────┘
//!
//!   every component ── publish(Event) ──► Bus (lifecycle events)
//! ```
//!
//! ## Features
//! | Area            | Description                                              | Key types                                 |
//! |-----------------|----------------------------------------------------------|-------------------------------------------|
//! | **Runtime**     | Declaration, listener start-up, graceful shutdown        | [`Runtime`], [`RuntimeHandle`], [`Plugin`] |
//! | **Listeners**   | Event sources keyed by type + attributes, deduplication  | [`Listener`], [`ListenerKey`], [`Dispatcher`] |
//! | **Annotations** | Composable callback decorations                          | [`Callback`], [`Behavior`], [`Inject`], [`OnEvent`] |
//! | **Objects**     | Lazily-built shared collaborators                        | [`ObjectRegistry`], [`Dependency`]        |
//! | **Processes**   | Restart-on-crash helpers and one-shot commands           | [`SupervisedProcess`], [`ProcessSpec`], [`process::cmd`] |
//! | **Policies**    | Restart backoff                                          | [`BackoffPolicy`], [`JitterPolicy`]       |
//! | **Errors**      | Recoverable vs fatal task errors                         | [`TaskError`], [`RuntimeError`]           |
//! | **Config**      | TOML settings                                            | [`Config`]                                |
//!
//! ## Example
//! ```no_run
//! use deskvisor::{Callback, Dependency, ListenerKey, Runtime, TaskError};
//! # use async_trait::async_trait;
//! # use deskvisor::{Listener, ListenerContext};
//! # struct Battery;
//! # #[async_trait]
//! # impl Listener for Battery {
//! #     type Attrs = ();
//! #     fn build(_: ListenerContext, _: ()) -> Self { Battery }
//! #     async fn start(&self) -> Result<(), TaskError> { Ok(()) }
//! # }
//!
//! #[derive(Default)]
//! struct Notifier;
//!
//! fn plugin(rt: &Runtime) -> Result<(), TaskError> {
//!     let cb = Callback::new("battery_notify", |mut args| async move {
//!         let event = args.event()?;
//!         let _notifier = args.object::<Notifier>()?;
//!         println!("battery changed: {event:?}");
//!         Ok::<(), TaskError>(())
//!     });
//!     rt.inject(&cb, [Dependency::of::<Notifier>()]);
//!     rt.on(&cb, [ListenerKey::of::<Battery>()]);
//!     Ok(())
//! }
//!
//! fn main() -> std::process::ExitCode {
//!     deskvisor::cli::main_with(plugin)
//! }
//! ```

mod annotations;
mod config;
mod core;
mod error;
mod events;
mod listeners;
mod objects;
mod policies;

pub mod cli;
pub mod process;

// ---- Public re-exports ----

pub use annotations::{Arg, Args, Behavior, Callback, CallbackFuture, Handler, Inject, Invocation, OnEvent};
pub use config::Config;
pub use crate::core::{Plugin, Runtime, RuntimeBuilder, RuntimeHandle, TaskSet};
pub use error::{KeyError, ProcessError, RegistryError, RuntimeError, TaskError};
pub use events::{Bus, Event, EventKind};
pub use listeners::{
    DedupPolicy, Dispatcher, EVENT_CLASS_KEY, Listener, ListenerContext, ListenerKey, ListenerRegistry,
    Payload, to_payload,
};
pub use objects::{Dependency, Object, ObjectRegistry};
pub use policies::{BackoffPolicy, JitterPolicy};
pub use process::{CommandOutput, ProcessDefaults, ProcessIo, ProcessSpec, ProcessState, SupervisedProcess};
