//! # Signal listeners and payload dispatch.
//!
//! A [`Listener`] is an event source (a sysfs poller, a D-Bus watcher, a
//! supervised helper's output reader). For every distinct [`ListenerKey`]
//! (listener type + attribute overrides) the [`ListenerRegistry`] keeps exactly
//! one listener instance and one [`Dispatcher`] holding its callbacks.
//!
//! ```text
//! declare:  runtime.on(&cb, [ListenerKey::of::<Battery>()])
//!               └─► ListenerRegistry::add_callback(key, cb)
//!                      └─► get_or_create(key) ─► Battery::build(ctx, attrs)
//!
//! run:      Battery::start() ─► ctx.trigger(payload)
//!               └─► Dispatcher::trigger
//!                      ├─ duplicate of the last payload? ─► DuplicateSuppressed, return
//!                      └─ for cb in callbacks (registration order): cb.call(payload).await?
//! ```
//!
//! ## Rules
//! - Keys compare by listener type and canonical JSON of the *non-default* attributes.
//! - Callbacks run sequentially; the first error aborts the rest of that dispatch.
//! - Payload-less triggers are never treated as duplicates.

mod dispatcher;
mod key;
mod listener;
mod payload;
mod registry;

pub use dispatcher::Dispatcher;
pub use key::ListenerKey;
pub use listener::{Listener, ListenerContext};
pub use payload::{DedupPolicy, EVENT_CLASS_KEY, Payload, to_payload};
pub use registry::ListenerRegistry;
