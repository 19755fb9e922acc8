//! # Annotation composer.
//!
//! A [`Callback`] accumulates named [`Behavior`]s (annotations) at declaration
//! time and is only turned into an invocable [`Handler`] when the dispatcher
//! needs it ([`Callback::materialize`]).
//!
//! ## Composition rule
//! Behaviors attached in the order `B1, B2, ..., Bn` materialize as
//! `B1(B2(...Bn(original)...))`: the last attached wraps innermost, the first
//! attached runs outermost, exactly like nested calls.
//!
//! ```text
//! attach: inject(Notify) ─► on(Battery)
//!
//! materialize:  Inject[Notify]( OnEvent[Battery]( original ) )
//!
//! call(event):  Inject   prepends Notify       args = [Notify]
//!               OnEvent  takes event, prepends args = [event, Notify]
//!               original(args)
//! ```
//!
//! ## Standard behaviors
//! - [`Inject`]: resolves dependencies through the [`ObjectRegistry`](crate::ObjectRegistry)
//!   and prepends them as leading arguments, in declared order.
//! - [`OnEvent`]: registers the callback on one or more listeners when it is
//!   *declared*, and at call time moves the invocation's event into the leading
//!   argument slot.

mod args;
mod behavior;
mod callback;

pub use args::{Arg, Args, Invocation};
pub use behavior::{Behavior, Inject, OnEvent};
pub use callback::{Callback, CallbackFuture, Handler};
