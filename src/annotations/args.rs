//! Positional arguments threaded through a composed callback.
//!
//! Each behavior layer receives an [`Invocation`], may prepend to its [`Args`]
//! and forwards it to the layer below. The event the dispatcher is delivering
//! rides along in [`Invocation::event`] until a layer claims it.

use std::any::type_name;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use crate::error::TaskError;
use crate::listeners::Payload;
use crate::objects::Object;

/// One positional argument.
#[derive(Clone)]
pub enum Arg {
    /// The triggering payload (absent for payload-less triggers).
    Event(Option<Payload>),
    /// An injected object.
    Object(Object),
}

impl fmt::Debug for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Event(ev) => f.debug_tuple("Event").field(ev).finish(),
            Arg::Object(_) => f.write_str("Object(..)"),
        }
    }
}

/// Ordered positional arguments; index 0 is the leftmost parameter.
#[derive(Clone, Debug, Default)]
pub struct Args {
    items: VecDeque<Arg>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `arg` as the new leftmost argument.
    pub fn push_front(&mut self, arg: Arg) {
        self.items.push_front(arg);
    }

    /// Removes and returns the leftmost argument.
    pub fn next(&mut self) -> Option<Arg> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Takes the leftmost argument, which must be an event.
    pub fn event(&mut self) -> Result<Option<Payload>, TaskError> {
        match self.next() {
            Some(Arg::Event(ev)) => Ok(ev),
            Some(Arg::Object(_)) => Err(TaskError::fail("expected an event argument, found an object")),
            None => Err(TaskError::fail("expected an event argument, found none")),
        }
    }

    /// Takes the leftmost argument, which must be an injected `T`.
    pub fn object<T: Send + Sync + 'static>(&mut self) -> Result<Arc<T>, TaskError> {
        match self.next() {
            Some(Arg::Object(obj)) => obj.downcast::<T>().map_err(|_| {
                TaskError::fail(format!("injected argument is not a {}", type_name::<T>()))
            }),
            Some(Arg::Event(_)) => Err(TaskError::fail(format!(
                "expected {}, found an event argument",
                type_name::<T>()
            ))),
            None => Err(TaskError::fail(format!(
                "expected {}, found no argument",
                type_name::<T>()
            ))),
        }
    }
}

/// A single call travelling down the behavior chain.
#[derive(Clone, Debug, Default)]
pub struct Invocation {
    /// Event being delivered; consumed by the event-binding layer.
    pub event: Option<Payload>,
    /// Arguments accumulated so far.
    pub args: Args,
}

impl Invocation {
    pub fn new(event: Option<Payload>) -> Self {
        Self {
            event,
            args: Args::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn typed_accessors_pop_in_order() {
        let mut payload = Payload::new();
        payload.insert("level".into(), json!(50));

        let mut args = Args::new();
        args.push_front(Arg::Object(Arc::new(String::from("notify"))));
        args.push_front(Arg::Event(Some(payload.clone())));

        assert_eq!(args.event().expect("event first"), Some(payload));
        assert_eq!(*args.object::<String>().expect("object second"), "notify");
        assert!(args.is_empty());
    }

    #[test]
    fn mismatched_argument_is_a_failure() {
        let mut args = Args::new();
        args.push_front(Arg::Event(None));
        let err = args.object::<String>().unwrap_err();
        assert!(!err.is_fatal());
        assert!(args.event().is_err());
    }
}
