use std::any::type_name;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use super::listener::{Listener, ListenerContext, Startable};
use crate::error::KeyError;

type Factory = Arc<dyn Fn(ListenerContext) -> Arc<dyn Startable> + Send + Sync>;

/// Identity of a listener instance: its type plus non-default attributes.
///
/// Attributes are canonicalized as JSON with sorted keys, so two keys built
/// from equal attribute values are equal. Attributes equal to
/// `Attrs::default()` are dropped, making `with(default)` the same key as `of()`.
#[derive(Clone)]
pub struct ListenerKey {
    kind: &'static str,
    attrs: Option<Arc<str>>,
    factory: Factory,
}

impl ListenerKey {
    /// Key for `L` with default attributes.
    pub fn of<L: Listener>() -> Self {
        Self {
            kind: type_name::<L>(),
            attrs: None,
            factory: Arc::new(|ctx: ListenerContext| -> Arc<dyn Startable> {
                Arc::new(L::build(ctx, L::Attrs::default()))
            }),
        }
    }

    /// Key for `L` built with `attrs`.
    pub fn with<L: Listener>(attrs: L::Attrs) -> Result<Self, KeyError> {
        let given = canonical::<L>(&attrs)?;
        let default = canonical::<L>(&L::Attrs::default())?;
        let attrs_id = (given != default).then(|| Arc::<str>::from(given));

        Ok(Self {
            kind: type_name::<L>(),
            attrs: attrs_id,
            factory: Arc::new(move |ctx: ListenerContext| -> Arc<dyn Startable> {
                Arc::new(L::build(ctx, attrs.clone()))
            }),
        })
    }

    /// Full type name of the listener.
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Type name without its module path.
    pub fn short_kind(&self) -> &'static str {
        short(self.kind)
    }

    /// Canonical JSON of the non-default attributes.
    pub fn attrs(&self) -> Option<&str> {
        self.attrs.as_deref()
    }

    pub(crate) fn build(&self, ctx: ListenerContext) -> Arc<dyn Startable> {
        (self.factory)(ctx)
    }
}

fn canonical<L: Listener>(attrs: &L::Attrs) -> Result<String, KeyError> {
    serde_json::to_value(attrs)
        .map(|v| v.to_string())
        .map_err(|e| KeyError {
            kind: type_name::<L>(),
            error: e.to_string(),
        })
}

fn short(path: &'static str) -> &'static str {
    let base = path.split('<').next().unwrap_or(path);
    match base.rfind("::") {
        Some(i) => &path[i + 2..],
        None => path,
    }
}

impl PartialEq for ListenerKey {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.attrs == other.attrs
    }
}

impl Eq for ListenerKey {}

impl Hash for ListenerKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.attrs.hash(state);
    }
}

impl fmt::Display for ListenerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.attrs {
            Some(attrs) => write!(f, "{}{}", self.short_kind(), attrs),
            None => f.write_str(self.short_kind()),
        }
    }
}

impl fmt::Debug for ListenerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerKey")
            .field("kind", &self.kind)
            .field("attrs", &self.attrs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use async_trait::async_trait;
    use serde::Serialize;

    use super::*;
    use crate::error::TaskError;

    #[derive(Clone, Default, Serialize)]
    struct PollAttrs {
        path: String,
        period_secs: u64,
    }

    struct Poll;

    #[async_trait]
    impl Listener for Poll {
        type Attrs = PollAttrs;

        fn build(_ctx: ListenerContext, _attrs: PollAttrs) -> Self {
            Poll
        }

        async fn start(&self) -> Result<(), TaskError> {
            Ok(())
        }
    }

    fn attrs(path: &str) -> PollAttrs {
        PollAttrs {
            path: path.into(),
            period_secs: 0,
        }
    }

    #[test]
    fn equal_attributes_make_equal_keys() {
        let a = ListenerKey::with::<Poll>(attrs("/sys/a")).unwrap();
        let b = ListenerKey::with::<Poll>(attrs("/sys/a")).unwrap();
        let c = ListenerKey::with::<Poll>(attrs("/sys/b")).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: HashSet<_> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn default_attributes_collapse_to_bare_key() {
        let bare = ListenerKey::of::<Poll>();
        let explicit = ListenerKey::with::<Poll>(PollAttrs::default()).unwrap();
        assert_eq!(bare, explicit);
        assert_eq!(bare.attrs(), None);
        assert_eq!(bare.to_string(), "Poll");
    }

    #[test]
    fn display_includes_attributes() {
        let key = ListenerKey::with::<Poll>(attrs("/x")).unwrap();
        assert_eq!(key.to_string(), r#"Poll{"path":"/x","period_secs":0}"#);
    }
}
