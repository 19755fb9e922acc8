use crate::core::Runtime;
use crate::error::TaskError;

/// # User configuration entry point.
///
/// A plugin declares callbacks and binds them to listeners; it runs once,
/// before any listener starts. Any `Fn(&Runtime) -> Result<(), TaskError>`
/// is a plugin.
///
/// ```rust
/// use deskvisor::{Callback, ListenerKey, Runtime, TaskError};
/// # use async_trait::async_trait;
/// # use deskvisor::{Listener, ListenerContext};
/// # struct Battery;
/// # #[async_trait]
/// # impl Listener for Battery {
/// #     type Attrs = ();
/// #     fn build(_: ListenerContext, _: ()) -> Self { Battery }
/// #     async fn start(&self) -> Result<(), TaskError> { Ok(()) }
/// # }
///
/// fn plugin(rt: &Runtime) -> Result<(), TaskError> {
///     let cb = Callback::new("battery_log", |mut args| async move {
///         println!("{:?}", args.event()?);
///         Ok::<(), TaskError>(())
///     });
///     rt.on(&cb, [ListenerKey::of::<Battery>()]);
///     Ok(())
/// }
/// ```
pub trait Plugin {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Declares bindings on `runtime`.
    fn register(&self, runtime: &Runtime) -> Result<(), TaskError>;
}

impl<F> Plugin for F
where
    F: Fn(&Runtime) -> Result<(), TaskError>,
{
    fn register(&self, runtime: &Runtime) -> Result<(), TaskError> {
        self(runtime)
    }
}
