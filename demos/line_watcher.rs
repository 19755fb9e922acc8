//! Reacts to every line printed by a long-running helper.
//!
//! The helper (`pactl subscribe` by default) is supervised: it is restarted
//! with backoff when it crashes and every hour regardless. When it keeps
//! crashing the daemon exits with an error.
//!
//! ```text
//! cargo run --example line_watcher -- --verbose
//! ```

use std::process::ExitCode;
use std::time::Duration;

use async_trait::async_trait;
use deskvisor::{
    Callback, Listener, ListenerContext, ListenerKey, ProcessIo, Runtime, TaskError, to_payload,
};
use serde::Serialize;
use tracing::info;

#[derive(Clone, Debug, Default, Serialize)]
struct WatcherAttrs {
    /// Helper command line; `pactl subscribe` when empty.
    command: Vec<String>,
}

#[derive(Serialize)]
struct Line<'a> {
    line: &'a str,
}

struct LineWatcher {
    ctx: ListenerContext,
    command: Vec<String>,
}

#[async_trait]
impl Listener for LineWatcher {
    type Attrs = WatcherAttrs;

    fn build(ctx: ListenerContext, attrs: WatcherAttrs) -> Self {
        let command = if attrs.command.is_empty() {
            vec!["pactl".to_string(), "subscribe".to_string()]
        } else {
            attrs.command
        };
        Self { ctx, command }
    }

    async fn start(&self) -> Result<(), TaskError> {
        let spec = deskvisor::ProcessSpec::with_defaults(
            self.command.clone(),
            self.ctx.runtime().process_defaults(),
        )
        .with_restart_every(Some(Duration::from_secs(3600)));
        let helper = self.ctx.runtime().supervise_spec(spec)?;

        let ctx = self.ctx.clone();
        helper.on_start(move |io| forward_lines(ctx.clone(), io));

        let program = helper.spec().program().to_string();
        helper.on_failure(move || {
            let program = program.clone();
            async move { Err::<(), _>(TaskError::fatal(format!("{program} initialization failed"))) }
        });

        helper.start().await?;
        Ok(())
    }
}

async fn forward_lines(ctx: ListenerContext, mut io: ProcessIo) -> Result<(), TaskError> {
    let Some(mut lines) = io.stdout_lines() else {
        return Ok(());
    };
    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| TaskError::fail(e.to_string()))?
    {
        ctx.trigger_with(Some(to_payload(&Line { line: &line })?), true)
            .await?;
    }
    Ok(())
}

fn plugin(rt: &Runtime) -> Result<(), TaskError> {
    let log_sink_changes = Callback::new("log_sink_changes", |mut args| async move {
        let event = args.event()?.unwrap_or_default();
        let line = event["line"].as_str().unwrap_or_default();
        if line.contains("sink") {
            info!(line, "audio sink changed");
        }
        Ok::<(), TaskError>(())
    });
    rt.on(&log_sink_changes, [ListenerKey::of::<LineWatcher>()]);
    Ok(())
}

fn main() -> ExitCode {
    deskvisor::cli::main_with(plugin)
}
