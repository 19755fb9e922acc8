//! Battery level warnings.
//!
//! Polls `/sys/class/power_supply/BAT*` and sends a desktop notification when
//! the level drops to the warning threshold while discharging.
//!
//! ```text
//! cargo run --example battery -- --verbose
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use async_trait::async_trait;
use deskvisor::process::cmd;
use deskvisor::{
    Callback, Dependency, Listener, ListenerContext, ListenerKey, Runtime, TaskError, to_payload,
};
use serde::Serialize;
use tracing::{debug, info};

const SUPPLY_DIR: &str = "/sys/class/power_supply";

#[derive(Clone, Debug, Default, Serialize)]
struct BatteryAttrs {
    /// Supply name such as `BAT0`; the first `BAT*` when empty.
    supply: String,
    /// Poll period; 60s when zero.
    period_secs: u64,
}

#[derive(Serialize)]
struct BatteryState {
    #[serde(rename = "battery-level")]
    level: u8,
    #[serde(rename = "battery-status")]
    status: String,
}

struct Battery {
    ctx: ListenerContext,
    attrs: BatteryAttrs,
}

#[async_trait]
impl Listener for Battery {
    type Attrs = BatteryAttrs;

    fn build(ctx: ListenerContext, attrs: BatteryAttrs) -> Self {
        Self { ctx, attrs }
    }

    async fn start(&self) -> Result<(), TaskError> {
        let wanted = self.attrs.supply.clone();
        let dir = self
            .ctx
            .run_blocking(move || find_supply(Path::new(SUPPLY_DIR), &wanted))
            .await??
            .ok_or_else(|| TaskError::fail("no battery found"))?;
        info!(supply = %dir.display(), "watching battery");

        let period = match self.attrs.period_secs {
            0 => Duration::from_secs(60),
            n => Duration::from_secs(n),
        };
        self.ctx
            .spawn("battery poller", poll(self.ctx.clone(), dir, period));
        Ok(())
    }
}

async fn poll(ctx: ListenerContext, dir: PathBuf, period: Duration) -> Result<(), TaskError> {
    loop {
        let read_dir = dir.clone();
        let state = ctx.run_blocking(move || read_state(&read_dir)).await??;
        ctx.trigger(to_payload(&state)?).await?;
        tokio::time::sleep(period).await;
    }
}

fn find_supply(root: &Path, wanted: &str) -> Result<Option<PathBuf>, TaskError> {
    if !wanted.is_empty() {
        let dir = root.join(wanted);
        return Ok(dir.is_dir().then_some(dir));
    }
    let entries = std::fs::read_dir(root).map_err(|e| TaskError::fail(e.to_string()))?;
    let mut found: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().starts_with("BAT"))
        .map(|e| e.path())
        .collect();
    found.sort();
    Ok(found.into_iter().next())
}

fn read_state(dir: &Path) -> Result<BatteryState, TaskError> {
    let read = |name: &str| {
        std::fs::read_to_string(dir.join(name))
            .map(|s| s.trim().to_string())
            .map_err(|e| TaskError::fail(format!("{}: {e}", dir.join(name).display())))
    };
    let level = read("capacity")?
        .parse::<u8>()
        .map_err(|e| TaskError::fail(e.to_string()))?;
    Ok(BatteryState {
        level,
        status: read("status")?,
    })
}

/// Sends notifications through `notify-send`.
#[derive(Default)]
struct Notifier;

impl Notifier {
    async fn send(&self, summary: &str, urgency: &str) -> Result<(), TaskError> {
        cmd("notify-send", ["--urgency", urgency, "--app-name", "deskvisor", summary], None).await?;
        Ok(())
    }
}

fn plugin(rt: &Runtime) -> Result<(), TaskError> {
    let warn_low = Callback::new("battery_level_warning", |mut args| async move {
        let state = args.event()?.unwrap_or_default();
        let notifier = args.object::<Notifier>()?;

        let status = state["battery-status"].as_str().unwrap_or("Unknown");
        let level = state["battery-level"].as_u64().unwrap_or(100);
        debug!(level, status, "battery state");
        if status != "Discharging" || level > 10 {
            return Ok(());
        }

        let urgency = if level > 5 { "normal" } else { "critical" };
        notifier
            .send(&format!("Battery is low ({level}%)"), urgency)
            .await
    });

    rt.inject(&warn_low, [Dependency::of::<Notifier>()]);
    rt.on(&warn_low, [ListenerKey::of::<Battery>()]);
    Ok(())
}

fn main() -> ExitCode {
    deskvisor::cli::main_with(plugin)
}
