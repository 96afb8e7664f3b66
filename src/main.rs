/* keylightd entrypoint: sets up tracing, loads the keyboard database, reads a key snapshot and
 * applies it to a hidraw device through its actor. */
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use keylightd::actor;
use keylightd::device::KeyState;
use keylightd::driver::sequencer::UpdateRequest;
use keylightd::keyboard_database;

const USAGE: &str = "usage: keylightd <hidraw-node> <model-name> <snapshot.json> [--force]";

struct Args {
    devnode: PathBuf,
    model: String,
    snapshot: PathBuf,
    force: bool,
}

fn parse_args(args: impl Iterator<Item = String>) -> Result<Args> {
    let mut force = false;
    let mut positional = Vec::new();
    for arg in args {
        match arg.as_str() {
            "--force" => force = true,
            _ if arg.starts_with("--") => bail!("unknown option {arg}\n{USAGE}"),
            _ => positional.push(arg),
        }
    }

    let [devnode, model, snapshot]: [String; 3] = positional
        .try_into()
        .map_err(|_| anyhow::anyhow!(USAGE))?;

    Ok(Args {
        devnode: PathBuf::from(devnode),
        model,
        snapshot: PathBuf::from(snapshot),
        force,
    })
}

fn read_snapshot(path: &Path) -> Result<Vec<KeyState>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Invalid snapshot {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = parse_args(std::env::args().skip(1))?;

    info!("Starting keylightd version {}", env!("CARGO_PKG_VERSION"));

    /* Load the .keyboard file database from the project's data directory */
    let data_dir = PathBuf::from(
        std::env::var("KEYLIGHTD_DATA_DIR")
            .unwrap_or_else(|_| "/usr/share/keylightd".to_string()),
    );
    let keyboard_db = keyboard_database::load_keyboard_database(&data_dir);

    let Some(model) = keyboard_db.get(&args.model.to_lowercase()).cloned() else {
        bail!(
            "Unknown keyboard model {:?} ({} models in {})",
            args.model,
            keyboard_db.len(),
            data_dir.display()
        );
    };

    let keys = read_snapshot(&args.snapshot)?;

    let handle = actor::spawn_device_actor(&args.devnode, model).await?;
    let report = handle
        .apply(UpdateRequest {
            keys,
            force: args.force,
        })
        .await
        .with_context(|| format!("Lighting update on {} failed", handle.name()))?;

    if report.is_noop() {
        info!("Nothing changed on {}", handle.name());
    } else {
        info!(
            "Applied {} effects and {} regions to {}",
            report.effects_sent,
            report.regions_sent.len(),
            handle.name()
        );
    }

    handle.shutdown().await;
    Ok(())
}
