use std::path::{Path, PathBuf};

use deathchest::registry::Half;
use deathchest::storage::STORE_FILE;
use deathchest::types::{now_millis, Millis, PlayerId, MILLIS_PER_MINUTE};
use deathchest::{ChestRegistry, Config};
use serde::Serialize;

const USAGE: &str = "usage: deathchest <list|prune> <data-dir>";

#[derive(Serialize)]
struct Listed {
    world: String,
    x: i32,
    y: i32,
    z: i32,
    owner: PlayerId,
    experience: u32,
    expires_at: Millis,
    minutes_left: Option<Millis>,
    warning_sent: bool,
    linked_to: Option<[i32; 3]>,
    primary: bool,
}

fn init_logging(data_dir: &Path) {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    // the server's own config can turn on debug output
    if Config::load(data_dir.join(deathchest::service::CONFIG_FILE)).map_or(false, |c| c.debug) {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.init();
}

fn load(data_dir: &Path, now: Millis) -> Result<ChestRegistry, deathchest::error::StorageError> {
    let mut registry = ChestRegistry::new();
    // offline, there's no world list to check against
    let report = registry.load_from(data_dir.join(STORE_FILE), &|_: &str| true, now)?;
    if report.skipped > 0 {
        log::warn!("{} stored chests were expired or invalid", report.skipped);
    }
    Ok(registry)
}

fn list(registry: &ChestRegistry, now: Millis) -> serde_json::Result<String> {
    let listing: Vec<Listed> = registry.snapshot().into_iter().map(|(pos, record)| Listed {
        minutes_left: record.remaining(now).map(|left| left / MILLIS_PER_MINUTE),
        linked_to: record.partner().map(|p| [p.pos.x, p.pos.y, p.pos.z]),
        primary: !matches!(record.linked.as_ref().map(|l| l.half), Some(Half::Secondary)),
        world: pos.world,
        x: pos.pos.x,
        y: pos.pos.y,
        z: pos.pos.z,
        owner: record.owner,
        experience: record.stored_experience,
        expires_at: record.expires_at,
        warning_sent: record.warning_sent,
    }).collect();
    serde_json::to_string_pretty(&listing)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args_os().skip(1);
    let (Some(command), Some(data_dir)) = (args.next(), args.next().map(PathBuf::from)) else {
        eprintln!("{USAGE}");
        std::process::exit(2);
    };
    init_logging(&data_dir);
    let now = now_millis();

    match command.to_str() {
        Some("list") => {
            let registry = load(&data_dir, now)?;
            println!("{}", list(&registry, now)?);
        }
        Some("prune") => {
            let registry = load(&data_dir, now)?;
            let kept = registry.save_to(data_dir.join(STORE_FILE), now)?;
            log::info!("kept {kept} death chests");
        }
        _ => {
            eprintln!("{USAGE}");
            std::process::exit(2);
        }
    }
    Ok(())
}
