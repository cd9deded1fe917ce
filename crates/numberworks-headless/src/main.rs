//! Headless runner: load a map, simulate a fixed number of frames, report.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use numberworks_core::config::GameConfig;
use numberworks_core::engine::Engine;
use numberworks_core::event::EventKind;
use numberworks_core::fixed::fixed64_to_f64;
use numberworks_core::upgrade::UpgradeKind;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Run a Numberworks map without a renderer", long_about = None)]
struct Args {
    /// TOML game configuration. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// JSON save to start from. A missing or broken save falls back to the
    /// default map.
    #[arg(short, long)]
    save: Option<PathBuf>,

    #[arg(short, long, default_value_t = 600)]
    frames: u64,

    /// Frame length in milliseconds.
    #[arg(long, default_value_t = 16)]
    dt: u32,

    /// Queue these upgrades before the first frame.
    #[arg(short, long, value_parser = parse_upgrade)]
    upgrade: Vec<UpgradeKind>,

    /// Write the final state to this path.
    #[arg(short, long)]
    write: Option<PathBuf>,
}

fn parse_upgrade(s: &str) -> Result<UpgradeKind, String> {
    match s.to_ascii_lowercase().as_str() {
        "speed" => Ok(UpgradeKind::Speed),
        "efficiency" | "eff" => Ok(UpgradeKind::Efficiency),
        "mine" => Ok(UpgradeKind::Mine),
        other => Err(format!("unknown upgrade '{other}' (speed, efficiency, mine)")),
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => GameConfig::from_path(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => GameConfig::default(),
    };

    let mut engine = match &args.save {
        Some(path) => Engine::load_or_default(path, config)?,
        None => Engine::with_default_map(config)?,
    };
    for kind in &args.upgrade {
        engine.enqueue_upgrade(*kind);
    }

    info!(
        target: "numberworks::headless",
        frames = args.frames,
        dt = args.dt,
        structures = engine.grid().occupied_count(),
        belts = engine.belts().len(),
        "run.start"
    );

    let mut scored = 0i64;
    let mut upgrades = Vec::new();
    for _ in 0..args.frames {
        let summary = engine.step(args.dt);
        scored += summary.points_awarded;
        if let Some(kind) = summary.upgrade {
            upgrades.push((engine.frame(), kind));
        }
        // The summary and counters carry everything reported below.
        engine.drain_events();
    }

    let mut classes: BTreeMap<&'static str, usize> = BTreeMap::new();
    for (_, structure) in engine.grid().iter() {
        *classes.entry(structure.class_name()).or_default() += 1;
    }

    let events = engine.events();
    println!("frames:     {} x {}ms", args.frames, args.dt);
    println!("points:     {} (+{scored})", engine.points());
    println!(
        "wells:      {} scored, {} discarded",
        events.total_emitted(EventKind::WellScored),
        events.total_emitted(EventKind::TokenDiscarded)
    );
    println!("speed:      x{:.4}", fixed64_to_f64(engine.speed_factor()));
    println!(
        "upgrades:   speed {}, efficiency {}, mine {}",
        engine.counters().uses(UpgradeKind::Speed),
        engine.counters().uses(UpgradeKind::Efficiency),
        engine.counters().uses(UpgradeKind::Mine)
    );
    for (frame, kind) in &upgrades {
        println!("            {kind:?} at frame {frame}");
    }
    println!(
        "belts:      {} carrying {} tokens",
        engine.belts().len(),
        engine.belts().token_count()
    );
    for (class, count) in &classes {
        println!("{:<11} {count}", format!("{class}:"));
    }
    println!("state hash: {:016x}", engine.state_hash());

    if let Some(path) = &args.write {
        engine
            .save_to_path(path)
            .with_context(|| format!("writing save {}", path.display()))?;
        info!(target: "numberworks::headless", path = %path.display(), "run.saved");
    }

    Ok(())
}
