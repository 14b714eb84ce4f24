//! metagate - scatter-gather proxy over several directory servers
//!
//! The binary loads and validates the target configuration and reports
//! how a name would be routed: which targets are candidates and what the
//! name becomes in each target's namespace.

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};

use metagate::{
    config::Args,
    rewrite::RewriteContext,
    CandidateSelector, MassageMapper, NamespaceMapper, SuffixSelector, TargetRegistry,
};

fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    metagate::logging::init(&args.log_level, args.log_json);

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    let file = args.load_targets()?;
    let registry = Arc::new(TargetRegistry::from_config(&file.targets)?);
    let engine_config = args.engine_config();

    info!("======================================");
    info!("  metagate - directory scatter-gather");
    info!("======================================");
    info!("Targets file: {}", args.targets.display());
    info!("Targets: {}", registry.len());
    for target in registry.iter() {
        info!("  [{}] {} {} ({})", target.index, target.name, target.uri, target.suffix);
    }
    if engine_config.cache_enabled {
        info!(
            "DN cache: ttl={}s max_entries={}",
            args.dncache_ttl_secs, args.dncache_max_entries
        );
    } else {
        info!("DN cache: disabled");
    }
    info!("Poll interval: {:?}", engine_config.poll_interval);
    info!("======================================");

    let Some(dn) = args.route.as_deref() else {
        return Ok(());
    };

    let lines = route(registry, dn);
    if lines.is_empty() {
        warn!(dn = %dn, "No target serves this name");
        println!("{}: no candidate targets", dn);
        return Ok(());
    }

    println!("{}", dn);
    for line in lines {
        println!("  {}", line);
    }

    Ok(())
}

/// One line per candidate target: its index, name and the name it would receive.
///
/// A fresh process has no cached answers, so routing is by suffix alone.
fn route(registry: Arc<TargetRegistry>, dn: &str) -> Vec<String> {
    let selector = SuffixSelector::new(Arc::clone(&registry));
    let mapper = MassageMapper;

    selector
        .candidates(dn)
        .indices()
        .filter_map(|index| registry.get(index))
        .map(|target| match mapper.rewrite_name(target, RewriteContext::CompareDn, dn) {
            Ok(native) => format!("[{}] {} -> {}", target.index, target.name, native),
            Err(e) => format!("[{}] {} -> unwilling ({})", target.index, target.name, e),
        })
        .collect()
}
