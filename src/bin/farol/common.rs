use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::{filter::Targets, prelude::*};

use farol::health::HealthTracker;
use farol::patterns::Pattern;
use farol::prelude::*;
use farol::registry::PatternRegistry;
use farol::store::{self, Store};

use super::{Config, LoggingConfig};

pub fn setup_tracing(config: &LoggingConfig) -> miette::Result<()> {
    let level = config.max_level;

    let mut filter = Targets::new().with_target("farol", level);

    if config.include_pallas {
        filter = filter.with_target("pallas", level);
    }

    if config.include_tower {
        filter = filter.with_target("tower_http", level);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .init();

    Ok(())
}

/// Opens the store and reconciles it with the configuration: network
/// magic pinning, pattern seeding, and the initial health snapshot.
pub fn bootstrap(config: &Config) -> Result<(Store, PatternRegistry, HealthTracker), Error> {
    let store = Store::open(&config.storage.path)?;

    let stored_magic = store.with_reader(store::network_magic)?;
    match stored_magic {
        Some(magic) if magic != config.upstream.network_magic => {
            return Err(Error::config(format!(
                "store was indexed against network magic {magic}, \
                 configured producer uses {}",
                config.upstream.network_magic
            )));
        }
        Some(_) => {}
        None => {
            let magic = config.upstream.network_magic;
            store.with_writer(|db| store::set_network_magic(db, magic))?;
        }
    }

    let mut seeds = Vec::with_capacity(config.patterns.len());
    for text in &config.patterns {
        let pattern = Pattern::parse(text)
            .map_err(|err| Error::config(format!("pattern {text:?}: {err}")))?;
        seeds.push(pattern);
    }

    if !seeds.is_empty() {
        let to_insert = seeds.clone();
        store.with_writer(move |db| store::insert_patterns(db, &to_insert))?;
    }

    let active = store.with_reader(store::list_patterns)?;
    info!(patterns = active.len(), "pattern registry loaded");
    let registry = PatternRegistry::new(active);

    let health = HealthTracker::new(config.sync.input_management);
    let checkpoint = store.with_reader(store::most_recent_checkpoint)?;
    health.prime(checkpoint);

    Ok((store, registry, health))
}

#[inline]
#[cfg(unix)]
async fn wait_for_exit_signal() {
    let mut sigterm =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("sigterm handler");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("SIGINT detected");
        }
        _ = sigterm.recv() => {
            tracing::warn!("SIGTERM detected");
        }
    };
}

#[inline]
#[cfg(windows)]
async fn wait_for_exit_signal() {
    tokio::signal::ctrl_c().await.expect("ctrl-c handler");
}

pub fn hook_exit_token() -> CancellationToken {
    let cancel = CancellationToken::new();

    let cancel2 = cancel.clone();
    tokio::spawn(async move {
        wait_for_exit_signal().await;
        debug!("notifying exit");
        cancel2.cancel();
    });

    cancel
}
