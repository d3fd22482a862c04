use miette::Result;
use tracing::{error, warn};

use farol::serve::{self, Facade};
use farol::sync::{self, fetch::BlockFetcher, pull};

#[derive(Debug, clap::Args)]
pub struct Args {}

#[tokio::main]
pub async fn run(config: super::Config, _args: &Args) -> Result<()> {
    crate::common::setup_tracing(&config.logging)?;

    let (store, registry, health) = crate::common::bootstrap(&config)?;

    let exit = crate::common::hook_exit_token();

    let (rollback, commands) = pull::rollback_channel();

    let facade = Facade {
        store: store.clone(),
        registry: registry.clone(),
        health: health.clone(),
        rollback,
        fetcher: BlockFetcher::new(&config.upstream),
        longest_rollback: config.sync.stability_window,
    };

    let pipeline = tokio::spawn(sync::run(
        config.upstream.clone(),
        config.sync,
        store,
        registry,
        health,
        commands,
        exit.clone(),
    ));

    let server = tokio::spawn(serve::run(config.serve.clone(), facade, exit.clone()));

    let finished = tokio::select! {
        ended = pipeline => ended,
        ended = server => ended,
    };

    exit.cancel();

    match finished {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            error!(%err, "driver error");
            return Err(err.into());
        }
        Err(join) => {
            error!(%join, "driver panicked");
            return Err(miette::miette!("driver panicked: {join}"));
        }
    }

    warn!("shutdown complete");

    Ok(())
}
