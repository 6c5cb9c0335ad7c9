use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use moose_api::MooseClient;
use moose_core::{
    config::Config,
    cooldown::CooldownGate,
    invites::InviteStore,
    router::{EventRouter, RouterContext},
};
use moose_irc::IrcClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    moose_core::logging::init("moose")?;

    let cfg = Arc::new(Config::load()?);

    let invites = match &cfg.invite_file {
        Some(path) => {
            let store = InviteStore::open(path)
                .with_context(|| format!("failed to load invite file {}", path.display()))?;
            info!(path = %path.display(), channels = store.snapshot().len(), "loaded invites");
            Some(Arc::new(store))
        }
        None => None,
    };
    if !cfg.invites_enabled() {
        info!("not accepting new invites");
    }

    let moose = Arc::new(MooseClient::new(&cfg.moose_url, cfg.http_timeout)?);
    let (client, queues) = IrcClient::new(&cfg.nick);

    let router = Arc::new(EventRouter::new(RouterContext {
        cfg: cfg.clone(),
        chat: Arc::new(client.clone()),
        moose,
        invites,
        cooldown: Arc::new(CooldownGate::new(cfg.cooldown)),
    }));

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for ctrl-c");
                return;
            }
            shutdown.cancel();
        }
    });

    moose_irc::run(&cfg, client, queues, router, shutdown)
        .await
        .context("irc connection failed")
}
