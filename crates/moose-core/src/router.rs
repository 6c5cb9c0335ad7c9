//! Per-event dispatch.
//!
//! Every inbound event is handled on its own task against the shared invite
//! store and cooldown gate. There is no ordering between events once they
//! have been dispatched.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::{
    command::{Command, CommandKind},
    config::Config,
    cooldown::CooldownGate,
    errors::Error,
    formatting,
    invites::InviteStore,
    ports::{ChatEvent, ChatPort, MooseService},
    Result,
};

/// Everything the router needs, built once at startup.
#[derive(Clone)]
pub struct RouterContext {
    pub cfg: Arc<Config>,
    pub chat: Arc<dyn ChatPort>,
    pub moose: Arc<dyn MooseService>,
    /// `None` when no invite file is configured.
    pub invites: Option<Arc<InviteStore>>,
    pub cooldown: Arc<CooldownGate>,
}

pub struct EventRouter {
    ctx: RouterContext,
}

impl EventRouter {
    pub fn new(ctx: RouterContext) -> Self {
        Self { ctx }
    }

    /// Handle `event` on a fresh task so a slow moose lookup never holds up
    /// the connection's read loop.
    pub fn dispatch(self: &Arc<Self>, event: ChatEvent) -> JoinHandle<()> {
        let router = Arc::clone(self);
        tokio::spawn(async move { router.handle(event).await })
    }

    pub async fn handle(&self, event: ChatEvent) {
        match event {
            ChatEvent::Welcome => self.on_welcome().await,
            ChatEvent::Join { nick, channel } => {
                if self.is_me(&nick) {
                    info!(%channel, "joined");
                }
            }
            ChatEvent::Part { nick, channel } => {
                if self.is_me(&nick) {
                    self.forget_invite(channel, "parted").await;
                }
            }
            ChatEvent::Kick {
                channel,
                target,
                by,
                reason,
            } => {
                if self.is_me(&target) {
                    let reason = reason.unwrap_or_default();
                    info!(%channel, %by, %reason, "kicked");
                    self.forget_invite(channel, "kicked").await;
                }
            }
            ChatEvent::Invite {
                from,
                target,
                channel,
            } => {
                if self.is_me(&target) {
                    self.on_invite(from, channel).await;
                }
            }
            ChatEvent::Message { from, target, text } => {
                self.on_message(from, target, text).await;
            }
        }
    }

    fn is_me(&self, nick: &str) -> bool {
        nick.eq_ignore_ascii_case(&self.ctx.chat.current_nick())
    }

    async fn on_welcome(&self) {
        info!("connected");
        if let Some(pass) = &self.ctx.cfg.nickserv_pass {
            if let Err(e) = self.ctx.chat.identify(pass).await {
                warn!(error = %e, "failed to send nickserv identify");
            }
        }

        let channels: Vec<String> = match &self.ctx.invites {
            Some(store) => store.union(&self.ctx.cfg.channels).into_iter().collect(),
            None => self.ctx.cfg.channels.clone(),
        };
        if channels.is_empty() {
            return;
        }
        if let Err(e) = self.ctx.chat.join(&channels).await {
            error!(error = %e, "failed to send joins");
        }
    }

    async fn on_invite(&self, from: String, channel: String) {
        let store = match &self.ctx.invites {
            Some(store) if self.ctx.cfg.accept_invites => store.clone(),
            _ => {
                info!(%from, %channel, "rejecting invite; invites are disabled");
                self.notice(&from, formatting::INVITES_DISABLED).await;
                return;
            }
        };
        if store.contains(&channel) {
            debug!(%channel, "already invited");
            return;
        }

        if let Err(e) = self.ctx.chat.join(std::slice::from_ref(&channel)).await {
            error!(%channel, error = %e, "failed to send join");
        }
        info!(%from, %channel, "invited");
        let chan = channel.clone();
        if let Err(e) = run_blocking(move || store.add(&chan)).await {
            warn!(%channel, error = %e, "invite not saved");
        }
    }

    async fn forget_invite(&self, channel: String, reason: &'static str) {
        info!(%channel, reason, "removed from channel");
        let Some(store) = self.ctx.invites.clone() else {
            return;
        };
        if !store.contains(&channel) {
            return;
        }
        let chan = channel.clone();
        if let Err(e) = run_blocking(move || store.remove(&chan)).await {
            warn!(%channel, error = %e, "invite removal not saved");
        }
    }

    async fn on_message(&self, from: String, target: String, text: String) {
        let private = self.is_me(&target);
        if private && formatting::is_version_request(&text) {
            self.notice(&from, &formatting::version_reply()).await;
            return;
        }
        let reply_to = if private { from.as_str() } else { target.as_str() };

        let gateway = self.ctx.cfg.is_gateway(&from);
        let line = if gateway {
            strip_gateway_prefix(&text)
        } else {
            text.as_str()
        };
        let mut cmd = Command::parse(line.trim());
        // Relayed clients can't render the one-line-per-row art.
        if gateway && cmd.kind == CommandKind::Resolve {
            cmd.kind = CommandKind::Image;
        }

        match cmd.kind {
            CommandKind::Resolve | CommandKind::Image => {
                self.lookup(&cmd, &from, reply_to).await;
            }
            CommandKind::Search => self.search(&cmd.target, reply_to).await,
            CommandKind::BotsInfo => {
                self.reply(reply_to, &formatting::bots_info(&self.ctx.cfg.moose_url))
                    .await;
            }
            CommandKind::Help => self.reply(reply_to, formatting::HELP_TEXT).await,
            CommandKind::Invalid => {}
        }
    }

    async fn lookup(&self, cmd: &Command, from: &str, reply_to: &str) {
        if !self.ctx.cooldown.try_acquire() {
            debug!(
                %from,
                retry_after_ms = self.ctx.cooldown.retry_after().as_millis() as u64,
                "cooldown active"
            );
            self.notice(from, formatting::PLEASE_WAIT).await;
            return;
        }

        let name = match self.ctx.moose.resolve(&cmd.target).await {
            Ok(name) => name,
            Err(Error::NotFound(_)) => {
                self.reply(reply_to, &formatting::no_such_moose(&cmd.target))
                    .await;
                return;
            }
            Err(e) => {
                self.report_failure(reply_to, "Moose resolution error", &e)
                    .await;
                return;
            }
        };

        if cmd.kind == CommandKind::Resolve {
            // Fetch everything first so a failed read never leaves half a moose.
            let lines = match self.ctx.moose.fetch_image_lines(&name).await {
                Ok(lines) => lines,
                Err(e) => {
                    self.report_failure(reply_to, "Failed to fetch moose", &e)
                        .await;
                    return;
                }
            };
            for line in lines.iter().filter(|l| !l.is_empty()) {
                self.reply(reply_to, line).await;
            }
        }

        self.reply(reply_to, &self.ctx.moose.image_url(&name)).await;
    }

    async fn search(&self, query: &str, reply_to: &str) {
        if self.ctx.cfg.disable_search {
            let url = self.ctx.moose.gallery_url(query);
            self.reply(reply_to, &formatting::search_disabled(&url))
                .await;
            return;
        }

        match self.ctx.moose.search(query).await {
            Ok(hits) if hits.is_empty() => {
                self.reply(reply_to, &formatting::no_search_results(query))
                    .await;
            }
            Ok(hits) => {
                self.reply(reply_to, &formatting::search_hits(&hits)).await;
            }
            Err(e) => self.report_failure(reply_to, "Moose search failed", &e).await,
        }
    }

    async fn report_failure(&self, reply_to: &str, what: &str, e: &Error) {
        error!(to = %reply_to, error = %e, "{what}");
        self.reply(reply_to, &format!("ERROR: {what}: {e}")).await;
    }

    async fn reply(&self, to: &str, text: &str) {
        if let Err(e) = self.ctx.chat.send_message(to, text).await {
            warn!(%to, error = %e, "failed to send message");
        }
    }

    async fn notice(&self, to: &str, text: &str) {
        if let Err(e) = self.ctx.chat.send_notice(to, text).await {
            warn!(%to, error = %e, "failed to send notice");
        }
    }
}

/// Gateways relay as `<nick> text`; drop everything up to the first space.
///
/// This is a heuristic: a gateway line without a name token loses its first
/// word.
pub fn strip_gateway_prefix(text: &str) -> &str {
    match text.split_once(' ') {
        Some((_, rest)) => rest,
        None => text,
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
}
