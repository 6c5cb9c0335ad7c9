use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Inbound chat events, already translated from the wire protocol.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatEvent {
    /// Registration finished; the bot may join channels now.
    Welcome,
    Join {
        nick: String,
        channel: String,
    },
    Part {
        nick: String,
        channel: String,
    },
    Kick {
        channel: String,
        target: String,
        by: String,
        reason: Option<String>,
    },
    Invite {
        from: String,
        target: String,
        channel: String,
    },
    Message {
        from: String,
        target: String,
        text: String,
    },
}

/// Outbound chat actions.
///
/// IRC is the only implementation; the router never sees raw protocol lines.
#[async_trait]
pub trait ChatPort: Send + Sync {
    /// Nickname the server currently knows us by.
    fn current_nick(&self) -> String;

    async fn join(&self, channels: &[String]) -> Result<()>;
    async fn send_message(&self, target: &str, text: &str) -> Result<()>;
    async fn send_notice(&self, target: &str, text: &str) -> Result<()>;
    async fn identify(&self, password: &str) -> Result<()>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub name: String,
    pub page: u32,
}

/// The moose2 image service.
#[async_trait]
pub trait MooseService: Send + Sync {
    /// Resolve a user-supplied name (or `random`/`latest`/`oldest`) to the
    /// canonical, already URL-safe moose name. Unknown names are
    /// `Error::NotFound`.
    async fn resolve(&self, name: &str) -> Result<String>;

    /// IRC art for a resolved moose, one chat line per entry.
    async fn fetch_image_lines(&self, name: &str) -> Result<Vec<String>>;

    async fn search(&self, query: &str) -> Result<Vec<SearchHit>>;

    fn image_url(&self, name: &str) -> String;

    /// Web gallery filtered by `query`, used when search is disabled.
    fn gallery_url(&self, query: &str) -> String;
}
