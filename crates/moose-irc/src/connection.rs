use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, bail, Context};
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::{net::TcpStream, time::Instant};
use tokio_util::{
    codec::{Framed, LinesCodec, LinesCodecError},
    sync::CancellationToken,
};
use tracing::{debug, error, info, warn};

use moose_core::{config::Config, ports::ChatPort, router::EventRouter};

use crate::{
    client::{IrcClient, OutboundQueues},
    events::to_chat_event,
    message::IrcMessage,
};

/// Longest inbound line accepted from the server.
pub const MAX_INBOUND_LINE: usize = 8 * 1024;
/// Nick-in-use retries before giving up.
pub const MAX_NICK_RETRIES: usize = 3;

const REALNAME: &str = "moose";

/// Connect, register, and pump server lines into `router` until the server
/// goes away, a fatal protocol error arrives, or `shutdown` fires.
pub async fn run(
    cfg: &Config,
    client: IrcClient,
    queues: OutboundQueues,
    router: Arc<EventRouter>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let stream = TcpStream::connect(&cfg.host)
        .await
        .with_context(|| format!("failed to connect to {}", cfg.host))?;
    info!(host = %cfg.host, nick = %cfg.nick, "connected to irc server");

    let framed = Framed::new(stream, LinesCodec::new_with_max_length(MAX_INBOUND_LINE));
    let (sink, mut lines) = framed.split();

    let stop_writer = CancellationToken::new();
    let writer = tokio::spawn(write_loop(
        sink,
        queues,
        cfg.send_delay,
        stop_writer.clone(),
    ));

    let result = match register(cfg, &client) {
        Ok(()) => read_loop(&client, &mut lines, &router, &shutdown).await,
        Err(e) => Err(e),
    };

    // Lets queued protocol lines (QUIT) go out before the socket closes.
    stop_writer.cancel();
    match writer.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "irc writer failed"),
        Err(e) => warn!(error = %e, "irc writer task panicked"),
    }
    result
}

fn register(cfg: &Config, client: &IrcClient) -> anyhow::Result<()> {
    if let Some(pass) = &cfg.server_pass {
        client.send_now(&IrcMessage::new("PASS", [pass.as_str()]))?;
    }
    client.send_now(&IrcMessage::new("NICK", [cfg.nick.as_str()]))?;
    client.send_now(&IrcMessage::new(
        "USER",
        [cfg.nick.as_str(), "0", "*", REALNAME],
    ))?;
    Ok(())
}

async fn read_loop<S>(
    client: &IrcClient,
    lines: &mut S,
    router: &Arc<EventRouter>,
    shutdown: &CancellationToken,
) -> anyhow::Result<()>
where
    S: futures_util::Stream<Item = Result<String, LinesCodecError>> + Unpin,
{
    let mut nick_retries = 0;

    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("shutting down");
                client.send_now(&IrcMessage::new("QUIT", ["Shutting down"]))?;
                return Ok(());
            }
            next = lines.next() => next,
        };

        let line = match next {
            None => bail!("server closed the connection"),
            Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                warn!(max = MAX_INBOUND_LINE, "dropping overlong line from server");
                continue;
            }
            Some(Err(LinesCodecError::Io(e))) => {
                return Err(e).context("failed to read from irc server")
            }
            Some(Ok(line)) => line,
        };

        let msg = match IrcMessage::parse(&line) {
            Ok(msg) => msg,
            Err(e) => {
                debug!(error = %e, "ignoring unparsable line");
                continue;
            }
        };

        match msg.command.as_str() {
            "PING" => {
                client.send_now(&IrcMessage::new("PONG", msg.params.iter().map(String::as_str)))?;
                continue;
            }
            "ERROR" => {
                bail!("server error: {}", msg.params.last().map_or("", String::as_str));
            }
            "001" => {
                if let Some(nick) = msg.param(0) {
                    client.set_nick(nick);
                }
            }
            "432" => {
                bail!(
                    "server rejected nickname {:?}",
                    msg.param(1).unwrap_or_default()
                );
            }
            "433" | "436" => {
                nick_retries += 1;
                let rejected = msg
                    .param(1)
                    .map(str::to_string)
                    .unwrap_or_else(|| client.current_nick());
                if nick_retries > MAX_NICK_RETRIES {
                    client.send_now(&IrcMessage::new("QUIT", ["No usable nickname"]))?;
                    return Err(anyhow!(
                        "nickname {rejected:?} unavailable after {MAX_NICK_RETRIES} retries"
                    ));
                }
                let next_nick = format!("{rejected}_");
                warn!(%rejected, next = %next_nick, "nickname in use; retrying");
                client.set_nick(&next_nick);
                client.send_now(&IrcMessage::new("NICK", [next_nick.as_str()]))?;
                continue;
            }
            "NICK" => {
                let me = client.current_nick();
                if msg.source_nick().is_some_and(|n| n.eq_ignore_ascii_case(&me)) {
                    if let Some(new) = msg.param(0) {
                        info!(old = %me, new, "nick changed");
                        client.set_nick(new);
                    }
                }
                continue;
            }
            _ => {}
        }

        if let Some(event) = to_chat_event(&msg) {
            router.dispatch(event);
        }
    }
}

/// Drain the outbound queues into the socket. Protocol lines always go
/// first; chat lines are spaced `delay` apart.
async fn write_loop<S>(
    mut sink: S,
    mut queues: OutboundQueues,
    delay: Duration,
    stop: CancellationToken,
) -> Result<(), LinesCodecError>
where
    S: Sink<String, Error = LinesCodecError> + Unpin,
{
    let mut next_paced = Instant::now();

    loop {
        let paced_ready = Instant::now() >= next_paced;
        let line = tokio::select! {
            biased;
            Some(line) = queues.urgent.recv() => line,
            _ = stop.cancelled() => break,
            _ = tokio::time::sleep_until(next_paced), if !paced_ready => continue,
            Some(line) = queues.paced.recv(), if paced_ready => {
                next_paced = Instant::now() + delay;
                line
            }
            else => break,
        };

        // LinesCodec terminates with a bare `\n`.
        if let Err(e) = sink.send(format!("{line}\r")).await {
            error!(error = %e, "failed to write to irc server");
            return Err(e);
        }
    }

    sink.close().await
}
