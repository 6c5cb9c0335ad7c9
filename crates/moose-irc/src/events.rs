use moose_core::ports::ChatEvent;

use crate::message::IrcMessage;

/// Translate a server line into a router event. Lines the bot does not act
/// on (and malformed ones missing required params) yield `None`.
pub fn to_chat_event(msg: &IrcMessage) -> Option<ChatEvent> {
    let owned = |i: usize| msg.param(i).map(str::to_string);
    let nick = || msg.source_nick().map(str::to_string);

    match msg.command.as_str() {
        "001" => Some(ChatEvent::Welcome),
        "JOIN" => Some(ChatEvent::Join {
            nick: nick()?,
            channel: owned(0)?,
        }),
        "PART" => Some(ChatEvent::Part {
            nick: nick()?,
            channel: owned(0)?,
        }),
        "KICK" => Some(ChatEvent::Kick {
            channel: owned(0)?,
            target: owned(1)?,
            by: nick().unwrap_or_default(),
            reason: owned(2).filter(|r| !r.is_empty()),
        }),
        "INVITE" => Some(ChatEvent::Invite {
            from: nick()?,
            target: owned(0)?,
            channel: owned(1)?,
        }),
        "PRIVMSG" => Some(ChatEvent::Message {
            from: nick()?,
            target: owned(0)?,
            text: owned(1)?,
        }),
        _ => None,
    }
}
