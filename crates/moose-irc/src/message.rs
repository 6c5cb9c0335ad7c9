use moose_core::{errors::Error, Result};

/// Longest outbound line, excluding the trailing `\r\n`.
pub const MAX_LINE_LEN: usize = 510;

/// One IRC protocol line: `[:prefix] COMMAND [params...] [:trailing]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcMessage {
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
}

impl IrcMessage {
    pub fn new<I, S>(command: &str, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefix: None,
            command: command.to_string(),
            params: params.into_iter().map(Into::into).collect(),
        }
    }

    pub fn privmsg(target: &str, text: &str) -> Self {
        Self::new("PRIVMSG", [target, text])
    }

    pub fn notice(target: &str, text: &str) -> Self {
        Self::new("NOTICE", [target, text])
    }

    /// Parse a single line; a trailing `\r\n` is ignored.
    pub fn parse(line: &str) -> Result<Self> {
        let mut rest = line.trim_end_matches(['\r', '\n']);
        if rest.trim().is_empty() {
            return Err(Error::Protocol("empty line".to_string()));
        }

        let mut prefix = None;
        if let Some(p) = rest.strip_prefix(':') {
            let Some((pfx, tail)) = p.split_once(' ') else {
                return Err(Error::Protocol(format!("missing command: {line:?}")));
            };
            prefix = Some(pfx.to_string());
            rest = tail.trim_start_matches(' ');
        }

        let (command, mut rest) = match rest.split_once(' ') {
            Some((cmd, tail)) => (cmd, tail.trim_start_matches(' ')),
            None => (rest, ""),
        };
        if command.is_empty() {
            return Err(Error::Protocol(format!("missing command: {line:?}")));
        }

        let mut params = Vec::new();
        while !rest.is_empty() {
            if let Some(trailing) = rest.strip_prefix(':') {
                params.push(trailing.to_string());
                break;
            }
            match rest.split_once(' ') {
                Some((p, tail)) => {
                    params.push(p.to_string());
                    rest = tail.trim_start_matches(' ');
                }
                None => {
                    params.push(rest.to_string());
                    break;
                }
            }
        }

        Ok(Self {
            prefix,
            command: command.to_ascii_uppercase(),
            params,
        })
    }

    /// Nick part of a `nick!user@host` prefix.
    pub fn source_nick(&self) -> Option<&str> {
        let prefix = self.prefix.as_deref()?;
        let nick = prefix.split(['!', '@']).next().unwrap_or(prefix);
        (!nick.is_empty()).then_some(nick)
    }

    pub fn param(&self, idx: usize) -> Option<&str> {
        self.params.get(idx).map(String::as_str)
    }

    /// Wire form without `\r\n`, cut to `MAX_LINE_LEN` bytes.
    pub fn format(&self) -> String {
        let mut out = String::with_capacity(64);
        if let Some(prefix) = &self.prefix {
            out.push(':');
            out.push_str(prefix);
            out.push(' ');
        }
        out.push_str(&self.command);

        let last = self.params.len().saturating_sub(1);
        for (i, param) in self.params.iter().enumerate() {
            out.push(' ');
            if i == last && (param.is_empty() || param.contains(' ') || param.starts_with(':')) {
                out.push(':');
            }
            // CR/LF in user content would start a new command.
            out.extend(param.chars().map(|c| match c {
                '\r' | '\n' | '\0' => ' ',
                c => c,
            }));
        }

        truncate_at_char_boundary(&mut out, MAX_LINE_LEN);
        out
    }
}

fn truncate_at_char_boundary(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    s.truncate(cut);
}

/// `JOIN` lines for `channels`, comma-joined and split so no line exceeds
/// `MAX_LINE_LEN`.
pub fn join_lines(channels: &[String]) -> Vec<String> {
    const CMD: &str = "JOIN ";
    let mut lines = Vec::new();
    let mut cur = String::new();

    for chan in channels.iter().map(|c| c.trim()).filter(|c| !c.is_empty()) {
        let extra = if cur.is_empty() { chan.len() } else { chan.len() + 1 };
        if !cur.is_empty() && CMD.len() + cur.len() + extra > MAX_LINE_LEN {
            lines.push(format!("{CMD}{cur}"));
            cur.clear();
        }
        if !cur.is_empty() {
            cur.push(',');
        }
        cur.push_str(chan);
    }
    if !cur.is_empty() {
        lines.push(format!("{CMD}{cur}"));
    }
    lines
}
