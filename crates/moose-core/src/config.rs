use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, Result};

pub const DEFAULT_MOOSE_URL: &str = "https://moose2.ghetty.space";

/// Typed configuration for the bot, read from the environment.
#[derive(Clone, Debug)]
pub struct Config {
    // IRC
    pub nick: String,
    pub host: String,
    pub server_pass: Option<String>,
    pub nickserv_pass: Option<String>,
    pub channels: Vec<String>,
    pub send_delay: Duration,

    // Invites. The file is loaded whenever it is set, so invited channels are
    // still rejoined and pruned while `accept_invites` is off; the toggle only
    // gates new invitations.
    pub invite_file: Option<PathBuf>,
    pub accept_invites: bool,

    // moose2
    pub moose_url: String,
    pub http_timeout: Duration,
    pub cooldown: Duration,
    pub disable_search: bool,

    // Relays which prefix the real sender as `<nick> text`.
    pub gateway_users: Vec<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_source(env_str)
    }

    /// Build a config from an arbitrary key lookup (the process environment
    /// in production).
    pub fn from_source<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let nick = get("MOOSE_NICK").and_then(non_empty).ok_or_else(|| {
            Error::Config("MOOSE_NICK environment variable is required".to_string())
        })?;
        if nick.contains(char::is_whitespace) {
            return Err(Error::Config(format!(
                "MOOSE_NICK must not contain whitespace: {nick:?}"
            )));
        }
        let host = get("MOOSE_HOST").and_then(non_empty).ok_or_else(|| {
            Error::Config("MOOSE_HOST environment variable is required".to_string())
        })?;

        let server_pass = get("MOOSE_SERVER_PASS").and_then(non_empty);
        let nickserv_pass = get("MOOSE_NICKSERV_PASS").and_then(non_empty);
        let channels = parse_csv(get("MOOSE_CHANNELS"));
        let send_delay = env_duration(&get, "MOOSE_SEND_DELAY")?
            .unwrap_or(Duration::from_millis(350));

        let accept_invites = !env_bool(&get, "MOOSE_DISABLE_INVITES").unwrap_or(false);
        let invite_file = get("MOOSE_INVITE_FILE")
            .and_then(non_empty)
            .map(PathBuf::from);

        let moose_url = get("MOOSE_URL")
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_MOOSE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let http_timeout =
            env_duration(&get, "MOOSE_HTTP_TIMEOUT")?.unwrap_or(Duration::from_secs(5));
        let cooldown = env_duration(&get, "MOOSE_COOLDOWN")?.unwrap_or(Duration::from_secs(10));
        let disable_search = env_bool(&get, "MOOSE_DISABLE_SEARCH").unwrap_or(false);

        let gateway_users = parse_csv(get("MOOSE_GATEWAY_USERS"));

        Ok(Self {
            nick,
            host,
            server_pass,
            nickserv_pass,
            channels,
            send_delay,
            invite_file,
            accept_invites,
            moose_url,
            http_timeout,
            cooldown,
            disable_search,
            gateway_users,
        })
    }

    /// New invitations are accepted only with a file to record them in.
    pub fn invites_enabled(&self) -> bool {
        self.accept_invites && self.invite_file.is_some()
    }

    pub fn is_gateway(&self, nick: &str) -> bool {
        self.gateway_users.iter().any(|g| g == nick)
    }
}

/// Parse a human duration: `350ms`, `10s`, `2min`. A bare number is
/// milliseconds.
pub fn parse_duration(raw: &str) -> Result<Duration> {
    let s = raw.trim();
    if s.is_empty() {
        return Err(Error::Config(
            "empty duration is not allowed; omit the value or set it to 0".to_string(),
        ));
    }

    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (num, unit) = s.split_at(split);
    if num.is_empty() {
        return Err(Error::Config(format!("invalid duration {raw:?}: missing number")));
    }
    let num = num
        .parse::<u64>()
        .map_err(|e| Error::Config(format!("invalid duration {raw:?}: {e}")))?;

    match unit.trim() {
        "" | "ms" => Ok(Duration::from_millis(num)),
        "ns" => Ok(Duration::from_nanos(num)),
        "us" => Ok(Duration::from_micros(num)),
        "s" | "sec" | "secs" | "seconds" => Ok(Duration::from_secs(num)),
        "m" | "min" | "mins" | "minutes" => Ok(Duration::from_secs(num.saturating_mul(60))),
        other => Err(Error::Config(format!(
            "invalid duration unit {other:?} in {raw:?}; expected ns, us, ms, s or min"
        ))),
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn env_bool<F>(get: &F, key: &str) -> Option<bool>
where
    F: Fn(&str) -> Option<String>,
{
    get(key).map(|s| {
        matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn env_duration<F>(get: &F, key: &str) -> Result<Option<Duration>>
where
    F: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(None),
        Some(v) => parse_duration(&v)
            .map(Some)
            .map_err(|e| Error::Config(format!("{key}: {e}"))),
    }
}

fn parse_csv(v: Option<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in v.unwrap_or_default().split(',').map(str::trim) {
        if !item.is_empty() && !out.iter().any(|o| o == item) {
            out.push(item.to_string());
        }
    }
    out
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s.trim().to_string())
    }
}
