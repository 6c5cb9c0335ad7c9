/// What a chat line asked the bot to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Resolve a moose and paste its IRC art, followed by the image link.
    Resolve,
    /// Resolve a moose and reply with the image link only.
    Image,
    Search,
    BotsInfo,
    Help,
    Invalid,
}

impl CommandKind {
    pub fn is_lookup(self) -> bool {
        matches!(self, CommandKind::Resolve | CommandKind::Image)
    }
}

pub const DEFAULT_TARGET: &str = "random";

/// A parsed chat command.
///
/// `target` is always trimmed. It may be empty for lookups, in which case the
/// remote service picks its own default.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
    pub kind: CommandKind,
    pub target: String,
}

impl Command {
    fn new() -> Self {
        Self {
            kind: CommandKind::Invalid,
            target: DEFAULT_TARGET.to_string(),
        }
    }

    /// Parse one message line. Never fails: unknown input is `Invalid`.
    pub fn parse(line: &str) -> Self {
        parse(line)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ScanState {
    FindCommand,
    FindArgs,
    FindMoose,
}

fn command_for_alias(token: &str) -> Option<CommandKind> {
    let kind = match token {
        ".moose" | "!moose" | "moose" | ".mooseme" | "!mooseme" | "mooseme" => {
            CommandKind::Resolve
        }
        ".mooseimg" | "!mooseimg" | "mooseimg" => CommandKind::Image,
        ".moosesearch" | "!moosesearch" | "moosesearch" => CommandKind::Search,
        ".bots" | "!bots" | ".help" | "!help" => CommandKind::BotsInfo,
        _ => return None,
    };
    Some(kind)
}

/// Single left-to-right scan; the first argument-determining token wins and
/// everything after a terminal flag is ignored.
pub fn parse(line: &str) -> Command {
    let tokens: Vec<&str> = line.split(|c: char| c.is_ascii_whitespace()).collect();
    let mut ret = Command::new();
    let mut state = ScanState::FindCommand;

    for (pos, token) in tokens.iter().copied().enumerate() {
        match state {
            ScanState::FindCommand => match command_for_alias(token) {
                Some(CommandKind::BotsInfo) => {
                    ret.kind = CommandKind::BotsInfo;
                    break;
                }
                Some(kind) => {
                    ret.kind = kind;
                    state = ScanState::FindArgs;
                }
                None => {
                    ret.kind = CommandKind::Invalid;
                    break;
                }
            },
            ScanState::FindArgs => {
                ret.target.clear();
                match token {
                    "" => {}
                    "--" => state = ScanState::FindMoose,
                    "-h" | "--help" => {
                        ret.kind = CommandKind::Help;
                        break;
                    }
                    "-s" | "--search" => {
                        ret.kind = CommandKind::Search;
                        state = ScanState::FindMoose;
                    }
                    "-i" | "--image" => {
                        ret.kind = CommandKind::Image;
                        state = ScanState::FindMoose;
                    }
                    "-r" | "--random" => {
                        ret.target = "random".to_string();
                        break;
                    }
                    "-l" | "--latest" => {
                        ret.target = "latest".to_string();
                        break;
                    }
                    "-o" | "--oldest" => {
                        ret.target = "oldest".to_string();
                        break;
                    }
                    _ => {
                        ret.target = tokens[pos..].join(" ");
                        break;
                    }
                }
            }
            ScanState::FindMoose => {
                if !token.is_empty() {
                    ret.target = tokens[pos..].join(" ");
                    break;
                }
            }
        }
    }

    ret.target = ret.target.trim().to_string();
    ret
}
