//! User-visible reply texts.

use crate::ports::SearchHit;

pub const HELP_TEXT: &str =
    "usage: ^[.!]?moose(?:img|search|me)? [--latest|--random|--search|--image|--] moosename";

pub const PLEASE_WAIT: &str = "Please wait before asking for another moose.";

pub const INVITES_DISABLED: &str = "Invites are disabled.";

/// Most search hits rendered in a single reply.
pub const MAX_SEARCH_HITS: usize = 12;

const BOLD: char = '\u{2}';

pub fn bots_info(moose_url: &str) -> String {
    format!("Moose :: Make moose @ {moose_url} :: See .moose --help for usage")
}

pub fn version_reply() -> String {
    format!("\u{1}VERSION moose/{}\u{1}", env!("CARGO_PKG_VERSION"))
}

pub fn is_version_request(text: &str) -> bool {
    text == "\u{1}VERSION\u{1}"
}

pub fn no_such_moose(name: &str) -> String {
    format!("No such moose: {name}")
}

pub fn no_search_results(query: &str) -> String {
    format!("No moose found: {query}")
}

pub fn search_disabled(gallery_url: &str) -> String {
    format!("Search is disabled on this server. See: {gallery_url}")
}

/// `\x02name\x02 p.N` entries joined by `, `.
pub fn search_hits(hits: &[SearchHit]) -> String {
    hits.iter()
        .take(MAX_SEARCH_HITS)
        .map(|h| format!("{BOLD}{}{BOLD} p.{}", h.name, h.page))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_hits_are_bold_and_capped() {
        let hits: Vec<SearchHit> = (0..20)
            .map(|i| SearchHit {
                name: format!("m{i}"),
                page: i / 10,
            })
            .collect();
        let out = search_hits(&hits[..2]);
        assert_eq!(out, "\u{2}m0\u{2} p.0, \u{2}m1\u{2} p.0");

        let all = search_hits(&hits);
        assert_eq!(all.matches(", ").count(), MAX_SEARCH_HITS - 1);
        assert!(!all.contains("m12"));
    }

    #[test]
    fn version_is_ctcp_framed() {
        let v = version_reply();
        assert!(v.starts_with("\u{1}VERSION moose/"));
        assert!(v.ends_with('\u{1}'));
        assert!(is_version_request("\u{1}VERSION\u{1}"));
        assert!(!is_version_request("VERSION"));
    }
}
