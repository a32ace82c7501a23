//! Static host blacklist for search results and scrape targets.
//!
//! Social platforms and video sites need logins or dedicated APIs, and
//! paywalled outlets return stubs; scraping them wastes steps. Results on
//! these hosts are dropped before the model sees them.

use url::Url;

const BLOCKED_HOSTS: &[&str] = &[
    // Social
    "facebook.com",
    "instagram.com",
    "twitter.com",
    "x.com",
    "tiktok.com",
    "linkedin.com",
    "reddit.com",
    "threads.net",
    "pinterest.com",
    "snapchat.com",
    // Video
    "youtube.com",
    "youtu.be",
    "vimeo.com",
    "twitch.tv",
    "dailymotion.com",
    // Hard paywalls
    "wsj.com",
    "ft.com",
    "bloomberg.com",
    "economist.com",
    "nytimes.com",
];

/// True when the URL's host is (or is a subdomain of) a blocked host.
pub fn is_blacklisted(url: &str) -> bool {
    let host = match Url::parse(url) {
        Ok(u) => match u.host_str() {
            Some(h) => h.to_lowercase(),
            None => return false,
        },
        Err(_) => return false,
    };
    let host = host.strip_prefix("www.").unwrap_or(&host);

    BLOCKED_HOSTS
        .iter()
        .any(|blocked| host == *blocked || host.ends_with(&format!(".{blocked}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_exact_hosts() {
        assert!(is_blacklisted("https://twitter.com/someone/status/1"));
        assert!(is_blacklisted("https://youtube.com/watch?v=abc"));
        assert!(is_blacklisted("https://wsj.com/articles/x"));
    }

    #[test]
    fn blocks_subdomains_and_www() {
        assert!(is_blacklisted("https://www.facebook.com/events/123"));
        assert!(is_blacklisted("https://m.youtube.com/watch?v=abc"));
        assert!(is_blacklisted("https://mobile.twitter.com/x"));
    }

    #[test]
    fn allows_ordinary_hosts() {
        assert!(!is_blacklisted("https://example.com/blog"));
        assert!(!is_blacklisted("https://techcrunch.com/2026/01/01/ai"));
    }

    #[test]
    fn does_not_block_lookalike_suffixes() {
        // "notx.com" must not match "x.com"
        assert!(!is_blacklisted("https://notx.com/page"));
        assert!(!is_blacklisted("https://fakereddit.community/r/ai"));
    }

    #[test]
    fn unparseable_urls_are_not_blocked() {
        assert!(!is_blacklisted("not a url"));
    }
}
