use chrono::Utc;
use serde::Deserialize;

const DISCUSSION_BASE: &str = "https://news.ycombinator.com/item?id=";

/// A story as returned by the item endpoint. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HackerNewsItem {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
    pub by: String,
    #[serde(default)]
    pub score: u32,
    /// Creation time, unix seconds.
    pub time: i64,
    // Jobs and fresh posts come without a descendants field
    #[serde(rename = "descendants", default)]
    pub comments_count: u32,
}

impl HackerNewsItem {
    pub fn age_secs(&self, now: i64) -> i64 {
        (now - self.time).max(0)
    }

    pub fn age_label(&self, now: i64) -> String {
        let secs = self.age_secs(now);
        let (count, unit) = if secs >= 86_400 {
            (secs / 86_400, "day")
        } else if secs >= 3_600 {
            (secs / 3_600, "hour")
        } else if secs >= 60 {
            (secs / 60, "minute")
        } else {
            return "just now".to_string();
        };
        let plural = if count == 1 { "" } else { "s" };
        format!("{} {}{} ago", count, unit, plural)
    }

    /// Host of the target URL without a leading `www.`; empty for text posts.
    pub fn domain(&self) -> String {
        self.url
            .as_deref()
            .and_then(|url| reqwest::Url::parse(url).ok())
            .and_then(|url| url.host_str().map(|host| host.trim_start_matches("www.").to_string()))
            .unwrap_or_default()
    }

    pub fn discussion_url(&self) -> String {
        format!("{}{}", DISCUSSION_BASE, self.id)
    }

    /// The article when there is one, otherwise the comment thread.
    pub fn link(&self) -> String {
        match &self.url {
            Some(url) if !url.is_empty() => url.clone(),
            _ => self.discussion_url(),
        }
    }
}

pub fn now_unix() -> i64 {
    Utc::now().timestamp()
}
