use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use crate::trends::Blocklist;
use crate::utils::twitter::DEFAULT_API_BASE;

static SETTINGS: OnceLock<Settings> = OnceLock::new();

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub server: Server,
    pub twitter: Twitter,
    pub quality: Quality,
    pub snapshot: Snapshot,
    #[serde(default)]
    pub blocklist: Vec<String>,
    pub feeds: Vec<FeedSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub enable_scheduler: bool,
    pub run_interval_minutes: u64,
    pub roll_hour_utc: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Twitter {
    pub api_base: String,
    pub page_size: u32,
    pub self_domains: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quality {
    pub min_account_age_days: i64,
    pub require_followers: bool,
    pub reject_default_avatar: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub top_limit: i64,
    pub directory: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedSource {
    Search { query: String },
    List { list_id: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Weighting {
    #[default]
    Flat,
    Engagement,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSettings {
    pub name: String,
    pub source: FeedSource,
    pub include_retweets: bool,
    #[serde(default)]
    pub weighting: Weighting,
    pub run_budget: u32,
    pub max_runs: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: Server {
                enable_scheduler: false,
                run_interval_minutes: 15,
                roll_hour_utc: 0,
            },
            twitter: Twitter {
                api_base: DEFAULT_API_BASE.to_string(),
                page_size: 100,
                self_domains: vec!["twitter.com".into(), "x.com".into()],
            },
            quality: Quality {
                min_account_age_days: 30,
                require_followers: true,
                reject_default_avatar: true,
            },
            snapshot: Snapshot {
                top_limit: 10,
                directory: "storage".to_string(),
            },
            // the query hashtags match every post and would always rank first
            blocklist: vec!["crypto".into(), "cryptocurrency".into(), "defi".into()],
            feeds: vec![
                FeedSettings {
                    name: "crypto".to_string(),
                    source: FeedSource::Search {
                        query: "(#defi OR #crypto OR #cryptocurrency)".to_string(),
                    },
                    include_retweets: false,
                    weighting: Weighting::Flat,
                    run_budget: 10,
                    max_runs: 5,
                },
                FeedSettings {
                    name: "crypto-retweets".to_string(),
                    source: FeedSource::Search {
                        query: "(#defi OR #crypto OR #cryptocurrency)".to_string(),
                    },
                    include_retweets: true,
                    weighting: Weighting::Engagement,
                    run_budget: 10,
                    max_runs: 5,
                },
            ],
        }
    }
}

impl Settings {
    pub fn load() -> &'static Settings {
        SETTINGS.get_or_init(Self::load_from_files)
    }

    fn load_from_files() -> Settings {
        let default_path = Path::new("settings.default.ron");
        let override_path = Path::new("settings.ron");

        let mut settings = if default_path.exists() {
            read_settings(default_path).unwrap_or_default()
        } else {
            Settings::default()
        };

        if override_path.exists() {
            if let Some(overrides) = read_settings(override_path) {
                settings = overrides;
            }
        }

        settings
    }

    pub fn from_ron(content: &str) -> Result<Settings, ron::error::SpannedError> {
        ron::from_str(content)
    }

    pub fn blocklist(&self) -> Blocklist {
        Blocklist::new(self.blocklist.as_slice())
    }

    pub fn feed(&self, name: &str) -> Option<&FeedSettings> {
        self.feeds.iter().find(|f| f.name == name)
    }
}

fn read_settings(path: &Path) -> Option<Settings> {
    let content = fs::read_to_string(path).ok()?;
    match Settings::from_ron(&content) {
        Ok(settings) => Some(settings),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unparseable settings file");
            None
        }
    }
}

pub fn settings() -> &'static Settings {
    Settings::load()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_file_parses() {
        let content = include_str!("../settings.default.ron");
        let parsed = Settings::from_ron(content).expect("settings.default.ron should parse");
        assert_eq!(parsed.feeds.len(), Settings::default().feeds.len());
        assert_eq!(parsed.snapshot.top_limit, Settings::default().snapshot.top_limit);
    }

    #[test]
    fn test_missing_blocklist_is_empty() {
        let content = r#"(
            server: (enable_scheduler: false, run_interval_minutes: 5, roll_hour_utc: 0),
            twitter: (api_base: "http://localhost", page_size: 10, self_domains: []),
            quality: (min_account_age_days: 1, require_followers: false, reject_default_avatar: false),
            snapshot: (top_limit: 3, directory: "out"),
            feeds: [],
        )"#;
        let parsed = Settings::from_ron(content).expect("settings should parse");
        assert!(parsed.blocklist.is_empty());
        assert!(parsed.blocklist().is_empty());
    }

    #[test]
    fn test_feed_lookup() {
        let s = Settings::default();
        let feed = s.feed("crypto-retweets").expect("default feed");
        assert!(feed.include_retweets);
        assert_eq!(feed.weighting, Weighting::Engagement);
        assert!(s.feed("missing").is_none());
    }

    #[test]
    fn test_weighting_defaults_to_flat() {
        let content = r#"(
            name: "list",
            source: List(list_id: "123"),
            include_retweets: false,
            run_budget: 2,
            max_runs: 1,
        )"#;
        let feed: FeedSettings = ron::from_str(content).expect("feed should parse");
        assert_eq!(feed.weighting, Weighting::Flat);
        assert_eq!(
            feed.source,
            FeedSource::List {
                list_id: "123".into()
            }
        );
    }
}
