use crate::post::{
    Author, Entities, Hashtag, Mention, Page, Post, PublicMetrics, Symbol, UrlEntity,
};
use crate::settings::Twitter;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;

pub const DEFAULT_API_BASE: &str = "https://api.twitter.com/2";

const TWEET_FIELDS: &str = "entities,public_metrics,referenced_tweets,created_at,author_id";
const USER_FIELDS: &str = "created_at,public_metrics,profile_image_url,name,username";
const EXPANSIONS: &str =
    "author_id,referenced_tweets.id,referenced_tweets.id.author_id,entities.mentions.username";

#[derive(Debug, Error)]
pub enum TwitterError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("TWITTER_BEARER_TOKEN not set")]
    MissingToken,
}

impl From<reqwest::Error> for TwitterError {
    fn from(err: reqwest::Error) -> Self {
        TwitterError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for TwitterError {
    fn from(err: serde_json::Error) -> Self {
        TwitterError::Parse(err.to_string())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TimelineResponse {
    #[serde(default)]
    pub data: Vec<WireTweet>,
    #[serde(default)]
    pub includes: Includes,
    #[serde(default)]
    pub meta: Meta,
}

#[derive(Debug, Default, Deserialize)]
pub struct LookupResponse {
    pub data: Option<WireTweet>,
    #[serde(default)]
    pub includes: Includes,
}

#[derive(Debug, Default, Deserialize)]
pub struct Includes {
    #[serde(default)]
    pub users: Vec<WireUser>,
    #[serde(default)]
    pub tweets: Vec<WireTweet>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Meta {
    pub next_token: Option<String>,
    pub result_count: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireTweet {
    pub id: String,
    #[serde(default)]
    pub text: String,
    pub author_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub entities: WireEntities,
    #[serde(default)]
    pub public_metrics: WireTweetMetrics,
    #[serde(default)]
    pub referenced_tweets: Vec<ReferencedTweet>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireEntities {
    #[serde(default)]
    pub hashtags: Vec<WireTag>,
    #[serde(default)]
    pub cashtags: Vec<WireTag>,
    #[serde(default)]
    pub mentions: Vec<WireMention>,
    #[serde(default)]
    pub urls: Vec<WireUrl>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireTag {
    pub tag: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireMention {
    pub username: String,
    pub id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireUrl {
    pub url: String,
    pub expanded_url: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct WireTweetMetrics {
    #[serde(default)]
    pub retweet_count: u64,
    #[serde(default)]
    pub reply_count: u64,
    #[serde(default)]
    pub like_count: u64,
    #[serde(default)]
    pub quote_count: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReferencedTweet {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireUser {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub username: String,
    pub created_at: Option<DateTime<Utc>>,
    pub profile_image_url: Option<String>,
    #[serde(default)]
    pub public_metrics: WireUserMetrics,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct WireUserMetrics {
    #[serde(default)]
    pub followers_count: u64,
}

#[derive(Debug, Deserialize)]
struct ApiProblem {
    title: Option<String>,
    detail: Option<String>,
}

/// Joins wire tweets with their expansions. Referenced tweets resolve one level deep.
struct Normalizer<'a> {
    users: HashMap<&'a str, &'a WireUser>,
    users_by_handle: HashMap<String, &'a WireUser>,
    tweets: HashMap<&'a str, &'a WireTweet>,
}

impl<'a> Normalizer<'a> {
    fn new(includes: &'a Includes) -> Self {
        Self {
            users: includes.users.iter().map(|u| (u.id.as_str(), u)).collect(),
            users_by_handle: includes
                .users
                .iter()
                .map(|u| (u.username.to_lowercase(), u))
                .collect(),
            tweets: includes.tweets.iter().map(|t| (t.id.as_str(), t)).collect(),
        }
    }

    fn post(&self, tweet: &WireTweet) -> Post {
        let mut post = self.shallow(tweet);
        for reference in &tweet.referenced_tweets {
            let Some(target) = self.tweets.get(reference.id.as_str()) else {
                continue;
            };
            match reference.kind.as_str() {
                "quoted" => post.quoted = Some(Box::new(self.shallow(target))),
                "retweeted" => post.retweeted = Some(Box::new(self.shallow(target))),
                _ => {}
            }
        }
        post
    }

    fn shallow(&self, tweet: &WireTweet) -> Post {
        let created_at = tweet.created_at.unwrap_or_else(Utc::now);
        let author = tweet
            .author_id
            .as_deref()
            .and_then(|id| self.users.get(id))
            .map(|user| author_from(user, created_at))
            .unwrap_or_else(|| unknown_author(tweet.author_id.as_deref(), created_at));

        Post {
            id: tweet.id.clone(),
            created_at,
            author,
            text: tweet.text.clone(),
            entities: self.entities(&tweet.entities),
            metrics: PublicMetrics {
                retweet_count: tweet.public_metrics.retweet_count,
                quote_count: tweet.public_metrics.quote_count,
                like_count: tweet.public_metrics.like_count,
                reply_count: tweet.public_metrics.reply_count,
            },
            quoted: None,
            retweeted: None,
        }
    }

    fn entities(&self, wire: &WireEntities) -> Entities {
        Entities {
            hashtags: wire
                .hashtags
                .iter()
                .map(|h| Hashtag { text: h.tag.clone() })
                .collect(),
            symbols: wire
                .cashtags
                .iter()
                .map(|c| Symbol { text: c.tag.clone() })
                .collect(),
            mentions: wire
                .mentions
                .iter()
                .map(|m| Mention {
                    handle: m.username.clone(),
                    name: self.mention_name(m),
                })
                .collect(),
            urls: wire
                .urls
                .iter()
                .map(|u| UrlEntity {
                    short_url: u.url.clone(),
                    expanded_url: u.expanded_url.clone(),
                })
                .collect(),
        }
    }

    fn mention_name(&self, mention: &WireMention) -> Option<String> {
        mention
            .id
            .as_deref()
            .and_then(|id| self.users.get(id).copied())
            .or_else(|| {
                self.users_by_handle
                    .get(&mention.username.to_lowercase())
                    .copied()
            })
            .map(|u| u.name.clone())
            .filter(|name| !name.is_empty())
    }
}

// an account without a creation time is assumed to be as young as the post
fn author_from(user: &WireUser, posted_at: DateTime<Utc>) -> Author {
    Author {
        id: user.id.clone(),
        handle: user.username.clone(),
        display_name: user.name.clone(),
        followers_count: user.public_metrics.followers_count,
        created_at: user.created_at.unwrap_or(posted_at),
        default_avatar: user
            .profile_image_url
            .as_deref()
            .map_or(true, |url| url.contains("default_profile_images")),
    }
}

// no expansion for the author: treat as brand new so the quality filter drops it
fn unknown_author(id: Option<&str>, created_at: DateTime<Utc>) -> Author {
    Author {
        id: id.unwrap_or_default().to_string(),
        handle: String::new(),
        display_name: String::new(),
        followers_count: 0,
        created_at,
        default_avatar: true,
    }
}

pub fn normalize_timeline(response: TimelineResponse) -> Page {
    let normalizer = Normalizer::new(&response.includes);
    let posts = response.data.iter().map(|t| normalizer.post(t)).collect();
    Page {
        posts,
        next_cursor: response.meta.next_token,
    }
}

pub fn normalize_lookup(response: LookupResponse) -> Option<Post> {
    let normalizer = Normalizer::new(&response.includes);
    response.data.as_ref().map(|t| normalizer.post(t))
}

/// Accepts a bare numeric id or a twitter.com / x.com status URL.
pub fn parse_tweet_url(input: &str) -> Option<String> {
    let input = input.trim();
    if !input.is_empty() && input.chars().all(|c| c.is_ascii_digit()) {
        return Some(input.to_string());
    }

    let url_regex = Regex::new(
        r"^https?://(?:www\.|mobile\.)?(?:twitter|x)\.com/[A-Za-z0-9_]+/status(?:es)?/(\d+)",
    )
    .ok()?;

    url_regex
        .captures(input)
        .and_then(|caps| caps.get(1))
        .map(|id| id.as_str().to_string())
}

#[derive(Debug, Clone)]
pub struct TwitterClient {
    client: reqwest::Client,
    token: String,
    api_base: String,
    page_size: u32,
}

impl TwitterClient {
    pub fn new(token: impl Into<String>, api_base: impl Into<String>, page_size: u32) -> Self {
        Self {
            client: reqwest::Client::new(),
            token: token.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            page_size,
        }
    }

    pub fn from_env(settings: &Twitter) -> Result<Self, TwitterError> {
        let token = std::env::var("TWITTER_BEARER_TOKEN")
            .ok()
            .filter(|t| !t.is_empty())
            .ok_or(TwitterError::MissingToken)?;
        Ok(Self::new(token, &settings.api_base, settings.page_size))
    }

    fn field_params() -> String {
        format!(
            "tweet.fields={}&user.fields={}&expansions={}",
            urlencoding::encode(TWEET_FIELDS),
            urlencoding::encode(USER_FIELDS),
            urlencoding::encode(EXPANSIONS)
        )
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, TwitterError> {
        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .bearer_auth(&self.token)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiProblem>(&body)
                .ok()
                .and_then(|p| p.detail.or(p.title))
                .unwrap_or_else(|| status.to_string());
            return Err(TwitterError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(serde_json::from_str(&body)?)
    }

    /// Recent search. The cursor drives paging; `since_id` only bounds it.
    pub async fn search_recent(
        &self,
        query: &str,
        cursor: Option<&str>,
        since_id: Option<&str>,
    ) -> Result<Page, TwitterError> {
        let mut url = format!(
            "{}/tweets/search/recent?query={}&max_results={}&{}",
            self.api_base,
            urlencoding::encode(query),
            self.page_size.clamp(10, 100),
            Self::field_params()
        );

        if let Some(token) = cursor {
            url.push_str(&format!("&next_token={}", urlencoding::encode(token)));
        }
        if let Some(id) = since_id {
            url.push_str(&format!("&since_id={}", urlencoding::encode(id)));
        }

        let response: TimelineResponse = self.get_json(&url).await?;
        Ok(normalize_timeline(response))
    }

    pub async fn list_tweets(&self, list_id: &str, cursor: Option<&str>) -> Result<Page, TwitterError> {
        let mut url = format!(
            "{}/lists/{}/tweets?max_results={}&{}",
            self.api_base,
            urlencoding::encode(list_id),
            self.page_size.clamp(1, 100),
            Self::field_params()
        );

        if let Some(token) = cursor {
            url.push_str(&format!("&pagination_token={}", urlencoding::encode(token)));
        }

        let response: TimelineResponse = self.get_json(&url).await?;
        Ok(normalize_timeline(response))
    }

    pub async fn lookup(&self, id: &str) -> Result<Option<Post>, TwitterError> {
        let url = format!(
            "{}/tweets/{}?{}",
            self.api_base,
            urlencoding::encode(id),
            Self::field_params()
        );

        let response: LookupResponse = self.get_json(&url).await?;
        Ok(normalize_lookup(response))
    }
}
