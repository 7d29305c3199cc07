use chrono::{DateTime, Utc};

/// A post as the pipeline sees it, normalized at the upstream boundary.
#[derive(Debug, Clone)]
pub struct Post {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub author: Author,
    pub text: String,
    pub entities: Entities,
    pub metrics: PublicMetrics,
    pub quoted: Option<Box<Post>>,
    pub retweeted: Option<Box<Post>>,
}

#[derive(Debug, Clone)]
pub struct Author {
    pub id: String,
    pub handle: String,
    pub display_name: String,
    pub followers_count: u64,
    pub created_at: DateTime<Utc>,
    pub default_avatar: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublicMetrics {
    pub retweet_count: u64,
    pub quote_count: u64,
    pub like_count: u64,
    pub reply_count: u64,
}

/// The four entity lists of a post. Order is preserved and duplicates are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entities {
    pub hashtags: Vec<Hashtag>,
    pub symbols: Vec<Symbol>,
    pub mentions: Vec<Mention>,
    pub urls: Vec<UrlEntity>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hashtag {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mention {
    pub handle: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlEntity {
    pub short_url: String,
    pub expanded_url: Option<String>,
}

/// One upstream page. An absent cursor means end of results.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub posts: Vec<Post>,
    pub next_cursor: Option<String>,
}

impl Entities {
    pub fn is_empty(&self) -> bool {
        self.hashtags.is_empty()
            && self.symbols.is_empty()
            && self.mentions.is_empty()
            && self.urls.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hashtags.len() + self.symbols.len() + self.mentions.len() + self.urls.len()
    }

    /// Appends every list of `other` after the matching list of `self`.
    pub fn concat(mut self, other: &Entities) -> Entities {
        self.hashtags.extend(other.hashtags.iter().cloned());
        self.symbols.extend(other.symbols.iter().cloned());
        self.mentions.extend(other.mentions.iter().cloned());
        self.urls.extend(other.urls.iter().cloned());
        self
    }
}

impl Post {
    pub fn is_retweet(&self) -> bool {
        self.retweeted.is_some()
    }

    pub fn is_quote(&self) -> bool {
        self.quoted.is_some()
    }

    pub fn engagement(&self) -> u64 {
        self.metrics.retweet_count + self.metrics.quote_count
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::Duration;

    pub fn author(handle: &str) -> Author {
        Author {
            id: format!("id-{handle}"),
            handle: handle.to_string(),
            display_name: handle.to_uppercase(),
            followers_count: 120,
            created_at: Utc::now() - Duration::days(400),
            default_avatar: false,
        }
    }

    pub fn post(id: &str) -> Post {
        Post {
            id: id.to_string(),
            created_at: Utc::now(),
            author: author("someone"),
            text: String::new(),
            entities: Entities::default(),
            metrics: PublicMetrics::default(),
            quoted: None,
            retweeted: None,
        }
    }

    pub fn hashtags(tags: &[&str]) -> Entities {
        Entities {
            hashtags: tags
                .iter()
                .map(|t| Hashtag {
                    text: t.to_string(),
                })
                .collect(),
            ..Default::default()
        }
    }

    pub fn post_with_hashtags(id: &str, tags: &[&str]) -> Post {
        Post {
            entities: hashtags(tags),
            ..post(id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_concat_keeps_order_and_duplicates() {
        let merged = hashtags(&["a", "b"]).concat(&hashtags(&["b", "c"]));
        let texts: Vec<_> = merged.hashtags.iter().map(|h| h.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "b", "c"]);
        assert_eq!(merged.len(), 4);
    }

    #[test]
    fn test_engagement_sums_amplification() {
        let mut p = post("1");
        p.metrics.retweet_count = 4;
        p.metrics.quote_count = 2;
        p.metrics.like_count = 100;
        assert_eq!(p.engagement(), 6);
    }
}
