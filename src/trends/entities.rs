use crate::post::{Entities, Post};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityKind {
    Cashtag,
    Hashtag,
    Url,
    Mention,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

/// Which extraction rule produced a post's entity bag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Resolution {
    #[strum(serialize = "quote (own + quoted)")]
    Quote,
    #[strum(serialize = "retweet (retweeted only)")]
    Retweet,
    #[strum(serialize = "own")]
    Own,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occurrence {
    pub kind: EntityKind,
    pub name: String,
    pub extra: Option<String>,
}

/// First match wins: a quote concatenates its own and the quoted entities,
/// a retweet is replaced by the retweeted entities, anything else keeps its own.
pub fn resolve_entities(post: &Post) -> (Resolution, Entities) {
    if let Some(quoted) = &post.quoted {
        (Resolution::Quote, post.entities.clone().concat(&quoted.entities))
    } else if let Some(retweeted) = &post.retweeted {
        (Resolution::Retweet, retweeted.entities.clone())
    } else {
        (Resolution::Own, post.entities.clone())
    }
}

pub fn is_self_referential(url: &str, self_domains: &[String]) -> bool {
    let url_lower = url.to_lowercase();
    self_domains
        .iter()
        .any(|domain| url_lower.contains(&domain.to_lowercase()))
}

pub fn extract_occurrences(post: &Post, self_domains: &[String]) -> Vec<Occurrence> {
    let (_, entities) = resolve_entities(post);
    occurrences_from(entities, self_domains)
}

pub fn occurrences_from(entities: Entities, self_domains: &[String]) -> Vec<Occurrence> {
    let mut occurrences = Vec::with_capacity(entities.len());

    occurrences.extend(entities.hashtags.into_iter().map(|h| Occurrence {
        kind: EntityKind::Hashtag,
        name: h.text,
        extra: None,
    }));

    occurrences.extend(entities.symbols.into_iter().map(|s| Occurrence {
        kind: EntityKind::Cashtag,
        name: s.text,
        extra: None,
    }));

    occurrences.extend(entities.mentions.into_iter().map(|m| Occurrence {
        kind: EntityKind::Mention,
        name: m.handle,
        extra: m.name,
    }));

    occurrences.extend(
        entities
            .urls
            .into_iter()
            .filter(|u| {
                let target = u.expanded_url.as_deref().unwrap_or(&u.short_url);
                !is_self_referential(target, self_domains)
            })
            .map(|u| Occurrence {
                kind: EntityKind::Url,
                name: u.short_url,
                extra: u.expanded_url,
            }),
    );

    occurrences
}
