use crate::post::Post;
use crate::settings::Quality;
use chrono::{DateTime, Duration, Utc};
use strum::Display;

#[derive(Debug, Clone, PartialEq)]
pub enum FilterResult {
    Pass,
    Reject(Filter),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Filter {
    #[strum(serialize = "account-too-new")]
    AccountTooNew,
    #[strum(serialize = "no-followers")]
    NoFollowers,
    #[strum(serialize = "default-avatar")]
    DefaultAvatar,
}

impl FilterResult {
    pub fn passed(&self) -> bool {
        matches!(self, FilterResult::Pass)
    }
}

/// Bot heuristics on the author only; post content is never inspected.
pub fn apply_quality_filter(post: &Post, quality: &Quality, now: DateTime<Utc>) -> FilterResult {
    let author = &post.author;

    // a threshold too large to represent rejects every account
    let old_enough = Duration::try_days(quality.min_account_age_days)
        .is_some_and(|min_age| now - author.created_at > min_age);
    if !old_enough {
        return FilterResult::Reject(Filter::AccountTooNew);
    }

    if quality.require_followers && author.followers_count == 0 {
        return FilterResult::Reject(Filter::NoFollowers);
    }

    if quality.reject_default_avatar && author.default_avatar {
        return FilterResult::Reject(Filter::DefaultAvatar);
    }

    FilterResult::Pass
}

/// Keeps the posts that pass, returning how many were dropped.
pub fn filter_page(posts: Vec<Post>, quality: &Quality, now: DateTime<Utc>) -> (Vec<Post>, usize) {
    let before = posts.len();
    let kept: Vec<Post> = posts
        .into_iter()
        .filter(|p| apply_quality_filter(p, quality, now).passed())
        .collect();
    let dropped = before - kept.len();
    (kept, dropped)
}
