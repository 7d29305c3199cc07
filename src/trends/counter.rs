use super::entities::{extract_occurrences, EntityKind};
use crate::db::NewEntityCount;
use crate::post::Post;
use crate::schema::entity_counts;
use crate::settings::Weighting;
use chrono::Utc;
use diesel::prelude::*;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TallyEntry {
    pub delta: i64,
    pub extra: Option<String>,
}

/// In-memory fold of one batch: a single delta per (kind, name).
pub type Tally = BTreeMap<(EntityKind, String), TallyEntry>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregateReport {
    pub posts: usize,
    pub occurrences: usize,
    pub distinct: usize,
}

pub fn occurrence_weight(weighting: Weighting, post: &Post) -> i64 {
    match weighting {
        Weighting::Flat => 1,
        Weighting::Engagement => {
            1_i64.saturating_add(i64::try_from(post.engagement()).unwrap_or(i64::MAX))
        }
    }
}

pub fn tally_posts(posts: &[Post], weighting: Weighting, self_domains: &[String]) -> (Tally, usize) {
    let mut tally = Tally::new();
    let mut occurrences = 0;

    for post in posts {
        let weight = occurrence_weight(weighting, post);
        for occurrence in extract_occurrences(post, self_domains) {
            occurrences += 1;
            let entry = tally
                .entry((occurrence.kind, occurrence.name))
                .or_insert(TallyEntry {
                    delta: 0,
                    extra: None,
                });
            entry.delta = entry.delta.saturating_add(weight);
            if entry.extra.is_none() {
                entry.extra = occurrence.extra;
            }
        }
    }

    (tally, occurrences)
}

/// Upserts every key of the tally on the caller's connection. New keys start at
/// their delta with the first-seen extra; existing keys are incremented and keep
/// their extra. Atomicity is the caller's transaction.
pub fn upsert_tally(conn: &mut SqliteConnection, feed: &str, tally: &Tally) -> QueryResult<usize> {
    let now = Utc::now().timestamp();

    for ((kind, name), entry) in tally {
        let row = NewEntityCount {
            feed,
            kind: kind.as_str(),
            name: name.as_str(),
            count: entry.delta,
            last_update_time: now,
            extra: entry.extra.as_deref(),
        };

        diesel::insert_into(entity_counts::table)
            .values(&row)
            .on_conflict((
                entity_counts::feed,
                entity_counts::kind,
                entity_counts::name,
            ))
            .do_update()
            .set((
                entity_counts::count.eq(entity_counts::count + entry.delta),
                entity_counts::last_update_time.eq(now),
            ))
            .execute(conn)?;
    }
    Ok(tally.len())
}

/// Tally and upsert without opening a transaction.
pub fn aggregate_in(
    conn: &mut SqliteConnection,
    feed: &str,
    posts: &[Post],
    weighting: Weighting,
    self_domains: &[String],
) -> QueryResult<AggregateReport> {
    let (tally, occurrences) = tally_posts(posts, weighting, self_domains);
    let distinct = upsert_tally(conn, feed, &tally)?;

    Ok(AggregateReport {
        posts: posts.len(),
        occurrences,
        distinct,
    })
}

/// Counts a batch all-or-nothing: either every key is upserted or none is.
pub fn aggregate_posts(
    conn: &mut SqliteConnection,
    feed: &str,
    posts: &[Post],
    weighting: Weighting,
    self_domains: &[String],
) -> QueryResult<AggregateReport> {
    conn.immediate_transaction(|conn| aggregate_in(conn, feed, posts, weighting, self_domains))
}

/// Watermark pass: copies the live count into the processed count wherever they differ.
///
/// A single statement, so it is safe both alone and inside a page transaction.
pub fn mark_processed(conn: &mut SqliteConnection, feed_name: &str) -> QueryResult<usize> {
    use crate::schema::entity_counts::dsl::*;

    let now = Utc::now().timestamp();

    diesel::update(
        entity_counts
            .filter(feed.eq(feed_name))
            .filter(processed_count.is_null().or(processed_count.ne(count.nullable()))),
    )
    .set((
        processed_count.eq(count.nullable()),
        last_update_time.eq(now),
    ))
    .execute(conn)
}
