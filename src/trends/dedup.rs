use crate::db::NewSeenPost;
use crate::post::Post;
use crate::schema::seen_posts;
use chrono::Utc;
use diesel::prelude::*;
use std::collections::HashSet;

/// Returns the posts of `batch` never seen before in `feed` and records them as seen.
///
/// Lookup and insert share one transaction. Repeated ids inside the batch keep
/// their first occurrence only.
pub fn filter_new_posts(
    conn: &mut SqliteConnection,
    feed: &str,
    batch: Vec<Post>,
) -> QueryResult<Vec<Post>> {
    if batch.is_empty() {
        return Ok(Vec::new());
    }

    conn.immediate_transaction(|conn| claim_new_posts(conn, feed, batch))
}

/// Same as [`filter_new_posts`] on the caller's open transaction.
pub fn claim_new_posts(
    conn: &mut SqliteConnection,
    feed: &str,
    batch: Vec<Post>,
) -> QueryResult<Vec<Post>> {
    if batch.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<&str> = batch.iter().map(|p| p.id.as_str()).collect();

    let existing: HashSet<String> = seen_posts::table
        .filter(seen_posts::feed.eq(feed))
        .filter(seen_posts::post_id.eq_any(&ids))
        .select(seen_posts::post_id)
        .load::<String>(conn)?
        .into_iter()
        .collect();

    let mut in_batch = HashSet::new();
    let fresh: Vec<Post> = batch
        .into_iter()
        .filter(|p| !existing.contains(&p.id) && in_batch.insert(p.id.clone()))
        .collect();

    if !fresh.is_empty() {
        let now = Utc::now().timestamp();
        let rows: Vec<NewSeenPost<'_>> = fresh
            .iter()
            .map(|p| NewSeenPost {
                feed,
                post_id: &p.id,
                seen_at: now,
            })
            .collect();

        diesel::insert_or_ignore_into(seen_posts::table)
            .values(&rows)
            .execute(conn)?;
    }

    Ok(fresh)
}
