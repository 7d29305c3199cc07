use super::entities::EntityKind;
use super::snapshot::{top_for_kind, Blocklist};
use crate::db::PeriodEntity;
use crate::error::TrendsError;
use crate::schema::{entity_counts, period_entities};
use crate::sink::{read_json, write_json, SnapshotSink};
use chrono::{Days, NaiveDate};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

pub const PERIODS_DOCUMENT: &str = "periods.json";
pub const WEEKLY_WINDOW_DAYS: u64 = 7;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodReport {
    pub daily_top: Vec<PeriodEntity>,
    pub weekly_top: Vec<PeriodEntity>,
}

pub fn periods_document(feed: &str) -> String {
    format!("{feed}/{PERIODS_DOCUMENT}")
}

pub fn format_day(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

/// Appends today's rank-1 row of every kind to the period history.
///
/// Kinds without counters are skipped. A kind already captured today keeps its
/// first row.
pub fn capture_daily_top(
    conn: &mut SqliteConnection,
    feed: &str,
    blocklist: &Blocklist,
    today: NaiveDate,
) -> QueryResult<Vec<PeriodEntity>> {
    let date = format_day(today);

    conn.immediate_transaction(|conn| {
        let mut captured = Vec::new();
        for kind in EntityKind::iter() {
            let Some(top) = top_for_kind(conn, feed, kind, 1, blocklist)?.into_iter().next() else {
                continue;
            };

            let row = PeriodEntity {
                feed: top.feed,
                kind: top.kind,
                name: top.name,
                date: date.clone(),
                count: top.count,
                extra: top.extra,
            };
            diesel::insert_or_ignore_into(period_entities::table)
                .values(&row)
                .execute(conn)?;

            let stored = period_entities::table
                .filter(period_entities::feed.eq(feed))
                .filter(period_entities::kind.eq(kind.as_str()))
                .filter(period_entities::date.eq(&date))
                .select(PeriodEntity::as_select())
                .first(conn)?;
            captured.push(stored);
        }
        Ok(captured)
    })
}

/// Highest-count history row per kind over the trailing window ending at `today`.
pub fn weekly_top(
    conn: &mut SqliteConnection,
    feed_name: &str,
    blocklist: &Blocklist,
    today: NaiveDate,
) -> QueryResult<Vec<PeriodEntity>> {
    use crate::schema::period_entities::dsl::*;

    let cutoff = today
        .checked_sub_days(Days::new(WEEKLY_WINDOW_DAYS))
        .map(format_day)
        .unwrap_or_default();

    let mut best = Vec::new();
    for entity_kind in EntityKind::iter() {
        let rows = blocklist.take_unblocked(
            1,
            |skip, batch| {
                period_entities
                    .filter(feed.eq(feed_name))
                    .filter(kind.eq(entity_kind.as_str()))
                    .filter(date.gt(&cutoff))
                    .order((count.desc(), date.desc(), name.asc()))
                    .limit(batch)
                    .offset(skip)
                    .select(PeriodEntity::as_select())
                    .load(&mut *conn)
            },
            |row| row.name.as_str(),
        )?;
        best.extend(rows);
    }
    Ok(best)
}

pub fn truncate_counters(conn: &mut SqliteConnection, feed: &str) -> QueryResult<usize> {
    conn.immediate_transaction(|conn| {
        diesel::delete(entity_counts::table.filter(entity_counts::feed.eq(feed))).execute(conn)
    })
}

/// Daily capture, trailing-week query, document write, then counter reset.
///
/// Seen posts survive the reset so reappearing posts are never recounted.
pub fn roll_period<S: SnapshotSink + ?Sized>(
    conn: &mut SqliteConnection,
    sink: &S,
    feed: &str,
    blocklist: &Blocklist,
    today: NaiveDate,
) -> Result<PeriodReport, TrendsError> {
    let daily_top = capture_daily_top(conn, feed, blocklist, today)?;
    let weekly_top = weekly_top(conn, feed, blocklist, today)?;
    let report = PeriodReport {
        daily_top,
        weekly_top,
    };

    write_json(sink, &periods_document(feed), &report)?;
    let cleared = truncate_counters(conn, feed)?;
    tracing::debug!(feed, cleared, "counters truncated after period roll");

    Ok(report)
}

pub fn read_periods<S: SnapshotSink + ?Sized>(
    sink: &S,
    feed: &str,
) -> Result<Option<PeriodReport>, TrendsError> {
    read_json(sink, &periods_document(feed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{count_entities, count_seen_posts, test_connection, NewSeenPost};
    use crate::schema::seen_posts;
    use crate::sink::MemorySink;
    use crate::trends::snapshot::tests::insert_counter;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("valid date")
    }

    fn history_row(feed: &str, kind: EntityKind, name: &str, date: &str, count: i64) -> PeriodEntity {
        PeriodEntity {
            feed: feed.to_string(),
            kind: kind.as_str().to_string(),
            name: name.to_string(),
            date: date.to_string(),
            count,
            extra: None,
        }
    }

    fn insert_history(conn: &mut SqliteConnection, rows: &[PeriodEntity]) {
        diesel::insert_into(period_entities::table)
            .values(rows)
            .execute(conn)
            .expect("insert history");
    }

    fn history_len(conn: &mut SqliteConnection) -> i64 {
        period_entities::table
            .count()
            .get_result(conn)
            .expect("count history")
    }

    #[test]
    fn test_roll_captures_one_row_per_kind_and_truncates() {
        let mut conn = test_connection();
        let sink = MemorySink::default();
        insert_counter(&mut conn, "f", EntityKind::Hashtag, "foo", 5, Some(5));
        insert_counter(&mut conn, "f", EntityKind::Hashtag, "baz", 2, Some(2));
        insert_counter(&mut conn, "f", EntityKind::Cashtag, "$bar", 3, Some(3));

        let report = roll_period(&mut conn, &sink, "f", &Blocklist::default(), day("2024-05-10"))
            .expect("roll");

        let daily: Vec<_> = report
            .daily_top
            .iter()
            .map(|r| (r.kind.as_str(), r.name.as_str(), r.date.as_str()))
            .collect();
        assert_eq!(
            daily,
            vec![("CASHTAG", "$bar", "2024-05-10"), ("HASHTAG", "foo", "2024-05-10")]
        );
        assert_eq!(history_len(&mut conn), 2);
        assert_eq!(count_entities(&mut conn, "f").expect("count"), 0);

        let stored = read_periods(&sink, "f").expect("read").expect("document");
        let stored_names: Vec<_> = stored.daily_top.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(stored_names, vec!["$bar", "foo"]);
    }

    #[test]
    fn test_roll_keeps_seen_posts() {
        let mut conn = test_connection();
        let sink = MemorySink::default();
        diesel::insert_into(seen_posts::table)
            .values(NewSeenPost {
                feed: "f",
                post_id: "1",
                seen_at: 0,
            })
            .execute(&mut conn)
            .expect("insert seen post");
        insert_counter(&mut conn, "f", EntityKind::Mention, "alice", 1, None);

        roll_period(&mut conn, &sink, "f", &Blocklist::default(), day("2024-05-10")).expect("roll");
        assert_eq!(count_seen_posts(&mut conn, "f").expect("count"), 1);
    }

    #[test]
    fn test_blocklisted_names_skipped_in_capture() {
        let mut conn = test_connection();
        insert_counter(&mut conn, "f", EntityKind::Cashtag, "BTC", 50, Some(50));
        insert_counter(&mut conn, "f", EntityKind::Cashtag, "ETH", 4, Some(4));

        let captured =
            capture_daily_top(&mut conn, "f", &Blocklist::new(&["btc"]), day("2024-05-10"))
                .expect("capture");
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].name, "ETH");
    }

    #[test]
    fn test_second_capture_same_day_keeps_first() {
        let mut conn = test_connection();
        insert_counter(&mut conn, "f", EntityKind::Hashtag, "first", 3, Some(3));
        capture_daily_top(&mut conn, "f", &Blocklist::default(), day("2024-05-10"))
            .expect("capture");

        insert_counter(&mut conn, "f", EntityKind::Hashtag, "second", 9, Some(9));
        let again = capture_daily_top(&mut conn, "f", &Blocklist::default(), day("2024-05-10"))
            .expect("capture");
        assert_eq!(again[0].name, "first");

        let names: Vec<String> = period_entities::table
            .select(period_entities::name)
            .load(&mut conn)
            .expect("load history");
        assert_eq!(names, vec!["first".to_string()]);
    }

    #[test]
    fn test_weekly_window_excludes_old_and_blocked_rows() {
        let mut conn = test_connection();
        insert_history(
            &mut conn,
            &[
                history_row("f", EntityKind::Hashtag, "ancient", "2024-05-03", 100),
                history_row("f", EntityKind::Hashtag, "recent", "2024-05-04", 7),
                history_row("f", EntityKind::Hashtag, "today", "2024-05-10", 5),
                history_row("f", EntityKind::Cashtag, "BTC", "2024-05-09", 40),
                history_row("f", EntityKind::Cashtag, "SOL", "2024-05-08", 2),
                history_row("other", EntityKind::Url, "u", "2024-05-09", 1),
            ],
        );

        let weekly = weekly_top(&mut conn, "f", &Blocklist::new(&["btc"]), day("2024-05-10"))
            .expect("weekly");
        let names: Vec<_> = weekly.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["SOL", "recent"]);
    }

    #[test]
    fn test_roll_on_empty_feed_writes_empty_document() {
        let mut conn = test_connection();
        let sink = MemorySink::default();

        let report = roll_period(&mut conn, &sink, "f", &Blocklist::default(), day("2024-05-10"))
            .expect("roll");
        assert!(report.daily_top.is_empty());
        assert!(report.weekly_top.is_empty());

        let body = sink.read("f/periods.json").expect("read").expect("document");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(json["dailyTop"], serde_json::json!([]));
        assert_eq!(json["weeklyTop"], serde_json::json!([]));
    }

    #[test]
    fn test_non_ascii_blocklist_applies_to_capture_and_week() {
        let mut conn = test_connection();
        insert_counter(&mut conn, "f", EntityKind::Hashtag, "ÉTH", 9, Some(9));
        insert_counter(&mut conn, "f", EntityKind::Hashtag, "sol", 2, Some(2));
        insert_history(
            &mut conn,
            &[
                history_row("f", EntityKind::Hashtag, "Ξthereum", "2024-05-08", 40),
                history_row("f", EntityKind::Hashtag, "ada", "2024-05-07", 3),
            ],
        );

        let blocklist = Blocklist::new(&["éth", "ξthereum"]);
        let report =
            roll_period(&mut conn, &MemorySink::default(), "f", &blocklist, day("2024-05-10"))
                .expect("roll");
        let daily: Vec<_> = report.daily_top.iter().map(|r| r.name.as_str()).collect();
        let weekly: Vec<_> = report.weekly_top.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(daily, vec!["sol"]);
        assert_eq!(weekly, vec!["ada"]);
    }
}
