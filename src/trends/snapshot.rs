use super::entities::EntityKind;
use crate::db::EntityCount;
use crate::error::TrendsError;
use crate::sink::{read_json, write_json, SnapshotSink};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

pub const TOP_ENTITIES_DOCUMENT: &str = "top_entities.json";

/// Names excluded from every ranked output, matched case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Blocklist {
    names: Vec<String>,
}

impl Blocklist {
    pub fn new<S: AsRef<str>>(names: &[S]) -> Self {
        let mut names: Vec<String> = names
            .iter()
            .map(|n| n.as_ref().trim().to_lowercase())
            .filter(|n| !n.is_empty())
            .collect();
        names.sort();
        names.dedup();
        Self { names }
    }

    pub fn contains(&self, name: &str) -> bool {
        let lowered = name.to_lowercase();
        self.names.iter().any(|n| *n == lowered)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Collects the first `limit` unblocked rows from an ordered query.
    ///
    /// `fetch(offset, batch)` must return rows in a stable total order. Batches
    /// are over-sized by the blocklist length so one round trip usually suffices.
    pub fn take_unblocked<T, F, N>(&self, limit: i64, mut fetch: F, name_of: N) -> QueryResult<Vec<T>>
    where
        F: FnMut(i64, i64) -> QueryResult<Vec<T>>,
        N: Fn(&T) -> &str,
    {
        let Ok(wanted) = usize::try_from(limit) else {
            return Ok(Vec::new());
        };
        if wanted == 0 {
            return Ok(Vec::new());
        }

        let batch = limit.saturating_add(self.names.len() as i64);
        let mut kept = Vec::with_capacity(wanted);
        let mut offset = 0;
        loop {
            let rows = fetch(offset, batch)?;
            let exhausted = (rows.len() as i64) < batch;
            kept.extend(rows.into_iter().filter(|row| !self.contains(name_of(row))));
            if kept.len() >= wanted || exhausted {
                break;
            }
            offset += batch;
        }
        kept.truncate(wanted);
        Ok(kept)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopEntities {
    pub hashtags: Vec<RankedEntity>,
    pub cashtags: Vec<RankedEntity>,
    pub mentions: Vec<RankedEntity>,
    pub urls: Vec<RankedEntity>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedEntity {
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub name: String,
    pub count: i64,
    pub processed_count: Option<i64>,
    pub extra: Option<String>,
    pub last_update_time: i64,
}

impl TryFrom<EntityCount> for RankedEntity {
    type Error = strum::ParseError;

    fn try_from(row: EntityCount) -> Result<Self, Self::Error> {
        Ok(Self {
            kind: row.kind.parse()?,
            name: row.name,
            count: row.count,
            processed_count: row.processed_count,
            extra: row.extra,
            last_update_time: row.last_update_time,
        })
    }
}

impl TopEntities {
    pub fn for_kind(&self, kind: EntityKind) -> &[RankedEntity] {
        match kind {
            EntityKind::Hashtag => &self.hashtags,
            EntityKind::Cashtag => &self.cashtags,
            EntityKind::Mention => &self.mentions,
            EntityKind::Url => &self.urls,
        }
    }

    fn for_kind_mut(&mut self, kind: EntityKind) -> &mut Vec<RankedEntity> {
        match kind {
            EntityKind::Hashtag => &mut self.hashtags,
            EntityKind::Cashtag => &mut self.cashtags,
            EntityKind::Mention => &mut self.mentions,
            EntityKind::Url => &mut self.urls,
        }
    }

    pub fn len(&self) -> usize {
        self.hashtags.len() + self.cashtags.len() + self.mentions.len() + self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Top rows of one kind: processed count desc, then live count desc, then name.
pub fn top_for_kind(
    conn: &mut SqliteConnection,
    feed_name: &str,
    entity_kind: EntityKind,
    limit: i64,
    blocklist: &Blocklist,
) -> QueryResult<Vec<EntityCount>> {
    use crate::schema::entity_counts::dsl::*;

    blocklist.take_unblocked(
        limit,
        |skip, batch| {
            entity_counts
                .filter(feed.eq(feed_name))
                .filter(kind.eq(entity_kind.as_str()))
                .order((processed_count.desc(), count.desc(), name.asc()))
                .limit(batch)
                .offset(skip)
                .select(EntityCount::as_select())
                .load(&mut *conn)
        },
        |row| row.name.as_str(),
    )
}

pub fn load_top_entities(
    conn: &mut SqliteConnection,
    feed: &str,
    limit: i64,
    blocklist: &Blocklist,
) -> Result<TopEntities, TrendsError> {
    use strum::IntoEnumIterator;

    let mut top = TopEntities::default();
    for kind in EntityKind::iter() {
        *top.for_kind_mut(kind) = top_for_kind(conn, feed, kind, limit, blocklist)?
            .into_iter()
            .map(RankedEntity::try_from)
            .collect::<Result<_, _>>()?;
    }
    Ok(top)
}

pub fn snapshot_document(feed: &str) -> String {
    format!("{feed}/{TOP_ENTITIES_DOCUMENT}")
}

/// Ranks the feed's counters and overwrites its snapshot document.
pub fn write_top_entities<S: SnapshotSink + ?Sized>(
    conn: &mut SqliteConnection,
    sink: &S,
    feed: &str,
    limit: i64,
    blocklist: &Blocklist,
) -> Result<TopEntities, TrendsError> {
    let top = load_top_entities(conn, feed, limit, blocklist)?;
    write_json(sink, &snapshot_document(feed), &top)?;
    Ok(top)
}

pub fn read_top_entities<S: SnapshotSink + ?Sized>(
    sink: &S,
    feed: &str,
) -> Result<Option<TopEntities>, TrendsError> {
    read_json(sink, &snapshot_document(feed))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::{test_connection, NewEntityCount};
    use crate::schema::entity_counts;
    use crate::sink::MemorySink;

    pub(crate) fn insert_counter(
        conn: &mut SqliteConnection,
        feed: &str,
        kind: EntityKind,
        name: &str,
        count: i64,
        processed: Option<i64>,
    ) {
        diesel::insert_into(entity_counts::table)
            .values(NewEntityCount {
                feed,
                kind: kind.as_str(),
                name,
                count,
                last_update_time: 0,
                extra: None,
            })
            .execute(conn)
            .expect("insert counter");
        diesel::update(
            entity_counts::table
                .filter(entity_counts::feed.eq(feed))
                .filter(entity_counts::kind.eq(kind.as_str()))
                .filter(entity_counts::name.eq(name)),
        )
        .set(entity_counts::processed_count.eq(processed))
        .execute(conn)
        .expect("set processed count");
    }

    fn names(rows: &[RankedEntity]) -> Vec<&str> {
        rows.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn test_blocklist_is_case_insensitive() {
        let blocklist = Blocklist::new(&["BTC", " eth ", "btc", ""]);
        assert_eq!(blocklist.names(), &["btc".to_string(), "eth".to_string()]);
        assert!(blocklist.contains("Btc"));
        assert!(!blocklist.contains("sol"));
        assert!(Blocklist::new::<&str>(&[]).is_empty());
    }

    #[test]
    fn test_processed_count_ranks_first() {
        let mut conn = test_connection();
        insert_counter(&mut conn, "f", EntityKind::Hashtag, "crypto", 10, Some(10));
        insert_counter(&mut conn, "f", EntityKind::Hashtag, "eth", 12, Some(9));

        let top = load_top_entities(&mut conn, "f", 2, &Blocklist::default()).expect("top");
        assert_eq!(names(&top.hashtags), vec!["crypto", "eth"]);
    }

    #[test]
    fn test_live_count_breaks_ties_and_nulls_last() {
        let mut conn = test_connection();
        insert_counter(&mut conn, "f", EntityKind::Cashtag, "SOL", 3, Some(5));
        insert_counter(&mut conn, "f", EntityKind::Cashtag, "ADA", 7, Some(5));
        insert_counter(&mut conn, "f", EntityKind::Cashtag, "NEW", 50, None);

        let top = load_top_entities(&mut conn, "f", 10, &Blocklist::default()).expect("top");
        assert_eq!(names(&top.cashtags), vec!["ADA", "SOL", "NEW"]);
    }

    #[test]
    fn test_blocklisted_names_never_ranked() {
        let mut conn = test_connection();
        insert_counter(&mut conn, "f", EntityKind::Cashtag, "btc", 100, Some(100));
        insert_counter(&mut conn, "f", EntityKind::Hashtag, "BTC", 90, Some(90));
        insert_counter(&mut conn, "f", EntityKind::Cashtag, "ETH", 5, Some(5));

        let top = load_top_entities(&mut conn, "f", 10, &Blocklist::new(&["BTC"])).expect("top");
        assert_eq!(names(&top.cashtags), vec!["ETH"]);
        assert!(top.hashtags.is_empty());
    }

    #[test]
    fn test_limit_applies_per_kind() {
        let mut conn = test_connection();
        for (i, name) in ["a", "b", "c"].iter().enumerate() {
            insert_counter(&mut conn, "f", EntityKind::Hashtag, name, i as i64, Some(i as i64));
            insert_counter(&mut conn, "f", EntityKind::Mention, name, i as i64, Some(i as i64));
        }

        let top = load_top_entities(&mut conn, "f", 2, &Blocklist::default()).expect("top");
        assert_eq!(names(&top.hashtags), vec!["c", "b"]);
        assert_eq!(names(&top.mentions), vec!["c", "b"]);
        assert_eq!(top.len(), 4);
    }

    #[test]
    fn test_snapshot_overwrites_document() {
        let mut conn = test_connection();
        let sink = MemorySink::default();
        insert_counter(&mut conn, "f", EntityKind::Hashtag, "a", 1, Some(1));
        write_top_entities(&mut conn, &sink, "f", 10, &Blocklist::default()).expect("write");

        insert_counter(&mut conn, "f", EntityKind::Hashtag, "b", 2, Some(2));
        write_top_entities(&mut conn, &sink, "f", 10, &Blocklist::default()).expect("write");

        let stored = read_top_entities(&sink, "f").expect("read").expect("document");
        assert_eq!(names(&stored.hashtags), vec!["b", "a"]);
        assert!(read_top_entities(&sink, "other").expect("read").is_none());
    }

    #[test]
    fn test_blocklist_folds_non_ascii_names() {
        let mut conn = test_connection();
        insert_counter(&mut conn, "f", EntityKind::Hashtag, "Ξthereum", 9, Some(9));
        insert_counter(&mut conn, "f", EntityKind::Hashtag, "ÉTH", 8, Some(8));
        insert_counter(&mut conn, "f", EntityKind::Hashtag, "Btc", 7, Some(7));
        insert_counter(&mut conn, "f", EntityKind::Hashtag, "sol", 1, Some(1));

        let blocklist = Blocklist::new(&["ξthereum", "éth", "btc"]);
        let top = load_top_entities(&mut conn, "f", 10, &blocklist).expect("top");
        assert_eq!(names(&top.hashtags), vec!["sol"]);
    }

    #[test]
    fn test_case_variants_beyond_first_batch_are_skipped() {
        let mut conn = test_connection();
        for (i, name) in ["BTC", "Btc", "bTc", "btC", "btc"].iter().enumerate() {
            insert_counter(&mut conn, "f", EntityKind::Cashtag, name, 100 - i as i64, Some(100));
        }
        insert_counter(&mut conn, "f", EntityKind::Cashtag, "ETH", 2, Some(2));
        insert_counter(&mut conn, "f", EntityKind::Cashtag, "SOL", 1, Some(1));

        let top = load_top_entities(&mut conn, "f", 1, &Blocklist::new(&["btc"])).expect("top");
        assert_eq!(names(&top.cashtags), vec!["ETH"]);
    }

    #[test]
    fn test_unknown_kind_is_an_error() {
        let row = EntityCount {
            feed: "f".into(),
            kind: "EMOJI".into(),
            name: "ok".into(),
            count: 1,
            processed_count: None,
            last_update_time: 0,
            extra: None,
        };
        let err = TrendsError::from(RankedEntity::try_from(row).expect_err("unknown kind"));
        assert!(matches!(err, TrendsError::InvalidKind(_)));
    }
}
