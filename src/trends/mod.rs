pub mod counter;
pub mod dedup;
pub mod entities;
pub mod filters;
pub mod period;
pub mod snapshot;

pub use counter::{aggregate_posts, mark_processed, occurrence_weight, AggregateReport};
pub use dedup::filter_new_posts;
pub use entities::{extract_occurrences, resolve_entities, EntityKind, Occurrence, Resolution};
pub use filters::{apply_quality_filter, filter_page, Filter, FilterResult};
pub use period::{read_periods, roll_period, PeriodReport};
pub use snapshot::{read_top_entities, write_top_entities, Blocklist, RankedEntity, TopEntities};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{get_entity, test_connection};
    use crate::post::fixtures::post_with_hashtags;
    use crate::settings::Weighting;
    use crate::sink::MemorySink;

    fn domains() -> Vec<String> {
        vec!["x.com".to_string()]
    }

    #[test]
    fn test_retweet_counts_only_retweeted_entities() {
        let mut conn = test_connection();
        let mut wrapper = post_with_hashtags("1", &["y"]);
        wrapper.retweeted = Some(Box::new(post_with_hashtags("2", &["x"])));

        let fresh = filter_new_posts(&mut conn, "f", vec![wrapper]).expect("dedup");
        aggregate_posts(&mut conn, "f", &fresh, Weighting::Flat, &domains()).expect("agg");

        assert!(get_entity(&mut conn, "f", "HASHTAG", "x")
            .expect("lookup")
            .is_some());
        assert!(get_entity(&mut conn, "f", "HASHTAG", "y")
            .expect("lookup")
            .is_none());
    }

    #[test]
    fn test_quote_counts_both_entities() {
        let mut conn = test_connection();
        let mut wrapper = post_with_hashtags("1", &["y"]);
        wrapper.quoted = Some(Box::new(post_with_hashtags("2", &["x"])));

        aggregate_posts(&mut conn, "f", &[wrapper], Weighting::Flat, &domains()).expect("agg");

        for tag in ["x", "y"] {
            let row = get_entity(&mut conn, "f", "HASHTAG", tag)
                .expect("lookup")
                .expect("counted");
            assert_eq!(row.count, 1);
        }
    }

    #[test]
    fn test_repeated_page_does_not_recount() {
        let mut conn = test_connection();
        let page = vec![post_with_hashtags("1", &["eth"]), post_with_hashtags("2", &["eth"])];

        for _ in 0..2 {
            let fresh = filter_new_posts(&mut conn, "f", page.clone()).expect("dedup");
            aggregate_posts(&mut conn, "f", &fresh, Weighting::Flat, &domains()).expect("agg");
        }

        let eth = get_entity(&mut conn, "f", "HASHTAG", "eth")
            .expect("lookup")
            .expect("counted");
        assert_eq!(eth.count, 2);
    }

    #[test]
    fn test_watermark_freezes_snapshot_order() {
        let mut conn = test_connection();
        let sink = MemorySink::default();
        let first = vec![
            post_with_hashtags("1", &["old", "old"]),
            post_with_hashtags("2", &["new"]),
        ];
        aggregate_posts(&mut conn, "f", &first, Weighting::Flat, &domains()).expect("agg");
        mark_processed(&mut conn, "f").expect("mark");

        let burst = vec![post_with_hashtags("3", &["new", "new", "new"])];
        aggregate_posts(&mut conn, "f", &burst, Weighting::Flat, &domains()).expect("agg");

        let top = write_top_entities(&mut conn, &sink, "f", 10, &Blocklist::default())
            .expect("snapshot");
        let order: Vec<_> = top.hashtags.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(order, vec!["old", "new"]);

        mark_processed(&mut conn, "f").expect("mark");
        let top = write_top_entities(&mut conn, &sink, "f", 10, &Blocklist::default())
            .expect("snapshot");
        let order: Vec<_> = top.hashtags.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(order, vec!["new", "old"]);
    }
}
