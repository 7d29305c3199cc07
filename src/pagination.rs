use crate::error::TrendsError;
use crate::post::{Page, Post};
use crate::settings::{FeedSettings, FeedSource, Quality};
use crate::trends::counter::aggregate_in;
use crate::trends::dedup::claim_new_posts;
use crate::trends::{filter_page, mark_processed, AggregateReport};
use crate::utils::twitter::{TwitterClient, TwitterError};
use chrono::Utc;
use diesel::SqliteConnection;
use serde::{Deserialize, Serialize};
use std::future::Future;

/// Anything that can hand out pages of posts behind a continuation cursor.
pub trait PostSource: Send + Sync {
    fn fetch_page(
        &self,
        cursor: Option<&str>,
    ) -> impl Future<Output = Result<Page, TwitterError>> + Send;
}

/// Binds a feed definition to the upstream client.
pub struct FeedFetcher<'a> {
    client: &'a TwitterClient,
    feed: &'a FeedSettings,
    since_id: Option<String>,
}

impl<'a> FeedFetcher<'a> {
    pub fn new(client: &'a TwitterClient, feed: &'a FeedSettings) -> Self {
        Self {
            client,
            feed,
            since_id: None,
        }
    }

    pub fn with_since_id(mut self, since_id: Option<String>) -> Self {
        self.since_id = since_id;
        self
    }
}

pub fn search_query(query: &str, include_retweets: bool) -> String {
    if include_retweets || query.contains("-is:retweet") {
        query.to_string()
    } else {
        format!("{query} -is:retweet")
    }
}

impl PostSource for FeedFetcher<'_> {
    async fn fetch_page(&self, cursor: Option<&str>) -> Result<Page, TwitterError> {
        match &self.feed.source {
            FeedSource::Search { query } => {
                let query = search_query(query, self.feed.include_retweets);
                self.client
                    .search_recent(&query, cursor, self.since_id.as_deref())
                    .await
            }
            FeedSource::List { list_id } => {
                let mut page = self.client.list_tweets(list_id, cursor).await?;
                if !self.feed.include_retweets {
                    page.posts.retain(|p| !p.is_retweet());
                }
                Ok(page)
            }
        }
    }
}

/// Continuation state carried between invocations of one logical run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resume {
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default)]
    pub run_count: u32,
}

impl Resume {
    pub fn is_first_invocation(&self) -> bool {
        self.run_count == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    NoNewPosts,
    EndOfResults,
    BudgetReached { cursor: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageProgress {
    pub page: u32,
    pub fetched: usize,
    pub filtered: usize,
    pub new_posts: usize,
    pub report: AggregateReport,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub pages: u32,
    pub fetched: usize,
    pub filtered: usize,
    pub new_posts: usize,
    pub stop: StopReason,
}

impl RunOutcome {
    /// Token for the next invocation, if the budget ran out with more pages left
    /// and the run may still be chained.
    pub fn next_resume(&self, current: &Resume, max_runs: u32) -> Option<Resume> {
        match &self.stop {
            StopReason::BudgetReached { cursor } if current.run_count + 1 < max_runs => {
                Some(Resume {
                    cursor: Some(cursor.clone()),
                    run_count: current.run_count + 1,
                })
            }
            _ => None,
        }
    }
}

pub struct RunContext<'a> {
    pub feed: &'a FeedSettings,
    pub quality: &'a Quality,
    pub self_domains: &'a [String],
}

/// Dedup, optional watermark and counter upsert of one page, committed together.
/// A failure leaves neither seen posts nor counts behind, so a retry recounts the page.
fn commit_page(
    conn: &mut SqliteConnection,
    ctx: &RunContext<'_>,
    posts: Vec<Post>,
    freeze_processed: bool,
) -> Result<(Vec<Post>, AggregateReport), TrendsError> {
    let feed = ctx.feed.name.as_str();

    conn.immediate_transaction(|conn| {
        let fresh = claim_new_posts(conn, feed, posts)?;
        if freeze_processed {
            let marked = mark_processed(conn, feed)?;
            tracing::debug!(feed, marked, "processed counts frozen for this run");
        }
        let report = aggregate_in(conn, feed, &fresh, ctx.feed.weighting, ctx.self_domains)?;
        Ok((fresh, report))
    })
}

/// Fetch, filter, dedup, count, then report each page until the budget is spent,
/// a page brings nothing new, or the source runs dry.
///
/// The watermark pass runs once, before the first aggregation of a fresh run.
/// Any error aborts; pages already committed stay committed.
pub async fn run_pagination<S, F>(
    conn: &mut SqliteConnection,
    source: &S,
    ctx: &RunContext<'_>,
    resume: &Resume,
    mut on_page: F,
) -> Result<RunOutcome, TrendsError>
where
    S: PostSource,
    F: FnMut(&mut SqliteConnection, &PageProgress) -> Result<(), TrendsError>,
{
    let budget = ctx.feed.run_budget.max(1);
    let mut cursor = resume.cursor.clone();
    let mut outcome = RunOutcome {
        pages: 0,
        fetched: 0,
        filtered: 0,
        new_posts: 0,
        stop: StopReason::EndOfResults,
    };

    loop {
        let page = source.fetch_page(cursor.as_deref()).await?;
        cursor = page.next_cursor;
        outcome.pages += 1;

        let fetched = page.posts.len();
        let (kept, filtered) = filter_page(page.posts, ctx.quality, Utc::now());
        let freeze = outcome.pages == 1 && resume.is_first_invocation();
        let (fresh, report) = commit_page(conn, ctx, kept, freeze)?;

        let progress = PageProgress {
            page: outcome.pages,
            fetched,
            filtered,
            new_posts: fresh.len(),
            report,
        };
        outcome.fetched += fetched;
        outcome.filtered += filtered;
        outcome.new_posts += fresh.len();

        on_page(conn, &progress)?;

        if fresh.is_empty() {
            outcome.stop = StopReason::NoNewPosts;
            break;
        }
        let Some(next) = cursor.take() else {
            outcome.stop = StopReason::EndOfResults;
            break;
        };
        if outcome.pages >= budget {
            outcome.stop = StopReason::BudgetReached { cursor: next };
            break;
        }
        cursor = Some(next);
    }

    Ok(outcome)
}
