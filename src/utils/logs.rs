use chrono::{DateTime, Utc};
use console::{measure_text_width, Style};

use crate::pagination::{PageProgress, Resume, RunOutcome, StopReason};
use crate::post::Post;
use crate::settings::{FeedSettings, FeedSource, Quality, Weighting};
use crate::trends::entities::occurrences_from;
use crate::trends::{
    apply_quality_filter, occurrence_weight, resolve_entities, FilterResult, Occurrence,
    PeriodReport, Resolution, TopEntities,
};

pub const TREE_BRANCH: char = '\u{251C}';
pub const TREE_END: char = '\u{2514}';
pub const TREE_HORIZ: char = '\u{2500}';
pub const TREE_VERT: char = '\u{2502}';

const TREE_PREFIX_WIDTH: usize = 4;
const VALUE_COLUMN: usize = 25;

fn tree_branch() -> String {
    dim()
        .apply_to(format!("{}{}{} ", TREE_BRANCH, TREE_HORIZ, TREE_HORIZ))
        .to_string()
}

fn tree_end() -> String {
    dim()
        .apply_to(format!("{}{}{} ", TREE_END, TREE_HORIZ, TREE_HORIZ))
        .to_string()
}

fn tree_indent() -> String {
    dim().apply_to(format!("{}   ", TREE_VERT)).to_string()
}

fn tree_item(is_last: bool) -> String {
    if is_last {
        tree_end()
    } else {
        tree_branch()
    }
}

fn dim() -> Style {
    Style::new().dim()
}

fn blue() -> Style {
    Style::new().blue()
}

fn magenta() -> Style {
    Style::new().magenta()
}

fn cyan() -> Style {
    Style::new().cyan()
}

fn green() -> Style {
    Style::new().green()
}

fn red() -> Style {
    Style::new().red()
}

fn yellow() -> Style {
    Style::new().yellow()
}

fn bold() -> Style {
    Style::new().bold()
}

fn init_prefix() -> String {
    blue().apply_to("[INIT]").to_string()
}

fn run_prefix() -> String {
    magenta().apply_to("[RUN]").to_string()
}

fn roll_prefix() -> String {
    yellow().apply_to("[ROLL]").to_string()
}

fn db_prefix() -> String {
    cyan().apply_to("[DB]").to_string()
}

fn http_prefix() -> String {
    green().apply_to("[HTTP]").to_string()
}

fn pad_label(label: &str, depth: usize) -> String {
    let prefix_width = depth * TREE_PREFIX_WIDTH;
    let target_width = VALUE_COLUMN.saturating_sub(prefix_width);
    let current_width = measure_text_width(label);
    if current_width < target_width {
        format!("{}{}", label, " ".repeat(target_width - current_width))
    } else {
        format!("{} ", label)
    }
}

fn describe_source(source: &FeedSource) -> String {
    match source {
        FeedSource::Search { query } => format!("search {query}"),
        FeedSource::List { list_id } => format!("list {list_id}"),
    }
}

pub fn log_startup_config(port: u16, database_url: &str, feeds: &[FeedSettings], scheduler: bool) {
    println!(
        "{} starting trending-entities on {}...",
        init_prefix(),
        cyan().apply_to(format!("0.0.0.0:{port}")),
    );
    println!("{}{} {}", tree_branch(), pad_label("database", 1), dim().apply_to(database_url));
    println!(
        "{}{} {}",
        tree_branch(),
        pad_label("scheduler", 1),
        if scheduler {
            green().apply_to("enabled")
        } else {
            yellow().apply_to("disabled")
        }
    );
    println!("{}{}", tree_end(), pad_label("feeds", 1));
    if feeds.is_empty() {
        println!("    {}{}", tree_end(), dim().apply_to("none"));
    }
    for (i, feed) in feeds.iter().enumerate() {
        println!(
            "    {}{}{}",
            tree_item(i == feeds.len() - 1),
            pad_label(&feed.name, 2),
            dim().apply_to(describe_source(&feed.source))
        );
    }
}

pub fn log_missing_token() {
    println!(
        "{} {} runs will fail until it is set",
        init_prefix(),
        yellow().apply_to("TWITTER_BEARER_TOKEN not set:"),
    );
}

pub fn log_db_status(message: &str) {
    println!("{} {}", db_prefix(), message);
}

pub fn log_db_ready(applied: usize) {
    println!(
        "{} ready ({} migrations applied)",
        db_prefix(),
        bold().apply_to(applied)
    );
}

pub fn log_db_error(error: &str) {
    println!("{} {}", db_prefix(), red().apply_to(error));
}

pub fn log_server_starting(port: u16) {
    println!(
        "{} listening on {}",
        http_prefix(),
        cyan().apply_to(format!("0.0.0.0:{port}"))
    );
}

pub fn log_unauthorized(path: &str) {
    println!(
        "{} {} {}",
        http_prefix(),
        red().apply_to("rejected"),
        dim().apply_to(path)
    );
}

pub fn log_run_start(feed: &str, resume: &Resume) {
    let continuation = match &resume.cursor {
        Some(cursor) => format!(
            " (resume #{} from {})",
            resume.run_count,
            dim().apply_to(cursor)
        ),
        None => String::new(),
    };
    println!(
        "{} polling {}{}",
        run_prefix(),
        cyan().apply_to(feed),
        continuation
    );
}

pub fn log_page(progress: &PageProgress) {
    println!(
        "{}page {}: {} fetched, {} filtered, {} new, {} entities",
        tree_branch(),
        bold().apply_to(progress.page),
        progress.fetched,
        dim().apply_to(progress.filtered),
        bold().apply_to(progress.new_posts),
        progress.report.distinct
    );
}

pub fn log_run_done(feed: &str, outcome: &RunOutcome) {
    let reason = match &outcome.stop {
        StopReason::NoNewPosts => "no new posts".to_string(),
        StopReason::EndOfResults => "end of results".to_string(),
        StopReason::BudgetReached { .. } => "budget reached".to_string(),
    };
    println!(
        "{}{} {} new posts over {} pages ({})",
        tree_end(),
        cyan().apply_to(feed),
        bold().apply_to(outcome.new_posts),
        outcome.pages,
        dim().apply_to(reason)
    );
}

pub fn log_run_error(feed: &str, error: &str) {
    println!(
        "{} {} {}",
        run_prefix(),
        red().apply_to(format!("{feed} failed:")),
        dim().apply_to(error)
    );
}

pub fn log_snapshot_written(feed: &str, top: &TopEntities) {
    tracing::debug!(feed, entries = top.len(), "top entities snapshot written");
}

pub fn log_roll(feed: &str, report: &PeriodReport) {
    println!("{} rolled {}", roll_prefix(), cyan().apply_to(feed));
    println!("{}daily:", tree_branch());
    print_period_rows(&report.daily_top, false);
    println!("{}weekly:", tree_end());
    print_period_rows(&report.weekly_top, true);
}

fn print_period_rows(rows: &[crate::db::PeriodEntity], last_group: bool) {
    let indent = if last_group {
        "    ".to_string()
    } else {
        tree_indent()
    };
    if rows.is_empty() {
        println!("{}{}{}", indent, tree_end(), dim().apply_to("none"));
        return;
    }
    for (i, row) in rows.iter().enumerate() {
        println!(
            "{}{}{}{} {}",
            indent,
            tree_item(i == rows.len() - 1),
            pad_label(&row.kind.to_lowercase(), 2),
            bold().apply_to(&row.name),
            dim().apply_to(row.count)
        );
    }
}

pub fn log_roll_error(feed: &str, error: &str) {
    println!(
        "{} {} {}",
        roll_prefix(),
        red().apply_to(format!("{feed} failed:")),
        dim().apply_to(error)
    );
}

pub fn log_fetch_start(id: &str) {
    println!("{} post {}...", dim().apply_to("fetching"), cyan().apply_to(id));
}

pub fn log_fetch_error(error: &str) {
    eprintln!("{} {}", red().apply_to("fetch failed:"), error);
}

/// Everything the inspect binary knows about one post.
#[derive(Debug, Clone)]
pub struct PostInspection {
    pub text_preview: String,
    pub handle: String,
    pub followers: u64,
    pub account_age_days: i64,
    pub default_avatar: bool,
    pub filter_result: FilterResult,
    pub resolution: Resolution,
    pub occurrences: Vec<Occurrence>,
    pub flat_weight: i64,
    pub engagement_weight: i64,
}

impl PostInspection {
    pub fn inspect(post: &Post, quality: &Quality, self_domains: &[String], now: DateTime<Utc>) -> Self {
        let (resolution, entities) = resolve_entities(post);
        Self {
            text_preview: Self::preview(post),
            handle: post.author.handle.clone(),
            followers: post.author.followers_count,
            account_age_days: (now - post.author.created_at).num_days(),
            default_avatar: post.author.default_avatar,
            filter_result: apply_quality_filter(post, quality, now),
            resolution,
            occurrences: occurrences_from(entities, self_domains),
            flat_weight: occurrence_weight(Weighting::Flat, post),
            engagement_weight: occurrence_weight(Weighting::Engagement, post),
        }
    }

    pub fn preview(post: &Post) -> String {
        let preview = if post.text.chars().count() > 60 {
            format!("{}...", post.text.chars().take(57).collect::<String>())
        } else {
            post.text.clone()
        };
        preview.replace('\n', " ")
    }

    pub fn print(&self) {
        let mut lines: Vec<String> = Vec::new();

        lines.push(format!(
            "{} \"{}\"",
            magenta().apply_to(bold().apply_to("[POST]")),
            dim().apply_to(&self.text_preview)
        ));

        lines.push(String::new());
        lines.push(format!("{}", bold().apply_to("AUTHOR")));
        lines.push(format!(
            "{}{} @{}",
            tree_branch(),
            pad_label("handle", 1),
            self.handle
        ));
        lines.push(format!(
            "{}{} {}",
            tree_branch(),
            pad_label("followers", 1),
            self.followers
        ));
        lines.push(format!(
            "{}{} {}d",
            tree_branch(),
            pad_label("account age", 1),
            self.account_age_days
        ));
        lines.push(format!(
            "{}{} {}",
            tree_branch(),
            pad_label("default avatar", 1),
            self.default_avatar
        ));
        let verdict = match &self.filter_result {
            FilterResult::Pass => format!("{}", green().apply_to("pass")),
            FilterResult::Reject(f) => format!("{} ({})", red().apply_to("reject"), f),
        };
        lines.push(format!("{}{} {}", tree_end(), pad_label("quality", 1), verdict));

        lines.push(String::new());
        lines.push(format!("{}", bold().apply_to("ENTITIES")));
        lines.push(format!(
            "{}{} {}",
            tree_branch(),
            pad_label("rule", 1),
            cyan().apply_to(self.resolution)
        ));
        lines.push(format!(
            "{}{} flat {} / engagement {}",
            tree_branch(),
            pad_label("weight", 1),
            bold().apply_to(self.flat_weight),
            bold().apply_to(self.engagement_weight)
        ));
        lines.push(format!("{}{}", tree_end(), pad_label("occurrences", 1)));
        if self.occurrences.is_empty() {
            lines.push(format!("    {}{}", tree_end(), dim().apply_to("none")));
        }
        let count = self.occurrences.len();
        for (i, occurrence) in self.occurrences.iter().enumerate() {
            let extra = occurrence
                .extra
                .as_deref()
                .map(|e| format!(" {}", dim().apply_to(e)))
                .unwrap_or_default();
            lines.push(format!(
                "    {}{}{}{}",
                tree_item(i == count - 1),
                pad_label(occurrence.kind.as_str(), 2),
                occurrence.name,
                extra
            ));
        }

        println!("{}\n", lines.join("\n"));
    }
}
