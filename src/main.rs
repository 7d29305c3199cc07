use anyhow::Result;
use chrono::{DateTime, NaiveDate, Timelike, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::subscriber::set_global_default;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use trending_entities::db::{establish_pool, run_migrations};
use trending_entities::handler::{router, AppState, RunResponse};
use trending_entities::pagination::Resume;
use trending_entities::settings::settings;
use trending_entities::sink::FileSink;
use trending_entities::utils::twitter::TwitterClient;
use trending_entities::utils::{
    log_db_error, log_db_ready, log_db_status, log_missing_token, log_server_starting,
    log_startup_config,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let subscriber = tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("trending_entities=info".parse()?))
        .with(
            fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        );
    set_global_default(subscriber)?;

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3030);
    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| "trends.db".to_string());
    let api_secret = std::env::var("API_SECRET").ok();

    let settings = settings().clone();
    log_startup_config(
        port,
        &database_url,
        &settings.feeds,
        settings.server.enable_scheduler,
    );

    log_db_status("Initializing SQLite connection pool...");
    let pool = establish_pool(&database_url)?;
    {
        let mut conn = pool.get()?;
        match run_migrations(&mut conn) {
            Ok(applied) => log_db_ready(applied),
            Err(e) => {
                log_db_error(&e.to_string());
                return Err(e.into());
            }
        }
    }

    let client = match TwitterClient::from_env(&settings.twitter) {
        Ok(client) => Some(client),
        Err(_) => {
            log_missing_token();
            None
        }
    };

    let sink = Arc::new(FileSink::new(&settings.snapshot.directory));
    let state = Arc::new(AppState::new(pool, sink, settings, client, api_secret));

    if state.settings.server.enable_scheduler {
        spawn_scheduler(state.clone());
    }

    log_server_starting(port);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    axum::serve(listener, router(state)).await?;

    Ok(())
}

fn spawn_scheduler(state: Arc<AppState>) {
    let every = Duration::from_secs(state.settings.server.run_interval_minutes.max(1) * 60);

    if state.client.is_some() {
        for feed in &state.settings.feeds {
            let state = state.clone();
            let name = feed.name.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(every);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                let mut resume = Resume::default();
                loop {
                    interval.tick().await;
                    resume = match state.run_live(&name, &resume, None).await {
                        Ok(RunResponse::Resume { cursor, run_count }) => Resume {
                            cursor: Some(cursor),
                            run_count,
                        },
                        Ok(RunResponse::Done { .. }) => Resume::default(),
                        Err(e) => {
                            tracing::warn!(feed = %name, error = %e, "scheduled run failed");
                            Resume::default()
                        }
                    };
                }
            });
        }
    }

    let roll_hour = state.settings.server.roll_hour_utc;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        let mut last_rolled: Option<NaiveDate> = None;
        loop {
            interval.tick().await;
            let now = Utc::now();
            if !roll_due(now, roll_hour, last_rolled) {
                continue;
            }
            let today = now.date_naive();
            for feed in &state.settings.feeds {
                if let Err(e) = state.roll_feed(&feed.name, today).await {
                    tracing::warn!(feed = %feed.name, error = %e, "scheduled roll failed");
                }
            }
            last_rolled = Some(today);
        }
    });
}

/// At most one roll per UTC day, during the configured hour.
fn roll_due(now: DateTime<Utc>, roll_hour: u32, last_rolled: Option<NaiveDate>) -> bool {
    now.hour() == roll_hour && last_rolled != Some(now.date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_roll_due_once_per_day() {
        let at = |h| Utc.with_ymd_and_hms(2024, 5, 10, h, 30, 0).unwrap();
        let today = at(0).date_naive();

        assert!(roll_due(at(3), 3, None));
        assert!(!roll_due(at(4), 3, None));
        assert!(!roll_due(at(3), 3, Some(today)));
        assert!(roll_due(at(3), 3, today.pred_opt()));
    }
}
