use crate::error::TrendsError;
use crate::schema::{entity_counts, period_entities, seen_posts};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PoolError, PooledConnection};
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use serde::{Deserialize, Serialize};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;
pub type DbConnection = PooledConnection<ConnectionManager<SqliteConnection>>;

#[derive(Debug, Clone, Copy)]
struct ConnectionOptions;

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        configure_connection(conn).map_err(diesel::r2d2::Error::QueryError)
    }
}

pub fn establish_pool(database_url: &str) -> Result<DbPool, PoolError> {
    let manager = ConnectionManager::<SqliteConnection>::new(database_url);
    Pool::builder()
        .max_size(5)
        .connection_customizer(Box::new(ConnectionOptions))
        .build(manager)
}

pub fn configure_connection(conn: &mut SqliteConnection) -> QueryResult<()> {
    conn.batch_execute("PRAGMA busy_timeout = 2000;")?;
    conn.batch_execute("PRAGMA journal_mode = WAL;")?;
    conn.batch_execute("PRAGMA synchronous = NORMAL;")?;
    conn.batch_execute("PRAGMA foreign_keys = ON;")?;
    Ok(())
}

/// Creates the schema if needed. Safe to call on every startup.
pub fn run_migrations(conn: &mut SqliteConnection) -> Result<usize, TrendsError> {
    conn.run_pending_migrations(MIGRATIONS)
        .map(|applied| applied.len())
        .map_err(|e| TrendsError::Migration(e.to_string()))
}

#[derive(Queryable, Selectable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = entity_counts)]
pub struct EntityCount {
    pub feed: String,
    pub kind: String,
    pub name: String,
    pub count: i64,
    pub processed_count: Option<i64>,
    pub last_update_time: i64,
    pub extra: Option<String>,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = entity_counts)]
pub struct NewEntityCount<'a> {
    pub feed: &'a str,
    pub kind: &'a str,
    pub name: &'a str,
    pub count: i64,
    pub last_update_time: i64,
    pub extra: Option<&'a str>,
}

#[derive(Queryable, Selectable, Insertable, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = period_entities)]
pub struct PeriodEntity {
    #[serde(skip)]
    pub feed: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub date: String,
    pub count: i64,
    pub extra: Option<String>,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = seen_posts)]
pub struct NewSeenPost<'a> {
    pub feed: &'a str,
    pub post_id: &'a str,
    pub seen_at: i64,
}

pub fn get_entity(
    conn: &mut SqliteConnection,
    feed_name: &str,
    entity_kind: &str,
    entity_name: &str,
) -> QueryResult<Option<EntityCount>> {
    use crate::schema::entity_counts::dsl::*;

    entity_counts
        .filter(feed.eq(feed_name))
        .filter(kind.eq(entity_kind))
        .filter(name.eq(entity_name))
        .select(EntityCount::as_select())
        .first(conn)
        .optional()
}

pub fn count_entities(conn: &mut SqliteConnection, feed_name: &str) -> QueryResult<i64> {
    use crate::schema::entity_counts::dsl::*;

    entity_counts.filter(feed.eq(feed_name)).count().get_result(conn)
}

pub fn count_seen_posts(conn: &mut SqliteConnection, feed_name: &str) -> QueryResult<i64> {
    use crate::schema::seen_posts::dsl::*;

    seen_posts.filter(feed.eq(feed_name)).count().get_result(conn)
}

/// Full reset of one feed namespace: counters and seen posts. Period history stays.
pub fn clear_feed(conn: &mut SqliteConnection, feed_name: &str) -> QueryResult<(usize, usize)> {
    conn.immediate_transaction(|conn| {
        let counters = diesel::delete(
            entity_counts::table.filter(entity_counts::feed.eq(feed_name)),
        )
        .execute(conn)?;
        let seen =
            diesel::delete(seen_posts::table.filter(seen_posts::feed.eq(feed_name))).execute(conn)?;
        Ok((counters, seen))
    })
}

#[cfg(test)]
pub(crate) fn test_connection() -> SqliteConnection {
    let mut conn =
        SqliteConnection::establish(":memory:").expect("Failed to open in-memory database");
    run_migrations(&mut conn).expect("Failed to run migrations");
    conn
}

#[cfg(test)]
pub(crate) fn test_pool() -> DbPool {
    let manager = ConnectionManager::<SqliteConnection>::new(":memory:");
    let pool = Pool::builder()
        .max_size(1)
        .build(manager)
        .expect("Failed to create pool");
    {
        let mut conn = pool.get().expect("Failed to get connection");
        run_migrations(&mut conn).expect("Failed to run migrations");
    }
    pool
}
