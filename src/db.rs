use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;
use tracing::warn;

use crate::error::{RowError, ScrapeError};
use crate::extract::ScreeningRow;
use crate::venues::cinema_name;

pub fn connect(path: &str) -> Result<Connection> {
    if let Some(dir) = std::path::Path::new(path).parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)?;
        }
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS cinemas (
            id         INTEGER PRIMARY KEY,
            name       TEXT UNIQUE NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS films (
            id          INTEGER PRIMARY KEY,
            title       TEXT NOT NULL,
            year        INTEGER,
            director    TEXT,
            description TEXT,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_films_title ON films(title);

        CREATE TABLE IF NOT EXISTS screenings (
            id          INTEGER PRIMARY KEY,
            cinema_id   INTEGER NOT NULL REFERENCES cinemas(id),
            film_id     INTEGER NOT NULL REFERENCES films(id),
            start_time  TEXT NOT NULL,
            end_time    TEXT,
            screen      TEXT,
            format      TEXT,
            booking_url TEXT,
            source_url  TEXT,
            notes       TEXT,
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(cinema_id, film_id, start_time)
        );
        CREATE INDEX IF NOT EXISTS idx_screenings_start ON screenings(start_time);
        ",
    )?;
    Ok(())
}

/// Run-scoped reference-entity cache, passed in explicitly so parallel runs
/// stay isolated and tests can inspect it. Never reused across runs.
#[derive(Default)]
pub struct RefCache {
    cinemas: HashMap<String, i64>,
    films: HashMap<(String, Option<i32>), i64>,
}

impl RefCache {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Outcome of one persistence batch. Partial success is expected and
/// reported, never rolled back.
pub struct PersistOutcome {
    pub written: usize,
    pub errors: Vec<RowError>,
}

/// Resolve a venue slug to a cinema id via the fixed name table, creating
/// the cinema on first sighting. Memoized per run.
pub fn get_or_create_cinema(
    conn: &Connection,
    cache: &mut RefCache,
    slug: &str,
) -> Result<i64, ScrapeError> {
    if let Some(&id) = cache.cinemas.get(slug) {
        return Ok(id);
    }
    let name = cinema_name(slug);

    let found: Option<i64> = conn
        .query_row("SELECT id FROM cinemas WHERE name = ?1", [name], |r| r.get(0))
        .map(Some)
        .or_else(none_if_missing)
        .map_err(|e| ScrapeError::ReferenceLookup(format!("cinema '{name}': {e}")))?;

    let id = match found {
        Some(id) => id,
        None => {
            conn.execute("INSERT INTO cinemas (name) VALUES (?1)", [name])
                .map_err(|e| ScrapeError::ReferenceLookup(format!("create cinema '{name}': {e}")))?;
            conn.last_insert_rowid()
        }
    };
    cache.cinemas.insert(slug.to_string(), id);
    Ok(id)
}

/// Look up a film by title (and year when given), inserting a bare record on
/// first sighting. The crawler never overwrites an existing film.
pub fn get_or_create_film(
    conn: &Connection,
    cache: &mut RefCache,
    title: &str,
    year: Option<i32>,
    director: Option<&str>,
) -> Result<i64, ScrapeError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ScrapeError::ReferenceLookup("film title is empty".into()));
    }
    let key = (title.to_string(), year);
    if let Some(&id) = cache.films.get(&key) {
        return Ok(id);
    }

    let found: Option<i64> = match year {
        Some(y) => conn
            .query_row(
                "SELECT id FROM films WHERE title = ?1 AND year = ?2 LIMIT 1",
                rusqlite::params![title, y],
                |r| r.get(0),
            )
            .map(Some)
            .or_else(none_if_missing),
        None => conn
            .query_row(
                "SELECT id FROM films WHERE title = ?1 LIMIT 1",
                [title],
                |r| r.get(0),
            )
            .map(Some)
            .or_else(none_if_missing),
    }
    .map_err(|e| ScrapeError::ReferenceLookup(format!("film '{title}': {e}")))?;

    let id = match found {
        Some(id) => id,
        None => {
            conn.execute(
                "INSERT INTO films (title, year, director) VALUES (?1, ?2, ?3)",
                rusqlite::params![title, year, director],
            )
            .map_err(|e| ScrapeError::ReferenceLookup(format!("create film '{title}': {e}")))?;
            conn.last_insert_rowid()
        }
    };
    cache.films.insert(key, id);
    Ok(id)
}

/// Insert-or-update one screening by its natural key
/// `(cinema_id, film_id, start_time)` — the durable identity storage
/// consumers rely on, deliberately not the transient row id.
pub fn upsert_screening(
    conn: &Connection,
    cinema_id: i64,
    film_id: i64,
    row: &ScreeningRow,
) -> Result<(), ScrapeError> {
    conn.execute(
        "INSERT INTO screenings (cinema_id, film_id, start_time, format, booking_url, source_url, notes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(cinema_id, film_id, start_time) DO UPDATE SET
             format      = excluded.format,
             booking_url = excluded.booking_url,
             source_url  = excluded.source_url,
             notes       = excluded.notes",
        rusqlite::params![
            cinema_id,
            film_id,
            iso_utc(&row.start_at),
            row.format,
            row.booking_url,
            row.source_url,
            row.notes,
        ],
    )
    .map_err(|e| ScrapeError::Upsert(e.to_string()))?;
    Ok(())
}

/// Persist a batch of rows. Each row is processed independently: a lookup or
/// write failure is collected and the batch continues with the next row.
pub fn persist_rows(
    conn: &Connection,
    cache: &mut RefCache,
    rows: &[ScreeningRow],
) -> PersistOutcome {
    let mut written = 0;
    let mut errors = Vec::new();

    for row in rows {
        let result = get_or_create_film(conn, cache, &row.title, row.year, row.director.as_deref())
            .and_then(|film_id| {
                let cinema_id = get_or_create_cinema(conn, cache, &row.venue_id)?;
                upsert_screening(conn, cinema_id, film_id, row)
            });
        match result {
            Ok(()) => written += 1,
            Err(e) => {
                warn!(row_id = %row.id, venue = %row.venue_id, error = %e, "row failed");
                errors.push(RowError {
                    row_id: row.id.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    PersistOutcome { written, errors }
}

pub fn iso_utc(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn none_if_missing<T>(e: rusqlite::Error) -> Result<Option<T>, rusqlite::Error> {
    match e {
        rusqlite::Error::QueryReturnedNoRows => Ok(None),
        other => Err(other),
    }
}

// ── Read interface (display layer) ──

pub struct Listing {
    pub start_time: String,
    pub title: String,
    pub year: Option<i32>,
    pub cinema: String,
    pub format: Option<String>,
    pub booking_url: Option<String>,
}

/// Screenings joined with film and cinema over a UTC instant range, with an
/// optional cinema filter, ordered by start time ascending.
pub fn screenings_between(
    conn: &Connection,
    from_iso: &str,
    to_iso: &str,
    cinema_id: Option<i64>,
) -> Result<Vec<Listing>> {
    let mut sql = String::from(
        "SELECT s.start_time, f.title, f.year, c.name, s.format, s.booking_url
         FROM screenings s
         JOIN films f ON f.id = s.film_id
         JOIN cinemas c ON c.id = s.cinema_id
         WHERE s.start_time >= ?1 AND s.start_time < ?2",
    );
    if cinema_id.is_some() {
        sql.push_str(" AND s.cinema_id = ?3");
    }
    sql.push_str(" ORDER BY s.start_time ASC");

    let mut stmt = conn.prepare(&sql)?;
    let map = |row: &rusqlite::Row| {
        Ok(Listing {
            start_time: row.get(0)?,
            title: row.get(1)?,
            year: row.get(2)?,
            cinema: row.get(3)?,
            format: row.get(4)?,
            booking_url: row.get(5)?,
        })
    };
    let rows = match cinema_id {
        Some(id) => stmt
            .query_map(rusqlite::params![from_iso, to_iso, id], map)?
            .collect::<Result<Vec<_>, _>>()?,
        None => stmt
            .query_map(rusqlite::params![from_iso, to_iso], map)?
            .collect::<Result<Vec<_>, _>>()?,
    };
    Ok(rows)
}

/// Distinct cinemas, ordered by name.
pub fn list_cinemas(conn: &Connection) -> Result<Vec<(i64, String)>> {
    let mut stmt = conn.prepare("SELECT id, name FROM cinemas ORDER BY name")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Distinct days (UTC) with at least one screening inside an instant range.
pub fn screening_days(conn: &Connection, from_iso: &str, to_iso: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT substr(start_time, 1, 10) AS day
         FROM screenings
         WHERE start_time >= ?1 AND start_time < ?2
         ORDER BY day",
    )?;
    let rows = stmt
        .query_map(rusqlite::params![from_iso, to_iso], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub struct Stats {
    pub cinemas: usize,
    pub films: usize,
    pub screenings: usize,
    pub upcoming: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let cinemas: usize = conn.query_row("SELECT COUNT(*) FROM cinemas", [], |r| r.get(0))?;
    let films: usize = conn.query_row("SELECT COUNT(*) FROM films", [], |r| r.get(0))?;
    let screenings: usize = conn.query_row("SELECT COUNT(*) FROM screenings", [], |r| r.get(0))?;
    let now = iso_utc(&Utc::now());
    let upcoming: usize = conn.query_row(
        "SELECT COUNT(*) FROM screenings WHERE start_time >= ?1",
        [now],
        |r| r.get(0),
    )?;
    Ok(Stats {
        cinemas,
        films,
        screenings,
        upcoming,
    })
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn row(venue: &str, title: &str, hour: u32) -> ScreeningRow {
        let t = Utc.with_ymd_and_hms(2025, 8, 19, hour, 10, 0).unwrap();
        ScreeningRow::new(venue, title, t, format!("https://{venue}.test/book"), "https://src.test")
    }

    #[test]
    fn get_or_create_is_idempotent_and_memoized() {
        let conn = setup();
        let mut cache = RefCache::new();
        let a = get_or_create_cinema(&conn, &mut cache, "ica").unwrap();
        let b = get_or_create_cinema(&conn, &mut cache, "ica").unwrap();
        assert_eq!(a, b);
        let count: usize = conn
            .query_row("SELECT COUNT(*) FROM cinemas", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);

        let f1 = get_or_create_film(&conn, &mut cache, "Mirror", Some(1975), None).unwrap();
        let f2 = get_or_create_film(&conn, &mut cache, "Mirror", Some(1975), None).unwrap();
        let f3 = get_or_create_film(&conn, &mut cache, "Mirror", None, None).unwrap();
        assert_eq!(f1, f2);
        // title-only lookup finds the existing record
        assert_eq!(f1, f3);
    }

    #[test]
    fn unmapped_slug_falls_back_to_slug_name() {
        let conn = setup();
        let mut cache = RefCache::new();
        get_or_create_cinema(&conn, &mut cache, "pop-up-screen").unwrap();
        let name: String = conn
            .query_row("SELECT name FROM cinemas", [], |r| r.get(0))
            .unwrap();
        assert_eq!(name, "pop-up-screen");
    }

    #[test]
    fn upsert_is_idempotent_on_natural_key() {
        let conn = setup();
        let mut cache = RefCache::new();
        let r1 = row("ica", "La Chimera", 17);
        let mut r2 = r1.clone();
        r2.booking_url = "https://ica.test/book-v2".into();

        let out1 = persist_rows(&conn, &mut cache, &[r1]);
        let out2 = persist_rows(&conn, &mut cache, &[r2]);
        assert_eq!(out1.written, 1);
        assert_eq!(out2.written, 1);

        let count: usize = conn
            .query_row("SELECT COUNT(*) FROM screenings", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
        let booking: String = conn
            .query_row("SELECT booking_url FROM screenings", [], |r| r.get(0))
            .unwrap();
        assert_eq!(booking, "https://ica.test/book-v2");
    }

    #[test]
    fn bad_row_is_isolated() {
        let conn = setup();
        let mut cache = RefCache::new();
        let rows = vec![
            row("ica", "One", 10),
            row("ica", "Two", 11),
            row("ica", "   ", 12), // empty title fails the film lookup
            row("ica", "Four", 13),
            row("ica", "Five", 14),
        ];
        let poisoned_id = rows[2].id.clone();
        let out = persist_rows(&conn, &mut cache, &rows);
        assert_eq!(out.written, 4);
        assert_eq!(out.errors.len(), 1);
        assert_eq!(out.errors[0].row_id, poisoned_id);
        assert!(out.errors[0].reason.contains("film title"));
    }

    #[test]
    fn same_natural_key_from_two_sources_is_one_fact() {
        let conn = setup();
        let mut cache = RefCache::new();
        let a = row("ica", "Stalker", 18);
        let mut b = a.clone();
        b.source_url = "https://mirror.test/other-page".into();
        let out = persist_rows(&conn, &mut cache, &[a, b]);
        assert_eq!(out.written, 2);
        let count: usize = conn
            .query_row("SELECT COUNT(*) FROM screenings", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn read_queries_filter_and_order() {
        let conn = setup();
        let mut cache = RefCache::new();
        let rows = vec![
            row("ica", "Late", 22),
            row("ica", "Early", 9),
            row("bfi-southbank", "Other", 12),
        ];
        persist_rows(&conn, &mut cache, &rows);

        let day =
            screenings_between(&conn, "2025-08-19T00:00:00Z", "2025-08-20T00:00:00Z", None)
                .unwrap();
        assert_eq!(day.len(), 3);
        assert_eq!(day[0].title, "Early");
        assert_eq!(day[2].title, "Late");

        let cinemas = list_cinemas(&conn).unwrap();
        assert_eq!(cinemas.len(), 2);
        assert_eq!(cinemas[0].1, "BFI Southbank");

        let ica_id = cinemas.iter().find(|(_, n)| n == "ICA").unwrap().0;
        let filtered = screenings_between(
            &conn,
            "2025-08-19T00:00:00Z",
            "2025-08-20T00:00:00Z",
            Some(ica_id),
        )
        .unwrap();
        assert_eq!(filtered.len(), 2);

        let days =
            screening_days(&conn, "2025-08-01T00:00:00Z", "2025-09-01T00:00:00Z").unwrap();
        assert_eq!(days, vec!["2025-08-19"]);
    }
}
