//! # Local Catalog Database
//!
//! [`LibraryDb`] is an offline snapshot of a media library in SQLite. It
//! implements every collaborator trait, so flows can be generated and stored
//! without a media server.
//!
//! ## Schema
//!
//! - `tracks`: one row per track; moods and genres are JSON arrays, `rating`
//!   is on the source 0-10 scale (converted to stars when read)
//! - `similarity`: `(seed, neighbour, distance)` edges, read in both directions
//! - `plays`: `(track_id, played_at)` listening history
//! - `playlists` / `playlist_items`: stored playlists, items kept by position
//!
//! Timestamps are stored as UTC RFC 3339 strings with second precision, so
//! string comparison orders them chronologically.
//!
//! ## Importing
//!
//! `daylist init` loads a JSON export:
//!
//! ```json
//! {
//!   "tracks": [{ "id": "t1", "title": "Maria También", "artist": "Khruangbin",
//!                "moods": ["Warm"], "genres": ["Psychedelic"], "rating": 8 }],
//!   "similarity": [{ "seed": "t1", "neighbour": "t2", "distance": 0.12 }],
//!   "plays": [{ "track_id": "t1", "played_at": "2026-10-16T07:45:00Z" }]
//! }
//! ```

use crate::catalog::{PlayHistory, Playlist, PlaylistStore, TrackSource};
use crate::track::{normalize_tag, HistoryEvent, Track, TrackId, TrackQuery};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, info, trace};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

/// Longest similarity path (in hops) the bridge search will walk
const MAX_PATH_HOPS: usize = 6;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS tracks (
        id             TEXT PRIMARY KEY,
        title          TEXT NOT NULL,
        artist         TEXT NOT NULL,
        moods          TEXT NOT NULL DEFAULT '[]',
        genres         TEXT NOT NULL DEFAULT '[]',
        rating         REAL,
        play_count     INTEGER NOT NULL DEFAULT 0,
        skip_count     INTEGER NOT NULL DEFAULT 0,
        last_played_at TEXT,
        library        TEXT NOT NULL DEFAULT ''
    );
    CREATE TABLE IF NOT EXISTS similarity (
        seed      TEXT NOT NULL,
        neighbour TEXT NOT NULL,
        distance  REAL NOT NULL,
        PRIMARY KEY (seed, neighbour)
    );
    CREATE VIEW IF NOT EXISTS edges AS
        SELECT seed AS a, neighbour AS b, distance FROM similarity
        UNION ALL
        SELECT neighbour AS a, seed AS b, distance FROM similarity;
    CREATE TABLE IF NOT EXISTS plays (
        id        INTEGER PRIMARY KEY,
        track_id  TEXT NOT NULL,
        played_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS plays_by_time ON plays (played_at);
    CREATE TABLE IF NOT EXISTS playlists (
        name        TEXT PRIMARY KEY,
        description TEXT NOT NULL DEFAULT ''
    );
    CREATE TABLE IF NOT EXISTS playlist_items (
        playlist TEXT NOT NULL,
        position INTEGER NOT NULL,
        track_id TEXT NOT NULL,
        PRIMARY KEY (playlist, position)
    );
";

const TRACK_COLUMNS: &str =
    "t.id, t.title, t.artist, t.moods, t.genres, t.rating, t.play_count, t.skip_count, t.last_played_at, t.library";

/// Track as it appears in a catalog export (rating on the 0-10 scale)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportTrack {
    pub id: String,
    pub title: String,
    pub artist: String,
    #[serde(default)]
    pub moods: Vec<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub play_count: u32,
    #[serde(default)]
    pub skip_count: u32,
    #[serde(default)]
    pub last_played_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub library: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityEdge {
    pub seed: String,
    pub neighbour: String,
    pub distance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportPlay {
    pub track_id: String,
    pub played_at: DateTime<Utc>,
}

/// A complete catalog export
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogExport {
    pub tracks: Vec<ExportTrack>,
    pub similarity: Vec<SimilarityEdge>,
    pub plays: Vec<ExportPlay>,
}

impl CatalogExport {
    /// Read an export file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog export {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid catalog export {}", path.display()))
    }
}

/// Row counts of the catalog tables
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CatalogStats {
    pub tracks: usize,
    pub similarity_edges: usize,
    pub plays: usize,
    pub playlists: usize,
}

/// SQLite-backed catalog, history and playlist store
#[derive(Debug)]
pub struct LibraryDb {
    conn: Connection,
    path: Option<PathBuf>,
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn conversion_error(index: usize, err: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(err))
}

fn parse_timestamp(index: usize, text: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| conversion_error(index, e))
}

fn parse_tags(index: usize, json: &str) -> rusqlite::Result<BTreeSet<String>> {
    serde_json::from_str(json).map_err(|e| conversion_error(index, e))
}

/// Map a row selected with [`TRACK_COLUMNS`] (starting at column 0)
fn track_from_row(row: &Row<'_>) -> rusqlite::Result<Track> {
    let moods: String = row.get(3)?;
    let genres: String = row.get(4)?;
    let last_played: Option<String> = row.get(8)?;

    Ok(Track {
        id: TrackId::new(row.get::<_, String>(0)?),
        title: row.get(1)?,
        artist: row.get(2)?,
        moods: parse_tags(3, &moods)?,
        genres: parse_tags(4, &genres)?,
        rating: Track::stars_from_source(row.get(5)?),
        play_count: row.get(6)?,
        skip_count: row.get(7)?,
        last_played_at: last_played.as_deref().map(|t| parse_timestamp(8, t)).transpose()?,
        library: row.get(9)?,
    })
}

/// JSON array of normalized tags, used as a `json_each` parameter
fn tag_param(tags: &[String]) -> Result<String> {
    let normalized: Vec<String> = tags.iter().map(|t| normalize_tag(t)).collect();
    serde_json::to_string(&normalized).context("Failed to encode search tags")
}

/// Append `tracks` after the last stored position of `playlist`
fn append_items(conn: &Connection, playlist: &str, tracks: &[Track]) -> Result<()> {
    let next: i64 = conn.query_row(
        "SELECT COALESCE(MAX(position) + 1, 0) FROM playlist_items WHERE playlist = ?1",
        [playlist],
        |row| row.get(0),
    )?;
    let mut stmt =
        conn.prepare("INSERT INTO playlist_items (playlist, position, track_id) VALUES (?1, ?2, ?3)")?;
    for (offset, track) in (0i64..).zip(tracks) {
        stmt.execute(params![playlist, next + offset, track.id.as_str()])
            .with_context(|| format!("Failed to add {} to '{playlist}'", track.id))?;
    }
    Ok(())
}

impl LibraryDb {
    /// Open an existing catalog database.
    ///
    /// # Errors
    ///
    /// Fails when the file does not exist; run `daylist init` to create it.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            bail!(
                "Catalog database {} does not exist. Import a catalog with `daylist init <export.json>` first.",
                path.display()
            );
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open catalog database {}", path.display()))?;
        conn.execute_batch(SCHEMA)
            .context("Failed to prepare catalog schema")?;
        debug!("Opened catalog database {}", path.display());
        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    /// Create a catalog database at `path` from `export`.
    ///
    /// An existing database is only replaced when `force` is set.
    pub fn init(path: &Path, export: &CatalogExport, force: bool) -> Result<Self> {
        if path.exists() {
            if !force {
                bail!(
                    "Catalog database {} already exists. Use --force to replace it.",
                    path.display()
                );
            }
            fs::remove_file(path)
                .with_context(|| format!("Failed to remove old catalog {}", path.display()))?;
            info!("Replacing catalog database {}", path.display());
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to create catalog database {}", path.display()))?;
        let db = Self {
            conn,
            path: Some(path.to_path_buf()),
        };
        db.load(export)?;
        Ok(db)
    }

    /// In-memory catalog, mostly for tests and benchmarks
    pub fn in_memory(export: &CatalogExport) -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        let db = Self { conn, path: None };
        db.load(export)?;
        Ok(db)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn load(&self, export: &CatalogExport) -> Result<()> {
        self.conn
            .execute_batch(SCHEMA)
            .context("Failed to create catalog schema")?;

        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO tracks
                 (id, title, artist, moods, genres, rating, play_count, skip_count, last_played_at, library)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )?;
            for track in &export.tracks {
                stmt.execute(params![
                    track.id,
                    track.title,
                    track.artist,
                    serde_json::to_string(&track.moods)?,
                    serde_json::to_string(&track.genres)?,
                    track.rating,
                    track.play_count,
                    track.skip_count,
                    track.last_played_at.as_ref().map(timestamp),
                    track.library,
                ])
                .with_context(|| format!("Failed to insert track {}", track.id))?;
            }

            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO similarity (seed, neighbour, distance) VALUES (?1, ?2, ?3)",
            )?;
            for edge in &export.similarity {
                if edge.seed == edge.neighbour {
                    continue;
                }
                stmt.execute(params![edge.seed, edge.neighbour, edge.distance])
                    .with_context(|| format!("Failed to insert edge {} -> {}", edge.seed, edge.neighbour))?;
            }

            let mut stmt = tx.prepare("INSERT INTO plays (track_id, played_at) VALUES (?1, ?2)")?;
            for play in &export.plays {
                stmt.execute(params![play.track_id, timestamp(&play.played_at)])
                    .with_context(|| format!("Failed to insert play of {}", play.track_id))?;
            }
        }
        tx.commit().context("Committing catalog import failed")?;

        info!(
            "Imported {} tracks, {} similarity edges and {} plays",
            export.tracks.len(),
            export.similarity.len(),
            export.plays.len()
        );
        Ok(())
    }

    pub fn stats(&self) -> Result<CatalogStats> {
        let count = |table: &str| -> Result<usize> {
            let n: i64 = self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
                .with_context(|| format!("Failed to count {table}"))?;
            Ok(usize::try_from(n).unwrap_or(0))
        };
        Ok(CatalogStats {
            tracks: count("tracks")?,
            similarity_edges: count("similarity")?,
            plays: count("plays")?,
            playlists: count("playlists")?,
        })
    }

    pub fn track(&self, id: &TrackId) -> Result<Option<Track>> {
        self.conn
            .query_row(
                &format!("SELECT {TRACK_COLUMNS} FROM tracks t WHERE t.id = ?1"),
                [id.as_str()],
                track_from_row,
            )
            .optional()
            .with_context(|| format!("Failed to read track {id}"))
    }

    /// Tracks stored in playlist `name`, in order
    pub fn playlist_tracks(&self, name: &str) -> Result<Vec<Track>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TRACK_COLUMNS} FROM playlist_items i JOIN tracks t ON t.id = i.track_id
             WHERE i.playlist = ?1 ORDER BY i.position"
        ))?;
        let rows = stmt
            .query_map([name], track_from_row)
            .with_context(|| format!("Failed to read playlist '{name}'"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to decode playlist tracks")
    }

    fn neighbour_ids(&self, id: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT b FROM edges WHERE a = ?1 GROUP BY b ORDER BY MIN(distance), b")?;
        let rows = stmt.query_map([id], |row| row.get::<_, String>(0))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read similarity edges")
    }
}

impl TrackSource for LibraryDb {
    /// Tag matching is case-insensitive for ASCII. Matches come back in id
    /// order; a query carrying a sample seed gets `limit` of them picked by
    /// that seed instead of the first `limit`.
    fn search_tracks(&self, query: &TrackQuery) -> Result<Vec<Track>> {
        let sql = format!(
            "SELECT {TRACK_COLUMNS} FROM tracks t
             WHERE (json_array_length(?1) = 0 OR EXISTS (
                     SELECT 1 FROM json_each(t.moods) m
                     WHERE lower(trim(m.value)) IN (SELECT value FROM json_each(?1))))
               AND (json_array_length(?2) = 0 OR EXISTS (
                     SELECT 1 FROM json_each(t.genres) g
                     WHERE lower(trim(g.value)) IN (SELECT value FROM json_each(?2))))
               AND (?3 IS NULL OR t.library = ?3)
             ORDER BY t.id
             LIMIT ?4"
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        // A negative LIMIT is unbounded in SQLite
        let limit = match query.sample_seed() {
            Some(_) => -1,
            None => i64::try_from(query.limit()).unwrap_or(i64::MAX),
        };
        let rows = stmt
            .query_map(
                params![tag_param(query.moods())?, tag_param(query.genres())?, query.library(), limit],
                track_from_row,
            )
            .context("Track search failed")?;
        let mut tracks = rows
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to decode search results")?;

        if let Some(seed) = query.sample_seed() {
            if tracks.len() > query.limit() {
                tracks.shuffle(&mut StdRng::seed_from_u64(seed));
                tracks.truncate(query.limit());
                tracks.sort_by(|a, b| a.id.cmp(&b.id));
            }
        }
        trace!("Search {:?}/{:?} matched {} tracks", query.moods(), query.genres(), tracks.len());
        Ok(tracks)
    }

    fn similar_tracks(&self, seed: &TrackId, limit: usize, max_distance: f64) -> Result<Vec<Track>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {TRACK_COLUMNS} FROM edges e JOIN tracks t ON t.id = e.b
             WHERE e.a = ?1 AND e.distance <= ?2
             GROUP BY t.id
             ORDER BY MIN(e.distance), t.id
             LIMIT ?3"
        ))?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map(params![seed.as_str(), max_distance, limit], track_from_row)
            .with_context(|| format!("Similarity lookup for {seed} failed"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to decode similar tracks")
    }

    /// Shortest chain of similarity edges, at most [`MAX_PATH_HOPS`] long
    fn similarity_path(&self, start: &TrackId, end: &TrackId) -> Result<Vec<Track>> {
        if start == end {
            return Ok(Vec::new());
        }

        let mut parents: HashMap<String, String> = HashMap::new();
        let mut visited: HashSet<String> = HashSet::from([start.to_string()]);
        let mut queue = VecDeque::from([(start.to_string(), 0usize)]);
        let mut found = false;

        while let Some((node, depth)) = queue.pop_front() {
            if depth >= MAX_PATH_HOPS {
                continue;
            }
            for next in self.neighbour_ids(&node)? {
                if !visited.insert(next.clone()) {
                    continue;
                }
                parents.insert(next.clone(), node.clone());
                if next == end.as_str() {
                    found = true;
                    break;
                }
                queue.push_back((next, depth + 1));
            }
            if found {
                break;
            }
        }

        if !found {
            debug!("No similarity path from {start} to {end} within {MAX_PATH_HOPS} hops");
            return Ok(Vec::new());
        }

        let mut chain = Vec::new();
        let mut cursor = parents.get(end.as_str());
        while let Some(id) = cursor {
            if id == start.as_str() {
                break;
            }
            chain.push(id.clone());
            cursor = parents.get(id);
        }
        chain.reverse();

        let mut tracks = Vec::with_capacity(chain.len());
        for id in chain {
            if let Some(track) = self.track(&TrackId::new(id))? {
                tracks.push(track);
            }
        }
        Ok(tracks)
    }

    fn find_track(&self, artist: &str, title: &str) -> Result<Option<Track>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {TRACK_COLUMNS} FROM tracks t
                     WHERE lower(trim(t.artist)) = lower(trim(?1)) AND lower(trim(t.title)) = lower(trim(?2))
                     ORDER BY t.play_count DESC, t.id
                     LIMIT 1"
                ),
                [artist, title],
                track_from_row,
            )
            .optional()
            .with_context(|| format!("Lookup of '{artist} - {title}' failed"))
    }
}

impl PlayHistory for LibraryDb {
    fn play_history(&self, since: DateTime<Utc>, max_results: usize) -> Result<Vec<HistoryEvent>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {TRACK_COLUMNS}, p.played_at FROM plays p JOIN tracks t ON t.id = p.track_id
             WHERE p.played_at >= ?1
             ORDER BY p.played_at DESC
             LIMIT ?2"
        ))?;
        let limit = i64::try_from(max_results).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map(params![timestamp(&since), limit], |row| {
                let played_at: String = row.get(10)?;
                Ok(HistoryEvent {
                    track: track_from_row(row)?,
                    played_at: parse_timestamp(10, &played_at)?,
                })
            })
            .context("Failed to read play history")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to decode play history")
    }
}

impl PlaylistStore for LibraryDb {
    fn get_playlist(&self, name: &str) -> Result<Option<Playlist>> {
        self.conn
            .query_row(
                "SELECT p.name, p.description,
                        (SELECT COUNT(*) FROM playlist_items i WHERE i.playlist = p.name)
                 FROM playlists p WHERE p.name = ?1",
                [name],
                |row| {
                    let count: i64 = row.get(2)?;
                    Ok(Playlist {
                        name: row.get(0)?,
                        description: row.get(1)?,
                        track_count: usize::try_from(count).unwrap_or(0),
                    })
                },
            )
            .optional()
            .with_context(|| format!("Failed to read playlist '{name}'"))
    }

    fn create_playlist(&self, name: &str, tracks: &[Track]) -> Result<Playlist> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("INSERT INTO playlists (name) VALUES (?1)", [name])
            .with_context(|| format!("Playlist '{name}' could not be created"))?;
        append_items(&tx, name, tracks)?;
        tx.commit()
            .with_context(|| format!("Committing playlist '{name}' failed"))?;

        Ok(Playlist {
            name: name.to_string(),
            description: String::new(),
            track_count: tracks.len(),
        })
    }

    fn clear_items(&self, playlist: &Playlist) -> Result<()> {
        self.conn
            .execute("DELETE FROM playlist_items WHERE playlist = ?1", [&playlist.name])
            .with_context(|| format!("Failed to clear playlist '{}'", playlist.name))?;
        Ok(())
    }

    fn add_items(&self, playlist: &Playlist, tracks: &[Track]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        append_items(&tx, &playlist.name, tracks)?;
        tx.commit()
            .with_context(|| format!("Committing items of '{}' failed", playlist.name))
    }

    /// Delete and insert in one transaction; on failure the old items stay.
    fn replace_items(&self, playlist: &Playlist, tracks: &[Track]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM playlist_items WHERE playlist = ?1", [&playlist.name])
            .with_context(|| format!("Failed to clear playlist '{}'", playlist.name))?;
        append_items(&tx, &playlist.name, tracks)?;
        tx.commit()
            .with_context(|| format!("Committing items of '{}' failed", playlist.name))
    }

    fn set_description(&self, playlist: &Playlist, text: &str) -> Result<()> {
        self.conn
            .execute(
                "UPDATE playlists SET description = ?1 WHERE name = ?2",
                [text, playlist.name.as_str()],
            )
            .with_context(|| format!("Failed to describe playlist '{}'", playlist.name))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn export_track(id: &str, artist: &str, moods: &[&str], genres: &[&str]) -> ExportTrack {
        ExportTrack {
            id: id.to_string(),
            title: format!("Song {id}"),
            artist: artist.to_string(),
            moods: moods.iter().map(|m| m.to_string()).collect(),
            genres: genres.iter().map(|g| g.to_string()).collect(),
            rating: None,
            play_count: 0,
            skip_count: 0,
            last_played_at: None,
            library: "Music".to_string(),
        }
    }

    fn edge(seed: &str, neighbour: &str, distance: f64) -> SimilarityEdge {
        SimilarityEdge {
            seed: seed.to_string(),
            neighbour: neighbour.to_string(),
            distance,
        }
    }

    fn sample() -> CatalogExport {
        let mut rated = export_track("a", "Khruangbin", &["Warm", "Chill"], &["Psychedelic"]);
        rated.rating = Some(8.0);
        rated.last_played_at = Some("2026-10-16T07:45:00Z".parse().unwrap());
        let mut other_library = export_track("d", "Nala Sinephro", &["chill"], &["Jazz"]);
        other_library.library = "Vinyl".to_string();

        CatalogExport {
            tracks: vec![
                rated,
                export_track("b", "Floating Points", &["Dreamy"], &["Electronic"]),
                export_track("c", "Bonobo", &["Chill"], &["Electronic"]),
                other_library,
                export_track("e", "Loner", &[], &[]),
            ],
            similarity: vec![edge("a", "b", 0.1), edge("b", "c", 0.2), edge("c", "d", 0.3), edge("a", "e", 0.9)],
            plays: vec![
                ExportPlay { track_id: "a".to_string(), played_at: "2026-10-16T07:45:00Z".parse().unwrap() },
                ExportPlay { track_id: "c".to_string(), played_at: "2026-10-01T07:45:00Z".parse().unwrap() },
            ],
        }
    }

    fn db() -> LibraryDb {
        LibraryDb::in_memory(&sample()).unwrap()
    }

    fn ids(tracks: &[Track]) -> Vec<String> {
        let mut ids: Vec<String> = tracks.iter().map(|t| t.id.to_string()).collect();
        ids.sort();
        ids
    }

    #[test]
    fn test_rows_round_trip_into_tracks() {
        let track = db().track(&TrackId::from("a")).unwrap().unwrap();
        assert_eq!(track.rating, Some(4.0), "Ratings are stored on the 0-10 scale");
        assert!(track.moods.contains("Chill"));
        assert_eq!(track.last_played_at, Some("2026-10-16T07:45:00Z".parse().unwrap()));
        assert!(db().track(&TrackId::from("zzz")).unwrap().is_none());
    }

    #[test]
    fn test_search_is_case_insensitive_and_combines_fields() {
        let db = db();
        let chill = TrackQuery::builder().moods(["CHILL"]).limit(10).build().unwrap();
        assert_eq!(ids(&db.search_tracks(&chill).unwrap()), vec!["a", "c", "d"]);

        let chill_electronic = TrackQuery::builder()
            .moods(["chill", "dreamy"])
            .genres(["electronic"])
            .limit(10)
            .build()
            .unwrap();
        assert_eq!(ids(&db.search_tracks(&chill_electronic).unwrap()), vec!["b", "c"]);

        let vinyl = TrackQuery::builder().moods(["chill"]).library(Some("Vinyl")).limit(10).build().unwrap();
        assert_eq!(ids(&db.search_tracks(&vinyl).unwrap()), vec!["d"]);

        let limited = TrackQuery::builder().moods(["chill"]).limit(2).build().unwrap();
        assert_eq!(db.search_tracks(&limited).unwrap().len(), 2);
    }

    #[test]
    fn test_similar_tracks_use_both_edge_directions() {
        let db = db();
        let near_b = db.similar_tracks(&TrackId::from("b"), 10, 0.5).unwrap();
        let order: Vec<&str> = near_b.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(order, vec!["a", "c"], "Closest first");

        let near_a = db.similar_tracks(&TrackId::from("a"), 10, 0.5).unwrap();
        assert_eq!(ids(&near_a), vec!["b"], "Distance cap drops e");
    }

    #[test]
    fn test_similarity_path_excludes_endpoints() {
        let db = db();
        let path = db.similarity_path(&TrackId::from("a"), &TrackId::from("d")).unwrap();
        let order: Vec<&str> = path.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(order, vec!["b", "c"]);

        assert!(db.similarity_path(&TrackId::from("a"), &TrackId::from("b")).unwrap().is_empty());
        assert!(db.similarity_path(&TrackId::from("a"), &TrackId::from("missing")).unwrap().is_empty());
    }

    #[test]
    fn test_find_track_ignores_case() {
        let db = db();
        let found = db.find_track("bonobo", "SONG C").unwrap().unwrap();
        assert_eq!(found.id.as_str(), "c");
        assert!(db.find_track("Bonobo", "Nope").unwrap().is_none());
    }

    #[test]
    fn test_play_history_is_newest_first_and_bounded() {
        let db = db();
        let all = db.play_history("2026-09-01T00:00:00Z".parse().unwrap(), 10).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].track.id.as_str(), "a");

        let recent = db.play_history("2026-10-10T00:00:00Z".parse().unwrap(), 10).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(db.play_history("2026-09-01T00:00:00Z".parse().unwrap(), 1).unwrap().len(), 1);
    }

    #[test]
    fn test_playlist_store_overwrites_in_order() {
        let db = db();
        let a = db.track(&TrackId::from("a")).unwrap().unwrap();
        let b = db.track(&TrackId::from("b")).unwrap().unwrap();
        let c = db.track(&TrackId::from("c")).unwrap().unwrap();

        let playlist = db.create_playlist("Daily Flow", &[b.clone(), a.clone()]).unwrap();
        assert_eq!(playlist.track_count, 2);
        db.set_description(&playlist, "Morning flow").unwrap();

        db.clear_items(&playlist).unwrap();
        db.add_items(&playlist, &[c, a]).unwrap();

        let stored = db.get_playlist("Daily Flow").unwrap().unwrap();
        assert_eq!(stored.track_count, 2);
        assert_eq!(stored.description, "Morning flow");
        let order: Vec<String> = db.playlist_tracks("Daily Flow").unwrap().iter().map(|t| t.id.to_string()).collect();
        assert_eq!(order, vec!["c", "a"]);

        assert!(db.create_playlist("Daily Flow", &[]).is_err(), "Names are unique");
        assert!(db.get_playlist("Other").unwrap().is_none());
    }

    #[test]
    fn test_replace_items_is_all_or_nothing() {
        let db = db();
        let track = |id: &str| db.track(&TrackId::from(id)).unwrap().unwrap();
        let order = |db: &LibraryDb| -> Vec<String> {
            db.playlist_tracks("Daily Flow").unwrap().iter().map(|t| t.id.to_string()).collect()
        };

        let playlist = db.create_playlist("Daily Flow", &[track("a"), track("b")]).unwrap();
        db.replace_items(&playlist, &[track("c"), track("a")]).unwrap();
        assert_eq!(order(&db), vec!["c", "a"]);

        db.conn
            .execute_batch(
                "CREATE TRIGGER reject_e BEFORE INSERT ON playlist_items
                 WHEN NEW.track_id = 'e' BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();
        assert!(db.replace_items(&playlist, &[track("d"), track("e")]).is_err());
        assert_eq!(order(&db), vec!["c", "a"], "A failed insert keeps the previous items");
    }

    #[test]
    fn test_search_order_depends_only_on_the_seed() {
        let db = db();
        let unseeded = TrackQuery::builder().moods(["chill"]).limit(2).build().unwrap();
        let first: Vec<String> = db.search_tracks(&unseeded).unwrap().iter().map(|t| t.id.to_string()).collect();
        assert_eq!(first, vec!["a", "c"], "First matches in id order");

        let seeded = unseeded.with_sample_seed(9);
        let sample = db.search_tracks(&seeded).unwrap();
        assert_eq!(sample.len(), 2);
        for _ in 0..5 {
            assert_eq!(ids(&db.search_tracks(&seeded).unwrap()), ids(&sample));
        }

        let all = TrackQuery::builder().moods(["chill"]).limit(10).build().unwrap().with_sample_seed(9);
        assert_eq!(ids(&db.search_tracks(&all).unwrap()), vec!["a", "c", "d"]);
    }

    #[test]
    fn test_init_refuses_to_overwrite_without_force() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("catalog.db");

        let created = LibraryDb::init(&path, &sample(), false).unwrap();
        assert_eq!(created.stats().unwrap().tracks, 5);
        drop(created);

        assert!(LibraryDb::init(&path, &CatalogExport::default(), false).is_err());
        let replaced = LibraryDb::init(&path, &CatalogExport::default(), true).unwrap();
        assert_eq!(replaced.stats().unwrap(), CatalogStats::default());

        let reopened = LibraryDb::open(&path).unwrap();
        assert_eq!(reopened.path(), Some(path.as_path()));
    }

    #[test]
    fn test_open_missing_database_fails() {
        let dir = TempDir::new().unwrap();
        assert!(LibraryDb::open(&dir.path().join("absent.db")).is_err());
    }
}
