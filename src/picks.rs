//! # External Picks
//!
//! Turns recommendation lists exported from other services (Last.fm,
//! ListenBrainz and the like) into catalog playlists. A pick list is a JSON
//! array of `{"artist": ..., "title": ...}` objects:
//!
//! ```json
//! [
//!   { "artist": "Khruangbin", "title": "Maria También" },
//!   { "artist": "Nala Sinephro", "title": "Space 1" }
//! ]
//! ```
//!
//! Picks are matched with [`TrackSource::find_track`]. Picks the catalog does
//! not know are logged and counted, never fatal.

use crate::catalog::{ExternalPick, PlaylistStore, TrackSource};
use crate::config::PickListJob;
use crate::engine::{publish, Publication};
use crate::track::{CandidatePool, Track};
use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::fs;
use std::path::Path;

/// Read a pick list file
///
/// # Errors
///
/// Fails when the file cannot be read or is not a JSON array of picks.
pub fn load_picks(path: &Path) -> Result<Vec<ExternalPick>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read pick list {}", path.display()))?;
    let picks: Vec<ExternalPick> = serde_json::from_str(&content)
        .with_context(|| format!("Invalid pick list {}", path.display()))?;
    debug!("Loaded {} picks from {}", picks.len(), path.display());
    Ok(picks)
}

/// Catalog tracks matched from a pick list
#[derive(Debug, Clone, Default)]
pub struct PickResolution {
    pub tracks: Vec<Track>,
    /// Picks the catalog could not match (or failed to look up)
    pub missing: usize,
}

/// Match `picks` against the catalog, in order, until `size` distinct tracks are found
pub fn resolve_picks<S: TrackSource + ?Sized>(source: &S, picks: &[ExternalPick], size: usize) -> PickResolution {
    let mut found = CandidatePool::new();
    let mut missing = 0;

    for pick in picks {
        if found.len() >= size {
            break;
        }
        let (artist, title) = (pick.artist.trim(), pick.title.trim());
        if artist.is_empty() || title.is_empty() {
            debug!("Skipping incomplete pick {pick:?}");
            missing += 1;
            continue;
        }

        match source.find_track(artist, title) {
            Ok(Some(track)) => {
                if !found.insert(track) {
                    debug!("'{artist} - {title}' already picked");
                }
            }
            Ok(None) => {
                debug!("'{artist} - {title}' is not in the catalog");
                missing += 1;
            }
            Err(e) => {
                warn!("Lookup of '{artist} - {title}' failed: {e:#}");
                missing += 1;
            }
        }
    }

    PickResolution {
        tracks: found.into_vec(),
        missing,
    }
}

/// Load, resolve and store one pick list job
///
/// # Errors
///
/// Fails when the pick list cannot be read or the playlist cannot be written.
pub fn run_pick_job<M>(server: &M, job: &PickListJob) -> Result<Publication>
where
    M: TrackSource + PlaylistStore + ?Sized,
{
    let picks = load_picks(&job.path)?;
    let resolution = resolve_picks(server, &picks, job.size);
    info!(
        "Pick list '{}': matched {} tracks, {} picks not found",
        job.name,
        resolution.tracks.len(),
        resolution.missing
    );

    let file = job
        .path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| job.path.display().to_string());
    let description = format!(
        "Picks from {file} | {} of {} found in the library",
        resolution.tracks.len(),
        resolution.tracks.len() + resolution.missing
    );
    publish(server, &job.name, &resolution.tracks, &description)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ids, track, FakeCatalog};
    use tempfile::TempDir;

    fn pick(artist: &str, title: &str) -> ExternalPick {
        ExternalPick {
            artist: artist.to_string(),
            title: title.to_string(),
        }
    }

    fn catalog() -> FakeCatalog {
        FakeCatalog::with_tracks(vec![
            track("1", "Khruangbin", &[], &[]),
            track("2", "Nala Sinephro", &[], &[]),
            track("3", "Floating Points", &[], &[]),
        ])
    }

    #[test]
    fn test_unknown_and_blank_picks_are_counted() {
        let picks = vec![
            pick("khruangbin", "song 1"),
            pick("Nobody", "Song 9"),
            pick("", "Song 2"),
            pick("Nala Sinephro", "Song 2"),
        ];
        let resolution = resolve_picks(&catalog(), &picks, 10);

        assert_eq!(ids(&resolution.tracks), vec!["1", "2"]);
        assert_eq!(resolution.missing, 2);
    }

    #[test]
    fn test_duplicates_collapse_and_size_caps() {
        let picks = vec![
            pick("Khruangbin", "Song 1"),
            pick("Khruangbin", "Song 1"),
            pick("Nala Sinephro", "Song 2"),
            pick("Floating Points", "Song 3"),
        ];
        let resolution = resolve_picks(&catalog(), &picks, 2);
        assert_eq!(ids(&resolution.tracks), vec!["1", "2"]);
    }

    #[test]
    fn test_pick_job_stores_playlist() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("weekly.json");
        fs::write(
            &path,
            r#"[{"artist": "Floating Points", "title": "Song 3"}, {"artist": "Missing", "title": "Nope"}]"#,
        )
        .unwrap();

        let server = catalog();
        let job = PickListJob { name: "Weekly Picks".to_string(), path, size: 30 };
        let publication = run_pick_job(&server, &job).unwrap();

        assert_eq!(publication, Publication::Created { tracks: 1 });
        assert_eq!(server.stored("Weekly Picks").unwrap(), vec!["3"]);
        let stored = server.get_playlist("Weekly Picks").unwrap().unwrap();
        assert_eq!(stored.description, "Picks from weekly.json | 1 of 2 found in the library");
    }

    #[test]
    fn test_malformed_pick_file_fails_the_job() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();

        let job = PickListJob { name: "Broken".to_string(), path, size: 30 };
        assert!(run_pick_job(&catalog(), &job).is_err());
    }
}
