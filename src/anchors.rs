//! # Anchor Selection
//!
//! Anchors are the seed tracks a flow is built around:
//!
//! - **Vibe anchors** fit the period's target moods and styles, found by
//!   searching the catalog ([`VibeAnchorSelector`]).
//! - **Familiar anchors** are tracks the listener already plays at this hour,
//!   picked from history ([`FamiliarAnchorSelector`]).

use crate::catalog::TrackSource;
use crate::config::HistoryConfig;
use crate::filter::{FilterMode, TrackFilter};
use crate::period::VibeCriteria;
use crate::track::{CandidatePool, Track, TrackQuery};
use anyhow::Result;
use log::{debug, info, warn};
use rand::seq::SliceRandom;
use rand::Rng;

/// Searches the catalog for tracks matching a vibe
pub struct VibeAnchorSelector<'a, S: ?Sized> {
    source: &'a S,
    libraries: &'a [String],
    filter: &'a TrackFilter,
}

impl<'a, S: TrackSource + ?Sized> VibeAnchorSelector<'a, S> {
    pub fn new(source: &'a S, libraries: &'a [String], filter: &'a TrackFilter) -> Self {
        Self {
            source,
            libraries,
            filter,
        }
    }

    /// Queries for `criteria`, one set per library (or one unscoped set).
    ///
    /// Styles are matched against the genre field. With both moods and styles
    /// the query requires both; otherwise whichever side is present is used alone.
    pub fn queries(&self, criteria: &VibeCriteria, limit: usize) -> Result<Vec<TrackQuery>> {
        let libraries: Vec<Option<&str>> = if self.libraries.is_empty() {
            vec![None]
        } else {
            self.libraries.iter().map(|l| Some(l.as_str())).collect()
        };

        let mut queries = Vec::new();
        for library in libraries {
            let builder = TrackQuery::builder().limit(limit).library(library);
            let query = match (criteria.moods.is_empty(), criteria.styles.is_empty()) {
                (true, true) => continue,
                (false, false) => builder.moods(&criteria.moods).genres(&criteria.styles),
                (false, true) => builder.moods(&criteria.moods),
                (true, false) => builder.genres(&criteria.styles),
            };
            queries.push(query.build()?);
        }
        Ok(queries)
    }

    /// Merged, deduplicated and discovery-filtered search results.
    /// Failed searches are logged and contribute nothing.
    ///
    /// Each query carries a sample seed drawn from `rng`, so the catalog's
    /// choice among many matches is reproducible from the caller's seed.
    pub fn candidates<R: Rng + ?Sized>(&self, criteria: &VibeCriteria, limit: usize, rng: &mut R) -> CandidatePool {
        let queries = match self.queries(criteria, limit) {
            Ok(queries) => queries,
            Err(e) => {
                warn!("Could not build vibe search: {e:#}");
                return CandidatePool::new();
            }
        };

        let mut pool = CandidatePool::new();
        for query in queries {
            let query = query.with_sample_seed(rng.gen());
            match self.source.search_tracks(&query) {
                Ok(tracks) => {
                    debug!("Vibe search {:?}/{:?} returned {} tracks", query.moods(), query.genres(), tracks.len());
                    pool.extend(tracks);
                }
                Err(e) => warn!("Vibe search failed, skipping: {e:#}"),
            }
        }

        let found = pool.len();
        pool.retain(|track| self.filter.accepts(track, FilterMode::Discovery));
        debug!("Vibe candidates: {} of {found} survived filtering", pool.len());
        pool
    }

    /// Up to `count` anchors chosen uniformly at random from the candidates
    pub fn select<R: Rng + ?Sized>(
        &self,
        criteria: &VibeCriteria,
        count: usize,
        limit: usize,
        rng: &mut R,
    ) -> Vec<Track> {
        if criteria.is_empty() || count == 0 {
            debug!("No vibe defined, no vibe anchors");
            return Vec::new();
        }

        let pool = self.candidates(criteria, limit, rng);
        let anchors: Vec<Track> = pool
            .as_slice()
            .choose_multiple(rng, count)
            .cloned()
            .collect();

        info!("Selected {} vibe anchors from {} candidates", anchors.len(), pool.len());
        anchors
    }
}

/// Picks anchors from the listener's own history
pub struct FamiliarAnchorSelector<'a> {
    config: &'a HistoryConfig,
    filter: &'a TrackFilter,
}

impl<'a> FamiliarAnchorSelector<'a> {
    pub fn new(config: &'a HistoryConfig, filter: &'a TrackFilter) -> Self {
        Self { config, filter }
    }

    /// Whether a history track qualifies before the shared filter rules
    pub fn qualifies(&self, track: &Track, criteria: &VibeCriteria) -> bool {
        if track.play_count < self.config.min_plays {
            return false;
        }
        if self.config.min_rating > 0.0 && !track.rating.is_some_and(|r| r >= self.config.min_rating) {
            return false;
        }
        track.matches_any_mood(&criteria.moods) && track.matches_any_genre(&criteria.styles)
    }

    /// Up to `count` familiar anchors, shuffled.
    ///
    /// `history` must already be limited to the period's hours and lookback.
    pub fn select<R: Rng + ?Sized>(
        &self,
        history: Vec<Track>,
        criteria: &VibeCriteria,
        count: usize,
        rng: &mut R,
    ) -> Vec<Track> {
        if !self.config.enabled || count == 0 {
            return Vec::new();
        }

        let total = history.len();
        let compatible = history
            .into_iter()
            .collect::<CandidatePool>()
            .into_iter()
            .filter(|track| self.qualifies(track, criteria));
        let mut familiar = self.filter.apply(compatible, FilterMode::Historical);

        familiar.shuffle(rng);
        familiar.truncate(count);
        info!("Selected {} familiar anchors from {total} history tracks", familiar.len());
        familiar
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FilterConfig;
    use crate::test_support::{fixed_now, ids, rng, track, FakeCatalog};

    fn open_filter() -> TrackFilter {
        TrackFilter::new(
            &FilterConfig { min_rating_stars: 0.0, exclude_played_days: 0, max_skip_count: 100 },
            fixed_now(),
        )
    }

    fn vibe() -> VibeCriteria {
        VibeCriteria::new(["Calm"], ["Ambient"])
    }

    #[test]
    fn test_returns_whole_pool_when_smaller_than_count() {
        let catalog = FakeCatalog::with_tracks(vec![
            track("1", "A", &["Calm"], &["Ambient"]),
            track("2", "B", &["calm"], &["ambient"]),
            track("3", "C", &["Calm"], &["Rock"]),
        ]);
        let filter = open_filter();
        let selector = VibeAnchorSelector::new(&catalog, &[], &filter);

        let mut anchors = ids(&selector.select(&vibe(), 3, 50, &mut rng()));
        anchors.sort();
        assert_eq!(anchors, vec!["1", "2"]);
    }

    #[test]
    fn test_empty_vibe_yields_no_anchors_and_no_search() {
        let catalog = FakeCatalog::with_tracks(vec![track("1", "A", &["Calm"], &[])]);
        let filter = open_filter();
        let selector = VibeAnchorSelector::new(&catalog, &[], &filter);

        assert!(selector.select(&VibeCriteria::default(), 5, 50, &mut rng()).is_empty());
        assert_eq!(catalog.search_calls.get(), 0);
    }

    #[test]
    fn test_mood_only_and_style_only_vibes_search_one_field() {
        let catalog = FakeCatalog::with_tracks(vec![
            track("1", "A", &["Calm"], &["Rock"]),
            track("2", "B", &["Tense"], &["Ambient"]),
        ]);
        let filter = open_filter();
        let selector = VibeAnchorSelector::new(&catalog, &[], &filter);

        let moods_only = VibeCriteria::new(["Calm"], Vec::<String>::new());
        let styles_only = VibeCriteria::new(Vec::<String>::new(), ["Ambient"]);
        assert_eq!(ids(&selector.select(&moods_only, 5, 50, &mut rng())), vec!["1"]);
        assert_eq!(ids(&selector.select(&styles_only, 5, 50, &mut rng())), vec!["2"]);
    }

    #[test]
    fn test_one_query_per_library_and_results_merge() {
        let mut a = track("1", "A", &["Calm"], &["Ambient"]);
        a.library = "Music".to_string();
        let mut b = track("2", "B", &["Calm"], &["Ambient"]);
        b.library = "Vinyl Rips".to_string();
        let catalog = FakeCatalog::with_tracks(vec![a, b]);
        let filter = open_filter();
        let libraries = vec!["Music".to_string(), "Vinyl Rips".to_string()];
        let selector = VibeAnchorSelector::new(&catalog, &libraries, &filter);

        let pool = selector.candidates(&vibe(), 50, &mut rng());
        assert_eq!(pool.len(), 2);
        assert_eq!(catalog.search_calls.get(), 2);
    }

    #[test]
    fn test_failed_search_degrades_to_empty() {
        let mut catalog = FakeCatalog::with_tracks(vec![track("1", "A", &["Calm"], &["Ambient"])]);
        catalog.fail_search = true;
        let filter = open_filter();
        let selector = VibeAnchorSelector::new(&catalog, &[], &filter);

        assert!(selector.select(&vibe(), 5, 50, &mut rng()).is_empty());
    }

    #[test]
    fn test_discovery_filter_keeps_unrated_candidates() {
        let mut rated_low = track("1", "A", &["Calm"], &["Ambient"]);
        rated_low.rating = Some(1.0);
        let unrated = track("2", "B", &["Calm"], &["Ambient"]);
        let catalog = FakeCatalog::with_tracks(vec![rated_low, unrated]);
        let filter = TrackFilter::new(
            &FilterConfig { min_rating_stars: 3.0, exclude_played_days: 0, max_skip_count: 100 },
            fixed_now(),
        );
        let selector = VibeAnchorSelector::new(&catalog, &[], &filter);

        assert_eq!(ids(selector.candidates(&vibe(), 50, &mut rng()).as_slice()), vec!["2"]);
    }

    fn history_config() -> HistoryConfig {
        HistoryConfig { min_plays: 3, min_rating: 0.0, ..HistoryConfig::default() }
    }

    #[test]
    fn test_familiar_requires_plays_and_vibe_compatibility() {
        let mut loved = track("1", "A", &["Calm"], &["Ambient"]);
        loved.play_count = 5;
        let mut rarely = track("2", "B", &["Calm"], &["Ambient"]);
        rarely.play_count = 1;
        let mut off_vibe = track("3", "C", &["Angry"], &["Ambient"]);
        off_vibe.play_count = 10;
        let mut wrong_style = track("4", "D", &["Calm"], &["Metal"]);
        wrong_style.play_count = 10;

        let config = history_config();
        let filter = open_filter();
        let selector = FamiliarAnchorSelector::new(&config, &filter);
        let picked = selector.select(vec![loved, rarely, off_vibe, wrong_style], &vibe(), 5, &mut rng());

        assert_eq!(ids(&picked), vec!["1"]);
    }

    #[test]
    fn test_familiar_minimum_rating_excludes_unrated() {
        let mut unrated = track("1", "A", &[], &[]);
        unrated.play_count = 9;
        let mut rated = track("2", "B", &[], &[]);
        rated.play_count = 9;
        rated.rating = Some(4.5);

        let config = HistoryConfig { min_rating: 4.0, ..history_config() };
        let filter = open_filter();
        let selector = FamiliarAnchorSelector::new(&config, &filter);

        let picked = selector.select(vec![unrated, rated], &VibeCriteria::default(), 5, &mut rng());
        assert_eq!(ids(&picked), vec!["2"], "Empty vibe is compatible with everything");
    }

    #[test]
    fn test_familiar_uses_historical_filter_mode() {
        let mut unrated = track("1", "A", &[], &[]);
        unrated.play_count = 9;

        let config = history_config();
        let filter = TrackFilter::new(
            &FilterConfig { min_rating_stars: 2.0, exclude_played_days: 0, max_skip_count: 100 },
            fixed_now(),
        );
        let selector = FamiliarAnchorSelector::new(&config, &filter);

        assert!(selector.select(vec![unrated], &VibeCriteria::default(), 5, &mut rng()).is_empty());
    }

    #[test]
    fn test_familiar_takes_at_most_count() {
        let history: Vec<Track> = (0..10)
            .map(|i| {
                let mut t = track(&i.to_string(), "A", &[], &[]);
                t.play_count = 4;
                t
            })
            .collect();
        let config = history_config();
        let filter = open_filter();
        let selector = FamiliarAnchorSelector::new(&config, &filter);

        assert_eq!(selector.select(history, &VibeCriteria::default(), 4, &mut rng()).len(), 4);
    }
}
