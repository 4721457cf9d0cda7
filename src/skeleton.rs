//! Skeleton assembly: one ordered, duplicate-free anchor sequence.

use crate::track::{CandidatePool, Track};
use log::debug;

/// Interleave anchors, familiar first, skipping ids already placed.
///
/// `[f1, f2, f3]` and `[v1, v2]` become `[f1, v1, f2, v2, f3]`.
pub fn build_skeleton(familiar: &[Track], vibe: &[Track]) -> Vec<Track> {
    let mut skeleton = CandidatePool::new();
    let mut familiar_iter = familiar.iter();
    let mut vibe_iter = vibe.iter();

    loop {
        let next_familiar = familiar_iter.next();
        let next_vibe = vibe_iter.next();
        if next_familiar.is_none() && next_vibe.is_none() {
            break;
        }
        for track in next_familiar.into_iter().chain(next_vibe) {
            skeleton.insert(track.clone());
        }
    }

    if skeleton.is_empty() && !(familiar.is_empty() && vibe.is_empty()) {
        debug!("Interleaving produced nothing, concatenating anchors instead");
        skeleton.extend(vibe.iter().cloned());
        skeleton.extend(familiar.iter().cloned());
    }

    debug!(
        "Skeleton: {} anchors ({} familiar, {} vibe offered)",
        skeleton.len(),
        familiar.len(),
        vibe.len()
    );
    skeleton.into_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ids, track};

    fn tracks(names: &[&str]) -> Vec<Track> {
        names.iter().map(|n| track(n, "A", &[], &[])).collect()
    }

    #[test]
    fn test_familiar_first_alternation() {
        let skeleton = build_skeleton(&tracks(&["f1", "f2", "f3"]), &tracks(&["v1", "v2"]));
        assert_eq!(ids(&skeleton), vec!["f1", "v1", "f2", "v2", "f3"]);
    }

    #[test]
    fn test_shared_anchor_is_placed_once() {
        let skeleton = build_skeleton(&tracks(&["x", "f2"]), &tracks(&["v1", "x", "v3"]));
        assert_eq!(ids(&skeleton), vec!["x", "v1", "f2", "v3"]);
    }

    #[test]
    fn test_one_sided_inputs() {
        assert_eq!(ids(&build_skeleton(&[], &tracks(&["v1", "v2"]))), vec!["v1", "v2"]);
        assert_eq!(ids(&build_skeleton(&tracks(&["f1"]), &[])), vec!["f1"]);
        assert!(build_skeleton(&[], &[]).is_empty());
    }
}
