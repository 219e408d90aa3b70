//! Recommendation fetching: turn the currently playing track into a
//! batch of related candidates, filtered through the dedup engine so
//! nothing the tenant has already heard (or queued) comes back.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::backend::SearchBackend;
use crate::dedup::DedupEngine;
use crate::error::{Error, Result};
use crate::fingerprint::TrackFingerprint;
use crate::track::{Requester, Track};

/// Hard cap on a single recommendation request.
pub const MAX_RELATED: usize = 50;

/// Primary path: search `"{author} - {title}"`, then pull the backend's
/// related listing for the top hit. Empty results and backend errors
/// both yield an empty list; "no recommendations" is a normal outcome.
pub async fn fetch_related(
    backend: &dyn SearchBackend,
    seed: &Track,
    limit: usize,
    exclusion: &[TrackFingerprint],
    engine: &DedupEngine,
) -> Result<Vec<Track>> {
    check_limit(limit)?;
    if limit == 0 {
        return Ok(Vec::new());
    }

    let requester = Requester::Autoplay;
    let query = format!("{} - {}", seed.author, seed.title);
    let seed_hits = match backend.search(&query, &requester).await {
        Ok(response) => response,
        Err(err) => {
            warn!("[Autoplay] Seed search failed for {:?}: {err}", seed.title);
            return Ok(Vec::new());
        }
    };
    if !seed_hits.has_results() {
        debug!("[Autoplay] No seed hits for {:?}", seed.title);
        return Ok(Vec::new());
    }

    let top = &seed_hits.tracks[0];
    let related = match backend.related(&top.identifier, &requester).await {
        Ok(response) => response,
        Err(err) => {
            warn!("[Autoplay] Related lookup failed for {}: {err}", top.identifier);
            return Ok(Vec::new());
        }
    };
    if !related.has_results() {
        return Ok(Vec::new());
    }

    Ok(filter_candidates(related.tracks, limit, exclusion, engine))
}

/// Fallback path when the related listing comes up dry: lean on the
/// seed's author popularity instead.
pub async fn fetch_by_author(
    backend: &dyn SearchBackend,
    seed: &Track,
    limit: usize,
    exclusion: &[TrackFingerprint],
    engine: &DedupEngine,
) -> Result<Vec<Track>> {
    check_limit(limit)?;
    if limit == 0 || seed.author.trim().is_empty() {
        return Ok(Vec::new());
    }

    let requester = Requester::Autoplay;
    let query = format!("{} songs", seed.author);
    let hits = match backend.search(&query, &requester).await {
        Ok(response) => response,
        Err(err) => {
            warn!("[Autoplay] Author search failed for {:?}: {err}", seed.author);
            return Ok(Vec::new());
        }
    };
    if !hits.has_results() {
        return Ok(Vec::new());
    }

    Ok(filter_candidates(hits.tracks, limit, exclusion, engine))
}

fn check_limit(limit: usize) -> Result<()> {
    if limit > MAX_RELATED {
        return Err(Error::InvalidArgument(format!(
            "recommendation limit {limit} exceeds maximum of {MAX_RELATED}"
        )));
    }
    Ok(())
}

/// Keep candidates the tenant has not seen, in backend order, up to
/// `limit`. Exact identifier matches are cheap to reject before the
/// fuzzy comparison runs.
fn filter_candidates(
    candidates: Vec<Track>,
    limit: usize,
    exclusion: &[TrackFingerprint],
    engine: &DedupEngine,
) -> Vec<Track> {
    let seen_ids: HashSet<&str> = exclusion.iter().map(|fp| fp.identifier.as_str()).collect();

    let mut survivors = Vec::new();
    for candidate in candidates {
        if survivors.len() >= limit {
            break;
        }
        if seen_ids.contains(candidate.identifier.as_str()) {
            continue;
        }
        let fingerprint = TrackFingerprint::of(&candidate);
        if engine.is_duplicate(&fingerprint, exclusion.iter()) {
            continue;
        }
        survivors.push(candidate);
    }
    survivors
}
