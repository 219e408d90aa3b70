//! Track fingerprinting: collapses noisy backend titles/authors into a
//! normalized form that survives re-uploads, "(Official MV)" suffixes,
//! topic-channel attribution, and similar cosmetic variation.
//!
//! Every step is idempotent, so normalizing an already-normalized string
//! is a no-op. That keeps fingerprints comparable no matter how many
//! times a track bounces through the pipeline.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::similarity::similarity;
use crate::track::Track;

static BRACKETED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\s*(\([^)]*\)|\[[^\]]*\]|\{[^}]*\}|［[^］]*］|【[^】]*】|〈[^〉]*〉)").unwrap()
});
static PIPE_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\|.*$").unwrap());
static VERSION_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s*-\s*.*?(remix|cover|ver|version|live|acoustic|instrumental|karaoke|official|mv|pv)\s*$")
        .unwrap()
});
static MEDIA_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s*(official|mv|pv|music\s*video|audio|lyrics?)\s*$").unwrap());
static FEAT_CLAUSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s*\b(ft\.?|feat\.?|featuring)\s+[^-]*$").unwrap());
static AUTHOR_ORG_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s*(official|channel|music|entertainment|records?|label)\s*$").unwrap());
static TOPIC_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\s*-\s*topic\s*$").unwrap());
static TITLE_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*-\s*").unwrap());
static PUNCT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static SHORTS_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)#shorts").unwrap());
static COVER_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(covered?\s+by|covers?|커버|(?:acoustic|piano|guitar|vocal|어쿠스틱|피아노|기타|보컬)\s+(?:cover|커버)|remix|리믹스|versions?|버전|ver|피처링|ft\.?|피쳐링)\b",
    )
    .unwrap()
});

/// Normalized identity surrogate for a track, built once and cached in
/// history pools for fuzzy comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackFingerprint {
    pub identifier: String,
    pub title: String,
    pub author: String,
    pub duration_ms: u64,
    pub normalized_title: String,
    pub normalized_author: String,
}

impl TrackFingerprint {
    pub fn of(track: &Track) -> Self {
        let author_norm = normalize_author(&track.author);
        let normalized_title = normalize_title(&track.title, &author_norm);
        // Auto-generated "<artist> - Topic" catalog channels carry no
        // authorship signal of their own.
        let normalized_author = if TOPIC_SUFFIX.is_match(&track.author) {
            String::new()
        } else {
            author_norm
        };

        Self {
            identifier: track.identifier.clone(),
            title: track.title.clone(),
            author: track.author.clone(),
            duration_ms: track.duration_ms,
            normalized_title,
            normalized_author,
        }
    }
}

/// Strip the anchored pattern until it no longer matches. Suffix noise
/// stacks ("... Official MV"), so a single pass is not enough.
fn strip_to_fixpoint(re: &Regex, input: &str) -> String {
    let mut current = input.to_string();
    loop {
        let next = re.replace(&current, "").into_owned();
        if next == current {
            return current;
        }
        current = next;
    }
}

/// Final cleanup shared by titles and authors: drop punctuation (word
/// characters and Hangul survive), collapse whitespace, lowercase.
fn scrub(input: &str) -> String {
    let stripped = PUNCT.replace_all(input, "");
    let collapsed = WHITESPACE.replace_all(&stripped, " ");
    collapsed.trim().to_lowercase()
}

pub fn normalize_author(author: &str) -> String {
    let mut a = BRACKETED.replace_all(author, "").into_owned();
    a = TOPIC_SUFFIX.replace(&a, "").into_owned();
    a = strip_to_fixpoint(&AUTHOR_ORG_SUFFIX, &a);
    scrub(&a)
}

pub fn normalize_title(title: &str, author_norm: &str) -> String {
    let mut t = BRACKETED.replace_all(title, "").into_owned();
    t = PIPE_SUFFIX.replace(&t, "").into_owned();
    t = strip_to_fixpoint(&VERSION_SUFFIX, &t);
    t = strip_to_fixpoint(&MEDIA_SUFFIX, &t);
    t = strip_to_fixpoint(&FEAT_CLAUSE, &t);

    // "Artist - Track" uploads: drop whichever half echoes the author.
    if !author_norm.is_empty() {
        let parts: Vec<&str> = TITLE_SPLIT.split(&t).collect();
        if parts.len() == 2 {
            let left = scrub(parts[0]);
            let right = scrub(parts[1]);
            if !right.is_empty() && similarity(&left, author_norm) > 0.8 {
                t = parts[1].to_string();
            } else if !left.is_empty() && similarity(&right, author_norm) > 0.8 {
                t = parts[0].to_string();
            }
        }
    }

    let mut t = scrub(&t);

    // A verbatim author embedded in the title is noise, as long as
    // something meaningful is left after removing it.
    if author_norm.chars().count() > 2 && t.contains(author_norm) {
        let replaced = t.replace(author_norm, " ");
        let remainder = WHITESPACE.replace_all(replaced.trim(), " ").trim().to_string();
        if remainder.chars().count() > 2 {
            t = remainder;
        }
    }

    t
}

/// Cover/remix/version uploads, detected from title or channel name.
pub fn is_cover(track: &Track) -> bool {
    COVER_MARKER.is_match(&track.title) || COVER_MARKER.is_match(&track.author)
}

/// Short-form uploads: tagged #shorts, or under a minute long.
/// Streams (duration 0) are never short-form.
pub fn is_short_form(track: &Track) -> bool {
    (track.duration_ms > 0 && track.duration_ms <= 60_000) || SHORTS_TAG.is_match(&track.title)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::Requester;

    fn track(title: &str, author: &str, duration_ms: u64) -> Track {
        Track::new(
            format!("id-{title}"),
            title,
            author,
            duration_ms,
            None,
            "https://example.com/watch",
            Requester::user("u1", "alice"),
        )
        .unwrap()
    }

    #[test]
    fn live_topic_scenario() {
        let fp = TrackFingerprint::of(&track("Song (Live)", "Artist - Topic", 200_000));
        assert_eq!(fp.normalized_title, "song");
        assert_eq!(fp.normalized_author, "");
    }

    #[test]
    fn bracketed_segments_are_removed() {
        let fp = TrackFingerprint::of(&track("Song [HD] 【MV】 (feat. Bob)", "Artist", 200_000));
        assert_eq!(fp.normalized_title, "song");
    }

    #[test]
    fn pipe_suffix_is_removed() {
        let fp = TrackFingerprint::of(&track("Song | Color Coded Lyrics", "Someone", 200_000));
        assert_eq!(fp.normalized_title, "song");
    }

    #[test]
    fn stacked_media_suffixes_are_removed() {
        let fp = TrackFingerprint::of(&track("Song Official MV", "Someone", 200_000));
        assert_eq!(fp.normalized_title, "song");
    }

    #[test]
    fn version_suffix_is_removed() {
        let fp = TrackFingerprint::of(&track("Song - Acoustic Version", "Someone", 200_000));
        assert_eq!(fp.normalized_title, "song");
    }

    #[test]
    fn featuring_clause_is_removed() {
        let fp = TrackFingerprint::of(&track("Song feat. Bob & Carol", "Someone", 200_000));
        assert_eq!(fp.normalized_title, "song");
    }

    #[test]
    fn artist_echo_half_is_dropped_from_title() {
        let fp = TrackFingerprint::of(&track("Cool Artist - Song", "Cool Artist", 200_000));
        assert_eq!(fp.normalized_title, "song");
        assert_eq!(fp.normalized_author, "cool artist");
    }

    #[test]
    fn embedded_author_is_dropped_from_title() {
        let fp = TrackFingerprint::of(&track("Song cool artist", "Cool Artist", 200_000));
        assert_eq!(fp.normalized_title, "song");
    }

    #[test]
    fn embedded_author_kept_when_nothing_would_remain() {
        let fp = TrackFingerprint::of(&track("Cool Artist", "Cool Artist", 200_000));
        assert_eq!(fp.normalized_title, "cool artist");
    }

    #[test]
    fn author_org_suffixes_are_removed() {
        let fp = TrackFingerprint::of(&track("Song", "Foo Music Entertainment", 200_000));
        assert_eq!(fp.normalized_author, "foo");
    }

    #[test]
    fn topic_detection_requires_suffix() {
        let fp = TrackFingerprint::of(&track("Song", "Topical News", 200_000));
        assert_ne!(fp.normalized_author, "");
    }

    #[test]
    fn hangul_survives_normalization() {
        let fp = TrackFingerprint::of(&track("사건의 지평선 (Live)", "윤하", 200_000));
        assert_eq!(fp.normalized_title, "사건의 지평선");
        assert_eq!(fp.normalized_author, "윤하");
    }

    #[test]
    fn title_normalization_is_idempotent() {
        let samples = [
            ("Song (Live) [HD]", "Artist"),
            ("Song Official MV", "Artist"),
            ("Cool Artist - Song", "Cool Artist"),
            ("노래 feat. 아무개", "가수 - Topic"),
            ("Plain Title", "Plain Author"),
            ("Song | visualizer", "Foo Records"),
        ];
        for (title, author) in samples {
            let author_norm = normalize_author(author);
            let once = normalize_title(title, &author_norm);
            let twice = normalize_title(&once, &author_norm);
            assert_eq!(once, twice, "title {title:?} not idempotent");
        }
    }

    #[test]
    fn author_normalization_is_idempotent() {
        let samples = ["Artist - Topic", "Foo Music Entertainment", "Bar [official]", "평범한 가수"];
        for author in samples {
            let once = normalize_author(author);
            let twice = normalize_author(&once);
            assert_eq!(once, twice, "author {author:?} not idempotent");
        }
    }

    #[test]
    fn cover_markers_are_detected() {
        assert!(is_cover(&track("Song covered by somebody", "X", 200_000)));
        assert!(is_cover(&track("Song 피아노 커버", "X", 200_000)));
        assert!(is_cover(&track("Song", "remix central", 200_000)));
        assert!(!is_cover(&track("Song", "Artist", 200_000)));
    }

    #[test]
    fn short_form_detection() {
        assert!(is_short_form(&track("Song #shorts", "X", 200_000)));
        assert!(is_short_form(&track("Song", "X", 45_000)));
        assert!(!is_short_form(&track("Song", "X", 61_000)));
        // streams report zero duration and are not shorts
        assert!(!is_short_form(&track("radio", "X", 0)));
    }
}
