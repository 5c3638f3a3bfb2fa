//! Picks the caption variant to use, in a fixed language priority order.
//!
//! Two strategies exist because the two retrieval methods expose variants
//! differently: the transcript API hands back track descriptors, while the
//! download tool leaves one file per language on disk.

use std::path::{Path, PathBuf};

use crate::model::CaptionTrack;

/// Preferred languages, most wanted first.
pub const LANGUAGE_PREFERENCE: [&str; 3] = ["en-GB", "en-US", "en"];

/// Extension of the caption files requested from the download tool.
pub const CAPTION_EXTENSION: &str = "vtt";

/// Structured strategy: for each language in `preference` order, a
/// human-authored track beats an auto-generated one. Language codes compare
/// case-insensitively.
pub fn select_track<'a>(
    available: &'a [CaptionTrack],
    preference: &[&str],
) -> Option<&'a CaptionTrack> {
    preference.iter().find_map(|language| {
        let matching = |auto: bool| {
            available.iter().find(|track| {
                track.is_auto_generated == auto
                    && track.language_code.eq_ignore_ascii_case(language)
            })
        };
        matching(false).or_else(|| matching(true))
    })
}

/// Filenames tried for one language, in order. yt-dlp names caption files
/// `<id>.<lang>.<ext>`; the `-orig` suffix marks the untranslated
/// auto-generated variant.
fn candidate_names(video_id: &str, language: &str) -> [String; 2] {
    [
        format!("{video_id}.{language}.{CAPTION_EXTENSION}"),
        format!("{video_id}.{language}-orig.{CAPTION_EXTENSION}"),
    ]
}

/// File-based strategy over the caption files that were written.
///
/// Every candidate name for `en-GB` is tried before any for `en-US`, then
/// `en`. As a last resort any caption file whose language segment contains
/// `en` (case-insensitive) is accepted; ties resolve lexicographically so the
/// result never depends on directory enumeration order.
pub fn select_caption_file(
    files: &[PathBuf],
    video_id: &str,
    preference: &[&str],
) -> Option<PathBuf> {
    let caption_files: Vec<(&PathBuf, String)> = files
        .iter()
        .filter(|path| has_caption_extension(path))
        .filter_map(|path| Some((path, path.file_name()?.to_str()?.to_owned())))
        .collect();

    for language in preference {
        for candidate in candidate_names(video_id, language) {
            if let Some((path, _)) = caption_files
                .iter()
                .find(|(_, name)| name.eq_ignore_ascii_case(&candidate))
            {
                return Some((*path).clone());
            }
        }
    }

    let mut loose: Vec<&(&PathBuf, String)> = caption_files
        .iter()
        .filter(|(_, name)| {
            language_segment(name, video_id)
                .to_ascii_lowercase()
                .contains("en")
        })
        .collect();
    loose.sort_by(|a, b| a.1.cmp(&b.1));
    loose.first().map(|(path, _)| (*path).clone())
}

fn has_caption_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(CAPTION_EXTENSION))
}

/// The part of `<id>.<lang>.vtt` between the id and the extension. Falls
/// back to the whole stem when the file does not follow that layout, so an
/// `en` inside the video id alone never counts as a language match.
fn language_segment<'a>(file_name: &'a str, video_id: &str) -> &'a str {
    let stem = file_name
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(file_name);
    stem.strip_prefix(video_id)
        .and_then(|rest| rest.strip_prefix('.'))
        .unwrap_or(stem)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_track_follows_preference_not_listing_order() {
        let tracks = vec![
            CaptionTrack::new("en", false),
            CaptionTrack::new("en-US", false),
            CaptionTrack::new("en-GB", false),
        ];
        let picked = select_track(&tracks, &LANGUAGE_PREFERENCE).unwrap();
        assert_eq!(picked.language_code, "en-GB");
    }

    #[test]
    fn select_track_prefers_manual_within_a_language() {
        let tracks = vec![
            CaptionTrack::new("en", true),
            CaptionTrack::new("en", false).with_url("manual"),
        ];
        let picked = select_track(&tracks, &LANGUAGE_PREFERENCE).unwrap();
        assert!(!picked.is_auto_generated);
        assert_eq!(picked.url, "manual");
    }

    #[test]
    fn select_track_uses_auto_before_lower_priority_language() {
        let tracks = vec![
            CaptionTrack::new("en", false),
            CaptionTrack::new("en-us", true),
        ];
        let picked = select_track(&tracks, &LANGUAGE_PREFERENCE).unwrap();
        assert_eq!(picked.language_code, "en-us");
    }

    #[test]
    fn select_track_reports_absence() {
        let tracks = vec![CaptionTrack::new("de", false), CaptionTrack::new("fr", true)];
        assert!(select_track(&tracks, &LANGUAGE_PREFERENCE).is_none());
        assert!(select_track(&[], &LANGUAGE_PREFERENCE).is_none());
    }

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(|name| PathBuf::from("/tmp/x").join(name)).collect()
    }

    #[test]
    fn select_file_exhausts_each_tier_in_order() {
        let files = paths(&["abc.en.vtt", "abc.en-US.vtt", "abc.en-GB-orig.vtt"]);
        let picked = select_caption_file(&files, "abc", &LANGUAGE_PREFERENCE).unwrap();
        assert!(picked.ends_with("abc.en-GB-orig.vtt"));

        let files = paths(&["abc.en.vtt", "abc.en-US.vtt"]);
        let picked = select_caption_file(&files, "abc", &LANGUAGE_PREFERENCE).unwrap();
        assert!(picked.ends_with("abc.en-US.vtt"));
    }

    #[test]
    fn select_file_falls_back_to_any_english_variant() {
        let files = paths(&["abc.de.vtt", "abc.en-CA.vtt", "abc.en-AU.vtt", "abc.en.json"]);
        let picked = select_caption_file(&files, "abc", &LANGUAGE_PREFERENCE).unwrap();
        assert!(picked.ends_with("abc.en-AU.vtt"));
    }

    #[test]
    fn select_file_ignores_en_inside_video_id() {
        let files = paths(&["xenx.de.vtt", "xenx.fr.vtt"]);
        assert!(select_caption_file(&files, "xenx", &LANGUAGE_PREFERENCE).is_none());
    }

    #[test]
    fn select_file_matches_case_insensitively() {
        let files = paths(&["abc.EN-gb.VTT"]);
        let picked = select_caption_file(&files, "abc", &LANGUAGE_PREFERENCE).unwrap();
        assert!(picked.ends_with("abc.EN-gb.VTT"));
    }
}
