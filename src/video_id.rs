//! Accepts either a bare video id or one of the common watch URL shapes.

const ID_LENGTH: usize = 11;

const URL_MARKERS: [&str; 5] = [
    "youtube.com/watch?v=",
    "youtu.be/",
    "youtube.com/embed/",
    "youtube.com/shorts/",
    "youtube.com/live/",
];

pub fn is_valid_video_id(candidate: &str) -> bool {
    candidate.len() == ID_LENGTH
        && candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Returns the video id referenced by `input`, or `None` when it is neither a
/// valid id nor a recognised URL.
pub fn extract_video_id(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if is_valid_video_id(trimmed) {
        return Some(trimmed.to_owned());
    }

    let after = URL_MARKERS
        .iter()
        .find_map(|marker| trimmed.split_once(marker).map(|(_, rest)| rest))
        .or_else(|| {
            // `watch?feature=share&v=<id>` and friends.
            trimmed
                .split_once("youtube.com/watch?")
                .and_then(|(_, query)| {
                    query
                        .split('&')
                        .find_map(|pair| pair.strip_prefix("v="))
                })
        })?;

    let id: String = after
        .chars()
        .take_while(|c| !matches!(c, '&' | '?' | '#' | '/'))
        .collect();
    is_valid_video_id(&id).then_some(id)
}
