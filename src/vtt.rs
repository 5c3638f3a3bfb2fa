//! WebVTT cue parsing and conversion into [`CaptionRecord`]s.
//!
//! The parser is deliberately lenient: yt-dlp output regularly carries
//! `Kind:`/`Language:` header lines, cue settings after the end timecode and
//! inline styling. Anything that is not a timing line or cue text is skipped.

use crate::model::CaptionRecord;
use crate::sanitize::sanitize;
use crate::timestamp::{TimestampError, parse_timestamp};

const RANGE_DELIMITER: &str = "-->";

/// One timed block exactly as it appears in the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionBlock {
    pub start_raw: String,
    pub end_raw: String,
    pub text_lines: Vec<String>,
}

impl CaptionBlock {
    /// Text lines joined with a single space, markup untouched.
    pub fn joined_text(&self) -> String {
        self.text_lines.join(" ")
    }
}

/// Splits a caption document into blocks, preserving document order.
///
/// A timing line opens a block; the block collects every following
/// non-blank line until the next timing line or the end of the document.
/// Blank lines inside a block are skipped. A `NOTE` comment closes the block,
/// and a lone line between a blank line and the next timing line is taken as
/// that cue's identifier. Lines outside a block (the `WEBVTT` header, header
/// metadata) are ignored. Blocks without text are dropped.
pub fn parse(document: &str) -> Vec<CaptionBlock> {
    let mut blocks = Vec::new();
    let mut current: Option<CaptionBlock> = None;
    let mut lines = document
        .lines()
        .map(|line| line.trim_start_matches('\u{feff}').trim())
        .peekable();
    let mut after_blank = true;

    while let Some(line) = lines.next() {
        if let Some((start, rest)) = line.split_once(RANGE_DELIMITER) {
            flush(&mut blocks, current.take());
            let end = rest.split_whitespace().next().unwrap_or_default();
            current = Some(CaptionBlock {
                start_raw: start.trim().to_owned(),
                end_raw: end.to_owned(),
                text_lines: Vec::new(),
            });
        } else if is_comment(line) {
            flush(&mut blocks, current.take());
        } else if line.is_empty()
            || (after_blank && lines.peek().is_some_and(|next| next.contains(RANGE_DELIMITER)))
        {
            // blank, or a cue identifier
        } else if let Some(block) = current.as_mut() {
            block.text_lines.push(line.to_owned());
        }
        after_blank = line.is_empty();
    }

    flush(&mut blocks, current);
    blocks
}

fn is_comment(line: &str) -> bool {
    line == "NOTE" || line.starts_with("NOTE ") || line.starts_with("NOTE\t")
}

fn flush(blocks: &mut Vec<CaptionBlock>, block: Option<CaptionBlock>) {
    if let Some(block) = block
        && !block.text_lines.is_empty()
    {
        blocks.push(block);
    }
}

/// Parses a document and turns each block into a record with
/// `duration = end - start`. Blocks whose text sanitizes to nothing are
/// dropped; a malformed timecode fails the whole document.
pub fn to_records(document: &str) -> Result<Vec<CaptionRecord>, TimestampError> {
    let mut records = Vec::new();
    for block in parse(document) {
        let text = sanitize(&block.joined_text());
        if text.is_empty() {
            continue;
        }
        let start = parse_timestamp(&block.start_raw)?;
        let end = parse_timestamp(&block.end_raw)?;
        records.push(CaptionRecord::new(text, start, end - start));
    }
    Ok(records)
}
