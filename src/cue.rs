use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Location, ParseError, ParseErrorKind, Result};
use crate::timecode::Millis;

/// Identity of a cue, unique within its document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CueId(String);

impl CueId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CueId {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str(&self.0)
    }
}

impl From<&str> for CueId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for CueId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A single timed subtitle entry, shown for `start <= t < end`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cue {
    pub id: CueId,
    pub start: Millis,
    pub end: Millis,
    /// Display markup. May contain inline tags and line breaks.
    pub payload: String,
    /// Layout region the document assigns to this cue, if any.
    pub region: Option<String>,
}

impl Cue {
    pub fn new(id: impl Into<CueId>, start: Millis, end: Millis, payload: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            start,
            end,
            payload: payload.into(),
            region: None,
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn is_active(&self, t: Millis) -> bool {
        self.start <= t && t < self.end
    }

    pub fn duration(&self) -> Millis {
        self.end.saturating_sub(self.start)
    }

    /// The payload with markup removed: line breaks become newlines, other
    /// tags are dropped and the predefined XML entities are unescaped.
    pub fn plain_text(&self) -> String {
        let (line_break, tag) = markup_patterns();
        let text = line_break.replace_all(&self.payload, "\n");
        let text = tag.replace_all(&text, "");
        let text = text
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&quot;", "\"")
            .replace("&apos;", "'")
            .replace("&amp;", "&");
        text.lines().map(str::trim).collect::<Vec<_>>().join("\n")
    }
}

fn markup_patterns() -> &'static (Regex, Regex) {
    static PATTERNS: OnceLock<(Regex, Regex)> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        (
            Regex::new(r"(?i)<\s*(?:[a-z0-9_-]+:)?br\s*/?\s*>").expect("line break pattern"),
            Regex::new(r"<[^>]*>").expect("tag pattern"),
        )
    })
}

/// Checks the per-cue invariants and claims the cue's id.
pub(crate) fn validate(cue: &Cue, seen: &mut HashSet<CueId>) -> std::result::Result<(), ParseErrorKind> {
    if cue.end <= cue.start {
        return Err(ParseErrorKind::EmptyInterval {
            start: cue.start,
            end: cue.end,
        });
    }
    if !seen.insert(cue.id.clone()) {
        return Err(ParseErrorKind::DuplicateId(cue.id.to_string()));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Format {
    Srt,
    Ttml,
}

impl fmt::Display for Format {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Format::Srt => write!(fmt, "SRT"),
            Format::Ttml => write!(fmt, "TTML"),
        }
    }
}

/// Presentation attributes of a style or region, keyed by local name
/// (`color`, `origin`, `extent`, ...).
pub type Properties = BTreeMap<String, String>;

/// Style and region definitions from a TTML head, keyed by `xml:id`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Styling {
    pub styles: BTreeMap<String, Properties>,
    pub regions: BTreeMap<String, Properties>,
}

/// Cues ordered by start time, ties kept in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    format: Format,
    cues: Vec<Cue>,
    styling: Styling,
}

impl Document {
    /// Builds a document from cues that have already been validated.
    pub(crate) fn sorted(format: Format, mut cues: Vec<Cue>) -> Self {
        cues.sort_by_key(|c| c.start);
        Self {
            format,
            cues,
            styling: Styling::default(),
        }
    }

    pub fn with_styling(mut self, styling: Styling) -> Self {
        self.styling = styling;
        self
    }

    /// Builds a document from cues assembled in code, enforcing the same
    /// invariants the parser does.
    pub fn from_cues(format: Format, cues: Vec<Cue>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(cues.len());
        for (i, cue) in cues.iter().enumerate() {
            validate(cue, &mut seen).map_err(|kind| ParseError {
                location: Location {
                    line: i + 1,
                    offset: 0,
                },
                kind,
            })?;
        }
        Ok(Self::sorted(format, cues))
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn cues(&self) -> &[Cue] {
        &self.cues
    }

    pub fn len(&self) -> usize {
        self.cues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }

    pub fn into_cues(self) -> Vec<Cue> {
        self.cues
    }

    pub fn styles(&self) -> &BTreeMap<String, Properties> {
        &self.styling.styles
    }

    pub fn regions(&self) -> &BTreeMap<String, Properties> {
        &self.styling.regions
    }

    /// The layout of the region `cue` is placed in, if the document defines it.
    pub fn region_of(&self, cue: &Cue) -> Option<&Properties> {
        cue.region.as_ref().and_then(|name| self.styling.regions.get(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SubcueError;

    #[test]
    fn activity_is_half_open() {
        let cue = Cue::new("a", 1000, 3000, "Hello");
        assert!(!cue.is_active(999));
        assert!(cue.is_active(1000));
        assert!(cue.is_active(2999));
        assert!(!cue.is_active(3000));
        assert_eq!(cue.duration(), 2000);
    }

    #[test]
    fn plain_text_strips_ttml_markup() {
        let cue = Cue::new(
            "sub1",
            0,
            1,
            r#"<tt:span style="s1">Fish &amp; chips</tt:span> <tt:br/> <span>&lt;now&gt;</span>"#,
        );
        assert_eq!(cue.plain_text(), "Fish & chips\n<now>");
    }

    #[test]
    fn plain_text_keeps_srt_lines() {
        let cue = Cue::new("1", 0, 1, "<i>First line</i>\nSecond <b>line</b>");
        assert_eq!(cue.plain_text(), "First line\nSecond line");
    }

    #[test]
    fn from_cues_sorts_stably() {
        let doc = Document::from_cues(
            Format::Srt,
            vec![
                Cue::new("late", 5000, 6000, ""),
                Cue::new("tie-1", 1000, 2000, ""),
                Cue::new("tie-2", 1000, 1500, ""),
            ],
        )
        .unwrap();
        let ids: Vec<_> = doc.cues().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["tie-1", "tie-2", "late"]);
    }

    #[test]
    fn from_cues_rejects_empty_interval() {
        let err = Document::from_cues(
            Format::Srt,
            vec![Cue::new("a", 0, 10, ""), Cue::new("b", 5000, 5000, "")],
        )
        .unwrap_err();
        match err {
            SubcueError::Parse(ParseError { location, kind }) => {
                assert_eq!(location.line, 2);
                assert_eq!(kind, ParseErrorKind::EmptyInterval { start: 5000, end: 5000 });
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn from_cues_rejects_duplicate_ids() {
        let err = Document::from_cues(
            Format::Ttml,
            vec![Cue::new("a", 0, 10, ""), Cue::new("a", 20, 30, "")],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            SubcueError::Parse(ParseError {
                kind: ParseErrorKind::DuplicateId(_),
                ..
            })
        ));
    }
}
