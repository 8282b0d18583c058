use crate::cue::{validate, Cue, CueId, Document, Format, Styling};
use crate::error::{Location, ParseError, ParseErrorKind, Result};
use crate::{srt, ttml};

use std::collections::HashSet;

/// How the parser reacts to a malformed cue block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseMode {
    /// Fail the whole parse on the first malformed block.
    Strict,
    /// Skip malformed blocks and report them as diagnostics.
    #[default]
    Lenient,
}

#[derive(Debug, Clone)]
pub struct ParserConfig {
    pub mode: ParseMode,
    /// Source format. Detected from the text when unset.
    pub format: Option<Format>,
    /// Largest cue block accepted, in bytes of source text.
    pub max_cue_bytes: usize,
}

impl ParserConfig {
    pub const DEFAULT_MAX_CUE_BYTES: usize = 64 * 1024;

    pub fn strict(mut self) -> Self {
        self.mode = ParseMode::Strict;
        self
    }

    pub fn lenient(mut self) -> Self {
        self.mode = ParseMode::Lenient;
        self
    }

    pub fn with_format(mut self, format: Format) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_max_cue_bytes(mut self, max_cue_bytes: usize) -> Self {
        self.max_cue_bytes = max_cue_bytes;
        self
    }
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            mode: ParseMode::default(),
            format: None,
            max_cue_bytes: Self::DEFAULT_MAX_CUE_BYTES,
        }
    }
}

/// A parsed document plus the blocks that were skipped on the way.
#[derive(Debug)]
pub struct ParseOutcome {
    pub document: Document,
    pub diagnostics: Vec<ParseError>,
}

pub struct Parser {
    config: ParserConfig,
}

impl Parser {
    pub fn new() -> Self {
        Self::with_config(ParserConfig::default())
    }

    pub fn with_config(config: ParserConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    pub fn parse(&self, input: &str) -> Result<ParseOutcome> {
        let format = self.config.format.unwrap_or_else(|| detect_format(input));
        let mut sink = CueSink::new(&self.config, input);
        match format {
            Format::Srt => srt::read_cues(input, &mut sink)?,
            Format::Ttml => ttml::read_cues(input, &mut sink)?,
        }
        let outcome = sink.finish(format);
        log::debug!(
            "Parsed {} {} cues ({} skipped)",
            outcome.document.len(),
            format,
            outcome.diagnostics.len()
        );
        Ok(outcome)
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

/// XML documents start with markup; anything else is treated as SRT.
pub fn detect_format(input: &str) -> Format {
    let head = input.trim_start_matches(|c: char| c == '\u{FEFF}' || c.is_whitespace());
    if head.starts_with('<') {
        Format::Ttml
    } else {
        Format::Srt
    }
}

/// Collects cue blocks as the format readers produce them, applying the
/// document-wide checks and the configured error policy.
pub(crate) struct CueSink<'a> {
    config: &'a ParserConfig,
    source: &'a str,
    cues: Vec<Cue>,
    seen: HashSet<CueId>,
    diagnostics: Vec<ParseError>,
    /// Location of the last diagnostic. Blocks arrive in source order, so
    /// line counting resumes from here.
    cursor: Location,
    pub(crate) styling: Styling,
}

impl<'a> CueSink<'a> {
    fn new(config: &'a ParserConfig, source: &'a str) -> Self {
        Self {
            config,
            source,
            cues: Vec::new(),
            seen: HashSet::new(),
            diagnostics: Vec::new(),
            cursor: Location::START,
            styling: Styling::default(),
        }
    }

    pub(crate) fn check_size(&self, block_len: usize) -> std::result::Result<(), ParseErrorKind> {
        if block_len > self.config.max_cue_bytes {
            Err(ParseErrorKind::CueTooLarge(block_len))
        } else {
            Ok(())
        }
    }

    /// Takes the outcome of reading the block at `offset`. Only fails in
    /// strict mode.
    pub(crate) fn accept(
        &mut self,
        offset: usize,
        block: std::result::Result<Cue, ParseErrorKind>,
    ) -> Result<()> {
        let seen = &mut self.seen;
        let checked = block.and_then(|cue| validate(&cue, seen).map(|_| cue));
        match checked {
            Ok(cue) => self.cues.push(cue),
            Err(kind) => {
                self.cursor = self.cursor.advance(self.source, offset);
                let err = ParseError {
                    location: self.cursor,
                    kind,
                };
                match self.config.mode {
                    ParseMode::Strict => return Err(err.into()),
                    ParseMode::Lenient => {
                        log::warn!("Skipping cue block: {}", err);
                        self.diagnostics.push(err);
                    }
                }
            }
        }
        Ok(())
    }

    fn finish(self, format: Format) -> ParseOutcome {
        ParseOutcome {
            document: Document::sorted(format, self.cues).with_styling(self.styling),
            diagnostics: self.diagnostics,
        }
    }
}
