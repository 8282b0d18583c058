//! Timecode-indexed subtitle engine.
//!
//! Parse an SRT or TTML document, index its cues, then feed playback
//! positions to a [`DiffEngine`] to learn which cues to show and hide:
//!
//! ```
//! use subcue::{CueIndex, DiffEngine, Parser};
//!
//! let srt = "1\n00:00:01,000 --> 00:00:03,000\nHello\n\n2\n00:00:02,500 --> 00:00:04,000\nWorld\n";
//! let outcome = Parser::new().parse(srt)?;
//! let mut engine = DiffEngine::with_index(CueIndex::build(outcome.document));
//!
//! let events = engine.update(2700)?;
//! assert_eq!(events.to_show.len(), 2);
//! let events = engine.update(3500)?;
//! assert_eq!(events.to_hide[0].as_str(), "1");
//! # Ok::<(), subcue::SubcueError>(())
//! ```

mod cue;
mod engine;
mod error;
mod index;
mod parser;
pub mod serialiser;
mod srt;
pub mod timecode;
mod ttml;

pub use crate::cue::{Cue, CueId, Document, Format, Properties, Styling};
pub use crate::engine::{DiffEngine, DiffEvents, Presenter, Viewport};
pub use crate::error::{Location, ParseError, ParseErrorKind, Result, SubcueError};
pub use crate::index::{CueIndex, Scan};
pub use crate::parser::{detect_format, ParseMode, ParseOutcome, Parser, ParserConfig};
pub use crate::timecode::Millis;
