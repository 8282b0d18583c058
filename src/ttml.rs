//! Streaming reader for TTML and EBU-TT-D documents.
//!
//! `body` and `div` act as time containers and every `p` becomes a cue that
//! keeps the name of its region and its inner markup. `style` and `region`
//! definitions are collected by id; nothing here interprets them.

use crate::cue::{Cue, Properties};
use crate::error::{Location, ParseError, ParseErrorKind, Result, SubcueError};
use crate::parser::CueSink;
use crate::timecode::{time_expression, Millis};

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// An open `tt`, `body` or `div` element.
struct Container {
    begin: Millis,
    region: Option<String>,
}

/// A `p` element whose closing tag has not been seen yet.
struct OpenCue {
    offset: usize,
    inner_start: usize,
    depth: usize,
    attrs: std::result::Result<CueAttrs, ParseErrorKind>,
}

struct CueAttrs {
    id: String,
    start: Millis,
    end: Millis,
    region: Option<String>,
}

#[derive(Default)]
struct TimingAttrs {
    id: Option<String>,
    begin: Option<String>,
    end: Option<String>,
    dur: Option<String>,
    region: Option<String>,
}

pub(crate) fn read_cues(source: &str, sink: &mut CueSink<'_>) -> Result<()> {
    let mut reader = Reader::from_str(source);
    let mut containers: Vec<Container> = Vec::new();
    let mut open: Option<OpenCue> = None;
    let mut seen_root = false;
    let mut ordinal = 0;

    loop {
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(e) => {
                let at = reader.buffer_position();
                return Err(document_error(source, at, e.to_string()));
            }
        };
        let after = reader.buffer_position();
        match event {
            Event::Start(e) => {
                if let Some(cue) = open.as_mut() {
                    cue.depth += 1;
                    continue;
                }
                match e.local_name().as_ref() {
                    b"tt" => {
                        seen_root = true;
                        containers.push(Container {
                            begin: 0,
                            region: None,
                        });
                    }
                    b"body" | b"div" => {
                        let container = enter_container(&e, containers.last())
                            .map_err(|kind| parse_error(source, tag_start(source, after), kind))?;
                        containers.push(container);
                    }
                    b"style" | b"region" => {
                        define(&e, sink)
                            .map_err(|kind| parse_error(source, tag_start(source, after), kind))?;
                    }
                    b"p" => {
                        ordinal += 1;
                        open = Some(OpenCue {
                            offset: tag_start(source, after),
                            inner_start: after,
                            depth: 0,
                            attrs: cue_attrs(&e, ordinal, containers.last()),
                        });
                    }
                    _ => {}
                }
            }
            Event::Empty(e) => {
                if open.is_some() {
                    continue;
                }
                match e.local_name().as_ref() {
                    b"p" => {}
                    b"style" | b"region" => {
                        define(&e, sink)
                            .map_err(|kind| parse_error(source, tag_start(source, after), kind))?;
                        continue;
                    }
                    _ => continue,
                }
                ordinal += 1;
                let offset = tag_start(source, after);
                let outcome = sink
                    .check_size(after - offset)
                    .and_then(|_| cue_attrs(&e, ordinal, containers.last()))
                    .map(|attrs| attrs.into_cue(String::new()));
                sink.accept(offset, outcome)?;
            }
            Event::End(e) => {
                if let Some(mut cue) = open.take() {
                    if cue.depth > 0 {
                        cue.depth -= 1;
                        open = Some(cue);
                        continue;
                    }
                    let inner_end = tag_start(source, after).max(cue.inner_start);
                    let inner = source.get(cue.inner_start..inner_end).unwrap_or_default();
                    let outcome = sink
                        .check_size(after - cue.offset)
                        .and(cue.attrs)
                        .map(|attrs| attrs.into_cue(collapse_whitespace(inner)));
                    sink.accept(cue.offset, outcome)?;
                    continue;
                }
                if matches!(e.local_name().as_ref(), b"tt" | b"body" | b"div") {
                    containers.pop();
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !seen_root {
        return Err(document_error(
            source,
            0,
            "no <tt> root element found".to_string(),
        ));
    }
    Ok(())
}

impl CueAttrs {
    fn into_cue(self, payload: String) -> Cue {
        let cue = Cue::new(self.id, self.start, self.end, payload);
        match self.region {
            Some(region) => cue.with_region(region),
            None => cue,
        }
    }
}

fn timing_attrs(e: &BytesStart) -> std::result::Result<TimingAttrs, ParseErrorKind> {
    let mut attrs = TimingAttrs::default();
    for attr in e.attributes() {
        let attr = attr.map_err(|e| ParseErrorKind::MalformedBlock(e.to_string()))?;
        let value = attr
            .unescape_value()
            .map_err(|e| ParseErrorKind::MalformedBlock(e.to_string()))?
            .into_owned();
        match attr.key.local_name().as_ref() {
            b"id" => attrs.id = Some(value),
            b"begin" => attrs.begin = Some(value),
            b"end" => attrs.end = Some(value),
            b"dur" => attrs.dur = Some(value),
            b"region" => attrs.region = Some(value),
            _ => {}
        }
    }
    Ok(attrs)
}

/// Records a `style` or `region` definition. Elements without an id cannot
/// be referenced and are ignored.
fn define(e: &BytesStart, sink: &mut CueSink<'_>) -> std::result::Result<(), ParseErrorKind> {
    let mut id = None;
    let mut properties = Properties::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|e| ParseErrorKind::MalformedBlock(e.to_string()))?;
        let value = attr
            .unescape_value()
            .map_err(|e| ParseErrorKind::MalformedBlock(e.to_string()))?
            .into_owned();
        let name = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        if name == "id" {
            id = Some(value);
        } else {
            properties.insert(name, value);
        }
    }
    let Some(id) = id else {
        return Ok(());
    };
    let definitions = match e.local_name().as_ref() {
        b"style" => &mut sink.styling.styles,
        _ => &mut sink.styling.regions,
    };
    if definitions.insert(id.clone(), properties).is_some() {
        log::debug!("Definition '{}' replaces an earlier one", id);
    }
    Ok(())
}

fn time(value: &str) -> std::result::Result<Millis, ParseErrorKind> {
    time_expression(value).map_err(ParseErrorKind::InvalidTimecode)
}

fn offset_by(base: Millis, value: &str) -> std::result::Result<Millis, ParseErrorKind> {
    base.checked_add(time(value)?)
        .ok_or_else(|| ParseErrorKind::InvalidTimecode(format!("'{}' overflows", value)))
}

fn enter_container(
    e: &BytesStart,
    parent: Option<&Container>,
) -> std::result::Result<Container, ParseErrorKind> {
    let attrs = timing_attrs(e)?;
    let base = parent.map_or(0, |p| p.begin);
    let begin = match &attrs.begin {
        Some(begin) => offset_by(base, begin)?,
        None => base,
    };
    Ok(Container {
        begin,
        region: attrs.region.or_else(|| parent.and_then(|p| p.region.clone())),
    })
}

fn cue_attrs(
    e: &BytesStart,
    ordinal: usize,
    parent: Option<&Container>,
) -> std::result::Result<CueAttrs, ParseErrorKind> {
    let attrs = timing_attrs(e)?;
    let base = parent.map_or(0, |p| p.begin);
    let begin = attrs.begin.as_deref().ok_or(ParseErrorKind::MissingTime("begin"))?;
    let start = offset_by(base, begin)?;
    let end = match (&attrs.end, &attrs.dur) {
        (Some(end), _) => offset_by(base, end)?,
        (None, Some(dur)) => offset_by(start, dur)?,
        (None, None) => return Err(ParseErrorKind::MissingTime("end")),
    };
    Ok(CueAttrs {
        id: attrs.id.unwrap_or_else(|| format!("p{}", ordinal)),
        start,
        end,
        region: attrs.region.or_else(|| parent.and_then(|p| p.region.clone())),
    })
}

/// Start of the tag that ends at `end`. Attribute values cannot hold a
/// literal `<`, so the last one before `end` opens the tag.
fn tag_start(source: &str, end: usize) -> usize {
    source
        .get(..end)
        .and_then(|s| s.rfind('<'))
        .unwrap_or(0)
}

/// Default `xml:space` handling: runs of whitespace fold into one space.
fn collapse_whitespace(markup: &str) -> String {
    markup.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn parse_error(source: &str, offset: usize, kind: ParseErrorKind) -> SubcueError {
    ParseError {
        location: Location::at(source, offset),
        kind,
    }
    .into()
}

fn document_error(source: &str, offset: usize, msg: String) -> SubcueError {
    parse_error(source, offset, ParseErrorKind::Document(msg))
}
