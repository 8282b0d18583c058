use crate::cue::Cue;
use crate::error::{ParseErrorKind, Result};
use crate::parser::CueSink;
use crate::timecode::{srt_timestamp, Millis};

use nom::bytes::complete::tag;
use nom::character::complete::{digit1, not_line_ending, space0, space1};
use nom::combinator::{all_consuming, map_res, opt};
use nom::error::VerboseError;
use nom::sequence::preceded;
use nom::IResult;

/// Reads every cue block of an SRT document into `sink`.
pub(crate) fn read_cues(source: &str, sink: &mut CueSink<'_>) -> Result<()> {
    let mut rest = source.strip_prefix('\u{FEFF}').unwrap_or(source);
    let mut last_seq = None;
    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            return Ok(());
        }
        let offset = source.len() - rest.len();
        let (remaining, block) = take_block(rest);
        rest = remaining;

        let outcome = sink
            .check_size(block.len())
            .and_then(|_| subtitle(block))
            .map(|(seq, cue)| {
                if last_seq.map_or(false, |last| seq <= last) {
                    log::debug!("Sequence number {} does not follow {:?}", seq, last_seq);
                }
                last_seq = Some(seq);
                cue
            });
        sink.accept(offset, outcome)?;
    }
}

/// Splits off the leading block: everything up to the first blank line.
fn take_block(input: &str) -> (&str, &str) {
    let mut len = 0;
    for line in input.split_inclusive('\n') {
        if line.trim().is_empty() {
            break;
        }
        len += line.len();
    }
    let (block, rest) = input.split_at(len);
    (rest, block)
}

fn subtitle(block: &str) -> std::result::Result<(usize, Cue), ParseErrorKind> {
    let mut lines = block.lines();
    let id = lines.next().unwrap_or_default().trim();
    let (_, seq) = all_consuming(seq_num)(id).map_err(|_| {
        ParseErrorKind::MalformedBlock(format!("expected a sequence number, found '{}'", id))
    })?;

    let timing = lines
        .next()
        .ok_or_else(|| ParseErrorKind::MalformedBlock("missing timing line".to_string()))?
        .trim();
    let (_, (show_at, hide_at)) = all_consuming(show_hide)(timing)
        .map_err(|_| ParseErrorKind::InvalidTimecode(format!("'{}'", timing)))?;

    let text = lines.collect::<Vec<_>>().join("\n");
    Ok((seq, Cue::new(id, show_at, hide_at, text)))
}

fn show_hide(input: &str) -> IResult<&str, (Millis, Millis), VerboseError<&str>> {
    let (input, show_at) = srt_timestamp(input)?;
    let (input, _) = space1(input)?;
    let (input, _) = tag("-->")(input)?;
    let (input, _) = space1(input)?;
    let (input, hide_at) = srt_timestamp(input)?;
    // Some files carry position coordinates after the end time.
    let (input, _) = opt(preceded(space1, not_line_ending))(input)?;
    let (input, _) = space0(input)?;

    Ok((input, (show_at, hide_at)))
}

fn seq_num(input: &str) -> IResult<&str, usize, VerboseError<&str>> {
    map_res(digit1, |s: &str| s.parse())(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cue::Format;
    use crate::parser::{Parser, ParserConfig};

    fn parse(input: &str) -> crate::parser::ParseOutcome {
        Parser::with_config(ParserConfig::default().with_format(Format::Srt))
            .parse(input)
            .unwrap()
    }

    #[test]
    fn reads_blocks_with_crlf_and_bom() {
        let input = "\u{FEFF}1\r\n00:00:01,000 --> 00:00:03,000\r\nHello\r\nthere\r\n\r\n\r\n2\r\n00:00:02,500 --> 00:00:04,000\r\nWorld\r\n";
        let outcome = parse(input);
        let cues = outcome.document.cues();
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0].id.as_str(), "1");
        assert_eq!(cues[0].payload, "Hello\nthere");
        assert_eq!((cues[1].start, cues[1].end), (2500, 4000));
        assert_eq!(cues[1].payload, "World");
        assert!(outcome.diagnostics.is_empty());
    }

    #[test]
    fn keeps_inline_markup() {
        let outcome = parse("7\n00:00:01,000 --> 00:00:02,000\n<i>Whispering</i>\n");
        assert_eq!(outcome.document.cues()[0].payload, "<i>Whispering</i>");
    }

    #[test]
    fn tolerates_trailing_coordinates_and_missing_text() {
        let outcome = parse("1\n00:00:01,000 --> 00:00:02,000 X1:10 X2:20 Y1:5 Y2:9\n\n2\n00:00:03,000 --> 00:00:04,000\n");
        let cues = outcome.document.cues();
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0].end, 2000);
        assert_eq!(cues[1].payload, "");
    }

    #[test]
    fn malformed_blocks_become_diagnostics() {
        let input = "one
00:00:01,000 --> 00:00:02,000
Bad id

2
00:00:0x,000 --> 00:00:02,000
Bad time

3

4
00:00:05,000 --> 00:00:06,000
Good
";
        let outcome = parse(input);
        let ids: Vec<_> = outcome.document.cues().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["4"]);
        let kinds: Vec<_> = outcome.diagnostics.iter().map(|d| &d.kind).collect();
        assert!(matches!(kinds[0], ParseErrorKind::MalformedBlock(_)));
        assert!(matches!(kinds[1], ParseErrorKind::InvalidTimecode(_)));
        assert!(matches!(kinds[2], ParseErrorKind::MalformedBlock(_)));
        let lines: Vec<_> = outcome.diagnostics.iter().map(|d| d.location.line).collect();
        assert_eq!(lines, [1, 5, 9]);
    }

    #[test]
    fn negative_times_are_invalid() {
        let outcome = parse("1\n-00:00:01,000 --> 00:00:02,000\nNope\n");
        assert!(outcome.document.is_empty());
        assert!(matches!(
            outcome.diagnostics[0].kind,
            ParseErrorKind::InvalidTimecode(_)
        ));
    }

    #[test]
    fn take_block_stops_at_blank_line() {
        let (rest, block) = take_block("1\nA\n  \nB\n");
        assert_eq!(block, "1\nA\n");
        assert_eq!(rest, "  \nB\n");
        let (rest, block) = take_block("1\nA");
        assert_eq!(block, "1\nA");
        assert_eq!(rest, "");
    }
}
