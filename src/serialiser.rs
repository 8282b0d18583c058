use crate::cue::{Cue, Document, Format};
use crate::error::Result;
use crate::timecode::Millis;

use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Writes `document` as an SRT file at `output`.
pub fn write_file<P: AsRef<Path>>(document: &Document, output: P) -> Result<()> {
    let file = std::fs::File::create(output)?;
    let mut writer = BufWriter::new(file);
    serialise(document, &mut writer)?;
    writer.flush()?;
    Ok(())
}

/// Writes `document` as SRT. Cues are renumbered from 1.
pub fn serialise<W: Write>(document: &Document, buf: &mut W) -> io::Result<()> {
    for (seq, cue) in document.cues().iter().enumerate() {
        write_sub(buf, seq + 1, cue, document.format())?;
    }
    Ok(())
}

pub fn to_string(document: &Document) -> String {
    let mut buf = Vec::new();
    // Writing into a Vec cannot fail.
    let _ = serialise(document, &mut buf);
    String::from_utf8_lossy(&buf).into_owned()
}

fn write_sub<W: Write>(buf: &mut W, seq: usize, cue: &Cue, format: Format) -> io::Result<()> {
    writeln!(buf, "{}", seq)?;
    write_ts(buf, cue.start)?;
    write!(buf, " --> ")?;
    write_ts(buf, cue.end)?;
    writeln!(buf)?;
    let text = match format {
        Format::Srt => cue.payload.clone(),
        Format::Ttml => cue.plain_text(),
    };
    // A blank line would end the block early.
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        writeln!(buf, "{}", line)?;
    }
    writeln!(buf)?;
    Ok(())
}

fn write_ts<W: Write>(buf: &mut W, timestamp: Millis) -> io::Result<()> {
    let total_secs = timestamp / 1000;
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    let millis = timestamp % 1000;
    write!(
        buf,
        "{:02}:{:02}:{:02},{:03}",
        hours, minutes, seconds, millis
    )
}
