use crate::error::{Result, SubcueError};

use nom::branch::alt;
use nom::bytes::complete::{tag, take_while_m_n};
use nom::character::complete::{char, digit1};
use nom::combinator::{all_consuming, map_res, opt};
use nom::error::VerboseError;
use nom::sequence::preceded;
use nom::IResult;

/// Milliseconds since the start of the media.
pub type Millis = u64;

type Res<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

/// Validates a timecode supplied by a playback clock.
pub fn checked(t: i64) -> Result<Millis> {
    Millis::try_from(t).map_err(|_| SubcueError::InvalidTimecode(t.to_string()))
}

/// Parses a timecode as typed by a user: either a plain number of
/// milliseconds, an SRT-style clock time such as `00:01:02,500`, or a TTML
/// time expression such as `2.5s`.
pub fn parse_timecode_arg(input: &str) -> Result<Millis> {
    let trimmed = input.trim();
    let invalid = || SubcueError::InvalidTimecode(input.to_string());
    if !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return trimmed.parse().map_err(|_| invalid());
    }
    if let Ok((_, ms)) = all_consuming(srt_timestamp)(trimmed) {
        return Ok(ms);
    }
    time_expression(trimmed).map_err(|_| invalid())
}

pub(crate) fn srt_timestamp(input: &str) -> Res<Millis> {
    const MILLIS_MIN: usize = 0;
    const MILLIS_MAX: usize = 3;
    let take_millis = || {
        map_res(
            take_while_m_n(MILLIS_MIN, MILLIS_MAX, |c: char| c.is_ascii_digit()),
            move |s: &str| {
                if s.len() < MILLIS_MAX {
                    // A value like `,2` is not valid SRT but shows up in the wild.
                    // It reads as `,200`: right-pad to three digits.
                    format!("{:0<3}", s).parse::<Millis>()
                } else {
                    s.parse()
                }
            },
        )
    };

    const HMS_MIN: usize = 0;
    const HMS_MAX: usize = 2;
    const HOURS_MAX: usize = 9;
    let take_hms = || {
        map_res(
            take_while_m_n(HMS_MIN, HMS_MAX, |c: char| c.is_ascii_digit()),
            |s: &str| {
                if s.len() < HMS_MAX {
                    // Left-pad here instead: 1:13:45 means 01:13:45.
                    format!("{:0>2}", s).parse::<Millis>()
                } else {
                    s.parse()
                }
            },
        )
    };

    // Hours are not capped at two digits: long recordings pass 99 hours.
    let (input, hours) = map_res(
        take_while_m_n(HMS_MIN, HOURS_MAX, |c: char| c.is_ascii_digit()),
        |s: &str| if s.is_empty() { Ok(0) } else { s.parse::<Millis>() },
    )(input)?;
    let (input, _) = tag(":")(input)?;
    let (input, minutes) = take_hms()(input)?;
    let (input, _) = tag(":")(input)?;
    let (input, seconds) = take_hms()(input)?;
    let (input, _) = alt((tag(","), tag(".")))(input)?;
    let (input, millis) = take_millis()(input)?;

    Ok((
        input,
        millis + seconds * 1000 + minutes * 60 * 1000 + hours * 60 * 60 * 1000,
    ))
}

/// Parses a TTML time expression.
///
/// Supports clock times (`HH:MM:SS` with an optional fraction) and offset
/// times (`12.5s`, `500ms`, `2m`, `1h`). Frame-based forms are rejected.
pub(crate) fn time_expression(input: &str) -> std::result::Result<Millis, String> {
    let input = input.trim();
    if let Ok((_, (hours, minutes, seconds, fraction))) = all_consuming(clock_time)(input) {
        if minutes >= 60 || seconds >= 60 {
            return Err(format!("'{}' is out of range", input));
        }
        return hours
            .checked_mul(3_600_000)
            .and_then(|ms| ms.checked_add(minutes * 60_000 + seconds * 1000))
            .and_then(|ms| ms.checked_add(fraction.map_or(0, |f| fraction_of(f, 1000))))
            .ok_or_else(|| format!("'{}' overflows", input));
    }
    if let Ok((_, (whole, fraction, unit))) = all_consuming(offset_time)(input) {
        return whole
            .checked_mul(unit)
            .and_then(|ms| ms.checked_add(fraction.map_or(0, |f| fraction_of(f, unit))))
            .ok_or_else(|| format!("'{}' overflows", input));
    }
    Err(format!("'{}'", input))
}

fn number(input: &str) -> Res<Millis> {
    map_res(digit1, |s: &str| s.parse::<Millis>())(input)
}

fn two_digits(input: &str) -> Res<Millis> {
    map_res(
        take_while_m_n(2, 2, |c: char| c.is_ascii_digit()),
        |s: &str| s.parse::<Millis>(),
    )(input)
}

fn clock_time(input: &str) -> Res<(Millis, Millis, Millis, Option<&str>)> {
    let (input, hours) = number(input)?;
    let (input, _) = char(':')(input)?;
    let (input, minutes) = two_digits(input)?;
    let (input, _) = char(':')(input)?;
    let (input, seconds) = two_digits(input)?;
    let (input, fraction) = opt(preceded(char('.'), digit1))(input)?;
    Ok((input, (hours, minutes, seconds, fraction)))
}

fn offset_time(input: &str) -> Res<(Millis, Option<&str>, Millis)> {
    let (input, whole) = number(input)?;
    let (input, fraction) = opt(preceded(char('.'), digit1))(input)?;
    let (input, metric) = alt((tag("ms"), tag("h"), tag("m"), tag("s")))(input)?;
    let unit = match metric {
        "h" => 3_600_000,
        "m" => 60_000,
        "s" => 1000,
        _ => 1,
    };
    Ok((input, (whole, fraction, unit)))
}

/// Scales the decimal fraction `0.<digits>` by `unit`, truncating.
fn fraction_of(digits: &str, unit: Millis) -> Millis {
    let digits = &digits[..digits.len().min(9)];
    let value: Millis = digits.parse().unwrap_or(0);
    value * unit / 10u64.pow(digits.len() as u32)
}
