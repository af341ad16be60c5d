//! Time-bucketed object names.
//!
//! A [`NameTemplate`] maps an instant to the name of the object its log lines
//! belong to, and maps object names back to the instant their bucket starts.
//!
//! Templates mix literal text with brace-delimited fields:
//!
//! | Token            | Field  | Rendering                      |
//! |------------------|--------|--------------------------------|
//! | `{yyyy}` / `{y}` | year   | four digits / natural          |
//! | `{MM}` / `{M}`   | month  | two digits / natural           |
//! | `{dd}` / `{d}`   | day    | two digits / natural           |
//! | `{hh}` / `{h}`   | hour   | two digits / natural           |
//! | `{mm}` / `{m}`   | minute | two digits / natural           |
//!
//! Any other brace-delimited token is kept verbatim when formatting and makes
//! every parse fail.
//!
//! Parsing reads each field as the longest run of decimal digits, so two
//! fields with no literal text between them (`{yyyy}{MM}`) cannot be told
//! apart and such names do not round-trip.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Local, TimeZone, Timelike};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Year,
    Month,
    Day,
    Hour,
    Minute,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field { field: Field, padded: bool },
    /// Unrecognized token, stored with its braces.
    Unknown(String),
}

impl Segment {
    fn from_token(token: &str) -> Segment {
        let (field, padded) = match token {
            "yyyy" => (Field::Year, true),
            "y" => (Field::Year, false),
            "MM" => (Field::Month, true),
            "M" => (Field::Month, false),
            "dd" => (Field::Day, true),
            "d" => (Field::Day, false),
            "hh" => (Field::Hour, true),
            "h" => (Field::Hour, false),
            "mm" => (Field::Minute, true),
            "m" => (Field::Minute, false),
            _ => return Segment::Unknown(format!("{{{}}}", token)),
        };
        Segment::Field { field, padded }
    }
}

/// A parsed object-name template such as `"{yyyy}/{MM}/{dd}/{hh}/node.log"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl NameTemplate {
    /// Parses `template`.
    ///
    /// Fails with [`Error::Config`] if a `{` is never closed or if the
    /// template has no date or time field at all.
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let source = template.into();
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = source.as_str();

        while let Some(open) = rest.find('{') {
            literal.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let close = after.find('}').ok_or_else(|| {
                Error::Config(format!(
                    "unterminated '{{' in name template '{}'",
                    source
                ))
            })?;
            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(Segment::from_token(&after[..close]));
            rest = &after[close + 1..];
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        if !segments
            .iter()
            .any(|segment| matches!(segment, Segment::Field { .. }))
        {
            return Err(Error::Config(format!(
                "name template '{}' has no date or time field",
                source
            )));
        }

        Ok(Self { source, segments })
    }

    /// The template text as configured.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Literal text before the first token. Empty if the template starts
    /// with a field.
    pub fn literal_prefix(&self) -> &str {
        match self.source.find('{') {
            Some(idx) => &self.source[..idx],
            None => &self.source,
        }
    }

    /// Renders the object name for the bucket containing `instant`.
    pub fn format<Tz: TimeZone>(&self, instant: &DateTime<Tz>) -> String {
        let mut name = String::with_capacity(self.source.len() + 8);
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) | Segment::Unknown(text) => name.push_str(text),
                Segment::Field { field, padded } => {
                    let value = match field {
                        Field::Year => {
                            if *padded {
                                name.push_str(&format!("{:04}", instant.year()));
                            } else {
                                name.push_str(&instant.year().to_string());
                            }
                            continue;
                        }
                        Field::Month => instant.month(),
                        Field::Day => instant.day(),
                        Field::Hour => instant.hour(),
                        Field::Minute => instant.minute(),
                    };
                    if *padded {
                        name.push_str(&format!("{:02}", value));
                    } else {
                        name.push_str(&value.to_string());
                    }
                }
            }
        }
        name
    }

    /// Recovers the start of the bucket `name` was formatted from, in local
    /// time. Returns `None` when the name does not match the template.
    pub fn parse(&self, name: &str) -> Option<DateTime<Local>> {
        self.parse_in(name, &Local)
    }

    /// Like [`parse`](Self::parse), in the time zone `tz`.
    ///
    /// Fields missing from the template default to January, the first, and
    /// midnight. Values that do not form a calendar date, or a local time
    /// skipped by a daylight-saving change, do not match. An ambiguous local
    /// time resolves to its earlier instant.
    pub fn parse_in<Tz: TimeZone>(&self, name: &str, tz: &Tz) -> Option<DateTime<Tz>> {
        let mut rest = name;
        let mut year = None;
        let (mut month, mut day, mut hour, mut minute) = (1, 1, 0, 0);

        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => rest = rest.strip_prefix(text.as_str())?,
                Segment::Unknown(_) => return None,
                Segment::Field { field, .. } => {
                    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
                    if digits == 0 {
                        return None;
                    }
                    let value: u32 = rest[..digits].parse().ok()?;
                    rest = &rest[digits..];
                    match field {
                        Field::Year => year = Some(i32::try_from(value).ok()?),
                        Field::Month => month = value,
                        Field::Day => day = value,
                        Field::Hour => hour = value,
                        Field::Minute => minute = value,
                    }
                }
            }
        }

        if !rest.is_empty() {
            return None;
        }
        tz.with_ymd_and_hms(year?, month, day, hour, minute, 0)
            .earliest()
    }
}

impl fmt::Display for NameTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl FromStr for NameTemplate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        NameTemplate::new(s)
    }
}
