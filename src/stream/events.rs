//! Event-stream plumbing shared by the TOC and in-network readers
//!
//! Wraps `json_event_parser` with an owned event type (so callers can pull
//! the next event without borrow gymnastics), a byte-counting reader that
//! gives parse errors a stream offset, and helpers to materialize or skip a
//! single JSON value at the current position.

use crate::domain::errors::ParseError;
use json_event_parser::{JsonEvent, ReaderJsonParser};
use serde_json::{Map, Number, Value};
use std::io::Read;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Shared byte-offset counter for a stream
#[derive(Debug, Clone, Default)]
pub struct SharedOffset(Arc<AtomicU64>);

impl SharedOffset {
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }
}

/// Reader wrapper that counts bytes consumed from the underlying stream
pub struct CountingReader<R> {
    inner: R,
    offset: SharedOffset,
}

impl<R: Read> CountingReader<R> {
    /// Wraps a reader; the returned handle tracks the consumed offset
    pub fn new(inner: R) -> (Self, SharedOffset) {
        let offset = SharedOffset::default();
        (
            Self {
                inner,
                offset: offset.clone(),
            },
            offset,
        )
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.offset.add(n as u64);
        Ok(n)
    }
}

/// Owned JSON event
///
/// `json_event_parser` events borrow the parser's buffer; converting to an
/// owned form up front lets the state machines pull the next event freely.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    StartObject,
    EndObject,
    StartArray,
    EndArray,
    Key(String),
    Str(String),
    Num(String),
    Bool(bool),
    Null,
    Eof,
}

/// Pulls the next event, attaching the current stream offset to failures
pub fn next_event<R: Read>(
    parser: &mut ReaderJsonParser<R>,
    offset: &SharedOffset,
) -> Result<Event, ParseError> {
    let event = parser
        .parse_next()
        .map_err(|e| ParseError::new(offset.get(), e.to_string()))?;
    Ok(match event {
        JsonEvent::StartObject => Event::StartObject,
        JsonEvent::EndObject => Event::EndObject,
        JsonEvent::StartArray => Event::StartArray,
        JsonEvent::EndArray => Event::EndArray,
        JsonEvent::ObjectKey(k) => Event::Key(k.into_owned()),
        JsonEvent::String(s) => Event::Str(s.into_owned()),
        JsonEvent::Number(n) => Event::Num(n.into_owned()),
        JsonEvent::Boolean(b) => Event::Bool(b),
        JsonEvent::Null => Event::Null,
        JsonEvent::Eof => Event::Eof,
    })
}

/// Materializes the JSON value that starts with `first` into a
/// `serde_json::Value`.
///
/// Used for one array element or one object field at a time; the root array
/// is never materialized.
pub fn build_value<R: Read>(
    parser: &mut ReaderJsonParser<R>,
    offset: &SharedOffset,
    first: Event,
) -> Result<Value, ParseError> {
    match first {
        Event::Null => Ok(Value::Null),
        Event::Bool(b) => Ok(Value::Bool(b)),
        Event::Str(s) => Ok(Value::String(s)),
        Event::Num(n) => parse_number(&n, offset),
        Event::StartArray => {
            let mut items = Vec::new();
            loop {
                let event = next_event(parser, offset)?;
                if event == Event::EndArray {
                    return Ok(Value::Array(items));
                }
                items.push(build_value(parser, offset, event)?);
            }
        }
        Event::StartObject => {
            let mut map = Map::new();
            loop {
                match next_event(parser, offset)? {
                    Event::EndObject => return Ok(Value::Object(map)),
                    Event::Key(key) => {
                        let event = next_event(parser, offset)?;
                        map.insert(key, build_value(parser, offset, event)?);
                    }
                    other => {
                        return Err(ParseError::new(
                            offset.get(),
                            format!("expected object key, got {other:?}"),
                        ))
                    }
                }
            }
        }
        Event::Eof => Err(ParseError::new(offset.get(), "unexpected end of input")),
        other => Err(ParseError::new(
            offset.get(),
            format!("unexpected event {other:?} at value position"),
        )),
    }
}

/// Consumes and discards the value that starts with `first`
pub fn skip_value<R: Read>(
    parser: &mut ReaderJsonParser<R>,
    offset: &SharedOffset,
    first: Event,
) -> Result<(), ParseError> {
    let mut depth = match first {
        Event::StartObject | Event::StartArray => 1u64,
        Event::Eof => {
            return Err(ParseError::new(offset.get(), "unexpected end of input"));
        }
        // Scalar; nothing more to consume.
        _ => return Ok(()),
    };

    while depth > 0 {
        match next_event(parser, offset)? {
            Event::StartObject | Event::StartArray => depth += 1,
            Event::EndObject | Event::EndArray => depth -= 1,
            Event::Eof => {
                return Err(ParseError::new(offset.get(), "unexpected end of input"));
            }
            _ => {}
        }
    }
    Ok(())
}

fn parse_number(raw: &str, offset: &SharedOffset) -> Result<Value, ParseError> {
    if let Ok(i) = raw.parse::<i64>() {
        return Ok(Value::Number(Number::from(i)));
    }
    if let Ok(u) = raw.parse::<u64>() {
        return Ok(Value::Number(Number::from(u)));
    }
    raw.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| ParseError::new(offset.get(), format!("invalid number literal '{raw}'")))
}
