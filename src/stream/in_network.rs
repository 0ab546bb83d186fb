//! In-network rate file streaming
//!
//! [`InNetworkReader`] yields one fully-materialized [`RawInNetworkItem`] per
//! element of the file's `in_network` array, in source order, with memory
//! constant in the number of items. [`extract_provider_references`] is the
//! first pass of the two-pass read used when a file defers provider groups
//! to a top-level reference table.

use crate::domain::errors::ParseError;
use crate::domain::raw::{ProviderGroup, ProviderReferenceEntry, RawInNetworkItem};
use crate::stream::events::{build_value, next_event, skip_value, CountingReader, Event, SharedOffset};
use json_event_parser::ReaderJsonParser;
use std::collections::HashMap;
use std::io::Read;

enum State {
    /// Scanning top-level keys for `in_network`
    Scanning,
    /// Positioned inside the `in_network` array
    InItems,
    Done,
}

/// Internal error wrapper: tokenizer failures end the stream, a bad element
/// only fails that element.
struct PullError {
    error: ParseError,
    fatal: bool,
}

impl From<ParseError> for PullError {
    fn from(error: ParseError) -> Self {
        Self { error, fatal: true }
    }
}

/// Streaming iterator over a rates file's `in_network` array
///
/// Tokenizer-level failures end the stream; a malformed individual element
/// is reported as an error for that element and iteration continues, so
/// everything yielded before a mid-file truncation is still usable.
pub struct InNetworkReader<R: Read> {
    parser: ReaderJsonParser<CountingReader<R>>,
    offset: SharedOffset,
    state: State,
}

impl<R: Read> InNetworkReader<R> {
    pub fn new(reader: R) -> Self {
        let (counting, offset) = CountingReader::new(reader);
        Self {
            parser: ReaderJsonParser::new(counting),
            offset,
            state: State::Scanning,
        }
    }

    /// Bytes consumed from the (decompressed) stream so far
    pub fn offset(&self) -> u64 {
        self.offset.get()
    }

    fn pull(&mut self) -> Result<Option<RawInNetworkItem>, PullError> {
        loop {
            match self.state {
                State::Done => return Ok(None),
                State::Scanning => match next_event(&mut self.parser, &self.offset)? {
                    Event::StartObject => {}
                    Event::Key(key) if key == "in_network" => {
                        match next_event(&mut self.parser, &self.offset)? {
                            Event::StartArray => self.state = State::InItems,
                            other => {
                                return Err(ParseError::new(
                                    self.offset.get(),
                                    format!("in_network must be an array, got {other:?}"),
                                )
                                .into())
                            }
                        }
                    }
                    Event::Key(_) => {
                        let first = next_event(&mut self.parser, &self.offset)?;
                        skip_value(&mut self.parser, &self.offset, first)?;
                    }
                    Event::EndObject | Event::Eof => {
                        // No in_network section at all: zero items, not an error.
                        self.state = State::Done;
                        return Ok(None);
                    }
                    other => {
                        return Err(ParseError::new(
                            self.offset.get(),
                            format!("unexpected {other:?} before in_network"),
                        )
                        .into())
                    }
                },
                State::InItems => match next_event(&mut self.parser, &self.offset)? {
                    Event::EndArray => {
                        // Ignore whatever trails the array; items are done.
                        self.state = State::Done;
                        return Ok(None);
                    }
                    first @ Event::StartObject => {
                        let value = build_value(&mut self.parser, &self.offset, first)?;
                        return match serde_json::from_value(value) {
                            Ok(item) => Ok(Some(item)),
                            // The element was fully consumed; the stream is
                            // still positioned at the next one.
                            Err(e) => Err(PullError {
                                error: ParseError::new(self.offset.get(), e.to_string()),
                                fatal: false,
                            }),
                        };
                    }
                    other => {
                        return Err(ParseError::new(
                            self.offset.get(),
                            format!("unexpected {other:?} in in_network array"),
                        )
                        .into())
                    }
                },
            }
        }
    }
}

impl<R: Read> Iterator for InNetworkReader<R> {
    type Item = Result<RawInNetworkItem, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.pull() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => None,
            Err(e) => {
                if e.fatal {
                    self.state = State::Done;
                }
                Some(Err(e.error))
            }
        }
    }
}

/// Reads a file's top-level `provider_references` table into a lookup map.
///
/// First pass of the two-pass read: the whole stream is scanned, only the
/// reference table is kept. Returns an empty map when the file has none.
/// Entries that point at an external `location` instead of inlining groups
/// are skipped here; the external file, when configured in the TOC, is
/// loaded by the pipeline through the same function.
pub fn extract_provider_references<R: Read>(
    reader: R,
) -> Result<HashMap<u64, Vec<ProviderGroup>>, ParseError> {
    let (counting, offset) = CountingReader::new(reader);
    let mut parser = ReaderJsonParser::new(counting);
    let mut map = HashMap::new();

    loop {
        match next_event(&mut parser, &offset)? {
            Event::StartObject => {}
            Event::Key(key) if key == "provider_references" => {
                match next_event(&mut parser, &offset)? {
                    Event::StartArray => {}
                    other => {
                        return Err(ParseError::new(
                            offset.get(),
                            format!("provider_references must be an array, got {other:?}"),
                        ))
                    }
                }
                loop {
                    match next_event(&mut parser, &offset)? {
                        Event::EndArray => return Ok(map),
                        first @ Event::StartObject => {
                            let value = build_value(&mut parser, &offset, first)?;
                            let entry: ProviderReferenceEntry = serde_json::from_value(value)
                                .map_err(|e| ParseError::new(offset.get(), e.to_string()))?;
                            if entry.location.is_some() && entry.provider_groups.is_empty() {
                                continue;
                            }
                            map.insert(entry.provider_group_id, entry.provider_groups);
                        }
                        other => {
                            return Err(ParseError::new(
                                offset.get(),
                                format!("unexpected {other:?} in provider_references"),
                            ))
                        }
                    }
                }
            }
            Event::Key(_) => {
                let first = next_event(&mut parser, &offset)?;
                skip_value(&mut parser, &offset, first)?;
            }
            Event::EndObject | Event::Eof => return Ok(map),
            other => {
                return Err(ParseError::new(
                    offset.get(),
                    format!("unexpected {other:?} at top level"),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "reporting_entity_name": "Example Health",
        "last_updated_on": "2025-06-01",
        "in_network": [
            {
                "billing_code": "99213",
                "billing_code_type": "CPT",
                "description": "Office visit",
                "negotiated_rates": [{
                    "provider_groups": [{
                        "npi": ["1234567893"],
                        "tin": {"type": "ein", "value": "12-3456789"}
                    }],
                    "negotiated_prices": [{
                        "negotiated_type": "negotiated",
                        "negotiated_rate": 81.84,
                        "service_code": ["11"],
                        "billing_class": "professional"
                    }]
                }]
            },
            {
                "billing_code": "99214",
                "billing_code_type": "CPT",
                "negotiated_rates": []
            }
        ]
    }"#;

    #[test]
    fn test_yields_items_in_source_order() {
        let items: Vec<_> = InNetworkReader::new(SAMPLE.as_bytes())
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].billing_code, "99213");
        assert_eq!(items[1].billing_code, "99214");
        assert_eq!(
            items[0].negotiated_rates[0].negotiated_prices[0].negotiated_rate,
            Some(81.84)
        );
    }

    #[test]
    fn test_empty_in_network_yields_nothing() {
        let mut reader = InNetworkReader::new(&br#"{"in_network": []}"#[..]);
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_file_without_in_network_yields_nothing() {
        let mut reader =
            InNetworkReader::new(&br#"{"provider_references": [{"provider_group_id": 1}]}"#[..]);
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_truncated_stream_keeps_earlier_items() {
        // Cut the sample mid-way through the second item.
        let cut = SAMPLE.find("99214").unwrap() + 2;
        let truncated = &SAMPLE.as_bytes()[..cut];

        let mut reader = InNetworkReader::new(truncated);
        let first = reader.next().unwrap().unwrap();
        assert_eq!(first.billing_code, "99213");

        let err = reader.next().unwrap().unwrap_err();
        assert!(err.offset > 0);
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_extract_provider_references() {
        let input = r#"{
            "provider_references": [
                {
                    "provider_group_id": 7,
                    "provider_groups": [{
                        "npi": ["1234567893"],
                        "tin": {"type": "ein", "value": "12-3456789"}
                    }]
                },
                {"provider_group_id": 9, "location": "https://x/external.json"}
            ],
            "in_network": []
        }"#;

        let map = extract_provider_references(input.as_bytes()).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map[&7][0].npi, vec!["1234567893"]);
    }

    #[test]
    fn test_extract_without_table_is_empty() {
        let map = extract_provider_references(&br#"{"in_network": []}"#[..]).unwrap();
        assert!(map.is_empty());
    }
}
