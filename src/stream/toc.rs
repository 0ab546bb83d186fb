//! Table-of-Contents streaming
//!
//! Lazily enumerates the MRF files named by a payer index without
//! materializing the index document. Three published shapes are handled:
//! the standard `reporting_structure` table of contents, the legacy `blobs`
//! listing, and a bare `in_network_files` array. An index whose first
//! relevant key is `in_network` is not a TOC at all but a rates file served
//! from the endpoint URL; the reader flags that instead of yielding entries.

use crate::domain::errors::ParseError;
use crate::stream::events::{build_value, next_event, skip_value, CountingReader, Event, SharedOffset};
use json_event_parser::ReaderJsonParser;
use serde_json::Value;
use std::collections::VecDeque;
use std::io::Read;

/// What kind of data a TOC entry points at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MrfFileKind {
    InNetworkRates,
    AllowedAmounts,
    Unknown,
}

/// One file named by the index, with the plan metadata that scoped it
#[derive(Debug, Clone, PartialEq)]
pub struct MrfFile {
    pub url: String,
    pub kind: MrfFileKind,
    pub plan_name: String,
    pub plan_id: Option<String>,
    pub plan_market_type: Option<String>,
    pub description: String,
    pub reporting_structure_index: usize,
    pub file_index: usize,
    /// External provider-reference file, when the structure declares one
    pub provider_reference_url: Option<String>,
}

/// Index shape, resolved while streaming
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TocShape {
    /// Not yet determined
    Undetected,
    /// Standard `reporting_structure` table of contents
    ReportingStructure,
    /// Legacy `blobs` listing
    LegacyBlobs,
    /// Bare top-level `in_network_files` array
    DirectFileList,
    /// The endpoint itself is an in-network rates file
    DirectRates,
}

enum State {
    Start,
    TopLevel,
    InReportingStructure,
    InBlobs,
    InDirectFiles,
    Done,
}

/// Streaming iterator over the files named by an index document
pub struct TocReader<R: Read> {
    parser: ReaderJsonParser<CountingReader<R>>,
    offset: SharedOffset,
    state: State,
    shape: TocShape,
    pending: VecDeque<MrfFile>,
    structure_index: usize,
}

impl<R: Read> TocReader<R> {
    pub fn new(reader: R) -> Self {
        let (counting, offset) = CountingReader::new(reader);
        Self {
            parser: ReaderJsonParser::new(counting),
            offset,
            state: State::Start,
            shape: TocShape::Undetected,
            pending: VecDeque::new(),
            structure_index: 0,
        }
    }

    /// Shape detected so far; final once the iterator has yielded anything
    /// or returned `None`.
    pub fn shape(&self) -> TocShape {
        self.shape
    }

    fn pull(&mut self) -> Result<Option<MrfFile>, ParseError> {
        loop {
            if let Some(entry) = self.pending.pop_front() {
                return Ok(Some(entry));
            }
            match self.state {
                State::Done => return Ok(None),
                State::Start => {
                    match next_event(&mut self.parser, &self.offset)? {
                        Event::StartObject => self.state = State::TopLevel,
                        Event::Eof => {
                            return Err(ParseError::new(self.offset.get(), "empty index document"))
                        }
                        other => {
                            return Err(ParseError::new(
                                self.offset.get(),
                                format!("index root must be an object, got {other:?}"),
                            ))
                        }
                    }
                }
                State::TopLevel => match next_event(&mut self.parser, &self.offset)? {
                    Event::Key(key) => match key.as_str() {
                        "reporting_structure" => {
                            self.expect_array_start()?;
                            self.shape = TocShape::ReportingStructure;
                            self.state = State::InReportingStructure;
                        }
                        "blobs" => {
                            self.expect_array_start()?;
                            self.shape = TocShape::LegacyBlobs;
                            self.state = State::InBlobs;
                        }
                        "in_network_files" => {
                            self.expect_array_start()?;
                            self.shape = TocShape::DirectFileList;
                            self.state = State::InDirectFiles;
                        }
                        "in_network" => {
                            // Rates file served straight from the endpoint.
                            self.shape = TocShape::DirectRates;
                            self.state = State::Done;
                            return Ok(None);
                        }
                        _ => {
                            let first = next_event(&mut self.parser, &self.offset)?;
                            skip_value(&mut self.parser, &self.offset, first)?;
                        }
                    },
                    Event::EndObject => self.state = State::Done,
                    Event::Eof => {
                        return Err(ParseError::new(self.offset.get(), "truncated index document"))
                    }
                    other => {
                        return Err(ParseError::new(
                            self.offset.get(),
                            format!("unexpected {other:?} in index object"),
                        ))
                    }
                },
                State::InReportingStructure => {
                    match next_event(&mut self.parser, &self.offset)? {
                        Event::EndArray => self.state = State::TopLevel,
                        first @ Event::StartObject => {
                            let value = build_value(&mut self.parser, &self.offset, first)?;
                            let index = self.structure_index;
                            self.structure_index += 1;
                            self.pending.extend(expand_reporting_structure(&value, index));
                        }
                        other => {
                            return Err(ParseError::new(
                                self.offset.get(),
                                format!("unexpected {other:?} in reporting_structure"),
                            ))
                        }
                    }
                }
                State::InBlobs => match next_event(&mut self.parser, &self.offset)? {
                    Event::EndArray => self.state = State::TopLevel,
                    first @ Event::StartObject => {
                        let value = build_value(&mut self.parser, &self.offset, first)?;
                        let index = self.structure_index;
                        self.structure_index += 1;
                        if let Some(entry) = expand_blob(&value, index) {
                            self.pending.push_back(entry);
                        }
                    }
                    other => {
                        return Err(ParseError::new(
                            self.offset.get(),
                            format!("unexpected {other:?} in blobs"),
                        ))
                    }
                },
                State::InDirectFiles => match next_event(&mut self.parser, &self.offset)? {
                    Event::EndArray => self.state = State::TopLevel,
                    first @ Event::StartObject => {
                        let value = build_value(&mut self.parser, &self.offset, first)?;
                        let index = self.structure_index;
                        self.structure_index += 1;
                        if let Some(entry) = expand_direct_file(&value, index) {
                            self.pending.push_back(entry);
                        }
                    }
                    other => {
                        return Err(ParseError::new(
                            self.offset.get(),
                            format!("unexpected {other:?} in in_network_files"),
                        ))
                    }
                },
            }
        }
    }

    fn expect_array_start(&mut self) -> Result<(), ParseError> {
        match next_event(&mut self.parser, &self.offset)? {
            Event::StartArray => Ok(()),
            other => Err(ParseError::new(
                self.offset.get(),
                format!("expected array, got {other:?}"),
            )),
        }
    }
}

impl<R: Read> Iterator for TocReader<R> {
    type Item = Result<MrfFile, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.pull() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => None,
            Err(e) => {
                self.state = State::Done;
                Some(Err(e))
            }
        }
    }
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(String::from)
}

/// One reporting structure → its in-network files plus any allowed-amount file
fn expand_reporting_structure(structure: &Value, index: usize) -> Vec<MrfFile> {
    let plan_name =
        str_field(structure, "plan_name").unwrap_or_else(|| format!("plan_{index}"));
    let plan_id = str_field(structure, "plan_id");
    let plan_market_type = str_field(structure, "plan_market_type");

    // The structure-level provider reference file applies to every
    // in-network file it names.
    let provider_reference_url = structure
        .get("provider_references")
        .and_then(Value::as_array)
        .and_then(|refs| refs.iter().find_map(|r| str_field(r, "location")));

    let mut entries = Vec::new();

    if let Some(files) = structure.get("in_network_files").and_then(Value::as_array) {
        for (file_index, file) in files.iter().enumerate() {
            let Some(url) = str_field(file, "location") else {
                continue;
            };
            entries.push(MrfFile {
                url,
                kind: MrfFileKind::InNetworkRates,
                plan_name: plan_name.clone(),
                plan_id: plan_id.clone(),
                plan_market_type: plan_market_type.clone(),
                description: str_field(file, "description").unwrap_or_default(),
                reporting_structure_index: index,
                file_index,
                provider_reference_url: provider_reference_url.clone(),
            });
        }
    }

    if let Some(allowed) = structure.get("allowed_amount_file") {
        if let Some(url) = str_field(allowed, "location") {
            entries.push(MrfFile {
                url,
                kind: MrfFileKind::AllowedAmounts,
                plan_name: plan_name.clone(),
                plan_id,
                plan_market_type,
                description: str_field(allowed, "description").unwrap_or_default(),
                reporting_structure_index: index,
                file_index: 0,
                provider_reference_url: None,
            });
        }
    }

    entries
}

fn expand_blob(blob: &Value, index: usize) -> Option<MrfFile> {
    let url = str_field(blob, "url")?;
    Some(MrfFile {
        url,
        kind: MrfFileKind::Unknown,
        plan_name: str_field(blob, "name").unwrap_or_else(|| format!("blob_{index}")),
        plan_id: None,
        plan_market_type: None,
        description: str_field(blob, "description").unwrap_or_default(),
        reporting_structure_index: 0,
        file_index: index,
        provider_reference_url: None,
    })
}

fn expand_direct_file(file: &Value, index: usize) -> Option<MrfFile> {
    let url = str_field(file, "location")?;
    let description = str_field(file, "description").unwrap_or_default();
    Some(MrfFile {
        url,
        kind: MrfFileKind::InNetworkRates,
        plan_name: if description.is_empty() {
            format!("file_{index}")
        } else {
            description.clone()
        },
        plan_id: None,
        plan_market_type: None,
        description,
        reporting_structure_index: 0,
        file_index: index,
        provider_reference_url: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(input: &str) -> (Vec<MrfFile>, TocShape) {
        let mut reader = TocReader::new(input.as_bytes());
        let files: Vec<MrfFile> = reader.by_ref().map(|r| r.unwrap()).collect();
        (files, reader.shape())
    }

    #[test]
    fn test_standard_toc() {
        let (files, shape) = entries(
            r#"{
                "reporting_entity_name": "Example Health",
                "reporting_structure": [
                    {
                        "plan_name": "PPO Standard",
                        "plan_id": "H1234",
                        "plan_market_type": "group",
                        "in_network_files": [
                            {"location": "https://x/a.json.gz", "description": "rates a"},
                            {"location": "https://x/b.json.gz", "description": "rates b"}
                        ],
                        "provider_references": [{"location": "https://x/providers.json"}],
                        "allowed_amount_file": {"location": "https://x/allowed.json"}
                    },
                    {
                        "in_network_files": [{"location": "https://x/c.json"}]
                    }
                ]
            }"#,
        );

        assert_eq!(shape, TocShape::ReportingStructure);
        assert_eq!(files.len(), 4);
        assert_eq!(files[0].url, "https://x/a.json.gz");
        assert_eq!(files[0].plan_name, "PPO Standard");
        assert_eq!(files[0].kind, MrfFileKind::InNetworkRates);
        assert_eq!(
            files[0].provider_reference_url.as_deref(),
            Some("https://x/providers.json")
        );
        assert_eq!(files[1].file_index, 1);
        assert_eq!(files[2].kind, MrfFileKind::AllowedAmounts);
        assert_eq!(files[3].plan_name, "plan_1");
        assert_eq!(files[3].reporting_structure_index, 1);
    }

    #[test]
    fn test_legacy_blobs() {
        let (files, shape) = entries(
            r#"{"blobs": [
                {"url": "https://x/blob1.json", "name": "north region"},
                {"note": "no url, skipped"},
                {"url": "https://x/blob2.json"}
            ]}"#,
        );
        assert_eq!(shape, TocShape::LegacyBlobs);
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].plan_name, "north region");
        assert_eq!(files[0].kind, MrfFileKind::Unknown);
        assert_eq!(files[1].plan_name, "blob_2");
    }

    #[test]
    fn test_direct_file_list() {
        let (files, shape) = entries(
            r#"{"in_network_files": [
                {"location": "https://x/only.json.gz", "description": "everything"}
            ]}"#,
        );
        assert_eq!(shape, TocShape::DirectFileList);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].plan_name, "everything");
    }

    #[test]
    fn test_direct_rates_endpoint_detected() {
        let (files, shape) = entries(r#"{"in_network": [{"billing_code": "99213"}]}"#);
        assert!(files.is_empty());
        assert_eq!(shape, TocShape::DirectRates);
    }

    #[test]
    fn test_malformed_index_is_error() {
        let mut reader = TocReader::new(&b"[1, 2]"[..]);
        assert!(reader.next().unwrap().is_err());
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_unknown_keys_skipped() {
        let (files, shape) = entries(
            r#"{
                "version": "1.0.0",
                "metadata": {"nested": [1, 2, {"deep": true}]},
                "reporting_structure": [
                    {"plan_name": "P", "in_network_files": [{"location": "https://x/a.json"}]}
                ]
            }"#,
        );
        assert_eq!(shape, TocShape::ReportingStructure);
        assert_eq!(files.len(), 1);
    }
}
