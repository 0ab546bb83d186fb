//! Streaming parser integration tests
//!
//! Exercises the in-network reader over gzipped streams the way the
//! pipeline does: through the fetch layer's reader adapter, one item at a
//! time, including a synthesized many-item stream that would be painful to
//! hold in memory all at once if the parser buffered the root array.

use flate2::write::GzEncoder;
use flate2::Compression;
use prism::stream::{extract_provider_references, InNetworkReader, TocReader, TocShape};
use std::io::Write;

fn gz(body: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(body).unwrap();
    encoder.finish().unwrap()
}

fn item_json(code_index: u32, rate: f64) -> String {
    format!(
        r#"{{
            "billing_code": "{:05}",
            "billing_code_type": "CPT",
            "description": "synthesized item",
            "negotiated_rates": [{{
                "provider_groups": [{{
                    "npi": ["1234567893"],
                    "tin": {{"type": "ein", "value": "12-3456789"}}
                }}],
                "negotiated_prices": [{{
                    "negotiated_rate": {rate},
                    "service_code": ["11"],
                    "billing_class": "professional"
                }}]
            }}]
        }}"#,
        code_index
    )
}

#[test]
fn test_large_gzipped_stream_yields_every_item() {
    const ITEMS: u32 = 5_000;

    let mut body = String::from(r#"{"reporting_entity_name": "Synthetic Health", "in_network": ["#);
    for i in 0..ITEMS {
        if i > 0 {
            body.push(',');
        }
        body.push_str(&item_json(i, 10.0 + i as f64));
    }
    body.push_str("]}");
    let compressed = gz(body.as_bytes());

    let decoder = flate2::read::GzDecoder::new(&compressed[..]);
    let mut count = 0u32;
    for item in InNetworkReader::new(decoder) {
        let item = item.unwrap();
        assert_eq!(item.billing_code, format!("{:05}", count));
        assert_eq!(
            item.negotiated_rates[0].negotiated_prices[0].negotiated_rate,
            Some(10.0 + count as f64)
        );
        count += 1;
    }
    assert_eq!(count, ITEMS);
}

#[test]
fn test_source_order_preserved() {
    let body = format!(
        r#"{{"in_network": [{}, {}, {}]}}"#,
        item_json(3, 30.0),
        item_json(1, 10.0),
        item_json(2, 20.0)
    );
    let codes: Vec<String> = InNetworkReader::new(body.as_bytes())
        .map(|r| r.unwrap().billing_code)
        .collect();
    assert_eq!(codes, vec!["00003", "00001", "00002"]);
}

#[test]
fn test_mid_item_truncation_reports_offset_and_keeps_prior_items() {
    let body = format!(
        r#"{{"in_network": [{}, {}]}}"#,
        item_json(1, 10.0),
        item_json(2, 20.0)
    );
    // Cut inside the second item.
    let cut = body.len() - 40;
    let mut reader = InNetworkReader::new(&body.as_bytes()[..cut]);

    let first = reader.next().unwrap().unwrap();
    assert_eq!(first.billing_code, "00001");

    let err = reader.next().unwrap().unwrap_err();
    assert!(err.offset > 0);
    assert!(err.offset <= cut as u64);
    assert!(reader.next().is_none());
}

#[test]
fn test_provider_references_after_in_network_still_found() {
    // Key order is not guaranteed by the CMS schema.
    let body = format!(
        r#"{{
            "in_network": [{}],
            "provider_references": [{{
                "provider_group_id": 42,
                "provider_groups": [{{"npi": ["1679576722"], "tin": {{"type": "ein", "value": "98-7654321"}}}}]
            }}]
        }}"#,
        item_json(1, 10.0)
    );
    let map = extract_provider_references(body.as_bytes()).unwrap();
    assert_eq!(map.len(), 1);
    assert_eq!(map[&42][0].npi, vec!["1679576722"]);
}

#[test]
fn test_toc_detection_against_gzipped_index() {
    let toc = r#"{
        "reporting_structure": [{
            "plan_name": "HMO",
            "in_network_files": [{"location": "https://x/r.json.gz"}]
        }]
    }"#;
    let compressed = gz(toc.as_bytes());
    let decoder = flate2::read::GzDecoder::new(&compressed[..]);

    let mut reader = TocReader::new(decoder);
    let files: Vec<_> = reader.by_ref().map(|r| r.unwrap()).collect();
    assert_eq!(reader.shape(), TocShape::ReportingStructure);
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].url, "https://x/r.json.gz");
}
