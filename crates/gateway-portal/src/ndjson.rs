//! NDJSON framer (C2): turns a buffered response body into a vec of typed
//! records, the same `parse_ndjson` shape the Portal client used to lean on,
//! generalized with the size limits a production stream needs.

use gateway_core::GatewayError;
use serde::de::DeserializeOwned;

use crate::metrics::NDJSON_LINES_TOTAL;

/// Decodes an NDJSON body into `Vec<T>`, enforcing `max_line_bytes` (a single
/// line) and `max_bytes` (the whole payload). A missing trailing newline on
/// the final record is fine; blank/whitespace-only lines are skipped and
/// don't count as records.
pub fn parse_ndjson<T: DeserializeOwned>(
    body: &str,
    max_line_bytes: usize,
    max_bytes: usize,
) -> Result<Vec<T>, GatewayError> {
    if body.len() > max_bytes {
        return Err(GatewayError::ServerError(format!("ndjson exceeds max bytes ({max_bytes})")));
    }

    let mut out = Vec::new();
    for line in body.lines() {
        if line.trim().is_empty() {
            continue;
        }
        if line.len() > max_line_bytes {
            return Err(GatewayError::ServerError(format!(
                "ndjson line exceeds max bytes ({max_line_bytes})"
            )));
        }
        let record: T = serde_json::from_str(line)
            .map_err(|e| GatewayError::ServerError(format!("malformed ndjson line: {e}")))?;
        out.push(record);
        NDJSON_LINES_TOTAL.inc();
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Row {
        n: u64,
    }

    #[test]
    fn parses_newline_delimited_records() {
        let body = "{\"n\":1}\n{\"n\":2}\n";
        let rows: Vec<Row> = parse_ndjson(body, 1024, 1024).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].n, 1);
    }

    #[test]
    fn skips_blank_lines() {
        let body = "\n\n{\"n\":5}\n\n";
        let rows: Vec<Row> = parse_ndjson(body, 1024, 1024).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].n, 5);
    }

    #[test]
    fn accepts_missing_trailing_newline() {
        let body = "{\"n\":1}\n{\"n\":2}";
        let rows: Vec<Row> = parse_ndjson(body, 1024, 1024).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn rejects_oversized_line() {
        let body = "{\"n\":1}\n";
        let err = parse_ndjson::<Row>(body, 5, 1024).unwrap_err();
        assert!(err.to_string().contains("ndjson line exceeds max bytes (5)"));
    }

    #[test]
    fn rejects_oversized_payload() {
        let body = "{\"n\":1}\n";
        let err = parse_ndjson::<Row>(body, 1024, 4).unwrap_err();
        assert!(err.to_string().contains("ndjson exceeds max bytes (4)"));
    }

    #[test]
    fn malformed_json_fails_whole_stream() {
        let body = "{\"n\":1}\nnot json\n";
        assert!(parse_ndjson::<Row>(body, 1024, 1024).is_err());
    }

    #[test]
    fn empty_input_yields_empty_vec() {
        let rows: Vec<Row> = parse_ndjson(body_empty(), 1024, 1024).unwrap();
        assert!(rows.is_empty());
    }

    fn body_empty() -> &'static str {
        ""
    }
}
