//! Reads `.eml` files and parses their RFC 5322 header block
//!
//! The raw bytes are never modified; only the header block is parsed, and
//! only to pick out `Message-ID` and `Date`.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{ImportError, Result};
use crate::models::{DateSource, ParsedMessage};

/// Read and parse one file
pub async fn load_message(path: &Path) -> Result<ParsedMessage> {
    let unreadable = |source| ImportError::UnreadableFile {
        path: path.to_path_buf(),
        source,
    };

    let raw = tokio::fs::read(path).await.map_err(unreadable)?;
    let modified = match tokio::fs::metadata(path).await.and_then(|m| m.modified()) {
        Ok(time) => Some(DateTime::<Utc>::from(time)),
        Err(e) => {
            warn!("No modification time for {}: {}", path.display(), e);
            None
        }
    };

    parse_message(path.to_path_buf(), raw, modified)
}

/// Parse already-read bytes; `modified` is the fallback internal date
pub fn parse_message(
    path: PathBuf,
    raw: Vec<u8>,
    modified: Option<DateTime<Utc>>,
) -> Result<ParsedMessage> {
    let boundary = header_block_len(&raw).ok_or_else(|| {
        ImportError::MalformedMessage("no blank line between headers and body".to_string())
    })?;

    validate_header_lines(&raw[..boundary])?;

    let (parsed, _) = mailparse::parse_headers(&raw[..boundary])
        .map_err(|e| ImportError::MalformedMessage(format!("unparsable headers: {}", e)))?;

    if parsed.is_empty() {
        return Err(ImportError::MalformedMessage("empty header block".to_string()));
    }

    let mut headers = HashMap::with_capacity(parsed.len());
    for header in &parsed {
        // Later occurrences overwrite earlier ones
        headers.insert(header.get_key().to_ascii_lowercase(), header.get_value());
    }

    let (internal_date, date_source) = match headers.get("date").and_then(|d| parse_date(d)) {
        Some(date) => (date, DateSource::Header),
        None => {
            debug!(
                "No usable Date header in {}, falling back to file time",
                path.display()
            );
            (modified.unwrap_or_else(Utc::now), DateSource::FileModified)
        }
    };

    Ok(ParsedMessage::new(
        path,
        raw,
        headers,
        internal_date,
        date_source,
    ))
}

/// Byte length of the header block including the terminating blank line
///
/// `None` when no blank line exists, or when the first line is blank (no headers).
fn header_block_len(raw: &[u8]) -> Option<usize> {
    let mut line_start = 0;
    while line_start < raw.len() {
        let line_end = raw[line_start..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|offset| line_start + offset + 1)?;

        let line = &raw[line_start..line_end];
        if line == b"\n" || line == b"\r\n" {
            return if line_start == 0 { None } else { Some(line_end) };
        }
        line_start = line_end;
    }
    None
}

/// Reject header blocks mailparse would otherwise accept leniently
///
/// Every unfolded line needs a `name:` prefix where the name is non-empty
/// printable ASCII; whitespace before the colon is tolerated.
fn validate_header_lines(block: &[u8]) -> Result<()> {
    let malformed = |number: usize, reason: &str| {
        Err(ImportError::MalformedMessage(format!(
            "header line {}: {}",
            number, reason
        )))
    };

    for (index, line) in block.split(|&b| b == b'\n').enumerate() {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            continue;
        }
        let number = index + 1;

        if line[0] == b' ' || line[0] == b'\t' {
            if index == 0 {
                return malformed(number, "continuation line before any header");
            }
            continue;
        }

        let Some(colon) = line.iter().position(|&b| b == b':') else {
            return malformed(number, "missing ':' separator");
        };
        let name = &line[..colon];
        let name = &name[..name
            .iter()
            .rposition(|b| !b.is_ascii_whitespace())
            .map_or(0, |last| last + 1)];
        if name.is_empty() {
            return malformed(number, "empty field name");
        }
        if !name.iter().all(|&b| (33..=126).contains(&b)) {
            return malformed(number, "invalid character in field name");
        }
    }
    Ok(())
}

/// Parse a `Date` header value
///
/// RFC 2822 first, then RFC 3339, then mailparse's lenient parser for the
/// legacy formats old mail clients wrote.
pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    DateTime::parse_from_rfc2822(value)
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            mailparse::dateparse(value)
                .ok()
                .and_then(|secs| DateTime::from_timestamp(secs, 0))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn parse(raw: &str) -> Result<ParsedMessage> {
        parse_message(PathBuf::from("t.eml"), raw.as_bytes().to_vec(), None)
    }

    #[test]
    fn test_parses_headers_and_keeps_raw_bytes() {
        let raw = "Message-ID: <a@b>\r\nSubject: Hello\r\nDate: Tue, 01 Jan 2019 10:00:00 +0000\r\n\r\nBody\r\n";
        let msg = parse(raw).unwrap();

        assert_eq!(msg.raw_bytes, raw.as_bytes());
        assert_eq!(msg.header("message-id"), Some("<a@b>"));
        assert_eq!(msg.header("Subject"), Some("Hello"));
        assert_eq!(msg.date_source, DateSource::Header);
        assert_eq!(
            msg.internal_date,
            Utc.with_ymd_and_hms(2019, 1, 1, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_last_header_occurrence_wins() {
        let msg = parse("X-Tag: first\nx-tag: second\n\nbody").unwrap();
        assert_eq!(msg.header("X-Tag"), Some("second"));
        assert_eq!(msg.header("x-tag"), Some("second"));
    }

    #[test]
    fn test_missing_separator_is_malformed() {
        let err = parse("Subject: no body separator\r\nFrom: a@b").unwrap_err();
        assert!(matches!(err, ImportError::MalformedMessage(_)));
    }

    #[test]
    fn test_header_line_without_colon_is_malformed() {
        let err = parse("garbage without headers\n\nbody").unwrap_err();
        assert!(matches!(err, ImportError::MalformedMessage(ref m) if m.contains("missing ':'")));

        let err = parse("Subject: ok\r\nnot a header\r\n\r\nbody").unwrap_err();
        assert!(matches!(err, ImportError::MalformedMessage(ref m) if m.contains("line 2")));
    }

    #[test]
    fn test_empty_field_name_is_malformed() {
        let err = parse(": value\n\n").unwrap_err();
        assert!(matches!(err, ImportError::MalformedMessage(ref m) if m.contains("empty field name")));
    }

    #[test]
    fn test_field_name_with_spaces_is_malformed() {
        let err = parse("From someone Mon Jan  1 10:00:00 2019\nSubject: x\n\n").unwrap_err();
        assert!(matches!(err, ImportError::MalformedMessage(_)));
    }

    #[test]
    fn test_folded_lines_and_space_before_colon_are_accepted() {
        let msg = parse("Subject : hello\r\n\tworld\r\nX-A: 1\r\n\r\nbody").unwrap();
        assert!(msg.header("X-A").is_some());

        assert!(matches!(
            parse(" leading fold: x\n\n"),
            Err(ImportError::MalformedMessage(_))
        ));
    }

    #[test]
    fn test_leading_blank_line_is_malformed() {
        assert!(matches!(
            parse("\r\nSubject: late\r\n\r\n"),
            Err(ImportError::MalformedMessage(_))
        ));
        assert!(matches!(parse(""), Err(ImportError::MalformedMessage(_))));
    }

    #[test]
    fn test_unparsable_date_falls_back_to_mtime() {
        let mtime = Utc.with_ymd_and_hms(2020, 5, 6, 7, 8, 9).unwrap();
        let msg = parse_message(
            PathBuf::from("t.eml"),
            b"Date: sometime last week\n\nbody".to_vec(),
            Some(mtime),
        )
        .unwrap();

        assert_eq!(msg.date_source, DateSource::FileModified);
        assert_eq!(msg.internal_date, mtime);
    }

    #[test]
    fn test_missing_date_falls_back_to_mtime() {
        let mtime = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        let msg =
            parse_message(PathBuf::from("t.eml"), b"Subject: x\n\n".to_vec(), Some(mtime)).unwrap();
        assert_eq!(msg.date_source, DateSource::FileModified);
        assert_eq!(msg.internal_date, mtime);
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = Utc.with_ymd_and_hms(2019, 1, 1, 10, 0, 0).unwrap();
        assert_eq!(parse_date("Tue, 01 Jan 2019 10:00:00 +0000"), Some(expected));
        assert_eq!(parse_date("Tue, 1 Jan 2019 11:00:00 +0100"), Some(expected));
        assert_eq!(parse_date("2019-01-01T10:00:00Z"), Some(expected));
        assert_eq!(parse_date("not a date"), None);
    }

    #[tokio::test]
    async fn test_load_message_reads_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("m.eml");
        tokio::fs::write(&path, "Message-ID: <x@y>\n\nhello").await.unwrap();

        let msg = load_message(&path).await.unwrap();
        assert_eq!(msg.path, path);
        assert_eq!(msg.header("Message-ID"), Some("<x@y>"));
        assert_eq!(msg.date_source, DateSource::FileModified);
    }

    #[tokio::test]
    async fn test_load_missing_file_is_unreadable() {
        let dir = TempDir::new().unwrap();
        let err = load_message(&dir.path().join("gone.eml")).await.unwrap_err();
        assert!(matches!(err, ImportError::UnreadableFile { .. }));
        assert!(!err.is_fatal());
    }

    proptest! {
        #[test]
        fn prop_body_bytes_are_preserved(body in proptest::collection::vec(any::<u8>(), 0..256)) {
            let mut raw = b"Message-ID: <p@q>\r\n\r\n".to_vec();
            raw.extend_from_slice(&body);

            let msg = parse_message(PathBuf::from("p.eml"), raw.clone(), None).unwrap();
            prop_assert_eq!(msg.raw_bytes, raw);
        }
    }
}
