use common::Record;
use errors::{CodecError, ConfigError, Result};
use log::{error, warn};
use serde::Deserialize;
use serde_json::Value;
use std::io::Read;
use std::str::FromStr;

/// Wire format, selectable independently per direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protocol {
    #[default]
    Ndjson,
    Msgpack,
}

impl FromStr for Protocol {
    type Err = errors::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "ndjson" => Ok(Protocol::Ndjson),
            "msgpack" => Ok(Protocol::Msgpack),
            other => Err(ConfigError::Invalid(format!("unknown protocol: {other}")).into()),
        }
    }
}

/// Incremental frame decoder.
///
/// Feed arbitrary byte chunks with [`push`](Decoder::push); complete records
/// come back normalized. Malformed input is logged and skipped, never fatal:
/// a bad NDJSON line is dropped whole, a bad MessagePack prefix is resynced
/// one byte at a time.
#[derive(Debug, Default)]
pub struct Decoder {
    protocol: Protocol,
    buf: Vec<u8>,
}

impl Decoder {
    pub fn new(protocol: Protocol) -> Decoder {
        Decoder {
            protocol,
            buf: Vec::new(),
        }
    }

    pub fn push(&mut self, bytes: &[u8]) -> Vec<Record> {
        self.buf.extend_from_slice(bytes);
        match self.protocol {
            Protocol::Ndjson => self.drain_lines(),
            Protocol::Msgpack => self.drain_objects(),
        }
    }

    /// Final decode attempt at EOF: a partial NDJSON line is flushed, a
    /// truncated MessagePack object is reported and dropped.
    pub fn finish(&mut self) -> Option<Record> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buf);
        match self.protocol {
            Protocol::Ndjson => decode_line(&rest),
            Protocol::Msgpack => {
                error!("discarding {} trailing bytes of truncated input", rest.len());
                None
            }
        }
    }

    fn drain_lines(&mut self) -> Vec<Record> {
        let mut records = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            if let Some(record) = decode_line(&line[..pos]) {
                records.push(record);
            }
        }
        records
    }

    fn drain_objects(&mut self) -> Vec<Record> {
        let mut records = Vec::new();
        loop {
            if self.buf.is_empty() {
                break;
            }
            let mut reader = CountingReader {
                data: &self.buf,
                pos: 0,
            };
            let result = {
                let mut de = rmp_serde::Deserializer::new(&mut reader);
                Value::deserialize(&mut de)
            };
            let consumed = reader.pos;
            match result {
                Ok(value) => {
                    self.buf.drain(..consumed);
                    records.push(Record::normalize(value));
                }
                Err(err) if is_incomplete(&err) => break,
                Err(err) => {
                    error!("binary decode failed, resyncing: {err}");
                    self.buf.drain(..1);
                }
            }
        }
        records
    }
}

fn decode_line(line: &[u8]) -> Option<Record> {
    let trimmed = trim_ascii(line);
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_slice::<Value>(trimmed) {
        Ok(value) => Some(Record::normalize(value)),
        Err(err) => {
            warn!("skipping malformed line: {err}");
            None
        }
    }
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map(|i| i + 1)
        .unwrap_or(start);
    &bytes[start..end]
}

fn is_incomplete(err: &rmp_serde::decode::Error) -> bool {
    use rmp_serde::decode::Error as DecodeError;
    match err {
        DecodeError::InvalidMarkerRead(io) | DecodeError::InvalidDataRead(io) => {
            io.kind() == std::io::ErrorKind::UnexpectedEof
        }
        _ => false,
    }
}

struct CountingReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl Read for CountingReader<'_> {
    fn read(&mut self, out: &mut [u8]) -> std::io::Result<usize> {
        let remaining = &self.data[self.pos..];
        let n = remaining.len().min(out.len());
        out[..n].copy_from_slice(&remaining[..n]);
        self.pos += n;
        Ok(n)
    }
}

/// Encodes one record in the given wire format.
pub fn encode(record: &Record, protocol: Protocol) -> Result<Vec<u8>> {
    match protocol {
        Protocol::Ndjson => {
            let mut bytes = serde_json::to_vec(record)
                .map_err(|e| CodecError::Encode(e.to_string()))?;
            bytes.push(b'\n');
            Ok(bytes)
        }
        Protocol::Msgpack => rmp_serde::to_vec_named(record)
            .map_err(|e| CodecError::Encode(e.to_string()).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ndjson_round_trip() {
        let record = Record::normalize(json!({
            "meta": {"timestamp": 1000, "pipeline": ["src"]},
            "data": {"x": 7, "label": "a"}
        }));
        let bytes = encode(&record, Protocol::Ndjson).unwrap();
        assert!(bytes.ends_with(b"\n"));

        let mut decoder = Decoder::new(Protocol::Ndjson);
        let decoded = decoder.push(&bytes);
        assert_eq!(decoded, vec![record]);
    }

    #[test]
    fn test_ndjson_split_across_chunks() {
        let mut decoder = Decoder::new(Protocol::Ndjson);
        assert!(decoder.push(b"{\"data\":{\"a\"").is_empty());
        let records = decoder.push(b":1}}\n{\"data\":{\"a\":2}}\n");
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].data.get("a"), Some(&json!(2)));
    }

    #[test]
    fn test_ndjson_malformed_line_is_skipped() {
        let mut decoder = Decoder::new(Protocol::Ndjson);
        let records = decoder.push(b"{not json\n{\"data\":{\"ok\":true}}\n");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].data.get("ok"), Some(&json!(true)));
    }

    #[test]
    fn test_ndjson_partial_line_flushed_at_eof() {
        let mut decoder = Decoder::new(Protocol::Ndjson);
        assert!(decoder.push(b"{\"data\":{\"a\":1}}").is_empty());
        let record = decoder.finish().unwrap();
        assert_eq!(record.data.get("a"), Some(&json!(1)));
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn test_scalar_line_is_wrapped() {
        let mut decoder = Decoder::new(Protocol::Ndjson);
        let records = decoder.push(b"5\n");
        assert_eq!(records[0].data.get("value"), Some(&json!(5)));
        assert_eq!(records[0].meta.get("pipeline"), Some(&json!([])));
    }

    #[test]
    fn test_msgpack_round_trip_chunked() {
        let record = Record::normalize(json!({
            "meta": {"timestamp": 123},
            "data": {"x": 1.5, "name": "probe"}
        }));
        let bytes = encode(&record, Protocol::Msgpack).unwrap();

        let mut decoder = Decoder::new(Protocol::Msgpack);
        let mid = bytes.len() / 2;
        assert!(decoder.push(&bytes[..mid]).is_empty());
        let decoded = decoder.push(&bytes[mid..]);
        assert_eq!(decoded, vec![record]);
    }

    #[test]
    fn test_msgpack_resyncs_after_garbage() {
        let record = Record::normalize(json!({"data": {"ok": 1}}));
        let good = encode(&record, Protocol::Msgpack).unwrap();

        let mut stream = vec![0xc1]; // reserved marker, never valid
        stream.extend_from_slice(&good);

        let mut decoder = Decoder::new(Protocol::Msgpack);
        let decoded = decoder.push(&stream);
        assert_eq!(decoded, vec![record]);
    }

    #[test]
    fn test_protocol_parse() {
        assert_eq!(Protocol::from_str("ndjson").unwrap(), Protocol::Ndjson);
        assert_eq!(Protocol::from_str("MsgPack").unwrap(), Protocol::Msgpack);
        assert!(Protocol::from_str("xml").is_err());
    }
}
