//! Perfetto trace file reader.
//!
//! A trace file is a `Trace` message: a stream of length-delimited `packet`
//! fields (id 1). Packets are handed out as raw bytes so importers can look at
//! fields the generated bindings don't know about.

use anyhow::{anyhow, bail, Context, Result};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

const TRACE_PACKET_FIELD_NUMBER: u64 = 1;

/// Iterator that streams raw TracePacket bytes from a trace.
///
/// The first error ends the iteration: the stream position is unknown after it.
pub struct TracePacketIterator<R: BufRead> {
    reader: R,
    failed: bool,
}

impl<R: BufRead> TracePacketIterator<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            failed: false,
        }
    }

    /// Read the next tag, or `None` on a clean end of stream.
    fn next_tag(&mut self) -> Result<Option<u64>> {
        if self.reader.fill_buf()?.is_empty() {
            return Ok(None);
        }
        read_varint(&mut self.reader).map(Some)
    }

    fn read_packet(&mut self) -> Option<Result<Vec<u8>>> {
        loop {
            let tag = match self.next_tag() {
                Ok(Some(tag)) => tag,
                Ok(None) => return None,
                Err(e) => return Some(Err(e)),
            };

            let wire_type = (tag & 0x07) as u8;
            let field_number = tag >> 3;

            if field_number == TRACE_PACKET_FIELD_NUMBER && wire_type == 2 {
                let length = match read_varint(&mut self.reader) {
                    Ok(len) => len,
                    Err(e) => return Some(Err(e)),
                };

                // The length is untrusted; let the buffer grow with the data.
                let mut buffer = Vec::new();
                let read = match (&mut self.reader).take(length).read_to_end(&mut buffer) {
                    Ok(read) => read as u64,
                    Err(e) => return Some(Err(e.into())),
                };
                if read != length {
                    return Some(Err(anyhow!(
                        "Truncated trace packet, expected {length} bytes, got {read}"
                    )));
                }
                return Some(Ok(buffer));
            }

            // Skip non-packet fields
            if let Err(e) = skip_field(&mut self.reader, wire_type) {
                return Some(Err(e));
            }
        }
    }
}

impl<R: BufRead> Iterator for TracePacketIterator<R> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let item = self.read_packet();
        if matches!(item, Some(Err(_))) {
            self.failed = true;
        }
        item
    }
}

/// Read a varint from a reader.
pub fn read_varint<R: Read>(reader: &mut R) -> Result<u64> {
    let mut result: u64 = 0;
    let mut shift = 0;
    loop {
        let mut byte = [0u8; 1];
        reader.read_exact(&mut byte)?;
        result |= ((byte[0] & 0x7f) as u64) << shift;
        if byte[0] & 0x80 == 0 {
            break;
        }
        shift += 7;
        if shift >= 64 {
            bail!("Varint too large");
        }
    }
    Ok(result)
}

/// Skip a protobuf field based on its wire type.
pub fn skip_field<R: Read>(reader: &mut R, wire_type: u8) -> Result<()> {
    match wire_type {
        0 => {
            read_varint(reader)?;
        }
        1 => {
            let mut buf = [0u8; 8];
            reader.read_exact(&mut buf)?;
        }
        2 => {
            let len = read_varint(reader)?;
            let skipped = std::io::copy(&mut reader.take(len), &mut std::io::sink())?;
            if skipped != len {
                bail!("Truncated field, expected {len} bytes, got {skipped}");
            }
        }
        5 => {
            let mut buf = [0u8; 4];
            reader.read_exact(&mut buf)?;
        }
        _ => bail!("Unknown wire type: {wire_type}"),
    }
    Ok(())
}

/// Open a Perfetto trace file for reading, handling .gz compression.
pub fn open_trace_reader(path: &Path) -> Result<Box<dyn BufRead + Send>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let reader = BufReader::with_capacity(256 * 1024, file);

    let name = path.file_name().and_then(|s| s.to_str()).unwrap_or("");
    if name.ends_with(".gz") {
        let decoder = GzDecoder::new(reader);
        Ok(Box::new(BufReader::with_capacity(256 * 1024, decoder)))
    } else {
        Ok(Box::new(reader))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{write_bytes_field, write_varint_field};
    use std::io::Cursor;

    fn packets(bytes: Vec<u8>) -> Vec<Result<Vec<u8>>> {
        TracePacketIterator::new(Cursor::new(bytes)).collect()
    }

    #[test]
    fn test_yields_packets_in_order() {
        let mut trace = Vec::new();
        write_bytes_field(&mut trace, 1, b"first");
        write_bytes_field(&mut trace, 1, b"");
        write_bytes_field(&mut trace, 1, b"third");

        let out: Vec<Vec<u8>> = packets(trace).into_iter().map(|p| p.unwrap()).collect();
        assert_eq!(out, vec![b"first".to_vec(), Vec::new(), b"third".to_vec()]);
    }

    #[test]
    fn test_skips_other_fields() {
        let mut trace = Vec::new();
        write_varint_field(&mut trace, 2, 77);
        write_bytes_field(&mut trace, 1, b"packet");
        // Field id above 15 needs a multi-byte tag.
        write_bytes_field(&mut trace, 300, b"ignored");

        let out: Vec<Vec<u8>> = packets(trace).into_iter().map(|p| p.unwrap()).collect();
        assert_eq!(out, vec![b"packet".to_vec()]);
    }

    #[test]
    fn test_empty_trace() {
        assert!(packets(Vec::new()).is_empty());
    }

    #[test]
    fn test_truncated_packet_is_an_error() {
        let mut trace = Vec::new();
        write_bytes_field(&mut trace, 1, b"complete");
        trace.extend_from_slice(&[0x0a, 0x10, 0x01]);

        let out = packets(trace);
        assert_eq!(out.len(), 2);
        assert!(out[0].is_ok());
        assert!(out[1].is_err());
    }

    #[test]
    fn test_huge_length_prefix_is_an_error() {
        let mut trace = vec![0x0a];
        crate::wire::write_varint(&mut trace, 1 << 45);
        trace.extend_from_slice(b"short");

        let out = packets(trace);
        assert_eq!(out.len(), 1);
        let err = out[0].as_ref().unwrap_err();
        assert!(err.to_string().contains("Truncated trace packet"));
    }

    #[test]
    fn test_read_varint() {
        let mut cursor = Cursor::new(vec![0xac, 0x02]);
        assert_eq!(read_varint(&mut cursor).unwrap(), 300);
        assert!(read_varint(&mut Cursor::new(vec![0xff; 11])).is_err());
    }
}
