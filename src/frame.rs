//! Length+CRC framed binary serialisation of page position records.
//!
//! One frame holds one [`DocPageLocations`]. The wire layout is fixed and
//! little-endian throughout:
//!
//! ```text
//! size: u32  crc: u32  payload...
//!
//! payload = doc: u64, page: u32, count: u32,
//!           count x { start: u32, llx: f32, lly: f32, urx: f32, ury: f32 }
//! ```
//!
//! Serialisation is deterministic: the run vector is written in order, so
//! two encodes of equal inputs produce identical bytes. The CRC (crc32fast,
//! IEEE polynomial) covers the payload only and is verified on every read.

use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};

use crate::error::{PinpointError, Result};
use crate::locations::{DocPageLocations, TextLocation};

/// Version of the frame byte layout, recorded in the store manifest.
pub const FORMAT_VERSION: u8 = 1;

/// Bytes per serialised run: start + 4 box coordinates.
const LOCATION_SIZE: usize = 4 + 4 * 4;

/// Fixed payload prefix: doc (u64) + page (u32) + count (u32).
const PAYLOAD_PREFIX: usize = 8 + 4 + 4;

/// Location of one frame in a document's data file. One header per page;
/// the sidecar file is the JSON array of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameHeader {
    /// Offset of the frame start (the size field) in the data file.
    #[serde(rename = "Offset")]
    pub offset: u32,
    /// Size of the payload in bytes.
    #[serde(rename = "Size")]
    pub size: u32,
    /// CRC-32 of the payload.
    #[serde(rename = "Check")]
    pub check: u32,
    /// PDF page number (1-based).
    #[serde(rename = "PageNum")]
    pub page_num: u32,
}

/// Encode `dpl` as a frame payload.
pub fn encode(dpl: &DocPageLocations) -> Vec<u8> {
    let mut buf = Vec::with_capacity(PAYLOAD_PREFIX + dpl.locations.len() * LOCATION_SIZE);
    // Writes into a Vec cannot fail.
    buf.write_u64::<LittleEndian>(dpl.doc).unwrap();
    buf.write_u32::<LittleEndian>(dpl.page).unwrap();
    buf.write_u32::<LittleEndian>(dpl.locations.len() as u32)
        .unwrap();
    for loc in &dpl.locations {
        buf.write_u32::<LittleEndian>(loc.start).unwrap();
        buf.write_f32::<LittleEndian>(loc.llx).unwrap();
        buf.write_f32::<LittleEndian>(loc.lly).unwrap();
        buf.write_f32::<LittleEndian>(loc.urx).unwrap();
        buf.write_f32::<LittleEndian>(loc.ury).unwrap();
    }
    buf
}

/// Decode a frame payload back into a [`DocPageLocations`].
pub fn decode(buf: &[u8]) -> Result<DocPageLocations> {
    if buf.len() < PAYLOAD_PREFIX {
        return Err(PinpointError::bad_format(format!(
            "frame payload too short: {} bytes",
            buf.len()
        )));
    }
    let mut cursor = Cursor::new(buf);
    let doc = cursor.read_u64::<LittleEndian>()?;
    let page = cursor.read_u32::<LittleEndian>()?;
    let count = cursor.read_u32::<LittleEndian>()? as usize;
    if buf.len() != PAYLOAD_PREFIX + count * LOCATION_SIZE {
        return Err(PinpointError::bad_format(format!(
            "frame payload size mismatch: {} bytes for {count} locations",
            buf.len()
        )));
    }
    let mut locations = Vec::with_capacity(count);
    for _ in 0..count {
        locations.push(TextLocation {
            start: cursor.read_u32::<LittleEndian>()?,
            end: 0,
            llx: cursor.read_f32::<LittleEndian>()?,
            lly: cursor.read_f32::<LittleEndian>()?,
            urx: cursor.read_f32::<LittleEndian>()?,
            ury: cursor.read_f32::<LittleEndian>()?,
        });
    }
    Ok(DocPageLocations {
        doc,
        page,
        locations,
    })
}

/// Write one frame at the writer's current position and return its header.
pub fn write<W: Write + Seek>(writer: &mut W, dpl: &DocPageLocations) -> Result<FrameHeader> {
    let payload = encode(dpl);
    let check = crc32fast::hash(&payload);
    let offset = writer.stream_position()?;
    writer.write_u32::<LittleEndian>(payload.len() as u32)?;
    writer.write_u32::<LittleEndian>(check)?;
    writer.write_all(&payload)?;
    Ok(FrameHeader {
        offset: offset as u32,
        size: payload.len() as u32,
        check,
        page_num: dpl.page,
    })
}

/// Read the frame described by `header`, validate its CRC and decode it.
pub fn read_at<R: Read + Seek>(reader: &mut R, header: &FrameHeader) -> Result<DocPageLocations> {
    reader.seek(SeekFrom::Start(header.offset as u64))?;
    let size = reader.read_u32::<LittleEndian>()?;
    let check = reader.read_u32::<LittleEndian>()?;
    if size != header.size || check != header.check {
        return Err(PinpointError::bad_format(format!(
            "frame header mismatch at offset {}: size {size} vs {}, crc {check:08x} vs {:08x}",
            header.offset, header.size, header.check
        )));
    }
    let mut payload = vec![0u8; size as usize];
    reader.read_exact(&mut payload)?;
    if crc32fast::hash(&payload) != check {
        return Err(PinpointError::BadChecksum);
    }
    decode(&payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_dpl() -> DocPageLocations {
        DocPageLocations {
            doc: 3,
            page: 7,
            locations: vec![
                TextLocation {
                    start: 0,
                    end: 0,
                    llx: 10.0,
                    lly: 100.0,
                    urx: 50.0,
                    ury: 120.0,
                },
                TextLocation {
                    start: 6,
                    end: 0,
                    llx: 55.5,
                    lly: 100.0,
                    urx: 80.25,
                    ury: 120.0,
                },
            ],
        }
    }

    #[test]
    fn test_round_trip() {
        let dpl = sample_dpl();
        let payload = encode(&dpl);
        let decoded = decode(&payload).unwrap();
        assert_eq!(decoded, dpl);
        // Determinism: equal inputs, identical bytes.
        assert_eq!(payload, encode(&decoded));
    }

    #[test]
    fn test_empty_page_round_trip() {
        let dpl = DocPageLocations::new(0, 1);
        let decoded = decode(&encode(&dpl)).unwrap();
        assert_eq!(decoded, dpl);
    }

    #[test]
    fn test_write_then_read_at() {
        let dpl = sample_dpl();
        let mut buf = Cursor::new(Vec::new());
        let header = write(&mut buf, &dpl).unwrap();
        assert_eq!(header.offset, 0);
        assert_eq!(header.page_num, 7);

        let read_back = read_at(&mut buf, &header).unwrap();
        assert_eq!(read_back, dpl);
    }

    #[test]
    fn test_second_frame_offset() {
        let mut buf = Cursor::new(Vec::new());
        let h1 = write(&mut buf, &sample_dpl()).unwrap();
        let h2 = write(&mut buf, &DocPageLocations::new(3, 8)).unwrap();
        assert_eq!(h2.offset, h1.offset + 8 + h1.size);
        assert_eq!(read_at(&mut buf, &h2).unwrap().page, 8);
        assert_eq!(read_at(&mut buf, &h1).unwrap().page, 7);
    }

    #[test]
    fn test_bit_flip_fails_checksum() {
        let dpl = sample_dpl();
        let mut buf = Cursor::new(Vec::new());
        let header = write(&mut buf, &dpl).unwrap();

        let mut bytes = buf.into_inner();
        // Flip one bit in every payload byte position in turn.
        for i in 8..bytes.len() {
            bytes[i] ^= 0x01;
            let mut corrupted = Cursor::new(bytes.clone());
            match read_at(&mut corrupted, &header) {
                Err(PinpointError::BadChecksum) => {}
                other => panic!("expected BadChecksum at byte {i}, got {other:?}"),
            }
            bytes[i] ^= 0x01;
        }
    }

    #[test]
    fn test_decode_truncated_payload() {
        let payload = encode(&sample_dpl());
        match decode(&payload[..payload.len() - 1]) {
            Err(PinpointError::BadFormat(_)) => {}
            other => panic!("expected BadFormat, got {other:?}"),
        }
    }
}
