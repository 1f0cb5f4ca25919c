//! Reader for the perf.data file format.
//!
//! Only what the aggregator consumes is decoded: `MMAP`/`MMAP2` events,
//! `SAMPLE` events carrying branch stacks, and the build-id feature section.
//! Every other record is skipped by its declared size. File-mode traces
//! only; pipe-mode output has no seekable header and is rejected up front.
//! Branch stacks are an x86 feature, so only little-endian producers are
//! accepted.

use crate::domain::errors::TraceError;
use crate::domain::types::Pid;
use crate::profiling::trace::{
    BranchEntry, BuildIdRecord, MmapEvent, SampleEvent, TraceEvent, TraceFile, TraceReader,
};
use byteorder::{ByteOrder, LittleEndian};
use std::path::{Path, PathBuf};

/// "PERFILE2", as the file stores it on a little-endian machine.
const PERF_MAGIC: u64 = 0x32454c_4946_5245_50;
const PERF_MAGIC_SWAPPED: u64 = PERF_MAGIC.swap_bytes();
const HEADER_SIZE: usize = 104;
/// Bytes of a perf_file_attr that trail the perf_event_attr itself.
const ATTR_IDS_SECTION_SIZE: u64 = 16;

const PERF_RECORD_MMAP: u32 = 1;
const PERF_RECORD_SAMPLE: u32 = 9;
const PERF_RECORD_MMAP2: u32 = 10;

/// Feature bit of the build-id table.
const HEADER_BUILD_ID: usize = 2;

const PERF_SAMPLE_IP: u64 = 1 << 0;
const PERF_SAMPLE_TID: u64 = 1 << 1;
const PERF_SAMPLE_TIME: u64 = 1 << 2;
const PERF_SAMPLE_ADDR: u64 = 1 << 3;
const PERF_SAMPLE_READ: u64 = 1 << 4;
const PERF_SAMPLE_CALLCHAIN: u64 = 1 << 5;
const PERF_SAMPLE_ID: u64 = 1 << 6;
const PERF_SAMPLE_CPU: u64 = 1 << 7;
const PERF_SAMPLE_PERIOD: u64 = 1 << 8;
const PERF_SAMPLE_STREAM_ID: u64 = 1 << 9;
const PERF_SAMPLE_RAW: u64 = 1 << 10;
const PERF_SAMPLE_BRANCH_STACK: u64 = 1 << 11;
const PERF_SAMPLE_IDENTIFIER: u64 = 1 << 16;

const PERF_FORMAT_TOTAL_TIME_ENABLED: u64 = 1 << 0;
const PERF_FORMAT_TOTAL_TIME_RUNNING: u64 = 1 << 1;
const PERF_FORMAT_ID: u64 = 1 << 2;
const PERF_FORMAT_GROUP: u64 = 1 << 3;
const PERF_FORMAT_LOST: u64 = 1 << 4;

const PERF_SAMPLE_BRANCH_HW_INDEX: u64 = 1 << 17;

/// Production [`TraceReader`] over perf.data files.
#[derive(Debug, Default)]
pub struct PerfDataReader;

impl TraceReader for PerfDataReader {
    fn load(&self, path: &Path) -> Result<TraceFile, TraceError> {
        let data = std::fs::read(path).map_err(|source| TraceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Parser::new(path, &data).parse()
    }
}

/// Sample layout configuration taken from the first event attribute.
#[derive(Debug, Clone, Copy, Default)]
struct SampleFormat {
    sample_type: u64,
    read_format: u64,
    branch_sample_type: u64,
}

struct Parser<'a> {
    path: &'a Path,
    data: &'a [u8],
}

impl<'a> Parser<'a> {
    fn new(path: &'a Path, data: &'a [u8]) -> Self {
        Parser { path, data }
    }

    fn malformed(&self, what: &'static str, offset: usize) -> TraceError {
        TraceError::Malformed {
            path: self.path.to_path_buf(),
            what,
            offset: offset as u64,
        }
    }

    fn path_buf(&self) -> PathBuf {
        self.path.to_path_buf()
    }

    fn u16(&self, offset: usize, what: &'static str) -> Result<u16, TraceError> {
        self.data
            .get(offset..offset + 2)
            .map(LittleEndian::read_u16)
            .ok_or_else(|| self.malformed(what, offset))
    }

    fn u32(&self, offset: usize, what: &'static str) -> Result<u32, TraceError> {
        self.data
            .get(offset..offset + 4)
            .map(LittleEndian::read_u32)
            .ok_or_else(|| self.malformed(what, offset))
    }

    fn u64(&self, offset: usize, what: &'static str) -> Result<u64, TraceError> {
        self.data
            .get(offset..offset + 8)
            .map(LittleEndian::read_u64)
            .ok_or_else(|| self.malformed(what, offset))
    }

    fn bytes(
        &self,
        offset: usize,
        len: usize,
        what: &'static str,
    ) -> Result<&'a [u8], TraceError> {
        self.data
            .get(offset..offset + len)
            .ok_or_else(|| self.malformed(what, offset))
    }

    fn parse(&self) -> Result<TraceFile, TraceError> {
        let magic = self.u64(0, "file header")?;
        if magic == PERF_MAGIC_SWAPPED {
            return Err(TraceError::BigEndian {
                path: self.path_buf(),
            });
        }
        if magic != PERF_MAGIC {
            return Err(TraceError::BadMagic {
                path: self.path_buf(),
            });
        }
        let header_size = self.u64(8, "file header")?;
        if header_size != HEADER_SIZE as u64 {
            return Err(self.malformed("file header", 8));
        }
        let attr_size = self.u64(16, "file header")?;
        let attrs_offset = self.u64(24, "file header")?;
        let attrs_size = self.u64(32, "file header")?;
        let data_offset = self.u64(40, "file header")?;
        let data_size = self.u64(48, "file header")?;
        // 56..72 is the obsolete event_types section.
        let features = [
            self.u64(72, "file header")?,
            self.u64(80, "file header")?,
            self.u64(88, "file header")?,
            self.u64(96, "file header")?,
        ];

        let format = self.first_attr(attrs_offset, attrs_size, attr_size)?;
        let events = self.parse_events(data_offset, data_size, format)?;
        let build_ids = self.parse_build_ids(data_offset + data_size, features)?;

        Ok(TraceFile { events, build_ids })
    }

    /// The sample layout is driven by the first attribute; perf refuses to
    /// mix attributes with different sample types in one file.
    fn first_attr(
        &self,
        offset: u64,
        size: u64,
        attr_size: u64,
    ) -> Result<SampleFormat, TraceError> {
        if size == 0 {
            return Ok(SampleFormat::default());
        }
        if attr_size < ATTR_IDS_SECTION_SIZE + 40 || size < attr_size {
            return Err(self.malformed("attr section", offset as usize));
        }
        let attr_len = (attr_size - ATTR_IDS_SECTION_SIZE) as usize;
        let base = offset as usize;
        let sample_type = self.u64(base + 24, "event attr")?;
        let read_format = self.u64(base + 32, "event attr")?;
        let branch_sample_type = if attr_len >= 80 {
            self.u64(base + 72, "event attr")?
        } else {
            0
        };
        Ok(SampleFormat {
            sample_type,
            read_format,
            branch_sample_type,
        })
    }

    fn parse_events(
        &self,
        offset: u64,
        size: u64,
        format: SampleFormat,
    ) -> Result<Vec<TraceEvent>, TraceError> {
        let mut events = Vec::new();
        let mut pos = offset as usize;
        let end = (offset + size) as usize;
        while pos + 8 <= end {
            let record_type = self.u32(pos, "record header")?;
            let record_size = self.u16(pos + 6, "record header")? as usize;
            if record_size < 8 || pos + record_size > end {
                return Err(self.malformed("record header", pos));
            }
            let payload = self.bytes(pos + 8, record_size - 8, "record payload")?;
            match record_type {
                PERF_RECORD_MMAP => {
                    if let Some(event) = parse_mmap(payload) {
                        events.push(TraceEvent::Mmap(event));
                    } else {
                        return Err(self.malformed("mmap record", pos));
                    }
                }
                PERF_RECORD_MMAP2 => {
                    if let Some(event) = parse_mmap2(payload) {
                        events.push(TraceEvent::Mmap(event));
                    } else {
                        return Err(self.malformed("mmap2 record", pos));
                    }
                }
                PERF_RECORD_SAMPLE => match parse_sample(payload, format) {
                    Ok(Some(event)) => events.push(TraceEvent::Sample(event)),
                    Ok(None) => {}
                    Err(()) => return Err(self.malformed("sample record", pos)),
                },
                _ => {}
            }
            pos += record_size;
        }
        Ok(events)
    }

    /// The feature sections sit right after the data section, one
    /// `(offset, size)` pair per set feature bit, in bit order.
    fn parse_build_ids(
        &self,
        feature_table: u64,
        features: [u64; 4],
    ) -> Result<Vec<BuildIdRecord>, TraceError> {
        let mut table_pos = feature_table as usize;
        let mut section = None;
        for bit in 0..256 {
            if features[bit / 64] >> (bit % 64) & 1 == 0 {
                continue;
            }
            let offset = self.u64(table_pos, "feature table")?;
            let size = self.u64(table_pos + 8, "feature table")?;
            table_pos += 16;
            if bit == HEADER_BUILD_ID {
                section = Some((offset as usize, size as usize));
            }
        }
        let Some((offset, size)) = section else {
            return Ok(Vec::new());
        };

        let mut records = Vec::new();
        let mut pos = offset;
        let end = offset + size;
        while pos + 8 <= end {
            let entry_size = self.u16(pos + 6, "build id entry")? as usize;
            // header + pid + 24-byte padded id.
            if entry_size < 36 || pos + entry_size > end {
                return Err(self.malformed("build id entry", pos));
            }
            let build_id = self.bytes(pos + 12, 20, "build id entry")?.to_vec();
            let filename = self.bytes(pos + 36, entry_size - 36, "build id entry")?;
            records.push(BuildIdRecord {
                filename: c_string(filename),
                build_id,
            });
            pos += entry_size;
        }
        Ok(records)
    }
}

/// Trim trailing NUL padding and decode as UTF-8, lossily.
fn c_string(bytes: &[u8]) -> String {
    let len = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..len]).into_owned()
}

/// Byte cursor over one record payload; `None` means truncation.
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Cursor { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn u32(&mut self) -> Option<u32> {
        let v = self.buf.get(self.pos..self.pos + 4).map(LittleEndian::read_u32)?;
        self.pos += 4;
        Some(v)
    }

    fn u64(&mut self) -> Option<u64> {
        let v = self.buf.get(self.pos..self.pos + 8).map(LittleEndian::read_u64)?;
        self.pos += 8;
        Some(v)
    }

    fn skip(&mut self, n: usize) -> Option<()> {
        if self.remaining() < n {
            return None;
        }
        self.pos += n;
        Some(())
    }

    fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }
}

fn parse_mmap(payload: &[u8]) -> Option<MmapEvent> {
    let mut c = Cursor::new(payload);
    let pid = c.u32()?;
    let _tid = c.u32()?;
    let start = c.u64()?;
    let len = c.u64()?;
    let page_offset = c.u64()?;
    Some(MmapEvent {
        pid: Pid(pid),
        start,
        len,
        page_offset,
        filename: c_string(c.rest()),
    })
}

fn parse_mmap2(payload: &[u8]) -> Option<MmapEvent> {
    let mut c = Cursor::new(payload);
    let pid = c.u32()?;
    let _tid = c.u32()?;
    let start = c.u64()?;
    let len = c.u64()?;
    let page_offset = c.u64()?;
    // maj/min/ino/ino_generation, or the 24-byte build-id form; either way
    // the same width, and neither is consumed here.
    c.skip(24)?;
    let _prot = c.u32()?;
    let _flags = c.u32()?;
    Some(MmapEvent {
        pid: Pid(pid),
        start,
        len,
        page_offset,
        filename: c_string(c.rest()),
    })
}

/// Walk a sample record according to `format`, returning the pid and branch
/// stack. Samples recorded without pid or branch-stack information yield
/// `Ok(None)`.
fn parse_sample(payload: &[u8], format: SampleFormat) -> Result<Option<SampleEvent>, ()> {
    let st = format.sample_type;
    if st & PERF_SAMPLE_TID == 0 || st & PERF_SAMPLE_BRANCH_STACK == 0 {
        return Ok(None);
    }
    let mut c = Cursor::new(payload);
    if st & PERF_SAMPLE_IDENTIFIER != 0 {
        c.u64().ok_or(())?;
    }
    if st & PERF_SAMPLE_IP != 0 {
        c.u64().ok_or(())?;
    }
    let pid = c.u32().ok_or(())?;
    let _tid = c.u32().ok_or(())?;
    if st & PERF_SAMPLE_TIME != 0 {
        c.u64().ok_or(())?;
    }
    if st & PERF_SAMPLE_ADDR != 0 {
        c.u64().ok_or(())?;
    }
    if st & PERF_SAMPLE_ID != 0 {
        c.u64().ok_or(())?;
    }
    if st & PERF_SAMPLE_STREAM_ID != 0 {
        c.u64().ok_or(())?;
    }
    if st & PERF_SAMPLE_CPU != 0 {
        c.u32().ok_or(())?;
        c.u32().ok_or(())?;
    }
    if st & PERF_SAMPLE_PERIOD != 0 {
        c.u64().ok_or(())?;
    }
    if st & PERF_SAMPLE_READ != 0 {
        skip_read_format(&mut c, format.read_format)?;
    }
    if st & PERF_SAMPLE_CALLCHAIN != 0 {
        let nr = c.u64().ok_or(())? as usize;
        if nr > c.remaining() / 8 {
            return Err(());
        }
        c.skip(nr * 8).ok_or(())?;
    }
    if st & PERF_SAMPLE_RAW != 0 {
        let raw_size = c.u32().ok_or(())? as usize;
        c.skip(raw_size).ok_or(())?;
    }

    let nr = c.u64().ok_or(())? as usize;
    if format.branch_sample_type & PERF_SAMPLE_BRANCH_HW_INDEX != 0 {
        c.skip(8).ok_or(())?;
    }
    if nr > c.remaining() / 24 {
        return Err(());
    }
    let mut branch_stack = Vec::with_capacity(nr);
    for _ in 0..nr {
        let from = c.u64().ok_or(())?;
        let to = c.u64().ok_or(())?;
        let _flags = c.u64().ok_or(())?;
        branch_stack.push(BranchEntry { from, to });
    }
    Ok(Some(SampleEvent {
        pid: Pid(pid),
        branch_stack,
    }))
}

fn skip_read_format(c: &mut Cursor<'_>, read_format: u64) -> Result<(), ()> {
    let one = |c: &mut Cursor<'_>| c.u64().map(|_| ()).ok_or(());
    if read_format & PERF_FORMAT_GROUP != 0 {
        let nr = c.u64().ok_or(())? as usize;
        if read_format & PERF_FORMAT_TOTAL_TIME_ENABLED != 0 {
            one(c)?;
        }
        if read_format & PERF_FORMAT_TOTAL_TIME_RUNNING != 0 {
            one(c)?;
        }
        let mut per_value = 8usize;
        if read_format & PERF_FORMAT_ID != 0 {
            per_value += 8;
        }
        if read_format & PERF_FORMAT_LOST != 0 {
            per_value += 8;
        }
        if nr > c.remaining() / per_value {
            return Err(());
        }
        c.skip(nr * per_value).ok_or(())
    } else {
        one(c)?;
        if read_format & PERF_FORMAT_TOTAL_TIME_ENABLED != 0 {
            one(c)?;
        }
        if read_format & PERF_FORMAT_TOTAL_TIME_RUNNING != 0 {
            one(c)?;
        }
        if read_format & PERF_FORMAT_ID != 0 {
            one(c)?;
        }
        if read_format & PERF_FORMAT_LOST != 0 {
            one(c)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn put_u16(buf: &mut Vec<u8>, v: u16) {
        buf.extend_from_slice(&v.to_le_bytes());
    }

    fn put_u32(buf: &mut Vec<u8>, v: u32) {
        buf.extend_from_slice(&v.to_le_bytes());
    }

    fn put_u64(buf: &mut Vec<u8>, v: u64) {
        buf.extend_from_slice(&v.to_le_bytes());
    }

    fn record(record_type: u32, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        put_u32(&mut out, record_type);
        put_u16(&mut out, 0);
        put_u16(&mut out, (8 + payload.len()) as u16);
        out.extend_from_slice(payload);
        out
    }

    fn mmap_record(pid: u32, start: u64, len: u64, pgoff: u64, name: &str) -> Vec<u8> {
        let mut payload = Vec::new();
        put_u32(&mut payload, pid);
        put_u32(&mut payload, pid);
        put_u64(&mut payload, start);
        put_u64(&mut payload, len);
        put_u64(&mut payload, pgoff);
        payload.extend_from_slice(name.as_bytes());
        payload.extend_from_slice(&vec![0u8; 16 - name.len() % 16]);
        record(PERF_RECORD_MMAP, &payload)
    }

    fn sample_record(pid: u32, entries: &[(u64, u64)], hw_index: bool) -> Vec<u8> {
        let mut payload = Vec::new();
        put_u32(&mut payload, pid);
        put_u32(&mut payload, pid);
        put_u64(&mut payload, entries.len() as u64);
        if hw_index {
            put_u64(&mut payload, u64::MAX);
        }
        for &(from, to) in entries {
            put_u64(&mut payload, from);
            put_u64(&mut payload, to);
            put_u64(&mut payload, 0);
        }
        record(PERF_RECORD_SAMPLE, &payload)
    }

    /// Assemble a complete little-endian perf.data image.
    fn perf_file(
        sample_type: u64,
        branch_sample_type: u64,
        records: &[Vec<u8>],
        build_id: Option<(&[u8], &str)>,
    ) -> Vec<u8> {
        const ATTR_ENTRY: u64 = 112 + 16;
        let mut attr = vec![0u8; ATTR_ENTRY as usize];
        attr[24..32].copy_from_slice(&sample_type.to_le_bytes());
        attr[72..80].copy_from_slice(&branch_sample_type.to_le_bytes());

        let data: Vec<u8> = records.concat();
        let attrs_offset = HEADER_SIZE as u64;
        let data_offset = attrs_offset + ATTR_ENTRY;
        let feature_table = data_offset + data.len() as u64;

        let mut blob = Vec::new();
        if let Some((id, name)) = build_id {
            put_u32(&mut blob, 0);
            put_u16(&mut blob, 0);
            let name_padded = (name.len() / 8 + 1) * 8;
            put_u16(&mut blob, (8 + 4 + 24 + name_padded) as u16);
            put_u32(&mut blob, 0); // pid
            let mut padded_id = id.to_vec();
            padded_id.resize(24, 0);
            blob.extend_from_slice(&padded_id);
            blob.extend_from_slice(name.as_bytes());
            blob.extend_from_slice(&vec![0u8; name_padded - name.len()]);
        }

        let mut out = Vec::new();
        put_u64(&mut out, PERF_MAGIC);
        put_u64(&mut out, HEADER_SIZE as u64);
        put_u64(&mut out, ATTR_ENTRY);
        put_u64(&mut out, attrs_offset);
        put_u64(&mut out, ATTR_ENTRY);
        put_u64(&mut out, data_offset);
        put_u64(&mut out, data.len() as u64);
        put_u64(&mut out, 0);
        put_u64(&mut out, 0);
        if build_id.is_some() {
            put_u64(&mut out, 1 << HEADER_BUILD_ID);
        } else {
            put_u64(&mut out, 0);
        }
        put_u64(&mut out, 0);
        put_u64(&mut out, 0);
        put_u64(&mut out, 0);
        assert_eq!(out.len(), HEADER_SIZE);
        out.extend_from_slice(&attr);
        out.extend_from_slice(&data);
        if build_id.is_some() {
            put_u64(&mut out, feature_table + 16);
            put_u64(&mut out, blob.len() as u64);
            out.extend_from_slice(&blob);
        }
        out
    }

    fn load_bytes(bytes: &[u8]) -> Result<TraceFile, TraceError> {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(bytes).expect("write trace");
        PerfDataReader.load(file.path())
    }

    #[test]
    fn test_parses_mmap_sample_and_build_id() {
        let records = vec![
            mmap_record(1234, 0x40_0000, 0x1000, 0x200, "demo-bin"),
            sample_record(1234, &[(0x40_0010, 0x40_0020), (0x40_0030, 0x40_0000)], false),
        ];
        let bytes = perf_file(
            PERF_SAMPLE_TID | PERF_SAMPLE_BRANCH_STACK,
            0,
            &records,
            Some((&[0xab; 20], "demo-bin")),
        );
        let trace = load_bytes(&bytes).unwrap();

        assert_eq!(trace.events.len(), 2);
        let TraceEvent::Mmap(mmap) = &trace.events[0] else {
            panic!("expected mmap first");
        };
        assert_eq!(mmap.pid, Pid(1234));
        assert_eq!((mmap.start, mmap.len, mmap.page_offset), (0x40_0000, 0x1000, 0x200));
        assert_eq!(mmap.filename, "demo-bin");

        let TraceEvent::Sample(sample) = &trace.events[1] else {
            panic!("expected sample second");
        };
        assert_eq!(sample.pid, Pid(1234));
        assert_eq!(sample.branch_stack.len(), 2);
        assert_eq!(sample.branch_stack[0].from, 0x40_0010);
        assert_eq!(sample.branch_stack[1].to, 0x40_0000);

        assert_eq!(trace.build_ids.len(), 1);
        assert_eq!(trace.build_ids[0].filename, "demo-bin");
        assert_eq!(trace.build_ids[0].build_id, vec![0xab; 20]);
    }

    #[test]
    fn test_sample_layout_honors_leading_fields_and_hw_index() {
        // IDENTIFIER, IP, TIME and PERIOD precede the branch stack, and the
        // hardware index sits between the count and the entries.
        let sample_type = PERF_SAMPLE_IDENTIFIER
            | PERF_SAMPLE_IP
            | PERF_SAMPLE_TID
            | PERF_SAMPLE_TIME
            | PERF_SAMPLE_PERIOD
            | PERF_SAMPLE_BRANCH_STACK;
        let mut payload = Vec::new();
        put_u64(&mut payload, 7); // identifier
        put_u64(&mut payload, 0xdead); // ip
        put_u32(&mut payload, 99); // pid
        put_u32(&mut payload, 99); // tid
        put_u64(&mut payload, 1111); // time
        put_u64(&mut payload, 1); // period
        put_u64(&mut payload, 1); // branch count
        put_u64(&mut payload, 3); // hw index
        put_u64(&mut payload, 0x100);
        put_u64(&mut payload, 0x200);
        put_u64(&mut payload, 0);
        let records = vec![record(PERF_RECORD_SAMPLE, &payload)];
        let bytes = perf_file(sample_type, PERF_SAMPLE_BRANCH_HW_INDEX, &records, None);

        let trace = load_bytes(&bytes).unwrap();
        let TraceEvent::Sample(sample) = &trace.events[0] else {
            panic!("expected sample");
        };
        assert_eq!(sample.pid, Pid(99));
        assert_eq!(
            sample.branch_stack,
            vec![BranchEntry { from: 0x100, to: 0x200 }]
        );
    }

    #[test]
    fn test_samples_without_branch_stacks_are_ignored() {
        let mut payload = Vec::new();
        put_u32(&mut payload, 1);
        put_u32(&mut payload, 1);
        let records = vec![record(PERF_RECORD_SAMPLE, &payload)];
        let bytes = perf_file(PERF_SAMPLE_TID, 0, &records, None);
        let trace = load_bytes(&bytes).unwrap();
        assert!(trace.events.is_empty());
    }

    #[test]
    fn test_rejects_wrong_magic() {
        let err = load_bytes(b"NOTPERF!........").unwrap_err();
        assert!(matches!(err, TraceError::BadMagic { .. }));

        let mut swapped = Vec::new();
        put_u64(&mut swapped, PERF_MAGIC_SWAPPED);
        swapped.resize(HEADER_SIZE, 0);
        let err = load_bytes(&swapped).unwrap_err();
        assert!(matches!(err, TraceError::BigEndian { .. }));
    }

    #[test]
    fn test_rejects_truncated_branch_stack() {
        let mut payload = Vec::new();
        put_u32(&mut payload, 1);
        put_u32(&mut payload, 1);
        put_u64(&mut payload, 1000); // claims 1000 entries, provides none
        let records = vec![record(PERF_RECORD_SAMPLE, &payload)];
        let bytes = perf_file(PERF_SAMPLE_TID | PERF_SAMPLE_BRANCH_STACK, 0, &records, None);
        let err = load_bytes(&bytes).unwrap_err();
        assert!(matches!(
            err,
            TraceError::Malformed {
                what: "sample record",
                ..
            }
        ));
    }
}
