//! Memory-mapped file journal.
//!
//! [`FileJournal`] persists [`JournalRecord`]s to pre-allocated,
//! memory-mapped segment files. Segments are named
//! `segment-{start_entry_seq:020}.journal` inside the journal directory;
//! a segment that cannot fit the next entry is truncated to its used size
//! and a fresh one begins. On clean shutdown [`Journal::archive`] renames
//! every committed segment to `.journal.archived` so the next session
//! starts from an empty log while the history stays on disk.
//!
//! Frame layout and CRC coverage are defined in [`super::journal`]. A
//! zeroed header (`payload_len == 0`) marks the end of the written region;
//! any non-zero frame that fails its CRC is corruption and is surfaced as
//! an error, never skipped.

use super::error::JournalError;
use super::journal::{ENTRY_HEADER_SIZE, ENTRY_OVERHEAD, Journal, JournalReadIter};
use super::types::{JournalEntry, JournalRecord};
use memmap2::MmapMut;
use std::collections::VecDeque;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default segment size in bytes (64 MiB).
const DEFAULT_SEGMENT_SIZE: usize = 64 * 1024 * 1024;

fn io_err(err: std::io::Error, path: &Path) -> JournalError {
    JournalError::Io {
        message: err.to_string(),
        path: Some(path.to_path_buf()),
    }
}

fn segment_path(dir: &Path, start_seq: u64) -> PathBuf {
    dir.join(format!("segment-{start_seq:020}.journal"))
}

/// Start sequences of live (non-archived) segments in `dir`, sorted.
fn list_segments(dir: &Path) -> Result<Vec<u64>, JournalError> {
    let mut starts = Vec::new();
    let entries = fs::read_dir(dir).map_err(|e| io_err(e, dir))?;
    for entry in entries {
        let entry = entry.map_err(|e| io_err(e, dir))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some(stem) = name
            .strip_prefix("segment-")
            .and_then(|rest| rest.strip_suffix(".journal"))
            && let Ok(seq) = stem.parse::<u64>()
        {
            starts.push(seq);
        }
    }
    starts.sort_unstable();
    Ok(starts)
}

/// Parses one frame at `offset`.
///
/// Returns `Ok(None)` at the clean end of the written region (zeroed
/// header or truncated tail past the last flush).
fn parse_frame(
    data: &[u8],
    offset: usize,
) -> Result<Option<(JournalEntry, usize)>, JournalError> {
    if offset + ENTRY_HEADER_SIZE > data.len() {
        return Ok(None);
    }
    let entry_seq = u64::from_le_bytes(data[offset..offset + 8].try_into().unwrap_or_default());
    let payload_len =
        u32::from_le_bytes(data[offset + 8..offset + 12].try_into().unwrap_or_default()) as usize;
    if payload_len == 0 {
        return Ok(None);
    }
    let end = offset + ENTRY_OVERHEAD + payload_len;
    if end > data.len() {
        return Err(JournalError::InvalidEntryFrame {
            offset,
            message: format!(
                "payload length {payload_len} runs past segment end {}",
                data.len()
            ),
        });
    }
    let payload = &data[offset + ENTRY_HEADER_SIZE..offset + ENTRY_HEADER_SIZE + payload_len];
    let stored_crc =
        u32::from_le_bytes(data[end - 4..end].try_into().unwrap_or_default());

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&data[offset..offset + 8]);
    hasher.update(payload);
    let actual_crc = hasher.finalize();
    if actual_crc != stored_crc {
        return Err(JournalError::CorruptEntry {
            entry_seq,
            expected_crc: stored_crc,
            actual_crc,
        });
    }

    let record: JournalRecord =
        serde_json::from_slice(payload).map_err(|e| JournalError::DeserializationError {
            entry_seq,
            message: e.to_string(),
        })?;
    Ok(Some((
        JournalEntry {
            entry_seq,
            record,
            stored_crc,
        },
        end,
    )))
}

/// Walks a segment's frames to find the write position and the last
/// committed entry sequence. Stops at the first frame that does not parse;
/// corruption is reported by the read path, not here.
fn scan_segment(data: &[u8]) -> (usize, Option<u64>) {
    let mut offset = 0;
    let mut last_seq = None;
    while let Ok(Some((entry, next))) = parse_frame(data, offset) {
        last_seq = Some(entry.entry_seq);
        offset = next;
    }
    (offset, last_seq)
}

/// Writes frames into one pre-allocated, memory-mapped segment.
struct SegmentWriter {
    mmap: MmapMut,
    write_pos: usize,
    capacity: usize,
    path: PathBuf,
}

impl SegmentWriter {
    /// Creates and zero-fills a new segment file of `capacity` bytes.
    fn create(path: &Path, capacity: usize) -> Result<Self, JournalError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|e| io_err(e, path))?;
        file.set_len(capacity as u64).map_err(|e| io_err(e, path))?;

        // SAFETY: the segment file is created and owned by this process;
        // nothing truncates or remaps it while the mapping is live.
        let mmap = unsafe { MmapMut::map_mut(&file).map_err(|e| io_err(e, path))? };
        Ok(SegmentWriter {
            mmap,
            write_pos: 0,
            capacity,
            path: path.to_path_buf(),
        })
    }

    /// Opens an existing segment and positions the writer after the last
    /// committed frame.
    fn open_existing(path: &Path) -> Result<Self, JournalError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| io_err(e, path))?;
        let capacity = file.metadata().map_err(|e| io_err(e, path))?.len() as usize;

        // SAFETY: as in `create`; the file is exclusively owned.
        let mmap = unsafe { MmapMut::map_mut(&file).map_err(|e| io_err(e, path))? };
        let (write_pos, _) = scan_segment(&mmap[..capacity]);
        Ok(SegmentWriter {
            mmap,
            write_pos,
            capacity,
            path: path.to_path_buf(),
        })
    }

    #[inline]
    fn remaining(&self) -> usize {
        self.capacity.saturating_sub(self.write_pos)
    }

    /// Copies a framed entry at the write position and flushes that range.
    fn write_entry(&mut self, entry_bytes: &[u8]) -> Result<(), JournalError> {
        let end = self.write_pos + entry_bytes.len();
        if end > self.capacity {
            return Err(JournalError::EntryTooLarge {
                entry_bytes: entry_bytes.len(),
                segment_size: self.capacity,
            });
        }
        self.mmap[self.write_pos..end].copy_from_slice(entry_bytes);
        self.mmap
            .flush_range(self.write_pos, entry_bytes.len())
            .map_err(|e| io_err(e, &self.path))?;
        self.write_pos = end;
        Ok(())
    }

    /// Flushes everything and truncates the file to its used size.
    fn seal(&mut self) -> Result<(), JournalError> {
        self.mmap.flush().map_err(|e| io_err(e, &self.path))?;
        let file = OpenOptions::new()
            .write(true)
            .open(&self.path)
            .map_err(|e| io_err(e, &self.path))?;
        file.set_len(self.write_pos as u64)
            .map_err(|e| io_err(e, &self.path))?;
        Ok(())
    }
}

/// Memory-mapped, append-only journal with segment rotation.
pub struct FileJournal {
    dir: PathBuf,
    writer: SegmentWriter,
    segment_size: usize,
    next_entry_seq: u64,
    last_entry_seq: Option<u64>,
}

impl FileJournal {
    /// Opens or creates a journal in `dir` with the default segment size.
    ///
    /// # Errors
    /// Fails if the directory cannot be created or existing segments
    /// cannot be mapped.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, JournalError> {
        Self::open_with_segment_size(dir, DEFAULT_SEGMENT_SIZE)
    }

    /// Opens or creates a journal with an explicit segment size.
    ///
    /// If live segments exist, writing resumes after the last committed
    /// frame of the newest one.
    ///
    /// # Errors
    /// Fails if the directory cannot be created or existing segments
    /// cannot be mapped.
    pub fn open_with_segment_size<P: AsRef<Path>>(
        dir: P,
        segment_size: usize,
    ) -> Result<Self, JournalError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| io_err(e, &dir))?;
        if !dir.is_dir() {
            return Err(JournalError::InvalidDirectory { path: dir });
        }

        let segments = list_segments(&dir)?;
        let (writer, next_entry_seq, last_entry_seq) = match segments.last() {
            Some(latest) => {
                let path = segment_path(&dir, *latest);
                let writer = SegmentWriter::open_existing(&path)?;
                let (_, scanned) = scan_segment(&writer.mmap[..writer.capacity]);
                // An empty latest segment means the previous entry closed
                // the segment before it.
                let last = scanned.or_else(|| latest.checked_sub(1));
                let next = scanned.map_or(*latest, |s| s + 1);
                (writer, next, last)
            }
            None => {
                let path = segment_path(&dir, 0);
                (SegmentWriter::create(&path, segment_size)?, 0, None)
            }
        };
        debug!(dir = %dir.display(), next_entry_seq, "journal opened");

        Ok(FileJournal {
            dir,
            writer,
            segment_size,
            next_entry_seq,
            last_entry_seq,
        })
    }

    /// Live segment start sequences, oldest first.
    fn live_segments(&self) -> Result<Vec<u64>, JournalError> {
        list_segments(&self.dir)
    }

    /// Frames a record for the on-disk format.
    fn encode_entry(entry_seq: u64, record: &JournalRecord) -> Result<Vec<u8>, JournalError> {
        let payload =
            serde_json::to_vec(record).map_err(|e| JournalError::SerializationError {
                message: e.to_string(),
            })?;
        let mut buf = Vec::with_capacity(ENTRY_OVERHEAD + payload.len());
        buf.extend_from_slice(&entry_seq.to_le_bytes());
        buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&payload);

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&entry_seq.to_le_bytes());
        hasher.update(&payload);
        buf.extend_from_slice(&hasher.finalize().to_le_bytes());
        Ok(buf)
    }

    /// Seals the active segment and starts a fresh one at `start_seq`.
    fn rotate_segment(&mut self, start_seq: u64) -> Result<(), JournalError> {
        self.writer.seal()?;
        let path = segment_path(&self.dir, start_seq);
        debug!(path = %path.display(), "journal segment rotated");
        self.writer = SegmentWriter::create(&path, self.segment_size)?;
        Ok(())
    }
}

impl Journal for FileJournal {
    fn append(&mut self, record: &JournalRecord) -> Result<u64, JournalError> {
        let entry_seq = self.next_entry_seq;
        let bytes = Self::encode_entry(entry_seq, record)?;
        if bytes.len() > self.segment_size {
            return Err(JournalError::EntryTooLarge {
                entry_bytes: bytes.len(),
                segment_size: self.segment_size,
            });
        }
        if bytes.len() > self.writer.remaining() {
            self.rotate_segment(entry_seq)?;
        }
        self.writer.write_entry(&bytes)?;
        self.next_entry_seq += 1;
        self.last_entry_seq = Some(entry_seq);
        Ok(entry_seq)
    }

    fn read_from(&self, entry_seq: u64) -> Result<JournalReadIter, JournalError> {
        let mut paths: VecDeque<PathBuf> = VecDeque::new();
        for start in self.live_segments()? {
            paths.push_back(segment_path(&self.dir, start));
        }
        Ok(Box::new(ReadIter {
            paths,
            current: None,
            from: entry_seq,
            failed: false,
        }))
    }

    fn last_entry_seq(&self) -> Option<u64> {
        self.last_entry_seq
    }

    fn verify_integrity(&self) -> Result<(), JournalError> {
        for entry in self.read_from(0)? {
            entry?;
        }
        Ok(())
    }

    fn archive(&mut self) -> Result<usize, JournalError> {
        self.writer.seal()?;
        let mut archived = 0usize;
        for start in self.live_segments()? {
            let src = segment_path(&self.dir, start);
            let mut dst = src.clone();
            dst.set_extension("journal.archived");
            fs::rename(&src, &dst).map_err(|e| io_err(e, &src))?;
            archived += 1;
        }
        let path = segment_path(&self.dir, self.next_entry_seq);
        self.writer = SegmentWriter::create(&path, self.segment_size)?;
        debug!(archived, "journal archived on shutdown");
        Ok(archived)
    }
}

/// Lazily walks segment files in order, yielding decoded entries.
struct ReadIter {
    paths: VecDeque<PathBuf>,
    current: Option<(Vec<u8>, usize)>,
    from: u64,
    failed: bool,
}

impl Iterator for ReadIter {
    type Item = Result<JournalEntry, JournalError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            if self.current.is_none() {
                let path = self.paths.pop_front()?;
                match fs::read(&path) {
                    Ok(data) => self.current = Some((data, 0)),
                    Err(e) => {
                        self.failed = true;
                        return Some(Err(io_err(e, &path)));
                    }
                }
            }
            let (data, offset) = self.current.as_mut()?;
            match parse_frame(data, *offset) {
                Ok(Some((entry, next))) => {
                    *offset = next;
                    if entry.entry_seq >= self.from {
                        return Some(Ok(entry));
                    }
                }
                Ok(None) => {
                    self.current = None;
                }
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
