use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::model::Event;

/// Bytes of framing around each payload: length prefix plus CRC.
const FRAME_OVERHEAD: u64 = 8;

fn write_frame(writer: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload = bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "WAL record larger than 4 GiB"))?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc32fast::hash(&payload).to_le_bytes())
}

enum Frame {
    Record(Event, u64),
    End,
    /// An incomplete or corrupt frame; everything from here on is discarded.
    Torn(&'static str),
}

/// `read_exact` that tells a clean EOF apart from real I/O failure.
fn fill(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

fn read_frame(reader: &mut impl Read) -> io::Result<Frame> {
    let mut len_buf = [0u8; 4];
    match reader.read(&mut len_buf[..1])? {
        0 => return Ok(Frame::End),
        _ => {
            if !fill(reader, &mut len_buf[1..])? {
                return Ok(Frame::Torn("truncated length prefix"));
            }
        }
    }
    let len = u32::from_le_bytes(len_buf) as usize;
    let mut payload = vec![0u8; len];
    if !fill(reader, &mut payload)? {
        return Ok(Frame::Torn("truncated payload"));
    }
    let mut crc_buf = [0u8; 4];
    if !fill(reader, &mut crc_buf)? {
        return Ok(Frame::Torn("truncated checksum"));
    }
    if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
        return Ok(Frame::Torn("checksum mismatch"));
    }
    match bincode::deserialize::<Event>(&payload) {
        Ok(event) => Ok(Frame::Record(event, len as u64 + FRAME_OVERHEAD)),
        Err(_) => Ok(Frame::Torn("undecodable record")),
    }
}

/// Events recovered from disk and how many leading bytes held them.
pub struct Replay {
    pub events: Vec<Event>,
    pub valid_len: u64,
}

/// Append-only event log.
///
/// Each record is `[u32 le: len][bincode Event][u32 le: crc32 of payload]`.
/// A torn tail left by a crash is detected by the length prefix and CRC and
/// cut off on recovery, so later appends never sit behind garbage.
pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    appends_since_compact: u64,
}

impl Wal {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            appends_since_compact: 0,
        })
    }

    /// Replay whatever is on disk, trim a torn tail, then open for appending.
    pub fn recover(path: &Path) -> io::Result<(Self, Vec<Event>)> {
        let replay = Self::replay(path)?;
        if let Ok(meta) = fs::metadata(path)
            && meta.len() > replay.valid_len
        {
            warn!(
                path = %path.display(),
                discarded_bytes = meta.len() - replay.valid_len,
                "truncating torn WAL tail"
            );
            OpenOptions::new().write(true).open(path)?.set_len(replay.valid_len)?;
        }
        Ok((Self::open(path)?, replay.events))
    }

    /// Read every intact record. A missing file is an empty log.
    pub fn replay(path: &Path) -> io::Result<Replay> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(Replay {
                    events: Vec::new(),
                    valid_len: 0,
                });
            }
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let mut replay = Replay {
            events: Vec::new(),
            valid_len: 0,
        };
        loop {
            match read_frame(&mut reader)? {
                Frame::Record(event, size) => {
                    replay.events.push(event);
                    replay.valid_len += size;
                }
                Frame::End => break,
                Frame::Torn(reason) => {
                    warn!(
                        path = %path.display(),
                        offset = replay.valid_len,
                        reason,
                        "WAL replay stopped at damaged record"
                    );
                    break;
                }
            }
        }
        Ok(replay)
    }

    /// Buffer one record. Nothing is durable until `flush_sync`.
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        write_frame(&mut self.writer, event)?;
        self.appends_since_compact += 1;
        Ok(())
    }

    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()
    }

    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    fn compact_path(path: &Path) -> PathBuf {
        path.with_extension("wal.compact")
    }

    /// Write the replacement log next to the live one and fsync it.
    pub fn write_compact_file(path: &Path, events: &[Event]) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(Self::compact_path(path))?);
        for event in events {
            write_frame(&mut writer, event)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// Rename the replacement over the live log and reopen it for appends.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        fs::rename(Self::compact_path(&self.path), &self.path)?;
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.writer = BufWriter::new(file);
        self.appends_since_compact = 0;
        Ok(())
    }
}
