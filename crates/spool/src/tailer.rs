//! Byte-cursor transcript tailing.
//!
//! Transcripts are append-only, so "new data" is exactly the bytes past the
//! persisted cursor.  Reads are chunked (bounded buffer), at most a fixed
//! number of lines are consumed per tick, and a line is only consumed once
//! its terminating newline has been written — a partial tail line is left
//! for the next tick.

use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use glob::glob;

/// Lines read past the cursor, plus where the cursor now points.
#[derive(Debug, Default)]
pub struct TailChunk {
    pub lines: Vec<String>,
    pub new_offset: u64,
    /// Count of oversize lines dropped (cursor advanced past them).
    pub dropped: usize,
}

/// Enumerate live transcript files under `<agentsDir>/*/sessions/*.jsonl`.
/// Deleted/archived transcripts (`.deleted.` / `.bak.` in the name) are not
/// tailed.
pub fn discover_transcripts(agents_dir: &Path) -> Vec<PathBuf> {
    let pattern = agents_dir.join("*").join("sessions").join("*.jsonl");
    let Some(pattern) = pattern.to_str() else {
        return Vec::new();
    };

    let mut paths: Vec<PathBuf> = glob(pattern)
        .map(|entries| {
            entries
                .flatten()
                .filter(|p| {
                    p.file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| !n.contains(".deleted.") && !n.contains(".bak."))
                })
                .collect()
        })
        .unwrap_or_default();
    paths.sort();
    paths
}

pub fn file_size(path: &Path) -> Option<u64> {
    std::fs::metadata(path).map(|m| m.len()).ok()
}

/// Read up to `max_lines` complete lines starting at `offset`.
///
/// Lines longer than `max_line_bytes` are dropped but still consumed (the
/// cursor advances past them).  Reads go through a buffer of `chunk_bytes`.
pub fn read_new_lines(
    path: &Path,
    offset: u64,
    max_lines: usize,
    max_line_bytes: u64,
    chunk_bytes: usize,
) -> std::io::Result<TailChunk> {
    let mut file = std::fs::File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    let mut reader = BufReader::with_capacity(chunk_bytes.max(1024), file);

    let mut chunk = TailChunk {
        new_offset: offset,
        ..Default::default()
    };

    'lines: while chunk.lines.len() < max_lines {
        let mut acc: Vec<u8> = Vec::new();
        let mut oversize = false;
        let mut consumed: u64 = 0;

        // Accumulate one line, chunk by chunk.
        loop {
            let buf = reader.fill_buf()?;
            if buf.is_empty() {
                // EOF before a newline: leave the partial line for later.
                break 'lines;
            }

            match buf.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    if !oversize && (acc.len() + pos) as u64 <= max_line_bytes {
                        acc.extend_from_slice(&buf[..pos]);
                    } else {
                        oversize = true;
                    }
                    reader.consume(pos + 1);
                    consumed += (pos + 1) as u64;
                    break;
                }
                None => {
                    if (acc.len() + buf.len()) as u64 > max_line_bytes {
                        oversize = true;
                        acc.clear();
                    } else {
                        acc.extend_from_slice(buf);
                    }
                    let len = buf.len();
                    reader.consume(len);
                    consumed += len as u64;
                }
            }
        }

        chunk.new_offset += consumed;
        if oversize {
            chunk.dropped += 1;
            continue;
        }
        chunk
            .lines
            .push(String::from_utf8_lossy(&acc).into_owned());
    }

    Ok(chunk)
}
