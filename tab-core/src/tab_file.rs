//! # Tab File Module
//!
//! The line-oriented interchange format read by renderers and playback tools.
//! Each accepted note is one line:
//!
//! ```text
//! <start seconds, 2 decimals>,<string name>,<fret>
//! ```
//!
//! e.g. `2.00,A,2`. The writer flushes after every line so that a tailing
//! reader in another process sees notes as they are played.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::NoteEvent;
use crate::fretboard::{Position, Tuning};

#[derive(Debug, Error)]
pub enum TabFileError {
    #[error("expected 3 comma-separated fields, found {0}")]
    FieldCount(usize),
    #[error("invalid start time {0:?}")]
    StartTime(String),
    #[error("unknown string name {0:?}")]
    UnknownString(String),
    #[error("invalid fret {0:?}")]
    Fret(String),
    #[error("fret {fret} is above the highest fret {max_fret}")]
    FretOutOfRange { fret: u32, max_fret: u32 },
    #[error("event on string {0} has no name in this tuning")]
    UnnamedString(usize),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Formats one event as a line, including the trailing newline.
pub fn format_event(event: &NoteEvent, tuning: &Tuning) -> Result<String, TabFileError> {
    let name = tuning
        .string_name(event.position.string_index)
        .ok_or(TabFileError::UnnamedString(event.position.string_index))?;
    Ok(format!("{:.2},{},{}\n", event.start_time, name, event.position.fret))
}

/// Parses one line (with or without its newline) back into an event.
///
/// Frets above `max_fret` are rejected.
pub fn parse_line(line: &str, tuning: &Tuning, max_fret: u32) -> Result<NoteEvent, TabFileError> {
    let parts: Vec<&str> = line.trim().split(',').collect();
    let [time, name, fret] = parts.as_slice() else {
        return Err(TabFileError::FieldCount(parts.len()));
    };

    let start_time: f64 = time
        .trim()
        .parse()
        .map_err(|_| TabFileError::StartTime(time.to_string()))?;
    let string_index = tuning
        .string_index(name.trim())
        .ok_or_else(|| TabFileError::UnknownString(name.to_string()))?;
    let fret: u32 = fret
        .trim()
        .parse()
        .map_err(|_| TabFileError::Fret(fret.to_string()))?;
    if fret > max_fret {
        return Err(TabFileError::FretOutOfRange { fret, max_fret });
    }

    Ok(NoteEvent {
        start_time,
        position: Position::new(string_index, fret),
    })
}

/// Parses every line of `contents`, skipping blank and malformed lines.
pub fn parse_lines(contents: &str, tuning: &Tuning, max_fret: u32) -> Vec<NoteEvent> {
    contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match parse_line(line, tuning, max_fret) {
            Ok(event) => Some(event),
            Err(e) => {
                log::warn!(target: "tabfile", "skipping line {:?}: {}", line, e);
                None
            }
        })
        .collect()
}

/// Reads a whole tab file.
pub fn read_tab_file(
    path: impl AsRef<Path>,
    tuning: &Tuning,
    max_fret: u32,
) -> Result<Vec<NoteEvent>, TabFileError> {
    let contents = std::fs::read_to_string(path)?;
    Ok(parse_lines(&contents, tuning, max_fret))
}

/// Appends events to a tab file as they are accepted.
#[derive(Debug)]
pub struct TabFileWriter {
    file: File,
    tuning: Tuning,
}

impl TabFileWriter {
    /// Creates `path`, truncating anything left from a previous session.
    pub fn create(path: impl AsRef<Path>, tuning: Tuning) -> Result<Self, TabFileError> {
        let file = File::create(path)?;
        Ok(Self { file, tuning })
    }

    /// Writes one line and flushes it.
    pub fn append(&mut self, event: &NoteEvent) -> Result<(), TabFileError> {
        let line = format_event(event, &self.tuning)?;
        self.file.write_all(line.as_bytes())?;
        self.file.flush()?;
        Ok(())
    }
}

/// Incremental reader that picks up lines appended since the last call.
///
/// A rewritten file is detected when it has shrunk below the saved offset or
/// its first line no longer matches the one read earlier. Either way reading
/// restarts from the top.
#[derive(Debug)]
pub struct TabFileTailer {
    path: PathBuf,
    tuning: Tuning,
    max_fret: u32,
    offset: u64,
    /// First complete line seen, newline included.
    head: Option<String>,
}

impl TabFileTailer {
    pub fn new(path: impl Into<PathBuf>, tuning: Tuning, max_fret: u32) -> Self {
        Self {
            path: path.into(),
            tuning,
            max_fret,
            offset: 0,
            head: None,
        }
    }

    /// New complete lines since the previous call.
    ///
    /// A trailing line without its newline is left for the next call. A file
    /// that does not exist yet reads as empty.
    pub fn read_new(&mut self) -> Result<Vec<NoteEvent>, TabFileError> {
        let mut file = match OpenOptions::new().read(true).open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let len = file.metadata()?.len();
        if self.offset > 0 && (len < self.offset || !self.head_matches(&mut file)?) {
            log::debug!(
                target: "tabfile",
                "{} was rewritten, reading from the start",
                self.path.display()
            );
            self.offset = 0;
            self.head = None;
        }
        if len == self.offset {
            return Ok(Vec::new());
        }

        file.seek(SeekFrom::Start(self.offset))?;
        let mut buffer = String::new();
        file.read_to_string(&mut buffer)?;

        let Some(end) = buffer.rfind('\n') else {
            return Ok(Vec::new());
        };
        let complete = &buffer[..=end];
        if self.head.is_none() {
            self.head = complete.find('\n').map(|first| complete[..=first].to_string());
        }
        self.offset += complete.len() as u64;
        Ok(parse_lines(complete, &self.tuning, self.max_fret))
    }

    fn head_matches(&self, file: &mut File) -> Result<bool, TabFileError> {
        let Some(head) = &self.head else {
            return Ok(true);
        };
        file.seek(SeekFrom::Start(0))?;
        let mut first = String::new();
        BufReader::new(&mut *file).read_line(&mut first)?;
        Ok(first == *head)
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }
}

/// Index of the note sounding at `elapsed` seconds.
///
/// Note `i` covers `[start_times[i], start_times[i + 1])`; the last one runs
/// on forever. `start_times` must be sorted ascending.
pub fn note_index_at(start_times: &[f64], elapsed: f64) -> Option<usize> {
    start_times
        .partition_point(|&start| start <= elapsed)
        .checked_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(t: f64, string_index: usize, fret: u32) -> NoteEvent {
        NoteEvent {
            start_time: t,
            position: Position::new(string_index, fret),
        }
    }

    #[test]
    fn lines_use_two_decimals_and_string_symbols() {
        let tuning = Tuning::standard();
        assert_eq!(format_event(&event(0.0, 0, 0), &tuning).unwrap(), "0.00,E,0\n");
        assert_eq!(format_event(&event(2.0, 1, 2), &tuning).unwrap(), "2.00,A,2\n");
        assert_eq!(format_event(&event(12.346, 5, 17), &tuning).unwrap(), "12.35,e,17\n");
    }

    #[test]
    fn unnamed_string_is_an_error() {
        let tuning = Tuning::standard();
        assert!(matches!(
            format_event(&event(0.0, 6, 0), &tuning),
            Err(TabFileError::UnnamedString(6))
        ));
    }

    #[test]
    fn parse_reads_back_a_line() {
        let tuning = Tuning::standard();
        let parsed = parse_line("3.50,G,7\n", &tuning, 20).unwrap();
        assert_eq!(parsed, event(3.5, 3, 7));
    }

    #[test]
    fn parse_reports_each_kind_of_problem() {
        let tuning = Tuning::standard();
        assert!(matches!(parse_line("1.0,E", &tuning, 20), Err(TabFileError::FieldCount(2))));
        assert!(matches!(parse_line("x,E,1", &tuning, 20), Err(TabFileError::StartTime(_))));
        assert!(matches!(parse_line("1.0,Q,1", &tuning, 20), Err(TabFileError::UnknownString(_))));
        assert!(matches!(parse_line("1.0,E,-1", &tuning, 20), Err(TabFileError::Fret(_))));
        assert!(matches!(
            parse_line("1.00,E,4000000", &tuning, 20),
            Err(TabFileError::FretOutOfRange { fret: 4000000, max_fret: 20 })
        ));
        assert!(matches!(
            parse_line("1.00,E,21", &tuning, 20),
            Err(TabFileError::FretOutOfRange { fret: 21, .. })
        ));
        assert_eq!(parse_line("1.00,E,20", &tuning, 20).unwrap(), event(1.0, 0, 20));
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let tuning = Tuning::standard();
        let events = parse_lines("0.00,E,0\ngarbage\n\n1.00,B,3\n1.50,B,99\n", &tuning, 20);
        assert_eq!(events, vec![event(0.0, 0, 0), event(1.0, 4, 3)]);
    }

    #[test]
    fn writer_truncates_and_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output_tab.txt");
        std::fs::write(&path, "stale,data,here\n").unwrap();

        let mut writer = TabFileWriter::create(&path, Tuning::standard()).unwrap();
        writer.append(&event(0.0, 0, 0)).unwrap();
        writer.append(&event(2.0, 1, 2)).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "0.00,E,0\n2.00,A,2\n");
        assert_eq!(read_tab_file(&path, &Tuning::standard(), 20).unwrap().len(), 2);
    }

    #[test]
    fn tailer_reads_only_new_complete_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tab.txt");
        let mut tailer = TabFileTailer::new(&path, Tuning::standard(), 20);
        assert!(tailer.read_new().unwrap().is_empty());

        let mut writer = TabFileWriter::create(&path, Tuning::standard()).unwrap();
        writer.append(&event(0.0, 0, 0)).unwrap();
        assert_eq!(tailer.read_new().unwrap(), vec![event(0.0, 0, 0)]);
        assert!(tailer.read_new().unwrap().is_empty());

        // Half-written line stays pending until its newline arrives.
        let mut raw = OpenOptions::new().append(true).open(&path).unwrap();
        raw.write_all(b"1.50,D").unwrap();
        assert!(tailer.read_new().unwrap().is_empty());
        raw.write_all(b",4\n").unwrap();
        assert_eq!(tailer.read_new().unwrap(), vec![event(1.5, 2, 4)]);
        assert_eq!(tailer.offset(), std::fs::metadata(&path).unwrap().len());
    }

    #[test]
    fn tailer_restarts_after_truncation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tab.txt");
        std::fs::write(&path, "0.00,E,0\n1.00,E,3\n").unwrap();
        let mut tailer = TabFileTailer::new(&path, Tuning::standard(), 20);
        assert_eq!(tailer.read_new().unwrap().len(), 2);

        std::fs::write(&path, "0.00,A,5\n").unwrap();
        assert_eq!(tailer.read_new().unwrap(), vec![event(0.0, 1, 5)]);
    }

    #[test]
    fn tailer_restarts_when_a_longer_session_replaces_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tab.txt");
        std::fs::write(&path, "0.00,E,0\n1.00,E,3\n").unwrap();
        let mut tailer = TabFileTailer::new(&path, Tuning::standard(), 20);
        assert_eq!(tailer.read_new().unwrap().len(), 2);

        // New session wrote past the old offset before the next poll.
        std::fs::write(&path, "0.00,A,5\n1.00,A,7\n2.00,D,2\n").unwrap();
        assert_eq!(
            tailer.read_new().unwrap(),
            vec![event(0.0, 1, 5), event(1.0, 1, 7), event(2.0, 2, 2)]
        );

        let mut raw = OpenOptions::new().append(true).open(&path).unwrap();
        raw.write_all(b"3.00,G,0\n").unwrap();
        assert_eq!(tailer.read_new().unwrap(), vec![event(3.0, 3, 0)]);
    }

    #[test]
    fn note_index_follows_intervals() {
        let starts = [0.5, 1.0, 2.0];
        assert_eq!(note_index_at(&starts, 0.0), None);
        assert_eq!(note_index_at(&starts, 0.5), Some(0));
        assert_eq!(note_index_at(&starts, 0.99), Some(0));
        assert_eq!(note_index_at(&starts, 1.0), Some(1));
        assert_eq!(note_index_at(&starts, 100.0), Some(2));
        assert_eq!(note_index_at(&[], 1.0), None);
    }
}
