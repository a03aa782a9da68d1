//! Multi-stream writer pipeline.
//!
//! Three (channel, worker thread, file) triples: the NUPN main stream and the
//! transition- and place-label side streams. The extraction engine is the
//! only producer; each worker is the only consumer of its channel, so lines
//! reach a file in exactly the order they were sent.
//!
//! Shutdown is explicit:
//! - [`WriterMessage::Stop`] drains everything queued before it, flushes and
//!   closes the file
//! - [`WriterMessage::Cancel`] makes the worker return at once, dropping
//!   whatever is still queued
//!
//! [`WriterPipeline::rollback`] cancels every open stream and deletes all
//! three files; it is safe on a partially opened pipeline and when called
//! more than once.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

use super::constants::WRITE_BUFFER_SIZE;
use crate::error::{ExportError, PipelineError};
use crate::utils::paths::{delete_files, OutputPaths};

/// Message understood by a writer thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriterMessage {
    Data(String),
    Stop,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Main,
    TransitionLabels,
    PlaceLabels,
}

impl StreamKind {
    pub const ALL: [StreamKind; 3] = [
        StreamKind::Main,
        StreamKind::TransitionLabels,
        StreamKind::PlaceLabels,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Main => "main",
            StreamKind::TransitionLabels => "transition-labels",
            StreamKind::PlaceLabels => "place-labels",
        }
    }

    fn thread_name(&self) -> &'static str {
        match self {
            StreamKind::Main => "nupn-writer-main",
            StreamKind::TransitionLabels => "nupn-writer-trans",
            StreamKind::PlaceLabels => "nupn-writer-places",
        }
    }
}

/// One output stream: the sending half of its channel and its worker
pub struct StreamWriter {
    kind: StreamKind,
    sender: Option<Sender<WriterMessage>>,
    handle: Option<JoinHandle<io::Result<()>>>,
}

impl StreamWriter {
    /// Create the file and start its worker
    pub fn start(kind: StreamKind, path: &Path) -> Result<Self, PipelineError> {
        let file = File::create(path).map_err(|source| PipelineError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let (sender, receiver) = channel::<WriterMessage>();

        let handle = thread::Builder::new()
            .name(kind.thread_name().to_string())
            .spawn(move || run_writer(file, receiver))
            .map_err(|source| PipelineError::Spawn {
                stream: kind.as_str(),
                source,
            })?;

        debug!("Started {} writer on {}", kind.as_str(), path.display());
        Ok(Self {
            kind,
            sender: Some(sender),
            handle: Some(handle),
        })
    }

    /// Queue a line. When the worker has already exited, its I/O failure is
    /// returned instead of a plain `Closed`.
    pub fn send(&mut self, line: String) -> Result<(), PipelineError> {
        let Some(sender) = &self.sender else {
            return Err(PipelineError::Closed {
                stream: self.kind.as_str(),
            });
        };
        if sender.send(WriterMessage::Data(line)).is_ok() {
            return Ok(());
        }
        self.sender = None;
        self.join()
            .and(Err(PipelineError::Closed {
                stream: self.kind.as_str(),
            }))
    }

    /// Drain, flush and close. Reports the worker's I/O failure, if any.
    pub fn stop(&mut self) -> Result<(), PipelineError> {
        if let Some(sender) = self.sender.take() {
            // A worker that already died is reported by join below
            let _ = sender.send(WriterMessage::Stop);
        }
        self.join()
    }

    fn join(&mut self) -> Result<(), PipelineError> {
        match self.handle.take() {
            Some(handle) => match handle.join() {
                Ok(Ok(())) => {
                    debug!("Stopped {} writer", self.kind.as_str());
                    Ok(())
                }
                Ok(Err(source)) => Err(PipelineError::Worker {
                    stream: self.kind.as_str(),
                    source,
                }),
                Err(_) => Err(PipelineError::Panicked {
                    stream: self.kind.as_str(),
                }),
            },
            None => Ok(()),
        }
    }

    /// Stop without draining; errors are logged, never returned
    pub fn cancel(&mut self) {
        if let Some(sender) = self.sender.take() {
            let _ = sender.send(WriterMessage::Cancel);
        }
        if let Some(handle) = self.handle.take() {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("{} writer failed before cancel: {}", self.kind.as_str(), e),
                Err(_) => error!("{} writer thread panicked", self.kind.as_str()),
            }
        }
    }
}

impl Drop for StreamWriter {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Worker loop: batch lines into one reused byte buffer, write when full
fn run_writer(mut sink: File, receiver: Receiver<WriterMessage>) -> io::Result<()> {
    let mut buffer: Vec<u8> = Vec::with_capacity(WRITE_BUFFER_SIZE);
    loop {
        match receiver.recv() {
            Ok(WriterMessage::Data(line)) => {
                buffer.extend_from_slice(line.as_bytes());
                if buffer.len() >= WRITE_BUFFER_SIZE {
                    sink.write_all(&buffer)?;
                    buffer.clear();
                }
            }
            Ok(WriterMessage::Stop) => {
                if !buffer.is_empty() {
                    sink.write_all(&buffer)?;
                }
                sink.flush()?;
                return Ok(());
            }
            // A vanished producer is treated like a cancel
            Ok(WriterMessage::Cancel) | Err(_) => return Ok(()),
        }
    }
}

/// The three NUPN output streams of one conversion run
pub struct WriterPipeline {
    paths: OutputPaths,
    main: Option<StreamWriter>,
    transitions: Option<StreamWriter>,
    places: Option<StreamWriter>,
}

impl WriterPipeline {
    /// Pipeline with no stream opened yet
    pub fn new(paths: OutputPaths) -> Self {
        Self {
            paths,
            main: None,
            transitions: None,
            places: None,
        }
    }

    /// Open all three streams; on failure, whatever was opened is rolled back
    pub fn start(paths: OutputPaths) -> Result<Self, PipelineError> {
        let mut pipeline = Self::new(paths);
        for kind in StreamKind::ALL {
            if let Err(e) = pipeline.open_stream(kind) {
                pipeline.rollback();
                return Err(e);
            }
        }
        Ok(pipeline)
    }

    fn slot(&mut self, kind: StreamKind) -> &mut Option<StreamWriter> {
        match kind {
            StreamKind::Main => &mut self.main,
            StreamKind::TransitionLabels => &mut self.transitions,
            StreamKind::PlaceLabels => &mut self.places,
        }
    }

    pub fn is_open(&self, kind: StreamKind) -> bool {
        match kind {
            StreamKind::Main => self.main.is_some(),
            StreamKind::TransitionLabels => self.transitions.is_some(),
            StreamKind::PlaceLabels => self.places.is_some(),
        }
    }

    pub fn open_stream(&mut self, kind: StreamKind) -> Result<(), PipelineError> {
        let path = self.paths.for_stream(kind).to_path_buf();
        let writer = StreamWriter::start(kind, &path)?;
        if let Some(mut previous) = self.slot(kind).replace(writer) {
            previous.cancel();
        }
        Ok(())
    }

    pub fn send(&mut self, kind: StreamKind, line: String) -> Result<(), PipelineError> {
        match self.slot(kind) {
            Some(writer) => writer.send(line),
            None => Err(PipelineError::Closed {
                stream: kind.as_str(),
            }),
        }
    }

    pub fn stop_stream(&mut self, kind: StreamKind) -> Result<(), PipelineError> {
        match self.slot(kind).take() {
            Some(mut writer) => writer.stop(),
            None => Ok(()),
        }
    }

    /// Re-send the content of a stopped side stream's file into the main stream
    fn append_to_main(&mut self, kind: StreamKind) -> Result<(), ExportError> {
        let path = self.paths.for_stream(kind).to_path_buf();
        let io_error = |source| ExportError::Io {
            path: path.to_path_buf(),
            source,
        };
        let mut reader = BufReader::new(File::open(&path).map_err(io_error)?);
        let mut chunk = String::with_capacity(WRITE_BUFFER_SIZE);
        loop {
            let read = reader.read_line(&mut chunk).map_err(io_error)?;
            if read == 0 || chunk.len() >= WRITE_BUFFER_SIZE {
                if !chunk.is_empty() {
                    self.send(StreamKind::Main, std::mem::take(&mut chunk))?;
                }
                if read == 0 {
                    return Ok(());
                }
            }
        }
    }

    /// Stop the label streams, append place labels then transition labels to
    /// the main stream, stop it and optionally delete the side files.
    pub fn finish(&mut self, delete_side_files: bool) -> Result<(), ExportError> {
        self.stop_stream(StreamKind::TransitionLabels)?;
        self.stop_stream(StreamKind::PlaceLabels)?;

        info!("Appending place ids-labels mappings to NUPN file");
        self.append_to_main(StreamKind::PlaceLabels)?;
        info!("Appending transition ids-labels mappings to NUPN file");
        self.append_to_main(StreamKind::TransitionLabels)?;

        self.stop_stream(StreamKind::Main)?;

        if delete_side_files {
            info!("Deleting place and transition ids-labels mappings files");
            delete_files(&[&self.paths.places, &self.paths.transitions]);
        }
        Ok(())
    }

    /// Emergency stop: cancel open streams and delete every output file
    pub fn rollback(&mut self) {
        for kind in StreamKind::ALL {
            if let Some(mut writer) = self.slot(kind).take() {
                writer.cancel();
            }
        }
        delete_files(&[
            &self.paths.main,
            &self.paths.transitions,
            &self.paths.places,
        ]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn paths_in(dir: &TempDir) -> OutputPaths {
        OutputPaths::for_output(&dir.path().join("model.nupn"))
    }

    #[test]
    fn test_stream_preserves_order() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out.txt");
        let mut writer = StreamWriter::start(StreamKind::Main, &path).unwrap();
        for i in 0..10_000 {
            writer.send(format!("line {}\n", i)).unwrap();
        }
        writer.stop().unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 10_000);
        assert_eq!(lines[0], "line 0");
        assert_eq!(lines[9_999], "line 9999");
    }

    #[test]
    fn test_send_after_stop_fails() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer =
            StreamWriter::start(StreamKind::PlaceLabels, &temp_dir.path().join("p")).unwrap();
        writer.stop().unwrap();
        assert!(matches!(
            writer.send("late\n".to_string()),
            Err(PipelineError::Closed { stream: "place-labels" })
        ));
        // Second stop is a no-op
        writer.stop().unwrap();
    }

    #[test]
    fn test_finish_merges_places_then_transitions() {
        let temp_dir = TempDir::new().unwrap();
        let paths = paths_in(&temp_dir);
        let mut pipeline = WriterPipeline::start(paths.clone()).unwrap();

        pipeline
            .send(StreamKind::TransitionLabels, "T0 t0\n".to_string())
            .unwrap();
        pipeline.send(StreamKind::Main, "places #1 0...0\n".to_string()).unwrap();
        pipeline.send(StreamKind::PlaceLabels, "P0 p0\n".to_string()).unwrap();
        pipeline.finish(true).unwrap();

        let content = fs::read_to_string(&paths.main).unwrap();
        assert_eq!(content, "places #1 0...0\nP0 p0\nT0 t0\n");
        assert!(!paths.transitions.exists());
        assert!(!paths.places.exists());
    }

    #[test]
    fn test_finish_can_keep_side_files() {
        let temp_dir = TempDir::new().unwrap();
        let paths = paths_in(&temp_dir);
        let mut pipeline = WriterPipeline::start(paths.clone()).unwrap();
        pipeline.send(StreamKind::PlaceLabels, "P0 p0\n".to_string()).unwrap();
        pipeline.finish(false).unwrap();

        assert!(paths.places.exists());
        assert!(paths.transitions.exists());
        assert_eq!(fs::read_to_string(&paths.places).unwrap(), "P0 p0\n");
    }

    #[test]
    fn test_large_side_stream_is_merged_completely() {
        let temp_dir = TempDir::new().unwrap();
        let paths = paths_in(&temp_dir);
        let mut pipeline = WriterPipeline::start(paths.clone()).unwrap();
        for i in 0..20_000u64 {
            pipeline
                .send(StreamKind::PlaceLabels, format!("P{} place_{}\n", i, i))
                .unwrap();
        }
        pipeline.finish(true).unwrap();

        let content = fs::read_to_string(&paths.main).unwrap();
        assert_eq!(content.lines().count(), 20_000);
        assert_eq!(content.lines().last(), Some("P19999 place_19999"));
    }

    #[test]
    fn test_rollback_deletes_all_outputs() {
        let temp_dir = TempDir::new().unwrap();
        let paths = paths_in(&temp_dir);
        let mut pipeline = WriterPipeline::start(paths.clone()).unwrap();
        pipeline.send(StreamKind::Main, "partial\n".to_string()).unwrap();

        pipeline.rollback();
        assert!(!paths.main.exists());
        assert!(!paths.transitions.exists());
        assert!(!paths.places.exists());
        assert!(!pipeline.is_open(StreamKind::Main));

        // Idempotent
        pipeline.rollback();
    }

    #[test]
    fn test_rollback_with_only_main_opened() {
        let temp_dir = TempDir::new().unwrap();
        let paths = paths_in(&temp_dir);
        let mut pipeline = WriterPipeline::new(paths.clone());
        pipeline.open_stream(StreamKind::Main).unwrap();
        assert!(pipeline.is_open(StreamKind::Main));
        assert!(!pipeline.is_open(StreamKind::PlaceLabels));
        assert!(paths.main.exists());

        pipeline.rollback();
        assert!(!paths.main.exists());
    }

    #[test]
    fn test_failed_start_cleans_up_opened_streams() {
        let temp_dir = TempDir::new().unwrap();
        let mut paths = paths_in(&temp_dir);
        paths.places = temp_dir.path().join("missing-dir").join("model.places");

        let err = WriterPipeline::start(paths.clone()).err().unwrap();
        assert!(matches!(err, PipelineError::Open { .. }));
        assert!(!paths.main.exists());
        assert!(!paths.transitions.exists());
    }

    #[test]
    fn test_send_on_unopened_stream_fails() {
        let temp_dir = TempDir::new().unwrap();
        let mut pipeline = WriterPipeline::new(paths_in(&temp_dir));
        assert!(pipeline
            .send(StreamKind::Main, "x\n".to_string())
            .is_err());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_sink_failure_surfaces_on_send() {
        use std::time::{Duration, Instant};

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("full.nupn");
        std::os::unix::fs::symlink("/dev/full", &path).unwrap();
        let mut writer = StreamWriter::start(StreamKind::Main, &path).unwrap();

        let line = "x".repeat(1023) + "\n";
        let deadline = Instant::now() + Duration::from_secs(10);
        let err = loop {
            match writer.send(line.clone()) {
                Ok(()) => {
                    assert!(Instant::now() < deadline, "worker never reported its failure");
                    thread::sleep(Duration::from_millis(1));
                }
                Err(e) => break e,
            }
        };
        match err {
            PipelineError::Worker { stream, source } => {
                assert_eq!(stream, "main");
                assert_eq!(source.raw_os_error(), Some(28));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // The failure was reported once; the stream is now closed
        assert!(matches!(
            writer.send(line),
            Err(PipelineError::Closed { stream: "main" })
        ));
    }
}
