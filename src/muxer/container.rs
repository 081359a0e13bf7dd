// Interleaved track container
//
// Layout:
//   magic (8 bytes)
//   header length (u32 LE) + JSON header (orientation, track formats)
//   sample records: tag 0x01, track u8, flags u8, pts i64 LE, length u32 LE, payload
//   trailer record: tag 0xFF, length u32 LE + JSON trailer (per-track summaries)
//
// The file stays empty until the writer is started.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{RecorderError, RecorderResult};
use crate::media::{EncodedSample, MediaFormat, Orientation, SampleFlags};

pub const CONTAINER_MAGIC: &[u8; 8] = b"CAMREC\0\x01";
pub const CONTAINER_EXTENSION: &str = "cam";

const TAG_SAMPLE: u8 = 0x01;
const TAG_TRAILER: u8 = 0xFF;

/// Writes encoded samples from several tracks into one file
pub trait ContainerWriter: Send {
    /// Add a track to the header. Only valid before `start`.
    fn add_track(&mut self, format: &MediaFormat) -> RecorderResult<usize>;

    /// Write the header; samples are accepted afterwards
    fn start(&mut self) -> RecorderResult<()>;

    fn write_sample(&mut self, track_index: usize, sample: &EncodedSample) -> RecorderResult<()>;

    /// Finalize and close the file
    fn stop(&mut self) -> RecorderResult<()>;

    fn path(&self) -> &Path;
}

/// JSON header written when the container starts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerHeader {
    pub orientation_degrees: u16,
    pub created_at: DateTime<Utc>,
    pub tracks: Vec<MediaFormat>,
}

/// Per-track statistics, kept by the writer and recomputed by the reader
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackSummary {
    pub format: MediaFormat,
    pub samples: u64,
    pub payload_bytes: u64,
    pub first_pts_us: Option<i64>,
    pub last_pts_us: Option<i64>,
    pub last_sample_bytes: u64,
}

impl TrackSummary {
    fn new(format: MediaFormat) -> Self {
        Self {
            format,
            samples: 0,
            payload_bytes: 0,
            first_pts_us: None,
            last_pts_us: None,
            last_sample_bytes: 0,
        }
    }

    fn record(&mut self, pts_us: i64, bytes: u64) {
        self.samples += 1;
        self.payload_bytes += bytes;
        self.first_pts_us.get_or_insert(pts_us);
        self.last_pts_us = Some(pts_us);
        self.last_sample_bytes = bytes;
    }

    /// Distance between first and last sample timestamps
    pub fn span_us(&self) -> i64 {
        match (self.first_pts_us, self.last_pts_us) {
            (Some(first), Some(last)) => last - first,
            _ => 0,
        }
    }

    /// Playback duration of the track.
    ///
    /// Video: span between first and last frame. PCM audio: span plus the length of the
    /// final chunk, which equals the total number of sample-frames over the rate.
    pub fn duration_us(&self) -> i64 {
        match &self.format {
            MediaFormat::Audio {
                sample_rate,
                channels,
                ..
            } => {
                let bytes_per_sec = *sample_rate as i64 * 2 * (*channels).max(1) as i64;
                if bytes_per_sec == 0 {
                    return self.span_us();
                }
                self.span_us() + self.last_sample_bytes as i64 * 1_000_000 / bytes_per_sec
            }
            MediaFormat::Video { .. } => self.span_us(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ContainerTrailer {
    tracks: Vec<TrackSummary>,
}

/// File-backed [`ContainerWriter`]
pub struct FileContainerWriter {
    path: PathBuf,
    orientation: Orientation,
    file: Option<BufWriter<File>>,
    tracks: Vec<TrackSummary>,
    started: bool,
}

impl FileContainerWriter {
    /// Create the target file. The header is only written on `start`.
    pub fn create(path: impl AsRef<Path>, orientation: Orientation) -> RecorderResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(&path)?;

        debug!("Container target created: {}", path.display());

        Ok(Self {
            path,
            orientation,
            file: Some(BufWriter::new(file)),
            tracks: Vec::new(),
            started: false,
        })
    }

    fn file(&mut self) -> RecorderResult<&mut BufWriter<File>> {
        self.file
            .as_mut()
            .ok_or_else(|| RecorderError::Container("Container already closed".to_string()))
    }
}

impl ContainerWriter for FileContainerWriter {
    fn add_track(&mut self, format: &MediaFormat) -> RecorderResult<usize> {
        if self.started {
            return Err(RecorderError::MuxerAlreadyStarted);
        }
        if self.tracks.len() >= u8::MAX as usize {
            return Err(RecorderError::Container("Too many tracks".to_string()));
        }
        self.tracks.push(TrackSummary::new(format.clone()));
        Ok(self.tracks.len() - 1)
    }

    fn start(&mut self) -> RecorderResult<()> {
        if self.started {
            return Err(RecorderError::MuxerAlreadyStarted);
        }

        let header = ContainerHeader {
            orientation_degrees: self.orientation.degrees(),
            created_at: Utc::now(),
            tracks: self.tracks.iter().map(|t| t.format.clone()).collect(),
        };
        let header_json = serde_json::to_vec(&header)?;

        let file = self.file()?;
        file.write_all(CONTAINER_MAGIC)?;
        file.write_all(&(header_json.len() as u32).to_le_bytes())?;
        file.write_all(&header_json)?;

        self.started = true;
        info!(
            "Container started: {} ({} tracks, orientation {})",
            self.path.display(),
            header.tracks.len(),
            header.orientation_degrees
        );
        Ok(())
    }

    fn write_sample(&mut self, track_index: usize, sample: &EncodedSample) -> RecorderResult<()> {
        if !self.started {
            return Err(RecorderError::Container("Container not started".to_string()));
        }
        if track_index >= self.tracks.len() {
            return Err(RecorderError::Container(format!(
                "Unknown track index {}",
                track_index
            )));
        }

        let file = self.file()?;
        file.write_all(&[TAG_SAMPLE, track_index as u8, sample.flags.bits()])?;
        file.write_all(&sample.pts_us.to_le_bytes())?;
        file.write_all(&(sample.data.len() as u32).to_le_bytes())?;
        file.write_all(&sample.data)?;

        self.tracks[track_index].record(sample.pts_us, sample.data.len() as u64);
        Ok(())
    }

    fn stop(&mut self) -> RecorderResult<()> {
        let started = self.started;
        let trailer = ContainerTrailer {
            tracks: self.tracks.clone(),
        };

        let Some(mut file) = self.file.take() else {
            return Ok(());
        };

        if started {
            let trailer_json = serde_json::to_vec(&trailer)?;
            file.write_all(&[TAG_TRAILER])?;
            file.write_all(&(trailer_json.len() as u32).to_le_bytes())?;
            file.write_all(&trailer_json)?;
        }

        file.flush()?;
        file.get_ref().sync_all()?;

        info!("Container closed: {}", self.path.display());
        Ok(())
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

/// Metadata of one sample record read back from a container
#[derive(Debug, Clone, PartialEq)]
pub struct SampleRecord {
    pub track_index: usize,
    pub pts_us: i64,
    pub flags: SampleFlags,
    pub size: usize,
}

/// A parsed container file
#[derive(Debug, Clone)]
pub struct RecordedContainer {
    pub header: ContainerHeader,
    pub tracks: Vec<TrackSummary>,
    pub samples: Vec<SampleRecord>,
    /// Whether the trailer was present (the writer was stopped cleanly)
    pub finalized: bool,
}

impl RecordedContainer {
    /// Summary of the first track with the given role
    pub fn track(&self, role: crate::media::TrackRole) -> Option<&TrackSummary> {
        self.tracks.iter().find(|t| t.format.role() == role)
    }

    /// Timestamps of a track in file order
    pub fn timestamps(&self, track_index: usize) -> Vec<i64> {
        self.samples
            .iter()
            .filter(|s| s.track_index == track_index)
            .map(|s| s.pts_us)
            .collect()
    }
}

/// Reads containers written by [`FileContainerWriter`]
pub struct ContainerReader;

impl ContainerReader {
    pub fn open(path: impl AsRef<Path>) -> RecorderResult<RecordedContainer> {
        let path = path.as_ref();
        let mut reader = BufReader::new(File::open(path)?);

        let mut magic = [0u8; 8];
        reader
            .read_exact(&mut magic)
            .map_err(|_| RecorderError::Container(format!("{} is empty or truncated", path.display())))?;
        if &magic != CONTAINER_MAGIC {
            return Err(RecorderError::Container(format!(
                "{} is not a camrec container",
                path.display()
            )));
        }

        let header_len = read_u32(&mut reader)? as usize;
        let mut header_json = vec![0u8; header_len];
        reader.read_exact(&mut header_json)?;
        let header: ContainerHeader = serde_json::from_slice(&header_json)?;

        let mut tracks: Vec<TrackSummary> =
            header.tracks.iter().cloned().map(TrackSummary::new).collect();
        let mut samples = Vec::new();
        let mut finalized = false;

        loop {
            let mut tag = [0u8; 1];
            match reader.read_exact(&mut tag) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }

            match tag[0] {
                TAG_SAMPLE => {
                    let mut fixed = [0u8; 2];
                    reader.read_exact(&mut fixed)?;
                    let track_index = fixed[0] as usize;
                    let flags = SampleFlags::from_bits(fixed[1]);

                    let mut pts = [0u8; 8];
                    reader.read_exact(&mut pts)?;
                    let pts_us = i64::from_le_bytes(pts);

                    let size = read_u32(&mut reader)? as usize;
                    let skipped =
                        std::io::copy(&mut (&mut reader).take(size as u64), &mut std::io::sink())?;
                    if skipped != size as u64 {
                        return Err(RecorderError::Container(format!(
                            "Truncated sample: {} of {} bytes",
                            skipped, size
                        )));
                    }

                    let track = tracks.get_mut(track_index).ok_or_else(|| {
                        RecorderError::Container(format!("Sample for unknown track {}", track_index))
                    })?;
                    track.record(pts_us, size as u64);

                    samples.push(SampleRecord {
                        track_index,
                        pts_us,
                        flags,
                        size,
                    });
                }
                TAG_TRAILER => {
                    let len = read_u32(&mut reader)? as usize;
                    let mut trailer_json = vec![0u8; len];
                    reader.read_exact(&mut trailer_json)?;
                    let _: ContainerTrailer = serde_json::from_slice(&trailer_json)?;
                    finalized = true;
                    break;
                }
                other => {
                    return Err(RecorderError::Container(format!(
                        "Unknown record tag 0x{:02x}",
                        other
                    )))
                }
            }
        }

        Ok(RecordedContainer {
            header,
            tracks,
            samples,
            finalized,
        })
    }
}

fn read_u32(reader: &mut impl Read) -> RecorderResult<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}
