//! AVI writer

use crate::chunks::{
    begin_list, write_chunk, Chunk, ChunkHeader, ChunkKind, FourCC, IndexEntry, ListChunk,
    StreamChunk, CHUNK_HEADER_SIZE,
};
use crate::error::{AviError, Result};
use crate::track::Track;
use crate::types::{AviFlags, AviHeader, StreamHeader, StreamType};
use byteorder::{LittleEndian, WriteBytesExt};
use framecap_containers::MovieWriter;
use framecap_core::format::{keys, Format, MediaType, ENCODING_AVI_DIB, MIME_AVI};
use framecap_core::{Buffer, Payload, Rational};
use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

/// Alignment of the movi list
const MOVI_ALIGNMENT: u64 = 2048;

/// Writer configuration
#[derive(Debug, Clone)]
pub struct AviWriterConfig {
    /// File size at which [`MovieWriter::is_data_limit_reached`] reports true
    pub max_riff_size: u64,
    /// Write an idx1 index on close
    pub write_index: bool,
}

impl Default for AviWriterConfig {
    fn default() -> Self {
        AviWriterConfig {
            max_riff_size: 1 << 30,
            write_index: true,
        }
    }
}

impl AviWriterConfig {
    pub fn with_max_riff_size(mut self, size: u64) -> Self {
        self.max_riff_size = size;
        self
    }

    pub fn with_index(mut self, write_index: bool) -> Self {
        self.write_index = write_index;
        self
    }
}

/// Writes AVI 1.0 files.
///
/// Tracks are added before the first [`AviWriter::write`]. The header is
/// written lazily and patched with the final lengths by [`AviWriter::close`].
/// Each chunk of a video track lasts one tick of its frame rate; buffers
/// covering several ticks are followed by empty chunks, which readers treat
/// as a repeat of the previous frame.
pub struct AviWriter<W: Write + Seek> {
    writer: W,
    config: AviWriterConfig,
    tracks: Vec<Track>,
    chunk_ids: Vec<FourCC>,
    index_entries: Vec<IndexEntry>,
    /// Position of the avih payload
    avih_pos: u64,
    /// Position of each strh payload
    strh_pos: Vec<u64>,
    /// Position of the movi LIST header
    movi_pos: u64,
    data_end: u64,
    header_written: bool,
    closed: bool,
}

impl AviWriter<BufWriter<File>> {
    /// Create a file and write to it with the default configuration.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::create_with_config(path, AviWriterConfig::default())
    }

    pub fn create_with_config<P: AsRef<Path>>(path: P, config: AviWriterConfig) -> Result<Self> {
        let file = File::create(path.as_ref())?;
        log::debug!("Writing AVI to {}", path.as_ref().display());
        Ok(Self::new(BufWriter::new(file), config))
    }
}

impl<W: Write + Seek> AviWriter<W> {
    /// Create new writer
    pub fn new(writer: W, config: AviWriterConfig) -> Self {
        AviWriter {
            writer,
            config,
            tracks: Vec::new(),
            chunk_ids: Vec::new(),
            index_entries: Vec::new(),
            avih_pos: 0,
            strh_pos: Vec::new(),
            movi_pos: 0,
            data_end: 0,
            header_written: false,
            closed: false,
        }
    }

    pub fn config(&self) -> &AviWriterConfig {
        &self.config
    }

    pub fn track(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    /// Add a video or audio track.
    pub fn add_track(&mut self, format: &Format) -> Result<usize> {
        if self.header_written {
            return Err(AviError::Unsupported(
                "tracks cannot be added after the first write".into(),
            ));
        }
        if self.tracks.len() >= 100 {
            return Err(AviError::Unsupported("at most 100 tracks".into()));
        }

        let track = Track::for_format(format)?;
        let index = self.tracks.len();
        let kind = match track.stream_type() {
            StreamType::Audio => ChunkKind::Audio,
            _ if track.format().encoding().as_deref() == Some(ENCODING_AVI_DIB) => ChunkKind::RawVideo,
            _ => ChunkKind::CompressedVideo,
        };
        self.chunk_ids.push(StreamChunk::new(index as u16, kind).fourcc());
        log::debug!("Added track {}: {}", index, track.format());
        self.tracks.push(track);
        Ok(index)
    }

    /// Write header
    fn write_header(&mut self) -> Result<()> {
        if self.header_written {
            return Ok(());
        }

        // RIFF header with placeholder size
        ChunkHeader {
            id: FourCC::RIFF,
            size: 0,
        }
        .write(&mut self.writer)?;
        self.writer.write_all(FourCC::AVI.as_bytes())?;

        self.write_hdrl_list()?;

        // Pad with JUNK so that movi starts on an aligned boundary
        let current_pos = self.writer.stream_position()?;
        let mut target_pos = current_pos.div_ceil(MOVI_ALIGNMENT) * MOVI_ALIGNMENT;
        if target_pos - current_pos < 8 {
            target_pos += MOVI_ALIGNMENT;
        }
        let junk = vec![0u8; (target_pos - current_pos - 8) as usize];
        write_chunk(&mut self.writer, FourCC::JUNK, &junk)?;

        self.movi_pos = self.writer.stream_position()?;
        begin_list(&mut self.writer, FourCC::MOVI)?;
        self.data_end = self.writer.stream_position()?;

        self.header_written = true;
        log::debug!("Header written, movi starts at {}", self.movi_pos);
        Ok(())
    }

    /// Build hdrl in memory and write it, remembering where the avih and
    /// strh payloads land for [`Self::update_headers`].
    fn write_hdrl_list(&mut self) -> Result<()> {
        let hdrl_start = self.writer.stream_position()?;
        let mut hdrl = ListChunk::new(FourCC::HDRL);

        // first child of a list follows its header and list type
        let mut child_pos = hdrl_start + CHUNK_HEADER_SIZE + 4;
        let avih = self.avih_chunk();
        self.avih_pos = child_pos + CHUNK_HEADER_SIZE;
        child_pos += avih.span();
        hdrl.push(avih);

        for index in 0..self.tracks.len() {
            let strl = self.strl_list(index);
            self.strh_pos.push(child_pos + 2 * CHUNK_HEADER_SIZE + 4);
            child_pos += CHUNK_HEADER_SIZE + strl.payload_size();
            hdrl.push(strl);
        }

        hdrl.write(&mut self.writer)
    }

    fn avih_chunk(&self) -> Chunk {
        let video = self
            .tracks
            .iter()
            .find(|t| t.stream_type() == StreamType::Video);

        let mut header = AviHeader {
            flags: if self.config.write_index {
                AviFlags::IS_INTERLEAVED | AviFlags::HAS_INDEX
            } else {
                AviFlags::IS_INTERLEAVED
            },
            streams: self.tracks.len() as u32,
            ..Default::default()
        };
        if let Some(track) = video {
            if track.rate() > 0 {
                header.microseconds_per_frame =
                    (1_000_000u64 * track.scale() as u64 / track.rate() as u64) as u32;
            }
            if let Some(vf) = track.video_format() {
                header.width = vf.width.unsigned_abs();
                header.height = vf.abs_height();
            }
        }
        Chunk::new(FourCC::AVIH, header.to_bytes())
    }

    /// strl for one track. strh is always the first child.
    fn strl_list(&self, index: usize) -> ListChunk {
        let track = &self.tracks[index];
        let strf = match (track.video_format(), track.audio_format()) {
            (Some(vf), _) => vf.to_bytes(),
            (None, Some(af)) => af.to_bytes(),
            (None, None) => Vec::new(),
        };

        let mut strl = ListChunk::new(FourCC::STRL);
        strl.push(Chunk::new(FourCC::STRH, track.header().to_bytes()));
        strl.push(Chunk::new(FourCC::STRF, strf));
        if let Some(name) = track.name() {
            let mut bytes = name.as_bytes().to_vec();
            bytes.push(0);
            strl.push(Chunk::new(FourCC::STRN, bytes));
        }
        strl
    }

    /// Append one chunk to movi and record it in the track and the index.
    fn append_chunk(&mut self, track: usize, data: &[u8], ticks: i64, keyframe: bool) -> Result<()> {
        let chunk_id = self.chunk_ids[track];
        let chunk_pos = self.writer.stream_position()?;
        // idx1 offsets are relative to the movi list type
        let offset = chunk_pos - (self.movi_pos + 8);

        write_chunk(&mut self.writer, chunk_id, data)?;

        if self.config.write_index {
            self.index_entries.push(IndexEntry {
                chunk_id,
                flags: if keyframe { IndexEntry::KEYFRAME } else { 0 },
                offset: offset as u32,
                size: data.len() as u32,
            });
        }
        self.tracks[track].push_sample(chunk_pos + 8, data.len() as u32, ticks, keyframe);
        self.data_end = self.writer.stream_position()?;
        Ok(())
    }

    /// Append a buffer to a track.
    ///
    /// Buffers marked DISCARD are skipped. Video buffers marked SAME_DATA are
    /// stored as empty chunks.
    pub fn write(&mut self, track: usize, buffer: &Buffer) -> Result<()> {
        if self.closed {
            return Err(AviError::Unsupported("writer is closed".into()));
        }
        if track >= self.tracks.len() {
            return Err(AviError::InvalidStream(track));
        }
        if buffer.is_discard() {
            return Ok(());
        }

        let data: &[u8] = match &buffer.payload {
            Payload::Empty => &[],
            Payload::Bytes(bytes) => bytes.as_ref(),
            Payload::Raster(_) => {
                return Err(AviError::UnsupportedMediaType(
                    "raster frames must be encoded before muxing".into(),
                ))
            }
        };

        self.write_header()?;

        match self.tracks[track].stream_type() {
            StreamType::Audio => {
                let align = self.tracks[track].block_align().max(1) as usize;
                if data.len() % align != 0 {
                    return Err(AviError::InvalidChunk {
                        id: *self.chunk_ids[track].as_bytes(),
                        message: format!("{} bytes is not a multiple of {}", data.len(), align),
                    });
                }
                let ticks = self.tracks[track].ticks_for_chunk(data.len() as u32);
                self.append_chunk(track, data, ticks, true)
            }
            _ => {
                let time_scale = self.tracks[track].time_scale();
                let mut ticks = (buffer.duration() * time_scale).round(1).to_i64();
                if ticks < 1 {
                    log::warn!(
                        "Track {}: buffer at {} is shorter than one frame, writing it anyway",
                        track,
                        buffer.timestamp
                    );
                    ticks = 1;
                }

                if buffer.is_same_data() {
                    self.append_chunk(track, &[], 1, false)?;
                } else {
                    self.append_chunk(track, data, 1, buffer.is_keyframe())?;
                }
                for _ in 1..ticks {
                    self.append_chunk(track, &[], 1, false)?;
                }
                Ok(())
            }
        }
    }

    /// Whether the file has reached the configured size limit, counting the
    /// index that close would still write.
    pub fn is_data_limit_reached(&self) -> bool {
        let index_size = if self.config.write_index {
            8 + (self.index_entries.len() * IndexEntry::SIZE) as u64
        } else {
            0
        };
        self.data_end + index_size >= self.config.max_riff_size
    }

    /// Duration written to a track
    pub fn duration(&self, track: usize) -> Result<Rational> {
        self.tracks
            .get(track)
            .map(Track::duration)
            .ok_or(AviError::InvalidStream(track))
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Finish the file. Calling it again has no effect.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.write_header()?;

        let movi_end = self.writer.stream_position()?;
        self.writer.seek(SeekFrom::Start(self.movi_pos + 4))?;
        self.writer
            .write_u32::<LittleEndian>((movi_end - self.movi_pos - 8) as u32)?;
        self.writer.seek(SeekFrom::Start(movi_end))?;

        if self.config.write_index {
            self.write_index()?;
        }

        let file_end = self.writer.stream_position()?;
        self.writer.seek(SeekFrom::Start(4))?;
        self.writer.write_u32::<LittleEndian>((file_end - 8) as u32)?;

        self.update_headers()?;
        self.writer.seek(SeekFrom::Start(file_end))?;
        self.writer.flush()?;

        self.closed = true;
        log::debug!(
            "AVI closed: {} tracks, {} chunks, {} bytes",
            self.tracks.len(),
            self.index_entries.len(),
            file_end
        );
        Ok(())
    }

    fn write_index(&mut self) -> Result<()> {
        ChunkHeader {
            id: FourCC::IDX1,
            size: (self.index_entries.len() * IndexEntry::SIZE) as u32,
        }
        .write(&mut self.writer)?;
        for entry in &self.index_entries {
            entry.write(&mut self.writer)?;
        }
        Ok(())
    }

    /// Patch frame counts and buffer sizes into avih and each strh.
    fn update_headers(&mut self) -> Result<()> {
        let total_frames = self
            .tracks
            .iter()
            .find(|t| t.stream_type() == StreamType::Video)
            .map_or(0, |t| t.sample_count() as u32);
        let max_chunk = self.tracks.iter().map(Track::max_chunk_size).max().unwrap_or(0);

        self.writer
            .seek(SeekFrom::Start(self.avih_pos + AviHeader::TOTAL_FRAMES_OFFSET))?;
        self.writer.write_u32::<LittleEndian>(total_frames)?;
        self.writer
            .seek(SeekFrom::Start(self.avih_pos + AviHeader::BUFFER_SIZE_OFFSET))?;
        self.writer.write_u32::<LittleEndian>(max_chunk)?;

        for (track, &pos) in self.tracks.iter_mut().zip(&self.strh_pos) {
            track.set_length_in_header();
            self.writer
                .seek(SeekFrom::Start(pos + StreamHeader::LENGTH_OFFSET))?;
            self.writer.write_u32::<LittleEndian>(track.header().length)?;
            self.writer
                .seek(SeekFrom::Start(pos + StreamHeader::BUFFER_SIZE_OFFSET))?;
            self.writer
                .write_u32::<LittleEndian>(track.header().suggested_buffer_size)?;
        }
        Ok(())
    }

    /// Get the underlying writer back. Call [`AviWriter::close`] first.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Seek + Send> MovieWriter for AviWriter<W> {
    fn file_format(&self) -> Format {
        Format::builder()
            .with(keys::MEDIA_TYPE, MediaType::File)
            .with_str(keys::MIME_TYPE, MIME_AVI)
            .build()
    }

    fn add_track(&mut self, format: Format) -> framecap_core::Result<usize> {
        Ok(AviWriter::add_track(self, &format)?)
    }

    fn format(&self, track: usize) -> Option<&Format> {
        self.tracks.get(track).map(Track::format)
    }

    fn track_count(&self) -> usize {
        self.tracks.len()
    }

    fn write(&mut self, track: usize, buffer: &Buffer) -> framecap_core::Result<()> {
        Ok(AviWriter::write(self, track, buffer)?)
    }

    fn close(&mut self) -> framecap_core::Result<()> {
        Ok(AviWriter::close(self)?)
    }

    fn is_vfr_supported(&self) -> bool {
        false
    }

    fn is_data_limit_reached(&self) -> bool {
        AviWriter::is_data_limit_reached(self)
    }

    fn duration(&self, track: usize) -> framecap_core::Result<Rational> {
        Ok(AviWriter::duration(self, track)?)
    }
}
