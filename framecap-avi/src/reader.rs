//! AVI reader

use crate::chunks::{ChunkHeader, FourCC, IndexEntry, ListChunk, StreamChunk, CHUNK_HEADER_SIZE};
use crate::error::{AviError, Result};
use crate::track::Track;
use crate::types::{AudioFormat, AviHeader, StreamHeader, StreamType, VideoFormat};
use bytes::Bytes;
use framecap_containers::{track_not_found, MovieReader};
use framecap_core::format::{keys, Format, MediaType, MIME_AVI};
use framecap_core::{Buffer, BufferFlags, Payload, Rational};
use std::cell::Cell;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

/// Maximum LIST nesting inside movi
const MAX_MOVI_DEPTH: u32 = 4;

/// Top-level layout found while walking the RIFF chunk
struct Layout {
    hdrl: Option<Vec<u8>>,
    /// Position of the movi list type
    movi_pos: u64,
    movi_end: u64,
    index: Vec<IndexEntry>,
}

/// Reads AVI 1.0 files.
///
/// Samples are taken from the idx1 index when present, otherwise from a scan
/// of the movi list. Every track keeps its own read cursor.
pub struct AviReader<R: Read + Seek> {
    reader: R,
    header: AviHeader,
    tracks: Vec<Track>,
    movie_duration: Cell<Option<Rational>>,
}

impl AviReader<BufReader<File>> {
    /// Open a file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        log::debug!("Reading AVI from {}", path.as_ref().display());
        Self::new(BufReader::new(file))
    }
}

impl<R: Read + Seek> AviReader<R> {
    /// Parse headers and build the sample tables
    pub fn new(mut reader: R) -> Result<Self> {
        let file_len = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;

        let riff = ChunkHeader::read(&mut reader).map_err(|_| AviError::InvalidRiff)?;
        if riff.id != FourCC::RIFF {
            return Err(AviError::InvalidRiff);
        }
        let mut form = [0u8; 4];
        reader.read_exact(&mut form)?;
        if FourCC(form) != FourCC::AVI {
            return Err(AviError::InvalidAvi);
        }

        // An unfinished file has a zero RIFF size
        let riff_end = match riff.size {
            0 => file_len,
            size => (CHUNK_HEADER_SIZE + size as u64).min(file_len),
        };
        let layout = read_layout(&mut reader, riff_end)?;

        let hdrl = ListChunk::parse(layout.hdrl.as_deref().ok_or(AviError::MissingChunk("hdrl"))?)?;
        if layout.movi_pos == 0 {
            return Err(AviError::MissingChunk("movi"));
        }
        let header = AviHeader::parse(
            &hdrl
                .leaf(FourCC::AVIH)
                .ok_or(AviError::MissingChunk("avih"))?
                .data,
        )?;
        let mut tracks = parse_tracks(&hdrl)?;

        if layout.index.is_empty() {
            log::debug!("No idx1 index, scanning movi");
            scan_movi(
                &mut reader,
                &mut tracks,
                layout.movi_pos + 4,
                layout.movi_end,
                0,
            )?;
        } else {
            tracks_from_index(&mut tracks, &layout.index, layout.movi_pos);
        }

        for (i, track) in tracks.iter().enumerate() {
            log::debug!(
                "Track {}: {} ({} chunks)",
                i,
                track.format(),
                track.sample_count()
            );
        }

        Ok(AviReader {
            reader,
            header,
            tracks,
            movie_duration: Cell::new(None),
        })
    }

    /// Main AVI header
    pub fn header(&self) -> &AviHeader {
        &self.header
    }

    pub fn track(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    fn track_checked(&self, index: usize) -> framecap_core::Result<&Track> {
        self.tracks.get(index).ok_or_else(|| track_not_found(index))
    }

    fn read_sample(&mut self, index: usize, buffer: &mut Buffer) -> Result<()> {
        let track = &self.tracks[index];
        let media = track.media_type();
        if !matches!(media, Some(MediaType::Video) | Some(MediaType::Audio)) {
            return Err(AviError::UnsupportedMediaType(format!(
                "cannot read {:?} track {}",
                track.stream_type(),
                index
            )));
        }

        buffer.format = track.format().clone();
        buffer.track = index;

        let Some(sample) = track.pending().copied() else {
            buffer.timestamp = track.read_time();
            buffer.sample_duration = Rational::ZERO;
            buffer.sample_count = 1;
            buffer.flags = BufferFlags::END_OF_MEDIA | BufferFlags::DISCARD;
            buffer.payload = Payload::Empty;
            return Ok(());
        };

        buffer.timestamp = track.ticks_to_time(track.start_time() + sample.timestamp);
        buffer.sample_duration = track.ticks_to_time(1);
        buffer.sample_count = sample.duration.max(1);
        buffer.flags = BufferFlags::empty();
        if sample.keyframe {
            buffer.flags |= BufferFlags::KEYFRAME;
        }

        if sample.length == 0 {
            if media == Some(MediaType::Video) {
                buffer.flags |= BufferFlags::SAME_DATA;
            }
            buffer.payload = Payload::Empty;
        } else {
            let mut data = vec![0u8; sample.length as usize];
            self.reader.seek(SeekFrom::Start(sample.offset))?;
            self.reader.read_exact(&mut data)?;
            buffer.payload = Payload::Bytes(Bytes::from(data));
        }

        self.tracks[index].read_index += 1;
        Ok(())
    }
}

fn read_layout<R: Read + Seek>(reader: &mut R, riff_end: u64) -> Result<Layout> {
    let mut layout = Layout {
        hdrl: None,
        movi_pos: 0,
        movi_end: 0,
        index: Vec::new(),
    };

    let mut pos = 12;
    while pos + CHUNK_HEADER_SIZE <= riff_end {
        reader.seek(SeekFrom::Start(pos))?;
        let header = ChunkHeader::read(reader)?;
        let data_end = pos + CHUNK_HEADER_SIZE + header.size as u64;

        if header.id == FourCC::LIST && header.size >= 4 {
            let mut list_type = [0u8; 4];
            reader.read_exact(&mut list_type)?;
            match FourCC(list_type) {
                FourCC::HDRL => {
                    if data_end > riff_end {
                        return Err(AviError::InsufficientData {
                            needed: header.size as usize,
                            available: (riff_end - pos - CHUNK_HEADER_SIZE) as usize,
                        });
                    }
                    let mut data = vec![0u8; header.size as usize];
                    data[..4].copy_from_slice(&list_type);
                    reader.read_exact(&mut data[4..])?;
                    layout.hdrl = Some(data);
                }
                FourCC::MOVI => {
                    layout.movi_pos = pos + CHUNK_HEADER_SIZE;
                    if data_end > riff_end {
                        log::warn!("movi list is truncated at {}", riff_end);
                    }
                    layout.movi_end = data_end.min(riff_end);
                }
                other => log::trace!("Skipping LIST {}", other),
            }
        } else if header.id == FourCC::IDX1 {
            let available = riff_end.saturating_sub(pos + CHUNK_HEADER_SIZE);
            let mut data = vec![0u8; (header.size as u64).min(available) as usize];
            reader.read_exact(&mut data)?;
            layout.index = IndexEntry::parse_table(&data);
        } else {
            log::trace!("Skipping chunk {} ({} bytes)", header.id, header.size);
        }

        pos += header.span();
    }

    Ok(layout)
}

fn parse_tracks(hdrl: &ListChunk) -> Result<Vec<Track>> {
    let mut tracks = Vec::new();
    for strl in hdrl.sublists(FourCC::STRL) {
        let header = StreamHeader::parse(
            &strl
                .leaf(FourCC::STRH)
                .ok_or(AviError::MissingChunk("strh"))?
                .data,
        )?;
        let strf = strl.leaf(FourCC::STRF).map(|c| c.data.as_slice());

        let (video, audio) = match (header.stream_type, strf) {
            (StreamType::Video, Some(data)) => (Some(VideoFormat::parse(data)?), None),
            (StreamType::Audio, Some(data)) => (None, Some(AudioFormat::parse(data)?)),
            _ => (None, None),
        };
        let name = strl.leaf(FourCC::STRN).map(|c| {
            String::from_utf8_lossy(&c.data)
                .trim_end_matches('\0')
                .to_string()
        });

        tracks.push(Track::from_stream(header, video, audio, name));
    }
    Ok(tracks)
}

/// Stream number of a chunk holding samples
fn stream_of(id: FourCC) -> Option<u16> {
    StreamChunk::parse(id)
        .filter(StreamChunk::carries_samples)
        .map(|chunk| chunk.stream)
}

fn tracks_from_index(tracks: &mut [Track], index: &[IndexEntry], movi_pos: u64) {
    // Some writers store absolute file offsets instead of movi-relative ones
    let base = match index.first() {
        Some(first) if first.offset as u64 >= movi_pos => 0,
        _ => movi_pos,
    };

    for entry in index {
        let Some(number) = stream_of(entry.chunk_id) else {
            continue;
        };
        let Some(track) = tracks.get_mut(number as usize) else {
            log::debug!("Index entry for missing stream {}", number);
            continue;
        };
        let ticks = track.ticks_for_chunk(entry.size);
        track.push_sample(
            base + entry.offset as u64 + CHUNK_HEADER_SIZE,
            entry.size,
            ticks,
            entry.is_keyframe() || track.stream_type() == StreamType::Audio,
        );
    }
}

fn scan_movi<R: Read + Seek>(
    reader: &mut R,
    tracks: &mut [Track],
    start: u64,
    end: u64,
    depth: u32,
) -> Result<()> {
    let mut pos = start;
    while pos + CHUNK_HEADER_SIZE <= end {
        reader.seek(SeekFrom::Start(pos))?;
        let header = ChunkHeader::read(reader)?;
        let data_end = pos + CHUNK_HEADER_SIZE + header.size as u64;

        if header.id == FourCC::LIST {
            if depth < MAX_MOVI_DEPTH && header.size >= 4 {
                scan_movi(reader, tracks, pos + 12, data_end.min(end), depth + 1)?;
            }
        } else {
            if data_end > end {
                log::warn!("Chunk {} at {} is truncated", header.id, pos);
                break;
            }
            if let Some(track) = stream_of(header.id).and_then(|n| tracks.get_mut(n as usize)) {
                let ticks = track.ticks_for_chunk(header.size);
                track.push_sample(pos + CHUNK_HEADER_SIZE, header.size, ticks, true);
            }
        }

        pos += header.span();
    }
    Ok(())
}

impl<R: Read + Seek> MovieReader for AviReader<R> {
    fn file_format(&self) -> Format {
        Format::builder()
            .with(keys::MEDIA_TYPE, MediaType::File)
            .with_str(keys::MIME_TYPE, MIME_AVI)
            .build()
    }

    fn track_count(&self) -> usize {
        self.tracks.len()
    }

    fn format(&self, track: usize) -> Option<&Format> {
        self.tracks.get(track).map(Track::format)
    }

    fn chunk_count(&self, track: usize) -> framecap_core::Result<usize> {
        Ok(self.track_checked(track)?.sample_count())
    }

    fn time_scale(&self, track: usize) -> framecap_core::Result<Rational> {
        Ok(self.track_checked(track)?.time_scale())
    }

    fn read(&mut self, track: usize, buffer: &mut Buffer) -> framecap_core::Result<()> {
        self.track_checked(track)?;
        Ok(self.read_sample(track, buffer)?)
    }

    fn next_track(&self) -> Option<usize> {
        self.tracks
            .iter()
            .enumerate()
            .filter(|(_, t)| t.pending().is_some())
            .min_by_key(|(_, t)| t.read_time())
            .map(|(i, _)| i)
    }

    fn movie_duration(&self) -> Rational {
        if let Some(duration) = self.movie_duration.get() {
            return duration;
        }
        let duration = self
            .tracks
            .iter()
            .map(Track::duration)
            .max()
            .unwrap_or(Rational::ZERO);
        self.movie_duration.set(Some(duration));
        duration
    }

    fn invalidate_duration(&mut self) {
        self.movie_duration.set(None);
    }

    fn duration(&self, track: usize) -> framecap_core::Result<Rational> {
        Ok(self.track_checked(track)?.duration())
    }

    fn time_to_sample(&self, track: usize, time: Rational) -> framecap_core::Result<usize> {
        Ok(self.track_checked(track)?.time_to_sample(time))
    }

    fn sample_to_time(&self, track: usize, sample: usize) -> framecap_core::Result<Rational> {
        Ok(self.track_checked(track)?.sample_to_time(sample))
    }

    fn set_movie_read_time(&mut self, time: Rational) {
        for track in &mut self.tracks {
            track.seek_keyframe(time);
        }
    }

    fn read_time(&self, track: usize) -> framecap_core::Result<Rational> {
        Ok(self.track_checked(track)?.read_time())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::{AviWriter, AviWriterConfig};
    use framecap_core::Error as CoreError;
    use std::io::Cursor;

    fn video_format() -> Format {
        Format::builder()
            .with(keys::MEDIA_TYPE, MediaType::Video)
            .with_str(keys::ENCODING, "MJPG")
            .with(keys::FRAME_RATE, Rational::from_int(10))
            .with(keys::WIDTH, 16)
            .with(keys::HEIGHT, 8)
            .build()
    }

    fn frame(n: u8, keyframe: bool) -> Buffer {
        Buffer {
            timestamp: Rational::new(n as i64, 10),
            sample_duration: Rational::new(1, 10),
            flags: if keyframe {
                BufferFlags::KEYFRAME
            } else {
                BufferFlags::empty()
            },
            payload: Payload::Bytes(Bytes::from(vec![n; 3])),
            ..Buffer::new()
        }
    }

    fn write_movie(config: AviWriterConfig, frames: u8) -> Vec<u8> {
        let mut writer = AviWriter::new(Cursor::new(Vec::new()), config);
        writer.add_track(&video_format()).unwrap();
        for n in 0..frames {
            writer.write(0, &frame(n, n % 5 == 0)).unwrap();
        }
        writer.close().unwrap();
        writer.into_inner().into_inner()
    }

    #[test]
    fn test_read_back() {
        let data = write_movie(AviWriterConfig::default(), 12);
        let mut reader = AviReader::new(Cursor::new(data)).unwrap();

        assert_eq!(reader.header().total_frames, 12);
        assert_eq!(reader.track_count(), 1);
        assert_eq!(reader.chunk_count(0).unwrap(), 12);
        assert_eq!(reader.time_scale(0).unwrap(), Rational::from_int(10));
        assert_eq!(reader.movie_duration(), Rational::new(6, 5));
        assert!(reader.format(0).unwrap().matches(&video_format()));
        assert_eq!(reader.track(0).unwrap().header().length, 12);

        let mut buffer = Buffer::new();
        for n in 0..12u8 {
            assert_eq!(reader.next_track(), Some(0));
            reader.read(0, &mut buffer).unwrap();
            assert_eq!(buffer.timestamp, Rational::new(n as i64, 10));
            assert_eq!(buffer.payload.as_bytes().unwrap().as_ref(), &[n; 3]);
            assert_eq!(buffer.is_keyframe(), n % 5 == 0);
        }
        assert_eq!(reader.next_track(), None);
        reader.read(0, &mut buffer).unwrap();
        assert!(buffer.is_end_of_media());
        assert!(buffer.is_discard());
    }

    #[test]
    fn test_scan_without_index() {
        let data = write_movie(AviWriterConfig::default().with_index(false), 4);
        let mut reader = AviReader::new(Cursor::new(data)).unwrap();
        assert_eq!(reader.chunk_count(0).unwrap(), 4);

        let mut buffer = Buffer::new();
        reader.read(0, &mut buffer).unwrap();
        reader.read(0, &mut buffer).unwrap();
        assert_eq!(buffer.payload.as_bytes().unwrap().as_ref(), &[1; 3]);
    }

    #[test]
    fn test_absolute_index_offsets() {
        let mut data = write_movie(AviWriterConfig::default(), 3);
        // Rewrite the idx1 offsets as absolute file positions
        let movi_type_pos = 2056u32;
        let idx_data = data.len() - 3 * IndexEntry::SIZE;
        for i in 0..3 {
            let at = idx_data + i * IndexEntry::SIZE + 8;
            let rel = u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]]);
            data[at..at + 4].copy_from_slice(&(rel + movi_type_pos).to_le_bytes());
        }

        let mut reader = AviReader::new(Cursor::new(data)).unwrap();
        let mut buffer = Buffer::new();
        reader.read(0, &mut buffer).unwrap();
        reader.read(0, &mut buffer).unwrap();
        reader.read(0, &mut buffer).unwrap();
        assert_eq!(buffer.payload.as_bytes().unwrap().as_ref(), &[2; 3]);
    }

    #[test]
    fn test_seek_to_keyframe() {
        let data = write_movie(AviWriterConfig::default(), 12);
        let mut reader = AviReader::new(Cursor::new(data)).unwrap();

        reader.set_movie_read_time(Rational::new(8, 10));
        assert_eq!(reader.read_time(0).unwrap(), Rational::new(5, 10));
        reader.set_movie_read_time(Rational::from_int(100));
        assert_eq!(reader.read_time(0).unwrap(), Rational::from_int(1));
        reader.set_movie_read_time(Rational::ZERO);
        assert_eq!(reader.read_time(0).unwrap(), Rational::ZERO);
    }

    #[test]
    fn test_invalid_files() {
        assert!(matches!(
            AviReader::new(Cursor::new(b"RIFX\0\0\0\0AVI ".to_vec())),
            Err(AviError::InvalidRiff)
        ));
        assert!(matches!(
            AviReader::new(Cursor::new(b"RIFF\x04\0\0\0WAVE".to_vec())),
            Err(AviError::InvalidAvi)
        ));
        assert!(matches!(
            AviReader::new(Cursor::new(b"RIFF\x04\0\0\0AVI ".to_vec())),
            Err(AviError::MissingChunk("hdrl"))
        ));
        assert!(matches!(
            AviReader::new(Cursor::new(b"RIFF".to_vec())),
            Err(AviError::InvalidRiff)
        ));
    }

    #[test]
    fn test_track_errors() {
        let data = write_movie(AviWriterConfig::default(), 1);
        let mut reader = AviReader::new(Cursor::new(data)).unwrap();
        assert!(matches!(
            reader.chunk_count(2),
            Err(CoreError::Container(_))
        ));
        assert!(reader.read(5, &mut Buffer::new()).is_err());
    }
}
