//! Container traits for reading and writing movies.
//!
//! Track indices are the positions returned by [`MovieWriter::add_track`] or
//! the order in which a reader discovered the tracks. All times are exact
//! [`Rational`] seconds.

use framecap_core::error::{ContainerError, Error, Result};
use framecap_core::{Buffer, Format, Rational};

/// Writer side of a container format.
pub trait MovieWriter: Send {
    /// Format of the file being written (media type `File` plus MIME type).
    fn file_format(&self) -> Format;

    /// Add a track and return its index.
    fn add_track(&mut self, format: Format) -> Result<usize>;

    /// Format of a track.
    fn format(&self, track: usize) -> Option<&Format>;

    /// Number of tracks.
    fn track_count(&self) -> usize;

    /// Append the buffer to a track.
    ///
    /// Buffers marked DISCARD are ignored.
    fn write(&mut self, track: usize, buffer: &Buffer) -> Result<()>;

    /// Finish the file. Further writes fail.
    fn close(&mut self) -> Result<()>;

    /// Whether samples of one track may have different durations.
    fn is_vfr_supported(&self) -> bool;

    /// Whether the file has grown to its size limit and should be rolled over.
    fn is_data_limit_reached(&self) -> bool;

    /// Total duration written to a track so far.
    fn duration(&self, track: usize) -> Result<Rational>;

    /// Whether nothing has been written to a track yet.
    fn is_empty(&self, track: usize) -> bool {
        self.duration(track).map_or(true, |d| d.is_zero())
    }
}

/// Reader side of a container format.
pub trait MovieReader {
    /// Format of the file being read.
    fn file_format(&self) -> Format;

    /// Number of tracks.
    fn track_count(&self) -> usize;

    /// Format of a track.
    fn format(&self, track: usize) -> Option<&Format>;

    /// Number of chunks (samples in the index) of a track.
    fn chunk_count(&self, track: usize) -> Result<usize>;

    /// Ticks per second of a track.
    fn time_scale(&self, track: usize) -> Result<Rational>;

    /// Read the next chunk of a track into `buffer`.
    ///
    /// When the track is exhausted, `buffer` gets END_OF_MEDIA and DISCARD
    /// and an empty payload.
    fn read(&mut self, track: usize, buffer: &mut Buffer) -> Result<()>;

    /// Track whose next unread chunk has the smallest timestamp.
    ///
    /// Ties go to the lowest track index. Returns `None` when every track is
    /// exhausted.
    fn next_track(&self) -> Option<usize>;

    /// Duration of the longest track. Cached until [`MovieReader::invalidate_duration`].
    fn movie_duration(&self) -> Rational;

    /// Drop the cached movie duration.
    fn invalidate_duration(&mut self);

    /// Duration of one track.
    fn duration(&self, track: usize) -> Result<Rational>;

    /// Index of the sample playing at `time`, clamped to `[0, chunk_count]`.
    fn time_to_sample(&self, track: usize, time: Rational) -> Result<usize>;

    /// Start time of a sample. Past the end, the end time of the last sample.
    fn sample_to_time(&self, track: usize, sample: usize) -> Result<Rational>;

    /// Move every track to the closest keyframe at or before `time`.
    fn set_movie_read_time(&mut self, time: Rational);

    /// Time of the next unread chunk of a track.
    fn read_time(&self, track: usize) -> Result<Rational>;
}

/// Error for a track index that does not exist.
pub fn track_not_found(index: usize) -> Error {
    Error::Container(ContainerError::TrackNotFound { index })
}
