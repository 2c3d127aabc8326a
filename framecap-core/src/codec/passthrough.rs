//! A codec that forwards buffers unchanged.

use super::{negotiate, Codec};
use crate::buffer::Buffer;
use crate::error::Result;
use crate::format::Format;
use crate::rational::Rational;
use tracing::trace;

/// Copies metadata and data from input to output.
///
/// With a start or end time set, buffers that lie entirely outside
/// `[start_time, end_time)` are marked DISCARD. Buffers that only partly
/// overlap the window are passed through as a whole.
#[derive(Debug, Clone)]
pub struct PassThroughCodec {
    formats: Vec<Format>,
    input_format: Option<Format>,
    output_format: Option<Format>,
    start_time: Option<Rational>,
    end_time: Option<Rational>,
}

impl Default for PassThroughCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl PassThroughCodec {
    /// Create a codec that accepts any format.
    pub fn new() -> Self {
        Self {
            formats: vec![Format::new()],
            input_format: None,
            output_format: None,
            start_time: None,
            end_time: None,
        }
    }

    /// Restrict output to buffers ending after `start_time`.
    pub fn with_start_time(mut self, start_time: Rational) -> Self {
        self.start_time = Some(start_time);
        self
    }

    /// Restrict output to buffers starting before `end_time`.
    pub fn with_end_time(mut self, end_time: Rational) -> Self {
        self.end_time = Some(end_time);
        self
    }

    pub fn start_time(&self) -> Option<Rational> {
        self.start_time
    }

    pub fn set_start_time(&mut self, start_time: Option<Rational>) {
        self.start_time = start_time;
    }

    pub fn end_time(&self) -> Option<Rational> {
        self.end_time
    }

    pub fn set_end_time(&mut self, end_time: Option<Rational>) {
        self.end_time = end_time;
    }

    /// The negotiated input format.
    pub fn input_format(&self) -> Option<&Format> {
        self.input_format.as_ref()
    }

    /// The negotiated output format.
    pub fn output_format(&self) -> Option<&Format> {
        self.output_format.as_ref()
    }
}

impl Codec for PassThroughCodec {
    fn name(&self) -> &str {
        "passthrough"
    }

    fn input_formats(&self) -> &[Format] {
        &self.formats
    }

    fn output_formats(&self) -> &[Format] {
        &self.formats
    }

    fn set_input_format(&mut self, format: Format) -> Option<Format> {
        self.input_format = negotiate(&self.formats, &format);
        self.input_format.clone()
    }

    fn set_output_format(&mut self, format: Format) -> Option<Format> {
        self.output_format = negotiate(&self.formats, &format);
        self.output_format.clone()
    }

    fn process(&mut self, input: &Buffer, output: &mut Buffer) -> Result<()> {
        output.set_meta_to(input);
        output.set_data_to(input);

        let start = output.timestamp;
        let end = output.end_time();

        if let Some(window_start) = self.start_time {
            if !output.is_discard() {
                if end <= window_start {
                    output.discard();
                } else if start < window_start {
                    trace!(%start, %end, %window_start, "buffer partially before time range");
                }
            }
        }
        if let Some(window_end) = self.end_time {
            if !output.is_discard() {
                if start >= window_end {
                    output.discard();
                } else if end > window_end {
                    trace!(%start, %end, %window_end, "buffer partially after time range");
                }
            }
        }
        Ok(())
    }
}
