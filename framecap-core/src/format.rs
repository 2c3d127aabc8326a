//! Typed media formats used for capability negotiation.
//!
//! A [`Format`] is an immutable map from a fixed set of keys to values. Every
//! key has a statically bound [`ValueKind`]; typed access goes through the
//! [`Key`] constants in [`keys`], so a value of the wrong type can only enter a
//! format through [`Format::try_from_entries`], which rejects it.

use crate::error::{Error, Result};
use crate::rational::Rational;
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

/// MIME type of AVI files.
pub const MIME_AVI: &str = "video/avi";
/// MIME type of QuickTime files.
pub const MIME_QUICKTIME: &str = "video/quicktime";

/// Uncompressed device independent bitmap (`BI_RGB`).
pub const ENCODING_AVI_DIB: &str = "\0\0\0\0";
/// Motion JPEG.
pub const ENCODING_AVI_MJPG: &str = "MJPG";
/// PNG compressed frames.
pub const ENCODING_AVI_PNG: &str = "png ";
/// Run-length encoded bitmaps (`BI_RLE8`).
pub const ENCODING_AVI_RLE: &str = "\x01\0\0\0";
/// TechSmith screen capture codec.
pub const ENCODING_AVI_TSCC: &str = "tscc";
/// In-memory [`Raster`](crate::buffer::Raster) frames.
pub const ENCODING_RASTER: &str = "raster";
/// Signed linear PCM.
pub const ENCODING_PCM_SIGNED: &str = "PCM_SIGNED";
/// Unsigned linear PCM.
pub const ENCODING_PCM_UNSIGNED: &str = "PCM_UNSIGNED";

/// Kind of media carried by a track or file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MediaType {
    /// Video frames.
    Video,
    /// Audio samples.
    Audio,
    /// Text or subtitles.
    Text,
    /// MIDI events.
    Midi,
    /// A whole container file.
    File,
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => write!(f, "Video"),
            Self::Audio => write!(f, "Audio"),
            Self::Text => write!(f, "Text"),
            Self::Midi => write!(f, "Midi"),
            Self::File => write!(f, "File"),
        }
    }
}

/// Byte order of multi-byte audio samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ByteOrder {
    /// Most significant byte first.
    BigEndian,
    /// Least significant byte first.
    LittleEndian,
}

impl fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BigEndian => write!(f, "BigEndian"),
            Self::LittleEndian => write!(f, "LittleEndian"),
        }
    }
}

/// The type of value a [`FormatKey`] accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Int,
    Float,
    Bool,
    Text,
    Rational,
    MediaType,
    ByteOrder,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::Text => "text",
            Self::Rational => "rational",
            Self::MediaType => "media type",
            Self::ByteOrder => "byte order",
        };
        f.write_str(name)
    }
}

/// The fixed set of format keys.
///
/// The declaration order is the iteration and display order of a [`Format`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FormatKey {
    MediaType,
    MimeType,
    Encoding,
    CompressorName,
    FrameRate,
    KeyFrameInterval,
    Width,
    Height,
    Depth,
    Quality,
    PixelAspectRatio,
    SampleRate,
    SampleSizeInBits,
    Channels,
    FrameSize,
    Signed,
    ByteOrder,
}

impl FormatKey {
    /// All keys in declaration order.
    pub const ALL: [FormatKey; 17] = [
        FormatKey::MediaType,
        FormatKey::MimeType,
        FormatKey::Encoding,
        FormatKey::CompressorName,
        FormatKey::FrameRate,
        FormatKey::KeyFrameInterval,
        FormatKey::Width,
        FormatKey::Height,
        FormatKey::Depth,
        FormatKey::Quality,
        FormatKey::PixelAspectRatio,
        FormatKey::SampleRate,
        FormatKey::SampleSizeInBits,
        FormatKey::Channels,
        FormatKey::FrameSize,
        FormatKey::Signed,
        FormatKey::ByteOrder,
    ];

    /// The value kind bound to this key.
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::MediaType => ValueKind::MediaType,
            Self::MimeType | Self::Encoding | Self::CompressorName => ValueKind::Text,
            Self::FrameRate | Self::PixelAspectRatio | Self::SampleRate => ValueKind::Rational,
            Self::KeyFrameInterval
            | Self::Width
            | Self::Height
            | Self::Depth
            | Self::SampleSizeInBits
            | Self::Channels
            | Self::FrameSize => ValueKind::Int,
            Self::Quality => ValueKind::Float,
            Self::Signed => ValueKind::Bool,
            Self::ByteOrder => ValueKind::ByteOrder,
        }
    }
}

impl fmt::Display for FormatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A dynamically typed format value.
#[derive(Debug, Clone, PartialEq)]
pub enum FormatValue {
    Int(i32),
    Float(f32),
    Bool(bool),
    Text(String),
    Rational(Rational),
    MediaType(MediaType),
    ByteOrder(ByteOrder),
}

impl FormatValue {
    /// The kind of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Int(_) => ValueKind::Int,
            Self::Float(_) => ValueKind::Float,
            Self::Bool(_) => ValueKind::Bool,
            Self::Text(_) => ValueKind::Text,
            Self::Rational(_) => ValueKind::Rational,
            Self::MediaType(_) => ValueKind::MediaType,
            Self::ByteOrder(_) => ValueKind::ByteOrder,
        }
    }
}

impl fmt::Display for FormatValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Bool(v) => write!(f, "{}", v),
            Self::Text(v) => write!(f, "{:?}", v),
            Self::Rational(v) => write!(f, "{}", v),
            Self::MediaType(v) => write!(f, "{}", v),
            Self::ByteOrder(v) => write!(f, "{}", v),
        }
    }
}

/// Rust types that can be stored in a [`Format`].
pub trait FormatValueType: Sized {
    /// Wrap into a dynamic value.
    fn into_value(self) -> FormatValue;
    /// Extract from a dynamic value of the matching kind.
    fn from_value(value: &FormatValue) -> Option<Self>;
}

macro_rules! impl_value_type {
    ($ty:ty, $variant:ident) => {
        impl FormatValueType for $ty {
            fn into_value(self) -> FormatValue {
                FormatValue::$variant(self)
            }

            fn from_value(value: &FormatValue) -> Option<Self> {
                match value {
                    FormatValue::$variant(v) => Some(v.clone()),
                    _ => None,
                }
            }
        }
    };
}

impl_value_type!(i32, Int);
impl_value_type!(f32, Float);
impl_value_type!(bool, Bool);
impl_value_type!(String, Text);
impl_value_type!(Rational, Rational);
impl_value_type!(MediaType, MediaType);
impl_value_type!(ByteOrder, ByteOrder);

/// A format key with its value type bound at compile time.
pub struct Key<T> {
    key: FormatKey,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Key<T> {
    const fn new(key: FormatKey) -> Self {
        Self {
            key,
            _marker: PhantomData,
        }
    }

    /// The untyped key.
    pub const fn key(&self) -> FormatKey {
        self.key
    }
}

impl<T> Clone for Key<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Key<T> {}

impl<T> fmt::Debug for Key<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", self.key)
    }
}

/// Typed key constants.
pub mod keys {
    use super::{ByteOrder, FormatKey, Key, MediaType};
    use crate::rational::Rational;

    pub const MEDIA_TYPE: Key<MediaType> = Key::new(FormatKey::MediaType);
    pub const MIME_TYPE: Key<String> = Key::new(FormatKey::MimeType);
    pub const ENCODING: Key<String> = Key::new(FormatKey::Encoding);
    pub const COMPRESSOR_NAME: Key<String> = Key::new(FormatKey::CompressorName);
    pub const FRAME_RATE: Key<Rational> = Key::new(FormatKey::FrameRate);
    pub const KEY_FRAME_INTERVAL: Key<i32> = Key::new(FormatKey::KeyFrameInterval);
    pub const WIDTH: Key<i32> = Key::new(FormatKey::Width);
    pub const HEIGHT: Key<i32> = Key::new(FormatKey::Height);
    pub const DEPTH: Key<i32> = Key::new(FormatKey::Depth);
    pub const QUALITY: Key<f32> = Key::new(FormatKey::Quality);
    pub const PIXEL_ASPECT_RATIO: Key<Rational> = Key::new(FormatKey::PixelAspectRatio);
    pub const SAMPLE_RATE: Key<Rational> = Key::new(FormatKey::SampleRate);
    pub const SAMPLE_SIZE_IN_BITS: Key<i32> = Key::new(FormatKey::SampleSizeInBits);
    pub const CHANNELS: Key<i32> = Key::new(FormatKey::Channels);
    pub const FRAME_SIZE: Key<i32> = Key::new(FormatKey::FrameSize);
    pub const SIGNED: Key<bool> = Key::new(FormatKey::Signed);
    pub const BYTE_ORDER: Key<ByteOrder> = Key::new(FormatKey::ByteOrder);
}

/// An immutable set of typed format properties.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Format {
    entries: BTreeMap<FormatKey, FormatValue>,
}

impl Format {
    /// Create an empty format.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start building a format.
    pub fn builder() -> FormatBuilder {
        FormatBuilder::default()
    }

    /// Build a format from untyped entries, checking every value's kind.
    ///
    /// Later entries override earlier ones for the same key.
    pub fn try_from_entries<I>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (FormatKey, FormatValue)>,
    {
        let mut map = BTreeMap::new();
        for (key, value) in entries {
            let expected = key.kind();
            let found = value.kind();
            if expected != found {
                return Err(Error::TypeMismatch {
                    key,
                    expected,
                    found,
                });
            }
            map.insert(key, value);
        }
        Ok(Self { entries: map })
    }

    /// Get a typed value.
    pub fn get<T: FormatValueType>(&self, key: Key<T>) -> Option<T> {
        self.entries.get(&key.key).and_then(T::from_value)
    }

    /// Get a typed value or a default when absent.
    pub fn get_or<T: FormatValueType>(&self, key: Key<T>, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    /// Get the untyped value stored under `key`.
    pub fn value(&self, key: FormatKey) -> Option<&FormatValue> {
        self.entries.get(&key)
    }

    /// Check whether `key` has a value.
    pub fn contains_key(&self, key: FormatKey) -> bool {
        self.entries.contains_key(&key)
    }

    /// Keys in declaration order.
    pub fn keys(&self) -> impl Iterator<Item = FormatKey> + '_ {
        self.entries.keys().copied()
    }

    /// Entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (FormatKey, &FormatValue)> + '_ {
        self.entries.iter().map(|(k, v)| (*k, v))
    }

    /// Number of keys with a value.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the format has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Return a copy of this format with `key` set to `value`.
    pub fn with<T: FormatValueType>(&self, key: Key<T>, value: T) -> Self {
        let mut entries = self.entries.clone();
        entries.insert(key.key, value.into_value());
        Self { entries }
    }

    /// Check that every key present in both formats has the same value.
    pub fn matches(&self, other: &Format) -> bool {
        self.entries
            .iter()
            .all(|(k, v)| other.entries.get(k).map_or(true, |ov| ov == v))
    }

    /// Merge `other` into a copy of this format. Values in `self` win.
    pub fn append(&self, other: &Format) -> Self {
        let mut entries = other.entries.clone();
        for (k, v) in &self.entries {
            entries.insert(*k, v.clone());
        }
        Self { entries }
    }

    /// Keep only the given keys.
    pub fn intersect_keys(&self, keys: &[FormatKey]) -> Self {
        let entries = self
            .entries
            .iter()
            .filter(|(k, _)| keys.contains(k))
            .map(|(k, v)| (*k, v.clone()))
            .collect();
        Self { entries }
    }

    /// Drop the given keys.
    pub fn remove_keys(&self, keys: &[FormatKey]) -> Self {
        let entries = self
            .entries
            .iter()
            .filter(|(k, _)| !keys.contains(k))
            .map(|(k, v)| (*k, v.clone()))
            .collect();
        Self { entries }
    }

    /// Shorthand for the [`keys::MEDIA_TYPE`] value.
    pub fn media_type(&self) -> Option<MediaType> {
        self.get(keys::MEDIA_TYPE)
    }

    /// Shorthand for the [`keys::ENCODING`] value.
    pub fn encoding(&self) -> Option<String> {
        self.get(keys::ENCODING)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}:{}", k, v)?;
        }
        write!(f, "}}")
    }
}

/// Builder for [`Format`].
#[derive(Debug, Clone, Default)]
pub struct FormatBuilder {
    entries: BTreeMap<FormatKey, FormatValue>,
}

impl FormatBuilder {
    /// Set a typed value.
    pub fn with<T: FormatValueType>(mut self, key: Key<T>, value: T) -> Self {
        self.entries.insert(key.key, value.into_value());
        self
    }

    /// Set a text value from a string slice.
    pub fn with_str(self, key: Key<String>, value: &str) -> Self {
        self.with(key, value.to_string())
    }

    /// Finish the format.
    pub fn build(self) -> Format {
        Format {
            entries: self.entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video_format() -> Format {
        Format::builder()
            .with(keys::MEDIA_TYPE, MediaType::Video)
            .with_str(keys::ENCODING, ENCODING_AVI_DIB)
            .with(keys::WIDTH, 320)
            .with(keys::HEIGHT, 160)
            .with(keys::FRAME_RATE, Rational::new(30, 1))
            .build()
    }

    #[test]
    fn test_typed_get() {
        let f = video_format();
        assert_eq!(f.get(keys::WIDTH), Some(320));
        assert_eq!(f.get(keys::FRAME_RATE), Some(Rational::from_int(30)));
        assert_eq!(f.get(keys::DEPTH), None);
        assert_eq!(f.get_or(keys::DEPTH, 24), 24);
        assert_eq!(f.media_type(), Some(MediaType::Video));
    }

    #[test]
    fn test_try_from_entries_rejects_wrong_kind() {
        let err = Format::try_from_entries(vec![
            (FormatKey::MediaType, FormatValue::MediaType(MediaType::Audio)),
            (FormatKey::Width, FormatValue::Text("wide".into())),
        ])
        .unwrap_err();
        assert!(matches!(
            err,
            Error::TypeMismatch {
                key: FormatKey::Width,
                expected: ValueKind::Int,
                found: ValueKind::Text,
            }
        ));
    }

    #[test]
    fn test_try_from_entries_accepts_valid() {
        let f = Format::try_from_entries(vec![
            (FormatKey::SampleRate, FormatValue::Rational(Rational::new(44100, 1))),
            (FormatKey::Channels, FormatValue::Int(2)),
        ])
        .unwrap();
        assert_eq!(f.len(), 2);
        assert_eq!(f.get(keys::CHANNELS), Some(2));
    }

    #[test]
    fn test_with_returns_new_format() {
        let f = video_format();
        let g = f.with(keys::DEPTH, 24);
        assert!(!f.contains_key(FormatKey::Depth));
        assert_eq!(g.get(keys::DEPTH), Some(24));
    }

    #[test]
    fn test_matches() {
        let f = video_format();
        let partial = Format::builder()
            .with(keys::MEDIA_TYPE, MediaType::Video)
            .with(keys::DEPTH, 24)
            .build();
        assert!(f.matches(&f));
        assert!(partial.matches(&f));
        assert!(f.matches(&partial));

        let audio = Format::builder().with(keys::MEDIA_TYPE, MediaType::Audio).build();
        assert!(!audio.matches(&f));
    }

    #[test]
    fn test_append_self_wins() {
        let a = Format::builder().with(keys::WIDTH, 10).build();
        let b = Format::builder()
            .with(keys::WIDTH, 20)
            .with(keys::HEIGHT, 30)
            .build();
        let c = a.append(&b);
        assert_eq!(c.get(keys::WIDTH), Some(10));
        assert_eq!(c.get(keys::HEIGHT), Some(30));
    }

    #[test]
    fn test_intersect_and_remove_keys() {
        let f = video_format();
        let kept = f.intersect_keys(&[FormatKey::Width, FormatKey::Height, FormatKey::Depth]);
        assert_eq!(kept.keys().collect::<Vec<_>>(), vec![FormatKey::Width, FormatKey::Height]);
        let removed = f.remove_keys(&[FormatKey::Width, FormatKey::Height]);
        assert_eq!(removed.len(), f.len() - 2);
        assert!(!removed.contains_key(FormatKey::Width));
    }

    #[test]
    fn test_display_in_key_order() {
        let f = Format::builder()
            .with(keys::HEIGHT, 2)
            .with(keys::MEDIA_TYPE, MediaType::Video)
            .with(keys::WIDTH, 1)
            .build();
        assert_eq!(f.to_string(), "{MediaType:Video, Width:1, Height:2}");
    }
}
