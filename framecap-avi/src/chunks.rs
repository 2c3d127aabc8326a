//! RIFF building blocks: four character codes, chunk headers, LIST trees and
//! idx1 entries.

use crate::error::{AviError, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;

/// Four character code naming a chunk, a list or a codec.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    pub const RIFF: FourCC = FourCC(*b"RIFF");
    pub const AVI: FourCC = FourCC(*b"AVI ");
    pub const LIST: FourCC = FourCC(*b"LIST");
    pub const HDRL: FourCC = FourCC(*b"hdrl");
    pub const AVIH: FourCC = FourCC(*b"avih");
    pub const STRL: FourCC = FourCC(*b"strl");
    pub const STRH: FourCC = FourCC(*b"strh");
    pub const STRF: FourCC = FourCC(*b"strf");
    pub const STRN: FourCC = FourCC(*b"strn");
    pub const MOVI: FourCC = FourCC(*b"movi");
    pub const IDX1: FourCC = FourCC(*b"idx1");
    pub const JUNK: FourCC = FourCC(*b"JUNK");

    pub const fn new(bytes: [u8; 4]) -> Self {
        FourCC(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl FromStr for FourCC {
    type Err = AviError;

    fn from_str(s: &str) -> Result<Self> {
        match <[u8; 4]>::try_from(s.as_bytes()) {
            Ok(bytes) => Ok(FourCC(bytes)),
            Err(_) => Err(AviError::Unsupported(format!(
                "{:?} is not four bytes long",
                s
            ))),
        }
    }
}

impl fmt::Display for FourCC {
    /// Non-printable bytes are shown as `.`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            let c = if b == b' ' || b.is_ascii_graphic() { b as char } else { '.' };
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCC({})", self)
    }
}

impl From<[u8; 4]> for FourCC {
    fn from(bytes: [u8; 4]) -> Self {
        FourCC(bytes)
    }
}

/// Bytes taken by a chunk id and its size field
pub const CHUNK_HEADER_SIZE: u64 = 8;

/// Payloads are followed by a pad byte when their size is odd.
pub fn padded(size: u64) -> u64 {
    size + (size & 1)
}

/// Id and payload size at the start of every chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub id: FourCC,
    /// Payload bytes, excluding the header and the pad byte
    pub size: u32,
}

impl ChunkHeader {
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let mut id = [0u8; 4];
        reader.read_exact(&mut id)?;
        Ok(ChunkHeader {
            id: FourCC(id),
            size: reader.read_u32::<LittleEndian>()?,
        })
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.id.0)?;
        writer.write_u32::<LittleEndian>(self.size)?;
        Ok(())
    }

    /// Distance from this header to the one that follows it.
    pub fn span(&self) -> u64 {
        CHUNK_HEADER_SIZE + padded(self.size as u64)
    }
}

/// Write a complete chunk: header, payload and pad byte.
pub fn write_chunk<W: Write>(writer: &mut W, id: FourCC, payload: &[u8]) -> Result<()> {
    ChunkHeader {
        id,
        size: payload.len() as u32,
    }
    .write(writer)?;
    writer.write_all(payload)?;
    if payload.len() % 2 == 1 {
        writer.write_all(&[0])?;
    }
    Ok(())
}

/// Start a LIST whose size is not known yet. The size field is left zero for
/// the caller to patch once the children are written.
pub fn begin_list<W: Write>(writer: &mut W, list_type: FourCC) -> Result<()> {
    ChunkHeader {
        id: FourCC::LIST,
        size: 0,
    }
    .write(writer)?;
    writer.write_all(&list_type.0)?;
    Ok(())
}

/// What a stream chunk in movi carries, from the last two characters of its id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    CompressedVideo,
    RawVideo,
    Audio,
    Text,
    Palette,
}

impl ChunkKind {
    const ALL: [(ChunkKind, [u8; 2]); 5] = [
        (ChunkKind::CompressedVideo, *b"dc"),
        (ChunkKind::RawVideo, *b"db"),
        (ChunkKind::Audio, *b"wb"),
        (ChunkKind::Text, *b"tx"),
        (ChunkKind::Palette, *b"pc"),
    ];

    fn suffix(self) -> [u8; 2] {
        Self::ALL
            .iter()
            .find(|(kind, _)| *kind == self)
            .map_or(*b"??", |(_, suffix)| *suffix)
    }

    fn from_suffix(suffix: [u8; 2]) -> Option<Self> {
        let lower = suffix.map(|b| b.to_ascii_lowercase());
        Self::ALL
            .iter()
            .find(|(_, s)| *s == lower)
            .map(|(kind, _)| *kind)
    }
}

/// A movi chunk id such as `00dc` or `01wb`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamChunk {
    pub stream: u16,
    pub kind: ChunkKind,
}

impl StreamChunk {
    pub fn new(stream: u16, kind: ChunkKind) -> Self {
        StreamChunk { stream, kind }
    }

    /// `None` for ids that do not belong to a stream.
    pub fn parse(id: FourCC) -> Option<Self> {
        let [hi, lo, a, b] = id.0;
        if !hi.is_ascii_digit() || !lo.is_ascii_digit() {
            return None;
        }
        let stream = (hi - b'0') as u16 * 10 + (lo - b'0') as u16;
        ChunkKind::from_suffix([a, b]).map(|kind| StreamChunk { stream, kind })
    }

    pub fn fourcc(&self) -> FourCC {
        let [a, b] = self.kind.suffix();
        FourCC([
            b'0' + (self.stream / 10 % 10) as u8,
            b'0' + (self.stream % 10) as u8,
            a,
            b,
        ])
    }

    /// Palette changes are not samples of the stream.
    pub fn carries_samples(&self) -> bool {
        self.kind != ChunkKind::Palette
    }
}

/// Leaf chunk held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub id: FourCC,
    pub data: Vec<u8>,
}

impl Chunk {
    pub fn new(id: FourCC, data: Vec<u8>) -> Self {
        Chunk { id, data }
    }

    /// Split the first chunk off `data`, returning it and the bytes after it.
    /// The final pad byte of a list may be missing.
    pub fn split(data: &[u8]) -> Result<(Self, &[u8])> {
        if data.len() < CHUNK_HEADER_SIZE as usize {
            return Err(AviError::InsufficientData {
                needed: CHUNK_HEADER_SIZE as usize,
                available: data.len(),
            });
        }
        let (mut head, body) = data.split_at(CHUNK_HEADER_SIZE as usize);
        let header = ChunkHeader::read(&mut head)?;
        let size = header.size as usize;
        if size > body.len() {
            return Err(AviError::InsufficientData {
                needed: size,
                available: body.len(),
            });
        }
        let rest = &body[(padded(size as u64) as usize).min(body.len())..];
        Ok((Chunk::new(header.id, body[..size].to_vec()), rest))
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        write_chunk(writer, self.id, &self.data)
    }

    pub fn span(&self) -> u64 {
        CHUNK_HEADER_SIZE + padded(self.data.len() as u64)
    }
}

/// Child of a LIST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Leaf(Chunk),
    List(ListChunk),
}

impl From<Chunk> for Node {
    fn from(chunk: Chunk) -> Self {
        Node::Leaf(chunk)
    }
}

impl From<ListChunk> for Node {
    fn from(list: ListChunk) -> Self {
        Node::List(list)
    }
}

/// LIST chunk with its children parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListChunk {
    pub list_type: FourCC,
    pub children: Vec<Node>,
}

impl ListChunk {
    const MAX_DEPTH: u32 = 8;

    pub fn new(list_type: FourCC) -> Self {
        ListChunk {
            list_type,
            children: Vec::new(),
        }
    }

    pub fn push(&mut self, node: impl Into<Node>) {
        self.children.push(node.into());
    }

    /// Parse a LIST payload: the list type followed by its children. Parsing
    /// stops quietly at a truncated child.
    pub fn parse(data: &[u8]) -> Result<Self> {
        Self::parse_at_depth(data, 0)
    }

    fn parse_at_depth(data: &[u8], depth: u32) -> Result<Self> {
        if depth > Self::MAX_DEPTH {
            return Err(AviError::InvalidChunk {
                id: *b"LIST",
                message: format!("nested more than {} levels", Self::MAX_DEPTH),
            });
        }
        if data.len() < 4 {
            return Err(AviError::InsufficientData {
                needed: 4,
                available: data.len(),
            });
        }
        let (head, mut rest) = data.split_at(4);
        let mut list_type = [0u8; 4];
        list_type.copy_from_slice(head);
        let mut list = ListChunk::new(FourCC(list_type));

        while !rest.is_empty() {
            let (chunk, next) = match Chunk::split(rest) {
                Ok(split) => split,
                Err(e) => {
                    log::debug!("{} list ends early: {}", list.list_type, e);
                    break;
                }
            };
            if chunk.id == FourCC::LIST && chunk.data.len() >= 4 {
                list.push(Self::parse_at_depth(&chunk.data, depth + 1)?);
            } else {
                list.push(chunk);
            }
            rest = next;
        }
        Ok(list)
    }

    /// Value of the LIST size field: the list type plus every child.
    pub fn payload_size(&self) -> u64 {
        let children: u64 = self
            .children
            .iter()
            .map(|node| match node {
                Node::Leaf(chunk) => chunk.span(),
                Node::List(list) => CHUNK_HEADER_SIZE + list.payload_size(),
            })
            .sum();
        4 + children
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        ChunkHeader {
            id: FourCC::LIST,
            size: self.payload_size() as u32,
        }
        .write(writer)?;
        writer.write_all(&self.list_type.0)?;
        for node in &self.children {
            match node {
                Node::Leaf(chunk) => chunk.write(writer)?,
                Node::List(list) => list.write(writer)?,
            }
        }
        Ok(())
    }

    /// First direct leaf child with the given id.
    pub fn leaf(&self, id: FourCC) -> Option<&Chunk> {
        self.children.iter().find_map(|node| match node {
            Node::Leaf(chunk) if chunk.id == id => Some(chunk),
            _ => None,
        })
    }

    /// Direct child lists of the given type, in file order.
    pub fn sublists(&self, list_type: FourCC) -> impl Iterator<Item = &ListChunk> + '_ {
        self.children.iter().filter_map(move |node| match node {
            Node::List(list) if list.list_type == list_type => Some(list),
            _ => None,
        })
    }
}

/// One idx1 record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub chunk_id: FourCC,
    pub flags: u32,
    /// Position of the chunk header, counted from the `movi` list type
    pub offset: u32,
    pub size: u32,
}

impl IndexEntry {
    /// AVIIF_KEYFRAME
    pub const KEYFRAME: u32 = 0x10;

    /// Bytes per record
    pub const SIZE: usize = 16;

    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let mut chunk_id = [0u8; 4];
        reader.read_exact(&mut chunk_id)?;
        Ok(IndexEntry {
            chunk_id: FourCC(chunk_id),
            flags: reader.read_u32::<LittleEndian>()?,
            offset: reader.read_u32::<LittleEndian>()?,
            size: reader.read_u32::<LittleEndian>()?,
        })
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.chunk_id.0)?;
        for value in [self.flags, self.offset, self.size] {
            writer.write_u32::<LittleEndian>(value)?;
        }
        Ok(())
    }

    pub fn is_keyframe(&self) -> bool {
        self.flags & Self::KEYFRAME != 0
    }

    /// Decode an idx1 payload. A partial record at the end is ignored.
    pub fn parse_table(data: &[u8]) -> Vec<Self> {
        data.chunks_exact(Self::SIZE)
            .filter_map(|mut record| Self::read(&mut record).ok())
            .collect()
    }
}
