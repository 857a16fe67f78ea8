//! ELF32 program images.
//!
//! Only what is needed to start a thread from an image: the entry point and the `PT_LOAD`
//! segments. Everything is validated up front so the segment walk cannot fail.

use core::ops::Range;

const ELF_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];
const ELF_CLASS_32: u8 = 1;
const PT_LOAD: u32 = 1;

const HEADER_SIZE: usize = 52;
const PROGRAM_HEADER_SIZE: usize = 32;

// ELF32 header offsets
const E_IDENT_CLASS: usize = 4;
const E_ENTRY: usize = 24;
const E_PHOFF: usize = 28;
const E_PHENTSIZE: usize = 42;
const E_PHNUM: usize = 44;

// program header offsets
const P_TYPE: usize = 0;
const P_OFFSET: usize = 4;
const P_VADDR: usize = 8;
const P_FILESZ: usize = 16;
const P_MEMSZ: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error("image is too short ({0} bytes)")]
    TooShort(usize),

    #[error("no valid ELF magic")]
    BadMagic,

    #[error("unsupported ELF class {0}, expected 32-bit")]
    UnsupportedClass(u8),

    #[error("program header {0} lies outside the image")]
    HeaderOutOfBounds(usize),

    #[error("segment {0} lies outside the image")]
    SegmentOutOfBounds(usize),
}

fn read_u16(bytes: &[u8], offset: usize) -> Option<u16> {
    let raw = bytes.get(offset..offset + 2)?;
    Some(u16::from_le_bytes([raw[0], raw[1]]))
}

fn read_u32(bytes: &[u8], offset: usize) -> Option<u32> {
    let raw = bytes.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

/// A loadable segment: `data` is copied to `virt_addr`, the rest up to `mem_size` is zeroed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment<'a> {
    pub virt_addr: u32,
    pub mem_size: u32,
    pub data: &'a [u8],
}

impl Segment<'_> {
    /// Fill `dest` (which must span `mem_size` bytes) with the segment contents.
    pub fn write_to(&self, dest: &mut [u8]) {
        let (file, bss) = dest.split_at_mut(self.data.len());
        file.copy_from_slice(self.data);
        bss.fill(0);
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ElfImage<'a> {
    bytes: &'a [u8],
    entry: u32,
    headers: usize,
    header_size: usize,
    count: usize,
}

impl<'a> ElfImage<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<Self, LoadError> {
        if bytes.len() < HEADER_SIZE {
            return Err(LoadError::TooShort(bytes.len()));
        }
        if bytes[..4] != ELF_MAGIC {
            return Err(LoadError::BadMagic);
        }

        let class = bytes[E_IDENT_CLASS];
        if class != ELF_CLASS_32 {
            return Err(LoadError::UnsupportedClass(class));
        }

        let too_short = LoadError::TooShort(bytes.len());
        let entry = read_u32(bytes, E_ENTRY).ok_or(too_short)?;
        let headers = read_u32(bytes, E_PHOFF).ok_or(too_short)? as usize;
        let header_size = read_u16(bytes, E_PHENTSIZE).ok_or(too_short)? as usize;
        let count = read_u16(bytes, E_PHNUM).ok_or(too_short)? as usize;

        let image = Self {
            bytes,
            entry,
            headers,
            header_size: header_size.max(PROGRAM_HEADER_SIZE),
            count,
        };

        for index in 0..count {
            if image.header_range(index).and_then(|range| bytes.get(range)).is_none() {
                return Err(LoadError::HeaderOutOfBounds(index));
            }

            if image.program_type(index) == PT_LOAD {
                image.segment_bounds(index)?;
            }
        }

        Ok(image)
    }

    pub fn entry(&self) -> u32 {
        self.entry
    }

    /// Byte range of program header `index`, or `None` if it does not fit the address space.
    fn header_range(&self, index: usize) -> Option<Range<usize>> {
        let start = index
            .checked_mul(self.header_size)
            .and_then(|offset| self.headers.checked_add(offset))?;
        Some(start..start.checked_add(PROGRAM_HEADER_SIZE)?)
    }

    fn field(&self, index: usize, offset: usize) -> u32 {
        // header ranges were bounds-checked by `parse`
        self.header_range(index)
            .and_then(|range| read_u32(self.bytes, range.start + offset))
            .unwrap_or(0)
    }

    fn program_type(&self, index: usize) -> u32 {
        self.field(index, P_TYPE)
    }

    fn segment_bounds(&self, index: usize) -> Result<Range<usize>, LoadError> {
        let offset = self.field(index, P_OFFSET) as usize;
        let file_size = self.field(index, P_FILESZ) as usize;
        let mem_size = self.field(index, P_MEMSZ) as usize;

        let end = offset
            .checked_add(file_size)
            .filter(|&end| end <= self.bytes.len() && file_size <= mem_size)
            .ok_or(LoadError::SegmentOutOfBounds(index))?;

        Ok(offset..end)
    }

    /// The `PT_LOAD` segments, in header order. Other segment types are skipped.
    pub fn segments(&self) -> impl Iterator<Item = Segment<'a>> + '_ {
        (0..self.count)
            .filter(|&index| self.program_type(index) == PT_LOAD)
            .filter_map(|index| {
                let range = self.segment_bounds(index).ok()?;
                Some(Segment {
                    virt_addr: self.field(index, P_VADDR),
                    mem_size: self.field(index, P_MEMSZ),
                    data: &self.bytes[range],
                })
            })
    }
}
