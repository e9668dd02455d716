//! Index width selection
//!
//! Every table is addressed with the smallest integer that can hold its
//! indices plus two sentinels: `-1` ("not set") and `-2` ("alternate
//! interpretation"), stored as the width's largest unsigned value and the
//! one below it. An empty table gets the [`IndexWidth::Absent`] code and its
//! index fields take no space at all.

use std::io::{self, Write};

use byteorder::{LittleEndian, WriteBytesExt};

/// Width code of a table's index fields, as stored in the header flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum IndexWidth {
    U8 = 0,
    U16 = 1,
    U32 = 2,
    /// Table has no entries
    Absent = 3,
}

impl IndexWidth {
    /// Smallest width able to address `count` entries
    pub fn for_count(count: usize) -> Self {
        if count == 0 {
            IndexWidth::Absent
        } else if count < 254 {
            IndexWidth::U8
        } else if count < 65534 {
            IndexWidth::U16
        } else {
            IndexWidth::U32
        }
    }

    /// Two-bit code used in the header flags
    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Self {
        match code & 3 {
            0 => IndexWidth::U8,
            1 => IndexWidth::U16,
            2 => IndexWidth::U32,
            _ => IndexWidth::Absent,
        }
    }

    /// Nominal width in bytes (`1 << code`); an absent table reserves 8
    pub fn nominal_bytes(self) -> usize {
        1 << self.code()
    }

    /// Bytes an index field of this width occupies in a chunk
    pub fn byte_len(self) -> usize {
        match self {
            IndexWidth::Absent => 0,
            width => width.nominal_bytes(),
        }
    }

    pub fn is_absent(self) -> bool {
        self == IndexWidth::Absent
    }

    /// Largest unsigned value of the width
    fn max_value(self) -> u64 {
        match self {
            IndexWidth::U8 => u8::MAX as u64,
            IndexWidth::U16 => u16::MAX as u64,
            IndexWidth::U32 => u32::MAX as u64,
            IndexWidth::Absent => 0,
        }
    }

    /// Raw unsigned value written for `index`
    pub fn encode(self, index: IndexRef) -> u64 {
        let max = self.max_value();
        match index {
            IndexRef::Set(i) => {
                debug_assert!(
                    self.is_absent() || u64::from(i) < max - 1,
                    "index {i} collides with the {self:?} sentinels"
                );
                u64::from(i)
            }
            IndexRef::NotSet => max,
            IndexRef::Alternate => max.saturating_sub(1),
        }
    }

    /// Write an index field
    pub fn write<W: Write + ?Sized>(self, writer: &mut W, index: impl Into<IndexRef>) -> io::Result<()> {
        let value = self.encode(index.into());
        match self {
            IndexWidth::U8 => writer.write_u8(value as u8),
            IndexWidth::U16 => writer.write_u16::<LittleEndian>(value as u16),
            IndexWidth::U32 => writer.write_u32::<LittleEndian>(value as u32),
            IndexWidth::Absent => Ok(()),
        }
    }
}

/// An index field value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexRef {
    Set(u32),
    /// `-1`
    NotSet,
    /// `-2`, only used by the vertex table's skin field to mark quaternions
    Alternate,
}

impl From<u32> for IndexRef {
    fn from(value: u32) -> Self {
        IndexRef::Set(value)
    }
}

impl From<Option<u32>> for IndexRef {
    fn from(value: Option<u32>) -> Self {
        value.map_or(IndexRef::NotSet, IndexRef::Set)
    }
}
