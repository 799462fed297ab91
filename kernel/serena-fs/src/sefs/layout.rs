//! On-disk byte layout for SerenaFS (spec.md §6: "a small scattered-block
//! Amiga-style filesystem ... superblock, allocation bitmap, one block per
//! inode with a direct block map, fixed-size directory records; all
//! multi-byte fields big-endian.").
//!
//! Every on-disk struct here encodes into, and decodes out of, exactly one
//! logical block via [`Writer`]/[`Reader`] — a cursor over the buffer
//! [`crate::cache::DiskCache::map`] hands back, rather than a `#[repr(C)]`
//! struct cast, so endianness and bounds are checked at every field instead
//! of relied on from the target's own byte order.

use alloc::string::String;
use alloc::vec::Vec;

use serena_core::error::{SerenaError, SerenaResult};

use crate::id::Ino;
use crate::types::{InodeType, Timestamps};

/// Magic bytes identifying a SerenaFS superblock.
pub const SIGNATURE: [u8; 4] = *b"SeFS";
/// Magic bytes identifying a SerenaFS on-disk inode block.
pub const INODE_SIGNATURE: [u8; 4] = *b"SeIn";
/// On-disk format version this crate reads and writes.
pub const FORMAT_VERSION: u32 = 1;
/// Smallest block size [`crate::sefs::format::format`] accepts.
pub const MIN_BLOCK_SIZE: u32 = 512;
/// Fewest blocks [`crate::sefs::format::format`] accepts (superblock +
/// at least one bitmap block + root inode + root directory contents).
pub const MIN_BLOCK_COUNT: u64 = 16;
/// Longest volume label, in bytes.
pub const MAX_LABEL_LEN: usize = 32;
/// Direct block pointers carried by every on-disk inode. No indirect
/// blocks: files larger than `N_DIRECT * block_size` are out of scope,
/// matching spec.md's "small, Amiga-scale volumes" framing.
pub const N_DIRECT: usize = 12;
/// A directory entry's fixed on-disk size: 8-byte inode LBA, 1-byte name
/// length, 55 bytes of name storage.
pub const DIRENT_SIZE: usize = 64;
/// Longest file name a directory entry can store.
pub const DIRENT_NAME_CAP: usize = 55;

/// Volume attribute bit: the formatter or a later `remount` marked this
/// volume read-only.
pub const ATTR_READ_ONLY: u32 = 1 << 0;

/// A bounds-checked big-endian cursor writing into one block.
pub struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    /// Creates a writer over `buf`, starting at offset 0.
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, len: usize) -> SerenaResult<&mut [u8]> {
        if self.pos + len > self.buf.len() {
            return Err(SerenaError::Range);
        }
        let slice = &mut self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    /// Writes a single byte.
    pub fn put_u8(&mut self, val: u8) -> SerenaResult<()> {
        self.take(1)?[0] = val;
        Ok(())
    }

    /// Writes a big-endian `u32`.
    pub fn put_u32(&mut self, val: u32) -> SerenaResult<()> {
        self.take(4)?.copy_from_slice(&val.to_be_bytes());
        Ok(())
    }

    /// Writes a big-endian `u64`.
    pub fn put_u64(&mut self, val: u64) -> SerenaResult<()> {
        self.take(8)?.copy_from_slice(&val.to_be_bytes());
        Ok(())
    }

    /// Writes exactly `bytes.len()` raw bytes.
    pub fn put_bytes(&mut self, bytes: &[u8]) -> SerenaResult<()> {
        self.take(bytes.len())?.copy_from_slice(bytes);
        Ok(())
    }

    /// Writes `bytes`, zero-padded (or truncated, which callers should
    /// never rely on) to exactly `width` bytes.
    pub fn put_padded(&mut self, bytes: &[u8], width: usize) -> SerenaResult<()> {
        let slice = self.take(width)?;
        slice.fill(0);
        let n = bytes.len().min(width);
        slice[..n].copy_from_slice(&bytes[..n]);
        Ok(())
    }

    /// Zero-fills `len` bytes (used to pad a struct out to a full block).
    pub fn put_zeros(&mut self, len: usize) -> SerenaResult<()> {
        self.take(len)?.fill(0);
        Ok(())
    }
}

/// A bounds-checked big-endian cursor reading out of one block.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Creates a reader over `buf`, starting at offset 0.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, len: usize) -> SerenaResult<&'a [u8]> {
        if self.pos + len > self.buf.len() {
            return Err(SerenaError::Range);
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    /// Reads a single byte.
    pub fn get_u8(&mut self) -> SerenaResult<u8> {
        Ok(self.take(1)?[0])
    }

    /// Reads a big-endian `u32`.
    pub fn get_u32(&mut self) -> SerenaResult<u32> {
        let bytes: [u8; 4] = self.take(4)?.try_into().map_err(|_| SerenaError::Range)?;
        Ok(u32::from_be_bytes(bytes))
    }

    /// Reads a big-endian `u64`.
    pub fn get_u64(&mut self) -> SerenaResult<u64> {
        let bytes: [u8; 8] = self.take(8)?.try_into().map_err(|_| SerenaError::Range)?;
        Ok(u64::from_be_bytes(bytes))
    }

    /// Reads exactly `len` raw bytes.
    pub fn get_bytes(&mut self, len: usize) -> SerenaResult<&'a [u8]> {
        self.take(len)
    }
}

fn encode_type(itype: InodeType) -> u8 {
    match itype {
        InodeType::Regular => 0,
        InodeType::Directory => 1,
        InodeType::Device => 2,
        InodeType::Fifo => 3,
        InodeType::Symlink => 4,
        InodeType::Filesystem => 5,
        InodeType::Proc => 6,
    }
}

fn decode_type(code: u8) -> SerenaResult<InodeType> {
    Ok(match code {
        0 => InodeType::Regular,
        1 => InodeType::Directory,
        2 => InodeType::Device,
        3 => InodeType::Fifo,
        4 => InodeType::Symlink,
        5 => InodeType::Filesystem,
        6 => InodeType::Proc,
        _ => return Err(SerenaError::Io),
    })
}

/// The on-disk superblock, occupying logical block 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Superblock {
    /// Volume attribute bits (currently only [`ATTR_READ_ONLY`]).
    pub attributes: u32,
    /// Volume creation time.
    pub ctime: Timestamps,
    /// Bytes per logical block, fixed for the volume's lifetime.
    pub block_size: u32,
    /// Total number of logical blocks in the volume.
    pub block_count: u64,
    /// Number of blocks the allocation bitmap occupies.
    pub bitmap_blocks: u32,
    /// LBA of the allocation bitmap's first block.
    pub bitmap_lba: u64,
    /// LBA of the root directory's on-disk inode block.
    pub root_dir_lba: u64,
    /// Volume label (UTF-8, at most [`MAX_LABEL_LEN`] bytes).
    pub label: String,
}

impl Superblock {
    /// Encodes this superblock into `buf`, which must be at least
    /// `block_size` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SerenaError::Range`] if `buf` is too small, or if `label`
    /// exceeds [`MAX_LABEL_LEN`].
    pub fn encode(&self, buf: &mut [u8]) -> SerenaResult<()> {
        if self.label.len() > MAX_LABEL_LEN {
            return Err(SerenaError::Range);
        }
        let block_size = buf.len();
        let mut w = Writer::new(buf);
        w.put_bytes(&SIGNATURE)?;
        w.put_u32(FORMAT_VERSION)?;
        w.put_u32(self.attributes)?;
        w.put_u64(self.ctime.ctime.sec)?;
        w.put_u32(self.ctime.ctime.nsec)?;
        w.put_u32(self.block_size)?;
        w.put_u64(self.block_count)?;
        w.put_u32(self.bitmap_blocks)?;
        w.put_u64(self.bitmap_lba)?;
        w.put_u64(self.root_dir_lba)?;
        w.put_u8(self.label.len() as u8)?;
        w.put_padded(self.label.as_bytes(), MAX_LABEL_LEN)?;
        let written = 4 + 4 + 4 + 8 + 4 + 4 + 8 + 4 + 8 + 8 + 1 + MAX_LABEL_LEN;
        w.put_zeros(block_size - written)?;
        Ok(())
    }

    /// Decodes a superblock from `buf` (one full logical block).
    ///
    /// # Errors
    ///
    /// Returns [`SerenaError::Io`] if the magic or version don't match,
    /// [`SerenaError::Range`] if `buf` is shorter than the encoded header.
    pub fn decode(buf: &[u8]) -> SerenaResult<Self> {
        let mut r = Reader::new(buf);
        let magic = r.get_bytes(4)?;
        if magic != SIGNATURE {
            return Err(SerenaError::Io);
        }
        let version = r.get_u32()?;
        if version != FORMAT_VERSION {
            return Err(SerenaError::Io);
        }
        let attributes = r.get_u32()?;
        let ctime_sec = r.get_u64()?;
        let ctime_nsec = r.get_u32()?;
        let block_size = r.get_u32()?;
        let block_count = r.get_u64()?;
        let bitmap_blocks = r.get_u32()?;
        let bitmap_lba = r.get_u64()?;
        let root_dir_lba = r.get_u64()?;
        let label_len = r.get_u8()? as usize;
        let label_bytes = r.get_bytes(MAX_LABEL_LEN)?;
        let label_len = label_len.min(MAX_LABEL_LEN);
        let label = String::from_utf8_lossy(&label_bytes[..label_len]).into_owned();

        Ok(Self {
            attributes,
            ctime: Timestamps {
                atime: serena_sched::Timespec {
                    sec: ctime_sec,
                    nsec: ctime_nsec,
                },
                mtime: serena_sched::Timespec {
                    sec: ctime_sec,
                    nsec: ctime_nsec,
                },
                ctime: serena_sched::Timespec {
                    sec: ctime_sec,
                    nsec: ctime_nsec,
                },
            },
            block_size,
            block_count,
            bitmap_blocks,
            bitmap_lba,
            root_dir_lba,
            label,
        })
    }

    /// `true` if [`ATTR_READ_ONLY`] is set.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.attributes & ATTR_READ_ONLY != 0
    }
}

/// The on-disk inode: one full logical block, header plus direct block map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskInode {
    /// This inode's own LBA (inodes are self-identifying: no separate
    /// inode table, matching the scattered-allocation layout spec.md §6
    /// describes).
    pub ino: Ino,
    /// The containing directory's inode LBA (`Ino::ROOT` for the root).
    pub parent_ino: Ino,
    /// Node kind.
    pub inode_type: InodeType,
    /// Hard link count.
    pub link_count: u32,
    /// Owning user id.
    pub uid: u32,
    /// Owning group id.
    pub gid: u32,
    /// Permission bits, stored as their raw `u16` value.
    pub mode: u16,
    /// Content size in bytes.
    pub size: u64,
    /// Direct data block pointers; `0` marks an unused slot (LBA 0 is
    /// always the superblock, so it can never be a valid data block).
    pub direct: [u64; N_DIRECT],
    /// Access/modify/change timestamps.
    pub timestamps: Timestamps,
}

impl DiskInode {
    /// Encodes this inode into `buf` (one full logical block).
    ///
    /// # Errors
    ///
    /// Returns [`SerenaError::Range`] if `buf` is too small to hold the
    /// fixed-size header.
    pub fn encode(&self, buf: &mut [u8]) -> SerenaResult<()> {
        let block_size = buf.len();
        let mut w = Writer::new(buf);
        w.put_bytes(&INODE_SIGNATURE)?;
        w.put_u64(self.ino.as_u64())?;
        w.put_u64(self.parent_ino.as_u64())?;
        w.put_u8(encode_type(self.inode_type))?;
        w.put_u32(self.link_count)?;
        w.put_u32(self.uid)?;
        w.put_u32(self.gid)?;
        w.put_u32(u32::from(self.mode))?;
        w.put_u64(self.size)?;
        for ptr in self.direct {
            w.put_u64(ptr)?;
        }
        w.put_u64(self.timestamps.atime.sec)?;
        w.put_u32(self.timestamps.atime.nsec)?;
        w.put_u64(self.timestamps.mtime.sec)?;
        w.put_u32(self.timestamps.mtime.nsec)?;
        w.put_u64(self.timestamps.ctime.sec)?;
        w.put_u32(self.timestamps.ctime.nsec)?;

        let written = 4
            + 8
            + 8
            + 1
            + 4
            + 4
            + 4
            + 4
            + 8
            + 8 * N_DIRECT
            + (8 + 4) * 3;
        if block_size < written {
            return Err(SerenaError::Range);
        }
        w.put_zeros(block_size - written)?;
        Ok(())
    }

    /// Decodes an inode from `buf` (one full logical block).
    ///
    /// # Errors
    ///
    /// Returns [`SerenaError::Io`] if the block's magic doesn't match or
    /// its type code is unrecognized.
    pub fn decode(buf: &[u8]) -> SerenaResult<Self> {
        let mut r = Reader::new(buf);
        let magic = r.get_bytes(4)?;
        if magic != INODE_SIGNATURE {
            return Err(SerenaError::Io);
        }
        let ino = Ino::new(r.get_u64()?);
        let parent_ino = Ino::new(r.get_u64()?);
        let inode_type = decode_type(r.get_u8()?)?;
        let link_count = r.get_u32()?;
        let uid = r.get_u32()?;
        let gid = r.get_u32()?;
        let mode = r.get_u32()? as u16;
        let size = r.get_u64()?;
        let mut direct = [0u64; N_DIRECT];
        for slot in &mut direct {
            *slot = r.get_u64()?;
        }
        let atime = serena_sched::Timespec {
            sec: r.get_u64()?,
            nsec: r.get_u32()?,
        };
        let mtime = serena_sched::Timespec {
            sec: r.get_u64()?,
            nsec: r.get_u32()?,
        };
        let ctime = serena_sched::Timespec {
            sec: r.get_u64()?,
            nsec: r.get_u32()?,
        };

        Ok(Self {
            ino,
            parent_ino,
            inode_type,
            link_count,
            uid,
            gid,
            mode,
            size,
            direct,
            timestamps: Timestamps {
                atime,
                mtime,
                ctime,
            },
        })
    }
}

/// One fixed-size directory record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskDirEntry {
    /// The named inode's LBA, or `0` for an unused (deleted) slot.
    pub ino: u64,
    /// The entry's name.
    pub name: String,
}

impl DiskDirEntry {
    /// A tombstone for a deleted or never-used slot.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            ino: 0,
            name: String::new(),
        }
    }

    /// `true` if this slot names no inode.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ino == 0
    }

    /// Encodes this entry into exactly [`DIRENT_SIZE`] bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SerenaError::Range`] if `name` exceeds
    /// [`DIRENT_NAME_CAP`] or `buf` is smaller than [`DIRENT_SIZE`].
    pub fn encode(&self, buf: &mut [u8]) -> SerenaResult<()> {
        if self.name.len() > DIRENT_NAME_CAP {
            return Err(SerenaError::Range);
        }
        let mut w = Writer::new(buf);
        w.put_u64(self.ino)?;
        w.put_u8(self.name.len() as u8)?;
        w.put_padded(self.name.as_bytes(), DIRENT_NAME_CAP)?;
        Ok(())
    }

    /// Decodes one [`DIRENT_SIZE`]-byte directory record.
    ///
    /// # Errors
    ///
    /// Returns [`SerenaError::Range`] if `buf` is smaller than
    /// [`DIRENT_SIZE`], [`SerenaError::Io`] if the stored name is not
    /// valid UTF-8.
    pub fn decode(buf: &[u8]) -> SerenaResult<Self> {
        let mut r = Reader::new(buf);
        let ino = r.get_u64()?;
        let name_len = (r.get_u8()? as usize).min(DIRENT_NAME_CAP);
        let name_bytes = r.get_bytes(DIRENT_NAME_CAP)?;
        if ino == 0 {
            return Ok(Self::empty());
        }
        let name = core::str::from_utf8(&name_bytes[..name_len])
            .map_err(|_| SerenaError::Io)?
            .into();
        Ok(Self { ino, name })
    }
}

/// Splits one data block's worth of bytes into [`DIRENT_SIZE`]-sized
/// records and decodes the non-empty ones.
///
/// # Errors
///
/// Propagates [`DiskDirEntry::decode`]'s errors.
pub fn decode_dir_block(buf: &[u8]) -> SerenaResult<Vec<DiskDirEntry>> {
    let mut out = Vec::new();
    for chunk in buf.chunks_exact(DIRENT_SIZE) {
        let entry = DiskDirEntry::decode(chunk)?;
        if !entry.is_empty() {
            out.push(entry);
        }
    }
    Ok(out)
}

/// How many [`DIRENT_SIZE`] records fit in one block of `block_size` bytes.
#[must_use]
pub fn dirents_per_block(block_size: u32) -> usize {
    block_size as usize / DIRENT_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_superblock() -> Superblock {
        Superblock {
            attributes: ATTR_READ_ONLY,
            ctime: Timestamps::default(),
            block_size: 512,
            block_count: 64,
            bitmap_blocks: 1,
            bitmap_lba: 1,
            root_dir_lba: 2,
            label: "boot".into(),
        }
    }

    #[test]
    fn superblock_round_trips() {
        let sb = sample_superblock();
        let mut buf = alloc::vec![0u8; 512];
        sb.encode(&mut buf).unwrap();
        let decoded = Superblock::decode(&buf).unwrap();
        assert_eq!(decoded.block_size, 512);
        assert_eq!(decoded.block_count, 64);
        assert_eq!(decoded.root_dir_lba, 2);
        assert_eq!(decoded.label, "boot");
        assert!(decoded.is_read_only());
    }

    #[test]
    fn superblock_rejects_bad_magic() {
        let buf = alloc::vec![0u8; 512];
        assert_eq!(Superblock::decode(&buf).unwrap_err(), SerenaError::Io);
    }

    #[test]
    fn disk_inode_round_trips() {
        let mut direct = [0u64; N_DIRECT];
        direct[0] = 10;
        direct[1] = 11;
        let inode = DiskInode {
            ino: Ino::new(5),
            parent_ino: Ino::ROOT,
            inode_type: InodeType::Regular,
            link_count: 1,
            uid: 0,
            gid: 0,
            mode: 0o644,
            size: 9000,
            direct,
            timestamps: Timestamps::default(),
        };
        let mut buf = alloc::vec![0u8; 512];
        inode.encode(&mut buf).unwrap();
        let decoded = DiskInode::decode(&buf).unwrap();
        assert_eq!(decoded.ino, Ino::new(5));
        assert_eq!(decoded.size, 9000);
        assert_eq!(decoded.direct[0], 10);
        assert_eq!(decoded.direct[1], 11);
        assert_eq!(decoded.mode, 0o644);
    }

    #[test]
    fn dirent_round_trips() {
        let entry = DiskDirEntry {
            ino: 42,
            name: "hello.txt".into(),
        };
        let mut buf = [0u8; DIRENT_SIZE];
        entry.encode(&mut buf).unwrap();
        let decoded = DiskDirEntry::decode(&buf).unwrap();
        assert_eq!(decoded, entry);
    }

    #[test]
    fn dirent_rejects_name_too_long() {
        let entry = DiskDirEntry {
            ino: 1,
            name: "x".repeat(DIRENT_NAME_CAP + 1),
        };
        let mut buf = [0u8; DIRENT_SIZE];
        assert_eq!(entry.encode(&mut buf).unwrap_err(), SerenaError::Range);
    }

    #[test]
    fn decode_dir_block_skips_empty_slots() {
        let mut block = alloc::vec![0u8; DIRENT_SIZE * 3];
        DiskDirEntry {
            ino: 2,
            name: ".".into(),
        }
        .encode(&mut block[0..DIRENT_SIZE])
        .unwrap();
        DiskDirEntry {
            ino: 2,
            name: "..".into(),
        }
        .encode(&mut block[DIRENT_SIZE..DIRENT_SIZE * 2])
        .unwrap();
        // third slot left all-zero: ino == 0, decodes as empty and is skipped.
        let entries = decode_dir_block(&block).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, ".");
        assert_eq!(entries[1].name, "..");
    }
}
