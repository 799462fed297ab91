//! SerenaFS (sefs): the on-disk filesystem (spec.md §4.5/§6).
//!
//! [`layout`] defines the byte-exact superblock/inode/dirent encoding;
//! this module mounts a [`crate::container::FsContainer`] formatted with
//! [`format`] and implements [`crate::inode::Filesystem`]/
//! [`crate::inode::Inode`] over it through [`crate::cache::DiskCache`].
//! Every inode is self-identifying (its `Ino` *is* its own LBA, per
//! [`layout::DiskInode`]), so there is no separate inode table to walk at
//! mount time beyond the root.

pub mod layout;

use alloc::boxed::Box;
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;

use serena_core::error::{SerenaError, SerenaResult};
use serena_core::sync::{IrqSpinLock, Mutex};

use crate::cache::{DiskCache, MapMode};
use crate::container::FsContainer;
use crate::id::Ino;
use crate::inode::{Filesystem, Inode, InodeFuture};
use crate::types::{DirEntry, FsId, InodeInfo, InodeType, Permissions, Timestamps};

use layout::{
    decode_dir_block, DiskDirEntry, DiskInode, Superblock, ATTR_READ_ONLY, DIRENT_SIZE,
    MAX_LABEL_LEN, MIN_BLOCK_COUNT, MIN_BLOCK_SIZE, N_DIRECT,
};

/// Arguments to [`format`].
pub struct FormatOptions<'a> {
    /// Volume label.
    pub label: &'a str,
    /// Root directory owner.
    pub uid: u32,
    /// Root directory group.
    pub gid: u32,
    /// Root directory permission bits.
    pub perms: Permissions,
    /// Creation timestamp stamped on the superblock and root inode.
    pub now: serena_sched::Timespec,
}

fn bit_index(lba: u64) -> (usize, u8) {
    ((lba / 8) as usize, 1u8 << (7 - (lba % 8) as u8))
}

fn bit_is_set(bitmap: &[u8], lba: u64) -> bool {
    let (byte, mask) = bit_index(lba);
    bitmap.get(byte).is_some_and(|b| b & mask != 0)
}

fn set_bit(bitmap: &mut [u8], lba: u64) {
    let (byte, mask) = bit_index(lba);
    bitmap[byte] |= mask;
}

fn clear_bit(bitmap: &mut [u8], lba: u64) {
    let (byte, mask) = bit_index(lba);
    bitmap[byte] &= !mask;
}

/// Formats `container` as a fresh SerenaFS volume (spec.md §4.5: "Block
/// allocation marks in-use bits from LBA 0 upwards at format time to
/// cover the volume-header, bitmap, and root inode/data blocks.").
///
/// Layout: block 0 is the superblock, `1..1+bitmap_blocks` is the
/// allocation bitmap, the next block is the root directory's inode, and
/// the block after that holds the root directory's `.`/`..` contents —
/// exactly spec.md §4.5's on-disk diagram.
///
/// # Errors
///
/// [`SerenaError::Invalid`] if the container's block size isn't a power
/// of two or is smaller than [`layout::MIN_BLOCK_SIZE`];
/// [`SerenaError::NoSpace`] if the container has fewer than
/// [`layout::MIN_BLOCK_COUNT`] blocks, or too few to hold the superblock,
/// bitmap, and root directory; [`SerenaError::Range`] if `opts.label`
/// exceeds [`layout::MAX_LABEL_LEN`].
pub async fn format(container: &dyn FsContainer, opts: FormatOptions<'_>) -> SerenaResult<()> {
    let geometry = container.geometry();
    let block_size = geometry.block_size;
    let block_count = geometry.block_count;

    if !block_size.is_power_of_two() || block_size < MIN_BLOCK_SIZE {
        return Err(SerenaError::Invalid);
    }
    if block_count < MIN_BLOCK_COUNT {
        return Err(SerenaError::NoSpace);
    }
    if opts.label.len() > MAX_LABEL_LEN {
        return Err(SerenaError::Range);
    }

    let bits_per_block = u64::from(block_size) * 8;
    let bitmap_blocks = u32::try_from(block_count.div_ceil(bits_per_block))
        .map_err(|_| SerenaError::Range)?;
    let bitmap_lba = 1u64;
    let root_dir_lba = bitmap_lba + u64::from(bitmap_blocks);
    let root_contents_lba = root_dir_lba + 1;
    if root_contents_lba >= block_count {
        return Err(SerenaError::NoSpace);
    }

    let mut bitmap = alloc::vec![0u8; bitmap_blocks as usize * block_size as usize];
    set_bit(&mut bitmap, 0);
    for i in 0..u64::from(bitmap_blocks) {
        set_bit(&mut bitmap, bitmap_lba + i);
    }
    set_bit(&mut bitmap, root_dir_lba);
    set_bit(&mut bitmap, root_contents_lba);

    let sb = Superblock {
        attributes: if geometry.read_only { ATTR_READ_ONLY } else { 0 },
        ctime: Timestamps {
            atime: opts.now,
            mtime: opts.now,
            ctime: opts.now,
        },
        block_size,
        block_count,
        bitmap_blocks,
        bitmap_lba,
        root_dir_lba,
        label: opts.label.to_string(),
    };
    let mut sb_buf = alloc::vec![0u8; block_size as usize];
    sb.encode(&mut sb_buf)?;
    container.write_block(0, &sb_buf).await?;

    for i in 0..u64::from(bitmap_blocks) {
        let start = (i as usize) * block_size as usize;
        container
            .write_block(bitmap_lba + i, &bitmap[start..start + block_size as usize])
            .await?;
    }

    let mut dir_block = alloc::vec![0u8; block_size as usize];
    DiskDirEntry {
        ino: root_dir_lba,
        name: ".".to_string(),
    }
    .encode(&mut dir_block[0..DIRENT_SIZE])?;
    DiskDirEntry {
        ino: root_dir_lba,
        name: "..".to_string(),
    }
    .encode(&mut dir_block[DIRENT_SIZE..DIRENT_SIZE * 2])?;
    container.write_block(root_contents_lba, &dir_block).await?;

    let mut root_direct = [0u64; N_DIRECT];
    root_direct[0] = root_contents_lba;
    let root_inode = DiskInode {
        ino: Ino::new(root_dir_lba),
        parent_ino: Ino::new(root_dir_lba),
        inode_type: InodeType::Directory,
        link_count: 2,
        uid: opts.uid,
        gid: opts.gid,
        mode: opts.perms.bits(),
        size: u64::from(block_size),
        direct: root_direct,
        timestamps: Timestamps {
            atime: opts.now,
            mtime: opts.now,
            ctime: opts.now,
        },
    };
    let mut inode_buf = alloc::vec![0u8; block_size as usize];
    root_inode.encode(&mut inode_buf)?;
    container.write_block(root_dir_lba, &inode_buf).await?;

    Ok(())
}

/// State shared by a [`SefsFilesystem`] and every [`SefsInode`] mounted
/// from it. Not itself an `Arc<SefsFilesystem>` back-reference — both the
/// filesystem handle and every inode hold an `Arc<SefsShared>` down to
/// this, so there is no reference cycle to leak.
struct SefsShared {
    container: Arc<dyn FsContainer>,
    cache: DiskCache,
    fsid: FsId,
    block_size: u32,
    block_count: u64,
    bitmap_lba: u64,
    read_only: bool,
    bitmap: Mutex<Vec<u8>>,
}

impl SefsShared {
    async fn alloc_block(&self) -> SerenaResult<u64> {
        let mut bitmap = self.bitmap.lock().await;
        let total_bits = (bitmap.len() as u64) * 8;
        for lba in 0..total_bits.min(self.block_count) {
            if !bit_is_set(&bitmap, lba) {
                set_bit(&mut bitmap, lba);
                self.flush_bitmap_bit(&bitmap, lba).await?;
                return Ok(lba);
            }
        }
        Err(SerenaError::NoSpace)
    }

    async fn free_block(&self, lba: u64) -> SerenaResult<()> {
        let mut bitmap = self.bitmap.lock().await;
        clear_bit(&mut bitmap, lba);
        self.flush_bitmap_bit(&bitmap, lba).await
    }

    async fn flush_bitmap_bit(&self, bitmap: &[u8], lba: u64) -> SerenaResult<()> {
        let block_size = self.block_size as usize;
        let bits_per_block = block_size * 8;
        let block_idx = (lba as usize) / bits_per_block;
        let start = block_idx * block_size;
        self.container
            .write_block(self.bitmap_lba + block_idx as u64, &bitmap[start..start + block_size])
            .await
    }
}

async fn read_block(shared: &SefsShared, lba: u64) -> SerenaResult<Vec<u8>> {
    let (token, data) = shared
        .cache
        .map(shared.fsid, shared.container.as_ref(), lba, MapMode::Read)
        .await?;
    shared.cache.unmap(shared.container.as_ref(), token, false).await?;
    Ok(data)
}

async fn write_block(shared: &SefsShared, lba: u64, data: &[u8]) -> SerenaResult<()> {
    let (token, _) = shared
        .cache
        .map(shared.fsid, shared.container.as_ref(), lba, MapMode::ReadWrite)
        .await?;
    shared.cache.update(token, data);
    shared.cache.unmap(shared.container.as_ref(), token, true).await
}

async fn read_inode_block(shared: &SefsShared, ino: Ino) -> SerenaResult<DiskInode> {
    let data = read_block(shared, ino.as_u64()).await?;
    DiskInode::decode(&data)
}

async fn write_inode_block(shared: &SefsShared, disk: &DiskInode) -> SerenaResult<()> {
    let mut buf = alloc::vec![0u8; shared.block_size as usize];
    disk.encode(&mut buf)?;
    write_block(shared, disk.ino.as_u64(), &buf).await
}

async fn find_dirent(
    shared: &SefsShared,
    parent: &DiskInode,
    name: &str,
) -> SerenaResult<Option<DiskDirEntry>> {
    for &lba in &parent.direct {
        if lba == 0 {
            continue;
        }
        let block = read_block(shared, lba).await?;
        for entry in decode_dir_block(&block)? {
            if entry.name == name {
                return Ok(Some(entry));
            }
        }
    }
    Ok(None)
}

/// Inserts `entry` into the first empty slot across `parent`'s existing
/// directory blocks, allocating one more direct block if every existing
/// block is full.
///
/// # Errors
///
/// [`SerenaError::NoSpace`] if `parent` already uses all
/// [`layout::N_DIRECT`] direct blocks and none has a free slot.
async fn insert_dirent(shared: &SefsShared, parent: &mut DiskInode, entry: &DiskDirEntry) -> SerenaResult<()> {
    let block_size = shared.block_size as usize;
    for &lba in &parent.direct {
        if lba == 0 {
            continue;
        }
        let mut block = read_block(shared, lba).await?;
        for chunk in block.chunks_exact_mut(DIRENT_SIZE) {
            if DiskDirEntry::decode(chunk)?.is_empty() {
                entry.encode(chunk)?;
                write_block(shared, lba, &block).await?;
                return Ok(());
            }
        }
    }
    for slot in &mut parent.direct {
        if *slot == 0 {
            let new_lba = shared.alloc_block().await?;
            let mut block = alloc::vec![0u8; block_size];
            entry.encode(&mut block[0..DIRENT_SIZE])?;
            write_block(shared, new_lba, &block).await?;
            *slot = new_lba;
            parent.size += block_size as u64;
            return Ok(());
        }
    }
    Err(SerenaError::NoSpace)
}

fn info_from_disk(disk: &DiskInode) -> InodeInfo {
    InodeInfo {
        ino: disk.ino,
        inode_type: disk.inode_type,
        link_count: disk.link_count,
        uid: disk.uid,
        gid: disk.gid,
        permissions: Permissions::from_bits_truncate(disk.mode),
        size: disk.size,
    }
}

async fn load_inode(shared: Arc<SefsShared>, disk: DiskInode) -> SerenaResult<Arc<SefsInode>> {
    let symlink_target = if disk.inode_type == InodeType::Symlink && disk.direct[0] != 0 {
        let block = read_block(&shared, disk.direct[0]).await?;
        let len = (disk.size as usize).min(block.len());
        Some(String::from_utf8(block[..len].to_vec()).map_err(|_| SerenaError::Io)?)
    } else {
        None
    };
    let info = info_from_disk(&disk);
    let ino = disk.ino;
    Ok(Arc::new(SefsInode {
        shared,
        ino,
        disk: Mutex::new(disk),
        info: IrqSpinLock::new(info),
        symlink_target,
    }))
}

/// A mounted SerenaFS volume.
pub struct SefsFilesystem {
    shared: Arc<SefsShared>,
    root: Arc<SefsInode>,
}

impl SefsFilesystem {
    /// Mounts a previously [`format`]ted `container`, reading its
    /// superblock and allocation bitmap into memory and loading the root
    /// directory inode.
    ///
    /// `fsid` must be unique among filesystems sharing a
    /// [`crate::cache::DiskCache`] — here each mount gets its own private
    /// cache, so any value works, but callers that pool one cache across
    /// several sefs volumes must hand out distinct ids.
    ///
    /// # Errors
    ///
    /// Propagates [`Superblock::decode`]'s and the container's own I/O
    /// errors.
    pub async fn mount(
        container: Arc<dyn FsContainer>,
        fsid: FsId,
        cache_capacity: usize,
    ) -> SerenaResult<Self> {
        let geometry = container.geometry();
        let mut sb_buf = alloc::vec![0u8; geometry.block_size as usize];
        container.read_block(0, &mut sb_buf).await?;
        let sb = Superblock::decode(&sb_buf)?;

        let mut bitmap = alloc::vec![0u8; sb.bitmap_blocks as usize * sb.block_size as usize];
        for i in 0..u64::from(sb.bitmap_blocks) {
            let start = (i as usize) * sb.block_size as usize;
            container
                .read_block(sb.bitmap_lba + i, &mut bitmap[start..start + sb.block_size as usize])
                .await?;
        }

        let shared = Arc::new(SefsShared {
            container,
            cache: DiskCache::new(cache_capacity),
            fsid,
            block_size: sb.block_size,
            block_count: sb.block_count,
            bitmap_lba: sb.bitmap_lba,
            read_only: sb.is_read_only(),
            bitmap: Mutex::new(bitmap),
        });

        let root_disk = read_inode_block(&shared, Ino::new(sb.root_dir_lba)).await?;
        let root = load_inode(shared.clone(), root_disk).await?;
        Ok(Self { shared, root })
    }
}

impl Filesystem for SefsFilesystem {
    fn name(&self) -> &'static str {
        "sefs"
    }

    fn root(&self) -> Arc<dyn Inode> {
        self.root.clone()
    }

    fn is_read_only(&self) -> bool {
        self.shared.read_only
    }

    fn container(&self) -> Option<&dyn FsContainer> {
        Some(self.shared.container.as_ref())
    }
}

/// A SerenaFS on-disk inode, mirrored in memory.
///
/// `disk` is the authoritative, disk-synced copy behind an async
/// [`Mutex`] (mutating operations hold it across the cache `await`s that
/// flush it back); `info` is a cheap [`IrqSpinLock`]-guarded snapshot kept
/// in step, because [`Inode::get_info`]/`size`/`permissions` are
/// synchronous trait methods that cannot await a disk-backed lock.
struct SefsInode {
    shared: Arc<SefsShared>,
    ino: Ino,
    disk: Mutex<DiskInode>,
    info: IrqSpinLock<InodeInfo>,
    /// Cached at load time for [`Inode::read_link`]'s synchronous
    /// contract — see spec.md §9's "symlink targets are small and stored
    /// inline" framing.
    symlink_target: Option<String>,
}

impl SefsInode {
    fn sync_info(&self, disk: &DiskInode) {
        *self.info.lock() = info_from_disk(disk);
    }
}

impl Inode for SefsInode {
    fn as_any(&self) -> &dyn core::any::Any {
        self
    }

    fn inode_type(&self) -> InodeType {
        self.info.lock().inode_type
    }

    fn size(&self) -> usize {
        self.info.lock().size as usize
    }

    fn permissions(&self) -> Permissions {
        self.info.lock().permissions
    }

    fn read<'a>(&'a self, offset: usize, buf: &'a mut [u8]) -> InodeFuture<'a, usize> {
        Box::pin(async move {
            let disk = self.disk.lock().await;
            if disk.inode_type == InodeType::Directory {
                return Err(SerenaError::IsADirectory);
            }
            let block_size = self.shared.block_size as usize;
            let size = disk.size as usize;
            if offset >= size {
                return Ok(0);
            }
            let to_read = buf.len().min(size - offset);
            let mut done = 0;
            while done < to_read {
                let file_off = offset + done;
                let block_idx = file_off / block_size;
                let block_off = file_off % block_size;
                if block_idx >= N_DIRECT {
                    break;
                }
                let n = (block_size - block_off).min(to_read - done);
                let lba = disk.direct[block_idx];
                if lba == 0 {
                    buf[done..done + n].fill(0);
                } else {
                    let block = read_block(&self.shared, lba).await?;
                    buf[done..done + n].copy_from_slice(&block[block_off..block_off + n]);
                }
                done += n;
            }
            Ok(done)
        })
    }

    fn write<'a>(&'a self, offset: usize, buf: &'a [u8]) -> InodeFuture<'a, usize> {
        Box::pin(async move {
            if self.shared.read_only {
                return Err(SerenaError::ReadOnly);
            }
            let mut disk = self.disk.lock().await;
            if disk.inode_type == InodeType::Directory {
                return Err(SerenaError::IsADirectory);
            }
            let block_size = self.shared.block_size as usize;
            let end = offset + buf.len();
            if end > N_DIRECT * block_size {
                return Err(SerenaError::NoSpace);
            }
            let mut done = 0;
            while done < buf.len() {
                let file_off = offset + done;
                let block_idx = file_off / block_size;
                let block_off = file_off % block_size;
                if disk.direct[block_idx] == 0 {
                    disk.direct[block_idx] = self.shared.alloc_block().await?;
                }
                let lba = disk.direct[block_idx];
                let mut block = read_block(&self.shared, lba).await?;
                let n = (block_size - block_off).min(buf.len() - done);
                block[block_off..block_off + n].copy_from_slice(&buf[done..done + n]);
                write_block(&self.shared, lba, &block).await?;
                done += n;
            }
            if end as u64 > disk.size {
                disk.size = end as u64;
            }
            write_inode_block(&self.shared, &disk).await?;
            self.sync_info(&disk);
            Ok(done)
        })
    }

    fn truncate(&self, len: usize) -> InodeFuture<'_, ()> {
        Box::pin(async move {
            if self.shared.read_only {
                return Err(SerenaError::ReadOnly);
            }
            let mut disk = self.disk.lock().await;
            if disk.inode_type == InodeType::Directory {
                return Err(SerenaError::IsADirectory);
            }
            let block_size = self.shared.block_size as usize;
            if (len as u64) < disk.size {
                let kept_blocks = len.div_ceil(block_size);
                for slot in disk.direct.iter_mut().skip(kept_blocks) {
                    if *slot != 0 {
                        self.shared.free_block(*slot).await?;
                        *slot = 0;
                    }
                }
            }
            disk.size = len as u64;
            write_inode_block(&self.shared, &disk).await?;
            self.sync_info(&disk);
            Ok(())
        })
    }

    fn lookup<'a>(&'a self, name: &'a str) -> InodeFuture<'a, Arc<dyn Inode>> {
        Box::pin(async move {
            let disk = self.disk.lock().await;
            if disk.inode_type != InodeType::Directory {
                return Err(SerenaError::NotADirectory);
            }
            let entry = find_dirent(&self.shared, &disk, name).await?.ok_or(SerenaError::NotFound)?;
            let child_disk = read_inode_block(&self.shared, Ino::new(entry.ino)).await?;
            drop(disk);
            Ok(load_inode(self.shared.clone(), child_disk).await? as Arc<dyn Inode>)
        })
    }

    fn readdir(&self) -> InodeFuture<'_, Vec<DirEntry>> {
        Box::pin(async move {
            let disk = self.disk.lock().await;
            if disk.inode_type != InodeType::Directory {
                return Err(SerenaError::NotADirectory);
            }
            let mut out = Vec::new();
            for &lba in &disk.direct {
                if lba == 0 {
                    continue;
                }
                let block = read_block(&self.shared, lba).await?;
                for entry in decode_dir_block(&block)? {
                    let child = read_inode_block(&self.shared, Ino::new(entry.ino)).await?;
                    out.push(DirEntry {
                        name: entry.name,
                        inode_type: child.inode_type,
                        ino: Ino::new(entry.ino),
                    });
                }
            }
            Ok(out)
        })
    }

    fn create<'a>(
        &'a self,
        name: &'a str,
        itype: InodeType,
        perms: Permissions,
    ) -> InodeFuture<'a, Arc<dyn Inode>> {
        Box::pin(async move {
            if self.shared.read_only {
                return Err(SerenaError::ReadOnly);
            }
            let mut parent = self.disk.lock().await;
            if parent.inode_type != InodeType::Directory {
                return Err(SerenaError::NotADirectory);
            }
            if find_dirent(&self.shared, &parent, name).await?.is_some() {
                return Err(SerenaError::Busy);
            }

            let new_lba = self.shared.alloc_block().await?;
            let now = serena_sched::global_clock().gettime();
            let mut new_disk = DiskInode {
                ino: Ino::new(new_lba),
                parent_ino: self.ino,
                inode_type: itype,
                link_count: 1,
                uid: 0,
                gid: 0,
                mode: perms.bits(),
                size: 0,
                direct: [0u64; N_DIRECT],
                timestamps: Timestamps {
                    atime: now,
                    mtime: now,
                    ctime: now,
                },
            };

            if itype == InodeType::Directory {
                let data_lba = self.shared.alloc_block().await?;
                let mut block = alloc::vec![0u8; self.shared.block_size as usize];
                DiskDirEntry {
                    ino: new_lba,
                    name: ".".to_string(),
                }
                .encode(&mut block[0..DIRENT_SIZE])?;
                DiskDirEntry {
                    ino: self.ino.as_u64(),
                    name: "..".to_string(),
                }
                .encode(&mut block[DIRENT_SIZE..DIRENT_SIZE * 2])?;
                write_block(&self.shared, data_lba, &block).await?;
                new_disk.direct[0] = data_lba;
                new_disk.size = u64::from(self.shared.block_size);
                new_disk.link_count = 2;
            }

            write_inode_block(&self.shared, &new_disk).await?;
            insert_dirent(
                &self.shared,
                &mut parent,
                &DiskDirEntry {
                    ino: new_lba,
                    name: name.to_string(),
                },
            )
            .await?;
            write_inode_block(&self.shared, &parent).await?;
            self.sync_info(&parent);

            Ok(load_inode(self.shared.clone(), new_disk).await? as Arc<dyn Inode>)
        })
    }

    fn link<'a>(&'a self, name: &'a str, target: &'a Arc<dyn Inode>) -> InodeFuture<'a, ()> {
        Box::pin(async move {
            if self.shared.read_only {
                return Err(SerenaError::ReadOnly);
            }
            let target = target.as_any().downcast_ref::<SefsInode>().ok_or(SerenaError::Invalid)?;
            if target.inode_type() == InodeType::Directory {
                return Err(SerenaError::NotPermitted);
            }
            let mut parent = self.disk.lock().await;
            if parent.inode_type != InodeType::Directory {
                return Err(SerenaError::NotADirectory);
            }
            if find_dirent(&self.shared, &parent, name).await?.is_some() {
                return Err(SerenaError::Busy);
            }
            insert_dirent(
                &self.shared,
                &mut parent,
                &DiskDirEntry {
                    ino: target.ino.as_u64(),
                    name: name.to_string(),
                },
            )
            .await?;
            write_inode_block(&self.shared, &parent).await?;
            self.sync_info(&parent);
            drop(parent);

            let mut target_disk = target.disk.lock().await;
            target_disk.link_count += 1;
            write_inode_block(&self.shared, &target_disk).await?;
            target.sync_info(&target_disk);
            Ok(())
        })
    }

    fn unlink<'a>(&'a self, name: &'a str) -> InodeFuture<'a, ()> {
        Box::pin(async move {
            if self.shared.read_only {
                return Err(SerenaError::ReadOnly);
            }
            let parent = self.disk.lock().await;
            if parent.inode_type != InodeType::Directory {
                return Err(SerenaError::NotADirectory);
            }
            for &lba in &parent.direct {
                if lba == 0 {
                    continue;
                }
                let mut block = read_block(&self.shared, lba).await?;
                for chunk in block.chunks_exact_mut(DIRENT_SIZE) {
                    let existing = DiskDirEntry::decode(chunk)?;
                    if existing.is_empty() || existing.name != name {
                        continue;
                    }
                    let target_lba = existing.ino;
                    DiskDirEntry::empty().encode(chunk)?;
                    write_block(&self.shared, lba, &block).await?;

                    let mut target = read_inode_block(&self.shared, Ino::new(target_lba)).await?;
                    if target.link_count > 1 {
                        target.link_count -= 1;
                        write_inode_block(&self.shared, &target).await?;
                    } else {
                        for &data_lba in &target.direct {
                            if data_lba != 0 {
                                self.shared.free_block(data_lba).await?;
                            }
                        }
                        self.shared.free_block(target_lba).await?;
                    }
                    return Ok(());
                }
            }
            Err(SerenaError::NotFound)
        })
    }

    fn rename<'a>(
        &'a self,
        old_name: &'a str,
        new_parent: &'a Arc<dyn Inode>,
        new_name: &'a str,
    ) -> InodeFuture<'a, ()> {
        Box::pin(async move {
            if self.shared.read_only {
                return Err(SerenaError::ReadOnly);
            }
            let new_parent = new_parent
                .as_any()
                .downcast_ref::<SefsInode>()
                .ok_or(SerenaError::Invalid)?;

            let moved_ino = {
                let mut parent = self.disk.lock().await;
                if parent.inode_type != InodeType::Directory {
                    return Err(SerenaError::NotADirectory);
                }
                let mut found = None;
                'search: for &lba in &parent.direct {
                    if lba == 0 {
                        continue;
                    }
                    let mut block = read_block(&self.shared, lba).await?;
                    for chunk in block.chunks_exact_mut(DIRENT_SIZE) {
                        let existing = DiskDirEntry::decode(chunk)?;
                        if !existing.is_empty() && existing.name == old_name {
                            found = Some(existing.ino);
                            DiskDirEntry::empty().encode(chunk)?;
                            write_block(&self.shared, lba, &block).await?;
                            break 'search;
                        }
                    }
                }
                write_inode_block(&self.shared, &parent).await?;
                self.sync_info(&parent);
                found.ok_or(SerenaError::NotFound)?
            };

            if core::ptr::eq(self, new_parent) {
                let mut parent = self.disk.lock().await;
                insert_dirent(
                    &self.shared,
                    &mut parent,
                    &DiskDirEntry {
                        ino: moved_ino,
                        name: new_name.to_string(),
                    },
                )
                .await?;
                write_inode_block(&self.shared, &parent).await?;
                self.sync_info(&parent);
            } else {
                let mut np = new_parent.disk.lock().await;
                if find_dirent(&self.shared, &np, new_name).await?.is_some() {
                    return Err(SerenaError::Busy);
                }
                insert_dirent(
                    &self.shared,
                    &mut np,
                    &DiskDirEntry {
                        ino: moved_ino,
                        name: new_name.to_string(),
                    },
                )
                .await?;
                write_inode_block(&self.shared, &np).await?;
                new_parent.sync_info(&np);
            }
            Ok(())
        })
    }

    fn read_link(&self) -> SerenaResult<String> {
        self.symlink_target.clone().ok_or(SerenaError::Invalid)
    }

    fn get_info(&self) -> InodeInfo {
        *self.info.lock()
    }

    fn set_info<'a>(
        &'a self,
        uid: Option<u32>,
        gid: Option<u32>,
        perms: Option<Permissions>,
    ) -> InodeFuture<'a, ()> {
        Box::pin(async move {
            if self.shared.read_only {
                return Err(SerenaError::ReadOnly);
            }
            let mut disk = self.disk.lock().await;
            if let Some(uid) = uid {
                disk.uid = uid;
            }
            if let Some(gid) = gid {
                disk.gid = gid;
            }
            if let Some(perms) = perms {
                disk.mode = perms.bits();
            }
            write_inode_block(&self.shared, &disk).await?;
            self.sync_info(&disk);
            Ok(())
        })
    }
}
