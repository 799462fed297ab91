//! In-memory filesystem backed by heap allocations.
//!
//! `RamFs` provides a simple filesystem where all data lives on the
//! kernel heap. Used as the root filesystem image before SerenaFS is
//! mounted over it, and for `/tmp`-style temporary storage. All I/O
//! completes synchronously (futures resolve on their first poll).
//! Ported from the donor kernel's `fs::ramfs`.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::future::Future;
use core::pin::Pin;
use core::sync::atomic::{AtomicU64, Ordering};

use serena_core::error::SerenaError;
use serena_core::sync::IrqSpinLock;

use crate::id::Ino;
use crate::inode::{Filesystem, Inode, InodeFuture};
use crate::types::{DirEntry, InodeInfo, InodeType, Permissions};

static NEXT_INO: AtomicU64 = AtomicU64::new(Ino::ROOT.as_u64() + 1);

fn alloc_ino() -> Ino {
    Ino::new(NEXT_INO.fetch_add(1, Ordering::Relaxed))
}

/// A ramfs filesystem instance.
pub struct RamFs {
    root: Arc<RamInode>,
}

impl Default for RamFs {
    fn default() -> Self {
        Self::new()
    }
}

impl RamFs {
    /// Creates a new ramfs with an empty root directory.
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: Arc::new(RamInode {
                ino: Ino::ROOT,
                itype: InodeType::Directory,
                data: IrqSpinLock::new(Vec::new()),
                children: IrqSpinLock::new(BTreeMap::new()),
                permissions: Permissions::standard_dir(),
            }),
        }
    }
}

impl Filesystem for RamFs {
    fn name(&self) -> &'static str {
        "ramfs"
    }

    fn root(&self) -> Arc<dyn Inode> {
        self.root.clone()
    }
}

/// A ramfs inode (file, directory, or symlink).
pub struct RamInode {
    ino: Ino,
    itype: InodeType,
    data: IrqSpinLock<Vec<u8>>,
    children: IrqSpinLock<BTreeMap<String, Arc<RamInode>>>,
    permissions: Permissions,
}

impl Inode for RamInode {
    fn as_any(&self) -> &dyn core::any::Any {
        self
    }

    fn inode_type(&self) -> InodeType {
        self.itype
    }

    fn size(&self) -> usize {
        self.data.lock().len()
    }

    fn permissions(&self) -> Permissions {
        self.permissions
    }

    fn read<'a>(&'a self, offset: usize, buf: &'a mut [u8]) -> InodeFuture<'a, usize> {
        Box::pin(async move {
            if self.itype != InodeType::Regular {
                return Err(SerenaError::IsADirectory);
            }
            let data = self.data.lock();
            if offset >= data.len() {
                return Ok(0);
            }
            let n = buf.len().min(data.len() - offset);
            buf[..n].copy_from_slice(&data[offset..offset + n]);
            Ok(n)
        })
    }

    fn write<'a>(&'a self, offset: usize, buf: &'a [u8]) -> InodeFuture<'a, usize> {
        Box::pin(async move {
            if self.itype != InodeType::Regular {
                return Err(SerenaError::IsADirectory);
            }
            let mut data = self.data.lock();
            let end = offset + buf.len();
            if data.len() < end {
                data.resize(end, 0);
            }
            data[offset..end].copy_from_slice(buf);
            Ok(buf.len())
        })
    }

    fn truncate(&self, len: usize) -> InodeFuture<'_, ()> {
        Box::pin(async move {
            if self.itype != InodeType::Regular {
                return Err(SerenaError::IsADirectory);
            }
            self.data.lock().resize(len, 0);
            Ok(())
        })
    }

    fn lookup<'a>(&'a self, name: &'a str) -> InodeFuture<'a, Arc<dyn Inode>> {
        Box::pin(async move {
            if self.itype != InodeType::Directory {
                return Err(SerenaError::NotADirectory);
            }
            let children = self.children.lock();
            children
                .get(name)
                .cloned()
                .map(|inode| inode as Arc<dyn Inode>)
                .ok_or(SerenaError::NotFound)
        })
    }

    fn readdir(&self) -> InodeFuture<'_, Vec<DirEntry>> {
        Box::pin(async move {
            if self.itype != InodeType::Directory {
                return Err(SerenaError::NotADirectory);
            }
            let children = self.children.lock();
            Ok(children
                .iter()
                .map(|(name, inode)| DirEntry {
                    name: name.clone(),
                    inode_type: inode.itype,
                    ino: inode.ino,
                })
                .collect())
        })
    }

    fn create<'a>(
        &'a self,
        name: &'a str,
        itype: InodeType,
        perms: Permissions,
    ) -> InodeFuture<'a, Arc<dyn Inode>> {
        Box::pin(async move {
            if self.itype != InodeType::Directory {
                return Err(SerenaError::NotADirectory);
            }
            let mut children = self.children.lock();
            if children.contains_key(name) {
                return Err(SerenaError::Busy);
            }
            let new_inode = Arc::new(RamInode {
                ino: alloc_ino(),
                itype,
                data: IrqSpinLock::new(Vec::new()),
                children: IrqSpinLock::new(BTreeMap::new()),
                permissions: perms,
            });
            children.insert(name.to_string(), new_inode.clone());
            Ok(new_inode as Arc<dyn Inode>)
        })
    }

    fn unlink<'a>(&'a self, name: &'a str) -> InodeFuture<'a, ()> {
        Box::pin(async move {
            if self.itype != InodeType::Directory {
                return Err(SerenaError::NotADirectory);
            }
            let mut children = self.children.lock();
            children.remove(name).ok_or(SerenaError::NotFound)?;
            Ok(())
        })
    }

    fn rename<'a>(
        &'a self,
        old_name: &'a str,
        new_parent: &'a Arc<dyn Inode>,
        new_name: &'a str,
    ) -> InodeFuture<'a, ()> {
        Box::pin(async move {
            if self.itype != InodeType::Directory {
                return Err(SerenaError::NotADirectory);
            }
            let entry = {
                let mut children = self.children.lock();
                children.remove(old_name).ok_or(SerenaError::NotFound)?
            };
            let new_parent = new_parent
                .as_any()
                .downcast_ref::<RamInode>()
                .ok_or(SerenaError::Invalid)?;
            let mut new_children = new_parent.children.lock();
            if new_children.contains_key(new_name) {
                return Err(SerenaError::Busy);
            }
            new_children.insert(new_name.to_string(), entry);
            Ok(())
        })
    }

    fn read_link(&self) -> Result<String, SerenaError> {
        if self.itype != InodeType::Symlink {
            return Err(SerenaError::Invalid);
        }
        let data = self.data.lock();
        String::from_utf8(data.clone()).map_err(|_| SerenaError::Io)
    }

    fn create_symlink(
        &self,
        name: &str,
        target: &str,
        perms: Permissions,
    ) -> Result<Arc<dyn Inode>, SerenaError> {
        if self.itype != InodeType::Directory {
            return Err(SerenaError::NotADirectory);
        }
        let mut children = self.children.lock();
        if children.contains_key(name) {
            return Err(SerenaError::Busy);
        }
        let new_inode = Arc::new(RamInode {
            ino: alloc_ino(),
            itype: InodeType::Symlink,
            data: IrqSpinLock::new(target.as_bytes().to_vec()),
            children: IrqSpinLock::new(BTreeMap::new()),
            permissions: perms,
        });
        children.insert(name.to_string(), new_inode.clone());
        Ok(new_inode)
    }

    fn get_info(&self) -> InodeInfo {
        InodeInfo {
            ino: self.ino,
            inode_type: self.itype,
            link_count: 1,
            uid: 0,
            gid: 0,
            permissions: self.permissions,
            size: self.data.lock().len() as u64,
        }
    }
}
