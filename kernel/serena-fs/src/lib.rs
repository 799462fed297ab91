//! Serena's virtual filesystem layer (spec.md §4.5).
//!
//! A [`hierarchy::FileHierarchy`] resolves paths across mounted
//! [`inode::Filesystem`]s. Three filesystems ship here: [`ramfs`] (the
//! in-memory root image before SerenaFS takes over), [`devfs`] (`/dev`),
//! [`kernfs`] (`/fs`), and [`sefs`] (the on-disk format, SerenaFS proper).
//! A shared [`cache::DiskCache`] pins blocks for every container-backed
//! filesystem; [`channel::OpenChannel`] is the pre-syscall-layer open
//! handle `kernel/serena-kernel`'s `IOChannel` wraps.

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

extern crate alloc;

pub mod cache;
pub mod channel;
pub mod container;
pub mod devfs;
pub mod hierarchy;
pub mod id;
pub mod inode;
pub mod kernfs;
pub mod path;
pub mod ramfs;
pub mod sefs;
pub mod types;

pub use cache::{CacheSession, DiskCache, MapMode, MapToken};
pub use channel::{OpenChannel, OpenFlags};
pub use container::{ContainerGeometry, FsContainer};
pub use devfs::DevFs;
pub use hierarchy::{FileHierarchy, Resolved};
pub use id::Ino;
pub use inode::{Filesystem, Inode, InodeFuture};
pub use kernfs::KernFs;
pub use ramfs::RamFs;
pub use sefs::{SefsFilesystem, format as sefs_format};
pub use types::{DirEntry, FsId, InodeInfo, InodeType, Permissions, Timestamps};
