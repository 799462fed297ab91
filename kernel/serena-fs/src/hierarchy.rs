//! Path resolution over the mount graph (spec.md §4.5: "FileHierarchy
//! resolves paths ... absolute paths start at the process root; `.`/`..`
//! are handled syntactically but `..` across a mount point crosses mounts
//! correctly; symbolic links are followed up to a fixed recursion bound
//! (otherwise `ELOOP`); the final component can resolve to the parent,
//! the target, or fail with `ENOENT`/`ENOTDIR`.").
//!
//! Grounded on the donor's `hadron-fs` crate's `vfs::Vfs` (the version
//! under `kernel/fs/src`, which carries `MAX_SYMLINK_DEPTH` and
//! `resolve_with_depth`); extended with [`crate::path::normalize`]'s
//! lexical `.`/`..` pass so mount-crossing falls out of ordinary
//! longest-prefix matching instead of needing real parent-inode links.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::future::Future;
use core::pin::Pin;

use serena_core::error::{SerenaError, SerenaResult};
use serena_core::sync::IrqSpinLock;

use crate::inode::{Filesystem, Inode};
use crate::kernfs::MountEntry;
use crate::path;
use crate::types::InodeType;

/// Symlink resolution depth past which [`FileHierarchy::resolve`] fails
/// with [`SerenaError::SymlinkLoop`].
pub const MAX_SYMLINK_DEPTH: usize = 8;

/// The result of resolving a path to its final component: the directory
/// that contains it, plus the name the caller asked for within that
/// directory. The named entry itself may or may not exist — callers doing
/// `create`/`link` want it absent; callers doing `lookup`/`unlink` want
/// it present and resolve it themselves via `parent.lookup(name)`.
pub struct Resolved {
    /// The containing directory.
    pub parent: Arc<dyn Inode>,
    /// The final path component's name.
    pub name: String,
}

/// A mount graph over filesystems, with root and cwd context.
pub struct FileHierarchy {
    mounts: IrqSpinLock<BTreeMap<String, Arc<dyn Filesystem>>>,
}

impl Default for FileHierarchy {
    fn default() -> Self {
        Self::new()
    }
}

impl FileHierarchy {
    /// Creates an empty hierarchy (no mounts, not even `/`).
    #[must_use]
    pub const fn new() -> Self {
        Self {
            mounts: IrqSpinLock::new(BTreeMap::new()),
        }
    }

    /// Mounts `fs` at `path` (which must already be a directory on an
    /// existing mount, except for the root mount `/` itself).
    pub fn mount(&self, path: &str, fs: Arc<dyn Filesystem>) {
        self.mounts.lock().insert(path.to_string(), fs);
    }

    /// Removes the mount at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`SerenaError::NotFound`] if nothing is mounted there.
    pub fn unmount(&self, path: &str) -> SerenaResult<()> {
        self.mounts
            .lock()
            .remove(path)
            .map(|_| ())
            .ok_or(SerenaError::NotFound)
    }

    /// A snapshot of the current mount table, for publishing through
    /// KernFS's `/fs`.
    #[must_use]
    pub fn mount_listing(&self) -> Vec<MountEntry> {
        self.mounts
            .lock()
            .iter()
            .map(|(path, fs)| MountEntry {
                path: path.clone(),
                fs_name: fs.name(),
                read_only: fs.is_read_only(),
            })
            .collect()
    }

    /// Resolves `path` (absolute, or relative to `cwd`) to its inode.
    ///
    /// # Errors
    ///
    /// [`SerenaError::Invalid`] if no filesystem is mounted at all (not
    /// even `/`); [`SerenaError::NotFound`] if a component doesn't exist;
    /// [`SerenaError::NotADirectory`] if a non-final component isn't a
    /// directory; [`SerenaError::SymlinkLoop`] past
    /// [`MAX_SYMLINK_DEPTH`].
    pub async fn resolve(&self, path: &str, cwd: &str) -> SerenaResult<Arc<dyn Inode>> {
        let canonical = path::normalize(path, cwd);
        self.resolve_canonical(&canonical, 0).await
    }

    /// Resolves `path` to its containing directory and final component
    /// name, without requiring the final component to exist (spec.md:
    /// "the final component can resolve to the parent, the target, or
    /// fail with ENOENT/ENOTDIR").
    ///
    /// # Errors
    ///
    /// As [`FileHierarchy::resolve`], but only for the parent path; the
    /// final component's own existence is the caller's concern.
    pub async fn resolve_parent(&self, path: &str, cwd: &str) -> SerenaResult<Resolved> {
        let canonical = path::normalize(path, cwd);
        let mut components: Vec<&str> = path::components(&canonical).collect();
        let name = components.pop().ok_or(SerenaError::Invalid)?.to_string();
        let mut parent_path = String::from("/");
        for (i, c) in components.iter().enumerate() {
            if i > 0 {
                parent_path.push('/');
            }
            parent_path.push_str(c);
        }
        let parent = self.resolve_canonical(&parent_path, 0).await?;
        if parent.inode_type() != InodeType::Directory {
            return Err(SerenaError::NotADirectory);
        }
        Ok(Resolved { parent, name })
    }

    /// Boxed, non-`async fn` so the recursive symlink-following call below
    /// doesn't require an infinitely-sized future type.
    fn resolve_canonical<'a>(
        &'a self,
        canonical: &'a str,
        depth: usize,
    ) -> Pin<Box<dyn Future<Output = SerenaResult<Arc<dyn Inode>>> + Send + 'a>> {
        Box::pin(async move {
            if depth > MAX_SYMLINK_DEPTH {
                return Err(SerenaError::SymlinkLoop);
            }

            let (mount_path, fs) = {
                let mounts = self.mounts.lock();
                let mount_path =
                    path::longest_prefix_match(canonical, mounts.keys().map(String::as_str))
                        .ok_or(SerenaError::Invalid)?
                        .to_string();
                let fs = mounts.get(&mount_path).cloned().ok_or(SerenaError::Invalid)?;
                (mount_path, fs)
            };

            let root = fs.root();
            let remainder = path::strip_mount_prefix(canonical, &mount_path);
            if remainder.is_empty() {
                return Ok(root);
            }

            let mut current = root;
            for component in path::components(remainder) {
                if current.inode_type() != InodeType::Directory {
                    return Err(SerenaError::NotADirectory);
                }
                current = current.lookup(component).await?;

                if current.inode_type() == InodeType::Symlink {
                    let target = current.read_link()?;
                    let target_canonical = path::normalize(&target, &mount_path);
                    current = self.resolve_canonical(&target_canonical, depth + 1).await?;
                }
            }

            Ok(current)
        })
    }
}
