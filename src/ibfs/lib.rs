/*
 * Copyright 2025 Luc Lenôtre
 *
 * This file is part of Maestro.
 *
 * Maestro is free software: you can redistribute it and/or modify it under the
 * terms of the GNU General Public License as published by the Free Software
 * Foundation, either version 3 of the License, or (at your option) any later
 * version.
 *
 * Maestro is distributed in the hope that it will be useful, but WITHOUT ANY
 * WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR
 * A PARTICULAR PURPOSE. See the GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License along with
 * Maestro. If not, see <https://www.gnu.org/licenses/>.
 */

//! IBFS is a small filesystem stored inside a single image file, with every
//! directory entry indexed by an on-disk B+ tree.
//!
//! The image is divided in blocks of [`disk::BLOCK_SIZE`] bytes:
//! - block 0 holds the superblock;
//! - block 1 holds the inode allocation bitmap;
//! - block 2 holds the data block allocation bitmap;
//! - the inode table follows, then general purpose blocks, used both for file
//!   content and for B+ tree nodes.
//!
//! Directory entries are keyed by `(parent inode, name hash, name)` so that
//! all the entries of a directory are contiguous in the index and can be
//! listed by walking the linked leaves of the tree.

pub mod bitmap;
pub mod bplustree;
pub mod disk;
pub mod fs;
pub mod inode;
pub mod io;
pub mod util;

use crate::disk::Superblock;
use std::fs::File;
use thiserror::Error;

/// An error occurring during a filesystem operation.
#[derive(Error, Debug)]
pub enum FsError {
    /// I/O failure on the backing image.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// The image does not carry the filesystem's magic number.
    #[error("not a valid filesystem (bad magic number)")]
    BadMagic,
    /// The filesystem's version is not supported.
    #[error("unsupported filesystem version {0}")]
    BadVersion(u32),
    /// The geometry requested at format time cannot be represented.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(&'static str),
    /// An on-disk structure is inconsistent.
    #[error("corrupt filesystem: {0}")]
    Corrupt(&'static str),
    /// A B+ tree node failed validation.
    #[error("corrupt node at block {block}: {reason}")]
    CorruptNode {
        /// The block holding the node.
        block: u32,
        /// What the validation found.
        reason: &'static str,
    },
    /// An inode number beyond the superblock's inode count.
    #[error("inode number {0} out of range")]
    InodeOutOfRange(u32),
    /// A block number outside of the allocatable range.
    #[error("block number {0} out of range")]
    BlockOutOfRange(u32),
    /// The inode bitmap has no clear bit left.
    #[error("no free inode")]
    NoFreeInodes,
    /// The data block bitmap has no clear bit left.
    #[error("no free block")]
    NoFreeBlocks,
    /// The entry does not exist.
    #[error("no such entry")]
    NotFound,
    /// An entry with the same name already exists in the directory.
    #[error("entry already exists")]
    AlreadyExists,
    /// The directory to be removed still has entries.
    #[error("directory not empty")]
    NotEmpty,
    /// The operation requires a directory.
    #[error("not a directory")]
    NotADirectory,
    /// The operation requires a regular file.
    #[error("is a directory")]
    IsADirectory,
    /// The entry name is empty, too long, or reserved.
    #[error("invalid name")]
    InvalidName,
}

/// Result alias for filesystem operations.
pub type Result<T> = std::result::Result<T, FsError>;

/// A mounted filesystem.
///
/// The context exclusively owns the backing image file; all operations are
/// synchronous and non-reentrant. Dropping the context closes the image.
pub struct Ibfs {
    /// The backing image file.
    pub(crate) file: File,
    /// In-memory copy of the superblock.
    pub(crate) sb: Superblock,
}

impl Ibfs {
    /// Returns the filesystem's superblock.
    pub fn superblock(&self) -> &Superblock {
        &self.sb
    }
}
