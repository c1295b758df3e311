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

//! Filesystem creation and the directory operations.
//!
//! Each operation writes in the order: index structure first, then inode
//! table, then the superblock if and only if the tree root moved. The
//! superblock rewrite is the commit point: a crash before it can leak an
//! inode or a block, but never corrupts the reachable structure.

use crate::FsError;
use crate::Ibfs;
use crate::Result;
use crate::bplustree::BptKey;
use crate::bplustree::MAX_FILENAME_LENGTH;
use crate::disk::BITS_PER_BLOCK;
use crate::disk::BLOCK_SIZE;
use crate::disk::DATA_BITMAP_BLOCK;
use crate::disk::IBFS_MAGIC;
use crate::disk::IBFS_VERSION;
use crate::disk::INODE_BITMAP_BLOCK;
use crate::disk::INODE_TABLE_START_BLOCK;
use crate::disk::INODES_PER_BLOCK;
use crate::disk::Inode;
use crate::disk::S_IFDIR;
use crate::disk::S_IFREG;
use crate::disk::SUPERBLOCK_BLOCK;
use crate::disk::Superblock;
use crate::util::ceil_division;
use crate::util::reinterpret;
use log::debug;
use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::io::ErrorKind;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::mem;
use std::mem::size_of;
use std::path::Path;
use std::slice;

/// The default number of blocks of a formatted image.
pub const DEFAULT_BLOCK_COUNT: u32 = 4096;
/// The default number of inodes of a formatted image.
pub const DEFAULT_INODE_COUNT: u32 = 1024;

/// A factory to create an IBFS filesystem on a disk image.
#[derive(Default)]
pub struct IbfsFactory {
    /// The total number of blocks; defaults to [`DEFAULT_BLOCK_COUNT`].
    pub block_count: Option<u32>,
    /// The total number of inodes; defaults to [`DEFAULT_INODE_COUNT`].
    pub inode_count: Option<u32>,
    /// The number of demo file entries to seed under the root directory.
    pub seed: Option<u32>,
}

impl IbfsFactory {
    /// Tells whether an IBFS filesystem is present on the given device `dev`.
    pub fn is_present(&self, dev: &mut File) -> io::Result<bool> {
        let mut sb: Superblock = unsafe { mem::zeroed() };
        let slice = unsafe {
            slice::from_raw_parts_mut(&mut sb as *mut _ as *mut u8, size_of::<Superblock>())
        };
        dev.seek(SeekFrom::Start(0))?;
        match dev.read_exact(slice) {
            Ok(()) => Ok(sb.magic == IBFS_MAGIC),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Creates the filesystem on the given device `dev` and returns it
    /// mounted.
    ///
    /// The image is truncated to the requested size, the bitmaps are
    /// initialized with the metadata region reserved, the root directory is
    /// created on inode 0, then the optional demo entries are seeded. The
    /// superblock is written last.
    pub fn create(&self, dev: File) -> Result<Ibfs> {
        let block_count = self.block_count.unwrap_or(DEFAULT_BLOCK_COUNT);
        let inode_count = self.inode_count.unwrap_or(DEFAULT_INODE_COUNT);
        if inode_count == 0 || inode_count > BITS_PER_BLOCK {
            return Err(FsError::InvalidGeometry("inode count does not fit one bitmap block"));
        }
        if block_count > BITS_PER_BLOCK {
            return Err(FsError::InvalidGeometry("block count does not fit one bitmap block"));
        }
        let table_blocks = ceil_division(inode_count, INODES_PER_BLOCK);
        let data_start = INODE_TABLE_START_BLOCK + table_blocks;
        if block_count <= data_start {
            return Err(FsError::InvalidGeometry("too few blocks for the inode table"));
        }
        dev.set_len(block_count as u64 * BLOCK_SIZE as u64)?;

        let mut fs = Ibfs {
            file: dev,
            sb: Superblock {
                magic: IBFS_MAGIC,
                version: IBFS_VERSION,
                block_size: BLOCK_SIZE as u32,
                inode_count,
                block_count,
                root_inode: 0,
                root_bpt_block: 0,
            },
        };
        fs.write_block(INODE_BITMAP_BLOCK, &fill_bitmap(0))?;
        // the superblock, the bitmaps and the inode table are never handed
        // out as data blocks
        fs.write_block(DATA_BITMAP_BLOCK, &fill_bitmap(data_start as usize))?;

        let root_inode = fs.inode_alloc(S_IFDIR | 0o755)?;
        if root_inode != 0 {
            return Err(FsError::Corrupt("first inode allocation did not return 0"));
        }

        let mut root_bpt = 0;
        for i in 0..self.seed.unwrap_or(0) {
            let ino = fs.inode_alloc(S_IFREG | 0o644)?;
            let key = BptKey::new(root_inode, &format!("f{i:03}"));
            fs.bpt_insert(&mut root_bpt, &key, ino)?;
        }
        fs.sb.root_bpt_block = root_bpt;
        fs.write_superblock()?;
        Ok(fs)
    }
}

/// Returns a bitmap block with the first `end` bits set.
fn fill_bitmap(end: usize) -> [u8; BLOCK_SIZE] {
    let mut map = [0u8; BLOCK_SIZE];
    let set_bytes = end / 8;
    let remaining_bits = end % 8;
    map[..set_bytes].fill(0xff);
    if remaining_bits != 0 {
        map[set_bytes] = (1 << remaining_bits) - 1;
    }
    map
}

/// Validates a directory entry name.
fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(FsError::InvalidName);
    }
    if name.len() >= MAX_FILENAME_LENGTH {
        return Err(FsError::InvalidName);
    }
    if name.bytes().any(|b| b == 0 || b == b'/') {
        return Err(FsError::InvalidName);
    }
    Ok(())
}

/// A resolved directory entry, as returned by [`Ibfs::ls`].
pub struct DirEntry {
    /// The entry name.
    pub name: String,
    /// The entry's inode number.
    pub inode_num: u32,
    /// The entry's inode.
    pub inode: Inode,
}

impl Ibfs {
    /// Mounts the filesystem on the image at `path`.
    pub fn mount(path: &Path) -> Result<Self> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        let mut sb: Superblock = unsafe { mem::zeroed() };
        let slice = unsafe {
            slice::from_raw_parts_mut(&mut sb as *mut _ as *mut u8, size_of::<Superblock>())
        };
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(slice)?;
        if sb.magic != IBFS_MAGIC {
            return Err(FsError::BadMagic);
        }
        if sb.version != IBFS_VERSION {
            return Err(FsError::BadVersion(sb.version));
        }
        if sb.block_size != BLOCK_SIZE as u32 {
            return Err(FsError::Corrupt("unexpected block size"));
        }
        if sb.block_count == 0 || sb.inode_count == 0 {
            return Err(FsError::Corrupt("zero block or inode count"));
        }
        if sb.block_count > BITS_PER_BLOCK || sb.inode_count > BITS_PER_BLOCK {
            return Err(FsError::Corrupt("count exceeds bitmap capacity"));
        }
        if sb.root_inode >= sb.inode_count {
            return Err(FsError::Corrupt("root inode out of range"));
        }
        Ok(Self { file, sb })
    }

    /// Writes the in-memory superblock to block 0.
    pub(crate) fn write_superblock(&mut self) -> Result<()> {
        let mut buf = [0u8; BLOCK_SIZE];
        buf[..size_of::<Superblock>()].copy_from_slice(reinterpret(&self.sb));
        self.write_block(SUPERBLOCK_BLOCK, &buf)
    }

    /// Mirrors a tree root change into the superblock.
    ///
    /// This is the commit point of every mutating operation.
    pub(crate) fn commit_root(&mut self, new_root: u32) -> Result<()> {
        if new_root != self.sb.root_bpt_block {
            debug!(
                "root tree block changed: {} -> {new_root}",
                self.sb.root_bpt_block
            );
            self.sb.root_bpt_block = new_root;
            self.write_superblock()?;
        }
        Ok(())
    }

    /// Creates the directory `name` under the directory `parent_ino` and
    /// returns its inode number.
    pub fn mkdir(&mut self, parent_ino: u32, name: &str) -> Result<u32> {
        validate_name(name)?;
        let key = BptKey::new(parent_ino, name);
        match self.bpt_search(self.sb.root_bpt_block, &key) {
            Ok(_) => return Err(FsError::AlreadyExists),
            Err(FsError::NotFound) => {}
            Err(e) => return Err(e),
        }
        let ino = self.inode_alloc(S_IFDIR | 0o755)?;
        let mut root = self.sb.root_bpt_block;
        if let Err(e) = self.bpt_insert(&mut root, &key, ino) {
            let _ = self.free_inode_num(ino);
            return Err(e);
        }
        self.commit_root(root)?;
        Ok(ino)
    }

    /// Removes the empty directory `name` under the directory `parent_ino`.
    pub fn rmdir(&mut self, parent_ino: u32, name: &str) -> Result<()> {
        validate_name(name)?;
        let key = BptKey::new(parent_ino, name);
        let target = self.bpt_search(self.sb.root_bpt_block, &key)?;
        let inode = self.inode_read(target)?;
        if !inode.is_dir() {
            return Err(FsError::NotADirectory);
        }
        let mut root = self.sb.root_bpt_block;
        if self.bpt_iterate(root, target)?.next().transpose()?.is_some() {
            return Err(FsError::NotEmpty);
        }
        self.bpt_delete(&mut root, &key)?;
        self.commit_root(root)?;
        self.free_inode_num(target)?;
        Ok(())
    }

    /// Removes the file `name` under the directory `parent_ino`, freeing its
    /// data blocks.
    pub fn rm(&mut self, parent_ino: u32, name: &str) -> Result<()> {
        validate_name(name)?;
        let key = BptKey::new(parent_ino, name);
        let target = self.bpt_search(self.sb.root_bpt_block, &key)?;
        let inode = self.inode_read(target)?;
        if inode.is_dir() {
            return Err(FsError::IsADirectory);
        }
        let mut root = self.sb.root_bpt_block;
        self.bpt_delete(&mut root, &key)?;
        self.commit_root(root)?;
        for block in inode.direct_blocks {
            if block != 0 {
                self.free_data_block(block)?;
            }
        }
        if inode.single_indirect != 0 {
            let mut ptrs = [0u32; BLOCK_SIZE / 4];
            self.read_block(inode.single_indirect, unsafe {
                &mut *(ptrs.as_mut_ptr() as *mut [u8; BLOCK_SIZE])
            })?;
            for ptr in ptrs {
                if ptr != 0 {
                    self.free_data_block(ptr)?;
                }
            }
            self.free_data_block(inode.single_indirect)?;
        }
        self.free_inode_num(target)?;
        Ok(())
    }

    /// Lists the directory `dir_ino`, returning its entries in key order.
    pub fn ls(&mut self, dir_ino: u32) -> Result<Vec<DirEntry>> {
        let root = self.sb.root_bpt_block;
        let mut raw = Vec::new();
        for entry in self.bpt_iterate(root, dir_ino)? {
            let (key, value) = entry?;
            raw.push((key, value));
        }
        let mut entries = Vec::with_capacity(raw.len());
        for (key, value) in raw {
            entries.push(DirEntry {
                name: key.name_str().into_owned(),
                inode_num: value,
                inode: self.inode_read(value)?,
            });
        }
        Ok(entries)
    }
}
