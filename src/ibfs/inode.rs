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

//! Access to the on-disk inode table.
//!
//! Inodes are packed [`INODES_PER_BLOCK`] per block starting at block
//! [`INODE_TABLE_START_BLOCK`]. Inodes sharing a block share a block write:
//! callers mutating several inodes in one operation must read-modify-write in
//! that order.

use crate::FsError;
use crate::Ibfs;
use crate::Result;
use crate::disk::BLOCK_SIZE;
use crate::disk::INODE_TABLE_START_BLOCK;
use crate::disk::INODES_PER_BLOCK;
use crate::disk::Inode;
use crate::util::get_timestamp;
use crate::util::reinterpret;
use std::mem;
use std::mem::size_of;
use std::slice;

impl Ibfs {
    /// Returns the block and byte offset of the slot of inode `inode_num`.
    fn inode_pos(&self, inode_num: u32) -> Result<(u32, usize)> {
        if inode_num >= self.sb.inode_count {
            return Err(FsError::InodeOutOfRange(inode_num));
        }
        let block = INODE_TABLE_START_BLOCK + inode_num / INODES_PER_BLOCK;
        let off = (inode_num % INODES_PER_BLOCK) as usize * size_of::<Inode>();
        Ok((block, off))
    }

    /// Reads the inode `inode_num` from the table.
    pub fn inode_read(&mut self, inode_num: u32) -> Result<Inode> {
        let (block, off) = self.inode_pos(inode_num)?;
        let mut buf = [0u8; BLOCK_SIZE];
        self.read_block(block, &mut buf)?;
        let mut inode: Inode = unsafe { mem::zeroed() };
        let slice = unsafe {
            slice::from_raw_parts_mut(&mut inode as *mut _ as *mut u8, size_of::<Inode>())
        };
        slice.copy_from_slice(&buf[off..(off + size_of::<Inode>())]);
        Ok(inode)
    }

    /// Writes `inode` to the slot of inode `inode_num`.
    pub fn inode_write(&mut self, inode_num: u32, inode: &Inode) -> Result<()> {
        let (block, off) = self.inode_pos(inode_num)?;
        let mut buf = [0u8; BLOCK_SIZE];
        self.read_block(block, &mut buf)?;
        buf[off..(off + size_of::<Inode>())].copy_from_slice(reinterpret(inode));
        self.write_block(block, &buf)
    }

    /// Allocates a fresh inode with the given `mode` and returns its number.
    ///
    /// The record is initialized with one link, a zero size, the current
    /// timestamps and no data blocks. If the table write fails, the bitmap
    /// bit is released again.
    pub fn inode_alloc(&mut self, mode: u16) -> Result<u32> {
        let inode_num = self.alloc_inode_num()?;
        let now = get_timestamp().as_secs() as i64;
        let mut inode: Inode = unsafe { mem::zeroed() };
        inode.mode = mode;
        inode.links_count = 1;
        inode.atime = now;
        inode.mtime = now;
        inode.ctime = now;
        if let Err(e) = self.inode_write(inode_num, &inode) {
            let _ = self.free_inode_num(inode_num);
            return Err(e);
        }
        Ok(inode_num)
    }
}

#[cfg(test)]
mod test {
    use crate::FsError;
    use crate::Ibfs;
    use crate::disk::S_IFDIR;
    use crate::disk::S_IFREG;
    use crate::fs::IbfsFactory;

    fn scratch_fs() -> Ibfs {
        let file = tempfile::tempfile().unwrap();
        IbfsFactory::default().create(file).unwrap()
    }

    #[test]
    fn alloc_initializes_record() {
        let mut fs = scratch_fs();
        let ino = fs.inode_alloc(S_IFREG | 0o644).unwrap();
        let inode = fs.inode_read(ino).unwrap();
        assert_eq!(inode.mode, S_IFREG | 0o644);
        assert_eq!(inode.links_count, 1);
        assert_eq!(inode.size, 0);
        assert!(inode.atime > 0);
        assert_eq!(inode.atime, inode.mtime);
        assert_eq!(inode.mtime, inode.ctime);
        assert_eq!(inode.direct_blocks, [0; 12]);
        assert_eq!(inode.single_indirect, 0);
    }

    #[test]
    fn write_read_roundtrip() {
        let mut fs = scratch_fs();
        let ino = fs.inode_alloc(S_IFDIR | 0o755).unwrap();
        let mut inode = fs.inode_read(ino).unwrap();
        inode.size = 1337;
        inode.direct_blocks[0] = 42;
        inode.single_indirect = 43;
        fs.inode_write(ino, &inode).unwrap();
        let back = fs.inode_read(ino).unwrap();
        assert_eq!(back.size, 1337);
        assert_eq!(back.direct_blocks[0], 42);
        assert_eq!(back.single_indirect, 43);
        assert!(back.is_dir());
    }

    #[test]
    fn slots_do_not_overlap() {
        let mut fs = scratch_fs();
        let a = fs.inode_alloc(S_IFREG).unwrap();
        let b = fs.inode_alloc(S_IFREG).unwrap();
        let mut inode = fs.inode_read(a).unwrap();
        inode.size = 1;
        fs.inode_write(a, &inode).unwrap();
        assert_eq!(fs.inode_read(b).unwrap().size, 0);
    }

    #[test]
    fn out_of_range() {
        let mut fs = scratch_fs();
        let count = fs.superblock().inode_count;
        assert!(matches!(
            fs.inode_read(count),
            Err(FsError::InodeOutOfRange(_))
        ));
    }
}
