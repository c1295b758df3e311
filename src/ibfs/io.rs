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

//! Block I/O on the backing image.
//!
//! Blocks are transferred whole: a short read or write is an error, never a
//! partial success.

use crate::FsError;
use crate::Ibfs;
use crate::Result;
use crate::disk::BLOCK_SIZE;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::io::Write;

impl Ibfs {
    /// Reads block `block_num` into `buf`.
    pub fn read_block(&mut self, block_num: u32, buf: &mut [u8; BLOCK_SIZE]) -> Result<()> {
        self.check_block_bounds(block_num)?;
        self.file
            .seek(SeekFrom::Start(block_num as u64 * BLOCK_SIZE as u64))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    /// Writes `buf` to block `block_num`.
    pub fn write_block(&mut self, block_num: u32, buf: &[u8; BLOCK_SIZE]) -> Result<()> {
        self.check_block_bounds(block_num)?;
        self.file
            .seek(SeekFrom::Start(block_num as u64 * BLOCK_SIZE as u64))?;
        self.file.write_all(buf)?;
        Ok(())
    }

    fn check_block_bounds(&self, block_num: u32) -> Result<()> {
        if block_num >= self.sb.block_count {
            return Err(FsError::BlockOutOfRange(block_num));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use crate::FsError;
    use crate::Ibfs;
    use crate::disk::BLOCK_SIZE;
    use crate::fs::IbfsFactory;

    fn scratch_fs() -> Ibfs {
        let file = tempfile::tempfile().unwrap();
        IbfsFactory::default().create(file).unwrap()
    }

    #[test]
    fn write_read_roundtrip() {
        let mut fs = scratch_fs();
        let block = fs.superblock().block_count - 1;
        let write_buf = [b'A'; BLOCK_SIZE];
        fs.write_block(block, &write_buf).unwrap();
        let mut read_buf = [b'B'; BLOCK_SIZE];
        fs.read_block(block, &mut read_buf).unwrap();
        assert_eq!(write_buf, read_buf);
    }

    #[test]
    fn out_of_range() {
        let mut fs = scratch_fs();
        let block = fs.superblock().block_count;
        let mut buf = [0; BLOCK_SIZE];
        assert!(matches!(
            fs.read_block(block, &mut buf),
            Err(FsError::BlockOutOfRange(_))
        ));
        assert!(matches!(
            fs.write_block(block, &buf),
            Err(FsError::BlockOutOfRange(_))
        ));
    }
}
