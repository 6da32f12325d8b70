//! Adapter over a classic block/FAT directory driver.
//!
//! The driver hands out raw 32-byte-style records: eleven 8.3 name slots
//! with the FAT sentinel conventions in slot zero, an attribute byte and
//! a long-name sidecar collected while the record was read. The adapter
//! turns those into canonical [`RawRecord`]s and keeps the read cursor in
//! the directory handle.

use crate::backend::{ChipSelect, RawRecord, StorageBackend};
use crate::entry::DirEntry;
use crate::LONG_NAME_MAX;

pub const ATTR_DIRECTORY: u8 = 0x10;
pub const ATTR_VOLUME: u8 = 0x08;
/// Slot-zero sentinel: this record and everything after it is unused.
pub const ENTRY_FREE: u8 = 0x00;
/// Slot-zero sentinel: this record was deleted.
pub const ENTRY_DELETED: u8 = 0xE5;

/// One directory record exactly as the block driver stores it.
#[derive(Clone, Copy)]
pub struct BlockDirRecord {
    pub name: [u8; 11],
    pub attr: u8,
    pub size: u32,
    pub lfn: [u8; LONG_NAME_MAX],
    pub lfn_len: u8,
}

impl BlockDirRecord {
    pub fn long_name(&self) -> Option<&str> {
        if self.lfn_len == 0 {
            return None;
        }
        core::str::from_utf8(&self.lfn[..self.lfn_len as usize]).ok()
    }
}

/// Block/FAT driver surface: directories and files are small integer
/// handles owned by the driver, records are addressed by index.
pub trait BlockFatDriver {
    type Error: core::fmt::Debug;

    fn init_card(&mut self, slot: ChipSelect) -> Result<(), Self::Error>;
    fn init_volume(&mut self) -> Result<(), Self::Error>;
    fn root_dir(&mut self) -> Result<u32, Self::Error>;

    /// `Ok(None)` past the physical end of the directory.
    fn dir_record(&mut self, dir: u32, index: u32)
        -> Result<Option<BlockDirRecord>, Self::Error>;
    fn lookup_dir(&mut self, dir: u32, name: &str) -> Result<Option<u32>, Self::Error>;

    fn open_file(&mut self, dir: u32, name: &str) -> Result<Option<u32>, Self::Error>;
    fn create_file(&mut self, dir: u32, name: &str) -> Result<Option<u32>, Self::Error>;
    fn remove(&mut self, dir: u32, name: &str) -> Result<bool, Self::Error>;

    fn file_size(&mut self, file: u32) -> u32;
    fn position(&mut self, file: u32) -> u32;
    fn seek(&mut self, file: u32, pos: u32) -> Result<(), Self::Error>;
    fn read(&mut self, file: u32, buf: &mut [u8]) -> Result<usize, Self::Error>;
    fn write(&mut self, file: u32, data: &[u8]) -> Result<(), Self::Error>;
    fn sync(&mut self, file: u32) -> Result<(), Self::Error>;
    fn close(&mut self, file: u32) -> Result<(), Self::Error>;
}

#[derive(Clone)]
pub struct BlockDir {
    id: u32,
    cursor: u32,
}

pub struct BlockFatBackend<D: BlockFatDriver> {
    driver: D,
}

impl<D: BlockFatDriver> BlockFatBackend<D> {
    pub fn new(driver: D) -> Self {
        Self { driver }
    }
}

impl<D: BlockFatDriver> StorageBackend for BlockFatBackend<D> {
    type Error = D::Error;
    type Dir = BlockDir;
    type File = u32;

    fn init_card(&mut self, slot: ChipSelect) -> Result<(), Self::Error> {
        self.driver.init_card(slot)
    }

    fn init_volume(&mut self) -> Result<(), Self::Error> {
        self.driver.init_volume()
    }

    fn open_root(&mut self) -> Result<Self::Dir, Self::Error> {
        let id = self.driver.root_dir()?;
        Ok(BlockDir { id, cursor: 0 })
    }

    fn rewind(&mut self, dir: &mut Self::Dir) {
        dir.cursor = 0;
    }

    fn next_record(&mut self, dir: &mut Self::Dir) -> Result<RawRecord, Self::Error> {
        let Some(record) = self.driver.dir_record(dir.id, dir.cursor)? else {
            return Ok(RawRecord::EndOfDir);
        };
        dir.cursor += 1;
        match record.name[0] {
            ENTRY_FREE => Ok(RawRecord::EndOfDir),
            ENTRY_DELETED => Ok(RawRecord::Deleted),
            _ if record.attr & ATTR_VOLUME != 0 => Ok(RawRecord::Deleted),
            _ => Ok(RawRecord::Entry(DirEntry::new(
                record.name,
                record.attr & ATTR_DIRECTORY != 0,
                record.size,
                record.long_name(),
            ))),
        }
    }

    fn open_dir(
        &mut self,
        parent: &Self::Dir,
        name: &str,
    ) -> Result<Option<Self::Dir>, Self::Error> {
        Ok(self
            .driver
            .lookup_dir(parent.id, name)?
            .map(|id| BlockDir { id, cursor: 0 }))
    }

    fn open_file(
        &mut self,
        parent: &Self::Dir,
        name: &str,
    ) -> Result<Option<Self::File>, Self::Error> {
        self.driver.open_file(parent.id, name)
    }

    fn create_file(
        &mut self,
        parent: &Self::Dir,
        name: &str,
    ) -> Result<Option<Self::File>, Self::Error> {
        self.driver.create_file(parent.id, name)
    }

    fn remove_entry(&mut self, parent: &Self::Dir, name: &str) -> Result<bool, Self::Error> {
        self.driver.remove(parent.id, name)
    }

    fn file_size(&mut self, file: &Self::File) -> u32 {
        self.driver.file_size(*file)
    }

    fn position(&mut self, file: &Self::File) -> u32 {
        self.driver.position(*file)
    }

    fn seek(&mut self, file: &mut Self::File, pos: u32) -> Result<(), Self::Error> {
        self.driver.seek(*file, pos)
    }

    fn read(&mut self, file: &mut Self::File, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.driver.read(*file, buf)
    }

    fn write(&mut self, file: &mut Self::File, data: &[u8]) -> Result<(), Self::Error> {
        self.driver.write(*file, data)
    }

    fn sync(&mut self, file: &mut Self::File) -> Result<(), Self::Error> {
        self.driver.sync(*file)
    }

    fn close(&mut self, file: Self::File) -> Result<(), Self::Error> {
        self.driver.close(file)
    }
}
