//! Storage capability consumed by the navigator.
//!
//! Two hardware shapes satisfy it: a classic block/FAT driver behind an
//! SPI card ([`block::BlockFatBackend`]) and a find-first/find-next card
//! API ([`cardapi::CardApiBackend`]). Both normalize their records into
//! [`RawRecord`]/[`DirEntry`] so nothing above this layer branches on
//! which hardware is fitted.

pub mod block;
pub mod cardapi;

use crate::entry::DirEntry;

/// Which chip select the mount attempt drives. A failed primary mount is
/// retried once on the alternate before the card is declared missing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChipSelect {
    Primary,
    Alternate,
}

/// One raw directory record as the traversal layer consumes it.
///
/// `EndOfDir` terminates the current directory; `Deleted` covers freed
/// slots and other records that must never surface (volume labels, torn
/// long-name chains). Callers only ever see `Entry` contents.
#[derive(Clone, Debug)]
pub enum RawRecord {
    EndOfDir,
    Deleted,
    Entry(DirEntry),
}

/// Abstract storage capability.
///
/// Directory handles carry their own read cursor so several traversals
/// can be in flight at once (the recursive lister suspends a parent
/// mid-read while it walks a child). File handles are exclusive; the
/// navigator holds at most one open job file.
pub trait StorageBackend {
    type Error: core::fmt::Debug;
    type Dir: Clone;
    type File;

    fn init_card(&mut self, slot: ChipSelect) -> Result<(), Self::Error>;
    fn init_volume(&mut self) -> Result<(), Self::Error>;
    fn open_root(&mut self) -> Result<Self::Dir, Self::Error>;

    fn rewind(&mut self, dir: &mut Self::Dir);
    fn next_record(&mut self, dir: &mut Self::Dir) -> Result<RawRecord, Self::Error>;
    /// `Ok(None)` when no such subdirectory exists.
    fn open_dir(&mut self, parent: &Self::Dir, name: &str)
        -> Result<Option<Self::Dir>, Self::Error>;

    /// Open an existing file for reading; `Ok(None)` when absent.
    fn open_file(
        &mut self,
        parent: &Self::Dir,
        name: &str,
    ) -> Result<Option<Self::File>, Self::Error>;
    /// Create (or truncate) a file for writing; `Ok(None)` when the name
    /// cannot be created in this directory.
    fn create_file(
        &mut self,
        parent: &Self::Dir,
        name: &str,
    ) -> Result<Option<Self::File>, Self::Error>;
    /// `Ok(true)` when an entry was removed.
    fn remove_entry(&mut self, parent: &Self::Dir, name: &str) -> Result<bool, Self::Error>;

    fn file_size(&mut self, file: &Self::File) -> u32;
    fn position(&mut self, file: &Self::File) -> u32;
    fn seek(&mut self, file: &mut Self::File, pos: u32) -> Result<(), Self::Error>;
    fn read(&mut self, file: &mut Self::File, buf: &mut [u8]) -> Result<usize, Self::Error>;
    fn write(&mut self, file: &mut Self::File, data: &[u8]) -> Result<(), Self::Error>;
    fn sync(&mut self, file: &mut Self::File) -> Result<(), Self::Error>;
    fn close(&mut self, file: Self::File) -> Result<(), Self::Error>;
}
