//! Adapter over a find-first/find-next card API.
//!
//! This driver family exposes one implicit enumeration stream per card
//! and reports already-filtered, name-first results (no deleted slots, no
//! volume labels). The adapter synthesizes 8.3 slots from the reported
//! name so the marker filters still work, addresses everything by path,
//! and replays the stream whenever a caller's cursor does not line up
//! with the driver's single stream position.

use heapless::String;

use crate::backend::{ChipSelect, RawRecord, StorageBackend};
use crate::entry::{pack_83, pack_83_lossy, DirEntry};
use crate::{LONG_NAME_MAX, PATH_MAX};

/// One enumeration result as the card API reports it.
#[derive(Clone)]
pub struct FileInfo {
    pub name: String<LONG_NAME_MAX>,
    pub is_directory: bool,
    pub size: u32,
}

/// Find-first/find-next driver surface. `open` with `write` set creates
/// or truncates; enumeration state lives in the driver and is restarted
/// by `find_first`.
pub trait CardApiDriver {
    type Error: core::fmt::Debug;

    fn init(&mut self, slot: ChipSelect) -> Result<(), Self::Error>;
    fn find_first(&mut self, dir_path: &str) -> Result<Option<FileInfo>, Self::Error>;
    fn find_next(&mut self) -> Result<Option<FileInfo>, Self::Error>;

    fn open(&mut self, path: &str, write: bool) -> Result<Option<u32>, Self::Error>;
    fn remove(&mut self, path: &str) -> Result<bool, Self::Error>;

    fn length(&mut self, handle: u32) -> u32;
    fn tell(&mut self, handle: u32) -> u32;
    fn seek(&mut self, handle: u32, pos: u32) -> Result<(), Self::Error>;
    fn read(&mut self, handle: u32, buf: &mut [u8]) -> Result<usize, Self::Error>;
    fn write(&mut self, handle: u32, data: &[u8]) -> Result<(), Self::Error>;
    fn flush(&mut self, handle: u32) -> Result<(), Self::Error>;
    fn close(&mut self, handle: u32) -> Result<(), Self::Error>;
}

#[derive(Clone)]
pub struct CardApiDir {
    path: String<PATH_MAX>,
    cursor: u32,
}

pub struct CardApiBackend<D: CardApiDriver> {
    driver: D,
    /// Directory path and next index of the driver's single live stream.
    stream: Option<(String<PATH_MAX>, u32)>,
}

impl<D: CardApiDriver> CardApiBackend<D> {
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            stream: None,
        }
    }

    fn join(parent: &str, name: &str) -> Option<String<PATH_MAX>> {
        let mut out: String<PATH_MAX> = String::new();
        out.push_str(parent).ok()?;
        if !parent.ends_with('/') {
            out.push('/').ok()?;
        }
        out.push_str(name).ok()?;
        Some(out)
    }

    /// Fetch the record at `dir.cursor`, replaying the stream when some
    /// other traversal has moved it since we last read.
    fn info_at(&mut self, dir: &CardApiDir) -> Result<Option<FileInfo>, D::Error> {
        let aligned = matches!(&self.stream, Some((path, pos))
            if path.as_str() == dir.path.as_str() && *pos == dir.cursor);
        if aligned && dir.cursor > 0 {
            let info = self.driver.find_next()?;
            self.stream = Some((dir.path.clone(), dir.cursor + 1));
            return Ok(info);
        }

        let mut info = self.driver.find_first(dir.path.as_str())?;
        let mut fetched = 1u32;
        while fetched <= dir.cursor {
            if info.is_none() {
                break;
            }
            info = self.driver.find_next()?;
            fetched += 1;
        }
        self.stream = Some((dir.path.clone(), fetched));
        Ok(info)
    }

    fn entry_from(info: &FileInfo) -> DirEntry {
        let raw = pack_83_lossy(info.name.as_str());
        let long_name = if pack_83(info.name.as_str()).is_some() {
            None
        } else {
            Some(info.name.as_str())
        };
        DirEntry::new(raw, info.is_directory, info.size, long_name)
    }
}

impl<D: CardApiDriver> StorageBackend for CardApiBackend<D> {
    type Error = D::Error;
    type Dir = CardApiDir;
    type File = u32;

    fn init_card(&mut self, slot: ChipSelect) -> Result<(), Self::Error> {
        self.stream = None;
        self.driver.init(slot)
    }

    fn init_volume(&mut self) -> Result<(), Self::Error> {
        // The card API mounts the volume as part of init.
        Ok(())
    }

    fn open_root(&mut self) -> Result<Self::Dir, Self::Error> {
        let mut path: String<PATH_MAX> = String::new();
        let _ = path.push('/');
        Ok(CardApiDir { path, cursor: 0 })
    }

    fn rewind(&mut self, dir: &mut Self::Dir) {
        dir.cursor = 0;
    }

    fn next_record(&mut self, dir: &mut Self::Dir) -> Result<RawRecord, Self::Error> {
        match self.info_at(dir)? {
            None => Ok(RawRecord::EndOfDir),
            Some(info) => {
                dir.cursor += 1;
                Ok(RawRecord::Entry(Self::entry_from(&info)))
            }
        }
    }

    fn open_dir(
        &mut self,
        parent: &Self::Dir,
        name: &str,
    ) -> Result<Option<Self::Dir>, Self::Error> {
        let mut probe = parent.clone();
        probe.cursor = 0;
        loop {
            match self.info_at(&probe)? {
                None => return Ok(None),
                Some(info) => {
                    probe.cursor += 1;
                    if info.is_directory && info.name.as_str().eq_ignore_ascii_case(name) {
                        let Some(path) = Self::join(parent.path.as_str(), info.name.as_str())
                        else {
                            // Name does not fit the path buffer; unreachable
                            // for the caller, same as absent.
                            return Ok(None);
                        };
                        return Ok(Some(CardApiDir { path, cursor: 0 }));
                    }
                }
            }
        }
    }

    fn open_file(
        &mut self,
        parent: &Self::Dir,
        name: &str,
    ) -> Result<Option<Self::File>, Self::Error> {
        let Some(path) = Self::join(parent.path.as_str(), name) else {
            return Ok(None);
        };
        self.driver.open(path.as_str(), false)
    }

    fn create_file(
        &mut self,
        parent: &Self::Dir,
        name: &str,
    ) -> Result<Option<Self::File>, Self::Error> {
        let Some(path) = Self::join(parent.path.as_str(), name) else {
            return Ok(None);
        };
        self.stream = None;
        self.driver.open(path.as_str(), true)
    }

    fn remove_entry(&mut self, parent: &Self::Dir, name: &str) -> Result<bool, Self::Error> {
        let Some(path) = Self::join(parent.path.as_str(), name) else {
            return Ok(false);
        };
        self.stream = None;
        self.driver.remove(path.as_str())
    }

    fn file_size(&mut self, file: &Self::File) -> u32 {
        self.driver.length(*file)
    }

    fn position(&mut self, file: &Self::File) -> u32 {
        self.driver.tell(*file)
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
        self.driver.flush(*file)
    }

    fn close(&mut self, file: Self::File) -> Result<(), Self::Error> {
        self.driver.close(file)
    }
}
