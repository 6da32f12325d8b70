//! Policy-driven traversal over one directory's records.
//!
//! The three policies deliberately do not traverse alike: `ListNames`
//! dives depth-first into every subdirectory and emits one protocol line
//! per file found anywhere below the start, while `Count` and
//! `FindByIndexOrName` stay flat and treat subdirectories as ordinary
//! entries of the start directory. Interpreters and displays depend on
//! both sides of that split.

use core::fmt::Write as _;

use heapless::{String, Vec};

use crate::backend::{RawRecord, StorageBackend};
use crate::console::Console;
use crate::entry::{entry_matches, DirEntry};
use crate::navigator::NavError;
use crate::{LINE_MAX, MAX_DIR_DEPTH, PATH_MAX};

/// What to do with each record the walk encounters.
#[derive(Clone, Copy, Debug)]
pub enum TraversalPolicy<'a> {
    /// Count the surviving entries of the start directory.
    Count,
    /// Emit `<prefix><name>` for every file, diving into subdirectories.
    ListNames,
    /// Return the first entry matching `name` (case-insensitive), or the
    /// entry at `index` among surviving entries when `name` is absent.
    FindByIndexOrName { index: u16, name: Option<&'a str> },
}

#[derive(Debug, PartialEq, Eq)]
pub enum WalkOutcome {
    Count(u16),
    Listed,
    Found(DirEntry),
    NotFound,
}

/// Record filter shared by every policy: dot and hidden entries vanish,
/// files must carry the job marker and must not be backups. Directories
/// pass regardless of their extension slots.
fn skip_entry(entry: &DirEntry) -> bool {
    if entry.name.is_empty() || entry.is_dot() || entry.hidden_long_name() {
        return true;
    }
    if !entry.is_dir {
        if !entry.has_job_marker() {
            return true;
        }
        if entry.is_backup() {
            return true;
        }
    }
    false
}

pub fn walk<B: StorageBackend, C: Console>(
    backend: &mut B,
    start: &B::Dir,
    policy: TraversalPolicy<'_>,
    console: &mut C,
) -> Result<WalkOutcome, NavError<B::Error>> {
    match policy {
        TraversalPolicy::Count => count_entries(backend, start).map(WalkOutcome::Count),
        TraversalPolicy::ListNames => list_names(backend, start, console).map(|()| WalkOutcome::Listed),
        TraversalPolicy::FindByIndexOrName { index, name } => {
            find_entry(backend, start, index, name).map(|found| match found {
                Some(entry) => WalkOutcome::Found(entry),
                None => WalkOutcome::NotFound,
            })
        }
    }
}

pub(crate) fn count_entries<B: StorageBackend>(
    backend: &mut B,
    start: &B::Dir,
) -> Result<u16, NavError<B::Error>> {
    let mut cursor = start.clone();
    backend.rewind(&mut cursor);
    let mut count: u16 = 0;
    loop {
        match backend.next_record(&mut cursor).map_err(NavError::Backend)? {
            RawRecord::EndOfDir => return Ok(count),
            RawRecord::Deleted => {}
            RawRecord::Entry(entry) => {
                if !skip_entry(&entry) {
                    count = count.saturating_add(1);
                }
            }
        }
    }
}

pub(crate) fn find_entry<B: StorageBackend>(
    backend: &mut B,
    start: &B::Dir,
    index: u16,
    name: Option<&str>,
) -> Result<Option<DirEntry>, NavError<B::Error>> {
    let mut cursor = start.clone();
    backend.rewind(&mut cursor);
    let mut seen: u16 = 0;
    loop {
        match backend.next_record(&mut cursor).map_err(NavError::Backend)? {
            RawRecord::EndOfDir => return Ok(None),
            RawRecord::Deleted => {}
            RawRecord::Entry(entry) => {
                if skip_entry(&entry) {
                    continue;
                }
                let hit = match name {
                    Some(wanted) => entry_matches(&entry, wanted),
                    None => seen == index,
                };
                if hit {
                    return Ok(Some(entry));
                }
                seen = seen.saturating_add(1);
            }
        }
    }
}

/// Depth-first pre-order listing with an owned directory stack; the call
/// stack never grows with the tree. A branch deeper than `MAX_DIR_DEPTH`
/// or a path that outgrows the prefix buffer fails the listing instead of
/// truncating output.
pub(crate) fn list_names<B: StorageBackend, C: Console>(
    backend: &mut B,
    start: &B::Dir,
    console: &mut C,
) -> Result<(), NavError<B::Error>> {
    let mut stack: Vec<(B::Dir, usize), MAX_DIR_DEPTH> = Vec::new();
    let mut prefix: String<PATH_MAX> = String::new();
    prefix.push('/').map_err(|_| NavError::PathTooLong)?;

    let mut cursor = start.clone();
    backend.rewind(&mut cursor);
    loop {
        match backend.next_record(&mut cursor).map_err(NavError::Backend)? {
            RawRecord::EndOfDir => match stack.pop() {
                Some((parent, prefix_len)) => {
                    prefix.truncate(prefix_len);
                    cursor = parent;
                }
                None => return Ok(()),
            },
            RawRecord::Deleted => {}
            RawRecord::Entry(entry) => {
                if skip_entry(&entry) {
                    continue;
                }
                if entry.is_dir {
                    let child = match backend
                        .open_dir(&cursor, entry.display_name())
                        .map_err(NavError::Backend)?
                    {
                        Some(child) => child,
                        None => {
                            let mut line: String<LINE_MAX> = String::new();
                            let _ = write!(line, "Cannot open subdir: {}", entry.name);
                            console.error(line.as_str());
                            continue;
                        }
                    };
                    if stack.is_full() {
                        return Err(NavError::DirDepthExceeded);
                    }
                    let keep = prefix.len();
                    prefix
                        .push_str(entry.name.as_str())
                        .map_err(|_| NavError::PathTooLong)?;
                    prefix.push('/').map_err(|_| NavError::PathTooLong)?;
                    let parent = core::mem::replace(&mut cursor, child);
                    stack
                        .push((parent, keep))
                        .map_err(|_| NavError::DirDepthExceeded)?;
                    backend.rewind(&mut cursor);
                } else {
                    let mut line: String<LINE_MAX> = String::new();
                    line.push_str(prefix.as_str())
                        .map_err(|_| NavError::PathTooLong)?;
                    line.push_str(entry.name.as_str())
                        .map_err(|_| NavError::PathTooLong)?;
                    console.protocol(line.as_str());
                }
            }
        }
    }
}
