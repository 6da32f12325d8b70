//! In-memory filesystem for host tests.
//!
//! One tree, two driver personalities: `MemBlockDriver` speaks the raw
//! block/FAT record shape (deleted slots, volume labels, LFN sidecars)
//! and `MemCardDriver` speaks the find-first/find-next card API, so the
//! same scenarios exercise both adapters.

use std::string::String as StdString;
use std::vec::Vec as StdVec;

use crate::backend::block::{
    BlockDirRecord, BlockFatDriver, ATTR_DIRECTORY, ATTR_VOLUME, ENTRY_DELETED,
};
use crate::backend::cardapi::{CardApiDriver, FileInfo};
use crate::backend::ChipSelect;
use crate::console::Console;
use crate::entry::{format_83, pack_83, pack_83_lossy};
use crate::LONG_NAME_MAX;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct IoError;

enum NodeKind {
    Dir(StdVec<usize>),
    File(StdVec<u8>),
}

struct Node {
    raw: [u8; 11],
    name: StdString,
    lfn: Option<StdString>,
    kind: NodeKind,
    deleted: bool,
    volume: bool,
    /// Listed but refuses to open, for error-path tests.
    phantom: bool,
}

struct Handle {
    node: usize,
    pos: u32,
    open: bool,
}

pub(crate) struct MemFs {
    nodes: StdVec<Node>,
    handles: StdVec<Handle>,
    pub fail_card: bool,
    pub fail_card_primary_only: bool,
    pub fail_volume: bool,
    pub fail_root: bool,
    pub fail_writes: bool,
}

impl MemFs {
    pub fn new() -> Self {
        let root = Node {
            raw: [b' '; 11],
            name: StdString::new(),
            lfn: None,
            kind: NodeKind::Dir(StdVec::new()),
            deleted: false,
            volume: false,
            phantom: false,
        };
        Self {
            nodes: vec![root],
            handles: StdVec::new(),
            fail_card: false,
            fail_card_primary_only: false,
            fail_volume: false,
            fail_root: false,
            fail_writes: false,
        }
    }

    fn push_node(&mut self, parent: usize, node: Node) -> usize {
        let id = self.nodes.len();
        self.nodes.push(node);
        let NodeKind::Dir(children) = &mut self.nodes[parent].kind else {
            panic!("parent {parent} is not a directory");
        };
        children.push(id);
        id
    }

    fn named_node(name: &str, lfn: Option<&str>, kind: NodeKind) -> Node {
        let raw = pack_83(name).unwrap_or_else(|| pack_83_lossy(name));
        Node {
            raw,
            name: format_83(&raw).as_str().into(),
            lfn: lfn.map(StdString::from),
            kind,
            deleted: false,
            volume: false,
            phantom: false,
        }
    }

    pub fn add_dir(&mut self, parent: usize, name: &str) -> usize {
        self.push_node(parent, Self::named_node(name, None, NodeKind::Dir(StdVec::new())))
    }

    pub fn add_file(&mut self, parent: usize, name: &str, content: &[u8]) -> usize {
        self.push_node(
            parent,
            Self::named_node(name, None, NodeKind::File(content.into())),
        )
    }

    pub fn add_file_lfn(&mut self, parent: usize, name: &str, content: &[u8], lfn: &str) -> usize {
        self.push_node(
            parent,
            Self::named_node(name, Some(lfn), NodeKind::File(content.into())),
        )
    }

    pub fn add_deleted(&mut self, parent: usize, name: &str) {
        let mut node = Self::named_node(name, None, NodeKind::File(StdVec::new()));
        node.deleted = true;
        self.push_node(parent, node);
    }

    pub fn add_dot_entries(&mut self, parent: usize) {
        for name in [".", ".."] {
            let mut raw = [b' '; 11];
            for (idx, &byte) in name.as_bytes().iter().enumerate() {
                raw[idx] = byte;
            }
            let node = Node {
                raw,
                name: name.into(),
                lfn: None,
                kind: NodeKind::Dir(StdVec::new()),
                deleted: false,
                volume: false,
                phantom: false,
            };
            self.push_node(parent, node);
        }
    }

    pub fn add_volume_label(&mut self, parent: usize, name: &str) {
        let mut node = Self::named_node(name, None, NodeKind::File(StdVec::new()));
        node.volume = true;
        self.push_node(parent, node);
    }

    pub fn add_phantom_dir(&mut self, parent: usize, name: &str) {
        let mut node = Self::named_node(name, None, NodeKind::Dir(StdVec::new()));
        node.phantom = true;
        self.push_node(parent, node);
    }

    fn children(&self, dir: usize) -> &[usize] {
        match &self.nodes[dir].kind {
            NodeKind::Dir(children) => children,
            NodeKind::File(_) => panic!("node {dir} is not a directory"),
        }
    }

    fn lookup(&self, dir: usize, name: &str) -> Option<usize> {
        self.children(dir).iter().copied().find(|&id| {
            let node = &self.nodes[id];
            if node.deleted || node.volume {
                return false;
            }
            node.name.eq_ignore_ascii_case(name)
                || matches!(&node.lfn, Some(lfn) if lfn.eq_ignore_ascii_case(name))
        })
    }

    fn open_handle(&mut self, node: usize) -> u32 {
        let id = self.handles.len() as u32;
        self.handles.push(Handle {
            node,
            pos: 0,
            open: true,
        });
        id
    }

    fn content(&self, handle: u32) -> &StdVec<u8> {
        let node = self.handles[handle as usize].node;
        match &self.nodes[node].kind {
            NodeKind::File(content) => content,
            NodeKind::Dir(_) => panic!("handle {handle} is not a file"),
        }
    }

    fn create(&mut self, dir: usize, name: &str) -> usize {
        if let Some(existing) = self.lookup(dir, name) {
            if let NodeKind::File(content) = &mut self.nodes[existing].kind {
                content.clear();
            }
            return existing;
        }
        self.add_file(dir, name, b"")
    }

    fn remove(&mut self, dir: usize, name: &str) -> bool {
        match self.lookup(dir, name) {
            Some(id) => {
                self.nodes[id].deleted = true;
                true
            }
            None => false,
        }
    }

    fn init_card(&self, slot: ChipSelect) -> Result<(), IoError> {
        if self.fail_card {
            return Err(IoError);
        }
        if self.fail_card_primary_only && slot == ChipSelect::Primary {
            return Err(IoError);
        }
        Ok(())
    }

    fn read_at(&mut self, handle: u32, buf: &mut [u8]) -> usize {
        debug_assert!(self.handles[handle as usize].open, "read on closed handle");
        let pos = self.handles[handle as usize].pos as usize;
        let content = self.content(handle);
        let available = content.len().saturating_sub(pos);
        let take = buf.len().min(available);
        buf[..take].copy_from_slice(&content[pos..pos + take]);
        self.handles[handle as usize].pos += take as u32;
        take
    }

    fn write_at(&mut self, handle: u32, data: &[u8]) -> Result<(), IoError> {
        debug_assert!(self.handles[handle as usize].open, "write on closed handle");
        if self.fail_writes {
            return Err(IoError);
        }
        let pos = self.handles[handle as usize].pos as usize;
        let node = self.handles[handle as usize].node;
        let NodeKind::File(content) = &mut self.nodes[node].kind else {
            return Err(IoError);
        };
        if content.len() < pos + data.len() {
            content.resize(pos + data.len(), 0);
        }
        content[pos..pos + data.len()].copy_from_slice(data);
        self.handles[handle as usize].pos += data.len() as u32;
        Ok(())
    }
}

pub(crate) struct MemBlockDriver {
    fs: MemFs,
}

impl MemBlockDriver {
    pub fn new(fs: MemFs) -> Self {
        Self { fs }
    }
}

impl BlockFatDriver for MemBlockDriver {
    type Error = IoError;

    fn init_card(&mut self, slot: ChipSelect) -> Result<(), IoError> {
        self.fs.init_card(slot)
    }

    fn init_volume(&mut self) -> Result<(), IoError> {
        if self.fs.fail_volume {
            return Err(IoError);
        }
        Ok(())
    }

    fn root_dir(&mut self) -> Result<u32, IoError> {
        if self.fs.fail_root {
            return Err(IoError);
        }
        Ok(0)
    }

    fn dir_record(&mut self, dir: u32, index: u32) -> Result<Option<BlockDirRecord>, IoError> {
        let Some(&id) = self.fs.children(dir as usize).get(index as usize) else {
            return Ok(None);
        };
        let node = &self.fs.nodes[id];
        let mut raw = node.raw;
        if node.deleted {
            raw[0] = ENTRY_DELETED;
        }
        let mut attr = 0u8;
        if matches!(node.kind, NodeKind::Dir(_)) {
            attr |= ATTR_DIRECTORY;
        }
        if node.volume {
            attr |= ATTR_VOLUME;
        }
        let size = match &node.kind {
            NodeKind::File(content) => content.len() as u32,
            NodeKind::Dir(_) => 0,
        };
        let mut lfn = [0u8; LONG_NAME_MAX];
        let mut lfn_len = 0u8;
        if let Some(long) = &node.lfn {
            let bytes = long.as_bytes();
            lfn[..bytes.len()].copy_from_slice(bytes);
            lfn_len = bytes.len() as u8;
        }
        Ok(Some(BlockDirRecord {
            name: raw,
            attr,
            size,
            lfn,
            lfn_len,
        }))
    }

    fn lookup_dir(&mut self, dir: u32, name: &str) -> Result<Option<u32>, IoError> {
        Ok(self.fs.lookup(dir as usize, name).and_then(|id| {
            let node = &self.fs.nodes[id];
            if node.phantom || !matches!(node.kind, NodeKind::Dir(_)) {
                None
            } else {
                Some(id as u32)
            }
        }))
    }

    fn open_file(&mut self, dir: u32, name: &str) -> Result<Option<u32>, IoError> {
        match self.fs.lookup(dir as usize, name) {
            Some(id) if matches!(self.fs.nodes[id].kind, NodeKind::File(_)) => {
                Ok(Some(self.fs.open_handle(id)))
            }
            _ => Ok(None),
        }
    }

    fn create_file(&mut self, dir: u32, name: &str) -> Result<Option<u32>, IoError> {
        let id = self.fs.create(dir as usize, name);
        Ok(Some(self.fs.open_handle(id)))
    }

    fn remove(&mut self, dir: u32, name: &str) -> Result<bool, IoError> {
        Ok(self.fs.remove(dir as usize, name))
    }

    fn file_size(&mut self, file: u32) -> u32 {
        self.fs.content(file).len() as u32
    }

    fn position(&mut self, file: u32) -> u32 {
        self.fs.handles[file as usize].pos
    }

    fn seek(&mut self, file: u32, pos: u32) -> Result<(), IoError> {
        self.fs.handles[file as usize].pos = pos;
        Ok(())
    }

    fn read(&mut self, file: u32, buf: &mut [u8]) -> Result<usize, IoError> {
        Ok(self.fs.read_at(file, buf))
    }

    fn write(&mut self, file: u32, data: &[u8]) -> Result<(), IoError> {
        self.fs.write_at(file, data)
    }

    fn sync(&mut self, _file: u32) -> Result<(), IoError> {
        Ok(())
    }

    fn close(&mut self, file: u32) -> Result<(), IoError> {
        self.fs.handles[file as usize].open = false;
        Ok(())
    }
}

pub(crate) struct MemCardDriver {
    fs: MemFs,
    /// Directory node and next child index of the single live stream.
    stream: Option<(usize, usize)>,
}

impl MemCardDriver {
    pub fn new(fs: MemFs) -> Self {
        Self { fs, stream: None }
    }

    fn resolve_dir(&self, path: &str) -> Option<usize> {
        let mut node = 0usize;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let id = self.fs.lookup(node, segment)?;
            let candidate = &self.fs.nodes[id];
            if candidate.phantom || !matches!(candidate.kind, NodeKind::Dir(_)) {
                return None;
            }
            node = id;
        }
        Some(node)
    }

    fn split_path(path: &str) -> Option<(&str, &str)> {
        let trimmed = path.trim_end_matches('/');
        let split = trimmed.rfind('/')?;
        let (dir, leaf) = trimmed.split_at(split);
        let dir = if dir.is_empty() { "/" } else { dir };
        Some((dir, &leaf[1..]))
    }

    fn next_info(&mut self) -> Option<FileInfo> {
        let (dir, mut index) = self.stream?;
        let children = self.fs.children(dir);
        while let Some(&id) = children.get(index) {
            index += 1;
            let node = &self.fs.nodes[id];
            if node.deleted || node.volume {
                continue;
            }
            let reported = node.lfn.as_deref().unwrap_or(node.name.as_str());
            let mut name: heapless::String<LONG_NAME_MAX> = heapless::String::new();
            if name.push_str(reported).is_err() {
                continue;
            }
            let (is_directory, size) = match &node.kind {
                NodeKind::Dir(_) => (true, 0),
                NodeKind::File(content) => (false, content.len() as u32),
            };
            self.stream = Some((dir, index));
            return Some(FileInfo {
                name,
                is_directory,
                size,
            });
        }
        self.stream = Some((dir, index));
        None
    }
}

impl CardApiDriver for MemCardDriver {
    type Error = IoError;

    fn init(&mut self, slot: ChipSelect) -> Result<(), IoError> {
        self.fs.init_card(slot)?;
        if self.fs.fail_volume {
            return Err(IoError);
        }
        Ok(())
    }

    fn find_first(&mut self, dir_path: &str) -> Result<Option<FileInfo>, IoError> {
        let Some(dir) = self.resolve_dir(dir_path) else {
            self.stream = None;
            return Ok(None);
        };
        self.stream = Some((dir, 0));
        Ok(self.next_info())
    }

    fn find_next(&mut self) -> Result<Option<FileInfo>, IoError> {
        Ok(self.next_info())
    }

    fn open(&mut self, path: &str, write: bool) -> Result<Option<u32>, IoError> {
        let Some((dir_path, leaf)) = Self::split_path(path) else {
            return Ok(None);
        };
        let Some(dir) = self.resolve_dir(dir_path) else {
            return Ok(None);
        };
        if write {
            let id = self.fs.create(dir, leaf);
            return Ok(Some(self.fs.open_handle(id)));
        }
        match self.fs.lookup(dir, leaf) {
            Some(id) if matches!(self.fs.nodes[id].kind, NodeKind::File(_)) => {
                Ok(Some(self.fs.open_handle(id)))
            }
            _ => Ok(None),
        }
    }

    fn remove(&mut self, path: &str) -> Result<bool, IoError> {
        let Some((dir_path, leaf)) = Self::split_path(path) else {
            return Ok(false);
        };
        let Some(dir) = self.resolve_dir(dir_path) else {
            return Ok(false);
        };
        Ok(self.fs.remove(dir, leaf))
    }

    fn length(&mut self, handle: u32) -> u32 {
        self.fs.content(handle).len() as u32
    }

    fn tell(&mut self, handle: u32) -> u32 {
        self.fs.handles[handle as usize].pos
    }

    fn seek(&mut self, handle: u32, pos: u32) -> Result<(), IoError> {
        self.fs.handles[handle as usize].pos = pos;
        Ok(())
    }

    fn read(&mut self, handle: u32, buf: &mut [u8]) -> Result<usize, IoError> {
        Ok(self.fs.read_at(handle, buf))
    }

    fn write(&mut self, handle: u32, data: &[u8]) -> Result<(), IoError> {
        self.fs.write_at(handle, data)
    }

    fn flush(&mut self, _handle: u32) -> Result<(), IoError> {
        Ok(())
    }

    fn close(&mut self, handle: u32) -> Result<(), IoError> {
        self.fs.handles[handle as usize].open = false;
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct TestConsole {
    pub echoes: StdVec<StdString>,
    pub errors: StdVec<StdString>,
    pub lines: StdVec<StdString>,
}

impl TestConsole {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Console for TestConsole {
    fn echo(&mut self, msg: &str) {
        self.echoes.push(msg.into());
    }

    fn error(&mut self, msg: &str) {
        self.errors.push(msg.into());
    }

    fn protocol(&mut self, line: &str) {
        self.lines.push(line.into());
    }
}

/// Root with a job file, a backup-marked job file and one subdirectory
/// holding another job file. The shape behind most traversal tests.
pub(crate) fn sample_tree() -> MemFs {
    let mut fs = MemFs::new();
    fs.add_file(0, "CUBE.G", b"G28\nG1 X10 Y10\nG1 X0 Y0\n");
    fs.add_file(0, "TEST~1.G", b"G28\n");
    let sub = fs.add_dir(0, "SUB1");
    fs.add_file(sub, "PART.G", b"G1 Z5\nG1 Z0\n");
    fs
}
