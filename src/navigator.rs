//! Central owner of all print-job storage state.
//!
//! One `CardNavigator` owns the mount state, the working directory, the
//! single job session and the sub-call stack. External collaborators (the
//! G-code interpreter, displays, hosts) only reach this state through the
//! operations here; nothing is shared by reference across the interrupt
//! boundary.

use core::fmt::Write as _;

use heapless::{Deque, String};

use crate::autostart::{self, AutostartState};
use crate::backend::{ChipSelect, StorageBackend};
use crate::console::Console;
use crate::entry::DirEntry;
use crate::session::{JobSession, SessionMode, SubCallStack};
use crate::walker;
use crate::workdir::WorkDir;
use crate::{COMMAND_QUEUE_DEPTH, LINE_MAX, MAX_SUBCALL_DEPTH, PATH_MAX, SHORT_NAME_MAX};

/// Scratch size for lines carrying two paths (sub-call announcements).
const CALL_LINE_MAX: usize = 2 * PATH_MAX + 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavError<E> {
    Backend(E),
    /// Card would not initialize on either chip select.
    MountFailed,
    /// Card answered but the volume would not mount.
    VolumeFailed,
    /// Volume mounted but the root directory would not open.
    RootOpenFailed,
    /// Storage is unmounted; mount first.
    NotReady,
    PathNotFound,
    DirDepthExceeded,
    /// Sub-call stack exhausted. Safety-relevant: the caller is expected
    /// to halt motion rather than continue with a truncated call chain.
    CallDepthExceeded,
    PathTooLong,
    NoJobOpen,
    /// Latched on the session as well; the job is not auto-aborted.
    WriteFailed,
}

impl<E> NavError<E> {
    pub fn label(&self) -> &'static str {
        match self {
            NavError::Backend(_) => "backend_failed",
            NavError::MountFailed => "mount_failed",
            NavError::VolumeFailed => "volume_failed",
            NavError::RootOpenFailed => "root_open_failed",
            NavError::NotReady => "not_ready",
            NavError::PathNotFound => "path_not_found",
            NavError::DirDepthExceeded => "dir_depth_exceeded",
            NavError::CallDepthExceeded => "call_depth_exceeded",
            NavError::PathTooLong => "path_too_long",
            NavError::NoJobOpen => "no_job_open",
            NavError::WriteFailed => "write_failed",
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct NavConfig {
    /// Grace period after reset before autostart may fire, so a
    /// connecting host can establish contact first.
    pub boot_grace_ms: u64,
    /// Command handed to the interpreter when a top-level job completes.
    pub finished_command: Option<&'static str>,
}

impl Default for NavConfig {
    fn default() -> Self {
        Self {
            boot_grace_ms: autostart::BOOT_GRACE_MS,
            finished_command: None,
        }
    }
}

/// Command pushed back to the interpreter's queue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueuedCommand {
    SelectFile(String<PATH_MAX>),
    StartJob,
    Run(&'static str),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobFinish {
    /// A suspended caller was reopened at its saved offset.
    Resumed,
    /// The top-level job is done.
    Completed,
}

pub struct CardNavigator<B: StorageBackend> {
    backend: B,
    config: NavConfig,
    root: Option<B::Dir>,
    workdir: Option<WorkDir<B::Dir>>,
    session: JobSession<B::File>,
    subcalls: SubCallStack,
    autostart: AutostartState,
    queue: Deque<QueuedCommand, COMMAND_QUEUE_DEPTH>,
}

impl<B: StorageBackend> CardNavigator<B> {
    pub fn new(backend: B, config: NavConfig) -> Self {
        Self {
            backend,
            config,
            root: None,
            workdir: None,
            session: JobSession::new(),
            subcalls: SubCallStack::new(),
            autostart: AutostartState::new(),
            queue: Deque::new(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.root.is_some()
    }

    pub fn is_printing(&self) -> bool {
        self.session.printing
    }

    pub fn is_saving(&self) -> bool {
        self.session.is_open() && self.session.mode.is_write()
    }

    pub fn is_job_open(&self) -> bool {
        self.session.is_open()
    }

    pub fn write_error(&self) -> bool {
        self.session.write_error
    }

    pub fn position(&self) -> u32 {
        self.session.offset
    }

    pub fn job_size(&self) -> u32 {
        self.session.size
    }

    pub fn eof(&self) -> bool {
        self.session.eof()
    }

    /// Absolute path the open job was resolved from; empty when closed.
    pub fn abs_path(&self) -> &str {
        self.session.abs_path.as_str()
    }

    pub fn subcall_depth(&self) -> usize {
        self.subcalls.depth()
    }

    pub fn workdir_depth(&self) -> usize {
        self.workdir.as_ref().map_or(0, WorkDir::depth)
    }

    pub fn workdir_path(&self) -> Option<String<PATH_MAX>> {
        self.workdir.as_ref().and_then(WorkDir::path)
    }

    /// Drain one interpreter command queued by autostart or completion.
    pub fn pop_queued(&mut self) -> Option<QueuedCommand> {
        self.queue.pop_front()
    }

    /// Mount the card: card init (with a single alternate-chip-select
    /// fallback), volume init, root open. Any prior session state is
    /// discarded; its handles would not survive the reinit.
    pub fn mount<C: Console>(&mut self, console: &mut C) -> Result<(), NavError<B::Error>> {
        self.close_handle();
        self.session.clear();
        self.subcalls.clear();
        self.root = None;
        self.workdir = None;

        if let Err(err) = self.backend.init_card(ChipSelect::Primary) {
            log::debug!("card init failed on primary chip select: {:?}", err);
            if self.backend.init_card(ChipSelect::Alternate).is_err() {
                console.echo("SD init fail");
                return Err(NavError::MountFailed);
            }
        }
        if let Err(err) = self.backend.init_volume() {
            log::warn!("volume init failed: {:?}", err);
            console.error("volume.init failed");
            return Err(NavError::VolumeFailed);
        }
        let root = match self.backend.open_root() {
            Ok(root) => root,
            Err(err) => {
                log::warn!("root open failed: {:?}", err);
                console.error("openRoot failed");
                return Err(NavError::RootOpenFailed);
            }
        };
        self.workdir = Some(WorkDir::new_root(root.clone()));
        self.root = Some(root);
        console.echo("SD card ok");
        Ok(())
    }

    /// Card removal or host release: drop every handle and go not-ready
    /// until the next mount.
    pub fn release(&mut self) {
        self.close_handle();
        self.session.clear();
        self.subcalls.clear();
        self.root = None;
        self.workdir = None;
    }

    pub fn set_root(&mut self) -> Result<(), NavError<B::Error>> {
        let root = self.root.clone().ok_or(NavError::NotReady)?;
        self.workdir = Some(WorkDir::new_root(root));
        Ok(())
    }

    /// Enter a subdirectory of the working directory. Refused outright at
    /// the depth cap so the chain always unwinds what was entered.
    pub fn chdir<C: Console>(
        &mut self,
        name: &str,
        console: &mut C,
    ) -> Result<(), NavError<B::Error>> {
        let Some(wd) = self.workdir.as_mut() else {
            return Err(NavError::NotReady);
        };
        if wd.at_capacity() {
            let mut line: String<LINE_MAX> = String::new();
            let _ = write!(line, "Cannot enter subdir: {} (depth limit)", name);
            console.error(line.as_str());
            return Err(NavError::DirDepthExceeded);
        }
        if name.len() > SHORT_NAME_MAX {
            return Err(NavError::PathTooLong);
        }
        let parent = wd.current().clone();
        match self
            .backend
            .open_dir(&parent, name)
            .map_err(NavError::Backend)?
        {
            Some(dir) => {
                wd.enter(dir, name).map_err(|_| NavError::DirDepthExceeded)?;
                Ok(())
            }
            None => {
                let mut line: String<LINE_MAX> = String::new();
                let _ = write!(line, "Cannot enter subdir: {}", name);
                console.echo(line.as_str());
                Err(NavError::PathNotFound)
            }
        }
    }

    /// Pop back to the parent directory; no-op at the root.
    pub fn updir(&mut self) {
        if let Some(wd) = self.workdir.as_mut() {
            wd.up();
        }
    }

    /// Recursive listing of every job file under the root, one protocol
    /// line per file.
    pub fn list_files<C: Console>(&mut self, console: &mut C) -> Result<(), NavError<B::Error>> {
        let root = self.root.clone().ok_or(NavError::NotReady)?;
        walker::list_names(&mut self.backend, &root, console)
    }

    /// Entry count of the working directory only; subdirectories count as
    /// single entries.
    pub fn file_count(&mut self) -> Result<u16, NavError<B::Error>> {
        let start = self.workdir_start()?;
        walker::count_entries(&mut self.backend, &start)
    }

    pub fn file_by_index(&mut self, index: u16) -> Result<Option<DirEntry>, NavError<B::Error>> {
        let start = self.workdir_start()?;
        walker::find_entry(&mut self.backend, &start, index, None)
    }

    pub fn file_by_name(&mut self, name: &str) -> Result<Option<DirEntry>, NavError<B::Error>> {
        let start = self.workdir_start()?;
        walker::find_entry(&mut self.backend, &start, 0, Some(name))
    }

    fn workdir_start(&self) -> Result<B::Dir, NavError<B::Error>> {
        self.workdir
            .as_ref()
            .map(|wd| wd.current().clone())
            .ok_or(NavError::NotReady)
    }

    /// Open a job file for streaming.
    ///
    /// With `replace_current` set a fresh top-level job begins and any
    /// suspended callers are dropped. Without it the currently open file
    /// is suspended onto the sub-call stack and resumed by
    /// [`finish_job`](Self::finish_job); at stack capacity the call is
    /// refused before any state is touched.
    pub fn open_job<C: Console>(
        &mut self,
        path: &str,
        mode: SessionMode,
        replace_current: bool,
        console: &mut C,
    ) -> Result<(), NavError<B::Error>> {
        if self.root.is_none() {
            return Err(NavError::NotReady);
        }
        if self.session.is_open() && !replace_current && self.subcalls.is_full() {
            let mut line: String<LINE_MAX> = String::new();
            let _ = write!(
                line,
                "Sub-call depth exceeded, max level: {}",
                MAX_SUBCALL_DEPTH
            );
            console.error(line.as_str());
            return Err(NavError::CallDepthExceeded);
        }

        let (wd, leaf, abs) = self.resolve(path, console)?;

        if self.session.is_open() {
            if !replace_current {
                let mut line: String<CALL_LINE_MAX> = String::new();
                let _ = write!(
                    line,
                    "Sub-call target:{} parent:{} pos:{}",
                    abs, self.session.abs_path, self.session.offset
                );
                console.echo(line.as_str());
                self.subcalls
                    .push(self.session.abs_path.as_str(), self.session.offset)
                    .map_err(|_| NavError::CallDepthExceeded)?;
            } else {
                self.subcalls.clear();
                let mut line: String<LINE_MAX> = String::new();
                let _ = write!(line, "Now doing file: {}", leaf);
                console.echo(line.as_str());
            }
            self.close_handle();
        } else {
            // A cancelled job may have left frames behind.
            self.subcalls.clear();
            let mut line: String<LINE_MAX> = String::new();
            let _ = write!(line, "Now fresh file: {}", leaf);
            console.echo(line.as_str());
        }
        self.session.clear();
        self.open_at(wd, leaf, abs, mode, console)
    }

    /// Write-mode open used for host log capture.
    pub fn open_log_file<C: Console>(
        &mut self,
        path: &str,
        console: &mut C,
    ) -> Result<(), NavError<B::Error>> {
        self.open_job(path, SessionMode::LogCapture, true, console)
    }

    pub fn start_job(&mut self) {
        if self.root.is_some() && self.session.is_open() {
            self.session.printing = true;
        }
    }

    pub fn pause_job(&mut self) {
        self.session.printing = false;
    }

    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, NavError<B::Error>> {
        if !self.session.is_open() || self.session.mode.is_write() {
            return Err(NavError::NoJobOpen);
        }
        let remaining = (self.session.size - self.session.offset) as usize;
        let want = buf.len().min(remaining);
        if want == 0 {
            return Ok(0);
        }
        let read = {
            let file = self.session.file_mut().ok_or(NavError::NoJobOpen)?;
            self.backend
                .read(file, &mut buf[..want])
                .map_err(NavError::Backend)?
        };
        self.session.offset += read as u32;
        Ok(read)
    }

    /// One byte of the job stream; `None` at end of file.
    pub fn read_byte(&mut self) -> Result<Option<u8>, NavError<B::Error>> {
        let mut byte = [0u8; 1];
        match self.read(&mut byte)? {
            0 => Ok(None),
            _ => Ok(Some(byte[0])),
        }
    }

    pub fn write_bytes<C: Console>(
        &mut self,
        data: &[u8],
        console: &mut C,
    ) -> Result<(), NavError<B::Error>> {
        if !self.session.is_open() || !self.session.mode.is_write() {
            return Err(NavError::NoJobOpen);
        }
        let written = {
            let file = self.session.file_mut().ok_or(NavError::NoJobOpen)?;
            self.backend.write(file, data)
        };
        match written {
            Ok(()) => {
                self.session.offset = self.session.offset.saturating_add(data.len() as u32);
                self.session.size = self.session.size.max(self.session.offset);
                Ok(())
            }
            Err(err) => {
                self.session.write_error = true;
                log::warn!("job write failed: {:?}", err);
                console.error("error writing to file");
                Err(NavError::WriteFailed)
            }
        }
    }

    /// Stream one command line into a write session, stripping the host's
    /// `N<line>` prefix and `*<checksum>` suffix.
    pub fn write_command<C: Console>(
        &mut self,
        line: &str,
        console: &mut C,
    ) -> Result<(), NavError<B::Error>> {
        let mut body = line;
        if body.starts_with('N') {
            if let Some(space) = body.find(' ') {
                body = &body[space + 1..];
            }
        }
        if let Some(star) = body.rfind('*') {
            body = &body[..star];
        }
        self.write_bytes(body.as_bytes(), console)?;
        self.write_bytes(b"\r\n", console)
    }

    /// Reposition the job stream, clamped to `[0, size]`.
    pub fn seek(&mut self, pos: u32) -> Result<(), NavError<B::Error>> {
        if !self.session.is_open() {
            return Err(NavError::NoJobOpen);
        }
        let target = pos.min(self.session.size);
        {
            let file = self.session.file_mut().ok_or(NavError::NoJobOpen)?;
            self.backend
                .seek(file, target)
                .map_err(NavError::Backend)?;
        }
        self.session.offset = target;
        Ok(())
    }

    /// Sync and close the session. Idempotent; pending writes are flushed
    /// before the handle is released.
    pub fn close_job(&mut self) -> Result<(), NavError<B::Error>> {
        let Some(mut file) = self.session.take_file() else {
            self.session.clear();
            return Ok(());
        };
        let mut result = Ok(());
        if self.session.mode.is_write() && self.backend.sync(&mut file).is_err() {
            result = Err(NavError::WriteFailed);
        }
        if let Err(err) = self.backend.close(file) {
            if result.is_ok() {
                result = Err(NavError::Backend(err));
            }
        }
        self.session.clear();
        result
    }

    /// Explicit job stop: deterministic flush and close, suspended
    /// callers dropped.
    pub fn stop_job(&mut self) -> Result<(), NavError<B::Error>> {
        let result = self.close_job();
        self.subcalls.clear();
        result
    }

    /// End-of-file handling. A suspended caller is reopened at its saved
    /// offset and printing continues; with nothing suspended the job is
    /// closed and the configured completion command queued.
    pub fn finish_job<C: Console>(
        &mut self,
        console: &mut C,
    ) -> Result<JobFinish, NavError<B::Error>> {
        if let Some(frame) = self.subcalls.pop() {
            self.close_handle();
            self.session.clear();
            let (wd, leaf, abs) = self.resolve(frame.path.as_str(), console)?;
            self.open_at(wd, leaf, abs, SessionMode::Read, console)?;
            self.seek(frame.offset)?;
            self.session.printing = true;
            log::debug!("sub-call return pos={}", frame.offset);
            Ok(JobFinish::Resumed)
        } else {
            self.close_job()?;
            console.protocol("Done printing file");
            if let Some(command) = self.config.finished_command {
                if self.queue.push_back(QueuedCommand::Run(command)).is_err() {
                    log::warn!("completion command dropped, queue full");
                }
            }
            Ok(JobFinish::Completed)
        }
    }

    /// Delete a file by path. Any open session is closed first; the
    /// working directory is left untouched.
    pub fn remove_file<C: Console>(
        &mut self,
        path: &str,
        console: &mut C,
    ) -> Result<(), NavError<B::Error>> {
        if self.root.is_none() {
            return Err(NavError::NotReady);
        }
        let _ = self.close_job();
        let (wd, leaf, _abs) = self.resolve(path, console)?;
        let removed = self
            .backend
            .remove_entry(wd.current(), leaf)
            .map_err(NavError::Backend)?;
        let mut line: String<LINE_MAX> = String::new();
        if removed {
            let _ = write!(line, "File deleted: {}", leaf);
            console.protocol(line.as_str());
            Ok(())
        } else {
            let _ = write!(line, "Deletion failed, File: {}.", leaf);
            console.protocol(line.as_str());
            Err(NavError::PathNotFound)
        }
    }

    pub fn report_status<C: Console>(&mut self, console: &mut C) {
        if self.root.is_some() && self.session.is_open() {
            let mut line: String<LINE_MAX> = String::new();
            let _ = write!(
                line,
                "SD printing byte {}/{}",
                self.session.offset, self.session.size
            );
            console.protocol(line.as_str());
        } else {
            console.protocol("Not SD printing");
        }
    }

    /// One-shot boot scan for `auto<index>.g` in the root directory.
    ///
    /// Gated until `boot_grace_ms` after reset unless forced; the gate
    /// clears after the first attempt no matter the outcome. Returns
    /// whether a file was queued.
    pub fn check_autostart<C: Console>(
        &mut self,
        now_ms: u64,
        force: bool,
        console: &mut C,
    ) -> Result<bool, NavError<B::Error>> {
        if !force && (!self.autostart.still_to_check || now_ms < self.config.boot_grace_ms) {
            return Ok(false);
        }
        self.autostart.still_to_check = false;

        let Some(index) = self.autostart.index else {
            return Ok(false);
        };
        if self.root.is_none() {
            self.mount(console)?;
        }
        let root = self.root.clone().ok_or(NavError::NotReady)?;
        let pattern = autostart::pattern(index);
        match walker::find_entry(&mut self.backend, &root, 0, Some(pattern.as_str()))? {
            Some(entry) if !entry.is_dir => {
                let mut path: String<PATH_MAX> = String::new();
                let _ = path.push('/');
                let _ = path.push_str(entry.name.as_str());
                log::info!("autostart queueing {}", path);
                if self
                    .queue
                    .push_back(QueuedCommand::SelectFile(path))
                    .is_err()
                    || self.queue.push_back(QueuedCommand::StartJob).is_err()
                {
                    log::warn!("autostart commands dropped, queue full");
                }
                self.autostart.advance();
                Ok(true)
            }
            _ => {
                log::debug!("no autostart file, disabled for this session");
                self.autostart.disable();
                Ok(false)
            }
        }
    }

    /// Resolve `path` against a temporary directory chain: absolute paths
    /// dive from the root, relative ones from the working directory. The
    /// chain is only handed back (for commit) when every intermediate
    /// segment opened; any failure leaves the navigator untouched.
    fn resolve<'p, C: Console>(
        &mut self,
        path: &'p str,
        console: &mut C,
    ) -> Result<(WorkDir<B::Dir>, &'p str, String<PATH_MAX>), NavError<B::Error>> {
        let mut wd = if path.starts_with('/') {
            let root = self.root.clone().ok_or(NavError::NotReady)?;
            WorkDir::new_root(root)
        } else {
            self.workdir.clone().ok_or(NavError::NotReady)?
        };

        let mut segments = path.split('/').filter(|s| !s.is_empty()).peekable();
        let mut leaf: Option<&str> = None;
        while let Some(segment) = segments.next() {
            if segments.peek().is_none() {
                leaf = Some(segment);
                break;
            }
            if wd.at_capacity() {
                return Err(NavError::DirDepthExceeded);
            }
            match self
                .backend
                .open_dir(wd.current(), segment)
                .map_err(NavError::Backend)?
            {
                Some(dir) => {
                    wd.enter(dir, segment).map_err(|_| NavError::PathTooLong)?;
                }
                None => {
                    let mut line: String<LINE_MAX> = String::new();
                    let _ = write!(line, "open failed, File: {}.", segment);
                    console.protocol(line.as_str());
                    return Err(NavError::PathNotFound);
                }
            }
        }
        let Some(leaf) = leaf else {
            return Err(NavError::PathNotFound);
        };

        let mut abs = wd.path().ok_or(NavError::PathTooLong)?;
        if abs.len() > 1 {
            abs.push('/').map_err(|_| NavError::PathTooLong)?;
        }
        abs.push_str(leaf).map_err(|_| NavError::PathTooLong)?;
        Ok((wd, leaf, abs))
    }

    /// Open `name` inside the resolved chain and commit the chain as the
    /// new working directory. Nothing is committed when the open fails.
    fn open_at<C: Console>(
        &mut self,
        wd: WorkDir<B::Dir>,
        name: &str,
        abs: String<PATH_MAX>,
        mode: SessionMode,
        console: &mut C,
    ) -> Result<(), NavError<B::Error>> {
        let opened = match mode {
            SessionMode::Read => self.backend.open_file(wd.current(), name),
            SessionMode::Write | SessionMode::LogCapture => {
                self.backend.create_file(wd.current(), name)
            }
        }
        .map_err(NavError::Backend)?;

        let Some(file) = opened else {
            let mut line: String<LINE_MAX> = String::new();
            let _ = write!(line, "open failed, File: {}.", name);
            console.protocol(line.as_str());
            return Err(NavError::PathNotFound);
        };

        let size = match mode {
            SessionMode::Read => self.backend.file_size(&file),
            SessionMode::Write | SessionMode::LogCapture => 0,
        };
        self.session.begin(file, mode, abs, size);
        self.workdir = Some(wd);

        let mut line: String<LINE_MAX> = String::new();
        match mode {
            SessionMode::Read => {
                let _ = write!(line, "File opened: {} Size: {}", name, size);
                console.protocol(line.as_str());
                console.protocol("File selected");
            }
            SessionMode::Write | SessionMode::LogCapture => {
                let _ = write!(line, "Writing to file: {}", name);
                console.protocol(line.as_str());
            }
        }
        Ok(())
    }

    /// Release the session handle, flushing first when it was writing.
    /// Errors are swallowed; this runs on paths (release, replace) where
    /// the handle may already be stale.
    fn close_handle(&mut self) {
        if let Some(mut file) = self.session.take_file() {
            if self.session.mode.is_write() {
                let _ = self.backend.sync(&mut file);
            }
            let _ = self.backend.close(file);
        }
    }
}
