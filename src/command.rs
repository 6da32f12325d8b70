//! Interpreter-facing command surface.
//!
//! The interpreter owns parsing; what arrives here is already a typed
//! request. `dispatch` maps each request onto one synchronous navigator
//! operation and folds the outcome into a compact response (kind, ok,
//! result code, one numeric payload). `navigator_service` pumps requests
//! from a channel for firmwares that run the navigator as its own task.

use embassy_sync::channel::{DynamicReceiver, DynamicSender};
use heapless::String;

use crate::backend::StorageBackend;
use crate::console::Console;
use crate::navigator::{CardNavigator, NavError};
use crate::session::SessionMode;
use crate::{PATH_MAX, SHORT_NAME_MAX, WRITE_LINE_MAX};

#[derive(Clone, Debug)]
pub enum NavRequest {
    Mount,
    Release,
    ListFiles,
    FileCount,
    SelectFile { path: String<PATH_MAX> },
    StartJob,
    PauseJob,
    StopJob,
    SetPosition { offset: u32 },
    OpenWrite { path: String<PATH_MAX> },
    WriteLine { line: String<WRITE_LINE_MAX> },
    CloseWrite,
    Chdir { name: String<SHORT_NAME_MAX> },
    Updir,
    SetRoot,
    Status,
    FinishJob,
    CheckAutostart { now_ms: u64, force: bool },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestKind {
    Mount,
    Release,
    ListFiles,
    FileCount,
    SelectFile,
    StartJob,
    PauseJob,
    StopJob,
    SetPosition,
    OpenWrite,
    WriteLine,
    CloseWrite,
    Chdir,
    Updir,
    SetRoot,
    Status,
    FinishJob,
    CheckAutostart,
}

impl RequestKind {
    pub fn label(self) -> &'static str {
        match self {
            RequestKind::Mount => "mount",
            RequestKind::Release => "release",
            RequestKind::ListFiles => "list_files",
            RequestKind::FileCount => "file_count",
            RequestKind::SelectFile => "select_file",
            RequestKind::StartJob => "start_job",
            RequestKind::PauseJob => "pause_job",
            RequestKind::StopJob => "stop_job",
            RequestKind::SetPosition => "set_position",
            RequestKind::OpenWrite => "open_write",
            RequestKind::WriteLine => "write_line",
            RequestKind::CloseWrite => "close_write",
            RequestKind::Chdir => "chdir",
            RequestKind::Updir => "updir",
            RequestKind::SetRoot => "set_root",
            RequestKind::Status => "status",
            RequestKind::FinishJob => "finish_job",
            RequestKind::CheckAutostart => "check_autostart",
        }
    }
}

pub fn kind_of(request: &NavRequest) -> RequestKind {
    match request {
        NavRequest::Mount => RequestKind::Mount,
        NavRequest::Release => RequestKind::Release,
        NavRequest::ListFiles => RequestKind::ListFiles,
        NavRequest::FileCount => RequestKind::FileCount,
        NavRequest::SelectFile { .. } => RequestKind::SelectFile,
        NavRequest::StartJob => RequestKind::StartJob,
        NavRequest::PauseJob => RequestKind::PauseJob,
        NavRequest::StopJob => RequestKind::StopJob,
        NavRequest::SetPosition { .. } => RequestKind::SetPosition,
        NavRequest::OpenWrite { .. } => RequestKind::OpenWrite,
        NavRequest::WriteLine { .. } => RequestKind::WriteLine,
        NavRequest::CloseWrite => RequestKind::CloseWrite,
        NavRequest::Chdir { .. } => RequestKind::Chdir,
        NavRequest::Updir => RequestKind::Updir,
        NavRequest::SetRoot => RequestKind::SetRoot,
        NavRequest::Status => RequestKind::Status,
        NavRequest::FinishJob => RequestKind::FinishJob,
        NavRequest::CheckAutostart { .. } => RequestKind::CheckAutostart,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NavResultCode {
    Ok,
    NotReady,
    MountFailed,
    VolumeFailed,
    RootOpenFailed,
    PathNotFound,
    DirDepthExceeded,
    CallDepthExceeded,
    PathTooLong,
    NoJobOpen,
    WriteFailed,
    BackendFailed,
}

impl NavResultCode {
    pub fn label(self) -> &'static str {
        match self {
            NavResultCode::Ok => "ok",
            NavResultCode::NotReady => "not_ready",
            NavResultCode::MountFailed => "mount_failed",
            NavResultCode::VolumeFailed => "volume_failed",
            NavResultCode::RootOpenFailed => "root_open_failed",
            NavResultCode::PathNotFound => "path_not_found",
            NavResultCode::DirDepthExceeded => "dir_depth_exceeded",
            NavResultCode::CallDepthExceeded => "call_depth_exceeded",
            NavResultCode::PathTooLong => "path_too_long",
            NavResultCode::NoJobOpen => "no_job_open",
            NavResultCode::WriteFailed => "write_failed",
            NavResultCode::BackendFailed => "backend_failed",
        }
    }
}

pub fn code_of<E>(error: &NavError<E>) -> NavResultCode {
    match error {
        NavError::Backend(_) => NavResultCode::BackendFailed,
        NavError::MountFailed => NavResultCode::MountFailed,
        NavError::VolumeFailed => NavResultCode::VolumeFailed,
        NavError::RootOpenFailed => NavResultCode::RootOpenFailed,
        NavError::NotReady => NavResultCode::NotReady,
        NavError::PathNotFound => NavResultCode::PathNotFound,
        NavError::DirDepthExceeded => NavResultCode::DirDepthExceeded,
        NavError::CallDepthExceeded => NavResultCode::CallDepthExceeded,
        NavError::PathTooLong => NavResultCode::PathTooLong,
        NavError::NoJobOpen => NavResultCode::NoJobOpen,
        NavError::WriteFailed => NavResultCode::WriteFailed,
    }
}

#[derive(Clone, Debug)]
pub struct Request {
    pub id: u32,
    pub command: NavRequest,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NavResponse {
    pub id: u32,
    pub kind: RequestKind,
    pub ok: bool,
    pub code: NavResultCode,
    /// Kind-specific payload: entry count, byte position, or autostart hit.
    pub value: u32,
}

pub fn dispatch<B: StorageBackend, C: Console>(
    nav: &mut CardNavigator<B>,
    console: &mut C,
    request: &Request,
) -> NavResponse {
    let kind = kind_of(&request.command);
    let mut value = 0u32;
    let result: Result<(), NavResultCode> = match &request.command {
        NavRequest::Mount => nav.mount(console).map_err(|e| code_of(&e)),
        NavRequest::Release => {
            nav.release();
            Ok(())
        }
        NavRequest::ListFiles => nav.list_files(console).map_err(|e| code_of(&e)),
        NavRequest::FileCount => match nav.file_count() {
            Ok(count) => {
                value = u32::from(count);
                Ok(())
            }
            Err(e) => Err(code_of(&e)),
        },
        NavRequest::SelectFile { path } => nav
            .open_job(path.as_str(), SessionMode::Read, true, console)
            .map_err(|e| code_of(&e)),
        NavRequest::StartJob => {
            nav.start_job();
            Ok(())
        }
        NavRequest::PauseJob => {
            nav.pause_job();
            Ok(())
        }
        NavRequest::StopJob => nav.stop_job().map_err(|e| code_of(&e)),
        NavRequest::SetPosition { offset } => {
            let outcome = nav.seek(*offset).map_err(|e| code_of(&e));
            value = nav.position();
            outcome
        }
        NavRequest::OpenWrite { path } => nav
            .open_job(path.as_str(), SessionMode::Write, true, console)
            .map_err(|e| code_of(&e)),
        NavRequest::WriteLine { line } => nav
            .write_command(line.as_str(), console)
            .map_err(|e| code_of(&e)),
        NavRequest::CloseWrite => nav.close_job().map_err(|e| code_of(&e)),
        NavRequest::Chdir { name } => nav.chdir(name.as_str(), console).map_err(|e| code_of(&e)),
        NavRequest::Updir => {
            nav.updir();
            Ok(())
        }
        NavRequest::SetRoot => nav.set_root().map_err(|e| code_of(&e)),
        NavRequest::Status => {
            nav.report_status(console);
            value = nav.position();
            Ok(())
        }
        NavRequest::FinishJob => nav.finish_job(console).map(|_| ()).map_err(|e| code_of(&e)),
        NavRequest::CheckAutostart { now_ms, force } => {
            match nav.check_autostart(*now_ms, *force, console) {
                Ok(queued) => {
                    value = u32::from(queued);
                    Ok(())
                }
                Err(e) => Err(code_of(&e)),
            }
        }
    };

    match result {
        Ok(()) => NavResponse {
            id: request.id,
            kind,
            ok: true,
            code: NavResultCode::Ok,
            value,
        },
        Err(code) => {
            log::debug!(
                "request failed id={} kind={} code={}",
                request.id,
                kind.label(),
                code.label()
            );
            NavResponse {
                id: request.id,
                kind,
                ok: false,
                code,
                value,
            }
        }
    }
}

/// Channel pump for running the navigator as its own cooperative task:
/// receive, dispatch synchronously, respond. All storage I/O happens
/// inline on this task.
pub async fn navigator_service<B: StorageBackend, C: Console>(
    nav: &mut CardNavigator<B>,
    console: &mut C,
    requests: DynamicReceiver<'_, Request>,
    responses: DynamicSender<'_, NavResponse>,
) {
    loop {
        let request = requests.receive().await;
        let response = dispatch(nav, console, &request);
        responses.send(response).await;
    }
}
