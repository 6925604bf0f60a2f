//! File transfer over TCP.
//!
//! The request is a file path; the response is a one-byte status followed
//! by the file contents (or an error message). Both sides are thin wrappers
//! around the TCP processes.

use super::tcp::{RequestHandler, TcpClient, TcpServer, TcpStatus};
use crate::addresses::IpAddress;
use crate::config;
use crate::process::{Process, ProcessCtx, ProcessOutcome, ResumeInput};
use std::cell::RefCell;
use std::rc::Rc;

const STATUS_OK: u8 = 1;
const STATUS_ERROR: u8 = 0;

/// Serves files from the host's filesystem on the FTP port. Runs until
/// killed.
pub struct FtpServer {
    inner: TcpServer,
}

impl FtpServer {
    pub fn new() -> Self {
        let handler: RequestHandler = Box::new(|request, ctx| {
            let path = String::from_utf8_lossy(request).to_string();
            match ctx.host.filesystem.read_file(&path) {
                Ok(content) => {
                    tracing::info!(host = %ctx.host.name, %path, bytes = content.len(), "file served");
                    let mut response = vec![STATUS_OK];
                    response.extend_from_slice(content.as_bytes());
                    response
                }
                Err(error) => {
                    tracing::info!(host = %ctx.host.name, %path, %error, "file request failed");
                    let mut response = vec![STATUS_ERROR];
                    response.extend_from_slice(error.to_string().as_bytes());
                    response
                }
            }
        });
        Self {
            inner: TcpServer::new(config::ftp::SERVER_PORT, handler),
        }
    }
}

impl Default for FtpServer {
    fn default() -> Self {
        Self::new()
    }
}

impl Process for FtpServer {
    fn name(&self) -> &'static str {
        "ftp-server"
    }

    fn resume(&mut self, ctx: &mut ProcessCtx, input: ResumeInput) -> ProcessOutcome {
        self.inner.resume(ctx, input)
    }

    fn on_kill(&mut self, ctx: &mut ProcessCtx) {
        self.inner.on_kill(ctx);
    }
}

#[derive(Debug, Default)]
pub struct FtpTransfer {
    pub content: Option<Vec<u8>>,
    pub error: Option<String>,
    pub done: bool,
}

/// Fetches one file from an FTP server, optionally saving it into the
/// local filesystem.
pub struct FtpClient {
    inner: TcpClient,
    tcp_status: Rc<RefCell<TcpStatus>>,
    save_as: Option<String>,
    transfer: Rc<RefCell<FtpTransfer>>,
}

impl FtpClient {
    pub fn new(
        server: IpAddress,
        path: impl Into<String>,
        save_as: Option<String>,
        transfer: Rc<RefCell<FtpTransfer>>,
    ) -> Self {
        let tcp_status = Rc::new(RefCell::new(TcpStatus::default()));
        let inner = TcpClient::new(
            server,
            config::ftp::SERVER_PORT,
            path.into().into_bytes(),
            tcp_status.clone(),
        );
        Self {
            inner,
            tcp_status,
            save_as,
            transfer,
        }
    }

    fn conclude(&mut self, ctx: &mut ProcessCtx) {
        let response = self.tcp_status.borrow_mut().response.take();
        let mut transfer = self.transfer.borrow_mut();
        match response.as_deref() {
            Some([STATUS_OK, content @ ..]) => {
                if let Some(path) = &self.save_as {
                    let text = String::from_utf8_lossy(content).to_string();
                    if let Err(error) = ctx.host.filesystem.create_file(path, text, ctx.now) {
                        transfer.error = Some(error.to_string());
                    }
                }
                transfer.content = Some(content.to_vec());
            }
            Some([STATUS_ERROR, message @ ..]) => {
                transfer.error = Some(String::from_utf8_lossy(message).to_string());
            }
            _ => {
                transfer.error = Some("transfer failed".to_string());
            }
        }
        transfer.done = true;
    }
}

impl Process for FtpClient {
    fn name(&self) -> &'static str {
        "ftp-client"
    }

    fn resume(&mut self, ctx: &mut ProcessCtx, input: ResumeInput) -> ProcessOutcome {
        let outcome = self.inner.resume(ctx, input);
        if let ProcessOutcome::Terminated(_) = &outcome {
            self.conclude(ctx);
        }
        outcome
    }

    fn on_kill(&mut self, ctx: &mut ProcessCtx) {
        self.inner.on_kill(ctx);
        self.transfer.borrow_mut().done = true;
    }
}
