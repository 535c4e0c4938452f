//! FTP download session (the handheld runs a plain FTP server)

use anyhow::{Context, Result};
use ftp::types::FileType;
use ftp::{FtpError, FtpStream};
use log::{debug, info};
use std::cell::RefCell;
use std::io::{self, Read, Write};

use crate::config::Endpoint;
use crate::session::{Connect, DownloadSession, Refused};

/// Opens [`FtpSession`]s
#[derive(Debug, Default, Clone, Copy)]
pub struct FtpConnector;

impl Connect for FtpConnector {
    type Session = FtpSession;

    fn connect(&self, endpoint: &Endpoint) -> Result<FtpSession> {
        FtpSession::connect(endpoint)
    }
}

pub struct FtpSession {
    stream: FtpStream,
}

impl FtpSession {
    pub fn connect(endpoint: &Endpoint) -> Result<Self> {
        let address = endpoint.address();
        let mut stream = FtpStream::connect(address.as_str())
            .map_err(map_ftp_error)
            .with_context(|| format!("connect to FTP server {address}"))?;
        stream
            .login(&endpoint.user, &endpoint.password)
            .map_err(map_ftp_error)
            .with_context(|| format!("log in to {address} as '{}'", endpoint.user))?;
        stream
            .transfer_type(FileType::Binary)
            .map_err(map_ftp_error)
            .context("switch to binary transfers")?;
        info!("Connected to FTP server {}", address);
        Ok(Self { stream })
    }
}

/// Three-digit reply code inside an unexpected-response error, if any
fn reply_code(message: &str) -> Option<u32> {
    let (_, reply) = message.rsplit_once("response: ")?;
    reply.get(..3)?.parse().ok()
}

/// Permanent negative replies become [`Refused`]; everything else stays a transport error
fn map_ftp_error(err: FtpError) -> anyhow::Error {
    if let FtpError::InvalidResponse(message) = &err {
        if let Some(code) = reply_code(message).filter(|c| (500..600).contains(c)) {
            return Refused {
                code,
                message: message.clone(),
            }
            .into();
        }
    }
    anyhow::anyhow!("{}", err)
}

impl DownloadSession for FtpSession {
    fn pwd(&mut self) -> Result<String> {
        self.stream.pwd().map_err(map_ftp_error).context("PWD")
    }

    fn cwd(&mut self, path: &str) -> Result<()> {
        self.stream
            .cwd(path)
            .map_err(map_ftp_error)
            .with_context(|| format!("CWD {path}"))
    }

    fn list(&mut self, path: &str) -> Result<Vec<String>> {
        self.stream
            .nlst(Some(path))
            .map_err(map_ftp_error)
            .with_context(|| format!("NLST {path}"))
    }

    fn retrieve(&mut self, path: &str, sink: &mut dyn Write) -> Result<u64> {
        let sink = RefCell::new(sink);
        let bytes = self
            .stream
            .retr(path, |data| drain(data, &sink))
            .map_err(map_ftp_error)
            .with_context(|| format!("RETR {path}"))?;
        debug!("RETR {} ({} bytes)", path, bytes);
        Ok(bytes)
    }

    fn close(&mut self) -> Result<()> {
        self.stream.quit().map_err(map_ftp_error).context("QUIT")
    }
}

/// Stream the data connection straight into the sink. `retr` takes an `Fn`,
/// hence the cell.
fn drain(data: &mut dyn Read, sink: &RefCell<&mut dyn Write>) -> Result<u64, FtpError> {
    let mut sink = sink.borrow_mut();
    io::copy(data, &mut *sink).map_err(FtpError::ConnectionError)
}
