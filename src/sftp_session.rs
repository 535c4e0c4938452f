//! SFTP upload session (the archive host)

use anyhow::{anyhow, Context, Result};
use log::{debug, info};
use ssh2::{Session, Sftp};
use std::io::Read;
use std::net::TcpStream;
use std::path::Path;

use crate::config::Endpoint;
use crate::session::{Connect, DirCreation, UploadSession};

const DIR_MODE: i32 = 0o755;

/// Opens [`SftpSession`]s
#[derive(Debug, Default, Clone, Copy)]
pub struct SftpConnector;

impl Connect for SftpConnector {
    type Session = SftpSession;

    fn connect(&self, endpoint: &Endpoint) -> Result<SftpSession> {
        SftpSession::connect(endpoint)
    }
}

pub struct SftpSession {
    session: Session,
    sftp: Option<Sftp>,
}

impl SftpSession {
    pub fn connect(endpoint: &Endpoint) -> Result<Self> {
        let address = endpoint.address();
        let tcp = TcpStream::connect(address.as_str())
            .with_context(|| format!("TCP connect to {address}"))?;
        let mut session = Session::new().context("create SSH session")?;
        session.set_tcp_stream(tcp);
        session
            .handshake()
            .with_context(|| format!("SSH handshake with {address}"))?;
        session
            .userauth_password(&endpoint.user, &endpoint.password)
            .with_context(|| format!("authenticate to {address} as '{}'", endpoint.user))?;
        if !session.authenticated() {
            return Err(anyhow!("authentication to {address} was not accepted"));
        }
        let sftp = session.sftp().context("open SFTP subsystem")?;
        info!("Connected to SFTP server {}", address);
        Ok(Self {
            session,
            sftp: Some(sftp),
        })
    }

    fn sftp(&self) -> Result<&Sftp> {
        self.sftp.as_ref().ok_or_else(|| anyhow!("SFTP session already closed"))
    }
}

impl UploadSession for SftpSession {
    fn make_dir(&mut self, path: &str) -> Result<DirCreation> {
        let sftp = self.sftp()?;
        let remote = Path::new(path);
        match sftp.mkdir(remote, DIR_MODE) {
            Ok(()) => Ok(DirCreation::Created),
            // SFTP reports "exists" as a generic failure; stat to tell it apart
            Err(mkdir_err) => match sftp.stat(remote) {
                Ok(stat) if stat.is_dir() => Ok(DirCreation::AlreadyExists),
                Ok(_) => Err(anyhow!("{path} exists and is not a directory")),
                Err(_) => Err(mkdir_err).with_context(|| format!("mkdir {path}")),
            },
        }
    }

    fn store(&mut self, source: &mut dyn Read, path: &str) -> Result<u64> {
        let sftp = self.sftp()?;
        let mut remote = sftp
            .create(Path::new(path))
            .with_context(|| format!("create remote file {path}"))?;
        let bytes = std::io::copy(source, &mut remote).with_context(|| format!("upload {path}"))?;
        debug!("PUT {} ({} bytes)", path, bytes);
        Ok(bytes)
    }

    fn close(&mut self) -> Result<()> {
        // Channel first, then the transport
        drop(self.sftp.take());
        self.session
            .disconnect(None, "backup finished", None)
            .context("SSH disconnect")
    }
}
