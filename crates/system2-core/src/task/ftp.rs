//! FTP uploads and downloads
//!
//! `suppaftp` is a blocking client, so each transfer runs as one
//! blocking session on its own thread. The session is closed on every
//! exit path before that thread returns.

use super::{TaskContext, TaskOutput};
use crate::error::{Error, Result};
use crate::progress::{ProgressPacer, ProgressReporter};
use crate::types::{FtpDirection, FtpRequest, TransferCounters};
use crate::utils::part_path;
use std::fs::File;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;
use suppaftp::types::FileType;
use suppaftp::FtpStream;

pub(crate) async fn transfer(
    ctx: &TaskContext,
    request: FtpRequest,
    reporter: Option<ProgressReporter>,
) -> Result<TaskOutput> {
    let connect_timeout = ctx.settings.connect_timeout();
    let transfer_timeout = ctx.settings.transfer_timeout();
    let pacer = ProgressPacer::new(reporter, ctx.settings.progress_interval());

    tokio::task::spawn_blocking(move || {
        run_session(&request, connect_timeout, transfer_timeout, pacer)
    })
    .await
    .map_err(|e| Error::Worker(e.to_string()))?
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    let host = host
        .strip_prefix("ftp://")
        .unwrap_or(host)
        .trim_end_matches('/');
    (host, port)
        .to_socket_addrs()
        .map_err(|e| Error::Network(format!("cannot resolve {}: {}", host, e)))?
        .next()
        .ok_or_else(|| Error::Network(format!("no address for {}", host)))
}

fn run_session(
    request: &FtpRequest,
    connect_timeout: Duration,
    transfer_timeout: Duration,
    mut pacer: ProgressPacer,
) -> Result<TaskOutput> {
    let addr = resolve(&request.host, request.port)?;
    let mut ftp = FtpStream::connect_timeout(addr, connect_timeout)?;
    ftp.get_ref().set_read_timeout(Some(transfer_timeout))?;
    ftp.get_ref().set_write_timeout(Some(transfer_timeout))?;

    let result = ftp
        .login(request.username.as_str(), request.password.as_str())
        .map_err(Error::from)
        .and_then(|_| ftp.transfer_type(FileType::Binary).map_err(Error::from))
        .and_then(|_| match request.direction {
            FtpDirection::Upload => upload(&mut ftp, request, &mut pacer),
            FtpDirection::Download => download(&mut ftp, request, &mut pacer),
        });

    if let Err(e) = ftp.quit() {
        log::debug!("FTP quit on {} failed: {}", request.host, e);
    }

    result.map(|counters| TaskOutput {
        counters,
        ..Default::default()
    })
}

/// Create every missing parent directory of `remote_path`
fn ensure_remote_dirs(ftp: &mut FtpStream, remote_path: &str) {
    let absolute = remote_path.starts_with('/');
    let segments: Vec<&str> = remote_path.split('/').filter(|s| !s.is_empty()).collect();
    let mut current = String::new();
    for segment in segments.iter().take(segments.len().saturating_sub(1)) {
        if absolute || !current.is_empty() {
            current.push('/');
        }
        current.push_str(segment);
        // Fails for directories that already exist
        let _ = ftp.mkdir(current.as_str());
    }
}

fn upload(
    ftp: &mut FtpStream,
    request: &FtpRequest,
    pacer: &mut ProgressPacer,
) -> Result<TransferCounters> {
    let file = File::open(&request.local_path)?;
    let total = file.metadata()?.len();
    ensure_remote_dirs(ftp, &request.remote_path);

    let mut reader = CountingReader {
        inner: file,
        counters: TransferCounters {
            upload_total: total,
            ..Default::default()
        },
        pacer,
    };
    ftp.put_file(request.remote_path.as_str(), &mut reader)?;

    let counters = reader.counters;
    reader.pacer.finish(counters);
    log::debug!(
        "Uploaded {:?} to {}:{}",
        request.local_path,
        request.host,
        request.remote_path
    );
    Ok(counters)
}

fn download(
    ftp: &mut FtpStream,
    request: &FtpRequest,
    pacer: &mut ProgressPacer,
) -> Result<TransferCounters> {
    let total = ftp.size(request.remote_path.as_str()).unwrap_or(0) as u64;

    if let Some(parent) = request.local_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let part = part_path(&request.local_path);
    receive_into(ftp, request, &part, total, pacer)
        .and_then(|counters| {
            std::fs::rename(&part, &request.local_path)?;
            Ok(counters)
        })
        .map_err(|e| {
            if let Err(remove_err) = std::fs::remove_file(&part) {
                log::debug!("Could not remove partial file {:?}: {}", part, remove_err);
            }
            e
        })
}

fn receive_into(
    ftp: &mut FtpStream,
    request: &FtpRequest,
    part: &Path,
    total: u64,
    pacer: &mut ProgressPacer,
) -> Result<TransferCounters> {
    let mut file = File::create(part)?;
    let mut counters = TransferCounters {
        download_total: total,
        ..Default::default()
    };
    let mut local_error: Option<io::Error> = None;

    let received = ftp.retr(request.remote_path.as_str(), |stream| {
        let mut buf = [0u8; 16 * 1024];
        loop {
            let n = stream
                .read(&mut buf)
                .map_err(suppaftp::FtpError::ConnectionError)?;
            if n == 0 {
                return Ok(());
            }
            if let Err(e) = file.write_all(&buf[..n]) {
                let abort = io::Error::new(e.kind(), e.to_string());
                local_error = Some(e);
                return Err(suppaftp::FtpError::ConnectionError(abort));
            }
            counters.download_now += n as u64;
            counters.download_total = counters.download_total.max(counters.download_now);
            pacer.update(counters);
        }
    });

    if let Some(e) = local_error {
        return Err(Error::Io(e));
    }
    received?;
    file.sync_all()?;

    pacer.finish(counters);
    log::debug!(
        "Downloaded {}:{} to {:?}",
        request.host,
        request.remote_path,
        request.local_path
    );
    Ok(counters)
}

/// Counts bytes handed to the FTP data connection
struct CountingReader<'a, R> {
    inner: R,
    counters: TransferCounters,
    pacer: &'a mut ProgressPacer,
}

impl<R: Read> Read for CountingReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.counters.upload_now += n as u64;
        self.counters.upload_total = self.counters.upload_total.max(self.counters.upload_now);
        self.pacer.update(self.counters);
        Ok(n)
    }
}
