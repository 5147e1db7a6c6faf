// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! ClamAV daemon client over its unix control socket.
//!
//! Uses the null-terminated `z` command forms. `zINSTREAM` takes the content
//! as chunks, each prefixed with its length as a 4-byte big-endian integer,
//! and ends with a zero-length chunk.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use dbot_core::{AdapterType, DbotError, HealthStatus, MalwareScanner, PluginAdapter};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::UnixStream;
use tracing::debug;

const CHUNK_SIZE: usize = 64 * 1024;
const SCAN_TIMEOUT: Duration = Duration::from_secs(60);

/// Scanner backed by a running `clamd`.
#[derive(Debug, Clone)]
pub struct ClamdScanner {
    socket: PathBuf,
}

impl ClamdScanner {
    pub fn new(socket: impl Into<PathBuf>) -> Self {
        Self {
            socket: socket.into(),
        }
    }

    async fn connect(&self) -> Result<UnixStream, DbotError> {
        UnixStream::connect(&self.socket)
            .await
            .map_err(|e| scanner_error(format!("cannot reach clamd at {}", self.socket.display()), e))
    }

    async fn ping(&self) -> Result<(), DbotError> {
        let mut stream = self.connect().await?;
        stream
            .write_all(b"zPING\0")
            .await
            .map_err(|e| scanner_error("clamd write failed".into(), e))?;
        let reply = read_reply(&mut stream).await?;
        if reply == "PONG" {
            Ok(())
        } else {
            Err(DbotError::Oracle {
                message: format!("unexpected clamd ping reply: {reply}"),
                source: None,
            })
        }
    }
}

fn scanner_error(message: String, e: std::io::Error) -> DbotError {
    DbotError::Oracle {
        message: format!("{message}: {e}"),
        source: Some(Box::new(e)),
    }
}

/// Stream `content` with `zINSTREAM` and return the raw reply.
pub(crate) async fn instream<S>(stream: &mut S, content: &[u8]) -> Result<String, DbotError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let write_err = |e| scanner_error("clamd write failed".into(), e);
    stream.write_all(b"zINSTREAM\0").await.map_err(write_err)?;
    for chunk in content.chunks(CHUNK_SIZE) {
        let len = u32::try_from(chunk.len()).unwrap_or(u32::MAX);
        stream.write_all(&len.to_be_bytes()).await.map_err(write_err)?;
        stream.write_all(chunk).await.map_err(write_err)?;
    }
    stream.write_all(&0u32.to_be_bytes()).await.map_err(write_err)?;
    stream.flush().await.map_err(write_err)?;
    read_reply(stream).await
}

async fn read_reply<S: AsyncRead + Unpin>(stream: &mut S) -> Result<String, DbotError> {
    let mut buf = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = stream
            .read(&mut byte)
            .await
            .map_err(|e| scanner_error("clamd read failed".into(), e))?;
        if n == 0 || byte[0] == 0 {
            break;
        }
        buf.push(byte[0]);
    }
    Ok(String::from_utf8_lossy(&buf).trim().to_string())
}

/// Interpret a scan reply: `stream: OK`, `stream: <name> FOUND`, or an error.
pub(crate) fn parse_reply(reply: &str) -> Result<Option<String>, DbotError> {
    let body = reply.strip_prefix("stream:").unwrap_or(reply).trim();
    if body == "OK" {
        return Ok(None);
    }
    if let Some(name) = body.strip_suffix("FOUND") {
        return Ok(Some(name.trim().to_string()));
    }
    Err(DbotError::Oracle {
        message: format!("clamd: {body}"),
        source: None,
    })
}

#[async_trait]
impl PluginAdapter for ClamdScanner {
    fn name(&self) -> &str {
        "clamd"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Scanner
    }

    async fn health_check(&self) -> Result<HealthStatus, DbotError> {
        match self.ping().await {
            Ok(()) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(e.to_string())),
        }
    }

    async fn shutdown(&self) -> Result<(), DbotError> {
        Ok(())
    }
}

#[async_trait]
impl MalwareScanner for ClamdScanner {
    async fn scan(&self, name: &str, content: &[u8]) -> Result<Option<String>, DbotError> {
        let mut stream = self.connect().await?;
        let reply = tokio::time::timeout(SCAN_TIMEOUT, instream(&mut stream, content))
            .await
            .map_err(|_| DbotError::Oracle {
                message: format!("clamd scan of {name} timed out"),
                source: None,
            })??;
        debug!(file = %name, reply = %reply, "clamd scan finished");
        parse_reply(&reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_parsing() {
        assert_eq!(parse_reply("stream: OK").unwrap(), None);
        assert_eq!(
            parse_reply("stream: Win.Test.EICAR_HDB-1 FOUND").unwrap(),
            Some("Win.Test.EICAR_HDB-1".to_string())
        );
        assert!(parse_reply("INSTREAM size limit exceeded. ERROR").is_err());
    }

    #[tokio::test]
    async fn instream_frames_chunks() {
        let (mut client, mut server) = tokio::io::duplex(256 * 1024);
        let content = vec![7u8; CHUNK_SIZE + 10];
        let expected_len = content.len();
        let daemon = tokio::spawn(async move {
            let mut command = [0u8; 10];
            server.read_exact(&mut command).await.unwrap();
            assert_eq!(&command, b"zINSTREAM\0");
            let mut total = 0usize;
            loop {
                let mut len = [0u8; 4];
                server.read_exact(&mut len).await.unwrap();
                let len = u32::from_be_bytes(len) as usize;
                if len == 0 {
                    break;
                }
                let mut chunk = vec![0u8; len];
                server.read_exact(&mut chunk).await.unwrap();
                total += len;
            }
            server.write_all(b"stream: OK\0").await.unwrap();
            total
        });
        let reply = instream(&mut client, &content).await.unwrap();
        assert_eq!(reply, "stream: OK");
        assert_eq!(daemon.await.unwrap(), expected_len);
    }

    #[tokio::test]
    async fn unix_socket_scan_reports_virus() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clamd.ctl");
        let listener = tokio::net::UnixListener::bind(&path).unwrap();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 1024];
            let mut seen = Vec::new();
            // Read until the terminating zero-length chunk arrives.
            while !seen.ends_with(&[0, 0, 0, 0]) {
                let n = sock.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                seen.extend_from_slice(&buf[..n]);
            }
            sock.write_all(b"stream: Eicar-Signature FOUND\0").await.unwrap();
        });
        let scanner = ClamdScanner::new(&path);
        let virus = scanner.scan("eicar.com", b"X5O!P%@AP").await.unwrap();
        assert_eq!(virus.as_deref(), Some("Eicar-Signature"));
    }

    #[tokio::test]
    async fn missing_socket_is_an_error() {
        let scanner = ClamdScanner::new("/nonexistent/clamd.ctl");
        assert!(scanner.scan("a", b"x").await.is_err());
        assert!(matches!(
            scanner.health_check().await.unwrap(),
            HealthStatus::Unhealthy(_)
        ));
    }
}
