//! Byte pump from the source's stdout into the transform's stdin.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::messages::PairId;

/// Whether an I/O error only means the other side of the pipe went away.
///
/// Expected whenever one process exits before the other.
pub fn is_pipe_termination(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
    )
}

fn report(pair: PairId, side: &'static str, err: &io::Error) {
    if is_pipe_termination(err) {
        debug!(%pair, side, error = %err, "Pipe closed");
    } else {
        warn!(%pair, side, error = %err, "Pipe I/O error");
    }
}

/// Copy `reader` into `writer` until either side closes.
///
/// Resolves to the number of bytes forwarded. The writer is shut down at the
/// end so the transform sees end-of-input.
pub fn spawn_pump<R, W>(pair: PairId, mut reader: R, mut writer: W) -> JoinHandle<u64>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buffer = [0u8; 8192];
        let mut forwarded = 0u64;

        loop {
            match reader.read(&mut buffer).await {
                Ok(0) => break, // EOF
                Ok(n) => {
                    if let Err(e) = writer.write_all(&buffer[..n]).await {
                        report(pair, "write", &e);
                        break;
                    }
                    forwarded += n as u64;
                }
                Err(e) => {
                    report(pair, "read", &e);
                    break;
                }
            }
        }

        if let Err(e) = writer.shutdown().await {
            report(pair, "shutdown", &e);
        }
        debug!(%pair, bytes = forwarded, "Pipe finished");
        forwarded
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipe_termination_kinds() {
        for kind in [
            io::ErrorKind::BrokenPipe,
            io::ErrorKind::UnexpectedEof,
            io::ErrorKind::ConnectionReset,
        ] {
            assert!(is_pipe_termination(&io::Error::from(kind)));
        }
        assert!(!is_pipe_termination(&io::Error::from(
            io::ErrorKind::PermissionDenied
        )));
    }

    #[tokio::test]
    async fn test_pump_forwards_everything() {
        let (mut src_tx, src_rx) = tokio::io::duplex(64);
        let (dst_tx, mut dst_rx) = tokio::io::duplex(64 * 1024);

        let pump = spawn_pump(PairId(1), src_rx, dst_tx);

        let payload: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
        let expected = payload.clone();
        tokio::spawn(async move {
            src_tx.write_all(&payload).await.unwrap();
        });

        let mut received = Vec::new();
        dst_rx.read_to_end(&mut received).await.unwrap();

        assert_eq!(pump.await.unwrap(), expected.len() as u64);
        assert_eq!(received, expected);
    }

    #[tokio::test]
    async fn test_pump_stops_when_reader_side_goes_away() {
        let (mut src_tx, src_rx) = tokio::io::duplex(64);
        let (dst_tx, dst_rx) = tokio::io::duplex(64);

        let pump = spawn_pump(PairId(2), src_rx, dst_tx);
        drop(dst_rx);

        // The write fails with a broken pipe, which ends the pump quietly.
        let _ = src_tx.write_all(b"frame data").await;
        drop(src_tx);

        assert!(pump.await.unwrap() <= 10);
    }
}
