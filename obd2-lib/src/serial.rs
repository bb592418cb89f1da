use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use tokio::io::unix::AsyncFd;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Serial device opened non-blocking and driven by the tokio reactor.
///
/// Dropping a pending read leaves no thread behind, so a timed-out command
/// never stalls the next one.
#[derive(Debug)]
pub struct SerialPort {
    fd: AsyncFd<File>,
}

impl SerialPort {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK | libc::O_NOCTTY)
            .open(path)?;
        Ok(Self { fd: AsyncFd::new(file)? })
    }
}

impl AsyncRead for SerialPort {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        loop {
            let mut guard = ready!(self.fd.poll_read_ready(cx))?;
            let unfilled = buf.initialize_unfilled();
            match guard.try_io(|inner| inner.get_ref().read(unfilled)) {
                Ok(Ok(n)) => {
                    buf.advance(n);
                    return Poll::Ready(Ok(()));
                }
                Ok(Err(e)) => return Poll::Ready(Err(e)),
                Err(_would_block) => continue,
            }
        }
    }
}

impl AsyncWrite for SerialPort {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        loop {
            let mut guard = ready!(self.fd.poll_write_ready(cx))?;
            match guard.try_io(|inner| inner.get_ref().write(buf)) {
                Ok(result) => return Poll::Ready(result),
                Err(_would_block) => continue,
            }
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;
    use std::path::PathBuf;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    /// Create a named pipe standing in for a serial device.
    pub(crate) fn make_fifo(dir: &Path) -> PathBuf {
        let path = dir.join("obd");
        let c_path = CString::new(path.as_os_str().as_bytes()).unwrap();
        let rc = unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) };
        assert_eq!(rc, 0, "mkfifo failed: {}", io::Error::last_os_error());
        path
    }

    #[tokio::test]
    async fn test_regular_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain");
        std::fs::write(&path, b"").unwrap();

        // epoll refuses regular files
        assert!(SerialPort::open(&path).is_err());
    }

    #[tokio::test]
    async fn test_cancelled_read_does_not_block_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = make_fifo(dir.path());
        let mut port = SerialPort::open(&path).unwrap();

        let mut buf = [0u8; 64];
        let read = tokio::time::timeout(Duration::from_millis(100), port.read(&mut buf)).await;
        assert!(read.is_err());

        // The pipe loops writes back to the same descriptor
        tokio::time::timeout(Duration::from_secs(1), port.write_all(b"41 0C 1A F8\r>"))
            .await
            .expect("write stalled after a cancelled read")
            .unwrap();
        let n = tokio::time::timeout(Duration::from_secs(1), port.read(&mut buf))
            .await
            .expect("read stalled")
            .unwrap();
        assert_eq!(&buf[..n], b"41 0C 1A F8\r>");
    }
}
