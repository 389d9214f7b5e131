//! Live relaying of a child process's stdout and stderr.
//!
//! Each pipe gets its own scoped thread that copies chunks to a sink as soon
//! as they arrive and stops at end of stream.

use std::io::{self, ErrorKind, Read, Write};
use std::process::Child;

/// Largest chunk copied per read.
pub const CHUNK_SIZE: usize = 1 << 16;

/// Where relayed output goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Relay {
    /// The parent's own stdout and stderr.
    #[default]
    Console,
    /// Drain and drop.
    Discard,
}

/// Copy `reader` to `sink` until end of stream, flushing after every chunk.
///
/// A failing sink does not stop the copy: the pipe keeps being drained so the
/// child cannot block on a full buffer, and the first write error is returned
/// at the end. A read error closes the reader before returning, so a child
/// still writing to it gets a broken pipe instead of blocking.
pub fn copy_stream<R: Read, W: Write>(mut reader: R, mut sink: W) -> io::Result<u64> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;
    let mut write_error = None;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                drop(reader);
                return Err(e);
            }
        };
        total += n as u64;
        if write_error.is_none() {
            if let Err(e) = sink.write_all(&buf[..n]).and_then(|_| sink.flush()) {
                write_error = Some(e);
            }
        }
    }
    match write_error {
        Some(e) => Err(e),
        None => Ok(total),
    }
}

/// Drain both of `child`'s piped streams concurrently into `out` and `err`.
/// Returns once both streams hit end of stream; does not wait on the child.
pub fn relay_output<O, E>(child: &mut Child, out: O, err: E) -> io::Result<()>
where
    O: Write + Send,
    E: Write + Send,
{
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    std::thread::scope(|scope| {
        let out_handle = stdout.map(|pipe| scope.spawn(move || copy_stream(pipe, out)));
        let err_handle = stderr.map(|pipe| scope.spawn(move || copy_stream(pipe, err)));

        let mut result = Ok(());
        for handle in [out_handle, err_handle].into_iter().flatten() {
            let joined = handle
                .join()
                .unwrap_or_else(|_| Err(io::Error::new(ErrorKind::Other, "relay thread panicked")));
            if let Err(e) = joined {
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result
    })
}

/// Relay `child` according to `relay`.
pub fn relay_with(child: &mut Child, relay: Relay) -> io::Result<()> {
    match relay {
        Relay::Console => relay_output(child, io::stdout(), io::stderr()),
        Relay::Discard => relay_output(child, io::sink(), io::sink()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenSink;

    impl Write for BrokenSink {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_copy_stream_copies_everything() {
        let data: Vec<u8> = (0..(CHUNK_SIZE * 2 + 17))
            .map(|i| (i % 251) as u8)
            .collect();
        let mut out = Vec::new();
        let copied = copy_stream(&data[..], &mut out).unwrap();
        assert_eq!(copied as usize, data.len());
        assert_eq!(out, data);
    }

    #[test]
    fn test_copy_stream_drains_after_sink_failure() {
        let data = vec![1u8; CHUNK_SIZE * 3];
        let mut reader = &data[..];
        let err = copy_stream(&mut reader, BrokenSink).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BrokenPipe);
        assert!(reader.is_empty());
    }

    struct FailingReader<'a> {
        dropped: &'a std::cell::Cell<bool>,
    }

    impl Read for FailingReader<'_> {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(ErrorKind::ConnectionReset, "pipe gone"))
        }
    }

    impl Drop for FailingReader<'_> {
        fn drop(&mut self) {
            self.dropped.set(true);
        }
    }

    #[test]
    fn test_read_error_closes_reader() {
        let dropped = std::cell::Cell::new(false);
        let reader = FailingReader { dropped: &dropped };
        let err = copy_stream(reader, Vec::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectionReset);
        assert!(dropped.get());
    }

    #[cfg(unix)]
    #[test]
    fn test_relay_separates_streams() {
        use std::process::{Command, Stdio};

        let mut child = Command::new("sh")
            .arg("-c")
            .arg("printf 'to out\\n'; printf 'to err\\n' 1>&2; printf '\\377raw\\n'")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();

        let mut out = Vec::new();
        let mut err = Vec::new();
        relay_output(&mut child, &mut out, &mut err).unwrap();
        assert!(child.wait().unwrap().success());

        assert_eq!(out, b"to out\n\xffraw\n");
        assert_eq!(err, b"to err\n");
    }
}
