//! Out-of-process codec: every block is handed to an external executable.
//!
//! The executable is invoked as
//!
//! ```text
//! <program> [args...] encode|verify|decode
//! ```
//!
//! with the block on stdin.  Replies:
//!
//! | Operation | stdin        | stdout on success                         |
//! |-----------|--------------|-------------------------------------------|
//! | `encode`  | `k` bytes    | `n` bytes (codeword)                      |
//! | `verify`  | `n` bytes    | ignored; status [`status::OK`] or [`status::INVALID`] |
//! | `decode`  | `n` bytes    | `n` bytes (codeword) + `u32` LE corrected count |
//!
//! `decode` exits with [`status::UNCORRECTABLE`] when the block is beyond
//! repair.  Any other non-zero status is an [`CodecError::External`] failure.
//!
//! Spawning once per block is slow; this variant exists for codecs that
//! are only available as a binary.

use std::ffi::OsString;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use byteorder::{LittleEndian, ReadBytesExt};
use tracing::warn;

use super::{expect_len, Codec, CodecError, Decoded};
use crate::cancel::CancelToken;
use crate::params::CodecParams;

/// Back-off bounds while waiting for the child to exit.
const POLL_MIN: Duration = Duration::from_micros(100);
const POLL_MAX: Duration = Duration::from_millis(20);

/// Exit statuses understood from the external executable.
pub mod status {
    /// Success; for `verify`, the codeword is valid.
    pub const OK:            i32 = 0;
    /// `verify` only: the codeword failed verification.
    pub const INVALID:       i32 = 1;
    /// `decode` only: too many errors to correct.
    pub const UNCORRECTABLE: i32 = 2;
}

pub struct CommandCodec {
    program: PathBuf,
    args:    Vec<OsString>,
    params:  CodecParams,
}

impl CommandCodec {
    pub fn new(program: impl Into<PathBuf>, params: CodecParams) -> Self {
        Self { program: program.into(), args: Vec::new(), params }
    }

    /// Extra leading arguments placed before the operation name.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run one operation; returns `(exit status, stdout)`.
    ///
    /// The child is polled until it exits; once `cancel` fires it is killed
    /// and the call fails with [`CodecError::Cancelled`].
    fn run(&self, op: &str, input: &[u8], cancel: &CancelToken) -> Result<(i32, Vec<u8>), CodecError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(op)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;

        let mut stdin = child.stdin.take()
            .ok_or_else(|| CodecError::External("child stdin unavailable".into()))?;
        let mut stdout = child.stdout.take()
            .ok_or_else(|| CodecError::External("child stdout unavailable".into()))?;

        // Pipes are serviced from detached threads: a grandchild that
        // inherited them may keep them open after the child is killed.
        let input = input.to_vec();
        let feeder = thread::spawn(move || -> io::Result<()> {
            match stdin.write_all(&input) {
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
                other => other,
            }
        });
        let reader = thread::spawn(move || -> io::Result<Vec<u8>> {
            let mut out = Vec::new();
            stdout.read_to_end(&mut out)?;
            Ok(out)
        });

        let mut pause = POLL_MIN;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if cancel.is_cancelled() {
                if let Err(e) = child.kill() {
                    warn!(program = %self.program.display(), error = %e, "could not kill codec process");
                }
                child.wait()?;
                return Err(CodecError::Cancelled);
            }
            thread::sleep(pause);
            pause = (pause * 2).min(POLL_MAX);
        };

        let panicked = || io::Error::new(io::ErrorKind::Other, "codec pipe thread panicked");
        feeder.join().map_err(|_| panicked())??;
        let stdout = reader.join().map_err(|_| panicked())??;

        let code = status.code().ok_or_else(|| {
            CodecError::External(format!("{} {op} terminated by signal", self.program.display()))
        })?;
        Ok((code, stdout))
    }

    fn unexpected(&self, op: &str, code: i32) -> CodecError {
        CodecError::External(format!("{} {op} exited with status {code}", self.program.display()))
    }
}

impl Codec for CommandCodec {
    fn name(&self) -> &str { "command" }

    fn params(&self) -> CodecParams { self.params }

    fn encode(&self, message: &[u8]) -> Result<Vec<u8>, CodecError> {
        self.encode_until(message, &CancelToken::new())
    }

    fn verify(&self, codeword: &[u8]) -> Result<bool, CodecError> {
        self.verify_until(codeword, &CancelToken::new())
    }

    fn decode(&self, codeword: &[u8]) -> Result<Decoded, CodecError> {
        self.decode_until(codeword, &CancelToken::new())
    }

    fn encode_until(&self, message: &[u8], cancel: &CancelToken) -> Result<Vec<u8>, CodecError> {
        expect_len(message, self.params.message_size())?;
        match self.run("encode", message, cancel)? {
            (status::OK, out) => {
                expect_len(&out, self.params.result_size())?;
                Ok(out)
            }
            (code, _) => Err(self.unexpected("encode", code)),
        }
    }

    fn verify_until(&self, codeword: &[u8], cancel: &CancelToken) -> Result<bool, CodecError> {
        expect_len(codeword, self.params.result_size())?;
        match self.run("verify", codeword, cancel)? {
            (status::OK, _)      => Ok(true),
            (status::INVALID, _) => Ok(false),
            (code, _)            => Err(self.unexpected("verify", code)),
        }
    }

    fn decode_until(&self, codeword: &[u8], cancel: &CancelToken) -> Result<Decoded, CodecError> {
        let n = self.params.result_size();
        expect_len(codeword, n)?;
        match self.run("decode", codeword, cancel)? {
            (status::OK, out) => {
                expect_len(&out, n + 4)?;
                let corrected = (&out[n..]).read_u32::<LittleEndian>()? as usize;
                let mut codeword = out;
                codeword.truncate(n);
                Ok(Decoded { codeword, corrected })
            }
            (status::UNCORRECTABLE, _) => Err(CodecError::Uncorrectable),
            (code, _)                  => Err(self.unexpected("decode", code)),
        }
    }
}
