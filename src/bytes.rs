use std::io::{self, ErrorKind};

use md5::{Digest, Md5};

/// Bytes reads from a reader in caller sized chunks, keeping count of the bytes read and,
/// optionally, a running MD5 digest of everything read.
pub(crate) struct Bytes<R>
where
    R: io::Read + Send,
{
    reader: R,
    num_read: u64,
    digest: Option<Md5>,
}

impl<R> Bytes<R>
where
    R: io::Read + Send,
{
    pub fn new(reader: R) -> Self {
        Bytes {
            reader,
            num_read: 0,
            digest: None,
        }
    }

    pub fn with_digest(mut self) -> Self {
        self.digest = Some(Md5::new());
        self
    }

    /// Fill `buf` from the reader. Returns the number of bytes read, which is less than
    /// `buf.len()` only if the end of the stream was reached.
    pub fn fill(&mut self, buf: &mut [u8]) -> Result<usize, io::Error> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => return Err(err),
            }
        }
        self.num_read += filled as u64;
        if let Some(digest) = self.digest.as_mut() {
            digest.update(&buf[..filled]);
        }
        Ok(filled)
    }

    pub fn offset(&self) -> u64 {
        self.num_read
    }

    /// Hex encoded digest of all bytes read so far.
    pub fn digest(&self) -> Option<String> {
        self.digest
            .as_ref()
            .map(|d| hex::encode(d.clone().finalize()))
    }
}
