use pin_project_lite::pin_project;
use tokio::io::AsyncRead;

use crate::B3Digest;

pin_project! {
    /// Wraps an existing AsyncRead, and keeps track of the BLAKE3 digest and
    /// number of bytes of all data read "through" it.
    pub struct B3HashingReader<R>
    where
        R: AsyncRead,
    {
        #[pin]
        inner: R,
        hasher: blake3::Hasher,
        len: u64,
    }
}

impl<R> B3HashingReader<R>
where
    R: AsyncRead,
{
    pub fn from(r: R) -> Self {
        Self {
            inner: r,
            hasher: blake3::Hasher::new(),
            len: 0,
        }
    }

    /// Number of bytes read so far.
    pub fn bytes_read(&self) -> u64 {
        self.len
    }

    /// Return the digest of everything read so far.
    pub fn digest(&self) -> B3Digest {
        self.hasher.finalize().into()
    }
}

impl<R> tokio::io::AsyncRead for B3HashingReader<R>
where
    R: AsyncRead,
{
    fn poll_read(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        let buf_filled_len_before = buf.filled().len();

        let this = self.project();
        let ret = this.inner.poll_read(cx, buf);

        // write everything new filled into the hasher.
        let new = &buf.filled()[buf_filled_len_before..];
        this.hasher.update(new);
        *this.len += new.len() as u64;

        ret
    }
}
