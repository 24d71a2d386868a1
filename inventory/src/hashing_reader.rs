use data_encoding::HEXLOWER;
use pin_project_lite::pin_project;
use tokio::io::AsyncRead;

pin_project! {
    /// Forwards reads to the inner reader while feeding every byte into a
    /// running digest. Lets the materializer hash a download as it streams
    /// into the filestore without buffering the payload.
    pub struct HashingReader<R, H>
    where
        R: AsyncRead,
        H: digest::Digest,
    {
        #[pin]
        inner: R,
        hasher: H,
    }
}

pub type Sha256HashingReader<R> = HashingReader<R, sha2::Sha256>;

impl<R, H> HashingReader<R, H>
where
    R: AsyncRead,
    H: digest::Digest,
{
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: H::new(),
        }
    }

    /// Consume the reader and return the lowercase hex digest of everything
    /// that was read through it.
    pub fn hex_digest(self) -> String {
        HEXLOWER.encode(&self.hasher.finalize())
    }
}

impl<R, H> AsyncRead for HashingReader<R, H>
where
    R: AsyncRead,
    H: digest::Digest,
{
    fn poll_read(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        let filled_before = buf.filled().len();

        let this = self.project();
        let ret = this.inner.poll_read(cx, buf);

        this.hasher.update(&buf.filled()[filled_before..]);

        ret
    }
}
