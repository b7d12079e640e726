//! Chunked AES-256-GCM streaming cipher for file bodies.
//!
//! # Stream Format
//!
//! | Part   | Size | Description |
//! |--------|------|-------------|
//! | magic  | 4    | `KPS1` |
//! | prefix | 7    | Random nonce prefix for this stream |
//! | frames | ...  | `last(1) \|\| len(u32 BE) \|\| ciphertext+tag` |
//!
//! Frame nonce is `prefix(7) || counter(u32 BE) || last(1)`, so reordering,
//! dropping or truncating frames breaks authentication. At most one
//! plaintext chunk ([`CHUNK_SIZE`]) is held in memory on either side.

use crate::crypto::cipher::FileKey;
use crate::crypto::{CryptoError, Result};
use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Plaintext bytes per frame.
pub const CHUNK_SIZE: usize = 64 * 1024;

const MAGIC: &[u8; 4] = b"KPS1";
const PREFIX_LEN: usize = 7;
const TAG_LEN: usize = 16;
const FRAME_HEADER_LEN: usize = 5;

fn frame_nonce(prefix: &[u8; PREFIX_LEN], counter: u32, last: bool) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    nonce[..PREFIX_LEN].copy_from_slice(prefix);
    nonce[PREFIX_LEN..PREFIX_LEN + 4].copy_from_slice(&counter.to_be_bytes());
    nonce[11] = u8::from(last);
    nonce
}

/// Encrypting writer: buffers one chunk, emits sealed frames to `writer`.
pub struct StreamEncryptor<W> {
    writer: W,
    cipher: Aes256Gcm,
    prefix: [u8; PREFIX_LEN],
    counter: u32,
    buf: Vec<u8>,
    header_written: bool,
}

impl<W: AsyncWrite + Unpin> StreamEncryptor<W> {
    pub fn new(writer: W, key: &FileKey) -> Self {
        let mut prefix = [0u8; PREFIX_LEN];
        OsRng.fill_bytes(&mut prefix);

        Self {
            writer,
            cipher: Aes256Gcm::new(key.as_bytes().into()),
            prefix,
            counter: 0,
            buf: Vec::with_capacity(CHUNK_SIZE),
            header_written: false,
        }
    }

    /// Append plaintext. A full chunk is sealed only once more data
    /// arrives, because the final frame has to carry the `last` flag.
    pub async fn write(&mut self, mut data: &[u8]) -> Result<()> {
        while !data.is_empty() {
            if self.buf.len() == CHUNK_SIZE {
                self.emit_frame(false).await?;
            }
            let take = (CHUNK_SIZE - self.buf.len()).min(data.len());
            self.buf.extend_from_slice(&data[..take]);
            data = &data[take..];
        }
        Ok(())
    }

    /// Seal the final frame, flush and shut down the sink.
    pub async fn finish(mut self) -> Result<W> {
        self.emit_frame(true).await?;
        self.writer.flush().await?;
        self.writer.shutdown().await?;
        Ok(self.writer)
    }

    /// Bytes currently held in the plaintext buffer.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    async fn emit_frame(&mut self, last: bool) -> Result<()> {
        if !self.header_written {
            self.writer.write_all(MAGIC).await?;
            self.writer.write_all(&self.prefix).await?;
            self.header_written = true;
        }

        let nonce = frame_nonce(&self.prefix, self.counter, last);
        let sealed = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), self.buf.as_slice())
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
        self.buf.clear();

        let len = u32::try_from(sealed.len())
            .map_err(|_| CryptoError::EncryptionFailed("Frame too large".to_string()))?;
        let mut header = [0u8; FRAME_HEADER_LEN];
        header[0] = u8::from(last);
        header[1..].copy_from_slice(&len.to_be_bytes());

        self.writer.write_all(&header).await?;
        self.writer.write_all(&sealed).await?;

        self.counter = self
            .counter
            .checked_add(1)
            .ok_or_else(|| CryptoError::EncryptionFailed("Stream too long".to_string()))?;
        Ok(())
    }
}

/// Decrypting reader: yields authenticated plaintext chunks from `reader`.
pub struct StreamDecryptor<R> {
    reader: R,
    cipher: Aes256Gcm,
    prefix: Option<[u8; PREFIX_LEN]>,
    counter: u32,
    done: bool,
}

impl<R: AsyncRead + Unpin> StreamDecryptor<R> {
    pub fn new(reader: R, key: &FileKey) -> Self {
        Self {
            reader,
            cipher: Aes256Gcm::new(key.as_bytes().into()),
            prefix: None,
            counter: 0,
            done: false,
        }
    }

    /// Next plaintext chunk, or `None` once the authenticated final frame
    /// has been consumed. Premature EOF is an authentication failure.
    pub async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        if self.done {
            return Ok(None);
        }

        let prefix = match self.prefix {
            Some(prefix) => prefix,
            None => {
                let mut magic = [0u8; 4];
                let mut prefix = [0u8; PREFIX_LEN];
                read_exact_or_truncated(&mut self.reader, &mut magic).await?;
                if &magic != MAGIC {
                    return Err(CryptoError::DecryptionFailed(
                        "Not an encrypted stream".to_string(),
                    ));
                }
                read_exact_or_truncated(&mut self.reader, &mut prefix).await?;
                self.prefix = Some(prefix);
                prefix
            }
        };

        let mut header = [0u8; FRAME_HEADER_LEN];
        read_exact_or_truncated(&mut self.reader, &mut header).await?;
        let last = match header[0] {
            0 => false,
            1 => true,
            _ => return Err(CryptoError::AuthenticationFailed),
        };
        let len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]) as usize;
        if !(TAG_LEN..=CHUNK_SIZE + TAG_LEN).contains(&len) {
            return Err(CryptoError::AuthenticationFailed);
        }

        let mut sealed = vec![0u8; len];
        read_exact_or_truncated(&mut self.reader, &mut sealed).await?;

        let nonce = frame_nonce(&prefix, self.counter, last);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&nonce), sealed.as_slice())
            .map_err(|_| CryptoError::AuthenticationFailed)?;

        self.counter = self
            .counter
            .checked_add(1)
            .ok_or(CryptoError::AuthenticationFailed)?;

        if last {
            self.done = true;
            let mut probe = [0u8; 1];
            if self.reader.read(&mut probe).await? != 0 {
                return Err(CryptoError::DecryptionFailed(
                    "Trailing data after final frame".to_string(),
                ));
            }
        }

        Ok(Some(plaintext))
    }
}

async fn read_exact_or_truncated<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            Err(CryptoError::AuthenticationFailed)
        }
        Err(e) => Err(e.into()),
    }
}

/// Copy `reader` into `writer`, encrypting with `key`. Returns plaintext bytes read.
pub async fn encrypt_copy<R, W>(mut reader: R, writer: W, key: &FileKey) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut encryptor = StreamEncryptor::new(writer, key);
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        encryptor.write(&buf[..n]).await?;
        total += n as u64;
    }

    encryptor.finish().await?;
    Ok(total)
}

/// Copy `reader` into `writer`, decrypting with `key`. Returns plaintext bytes written.
pub async fn decrypt_copy<R, W>(reader: R, mut writer: W, key: &FileKey) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut decryptor = StreamDecryptor::new(reader, key);
    let mut total = 0u64;

    while let Some(chunk) = decryptor.next_chunk().await? {
        writer.write_all(&chunk).await?;
        total += chunk.len() as u64;
    }

    writer.flush().await?;
    writer.shutdown().await?;
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::task::{Context, Poll};
    use tokio::io::ReadBuf;

    async fn encrypt_bytes(data: &[u8], key: &FileKey) -> Vec<u8> {
        let mut out = Vec::new();
        encrypt_copy(data, &mut out, key).await.unwrap();
        out
    }

    async fn decrypt_bytes(data: &[u8], key: &FileKey) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        decrypt_copy(data, &mut out, key).await?;
        Ok(out)
    }

    #[tokio::test]
    async fn roundtrip_across_chunk_boundaries() {
        let key = FileKey::generate();
        for size in [0, 1, CHUNK_SIZE - 1, CHUNK_SIZE, CHUNK_SIZE + 1, 3 * CHUNK_SIZE] {
            let data: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
            let sealed = encrypt_bytes(&data, &key).await;
            assert_eq!(decrypt_bytes(&sealed, &key).await.unwrap(), data, "size {size}");
        }
    }

    #[tokio::test]
    async fn wrong_key_fails() {
        let sealed = encrypt_bytes(b"file body", &FileKey::generate()).await;
        assert!(matches!(
            decrypt_bytes(&sealed, &FileKey::generate()).await,
            Err(CryptoError::AuthenticationFailed)
        ));
    }

    #[tokio::test]
    async fn truncated_stream_fails() {
        let key = FileKey::generate();
        let data = vec![7u8; 2 * CHUNK_SIZE + 10];
        let sealed = encrypt_bytes(&data, &key).await;

        // Cut the stream exactly after the first full frame.
        let first_frame_end = 4 + PREFIX_LEN + FRAME_HEADER_LEN + CHUNK_SIZE + TAG_LEN;
        assert!(matches!(
            decrypt_bytes(&sealed[..first_frame_end], &key).await,
            Err(CryptoError::AuthenticationFailed)
        ));
        assert!(decrypt_bytes(&sealed[..sealed.len() - 1], &key).await.is_err());
    }

    #[tokio::test]
    async fn forged_last_flag_fails() {
        let key = FileKey::generate();
        let data = vec![1u8; 2 * CHUNK_SIZE];
        let mut sealed = encrypt_bytes(&data, &key).await;
        // Mark the first frame as final to try to drop the rest.
        sealed[4 + PREFIX_LEN] = 1;
        assert!(decrypt_bytes(&sealed, &key).await.is_err());
    }

    #[tokio::test]
    async fn tampered_frame_fails() {
        let key = FileKey::generate();
        let mut sealed = encrypt_bytes(b"some file contents", &key).await;
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(decrypt_bytes(&sealed, &key).await.is_err());
    }

    /// Lazily generates `remaining` bytes and counts how many were handed out.
    struct CountingSource {
        remaining: usize,
        produced: Arc<AtomicUsize>,
    }

    impl AsyncRead for CountingSource {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            let n = self.remaining.min(buf.remaining()).min(16 * 1024);
            buf.put_slice(&vec![0xA5; n]);
            self.remaining -= n;
            self.produced.fetch_add(n, Ordering::SeqCst);
            Poll::Ready(Ok(()))
        }
    }

    /// Accepts at most 4 KiB per write and yields every other poll.
    struct SlowSink {
        consumed: usize,
        produced: Arc<AtomicUsize>,
        max_in_flight: usize,
        stall: bool,
    }

    impl AsyncWrite for SlowSink {
        fn poll_write(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            self.stall = !self.stall;
            if self.stall {
                cx.waker().wake_by_ref();
                return Poll::Pending;
            }
            let n = buf.len().min(4096);
            self.consumed += n;
            let in_flight = self
                .produced
                .load(Ordering::SeqCst)
                .saturating_sub(self.consumed);
            self.max_in_flight = self.max_in_flight.max(in_flight);
            Poll::Ready(Ok(n))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn hundred_megabytes_stream_with_bounded_buffer() {
        const TOTAL: usize = 100 * 1024 * 1024;
        const PIPE: usize = 64 * 1024;

        let key = FileKey::generate();
        let produced = Arc::new(AtomicUsize::new(0));
        let source = CountingSource {
            remaining: TOTAL,
            produced: produced.clone(),
        };
        let mut sink = SlowSink {
            consumed: 0,
            produced: produced.clone(),
            max_in_flight: 0,
            stall: false,
        };

        // encrypt → bounded pipe → slow consumer
        let (pipe_writer, mut pipe_reader) = tokio::io::duplex(PIPE);
        let produce = encrypt_copy(source, pipe_writer, &key);
        let consume = async {
            tokio::io::copy(&mut pipe_reader, &mut sink)
                .await
                .map_err(CryptoError::from)
        };
        let (plaintext_len, _) = tokio::try_join!(produce, consume).unwrap();

        assert_eq!(plaintext_len as usize, TOTAL);
        assert!(sink.consumed > TOTAL);
        // Producer may run ahead of the sink by the pipe, one plaintext chunk,
        // one read buffer and tokio::io::copy's internal buffer; never the file.
        let bound = PIPE + 3 * CHUNK_SIZE + 64 * 1024;
        assert!(
            sink.max_in_flight <= bound,
            "in flight {} exceeds bound {}",
            sink.max_in_flight,
            bound
        );
    }
}
