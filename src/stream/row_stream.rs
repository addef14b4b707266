//! Lazy, single-pass row streams over a response body

use super::row::{FromRow, Row};
use crate::metrics::labels::{STATUS_ABANDONED, STATUS_ERROR, STATUS_OK};
use crate::protocol::decode::{self, BodyLine, DecodeError};
use crate::{Error, Result};
use bytes::{Bytes, BytesMut};
use futures::stream::{BoxStream, Stream, StreamExt};
use std::marker::PhantomData;
use std::time::Instant;
use tokio::sync::OwnedSemaphorePermit;
use tokio_util::sync::CancellationToken;

/// Rows of one query, read on demand
///
/// Holds a pool permit until the body is exhausted, an error ends the stream, or
/// the stream is dropped. After the first error `next` returns `None`.
pub struct RowStream {
    operation: &'static str,
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    buf: BytesMut,
    scanned: usize,
    lifetime: CancellationToken,
    permit: Option<OwnedSemaphorePermit>,
    started: Instant,
    rows: u64,
    eof: bool,
    done: bool,
}

impl std::fmt::Debug for RowStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowStream")
            .field("operation", &self.operation)
            .field("rows", &self.rows)
            .field("buffered", &self.buf.len())
            .field("done", &self.done)
            .finish()
    }
}

enum Next {
    Cancelled,
    Chunk(Option<reqwest::Result<Bytes>>),
}

impl RowStream {
    pub(crate) fn new(
        operation: &'static str,
        response: reqwest::Response,
        permit: OwnedSemaphorePermit,
        lifetime: CancellationToken,
        started: Instant,
    ) -> Self {
        let mut stream = Self::from_body(operation, response.bytes_stream().boxed(), lifetime);
        stream.permit = Some(permit);
        stream.started = started;
        stream
    }

    pub(crate) fn from_body(
        operation: &'static str,
        body: BoxStream<'static, reqwest::Result<Bytes>>,
        lifetime: CancellationToken,
    ) -> Self {
        Self {
            operation,
            body,
            buf: BytesMut::with_capacity(8192),
            scanned: 0,
            lifetime,
            permit: None,
            started: Instant::now(),
            rows: 0,
            eof: false,
            done: false,
        }
    }

    /// Operation label used in logs and metrics
    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// Rows decoded so far
    pub fn rows_read(&self) -> u64 {
        self.rows
    }

    /// Next row, `None` once the stream has ended
    ///
    /// A transport error that only surfaces when the body ends (truncated body,
    /// exception written after the last row) is returned after every row before
    /// it has been yielded.
    pub async fn next(&mut self) -> Option<Result<Row>> {
        if self.done {
            return None;
        }

        loop {
            match decode::next_line_from(&mut self.buf, &mut self.scanned) {
                Ok(Some(line)) => return Some(self.handle_line(&line)),
                Ok(None) => {}
                Err(e) => return Some(Err(self.fail(decode_error(e)))),
            }

            if self.eof {
                if let Some(line) = decode::trailing_line(&mut self.buf) {
                    return Some(self.handle_line(&line));
                }
                self.finish();
                return None;
            }

            let next = {
                let lifetime = &self.lifetime;
                let body = &mut self.body;
                tokio::select! {
                    biased;
                    _ = lifetime.cancelled() => Next::Cancelled,
                    chunk = body.next() => Next::Chunk(chunk),
                }
            };

            match next {
                Next::Cancelled => return Some(Err(self.fail(Error::Cancelled))),
                Next::Chunk(Some(Ok(bytes))) => self.buf.extend_from_slice(&bytes),
                Next::Chunk(Some(Err(e))) => return Some(Err(self.fail(Error::Http(e)))),
                Next::Chunk(None) => self.eof = true,
            }
        }
    }

    /// Adapt into a `futures::Stream`
    pub fn into_stream(self) -> impl Stream<Item = Result<Row>> + Send {
        futures::stream::unfold(self, |mut rows| async move {
            rows.next().await.map(|item| (item, rows))
        })
    }

    fn handle_line(&mut self, line: &[u8]) -> Result<Row> {
        match decode::decode_line(line) {
            Ok(BodyLine::Row(columns)) => {
                self.rows += 1;
                Ok(Row::new(columns))
            }
            Ok(BodyLine::Exception { code, message }) => {
                Err(self.fail(Error::Server { code, message }))
            }
            Err(e) => Err(self.fail(decode_error(e))),
        }
    }

    /// Stop reading after the rows the caller needed, counted as a success
    pub(crate) fn complete(&mut self) {
        if !self.done {
            self.finish();
        }
    }

    /// End the stream early (caller-side decode or callback failure)
    pub(crate) fn abort(&mut self) {
        if !self.done {
            self.close(STATUS_ERROR);
        }
    }

    fn fail(&mut self, err: Error) -> Error {
        tracing::debug!(
            operation = self.operation,
            rows = self.rows,
            error = %err,
            "row stream failed"
        );
        self.close(STATUS_ERROR);
        err
    }

    fn finish(&mut self) {
        tracing::debug!(
            operation = self.operation,
            rows = self.rows,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "row stream complete"
        );
        self.close(STATUS_OK);
    }

    fn close(&mut self, status: &'static str) {
        self.done = true;
        self.permit = None;
        self.buf.clear();
        self.scanned = 0;
        crate::metrics::counters::rows_processed(self.operation, self.rows);
        crate::metrics::counters::query_completed(self.operation, status);
        crate::metrics::histograms::query_duration(
            self.operation,
            self.started.elapsed().as_millis() as u64,
        );
    }
}

impl Drop for RowStream {
    fn drop(&mut self) {
        if !self.done {
            self.close(STATUS_ABANDONED);
        }
    }
}

fn decode_error(e: DecodeError) -> Error {
    match e {
        DecodeError::Malformed(message) => Error::Protocol(message),
        DecodeError::TooLong(len) => Error::Protocol(format!(
            "row exceeds maximum line length ({} bytes buffered)",
            len
        )),
    }
}

/// Typed records decoded from a [`RowStream`]
///
/// A decode failure is returned once and ends the stream.
pub struct Records<T> {
    rows: RowStream,
    _marker: PhantomData<fn() -> T>,
}

impl<T> std::fmt::Debug for Records<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Records").field("rows", &self.rows).finish()
    }
}

impl<T: FromRow> Records<T> {
    /// Wrap a row stream
    pub fn new(rows: RowStream) -> Self {
        Self {
            rows,
            _marker: PhantomData,
        }
    }

    /// Next record, `None` once the stream has ended
    pub async fn next(&mut self) -> Option<Result<T>> {
        let row = match self.rows.next().await? {
            Ok(row) => row,
            Err(e) => return Some(Err(e)),
        };

        match T::from_row(&row) {
            Ok(record) => Some(Ok(record)),
            Err(e) => {
                crate::metrics::counters::row_decode_error(self.rows.operation());
                self.rows.abort();
                Some(Err(e))
            }
        }
    }

    /// End the stream early and release its pool slot
    pub fn abort(&mut self) {
        self.rows.abort();
    }

    /// Records decoded so far (including one that failed to decode)
    pub fn rows_read(&self) -> u64 {
        self.rows.rows_read()
    }

    /// Adapt into a `futures::Stream`
    pub fn into_stream(self) -> impl Stream<Item = Result<T>> + Send
    where
        T: Send + 'static,
    {
        futures::stream::unfold(self, |mut records| async move {
            records.next().await.map(|item| (item, records))
        })
    }
}
