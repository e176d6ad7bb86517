//! Request reading: one fully buffered request per connection.
//!
//! The reader is a small state machine. The head is collected into a
//! fixed buffer and parsed with a permissive HTTP/1.x syntax; the only
//! header field interpreted is `Content-Length`. Once the head is
//! complete the body is buffered to exactly the declared length, growing
//! the buffer once if the pre-read cannot hold it. Every failure in here
//! closes the connection without a response.

use crate::{
    errors::{ErrorKind, IoError},
    http::types::{self, Method},
    limits::ControllerLimits,
};
use memchr::memchr;
use std::{io, mem, time::Duration};
use tokio::{io::AsyncReadExt, time::sleep};
use tracing::{debug, error};

/// A complete control request: parsed head plus fully buffered body.
#[derive(Debug)]
pub(crate) struct Request {
    pub(crate) method: Method,
    pub(crate) target: String,
    length: usize,
    body_start: usize,
    buffer: Vec<u8>,
}

impl Request {
    #[inline(always)]
    pub(crate) fn body(&self) -> &[u8] {
        &self.buffer[self.body_start..self.body_start + self.length]
    }

    #[inline]
    pub(crate) fn into_parts(self) -> (Method, String, Vec<u8>) {
        let body = self.buffer[self.body_start..self.body_start + self.length].to_vec();
        (self.method, self.target, body)
    }
}

//

#[derive(Debug, Clone, Copy, PartialEq)]
enum ReadState {
    ReadHead,
    ReadBody,
    Done,
    Closed,
}

#[derive(Debug, PartialEq)]
struct Head {
    method: Method,
    target: String,
    length: usize,
}

pub(crate) struct RequestReader {
    state: ReadState,
    buffer: Vec<u8>,
    used: usize,
    body_start: usize,
    head: Option<Head>,
}

impl RequestReader {
    #[inline]
    pub(crate) fn new(limits: &ControllerLimits) -> Self {
        Self {
            state: ReadState::ReadHead,
            buffer: vec![0; limits.head_buffer_size],
            used: 0,
            body_start: 0,
            head: None,
        }
    }

    #[cfg(test)]
    fn from_bytes<V: AsRef<[u8]>>(limits: &ControllerLimits, value: V) -> Self {
        let value = value.as_ref();
        let mut buffer = vec![0; limits.head_buffer_size];
        buffer[..value.len()].copy_from_slice(value);

        Self {
            state: ReadState::ReadHead,
            buffer,
            used: value.len(),
            body_start: 0,
            head: None,
        }
    }

    /// Drives the connection until exactly one request is buffered.
    pub(crate) async fn read_request<S>(
        &mut self,
        stream: &mut S,
        limits: &ControllerLimits,
    ) -> Result<Request, ErrorKind>
    where
        S: tokio::io::AsyncRead + Unpin,
    {
        loop {
            match self.state {
                ReadState::ReadHead => {
                    if self.fill(stream, limits.io_timeout).await? == 0 {
                        return self.close(ErrorKind::Io(IoError(
                            io::ErrorKind::UnexpectedEof.into(),
                        )));
                    }

                    match parse_head(&self.buffer[..self.used], limits) {
                        Ok(Some((head, end))) => self.start_body(head, end),
                        Ok(None) if self.used == self.buffer.len() => {
                            error!("too long request headers");
                            return self.close(ErrorKind::TooLargeHead);
                        }
                        Ok(None) => {}
                        Err(err) => {
                            error!("request head parsing error");
                            return self.close(err);
                        }
                    }
                }

                ReadState::ReadBody => {
                    if self.fill(stream, limits.io_timeout).await? == 0 {
                        return self.close(ErrorKind::Io(IoError(
                            io::ErrorKind::UnexpectedEof.into(),
                        )));
                    }

                    let length = self.head.as_ref().map_or(0, |head| head.length);
                    debug!(
                        "conn body read: {} of {}",
                        self.used - self.body_start,
                        length
                    );

                    if self.used - self.body_start >= length {
                        self.state = ReadState::Done;
                    }
                }

                ReadState::Done | ReadState::Closed => return self.take_request(),
            }
        }
    }

    #[inline]
    fn start_body(&mut self, head: Head, end: usize) {
        let preread = self.used - end;

        debug!(
            "request head parsing complete, body length: {}, preread: {}",
            head.length, preread
        );

        if preread >= head.length {
            self.body_start = end;
            self.state = ReadState::Done;
        } else if head.length > self.buffer.len() - end {
            let mut body = vec![0; head.length];
            body[..preread].copy_from_slice(&self.buffer[end..self.used]);

            self.buffer = body;
            self.used = preread;
            self.body_start = 0;
            self.state = ReadState::ReadBody;
        } else {
            self.body_start = end;
            self.state = ReadState::ReadBody;
        }

        self.head = Some(head);
    }

    #[inline]
    fn take_request(&mut self) -> Result<Request, ErrorKind> {
        let done = self.state == ReadState::Done;
        self.state = ReadState::Closed;

        match self.head.take() {
            Some(head) if done => Ok(Request {
                method: head.method,
                target: head.target,
                length: head.length,
                body_start: self.body_start,
                buffer: mem::take(&mut self.buffer),
            }),
            _ => Err(ErrorKind::MalformedHead),
        }
    }

    #[inline]
    fn close(&mut self, err: ErrorKind) -> Result<Request, ErrorKind> {
        self.state = ReadState::Closed;
        Err(err)
    }

    #[inline]
    async fn fill<S>(&mut self, stream: &mut S, time: Duration) -> Result<usize, ErrorKind>
    where
        S: tokio::io::AsyncRead + Unpin,
    {
        tokio::select! {
            biased;

            read = stream.read(&mut self.buffer[self.used..]) => {
                let n = read?;
                self.used += n;
                Ok(n)
            }
            _ = sleep(time) => {
                Err(ErrorKind::Io(IoError(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "read timeout",
                ))))
            }
        }
    }
}

// Head parsing

/// Scans the buffered bytes for a complete head. `Ok(None)` means more
/// bytes are needed; `Ok(Some((head, end)))` places the first body byte
/// at `end`.
fn parse_head(
    buffer: &[u8],
    limits: &ControllerLimits,
) -> Result<Option<(Head, usize)>, ErrorKind> {
    let mut pos = 0;
    let mut start_line: Option<(Method, String)> = None;
    let mut length = 0;

    loop {
        let Some(step) = memchr(b'\n', &buffer[pos..]) else {
            return Ok(None);
        };

        let line = trim_cr(&buffer[pos..pos + step]);
        let next = pos + step + 1;

        if start_line.is_none() {
            if line.is_empty() {
                return Err(ErrorKind::MalformedHead);
            }
            start_line = Some(parse_request_line(line)?);
        } else if line.is_empty() {
            let Some((method, target)) = start_line.take() else {
                return Err(ErrorKind::MalformedHead);
            };

            return Ok(Some((
                Head {
                    method,
                    target,
                    length,
                },
                next,
            )));
        } else if let Some(value) = parse_header_line(line, limits)? {
            length = value;
        }

        pos = next;
    }
}

fn parse_request_line(line: &[u8]) -> Result<(Method, String), ErrorKind> {
    let mut tokens = line.split(|&byte| byte == b' ').filter(|t| !t.is_empty());

    let method = tokens.next().ok_or(ErrorKind::MalformedHead)?;
    let target = tokens.next().ok_or(ErrorKind::MalformedHead)?;
    // anything after the target (usually the protocol version) is not
    // interpreted

    let target = simdutf8::basic::from_utf8(target).map_err(|_| ErrorKind::MalformedHead)?;

    Ok((Method::from_token(method), target.to_owned()))
}

/// Returns the declared body length when the line is a `Content-Length`
/// field; every other field is skipped.
fn parse_header_line(line: &[u8], limits: &ControllerLimits) -> Result<Option<usize>, ErrorKind> {
    let split = memchr(b':', line).ok_or(ErrorKind::MalformedHead)?;

    if !trim_ascii(&line[..split]).eq_ignore_ascii_case(b"content-length") {
        return Ok(None);
    }

    let value = trim_ascii(&line[split + 1..]);
    let length = types::slice_to_usize(value).ok_or(ErrorKind::InvalidContentLength)?;

    if length == 0 || length > limits.max_body_size {
        return Err(ErrorKind::InvalidContentLength);
    }

    Ok(Some(length))
}

#[inline(always)]
fn trim_cr(line: &[u8]) -> &[u8] {
    match line {
        [rest @ .., b'\r'] => rest,
        _ => line,
    }
}

#[inline]
fn trim_ascii(mut bytes: &[u8]) -> &[u8] {
    while let [first, rest @ ..] = bytes {
        if !first.is_ascii_whitespace() {
            break;
        }
        bytes = rest;
    }
    while let [rest @ .., last] = bytes {
        if !last.is_ascii_whitespace() {
            break;
        }
        bytes = rest;
    }
    bytes
}
