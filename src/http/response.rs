//! Response writing: one `HTTP/1.0` response per connection.
//!
//! Responses carry no headers, just a status line and a pretty-printed
//! JSON body followed by a final CRLF. The body is either a node of the
//! configuration tree (`GET` hits) or one of the canned literals from
//! [`errors`](crate::errors); literals are re-rendered through the same
//! pretty printer so every body shares one formatting.

use crate::{
    errors::ErrorKind,
    http::types::StatusCode,
};
use serde_json::Value;
use std::{io, time::Duration};
use tokio::{io::AsyncWriteExt, time::sleep};

#[derive(Debug)]
pub(crate) struct Response {
    status: StatusCode,
    body: Body,
}

#[derive(Debug)]
enum Body {
    Tree(Value),
    Literal(&'static str),
}

impl Response {
    #[inline]
    pub(crate) fn tree(value: Value) -> Self {
        Self {
            status: StatusCode::Ok,
            body: Body::Tree(value),
        }
    }

    #[inline]
    pub(crate) fn reconfiguration_done() -> Self {
        Self {
            status: StatusCode::Ok,
            body: Body::Literal(r#"{ "success": "Reconfiguration done." }"#),
        }
    }

    /// Builds the canned response for an error, or `None` for kinds
    /// that close the connection silently.
    #[inline]
    pub(crate) fn from_error(kind: &ErrorKind) -> Option<Self> {
        let (status, json) = kind.response_parts()?;

        Some(Self {
            status,
            body: Body::Literal(json),
        })
    }

    pub(crate) fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(128);

        out.extend_from_slice(b"HTTP/1.0 ");
        out.extend_from_slice(self.status.status_line().as_bytes());
        out.extend_from_slice(b"\r\n\r\n");

        match &self.body {
            Body::Tree(value) => pretty(&mut out, value),
            Body::Literal(json) => match serde_json::from_str::<Value>(json) {
                Ok(value) => pretty(&mut out, &value),
                // canned literals always parse
                Err(_) => out.extend_from_slice(json.as_bytes()),
            },
        }

        out.extend_from_slice(b"\r\n");
        out
    }

    /// Drains the encoded response. The timer re-arms on every partial
    /// write; a stalled or broken peer aborts the response silently.
    pub(crate) async fn write<S>(&self, stream: &mut S, time: Duration) -> Result<(), io::Error>
    where
        S: tokio::io::AsyncWrite + Unpin,
    {
        let bytes = self.encode();
        let mut pos = 0;

        while pos < bytes.len() {
            tokio::select! {
                biased;

                written = stream.write(&bytes[pos..]) => {
                    let n = written?;
                    if n == 0 {
                        return Err(io::ErrorKind::WriteZero.into());
                    }
                    pos += n;
                }
                _ = sleep(time) => {
                    return Err(io::Error::new(io::ErrorKind::TimedOut, "write timeout"));
                }
            }
        }

        stream.flush().await
    }
}

#[inline]
fn pretty(out: &mut Vec<u8>, value: &Value) {
    // serializing a Value into a Vec cannot fail
    let _ = serde_json::to_writer_pretty(&mut *out, value);
}

#[cfg(test)]
mod encode {
    use super::*;
    use serde_json::json;

    #[test]
    fn tree_body() {
        let response = Response::tree(json!({ "listeners": {}, "applications": {} }));

        assert_eq!(
            String::from_utf8(response.encode()).unwrap(),
            "HTTP/1.0 200 OK\r\n\r\n{\n  \"listeners\": {},\n  \"applications\": {}\n}\r\n"
        );
    }

    #[test]
    fn scalar_tree_body() {
        let response = Response::tree(json!("app"));

        assert_eq!(
            String::from_utf8(response.encode()).unwrap(),
            "HTTP/1.0 200 OK\r\n\r\n\"app\"\r\n"
        );
    }

    #[test]
    fn literal_bodies() {
        #[rustfmt::skip]
        let cases = [
            (
                Response::reconfiguration_done(),
                "HTTP/1.0 200 OK\r\n\r\n{\n  \"success\": \"Reconfiguration done.\"\n}\r\n",
            ),
            (
                Response::from_error(&ErrorKind::InvalidJson).unwrap(),
                "HTTP/1.0 400 Bad Request\r\n\r\n{\n  \"error\": \"Invalid JSON.\"\n}\r\n",
            ),
            (
                Response::from_error(&ErrorKind::PathNotFound).unwrap(),
                "HTTP/1.0 404 Not Found\r\n\r\n{\n  \"error\": \"Value doesn't exist.\"\n}\r\n",
            ),
            (
                Response::from_error(&ErrorKind::MethodNotAllowed).unwrap(),
                "HTTP/1.0 405 Method Not Allowed\r\n\r\n{\n  \"error\": \"Invalid method.\"\n}\r\n",
            ),
            (
                Response::from_error(&ErrorKind::ApplyRejected).unwrap(),
                "HTTP/1.0 500 Internal Server Error\r\n\r\n\
                 {\n  \"error\": \"Failed to apply new configuration.\"\n}\r\n",
            ),
        ];

        for (response, expected) in cases {
            assert_eq!(String::from_utf8(response.encode()).unwrap(), expected);
        }
    }

    #[test]
    fn silent_kinds_have_no_response() {
        assert!(Response::from_error(&ErrorKind::TooLargeHead).is_none());
        assert!(Response::from_error(&ErrorKind::EmptyBody).is_none());
    }

    #[test]
    fn member_order_is_preserved() {
        let value: Value = serde_json::from_str(r#"{"b": 1, "a": 2, "m": 3}"#).unwrap();
        let encoded = Response::tree(value).encode();
        let body = String::from_utf8(encoded).unwrap();

        let b = body.find("\"b\"").unwrap();
        let a = body.find("\"a\"").unwrap();
        let m = body.find("\"m\"").unwrap();
        assert!(b < a && a < m);
    }
}
