//! One accepted connection: read a request, hand it to the control
//! task, write the verdict, close.
//!
//! Everything here is per-connection work with no shared state; the
//! control task owns the store and the apply serializer. A connection
//! that dies while its apply is in flight simply loses its response;
//! the apply itself still runs to a verdict.

use crate::{
    errors::ErrorKind,
    http::{
        request::{Request, RequestReader},
        response::Response,
        types::Method,
    },
    limits::ControllerLimits,
};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::{mpsc, oneshot},
};
use tracing::debug;

/// A buffered request on its way to the control task, with the channel
/// its response comes back on. Dropping `reply` unanswered closes the
/// connection without a response.
pub(crate) struct DispatchRequest {
    pub(crate) method: Method,
    pub(crate) target: String,
    pub(crate) body: Vec<u8>,
    pub(crate) reply: oneshot::Sender<Response>,
}

pub(crate) async fn serve<S>(
    mut stream: S,
    dispatch: mpsc::UnboundedSender<DispatchRequest>,
    limits: ControllerLimits,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    debug!("controller conn init");

    let request = match read_one(&mut stream, &limits).await {
        Ok(request) => request,
        Err(err) => {
            debug!("controller conn read failed: {}", err);
            return;
        }
    };

    let (reply, verdict) = oneshot::channel();
    let (method, target, body) = request.into_parts();

    if dispatch
        .send(DispatchRequest {
            method,
            target,
            body,
            reply,
        })
        .is_err()
    {
        return;
    }

    let Ok(response) = verdict.await else {
        // the dispatcher dropped the request without an answer
        return;
    };

    if let Err(err) = response.write(&mut stream, limits.io_timeout).await {
        debug!("controller conn write failed: {}", err);
    }

    debug!("controller conn close");
}

async fn read_one<S>(stream: &mut S, limits: &ControllerLimits) -> Result<Request, ErrorKind>
where
    S: AsyncRead + Unpin,
{
    let request = RequestReader::new(limits)
        .read_request(stream, limits)
        .await?;

    // A PUT without a body never reaches JSON parsing.
    if request.method == Method::Put && request.body().is_empty() {
        return Err(ErrorKind::EmptyBody);
    }

    Ok(request)
}
