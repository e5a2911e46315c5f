use crate::Server;
use futures::{SinkExt, StreamExt};
use missive_core::{Call, Error, Reply};
use missive_transport::{CodecError, FrameCodec};
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

/// Answers call frames on `stream` until the peer hangs up.
///
/// Calls on one stream are processed in order, one at a time; every call
/// receives its own clone of `ctx`.
pub async fn serve_stream<S, Ctx>(server: Server<Ctx>, stream: S, ctx: Ctx) -> Result<(), Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
    Ctx: Clone + Send + 'static,
{
    let mut framed = Framed::new(stream, FrameCodec::<Call>::new());

    while let Some(frame) = framed.next().await {
        let reply = match frame {
            Ok(call) => Reply::from_result(server.process(call, ctx.clone()).await),
            // Framed stops reading after a decode error; the peer still gets an answer.
            Err(CodecError::Json { payload, reason }) => {
                warn!(%reason, bytes = payload.len(), "undecodable call frame");
                Reply::from_result(Err(Error::Parse { payload, reason }))
            }
            Err(err) => return Err(err.into()),
        };
        framed.send(reply).await?;
    }

    debug!("stream closed by peer");
    Ok(())
}

/// Accepts TCP connections and serves each one on its own task.
///
/// `make_context` builds the context shared by every call on a connection
/// from the peer address.
pub async fn serve_tcp<Ctx, F>(
    listener: TcpListener,
    server: Server<Ctx>,
    make_context: F,
) -> std::io::Result<()>
where
    Ctx: Clone + Send + 'static,
    F: Fn(SocketAddr) -> Ctx,
{
    info!(
        interface = server.interface().name(),
        addr = %listener.local_addr()?,
        "missive stream server listening"
    );
    loop {
        let (stream, peer) = listener.accept().await?;
        stream.set_nodelay(true)?;
        let server = server.clone();
        let ctx = make_context(peer);
        tokio::spawn(async move {
            debug!(%peer, "accepted connection");
            if let Err(err) = serve_stream(server, stream, ctx).await {
                warn!(%peer, error = %err, "connection failed");
            }
        });
    }
}
