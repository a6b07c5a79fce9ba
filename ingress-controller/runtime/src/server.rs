use crate::auth::Gate;
use anyhow::Result;
use hyper::{body::Incoming, server::conn::http1, service::service_fn, Request};
use hyper_util::rt::TokioIo;
use std::{convert::Infallible, net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{debug, debug_span, info, instrument, warn, Instrument};

/// Serves auth subrequests until the runtime begins shutting down.
#[instrument(skip_all, fields(port = %addr.port()))]
pub(crate) async fn serve(addr: SocketAddr, gate: Gate, drain: drain::Watch) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "auth server listening");
    accept(listener, Arc::new(gate), drain).await;
    Ok(())
}

async fn accept(listener: TcpListener, gate: Arc<Gate>, drain: drain::Watch) {
    let shutdown = drain.clone().signaled();
    tokio::pin!(shutdown);

    loop {
        let (io, client) = tokio::select! {
            release = &mut shutdown => {
                debug!("auth server shutting down");
                drop(release);
                return;
            }
            res = listener.accept() => match res {
                Ok(conn) => conn,
                Err(error) => {
                    warn!(%error, "failed to accept connection");
                    continue;
                }
            },
        };

        let gate = gate.clone();
        let drain = drain.clone();
        tokio::spawn(
            async move {
                let svc = service_fn(move |req: Request<Incoming>| {
                    let gate = gate.clone();
                    async move { Ok::<_, Infallible>(gate.handle(req).await) }
                });
                let conn = http1::Builder::new().serve_connection(TokioIo::new(io), svc);
                tokio::pin!(conn);

                tokio::select! {
                    res = &mut conn => {
                        if let Err(error) = res {
                            debug!(%error, "connection failed");
                        }
                    }
                    release = drain.signaled() => {
                        conn.as_mut().graceful_shutdown();
                        if let Err(error) = release.release_after(conn).await {
                            debug!(%error, "connection failed during shutdown");
                        }
                    }
                }
            }
            .instrument(debug_span!("conn", %client)),
        );
    }
}
