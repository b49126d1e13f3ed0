use std::{io, net::SocketAddr, time::Duration};

use log::{debug, info};
use tokio::net::{
    TcpListener, TcpStream,
    tcp::{OwnedReadHalf, OwnedWriteHalf},
};

use crate::{
    ClusterEnv,
    cluster::{ClusterGate, runtime},
};

const CONNECT_ATTEMPTS: usize = 100;
const CONNECT_BACKOFF: Duration = Duration::from_millis(100);

/// A gate whose links are TCP connections to rank 0.
pub type TcpGate = ClusterGate<OwnedReadHalf, OwnedWriteHalf>;

impl TcpGate {
    /// Joins the cluster described by `env`. Rank 0 listens on the master address
    /// until every peer connected, the others connect to it.
    pub fn connect(env: ClusterEnv) -> io::Result<Self> {
        let ClusterEnv {
            rank,
            world_size,
            master_addr,
        } = env;

        if rank == 0 {
            let listener = std::net::TcpListener::bind(master_addr)?;
            Self::serve(listener, world_size)
        } else {
            let runtime = runtime()?;
            let stream = runtime.block_on(connect_with_retry(master_addr))?;
            info!(rank = rank; "connected to {master_addr}");
            Self::join(runtime, rank, world_size, stream.into_split())
        }
    }

    /// Accepts `world_size - 1` peers on `listener` and becomes rank 0.
    pub fn serve(listener: std::net::TcpListener, world_size: usize) -> io::Result<Self> {
        let runtime = runtime()?;
        listener.set_nonblocking(true)?;

        let peers = runtime.block_on(async {
            let listener = TcpListener::from_std(listener)?;
            let mut peers = Vec::with_capacity(world_size.saturating_sub(1));

            while peers.len() + 1 < world_size {
                let (stream, addr) = listener.accept().await?;
                stream.set_nodelay(true)?;
                debug!("accepted peer {addr}");
                peers.push(stream.into_split());
            }

            Ok::<_, io::Error>(peers)
        })?;

        info!(world_size = world_size; "every peer connected");
        Self::coordinate(runtime, peers)
    }
}

async fn connect_with_retry(addr: SocketAddr) -> io::Result<TcpStream> {
    let mut attempt = 1;

    loop {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Err(e) if attempt < CONNECT_ATTEMPTS => {
                debug!(attempt = attempt; "coordinator at {addr} not reachable yet: {e}");
                attempt += 1;
                tokio::time::sleep(CONNECT_BACKOFF).await;
            }
            Err(e) => return Err(e),
        }
    }
}
