use std::io;

use comms::{
    FrameReceiver, FrameSender,
    msg::{Command, Msg, Payload},
};
use engine::{Gate, ReduceOp};
use futures::future::try_join_all;
use log::{debug, warn};
use tokio::{
    io::{AsyncRead, AsyncWrite, DuplexStream, ReadHalf, WriteHalf},
    runtime::{Builder, Runtime},
};

const DUPLEX_CAPACITY: usize = 1 << 16;

type Link<R, W> = (FrameReceiver<R>, FrameSender<W>);

enum Links<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Held by rank 0, peer `i` is rank `i + 1`.
    Coordinator(Vec<Link<R, W>>),
    Member(Link<R, W>),
}

/// A rank of a data-parallel run.
///
/// Every call blocks on the gate's own runtime until the whole cluster took
/// part in it.
pub struct ClusterGate<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    rank: usize,
    world_size: usize,
    runtime: Runtime,
    links: Links<R, W>,
    buf: Vec<u64>,
}

/// A gate whose links are in-memory pipes.
pub type MemoryGate = ClusterGate<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>;

/// Builds every rank of a `world_size` cluster inside this process, linked
/// through in-memory pipes. Element `i` is rank `i`.
///
/// Each gate is meant to be moved to its own thread.
pub fn in_process(world_size: usize) -> io::Result<Vec<MemoryGate>> {
    if world_size == 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "a cluster needs at least one rank",
        ));
    }

    let mut peers = Vec::with_capacity(world_size - 1);
    let mut members = Vec::with_capacity(world_size - 1);

    for rank in 1..world_size {
        let (coordinator_end, member_end) = tokio::io::duplex(DUPLEX_CAPACITY);
        peers.push(tokio::io::split(coordinator_end));
        members.push(MemoryGate::member(
            rank,
            world_size,
            tokio::io::split(member_end),
        )?);
    }

    let mut gates = Vec::with_capacity(world_size);
    gates.push(MemoryGate::coordinator(peers)?);
    gates.extend(members);
    Ok(gates)
}

pub(crate) fn runtime() -> io::Result<Runtime> {
    Builder::new_current_thread().enable_all().build()
}

fn unexpected<T>(msg: &Msg, wanted: &str) -> io::Result<T> {
    let err = match msg {
        Msg::Err(text) => io::Error::other(format!("peer failed: {text}")),
        msg => io::Error::new(
            io::ErrorKind::InvalidData,
            format!("expected {wanted}, received {}", msg.kind()),
        ),
    };

    Err(err)
}

fn length_mismatch<T>(got: usize, expected: usize) -> io::Result<T> {
    Err(io::Error::new(
        io::ErrorKind::InvalidData,
        format!("received {got} values, expected {expected}"),
    ))
}

fn expect_params<'a>(msg: &Msg<'a>, expected: usize) -> io::Result<&'a [f32]> {
    match msg {
        Msg::Data(Payload::Params(nums)) if nums.len() == expected => Ok(nums),
        Msg::Data(Payload::Params(nums)) => length_mismatch(nums.len(), expected),
        msg => unexpected(msg, "params"),
    }
}

fn expect_scalars<'a>(msg: &Msg<'a>, expected: usize) -> io::Result<&'a [f64]> {
    match msg {
        Msg::Data(Payload::Scalars(nums)) if nums.len() == expected => Ok(nums),
        Msg::Data(Payload::Scalars(nums)) => length_mismatch(nums.len(), expected),
        msg => unexpected(msg, "scalars"),
    }
}

async fn send_all<R, W>(peers: &mut [Link<R, W>], msg: &Msg<'_>) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    try_join_all(peers.iter_mut().map(|(_, tx)| tx.send(msg))).await?;
    Ok(())
}

impl<R, W> ClusterGate<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Creates the rank 0 gate out of one link per peer, in any order.
    ///
    /// Waits for every peer's `Connect` and orders the links by the announced rank.
    ///
    /// # Errors
    /// If a peer announces another world size, an out of range rank or a rank
    /// already taken.
    pub fn coordinator(peers: Vec<(R, W)>) -> io::Result<Self> {
        Self::coordinate(runtime()?, peers)
    }

    pub(crate) fn coordinate(runtime: Runtime, peers: Vec<(R, W)>) -> io::Result<Self> {
        let world_size = peers.len() + 1;
        let mut buf = Vec::new();

        let links = runtime.block_on(async {
            let mut ranked: Vec<Option<Link<R, W>>> = (1..world_size).map(|_| None).collect();

            for (rx, tx) in peers {
                let (mut rx, tx) = comms::channel(rx, tx);

                let (rank, announced) = match rx.recv_into(&mut buf).await? {
                    Msg::Control(Command::Connect { rank, world_size }) => (rank, world_size),
                    msg => return unexpected(&msg, "connect"),
                };

                if announced != world_size || rank == 0 || rank >= world_size {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("peer announced rank {rank} of {announced}, cluster has {world_size}"),
                    ));
                }

                let slot = &mut ranked[rank - 1];
                if slot.is_some() {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("rank {rank} connected twice"),
                    ));
                }

                debug!(rank = rank; "peer joined");
                *slot = Some((rx, tx));
            }

            Ok::<Vec<Link<R, W>>, io::Error>(ranked.into_iter().flatten().collect())
        })?;

        Ok(Self {
            rank: 0,
            world_size,
            runtime,
            links: Links::Coordinator(links),
            buf,
        })
    }

    /// Creates the gate of a non-zero rank out of its link to rank 0.
    pub fn member(rank: usize, world_size: usize, link: (R, W)) -> io::Result<Self> {
        Self::join(runtime()?, rank, world_size, link)
    }

    pub(crate) fn join(
        runtime: Runtime,
        rank: usize,
        world_size: usize,
        (rx, tx): (R, W),
    ) -> io::Result<Self> {
        if rank == 0 || rank >= world_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid member rank {rank} of {world_size}"),
            ));
        }

        let (rx, mut tx) = comms::channel(rx, tx);
        let hello = Msg::Control(Command::Connect { rank, world_size });
        runtime.block_on(tx.send(&hello))?;

        Ok(Self {
            rank,
            world_size,
            runtime,
            links: Links::Member((rx, tx)),
            buf: Vec::new(),
        })
    }

    /// Shared by both all-reduce flavours, the coordinator folds contributions
    /// in rank order.
    fn fold_params(&mut self, values: &mut [f32], op: ReduceOp) -> io::Result<()> {
        let Self {
            runtime,
            links,
            buf,
            world_size,
            ..
        } = self;

        match links {
            Links::Coordinator(peers) => runtime.block_on(async {
                let mut acc: Vec<f64> = values.iter().map(|&v| f64::from(v)).collect();

                for (rx, _) in peers.iter_mut() {
                    let msg = rx.recv_into(buf).await?;
                    let nums = expect_params(&msg, acc.len())?;
                    acc.iter_mut()
                        .zip(nums)
                        .for_each(|(a, &v)| *a = op.fold(*a, f64::from(v)));
                }

                values
                    .iter_mut()
                    .zip(&acc)
                    .for_each(|(v, &a)| *v = op.finish(a, *world_size) as f32);

                send_all(peers, &Msg::Data(Payload::Params(values))).await
            }),
            Links::Member((rx, tx)) => runtime.block_on(async {
                tx.send(&Msg::Data(Payload::Params(values))).await?;

                let msg = rx.recv_into(buf).await?;
                let nums = expect_params(&msg, values.len())?;
                values.copy_from_slice(nums);
                Ok::<_, io::Error>(())
            }),
        }
    }
}

impl<R, W> Gate for ClusterGate<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    fn rank(&self) -> usize {
        self.rank
    }

    fn world_size(&self) -> usize {
        self.world_size
    }

    fn broadcast(&mut self, values: &mut [f32]) -> io::Result<()> {
        let Self {
            runtime,
            links,
            buf,
            ..
        } = self;

        match links {
            Links::Coordinator(peers) => {
                runtime.block_on(send_all(peers, &Msg::Data(Payload::Params(values))))
            }
            Links::Member((rx, _)) => runtime.block_on(async {
                let msg = rx.recv_into(buf).await?;
                let nums = expect_params(&msg, values.len())?;
                values.copy_from_slice(nums);
                Ok::<_, io::Error>(())
            }),
        }
    }

    fn all_reduce(&mut self, values: &mut [f32], op: ReduceOp) -> io::Result<()> {
        self.fold_params(values, op).inspect_err(|e| {
            warn!(rank = self.rank; "all-reduce failed: {e}");
        })
    }

    fn reduce_metric(&mut self, value: f64, op: ReduceOp) -> io::Result<f64> {
        let Self {
            runtime,
            links,
            buf,
            world_size,
            ..
        } = self;

        match links {
            Links::Coordinator(peers) => runtime.block_on(async {
                let mut acc = value;

                for (rx, _) in peers.iter_mut() {
                    let msg = rx.recv_into(buf).await?;
                    acc = op.fold(acc, expect_scalars(&msg, 1)?[0]);
                }

                let reduced = op.finish(acc, *world_size);
                send_all(peers, &Msg::Data(Payload::Scalars(&[reduced]))).await?;
                Ok::<_, io::Error>(reduced)
            }),
            Links::Member((rx, tx)) => runtime.block_on(async {
                tx.send(&Msg::Data(Payload::Scalars(&[value]))).await?;

                let msg = rx.recv_into(buf).await?;
                Ok::<_, io::Error>(expect_scalars(&msg, 1)?[0])
            }),
        }
    }
}
