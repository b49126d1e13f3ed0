use std::{env, io, net::SocketAddr};

pub const DEFAULT_MASTER_ADDR: &str = "127.0.0.1:29500";

/// The rendezvous settings of a distributed run, as exported by the launcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterEnv {
    pub rank: usize,
    pub world_size: usize,
    pub master_addr: SocketAddr,
}

impl ClusterEnv {
    /// Reads `RANK`, `WORLD_SIZE` and `MASTER_ADDR`.
    ///
    /// # Returns
    /// `None` when neither `RANK` nor `WORLD_SIZE` is set, i.e. a single process run.
    ///
    /// # Errors
    /// If a variable is present but malformed, or the rank is out of range.
    pub fn from_env() -> io::Result<Option<Self>> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> io::Result<Option<Self>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let (rank, world_size) = match (lookup("RANK"), lookup("WORLD_SIZE")) {
            (None, None) => return Ok(None),
            (rank, world_size) => (
                parse("RANK", rank.as_deref().unwrap_or("0"))?,
                parse("WORLD_SIZE", world_size.as_deref().unwrap_or("1"))?,
            ),
        };

        if world_size == 0 || rank >= world_size {
            return Err(invalid(format!("rank {rank} is out of range for world size {world_size}")));
        }

        let master_addr = lookup("MASTER_ADDR").unwrap_or_else(|| DEFAULT_MASTER_ADDR.to_string());
        let master_addr = master_addr
            .parse()
            .map_err(|e| invalid(format!("invalid MASTER_ADDR '{master_addr}': {e}")))?;

        Ok(Some(Self {
            rank,
            world_size,
            master_addr,
        }))
    }
}

fn parse(key: &str, value: &str) -> io::Result<usize> {
    value
        .parse()
        .map_err(|e| invalid(format!("invalid {key} '{value}': {e}")))
}

fn invalid(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, msg)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn unset_means_single_process() {
        assert_eq!(ClusterEnv::from_lookup(lookup(&[])).unwrap(), None);
    }

    #[test]
    fn reads_every_variable() {
        let env = ClusterEnv::from_lookup(lookup(&[
            ("RANK", "2"),
            ("WORLD_SIZE", "4"),
            ("MASTER_ADDR", "10.0.0.1:4000"),
        ]))
        .unwrap()
        .unwrap();

        assert_eq!(env.rank, 2);
        assert_eq!(env.world_size, 4);
        assert_eq!(env.master_addr, "10.0.0.1:4000".parse().unwrap());
    }

    #[test]
    fn rejects_out_of_range_rank() {
        let err = ClusterEnv::from_lookup(lookup(&[("RANK", "4"), ("WORLD_SIZE", "4")])).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn rejects_garbage() {
        assert!(ClusterEnv::from_lookup(lookup(&[("RANK", "one"), ("WORLD_SIZE", "2")])).is_err());
    }
}
