//! This module provides the basic party for the two-party protocols.
//!
//! A [MainParty] owns the channel to the other party, local and shared randomness, the
//! correlated randomness for the online phase and the statistics of the protocols it ran.
pub mod commitment;
pub mod correlated_randomness;
pub mod error;

use std::io::{self, Write};
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::network::{CommChannel, ConnectedParty, NetSerializable, CLIENT_INDEX, SERVER_INDEX};
use crate::party::correlated_randomness::{PreprocessedStore, SharedRng};
use crate::party::error::{MpcError, MpcResult};
use crate::share::{encode_checked, ArithShare};

#[cfg(feature = "verbose-timing")]
use {
    lazy_static::lazy_static,
    std::{collections::HashMap, sync::Mutex},
};

/// The identity of a party.
///
/// [Role::P0] contributes literal constants to shared constants, [Role::P1] contributes zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    P0,
    P1,
}

impl Role {
    pub fn from_index(i: usize) -> MpcResult<Self> {
        match i {
            SERVER_INDEX => Ok(Role::P0),
            CLIENT_INDEX => Ok(Role::P1),
            _ => Err(MpcError::InvalidParameters(format!(
                "party index {} is not 0 or 1",
                i
            ))),
        }
    }

    pub fn index(self) -> usize {
        match self {
            Role::P0 => SERVER_INDEX,
            Role::P1 => CLIENT_INDEX,
        }
    }

    pub fn other(self) -> Self {
        match self {
            Role::P0 => Role::P1,
            Role::P1 => Role::P0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommStats {
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub rounds: usize,
}

impl CommStats {
    pub fn empty() -> Self {
        Self {
            bytes_received: 0,
            bytes_sent: 0,
            rounds: 0,
        }
    }

    pub fn new(bytes_received: u64, bytes_sent: u64, rounds: usize) -> Self {
        Self {
            bytes_received,
            bytes_sent,
            rounds,
        }
    }

    pub fn print_comm_statistics(&self, role: Role) {
        println!(
            "Communication of {:?} to {:?}: {} bytes sent, {} bytes received, {} rounds",
            role,
            role.other(),
            self.bytes_sent,
            self.bytes_received,
            self.rounds
        );
    }

    pub fn write_to_csv<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        write!(
            writer,
            "{},{},{}",
            self.bytes_sent, self.bytes_received, self.rounds
        )
    }
}

/// Oblivious reads and comparisons performed since the last reset.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SearchCost {
    /// Number of values compared obliviously.
    pub comparisons: usize,
    /// Width of every oblivious read, in order.
    pub read_widths: Vec<usize>,
}

impl SearchCost {
    pub fn total_read_width(&self) -> usize {
        self.read_widths.iter().sum()
    }
}

/// One of the two computing parties.
pub struct MainParty {
    pub i: usize,
    role: Role,
    comm: CommChannel,
    random_shared: SharedRng,
    random_local: ChaCha20Rng,
    correlations: PreprocessedStore,
    cost: SearchCost,
    thread_pool: Option<ThreadPool>,
}

impl MainParty {
    /// Agrees on common randomness with the other party.
    ///
    /// - `n_worker_threads` - size of the local thread pool; `Some(0)` uses one thread per core, `None` runs single-threaded
    pub fn setup(party: ConnectedParty, n_worker_threads: Option<usize>) -> MpcResult<Self> {
        let role = Role::from_index(party.i)?;
        let mut comm = party.comm;
        let mut random_local = ChaCha20Rng::from_entropy();
        let random_shared = SharedRng::setup_pairwise(
            &mut random_local,
            &mut comm,
            role.index(),
            role.other().index(),
        )?;
        let thread_pool = n_worker_threads.map(Self::build_thread_pool).transpose()?;
        tracing::info!(
            party = party.i,
            threads = thread_pool.as_ref().map_or(1, |pool| pool.current_num_threads()),
            "party setup complete"
        );
        Ok(Self {
            i: party.i,
            role,
            comm,
            random_shared,
            random_local,
            correlations: PreprocessedStore::new(),
            cost: SearchCost::default(),
            thread_pool,
        })
    }

    fn build_thread_pool(n_worker_threads: usize) -> MpcResult<ThreadPool> {
        let n = if n_worker_threads == 0 {
            std::thread::available_parallelism().map_or(1, |n| n.get())
        } else {
            n_worker_threads
        };
        ThreadPoolBuilder::new()
            .num_threads(n)
            .thread_name(|i| format!("worker-{}", i))
            .build()
            .map_err(|err| MpcError::InvalidParameters(format!("cannot build thread pool: {}", err)))
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn has_multi_threading(&self) -> bool {
        self.thread_pool.is_some()
    }

    pub fn num_worker_threads(&self) -> usize {
        self.thread_pool
            .as_ref()
            .map_or(1, |pool| pool.current_num_threads())
    }

    /// Runs `f` inside the party's thread pool, or on the calling thread if there is none.
    pub fn run_in_threadpool<T: Send, F: FnOnce() -> T + Send>(&self, f: F) -> T {
        match &self.thread_pool {
            Some(pool) => pool.install(f),
            None => f(),
        }
    }

    pub fn shared_rng(&mut self) -> &mut SharedRng {
        &mut self.random_shared
    }

    pub fn local_rng(&mut self) -> &mut ChaCha20Rng {
        &mut self.random_local
    }

    /// Adds correlated randomness for subsequent protocol runs.
    pub fn add_correlations(&mut self, store: PreprocessedStore) {
        self.correlations.extend(store);
    }

    pub fn correlations(&self) -> &PreprocessedStore {
        &self.correlations
    }

    pub(crate) fn correlations_mut(&mut self) -> &mut PreprocessedStore {
        &mut self.correlations
    }

    pub fn search_cost(&self) -> &SearchCost {
        &self.cost
    }

    pub fn reset_search_cost(&mut self) {
        self.cost = SearchCost::default();
    }

    pub(crate) fn record_read(&mut self, width: usize) {
        self.cost.read_widths.push(width);
    }

    pub(crate) fn record_comparisons(&mut self, n: usize) {
        self.cost.comparisons += n;
    }

    pub fn send_field<T: NetSerializable>(&mut self, elements: &[T]) -> MpcResult<()> {
        self.comm.send_field(elements).map_err(MpcError::from)
    }

    pub fn receive_field<T: NetSerializable>(&mut self, num_elements: usize) -> MpcResult<Vec<T>> {
        self.comm.receive_field(num_elements).map_err(MpcError::from)
    }

    /// Sends `mine` and returns the other party's elements of the same length.
    ///
    /// [Role::P0] writes first, [Role::P1] reads first.
    pub fn exchange_field<T: NetSerializable>(&mut self, mine: &[T]) -> MpcResult<Vec<T>> {
        match self.role {
            Role::P0 => {
                self.send_field(mine)?;
                self.receive_field(mine.len())
            }
            Role::P1 => {
                let theirs = self.receive_field(mine.len())?;
                self.send_field(mine)?;
                Ok(theirs)
            }
        }
    }

    /// Secret-shares `n` values owned by `owner` without communication.
    ///
    /// The non-owner's share is drawn from the shared randomness, the owner's share is the
    /// value minus that randomness. `values` is only read by the owner.
    pub fn input_arith(
        &mut self,
        owner: Role,
        values: Option<&[i64]>,
        n: usize,
    ) -> MpcResult<Vec<ArithShare>> {
        let masks: Vec<u64> = (0..n).map(|_| self.random_shared.as_mut().gen()).collect();
        if self.role != owner {
            return Ok(masks.into_iter().map(ArithShare).collect());
        }
        let values = values.ok_or_else(|| {
            MpcError::InvalidParameters("input owner must provide its values".to_string())
        })?;
        if values.len() != n {
            return Err(MpcError::InvalidParameters(format!(
                "expected {} input values, got {}",
                n,
                values.len()
            )));
        }
        values
            .iter()
            .zip(masks)
            .map(|(v, r)| encode_checked(*v).map(|v| ArithShare(v.wrapping_sub(r))))
            .collect()
    }

    pub fn comm_stats(&self) -> CommStats {
        CommStats::new(
            self.comm.get_bytes_received(),
            self.comm.get_bytes_sent(),
            self.comm.get_rounds(),
        )
    }

    pub fn reset_comm_stats(&mut self) {
        self.comm.reset_stats();
    }

    pub fn print_statistics(&self) {
        self.comm_stats().print_comm_statistics(self.role);
        println!(
            "{} oblivious comparisons, {} oblivious reads of total width {}",
            self.cost.comparisons,
            self.cost.read_widths.len(),
            self.cost.total_read_width()
        );
        #[cfg(feature = "verbose-timing")]
        {
            if let Ok(timer) = PARTY_TIMER.lock() {
                for (key, duration) in &timer.times {
                    println!("{}: {}s", key, duration.as_secs_f64());
                }
            }
        }
    }

    /// Closes the channel to the other party.
    pub fn teardown(&mut self) -> MpcResult<()> {
        tracing::info!(party = self.i, "teardown");
        self.comm.teardown().map_err(MpcError::from)
    }

    pub fn get_additional_timers(&self) -> Vec<(String, Duration)> {
        #[cfg(feature = "verbose-timing")]
        {
            if let Ok(timer) = PARTY_TIMER.lock() {
                return timer
                    .times
                    .iter()
                    .map(|(key, duration)| (key.clone(), *duration))
                    .collect();
            }
        }
        Vec::new()
    }
}

#[cfg(feature = "verbose-timing")]
lazy_static! {
    pub static ref PARTY_TIMER: Mutex<Timer> = Mutex::new(Timer::new());
}

#[cfg(feature = "verbose-timing")]
pub struct Timer {
    times: HashMap<String, Duration>,
}

#[cfg(feature = "verbose-timing")]
impl Timer {
    pub fn new() -> Self {
        Self {
            times: HashMap::new(),
        }
    }

    pub fn report_time(&mut self, key: &str, duration: Duration) {
        *self
            .times
            .entry(key.to_string())
            .or_insert(Duration::from_secs(0)) += duration;
    }
}

/// Exposes useful testing functionalities
#[cfg(test)]
pub mod test_export {
    use std::net::{IpAddr, Ipv4Addr};
    use std::thread;

    use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};

    use crate::network::{Config, ConnectedParty, CreatedParty, CLIENT_INDEX, SERVER_INDEX};

    use super::MainParty;

    type KeyPair = (PrivateKeyDer<'static>, CertificateDer<'static>);

    fn create_key_pair() -> KeyPair {
        let rcgen::CertifiedKey { cert, key_pair } =
            rcgen::generate_simple_self_signed(vec!["127.0.0.1".to_string()])
                .expect("cannot generate test certificate");
        (
            PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der())),
            cert.der().clone(),
        )
    }

    /// Self-signed certificates for both parties, generated per test.
    pub(crate) fn create_certificates() -> (KeyPair, KeyPair) {
        (create_key_pair(), create_key_pair())
    }

    pub fn localhost_connect<
        T0: Send,
        F0: Send + FnOnce(ConnectedParty) -> T0,
        T1: Send,
        F1: Send + FnOnce(ConnectedParty) -> T1,
    >(
        f0: F0,
        f1: F1,
    ) -> (T0, T1) {
        let addr = vec![Ipv4Addr::LOCALHOST; 2];
        let party0 = CreatedParty::bind(SERVER_INDEX, IpAddr::V4(Ipv4Addr::LOCALHOST), 0).unwrap();
        let party1 = CreatedParty::client(CLIENT_INDEX);
        let ports = vec![party0.port().unwrap(), 0];

        let ((sk0, pk0), (sk1, pk1)) = create_certificates();
        let certificates = vec![pk0.clone(), pk1.clone()];

        let (p0_res, p1_res) = thread::scope(|scope| {
            let party0 = {
                let config = Config::new(addr.clone(), ports.clone(), certificates.clone(), pk0, sk0);
                thread::Builder::new()
                    .name("party0".to_string())
                    .spawn_scoped(scope, move || f0(party0.connect(config, None).unwrap()))
                    .unwrap()
            };
            let party1 = {
                let config = Config::new(addr, ports, certificates, pk1, sk1);
                thread::Builder::new()
                    .name("party1".to_string())
                    .spawn_scoped(scope, move || f1(party1.connect(config, None).unwrap()))
                    .unwrap()
            };
            (party0.join(), party1.join())
        });

        match (p0_res, p1_res) {
            (Ok(p0_res), Ok(p1_res)) => (p0_res, p1_res),
            (Err(panic), _) | (_, Err(panic)) => std::panic::resume_unwind(panic),
        }
    }

    pub fn localhost_setup<
        T0: Send,
        F0: Send + FnOnce(&mut MainParty) -> T0,
        T1: Send,
        F1: Send + FnOnce(&mut MainParty) -> T1,
    >(
        f0: F0,
        f1: F1,
        n_threads: Option<usize>,
    ) -> ((T0, MainParty), (T1, MainParty)) {
        let _f0 = move |p: ConnectedParty| {
            let mut p = MainParty::setup(p, n_threads).unwrap();
            let res = f0(&mut p);
            p.teardown().unwrap();
            (res, p)
        };
        let _f1 = move |p: ConnectedParty| {
            let mut p = MainParty::setup(p, n_threads).unwrap();
            let res = f1(&mut p);
            p.teardown().unwrap();
            (res, p)
        };
        localhost_connect(_f0, _f1)
    }

    pub fn simple_localhost_setup<F: Send + Clone + Fn(&mut MainParty) -> T, T: Send>(
        f: F,
    ) -> ((T, T), (MainParty, MainParty)) {
        let ((t0, p0), (t1, p1)) = localhost_setup(f.clone(), f, None);
        ((t0, t1), (p0, p1))
    }
}
