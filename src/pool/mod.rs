//! Keeps a minimum number of `search`/`auth` processes alive on consecutive
//! ports, replacing the ones that die or stop answering their health check.

pub mod config;
pub mod health;

use std::{
    collections::BTreeMap,
    fmt::Write as _,
    future::Future,
    io,
    net::SocketAddr,
    process::{ExitStatus, Stdio},
    time::Duration,
};

use thiserror::Error;
use tokio::{
    process::{Child, Command},
    time::{interval, sleep, timeout, Instant, MissedTickBehavior},
};
use tracing::{debug, info, trace, warn};

use self::{
    config::{PoolConfig, PoolSpec},
    health::{HealthCheck, HealthError},
};

/// Query sent to a freshly spawned process.
const STARTUP_QUERY: &str = "healthcheck";
/// Query sent on every health check round.
const HEALTH_QUERY: &str = "health";
const STARTUP_POLL: Duration = Duration::from_millis(50);

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Max processes ({0}) reached")]
    MaxProcesses(usize),
    #[error("No ports left to assign")]
    PortsExhausted,
    #[error("Unable to start the process. {0}")]
    Spawn(io::Error),
    #[error("Process on port {port} exited during startup, {status}")]
    Exited { port: u16, status: ExitStatus },
    #[error("Process on port {port} failed its startup health check. {source}")]
    Unhealthy { port: u16, source: HealthError },
}

struct Process {
    child: Child,
    pid: u32,
}

/// The processes of one executable, mapped by port.
pub struct ProcessPool {
    spec: PoolSpec,
    next_port: Option<u16>,
    processes: BTreeMap<u16, Process>,
}

impl ProcessPool {
    pub fn new(spec: PoolSpec) -> ProcessPool {
        ProcessPool {
            next_port: Some(spec.first_port),
            spec,
            processes: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    /// Ports of the processes that passed their last health check.
    pub fn ports(&self) -> Vec<u16> {
        self.processes.keys().copied().collect()
    }

    fn addr(&self, port: u16) -> SocketAddr {
        SocketAddr::new(self.spec.host, port)
    }

    /// Starts a process on the next port and waits until it answers a
    /// health check. A port is never reused, even when its process fails.
    ///
    /// # Errors
    ///
    /// Fails when the pool is full, when the process can't be started and
    /// when it exits or stays unhealthy for [PoolConfig::startup_timeout].
    pub async fn spawn_process(&mut self, config: &PoolConfig) -> Result<u16, PoolError> {
        if self.processes.len() >= self.spec.max_processes {
            return Err(PoolError::MaxProcesses(self.spec.max_processes));
        }
        let port = self.next_port.ok_or(PoolError::PortsExhausted)?;
        self.next_port = port.checked_add(1);

        let mut child = Command::new(&self.spec.command)
            .arg(port.to_string())
            .arg("--host")
            .arg(self.spec.host.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(PoolError::Spawn)?;
        let pid = child.id().unwrap_or_default();

        let health_check = HealthCheck::from_config(config);
        let deadline = Instant::now() + config.startup_timeout();
        loop {
            let error = match health_check.check(self.addr(port), STARTUP_QUERY).await {
                Ok(()) => break,
                Err(e) => e,
            };
            if let Ok(Some(status)) = child.try_wait() {
                return Err(PoolError::Exited { port, status });
            }
            if Instant::now() >= deadline {
                if let Err(e) = child.kill().await {
                    debug!("Unable to kill process {pid} on port {port}. {e}");
                }
                return Err(PoolError::Unhealthy {
                    port,
                    source: error,
                });
            }
            sleep(STARTUP_POLL).await;
        }

        info!("Spawned {} on port {port}, pid={pid}", self.spec.name);
        self.processes.insert(port, Process { child, pid });
        Ok(port)
    }

    /// Removes the processes that exited or failed their health check,
    /// terminating the ones still running. Returns how many were removed.
    pub async fn health_check(&mut self, config: &PoolConfig) -> usize {
        let health_check = HealthCheck::from_config(config);
        let mut unhealthy = Vec::new();

        for (port, process) in self.processes.iter_mut() {
            match process.child.try_wait() {
                Ok(Some(status)) => {
                    warn!("Process {} on port {port} exited, {status}", self.spec.name);
                    unhealthy.push(*port);
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Unable to poll process {} on port {port}. {e}", self.spec.name);
                    unhealthy.push(*port);
                    continue;
                }
            }

            let addr = SocketAddr::new(self.spec.host, *port);
            match health_check.check(addr, HEALTH_QUERY).await {
                Ok(()) => trace!("Everything is ok at {} on port {port}", self.spec.name),
                Err(e) => {
                    warn!(
                        "Process {} on port {port} is unhealthy, removing it. {e}",
                        self.spec.name
                    );
                    unhealthy.push(*port);
                }
            }
        }

        for port in &unhealthy {
            if let Some(process) = self.processes.remove(port) {
                terminate(&self.spec.name, *port, process, config.shutdown_timeout()).await;
            }
        }
        unhealthy.len()
    }

    /// Spawns processes until the pool holds [PoolSpec::min_processes],
    /// giving up after as many attempts as that minimum. The next health
    /// check round tries again.
    pub async fn ensure_min_processes(&mut self, config: &PoolConfig) {
        let mut attempts = 0;
        while self.processes.len() < self.spec.min_processes && attempts < self.spec.min_processes
        {
            if let Err(e) = self.spawn_process(config).await {
                warn!("Unable to spawn {} process. {e}", self.spec.name);
            }
            attempts += 1;
        }
    }

    /// Sends SIGTERM to every process and waits for them to exit, killing
    /// the ones that outlive [PoolConfig::shutdown_timeout].
    pub async fn terminate_all(&mut self, config: &PoolConfig) {
        let processes = std::mem::take(&mut self.processes);
        for (port, process) in processes {
            terminate(&self.spec.name, port, process, config.shutdown_timeout()).await;
        }
    }
}

async fn terminate(name: &str, port: u16, mut process: Process, grace: Duration) {
    if let Err(e) = send_terminate(&process.child) {
        debug!("Unable to send SIGTERM to {name} process on port {port}. {e}");
    }
    match timeout(grace, process.child.wait()).await {
        Ok(Ok(status)) => info!("Terminated {name} process on port {port}, {status}"),
        Ok(Err(e)) => warn!("Unable to wait for {name} process on port {port}. {e}"),
        Err(_) => {
            warn!("{name} process on port {port} didn't stop gracefully, killing it");
            if let Err(e) = process.child.kill().await {
                warn!("Unable to kill {name} process on port {port}. {e}");
            }
        }
    }
}

#[cfg(unix)]
fn send_terminate(child: &Child) -> io::Result<()> {
    // Already reaped, nothing to signal.
    let Some(pid) = child.id() else {
        return Ok(());
    };
    // SAFETY: `pid` is a child of this process that hasn't been reaped yet,
    // so it can't refer to an unrelated process.
    if unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) } == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn send_terminate(_child: &Child) -> io::Result<()> {
    Ok(())
}

/// Renders one nginx `upstream` block per non-empty pool.
pub fn render_upstreams(pools: &[ProcessPool]) -> String {
    let mut upstreams = String::from("# Auto-generated upstream configuration\n\n");
    for pool in pools.iter().filter(|pool| !pool.is_empty()) {
        let _ = writeln!(upstreams, "upstream {}_pool {{", pool.name());
        let _ = writeln!(upstreams, "    least_conn;");
        for port in pool.ports() {
            let _ = writeln!(
                upstreams,
                "    server {} max_fails=3 fail_timeout=10s;",
                pool.addr(port)
            );
        }
        let _ = writeln!(upstreams, "}}\n");
    }
    upstreams
}

/// Runs every configured pool until shutdown.
pub struct PoolManager {
    config: PoolConfig,
    pools: Vec<ProcessPool>,
}

impl PoolManager {
    pub fn new(config: PoolConfig) -> PoolManager {
        let pools = config.pools.iter().cloned().map(ProcessPool::new).collect();
        PoolManager { config, pools }
    }

    pub fn pools(&self) -> &[ProcessPool] {
        &self.pools
    }

    /// Fills every pool, then checks them on every health check interval
    /// until `shutdown` completes. All processes are terminated on exit.
    pub async fn run_until<F>(mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        for pool in &mut self.pools {
            info!("Initializing {} pool", pool.name());
            pool.ensure_min_processes(&self.config).await;
        }
        self.write_upstreams().await;
        info!(
            "All pools initialized, checking health every {}ms",
            self.config.health_check_interval
        );

        let mut ticker = interval(self.config.health_check_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => self.check_pools().await,
            }
        }

        info!("Shutting down the pool manager");
        for pool in &mut self.pools {
            info!("Terminating {} pool", pool.name());
            pool.terminate_all(&self.config).await;
        }
    }

    /// One health check round: drop unhealthy processes, refill and
    /// publish the healthy ports.
    pub async fn check_pools(&mut self) {
        for pool in &mut self.pools {
            let removed = pool.health_check(&self.config).await;
            pool.ensure_min_processes(&self.config).await;
            debug!(
                "Pool {} has {} processes, removed={removed}, ports={:?}",
                pool.name(),
                pool.len(),
                pool.ports()
            );
        }
        self.write_upstreams().await;
    }

    async fn write_upstreams(&self) {
        let Some(path) = &self.config.upstreams_file else {
            return;
        };
        if let Err(e) = tokio::fs::write(path, render_upstreams(&self.pools)).await {
            warn!("Unable to write upstreams file {}. {e}", path.display());
        }
    }
}
