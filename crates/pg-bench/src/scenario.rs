//! Benchmark scenarios.
//!
//! Every scenario runs duration-bounded task loops that fire requests and
//! count successes. The single-thread scenarios share one current-thread
//! runtime; the multi-thread scenario starts one current-thread runtime per
//! OS thread so each group of tasks keeps its own reactor, all sharing one
//! pool.

use std::sync::Arc;
use std::time::{Duration, Instant};

use pg_client::{
    request, request_on, ConnectionInfo, ConnectionProvider, Error, FromRow, Query, RowBuffer,
    RowSink, TimeConstraint,
};
use pg_driver_pool::{Pool, PoolConfig};

use crate::queries::{PgType, QueryKind};
use crate::stats::{Report, ReportMeta, Stats};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(1);

/// The named benchmark scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
#[value(rename_all = "snake_case")]
pub enum Scenario {
    /// Fresh connection per request, rows left undecoded.
    ReuseConnectionInfo,
    /// Fresh connection per request, rows decoded into typed values.
    ReuseConnectionInfoAndParseResult,
    /// One connection per task, reused across requests.
    ReuseConnection,
    /// One connection per task, rows decoded into typed values.
    ReuseConnectionAndParseResult,
    /// Connections leased from a shared pool.
    UseConnectionPool,
    /// Pool leases, rows decoded into typed values.
    UseConnectionPoolAndParseResult,
    /// Pool leases from task groups on multiple OS threads.
    UseConnectionPoolMultThreads,
}

impl Scenario {
    /// Stable name for reports.
    pub fn name(self) -> &'static str {
        match self {
            Scenario::ReuseConnectionInfo => "reuse_connection_info",
            Scenario::ReuseConnectionInfoAndParseResult => "reuse_connection_info_and_parse_result",
            Scenario::ReuseConnection => "reuse_connection",
            Scenario::ReuseConnectionAndParseResult => "reuse_connection_and_parse_result",
            Scenario::UseConnectionPool => "use_connection_pool",
            Scenario::UseConnectionPoolAndParseResult => "use_connection_pool_and_parse_result",
            Scenario::UseConnectionPoolMultThreads => "use_connection_pool_mult_threads",
        }
    }
}

/// Run parameters shared by every scenario.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub conninfo: String,
    pub query: QueryKind,
    pub duration: Duration,
    pub coroutines: u32,
    pub threads: u32,
    pub connections: u32,
    pub queue_capacity: u32,
}

impl RunConfig {
    fn pool_config(&self) -> PoolConfig {
        PoolConfig::new()
            .capacity(self.connections)
            .queue_capacity(self.queue_capacity)
            .connect_timeout(CONNECT_TIMEOUT)
            .queue_timeout(REQUEST_TIMEOUT)
    }
}

/// A row sink the benchmark loops can recycle between requests.
trait BenchSink: RowSink + Send {
    fn reset(&mut self);
    fn count(&self) -> usize;
}

impl BenchSink for RowBuffer {
    fn reset(&mut self) {
        self.clear();
    }

    fn count(&self) -> usize {
        self.len()
    }
}

impl<T: FromRow + Send> BenchSink for Vec<T> {
    fn reset(&mut self) {
        self.clear();
    }

    fn count(&self) -> usize {
        self.len()
    }
}

/// Run a scenario to completion and report the counters.
pub fn run(scenario: Scenario, config: RunConfig) -> Result<Report, Error> {
    let stats = Arc::new(Stats::new());
    let started = Instant::now();
    let deadline = started + config.duration;

    match scenario {
        Scenario::UseConnectionPoolMultThreads => run_mult_threads(&config, &stats, deadline)?,
        single_thread => run_single_thread(single_thread, &config, &stats, deadline)?,
    }

    let meta = ReportMeta {
        scenario: scenario.name().to_string(),
        query: config.query.name().to_string(),
        coroutines: config.coroutines,
        threads: config.threads,
        connections: config.connections,
        queue_capacity: config.queue_capacity,
    };
    Ok(stats.report(meta, started.elapsed()))
}

fn run_single_thread(
    scenario: Scenario,
    config: &RunConfig,
    stats: &Arc<Stats>,
    deadline: Instant,
) -> Result<(), Error> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let info = ConnectionInfo::new(config.conninfo.clone());
    let query = config.query.build();

    runtime.block_on(async {
        let mut tasks = Vec::new();
        match scenario {
            Scenario::ReuseConnectionInfo => {
                for _ in 0..config.coroutines {
                    tasks.push(tokio::spawn(provider_loop(
                        info.clone(),
                        query.clone(),
                        deadline,
                        Arc::clone(stats),
                        RowBuffer::new(),
                    )));
                }
            }
            Scenario::ReuseConnectionInfoAndParseResult => {
                for _ in 0..config.coroutines {
                    tasks.push(spawn_parse_loop(
                        info.clone(),
                        config.query,
                        query.clone(),
                        deadline,
                        stats,
                    ));
                }
            }
            Scenario::ReuseConnection => {
                for _ in 0..config.coroutines {
                    tasks.push(tokio::spawn(reuse_loop(
                        info.clone(),
                        query.clone(),
                        deadline,
                        Arc::clone(stats),
                        RowBuffer::new(),
                    )));
                }
            }
            Scenario::ReuseConnectionAndParseResult => {
                for _ in 0..config.coroutines {
                    tasks.push(spawn_reuse_parse_loop(
                        info.clone(),
                        config.query,
                        query.clone(),
                        deadline,
                        stats,
                    ));
                }
            }
            Scenario::UseConnectionPool => {
                let pool = Pool::new(info.clone(), config.pool_config())?;
                let provider = pool.provider();
                for _ in 0..config.coroutines {
                    tasks.push(tokio::spawn(provider_loop(
                        provider.clone(),
                        query.clone(),
                        deadline,
                        Arc::clone(stats),
                        RowBuffer::new(),
                    )));
                }
            }
            Scenario::UseConnectionPoolAndParseResult => {
                let pool = Pool::new(info.clone(), config.pool_config())?;
                let provider = pool.provider();
                for _ in 0..config.coroutines {
                    tasks.push(spawn_parse_loop(
                        provider.clone(),
                        config.query,
                        query.clone(),
                        deadline,
                        stats,
                    ));
                }
            }
            // Dispatched to run_mult_threads by the caller.
            Scenario::UseConnectionPoolMultThreads => {}
        }

        for task in tasks {
            let _ = task.await;
        }
        Ok(())
    })
}

fn run_mult_threads(config: &RunConfig, stats: &Arc<Stats>, deadline: Instant) -> Result<(), Error> {
    let info = ConnectionInfo::new(config.conninfo.clone());
    let pool = Pool::new(info, config.pool_config())?;

    std::thread::scope(|scope| {
        for _ in 0..config.threads {
            let pool = pool.clone();
            let stats = Arc::clone(stats);
            let query = config.query.build();
            let coroutines = config.coroutines;
            scope.spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        tracing::error!(error = %e, "failed to build per-thread runtime");
                        stats.error();
                        return;
                    }
                };
                runtime.block_on(async {
                    let provider = pool.provider();
                    let mut tasks = Vec::new();
                    for _ in 0..coroutines {
                        tasks.push(tokio::spawn(provider_loop(
                            provider.clone(),
                            query.clone(),
                            deadline,
                            Arc::clone(&stats),
                            RowBuffer::new(),
                        )));
                    }
                    for task in tasks {
                        let _ = task.await;
                    }
                });
            });
        }
    });
    Ok(())
}

fn spawn_parse_loop<P>(
    provider: P,
    kind: QueryKind,
    query: Query,
    deadline: Instant,
    stats: &Arc<Stats>,
) -> tokio::task::JoinHandle<()>
where
    P: ConnectionProvider + Send + Sync + 'static,
{
    match kind {
        QueryKind::Simple => tokio::spawn(provider_loop(
            provider,
            query,
            deadline,
            Arc::clone(stats),
            Vec::<(i32,)>::new(),
        )),
        QueryKind::Complex => tokio::spawn(provider_loop(
            provider,
            query,
            deadline,
            Arc::clone(stats),
            Vec::<PgType>::new(),
        )),
    }
}

fn spawn_reuse_parse_loop(
    info: ConnectionInfo,
    kind: QueryKind,
    query: Query,
    deadline: Instant,
    stats: &Arc<Stats>,
) -> tokio::task::JoinHandle<()> {
    match kind {
        QueryKind::Simple => tokio::spawn(reuse_loop(
            info,
            query,
            deadline,
            Arc::clone(stats),
            Vec::<(i32,)>::new(),
        )),
        QueryKind::Complex => tokio::spawn(reuse_loop(
            info,
            query,
            deadline,
            Arc::clone(stats),
            Vec::<PgType>::new(),
        )),
    }
}

/// Fire requests through a provider until the deadline.
///
/// The error is examined before the step is counted; failed requests are not
/// throughput, and a failure ends the task.
async fn provider_loop<P, S>(provider: P, query: Query, deadline: Instant, stats: Arc<Stats>, mut sink: S)
where
    P: ConnectionProvider,
    S: BenchSink,
{
    while Instant::now() < deadline {
        sink.reset();
        match request(
            &provider,
            &query,
            TimeConstraint::In(REQUEST_TIMEOUT),
            &mut sink,
        )
        .await
        {
            Ok(()) => stats.step(sink.count()),
            Err(e) => {
                stats.error();
                tracing::debug!(error = %e, "request failed, task stops");
                break;
            }
        }
    }
}

/// Fire requests over one long-lived connection until the deadline.
async fn reuse_loop<S: BenchSink>(
    info: ConnectionInfo,
    query: Query,
    deadline: Instant,
    stats: Arc<Stats>,
    mut sink: S,
) {
    let mut conn = match info.connect(TimeConstraint::In(CONNECT_TIMEOUT)).await {
        Ok(conn) => conn,
        Err(e) => {
            stats.error();
            tracing::warn!(error = %e, "connect failed, task stops");
            return;
        }
    };
    while Instant::now() < deadline {
        sink.reset();
        match request_on(
            &mut conn,
            &query,
            TimeConstraint::In(REQUEST_TIMEOUT),
            &mut sink,
        )
        .await
        {
            Ok(()) => stats.step(sink.count()),
            Err(e) => {
                stats.error();
                tracing::debug!(error = %e, "request failed, task stops");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenario_names_match_the_cli_surface() {
        assert_eq!(Scenario::ReuseConnectionInfo.name(), "reuse_connection_info");
        assert_eq!(
            Scenario::UseConnectionPoolMultThreads.name(),
            "use_connection_pool_mult_threads"
        );
    }

    #[test]
    fn test_pool_config_uses_run_parameters() {
        let config = RunConfig {
            conninfo: String::new(),
            query: QueryKind::Simple,
            duration: Duration::from_secs(1),
            coroutines: 4,
            threads: 2,
            connections: 8,
            queue_capacity: 16,
        };
        let pool_config = config.pool_config();
        assert_eq!(pool_config.capacity, 8);
        assert_eq!(pool_config.queue_capacity, 16);
    }
}
