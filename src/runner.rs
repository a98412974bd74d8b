//! Workload coordinator and per-worker execution loop.

use crate::config::Config;
use crate::workload;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{ConnectOptions, Connection};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Final score for a run: queries per second and wall-clock milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunOutcome {
    pub throughput: f64,
    pub total_time_ms: u64,
}

#[derive(Debug, Clone, Copy)]
struct WorkerResult {
    executed: u64,
    elapsed_ms: u64,
}

/// Each worker id is written at most once, by its own worker; the coordinator
/// reads the map only after the join loop.
type ResultMap = Arc<Mutex<HashMap<usize, WorkerResult>>>;

pub struct WorkloadRunner {
    config: Config,
    buckets: Vec<Vec<String>>,
    verbose: bool,
}

impl WorkloadRunner {
    /// Load the workload file and split it round-robin across the configured
    /// worker count. Unreadable workload files abort startup.
    pub fn new(config: Config, verbose: bool) -> Result<Self, Box<dyn std::error::Error>> {
        let statements = workload::load_statements(&config.workload.workload_path)?;
        println!(
            "Loaded {} queries, {} threads",
            statements.len(),
            config.workload.threads
        );
        let buckets = workload::partition(statements, config.workload.threads);

        Ok(Self {
            config,
            buckets,
            verbose,
        })
    }

    fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.config.database.host)
            .port(self.config.database.port)
            .username(&self.config.database.user)
            .password(&self.config.database.password)
            .database(&self.config.database.db)
    }

    async fn connect(&self) -> Result<PgConnection, sqlx::Error> {
        self.connect_options().connect().await
    }

    /// Best-effort termination of every active backend session on this
    /// database except our own. This is the hard stop for statements that
    /// never reach the cooperative flag check.
    async fn cancel_active_queries(&self) -> Result<(), sqlx::Error> {
        let mut conn = self.connect().await?;
        sqlx::query(
            "SELECT pg_terminate_backend(pid)
             FROM pg_stat_activity
             WHERE datname = $1
               AND state = 'active'
               AND pid <> pg_backend_pid()",
        )
        .bind(&self.config.database.db)
        .execute(&mut conn)
        .await?;
        conn.close().await?;
        println!("All active queries terminated");
        Ok(())
    }

    /// Execute the whole workload and return the aggregated score.
    ///
    /// The timeout budget is measured from the moment the first worker is
    /// started; every join call receives whatever remains of that budget, so
    /// joins issued after the deadline return immediately.
    pub async fn run(&self) -> Result<RunOutcome, Box<dyn std::error::Error>> {
        let timeout = Duration::from_secs(self.config.workload.timeout);
        let stop = Arc::new(AtomicBool::new(false));
        let results: ResultMap = Arc::new(Mutex::new(HashMap::new()));

        // One dedicated connection per worker, all opened before any worker
        // starts. A connection failure here is fatal.
        let mut connections = Vec::with_capacity(self.buckets.len());
        for _ in 0..self.buckets.len() {
            connections.push(self.connect().await?);
        }

        let start = Instant::now();
        let deadline = tokio::time::Instant::now() + timeout;

        let mut handles = Vec::with_capacity(self.buckets.len());
        for (worker_id, (conn, statements)) in connections
            .into_iter()
            .zip(self.buckets.iter().cloned())
            .enumerate()
        {
            let stop = stop.clone();
            let results = results.clone();
            let verbose = self.verbose;
            handles.push(tokio::spawn(run_worker(
                worker_id, conn, statements, stop, results, verbose,
            )));
        }

        for mut handle in handles {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => eprintln!("worker task failed: {}", e),
                // Still running past the deadline; abandoned, not aborted.
                Err(_) => {}
            }
        }

        if start.elapsed() >= timeout {
            println!(
                "\nTIMEOUT ({}s) - Canceling queries...",
                self.config.workload.timeout
            );
            stop.store(true, Ordering::Relaxed);
            if let Err(e) = self.cancel_active_queries().await {
                eprintln!("Error canceling queries: {}", e);
            }
        }

        let elapsed_ms = start.elapsed().as_millis() as u64;
        let total_queries: u64 = match results.lock() {
            Ok(map) => map.values().map(|r| r.executed).sum(),
            Err(_) => 0,
        };

        Ok(summarize(total_queries, elapsed_ms, self.config.workload.timeout))
    }
}

/// Run one worker to completion: execute its slice in order, committing after
/// each statement, stopping at the next statement boundary once the stop flag
/// is set. A statement error ends the worker with no result entry.
async fn run_worker(
    worker_id: usize,
    mut conn: PgConnection,
    statements: Vec<String>,
    stop: Arc<AtomicBool>,
    results: ResultMap,
    verbose: bool,
) {
    let start = Instant::now();
    let mut executed: u64 = 0;

    for (i, sql) in statements.iter().enumerate() {
        if stop.load(Ordering::Relaxed) {
            println!("Thread {} stopped by timeout", worker_id);
            break;
        }

        let single_start = Instant::now();
        if let Err(e) = execute_statement(&mut conn, sql).await {
            eprintln!("Thread {} error: {}", worker_id, e);
            let _ = conn.close().await;
            return;
        }
        executed += 1;

        if verbose {
            println!(
                "Thread {}: Query {} executed in {}ms",
                worker_id,
                i + 1,
                single_start.elapsed().as_millis()
            );
        }
    }

    let elapsed_ms = start.elapsed().as_millis() as u64;
    if let Ok(mut map) = results.lock() {
        map.insert(
            worker_id,
            WorkerResult {
                executed,
                elapsed_ms,
            },
        );
    }
    let _ = conn.close().await;
}

async fn execute_statement(conn: &mut PgConnection, sql: &str) -> Result<(), sqlx::Error> {
    let mut tx = conn.begin().await?;
    sqlx::query(sql).execute(&mut *tx).await?;
    tx.commit().await?;
    Ok(())
}

/// Collapse the per-worker counts into the final score. A run that completed
/// nothing gets a synthetic worst case of twice the timeout, so it ranks
/// strictly below any real slow run in downstream comparisons.
fn summarize(total_queries: u64, elapsed_ms: u64, timeout_secs: u64) -> RunOutcome {
    let throughput = if elapsed_ms > 0 {
        total_queries as f64 / (elapsed_ms as f64 / 1000.0)
    } else {
        0.0
    };

    if total_queries == 0 || throughput == 0.0 {
        let penalty_time_ms = timeout_secs * 2 * 1000;
        println!("\n{}", "=".repeat(50));
        println!("WORKLOAD FAILED - No queries completed!");
        println!("Applying penalty: throughput=0, time={}ms", penalty_time_ms);
        println!("{}", "=".repeat(50));
        return RunOutcome {
            throughput: 0.0,
            total_time_ms: penalty_time_ms,
        };
    }

    println!("\n{}", "=".repeat(50));
    println!("Total queries: {}", total_queries);
    println!("Total execution time: {}ms", elapsed_ms);
    println!("Throughput: {:.2} queries/sec", throughput);
    println!("{}", "=".repeat(50));

    RunOutcome {
        throughput,
        total_time_ms: elapsed_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DatabaseConfig, WorkloadConfig};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn test_config(workload_path: std::path::PathBuf, threads: usize) -> Config {
        Config {
            database: DatabaseConfig {
                db: "benchbase".to_string(),
                user: "admin".to_string(),
                password: "secret".to_string(),
                host: "localhost".to_string(),
                port: 5432,
            },
            workload: WorkloadConfig {
                workload_path,
                threads,
                timeout: 5,
            },
        }
    }

    #[test]
    fn runner_buckets_match_thread_count() {
        let mut file = NamedTempFile::new().unwrap();
        for i in 0..10 {
            writeln!(file, "SELECT {};", i).unwrap();
        }

        let runner =
            WorkloadRunner::new(test_config(file.path().to_path_buf(), 3), false).unwrap();
        assert_eq!(runner.buckets.len(), 3);
        assert_eq!(
            runner.buckets.iter().map(Vec::len).collect::<Vec<_>>(),
            vec![4, 3, 3]
        );
    }

    #[test]
    fn missing_workload_fails_construction() {
        let config = test_config("/nonexistent/wg.sql".into(), 2);
        assert!(WorkloadRunner::new(config, false).is_err());
    }

    #[test]
    fn zero_completed_queries_yields_penalty() {
        let outcome = summarize(0, 1234, 5);
        assert_eq!(
            outcome,
            RunOutcome {
                throughput: 0.0,
                total_time_ms: 10_000,
            }
        );
    }

    #[test]
    fn zero_elapsed_yields_penalty() {
        let outcome = summarize(42, 0, 600);
        assert_eq!(
            outcome,
            RunOutcome {
                throughput: 0.0,
                total_time_ms: 1_200_000,
            }
        );
    }

    #[test]
    fn normal_run_reports_queries_per_second() {
        let outcome = summarize(100, 2000, 600);
        assert_eq!(outcome.total_time_ms, 2000);
        assert!((outcome.throughput - 50.0).abs() < f64::EPSILON);
    }
}
