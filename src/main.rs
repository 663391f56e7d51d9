use anyhow::{Context, Result};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use taskmind::backend::FactBackendFactory;
use taskmind::cli::{
    Args, BenchConfig, ConfigDiscovery, ExecutionMode, Query, QueryConfig, ServiceOptions,
    TaskLoader,
};
use taskmind::monitor::OperationMonitor;
use taskmind::service::SchedulerService;
use taskmind::task::{Task, dependency_edges};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mode = match args.mode() {
        Ok(mode) => mode,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let verbose = match &mode {
        ExecutionMode::Query(config) => config.service.verbose,
        ExecutionMode::Health(service) => service.verbose,
        ExecutionMode::Bench(config) => config.service.verbose,
        ExecutionMode::ShowConfig | ExecutionMode::InitConfig => false,
    };
    init_tracing(verbose);

    match mode {
        ExecutionMode::Query(config) => run_query(config).await,
        ExecutionMode::Health(service) => run_health(service).await,
        ExecutionMode::Bench(config) => run_bench(config).await,
        ExecutionMode::ShowConfig => {
            ConfigDiscovery::show_discovery_info();
            Ok(())
        }
        ExecutionMode::InitConfig => {
            let path = ConfigDiscovery::create_default_user_config()?;
            println!("Configuration file: {}", path.display());
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "taskmind=debug" } else { "taskmind=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// A running service together with the monitor it reports to
struct Session {
    service: Arc<SchedulerService>,
    monitor: Arc<OperationMonitor>,
    options: ServiceOptions,
}

impl Session {
    async fn start(options: ServiceOptions) -> Result<Self> {
        let mut config = ConfigDiscovery::load(options.config.as_deref())
            .context("Failed to load configuration")?;
        if options.no_fallback {
            config.service.enable_fallback = false;
        }
        if config.backend.is_enabled() {
            warn!("Backend fault injection is enabled: {:?}", config.backend);
        }

        let monitor = Arc::new(OperationMonitor::new(config.service.monitor.clone()));
        let factory = Arc::new(FactBackendFactory::with_faults(
            config.service.scoring.clone(),
            config.backend.clone(),
        ));
        let service = SchedulerService::new(config.service, factory, Arc::clone(&monitor))
            .await
            .context("Failed to start scheduler service")?;

        Ok(Self {
            service: Arc::new(service),
            monitor,
            options,
        })
    }

    async fn finish(self) -> Result<()> {
        if let Some(path) = &self.options.export {
            self.service
                .export_diagnostics(path)
                .await
                .with_context(|| format!("Failed to export diagnostics to {}", path.display()))?;
            info!("Diagnostics written to {}", path.display());
        }

        self.service.close();
        self.monitor.shutdown().await?;
        Ok(())
    }
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_query(config: QueryConfig) -> Result<()> {
    let tasks = TaskLoader::load_tasks(&config.tasks_file)?;
    info!("Loaded {} tasks from {:?}", tasks.len(), config.tasks_file);

    let session = Session::start(config.service).await?;
    let service = &session.service;

    let outcome = match &config.query {
        Query::Next => service
            .next_recommended_task(&tasks)
            .await
            .map(|next| json!({ "nextTask": next })),
        Query::Ready => service
            .ready_task_ids(&tasks)
            .await
            .map(|ready| json!({ "readyTasks": ready })),
        Query::Cycle(id) => service
            .has_circular_dependency(id, &tasks)
            .await
            .map(|circular| json!({ "taskId": id, "circular": circular })),
        Query::Urgency(id) => service
            .urgency(id, &tasks)
            .await
            .map(|urgency| json!({ "taskId": id, "urgency": urgency })),
        Query::Stats => service.statistics(&tasks).await.map(|stats| json!(stats)),
        Query::Recommend { limit } => Ok(json!(service.recommendations(&tasks, *limit))),
        Query::Graph => service.ready_task_ids(&tasks).await.map(|ready| {
            let edges: Vec<_> = dependency_edges(&tasks)
                .into_iter()
                .map(|(from, to)| json!({ "from": from, "to": to }))
                .collect();
            json!({ "nodes": tasks, "edges": edges, "readyTasks": ready })
        }),
    };

    // Diagnostics are still written when the query itself failed
    let finished = session.finish().await;
    print_json(&outcome?)?;
    finished
}

async fn run_health(options: ServiceOptions) -> Result<()> {
    let session = Session::start(options).await?;

    let probe = session.service.probe().await;
    if !probe.success {
        warn!("Connection probe failed: {:?}", probe.error);
    }
    let status = session.service.service_status().await;

    print_json(&json!({ "probe": probe, "status": status }))?;
    session.finish().await
}

async fn run_bench(config: BenchConfig) -> Result<()> {
    let tasks: Arc<[Task]> = TaskLoader::load_tasks(&config.tasks_file)?.into();
    let session = Session::start(config.service).await?;

    info!(
        "Running {} workers x {} iterations against {} tasks",
        config.workers,
        config.iterations,
        tasks.len()
    );

    let started = Instant::now();
    let mut handles = Vec::with_capacity(config.workers);
    for worker in 0..config.workers {
        let service = Arc::clone(&session.service);
        let tasks = Arc::clone(&tasks);
        let iterations = config.iterations;
        handles.push(tokio::spawn(async move {
            let mut queries = 0u64;
            let mut failures = 0u64;
            for round in 0..iterations {
                let target_id = tasks
                    .get((worker + round) % tasks.len().max(1))
                    .map(|task| task.id.clone());

                let mut results = vec![
                    service.next_recommended_task(&tasks).await.map(|_| ()),
                    service.ready_task_ids(&tasks).await.map(|_| ()),
                ];
                if let Some(id) = target_id {
                    results.push(service.urgency(&id, &tasks).await.map(|_| ()));
                    results.push(service.has_circular_dependency(&id, &tasks).await.map(|_| ()));
                }

                for result in results {
                    queries += 1;
                    if let Err(e) = result {
                        failures += 1;
                        error!("Worker {} query failed: {}", worker, e);
                    }
                }
            }
            (queries, failures)
        }));
    }

    let mut queries = 0u64;
    let mut failures = 0u64;
    for handle in handles {
        let (worker_queries, worker_failures) = handle.await.context("Bench worker panicked")?;
        queries += worker_queries;
        failures += worker_failures;
    }
    let elapsed = started.elapsed();

    let status = session.service.service_status().await;
    print_json(&json!({
        "workers": config.workers,
        "iterations": config.iterations,
        "queries": queries,
        "failures": failures,
        "elapsedMs": elapsed.as_secs_f64() * 1000.0,
        "queriesPerSecond": queries as f64 / elapsed.as_secs_f64().max(f64::EPSILON),
        "status": status,
    }))?;
    session.finish().await
}
