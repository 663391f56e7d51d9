//! Command line argument parsing
//!
//! Query subcommands read a task snapshot and print their answer as JSON:
//! - `next`: Recommended next task
//! - `ready`: Tasks whose dependencies are satisfied
//! - `cycle`: Whether a task is part of a dependency cycle
//! - `urgency`: Urgency score of a task
//! - `stats`: Task statistics
//! - `recommend`: Ranked recommendations with reasons
//! - `graph`: Tasks, dependency edges and the ready set
//!
//! Service subcommands:
//! - `health`: Connection probe, pool status and health snapshot
//! - `bench`: Concurrent query load against the connection pool
//! - `show-config`: Show configuration discovery information
//! - `init-config`: Write a default user configuration file

use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, PartialEq)]
pub enum ExecutionMode {
    Query(QueryConfig),
    Health(ServiceOptions),
    Bench(BenchConfig),
    ShowConfig,
    InitConfig,
}

/// A scheduling query against the loaded task snapshot
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Next,
    Ready,
    Cycle(String),
    Urgency(String),
    Stats,
    Recommend { limit: usize },
    Graph,
}

#[derive(Debug, PartialEq)]
pub struct QueryConfig {
    pub query: Query,
    pub tasks_file: PathBuf,
    pub service: ServiceOptions,
}

#[derive(Debug, PartialEq)]
pub struct BenchConfig {
    pub tasks_file: PathBuf,
    pub workers: usize,
    pub iterations: usize,
    pub service: ServiceOptions,
}

/// Options shared by every command that starts the scheduler service
#[derive(Debug, Clone, Default, PartialEq, ClapArgs)]
pub struct ServiceOptions {
    /// Configuration file path
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,
    /// Propagate backend failures instead of answering from the fallback reasoner
    #[arg(long = "no-fallback")]
    pub no_fallback: bool,
    /// Write diagnostics to this file on exit (gzip-compressed for .gz)
    #[arg(long = "export", value_name = "FILE")]
    pub export: Option<PathBuf>,
    /// Enable verbose output
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

#[derive(Debug, Parser)]
#[command(name = "taskmind")]
#[command(author = "Taskmind Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Task reasoning engine: dependency analysis, urgency and scheduling queries")]
#[command(long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Recommend the next task to work on
    Next {
        /// JSON file with the task snapshot
        #[arg(short = 't', long = "tasks")]
        tasks: PathBuf,
        #[command(flatten)]
        service: ServiceOptions,
    },
    /// List tasks that are ready to start
    Ready {
        /// JSON file with the task snapshot
        #[arg(short = 't', long = "tasks")]
        tasks: PathBuf,
        #[command(flatten)]
        service: ServiceOptions,
    },
    /// Check whether a task is part of a dependency cycle
    Cycle {
        /// Task id to check
        id: String,
        /// JSON file with the task snapshot
        #[arg(short = 't', long = "tasks")]
        tasks: PathBuf,
        #[command(flatten)]
        service: ServiceOptions,
    },
    /// Compute the urgency score of a task
    Urgency {
        /// Task id to score
        id: String,
        /// JSON file with the task snapshot
        #[arg(short = 't', long = "tasks")]
        tasks: PathBuf,
        #[command(flatten)]
        service: ServiceOptions,
    },
    /// Show task statistics
    Stats {
        /// JSON file with the task snapshot
        #[arg(short = 't', long = "tasks")]
        tasks: PathBuf,
        #[command(flatten)]
        service: ServiceOptions,
    },
    /// Rank tasks with the reasons behind each recommendation
    Recommend {
        /// JSON file with the task snapshot
        #[arg(short = 't', long = "tasks")]
        tasks: PathBuf,
        /// Maximum number of recommendations
        #[arg(short = 'l', long = "limit", default_value_t = 5)]
        limit: usize,
        #[command(flatten)]
        service: ServiceOptions,
    },
    /// Print the dependency graph with the ready set
    Graph {
        /// JSON file with the task snapshot
        #[arg(short = 't', long = "tasks")]
        tasks: PathBuf,
        #[command(flatten)]
        service: ServiceOptions,
    },
    /// Probe a backend connection and report service health
    Health {
        #[command(flatten)]
        service: ServiceOptions,
    },
    /// Run concurrent queries against the connection pool
    Bench {
        /// JSON file with the task snapshot
        #[arg(short = 't', long = "tasks")]
        tasks: PathBuf,
        /// Concurrent workers
        #[arg(short = 'w', long = "workers", default_value_t = 8)]
        workers: usize,
        /// Query rounds per worker
        #[arg(short = 'i', long = "iterations", default_value_t = 25)]
        iterations: usize,
        #[command(flatten)]
        service: ServiceOptions,
    },
    /// Show configuration discovery information
    ShowConfig,
    /// Create a default configuration file in the user's home directory
    InitConfig,
}

impl Args {
    pub fn parse() -> Self {
        Parser::parse()
    }

    pub fn mode(&self) -> Result<ExecutionMode, String> {
        let query = |query: Query, tasks: &PathBuf, service: &ServiceOptions| {
            Ok(ExecutionMode::Query(QueryConfig {
                query,
                tasks_file: tasks.clone(),
                service: service.clone(),
            }))
        };

        match &self.command {
            Some(Commands::Next { tasks, service }) => query(Query::Next, tasks, service),
            Some(Commands::Ready { tasks, service }) => query(Query::Ready, tasks, service),
            Some(Commands::Cycle { id, tasks, service }) => {
                query(Query::Cycle(id.clone()), tasks, service)
            }
            Some(Commands::Urgency { id, tasks, service }) => {
                query(Query::Urgency(id.clone()), tasks, service)
            }
            Some(Commands::Stats { tasks, service }) => query(Query::Stats, tasks, service),
            Some(Commands::Recommend {
                tasks,
                limit,
                service,
            }) => query(Query::Recommend { limit: *limit }, tasks, service),
            Some(Commands::Graph { tasks, service }) => query(Query::Graph, tasks, service),
            Some(Commands::Health { service }) => Ok(ExecutionMode::Health(service.clone())),
            Some(Commands::Bench {
                tasks,
                workers,
                iterations,
                service,
            }) => {
                if *workers == 0 || *iterations == 0 {
                    return Err("bench needs at least one worker and one iteration".to_string());
                }
                Ok(ExecutionMode::Bench(BenchConfig {
                    tasks_file: tasks.clone(),
                    workers: *workers,
                    iterations: *iterations,
                    service: service.clone(),
                }))
            }
            Some(Commands::ShowConfig) => Ok(ExecutionMode::ShowConfig),
            Some(Commands::InitConfig) => Ok(ExecutionMode::InitConfig),
            None => Err(
                "No command specified. Use 'taskmind --help' to see available commands."
                    .to_string(),
            ),
        }
    }
}
