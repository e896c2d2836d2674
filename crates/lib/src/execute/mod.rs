//! Stage graph execution.
//!
//! This module runs a [`StageGraph`] wave by wave:
//! - nodes of one wave run in parallel, bounded by a semaphore
//! - a failed node marks every transitive dependent as skipped
//! - nodes that do not depend on a failure keep running
//! - a dry run reports what would run without touching anything

pub mod actions;
pub mod dag;
pub mod types;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::{self, JoinSet};
use tracing::{debug, error, info, warn};

use crate::driver::StageStatus;

pub use dag::{NodeScope, StageGraph, StageNode};
pub use types::{
  ExecuteConfig, ExecuteError, FailedDependency, NodeOutcome, NodeReport, ProductSummary, RunReport, Stage,
  StageError, StageLabel,
};

/// Runs individual stage nodes for the scheduler.
pub trait StageRunner: Send + Sync + 'static {
  /// Run the stage of `node`. Returns [`StageStatus::Fresh`] when its outputs were already up to date.
  fn run_node(&self, node: &StageNode) -> impl Future<Output = Result<StageStatus, StageError>> + Send;

  /// Whether the outputs of `node` are up to date, without running anything.
  fn is_fresh(&self, node: &StageNode) -> bool;
}

/// Execute every node of `graph`.
///
/// Execution never stops early: after a failure, nodes that do not depend on it keep running,
/// and the report holds one entry per node.
pub async fn execute_graph<R: StageRunner>(
  graph: &StageGraph,
  runner: Arc<R>,
  config: &ExecuteConfig,
) -> Result<RunReport, ExecuteError> {
  info!(node_count = graph.len(), dry_run = config.dry_run, "starting stage execution");

  let waves = graph.waves()?;
  info!(wave_count = waves.len(), "computed execution waves");

  if config.dry_run {
    return Ok(plan_dry_run(graph, &waves, runner.as_ref()));
  }

  let mut report = RunReport::default();
  // Failed or skipped nodes, mapped to the failure that caused them.
  let mut failed: HashMap<StageNode, StageLabel> = HashMap::new();

  let semaphore = Arc::new(Semaphore::new(config.parallelism.max(1)));

  for (wave_idx, wave) in waves.iter().enumerate() {
    debug!(wave = wave_idx, nodes = wave.len(), "executing wave");

    let mut ready = Vec::new();
    for node in wave {
      let failed_dep = graph.dependencies(node).iter().find_map(|dep| failed.get(dep).cloned());

      if let Some(cause) = failed_dep {
        let label = node.label();
        warn!(node = %label, failed_dep = %cause, "skipping stage due to failed dependency");
        failed.insert(node.clone(), cause.clone());
        report.nodes.push(NodeReport {
          label,
          outcome: NodeOutcome::Skipped(FailedDependency(cause)),
          elapsed: Duration::ZERO,
        });
      } else {
        ready.push(node.clone());
      }
    }

    if ready.is_empty() {
      continue;
    }

    for (node, result, elapsed) in execute_wave(&ready, runner.clone(), semaphore.clone()).await {
      let label = node.label();
      let outcome = match result {
        Ok(StageStatus::Built) => {
          info!(node = %label, elapsed = ?elapsed, "stage succeeded");
          NodeOutcome::Built
        }
        Ok(StageStatus::Fresh) => {
          debug!(node = %label, "stage up to date");
          NodeOutcome::Fresh
        }
        Err(e) => {
          error!(node = %label, error = %e, "stage failed");
          failed.insert(node, label.clone());
          NodeOutcome::Failed(e)
        }
      };
      report.nodes.push(NodeReport { label, outcome, elapsed });
    }
  }

  info!(
    built = report.nodes.iter().filter(|n| matches!(n.outcome, NodeOutcome::Built)).count(),
    failed = report.failures().count(),
    skipped = report.skipped().count(),
    "stage execution complete"
  );

  Ok(report)
}

/// Execute a wave of nodes in parallel. Results come back in wave order.
///
/// A task that panics is reported as a failure of its node.
async fn execute_wave<R: StageRunner>(
  nodes: &[StageNode],
  runner: Arc<R>,
  semaphore: Arc<Semaphore>,
) -> Vec<(StageNode, Result<StageStatus, StageError>, Duration)> {
  let mut join_set = JoinSet::new();
  let mut task_index: HashMap<task::Id, usize> = HashMap::with_capacity(nodes.len());

  for (index, node) in nodes.iter().enumerate() {
    let node = node.clone();
    let runner = runner.clone();
    let semaphore = semaphore.clone();

    let handle = join_set.spawn(async move {
      // Acquire semaphore permit inside the task
      let _permit = semaphore.acquire_owned().await.ok();
      let started = Instant::now();
      let result = runner.run_node(&node).await;
      (result, started.elapsed())
    });
    task_index.insert(handle.id(), index);
  }

  let mut results: Vec<Option<(Result<StageStatus, StageError>, Duration)>> = nodes.iter().map(|_| None).collect();
  while let Some(joined) = join_set.join_next_with_id().await {
    match joined {
      Ok((id, outcome)) => {
        if let Some(&index) = task_index.get(&id) {
          results[index] = Some(outcome);
        }
      }
      Err(e) => {
        let Some(&index) = task_index.get(&e.id()) else {
          continue;
        };
        let label = nodes[index].label();
        error!(node = %label, error = %e, "stage task panicked");
        let failure = StageError::Panicked {
          label,
          message: e.to_string(),
        };
        results[index] = Some((Err(failure), Duration::ZERO));
      }
    }
  }

  nodes
    .iter()
    .cloned()
    .zip(results)
    .filter_map(|(node, outcome)| outcome.map(|(result, elapsed)| (node, result, elapsed)))
    .collect()
}

/// A node would run if its own outputs are stale or any dependency would run.
fn plan_dry_run<R: StageRunner>(graph: &StageGraph, waves: &[Vec<StageNode>], runner: &R) -> RunReport {
  let mut report = RunReport {
    nodes: Vec::with_capacity(graph.len()),
    dry_run: true,
  };
  let mut pending: HashMap<StageNode, bool> = HashMap::new();

  for node in waves.iter().flatten() {
    let upstream = graph
      .dependencies(node)
      .iter()
      .any(|dep| pending.get(dep).copied().unwrap_or(false));
    let runs = upstream || !runner.is_fresh(node);
    pending.insert(node.clone(), runs);

    report.nodes.push(NodeReport {
      label: node.label(),
      outcome: if runs { NodeOutcome::Pending } else { NodeOutcome::Fresh },
      elapsed: Duration::ZERO,
    });
  }

  report
}
