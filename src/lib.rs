// src/lib.rs

pub mod cli;
pub mod computation;
pub mod config;
pub mod context;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod logging;
pub mod runtime;
pub mod stream;
pub mod types;

use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::computation::{BufferIdentity, CallValue, DeviceArray, KernelId};
use crate::config::loader::load_and_validate;
use crate::config::model::{Workload, WorkloadArg, WorkloadStep};
use crate::context::{ComputationHandle, ContextSummary, ExecutionContext};
use crate::engine::{Session, SessionHandle};
use crate::runtime::SimulatedRuntime;

/// High-level entry point used by `main.rs`.
///
/// Loads the workload, replays it through a [`Session`] backed by a
/// [`SimulatedRuntime`], then prints where every computation ended up.
pub async fn run(args: CliArgs) -> Result<()> {
    let mut workload = load_and_validate(&args.workload)
        .with_context(|| format!("loading workload {}", args.workload.display()))?;

    if let Some(policy) = args.dependency_policy {
        workload.config.dependency_policy = policy;
    }
    if let Some(policy) = args.issue_policy {
        workload.config.issue_policy = policy;
    }

    if args.dry_run {
        print_dry_run(&workload);
        return Ok(());
    }

    let runtime = Arc::new(SimulatedRuntime::new());
    let ctx = ExecutionContext::new(runtime.clone(), workload.context_options());
    let (session, handle) = Session::new(ctx, 64);
    let session_task = tokio::spawn(session.run());

    let replayed = replay(&workload, &handle).await;
    let summary = handle.summary().await?;
    handle.shutdown().await?;
    let ctx = session_task.await?;
    let handles = replayed?;

    if let Some(path) = &args.dot {
        fs::write(path, ctx.dag().to_dot())
            .with_context(|| format!("writing DOT to {}", path.display()))?;
        info!(path = %path.display(), "wrote DAG");
    }

    print_report(&workload, &handles, &summary, &runtime.executed()?);
    Ok(())
}

/// Submit every step, then wait for all of them.
async fn replay(workload: &Workload, handle: &SessionHandle) -> Result<Vec<ComputationHandle>> {
    let mut arrays: BTreeMap<&str, DeviceArray> = BTreeMap::new();
    for (name, spec) in &workload.arrays {
        let array = handle.allocate_array(spec.element_type, spec.len).await?;
        debug!(array = %name, buffer = %array.buffer_id(), "allocated array");
        arrays.insert(name.as_str(), array);
    }

    let mut kernels: BTreeMap<&str, KernelId> = BTreeMap::new();
    for (name, spec) in &workload.kernels {
        let id = handle.declare_kernel(name, &spec.signature).await?;
        kernels.insert(name.as_str(), id);
    }

    let mut handles = Vec::with_capacity(workload.steps.len());
    for step in &workload.steps {
        let submitted = match step {
            WorkloadStep::Launch {
                kernel,
                args,
                config,
            } => {
                let values = args
                    .iter()
                    .map(|arg| call_value(arg, &arrays))
                    .collect::<Result<Vec<_>>>()?;
                let id = *kernels
                    .get(kernel.as_str())
                    .with_context(|| format!("kernel '{kernel}' was not declared"))?;
                handle.launch(id, *config, values).await?
            }
            WorkloadStep::Access { array, write } => {
                let array = arrays
                    .get(array.as_str())
                    .with_context(|| format!("array '{array}' was not allocated"))?;
                handle.access_array(array, *write).await?
            }
        };
        handles.push(submitted);
    }

    handle.synchronize().await?;
    for (step, h) in workload.steps.iter().zip(&handles) {
        if let Err(e) = handle.wait(*h).await {
            warn!(vertex = h.vertex(), step = %step.describe(), error = %e, "step failed");
        }
    }
    Ok(handles)
}

fn call_value(arg: &WorkloadArg, arrays: &BTreeMap<&str, DeviceArray>) -> Result<CallValue> {
    Ok(match arg {
        WorkloadArg::Array(name) => arrays
            .get(name.as_str())
            .with_context(|| format!("array '{name}' was not allocated"))?
            .into(),
        WorkloadArg::Int(v) => CallValue::Int(*v),
        WorkloadArg::Float(v) => CallValue::Float(*v),
        WorkloadArg::Bool(v) => CallValue::Bool(*v),
    })
}

fn print_report(
    workload: &Workload,
    handles: &[ComputationHandle],
    summary: &ContextSummary,
    executed: &[String],
) {
    println!("streamdag replay");
    println!(
        "  dependency_policy = {:?}, issue_policy = {:?}",
        workload.config.dependency_policy, workload.config.issue_policy
    );
    println!();
    for (index, (step, h)) in workload.steps.iter().zip(handles).enumerate() {
        println!("  step {index:>3} -> vertex {:<3} {}", h.vertex(), step.describe());
    }
    println!();
    print!("{summary}");
    println!("streams used: {}", summary.streams_used());
    println!("executed: {}", executed.len());
}

/// Print the validated workload without scheduling anything.
fn print_dry_run(workload: &Workload) {
    println!("streamdag dry-run");
    println!("  config.dependency_policy = {:?}", workload.config.dependency_policy);
    println!("  config.issue_policy = {:?}", workload.config.issue_policy);
    println!("  config.batch_size = {}", workload.config.batch_size);
    if let Some(max) = workload.config.max_streams {
        println!("  config.max_streams = {max}");
    }
    println!();

    println!("arrays ({}):", workload.arrays.len());
    for (name, spec) in &workload.arrays {
        println!("  - {name}: {} x {}", spec.element_type, spec.len);
    }
    println!("kernels ({}):", workload.kernels.len());
    for (name, spec) in &workload.kernels {
        println!("  - {name}({})", spec.signature);
    }
    println!("steps ({}):", workload.steps.len());
    for (index, step) in workload.steps.iter().enumerate() {
        println!("  {index:>3}: {}", step.describe());
    }

    debug!("dry-run complete (nothing scheduled)");
}
