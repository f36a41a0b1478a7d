//! Training commands: load data, train, evaluate, report.

use anyhow::Context;

use crate::cli::args::{Commands, RunArgs};
use crate::clustering::{Clusterer, PartitionClusterer, TopologicalClusterer};
use crate::config::Settings;
use crate::dataset::Dataset;
use crate::evaluation::{PartitionAssignment, PrefetchEvaluator};
use crate::report::RunReport;

/// Fold command-line overrides into the loaded settings and re-validate.
pub fn apply_overrides(settings: &mut Settings, command: &Commands) -> anyhow::Result<()> {
    let run = match command {
        Commands::Kmeans {
            run,
            k,
            max_iterations,
            training_index,
        } => {
            if let Some(k) = k {
                settings.kmeans.k = *k;
            }
            if let Some(max) = max_iterations {
                settings.kmeans.max_iterations = *max;
            }
            if *training_index {
                settings.evaluation.partition_assignment = PartitionAssignment::TrainingIndex;
            }
            run
        }
        Commands::Som {
            run,
            grid,
            epochs,
            learning_rate,
        } => {
            if let Some(grid) = grid {
                settings.som.grid_size = *grid;
            }
            if let Some(epochs) = epochs {
                settings.som.epochs = *epochs;
            }
            if let Some(rate) = learning_rate {
                settings.som.initial_learning_rate = *rate;
            }
            run
        }
        Commands::Init { .. } | Commands::Config => return Ok(()),
    };

    if let Some(threshold) = run.threshold {
        settings.evaluation.prefetch_threshold = threshold;
    }
    if let Some(seed) = run.seed {
        settings.seed = Some(seed);
    }
    settings.validate().context("invalid settings")?;
    Ok(())
}

fn load_datasets(run: &RunArgs) -> anyhow::Result<(Dataset, Dataset)> {
    let train = Dataset::load(&run.train)
        .with_context(|| format!("cannot load training data from {}", run.train.display()))?;
    let test = Dataset::load(&run.test)
        .with_context(|| format!("cannot load test data from {}", run.test.display()))?;
    Ok((train, test))
}

pub fn run_kmeans(settings: &Settings, run: &RunArgs) -> anyhow::Result<RunReport> {
    let (train, test) = load_datasets(run)?;

    let mut clusterer = PartitionClusterer::from_settings(&train, settings)?;
    let summary = clusterer.train().context("k-means training failed")?;
    let evaluation = PrefetchEvaluator::from_config(&settings.evaluation)
        .evaluate(&clusterer, &test)
        .context("evaluation failed")?;

    Ok(RunReport::collect(
        "kmeans",
        clusterer.seed(),
        &clusterer,
        summary,
        evaluation,
    ))
}

pub fn run_som(settings: &Settings, run: &RunArgs) -> anyhow::Result<RunReport> {
    let (train, test) = load_datasets(run)?;

    let mut clusterer = TopologicalClusterer::from_settings(&train, settings)?;
    let summary = clusterer.train().context("SOM training failed")?;
    let evaluation = PrefetchEvaluator::from_config(&settings.evaluation)
        .evaluate(&clusterer, &test)
        .context("evaluation failed")?;

    Ok(RunReport::collect("som", clusterer.seed(), &clusterer, summary, evaluation)
        .with_learning_rate(clusterer.initial_learning_rate()))
}

/// Print a report to stdout as text or JSON.
pub fn emit(report: &RunReport, run: &RunArgs) -> anyhow::Result<()> {
    if run.json {
        let json = serde_json::to_string_pretty(report).context("cannot serialize report")?;
        println!("{json}");
    } else {
        print!("{}", report.render_text(run.show_members, run.show_prototypes));
    }
    Ok(())
}
