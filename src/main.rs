use std::{
    env,
    fs::{self, File},
    io::BufWriter,
    process, thread,
};

use anyhow::{Context, Result, anyhow, bail};
use log::{error, info, warn};
use ndarray::{Array1, Array2};
use serde::Deserialize;

use random_effect::{
    ConsumerPool, Job, JobQueue, PoolConfig, ResultStore,
    export::{self, LOGISTIC_REGRESSION_CLASS, ModelRecord},
};

/// One entity's training data as read from the jobs file.
#[derive(Debug, Deserialize)]
struct JobSpec {
    entity_id: String,
    features: Vec<Vec<f64>>,
    labels: Vec<f64>,
    weights: Option<Vec<f64>>,
    offsets: Option<Vec<f64>>,
    /// Defaults to `0..cols`.
    unique_global_indices: Option<Vec<usize>>,
}

impl JobSpec {
    fn into_job(self) -> Result<Job<String>> {
        let rows = self.features.len();
        let cols = self.features.first().map_or(0, Vec::len);
        let ragged = self.features.iter().enumerate().find(|(_, r)| r.len() != cols);
        if let Some((i, row)) = ragged {
            bail!(
                "feature row {i} of entity {} has {} values, expected {cols}",
                self.entity_id,
                row.len()
            );
        }

        let flat: Vec<f64> = self.features.into_iter().flatten().collect();

        let features = Array2::from_shape_vec((rows, cols), flat)
            .with_context(|| format!("bad feature matrix for entity {}", self.entity_id))?;
        let indices = self
            .unique_global_indices
            .unwrap_or_else(|| (0..cols).collect());

        let job = Job::new(
            self.entity_id,
            features,
            Array1::from(self.labels),
            self.weights.map(Array1::from),
            self.offsets.map(Array1::from),
            indices,
        )?;

        Ok(job)
    }
}

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() != 5 {
        eprintln!(
            "Usage: {} <pool-config.json> <jobs.json> <feature-list> <out.jsonl>",
            args[0]
        );
        process::exit(1);
    }

    if let Err(e) = run(&args[1], &args[2], &args[3], &args[4]) {
        error!("{e:#}");
        process::exit(1);
    }
}

fn run(config_path: &str, jobs_path: &str, features_path: &str, out_path: &str) -> Result<()> {
    let cfg = PoolConfig::from_json_file(config_path)
        .with_context(|| format!("failed to load pool config from {config_path}"))?;
    let feature_list = export::read_feature_list(features_path)
        .with_context(|| format!("failed to read feature list from {features_path}"))?;

    let jobs: Vec<JobSpec> = serde_json::from_str(
        &fs::read_to_string(jobs_path).with_context(|| format!("failed to read {jobs_path}"))?,
    )
    .with_context(|| format!("failed to parse jobs from {jobs_path}"))?;
    let jobs = jobs
        .into_iter()
        .map(JobSpec::into_job)
        .collect::<Result<Vec<_>>>()?;

    info!(
        consumers = cfg.consumers.get(), jobs = jobs.len(), features = feature_list.len();
        "loaded training run"
    );

    let queue = JobQueue::new(cfg.queue_capacity);
    let store = ResultStore::new(cfg.store_shards);
    let pool = ConsumerPool::new(&cfg)?;

    let reports = thread::scope(|s| {
        let producer = s.spawn(|| {
            for job in jobs {
                queue.push(job)?;
            }
            queue.close();
            random_effect::Result::Ok(())
        });

        let reports = pool.run(&queue, &store);
        // Releases the producer if the consumers gave up first.
        queue.close();

        match producer.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("producer stopped early, the export is partial: {e}"),
            Err(_) => return Err(anyhow!("producer thread panicked")),
        }

        Ok(reports?)
    })?;

    let failed: usize = reports.iter().map(|r| r.failed).sum();
    if failed > 0 {
        info!("{failed} training jobs failed and were skipped");
    }

    let mut results: Vec<_> = store.into_results().into_iter().collect();
    results.sort_by(|(a, _), (b, _)| a.cmp(b));

    let records = results
        .iter()
        .map(|(id, result)| {
            ModelRecord::from_result(id.as_str(), LOGISTIC_REGRESSION_CLASS, result, &feature_list)
        })
        .collect::<random_effect::Result<Vec<_>>>()?;

    let out = File::create(out_path).with_context(|| format!("failed to create {out_path}"))?;
    let written = export::write_models(BufWriter::new(out), &records)?;
    info!("exported {written} models to {out_path}");

    Ok(())
}
