// CLI entry for patchseg
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueHint};
use log::info;
use ndarray::Array2;

use patchseg::backbone::{BackboneConfig, BackboneExtractor, FeatureSource};
use patchseg::fit::{fit_model, sample_patch_rows, FitConfig};
use patchseg::model::ClusterModel;
use patchseg::pipeline::Pipeline;
use patchseg::preprocess::PreprocessConfig;
use patchseg::store::ArtifactStore;

#[derive(Parser, Debug)]
#[command(name = "patchseg", version, about = "Deep-feature region segmentation and cluster diagnostics")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Segment one image and write the full artifact group
    Infer {
        /// Input image path
        #[arg(value_hint = ValueHint::FilePath)]
        image: PathBuf,
        /// Cluster model (JSON)
        #[arg(long, value_hint = ValueHint::FilePath)]
        model: PathBuf,
        /// Backbone network (ONNX)
        #[arg(long, value_hint = ValueHint::FilePath)]
        backbone: PathBuf,
        /// Artifact directory
        #[arg(long, default_value = "static")]
        out_dir: PathBuf,
        /// Request id embedded in the artifact filenames
        #[arg(long)]
        id: Option<String>,
    },
    /// Train a cluster model from a directory of images
    Train {
        /// Directory walked recursively for images
        #[arg(value_hint = ValueHint::DirPath)]
        images: PathBuf,
        /// Backbone network (ONNX)
        #[arg(long, value_hint = ValueHint::FilePath)]
        backbone: PathBuf,
        /// Number of clusters
        #[arg(long, default_value_t = 6)]
        k: usize,
        /// Fraction of patches kept per image for the training sample
        #[arg(long, default_value_t = 0.02)]
        sample_rate: f64,
        /// Seed for sampling and k-means
        #[arg(long, default_value_t = 0)]
        seed: u64,
        /// Output model path
        #[arg(long, default_value = "clusters.json")]
        out_model: PathBuf,
    },
    /// List completed inferences, newest first
    History {
        #[arg(long, default_value = "static")]
        dir: PathBuf,
    },
    /// Delete one inference's artifact group
    Delete {
        id: String,
        #[arg(long, default_value = "static")]
        dir: PathBuf,
    },
    /// Aggregate statistics over the store
    Stats {
        #[arg(long, default_value = "static")]
        dir: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Command::Infer {
            image,
            model,
            backbone,
            out_dir,
            id,
        } => infer(&image, &model, &backbone, &out_dir, id),
        Command::Train {
            images,
            backbone,
            k,
            sample_rate,
            seed,
            out_model,
        } => train(&images, &backbone, k, sample_rate, seed, &out_model),
        Command::History { dir } => history(&dir),
        Command::Delete { id, dir } => delete(&id, &dir),
        Command::Stats { dir } => stats(&dir),
    }
}

fn infer(
    image: &Path,
    model_path: &Path,
    backbone_path: &Path,
    out_dir: &Path,
    id: Option<String>,
) -> Result<()> {
    let model = Arc::new(ClusterModel::load(model_path)?);
    let extractor = Arc::new(BackboneExtractor::new(
        &BackboneConfig::new(backbone_path),
        model.preprocess.clone(),
    )?);
    let pipeline = Pipeline::new(extractor, model)?;

    let store = ArtifactStore::new(out_dir)?;
    let id = id.unwrap_or_else(request_id);
    let paths = store.output_paths(&id);
    let outcome = pipeline.run(image, &paths.overlay())?;

    println!("{}", serde_json::to_string_pretty(&outcome.stats)?);
    println!("overlay: {}", outcome.paths.overlay().display());
    Ok(())
}

fn train(
    images: &Path,
    backbone_path: &Path,
    k: usize,
    sample_rate: f64,
    seed: u64,
    out_model: &Path,
) -> Result<()> {
    let preprocess = PreprocessConfig::default();
    let extractor =
        BackboneExtractor::new(&BackboneConfig::new(backbone_path), preprocess.clone())?;

    let paths = collect_image_paths(images)?;
    if paths.is_empty() {
        bail!("no images found under {}", images.display());
    }
    info!("Found {} images", paths.len());

    let mut sample_rows: Vec<Array2<f32>> = Vec::new();
    for (idx, path) in paths.iter().enumerate() {
        let img = BackboneExtractor::load_rgb(path)
            .with_context(|| format!("decoding {}", path.display()))?;
        let tensor = extractor.extract(&img)?;
        let flat = patchseg::features::flatten_features(&tensor);
        sample_rows.push(sample_patch_rows(&flat, sample_rate, seed.wrapping_add(idx as u64)));
    }

    let total: usize = sample_rows.iter().map(|m| m.nrows()).sum();
    let c = sample_rows[0].ncols();
    let mut stacked = Array2::zeros((total, c));
    let mut offset = 0;
    for block in &sample_rows {
        for (i, row) in block.rows().into_iter().enumerate() {
            for (j, v) in row.iter().enumerate() {
                stacked[[offset + i, j]] = *v;
            }
        }
        offset += block.nrows();
    }
    info!("Training sample: {} rows of {} features", total, c);

    let config = FitConfig {
        k,
        seed,
        ..FitConfig::default()
    };
    let model = fit_model(&stacked, &config, &preprocess)?;
    model.save(out_model)?;
    println!("saved model to {}", out_model.display());
    Ok(())
}

fn history(dir: &Path) -> Result<()> {
    let store = ArtifactStore::new(dir)?;
    for entry in store.history()? {
        let dominant = entry
            .stats
            .iter()
            .max_by(|a, b| a.percentage.total_cmp(&b.percentage))
            .map(|s| format!("{} ({:.1}%)", s.label, s.percentage))
            .unwrap_or_else(|| "-".into());
        println!(
            "{}  {}  dominant: {}",
            entry.id, entry.created_at, dominant
        );
    }
    Ok(())
}

fn delete(id: &str, dir: &Path) -> Result<()> {
    let store = ArtifactStore::new(dir)?;
    let removed = store.delete(id)?;
    println!("deleted {removed} files");
    Ok(())
}

fn stats(dir: &Path) -> Result<()> {
    let store = ArtifactStore::new(dir)?;
    let summary = store.aggregate()?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// Unique request id: nanosecond timestamp plus the process id.
fn request_id() -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!("{:x}-{:x}", nanos, std::process::id())
}

fn collect_image_paths(dir: &Path) -> Result<Vec<PathBuf>> {
    const EXTS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];
    let mut out = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        for entry in std::fs::read_dir(&current)
            .with_context(|| format!("reading {}", current.display()))?
        {
            let path = entry?.path();
            if path.is_dir() {
                stack.push(path);
            } else if path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| EXTS.contains(&e.to_ascii_lowercase().as_str()))
            {
                out.push(path);
            }
        }
    }
    out.sort();
    Ok(out)
}
