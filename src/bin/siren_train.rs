//! Trains a SIREN on a point/label file and writes its weights.
//!
//! ```bash
//! siren-train --n-hidden 2 --hidden-size 64 --batch-size 512 \
//!     --train-sample data/sphere.bin --train-cfg configs/train.cfg \
//!     --save-to weights.bin --test-sample data/sphere_test.bin
//! ```

use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use sirensdf::io::{load_points, save_weights};
use sirensdf::train::{batchify, evaluate, Trainer};
use sirensdf::{create_backend, BackendKind, SirenConfig, TrainConfig};

#[derive(Parser, Debug)]
#[command(name = "siren-train")]
#[command(about = "Fit a SIREN network to signed-distance samples")]
struct Args {
    /// Number of hidden layers
    #[arg(long, default_value_t = sirensdf::DEFAULT_N_HIDDEN)]
    n_hidden: usize,

    /// Width of every hidden layer
    #[arg(long, default_value_t = sirensdf::DEFAULT_HIDDEN_SIZE)]
    hidden_size: usize,

    /// Batch size (also the network's batch capacity)
    #[arg(long, default_value_t = sirensdf::DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Training points and labels
    #[arg(long)]
    train_sample: PathBuf,

    /// `key = value` file with lr, n_epochs and log_every_n_epochs
    #[arg(long)]
    train_cfg: PathBuf,

    /// Where to write the trained weights
    #[arg(long)]
    save_to: PathBuf,

    /// Held-out points to report MSE on
    #[arg(long)]
    test_sample: Option<PathBuf>,

    /// cpu or gpu
    #[arg(long, default_value = "cpu")]
    backend: BackendKind,

    /// Seed for weight init and batch order
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    log::info!(
        "Network setup: n_hidden = {}, hidden_size = {}, batch_size = {}",
        args.n_hidden,
        args.hidden_size,
        args.batch_size
    );

    let train_cfg = TrainConfig::load(&args.train_cfg)?;
    let cloud = load_points(&args.train_sample)?;
    let batches = batchify(&cloud, args.batch_size)?;

    let mut config = SirenConfig::sdf(args.n_hidden, args.hidden_size, args.batch_size);
    config.init_seed = args.seed;
    let mut net = create_backend(args.backend, config)?;

    let mut trainer = match args.seed {
        Some(seed) => Trainer::with_seed(train_cfg.clone(), seed)?,
        None => Trainer::new(train_cfg.clone())?,
    };

    let pb = ProgressBar::new(train_cfg.n_epochs as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    let start = Instant::now();
    let history = trainer.fit_with_callback(net.as_mut(), &batches, |stats| {
        pb.set_message(format!("loss {:.6}", stats.mean_loss));
        pb.inc(1);
    })?;
    pb.finish_with_message(format!(
        "final loss {:.6}",
        history.final_loss().unwrap_or(f32::NAN)
    ));
    log::info!("Training took {:.3}s", start.elapsed().as_secs_f64());

    save_weights(&args.save_to, &net.get_weights()?)?;
    log::info!("Saved weights to {}", args.save_to.display());

    if let Some(path) = &args.test_sample {
        let test = batchify(&load_points(path)?, args.batch_size)?;
        let loss = evaluate(net.as_mut(), &test)?;
        log::info!("Test MSE: {loss}");
    }
    Ok(())
}
