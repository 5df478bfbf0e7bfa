//! Sphere-traces trained weights into an image.
//!
//! ```bash
//! siren-render --camera configs/camera.cfg --light configs/light.cfg \
//!     --n-hidden 2 --hidden-size 64 --weights weights.bin --save-to sphere.png
//! ```

use std::path::PathBuf;

use clap::Parser;

use sirensdf::io::load_weights;
use sirensdf::{Camera, Light, RayMarcher, SirenConfig, SirenNetwork};

#[derive(Parser, Debug)]
#[command(name = "siren-render")]
#[command(about = "Render a trained SIREN distance field")]
struct Args {
    /// Width and height in pixels
    #[arg(long, default_value_t = 512)]
    resolution: u32,

    /// Camera config file
    #[arg(long)]
    camera: PathBuf,

    /// Light config file
    #[arg(long)]
    light: PathBuf,

    #[arg(long, default_value_t = sirensdf::DEFAULT_N_HIDDEN)]
    n_hidden: usize,

    #[arg(long, default_value_t = sirensdf::DEFAULT_HIDDEN_SIZE)]
    hidden_size: usize,

    /// Weight file written by siren-train
    #[arg(long)]
    weights: PathBuf,

    /// Output image; the format follows the extension
    #[arg(long)]
    save_to: PathBuf,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let camera = Camera::load(&args.camera)?;
    let light = Light::load(&args.light)?;

    let mut net = SirenNetwork::new(SirenConfig::sdf(args.n_hidden, args.hidden_size, 1))?;
    net.set_weights(&load_weights(&args.weights)?)?;

    log::info!("Rendering with resolution: {}", args.resolution);
    let frame = RayMarcher::new(camera, light).render_parallel(&net, args.resolution, args.resolution)?;

    let image = image::RgbaImage::from_raw(frame.width, frame.height, frame.to_rgba8())
        .ok_or("frame size does not match its pixel buffer")?;
    image.save(&args.save_to)?;
    log::info!("Saved image to {}", args.save_to.display());
    Ok(())
}
