//! `neural-style` CLI - Render a content image in the style of other images.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use neural_style::{
    AdamParams, Config, InitImage, LayerId, LbfgsParams, LogObserver, OptimizerKind, Pipeline,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OptimizerArg {
    Lbfgs,
    Adam,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum InitArg {
    Content,
    Style,
    Random,
}

/// Neural style transfer over a frozen VGG19 feature extractor.
#[derive(Parser, Debug)]
#[command(name = "neural-style")]
#[command(version, about, long_about = None)]
struct Args {
    /// Content image filename.
    #[arg(long, value_name = "FILE")]
    content_img: PathBuf,

    /// Directory holding the content image.
    #[arg(long, default_value = "./image_input", value_name = "DIR")]
    content_img_dir: PathBuf,

    /// Style image filenames.
    #[arg(long, required = true, num_args = 1.., value_name = "FILE")]
    style_imgs: Vec<PathBuf>,

    /// Directory holding the style images.
    #[arg(long, default_value = "./styles", value_name = "DIR")]
    style_imgs_dir: PathBuf,

    /// Blend weight of each style image. Defaults to equal weights.
    #[arg(long, num_args = 1.., value_name = "FLOAT")]
    style_imgs_weights: Vec<f64>,

    /// Output filename. Derived from the inputs when omitted.
    #[arg(long, value_name = "NAME")]
    img_name: Option<String>,

    /// Maximum width or height of the input images.
    #[arg(long, default_value = "512", value_name = "INT")]
    max_size: usize,

    /// Weight of the content loss.
    #[arg(long, default_value = "5.0", value_name = "FLOAT")]
    content_weight: f64,

    /// Weight of the style loss.
    #[arg(long, default_value = "1e4", value_name = "FLOAT")]
    style_weight: f64,

    /// Weight of the total-variation loss.
    #[arg(long, default_value = "1e-3", value_name = "FLOAT")]
    tv_weight: f64,

    /// Layers used for the content image.
    #[arg(long, num_args = 1.., default_values = ["conv4_2"], value_name = "LAYER")]
    content_layers: Vec<String>,

    /// Layers used for the style images.
    #[arg(
        long,
        num_args = 1..,
        default_values = ["relu1_1", "relu2_1", "relu3_1", "relu4_1", "relu5_1"],
        value_name = "LAYER"
    )]
    style_layers: Vec<String>,

    /// Contribution of each content layer.
    #[arg(long, num_args = 1.., default_values_t = [1.0], value_name = "FLOAT")]
    content_layer_weights: Vec<f64>,

    /// Contribution of each style layer.
    #[arg(long, num_args = 1.., default_values_t = [0.2; 5], value_name = "FLOAT")]
    style_layer_weights: Vec<f64>,

    /// Path to the VGG19 weight archive (.npz).
    #[arg(long, default_value = "imagenet-vgg-verydeep-19.npz", value_name = "FILE")]
    model_weights: PathBuf,

    /// Root directory for outputs.
    #[arg(long, default_value = "./image_output", value_name = "DIR")]
    img_output_dir: PathBuf,

    /// Optimization strategy.
    #[arg(long, value_enum, default_value = "lbfgs")]
    optimizer: OptimizerArg,

    /// Adam step size.
    #[arg(long, default_value = "10.0", value_name = "FLOAT")]
    learning_rate: f64,

    /// Adam first moment decay rate.
    #[arg(long, default_value = "0.9", value_name = "FLOAT")]
    beta1: f64,

    /// Adam second moment decay rate.
    #[arg(long, default_value = "0.999", value_name = "FLOAT")]
    beta2: f64,

    /// Adam numerical stability constant.
    #[arg(long, default_value = "1e-8", value_name = "FLOAT")]
    epsilon: f64,

    /// Correction pairs kept by L-BFGS.
    #[arg(long, default_value = "10", value_name = "INT")]
    lbfgs_history: usize,

    /// Number of optimization blocks; images are saved between blocks.
    #[arg(long, default_value = "1", value_name = "INT")]
    blocks: usize,

    /// Iterations per block.
    #[arg(long, default_value = "1000", value_name = "INT")]
    max_iterations: usize,

    /// Iterations between loss reports. Zero disables them.
    #[arg(long, default_value = "50", value_name = "INT")]
    print_iterations: usize,

    /// Initial output image.
    #[arg(long, value_enum, default_value = "content")]
    init_img_type: InitArg,

    /// Share of noise in a random initial image (0.0-1.0).
    #[arg(long, default_value = "1.0", value_name = "FLOAT")]
    noise_ratio: f64,

    /// Seed of the random initial image.
    #[arg(long, default_value = "0", value_name = "INT")]
    seed: u64,

    /// Output JPEG quality (1-100).
    #[arg(short, long, default_value = "95", value_name = "INT")]
    quality: u8,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("neural_style={log_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    if let Err(err) = run(args) {
        tracing::error!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn run(args: Args) -> Result<()> {
    let config = config_from_args(args)?;

    let pipeline = Pipeline::new(config).context("Failed to initialize pipeline")?;
    let output = pipeline
        .render(&mut LogObserver::new())
        .context("Failed to render image")?;

    println!("Successfully rendered {}", output.final_path.display());
    Ok(())
}

fn config_from_args(args: Args) -> Result<Config> {
    let content_layers =
        LayerId::parse_list(&args.content_layers).context("Invalid --content-layers")?;
    let style_layers = LayerId::parse_list(&args.style_layers).context("Invalid --style-layers")?;

    let style_imgs_weights = if args.style_imgs_weights.is_empty() {
        vec![1.0; args.style_imgs.len()]
    } else {
        args.style_imgs_weights
    };

    let optimizer = match args.optimizer {
        OptimizerArg::Lbfgs => OptimizerKind::Lbfgs(LbfgsParams {
            history: args.lbfgs_history,
        }),
        OptimizerArg::Adam => OptimizerKind::Adam(AdamParams {
            learning_rate: args.learning_rate,
            beta1: args.beta1,
            beta2: args.beta2,
            epsilon: args.epsilon,
        }),
    };

    let init = match args.init_img_type {
        InitArg::Content => InitImage::Content,
        InitArg::Style => InitImage::Style,
        InitArg::Random => InitImage::Random {
            seed: args.seed,
            noise_ratio: args.noise_ratio,
        },
    };

    Ok(Config {
        content_img: args.content_img,
        content_img_dir: args.content_img_dir,
        style_imgs: args.style_imgs,
        style_imgs_dir: args.style_imgs_dir,
        style_imgs_weights,
        img_name: args.img_name,
        max_size: args.max_size,
        content_weight: args.content_weight,
        style_weight: args.style_weight,
        tv_weight: args.tv_weight,
        content_layers,
        style_layers,
        content_layer_weights: args.content_layer_weights,
        style_layer_weights: args.style_layer_weights,
        model_weights: args.model_weights,
        img_output_dir: args.img_output_dir,
        optimizer,
        blocks: args.blocks,
        max_iterations: args.max_iterations,
        print_iterations: args.print_iterations,
        init,
        output_quality: args.quality,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let args = Args::try_parse_from([
            "neural-style",
            "--content-img",
            "lion.jpg",
            "--style-imgs",
            "a.jpg",
            "b.jpg",
        ])
        .unwrap();
        let config = config_from_args(args).unwrap();

        assert_eq!(config.style_imgs_weights, vec![1.0, 1.0]);
        assert_eq!(config.content_layers, vec![LayerId::Conv4_2]);
        assert_eq!(config.style_layers.len(), 5);
        assert_eq!(config.style_layer_weights, vec![0.2; 5]);
        assert_eq!(config.optimizer, OptimizerKind::Lbfgs(LbfgsParams::default()));
        assert_eq!(config.init, InitImage::Content);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cli_adam_and_random_init() {
        let args = Args::try_parse_from([
            "neural-style",
            "--content-img",
            "lion.jpg",
            "--style-imgs",
            "a.jpg",
            "--optimizer",
            "adam",
            "--beta2",
            "0.99",
            "--init-img-type",
            "random",
            "--seed",
            "3",
            "--noise-ratio",
            "0.5",
        ])
        .unwrap();
        let config = config_from_args(args).unwrap();

        assert_eq!(
            config.optimizer,
            OptimizerKind::Adam(AdamParams {
                beta2: 0.99,
                ..AdamParams::default()
            })
        );
        assert_eq!(
            config.init,
            InitImage::Random {
                seed: 3,
                noise_ratio: 0.5
            }
        );
    }

    #[test]
    fn test_cli_rejects_unknown_layer() {
        let args = Args::try_parse_from([
            "neural-style",
            "--content-img",
            "lion.jpg",
            "--style-imgs",
            "a.jpg",
            "--content-layers",
            "conv9_9",
        ])
        .unwrap();

        assert!(config_from_args(args).is_err());
    }
}
