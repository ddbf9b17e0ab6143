//! Where a render writes its checkpoints and results.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::image::{save_image, ImageTensor};

use super::config::{stem, Config, OptimizerKind};
use super::optimizer::CheckpointSink;

/// Subdirectory holding intermediate images.
const ITERS_DIR: &str = "iters";

/// Deterministic on-disk layout of one render.
///
/// The directory name encodes the inputs, image size, optimizer settings,
/// block count and iteration budget, so distinct configurations never
/// overwrite each other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    dir: PathBuf,
    img_name: Option<String>,
}

impl OutputLayout {
    /// Derive the layout of `config` under its output directory.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        let mut name = config.img_name.clone().unwrap_or_else(|| {
            let style = config.style_imgs.first().map(|p| stem(p)).unwrap_or_default();
            format!("{}.{style}", stem(&config.content_img))
        });

        let _ = write!(name, "{}", config.max_size);
        match config.optimizer {
            OptimizerKind::Adam(p) => {
                let _ = write!(
                    name,
                    "A({:?},{:?},{:?},{:?})",
                    p.learning_rate, p.beta1, p.beta2, p.epsilon
                );
            }
            OptimizerKind::Lbfgs(_) => name.push_str("LBFGS"),
        }
        if config.blocks != 1 {
            let _ = write!(name, "{}x", config.blocks);
        }
        let _ = write!(name, "{}", config.max_iterations);

        Self {
            dir: config.img_output_dir.join(name),
            img_name: config.img_name.clone(),
        }
    }

    /// Root directory of the render.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Directory holding intermediate images.
    #[must_use]
    pub fn iters_dir(&self) -> PathBuf {
        self.dir.join(ITERS_DIR)
    }

    /// Path of the checkpoint taken at `(block, iteration)`.
    #[must_use]
    pub fn checkpoint_path(&self, block: usize, iteration: usize) -> PathBuf {
        self.iters_dir().join(self.file_name(block, iteration))
    }

    /// Path of the final image after `blocks` blocks.
    #[must_use]
    pub fn final_path(&self, blocks: usize) -> PathBuf {
        self.dir.join(self.file_name(blocks, 0))
    }

    /// Create the render directory and its `iters` subdirectory.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be created.
    pub fn create(&self) -> Result<()> {
        fs::create_dir_all(self.iters_dir())?;
        Ok(())
    }

    /// Write the final image, copies of the inputs and `meta_data.txt`.
    ///
    /// `config` should be the normalized configuration so recorded style
    /// weights sum to 1. Returns the path of the final image.
    ///
    /// # Errors
    ///
    /// Returns an error if any file cannot be written.
    pub fn write_final(
        &self,
        config: &Config,
        image: &ImageTensor,
        content: &ImageTensor,
        styles: &[ImageTensor],
    ) -> Result<PathBuf> {
        self.create()?;

        let path = self.final_path(config.blocks);
        save_image(image, &path, config.output_quality)?;
        save_image(content, self.dir.join("0content.png"), config.output_quality)?;
        for (i, style) in styles.iter().enumerate() {
            save_image(style, self.dir.join(format!("{i}_style.png")), config.output_quality)?;
        }

        fs::write(self.dir.join("meta_data.txt"), meta_data(config))?;
        Ok(path)
    }

    fn file_name(&self, block: usize, iteration: usize) -> String {
        self.img_name
            .clone()
            .unwrap_or_else(|| format!("{block}.{iteration}.png"))
    }
}

/// Plaintext summary of the settings a render ran with.
#[must_use]
pub fn meta_data(config: &Config) -> String {
    let mut out = String::new();
    let join = |layers: &[crate::model::LayerId]| {
        layers
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    };

    let _ = writeln!(out, "image_name: {}", config.img_name.as_deref().unwrap_or("None"));
    let _ = writeln!(out, "content: {}", config.content_img.display());
    for (i, (style, weight)) in config
        .style_imgs
        .iter()
        .zip(&config.style_imgs_weights)
        .enumerate()
    {
        let _ = writeln!(out, "styles[{i}]: {weight} * {}", style.display());
    }
    let _ = writeln!(out, "content_weight: {}", config.content_weight);
    let _ = writeln!(out, "style_weight: {}", config.style_weight);
    let _ = writeln!(out, "tv_weight: {}", config.tv_weight);
    let _ = writeln!(out, "content_layers: {}", join(&config.content_layers));
    let _ = writeln!(out, "style_layers: {}", join(&config.style_layers));
    let _ = writeln!(out, "optimizer_type: {}", config.optimizer.name());
    let _ = writeln!(out, "training_blocks: {}", config.blocks);
    let _ = writeln!(out, "max_iterations: {}", config.max_iterations);
    let _ = writeln!(out, "max_image_size: {}", config.max_size);
    let _ = writeln!(out, "init_image: {}", config.init);
    out
}

/// Saves every checkpoint into the `iters` directory of a layout.
#[derive(Debug)]
pub struct CheckpointWriter<'a> {
    layout: &'a OutputLayout,
    quality: u8,
}

impl<'a> CheckpointWriter<'a> {
    /// Write checkpoints of `layout` with the given JPEG quality.
    #[must_use]
    pub const fn new(layout: &'a OutputLayout, quality: u8) -> Self {
        Self { layout, quality }
    }
}

impl CheckpointSink for CheckpointWriter<'_> {
    fn checkpoint(
        &mut self,
        block: usize,
        iteration: usize,
        image: &ImageTensor,
    ) -> Result<PathBuf> {
        let path = self.layout.checkpoint_path(block, iteration);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        save_image(image, &path, self.quality)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::pipeline::config::AdamParams;

    fn config() -> Config {
        Config {
            content_img: "lion.jpg".into(),
            style_imgs: vec!["starry.jpg".into(), "wave.png".into()],
            style_imgs_weights: vec![0.5, 0.5],
            img_output_dir: "out".into(),
            ..Config::default()
        }
    }

    #[test]
    fn test_lbfgs_dir_name() {
        let layout = OutputLayout::new(&config());

        assert_eq!(layout.dir(), Path::new("out/lion.starry512LBFGS1000"));
        assert_eq!(
            layout.checkpoint_path(0, 1000),
            PathBuf::from("out/lion.starry512LBFGS1000/iters/0.1000.png")
        );
        assert_eq!(
            layout.final_path(1),
            PathBuf::from("out/lion.starry512LBFGS1000/1.0.png")
        );
    }

    #[test]
    fn test_adam_dir_name_with_blocks() {
        let layout = OutputLayout::new(&Config {
            optimizer: OptimizerKind::Adam(AdamParams::default()),
            blocks: 3,
            max_iterations: 200,
            max_size: 256,
            ..config()
        });

        assert_eq!(
            layout.dir(),
            Path::new("out/lion.starry256A(10.0,0.9,0.999,1e-8)3x200")
        );
    }

    #[test]
    fn test_explicit_image_name() {
        let layout = OutputLayout::new(&Config {
            img_name: Some("result.png".to_string()),
            ..config()
        });

        assert_eq!(layout.dir(), Path::new("out/result.png512LBFGS1000"));
        assert_eq!(layout.checkpoint_path(2, 50).file_name().unwrap(), "result.png");
        assert_eq!(layout.final_path(1).file_name().unwrap(), "result.png");
    }

    #[test]
    fn test_meta_data_lists_settings() {
        let meta = meta_data(&config());

        assert!(meta.starts_with("image_name: None\ncontent: lion.jpg\n"));
        assert!(meta.contains("styles[0]: 0.5 * starry.jpg\n"));
        assert!(meta.contains("styles[1]: 0.5 * wave.png\n"));
        assert!(meta.contains("content_layers: conv4_2\n"));
        assert!(meta.contains("style_layers: relu1_1, relu2_1, relu3_1, relu4_1, relu5_1\n"));
        assert!(meta.contains("optimizer_type: lbfgs\n"));
        assert!(meta.contains("max_image_size: 512\n"));
    }

    #[test]
    fn test_writer_creates_iters_dir() {
        let dir = tempfile::tempdir().unwrap();
        let layout = OutputLayout::new(&Config {
            img_output_dir: dir.path().to_path_buf(),
            ..config()
        });
        let mut writer = CheckpointWriter::new(&layout, 95);

        let path = writer
            .checkpoint(0, 5, &ImageTensor::zeros((1, 3, 4, 3)))
            .unwrap();

        assert!(path.is_file());
        assert_eq!(path.parent().unwrap(), layout.iters_dir());
    }

    #[test]
    fn test_write_final() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            img_output_dir: dir.path().to_path_buf(),
            ..config()
        };
        let layout = OutputLayout::new(&config);
        let image = ImageTensor::zeros((1, 3, 4, 3));

        let path = layout
            .write_final(&config, &image, &image, &[image.clone(), image.clone()])
            .unwrap();

        assert_eq!(path, layout.dir().join("1.0.png"));
        for name in ["1.0.png", "0content.png", "0_style.png", "1_style.png", "meta_data.txt"] {
            assert!(layout.dir().join(name).is_file(), "{name}");
        }
    }
}
