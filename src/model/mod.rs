//! The frozen VGG19 feature extractor and its weight store.

mod layers;
mod loader;
mod vgg;

pub use layers::{conv_block, store_index, LayerId, LayerOp, BLOCK_SIZES, CONV_LAYERS};
pub use loader::{ConvWeights, WeightStore};
pub use vgg::{to_image, Activation, Activations, Backend, Vgg19};
