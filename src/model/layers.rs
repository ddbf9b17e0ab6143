//! Named VGG19 layers in evaluation order.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Number of weighted convolution layers in the feature extractor.
pub const CONV_LAYERS: usize = 16;

/// Convolutions per block, each block followed by one pooling layer.
pub const BLOCK_SIZES: [usize; 5] = [2, 2, 4, 4, 4];

/// What a layer computes from the previous layer's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerOp {
    /// 3x3 stride-1 SAME convolution with the kernel of conv layer `conv` (0-based ordinal).
    Conv { conv: usize },
    /// Adds the bias of conv layer `conv` and applies `max(0, x)`.
    Relu { conv: usize },
    /// 2x2 stride-2 SAME average pooling.
    Pool,
}

macro_rules! layers {
    ($($variant:ident => $name:literal : $op:expr,)*) => {
        /// Identifier of every named activation in the network.
        ///
        /// Variants are declared in evaluation order, so ordering compares depth.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum LayerId {
            $($variant,)*
        }

        impl LayerId {
            /// All layers in evaluation order.
            pub const ALL: &'static [LayerId] = &[$(LayerId::$variant,)*];

            /// Canonical lower-case name, e.g. `relu4_2`.
            #[must_use]
            pub const fn name(self) -> &'static str {
                match self {
                    $(LayerId::$variant => $name,)*
                }
            }

            /// The operation this layer applies.
            #[must_use]
            pub const fn op(self) -> LayerOp {
                match self {
                    $(LayerId::$variant => $op,)*
                }
            }
        }
    };
}

layers! {
    Conv1_1 => "conv1_1": LayerOp::Conv { conv: 0 },
    Relu1_1 => "relu1_1": LayerOp::Relu { conv: 0 },
    Conv1_2 => "conv1_2": LayerOp::Conv { conv: 1 },
    Relu1_2 => "relu1_2": LayerOp::Relu { conv: 1 },
    Pool1 => "pool1": LayerOp::Pool,

    Conv2_1 => "conv2_1": LayerOp::Conv { conv: 2 },
    Relu2_1 => "relu2_1": LayerOp::Relu { conv: 2 },
    Conv2_2 => "conv2_2": LayerOp::Conv { conv: 3 },
    Relu2_2 => "relu2_2": LayerOp::Relu { conv: 3 },
    Pool2 => "pool2": LayerOp::Pool,

    Conv3_1 => "conv3_1": LayerOp::Conv { conv: 4 },
    Relu3_1 => "relu3_1": LayerOp::Relu { conv: 4 },
    Conv3_2 => "conv3_2": LayerOp::Conv { conv: 5 },
    Relu3_2 => "relu3_2": LayerOp::Relu { conv: 5 },
    Conv3_3 => "conv3_3": LayerOp::Conv { conv: 6 },
    Relu3_3 => "relu3_3": LayerOp::Relu { conv: 6 },
    Conv3_4 => "conv3_4": LayerOp::Conv { conv: 7 },
    Relu3_4 => "relu3_4": LayerOp::Relu { conv: 7 },
    Pool3 => "pool3": LayerOp::Pool,

    Conv4_1 => "conv4_1": LayerOp::Conv { conv: 8 },
    Relu4_1 => "relu4_1": LayerOp::Relu { conv: 8 },
    Conv4_2 => "conv4_2": LayerOp::Conv { conv: 9 },
    Relu4_2 => "relu4_2": LayerOp::Relu { conv: 9 },
    Conv4_3 => "conv4_3": LayerOp::Conv { conv: 10 },
    Relu4_3 => "relu4_3": LayerOp::Relu { conv: 10 },
    Conv4_4 => "conv4_4": LayerOp::Conv { conv: 11 },
    Relu4_4 => "relu4_4": LayerOp::Relu { conv: 11 },
    Pool4 => "pool4": LayerOp::Pool,

    Conv5_1 => "conv5_1": LayerOp::Conv { conv: 12 },
    Relu5_1 => "relu5_1": LayerOp::Relu { conv: 12 },
    Conv5_2 => "conv5_2": LayerOp::Conv { conv: 13 },
    Relu5_2 => "relu5_2": LayerOp::Relu { conv: 13 },
    Conv5_3 => "conv5_3": LayerOp::Conv { conv: 14 },
    Relu5_3 => "relu5_3": LayerOp::Relu { conv: 14 },
    Conv5_4 => "conv5_4": LayerOp::Conv { conv: 15 },
    Relu5_4 => "relu5_4": LayerOp::Relu { conv: 15 },
    Pool5 => "pool5": LayerOp::Pool,
}

impl LayerId {
    /// Position of the layer in evaluation order.
    #[must_use]
    pub const fn position(self) -> usize {
        self as usize
    }

    /// Parse a list of layer names.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] naming the first unknown layer.
    pub fn parse_list<S: AsRef<str>>(names: &[S]) -> Result<Vec<Self>> {
        names.iter().map(|n| n.as_ref().parse()).collect()
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LayerId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|layer| layer.name() == s)
            .ok_or_else(|| Error::config("layer", format!("unknown VGG19 layer {s:?}")))
    }
}

/// Block (0-based) a conv ordinal belongs to.
#[must_use]
pub fn conv_block(conv: usize) -> usize {
    let mut end = 0;
    for (block, size) in BLOCK_SIZES.iter().enumerate() {
        end += size;
        if conv < end {
            return block;
        }
    }
    BLOCK_SIZES.len() - 1
}

/// Index of a conv layer's entry in the weight store.
///
/// The store follows the reference MATLAB ordering (conv, relu, ..., pool), so
/// indices step by 2 inside a block and by 3 across a pooling boundary.
#[must_use]
pub fn store_index(conv: usize) -> usize {
    2 * conv + conv_block(conv)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_count() {
        let convs = LayerId::ALL
            .iter()
            .filter(|l| matches!(l.op(), LayerOp::Conv { .. }))
            .count();
        let pools = LayerId::ALL.iter().filter(|l| l.op() == LayerOp::Pool).count();

        assert_eq!(LayerId::ALL.len(), 37);
        assert_eq!(convs, CONV_LAYERS);
        assert_eq!(pools, BLOCK_SIZES.len());
        assert_eq!(BLOCK_SIZES.iter().sum::<usize>(), CONV_LAYERS);
    }

    #[test]
    fn test_positions_match_order() {
        for (i, layer) in LayerId::ALL.iter().enumerate() {
            assert_eq!(layer.position(), i);
        }
        assert!(LayerId::Relu1_1 < LayerId::Conv4_2);
    }

    #[test]
    fn test_store_indices() {
        let indices: Vec<usize> = (0..CONV_LAYERS).map(store_index).collect();
        assert_eq!(
            indices,
            vec![0, 2, 5, 7, 10, 12, 14, 16, 19, 21, 23, 25, 28, 30, 32, 34]
        );
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("relu4_2".parse::<LayerId>().unwrap(), LayerId::Relu4_2);
        assert_eq!("pool5".parse::<LayerId>().unwrap(), LayerId::Pool5);
        assert_eq!(LayerId::Conv3_4.to_string(), "conv3_4");
        assert!("relu6_1".parse::<LayerId>().is_err());

        let list = LayerId::parse_list(&["relu1_1", "conv4_2"]).unwrap();
        assert_eq!(list, vec![LayerId::Relu1_1, LayerId::Conv4_2]);
    }

    #[test]
    fn test_relu_follows_its_conv() {
        for pair in LayerId::ALL.windows(2) {
            if let LayerOp::Relu { conv } = pair[1].op() {
                assert_eq!(pair[0].op(), LayerOp::Conv { conv });
            }
        }
    }
}
