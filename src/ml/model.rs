// ============================================================
// Layer 5 — ResNet
// ============================================================
// Residual networks for square RGB inputs (whole images or patches):
//
//   stem:    conv7x7 / 2 → bn → relu → max-pool3x3 / 2
//   stages:  stage i has `stage_depths[i]` residual blocks of
//            `base_width << i` filters; stages after the first
//            open with a stride-2 block
//   head:    global average pool → fully connected → logits
//
//   ResNet-18   basic blocks       [2, 2, 2, 2]
//   ResNet-34   basic blocks       [3, 4, 6, 3]
//   ResNet-50   bottleneck blocks  [3, 4, 6, 3], outputs 4x wider
//
// Why a max-pool shortcut?
//   A strided block whose channel count does not change still has
//   to shrink its input before the merge. A max-pool does that
//   without adding weights; a 1x1 projection is only paid for when
//   the channel count changes too.
//
// Why count FLOPs here?
//   The numbers are logged when training starts, so a run with a
//   different input size or width is easy to compare. They follow
//   the layer shapes, not the backend's actual kernels.

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Linear, LinearConfig, PaddingConfig2d,
    },
    prelude::*,
    tensor::activation::relu,
};

/// Output channels of a bottleneck block per filter of its 3x3 conv.
pub const BOTTLENECK_EXPANSION: usize = 4;

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize
// internally — do NOT add them again or you get conflicting impls.
#[derive(Config, Debug)]
pub struct ResNetConfig {
    /// Width of the fully connected output
    pub num_classes:  usize,
    /// Residual blocks per stage; stage `i` has `base_width << i` filters
    pub stage_depths: Vec<usize>,
    /// Filters of the stem and the first stage
    #[config(default = 64)]
    pub base_width:   usize,
    #[config(default = 3)]
    pub in_channels:  usize,
    /// 1x1 → 3x3 → 1x1 blocks instead of two 3x3 convs
    #[config(default = false)]
    pub bottleneck:   bool,
}

/// Multiply-add and parameter counts of a network, per forward pass of one image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Complexity {
    pub flops:   u64,
    pub weights: u64,
}

impl Complexity {
    fn add_conv(&mut self, out_hw: usize, cin: usize, cout: usize, k: usize) {
        let (out_hw, cin, cout, k) = (out_hw as u64, cin as u64, cout as u64, k as u64);
        self.flops   += 2 * out_hw * out_hw * cin * cout * k * k;
        self.weights += cin * cout * k * k;
    }

    fn add_fc(&mut self, input: usize, output: usize) {
        let (input, output) = (input as u64, output as u64);
        self.flops   += 2 * (input + 1) * output;
        self.weights += (input + 1) * output;
    }
}

impl ResNetConfig {
    /// Filters of the inner convs and output channels of stage `stage`.
    fn stage_widths(&self, stage: usize) -> (usize, usize) {
        let inner = self.base_width << stage;
        let out   = if self.bottleneck { inner * BOTTLENECK_EXPANSION } else { inner };
        (inner, out)
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> ResNet<B> {
        let width = self.base_width;

        let stem_conv = conv(self.in_channels, width, 7, 2, device);
        let stem_bn   = BatchNormConfig::new(width).init(device);
        let stem_pool = MaxPool2dConfig::new([3, 3])
            .with_strides([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init();

        let mut blocks   = Vec::new();
        let mut channels = width;
        for (stage, &depth) in self.stage_depths.iter().enumerate() {
            let (inner, out) = self.stage_widths(stage);
            for i in 0..depth {
                // conv3_x and later open with a strided block
                let stride = if stage > 0 && i == 0 { 2 } else { 1 };
                let block  = if self.bottleneck {
                    ResidualBlock::bottleneck(channels, inner, out, stride, device)
                } else {
                    ResidualBlock::new(channels, out, stride, device)
                };
                blocks.push(block);
                channels = out;
            }
        }

        let fc = LinearConfig::new(channels, self.num_classes).init(device);

        ResNet { stem_conv, stem_bn, stem_pool, blocks, fc }
    }

    /// FLOPs and weights of every conv / fc layer for a square `input_size` image.
    pub fn complexity(&self, input_size: usize) -> Complexity {
        let mut total = Complexity::default();
        let width     = self.base_width;

        let mut hw = same_out(input_size, 2);
        total.add_conv(hw, self.in_channels, width, 7);
        hw = same_out(hw, 2);

        let mut channels = width;
        for (stage, &depth) in self.stage_depths.iter().enumerate() {
            let (inner, out) = self.stage_widths(stage);
            for i in 0..depth {
                let stride = if stage > 0 && i == 0 { 2 } else { 1 };
                let in_hw  = hw;
                hw = same_out(hw, stride);
                if self.bottleneck {
                    // the 1x1 reduction runs before the strided 3x3
                    total.add_conv(in_hw, channels, inner, 1);
                    total.add_conv(hw, inner, inner, 3);
                    total.add_conv(hw, inner, out, 1);
                } else {
                    total.add_conv(hw, channels, out, 3);
                    total.add_conv(hw, out, out, 3);
                }
                if channels != out {
                    total.add_conv(hw, channels, out, 1);
                }
                channels = out;
            }
        }

        total.add_fc(channels, self.num_classes);
        total
    }
}

/// Output side length of a "same"-padded window with `stride`.
fn same_out(size: usize, stride: usize) -> usize {
    size.div_ceil(stride)
}

fn conv<B: Backend>(
    cin:    usize,
    cout:   usize,
    kernel: usize,
    stride: usize,
    device: &B::Device,
) -> Conv2d<B> {
    Conv2dConfig::new([cin, cout], [kernel, kernel])
        .with_stride([stride, stride])
        .with_padding(PaddingConfig2d::Explicit(kernel / 2, kernel / 2))
        .with_bias(false)
        .init(device)
}

/// How a residual block carries its input to the merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortcutKind {
    Identity,
    MaxPool,
    Projection,
}

fn shortcut<B: Backend>(
    cin:    usize,
    cout:   usize,
    stride: usize,
    device: &B::Device,
) -> (Option<Conv2d<B>>, Option<MaxPool2d>) {
    if cin != cout {
        (Some(conv(cin, cout, 1, stride, device)), None)
    } else if stride > 1 {
        let pool = MaxPool2dConfig::new([stride, stride])
            .with_strides([stride, stride])
            .init();
        (None, Some(pool))
    } else {
        (None, None)
    }
}

// ─── Residual block ───────────────────────────────────────────────────────────
//   basic:      conv3x3(stride) → bn → relu → conv3x3 → bn
//   bottleneck: conv1x1 → bn → relu → conv3x3(stride) → bn → relu → conv1x1 → bn
//   shortcut:   identity | max-pool(stride) | conv1x1(stride)
//   output:     relu(residual + shortcut)
#[derive(Module, Debug)]
pub struct ResidualBlock<B: Backend> {
    pub conv1:         Conv2d<B>,
    pub bn1:           BatchNorm<B>,
    pub conv2:         Conv2d<B>,
    pub bn2:           BatchNorm<B>,
    /// Expanding 1x1 conv, bottleneck blocks only
    pub conv3:         Option<Conv2d<B>>,
    pub bn3:           Option<BatchNorm<B>>,
    pub shortcut_conv: Option<Conv2d<B>>,
    pub shortcut_pool: Option<MaxPool2d>,
}

impl<B: Backend> ResidualBlock<B> {
    pub fn new(cin: usize, cout: usize, stride: usize, device: &B::Device) -> Self {
        let (shortcut_conv, shortcut_pool) = shortcut(cin, cout, stride, device);

        Self {
            conv1: conv(cin, cout, 3, stride, device),
            bn1:   BatchNormConfig::new(cout).init(device),
            conv2: conv(cout, cout, 3, 1, device),
            bn2:   BatchNormConfig::new(cout).init(device),
            conv3: None,
            bn3:   None,
            shortcut_conv,
            shortcut_pool,
        }
    }

    pub fn bottleneck(cin: usize, inner: usize, cout: usize, stride: usize, device: &B::Device) -> Self {
        let (shortcut_conv, shortcut_pool) = shortcut(cin, cout, stride, device);

        Self {
            conv1: conv(cin, inner, 1, 1, device),
            bn1:   BatchNormConfig::new(inner).init(device),
            conv2: conv(inner, inner, 3, stride, device),
            bn2:   BatchNormConfig::new(inner).init(device),
            conv3: Some(conv(inner, cout, 1, 1, device)),
            bn3:   Some(BatchNormConfig::new(cout).init(device)),
            shortcut_conv,
            shortcut_pool,
        }
    }

    pub fn shortcut_kind(&self) -> ShortcutKind {
        match (&self.shortcut_conv, &self.shortcut_pool) {
            (Some(_), _)    => ShortcutKind::Projection,
            (None, Some(_)) => ShortcutKind::MaxPool,
            (None, None)    => ShortcutKind::Identity,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let shortcut = match (&self.shortcut_conv, &self.shortcut_pool) {
            (Some(conv), _)    => conv.forward(x.clone()),
            (None, Some(pool)) => pool.forward(x.clone()),
            (None, None)       => x.clone(),
        };

        let y = relu(self.bn1.forward(self.conv1.forward(x)));
        let y = self.bn2.forward(self.conv2.forward(y));
        let y = match (&self.conv3, &self.bn3) {
            (Some(conv3), Some(bn3)) => bn3.forward(conv3.forward(relu(y))),
            _                        => y,
        };
        relu(y + shortcut)
    }
}

// ─── ResNet ───────────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct ResNet<B: Backend> {
    pub stem_conv: Conv2d<B>,
    pub stem_bn:   BatchNorm<B>,
    pub stem_pool: MaxPool2d,
    pub blocks:    Vec<ResidualBlock<B>>,
    pub fc:        Linear<B>,
}

impl<B: Backend> ResNet<B> {
    /// images: [N, C, H, W] → logits: [N, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.stem_conv.forward(images);
        let x = relu(self.stem_bn.forward(x));
        let mut x = self.stem_pool.forward(x);

        for block in &self.blocks {
            x = block.forward(x);
        }

        // global average pool over H, W
        let [n, c, _, _] = x.dims();
        let x = x.mean_dim(3).mean_dim(2).reshape([n, c]);
        self.fc.forward(x)
    }
}
