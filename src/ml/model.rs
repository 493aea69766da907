use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig},
        interpolate::{Interpolate2d, Interpolate2dConfig, InterpolateMode},
        pool::{MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig2d, Relu,
    },
    prelude::*,
};

// Config derive brings Clone + serde; don't derive them again.
#[derive(Config, Debug)]
pub struct UNetConfig {
    pub n_channels: usize,
    pub n_classes:  usize,
    /// Bilinear upsampling instead of transposed convolutions.
    #[config(default = false)]
    pub bilinear: bool,
    /// Width of the first encoder stage; each stage doubles it.
    #[config(default = 64)]
    pub base_channels: usize,
}

impl UNetConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> UNet<B> {
        let c      = self.base_channels;
        let factor = if self.bilinear { 2 } else { 1 };

        UNet {
            inc:   DoubleConv::new(self.n_channels, c, c, device),
            down1: Down::new(c, 2 * c, device),
            down2: Down::new(2 * c, 4 * c, device),
            down3: Down::new(4 * c, 8 * c, device),
            down4: Down::new(8 * c, 16 * c / factor, device),
            up1:   Up::new(16 * c, 8 * c / factor, self.bilinear, device),
            up2:   Up::new(8 * c, 4 * c / factor, self.bilinear, device),
            up3:   Up::new(4 * c, 2 * c / factor, self.bilinear, device),
            up4:   Up::new(2 * c, c, self.bilinear, device),
            outc:  Conv2dConfig::new([c, self.n_classes], [1, 1]).init(device),
            n_channels: self.n_channels,
            n_classes:  self.n_classes,
            bilinear:   self.bilinear,
        }
    }
}

/// (conv 3×3 → batch norm → ReLU) × 2
#[derive(Module, Debug)]
pub struct DoubleConv<B: Backend> {
    pub conv1: Conv2d<B>,
    pub norm1: BatchNorm<B, 2>,
    pub conv2: Conv2d<B>,
    pub norm2: BatchNorm<B, 2>,
    pub relu:  Relu,
}

impl<B: Backend> DoubleConv<B> {
    fn new(in_channels: usize, out_channels: usize, mid_channels: usize, device: &B::Device) -> Self {
        let conv = |i, o| {
            Conv2dConfig::new([i, o], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .with_bias(false)
                .init::<B>(device)
        };
        Self {
            conv1: conv(in_channels, mid_channels),
            norm1: BatchNormConfig::new(mid_channels).init(device),
            conv2: conv(mid_channels, out_channels),
            norm2: BatchNormConfig::new(out_channels).init(device),
            relu:  Relu::new(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.relu.forward(self.norm1.forward(self.conv1.forward(x)));
        self.relu.forward(self.norm2.forward(self.conv2.forward(x)))
    }
}

/// Max-pool ×2 then DoubleConv.
#[derive(Module, Debug)]
pub struct Down<B: Backend> {
    pub pool: MaxPool2d,
    pub conv: DoubleConv<B>,
}

impl<B: Backend> Down<B> {
    fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        Self {
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            conv: DoubleConv::new(in_channels, out_channels, out_channels, device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.conv.forward(self.pool.forward(x))
    }
}

/// Upscale ×2, join with the encoder skip, DoubleConv.
#[derive(Module, Debug)]
pub struct Up<B: Backend> {
    pub upsample:   Option<Interpolate2d>,
    pub transposed: Option<ConvTranspose2d<B>>,
    pub conv:       DoubleConv<B>,
}

impl<B: Backend> Up<B> {
    fn new(in_channels: usize, out_channels: usize, bilinear: bool, device: &B::Device) -> Self {
        if bilinear {
            Self {
                upsample: Some(
                    Interpolate2dConfig::new()
                        .with_scale_factor(Some([2.0, 2.0]))
                        .with_mode(InterpolateMode::Linear)
                        .init(),
                ),
                transposed: None,
                conv: DoubleConv::new(in_channels, out_channels, in_channels / 2, device),
            }
        } else {
            Self {
                upsample: None,
                transposed: Some(
                    ConvTranspose2dConfig::new([in_channels, in_channels / 2], [2, 2])
                        .with_stride([2, 2])
                        .init(device),
                ),
                conv: DoubleConv::new(in_channels, out_channels, out_channels, device),
            }
        }
    }

    /// `x`: decoder input, `skip`: encoder features at the target resolution.
    pub fn forward(&self, x: Tensor<B, 4>, skip: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = match (&self.upsample, &self.transposed) {
            (Some(up), _) => up.forward(x),
            (None, Some(conv)) => conv.forward(x),
            (None, None) => x,
        };

        // Odd input sizes leave the upscaled map a pixel short.
        let [_, _, sh, sw] = skip.dims();
        let [_, _, xh, xw] = x.dims();
        let x = if (xh, xw) != (sh, sw) {
            let (dh, dw) = (sh.saturating_sub(xh), sw.saturating_sub(xw));
            x.pad((dw / 2, dw - dw / 2, dh / 2, dh - dh / 2), 0.0)
        } else {
            x
        };

        self.conv.forward(Tensor::cat(vec![skip, x], 1))
    }
}

#[derive(Module, Debug)]
pub struct UNet<B: Backend> {
    pub inc:   DoubleConv<B>,
    pub down1: Down<B>,
    pub down2: Down<B>,
    pub down3: Down<B>,
    pub down4: Down<B>,
    pub up1:   Up<B>,
    pub up2:   Up<B>,
    pub up3:   Up<B>,
    pub up4:   Up<B>,
    pub outc:  Conv2d<B>,
    pub n_channels: usize,
    pub n_classes:  usize,
    pub bilinear:   bool,
}

impl<B: Backend> UNet<B> {
    /// images: [batch, n_channels, H, W] → logits: [batch, n_classes, H, W]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        let x1 = self.inc.forward(images);
        let x2 = self.down1.forward(x1.clone());
        let x3 = self.down2.forward(x2.clone());
        let x4 = self.down3.forward(x3.clone());
        let x5 = self.down4.forward(x4.clone());

        let x = self.up1.forward(x5, x4);
        let x = self.up2.forward(x, x3);
        let x = self.up3.forward(x, x2);
        let x = self.up4.forward(x, x1);
        self.outc.forward(x)
    }

    pub fn upscaling(&self) -> &'static str {
        if self.bilinear { "Bilinear" } else { "Transposed conv" }
    }
}
