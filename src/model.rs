use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    prelude::*,
    tensor::activation::softmax,
};

#[derive(Config, Debug)]
pub struct CovidNetConfig {
    #[config(default = 3)]
    pub num_classes: usize,
    /// Channels of the first convolution; doubled by each later block
    #[config(default = 16)]
    pub base_filters: usize,
    #[config(default = 0.3)]
    pub dropout: f64,
}

impl Default for CovidNetConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl CovidNetConfig {
    /// Build a freshly initialized network. Restoring a checkpoint starts from
    /// this and then overwrites the parameter values.
    pub fn init<B: Backend>(&self, device: &B::Device) -> CovidNet<B> {
        let f = self.base_filters;

        let conv = |channels: [usize; 2]| {
            Conv2dConfig::new(channels, [3, 3])
                .with_stride([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device)
        };

        CovidNet {
            conv1: conv([3, f]),
            conv2: conv([f, 2 * f]),
            conv3: conv([2 * f, 4 * f]),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            gap: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            dense_1: LinearConfig::new(4 * f, 64).init(device),
            dense_2: LinearConfig::new(64, 32).init(device),
            dense_3: LinearConfig::new(32, self.num_classes).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
            relu: Relu::new(),
        }
    }
}

/// Three-class chest X-ray classifier.
///
/// The last layer keeps the name `dense_3`: its output is the `dense_3/MatMul`
/// logits tensor and its softmax the `dense_3/Softmax` prediction.
#[derive(Module, Debug)]
pub struct CovidNet<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
    conv3: Conv2d<B>,
    pool: MaxPool2d,
    gap: AdaptiveAvgPool2d,
    dense_1: Linear<B>,
    dense_2: Linear<B>,
    dense_3: Linear<B>,
    dropout: Dropout,
    relu: Relu,
}

impl<B: Backend> CovidNet<B> {
    /// Unscaled logits, `[N, num_classes]`, for `[N, 3, 224, 224]` input.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.relu.forward(self.conv1.forward(x));
        let x = self.pool.forward(x);

        let x = self.relu.forward(self.conv2.forward(x));
        let x = self.pool.forward(x);

        let x = self.relu.forward(self.conv3.forward(x));
        let x = self.gap.forward(x);

        let x = x.flatten(1, 3);

        let x = self.relu.forward(self.dense_1.forward(x));
        let x = self.dropout.forward(x);
        let x = self.relu.forward(self.dense_2.forward(x));
        let x = self.dropout.forward(x);

        self.dense_3.forward(x)
    }

    /// Class probabilities.
    pub fn forward_softmax(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(x), 1)
    }

    pub fn num_classes(&self) -> usize {
        self.dense_3.weight.val().dims()[1]
    }

    /// Device holding the parameters.
    pub fn device(&self) -> B::Device {
        self.dense_3.weight.val().device()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::NUM_CLASSES;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_output_shape() {
        let device = Default::default();
        let model = CovidNetConfig::new()
            .with_base_filters(4)
            .init::<TestBackend>(&device);

        let input = Tensor::<TestBackend, 4>::zeros([2, 3, 224, 224], &device);
        assert_eq!(model.forward(input.clone()).dims(), [2, 3]);
        assert_eq!(model.num_classes(), NUM_CLASSES);

        let probs = model.forward_softmax(input).sum_dim(1).into_data().to_vec::<f32>().unwrap();
        for p in probs {
            assert!((p - 1.0).abs() < 1e-5);
        }
    }
}
