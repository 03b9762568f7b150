use burn::{data::dataloader::batcher::Batcher, prelude::*};

use crate::labels::{ClassLabel, NUM_CLASSES};
use crate::transform::{IMAGE_LEN, IMAGE_SIZE};

/// One preprocessed chest X-ray ready for batching.
#[derive(Clone, Debug)]
pub struct CxrItem {
    /// Channel-last pixels in [0, 1], `IMAGE_SIZE * IMAGE_SIZE * 3` values
    pub image: Vec<f32>,
    pub label: ClassLabel,
    /// Loss multiplier for this sample
    pub weight: f32,
}

#[derive(Clone, Debug)]
pub struct CxrBatch<B: Backend> {
    /// `[N, 3, H, W]`
    pub images: Tensor<B, 4>,
    /// One-hot targets, `[N, NUM_CLASSES]`
    pub targets: Tensor<B, 2>,
    pub labels: Tensor<B, 1, Int>,
    pub weights: Tensor<B, 1>,
}

#[derive(Clone)]
pub struct CxrBatcher<B: Backend> {
    device: B::Device,
}

impl<B: Backend> CxrBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

/// Build an NCHW image tensor from `count` channel-last images laid end to end.
pub fn image_batch<B: Backend>(pixels: Vec<f32>, count: usize, device: &B::Device) -> Tensor<B, 4> {
    let size = IMAGE_SIZE as usize;
    let data = TensorData::new(pixels, Shape::new([count, size, size, 3]));

    Tensor::<B, 4>::from_data(data.convert::<B::FloatElem>(), device)
        .swap_dims(2, 3) // [N, H, C, W]
        .swap_dims(1, 2) // [N, C, H, W]
}

impl<B: Backend> Batcher<CxrItem, CxrBatch<B>> for CxrBatcher<B> {
    fn batch(&self, items: Vec<CxrItem>) -> CxrBatch<B> {
        let count = items.len();

        let mut pixels = Vec::with_capacity(count * IMAGE_LEN);
        let mut one_hot = vec![0.0f32; count * NUM_CLASSES];
        let mut labels = Vec::with_capacity(count);
        let mut weights = Vec::with_capacity(count);

        for (i, item) in items.into_iter().enumerate() {
            let class = item.label.index();
            one_hot[i * NUM_CLASSES + class] = 1.0;
            labels.push(class as i64);
            weights.push(item.weight);
            pixels.extend(item.image);
        }

        let images = image_batch::<B>(pixels, count, &self.device);
        let targets = Tensor::<B, 2>::from_data(
            TensorData::new(one_hot, Shape::new([count, NUM_CLASSES])).convert::<B::FloatElem>(),
            &self.device,
        );
        let labels = Tensor::<B, 1, Int>::from_data(
            TensorData::new(labels, Shape::new([count])).convert::<B::IntElem>(),
            &self.device,
        );
        let weights = Tensor::<B, 1>::from_data(
            TensorData::new(weights, Shape::new([count])).convert::<B::FloatElem>(),
            &self.device,
        );

        CxrBatch {
            images,
            targets,
            labels,
            weights,
        }
    }
}
