//! Class-balanced batch sampler.
//!
//! Every batch is built from the normal/pneumonia pool, then a fixed number of
//! slots is overwritten with COVID-19 records so the rare class shows up in
//! every step. The sampler is an endless iterator: once the non-COVID pool has
//! been walked, both pools are reshuffled and the cursor starts over.
//!
//! All random draws (shuffles, top-ups, COVID-19 slots, augmentation) come from
//! a single seeded `ChaCha8Rng` in a fixed order, so two samplers built from the
//! same records and config yield the same batches.

use std::path::{Path, PathBuf};

use burn::prelude::Config;
use rand::seq::{index, SliceRandom};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::debug;

use crate::augment::{AugmentParams, AugmentationConfig};
use crate::data::CxrItem;
use crate::error::{self, CovidNetError};
use crate::labels::{read_label_file, ClassLabel, LabelRecord, NUM_CLASSES};
use crate::transform::{self, IMAGE_SIZE};

#[derive(Config, Debug)]
pub struct SamplerConfig {
    #[config(default = 8)]
    pub batch_size: usize,
    /// Fraction of each batch drawn from the COVID-19 class
    #[config(default = 0.3)]
    pub covid_percent: f64,
    /// Loss weight per class index
    #[config(default = "vec![1.0, 1.0, 12.0]")]
    pub class_weights: Vec<f32>,
    /// Read from `train/` and augment; otherwise read from `test/`
    #[config(default = true)]
    pub is_training: bool,
    #[config(default = true)]
    pub augmentation: bool,
    #[config(default = 42)]
    pub seed: u64,
}

impl SamplerConfig {
    pub fn validate(&self) -> error::Result<()> {
        if self.batch_size == 0 {
            return Err(CovidNetError::InvalidConfig(
                "batch_size must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.covid_percent) {
            return Err(CovidNetError::InvalidConfig(format!(
                "covid_percent must be within [0, 1], got {}",
                self.covid_percent
            )));
        }
        if self.class_weights.len() != NUM_CLASSES {
            return Err(CovidNetError::InvalidConfig(format!(
                "expected {} class weights, got {}",
                NUM_CLASSES,
                self.class_weights.len()
            )));
        }
        if self.class_weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(CovidNetError::InvalidConfig(
                "class weights must be finite and non-negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Number of COVID-19 samples placed in every batch.
    pub fn covid_size(&self) -> usize {
        let size = (self.batch_size as f64 * self.covid_percent).floor() as usize;
        size.clamp(1, self.batch_size)
    }

    fn augments(&self) -> bool {
        self.is_training && self.augmentation
    }
}

#[derive(Clone, Copy, Debug)]
enum Slot {
    NonCovid(usize),
    Covid(usize),
}

pub struct BalancedSampler {
    config: SamplerConfig,
    image_dir: PathBuf,
    non_covid: Vec<LabelRecord>,
    covid: Vec<LabelRecord>,
    cursor: usize,
    rng: ChaCha8Rng,
    augmentation: AugmentationConfig,
}

impl BalancedSampler {
    pub fn new(data_dir: impl AsRef<Path>, records: Vec<LabelRecord>, config: SamplerConfig) -> error::Result<Self> {
        config.validate()?;

        let mut normal = Vec::new();
        let mut pneumonia = Vec::new();
        let mut covid = Vec::new();
        for record in records {
            match record.class {
                ClassLabel::Normal => normal.push(record),
                ClassLabel::Pneumonia => pneumonia.push(record),
                ClassLabel::Covid19 => covid.push(record),
            }
        }
        debug!(
            normal = normal.len(),
            pneumonia = pneumonia.len(),
            covid = covid.len(),
            "Partitioned label records"
        );

        let mut non_covid = normal;
        non_covid.append(&mut pneumonia);

        if non_covid.is_empty() {
            return Err(CovidNetError::EmptyClassPool("normal/pneumonia"));
        }
        if covid.is_empty() {
            return Err(CovidNetError::EmptyClassPool("COVID-19"));
        }

        let folder = if config.is_training { "train" } else { "test" };
        let image_dir = data_dir.as_ref().join(folder);
        let rng = ChaCha8Rng::seed_from_u64(config.seed);

        let mut sampler = Self {
            config,
            image_dir,
            non_covid,
            covid,
            cursor: 0,
            rng,
            augmentation: AugmentationConfig::default(),
        };
        sampler.reshuffle();
        Ok(sampler)
    }

    pub fn from_label_file(
        data_dir: impl AsRef<Path>,
        label_file: impl AsRef<Path>,
        config: SamplerConfig,
    ) -> error::Result<Self> {
        let records = read_label_file(label_file)?;
        Self::new(data_dir, records, config)
    }

    pub fn with_augmentation(mut self, augmentation: AugmentationConfig) -> Self {
        self.augmentation = augmentation;
        self
    }

    /// Batches per pass over the non-COVID pool.
    pub fn len(&self) -> usize {
        self.non_covid.len().div_ceil(self.config.batch_size)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index of the batch the next call will build.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// `(non-COVID, COVID-19)` pool sizes.
    pub fn pool_sizes(&self) -> (usize, usize) {
        (self.non_covid.len(), self.covid.len())
    }

    fn reshuffle(&mut self) {
        self.non_covid.shuffle(&mut self.rng);
        self.covid.shuffle(&mut self.rng);
    }

    /// Choose records for every slot of the batch at `batch_index`.
    fn plan_slots(&mut self, batch_index: usize) -> Vec<Slot> {
        let batch_size = self.config.batch_size;
        let start = batch_index * batch_size;
        let end = (start + batch_size).min(self.non_covid.len());

        let mut slots: Vec<Slot> = (start..end).map(Slot::NonCovid).collect();
        while slots.len() < batch_size {
            slots.push(Slot::NonCovid(self.rng.gen_range(0..self.non_covid.len())));
        }

        let covid_size = self.config.covid_size();
        let positions = index::sample(&mut self.rng, batch_size, covid_size);
        let picks: Vec<usize> = if self.covid.len() >= covid_size {
            index::sample(&mut self.rng, self.covid.len(), covid_size).into_vec()
        } else {
            (0..covid_size)
                .map(|_| self.rng.gen_range(0..self.covid.len()))
                .collect()
        };

        for (position, pick) in positions.iter().zip(picks) {
            slots[position] = Slot::Covid(pick);
        }
        slots
    }

    /// Build the batch at the cursor and advance, reshuffling after the last
    /// batch of a pass. A batch that fails to load still consumes its slot.
    pub fn next_batch(&mut self) -> error::Result<Vec<CxrItem>> {
        let slots = self.plan_slots(self.cursor);

        let augments = self.config.augments();
        let jobs: Vec<(PathBuf, ClassLabel, AugmentParams)> = slots
            .into_iter()
            .map(|slot| {
                let record = match slot {
                    Slot::NonCovid(i) => &self.non_covid[i],
                    Slot::Covid(i) => &self.covid[i],
                };
                let params = if augments {
                    AugmentParams::sample(&self.augmentation, IMAGE_SIZE, IMAGE_SIZE, &mut self.rng)
                } else {
                    AugmentParams::IDENTITY
                };
                (self.image_dir.join(&record.relative_path), record.class, params)
            })
            .collect();

        self.cursor += 1;
        if self.cursor >= self.len() {
            self.reshuffle();
            self.cursor = 0;
        }

        let weights = &self.config.class_weights;
        jobs.par_iter()
            .map(|(path, class, params)| -> error::Result<CxrItem> {
                let img = params.apply(&transform::load_cropped(path)?);
                Ok(CxrItem {
                    image: transform::normalize(&img),
                    label: *class,
                    weight: weights[class.index()],
                })
            })
            .collect()
    }
}

impl Iterator for BalancedSampler {
    type Item = error::Result<Vec<CxrItem>>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_batch())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    fn record(id: usize, class: ClassLabel) -> LabelRecord {
        LabelRecord {
            file_id: id.to_string(),
            relative_path: format!("img_{id}.png"),
            class,
        }
    }

    /// Five normal, four pneumonia and two COVID-19 images under `train/`.
    fn fixture() -> (TempDir, Vec<LabelRecord>) {
        let dir = tempfile::tempdir().unwrap();
        let train = dir.path().join("train");
        std::fs::create_dir_all(&train).unwrap();

        let classes = [
            ClassLabel::Normal,
            ClassLabel::Normal,
            ClassLabel::Normal,
            ClassLabel::Normal,
            ClassLabel::Normal,
            ClassLabel::Pneumonia,
            ClassLabel::Pneumonia,
            ClassLabel::Pneumonia,
            ClassLabel::Pneumonia,
            ClassLabel::Covid19,
            ClassLabel::Covid19,
        ];

        let records: Vec<_> = classes
            .iter()
            .enumerate()
            .map(|(i, class)| {
                let shade = (i * 20) as u8;
                RgbImage::from_pixel(12, 18, Rgb([shade, shade, shade]))
                    .save(train.join(format!("img_{i}.png")))
                    .unwrap();
                record(i, *class)
            })
            .collect();

        (dir, records)
    }

    fn config(batch_size: usize, covid_percent: f64) -> SamplerConfig {
        SamplerConfig::new()
            .with_batch_size(batch_size)
            .with_covid_percent(covid_percent)
    }

    fn covid_count(batch: &[CxrItem]) -> usize {
        batch.iter().filter(|i| i.label == ClassLabel::Covid19).count()
    }

    #[test]
    fn test_batches_are_full_with_covid_fraction() {
        let (dir, records) = fixture();
        let mut sampler = BalancedSampler::new(dir.path(), records, config(4, 0.5)).unwrap();

        assert_eq!(sampler.len(), 3);
        for _ in 0..7 {
            let batch = sampler.next_batch().unwrap();
            assert_eq!(batch.len(), 4);
            assert_eq!(covid_count(&batch), 2);
        }
    }

    #[test]
    fn test_covid_size_rounding() {
        assert_eq!(config(8, 0.3).covid_size(), 2);
        assert_eq!(config(4, 0.1).covid_size(), 1);
        assert_eq!(config(4, 0.0).covid_size(), 1);
        assert_eq!(config(4, 1.0).covid_size(), 4);
    }

    #[test]
    fn test_covid_drawn_with_replacement_when_pool_small() {
        let (dir, records) = fixture();
        let mut sampler = BalancedSampler::new(dir.path(), records, config(4, 1.0)).unwrap();

        let batch = sampler.next_batch().unwrap();
        assert_eq!(covid_count(&batch), 4);
    }

    #[test]
    fn test_cursor_wraps_after_pass() {
        let (dir, records) = fixture();
        let mut sampler = BalancedSampler::new(dir.path(), records, config(4, 0.3)).unwrap();

        for expected in [1, 2, 0, 1] {
            sampler.next_batch().unwrap();
            assert_eq!(sampler.cursor(), expected);
        }
    }

    #[test]
    fn test_weights_follow_class() {
        let (dir, records) = fixture();
        let mut sampler = BalancedSampler::new(dir.path(), records, config(4, 0.5)).unwrap();

        for item in sampler.next_batch().unwrap() {
            let expected = if item.label == ClassLabel::Covid19 { 12.0 } else { 1.0 };
            assert_eq!(item.weight, expected);
            assert_eq!(item.image.len(), transform::IMAGE_LEN);
        }
    }

    #[test]
    fn test_same_seed_same_batches() {
        let (dir, records) = fixture();
        let mut a = BalancedSampler::new(dir.path(), records.clone(), config(3, 0.3)).unwrap();
        let mut b = BalancedSampler::new(dir.path(), records, config(3, 0.3)).unwrap();

        for _ in 0..5 {
            let left = a.next().unwrap().unwrap();
            let right = b.next().unwrap().unwrap();
            let left: Vec<_> = left.iter().map(|i| (i.label, i.image.clone())).collect();
            let right: Vec<_> = right.iter().map(|i| (i.label, i.image.clone())).collect();
            assert_eq!(left, right);
        }
    }

    #[test]
    fn test_empty_covid_pool_rejected() {
        let (dir, records) = fixture();
        let records: Vec<_> = records
            .into_iter()
            .filter(|r| r.class != ClassLabel::Covid19)
            .collect();

        let err = BalancedSampler::new(dir.path(), records, config(4, 0.3)).err().unwrap();
        assert!(matches!(err, CovidNetError::EmptyClassPool("COVID-19")));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let (dir, records) = fixture();
        let bad = config(4, 0.3).with_class_weights(vec![1.0, 1.0]);
        assert!(BalancedSampler::new(dir.path(), records.clone(), bad).is_err());
        assert!(BalancedSampler::new(dir.path(), records, config(0, 0.3)).is_err());
    }

    #[test]
    fn test_config_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sampler.json");
        let saved = config(4, 0.25).with_class_weights(vec![1.0, 2.0, 6.0]);
        saved.save(&path).unwrap();

        let loaded = SamplerConfig::load(&path).unwrap();
        assert_eq!(loaded.batch_size, 4);
        assert_eq!(loaded.covid_percent, 0.25);
        assert_eq!(loaded.class_weights, vec![1.0, 2.0, 6.0]);
        assert!(loaded.validate().is_ok());
    }

    #[test]
    fn test_missing_image_aborts_batch() {
        let (dir, mut records) = fixture();
        for record in records.iter_mut() {
            record.relative_path = format!("missing/{}", record.relative_path);
        }
        let mut sampler = BalancedSampler::new(dir.path(), records, config(4, 0.3)).unwrap();

        let err = sampler.next_batch().unwrap_err();
        assert!(matches!(err, CovidNetError::Image { .. }));
    }

    #[test]
    fn test_eval_mode_reads_test_folder() {
        let (dir, records) = fixture();
        std::fs::rename(dir.path().join("train"), dir.path().join("test")).unwrap();
        let cfg = config(4, 0.3).with_is_training(false);
        let mut sampler = BalancedSampler::new(dir.path(), records, cfg).unwrap();

        assert_eq!(sampler.next_batch().unwrap().len(), 4);
    }
}
