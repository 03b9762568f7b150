use std::fs;
use std::path::Path;

use burn::backend::{Autodiff, NdArray};
use covid_net::training::{adam, train, RunPaths, TrainingConfig, WeightsSource};
use covid_net::{CovidNetConfig, EvalReport, SamplerConfig};
use image::{Rgb, RgbImage};

type TestBackend = Autodiff<NdArray>;

const TRAIN: &str = "\
1 n1.png normal
2 n2.png normal
3 n3.png normal
4 p1.png pneumonia
5 p2.png pneumonia
6 c1.png COVID-19
7 c2.png COVID-19
";

const TEST: &str = "\
8 t1.png normal
9 t2.png pneumonia
10 t3.png COVID-19
";

fn write_split(root: &Path, split: &str, labels: &str) {
    let dir = root.join(split);
    fs::create_dir_all(&dir).unwrap();
    for (i, line) in labels.lines().enumerate() {
        let name = line.split_whitespace().nth(1).unwrap();
        let shade = (i * 30) as u8;
        RgbImage::from_fn(40, 48, |x, y| Rgb([shade, (x * 5) as u8, (y * 5) as u8]))
            .save(dir.join(name))
            .unwrap();
    }
    fs::write(root.join(format!("{split}.txt")), labels).unwrap();
}

fn fixture(root: &Path) -> RunPaths {
    let data_dir = root.join("data");
    write_split(&data_dir, "train", TRAIN);
    write_split(&data_dir, "test", TEST);
    RunPaths {
        train_file: data_dir.join("train.txt"),
        test_file: data_dir.join("test.txt"),
        data_dir,
        output_dir: root.join("output"),
        weights: None,
    }
}

fn small_config(epochs: usize) -> TrainingConfig {
    config_with_filters(epochs, 4)
}

fn config_with_filters(epochs: usize, base_filters: usize) -> TrainingConfig {
    let sampler = SamplerConfig::new().with_batch_size(2).with_seed(7);
    let model = CovidNetConfig::new().with_base_filters(base_filters);
    TrainingConfig::new(adam(), sampler, model)
        .with_num_epochs(epochs)
        .with_learning_rate(1e-3)
}

#[test]
fn one_epoch_writes_checkpoints_and_reports() {
    let root = tempfile::tempdir().unwrap();
    let paths = fixture(root.path());

    let outcome = train::<TestBackend>(small_config(1), &paths, Default::default()).unwrap();

    assert_eq!(outcome.run_dir, root.path().join("output").join("COVIDNet-lr1e-3"));
    for file in ["config.json", "model.meta", "model.mpk", "model-1.mpk", "eval-1.json"] {
        assert!(outcome.run_dir.join(file).exists(), "missing {file}");
    }
    assert!(!outcome.run_dir.join("model-2.mpk").exists());

    let loss = outcome.last_loss.unwrap();
    assert!(loss.is_finite() && loss >= 0.0);
    assert_eq!(outcome.last_report.matrix.total(), 3);

    let saved: EvalReport =
        serde_json::from_str(&fs::read_to_string(outcome.run_dir.join("eval-1.json")).unwrap()).unwrap();
    assert_eq!(saved, outcome.last_report);
}

#[test]
fn training_resumes_from_saved_checkpoint() {
    let root = tempfile::tempdir().unwrap();
    let mut paths = fixture(root.path());

    let first = train::<TestBackend>(small_config(1), &paths, Default::default()).unwrap();

    paths.output_dir = root.path().join("resumed");
    paths.weights = Some(WeightsSource {
        dir: first.run_dir.clone(),
        meta_name: "model.meta".to_string(),
        ckpt_name: "model-1".to_string(),
    });

    // The stored graph wins over the config's model section.
    let config = config_with_filters(1, 8);
    let second = train::<TestBackend>(config, &paths, Default::default()).unwrap();

    assert!(second.run_dir.join("model-1.mpk").exists());
    assert_eq!(second.last_report.matrix.total(), 3);
}

#[test]
fn missing_weights_folder_fails_before_training() {
    let root = tempfile::tempdir().unwrap();
    let mut paths = fixture(root.path());
    paths.weights = Some(WeightsSource {
        dir: root.path().join("nowhere"),
        meta_name: "model.meta".to_string(),
        ckpt_name: "model".to_string(),
    });

    assert!(train::<TestBackend>(small_config(1), &paths, Default::default()).is_err());
}
