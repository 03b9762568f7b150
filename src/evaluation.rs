use std::path::Path;

use tracing::{debug, info};

use crate::error::{CovidNetError, Result};
use crate::graph::{argmax, Classifier};
use crate::labels::{ClassLabel, LabelRecord};
use crate::metrics::{ConfusionMatrix, EvalReport};
use crate::transform;

/// Classify every record one image at a time and tally the confusion matrix.
///
/// Images are read from `image_dir/<relative_path>` with the evaluation
/// transform (no augmentation). The first unreadable image aborts the pass.
pub fn evaluate<C: Classifier + ?Sized>(
    graph: &C,
    records: &[LabelRecord],
    image_dir: &Path,
) -> Result<EvalReport> {
    let signature = graph.signature();
    debug!(
        input = %signature.input,
        output = %signature.softmax,
        records = records.len(),
        "Evaluating"
    );

    let mut matrix = ConfusionMatrix::new();
    for record in records {
        let image = transform::preprocess(&image_dir.join(&record.relative_path))?;
        let scores = graph.predict(&image)?;
        let predicted = ClassLabel::from_index(argmax(&scores)).ok_or_else(|| {
            CovidNetError::Inference(format!("no class for scores {scores:?}"))
        })?;
        matrix.record(record.class, predicted);
    }

    info!(
        samples = matrix.total(),
        accuracy = matrix.accuracy(),
        "Evaluation finished"
    );
    Ok(EvalReport::from(matrix))
}

/// Evaluate and print the report to stdout.
pub fn evaluate_and_print<C: Classifier + ?Sized>(
    graph: &C,
    records: &[LabelRecord],
    image_dir: &Path,
) -> Result<EvalReport> {
    let report = evaluate(graph, records, image_dir)?;
    println!("{report}");
    Ok(report)
}
