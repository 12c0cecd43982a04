//! Console output for a still-image classification.

use maskwatch_core::{Classification, ModelPrecision, Prediction};
use serde::Serialize;

/// One line per prediction, then the inference time.
pub fn format_text(classification: &Classification) -> String {
    let mut out = String::new();
    for prediction in &classification.predictions {
        out.push_str(&format!("{:08.6}: {}\n", prediction.confidence, prediction.label));
    }
    out.push_str(&format!("time: {:.3}ms", classification.inference_ms()));
    out
}

#[derive(Serialize)]
struct JsonReport<'a> {
    precision: &'static str,
    predictions: &'a [Prediction],
    inference_ms: f64,
}

pub fn format_json(
    classification: &Classification,
    precision: ModelPrecision,
) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&JsonReport {
        precision: if precision.is_quantized() {
            "quantized"
        } else {
            "floating"
        },
        predictions: &classification.predictions,
        inference_ms: classification.inference_ms(),
    })
}
