use anyhow::{Context, Result};
use clap::Parser;
use maskwatch_core::{
    load_labels, Classification, ClassifierOptions, FaceRegionDetector, MaskClassifier,
    MaskVerdict,
};
use maskwatch_hw::{load_rgb, Camera, FrameSource, StillImageSource};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod config;
mod live;
mod report;
mod viewer;

use config::Config;
use live::{LiveError, LiveSession, VerdictSource};

#[derive(Parser, Debug)]
#[command(
    name = "maskwatch",
    about = "Classify an image for face masks, then annotate faces live"
)]
struct Cli {
    /// Image to be classified
    #[arg(short = 'i', long = "image", default_value = "wm.jpg")]
    image: PathBuf,

    /// ONNX classification model to be executed
    #[arg(
        short = 'm',
        long = "model_file",
        alias = "model-file",
        default_value = "Mask_Detection(MobileNetV2).onnx"
    )]
    model_file: PathBuf,

    /// File containing labels, one per line
    #[arg(
        short = 'l',
        long = "label_file",
        alias = "label-file",
        default_value = "labels.txt"
    )]
    label_file: PathBuf,

    /// Input mean for floating-point models
    #[arg(long = "input_mean", alias = "input-mean", default_value_t = 127.5)]
    input_mean: f32,

    /// Input standard deviation for floating-point models
    #[arg(long = "input_std", alias = "input-std", default_value_t = 127.5)]
    input_std: f32,

    /// Number of inference threads
    #[arg(long = "num_threads", alias = "num-threads")]
    num_threads: Option<usize>,

    /// TOML configuration file for the live loop
    #[arg(long)]
    config: Option<PathBuf>,

    /// V4L2 device for live frames (default: replay the input image)
    #[arg(long)]
    camera: Option<String>,

    /// Render one annotated frame to this file instead of opening a window
    #[arg(long)]
    save_annotated: Option<PathBuf>,

    /// Skip the live loop after classification
    #[arg(long)]
    no_live: bool,

    /// Classify each detected face instead of reusing the still-image result
    #[arg(long)]
    classify_regions: bool,

    /// Print the classification as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(device) = &cli.camera {
        config.camera_device = Some(device.clone());
    }

    let labels = load_labels(&cli.label_file)?;
    let options = ClassifierOptions {
        input_mean: cli.input_mean,
        input_std: cli.input_std,
        num_threads: cli.num_threads,
    };
    let mut classifier = MaskClassifier::load(&cli.model_file, &options)
        .with_context(|| format!("failed to load classifier {}", cli.model_file.display()))?;
    let (input_width, input_height) = classifier.input_size();
    tracing::info!(
        precision = ?classifier.precision(),
        input_width,
        input_height,
        labels = labels.len(),
        "classifier ready"
    );

    let image = load_rgb(&cli.image)?;
    let classification = classifier
        .classify(&image, &labels)
        .with_context(|| format!("failed to classify {}", cli.image.display()))?;

    if cli.json {
        println!("{}", report::format_json(&classification, classifier.precision())?);
    } else {
        println!("{}", report::format_text(&classification));
    }

    if cli.no_live {
        return Ok(());
    }

    let verdicts = if cli.classify_regions {
        VerdictSource::per_region(classifier, labels)?
    } else {
        VerdictSource::Fixed(still_verdict(&classification)?)
    };

    // Acquired once; released when the session drops.
    let detector = FaceRegionDetector::load(&config.face_model).with_context(|| {
        format!("failed to load face detector {}", config.face_model.display())
    })?;

    match &config.camera_device {
        Some(device) => {
            let mut camera = Camera::open(device).map_err(|e| {
                let available = Camera::list_devices();
                tracing::warn!(
                    devices = ?available.iter().map(|d| (&d.path, &d.name)).collect::<Vec<_>>(),
                    "available capture devices"
                );
                e
            })?;
            camera.warm_up(config.warmup_frames)?;
            run_live(&cli, &config, detector, camera, verdicts)
        }
        None => {
            let source = StillImageSource::from_image(image, &cli.image);
            run_live(&cli, &config, detector, source, verdicts)
        }
    }
}

fn still_verdict(classification: &Classification) -> Result<MaskVerdict, LiveError> {
    MaskVerdict::from_confidences(&classification.confidences)
        .ok_or(LiveError::TooFewClasses(classification.confidences.len()))
}

fn run_live<S: FrameSource + 'static>(
    cli: &Cli,
    config: &Config,
    detector: FaceRegionDetector,
    source: S,
    verdicts: VerdictSource,
) -> Result<()> {
    let mut session = LiveSession::new(detector, source, verdicts);

    match &cli.save_annotated {
        Some(path) => {
            let annotated = session.step()?;
            annotated
                .frame
                .image
                .save(path)
                .with_context(|| format!("failed to write {}", path.display()))?;
            tracing::info!(
                path = %path.display(),
                face = annotated.region.is_some(),
                "saved annotated frame"
            );
            Ok(())
        }
        None => viewer::run_window(&config.window_title, session),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["maskwatch"]).unwrap();
        assert_eq!(cli.image, PathBuf::from("wm.jpg"));
        assert_eq!(cli.model_file, PathBuf::from("Mask_Detection(MobileNetV2).onnx"));
        assert_eq!(cli.label_file, PathBuf::from("labels.txt"));
        assert_eq!(cli.input_mean, 127.5);
        assert_eq!(cli.input_std, 127.5);
        assert_eq!(cli.num_threads, None);
        assert!(!cli.no_live && !cli.classify_regions && !cli.json);
    }

    #[test]
    fn test_cli_underscore_flags() {
        let cli = Cli::try_parse_from([
            "maskwatch",
            "-i",
            "face.png",
            "--model_file",
            "quant.onnx",
            "-l",
            "classes.txt",
            "--input_mean",
            "0",
            "--input_std",
            "255",
            "--num_threads",
            "4",
        ])
        .unwrap();
        assert_eq!(cli.image, PathBuf::from("face.png"));
        assert_eq!(cli.model_file, PathBuf::from("quant.onnx"));
        assert_eq!(cli.label_file, PathBuf::from("classes.txt"));
        assert_eq!(cli.input_mean, 0.0);
        assert_eq!(cli.input_std, 255.0);
        assert_eq!(cli.num_threads, Some(4));
    }

    #[test]
    fn test_cli_rejects_bad_thread_count() {
        assert!(Cli::try_parse_from(["maskwatch", "--num_threads", "many"]).is_err());
    }

    #[test]
    fn test_still_verdict_requires_two_classes() {
        let classification = Classification {
            predictions: vec![],
            confidences: vec![1.0],
            inference_time: std::time::Duration::ZERO,
        };
        assert!(matches!(
            still_verdict(&classification),
            Err(LiveError::TooFewClasses(1))
        ));
    }
}
