//! Live annotation loop: acquire a frame, find a face, label it, draw.
//!
//! The session owns the detector, the frame source and (optionally) the
//! region classifier. Dropping it releases all of them, whichever way the
//! loop ends.

use maskwatch_core::annotate;
use maskwatch_core::{
    ClassifierError, DetectorError, FaceLocator, FaceRegion, LabelSet, MaskClassifier,
    MaskVerdict,
};
use maskwatch_hw::{CaptureError, Frame, FrameSource};
use thiserror::Error;

/// Key that stops the loop.
pub const QUIT_KEY: char = 'q';

#[derive(Error, Debug)]
pub enum LiveError {
    #[error("capture error: {0}")]
    Capture(#[from] CaptureError),
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("classifier error: {0}")]
    Classifier(#[from] ClassifierError),
    #[error("mask verdict needs at least two classes (Mask, No Mask), got {0}")]
    TooFewClasses(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Stopped,
}

impl LoopState {
    /// The only transition: Running → Stopped on the quit key.
    pub fn on_key(self, key: char) -> Self {
        match (self, key) {
            (LoopState::Running, QUIT_KEY) => LoopState::Stopped,
            (state, _) => state,
        }
    }
}

/// Where the label for a detected face comes from.
pub enum VerdictSource {
    /// One verdict computed up front from the still-image classification.
    Fixed(MaskVerdict),
    /// Classify each detected region with the loaded classifier.
    PerRegion {
        classifier: MaskClassifier,
        labels: LabelSet,
    },
}

impl VerdictSource {
    /// Check the label set can express a mask verdict before the loop starts.
    pub fn per_region(classifier: MaskClassifier, labels: LabelSet) -> Result<Self, LiveError> {
        if labels.len() < 2 {
            return Err(LiveError::TooFewClasses(labels.len()));
        }
        Ok(VerdictSource::PerRegion { classifier, labels })
    }

    fn resolve(&mut self, frame: &Frame, region: &FaceRegion) -> Result<MaskVerdict, LiveError> {
        match self {
            VerdictSource::Fixed(verdict) => Ok(*verdict),
            VerdictSource::PerRegion { classifier, labels } => {
                let crop = image::imageops::crop_imm(
                    &frame.image,
                    region.start_x,
                    region.start_y,
                    region.width(),
                    region.height(),
                )
                .to_image();
                let classification = classifier.classify(&crop, labels)?;
                MaskVerdict::from_confidences(&classification.confidences)
                    .ok_or(LiveError::TooFewClasses(classification.confidences.len()))
            }
        }
    }
}

/// One rendered iteration.
pub struct AnnotatedFrame {
    pub frame: Frame,
    pub region: Option<FaceRegion>,
    pub verdict: Option<MaskVerdict>,
}

pub struct LiveSession<D: FaceLocator, S: FrameSource> {
    detector: D,
    source: S,
    verdicts: VerdictSource,
    state: LoopState,
    frames: u64,
}

impl<D: FaceLocator, S: FrameSource> LiveSession<D, S> {
    pub fn new(detector: D, source: S, verdicts: VerdictSource) -> Self {
        tracing::info!(source = %source.describe(), "live session started");
        Self {
            detector,
            source,
            verdicts,
            state: LoopState::Running,
            frames: 0,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == LoopState::Running
    }

    pub fn handle_key(&mut self, key: char) {
        let next = self.state.on_key(key);
        if next != self.state {
            tracing::info!(frames = self.frames, "quit key pressed");
        }
        self.state = next;
    }

    /// Stop without a key press (window closed or fatal error).
    pub fn stop(&mut self) {
        self.state = LoopState::Stopped;
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames
    }

    /// Run one iteration. Frames without a face above threshold come back
    /// unannotated.
    pub fn step(&mut self) -> Result<AnnotatedFrame, LiveError> {
        let mut frame = self.source.next_frame()?;
        let region = self.detector.locate(&frame.image)?;

        let verdict = match &region {
            Some(region) => {
                let verdict = self.verdicts.resolve(&frame, region)?;
                annotate::draw_verdict(&mut frame.image, region, &verdict);
                Some(verdict)
            }
            None => None,
        };

        tracing::trace!(
            seq = frame.sequence,
            latency_us = frame.timestamp.elapsed().as_micros() as u64,
            ?region,
            ?verdict,
            "frame rendered"
        );
        self.frames += 1;

        Ok(AnnotatedFrame {
            frame,
            region,
            verdict,
        })
    }
}

impl<D: FaceLocator, S: FrameSource> Drop for LiveSession<D, S> {
    fn drop(&mut self) {
        tracing::info!(
            frames = self.frames,
            state = ?self.state,
            source = %self.source.describe(),
            "live session released"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use maskwatch_core::MaskState;
    use maskwatch_hw::StillImageSource;

    /// Replays a fixed list of detector outputs, one per call.
    struct ScriptedLocator {
        script: Vec<Option<FaceRegion>>,
        calls: usize,
    }

    impl FaceLocator for ScriptedLocator {
        fn locate(&mut self, _frame: &RgbImage) -> Result<Option<FaceRegion>, DetectorError> {
            let out = self.script.get(self.calls).copied().flatten();
            self.calls += 1;
            Ok(out)
        }
    }

    struct FailingSource;

    impl FrameSource for FailingSource {
        fn next_frame(&mut self) -> Result<Frame, CaptureError> {
            Err(CaptureError::CaptureFailed("unplugged".into()))
        }

        fn describe(&self) -> String {
            "failing".into()
        }
    }

    fn region() -> FaceRegion {
        FaceRegion {
            start_x: 20,
            start_y: 30,
            end_x: 60,
            end_y: 70,
            confidence: 0.9,
        }
    }

    fn session(script: Vec<Option<FaceRegion>>) -> LiveSession<ScriptedLocator, StillImageSource> {
        let source = StillImageSource::from_image(RgbImage::new(100, 80), "blank.png");
        let verdict = MaskVerdict::from_confidences(&[0.9, 0.1]).unwrap();
        LiveSession::new(
            ScriptedLocator { script, calls: 0 },
            source,
            VerdictSource::Fixed(verdict),
        )
    }

    #[test]
    fn test_state_machine() {
        assert_eq!(LoopState::Running.on_key('x'), LoopState::Running);
        assert_eq!(LoopState::Running.on_key('q'), LoopState::Stopped);
        assert_eq!(LoopState::Stopped.on_key('x'), LoopState::Stopped);
        assert_eq!(LoopState::Stopped.on_key('q'), LoopState::Stopped);
    }

    #[test]
    fn test_step_annotates_detected_face() {
        let mut live = session(vec![Some(region())]);
        let out = live.step().unwrap();

        assert_eq!(out.region, Some(region()));
        let verdict = out.verdict.unwrap();
        assert_eq!(verdict.state, MaskState::Mask);
        assert_eq!(*out.frame.image.get_pixel(20, 50), Rgb([0, 255, 0]));
        assert_eq!(live.frames_rendered(), 1);
    }

    #[test]
    fn test_step_without_face_leaves_frame_untouched() {
        let mut live = session(vec![None]);
        let out = live.step().unwrap();

        assert!(out.region.is_none());
        assert!(out.verdict.is_none());
        assert!(out.frame.image.pixels().all(|p| *p == Rgb([0, 0, 0])));
    }

    #[test]
    fn test_annotations_do_not_leak_between_frames() {
        let mut live = session(vec![Some(region()), None]);
        live.step().unwrap();
        let second = live.step().unwrap();
        assert!(second.frame.image.pixels().all(|p| *p == Rgb([0, 0, 0])));
        assert_eq!(live.frames_rendered(), 2);
    }

    #[test]
    fn test_quit_key_stops_session() {
        let mut live = session(vec![]);
        assert!(live.is_running());
        live.handle_key('a');
        assert!(live.is_running());
        live.handle_key(QUIT_KEY);
        assert!(!live.is_running());
        live.handle_key('x');
        assert!(!live.is_running());
    }

    #[test]
    fn test_capture_failure_propagates() {
        let verdict = MaskVerdict::from_confidences(&[0.2, 0.8]).unwrap();
        let mut live = LiveSession::new(
            ScriptedLocator {
                script: vec![],
                calls: 0,
            },
            FailingSource,
            VerdictSource::Fixed(verdict),
        );
        assert!(matches!(live.step(), Err(LiveError::Capture(_))));
    }
}
