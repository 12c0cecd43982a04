//! Display window for the live loop.
//!
//! Every repaint runs one session step; pressing `q` or closing the window
//! ends the loop. The first error raised by a step is handed back to the
//! caller once the window has closed. The window is sized from the first
//! frame and the frame is scaled down to fit the panel.

use crate::live::{LiveError, LiveSession, QUIT_KEY};
use eframe::egui;
use maskwatch_core::FaceLocator;
use maskwatch_hw::FrameSource;
use std::cell::RefCell;
use std::rc::Rc;

const DEFAULT_WINDOW_SIZE: [f32; 2] = [640.0, 480.0];
/// Largest window opened for a frame; bigger frames are scaled down.
const MAX_WINDOW_SIZE: [f32; 2] = [1280.0, 960.0];

/// Window size for a `width` x `height` frame: native size when it fits,
/// otherwise scaled down to [`MAX_WINDOW_SIZE`] keeping the aspect ratio.
fn window_size_for(width: u32, height: u32) -> egui::Vec2 {
    if width == 0 || height == 0 {
        return DEFAULT_WINDOW_SIZE.into();
    }
    let (w, h) = (width as f32, height as f32);
    let scale = (MAX_WINDOW_SIZE[0] / w).min(MAX_WINDOW_SIZE[1] / h).min(1.0);
    egui::vec2(w * scale, h * scale)
}

struct LiveWindow<D: FaceLocator, S: FrameSource> {
    session: LiveSession<D, S>,
    texture: Option<egui::TextureHandle>,
    sized: bool,
    failure: Rc<RefCell<Option<LiveError>>>,
}

impl<D: FaceLocator, S: FrameSource> LiveWindow<D, S> {
    fn show_frame(&mut self, ctx: &egui::Context, image: egui::ColorImage) {
        match &mut self.texture {
            Some(texture) => texture.set(image, egui::TextureOptions::LINEAR),
            None => {
                self.texture = Some(ctx.load_texture("frame", image, egui::TextureOptions::LINEAR))
            }
        }
    }
}

impl<D: FaceLocator, S: FrameSource> eframe::App for LiveWindow<D, S> {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if ctx.input(|i| i.key_pressed(egui::Key::Q)) {
            self.session.handle_key(QUIT_KEY);
        }
        if !self.session.is_running() {
            tracing::info!(frames = self.session.frames_rendered(), "closing window");
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
            return;
        }

        match self.session.step() {
            Ok(annotated) => {
                let frame = &annotated.frame;
                if !self.sized {
                    let size = window_size_for(frame.width(), frame.height());
                    ctx.send_viewport_cmd(egui::ViewportCommand::InnerSize(size));
                    self.sized = true;
                }
                let size = [frame.width() as usize, frame.height() as usize];
                self.show_frame(ctx, egui::ColorImage::from_rgb(size, frame.image.as_raw()));
            }
            Err(e) => {
                tracing::error!(error = %e, "live loop failed");
                self.failure.borrow_mut().get_or_insert(e);
                self.session.stop();
                ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                return;
            }
        }

        egui::CentralPanel::default()
            .frame(egui::Frame::none())
            .show(ctx, |ui| {
                if let Some(texture) = &self.texture {
                    ui.centered_and_justified(|ui| {
                        ui.add(
                            egui::Image::new((texture.id(), texture.size_vec2())).shrink_to_fit(),
                        );
                    });
                }
            });

        ctx.request_repaint();
    }
}

/// Open a window and run the session until `q`, window close, or an error.
pub fn run_window<D, S>(title: &str, session: LiveSession<D, S>) -> anyhow::Result<()>
where
    D: FaceLocator + 'static,
    S: FrameSource + 'static,
{
    let failure = Rc::new(RefCell::new(None));
    let app = LiveWindow {
        session,
        texture: None,
        sized: false,
        failure: Rc::clone(&failure),
    };

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title(title)
            .with_inner_size(DEFAULT_WINDOW_SIZE),
        ..Default::default()
    };

    eframe::run_native(title, options, Box::new(move |_cc| Box::new(app)))
        .map_err(|e| anyhow::anyhow!("display window failed: {e}"))?;

    let failure = failure.borrow_mut().take();
    match failure {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_size_keeps_small_frames_native() {
        assert_eq!(window_size_for(640, 480), egui::vec2(640.0, 480.0));
        assert_eq!(window_size_for(300, 200), egui::vec2(300.0, 200.0));
    }

    #[test]
    fn test_window_size_scales_large_frames_to_fit() {
        let size = window_size_for(3840, 2160);
        assert!(size.x <= MAX_WINDOW_SIZE[0] + 1e-3 && size.y <= MAX_WINDOW_SIZE[1] + 1e-3);
        assert!((size.x / size.y - 3840.0 / 2160.0).abs() < 1e-3);
        assert!((size.x - 1280.0).abs() < 1e-3);

        let tall = window_size_for(1000, 4000);
        assert!((tall.y - 960.0).abs() < 1e-3);
        assert!((tall.x - 240.0).abs() < 1e-3);
    }

    #[test]
    fn test_window_size_empty_frame_uses_default() {
        assert_eq!(window_size_for(0, 480), egui::vec2(640.0, 480.0));
    }
}
