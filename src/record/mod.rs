//! Recording state machine: converts host ticks into a fixed-rate sequence
//! of exported samples, then saves, validates, and packages the result.

mod clock;
pub mod document;
pub mod export;
pub mod package;
pub mod thumbnail;

use std::path::PathBuf;

pub use clock::SampleClock;

use crate::config::RecordSettings;
use crate::record::document::{DocumentFormat, SceneDocument};
use crate::record::export::{
    with_export_transform, ExportContext, ExportError, SampleExporter, UsdSampleExporter,
};
use crate::record::package::{Packager, TEMP_DIR_PREFIX};
use crate::record::thumbnail::{capture_thumbnail, ThumbnailError, ThumbnailRenderer};
use crate::scene::SceneNode;

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("a recording is already in progress")]
    AlreadyRecording,
    #[error("export root has no children to record")]
    NoExportTargets,
    #[error("no output file name configured and none derivable from the scene")]
    NoFileName,
    #[error("scene document was not written: {0}")]
    MissingOutput(PathBuf),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error(transparent)]
    Thumbnail(#[from] ThumbnailError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Observable recorder state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    Idle,
    Recording,
}

/// Live state of one capture. Exists iff the recorder is in `Recording`.
struct RecordingSession {
    document: SceneDocument,
    context: ExportContext,
    clock: SampleClock,
    /// True until the very first sample of the session has been exported.
    first_sample_pending: bool,
}

/// Drives a capture lifecycle over an externally owned scene root.
///
/// Single-threaded by design: the host calls `advance` from its tick loop
/// and each tick's work completes before the next is processed. `stop` runs
/// its cleanup synchronously and may be called between ticks at any point.
pub struct SceneRecorder {
    settings: RecordSettings,
    exporter: Box<dyn SampleExporter>,
    camera: Option<Box<dyn ThumbnailRenderer>>,
    session: Option<RecordingSession>,
}

impl SceneRecorder {
    pub fn new(settings: RecordSettings) -> Self {
        Self::with_exporter(settings, Box::new(UsdSampleExporter))
    }

    pub fn with_exporter(settings: RecordSettings, exporter: Box<dyn SampleExporter>) -> Self {
        Self {
            settings,
            exporter,
            camera: None,
            session: None,
        }
    }

    /// Configure the camera used for the per-recording thumbnail. Without
    /// one, no thumbnail is captured.
    pub fn set_thumbnail_camera(&mut self, camera: Box<dyn ThumbnailRenderer>) {
        self.camera = Some(camera);
    }

    pub fn state(&self) -> RecordState {
        if self.session.is_some() {
            RecordState::Recording
        } else {
            RecordState::Idle
        }
    }

    pub fn is_recording(&self) -> bool {
        self.session.is_some()
    }

    /// Index of the most recent timed sample, 0 before the first one.
    pub fn current_sample(&self) -> u64 {
        self.session.as_ref().map_or(0, |s| s.clock.samples())
    }

    /// Begin a capture of `root`. Fails without a state change when a
    /// recording is already live, the root has no children, or no output
    /// name can be derived.
    pub fn record(&mut self, root: &SceneNode) -> Result<(), RecordError> {
        if self.session.is_some() {
            return Err(RecordError::AlreadyRecording);
        }
        if root.children.is_empty() {
            return Err(RecordError::NoExportTargets);
        }
        let name = self.derive_file_name(root).ok_or(RecordError::NoFileName)?;

        if let Some(camera) = &self.camera {
            capture_thumbnail(camera.as_ref(), &self.settings.export_dir, &name)?;
        }

        let format = if self.settings.text_documents {
            DocumentFormat::Text
        } else {
            DocumentFormat::Binary
        };
        let document_path = self
            .settings
            .export_dir
            .join(format!("{TEMP_DIR_PREFIX}{name}"))
            .join(format!("{name}.{}", format.extension()));
        let document = SceneDocument::create(
            document_path,
            format,
            self.settings.frame_rate.as_f64(),
            self.settings.record_secs,
        )?;

        self.session = Some(RecordingSession {
            document,
            context: ExportContext::new(),
            clock: SampleClock::new(self.settings.frame_rate.as_f64()),
            first_sample_pending: true,
        });
        tracing::info!(
            name = %name,
            frame_rate = self.settings.frame_rate.as_u32(),
            "recording started"
        );
        Ok(())
    }

    /// Account for one host tick of `dt` seconds. No-op while idle.
    ///
    /// The first sample of a session is exported immediately, untimed, with
    /// no elapsed-time accounting for that tick. Afterwards each elapsed
    /// sample period exports one timed sample; the duration bound is checked
    /// after every individual sample so a stalled tick cannot overshoot it.
    pub fn advance(&mut self, root: &mut SceneNode, dt: f64) -> Result<(), RecordError> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };

        if session.first_sample_pending {
            session.first_sample_pending = false;
            let result = Self::export_sample(
                self.exporter.as_mut(),
                session,
                root,
                self.settings.flip_axis,
            );
            // Materials only on the first sample of a session.
            session.context.export_materials = false;
            result?;
            return Ok(());
        }

        session.clock.advance(dt);
        loop {
            let Some(session) = self.session.as_mut() else {
                return Ok(());
            };
            let Some(sample) = session.clock.next_sample() else {
                return Ok(());
            };
            if sample as f64 * session.clock.period() >= self.settings.record_secs {
                // Normal termination: the configured duration is reached.
                return self.stop(root);
            }
            session.document.set_time(Some(sample as f64));
            Self::export_sample(
                self.exporter.as_mut(),
                session,
                root,
                self.settings.flip_axis,
            )?;
        }
    }

    /// End the capture, flushing and packaging its document. No-op while
    /// idle. The session is torn down and the recorder returns to `Idle` on
    /// every exit path, including failed exports and failed packaging.
    pub fn stop(&mut self, root: &mut SceneNode) -> Result<(), RecordError> {
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };

        // A session that never exported still produces a static document.
        let snapshot_result = if session.first_sample_pending {
            session.first_sample_pending = false;
            session.document.set_time(None);
            Self::export_sample(
                self.exporter.as_mut(),
                &mut session,
                root,
                self.settings.flip_axis,
            )
        } else {
            Ok(())
        };

        // Save unconditionally, even when the snapshot export failed; the
        // session was already detached, so the state reset cannot be skipped.
        let save_result = session.document.save();
        snapshot_result?;
        let saved_path = save_result?;
        if !saved_path.exists() {
            return Err(RecordError::MissingOutput(saved_path));
        }

        // Text documents double as the kept intermediate.
        let delete_intermediates = !self.settings.text_documents;
        let packager = Packager::new(self.settings.export_dir.clone(), delete_intermediates);
        match packager.package(&saved_path) {
            Ok(archive) => {
                tracing::info!(archive = %archive.display(), "recording finished");
            }
            Err(err) => {
                // Reported but never escalated; the recorder is already idle
                // and the document is intact on disk.
                tracing::error!(error = %err, "packaging failed, scene document kept");
            }
        }
        Ok(())
    }

    fn export_sample(
        exporter: &mut dyn SampleExporter,
        session: &mut RecordingSession,
        root: &mut SceneNode,
        flip_axis: bool,
    ) -> Result<(), ExportError> {
        with_export_transform(root, flip_axis, |scaled| {
            exporter.export(scaled, &session.context, &mut session.document)
        })
    }

    fn derive_file_name(&self, root: &SceneNode) -> Option<String> {
        let name = match &self.settings.file_name {
            Some(explicit) if !explicit.is_empty() => explicit.clone(),
            _ => root.children.first()?.name.clone(),
        };
        if name.is_empty() {
            return None;
        }
        Some(name)
    }
}
