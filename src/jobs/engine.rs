// src/jobs/engine.rs
//
// Batch video processing.
//
// A job reads every frame of its input in order and runs detection on a
// sampled subset, `stride = max(1, round(input_fps / target_fps))`.
// Sampled frames are classified, annotated and logged; the rest are
// copied through untouched so the output keeps the input's timing.
//
// There is no tracking or cooldown here: every sampled face is an event.

use super::job::{Job, JobSummary};
use super::store::JobStore;
use crate::annotate::draw_detections;
use crate::detection::{classify_face, detect_faces, Classifier, Detector};
use crate::pipeline::{AlertPolicy, EventRecord, EventSink, PipelineMetrics};
use crate::types::{Config, Detection, Frame, Source, VideoConfig};
use crate::video::{FrameSink, FrameSource, VideoBackend};
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Clone)]
pub struct JobEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: VideoConfig,
    detector: Arc<dyn Detector>,
    classifier: Arc<dyn Classifier>,
    events: Arc<dyn EventSink>,
    backend: Arc<dyn VideoBackend>,
    store: JobStore,
}

impl JobEngine {
    pub fn new(
        config: &Config,
        detector: Arc<dyn Detector>,
        classifier: Arc<dyn Classifier>,
        events: Arc<dyn EventSink>,
        backend: Arc<dyn VideoBackend>,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                config: config.video.clone(),
                detector,
                classifier,
                events,
                backend,
                store: JobStore::new(),
            }),
        }
    }

    pub fn store(&self) -> &JobStore {
        &self.inner.store
    }

    /// Register a Pending job. Nothing is processed until `run`/`spawn`.
    pub fn create_job(&self, input_ref: impl Into<PathBuf>) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let input_ref = input_ref.into();
        info!("📥 Job {} created for {}", id, input_ref.display());
        self.inner.store.insert(Job::new(id.clone(), input_ref));
        id
    }

    pub fn get_job(&self, job_id: &str) -> Option<Job> {
        self.inner.store.get(job_id)
    }

    pub fn list_jobs(&self) -> Vec<Job> {
        self.inner.store.list()
    }

    /// Create a job and start it in the background.
    pub fn submit(&self, input_ref: impl Into<PathBuf>) -> String {
        let id = self.create_job(input_ref);
        let _detached = self.spawn(id.clone());
        id
    }

    /// Run the job on tokio's blocking pool. Must be called inside a runtime.
    pub fn spawn(&self, job_id: String) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::task::spawn_blocking(move || {
            if let Err(e) = engine.run(&job_id) {
                warn!("Job {} not run: {:#}", job_id, e);
            }
        })
    }

    /// Process a Pending job to completion on the calling thread.
    ///
    /// Processing failures are recorded on the job and return `Ok`; `Err`
    /// means the job does not exist or was already started.
    pub fn run(&self, job_id: &str) -> Result<()> {
        let store = &self.inner.store;
        let started = store.update(job_id, |job| job.start().then(|| job.input_ref.clone()));
        let input_ref = match started {
            None => bail!("Unknown job {}", job_id),
            Some(None) => bail!("Job {} is not pending", job_id),
            Some(Some(input)) => input,
        };

        info!("🎬 Job {} processing {}", job_id, input_ref.display());
        match self.process(job_id, &input_ref) {
            Ok((output_ref, summary)) => {
                info!(
                    "✓ Job {} completed: {} sampled frame(s), {} detection(s) -> {}",
                    job_id,
                    summary.processed_frames,
                    summary.total_detections,
                    output_ref.display()
                );
                store.update(job_id, |job| job.complete(output_ref, summary));
            }
            Err(e) => {
                let message = format!("Video processing error: {:#}", e);
                error!("❌ Job {}: {}", job_id, message);
                store.update(job_id, |job| job.fail(message));
            }
        }
        Ok(())
    }

    fn process(&self, job_id: &str, input_ref: &Path) -> Result<(PathBuf, JobSummary)> {
        let inner = &self.inner;
        let mut source = inner
            .backend
            .open_input(input_ref)
            .with_context(|| format!("Failed to open video file {}", input_ref.display()))?;

        let props = source.properties();
        let target_fps = inner.config.target_fps.max(1) as f64;
        let fps = if props.fps > 0.0 { props.fps } else { target_fps };
        let total_frames = if props.total_frames > 0 {
            props.total_frames as u64
        } else {
            1
        };
        let stride = sampling_stride(fps, target_fps);
        debug!(
            "Job {}: {:.2} fps, {} frame(s), stride {}",
            job_id, fps, total_frames, stride
        );

        let output_ref = self.output_path(input_ref);
        let mut sink = inner
            .backend
            .open_output(&output_ref, fps, props.width, props.height)
            .with_context(|| format!("Failed to open output {}", output_ref.display()))?;

        let summary = self.encode(job_id, source.as_mut(), sink.as_mut(), stride, total_frames)?;
        sink.finish().context("Failed to finalise output video")?;
        Ok((output_ref, summary))
    }

    fn encode(
        &self,
        job_id: &str,
        source: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
        stride: u64,
        total_frames: u64,
    ) -> Result<JobSummary> {
        let metrics = PipelineMetrics::new();
        let mut summary = JobSummary::default();
        let mut frames_read: u64 = 0;

        while let Some(frame) = source.read_frame()? {
            let index = frames_read;
            frames_read += 1;

            if index % stride != 0 {
                metrics.inc(&metrics.frames_skipped);
                sink.write_frame(&frame)?;
                continue;
            }

            let detections = self.analyse_frame(&frame, index)?;
            summary.total_detections += detections.len() as u64;
            for det in &detections {
                *summary.label_counts.entry(det.label).or_insert(0) += 1;
            }
            summary.processed_frames += 1;
            metrics.inc(&metrics.frames_processed);
            metrics.add(&metrics.faces_detected, detections.len() as u64);

            sink.write_frame(&draw_detections(&frame, &detections))?;

            let percent = (frames_read * 100 / total_frames).min(u32::MAX as u64) as u32;
            self.inner
                .store
                .update(job_id, |job| job.update_progress(percent));
        }

        summary.total_frames = total_frames.max(frames_read);
        let m = metrics.summary();
        debug!(
            "Job {}: read {} frame(s), skipped {}, {:.1} fps",
            job_id, frames_read, m.frames_skipped, m.fps
        );
        Ok(summary)
    }

    fn analyse_frame(&self, frame: &Frame, index: u64) -> Result<Vec<Detection>> {
        let inner = &self.inner;
        let boxes = detect_faces(inner.detector.as_ref(), frame);
        let mut detections = Vec::with_capacity(boxes.len());

        for bbox in boxes {
            let Some(region) = frame.crop(&bbox) else {
                continue;
            };
            let (label, confidence) = classify_face(inner.classifier.as_ref(), &region);
            let decision = AlertPolicy::decide(Source::Video, label, None);

            let event = EventRecord::new(Source::Video, label, confidence)
                .with_meta(serde_json::json!({ "frame": index, "box": bbox }));
            inner
                .events
                .log_event(event)
                .with_context(|| format!("Failed to log event for frame {}", index))?;

            detections.push(Detection {
                track_id: None,
                bbox,
                label,
                confidence,
                alert: decision.alert(),
            });
        }
        Ok(detections)
    }

    /// `<output_dir>/<prefix>_<YYYYmmdd_HHMMSS>_<8 hex><ext>`
    fn output_path(&self, input_ref: &Path) -> PathBuf {
        let ext = input_ref
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("mp4");
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let short = uuid::Uuid::new_v4().simple().to_string();
        let name = format!(
            "{}_{}_{}.{}",
            self.inner.config.output_prefix,
            stamp,
            &short[..8],
            ext
        );
        self.inner.config.output_dir.join(name)
    }
}

/// Every `stride`-th frame is analysed. Never 0.
pub fn sampling_stride(fps: f64, target_fps: f64) -> u64 {
    if fps.is_nan() || fps <= 0.0 || target_fps <= 0.0 {
        return 1;
    }
    ((fps / target_fps).round() as u64).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobStatus;
    use crate::pipeline::MemoryEventLog;
    use crate::types::{BBox, Label};
    use crate::video::VideoProperties;
    use std::sync::Mutex;

    const W: usize = 64;
    const H: usize = 48;

    fn plain(index: usize) -> Frame {
        let mut f = Frame::filled(W, H, [0, 0, 0]);
        f.timestamp_ms = index as f64;
        f
    }

    struct FakeSource {
        props: VideoProperties,
        frames: usize,
        read: usize,
    }

    impl FrameSource for FakeSource {
        fn properties(&self) -> VideoProperties {
            self.props
        }

        fn read_frame(&mut self) -> Result<Option<Frame>> {
            if self.read == self.frames {
                return Ok(None);
            }
            self.read += 1;
            Ok(Some(plain(self.read - 1)))
        }
    }

    /// Job to read back from the store on every write.
    type Watch = Option<(JobStore, String)>;

    struct FakeSink {
        written: Arc<Mutex<Vec<Frame>>>,
        fail_after: Option<usize>,
        finished: Arc<Mutex<bool>>,
        watch: Watch,
        seen: Arc<Mutex<Vec<(JobStatus, u8)>>>,
    }

    impl FrameSink for FakeSink {
        fn write_frame(&mut self, frame: &Frame) -> Result<()> {
            if let Some((store, id)) = &self.watch {
                let job = store.get(id).unwrap();
                self.seen.lock().unwrap().push((job.status, job.progress));
            }
            let mut written = self.written.lock().unwrap();
            if Some(written.len()) == self.fail_after {
                bail!("disk full");
            }
            written.push(frame.clone());
            Ok(())
        }

        fn finish(self: Box<Self>) -> Result<()> {
            *self.finished.lock().unwrap() = true;
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeBackend {
        fps: f64,
        total_frames: i64,
        frames: usize,
        unreadable: bool,
        fail_after: Option<usize>,
        written: Arc<Mutex<Vec<Frame>>>,
        output: Arc<Mutex<Option<(PathBuf, f64)>>>,
        finished: Arc<Mutex<bool>>,
        watch: Mutex<Watch>,
        seen: Arc<Mutex<Vec<(JobStatus, u8)>>>,
    }

    impl VideoBackend for FakeBackend {
        fn open_input(&self, path: &Path) -> Result<Box<dyn FrameSource>> {
            if self.unreadable {
                bail!("no such file: {}", path.display());
            }
            Ok(Box::new(FakeSource {
                props: VideoProperties {
                    fps: self.fps,
                    total_frames: self.total_frames,
                    width: W,
                    height: H,
                },
                frames: self.frames,
                read: 0,
            }))
        }

        fn open_output(
            &self,
            path: &Path,
            fps: f64,
            _width: usize,
            _height: usize,
        ) -> Result<Box<dyn FrameSink>> {
            *self.output.lock().unwrap() = Some((path.to_path_buf(), fps));
            Ok(Box::new(FakeSink {
                written: self.written.clone(),
                fail_after: self.fail_after,
                finished: self.finished.clone(),
                watch: self.watch.lock().unwrap().clone(),
                seen: self.seen.clone(),
            }))
        }
    }

    fn engine(backend: Arc<FakeBackend>, log: Arc<MemoryEventLog>) -> JobEngine {
        let detector: Arc<dyn Detector> = Arc::new(|_: &Frame| vec![BBox::new(8, 8, 28, 28)]);
        let classifier: Arc<dyn Classifier> = Arc::new(|_: &Frame| (Label::NoMask, 0.75_f32));
        JobEngine::new(&Config::default(), detector, classifier, log, backend)
    }

    #[test]
    fn test_stride() {
        assert_eq!(sampling_stride(30.0, 5.0), 6);
        assert_eq!(sampling_stride(29.97, 5.0), 6);
        assert_eq!(sampling_stride(4.0, 5.0), 1);
        assert_eq!(sampling_stride(0.0, 5.0), 1);
        assert_eq!(sampling_stride(f64::NAN, 5.0), 1);
    }

    #[test]
    fn test_create_job_is_pending() {
        let engine = engine(Arc::new(FakeBackend::default()), Arc::new(MemoryEventLog::new()));
        let id = engine.create_job("clip.mp4");
        let job = engine.get_job(&id).unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.progress, 0);
        assert!(engine.get_job("nope").is_none());
        assert_eq!(engine.list_jobs().len(), 1);
    }

    #[test]
    fn test_hundred_frames_at_thirty_fps() {
        let backend = Arc::new(FakeBackend {
            fps: 30.0,
            total_frames: 100,
            frames: 100,
            ..Default::default()
        });
        let log = Arc::new(MemoryEventLog::new());
        let engine = engine(backend.clone(), log.clone());

        let id = engine.create_job("uploads/clip.mp4");
        engine.run(&id).unwrap();

        let job = engine.get_job(&id).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert!(job.completed_at.is_some());
        assert!(job.error.is_none());

        let summary = job.summary.unwrap();
        assert_eq!(summary.processed_frames, 17);
        assert_eq!(summary.total_frames, 100);
        assert_eq!(summary.total_detections, 17);
        assert_eq!(summary.label_counts[&Label::NoMask], 17);
        assert_eq!(summary.label_counts[&Label::MaskOn], 0);

        let events = log.events();
        assert_eq!(events.len(), 17);
        assert!(events.iter().all(|e| e.source == Source::Video));
        assert_eq!(events[1].meta.as_ref().unwrap()["frame"], 6);

        // every frame is written, only sampled ones are annotated
        let written = backend.written.lock().unwrap();
        assert_eq!(written.len(), 100);
        assert_ne!(written[0].data, plain(0).data);
        assert_eq!(written[1].data, plain(1).data);
        assert_ne!(written[6].data, plain(6).data);
        assert!(*backend.finished.lock().unwrap());

        let (path, fps) = backend.output.lock().unwrap().clone().unwrap();
        assert_eq!(fps, 30.0);
        assert_eq!(job.output_ref, Some(path.clone()));
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("annotated_"));
        assert!(name.ends_with(".mp4"));
    }

    #[test]
    fn test_progress_seen_by_readers_never_decreases() {
        let backend = Arc::new(FakeBackend {
            fps: 30.0,
            total_frames: 100,
            frames: 100,
            ..Default::default()
        });
        let engine = engine(backend.clone(), Arc::new(MemoryEventLog::new()));
        let id = engine.create_job("clip.mp4");
        *backend.watch.lock().unwrap() = Some((engine.store().clone(), id.clone()));

        engine.run(&id).unwrap();

        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen.len(), 100);
        assert!(seen.iter().all(|(status, _)| *status == JobStatus::Processing));
        let progress: Vec<u8> = seen.iter().map(|(_, p)| *p).collect();
        assert_eq!(progress[0], 0);
        assert!(progress.windows(2).all(|w| w[0] <= w[1]), "{:?}", progress);
        assert!(progress.iter().all(|p| *p <= 99));
        // last sampled frame is index 96, so 97 frames read
        assert_eq!(*progress.last().unwrap(), 97);

        assert_eq!(engine.get_job(&id).unwrap().progress, 100);
    }

    #[test]
    fn test_unknown_fps_and_frame_count_fall_back() {
        let backend = Arc::new(FakeBackend {
            fps: 0.0,
            total_frames: -1,
            frames: 10,
            ..Default::default()
        });
        let engine = engine(backend.clone(), Arc::new(MemoryEventLog::new()));
        let id = engine.create_job("cam.avi");
        engine.run(&id).unwrap();

        let job = engine.get_job(&id).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        let summary = job.summary.unwrap();
        assert_eq!(summary.processed_frames, 10, "stride 1 when fps is unknown");
        assert_eq!(summary.total_frames, 10);

        let (path, fps) = backend.output.lock().unwrap().clone().unwrap();
        assert_eq!(fps, 5.0);
        assert_eq!(path.extension().unwrap(), "avi");
    }

    #[test]
    fn test_unopenable_input_fails_job() {
        let backend = Arc::new(FakeBackend {
            unreadable: true,
            ..Default::default()
        });
        let engine = engine(backend, Arc::new(MemoryEventLog::new()));
        let id = engine.create_job("missing.mp4");
        engine.run(&id).unwrap();

        let job = engine.get_job(&id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        let error = job.error.unwrap();
        assert!(error.starts_with("Video processing error:"));
        assert!(error.contains("missing.mp4"));
        assert!(job.output_ref.is_none());
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn test_write_failure_mid_stream_fails_job() {
        let backend = Arc::new(FakeBackend {
            fps: 5.0,
            total_frames: 20,
            frames: 20,
            fail_after: Some(8),
            ..Default::default()
        });
        let engine = engine(backend.clone(), Arc::new(MemoryEventLog::new()));
        let id = engine.create_job("clip.mp4");
        engine.run(&id).unwrap();

        let job = engine.get_job(&id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.unwrap().contains("disk full"));
        assert!(job.progress < 100);
        assert!(!*backend.finished.lock().unwrap());
    }

    #[test]
    fn test_run_twice_is_rejected() {
        let backend = Arc::new(FakeBackend {
            fps: 5.0,
            total_frames: 2,
            frames: 2,
            ..Default::default()
        });
        let engine = engine(backend, Arc::new(MemoryEventLog::new()));
        let id = engine.create_job("clip.mp4");
        engine.run(&id).unwrap();
        assert!(engine.run(&id).is_err());
        assert!(engine.run("unknown").is_err());
        assert_eq!(engine.get_job(&id).unwrap().status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_spawn_runs_on_blocking_pool() {
        let backend = Arc::new(FakeBackend {
            fps: 10.0,
            total_frames: 20,
            frames: 20,
            ..Default::default()
        });
        let engine = engine(backend, Arc::new(MemoryEventLog::new()));
        let id = engine.create_job("clip.mp4");
        engine.spawn(id.clone()).await.unwrap();

        let job = engine.get_job(&id).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.summary.unwrap().processed_frames, 10);
    }

    #[tokio::test]
    async fn test_submit_eventually_completes() {
        let backend = Arc::new(FakeBackend {
            fps: 5.0,
            total_frames: 5,
            frames: 5,
            ..Default::default()
        });
        let engine = engine(backend, Arc::new(MemoryEventLog::new()));
        let id = engine.submit("clip.mp4");

        let mut status = JobStatus::Pending;
        for _ in 0..500 {
            status = engine.get_job(&id).unwrap().status;
            if status.is_terminal() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(status, JobStatus::Completed);
        assert_eq!(status.as_str(), "completed");
    }
}
