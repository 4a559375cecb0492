//! Scripted stand-in for yt-dlp.
//!
//! Each URL can be given a queue of attempts; once the queue is empty the
//! default attempt (a short successful download) is used. The fake counts
//! starts per URL and how many handles are alive at once.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tunedl_core::pipeline::{
    DownloadHandle, DownloadRequest, Downloader, PipelineError, ProcessEvent, ProcessExit,
};

#[derive(Debug, Clone)]
pub enum Attempt {
    /// `steps` progress events `step_delay` apart, then a converted file.
    Succeed { steps: u32, step_delay: Duration },
    /// Like `Succeed`, but reports exactly `percents`, e.g. a video stream
    /// followed by an audio stream that starts over from zero.
    Streams { percents: Vec<f64>, step_delay: Duration },
    /// Print `lines`, exit with `code`.
    Fail { lines: Vec<String>, code: i32 },
    /// Report 5%, then run until stopped. `ignore_term` needs a kill.
    Hang { ignore_term: bool },
}

impl Attempt {
    pub fn quick() -> Self {
        Attempt::Succeed {
            steps: 4,
            step_delay: Duration::from_millis(5),
        }
    }

    pub fn slow() -> Self {
        Attempt::Succeed {
            steps: 10,
            step_delay: Duration::from_millis(20),
        }
    }

    /// Two streams, each counting 0 to 100.
    pub fn two_streams() -> Self {
        Attempt::Streams {
            percents: vec![20.0, 60.0, 100.0, 10.0, 50.0, 100.0],
            step_delay: Duration::from_millis(20),
        }
    }

    pub fn fail(msg: &str) -> Self {
        Attempt::Fail {
            lines: vec!["[youtube] Extracting URL".into(), msg.into()],
            code: 1,
        }
    }

    pub fn hang() -> Self {
        Attempt::Hang { ignore_term: false }
    }
}

pub struct FakeDownloader {
    scripts: Mutex<HashMap<String, VecDeque<Attempt>>>,
    default: Attempt,
    starts: Mutex<Vec<String>>,
    running: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl FakeDownloader {
    pub fn new() -> Self {
        Self::with_default(Attempt::quick())
    }

    pub fn with_default(default: Attempt) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            default,
            starts: Mutex::new(Vec::new()),
            running: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn script(self, url: &str, attempts: Vec<Attempt>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(url.to_string(), attempts.into());
        self
    }

    pub fn starts_of(&self, url: &str) -> usize {
        self.starts.lock().unwrap().iter().filter(|u| *u == url).count()
    }

    pub fn started(&self) -> Vec<String> {
        self.starts.lock().unwrap().clone()
    }

    /// Handles not yet reaped or dropped.
    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Downloader for FakeDownloader {
    async fn start(&self, req: &DownloadRequest) -> Result<Box<dyn DownloadHandle>, PipelineError> {
        self.starts.lock().unwrap().push(req.url.clone());
        let attempt = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&req.url)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| self.default.clone());
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let title = req
            .url
            .rsplit('/')
            .next()
            .unwrap_or("track")
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        Ok(Box::new(FakeHandle {
            attempt,
            temp_dir: req.temp_dir.clone(),
            title,
            emitted: 0,
            term: false,
            killed: false,
            running: Arc::clone(&self.running),
            released: false,
        }))
    }
}

struct FakeHandle {
    attempt: Attempt,
    temp_dir: PathBuf,
    title: String,
    emitted: u32,
    term: bool,
    killed: bool,
    running: Arc<AtomicUsize>,
    released: bool,
}

impl FakeHandle {
    fn stopped(&self) -> bool {
        self.killed || (self.term && !matches!(self.attempt, Attempt::Hang { ignore_term: true }))
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.running.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for FakeHandle {
    fn drop(&mut self) {
        self.release();
    }
}

#[async_trait]
impl DownloadHandle for FakeHandle {
    async fn next_event(&mut self) -> Option<ProcessEvent> {
        if self.stopped() {
            return None;
        }
        match self.attempt.clone() {
            Attempt::Succeed { .. } | Attempt::Streams { .. } => {
                let (percents, step_delay) = match self.attempt.clone() {
                    Attempt::Succeed { steps, step_delay } => (
                        (1..=steps)
                            .map(|step| 100.0 * f64::from(step) / f64::from(steps))
                            .collect::<Vec<_>>(),
                        step_delay,
                    ),
                    Attempt::Streams { percents, step_delay } => (percents, step_delay),
                    _ => unreachable!(),
                };
                let steps = percents.len() as u32;
                if self.emitted == 0 {
                    self.emitted = 1;
                    let dest = self.temp_dir.join(format!("{}.webm", self.title));
                    std::fs::write(&dest, b"partial").ok()?;
                    return Some(ProcessEvent::Destination(dest));
                }
                let step = self.emitted;
                if step <= steps {
                    tokio::time::sleep(step_delay).await;
                    self.emitted += 1;
                    return Some(ProcessEvent::Progress {
                        percent: percents[step as usize - 1],
                        eta_secs: Some(u64::from(steps - step)),
                    });
                }
                if step == steps + 1 {
                    self.emitted += 1;
                    let _ = std::fs::remove_file(self.temp_dir.join(format!("{}.webm", self.title)));
                    let out = self.temp_dir.join(format!("{}.mp3", self.title));
                    std::fs::write(&out, format!("audio of {}", self.title)).ok()?;
                    return Some(ProcessEvent::Extracted(out));
                }
                None
            }
            Attempt::Fail { lines, .. } => {
                let line = lines.get(self.emitted as usize)?.clone();
                self.emitted += 1;
                Some(ProcessEvent::Output { line, stderr: true })
            }
            Attempt::Hang { .. } => {
                if self.emitted == 0 {
                    self.emitted = 1;
                    let part = self.temp_dir.join(format!("{}.webm.part", self.title));
                    std::fs::write(&part, b"partial").ok()?;
                    return Some(ProcessEvent::Progress {
                        percent: 5.0,
                        eta_secs: None,
                    });
                }
                std::future::pending().await
            }
        }
    }

    fn request_stop(&mut self) -> Result<(), PipelineError> {
        self.term = true;
        Ok(())
    }

    fn kill(&mut self) -> Result<(), PipelineError> {
        self.killed = true;
        Ok(())
    }

    async fn wait(&mut self) -> Result<ProcessExit, PipelineError> {
        let code = if self.stopped() {
            None
        } else {
            match &self.attempt {
                Attempt::Succeed { .. } | Attempt::Streams { .. } => Some(0),
                Attempt::Fail { code, .. } => Some(*code),
                Attempt::Hang { .. } => std::future::pending().await,
            }
        };
        self.release();
        Ok(ProcessExit { code })
    }
}
