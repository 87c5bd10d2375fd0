//! Fake collaborators for unit tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::capture::{AudioDevice, CaptureError, CaptureSegment, RecordingHandle};
use crate::classify::{ClassifyError, Classifier};
use crate::location::{Coordinates, LocationError, LocationProvider};
use crate::notify::{Alert, NotifyError, Notifier};
use crate::permission::Permission;

/// Device that counts open recordings
pub struct FakeDevice {
    permission: Permission,
    permission_requests: AtomicUsize,
    started: AtomicUsize,
    stopped: AtomicUsize,
    max_open: AtomicUsize,
    /// Starts beyond this count fail
    start_limit: Option<usize>,
}

impl FakeDevice {
    fn build(permission: Permission, start_limit: Option<usize>) -> Arc<Self> {
        Arc::new(Self {
            permission,
            permission_requests: AtomicUsize::new(0),
            started: AtomicUsize::new(0),
            stopped: AtomicUsize::new(0),
            max_open: AtomicUsize::new(0),
            start_limit,
        })
    }

    pub fn granting() -> Arc<Self> {
        Self::build(Permission::Granted, None)
    }

    pub fn denying() -> Arc<Self> {
        Self::build(Permission::Denied, None)
    }

    /// Grants permission but fails every start after the first `n`
    pub fn failing_after(n: usize) -> Arc<Self> {
        Self::build(Permission::Granted, Some(n))
    }

    pub fn permission_requests(&self) -> usize {
        self.permission_requests.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn stopped(&self) -> usize {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Recordings started and not yet stopped
    pub fn open_count(&self) -> usize {
        self.started() - self.stopped()
    }

    /// Highest number of simultaneously open recordings seen
    pub fn max_open(&self) -> usize {
        self.max_open.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioDevice for FakeDevice {
    async fn request_permission(&self) -> Permission {
        self.permission_requests.fetch_add(1, Ordering::SeqCst);
        self.permission
    }

    async fn start_recording(&self) -> Result<RecordingHandle, CaptureError> {
        if let Some(limit) = self.start_limit {
            if self.started() >= limit {
                return Err(CaptureError::Device("device unplugged".to_string()));
            }
        }
        let id = self.started.fetch_add(1, Ordering::SeqCst) as u64;
        self.max_open.fetch_max(self.open_count(), Ordering::SeqCst);
        Ok(RecordingHandle::new(id))
    }

    async fn stop_recording(&self, _handle: RecordingHandle) -> Result<Vec<u8>, CaptureError> {
        self.stopped.fetch_add(1, Ordering::SeqCst);
        Ok(vec![0u8; 16])
    }
}

enum Script {
    /// Answer queued results, then this text forever
    Queue(Mutex<VecDeque<Result<String, ClassifyError>>>, String),
    /// Never answer
    Hang,
}

/// Classifier replaying scripted answers after an optional delay
pub struct ScriptedClassifier {
    script: Script,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedClassifier {
    fn build(script: Script, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            script,
            delay,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }

    pub fn always(text: &str) -> Arc<Self> {
        Self::sequence(Vec::new(), text)
    }

    /// Answer `results` in order, then `then` forever
    pub fn sequence(results: Vec<Result<String, ClassifyError>>, then: &str) -> Arc<Self> {
        Self::build(
            Script::Queue(Mutex::new(results.into()), then.to_string()),
            Duration::ZERO,
        )
    }

    /// Every call fails with a transport error
    pub fn failing() -> Arc<Self> {
        let failures = (0..64)
            .map(|_| Err(ClassifyError::Transport("connection refused".to_string())))
            .collect();
        Self::sequence(failures, "")
    }

    pub fn hanging() -> Arc<Self> {
        Self::build(Script::Hang, Duration::ZERO)
    }

    /// Same answers, each after `delay`
    pub fn slow(text: &str, delay: Duration) -> Arc<Self> {
        Self::build(
            Script::Queue(Mutex::new(VecDeque::new()), text.to_string()),
            delay,
        )
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    async fn classify(&self, _segment: &CaptureSegment) -> Result<String, ClassifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        struct InFlight<'a>(&'a AtomicUsize);
        impl Drop for InFlight<'_> {
            fn drop(&mut self) {
                self.0.fetch_sub(1, Ordering::SeqCst);
            }
        }
        let _guard = InFlight(&self.in_flight);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match &self.script {
            Script::Hang => std::future::pending().await,
            Script::Queue(queue, then) => {
                let next = queue.lock().unwrap().pop_front();
                next.unwrap_or_else(|| Ok(then.clone()))
            }
        }
    }
}

enum Fix {
    At(Coordinates),
    Denied,
    Unavailable,
    Hang,
}

pub struct FakeLocator {
    fix: Fix,
}

impl FakeLocator {
    pub fn at(position: Coordinates) -> Arc<Self> {
        Arc::new(Self { fix: Fix::At(position) })
    }

    pub fn denied() -> Arc<Self> {
        Arc::new(Self { fix: Fix::Denied })
    }

    pub fn unavailable() -> Arc<Self> {
        Arc::new(Self { fix: Fix::Unavailable })
    }

    pub fn hanging() -> Arc<Self> {
        Arc::new(Self { fix: Fix::Hang })
    }
}

#[async_trait]
impl LocationProvider for FakeLocator {
    async fn request_permission(&self) -> Permission {
        match self.fix {
            Fix::Denied => Permission::Denied,
            _ => Permission::Granted,
        }
    }

    async fn current_position(&self) -> Result<Coordinates, LocationError> {
        match self.fix {
            Fix::At(position) => Ok(position),
            Fix::Denied => Err(LocationError::PermissionDenied),
            Fix::Unavailable => Err(LocationError::Unavailable("no fix".to_string())),
            Fix::Hang => std::future::pending().await,
        }
    }
}

/// Notifier that records every alert it is given
pub struct RecordingNotifier {
    alerts: Mutex<Vec<Alert>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            alerts: Mutex::new(Vec::new()),
            fail: false,
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            alerts: Mutex::new(Vec::new()),
            fail: true,
        })
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, alert: &Alert) -> Result<(), NotifyError> {
        self.alerts.lock().unwrap().push(alert.clone());
        if self.fail {
            return Err(NotifyError::Delivery("speaker muted".to_string()));
        }
        Ok(())
    }
}
