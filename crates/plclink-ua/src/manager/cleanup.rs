// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Cleanup Coordinator.
//!
//! Tears a connection down in a fixed order:
//!
//! 1. Delete every subscription on the server
//! 2. Unregister every registered node (one batched request)
//! 3. Close the session
//! 4. Disconnect the transport
//! 5. Clear both registries and return to `Disconnected`
//!
//! Steps 1 to 4 record failures and continue. Step 5 always runs. Callers
//! must hold the lifecycle lock.

use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{SessionError, UaResult};
use crate::session::ProtocolSession;

use super::Inner;
use super::supervisor::ConnectionState;

// =============================================================================
// CleanupReason
// =============================================================================

/// Why a cleanup pass ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CleanupReason {
    /// Explicit `disconnect`.
    Disconnect,
    /// Failure detected by a probe, an operation or a session event.
    Fault {
        /// What was detected.
        reason: String,
    },
    /// `connect` failed part way.
    ConnectFailed,
}

impl fmt::Display for CleanupReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnect => write!(f, "disconnect"),
            Self::Fault { reason } => write!(f, "fault: {reason}"),
            Self::ConnectFailed => write!(f, "connect failed"),
        }
    }
}

// =============================================================================
// TeardownStep
// =============================================================================

/// One ordered teardown step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TeardownStep {
    /// Delete subscriptions on the server.
    DeleteSubscriptions,
    /// Release registered nodes.
    UnregisterNodes,
    /// Close the session.
    CloseSession,
    /// Close the transport.
    Disconnect,
}

impl TeardownStep {
    /// Returns the step name for logging.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::DeleteSubscriptions => "delete_subscriptions",
            Self::UnregisterNodes => "unregister_nodes",
            Self::CloseSession => "close_session",
            Self::Disconnect => "disconnect",
        }
    }
}

impl fmt::Display for TeardownStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recorded step failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepFailure {
    /// The failing step.
    pub step: TeardownStep,
    /// What the step was acting on, if anything specific.
    pub subject: Option<String>,
    /// Error text.
    pub error: String,
}

// =============================================================================
// TeardownReport
// =============================================================================

/// Outcome of one cleanup pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeardownReport {
    /// Why the pass ran.
    pub reason: CleanupReason,
    /// When the pass started.
    pub started_at: DateTime<Utc>,
    /// How long the pass took.
    #[serde(with = "duration_text")]
    pub duration: Duration,
    /// Subscriptions dropped from the registry.
    pub subscriptions_cleared: usize,
    /// Registered nodes dropped from the registry.
    pub nodes_cleared: usize,
    /// Failures recorded by steps 1 to 4.
    pub failures: Vec<StepFailure>,
    /// `false` for a disconnect on an already disconnected manager.
    pub performed: bool,
}

impl TeardownReport {
    fn begin(reason: CleanupReason) -> Self {
        Self {
            reason,
            started_at: Utc::now(),
            duration: Duration::ZERO,
            subscriptions_cleared: 0,
            nodes_cleared: 0,
            failures: Vec::new(),
            performed: true,
        }
    }

    /// A report for a pass that had nothing to tear down.
    pub fn noop(reason: CleanupReason) -> Self {
        Self {
            performed: false,
            ..Self::begin(reason)
        }
    }

    /// Returns `true` if every step succeeded.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Returns the failures of one step.
    pub fn failures_for(&self, step: TeardownStep) -> impl Iterator<Item = &StepFailure> {
        self.failures.iter().filter(move |f| f.step == step)
    }
}

mod duration_text {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*duration))
    }
}

// =============================================================================
// StepRunner
// =============================================================================

/// Runs steps with a per-step time limit and records failures.
pub(crate) struct StepRunner {
    step_timeout: Duration,
    failures: Vec<StepFailure>,
}

impl StepRunner {
    pub(crate) fn new(step_timeout: Duration) -> Self {
        Self {
            step_timeout,
            failures: Vec::new(),
        }
    }

    /// Runs one step. Never returns the error.
    pub(crate) async fn run<F>(&mut self, step: TeardownStep, subject: Option<String>, fut: F) -> bool
    where
        F: Future<Output = UaResult<()>>,
    {
        let outcome = match tokio::time::timeout(self.step_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(SessionError::timed_out(
                step.as_str(),
                format!("no answer within {:?}", self.step_timeout),
            )
            .into()),
        };

        match outcome {
            Ok(()) => true,
            Err(e) => {
                self.record(step, subject, e.to_string());
                false
            }
        }
    }

    /// Records a step that could not run.
    pub(crate) fn record(&mut self, step: TeardownStep, subject: Option<String>, error: String) {
        warn!(step = %step, subject = subject.as_deref().unwrap_or("-"), error = %error, "Cleanup step failed");
        self.failures.push(StepFailure {
            step,
            subject,
            error,
        });
    }

    pub(crate) fn step_timeout(&self) -> Duration {
        self.step_timeout
    }

    pub(crate) fn into_failures(self) -> Vec<StepFailure> {
        self.failures
    }
}

// =============================================================================
// Teardown
// =============================================================================

impl<S: ProtocolSession> Inner<S> {
    /// Runs a full cleanup pass. The caller holds the lifecycle lock.
    pub(crate) async fn teardown(&self, reason: CleanupReason) -> TeardownReport {
        let started = Instant::now();
        let mut report = TeardownReport::begin(reason);
        let mut runner = StepRunner::new(self.settings.step_timeout);

        // Events still in flight belong to the connection being torn down.
        self.supervisor.advance_generation();

        debug!(reason = %report.reason, "Cleanup started");

        let subscriptions = self.subscriptions.read().await.session_ids();
        let aliases = self.nodes.read().await.aliases();

        {
            let session = self.session.read().await;

            for (handle, id) in &subscriptions {
                runner
                    .run(
                        TeardownStep::DeleteSubscriptions,
                        Some(handle.to_string()),
                        session.delete_subscription(*id),
                    )
                    .await;
            }

            if !aliases.is_empty() {
                runner
                    .run(TeardownStep::UnregisterNodes, None, session.unregister_nodes(&aliases))
                    .await;
            }
        }

        // In-flight reads hold the session; a hung one must not stall cleanup.
        match tokio::time::timeout(runner.step_timeout(), self.session.write()).await {
            Ok(mut session) => {
                runner
                    .run(TeardownStep::CloseSession, None, session.close_session())
                    .await;
                runner
                    .run(TeardownStep::Disconnect, None, session.disconnect())
                    .await;
            }
            Err(_) => {
                let error = format!(
                    "session still busy after {:?}, skipped",
                    runner.step_timeout()
                );
                runner.record(TeardownStep::CloseSession, None, error.clone());
                runner.record(TeardownStep::Disconnect, None, error);
            }
        }

        self.stop_listener().await;

        {
            let mut subscriptions = self.subscriptions.write().await;
            let mut nodes = self.nodes.write().await;
            report.subscriptions_cleared = subscriptions.len();
            report.nodes_cleared = nodes.len();
            subscriptions.clear();
            nodes.clear();
        }
        self.supervisor.set_config(None).await;
        self.supervisor.set_state(ConnectionState::Disconnected);

        report.failures = runner.into_failures();
        report.duration = started.elapsed();

        self.stats.record_cleanup(report.failures.len());
        info!(
            reason = %report.reason,
            subscriptions = report.subscriptions_cleared,
            nodes = report.nodes_cleared,
            failures = report.failures.len(),
            duration_ms = report.duration.as_millis() as u64,
            "Cleanup complete"
        );

        *self.last_teardown.write().await = Some(report.clone());
        report
    }
}

// =============================================================================
// Tests
// =============================================================================
