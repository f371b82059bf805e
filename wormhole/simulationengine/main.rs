use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use shared_logging::LogLevel;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{
    cancel::CancelToken,
    config::ShaftConfig,
    helper::SimulationTelemetry,
    pacing::{ImmediatePacer, Pacer, TokioPacer},
    progress::{Emitter, ProgressListener, RunEvent, RunEvents},
    repository::SimulationRepository,
    state::{AttemptStage, ProgressSnapshot, RunState, SimulationResult, Termination},
};

/// Per-run bounds layered on top of the escape condition.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Stop with [`Termination::AttemptCeiling`] after this many attempts.
    pub max_attempts: Option<u64>,
    /// Stop with [`Termination::Cancelled`] once triggered.
    pub cancel: Option<CancelToken>,
}

impl RunOptions {
    /// Sets the attempt ceiling.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u64) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Attaches a cancel token.
    #[must_use]
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Runs the climb/fall loop for shaft configurations.
///
/// The simulator keeps no state between runs apart from the progress listener
/// slot. Clones share that slot, telemetry and pacer.
#[derive(Clone)]
pub struct ShaftSimulator {
    inner: Arc<SimulatorInner>,
}

struct SimulatorInner {
    telemetry: Option<SimulationTelemetry>,
    pacer: Arc<dyn Pacer>,
    listener: Mutex<Option<Arc<dyn ProgressListener>>>,
    max_attempts: Option<u64>,
}

impl std::fmt::Debug for ShaftSimulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaftSimulator")
            .field("telemetry", &self.inner.telemetry)
            .field("max_attempts", &self.inner.max_attempts)
            .field("has_listener", &self.inner.listener.lock().is_some())
            .finish_non_exhaustive()
    }
}

impl Default for ShaftSimulator {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ShaftSimulator {
    /// Returns a builder.
    #[must_use]
    pub fn builder() -> ShaftSimulatorBuilder {
        ShaftSimulatorBuilder::default()
    }

    /// Registers the progress listener, replacing any previous one.
    ///
    /// Runs pick up the listener when they start.
    pub fn set_progress_listener(&self, listener: Arc<dyn ProgressListener>) {
        *self.inner.listener.lock() = Some(listener);
    }

    /// Removes the progress listener.
    pub fn clear_progress_listener(&self) {
        *self.inner.listener.lock() = None;
    }

    /// Telemetry handle, if configured.
    #[must_use]
    pub fn telemetry(&self) -> Option<&SimulationTelemetry> {
        self.inner.telemetry.as_ref()
    }

    /// Runs `config` to completion with the builder's default bounds.
    ///
    /// Without an attempt ceiling a stalling configuration never resolves;
    /// see [`ShaftConfig::risk`].
    pub async fn simulate(&self, config: ShaftConfig) -> SimulationResult {
        self.simulate_with(config, RunOptions::default()).await
    }

    /// Runs `config` with explicit bounds. Unset options fall back to the builder's.
    pub async fn simulate_with(&self, config: ShaftConfig, options: RunOptions) -> SimulationResult {
        self.run(config, options, None, Uuid::new_v4()).await
    }

    /// Spawns a run on the current tokio runtime and streams its events.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn spawn(&self, config: ShaftConfig, options: RunOptions) -> RunEvents {
        let (sender, receiver) = mpsc::unbounded_channel::<RunEvent>();
        let cancel = options.cancel.clone().unwrap_or_default();
        let options = RunOptions {
            cancel: Some(cancel.clone()),
            ..options
        };
        let run_id = Uuid::new_v4();
        let engine = self.clone();
        tokio::spawn(async move {
            engine.run(config, options, Some(sender), run_id).await;
        });
        RunEvents::new(run_id, receiver, cancel)
    }

    async fn run(
        &self,
        config: ShaftConfig,
        options: RunOptions,
        channel: Option<mpsc::UnboundedSender<RunEvent>>,
        run_id: Uuid,
    ) -> SimulationResult {
        let listener = self.inner.listener.lock().clone();
        let mut emitter = Emitter::new(listener, channel);
        let max_attempts = options.max_attempts.or(self.inner.max_attempts);
        let pause = config.pause_duration();
        self.run_started(run_id, &config, max_attempts).await;

        let mut state = RunState::default();
        let termination = loop {
            if options.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
                break Termination::Cancelled;
            }
            if max_attempts.is_some_and(|max| state.attempts >= max) {
                break Termination::AttemptCeiling;
            }

            state.attempts += 1;
            state.position += config.climb_distance;
            self.emit(&mut emitter, run_id, state.snapshot(AttemptStage::Climb));

            let crossed_halfway =
                !state.reached_halfway && state.position >= config.halfway_mark();
            if crossed_halfway {
                state.reached_halfway = true;
                self.emit(&mut emitter, run_id, state.snapshot(AttemptStage::Halfway));
            }

            if state.position >= config.depth {
                if crossed_halfway {
                    self.halfway_reached(run_id, &state).await;
                }
                break Termination::Escaped;
            }

            state.position -= config.fall_distance;
            self.emit(&mut emitter, run_id, state.snapshot(AttemptStage::Fall));
            if crossed_halfway {
                self.halfway_reached(run_id, &state).await;
            }

            let resumed = match &options.cancel {
                Some(token) => tokio::select! {
                    () = self.inner.pacer.pause(pause) => true,
                    () = token.cancelled() => false,
                },
                None => {
                    self.inner.pacer.pause(pause).await;
                    true
                }
            };
            if !resumed {
                break Termination::Cancelled;
            }
        };

        let result = state.finish(termination);
        emitter.finish(result);
        self.run_completed(run_id, &result, emitter.faults()).await;
        result
    }

    fn emit(&self, emitter: &mut Emitter, run_id: Uuid, snapshot: ProgressSnapshot) {
        let fault = emitter.emit(snapshot);
        let Some(tel) = &self.inner.telemetry else {
            return;
        };
        if tel.enabled(LogLevel::Debug) {
            let _ = tel.log(
                LogLevel::Debug,
                &format!("shaft.attempt.{}", snapshot.stage.label()),
                &json!({
                    "run_id": run_id,
                    "attempts": snapshot.attempts,
                    "position": snapshot.position,
                    "reached_halfway": snapshot.reached_halfway,
                }),
            );
        }
        if let Some(message) = fault {
            let _ = tel.log(
                LogLevel::Warn,
                "shaft.listener.fault",
                &json!({
                    "run_id": run_id,
                    "attempts": snapshot.attempts,
                    "stage": snapshot.stage.label(),
                    "error": message,
                }),
            );
        }
    }

    async fn run_started(&self, run_id: Uuid, config: &ShaftConfig, max_attempts: Option<u64>) {
        let Some(tel) = &self.inner.telemetry else {
            return;
        };
        let risk = config.risk().map(|reason| reason.describe());
        let _ = tel.log(
            LogLevel::Info,
            "shaft.run.started",
            &json!({ "run_id": run_id, "config": config, "max_attempts": max_attempts }),
        );
        if let Some(risk) = risk {
            let level = if max_attempts.is_some() {
                LogLevel::Info
            } else {
                LogLevel::Warn
            };
            let _ = tel.log(
                level,
                "shaft.run.unbounded_risk",
                &json!({ "run_id": run_id, "risk": risk, "max_attempts": max_attempts }),
            );
        }
        let _ = tel
            .event("shaft.run.started", json!({ "run_id": run_id, "config": config }))
            .await;
    }

    async fn halfway_reached(&self, run_id: Uuid, state: &RunState) {
        if let Some(tel) = &self.inner.telemetry {
            let _ = tel
                .event(
                    "shaft.halfway.reached",
                    json!({ "run_id": run_id, "attempts": state.attempts }),
                )
                .await;
        }
    }

    async fn run_completed(&self, run_id: Uuid, result: &SimulationResult, faults: u64) {
        let Some(tel) = &self.inner.telemetry else {
            return;
        };
        let payload = json!({
            "run_id": run_id,
            "result": result,
            "listener_faults": faults,
        });
        let _ = tel.log(LogLevel::Info, "shaft.run.completed", &payload);
        let _ = tel.event("shaft.run.completed", payload).await;
    }
}

#[async_trait]
impl SimulationRepository for ShaftSimulator {
    fn set_progress_listener(&self, listener: Arc<dyn ProgressListener>) {
        Self::set_progress_listener(self, listener);
    }

    async fn simulate_with(&self, config: ShaftConfig, options: RunOptions) -> SimulationResult {
        Self::simulate_with(self, config, options).await
    }
}

/// Builder for [`ShaftSimulator`].
pub struct ShaftSimulatorBuilder {
    telemetry: Option<SimulationTelemetry>,
    pacer: Arc<dyn Pacer>,
    listener: Option<Arc<dyn ProgressListener>>,
    max_attempts: Option<u64>,
}

impl ShaftSimulatorBuilder {
    /// Sets telemetry.
    #[must_use]
    pub fn telemetry(mut self, telemetry: SimulationTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Replaces the pacing primitive (defaults to [`TokioPacer`]).
    #[must_use]
    pub fn pacer(mut self, pacer: Arc<dyn Pacer>) -> Self {
        self.pacer = pacer;
        self
    }

    /// Skips pauses entirely.
    #[must_use]
    pub fn immediate(self) -> Self {
        self.pacer(Arc::new(ImmediatePacer))
    }

    /// Initial progress listener.
    #[must_use]
    pub fn listener(mut self, listener: Arc<dyn ProgressListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Default attempt ceiling for every run.
    #[must_use]
    pub const fn max_attempts(mut self, max_attempts: u64) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Builds the simulator.
    #[must_use]
    pub fn build(self) -> ShaftSimulator {
        ShaftSimulator {
            inner: Arc::new(SimulatorInner {
                telemetry: self.telemetry,
                pacer: self.pacer,
                listener: Mutex::new(self.listener),
                max_attempts: self.max_attempts,
            }),
        }
    }
}

impl Default for ShaftSimulatorBuilder {
    fn default() -> Self {
        Self {
            telemetry: None,
            pacer: Arc::new(TokioPacer),
            listener: None,
            max_attempts: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::TraceRecorder;
    use shared_event_bus::MemoryEventBus;
    use std::time::Duration;
    use tokio::time::Instant;

    fn trace_of(snapshots: &[ProgressSnapshot]) -> Vec<(AttemptStage, f64)> {
        snapshots.iter().map(|s| (s.stage, s.position)).collect()
    }

    #[tokio::test]
    async fn default_config_trace() {
        let recorder = Arc::new(TraceRecorder::new());
        let engine = ShaftSimulator::builder()
            .immediate()
            .listener(recorder.clone())
            .build();
        let result = engine.simulate(ShaftConfig::default()).await;
        assert!(result.success);
        assert_eq!(result.attempts, 9);
        assert!((result.final_position - 21.0).abs() < f64::EPSILON);
        assert!(result.reached_halfway);

        let trace = recorder.snapshots();
        assert_eq!(
            trace_of(&trace[..4]),
            vec![
                (AttemptStage::Climb, 5.0),
                (AttemptStage::Fall, 2.0),
                (AttemptStage::Climb, 7.0),
                (AttemptStage::Fall, 4.0),
            ]
        );
        let halfway: Vec<_> = trace
            .iter()
            .filter(|s| s.stage == AttemptStage::Halfway)
            .collect();
        assert_eq!(halfway.len(), 1);
        assert_eq!(halfway[0].attempts, 4);
        assert!((halfway[0].position - 11.0).abs() < f64::EPSILON);
        assert_eq!(trace.last().unwrap().stage, AttemptStage::Climb);
        // 9 climbs + 8 falls + 1 halfway.
        assert_eq!(trace.len(), 18);
    }

    #[tokio::test(start_paused = true)]
    async fn pauses_between_attempts_only() {
        let engine = ShaftSimulator::builder().build();
        let start = Instant::now();
        let result = engine
            .simulate(ShaftConfig::new(20.0, 5.0, 3.0, 0.5))
            .await;
        assert_eq!(result.attempts, 9);
        // Eight falls, eight pauses; the escaping attempt does not pause.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(4000));
        assert!(elapsed < Duration::from_millis(4100));
    }

    #[tokio::test]
    async fn ceiling_bounds_stalling_run() {
        let engine = ShaftSimulator::builder().immediate().max_attempts(50).build();
        let result = engine
            .simulate(ShaftConfig::new(10.0, 2.0, 5.0, 0.0))
            .await;
        assert!(!result.success);
        assert_eq!(result.termination, Termination::AttemptCeiling);
        assert_eq!(result.attempts, 50);
        assert!((result.final_position + 150.0).abs() < f64::EPSILON);
        assert!(!result.reached_halfway);
    }

    #[tokio::test]
    async fn run_options_override_builder_ceiling() {
        let engine = ShaftSimulator::builder().immediate().max_attempts(50).build();
        let result = engine
            .simulate_with(
                ShaftConfig::new(10.0, 2.0, 5.0, 0.0),
                RunOptions::default().with_max_attempts(3),
            )
            .await;
        assert_eq!(result.attempts, 3);
    }

    #[tokio::test]
    async fn pre_cancelled_run_does_nothing() {
        let engine = ShaftSimulator::builder().immediate().build();
        let token = CancelToken::new();
        token.cancel();
        let result = engine
            .simulate_with(ShaftConfig::default(), RunOptions::default().with_cancel(token))
            .await;
        assert_eq!(result.termination, Termination::Cancelled);
        assert_eq!(result.attempts, 0);
        assert!(result.final_position.abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_interrupts_pause() {
        let engine = ShaftSimulator::builder().build();
        let token = CancelToken::new();
        let run = {
            let engine = engine.clone();
            let token = token.clone();
            tokio::spawn(async move {
                engine
                    .simulate_with(
                        ShaftConfig::new(10.0, 2.0, 5.0, 60.0),
                        RunOptions::default().with_cancel(token),
                    )
                    .await
            })
        };
        tokio::time::sleep(Duration::from_secs(90)).await;
        token.cancel();
        let result = run.await.unwrap();
        assert_eq!(result.termination, Termination::Cancelled);
        assert_eq!(result.attempts, 2);
    }

    #[tokio::test]
    async fn dropping_stream_cancels_stalling_run() {
        let recorder = Arc::new(TraceRecorder::new());
        let telemetry = SimulationTelemetry::builder("shaft")
            .in_memory_log()
            .build()
            .unwrap();
        let engine = ShaftSimulator::builder()
            .immediate()
            .listener(recorder.clone())
            .telemetry(telemetry.clone())
            .build();
        let events = engine.spawn(ShaftConfig::new(10.0, 2.0, 5.0, 0.0), RunOptions::default());
        tokio::task::yield_now().await;
        drop(events);

        let completed = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Some(record) = telemetry
                    .log_records()
                    .into_iter()
                    .find(|r| r.message == "shaft.run.completed")
                {
                    return record;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(completed.metadata["result"]["termination"], "cancelled");
        assert_eq!(completed.metadata["result"]["success"], false);

        let settled = recorder.snapshots().len();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(recorder.snapshots().len(), settled);
    }

    #[tokio::test]
    async fn telemetry_reports_lifecycle() {
        let bus = Arc::new(MemoryEventBus::new(16));
        let telemetry = SimulationTelemetry::builder("shaft")
            .in_memory_log()
            .min_level(LogLevel::Debug)
            .event_publisher(bus.clone())
            .build()
            .unwrap();
        let engine = ShaftSimulator::builder()
            .immediate()
            .telemetry(telemetry.clone())
            .build();
        engine.simulate(ShaftConfig::new(5.0, 5.0, 3.0, 0.0)).await;

        let kinds: Vec<_> = bus.snapshot().into_iter().map(|e| e.event_type).collect();
        assert_eq!(
            kinds,
            vec![
                "shaft.run.started",
                "shaft.halfway.reached",
                "shaft.run.completed"
            ]
        );
        let messages: Vec<_> = telemetry
            .log_records()
            .into_iter()
            .map(|r| r.message)
            .collect();
        assert_eq!(
            messages,
            vec![
                "shaft.run.started",
                "shaft.attempt.climb",
                "shaft.attempt.halfway",
                "shaft.run.completed"
            ]
        );
    }

    #[tokio::test]
    async fn unbounded_risk_is_logged() {
        let telemetry = SimulationTelemetry::builder("shaft")
            .in_memory_log()
            .build()
            .unwrap();
        let engine = ShaftSimulator::builder()
            .immediate()
            .telemetry(telemetry.clone())
            .build();
        engine
            .simulate_with(
                ShaftConfig::new(10.0, 2.0, 5.0, 0.0),
                RunOptions::default().with_max_attempts(1),
            )
            .await;
        let risk = telemetry
            .log_records()
            .into_iter()
            .find(|r| r.message == "shaft.run.unbounded_risk")
            .unwrap();
        assert_eq!(risk.level, LogLevel::Info);
    }
}
