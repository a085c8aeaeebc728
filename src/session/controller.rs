use chrono::{Local, NaiveDateTime};
use statum::{machine, state};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::debounce::{classify, DebounceWindows};
use super::pad::{PadId, PadTable, Timestamp, TouchEvent};
use super::sink::EventLog;
use super::trigger::Trigger;
use crate::clock::{Uptime, WallClock};
use crate::config::Config;
use crate::sensor::TouchArray;

const STATS_INTERVAL: Duration = Duration::from_secs(30);

// Session timing, fixed for the lifetime of the process
#[derive(Clone, Debug)]
pub struct SessionSettings {
    pub windows: DebounceWindows,
    pub poll_interval: Duration,
    pub trigger_poll: Duration,
    pub settle: Duration,
    pub extension: String,
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            windows: DebounceWindows::from(&config.debounce),
            poll_interval: config.session.poll_interval(),
            trigger_poll: config.session.trigger_poll(),
            settle: config.session.settle(),
            extension: config.storage.extension.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub artifact_name: String,
    pub started_at: NaiveDateTime,
}

// Counters of the running session, summarized periodically
#[derive(Debug, Clone)]
pub struct PollStats {
    pub cycles: u64,
    pub events: u64,
    pub sensor_errors: u64,
    window_cycles: u64,
    window_events: u64,
    window_start: Instant,
}

impl Default for PollStats {
    fn default() -> Self {
        Self {
            cycles: 0,
            events: 0,
            sensor_errors: 0,
            window_cycles: 0,
            window_events: 0,
            window_start: Instant::now(),
        }
    }
}

#[state]
#[derive(Debug, Clone)]
pub enum SessionState {
    Idle,
    Initializing,
    Polling(SessionInfo),
}

#[machine]
#[derive(Debug)]
pub struct SessionController<S: SessionState> {
    // Timing and debounce windows
    settings: SessionSettings,

    // All touch controllers, in sipper id order
    sensors: TouchArray,

    // One state per pad, owned by this controller only
    pads: PadTable,

    // Destination of validated events
    log: EventLog,

    // Names the session log
    wall_clock: Box<dyn WallClock>,

    // Source of event timestamps
    uptime: Box<dyn Uptime>,

    // Uptime reading at session start
    experiment_start: u64,

    stats: PollStats,
}

impl<S: SessionState> SessionController<S> {
    pub fn pads(&self) -> &PadTable {
        &self.pads
    }
}

impl SessionController<Idle> {
    pub fn create(
        settings: SessionSettings,
        sensors: TouchArray,
        log: EventLog,
        wall_clock: Box<dyn WallClock>,
        uptime: Box<dyn Uptime>,
    ) -> Self {
        let pads = PadTable::new(sensors.controller_count(), sensors.pads_per_controller());
        debug!(
            "Creating session controller for {} pads with {:?}",
            pads.len(),
            settings
        );
        Self::new(
            settings,
            sensors,
            pads,
            log,
            wall_clock,
            uptime,
            0,
            PollStats::default(),
        )
    }

    /// Blocks until the operator trigger fires, then waits the settle delay.
    ///
    /// Returns `None` if cancelled before the trigger fired.
    pub fn wait_for_trigger(
        self,
        trigger: &mut dyn Trigger,
        cancel: &CancellationToken,
    ) -> Option<SessionController<Initializing>> {
        info!("Waiting for start button");
        loop {
            if cancel.is_cancelled() {
                info!("Cancelled while idle");
                return None;
            }
            if trigger.is_active() {
                info!("Button pressed. Starting recording...");
                std::thread::sleep(self.settings.settle);
                return Some(self.transition());
            }
            std::thread::sleep(self.settings.trigger_poll);
        }
    }
}

impl SessionController<Initializing> {
    /// Starts the session. A wall clock that cannot be read only affects the
    /// log file name, which then comes from the system time.
    pub fn initialize(mut self) -> SessionController<Polling> {
        self.pads.reset();

        let started_at = match self.wall_clock.now() {
            Ok(at) => at,
            Err(e) => {
                error!("{}, naming session log from system time", e);
                Local::now().naive_local()
            }
        };
        let artifact_name = artifact_name(&started_at, &self.settings.extension);
        self.log.begin(artifact_name.clone());

        self.experiment_start = self.uptime.millis();
        self.stats = PollStats::default();

        info!(
            "Session started at {} ({} pads, poll every {:?})",
            started_at.format("%Y-%m-%d %H:%M:%S"),
            self.pads.len(),
            self.settings.poll_interval
        );
        self.transition_with(SessionInfo {
            artifact_name,
            started_at,
        })
    }
}

impl SessionController<Polling> {
    pub fn artifact_name(&self) -> Option<&str> {
        self.get_state_data().map(|info| info.artifact_name.as_str())
    }

    pub fn stats(&self) -> &PollStats {
        &self.stats
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    fn elapsed(&self) -> Timestamp {
        self.uptime.millis().saturating_sub(self.experiment_start)
    }

    /// Samples every controller once and classifies every pad, in sipper id
    /// order. Each validated event is written before the next pad is looked
    /// at; a failed write is reported and the event dropped.
    pub fn poll_cycle(&mut self) -> Vec<TouchEvent> {
        let mut events = Vec::new();

        for controller in 0..self.sensors.controller_count() {
            let touched = match self.sensors.sample(controller) {
                Ok(bitmap) => bitmap,
                Err(e) => {
                    self.stats.sensor_errors += 1;
                    warn!(
                        "Skipping controller 0x{:02X} this cycle: {}",
                        self.sensors.address(controller),
                        e
                    );
                    continue;
                }
            };
            let t = self.elapsed();

            for pad in 0..self.sensors.pads_per_controller() {
                let id = PadId { controller, pad };
                let raw_touched = touched & (1 << pad) != 0;

                if let Some(kind) = classify(self.pads.get_mut(id), raw_touched, t, self.settings.windows) {
                    let event = TouchEvent {
                        sipper_id: self.pads.sipper_id(id),
                        timestamp: t,
                        kind,
                    };
                    if let Err(e) = self.log.record(&event) {
                        error!("{}", e);
                    }
                    events.push(event);
                }
            }
        }

        self.stats.cycles += 1;
        self.stats.events += events.len() as u64;
        self.stats.window_cycles += 1;
        self.stats.window_events += events.len() as u64;
        events
    }

    /// Polls until cancelled. Nothing else ends a session.
    pub fn run(mut self, cancel: &CancellationToken) -> PollStats {
        info!(
            "Entering polling loop, logging to {}",
            self.artifact_name().unwrap_or("<none>")
        );

        while !cancel.is_cancelled() {
            let cycle_start = Instant::now();
            let events = self.poll_cycle();
            debug!(
                "Cycle {} produced {} events in {:?}",
                self.stats.cycles,
                events.len(),
                cycle_start.elapsed()
            );

            if self.stats.window_start.elapsed() >= STATS_INTERVAL {
                self.log_stats();
            }

            std::thread::sleep(self.settings.poll_interval);
        }

        info!("Polling loop cancelled");
        self.log_stats();
        self.stats
    }

    fn log_stats(&mut self) {
        let seconds = self.stats.window_start.elapsed().as_secs_f64().max(f64::EPSILON);
        info!(
            "Session stats: {} cycles, {} events in {:.0} seconds ({:.1} cycles/sec), {} pads touching",
            self.stats.window_cycles,
            self.stats.window_events,
            seconds,
            self.stats.window_cycles as f64 / seconds,
            self.pads.touching()
        );
        info!(
            "Session totals: {} events, {} written, {} dropped, {} sensor read errors",
            self.stats.events,
            self.log.written(),
            self.log.dropped(),
            self.stats.sensor_errors
        );
        self.stats.window_cycles = 0;
        self.stats.window_events = 0;
        self.stats.window_start = Instant::now();
    }
}

/// `YYMMDD_HHMMSS.<extension>`, sortable by session start.
pub fn artifact_name(started_at: &NaiveDateTime, extension: &str) -> String {
    format!("{}.{}", started_at.format("%y%m%d_%H%M%S"), extension)
}
