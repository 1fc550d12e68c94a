//! Fire control state machine.
//!
//! This module provides:
//! - Single-shot and continuous (burst) fire modes
//! - Cooldown derived from base fire rate and attack speed
//! - Burst stop conditions (shot count, duration, manual)
//! - Auto-fire
//!
//! Fire control only decides *when* an attack executes. What an execution
//! does is up to the [`ShotExecutor`] passed to [`FireControl::update`] and
//! [`FireControl::fire`].

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{CombatError, CombatResult};
use crate::events::{Signal, WeaponEvent};
use crate::stats::{self, StatProvider};

/// Shortest cooldown any weapon can have, in seconds.
pub const MIN_COOLDOWN: f32 = 0.05;

/// Lowest effective fire rate used when computing the cooldown.
const MIN_FIRE_RATE: f32 = 0.01;

// ============================================================================
// Configuration
// ============================================================================

/// When a continuous burst ends on its own.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StopCondition {
    /// After this many shots.
    ShotCount {
        /// Shots per burst
        max_shots: u32,
    },
    /// After this many seconds of bursting.
    Duration {
        /// Burst length in seconds
        max_duration: f32,
    },
    /// Only on explicit cancel.
    Manual,
}

/// How a permitted fire executes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FireMode {
    /// One execution per fire.
    Single,
    /// A burst of executions spaced by `fire_interval`.
    Continuous {
        /// Seconds between burst shots
        fire_interval: f32,
        /// Execute the first shot as soon as the burst starts
        #[serde(default)]
        fire_on_start: bool,
        /// Restart the cooldown when the burst stops
        #[serde(default)]
        cooldown_after_stop: bool,
        /// When the burst ends
        stop: StopCondition,
    },
}

impl Default for FireMode {
    fn default() -> Self {
        Self::Single
    }
}

/// Fire control configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FireControlConfig {
    /// Activations per second before attack speed.
    pub base_rate: f32,
    /// How much each point of attack speed adds to the rate.
    pub attack_speed_scaling: f32,
    /// Fire whenever the cooldown allows.
    pub auto_fire: bool,
    /// Start with the cooldown already elapsed.
    pub start_ready: bool,
    /// Fire mode.
    pub mode: FireMode,
}

impl Default for FireControlConfig {
    fn default() -> Self {
        Self {
            base_rate: 1.0,
            attack_speed_scaling: 1.0,
            auto_fire: false,
            start_ready: true,
            mode: FireMode::Single,
        }
    }
}

impl FireControlConfig {
    /// Validates the configuration.
    pub fn validate(&self) -> CombatResult<()> {
        if !self.base_rate.is_finite() {
            return Err(CombatError::InvalidConfig(format!(
                "base_rate must be finite, got {}",
                self.base_rate
            )));
        }

        if let FireMode::Continuous {
            fire_interval,
            stop,
            ..
        } = self.mode
        {
            if !fire_interval.is_finite() || fire_interval <= 0.0 {
                return Err(CombatError::InvalidConfig(format!(
                    "fire_interval must be > 0, got {fire_interval}"
                )));
            }
            match stop {
                StopCondition::ShotCount { max_shots: 0 } => {
                    return Err(CombatError::InvalidConfig(
                        "max_shots must be at least 1".to_string(),
                    ));
                }
                StopCondition::Duration { max_duration }
                    if max_duration.is_nan() || max_duration <= 0.0 =>
                {
                    return Err(CombatError::InvalidConfig(format!(
                        "max_duration must be > 0, got {max_duration}"
                    )));
                }
                _ => {}
            }
        }

        Ok(())
    }
}

// ============================================================================
// Fire Control
// ============================================================================

/// Runs one attack execution. `shot` is the 1-based shot index.
pub trait ShotExecutor {
    /// Executes shot number `shot`.
    fn execute(&mut self, shot: u32);
}

impl<F: FnMut(u32)> ShotExecutor for F {
    fn execute(&mut self, shot: u32) {
        self(shot);
    }
}

/// Observable fire control state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireState {
    /// Ready to fire.
    Idle,
    /// Waiting for the cooldown.
    Cooldown,
    /// A continuous burst is running.
    Bursting,
}

/// Per-weapon timing state machine.
#[derive(Debug)]
pub struct FireControl {
    config: FireControlConfig,
    attack_speed: f32,
    cooldown_timer: f32,
    was_ready: bool,
    bursting: bool,
    shots_fired_this_burst: u32,
    burst_elapsed: f32,
    next_shot_timer: f32,
    events: Signal<WeaponEvent>,
}

impl FireControl {
    /// Creates fire control from a validated configuration.
    pub fn new(config: FireControlConfig) -> CombatResult<Self> {
        config.validate()?;

        let mut control = Self {
            config,
            attack_speed: 0.0,
            cooldown_timer: 0.0,
            was_ready: false,
            bursting: false,
            shots_fired_this_burst: 0,
            burst_elapsed: 0.0,
            next_shot_timer: 0.0,
            events: Signal::new(),
        };
        if control.config.start_ready {
            control.cooldown_timer = control.get_cooldown();
            control.was_ready = true;
        }
        Ok(control)
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &FireControlConfig {
        &self.config
    }

    /// Returns the event signal.
    pub fn events(&mut self) -> &mut Signal<WeaponEvent> {
        &mut self.events
    }

    /// Returns the current attack speed.
    #[must_use]
    pub fn attack_speed(&self) -> f32 {
        self.attack_speed
    }

    /// Sets attack speed.
    pub fn set_attack_speed(&mut self, attack_speed: f32) {
        self.attack_speed = attack_speed;
    }

    /// Pulls attack speed from a stat provider (0 if not supplied).
    pub fn refresh_from(&mut self, provider: &impl StatProvider) {
        self.attack_speed = provider.get_numeric(stats::ATTACK_SPEED);
    }

    /// Seconds between activations.
    #[must_use]
    pub fn get_cooldown(&self) -> f32 {
        let rate = self.config.base_rate + self.attack_speed * self.config.attack_speed_scaling;
        (1.0 / rate.max(MIN_FIRE_RATE)).max(MIN_COOLDOWN)
    }

    /// Seconds until the cooldown is satisfied.
    #[must_use]
    pub fn get_remaining_cooldown(&self) -> f32 {
        (self.get_cooldown() - self.cooldown_timer).max(0.0)
    }

    /// Cooldown progress in `[0, 1]`.
    #[must_use]
    pub fn get_cooldown_progress(&self) -> f32 {
        (self.cooldown_timer / self.get_cooldown()).clamp(0.0, 1.0)
    }

    /// Whether a fire would be accepted now.
    #[must_use]
    pub fn can_fire(&self) -> bool {
        !self.bursting && self.cooldown_timer >= self.get_cooldown()
    }

    /// Whether a burst is running.
    #[must_use]
    pub fn is_bursting(&self) -> bool {
        self.bursting
    }

    /// Shots fired in the running burst.
    #[must_use]
    pub fn shots_fired_this_burst(&self) -> u32 {
        self.shots_fired_this_burst
    }

    /// Seconds since the running burst started.
    #[must_use]
    pub fn burst_elapsed(&self) -> f32 {
        self.burst_elapsed
    }

    /// Returns the observable state.
    #[must_use]
    pub fn state(&self) -> FireState {
        if self.bursting {
            FireState::Bursting
        } else if self.cooldown_timer >= self.get_cooldown() {
            FireState::Idle
        } else {
            FireState::Cooldown
        }
    }

    /// Advances timers by `dt` seconds, executing shots as they come due.
    pub fn update<E: ShotExecutor + ?Sized>(&mut self, dt: f32, executor: &mut E) {
        if self.bursting {
            self.update_burst(dt, executor);
            return;
        }

        self.cooldown_timer += dt;
        let ready = self.cooldown_timer >= self.get_cooldown();
        if ready && !self.was_ready {
            self.events.emit(&WeaponEvent::CooldownReady);
        }
        self.was_ready = ready;

        if self.config.auto_fire && self.can_fire() {
            self.start_fire(executor);
        }
    }

    /// Fires if permitted. A refused fire changes nothing and emits
    /// `FireRejected`.
    pub fn fire<E: ShotExecutor + ?Sized>(&mut self, executor: &mut E) -> bool {
        if !self.can_fire() {
            let remaining = if self.bursting {
                0.0
            } else {
                self.get_remaining_cooldown()
            };
            self.events.emit(&WeaponEvent::FireRejected { remaining });
            return false;
        }

        self.start_fire(executor);
        true
    }

    /// Stops a running burst. Returns false if none was running.
    pub fn cancel(&mut self) -> bool {
        if !self.bursting {
            return false;
        }
        self.stop_burst();
        true
    }

    /// Alias for [`cancel`](Self::cancel).
    pub fn stop_continuous_fire(&mut self) -> bool {
        self.cancel()
    }

    fn start_fire<E: ShotExecutor + ?Sized>(&mut self, executor: &mut E) {
        match self.config.mode {
            FireMode::Single => {
                executor.execute(1);
                self.cooldown_timer = 0.0;
                self.was_ready = false;
                trace!("single shot fired");
                self.events.emit(&WeaponEvent::Fired { shot: 1 });
            }
            FireMode::Continuous { fire_on_start, .. } => {
                self.bursting = true;
                self.shots_fired_this_burst = 0;
                self.burst_elapsed = 0.0;
                self.next_shot_timer = 0.0;
                debug!("burst started");
                self.events.emit(&WeaponEvent::BurstStarted);

                if fire_on_start {
                    self.fire_burst_shot(executor);
                    self.check_stop();
                }
            }
        }
    }

    fn update_burst<E: ShotExecutor + ?Sized>(&mut self, dt: f32, executor: &mut E) {
        let FireMode::Continuous { fire_interval, .. } = self.config.mode else {
            // Mode cannot change while bursting
            self.stop_burst();
            return;
        };

        self.burst_elapsed += dt;
        self.next_shot_timer += dt;

        while self.bursting && self.next_shot_timer >= fire_interval {
            self.next_shot_timer -= fire_interval;
            self.fire_burst_shot(executor);
            self.check_stop();
        }

        // Duration can run out between shots
        if self.bursting {
            self.check_stop();
        }
    }

    fn fire_burst_shot<E: ShotExecutor + ?Sized>(&mut self, executor: &mut E) {
        self.shots_fired_this_burst += 1;
        let shot = self.shots_fired_this_burst;
        executor.execute(shot);
        trace!(shot, "burst shot fired");
        self.events.emit(&WeaponEvent::Fired { shot });
    }

    fn check_stop(&mut self) {
        let FireMode::Continuous { stop, .. } = self.config.mode else {
            return;
        };

        let done = match stop {
            StopCondition::ShotCount { max_shots } => self.shots_fired_this_burst >= max_shots,
            StopCondition::Duration { max_duration } => self.burst_elapsed >= max_duration,
            StopCondition::Manual => false,
        };

        if done {
            self.stop_burst();
        }
    }

    fn stop_burst(&mut self) {
        let shots_fired = self.shots_fired_this_burst;
        let elapsed = self.burst_elapsed;

        self.bursting = false;
        self.shots_fired_this_burst = 0;
        self.burst_elapsed = 0.0;
        self.next_shot_timer = 0.0;

        if let FireMode::Continuous {
            cooldown_after_stop: true,
            ..
        } = self.config.mode
        {
            self.cooldown_timer = 0.0;
        }
        self.was_ready = self.cooldown_timer >= self.get_cooldown();

        debug!(shots_fired, elapsed, "burst stopped");
        self.events
            .emit(&WeaponEvent::BurstStopped { shots_fired, elapsed });
    }
}
