//! Damage mitigation pipeline.
//!
//! This module provides:
//! - Defender configuration (shields, iframes, death prevention, immunities)
//! - The fixed resolution order turning a `DamageRequest` into a `DamageResult`
//! - Healing, shield restore, revive and forced death
//! - A hook for replacing the raw damage calculation

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, trace};

use crate::damage::{BlockReason, DamageRequest, DamageResult, DamageType, Damageable};
use crate::error::{CombatError, CombatResult};
use crate::events::{HealthEvent, Signal};
use crate::vitals::VitalsStore;

/// Resistance can never negate more than this fraction of a hit.
pub const MAX_RESISTANCE: f32 = 0.9;

// ============================================================================
// Configuration
// ============================================================================

/// Per-defender mitigation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefenseConfig {
    /// Whether the shield absorbs damage before health.
    pub shield_enabled: bool,
    /// Whether hits open an invulnerability window.
    pub iframes_enabled: bool,
    /// Invulnerability window length in seconds.
    pub iframe_duration: f32,
    /// Clamp the first lethal hit of each life to leave 1 health.
    pub prevent_death_once: bool,
    /// Per-hit damage cap (0 = uncapped).
    pub max_damage_per_hit: f32,
    /// Damage types that are ignored entirely.
    pub immune_types: Vec<DamageType>,
    /// Seed for crit rolls (None = random).
    pub crit_seed: Option<u64>,
}

impl Default for DefenseConfig {
    fn default() -> Self {
        Self {
            shield_enabled: true,
            iframes_enabled: false,
            iframe_duration: 0.5,
            prevent_death_once: false,
            max_damage_per_hit: 0.0,
            immune_types: Vec::new(),
            crit_seed: None,
        }
    }
}

impl DefenseConfig {
    /// Enables iframes with the given duration.
    #[must_use]
    pub fn with_iframes(mut self, duration: f32) -> Self {
        self.iframes_enabled = true;
        self.iframe_duration = duration;
        self
    }

    /// Enables single-use death prevention.
    #[must_use]
    pub fn with_death_prevention(mut self) -> Self {
        self.prevent_death_once = true;
        self
    }

    /// Sets the per-hit damage cap.
    #[must_use]
    pub fn with_max_damage_per_hit(mut self, cap: f32) -> Self {
        self.max_damage_per_hit = cap;
        self
    }

    /// Adds an immune damage type.
    #[must_use]
    pub fn with_immunity(mut self, damage_type: DamageType) -> Self {
        self.immune_types.push(damage_type);
        self
    }

    /// Sets the crit roll seed.
    #[must_use]
    pub fn with_crit_seed(mut self, seed: u64) -> Self {
        self.crit_seed = Some(seed);
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> CombatResult<()> {
        if !self.iframe_duration.is_finite() || self.iframe_duration < 0.0 {
            return Err(CombatError::InvalidConfig(format!(
                "iframe_duration must be >= 0, got {}",
                self.iframe_duration
            )));
        }

        if !self.max_damage_per_hit.is_finite() || self.max_damage_per_hit < 0.0 {
            return Err(CombatError::InvalidConfig(format!(
                "max_damage_per_hit must be >= 0, got {}",
                self.max_damage_per_hit
            )));
        }

        Ok(())
    }
}

// ============================================================================
// Raw Damage Calculation
// ============================================================================

/// Defender-side numbers available to the raw damage step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MitigationContext {
    /// Resistance against the request's type, already capped to `[0, MAX_RESISTANCE]`.
    pub resistance: f32,
    /// Flat armor.
    pub armor: f32,
    /// Incoming damage multiplier.
    pub damage_multiplier: f32,
    /// Per-hit cap (0 = uncapped).
    pub max_damage_per_hit: f32,
}

/// Output of the raw damage step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawDamage {
    /// Damage to apply to shield and health.
    pub amount: f32,
    /// Whether the hit counts as a crit.
    pub was_critical: bool,
}

/// Replacement for the built-in raw damage step (crit, resistance, armor,
/// multiplier, cap). When installed it owns the whole step.
pub trait DamageCalculator {
    /// Computes the damage to apply for `request`.
    fn calculate(&mut self, request: &DamageRequest, context: &MitigationContext) -> RawDamage;
}

impl<F> DamageCalculator for F
where
    F: FnMut(&DamageRequest, &MitigationContext) -> RawDamage,
{
    fn calculate(&mut self, request: &DamageRequest, context: &MitigationContext) -> RawDamage {
        self(request, context)
    }
}

/// Built-in raw damage step.
fn standard_raw_damage(
    rng: &mut fastrand::Rng,
    request: &DamageRequest,
    context: &MitigationContext,
) -> RawDamage {
    let was_critical = rng.f32() < request.crit_chance().clamp(0.0, 1.0);
    let crit_mult = if was_critical {
        request.crit_damage()
    } else {
        1.0
    };

    let mut incoming = request.damage() * crit_mult;
    incoming *= 1.0 - context.resistance;
    // Flat armor before the percentage multiplier
    incoming = (incoming - context.armor).max(0.0);
    incoming *= context.damage_multiplier;

    if context.max_damage_per_hit > 0.0 {
        incoming = incoming.min(context.max_damage_per_hit);
    }

    RawDamage {
        amount: incoming,
        was_critical,
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// A defender's health/shield state machine.
///
/// Generic over the storage strategy; the resolution order is the same for
/// every store.
pub struct MitigationPipeline<V> {
    vitals: V,
    config: DefenseConfig,
    immune: HashSet<DamageType>,
    is_dead: bool,
    iframe_timer: f32,
    death_prevented_used: bool,
    rng: fastrand::Rng,
    calculator: Option<Box<dyn DamageCalculator>>,
    events: Signal<HealthEvent>,
}

impl<V: fmt::Debug> fmt::Debug for MitigationPipeline<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MitigationPipeline")
            .field("vitals", &self.vitals)
            .field("config", &self.config)
            .field("is_dead", &self.is_dead)
            .field("iframe_timer", &self.iframe_timer)
            .field("death_prevented_used", &self.death_prevented_used)
            .field("custom_calculator", &self.calculator.is_some())
            .finish_non_exhaustive()
    }
}

impl<V: VitalsStore> MitigationPipeline<V> {
    /// Creates a pipeline over `vitals`.
    ///
    /// Starts dead if the store holds no health.
    pub fn new(vitals: V, config: DefenseConfig) -> CombatResult<Self> {
        config.validate()?;

        if vitals.max_health() <= 0.0 {
            return Err(CombatError::InvalidConfig(format!(
                "max_health must be > 0, got {}",
                vitals.max_health()
            )));
        }

        let rng = config
            .crit_seed
            .map_or_else(fastrand::Rng::new, fastrand::Rng::with_seed);

        Ok(Self {
            is_dead: vitals.health() <= 0.0,
            immune: config.immune_types.iter().copied().collect(),
            vitals,
            config,
            iframe_timer: 0.0,
            death_prevented_used: false,
            rng,
            calculator: None,
            events: Signal::new(),
        })
    }

    /// Installs a custom raw damage calculator.
    pub fn set_calculator(&mut self, calculator: impl DamageCalculator + 'static) {
        self.calculator = Some(Box::new(calculator));
    }

    /// Removes the custom calculator, restoring the built-in step.
    pub fn clear_calculator(&mut self) {
        self.calculator = None;
    }

    /// Returns the event signal.
    pub fn events(&mut self) -> &mut Signal<HealthEvent> {
        &mut self.events
    }

    /// Returns the storage.
    pub fn vitals(&self) -> &V {
        &self.vitals
    }

    /// Returns the storage mutably (for stat owners adjusting maximums).
    pub fn vitals_mut(&mut self) -> &mut V {
        &mut self.vitals
    }

    /// Returns the configuration.
    pub fn config(&self) -> &DefenseConfig {
        &self.config
    }

    /// Current health.
    pub fn health(&self) -> f32 {
        self.vitals.health()
    }

    /// Maximum health.
    pub fn max_health(&self) -> f32 {
        self.vitals.max_health()
    }

    /// Current shield.
    pub fn shield(&self) -> f32 {
        self.vitals.shield()
    }

    /// Maximum shield.
    pub fn max_shield(&self) -> f32 {
        self.vitals.max_shield()
    }

    /// Whether the defender is dead.
    pub fn is_dead(&self) -> bool {
        self.is_dead
    }

    /// Whether an invulnerability window is open.
    pub fn is_invulnerable(&self) -> bool {
        self.config.iframes_enabled && self.iframe_timer > 0.0
    }

    /// Seconds left in the invulnerability window.
    pub fn iframe_timer(&self) -> f32 {
        self.iframe_timer
    }

    /// Whether death prevention can still trigger this life.
    pub fn death_prevention_available(&self) -> bool {
        self.config.prevent_death_once && !self.death_prevented_used
    }

    /// Health as a fraction of maximum.
    pub fn health_percent(&self) -> f32 {
        let max = self.vitals.max_health();
        if max <= 0.0 {
            0.0
        } else {
            self.vitals.health() / max
        }
    }

    /// Resolves one request against this defender.
    pub fn process_damage(&mut self, request: &DamageRequest) -> DamageResult {
        let damage_type = request.damage_type();

        if self.immune.contains(&damage_type) {
            let result = DamageResult::blocked(request.clone(), BlockReason::Immune);
            self.events.emit(&HealthEvent::ImmunityTriggered { damage_type });
            self.events.emit(&HealthEvent::DamageTaken(result.clone()));
            return result;
        }

        let block = if self.is_dead {
            Some(BlockReason::Dead)
        } else if self.is_invulnerable() {
            Some(BlockReason::Invulnerable)
        } else {
            None
        };
        if let Some(reason) = block {
            let result = DamageResult::blocked(request.clone(), reason);
            self.events.emit(&HealthEvent::DamageBlocked { reason });
            self.events.emit(&HealthEvent::DamageTaken(result.clone()));
            return result;
        }

        let context = MitigationContext {
            resistance: self.vitals.resistance(damage_type).clamp(0.0, MAX_RESISTANCE),
            armor: self.vitals.armor(),
            damage_multiplier: self.vitals.damage_multiplier(),
            max_damage_per_hit: self.config.max_damage_per_hit,
        };
        let raw = match self.calculator.as_mut() {
            Some(calculator) => calculator.calculate(request, &context),
            None => standard_raw_damage(&mut self.rng, request, &context),
        };

        let mut result = DamageResult::new(request.clone());
        result.was_critical = raw.was_critical;

        // Negative results (negative multiplier or armor tricks) never heal
        let mut incoming = if raw.amount.is_nan() {
            0.0
        } else {
            raw.amount.max(0.0)
        };

        if self.config.shield_enabled && incoming > 0.0 && self.vitals.shield() > 0.0 {
            let absorbed = incoming.min(self.vitals.shield());
            let remaining = self.vitals.modify_shield(-absorbed);
            incoming -= absorbed;
            result.shield_damaged = absorbed;
            self.events.emit(&HealthEvent::ShieldDamaged {
                amount: absorbed,
                remaining,
            });

            if remaining <= 0.0 && incoming > 0.0 {
                self.events
                    .emit(&HealthEvent::ShieldBroken { overflow: incoming });
            }
        }

        if incoming > 0.0 {
            self.apply_health_damage(incoming, &mut result);
        }

        if result.actual_damage > 0.0
            && self.config.iframes_enabled
            && self.config.iframe_duration > 0.0
        {
            self.iframe_timer = self.config.iframe_duration;
            self.events.emit(&HealthEvent::IframesStarted {
                duration: self.config.iframe_duration,
            });
        }

        if result.was_critical {
            self.events.emit(&HealthEvent::CriticalHitTaken {
                damage: result.total_damage(),
            });
        }

        trace!(
            damage = result.actual_damage,
            shield = result.shield_damaged,
            critical = result.was_critical,
            "hit resolved"
        );
        self.events.emit(&HealthEvent::DamageTaken(result.clone()));
        result
    }

    fn apply_health_damage(&mut self, incoming: f32, result: &mut DamageResult) {
        let health_before = self.vitals.health();

        if self.death_prevention_available() && health_before - incoming <= 0.0 {
            // Leaves the defender at exactly 1, even when it was below that.
            let floor = 1.0_f32.min(self.vitals.max_health());
            let prevented = incoming - (health_before - floor).max(0.0);
            self.death_prevented_used = true;
            debug!(prevented, "death prevented");
            self.events.emit(&HealthEvent::DeathPrevented { prevented });
            self.vitals.set_health(floor);
            result.actual_damage = (health_before - floor).max(0.0);
            return;
        }

        let damage = incoming;
        let health_after = self.vitals.modify_health(-damage);
        result.actual_damage = health_before - health_after;

        if health_after <= 0.0 {
            result.overkill = (damage - health_before).max(0.0);
            if !self.is_dead {
                self.is_dead = true;
                debug!(overkill = result.overkill, "defender died");
                self.events.emit(&HealthEvent::Died);
            }
        }
    }

    /// Restores health and returns the amount actually healed.
    ///
    /// Healing a dead defender back above 0 revives it.
    pub fn heal(&mut self, amount: f32) -> f32 {
        if amount.is_nan() || amount <= 0.0 {
            return 0.0;
        }

        let before = self.vitals.health();
        let after = self.vitals.modify_health(amount);
        let healed = after - before;

        if healed > 0.0 {
            self.events.emit(&HealthEvent::Healed { amount: healed });
        }

        if self.is_dead && after > 0.0 {
            self.revive();
        }

        healed
    }

    /// Restores shield and returns the amount actually restored.
    pub fn restore_shield(&mut self, amount: f32) -> f32 {
        if !self.config.shield_enabled || amount.is_nan() || amount <= 0.0 {
            return 0.0;
        }

        let before = self.vitals.shield();
        let restored = self.vitals.modify_shield(amount) - before;

        if restored > 0.0 {
            self.events
                .emit(&HealthEvent::ShieldRestored { amount: restored });
        }

        restored
    }

    /// Clears death, the iframe window and the death-prevention flag.
    ///
    /// Health is left as is; call [`heal`](Self::heal) to restore it.
    pub fn revive(&mut self) {
        self.is_dead = false;
        self.iframe_timer = 0.0;
        self.death_prevented_used = false;
        debug!(health = self.vitals.health(), "defender revived");
        self.events.emit(&HealthEvent::Revived);
    }

    /// Kills the defender, bypassing every mitigation step.
    pub fn force_kill(&mut self) {
        self.vitals.set_health(0.0);
        if !self.is_dead {
            self.is_dead = true;
            debug!("defender force-killed");
            self.events.emit(&HealthEvent::Died);
        }
    }

    /// Advances the invulnerability window.
    pub fn update(&mut self, dt: f32) {
        if self.iframe_timer > 0.0 {
            self.iframe_timer -= dt;
            if self.iframe_timer <= 0.0 {
                self.iframe_timer = 0.0;
                self.events.emit(&HealthEvent::IframesEnded);
            }
        }
    }
}

impl<V: VitalsStore> Damageable for MitigationPipeline<V> {
    fn process_damage(&mut self, request: &DamageRequest) -> DamageResult {
        MitigationPipeline::process_damage(self, request)
    }
}
