//! Headless combat arena.
//!
//! The arena owns every combatant's components and advances them in a fixed
//! order each tick:
//!
//! 1. Armaments update in entity order. Each shot is resolved on the spot
//!    (hitscan) or launched as a projectile.
//! 2. Projectiles advance and deliver on arrival.
//! 3. Defenders decay their invulnerability windows.
//! 4. Dead combatants marked `despawn_on_death` are despawned.
//! 5. The event bus is drained into the tick report.
//!
//! Armaments of a dead combatant stop firing but keep their state.
//!
//! Tallies are kept by listeners on each component's own signal, so they
//! stay exact even when the bounded bus overflows and drops events.

use serde::{Deserialize, Serialize};
use skirmish_combat::{
    AttackEvent, AttackSpec, CombatEvent, Damageable, EventBus, FireControl, FlatVitals,
    HealthEvent, MitigationPipeline, Projectile, TargetError, TargetResolver, WeaponEvent,
};
use skirmish_common::{EntityAllocator, EntityId, EntityLiveness};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use tracing::{debug, info, warn};

/// A combatant's weapon: timing, damage and aim.
#[derive(Debug)]
pub struct Armament {
    fire: FireControl,
    attack: AttackSpec,
    aim: Option<EntityId>,
    travel_time: f32,
}

impl Armament {
    /// Returns the fire control.
    #[must_use]
    pub fn fire_control(&self) -> &FireControl {
        &self.fire
    }

    /// Returns the attack spec.
    #[must_use]
    pub fn attack(&self) -> &AttackSpec {
        &self.attack
    }

    /// Returns the current target.
    #[must_use]
    pub fn aim(&self) -> Option<EntityId> {
        self.aim
    }
}

#[derive(Debug)]
struct Defense {
    pipeline: MitigationPipeline<FlatVitals>,
    despawn_on_death: bool,
}

/// Running totals for one combatant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CombatTally {
    /// Shots executed.
    pub shots_fired: u32,
    /// Shield plus health damage caused.
    pub damage_dealt: f32,
    /// Shield plus health damage received.
    pub damage_taken: f32,
    /// Hits that were blocked.
    pub hits_blocked: u32,
    /// Times this combatant died.
    pub deaths: u32,
}

/// Everything that happened during one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    /// Tick number, starting at 1.
    pub tick: u64,
    /// Events in emission order.
    pub events: Vec<CombatEvent>,
    /// Combatants despawned this tick.
    pub despawned: Vec<EntityId>,
    /// Events the bus dropped this tick because it was full.
    pub dropped_events: u64,
}

type TallyBook = Rc<RefCell<BTreeMap<EntityId, CombatTally>>>;

fn record_health(book: &TallyBook, entity: EntityId, event: &HealthEvent) {
    let mut book = book.borrow_mut();
    match event {
        HealthEvent::DamageTaken(result) => {
            let total = result.total_damage();
            let tally = book.entry(entity).or_default();
            tally.damage_taken += total;
            if result.blocked {
                tally.hits_blocked += 1;
            }
            // Bookkeeping only; the source may be gone
            if let Some(source) = result.request.source_handle() {
                book.entry(source).or_default().damage_dealt += total;
            }
        },
        HealthEvent::Died => {
            book.entry(entity).or_default().deaths += 1;
        },
        _ => {},
    }
}

/// Resolves target handles against the arena's defenders.
struct DefenseResolver<'a> {
    entities: &'a EntityAllocator,
    defenses: &'a mut BTreeMap<EntityId, Defense>,
}

impl TargetResolver for DefenseResolver<'_> {
    fn resolve(&mut self, target: EntityId) -> Result<&mut dyn Damageable, TargetError> {
        if !target.is_valid() {
            return Err(TargetError::Unknown(target));
        }
        if !self.entities.is_alive(target) {
            return Err(TargetError::Stale(target));
        }
        match self.defenses.get_mut(&target) {
            Some(defense) => Ok(&mut defense.pipeline),
            None => Err(TargetError::NotDamageable(target)),
        }
    }
}

/// Runs one shot: hitscan now, or a projectile for later.
fn execute_shot(
    attack: &mut AttackSpec,
    aim: Option<EntityId>,
    travel_time: f32,
    projectiles: &mut Vec<Projectile>,
    resolver: &mut DefenseResolver<'_>,
) {
    let Some(target) = aim else {
        return;
    };
    if travel_time > 0.0 {
        projectiles.push(Projectile::new(attack.create_request(), target, travel_time));
    } else {
        attack.apply_to(target, resolver);
    }
}

/// Headless tick driver for a set of combatants.
#[derive(Debug)]
pub struct Arena {
    entities: EntityAllocator,
    names: BTreeMap<EntityId, String>,
    armaments: BTreeMap<EntityId, Armament>,
    defenses: BTreeMap<EntityId, Defense>,
    projectiles: Vec<Projectile>,
    tallies: TallyBook,
    bus: EventBus,
    dropped_seen: u64,
    tick: u64,
    elapsed: f32,
}

impl Default for Arena {
    fn default() -> Self {
        Self::new(4096)
    }
}

impl Arena {
    /// Creates an empty arena whose bus holds `bus_capacity` events per tick.
    #[must_use]
    pub fn new(bus_capacity: usize) -> Self {
        Self {
            entities: EntityAllocator::new(),
            names: BTreeMap::new(),
            armaments: BTreeMap::new(),
            defenses: BTreeMap::new(),
            projectiles: Vec::new(),
            tallies: Rc::new(RefCell::new(BTreeMap::new())),
            bus: EventBus::new(bus_capacity),
            dropped_seen: 0,
            tick: 0,
            elapsed: 0.0,
        }
    }

    // ========================================================================
    // Roster
    // ========================================================================

    /// Adds a bare combatant.
    pub fn spawn(&mut self, name: impl Into<String>) -> EntityId {
        let id = self.entities.allocate();
        let name = name.into();
        debug!(%id, %name, "combatant spawned");
        self.names.insert(id, name);
        self.tallies.borrow_mut().insert(id, CombatTally::default());
        id
    }

    /// Gives a combatant a weapon. Returns false if the combatant is gone.
    pub fn equip(
        &mut self,
        id: EntityId,
        mut fire: FireControl,
        mut attack: AttackSpec,
        travel_time: f32,
    ) -> bool {
        if !self.entities.is_alive(id) {
            return false;
        }
        attack.set_owner(Some(id));
        let book = Rc::clone(&self.tallies);
        fire.events().subscribe(move |event| {
            if matches!(event, WeaponEvent::Fired { .. }) {
                book.borrow_mut().entry(id).or_default().shots_fired += 1;
            }
        });
        self.bus.forward_weapon(id, fire.events());
        self.bus.forward_attack(id, attack.events());
        self.armaments.insert(
            id,
            Armament {
                fire,
                attack,
                aim: None,
                travel_time: travel_time.max(0.0),
            },
        );
        true
    }

    /// Gives a combatant health. Returns false if the combatant is gone.
    pub fn add_defense(
        &mut self,
        id: EntityId,
        mut pipeline: MitigationPipeline<FlatVitals>,
        despawn_on_death: bool,
    ) -> bool {
        if !self.entities.is_alive(id) {
            return false;
        }
        let book = Rc::clone(&self.tallies);
        pipeline
            .events()
            .subscribe(move |event| record_health(&book, id, event));
        self.bus.forward_health(id, pipeline.events());
        self.defenses.insert(
            id,
            Defense {
                pipeline,
                despawn_on_death,
            },
        );
        true
    }

    /// Points a combatant's weapon at `target`. Returns false if it has none.
    pub fn set_target(&mut self, id: EntityId, target: Option<EntityId>) -> bool {
        match self.armaments.get_mut(&id) {
            Some(armament) => {
                armament.aim = target;
                true
            },
            None => false,
        }
    }

    /// Removes a combatant. Its handle goes stale; its name and tally remain.
    pub fn despawn(&mut self, id: EntityId) -> bool {
        if !self.entities.free(id) {
            return false;
        }
        self.armaments.remove(&id);
        self.defenses.remove(&id);
        info!(%id, name = self.name(id).unwrap_or("?"), "combatant despawned");
        true
    }

    /// Fires a combatant's weapon now. Returns false if refused.
    pub fn trigger(&mut self, id: EntityId) -> bool {
        let Some(armament) = self.armaments.get_mut(&id) else {
            return false;
        };
        let Armament {
            fire,
            attack,
            aim,
            travel_time,
        } = armament;
        let mut resolver = DefenseResolver {
            entities: &self.entities,
            defenses: &mut self.defenses,
        };
        let projectiles = &mut self.projectiles;
        fire.fire(&mut |_: u32| {
            execute_shot(attack, *aim, *travel_time, projectiles, &mut resolver);
        })
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Whether a handle still refers to a combatant.
    #[must_use]
    pub fn is_alive(&self, id: EntityId) -> bool {
        self.entities.is_alive(id)
    }

    /// Liveness view for re-validating request sources.
    #[must_use]
    pub fn liveness(&self) -> &dyn EntityLiveness {
        &self.entities
    }

    /// Returns a combatant's name, including despawned ones.
    #[must_use]
    pub fn name(&self, id: EntityId) -> Option<&str> {
        self.names.get(&id).map(String::as_str)
    }

    /// Finds a live combatant by name (case-insensitive).
    #[must_use]
    pub fn find(&self, name: &str) -> Option<EntityId> {
        self.names
            .iter()
            .find(|(id, n)| n.eq_ignore_ascii_case(name) && self.entities.is_alive(**id))
            .map(|(id, _)| *id)
    }

    /// Every combatant ever spawned, in entity order.
    pub fn roster(&self) -> impl Iterator<Item = (EntityId, &str)> {
        self.names.iter().map(|(id, name)| (*id, name.as_str()))
    }

    /// Returns a combatant's defense.
    #[must_use]
    pub fn defense(&self, id: EntityId) -> Option<&MitigationPipeline<FlatVitals>> {
        self.defenses.get(&id).map(|d| &d.pipeline)
    }

    /// Returns a combatant's defense mutably.
    pub fn defense_mut(&mut self, id: EntityId) -> Option<&mut MitigationPipeline<FlatVitals>> {
        self.defenses.get_mut(&id).map(|d| &mut d.pipeline)
    }

    /// Returns a combatant's armament.
    #[must_use]
    pub fn armament(&self, id: EntityId) -> Option<&Armament> {
        self.armaments.get(&id)
    }

    /// Returns a combatant's armament mutably.
    pub fn armament_mut(&mut self, id: EntityId) -> Option<(&mut FireControl, &mut AttackSpec)> {
        self.armaments
            .get_mut(&id)
            .map(|a| (&mut a.fire, &mut a.attack))
    }

    /// Returns a combatant's running totals.
    #[must_use]
    pub fn tally(&self, id: EntityId) -> Option<CombatTally> {
        self.tallies.borrow().get(&id).copied()
    }

    /// Total events the bus has dropped since the arena was created.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.bus.dropped_count()
    }

    /// Projectiles still travelling.
    #[must_use]
    pub fn projectiles_in_flight(&self) -> usize {
        self.projectiles.len()
    }

    /// Ticks run so far.
    #[must_use]
    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Simulated seconds so far.
    #[must_use]
    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    /// True when nothing can change any more: no projectiles are in flight
    /// and no living armament aims at a living, undead target.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        if !self.projectiles.is_empty() {
            return false;
        }
        !self.armaments.iter().any(|(id, armament)| {
            !self.is_down(*id)
                && armament
                    .aim
                    .is_some_and(|t| self.entities.is_alive(t) && !self.is_down(t))
        })
    }

    fn is_down(&self, id: EntityId) -> bool {
        self.defenses
            .get(&id)
            .is_some_and(|d| d.pipeline.is_dead())
    }

    // ========================================================================
    // Tick
    // ========================================================================

    /// Advances the whole arena by `dt` seconds.
    pub fn step(&mut self, dt: f32) -> TickReport {
        self.tick += 1;
        self.elapsed += dt;

        // 1. Armaments
        for (id, armament) in &mut self.armaments {
            if self.defenses.get(id).is_some_and(|d| d.pipeline.is_dead()) {
                continue;
            }
            let Armament {
                fire,
                attack,
                aim,
                travel_time,
            } = armament;
            let mut resolver = DefenseResolver {
                entities: &self.entities,
                defenses: &mut self.defenses,
            };
            let projectiles = &mut self.projectiles;
            fire.update(dt, &mut |_: u32| {
                execute_shot(attack, *aim, *travel_time, projectiles, &mut resolver);
            });
        }

        // 2. Projectiles
        let mut resolver = DefenseResolver {
            entities: &self.entities,
            defenses: &mut self.defenses,
        };
        let mut in_flight = Vec::with_capacity(self.projectiles.len());
        for mut projectile in std::mem::take(&mut self.projectiles) {
            if !projectile.tick(dt) {
                in_flight.push(projectile);
                continue;
            }
            let owner = projectile.owner().unwrap_or(EntityId::NULL);
            let target = projectile.target();
            let event = match projectile.deliver(&mut resolver) {
                Ok(result) => AttackEvent::DamageDealt { target, result },
                Err(error) => AttackEvent::failed(error),
            };
            self.bus.publish(CombatEvent::Attack {
                entity: owner,
                event,
            });
        }
        self.projectiles = in_flight;

        // 3. Defenders
        for defense in self.defenses.values_mut() {
            defense.pipeline.update(dt);
        }

        // 4. Despawn
        let doomed: Vec<EntityId> = self
            .defenses
            .iter()
            .filter(|(_, d)| d.despawn_on_death && d.pipeline.is_dead())
            .map(|(id, _)| *id)
            .collect();
        for id in &doomed {
            self.despawn(*id);
        }

        // 5. Drain
        let events = self.bus.drain();
        let dropped = self.bus.dropped_count();
        let dropped_events = dropped - self.dropped_seen;
        self.dropped_seen = dropped;
        if dropped_events > 0 {
            warn!(
                tick = self.tick,
                dropped = dropped_events,
                capacity = self.bus.capacity(),
                "event bus overflowed"
            );
        }

        TickReport {
            tick: self.tick,
            events,
            despawned: doomed,
            dropped_events,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skirmish_combat::{
        AttackConfig, DefenseConfig, FireControlConfig, FireMode, StopCondition,
    };

    fn pistol(damage: f32, auto_fire: bool) -> (FireControl, AttackSpec) {
        let fire = FireControl::new(FireControlConfig {
            base_rate: 4.0,
            auto_fire,
            ..FireControlConfig::default()
        })
        .expect("valid fire control");
        let attack = AttackSpec::new(&AttackConfig {
            damage,
            ..AttackConfig::default()
        });
        (fire, attack)
    }

    fn dummy(max_health: f32) -> MitigationPipeline<FlatVitals> {
        MitigationPipeline::new(FlatVitals::new(max_health), DefenseConfig::default())
            .expect("valid pipeline")
    }

    #[test]
    fn test_hitscan_auto_fire() {
        let mut arena = Arena::default();
        let shooter = arena.spawn("shooter");
        let target = arena.spawn("target");
        let (fire, attack) = pistol(10.0, true);
        assert!(arena.equip(shooter, fire, attack, 0.0));
        assert!(arena.add_defense(target, dummy(100.0), false));
        assert!(arena.set_target(shooter, Some(target)));

        // 4 shots per second, starting ready
        for _ in 0..4 {
            arena.step(0.25);
        }

        assert_eq!(arena.defense(target).map(|d| d.health()), Some(60.0));
        let shooter_tally = arena.tally(shooter).expect("tally");
        assert_eq!(shooter_tally.shots_fired, 4);
        assert_eq!(shooter_tally.damage_dealt, 40.0);
        assert_eq!(arena.tally(target).expect("tally").damage_taken, 40.0);
    }

    #[test]
    fn test_projectile_lands_after_travel_time() {
        let mut arena = Arena::default();
        let shooter = arena.spawn("archer");
        let target = arena.spawn("target");
        let (fire, attack) = pistol(25.0, false);
        arena.equip(shooter, fire, attack, 0.5);
        arena.add_defense(target, dummy(100.0), false);
        arena.set_target(shooter, Some(target));

        assert!(arena.trigger(shooter));
        assert_eq!(arena.projectiles_in_flight(), 1);

        arena.step(0.25);
        assert_eq!(arena.defense(target).map(|d| d.health()), Some(100.0));
        let report = arena.step(0.25);

        assert_eq!(arena.projectiles_in_flight(), 0);
        assert_eq!(arena.defense(target).map(|d| d.health()), Some(75.0));
        assert!(report.events.iter().any(|e| matches!(
            e,
            CombatEvent::Attack { entity, event: AttackEvent::DamageDealt { .. } } if *entity == shooter
        )));
    }

    #[test]
    fn test_projectile_survives_shooter_despawn() {
        let mut arena = Arena::default();
        let shooter = arena.spawn("archer");
        let target = arena.spawn("target");
        let (fire, attack) = pistol(25.0, false);
        arena.equip(shooter, fire, attack, 0.5);
        arena.add_defense(target, dummy(100.0), false);
        arena.set_target(shooter, Some(target));

        arena.trigger(shooter);
        assert!(arena.despawn(shooter));
        arena.step(0.5);

        assert_eq!(arena.defense(target).map(|d| d.health()), Some(75.0));
        assert!(!arena.is_alive(shooter));
        assert_eq!(arena.name(shooter), Some("archer"));
    }

    #[test]
    fn test_despawn_on_death_makes_target_stale() {
        let mut arena = Arena::default();
        let shooter = arena.spawn("shooter");
        let target = arena.spawn("target");
        let (fire, attack) = pistol(50.0, true);
        arena.equip(shooter, fire, attack, 0.0);
        arena.add_defense(target, dummy(40.0), true);
        arena.set_target(shooter, Some(target));

        let report = arena.step(0.25);
        assert_eq!(report.despawned, vec![target]);
        assert!(!arena.is_alive(target));
        assert!(arena.is_settled());

        // Next shot finds a stale handle
        let report = arena.step(0.25);
        assert!(report.events.iter().any(|e| matches!(
            e,
            CombatEvent::Attack { event: AttackEvent::DamageFailed { .. }, .. }
        )));
        assert_eq!(arena.tally(target).expect("tally").deaths, 1);
    }

    #[test]
    fn test_target_without_defense_is_not_damageable() {
        let mut arena = Arena::default();
        let shooter = arena.spawn("shooter");
        let rock = arena.spawn("rock");
        let (fire, attack) = pistol(5.0, false);
        arena.equip(shooter, fire, attack, 0.0);
        arena.set_target(shooter, Some(rock));

        assert!(arena.trigger(shooter));
        let report = arena.step(0.01);

        assert!(report.events.contains(&CombatEvent::Attack {
            entity: shooter,
            event: AttackEvent::failed(TargetError::NotDamageable(rock)),
        }));
    }

    #[test]
    fn test_dead_combatants_stop_firing() {
        let mut arena = Arena::default();
        let a = arena.spawn("a");
        let b = arena.spawn("b");
        let (fire, attack) = pistol(10.0, true);
        arena.equip(a, fire, attack, 0.0);
        arena.add_defense(a, dummy(10.0), false);
        arena.add_defense(b, dummy(100.0), false);
        arena.set_target(a, Some(b));

        if let Some(defense) = arena.defense_mut(a) {
            defense.force_kill();
        }
        arena.step(0.25);

        assert_eq!(arena.tally(a).expect("tally").shots_fired, 0);
        assert_eq!(arena.defense(b).map(|d| d.health()), Some(100.0));
        assert!(arena.is_settled());
    }

    #[test]
    fn test_tallies_survive_bus_overflow() {
        let mut arena = Arena::new(4);
        let turret = arena.spawn("turret");
        let target = arena.spawn("target");
        let fire = FireControl::new(FireControlConfig {
            auto_fire: true,
            mode: FireMode::Continuous {
                fire_interval: 0.01,
                fire_on_start: true,
                cooldown_after_stop: true,
                stop: StopCondition::ShotCount { max_shots: 10 },
            },
            ..FireControlConfig::default()
        })
        .expect("valid fire control");
        let attack = AttackSpec::new(&AttackConfig {
            damage: 10.0,
            ..AttackConfig::default()
        });
        arena.equip(turret, fire, attack, 0.0);
        arena.add_defense(target, dummy(100.0), false);
        arena.set_target(turret, Some(target));

        let mut dropped = 0;
        for _ in 0..5 {
            let report = arena.step(0.1);
            assert!(report.events.len() <= 4);
            dropped += report.dropped_events;
        }

        assert!(arena.defense(target).is_some_and(|d| d.is_dead()));
        assert!(dropped > 0);
        assert_eq!(arena.dropped_events(), dropped);

        let shooter = arena.tally(turret).expect("tally");
        assert_eq!(shooter.shots_fired, 10);
        assert_eq!(shooter.damage_dealt, 100.0);
        let victim = arena.tally(target).expect("tally");
        assert_eq!(victim.damage_taken, 100.0);
        assert_eq!(victim.deaths, 1);
    }

    #[test]
    fn test_burst_spread_over_ticks() {
        let mut arena = Arena::default();
        let turret = arena.spawn("turret");
        let target = arena.spawn("target");
        let fire = FireControl::new(FireControlConfig {
            auto_fire: true,
            mode: FireMode::Continuous {
                fire_interval: 0.08,
                fire_on_start: true,
                cooldown_after_stop: true,
                stop: StopCondition::ShotCount { max_shots: 5 },
            },
            ..FireControlConfig::default()
        })
        .expect("valid fire control");
        let attack = AttackSpec::new(&AttackConfig {
            damage: 10.0,
            ..AttackConfig::default()
        });
        arena.equip(turret, fire, attack, 0.0);
        arena.add_defense(target, dummy(200.0), false);
        arena.set_target(turret, Some(target));

        for _ in 0..5 {
            arena.step(0.08);
        }

        assert_eq!(arena.defense(target).map(|d| d.health()), Some(150.0));
        assert_eq!(arena.find("TURRET"), Some(turret));
    }
}
