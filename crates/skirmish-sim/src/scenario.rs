//! Scenario files and the scenario runner.
//!
//! A scenario names combatants, gives each an optional weapon and defender
//! from the loadout registry, aims weapons at other combatants by name, and
//! runs the arena for a number of ticks.

use serde::{Deserialize, Serialize};
use skirmish_combat::StatSheet;
use skirmish_common::EntityId;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::arena::{Arena, CombatTally};
use crate::config::SimConfig;
use crate::loadout::{DefenderDefinition, LoadoutError, LoadoutRegistry, LoadoutResult, WeaponDefinition};

const fn default_true() -> bool {
    true
}

/// One combatant in a scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatantSpec {
    /// Unique (case-insensitive) name.
    pub name: String,
    /// Weapon name or ID.
    #[serde(default)]
    pub weapon: Option<String>,
    /// Defender name or ID.
    #[serde(default)]
    pub defender: Option<String>,
    /// Name of the combatant to aim at.
    #[serde(default)]
    pub target: Option<String>,
    /// Owner stats fed to the weapon (`attack_speed`, `damage`, ...).
    #[serde(default)]
    pub stats: BTreeMap<String, f32>,
}

/// A scenario file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioDefinition {
    /// Scenario name.
    pub name: String,
    /// Scenario description.
    #[serde(default)]
    pub description: String,
    /// Tick limit (falls back to the config's `max_ticks`).
    #[serde(default)]
    pub ticks: Option<u64>,
    /// End early once nothing can change.
    #[serde(default = "default_true")]
    pub stop_when_settled: bool,
    /// Combatants, spawned in order.
    pub combatants: Vec<CombatantSpec>,
}

impl ScenarioDefinition {
    /// Loads and validates a scenario file.
    pub fn load(path: &Path) -> LoadoutResult<Self> {
        if !path.exists() {
            return Err(LoadoutError::NotFound(path.to_path_buf()));
        }
        Self::parse(&fs::read_to_string(path)?)
    }

    /// Parses and validates scenario TOML.
    pub fn parse(content: &str) -> LoadoutResult<Self> {
        let scenario: Self = toml::from_str(content)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Checks that names are unique and every target names a combatant.
    pub fn validate(&self) -> LoadoutResult<()> {
        if self.combatants.is_empty() {
            return Err(LoadoutError::ValidationError(format!(
                "Scenario '{}' has no combatants",
                self.name
            )));
        }

        let mut names = HashSet::new();
        for combatant in &self.combatants {
            if combatant.name.trim().is_empty() {
                return Err(LoadoutError::ValidationError(
                    "Combatant has empty name".to_string(),
                ));
            }
            if !names.insert(combatant.name.to_lowercase()) {
                return Err(LoadoutError::ValidationError(format!(
                    "Duplicate combatant name: {}",
                    combatant.name
                )));
            }
        }

        for combatant in &self.combatants {
            if let Some(target) = &combatant.target {
                if !names.contains(&target.to_lowercase()) {
                    return Err(LoadoutError::UnknownReference(format!(
                        "{} targets '{target}'",
                        combatant.name
                    )));
                }
                if combatant.weapon.is_none() {
                    return Err(LoadoutError::ValidationError(format!(
                        "{} has a target but no weapon",
                        combatant.name
                    )));
                }
            }
        }

        Ok(())
    }
}

// ============================================================================
// Runner
// ============================================================================

/// Builds arenas from scenarios and runs them.
#[derive(Debug)]
pub struct ScenarioRunner<'a> {
    registry: &'a LoadoutRegistry,
    config: SimConfig,
}

impl<'a> ScenarioRunner<'a> {
    /// Creates a runner over a registry and config.
    ///
    /// The config is validated on the way in, so an unusable bus capacity or
    /// tick rate set in code is clamped like one read from a file.
    #[must_use]
    pub fn new(registry: &'a LoadoutRegistry, config: &SimConfig) -> Self {
        let mut config = config.clone();
        config.validate();
        Self { registry, config }
    }

    fn weapon(&self, reference: &str) -> LoadoutResult<&'a WeaponDefinition> {
        self.registry
            .weapon_by_name(reference)
            .or_else(|| reference.parse().ok().and_then(|id| self.registry.weapon(id)))
            .ok_or_else(|| LoadoutError::UnknownReference(format!("weapon '{reference}'")))
    }

    fn defender(&self, reference: &str) -> LoadoutResult<&'a DefenderDefinition> {
        self.registry
            .defender_by_name(reference)
            .or_else(|| reference.parse().ok().and_then(|id| self.registry.defender(id)))
            .ok_or_else(|| LoadoutError::UnknownReference(format!("defender '{reference}'")))
    }

    /// Spawns and wires every combatant.
    pub fn build(&self, scenario: &ScenarioDefinition) -> LoadoutResult<Arena> {
        let mut arena = Arena::new(self.config.event_bus_capacity);

        for (index, spec) in scenario.combatants.iter().enumerate() {
            let id = arena.spawn(spec.name.clone());

            if let Some(reference) = &spec.weapon {
                let weapon = self.weapon(reference)?;
                let sheet = spec
                    .stats
                    .iter()
                    .fold(StatSheet::new(), |sheet, (name, value)| sheet.with(name, *value));

                let mut fire = weapon.build_fire_control()?;
                let mut attack = weapon.build_attack();
                fire.refresh_from(&sheet);
                attack.refresh_from(&sheet);
                arena.equip(id, fire, attack, weapon.travel_time);
                debug!(combatant = %spec.name, weapon = %weapon.name, "equipped");
            }

            if let Some(reference) = &spec.defender {
                let defender = self.defender(reference)?;
                let seed = self.config.seed.map(|s| s.wrapping_add(index as u64));
                let pipeline = defender.build_pipeline(seed)?;
                arena.add_defense(id, pipeline, defender.despawn_on_death);
            }
        }

        for spec in &scenario.combatants {
            if let Some(target_name) = &spec.target {
                let shooter = arena
                    .find(&spec.name)
                    .ok_or_else(|| LoadoutError::UnknownReference(spec.name.clone()))?;
                let target = arena
                    .find(target_name)
                    .ok_or_else(|| LoadoutError::UnknownReference(target_name.clone()))?;
                arena.set_target(shooter, Some(target));
            }
        }

        Ok(arena)
    }

    /// Builds and runs a scenario, optionally overriding its tick limit.
    pub fn run(
        &self,
        scenario: &ScenarioDefinition,
        ticks: Option<u64>,
    ) -> LoadoutResult<ScenarioReport> {
        let mut arena = self.build(scenario)?;
        let limit = ticks.or(scenario.ticks).unwrap_or(self.config.max_ticks);
        let dt = self.config.dt();

        info!(scenario = %scenario.name, limit, "running scenario");
        for _ in 0..limit {
            arena.step(dt);
            if scenario.stop_when_settled && arena.is_settled() {
                debug!(tick = arena.tick_count(), "scenario settled");
                break;
            }
        }

        let report = ScenarioReport::from_arena(&scenario.name, &arena);
        info!(
            scenario = %scenario.name,
            ticks = report.ticks,
            "scenario finished"
        );
        Ok(report)
    }
}

// ============================================================================
// Report
// ============================================================================

/// Final state of one combatant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatantReport {
    /// Combatant name.
    pub name: String,
    /// Final handle.
    pub entity: EntityId,
    /// Still in the arena (not despawned).
    pub present: bool,
    /// Dead (whether or not despawned).
    pub dead: bool,
    /// Remaining health, if it had a defender and is present.
    pub health: Option<f32>,
    /// Remaining shield, if it had a defender and is present.
    pub shield: Option<f32>,
    /// Running totals.
    #[serde(flatten)]
    pub tally: CombatTally,
}

/// Outcome of a scenario run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioReport {
    /// Scenario name.
    pub scenario: String,
    /// Ticks actually run.
    pub ticks: u64,
    /// Simulated seconds.
    pub elapsed: f32,
    /// Per-combatant results, in spawn order.
    pub combatants: Vec<CombatantReport>,
    /// Events the bus dropped; the per-combatant totals are unaffected.
    #[serde(default)]
    pub dropped_events: u64,
}

impl ScenarioReport {
    /// Snapshots an arena.
    #[must_use]
    pub fn from_arena(scenario: &str, arena: &Arena) -> Self {
        let combatants = arena
            .roster()
            .map(|(id, name)| {
                let defense = arena.defense(id);
                let tally = arena.tally(id).unwrap_or_default();
                CombatantReport {
                    name: name.to_string(),
                    entity: id,
                    present: arena.is_alive(id),
                    dead: defense.map_or(tally.deaths > 0, |d| d.is_dead()),
                    health: defense.map(|d| d.health()),
                    shield: defense.map(|d| d.shield()),
                    tally,
                }
            })
            .collect();

        Self {
            scenario: scenario.to_string(),
            ticks: arena.tick_count(),
            elapsed: arena.elapsed(),
            combatants,
            dropped_events: arena.dropped_events(),
        }
    }

    /// Looks up a combatant's result by name.
    #[must_use]
    pub fn combatant(&self, name: &str) -> Option<&CombatantReport> {
        self.combatants
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for ScenarioReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} ({} ticks, {:.2}s)",
            self.scenario, self.ticks, self.elapsed
        )?;
        writeln!(
            f,
            "{:<16} {:>8} {:>8} {:>6} {:>9} {:>9} {:>6}",
            "name", "health", "shield", "shots", "dealt", "taken", "state"
        )?;
        for c in &self.combatants {
            let state = match (c.present, c.dead) {
                (false, _) => "gone",
                (true, true) => "dead",
                (true, false) => "alive",
            };
            writeln!(
                f,
                "{:<16} {:>8} {:>8} {:>6} {:>9.1} {:>9.1} {:>6}",
                c.name,
                c.health.map_or_else(|| "-".to_string(), |h| format!("{h:.1}")),
                c.shield.map_or_else(|| "-".to_string(), |s| format!("{s:.1}")),
                c.tally.shots_fired,
                c.tally.damage_dealt,
                c.tally.damage_taken,
                state
            )?;
        }
        if self.dropped_events > 0 {
            writeln!(f, "({} bus events dropped)", self.dropped_events)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loadout::LoadoutLoader;

    const LOADOUTS: &str = r#"
        [[weapons]]
        id = 1
        name = "Carbine"

        [weapons.attack]
        damage = 10.0

        [weapons.fire]
        base_rate = 2.0
        auto_fire = true

        [[weapons]]
        id = 2
        name = "Bow"
        travel_time = 0.5

        [weapons.attack]
        damage = 30.0

        [weapons.fire]
        base_rate = 1.0
        auto_fire = true

        [[defenders]]
        id = 1
        name = "Grunt"
        max_health = 50.0
        max_shield = 20.0

        [[defenders]]
        id = 2
        name = "Boss"
        max_health = 1000.0
        despawn_on_death = true

        [defenders.defense]
        prevent_death_once = true
    "#;

    const DUEL: &str = r#"
        name = "duel"
        ticks = 600

        [[combatants]]
        name = "Alice"
        weapon = "carbine"
        defender = "Grunt"
        target = "bob"

        [[combatants]]
        name = "Bob"
        defender = "grunt"
    "#;

    fn registry() -> LoadoutRegistry {
        let mut loader = LoadoutLoader::new("unused");
        loader.load_str(LOADOUTS).expect("valid loadouts");
        loader.into_registry()
    }

    fn config() -> SimConfig {
        SimConfig {
            tick_rate: 20,
            seed: Some(1),
            ..SimConfig::default()
        }
    }

    #[test]
    fn test_duel_settles_with_bob_dead() {
        let registry = registry();
        let config = config();
        let runner = ScenarioRunner::new(&registry, &config);
        let scenario = ScenarioDefinition::parse(DUEL).expect("valid scenario");

        let report = runner.run(&scenario, None).expect("runs");

        let bob = report.combatant("bob").expect("bob reported");
        assert!(bob.dead);
        assert!(bob.present);
        assert_eq!(bob.health, Some(0.0));
        assert_eq!(bob.shield, Some(0.0));
        assert_eq!(bob.tally.deaths, 1);

        let alice = report.combatant("alice").expect("alice reported");
        assert_eq!(alice.tally.shots_fired, 7);
        assert_eq!(alice.tally.damage_dealt, 70.0);
        assert!(!alice.dead);
        assert!(report.ticks < 600);
    }

    #[test]
    fn test_tick_override() {
        let registry = registry();
        let config = config();
        let runner = ScenarioRunner::new(&registry, &config);
        let scenario = ScenarioDefinition::parse(DUEL).expect("valid scenario");

        let report = runner.run(&scenario, Some(1)).expect("runs");
        assert_eq!(report.ticks, 1);
        assert_eq!(report.combatant("bob").and_then(|b| b.shield), Some(10.0));
    }

    #[test]
    fn test_stats_feed_weapon() {
        let registry = registry();
        let config = config();
        let runner = ScenarioRunner::new(&registry, &config);
        let scenario = ScenarioDefinition::parse(
            r#"
            name = "buffed"

            [[combatants]]
            name = "Alice"
            weapon = "1"
            target = "Bob"
            stats = { damage = 70.0 }

            [[combatants]]
            name = "Bob"
            defender = "Grunt"
            "#,
        )
        .expect("valid scenario");

        let report = runner.run(&scenario, None).expect("runs");
        let bob = report.combatant("bob").expect("bob reported");
        assert!(bob.dead);
        assert_eq!(report.ticks, 1);
    }

    #[test]
    fn test_boss_survives_first_lethal_volley_then_despawns() {
        let registry = registry();
        let config = config();
        let runner = ScenarioRunner::new(&registry, &config);
        let scenario = ScenarioDefinition::parse(
            r#"
            name = "boss"

            [[combatants]]
            name = "Archer"
            weapon = "Bow"
            target = "Boss"
            stats = { damage = 5000.0 }

            [[combatants]]
            name = "Boss"
            defender = "Boss"
            "#,
        )
        .expect("valid scenario");

        let report = runner.run(&scenario, None).expect("runs");
        let boss = report.combatant("boss").expect("boss reported");
        assert!(!boss.present);
        assert!(boss.dead);
        assert_eq!(boss.tally.deaths, 1);
        assert_eq!(report.combatant("archer").map(|a| a.tally.shots_fired), Some(2));
    }

    #[test]
    fn test_unknown_target_rejected() {
        let err = ScenarioDefinition::parse(
            r#"
            name = "bad"
            [[combatants]]
            name = "Alice"
            weapon = "carbine"
            target = "nobody"
            "#,
        )
        .expect_err("target does not exist");
        assert!(matches!(err, LoadoutError::UnknownReference(_)));
    }

    #[test]
    fn test_unknown_weapon_rejected() {
        let registry = registry();
        let config = config();
        let runner = ScenarioRunner::new(&registry, &config);
        let scenario = ScenarioDefinition::parse(
            r#"
            name = "bad"
            [[combatants]]
            name = "Alice"
            weapon = "railgun"
            "#,
        )
        .expect("structurally valid");

        assert!(matches!(
            runner.build(&scenario),
            Err(LoadoutError::UnknownReference(_))
        ));
    }

    #[test]
    fn test_config_built_in_code_is_clamped() {
        let registry = registry();
        let config = SimConfig {
            event_bus_capacity: 0,
            ..config()
        };
        let runner = ScenarioRunner::new(&registry, &config);
        let scenario = ScenarioDefinition::parse(DUEL).expect("valid scenario");

        let report = runner.run(&scenario, None).expect("runs");

        assert_eq!(report.dropped_events, 0);
        let alice = report.combatant("alice").expect("alice reported");
        assert_eq!(alice.tally.shots_fired, 7);
        assert_eq!(alice.tally.damage_dealt, 70.0);
    }

    #[test]
    fn test_shipped_duel_runs_against_shipped_loadouts() {
        let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../..");
        let config = SimConfig::load_from(root.join("skirmish.toml"));
        assert_eq!(config.seed, Some(42));

        let mut loader = LoadoutLoader::new(root.join(&config.loadout_path));
        let loaded = loader.load_all().expect("shipped loadouts load");
        assert_eq!(loaded, 5);
        let registry = loader.into_registry();

        let scenario =
            ScenarioDefinition::load(&root.join("scenarios/duel.toml")).expect("shipped scenario");
        let report = ScenarioRunner::new(&registry, &config)
            .run(&scenario, None)
            .expect("runs");

        let names: Vec<&str> = report.combatants.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Rifleman", "Archer", "Drone", "Sentry"]);
        assert_eq!(report.dropped_events, 0);

        // The drone has 60 health behind 20 shield and despawns on death
        let drone = report.combatant("drone").expect("drone reported");
        assert!(drone.dead);
        assert!(!drone.present);
        assert_eq!(drone.tally.deaths, 1);
        assert_eq!(drone.tally.damage_taken, 80.0);
        let sentry = report.combatant("sentry").expect("sentry reported");
        assert_eq!(sentry.tally.damage_dealt, 80.0);
        assert_eq!(sentry.tally.damage_taken, 0.0);

        let rifleman = report.combatant("rifleman").expect("rifleman reported");
        let archer = report.combatant("archer").expect("archer reported");
        assert!(rifleman.tally.shots_fired > 0);
        assert!(archer.tally.shots_fired > 0);
        assert_eq!(rifleman.tally.damage_taken, archer.tally.damage_dealt);
        assert_eq!(archer.tally.damage_taken, rifleman.tally.damage_dealt);
    }

    #[test]
    fn test_report_serializes_to_json() {
        let registry = registry();
        let config = config();
        let runner = ScenarioRunner::new(&registry, &config);
        let scenario = ScenarioDefinition::parse(DUEL).expect("valid scenario");
        let report = runner.run(&scenario, Some(2)).expect("runs");

        let json = serde_json::to_value(&report).expect("serializable");
        assert_eq!(json["scenario"], "duel");
        assert_eq!(json["combatants"][0]["name"], "Alice");
        assert!(json["combatants"][0]["shots_fired"].is_number());

        let text = report.to_string();
        assert!(text.contains("Alice"));
    }
}
