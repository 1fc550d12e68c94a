//! Loadout data loading and management.
//!
//! This module provides:
//! - Loading weapon and defender definitions from `*.toml` loadout files
//! - Validation on load
//! - A registry with lookup by ID and case-insensitive name
//! - Construction of combat components from definitions

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use skirmish_combat::{
    AttackConfig, AttackSpec, CombatError, DamageType, DefenseConfig, FireControl,
    FireControlConfig, FlatVitals, MitigationPipeline,
};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Default directory for loadout files.
pub const DEFAULT_LOADOUT_PATH: &str = "assets/loadouts";

/// Errors that can occur while loading loadouts and scenarios.
#[derive(Debug, Error)]
pub enum LoadoutError {
    /// File or directory not found.
    #[error("Loadout path not found: {0}")]
    NotFound(PathBuf),

    /// Failed to read file.
    #[error("Failed to read loadout file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML.
    #[error("Failed to parse loadout TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Validation error.
    #[error("Loadout validation error: {0}")]
    ValidationError(String),

    /// Duplicate definition ID.
    #[error("Duplicate {kind} ID: {id}")]
    DuplicateId {
        /// "weapon" or "defender"
        kind: &'static str,
        /// The repeated ID
        id: u32,
    },

    /// A name that does not resolve to any definition or combatant.
    #[error("Unknown reference: {0}")]
    UnknownReference(String),

    /// A definition produced a combat component that refused to build.
    #[error("Combat setup failed: {0}")]
    Combat(#[from] CombatError),
}

/// Result type for loadout operations.
pub type LoadoutResult<T> = Result<T, LoadoutError>;

// ============================================================================
// Definitions
// ============================================================================

/// A weapon definition loaded from file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeaponDefinition {
    /// Unique weapon identifier.
    pub id: u32,
    /// Display name.
    pub name: String,
    /// Weapon description.
    #[serde(default)]
    pub description: String,
    /// Damage parameters.
    #[serde(default)]
    pub attack: AttackConfig,
    /// Timing parameters.
    #[serde(default)]
    pub fire: FireControlConfig,
    /// Seconds from shot to impact (0 = hitscan).
    #[serde(default)]
    pub travel_time: f32,
}

impl WeaponDefinition {
    /// Validates the weapon definition.
    pub fn validate(&self) -> LoadoutResult<()> {
        if self.name.trim().is_empty() {
            return Err(LoadoutError::ValidationError(format!(
                "Weapon {} has empty name",
                self.id
            )));
        }

        if !self.travel_time.is_finite() || self.travel_time < 0.0 {
            return Err(LoadoutError::ValidationError(format!(
                "Weapon {} has invalid travel_time: {}",
                self.id, self.travel_time
            )));
        }

        self.attack.validate().map_err(|e| {
            LoadoutError::ValidationError(format!("Weapon {} attack: {e}", self.id))
        })?;
        self.fire.validate().map_err(|e| {
            LoadoutError::ValidationError(format!("Weapon {} fire: {e}", self.id))
        })?;

        if self.fire.auto_fire && self.attack.damage == 0.0 {
            warn!("Weapon {} auto-fires but deals no damage", self.id);
        }

        Ok(())
    }

    /// Builds the fire control for this weapon.
    pub fn build_fire_control(&self) -> LoadoutResult<FireControl> {
        Ok(FireControl::new(self.fire.clone())?)
    }

    /// Builds the attack spec for this weapon.
    #[must_use]
    pub fn build_attack(&self) -> AttackSpec {
        AttackSpec::new(&self.attack)
    }
}

/// A single resistance entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Resistance {
    /// Damage type resisted.
    pub damage_type: DamageType,
    /// Fraction negated (capped to 0.9 when applied).
    pub value: f32,
}

const fn default_damage_multiplier() -> f32 {
    1.0
}

/// A defender definition loaded from file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefenderDefinition {
    /// Unique defender identifier.
    pub id: u32,
    /// Display name.
    pub name: String,
    /// Defender description.
    #[serde(default)]
    pub description: String,
    /// Maximum (and starting) health.
    pub max_health: f32,
    /// Maximum (and starting) shield.
    #[serde(default)]
    pub max_shield: f32,
    /// Flat armor.
    #[serde(default)]
    pub armor: f32,
    /// Incoming damage multiplier.
    #[serde(default = "default_damage_multiplier")]
    pub damage_multiplier: f32,
    /// Per-type resistances.
    #[serde(default)]
    pub resistances: Vec<Resistance>,
    /// Mitigation settings.
    #[serde(default)]
    pub defense: DefenseConfig,
    /// Remove the combatant from the arena when it dies.
    #[serde(default)]
    pub despawn_on_death: bool,
}

impl DefenderDefinition {
    /// Validates the defender definition.
    pub fn validate(&self) -> LoadoutResult<()> {
        if self.name.trim().is_empty() {
            return Err(LoadoutError::ValidationError(format!(
                "Defender {} has empty name",
                self.id
            )));
        }

        if !self.max_health.is_finite() || self.max_health <= 0.0 {
            return Err(LoadoutError::ValidationError(format!(
                "Defender {} has invalid max_health: {}",
                self.id, self.max_health
            )));
        }

        if !self.max_shield.is_finite() || self.max_shield < 0.0 {
            return Err(LoadoutError::ValidationError(format!(
                "Defender {} has invalid max_shield: {}",
                self.id, self.max_shield
            )));
        }

        if self.armor < 0.0 {
            warn!("Defender {} has negative armor {}", self.id, self.armor);
        }

        for resistance in &self.resistances {
            if !resistance.value.is_finite() {
                return Err(LoadoutError::ValidationError(format!(
                    "Defender {} has invalid {} resistance",
                    self.id,
                    resistance.damage_type.name()
                )));
            }
        }

        self.defense.validate().map_err(|e| {
            LoadoutError::ValidationError(format!("Defender {} defense: {e}", self.id))
        })?;

        Ok(())
    }

    /// Builds the storage for this defender at full health and shield.
    #[must_use]
    pub fn build_vitals(&self) -> FlatVitals {
        self.resistances.iter().fold(
            FlatVitals::new(self.max_health)
                .with_shield(self.max_shield)
                .with_armor(self.armor)
                .with_damage_multiplier(self.damage_multiplier),
            |vitals, r| vitals.with_resistance(r.damage_type, r.value),
        )
    }

    /// Builds the mitigation pipeline, overriding the crit seed if one is given.
    pub fn build_pipeline(
        &self,
        crit_seed: Option<u64>,
    ) -> LoadoutResult<MitigationPipeline<FlatVitals>> {
        let mut defense = self.defense.clone();
        if crit_seed.is_some() {
            defense.crit_seed = crit_seed;
        }
        Ok(MitigationPipeline::new(self.build_vitals(), defense)?)
    }
}

/// A collection of definitions from a single file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoadoutFile {
    /// File format version.
    #[serde(default = "default_version")]
    pub version: String,
    /// Weapons in this file.
    #[serde(default)]
    pub weapons: Vec<WeaponDefinition>,
    /// Defenders in this file.
    #[serde(default)]
    pub defenders: Vec<DefenderDefinition>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

// ============================================================================
// Registry
// ============================================================================

/// Loadout registry with fast lookup.
#[derive(Debug, Default)]
pub struct LoadoutRegistry {
    /// Weapons by ID.
    weapons: HashMap<u32, WeaponDefinition>,
    /// Weapon IDs by name (lowercase).
    weapon_names: HashMap<String, u32>,
    /// Defenders by ID.
    defenders: HashMap<u32, DefenderDefinition>,
    /// Defender IDs by name (lowercase).
    defender_names: HashMap<String, u32>,
}

impl LoadoutRegistry {
    /// Creates a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of definitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.weapons.len() + self.defenders.len()
    }

    /// Returns true if the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.weapons.is_empty() && self.defenders.is_empty()
    }

    /// Registers a weapon.
    pub fn register_weapon(&mut self, weapon: WeaponDefinition) -> LoadoutResult<()> {
        if self.weapons.contains_key(&weapon.id) {
            return Err(LoadoutError::DuplicateId {
                kind: "weapon",
                id: weapon.id,
            });
        }
        self.weapon_names.insert(weapon.name.to_lowercase(), weapon.id);
        self.weapons.insert(weapon.id, weapon);
        Ok(())
    }

    /// Registers a defender.
    pub fn register_defender(&mut self, defender: DefenderDefinition) -> LoadoutResult<()> {
        if self.defenders.contains_key(&defender.id) {
            return Err(LoadoutError::DuplicateId {
                kind: "defender",
                id: defender.id,
            });
        }
        self.defender_names
            .insert(defender.name.to_lowercase(), defender.id);
        self.defenders.insert(defender.id, defender);
        Ok(())
    }

    /// Gets a weapon by ID.
    #[must_use]
    pub fn weapon(&self, id: u32) -> Option<&WeaponDefinition> {
        self.weapons.get(&id)
    }

    /// Gets a weapon by name (case-insensitive).
    #[must_use]
    pub fn weapon_by_name(&self, name: &str) -> Option<&WeaponDefinition> {
        self.weapon_names
            .get(&name.to_lowercase())
            .and_then(|id| self.weapons.get(id))
    }

    /// Gets a defender by ID.
    #[must_use]
    pub fn defender(&self, id: u32) -> Option<&DefenderDefinition> {
        self.defenders.get(&id)
    }

    /// Gets a defender by name (case-insensitive).
    #[must_use]
    pub fn defender_by_name(&self, name: &str) -> Option<&DefenderDefinition> {
        self.defender_names
            .get(&name.to_lowercase())
            .and_then(|id| self.defenders.get(id))
    }

    /// Returns an iterator over all weapons.
    pub fn weapons(&self) -> impl Iterator<Item = &WeaponDefinition> {
        self.weapons.values()
    }

    /// Returns an iterator over all defenders.
    pub fn defenders(&self) -> impl Iterator<Item = &DefenderDefinition> {
        self.defenders.values()
    }

    /// Clears the registry.
    pub fn clear(&mut self) {
        self.weapons.clear();
        self.weapon_names.clear();
        self.defenders.clear();
        self.defender_names.clear();
    }
}

// ============================================================================
// Loader
// ============================================================================

/// Reads loadout files from a directory into a registry.
#[derive(Debug)]
pub struct LoadoutLoader {
    /// Base path for loadout files.
    base_path: PathBuf,
    /// Loadout registry.
    registry: LoadoutRegistry,
}

impl LoadoutLoader {
    /// Creates a new loadout loader.
    #[must_use]
    pub fn new(base_path: impl AsRef<Path>) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
            registry: LoadoutRegistry::new(),
        }
    }

    /// Returns a reference to the registry.
    #[must_use]
    pub fn registry(&self) -> &LoadoutRegistry {
        &self.registry
    }

    /// Consumes the loader, returning its registry.
    #[must_use]
    pub fn into_registry(self) -> LoadoutRegistry {
        self.registry
    }

    /// Loads every `*.toml` file in the base path, in file name order.
    ///
    /// A file that fails to load is skipped with a warning.
    pub fn load_all(&mut self) -> LoadoutResult<usize> {
        if !self.base_path.is_dir() {
            return Err(LoadoutError::NotFound(self.base_path.clone()));
        }

        let mut files = Vec::new();
        for entry in fs::read_dir(&self.base_path)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "toml") {
                files.push(path);
            }
        }
        files.sort();

        let mut count = 0;
        for file_path in files {
            match self.load_file(&file_path) {
                Ok(n) => {
                    count += n;
                    debug!("Loaded {} definitions from {:?}", n, file_path);
                },
                Err(e) => {
                    warn!("Failed to load loadout file {:?}: {}", file_path, e);
                },
            }
        }

        info!("Loaded {} loadout definitions total", count);
        Ok(count)
    }

    /// Loads definitions from a single file.
    pub fn load_file(&mut self, path: &Path) -> LoadoutResult<usize> {
        if !path.exists() {
            return Err(LoadoutError::NotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path)?;
        self.load_str(&content)
    }

    /// Loads definitions from TOML text.
    ///
    /// Every definition is validated before any is registered, so a bad file
    /// leaves the registry untouched.
    pub fn load_str(&mut self, content: &str) -> LoadoutResult<usize> {
        let file: LoadoutFile = toml::from_str(content)?;

        for weapon in &file.weapons {
            weapon.validate()?;
        }
        for defender in &file.defenders {
            defender.validate()?;
        }

        let mut count = 0;
        for weapon in file.weapons {
            self.registry.register_weapon(weapon)?;
            count += 1;
        }
        for defender in file.defenders {
            self.registry.register_defender(defender)?;
            count += 1;
        }

        Ok(count)
    }

    /// Reloads everything from the base path.
    pub fn reload(&mut self) -> LoadoutResult<usize> {
        self.registry.clear();
        self.load_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skirmish_combat::{FireMode, StopCondition};
    use tempfile::TempDir;

    const ARMORY: &str = r#"
        [[weapons]]
        id = 1
        name = "Burst Rifle"
        travel_time = 0.0

        [weapons.attack]
        damage = 10.0
        damage_type = "physical"
        crit_chance = 0.1
        crit_multiplier = 2.0

        [weapons.fire]
        base_rate = 1.0
        auto_fire = true

        [weapons.fire.mode]
        kind = "continuous"
        fire_interval = 0.08
        fire_on_start = true
        cooldown_after_stop = true

        [weapons.fire.mode.stop]
        kind = "shot_count"
        max_shots = 5

        [[defenders]]
        id = 1
        name = "Drone"
        max_health = 100.0
        max_shield = 30.0
        armor = 2.0
        despawn_on_death = true
        resistances = [
            { damage_type = "fire", value = 0.5 },
        ]

        [defenders.defense]
        iframes_enabled = true
        iframe_duration = 0.25
        immune_types = ["poison"]
    "#;

    fn weapon(id: u32, name: &str) -> WeaponDefinition {
        WeaponDefinition {
            id,
            name: name.to_string(),
            description: String::new(),
            attack: AttackConfig::default(),
            fire: FireControlConfig::default(),
            travel_time: 0.0,
        }
    }

    #[test]
    fn test_load_str_parses_nested_tables() {
        let mut loader = LoadoutLoader::new("unused");
        assert_eq!(loader.load_str(ARMORY).expect("valid loadout"), 2);

        let rifle = loader
            .registry()
            .weapon_by_name("burst rifle")
            .expect("rifle registered");
        assert_eq!(
            rifle.fire.mode,
            FireMode::Continuous {
                fire_interval: 0.08,
                fire_on_start: true,
                cooldown_after_stop: true,
                stop: StopCondition::ShotCount { max_shots: 5 },
            }
        );

        let drone = loader.registry().defender(1).expect("drone registered");
        assert!(drone.despawn_on_death);
        assert_eq!(drone.damage_multiplier, 1.0);
        assert_eq!(drone.defense.immune_types, vec![DamageType::Poison]);
        assert!(!drone.defense.prevent_death_once);

        let vitals = drone.build_vitals();
        assert_eq!(vitals.resistances.get(&DamageType::Fire), Some(&0.5));
    }

    #[test]
    fn test_build_components() {
        let mut loader = LoadoutLoader::new("unused");
        loader.load_str(ARMORY).expect("valid loadout");
        let registry = loader.registry();

        let fire = registry
            .weapon(1)
            .expect("rifle")
            .build_fire_control()
            .expect("valid fire control");
        assert!(fire.can_fire());

        let pipeline = registry
            .defender(1)
            .expect("drone")
            .build_pipeline(Some(3))
            .expect("valid pipeline");
        assert_eq!(pipeline.health(), 100.0);
        assert_eq!(pipeline.shield(), 30.0);
        assert_eq!(pipeline.config().crit_seed, Some(3));
    }

    #[test]
    fn test_weapon_validate_empty_name() {
        assert!(matches!(
            weapon(1, " ").validate(),
            Err(LoadoutError::ValidationError(_))
        ));
    }

    #[test]
    fn test_weapon_validate_bad_interval() {
        let mut bad = weapon(1, "Broken");
        bad.fire.mode = FireMode::Continuous {
            fire_interval: 0.0,
            fire_on_start: false,
            cooldown_after_stop: false,
            stop: StopCondition::Manual,
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_invalid_file_registers_nothing() {
        let mut loader = LoadoutLoader::new("unused");
        let content = r#"
            [[weapons]]
            id = 1
            name = "Fine"

            [[defenders]]
            id = 2
            name = "Ghost"
            max_health = 0.0
        "#;

        assert!(loader.load_str(content).is_err());
        assert!(loader.registry().is_empty());
    }

    #[test]
    fn test_registry_duplicate() {
        let mut registry = LoadoutRegistry::new();
        assert!(registry.register_weapon(weapon(1, "Pistol")).is_ok());
        assert!(matches!(
            registry.register_weapon(weapon(1, "Other")),
            Err(LoadoutError::DuplicateId {
                kind: "weapon",
                id: 1
            })
        ));
    }

    #[test]
    fn test_load_all_from_directory() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        fs::write(temp_dir.path().join("armory.toml"), ARMORY).expect("write armory");
        fs::write(temp_dir.path().join("broken.toml"), "[[weapons]]\nid = ").expect("write broken");
        fs::write(temp_dir.path().join("notes.txt"), "ignored").expect("write notes");

        let mut loader = LoadoutLoader::new(temp_dir.path());
        assert_eq!(loader.load_all().expect("directory exists"), 2);
        assert_eq!(loader.registry().len(), 2);

        // Reload does not trip over the already registered IDs
        assert_eq!(loader.reload().expect("directory exists"), 2);
    }

    #[test]
    fn test_load_all_missing_directory() {
        let mut loader = LoadoutLoader::new("/nonexistent/loadouts");
        assert!(matches!(loader.load_all(), Err(LoadoutError::NotFound(_))));
    }
}
