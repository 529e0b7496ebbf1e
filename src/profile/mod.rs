//! Game profile management
//!
//! A profile describes everything needed to bridge one game: the game
//! name the emulator announces, the process layout to read, and the
//! output descriptors with their transforms and device targets.
//!
//! Profiles are JSON documents in a profiles directory. The store loads
//! them read-only; nothing in this crate ever writes a profile file.
//! Files are loaded in file-name order, which is also the detection
//! match priority.

use crate::error::{OutrigError, Result};
use crate::message::GameBinding;
use crate::types::{AddressKind, OutputDescriptor};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::warn;

/// File extension for profile documents
pub const PROFILE_FILE_EXTENSION: &str = "json";

/// Default pointer width in bytes for pointer chains
pub const DEFAULT_POINTER_WIDTH: u8 = 8;

fn default_profile_version() -> u32 {
    1
}

fn default_pointer_width() -> u8 {
    DEFAULT_POINTER_WIDTH
}

/// A complete output profile for one game
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    /// Profile format version for future migration support
    #[serde(default = "default_profile_version")]
    pub version: u32,

    /// Profile name, unique within the store
    pub name: String,

    /// Game name announced by the emulator that activates this profile
    pub game: String,

    /// Process name an embedding provider should attach to
    #[serde(default)]
    pub process: Option<String>,

    /// Pointer size in bytes for pointer chains (4 or 8)
    #[serde(default = "default_pointer_width")]
    pub pointer_width: u8,

    /// Poll interval override in milliseconds (None = application default)
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,

    /// Outputs to sample and dispatch
    #[serde(default)]
    pub outputs: Vec<OutputDescriptor>,
}

impl Profile {
    /// Create an empty profile for a game
    pub fn new(name: impl Into<String>, game: impl Into<String>) -> Self {
        Self {
            version: 1,
            name: name.into(),
            game: game.into(),
            process: None,
            pointer_width: DEFAULT_POINTER_WIDTH,
            poll_interval_ms: None,
            outputs: Vec::new(),
        }
    }

    /// Add an output descriptor
    pub fn with_output(mut self, descriptor: OutputDescriptor) -> Self {
        self.outputs.push(descriptor);
        self
    }

    /// Set the target process name
    pub fn with_process(mut self, process: impl Into<String>) -> Self {
        self.process = Some(process.into());
        self
    }

    /// Set the pointer width (4 or 8 bytes)
    pub fn with_pointer_width(mut self, width: u8) -> Self {
        self.pointer_width = width;
        self
    }

    /// Find an output by label
    pub fn output(&self, label: &str) -> Option<&OutputDescriptor> {
        self.outputs.iter().find(|d| d.label == label)
    }

    /// The detection binding for this profile
    pub fn binding(&self) -> GameBinding {
        GameBinding::new(&self.name, &self.game)
    }

    /// Check the profile's structural invariants
    ///
    /// Labels must be unique, module-offset addresses must name a
    /// module, and the pointer width must be 4 or 8.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(OutrigError::Profile("profile name is empty".to_string()));
        }
        if self.pointer_width != 4 && self.pointer_width != 8 {
            return Err(OutrigError::Profile(format!(
                "'{}': pointer_width must be 4 or 8, got {}",
                self.name, self.pointer_width
            )));
        }

        let mut seen = HashSet::new();
        for descriptor in &self.outputs {
            if descriptor.label.is_empty() {
                return Err(OutrigError::Profile(format!(
                    "'{}': output with empty label",
                    self.name
                )));
            }
            if !seen.insert(descriptor.label.as_str()) {
                return Err(OutrigError::Profile(format!(
                    "'{}': duplicate label '{}'",
                    self.name, descriptor.label
                )));
            }
            if let AddressKind::ModuleOffset { ref module, .. } = descriptor.address {
                if module.is_empty() {
                    return Err(OutrigError::Profile(format!(
                        "'{}': output '{}' has a module offset without a module name",
                        self.name, descriptor.label
                    )));
                }
            }
        }
        Ok(())
    }

    /// Rewrite module names after a process retarget
    ///
    /// Every module-offset output whose module matches `old_module`
    /// (case-insensitively) is repointed at `new_module`. Returns the
    /// number of outputs changed. Only the in-memory profile mutates;
    /// the store never writes the change back.
    pub fn reconcile_modules(&mut self, old_module: &str, new_module: &str) -> usize {
        let mut changed = 0;
        for descriptor in &mut self.outputs {
            if let AddressKind::ModuleOffset { ref mut module, .. } = descriptor.address {
                if module.eq_ignore_ascii_case(old_module) {
                    *module = new_module.to_string();
                    changed += 1;
                }
            }
        }
        changed
    }

    /// Load and validate a profile from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            OutrigError::Profile(format!("Failed to read profile {:?}: {}", path, e))
        })?;
        let profile: Profile = serde_json::from_str(&content).map_err(|e| {
            OutrigError::Profile(format!("Failed to parse profile {:?}: {}", path, e))
        })?;
        profile.validate()?;
        Ok(profile)
    }
}

/// Read-only collection of profiles from a directory
#[derive(Debug, Default)]
pub struct ProfileStore {
    profiles: Vec<Profile>,
}

impl ProfileStore {
    /// Create a store with no profiles
    pub fn empty() -> Self {
        Self {
            profiles: Vec::new(),
        }
    }

    /// Load every profile document in a directory
    ///
    /// Files load in name order. A file that fails to parse or validate
    /// is skipped with a warning so one broken profile cannot take the
    /// rest down. A missing directory yields an empty store.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.exists() {
            warn!("Profiles directory {:?} does not exist", dir);
            return Ok(Self::empty());
        }

        let mut paths: Vec<_> = std::fs::read_dir(dir)
            .map_err(|e| {
                OutrigError::Profile(format!("Failed to read profiles directory {:?}: {}", dir, e))
            })?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .map(|ext| ext.eq_ignore_ascii_case(PROFILE_FILE_EXTENSION))
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();

        let mut store = Self::empty();
        for path in paths {
            match Profile::load(&path) {
                Ok(profile) => {
                    if store.get(&profile.name).is_some() {
                        warn!(
                            "Skipping {:?}: duplicate profile name '{}'",
                            path, profile.name
                        );
                        continue;
                    }
                    store.profiles.push(profile);
                }
                Err(e) => warn!("Skipping profile {:?}: {}", path, e),
            }
        }
        Ok(store)
    }

    /// All profiles in load order
    pub fn profiles(&self) -> &[Profile] {
        &self.profiles
    }

    /// Number of loaded profiles
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    /// True when no profiles loaded
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Look up a profile by name
    pub fn get(&self, name: &str) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.name == name)
    }

    /// The first profile claiming a game name, in load order
    pub fn find_by_game(&self, game: &str) -> Option<&Profile> {
        self.profiles
            .iter()
            .find(|p| p.game.eq_ignore_ascii_case(game))
    }

    /// Detection bindings for all profiles, in match priority order
    pub fn bindings(&self) -> Vec<GameBinding> {
        self.profiles.iter().map(|p| p.binding()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ValueKind;

    fn module_output(label: &str, module: &str) -> OutputDescriptor {
        OutputDescriptor::new(
            label,
            AddressKind::ModuleOffset {
                module: module.to_string(),
                offset: 0x10,
            },
            ValueKind::U32,
        )
    }

    #[test]
    fn test_validate_accepts_well_formed() {
        let profile = Profile::new("daytona-cab", "daytona")
            .with_output(module_output("rpm", "game.exe"))
            .with_output(module_output("lamp", "game.exe"));
        assert!(profile.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_duplicate_labels() {
        let profile = Profile::new("p", "g")
            .with_output(module_output("rpm", "game.exe"))
            .with_output(module_output("rpm", "other.dll"));
        let err = profile.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate label 'rpm'"));
    }

    #[test]
    fn test_validate_rejects_empty_module() {
        let profile = Profile::new("p", "g").with_output(module_output("rpm", ""));
        assert!(profile.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_pointer_width() {
        let profile = Profile::new("p", "g").with_pointer_width(2);
        assert!(profile.validate().is_err());
    }

    #[test]
    fn test_reconcile_modules() {
        let mut profile = Profile::new("p", "g")
            .with_output(module_output("a", "Game.exe"))
            .with_output(module_output("b", "game.exe"))
            .with_output(module_output("c", "physics.dll"))
            .with_output(OutputDescriptor::new(
                "d",
                AddressKind::Absolute { address: 0x1000 },
                ValueKind::U32,
            ));

        let changed = profile.reconcile_modules("GAME.EXE", "game_remaster.exe");
        assert_eq!(changed, 2);

        for label in ["a", "b"] {
            match &profile.output(label).unwrap().address {
                AddressKind::ModuleOffset { module, .. } => {
                    assert_eq!(module, "game_remaster.exe");
                }
                other => panic!("unexpected address kind {:?}", other),
            }
        }
        match &profile.output("c").unwrap().address {
            AddressKind::ModuleOffset { module, .. } => assert_eq!(module, "physics.dll"),
            other => panic!("unexpected address kind {:?}", other),
        }
    }

    #[test]
    fn test_store_loads_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        for (file, name, game) in [
            ("20_outrun.json", "outrun-cab", "outrun"),
            ("10_daytona.json", "daytona-cab", "daytona"),
        ] {
            let profile = Profile::new(name, game);
            std::fs::write(
                dir.path().join(file),
                serde_json::to_string_pretty(&profile).unwrap(),
            )
            .unwrap();
        }

        let store = ProfileStore::load_dir(dir.path()).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.profiles()[0].name, "daytona-cab");
        assert_eq!(store.profiles()[1].name, "outrun-cab");
    }

    #[test]
    fn test_store_skips_broken_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.json"), "{ not json").unwrap();

        let good = Profile::new("good", "game");
        std::fs::write(
            dir.path().join("good.json"),
            serde_json::to_string(&good).unwrap(),
        )
        .unwrap();

        let store = ProfileStore::load_dir(dir.path()).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.profiles()[0].name, "good");
    }

    #[test]
    fn test_store_skips_duplicate_names() {
        let dir = tempfile::tempdir().unwrap();
        for file in ["a.json", "b.json"] {
            let profile = Profile::new("same-name", "game");
            std::fs::write(
                dir.path().join(file),
                serde_json::to_string(&profile).unwrap(),
            )
            .unwrap();
        }

        let store = ProfileStore::load_dir(dir.path()).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::load_dir(dir.path().join("nope")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_find_by_game_first_wins() {
        let dir = tempfile::tempdir().unwrap();
        for (file, name) in [("1.json", "first"), ("2.json", "second")] {
            let profile = Profile::new(name, "outrun");
            std::fs::write(
                dir.path().join(file),
                serde_json::to_string(&profile).unwrap(),
            )
            .unwrap();
        }

        let store = ProfileStore::load_dir(dir.path()).unwrap();
        assert_eq!(store.find_by_game("OutRun").unwrap().name, "first");
    }

    #[test]
    fn test_bindings_follow_load_order() {
        let dir = tempfile::tempdir().unwrap();
        for (file, name, game) in [("1.json", "a", "g1"), ("2.json", "b", "g2")] {
            let profile = Profile::new(name, game);
            std::fs::write(
                dir.path().join(file),
                serde_json::to_string(&profile).unwrap(),
            )
            .unwrap();
        }

        let store = ProfileStore::load_dir(dir.path()).unwrap();
        let bindings = store.bindings();
        assert_eq!(bindings[0], GameBinding::new("a", "g1"));
        assert_eq!(bindings[1], GameBinding::new("b", "g2"));
    }

    #[test]
    fn test_profile_json_round_trip() {
        let profile = Profile::new("daytona-cab", "daytona")
            .with_process("daytona.exe")
            .with_pointer_width(4)
            .with_output(
                module_output("rpm", "daytona.exe")
                    .with_transform("value * 100")
                    .with_format("0"),
            );

        let json = serde_json::to_string_pretty(&profile).unwrap();
        let back: Profile = serde_json::from_str(&json).unwrap();
        assert_eq!(back.name, "daytona-cab");
        assert_eq!(back.pointer_width, 4);
        assert_eq!(back.outputs.len(), 1);
        assert_eq!(back.outputs[0].transform.as_deref(), Some("value * 100"));
    }
}
