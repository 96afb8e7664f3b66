/* Parser and lookup for .keyboard files: loads INI model descriptions (package size and the four
 * lighting regions with their keycode tables) into a KeyboardDb keyed by model name. */
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use configparser::ini::Ini;
use tracing::{debug, warn};

/* Package size used when a model file does not override it. */
pub const DEFAULT_PACKAGE_SIZE: usize = 520;

/* Smallest package able to carry an effect packet (trailer ends at 0x9B). */
pub const MIN_PACKAGE_SIZE: usize = 0x9B;

/* Lighting regions in the fixed order the device is updated in. */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionKind {
    Modifiers,
    Alphanumerics,
    Enter,
    Special,
}

impl RegionKind {
    pub const ALL: [RegionKind; 4] = [
        RegionKind::Modifiers,
        RegionKind::Alphanumerics,
        RegionKind::Enter,
        RegionKind::Special,
    ];

    /* Lower-cased INI section holding this region's table. */
    fn section(self) -> &'static str {
        match self {
            RegionKind::Modifiers => "region/modifiers",
            RegionKind::Alphanumerics => "region/alphanumerics",
            RegionKind::Enter => "region/enter",
            RegionKind::Special => "region/special",
        }
    }
}

impl fmt::Display for RegionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegionKind::Modifiers => f.write_str("modifiers"),
            RegionKind::Alphanumerics => f.write_str("alphanumerics"),
            RegionKind::Enter => f.write_str("enter"),
            RegionKind::Special => f.write_str("special"),
        }
    }
}

/* One region table: its protocol id and canonical keycode order. */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub kind: RegionKind,
    pub id: u8,
    pub keycodes: Vec<u8>,
}

impl Region {
    /* Slot order inside a region packet: the region's own slot first. */
    pub fn slots(&self) -> impl Iterator<Item = u8> + '_ {
        std::iter::once(self.id).chain(self.keycodes.iter().copied())
    }

    pub fn slot_count(&self) -> usize {
        self.keycodes.len() + 1
    }
}

/* A parsed `.keyboard` file describing a supported per-key RGB model. */
#[derive(Debug, Clone)]
pub struct KeyboardModel {
    pub name: String,
    pub package_size: usize,
    /* Always the four regions, in `RegionKind::ALL` order. */
    pub regions: Vec<Region>,
}

impl KeyboardModel {
    /* Number of key states a full snapshot carries for this model. */
    pub fn key_count(&self) -> usize {
        self.regions.iter().map(Region::slot_count).sum()
    }

    /* Whether `(region, keycode)` names a slot of this model. */
    pub fn has_slot(&self, region: u8, keycode: u8) -> bool {
        self.regions
            .iter()
            .any(|r| r.id == region && r.slots().any(|kc| kc == keycode))
    }

    pub fn region(&self, kind: RegionKind) -> Option<&Region> {
        self.regions.iter().find(|r| r.kind == kind)
    }
}

/* Keyboard database: maps the lower-cased model name to its model. */
pub type KeyboardDb = HashMap<String, Arc<KeyboardModel>>;

/* Load all `.keyboard` files from the given directory into a lookup table. */
pub fn load_keyboard_database(data_dir: &Path) -> KeyboardDb {
    let mut db = HashMap::new();

    let entries = match std::fs::read_dir(data_dir) {
        Ok(e) => e,
        Err(err) => {
            warn!("Failed to read keyboard data directory {:?}: {}", data_dir, err);
            return db;
        }
    };

    for dir_entry in entries.flatten() {
        let path = dir_entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("keyboard") {
            continue;
        }

        match parse_keyboard_file(&path) {
            Ok(model) => {
                debug!(
                    "Loaded keyboard: {} ({} keys, {} byte packages)",
                    model.name,
                    model.key_count(),
                    model.package_size
                );
                db.insert(model.name.to_lowercase(), Arc::new(model));
            }
            Err(err) => {
                warn!("Failed to parse {:?}: {}", path, err);
            }
        }
    }

    debug!("Keyboard database loaded: {} models", db.len());
    db
}

/* Keycode lists are semicolon separated, so only `#` may open an inline comment. */
fn new_ini() -> Ini {
    let mut ini = Ini::new();
    ini.set_inline_comment_symbols(Some(&['#']));
    ini
}

/* Parse a single `.keyboard` INI file into a `KeyboardModel`. */
fn parse_keyboard_file(path: &Path) -> Result<KeyboardModel, String> {
    let mut ini = new_ini();
    ini.load(path).map_err(|e| format!("INI parse error: {}", e))?;
    parse_keyboard_ini(&ini)
}

fn parse_keyboard_ini(ini: &Ini) -> Result<KeyboardModel, String> {
    /* [Keyboard] section */
    let name = ini
        .get("keyboard", "name")
        .ok_or("Missing [Keyboard] Name")?;

    let package_size = match ini.get("keyboard", "packagesize") {
        Some(v) => v
            .trim()
            .parse::<usize>()
            .map_err(|e| format!("Invalid PackageSize '{}': {}", v, e))?,
        None => DEFAULT_PACKAGE_SIZE,
    };
    if package_size < MIN_PACKAGE_SIZE {
        return Err(format!(
            "PackageSize {} is below the minimum of {}",
            package_size, MIN_PACKAGE_SIZE
        ));
    }

    /* [Region/xxx] sections, all four required */
    let mut regions = Vec::with_capacity(RegionKind::ALL.len());
    for kind in RegionKind::ALL {
        let section = kind.section();
        let id_str = ini
            .get(section, "id")
            .ok_or_else(|| format!("Missing [{}] Id", section))?;
        let id = u8::from_str_radix(id_str.trim(), 16)
            .map_err(|e| format!("Invalid region id '{}': {}", id_str, e))?;
        let keycodes = ini
            .get(section, "keycodes")
            .map(|s| parse_hex_list(&s))
            .transpose()?
            .unwrap_or_default();

        regions.push(Region { kind, id, keycodes });
    }

    Ok(KeyboardModel {
        name,
        package_size,
        regions,
    })
}

/* Parse a semicolon-delimited list of hex bytes (e.g. "e0;e1;e2").  */
/*                                                                   */
/* Unlike lenient lists, a bad token is an error: dropping one would */
/* shift every following key into the wrong slot.                    */
fn parse_hex_list(s: &str) -> Result<Vec<u8>, String> {
    s.split(';')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| u8::from_str_radix(p, 16).map_err(|e| format!("Invalid keycode '{}': {}", p, e)))
        .collect()
}
