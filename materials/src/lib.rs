//! # Material Knowledge Base
//!
//! Immutable registry of filament and nozzle profiles with their physical
//! envelopes. The registry is built once and shared read-only: every other
//! subsystem (parameter optimizer, slicing recipe, guided workflow) consults
//! it but never mutates it.
//!
//! Profiles encode the practical limits that keep prints from failing:
//! temperature ranges, maximum volumetric flow, retraction behavior, cooling
//! envelopes, and handling flags such as "cannot pass through the spool
//! changer" for flexible filaments.

use std::collections::HashMap;
use std::sync::OnceLock;

pub mod filaments;
pub mod nozzles;

pub use filaments::{
    CoolingEnvelope, FilamentProfile, MaterialClass, TemperatureRange, WarpTendency,
};
pub use nozzles::{NozzleMetallurgy, NozzleProfile};

/// Quality tiers used when picking a layer height for a nozzle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerQuality {
    Fine,
    Standard,
    Draft,
}

/// Needs used to rank filament suggestions.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilamentNeeds {
    pub strength: bool,
    pub flexibility: bool,
    pub heat_resistance: bool,
    pub outdoor: bool,
    pub waterproof: bool,
}

/// Read-only registry of filament and nozzle profiles.
pub struct MaterialKnowledgeBase {
    filaments: HashMap<String, FilamentProfile>,
    nozzles: Vec<NozzleProfile>,
}

impl MaterialKnowledgeBase {
    /// Returns the process-wide registry, built on first access.
    pub fn global() -> &'static MaterialKnowledgeBase {
        static REGISTRY: OnceLock<MaterialKnowledgeBase> = OnceLock::new();
        REGISTRY.get_or_init(MaterialKnowledgeBase::new)
    }

    fn new() -> Self {
        let mut filaments = HashMap::new();
        for profile in filaments::builtin_profiles() {
            filaments.insert(normalize_key(&profile.key), profile);
        }

        Self {
            filaments,
            nozzles: nozzles::builtin_nozzles(),
        }
    }

    /// Looks up a filament by name. Keys are case-insensitive and
    /// whitespace/hyphen normalized; plain class names (`pla`, `petg`, `pc`,
    /// `tpu`, `abs`) resolve to the representative profile of that class.
    pub fn lookup_filament(&self, key: &str) -> Option<&FilamentProfile> {
        let normalized = normalize_key(key);
        if let Some(profile) = self.filaments.get(&normalized) {
            return Some(profile);
        }

        let alias = match normalized.as_str() {
            "pla" => "bambu_pla",
            "petg" => "generic_petg",
            "pc" | "polycarbonate" => "prusa_pc_blend",
            "tpu" | "tpu_95a" => "generic_tpu_95a",
            "abs" => "generic_abs",
            _ => return None,
        };
        self.filaments.get(alias)
    }

    /// Lists all registered filaments, deduplicated by profile name.
    pub fn list_filaments(&self) -> Vec<&FilamentProfile> {
        let mut seen = Vec::new();
        let mut out: Vec<&FilamentProfile> = Vec::new();
        let mut keys: Vec<&String> = self.filaments.keys().collect();
        keys.sort();
        for key in keys {
            let profile = &self.filaments[key];
            if !seen.contains(&profile.name) {
                seen.push(profile.name.clone());
                out.push(profile);
            }
        }
        out
    }

    /// Suggests filaments for a set of needs, best match first.
    ///
    /// Flexibility is an exclusive branch: flexible filament is only ever
    /// suggested when flex is requested, and nothing rigid is suggested
    /// alongside it.
    pub fn suggest_filaments(&self, needs: &FilamentNeeds) -> Vec<&FilamentProfile> {
        if needs.flexibility {
            return self
                .list_filaments()
                .into_iter()
                .filter(|p| p.is_flexible)
                .collect();
        }

        let mut scored: Vec<(i32, &FilamentProfile)> = self
            .list_filaments()
            .into_iter()
            .filter(|p| !p.is_flexible)
            .map(|p| {
                let mut score = 0;
                if needs.heat_resistance {
                    score += match p.material_class {
                        MaterialClass::Pc => 3,
                        MaterialClass::Petg => 2,
                        _ => 0,
                    };
                }
                if needs.waterproof || needs.outdoor {
                    score += match p.material_class {
                        MaterialClass::Petg => 3,
                        MaterialClass::Pc => 1,
                        MaterialClass::RigidPla => -1,
                        _ => 0,
                    };
                }
                if needs.strength {
                    score += match p.material_class {
                        MaterialClass::Pc => 2,
                        MaterialClass::Petg | MaterialClass::CfAbrasive => 1,
                        _ => 0,
                    };
                }
                // Easy materials win ties
                if p.material_class == MaterialClass::RigidPla {
                    score += 1;
                }
                (score, p)
            })
            .collect();

        scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.name.cmp(&b.1.name)));
        scored.into_iter().map(|(_, p)| p).collect()
    }

    /// Looks up a nozzle by diameter and metallurgy preference.
    pub fn lookup_nozzle(&self, diameter: f64, hardened: bool) -> Option<&NozzleProfile> {
        let wanted = if hardened {
            NozzleMetallurgy::Hardened
        } else {
            NozzleMetallurgy::Standard
        };

        self.nozzles
            .iter()
            .find(|n| (n.diameter - diameter).abs() < 0.01 && n.metallurgy == wanted)
            .or_else(|| {
                self.nozzles
                    .iter()
                    .find(|n| (n.diameter - diameter).abs() < 0.01)
            })
    }

    /// Recommends a nozzle for the job at hand, with an explanation.
    ///
    /// Rule order: abrasive material forces hardened steel; fine detail on a
    /// small part wants 0.2mm; speed priority on a large part wants 0.8mm;
    /// everything else gets the standard 0.4mm.
    pub fn recommend_nozzle(
        &self,
        part_size: PartSize,
        fine_detail: bool,
        abrasive: bool,
        speed_priority: bool,
    ) -> (&NozzleProfile, String) {
        if abrasive {
            let nozzle = self
                .lookup_nozzle(0.4, true)
                .expect("registry always contains a hardened 0.4mm nozzle");
            return (
                nozzle,
                "abrasive filament wears stainless nozzles; use hardened steel".to_string(),
            );
        }

        if fine_detail && part_size == PartSize::Small {
            let nozzle = self
                .lookup_nozzle(0.2, false)
                .expect("registry always contains a 0.2mm nozzle");
            return (
                nozzle,
                "0.2mm resolves fine detail on small parts".to_string(),
            );
        }

        if speed_priority && part_size == PartSize::Large {
            let nozzle = self
                .lookup_nozzle(0.8, true)
                .expect("registry always contains a 0.8mm nozzle");
            return (
                nozzle,
                "0.8mm lays down thick lines for fast large prints".to_string(),
            );
        }

        let nozzle = self
            .lookup_nozzle(0.4, false)
            .expect("registry always contains the standard 0.4mm nozzle");
        (
            nozzle,
            "0.4mm standard nozzle balances detail and speed".to_string(),
        )
    }

    /// Picks a layer height for a nozzle and quality tier, snapped to 0.04mm
    /// steps. Ratios of nozzle diameter: fine 0.25, standard 0.50, draft 0.70.
    pub fn layer_height_for(&self, nozzle_diameter: f64, quality: LayerQuality) -> f64 {
        let ratio = match quality {
            LayerQuality::Fine => 0.25,
            LayerQuality::Standard => 0.50,
            LayerQuality::Draft => 0.70,
        };
        snap_layer_height(nozzle_diameter * ratio)
    }
}

/// Relative part size used for nozzle recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartSize {
    Small,
    Medium,
    Large,
}

/// Snaps a layer height to the printer's 0.04mm step grid.
pub fn snap_layer_height(height: f64) -> f64 {
    (height / 0.04).round() * 0.04
}

/// Normalizes a lookup key: lowercase, whitespace and hyphens to underscores.
pub fn normalize_key(key: &str) -> String {
    key.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_whitespace() || c == '-' { '_' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_normalized() {
        let mkb = MaterialKnowledgeBase::global();
        let a = mkb.lookup_filament("Bambu PETG Translucent").unwrap();
        let b = mkb.lookup_filament("bambu_petg_translucent").unwrap();
        let c = mkb.lookup_filament("  bambu-petg-translucent ").unwrap();
        assert_eq!(a.name, b.name);
        assert_eq!(b.name, c.name);
    }

    #[test]
    fn test_class_aliases_resolve() {
        let mkb = MaterialKnowledgeBase::global();
        assert_eq!(
            mkb.lookup_filament("pc").unwrap().material_class,
            MaterialClass::Pc
        );
        assert!(mkb.lookup_filament("tpu").unwrap().is_flexible);
        assert!(mkb.lookup_filament("unobtainium").is_none());
    }

    #[test]
    fn test_list_is_deduplicated() {
        let mkb = MaterialKnowledgeBase::global();
        let names: Vec<_> = mkb.list_filaments().iter().map(|p| &p.name).collect();
        let mut unique = names.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(names.len(), unique.len());
    }

    #[test]
    fn test_flex_is_exclusive_branch() {
        let mkb = MaterialKnowledgeBase::global();

        let flex = mkb.suggest_filaments(&FilamentNeeds {
            flexibility: true,
            ..Default::default()
        });
        assert!(!flex.is_empty());
        assert!(flex.iter().all(|p| p.is_flexible));

        let rigid = mkb.suggest_filaments(&FilamentNeeds {
            strength: true,
            ..Default::default()
        });
        assert!(rigid.iter().all(|p| !p.is_flexible));
    }

    #[test]
    fn test_waterproof_prefers_petg() {
        let mkb = MaterialKnowledgeBase::global();
        let suggestions = mkb.suggest_filaments(&FilamentNeeds {
            waterproof: true,
            ..Default::default()
        });
        assert_eq!(suggestions[0].material_class, MaterialClass::Petg);
    }

    #[test]
    fn test_nozzle_recommendation_rule_order() {
        let mkb = MaterialKnowledgeBase::global();

        let (nozzle, reason) = mkb.recommend_nozzle(PartSize::Small, true, true, true);
        assert_eq!(nozzle.metallurgy, NozzleMetallurgy::Hardened);
        assert!(reason.contains("hardened"));

        let (nozzle, _) = mkb.recommend_nozzle(PartSize::Small, true, false, false);
        assert!((nozzle.diameter - 0.2).abs() < 1e-9);

        let (nozzle, _) = mkb.recommend_nozzle(PartSize::Large, false, false, true);
        assert!((nozzle.diameter - 0.8).abs() < 1e-9);

        let (nozzle, _) = mkb.recommend_nozzle(PartSize::Medium, false, false, false);
        assert!((nozzle.diameter - 0.4).abs() < 1e-9);
        assert_eq!(nozzle.metallurgy, NozzleMetallurgy::Standard);
    }

    #[test]
    fn test_layer_height_snapping() {
        let mkb = MaterialKnowledgeBase::global();
        assert!((mkb.layer_height_for(0.4, LayerQuality::Standard) - 0.20).abs() < 1e-9);
        assert!((mkb.layer_height_for(0.4, LayerQuality::Draft) - 0.28).abs() < 1e-9);
        assert!((mkb.layer_height_for(0.4, LayerQuality::Fine) - 0.12).abs() < 1e-9);
        assert!((mkb.layer_height_for(0.6, LayerQuality::Standard) - 0.28).abs() < 1e-9);
    }

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("Bambu PLA"), "bambu_pla");
        assert_eq!(normalize_key("PLA-CF"), "pla_cf");
        assert_eq!(normalize_key("  petg  "), "petg");
    }
}
