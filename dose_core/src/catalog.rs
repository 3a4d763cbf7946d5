//! Built-in medication table.
//!
//! This module provides the fixed set of medications the engine falls back
//! to when no override or default edit applies. Formulas yield the computed
//! dose in mg as written on the source reference (typically per day); the
//! per-administration volume is derived from the concentration pair and the
//! frequency label.

use crate::formula;
use crate::types::*;
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Cached default catalog - built once and reused across all operations
static DEFAULT_CATALOG: Lazy<Catalog> = Lazy::new(build_default_catalog_internal);

/// Get a reference to the cached default catalog
pub fn get_default_catalog() -> &'static Catalog {
    &DEFAULT_CATALOG
}

/// Builds the default catalog of built-in medications
///
/// **Note**: For production use, prefer `get_default_catalog()` which returns
/// a cached reference. This function is retained for testing and custom
/// catalog creation.
pub fn build_default_catalog() -> Catalog {
    build_default_catalog_internal()
}

/// Shorthand constructor for a catalog entry with no max dose or age rules
#[allow(clippy::too_many_arguments)]
fn med(
    name: &str,
    category: Category,
    formula: &str,
    frequency: &str,
    reference: &str,
    reference_url: Option<&str>,
    concentration: Option<Concentration>,
    max_dose: Option<MaxDose>,
) -> Medication {
    Medication {
        name: name.into(),
        category,
        formula: formula.into(),
        frequency: frequency.into(),
        reference: reference.into(),
        reference_url: reference_url.map(Into::into),
        max_dose,
        concentration,
        age_rules: Vec::new(),
    }
}

fn age_rule(min_months: f64, max_months: f64, formula: &str, label: Option<&str>) -> AgeRule {
    AgeRule {
        min_months,
        max_months,
        formula: formula.into(),
        label: label.map(Into::into),
    }
}

/// Internal function that actually builds the catalog
fn build_default_catalog_internal() -> Catalog {
    let mut entries = Vec::new();

    // ========================================================================
    // Antibiotics
    // ========================================================================

    entries.push(med(
        "Amoxicillin",
        Category::Antibiotic,
        "50*weightKg",
        "Every 8 hours",
        "DailyMed prescribing information",
        Some("https://dailymed.nlm.nih.gov/dailymed/search.cfm?query=amoxicillin"),
        Some(Concentration::new(250.0, 5.0)),
        Some(MaxDose::Literal(3000.0)),
    ));

    entries.push(med(
        "Amoxicillin High Dose",
        Category::Antibiotic,
        "90*weightKg",
        "Every 12 hours",
        "AAP Red Book, acute otitis media",
        Some("https://dailymed.nlm.nih.gov/dailymed/search.cfm?query=amoxicillin"),
        Some(Concentration::new(400.0, 5.0)),
        Some(MaxDose::Literal(4000.0)),
    ));

    entries.push(med(
        "Augmentin 457",
        Category::Antibiotic,
        "45*weightKg",
        "Every 12 hours",
        "DailyMed prescribing information",
        Some("https://dailymed.nlm.nih.gov/dailymed/search.cfm?query=amoxicillin+clavulanate"),
        Some(Concentration::new(400.0, 5.0)),
        Some(MaxDose::Literal(4000.0)),
    ));

    entries.push(med(
        "Azithromycin",
        Category::Antibiotic,
        "10*weightKg",
        "Once daily",
        "DailyMed prescribing information",
        Some("https://dailymed.nlm.nih.gov/dailymed/search.cfm?query=azithromycin"),
        Some(Concentration::new(200.0, 5.0)),
        Some(MaxDose::Literal(500.0)),
    ));

    entries.push(med(
        "Cephalexin",
        Category::Antibiotic,
        "50*weightKg",
        "Every 6 hours",
        "Drugs.com pediatric dosage",
        Some("https://www.drugs.com/dosage/cephalexin.html"),
        Some(Concentration::new(250.0, 5.0)),
        Some(MaxDose::Literal(4000.0)),
    ));

    entries.push(med(
        "Zinnat 125",
        Category::Antibiotic,
        "30*weightKg",
        "Every 12 hours",
        "DailyMed prescribing information",
        Some("https://dailymed.nlm.nih.gov/dailymed/search.cfm?query=cefuroxime"),
        Some(Concentration::new(125.0, 5.0)),
        Some(MaxDose::Literal(1000.0)),
    ));

    entries.push(med(
        "Zinnat 250",
        Category::Antibiotic,
        "30*weightKg",
        "Every 12 hours",
        "DailyMed prescribing information",
        Some("https://dailymed.nlm.nih.gov/dailymed/search.cfm?query=cefuroxime"),
        Some(Concentration::new(250.0, 5.0)),
        Some(MaxDose::Literal(1000.0)),
    ));

    entries.push(med(
        "Cefdinir",
        Category::Antibiotic,
        "14*weightKg",
        "Once daily",
        "DailyMed prescribing information",
        Some("https://dailymed.nlm.nih.gov/dailymed/search.cfm?query=cefdinir"),
        Some(Concentration::new(125.0, 5.0)),
        Some(MaxDose::Literal(600.0)),
    ));

    entries.push(med(
        "Clarithromycin",
        Category::Antibiotic,
        "15*weightKg",
        "Every 12 hours",
        "DailyMed prescribing information",
        Some("https://dailymed.nlm.nih.gov/dailymed/search.cfm?query=clarithromycin"),
        Some(Concentration::new(250.0, 5.0)),
        Some(MaxDose::Literal(1000.0)),
    ));

    entries.push(med(
        "Erythromycin",
        Category::Antibiotic,
        "40*weightKg",
        "Every 6 hours",
        "Drugs.com pediatric dosage",
        Some("https://www.drugs.com/dosage/erythromycin.html"),
        Some(Concentration::new(200.0, 5.0)),
        Some(MaxDose::Literal(2000.0)),
    ));

    entries.push(med(
        "Trimethoprim-Sulfamethoxazole",
        Category::Antibiotic,
        "8*weightKg",
        "Every 12 hours",
        "Dosed on the trimethoprim component",
        Some("https://dailymed.nlm.nih.gov/dailymed/search.cfm?query=sulfamethoxazole"),
        Some(Concentration::new(40.0, 5.0)),
        Some(MaxDose::Literal(320.0)),
    ));

    entries.push(med(
        "Nitrofurantoin",
        Category::Antibiotic,
        "6*weightKg",
        "Every 6 hours",
        "Drugs.com pediatric dosage",
        Some("https://www.drugs.com/dosage/nitrofurantoin.html"),
        Some(Concentration::new(25.0, 5.0)),
        Some(MaxDose::Literal(400.0)),
    ));

    entries.push(med(
        "Penicillin V",
        Category::Antibiotic,
        "50*weightKg",
        "Every 8 hours",
        "DailyMed prescribing information",
        Some("https://dailymed.nlm.nih.gov/dailymed/search.cfm?query=penicillin+v"),
        Some(Concentration::new(250.0, 5.0)),
        Some(MaxDose::Literal(3000.0)),
    ));

    entries.push(med(
        "Flucloxacillin",
        Category::Antibiotic,
        "50*weightKg",
        "Every 6 hours",
        "BNF for Children",
        None,
        Some(Concentration::new(250.0, 5.0)),
        Some(MaxDose::Literal(4000.0)),
    ));

    entries.push(med(
        "Metronidazole",
        Category::Antibiotic,
        "30*weightKg",
        "Every 8 hours",
        "Drugs.com pediatric dosage",
        Some("https://www.drugs.com/dosage/metronidazole.html"),
        Some(Concentration::new(200.0, 5.0)),
        Some(MaxDose::Literal(2250.0)),
    ));

    // ========================================================================
    // Analgesics, antivirals, and other medications
    // ========================================================================

    entries.push(med(
        "Paracetamol",
        Category::Other,
        "60*weightKg",
        "Every 6 hours",
        "Lexicomp pediatric dosing",
        Some("https://online.lexi.com/lco/action/search?q=acetaminophen"),
        Some(Concentration::new(120.0, 5.0)),
        Some(MaxDose::Literal(4000.0)),
    ));

    let mut ibuprofen = med(
        "Ibuprofen",
        Category::Other,
        "30*weightKg",
        "Every 8 hours",
        "Lexicomp pediatric dosing",
        Some("https://online.lexi.com/lco/action/search?q=ibuprofen"),
        Some(Concentration::new(100.0, 5.0)),
        Some(MaxDose::Literal(2400.0)),
    );
    ibuprofen.age_rules = vec![age_rule(
        0.0,
        5.0,
        "0",
        Some("Not recommended under 6 months"),
    )];
    entries.push(ibuprofen);

    let mut aciclovir = med(
        "Aciclovir",
        Category::Other,
        "80*weightKg",
        "5 times a day",
        "DailyMed prescribing information",
        Some("https://dailymed.nlm.nih.gov/dailymed/search.cfm?query=acyclovir"),
        Some(Concentration::new(200.0, 5.0)),
        Some(MaxDose::Literal(3200.0)),
    );
    aciclovir.age_rules = vec![age_rule(
        0.0,
        2.0,
        "0",
        Some("Not recommended under 3 months"),
    )];
    entries.push(aciclovir);

    let mut oseltamivir = med(
        "Oseltamivir",
        Category::Other,
        "4*weightKg",
        "Every 12 hours",
        "DailyMed prescribing information",
        Some("https://dailymed.nlm.nih.gov/dailymed/search.cfm?query=oseltamivir"),
        Some(Concentration::new(30.0, 5.0)),
        Some(MaxDose::Literal(150.0)),
    );
    oseltamivir.age_rules = vec![
        age_rule(0.0, 8.0, "0", Some("Not recommended under 9 months")),
        age_rule(9.0, 11.0, "6*weightKg", Some("9-11 months")),
        age_rule(12.0, 1188.0, "4*weightKg", Some("1 year and over")),
    ];
    entries.push(oseltamivir);

    entries.push(med(
        "Prednisolone",
        Category::Other,
        "2*weightKg",
        "Once daily",
        "Lexicomp pediatric dosing",
        Some("https://online.lexi.com/lco/action/search?q=prednisolone"),
        Some(Concentration::new(15.0, 5.0)),
        Some(MaxDose::Literal(60.0)),
    ));

    entries.push(med(
        "Dexamethasone",
        Category::Other,
        "0.6*weightKg",
        "Once daily",
        "Lexicomp pediatric dosing",
        Some("https://online.lexi.com/lco/action/search?q=dexamethasone"),
        Some(Concentration::new(1.0, 1.0)),
        Some(MaxDose::Literal(16.0)),
    ));

    let mut cetirizine = med(
        "Cetirizine",
        Category::Other,
        "5",
        "Once daily",
        "Drugs.com pediatric dosage",
        Some("https://www.drugs.com/dosage/cetirizine.html"),
        Some(Concentration::new(5.0, 5.0)),
        Some(MaxDose::Literal(10.0)),
    );
    cetirizine.age_rules = vec![
        age_rule(6.0, 23.0, "2.5", Some("6-23 months")),
        age_rule(24.0, 71.0, "5", Some("2-5 years")),
        age_rule(72.0, 1188.0, "10", Some("6 years and over")),
    ];
    entries.push(cetirizine);

    let mut loratadine = med(
        "Loratadine",
        Category::Other,
        "10",
        "Once daily",
        "Drugs.com pediatric dosage",
        Some("https://www.drugs.com/dosage/loratadine.html"),
        Some(Concentration::new(5.0, 5.0)),
        Some(MaxDose::Literal(10.0)),
    );
    loratadine.age_rules = vec![
        age_rule(0.0, 23.0, "0", Some("Not recommended under 2 years")),
        age_rule(24.0, 71.0, "5", Some("2-5 years")),
        age_rule(72.0, 1188.0, "10", Some("6 years and over")),
    ];
    entries.push(loratadine);

    entries.push(med(
        "Ondansetron",
        Category::Other,
        "0.45*weightKg",
        "Every 8 hours",
        "Lexicomp pediatric dosing",
        Some("https://online.lexi.com/lco/action/search?q=ondansetron"),
        Some(Concentration::new(4.0, 5.0)),
        Some(MaxDose::Literal(24.0)),
    ));

    entries.push(med(
        "Salbutamol",
        Category::Other,
        "0.3*weightKg",
        "Every 8 hours",
        "BNF for Children",
        None,
        Some(Concentration::new(2.0, 5.0)),
        Some(MaxDose::Literal(8.0)),
    ));

    entries.push(med(
        "Diphenhydramine",
        Category::Other,
        "5*weightKg",
        "Every 6 hours",
        "Drugs.com pediatric dosage",
        Some("https://www.drugs.com/dosage/diphenhydramine.html"),
        Some(Concentration::new(12.5, 5.0)),
        Some(MaxDose::Literal(300.0)),
    ));

    let mut medications = HashMap::new();
    for entry in entries {
        medications.insert(entry.name.clone(), entry);
    }

    Catalog { medications }
}

impl Catalog {
    /// Validate the catalog for consistency and completeness
    ///
    /// Returns a list of validation errors, or empty Vec if valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        for (name, medication) in &self.medications {
            if name.is_empty() || medication.name.is_empty() {
                errors.push("Medication has empty name".to_string());
            }
            if name != &medication.name {
                errors.push(format!(
                    "Medication key '{}' doesn't match medication.name '{}'",
                    name, medication.name
                ));
            }

            if let Err(e) = formula::validate(&medication.formula, false) {
                errors.push(format!(
                    "Medication '{}' has invalid formula '{}': {}",
                    name, medication.formula, e
                ));
            }

            if medication.frequency.is_empty() {
                errors.push(format!("Medication '{}' has empty frequency", name));
            }

            if let Some(conc) = &medication.concentration {
                if conc.mg <= 0.0 || conc.ml <= 0.0 {
                    errors.push(format!(
                        "Medication '{}' has non-positive concentration {}mg/{}mL",
                        name, conc.mg, conc.ml
                    ));
                }
            }

            if let Some(MaxDose::Formula(expr)) = &medication.max_dose {
                if let Err(e) = formula::validate(expr, false) {
                    errors.push(format!(
                        "Medication '{}' has invalid max dose formula '{}': {}",
                        name, expr, e
                    ));
                }
            }

            for rule in &medication.age_rules {
                if rule.min_months > rule.max_months {
                    errors.push(format!(
                        "Medication '{}' has inverted age range {}-{}",
                        name, rule.min_months, rule.max_months
                    ));
                }
                if let Err(e) = formula::validate(&rule.formula, false) {
                    errors.push(format!(
                        "Medication '{}' age rule has invalid formula '{}': {}",
                        name, rule.formula, e
                    ));
                }
            }
        }

        // Both listing categories must be populated
        let has_antibiotic = self
            .medications
            .values()
            .any(|m| m.category == Category::Antibiotic);
        let has_other = self
            .medications
            .values()
            .any(|m| m.category == Category::Other);

        if !has_antibiotic {
            errors.push("Catalog has no antibiotic medications".to_string());
        }
        if !has_other {
            errors.push("Catalog has no non-antibiotic medications".to_string());
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_loads() {
        let catalog = build_default_catalog();
        assert!(catalog.medications.len() >= 25);
    }

    #[test]
    fn test_default_catalog_validates() {
        let catalog = build_default_catalog();
        let errors = catalog.validate();
        assert!(
            errors.is_empty(),
            "Default catalog has validation errors: {:?}",
            errors
        );
    }

    #[test]
    fn test_zinnat_entry_shape() {
        let catalog = build_default_catalog();
        let zinnat = catalog.get("Zinnat 125").expect("Zinnat 125 missing");
        assert_eq!(zinnat.formula, "30*weightKg");
        assert_eq!(zinnat.frequency, "Every 12 hours");
        assert_eq!(zinnat.concentration, Some(Concentration::new(125.0, 5.0)));
    }

    #[test]
    fn test_both_categories_present() {
        let catalog = build_default_catalog();
        assert!(!catalog.by_category(Category::Antibiotic).is_empty());
        assert!(!catalog.by_category(Category::Other).is_empty());
    }

    #[test]
    fn test_age_rules_are_ordered_and_parseable() {
        let catalog = build_default_catalog();
        let oseltamivir = catalog.get("Oseltamivir").unwrap();
        assert_eq!(oseltamivir.age_rules.len(), 3);
        assert!(oseltamivir.age_rules[0].contains(4.0));
        assert!(oseltamivir.age_rules[1].contains(10.0));
        assert!(oseltamivir.age_rules[2].contains(48.0));
    }
}
