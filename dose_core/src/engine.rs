//! Dose calculation engine.
//!
//! Resolution order for a calculation:
//! 1. Admin override (via the resolver) - a formula failure here logs a
//!    warning and falls through to the next tier instead of failing the
//!    calculation.
//! 2. Default edit matched by exact medication name, with age-rule
//!    selection done here.
//! 3. Built-in catalog entry.
//! 4. No tier matched: `Error::MedicationNotFound`.
//!
//! The override tier additionally applies weight capping, tiered max-dose
//! capping, and secondary-component capping for combination medications.

use crate::formula::{self, Bindings};
use crate::resolver;
use crate::store::AdminStore;
use crate::types::*;
use crate::{Error, Result};

/// Admin-form example text for the mL formula field; treated the same as an
/// empty field when it was saved verbatim.
pub const DOSE_ML_PLACEHOLDER: &str = "e.g. dose/25";

/// Dose calculation engine over a catalog and an admin store
pub struct DoseEngine<S: AdminStore> {
    catalog: Catalog,
    store: S,
}

impl<S: AdminStore> DoseEngine<S> {
    pub fn new(catalog: Catalog, store: S) -> Self {
        Self { catalog, store }
    }

    /// Engine over the built-in medication table
    pub fn with_default_catalog(store: S) -> Self {
        Self::new(crate::catalog::get_default_catalog().clone(), store)
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Calculate the recommended dose for a patient.
    ///
    /// `weight_kg` is the patient weight in kilograms, `age_in_months` the
    /// age in months. Fails with [`Error::MedicationNotFound`] when no
    /// override, default edit, or built-in rule matches the name.
    pub fn calculate(
        &self,
        medication: &str,
        weight_kg: f64,
        age_in_months: f64,
    ) -> Result<CalculationResult> {
        let overrides = self.store.load_overrides()?;
        if let Some(o) =
            resolver::resolve(&overrides, medication, Some(age_in_months), Some(weight_kg))
        {
            match calculate_from_override(o, weight_kg, age_in_months) {
                Ok(result) => {
                    tracing::info!(medication, "calculated dose from admin override");
                    return Ok(result);
                }
                Err(e) => {
                    tracing::warn!(
                        medication,
                        error = %e,
                        "override calculation failed, falling back to default edit"
                    );
                }
            }
        }

        let edits = self.store.load_default_edits()?;
        if let Some(edit) = resolver::find_default_edit(&edits, medication) {
            match calculate_from_default_edit(edit, weight_kg, age_in_months) {
                Ok(result) => {
                    tracing::info!(medication, "calculated dose from default edit");
                    return Ok(result);
                }
                Err(e) => {
                    tracing::warn!(
                        medication,
                        error = %e,
                        "default edit calculation failed, falling back to built-in rule"
                    );
                }
            }
        }

        if let Some(med) = self.catalog.get(medication) {
            tracing::info!(medication, "calculated dose from built-in rule");
            return calculate_from_medication(med, weight_kg, age_in_months);
        }

        Err(Error::MedicationNotFound {
            name: medication.to_string(),
        })
    }
}

// ============================================================================
// Frequency and reference helpers
// ============================================================================

/// Infer administrations per day from the frequency label.
///
/// Substring matching against the label, case-insensitive; unrecognized
/// labels mean once daily.
pub fn doses_per_day(frequency: &str) -> f64 {
    let label = frequency.to_lowercase();
    if label.contains("12 hours") || label.contains("twice") {
        2.0
    } else if label.contains("8 hours") {
        3.0
    } else if label.contains("6 hours") {
        4.0
    } else if label.contains("4 hours") {
        6.0
    } else if label.contains("5 times") {
        5.0
    } else {
        1.0
    }
}

/// Derive the reference URL and its human label from an optional URL
fn reference_link(url: Option<&str>, medication: &str) -> (String, String) {
    match url {
        Some(url) => {
            let prefix = if url.contains("dailymed") {
                "DailyMed - "
            } else if url.contains("lexi") {
                "LEXICOMP - "
            } else if url.contains("drugs.com") {
                "Drugs.com - "
            } else {
                "Reference - "
            };
            (url.to_string(), format!("{}{}", prefix, medication))
        }
        None => (String::new(), format!("Reference - {}", medication)),
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ============================================================================
// Per-tier calculation
// ============================================================================

fn calculate_from_override(
    o: &Override,
    weight_kg: f64,
    age_in_months: f64,
) -> Result<CalculationResult> {
    let bindings = Bindings::patient(weight_kg, age_in_months);

    let mut working = formula::evaluate(&o.formula, &bindings)?;
    let mut weight_cap: Option<f64> = None;

    // Weight-cap tier: above the pediatric weight limit the dose is the
    // dose at the limit, never the extrapolated one
    if let Some(max_weight) = o.max_weight_kg {
        if weight_kg > max_weight {
            working = formula::evaluate(&o.formula, &Bindings::patient(max_weight, age_in_months))?;
            weight_cap = Some(max_weight);
        }
    }

    // Max-dose tier; strict comparison, a dose exactly at the ceiling
    // passes uncapped
    let mut message: Option<String> = None;
    if let Some(max_dose) = &o.max_dose {
        let ceiling = max_dose.evaluate(&bindings)?;
        if working > ceiling {
            message = Some(match weight_cap {
                Some(cap) => format!(
                    "Patient weight {} kg exceeds the pediatric weight limit of {} kg. \
                     The dose at the weight limit ({:.1} mg) was further capped at the \
                     maximum safe dose of {:.1} mg. Consider adult dosing.",
                    weight_kg, cap, working, ceiling
                ),
                None => format!(
                    "Computed dose {:.1} mg was capped at the maximum safe dose of {:.1} mg.",
                    working, ceiling
                ),
            });
            working = ceiling;
        }
    }
    if message.is_none() {
        if let Some(cap) = weight_cap {
            message = Some(format!(
                "Patient weight {} kg exceeds the pediatric weight limit of {} kg. \
                 Dose shown is the dose at {} kg ({:.1} mg). Consider adult dosing.",
                weight_kg, cap, cap, working
            ));
        }
    }

    // mL derivation: explicit formula wins over the concentration pair
    let per_day = doses_per_day(&o.frequency);
    let ml_formula = o
        .dose_ml_formula
        .as_deref()
        .map(str::trim)
        .filter(|expr| !expr.is_empty() && *expr != DOSE_ML_PLACEHOLDER);

    let mut dose_ml = if let Some(expr) = ml_formula {
        formula::evaluate(expr, &Bindings::with_dose(weight_kg, age_in_months, working))?
    } else if let Some(conc) = &o.concentration {
        working * conc.ml / conc.mg / per_day
    } else {
        0.0
    };

    // Secondary-component capping for combination medications; skipped when
    // a cap message was already composed above
    if message.is_none() {
        if let Some(secondary) = &o.secondary {
            if let (Some(sec_conc), Some(sec_max)) = (&secondary.concentration, &secondary.max_dose)
            {
                let content_per_day = dose_ml * per_day * sec_conc.mg / sec_conc.ml;
                let ceiling = sec_max.evaluate(&bindings)?;
                if content_per_day > ceiling {
                    dose_ml = ceiling * sec_conc.ml / (sec_conc.mg * per_day);
                    // The secondary ceiling constrains the delivered volume,
                    // so the primary dose must follow it back down
                    if let Some(conc) = &o.concentration {
                        working = dose_ml * per_day * conc.mg / conc.ml;
                    }
                    message = Some(format!(
                        "{} content would be {:.1} mg/day, above the maximum of {:.1} mg/day. \
                         Volume reduced to {:.2} mL per dose and the {} dose adjusted to {:.1} mg.",
                        secondary.name, content_per_day, ceiling, dose_ml, o.medication, working
                    ));
                }
            }
        }
    }

    let (reference_url, reference_label) =
        reference_link(o.reference_url.as_deref(), &o.medication);

    Ok(CalculationResult {
        dose_mg: round1(working),
        dose_ml: round2(dose_ml),
        frequency: o.frequency.clone(),
        reference: o.reference.clone(),
        reference_url,
        reference_label,
        comment: o.comment.clone(),
        max_dose_message: message,
        source: RuleSource::Override,
    })
}

fn calculate_from_default_edit(
    edit: &DefaultEdit,
    weight_kg: f64,
    age_in_months: f64,
) -> Result<CalculationResult> {
    let bindings = Bindings::patient(weight_kg, age_in_months);

    // Age-rule selection: first rule containing the age wins; ages covered
    // by no rule fall back to the edit's single default formula
    let (expr, rule_label) = match edit.age_rules.iter().find(|r| r.contains(age_in_months)) {
        Some(rule) => (rule.formula.as_str(), rule.label.clone()),
        None => (edit.formula.as_str(), None),
    };

    let mut working = formula::evaluate(expr, &bindings)?;

    let mut message = None;
    if let Some(max_dose) = &edit.max_dose {
        let ceiling = max_dose.evaluate(&bindings)?;
        if working > ceiling {
            message = Some(format!(
                "Computed dose {:.1} mg was capped at the maximum safe dose of {:.1} mg.",
                working, ceiling
            ));
            working = ceiling;
        }
    }

    let per_day = doses_per_day(&edit.frequency);
    let dose_ml = match &edit.concentration {
        Some(conc) => working * conc.ml / conc.mg / per_day,
        None => 0.0,
    };

    let comment = if working == 0.0 {
        rule_label.or_else(|| edit.comment.clone())
    } else {
        edit.comment.clone()
    };

    let (reference_url, reference_label) =
        reference_link(edit.reference_url.as_deref(), &edit.medication);

    Ok(CalculationResult {
        dose_mg: round1(working),
        dose_ml: round2(dose_ml),
        frequency: edit.frequency.clone(),
        reference: edit.reference.clone(),
        reference_url,
        reference_label,
        comment,
        max_dose_message: message,
        source: RuleSource::DefaultEdit,
    })
}

fn calculate_from_medication(
    med: &Medication,
    weight_kg: f64,
    age_in_months: f64,
) -> Result<CalculationResult> {
    let bindings = Bindings::patient(weight_kg, age_in_months);

    let (expr, rule_label) = match med.age_rules.iter().find(|r| r.contains(age_in_months)) {
        Some(rule) => (rule.formula.as_str(), rule.label.clone()),
        None => (med.formula.as_str(), None),
    };

    let mut working = formula::evaluate(expr, &bindings)?;

    let mut message = None;
    if let Some(max_dose) = &med.max_dose {
        let ceiling = max_dose.evaluate(&bindings)?;
        if working > ceiling {
            message = Some(format!(
                "Computed dose {:.1} mg was capped at the maximum safe dose of {:.1} mg.",
                working, ceiling
            ));
            working = ceiling;
        }
    }

    let per_day = doses_per_day(&med.frequency);
    let dose_ml = match &med.concentration {
        Some(conc) => working * conc.ml / conc.mg / per_day,
        None => 0.0,
    };

    // Zero-dose age rules mark "not recommended" ages; surface the rule
    // label so the caller can explain the zero
    let comment = if working == 0.0 { rule_label } else { None };

    let (reference_url, reference_label) = reference_link(med.reference_url.as_deref(), &med.name);

    Ok(CalculationResult {
        dose_mg: round1(working),
        dose_ml: round2(dose_ml),
        frequency: med.frequency.clone(),
        reference: med.reference.clone(),
        reference_url,
        reference_label,
        comment,
        max_dose_message: message,
        source: RuleSource::Catalog,
    })
}
