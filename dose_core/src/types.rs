//! Core domain types for the pediatric dose calculator.
//!
//! This module defines the fundamental types used throughout the system:
//! - Built-in medications and their dosing rules
//! - Admin overrides and default edits
//! - Max-dose variants and concentration pairs
//! - Calculation results and journal records

use crate::formula::{self, Bindings, FormulaError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

// ============================================================================
// Medication Types
// ============================================================================

/// Category of a built-in medication
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Antibiotic,
    Other,
}

/// Concentration of a liquid formulation, kept as the label-printed pair
/// (e.g. 250 mg per 5 mL) rather than a single ratio.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Concentration {
    pub mg: f64,
    pub ml: f64,
}

impl Concentration {
    pub fn new(mg: f64, ml: f64) -> Self {
        Self { mg, ml }
    }
}

/// An age-gated sub-rule of a medication or default edit.
///
/// Bounds are in months and inclusive on both ends; when adjacent rules
/// share a boundary value, the first-defined rule wins for that age.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgeRule {
    pub min_months: f64,
    pub max_months: f64,
    pub formula: String,
    pub label: Option<String>,
}

impl AgeRule {
    pub fn contains(&self, age_in_months: f64) -> bool {
        self.min_months <= age_in_months && age_in_months <= self.max_months
    }
}

/// Maximum safe dose, either a literal milligram value or a formula
/// evaluated against the patient's weight and age.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MaxDose {
    Literal(f64),
    Formula(String),
}

impl MaxDose {
    /// Evaluate to a milligram ceiling for the given patient
    pub fn evaluate(&self, bindings: &Bindings) -> Result<f64, FormulaError> {
        match self {
            MaxDose::Literal(value) => Ok(*value),
            MaxDose::Formula(expr) => formula::evaluate(expr, bindings),
        }
    }
}

/// A built-in medication (catalog entry, fixed at build time)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Medication {
    pub name: String,
    pub category: Category,
    /// Default dose formula over `weightKg` / `ageInMonths`, in mg
    pub formula: String,
    pub frequency: String,
    pub reference: String,
    pub reference_url: Option<String>,
    pub max_dose: Option<MaxDose>,
    pub concentration: Option<Concentration>,
    /// Age-gated sub-rules; when non-empty these take precedence over
    /// `formula` for ages they cover
    #[serde(default)]
    pub age_rules: Vec<AgeRule>,
}

// ============================================================================
// Override and Default-Edit Types
// ============================================================================

/// Second active ingredient of a combination medication (e.g. the
/// clavulanate in amoxicillin/clavulanate), with its own safety ceiling.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SecondaryComponent {
    pub name: String,
    pub concentration: Option<Concentration>,
    pub dose_ml_formula: Option<String>,
    pub max_dose: Option<MaxDose>,
}

/// Admin-defined replacement dosing rule for a medication, optionally
/// scoped to an age and/or weight range.
///
/// `medication` is a lookup key referencing a medication by name, not an
/// owning relationship; overrides may also name medications that have no
/// built-in entry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Override {
    pub medication: String,
    pub formula: String,
    pub frequency: String,
    pub reference: String,
    pub reference_url: Option<String>,
    pub max_dose: Option<MaxDose>,
    pub comment: Option<String>,

    pub min_age_months: Option<f64>,
    pub max_age_months: Option<f64>,
    pub age_label: Option<String>,

    pub min_weight_kg: Option<f64>,
    pub max_weight_kg: Option<f64>,
    pub weight_label: Option<String>,

    /// Explicit mL formula over `dose` / `weightKg` / `ageInMonths`;
    /// takes precedence over concentration-based derivation
    pub dose_ml_formula: Option<String>,
    pub concentration: Option<Concentration>,
    pub secondary: Option<SecondaryComponent>,
}

impl Override {
    /// True when both age bounds are present and admit the given age
    pub fn matches_age(&self, age_in_months: f64) -> bool {
        match (self.min_age_months, self.max_age_months) {
            (Some(min), Some(max)) => min <= age_in_months && age_in_months <= max,
            _ => false,
        }
    }

    /// True when the minimum weight bound (if present) admits the given
    /// weight.
    ///
    /// `max_weight_kg` never disqualifies an override during resolution:
    /// it is a dosing cap, and a patient above it still gets this rule
    /// with the dose recomputed at the bound (the engine's weight-cap
    /// tier).
    pub fn meets_min_weight(&self, weight_kg: f64) -> bool {
        match self.min_weight_kg {
            Some(min) => weight_kg >= min,
            None => true,
        }
    }

    pub fn has_age_bounds(&self) -> bool {
        self.min_age_months.is_some() || self.max_age_months.is_some()
    }

    pub fn has_weight_bounds(&self) -> bool {
        self.min_weight_kg.is_some() || self.max_weight_kg.is_some()
    }
}

/// Admin-defined in-place replacement of a built-in medication's default
/// formula and metadata. Takes effect only when `medication` matches a
/// built-in name.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DefaultEdit {
    pub medication: String,
    pub formula: String,
    pub frequency: String,
    pub reference: String,
    pub reference_url: Option<String>,
    pub max_dose: Option<MaxDose>,
    pub comment: Option<String>,
    pub concentration: Option<Concentration>,
    #[serde(default)]
    pub age_rules: Vec<AgeRule>,
}

// ============================================================================
// Calculation Types
// ============================================================================

/// Which resolution tier produced a calculation
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RuleSource {
    Override,
    DefaultEdit,
    Catalog,
}

/// Result of a dose calculation
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CalculationResult {
    /// Computed dose in mg as defined by the rule's formula (most built-in
    /// formulas are per day), rounded to 1 decimal place
    pub dose_mg: f64,
    /// Volume per administration in mL, rounded to 2 decimal places
    /// (0 when no concentration or mL formula was available)
    pub dose_ml: f64,
    pub frequency: String,
    pub reference: String,
    pub reference_url: String,
    /// Human label for the reference link (e.g. "DailyMed - Zinnat 125")
    pub reference_label: String,
    pub comment: Option<String>,
    /// Explanation when a weight cap, max dose, or secondary-component
    /// ceiling limited the dose
    pub max_dose_message: Option<String>,
    pub source: RuleSource,
}

/// A journaled calculation (append-only audit record)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CalculationRecord {
    pub id: Uuid,
    pub calculated_at: DateTime<Utc>,
    pub medication: String,
    pub weight_kg: f64,
    pub age_in_months: f64,
    pub dose_mg: f64,
    pub dose_ml: f64,
    pub frequency: String,
    pub source: RuleSource,
    pub capped: bool,
}

impl CalculationRecord {
    /// Build a journal record from a calculation and its inputs
    pub fn from_result(
        medication: &str,
        weight_kg: f64,
        age_in_months: f64,
        result: &CalculationResult,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            calculated_at: Utc::now(),
            medication: medication.to_string(),
            weight_kg,
            age_in_months,
            dose_mg: result.dose_mg,
            dose_ml: result.dose_ml,
            frequency: result.frequency.clone(),
            source: result.source,
            capped: result.max_dose_message.is_some(),
        }
    }
}

// ============================================================================
// Catalog Type
// ============================================================================

/// The complete table of built-in medications, keyed by name
#[derive(Clone, Debug)]
pub struct Catalog {
    pub medications: HashMap<String, Medication>,
}

impl Catalog {
    pub fn get(&self, name: &str) -> Option<&Medication> {
        self.medications.get(name)
    }

    /// Medications in a category, sorted by name for stable listing
    pub fn by_category(&self, category: Category) -> Vec<&Medication> {
        let mut meds: Vec<_> = self
            .medications
            .values()
            .filter(|m| m.category == category)
            .collect();
        meds.sort_by(|a, b| a.name.cmp(&b.name));
        meds
    }
}
