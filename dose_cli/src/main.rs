use clap::{Parser, Subcommand};
use dose_core::*;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pedidose")]
#[command(about = "Pediatric medication dose calculator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Calculate a dose for a patient
    Calc {
        /// Medication name (e.g. "Zinnat 125")
        medication: String,

        /// Patient weight in kilograms
        #[arg(long)]
        weight_kg: f64,

        /// Patient age in months
        #[arg(long)]
        age_months: f64,

        /// Print the result as JSON instead of the card
        #[arg(long)]
        json: bool,

        /// Skip the calculation journal for this run
        #[arg(long)]
        no_journal: bool,
    },

    /// List built-in medications
    List {
        /// Restrict to one category (antibiotic, other)
        #[arg(long)]
        category: Option<String>,
    },

    /// Manage admin overrides
    Override {
        #[command(subcommand)]
        command: RuleCommands,
    },

    /// Manage default edits of built-in medications
    DefaultEdit {
        #[command(subcommand)]
        command: RuleCommands,
    },

    /// Validate a dose formula without storing anything
    ValidateFormula {
        /// Formula expression (e.g. "45*weightKg")
        formula: String,

        /// Validate as an mL formula, with `dose` bound
        #[arg(long)]
        ml: bool,
    },

    /// Export the calculation journal to CSV
    Export {
        /// Clean up processed journal files after export
        #[arg(long)]
        cleanup: bool,
    },
}

#[derive(Subcommand)]
enum RuleCommands {
    /// List stored entries
    List,
    /// Import entries from a JSON array file
    Import { file: PathBuf },
    /// Remove all entries for a medication name
    Remove { medication: String },
    /// Remove all entries
    Clear,
}

fn main() -> Result<()> {
    dose_core::logging::init();

    let cli = Cli::parse();

    let config = Config::load()?;
    let data_dir = cli.data_dir.unwrap_or_else(|| config.data.data_dir.clone());

    match cli.command {
        Commands::Calc {
            medication,
            weight_kg,
            age_months,
            json,
            no_journal,
        } => cmd_calc(
            data_dir,
            &config,
            &medication,
            weight_kg,
            age_months,
            json,
            no_journal,
        ),
        Commands::List { category } => cmd_list(category),
        Commands::Override { command } => cmd_overrides(data_dir, command),
        Commands::DefaultEdit { command } => cmd_default_edits(data_dir, command),
        Commands::ValidateFormula { formula, ml } => cmd_validate_formula(&formula, ml),
        Commands::Export { cleanup } => cmd_export(data_dir, cleanup),
    }
}

fn journal_path(data_dir: &std::path::Path) -> PathBuf {
    data_dir.join("journal").join("calculations.jsonl")
}

fn cmd_calc(
    data_dir: PathBuf,
    config: &Config,
    medication: &str,
    weight_kg: f64,
    age_months: f64,
    json: bool,
    no_journal: bool,
) -> Result<()> {
    if weight_kg <= 0.0 {
        return Err(Error::Other("weight must be positive".into()));
    }
    if age_months < 0.0 {
        return Err(Error::Other("age must be non-negative".into()));
    }

    std::fs::create_dir_all(&data_dir)?;

    let engine = DoseEngine::with_default_catalog(FileStore::new(&data_dir));

    let errors = engine.catalog().validate();
    if !errors.is_empty() {
        eprintln!("Catalog validation errors:");
        for error in errors {
            eprintln!("  - {}", error);
        }
        return Err(Error::CatalogValidation("Invalid catalog".into()));
    }

    let result = match engine.calculate(medication, weight_kg, age_months) {
        Ok(result) => result,
        Err(Error::MedicationNotFound { name }) => {
            eprintln!("Medication not found: {}", name);
            return Err(Error::MedicationNotFound { name });
        }
        Err(e) => return Err(e),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        display_result(medication, weight_kg, age_months, &result);
    }

    if config.journal.enabled && !no_journal {
        let record = CalculationRecord::from_result(medication, weight_kg, age_months, &result);
        let mut sink = JsonlSink::new(journal_path(&data_dir));
        sink.append(&record)?;
    }

    Ok(())
}

fn cmd_list(category: Option<String>) -> Result<()> {
    let catalog = get_default_catalog();

    let categories: Vec<Category> = match category.as_deref().map(str::to_lowercase).as_deref() {
        Some("antibiotic") => vec![Category::Antibiotic],
        Some("other") => vec![Category::Other],
        Some(unknown) => {
            eprintln!("Unknown category: {}. Showing everything.", unknown);
            vec![Category::Antibiotic, Category::Other]
        }
        None => vec![Category::Antibiotic, Category::Other],
    };

    for cat in categories {
        match cat {
            Category::Antibiotic => println!("Antibiotics:"),
            Category::Other => println!("Other medications:"),
        }
        for med in catalog.by_category(cat) {
            let conc = med
                .concentration
                .map(|c| format!("{}mg/{}mL", c.mg, c.ml))
                .unwrap_or_else(|| "-".into());
            println!(
                "  {:<32} {:<20} {:<14} {}",
                med.name, med.frequency, conc, med.formula
            );
        }
        println!();
    }

    Ok(())
}

fn cmd_overrides(data_dir: PathBuf, command: RuleCommands) -> Result<()> {
    let store = FileStore::new(&data_dir);

    match command {
        RuleCommands::List => {
            let overrides = store.load_overrides()?;
            if overrides.is_empty() {
                println!("No overrides stored.");
                return Ok(());
            }
            for o in &overrides {
                let scope = describe_scope(o);
                println!("  {:<32} {:<24} {}", o.medication, o.formula, scope);
            }
            Ok(())
        }
        RuleCommands::Import { file } => {
            let contents = std::fs::read_to_string(&file)?;
            let imported: Vec<Override> = serde_json::from_str(&contents)?;
            let count = imported.len();
            for o in &imported {
                dose_core::store::validate_override(o)?;
            }
            let mut overrides = store.load_overrides()?;
            overrides.extend(imported);
            store.save_overrides(&overrides)?;
            println!("Imported {} overrides", count);
            Ok(())
        }
        RuleCommands::Remove { medication } => {
            let removed = dose_core::store::remove_overrides(&store, &medication)?;
            println!("Removed {} overrides for {}", removed, medication);
            Ok(())
        }
        RuleCommands::Clear => {
            store.save_overrides(&[])?;
            println!("Cleared all overrides");
            Ok(())
        }
    }
}

fn cmd_default_edits(data_dir: PathBuf, command: RuleCommands) -> Result<()> {
    let store = FileStore::new(&data_dir);

    match command {
        RuleCommands::List => {
            let edits = store.load_default_edits()?;
            if edits.is_empty() {
                println!("No default edits stored.");
                return Ok(());
            }
            for edit in &edits {
                println!("  {:<32} {:<24} {}", edit.medication, edit.formula, edit.frequency);
            }
            Ok(())
        }
        RuleCommands::Import { file } => {
            let contents = std::fs::read_to_string(&file)?;
            let imported: Vec<DefaultEdit> = serde_json::from_str(&contents)?;
            let count = imported.len();
            for edit in &imported {
                dose_core::store::validate_default_edit(edit)?;
            }
            let mut edits = store.load_default_edits()?;
            for new in imported {
                edits.retain(|e| e.medication != new.medication);
                edits.push(new);
            }
            store.save_default_edits(&edits)?;
            println!("Imported {} default edits", count);
            Ok(())
        }
        RuleCommands::Remove { medication } => {
            let removed = dose_core::store::remove_default_edits(&store, &medication)?;
            println!("Removed {} default edits for {}", removed, medication);
            Ok(())
        }
        RuleCommands::Clear => {
            store.save_default_edits(&[])?;
            println!("Cleared all default edits");
            Ok(())
        }
    }
}

fn cmd_validate_formula(formula: &str, ml: bool) -> Result<()> {
    match dose_core::formula::validate(formula, ml) {
        Ok(()) => {
            println!("Formula is valid");
            Ok(())
        }
        Err(e) => {
            eprintln!("Invalid formula: {}", e);
            Err(Error::Formula(e))
        }
    }
}

fn cmd_export(data_dir: PathBuf, cleanup: bool) -> Result<()> {
    let journal_dir = data_dir.join("journal");
    let journal = journal_path(&data_dir);
    let csv_path = data_dir.join("calculations.csv");

    if !journal.exists() {
        println!("No journal file found - nothing to export.");
        return Ok(());
    }

    let count = dose_core::export::journal_to_csv_and_archive(&journal, &csv_path)?;

    println!("Exported {} calculations to CSV", count);
    println!("  CSV: {}", csv_path.display());

    if cleanup {
        let cleaned = dose_core::export::cleanup_processed_journals(&journal_dir)?;
        if cleaned > 0 {
            println!("Cleaned up {} processed journal files", cleaned);
        }
    }

    Ok(())
}

fn fmt_bound(bound: Option<f64>) -> String {
    bound.map(|v| v.to_string()).unwrap_or_else(|| "*".into())
}

fn describe_scope(o: &Override) -> String {
    match (o.has_age_bounds(), o.has_weight_bounds()) {
        (true, true) => format!(
            "ages {}-{} months, weight {}-{} kg",
            fmt_bound(o.min_age_months),
            fmt_bound(o.max_age_months),
            fmt_bound(o.min_weight_kg),
            fmt_bound(o.max_weight_kg),
        ),
        (true, false) => format!(
            "ages {}-{} months",
            fmt_bound(o.min_age_months),
            fmt_bound(o.max_age_months),
        ),
        (false, true) => format!(
            "weight {}-{} kg",
            fmt_bound(o.min_weight_kg),
            fmt_bound(o.max_weight_kg),
        ),
        (false, false) => "general".into(),
    }
}

fn display_result(medication: &str, weight_kg: f64, age_months: f64, result: &CalculationResult) {
    println!("\n╭─────────────────────────────────────────╮");
    println!("│  DOSE CALCULATION");
    println!("╰─────────────────────────────────────────╯");
    println!();
    println!("  {}  ({} kg, {} months)", medication, weight_kg, age_months);
    println!();
    println!("  Dose:      {:.1} mg", result.dose_mg);
    if result.dose_ml > 0.0 {
        println!("  Volume:    {:.2} mL per dose", result.dose_ml);
    }
    println!("  Frequency: {}", result.frequency);

    if let Some(ref comment) = result.comment {
        println!();
        println!("  Note: {}", comment);
    }

    if let Some(ref message) = result.max_dose_message {
        println!();
        println!("  ⚠ {}", message);
    }

    println!();
    if result.reference_url.is_empty() {
        println!("  ℹ {}: {}", result.reference_label, result.reference);
    } else {
        println!("  ℹ {}: {}", result.reference_label, result.reference_url);
    }
    println!();
}
