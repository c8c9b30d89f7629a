use anyhow::{bail, Context, Result};
use std::env;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use sales_journal::returns::{entries_from_table, ReturnsAggregator};
use sales_journal::treasury::{build_report, flows_from_ledger};
use sales_journal::{run_path, PipelineConfig, RawTable, Severity, VERSION};

const USAGE: &str = "\
Usage:
  sales-journal sales    <invoices.csv> [--config FILE] [--out FILE]
  sales-journal returns  <ledger.csv>   [--config FILE]
  sales-journal treasury <invoices.csv> [--config FILE] [--months N] [--growth RATE]";

struct Options {
    input: PathBuf,
    config: Option<PathBuf>,
    out: Option<PathBuf>,
    months: Option<u32>,
    growth: Option<f64>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("sales-journal {}\n\n{}", VERSION, USAGE);
        std::process::exit(1);
    }

    let options = parse_options(&args[2..])?;
    let config = match &options.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };

    match args[1].as_str() {
        "sales" => run_sales(&options, &config),
        "returns" => run_returns(&options, &config),
        "treasury" => run_treasury(&options, &config),
        other => bail!("Unknown command: {}\n\n{}", other, USAGE),
    }
}

fn parse_options(args: &[String]) -> Result<Options> {
    let mut input = None;
    let mut options = Options {
        input: PathBuf::new(),
        config: None,
        out: None,
        months: None,
        growth: None,
    };

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" | "--out" | "--months" | "--growth" => {
                let value = iter.next().with_context(|| format!("{} needs a value", arg))?;
                match arg.as_str() {
                    "--config" => options.config = Some(PathBuf::from(value)),
                    "--out" => options.out = Some(PathBuf::from(value)),
                    "--months" => {
                        options.months = Some(value.parse::<u32>().with_context(|| format!("Invalid --months: {}", value))?)
                    }
                    _ => options.growth = Some(value.parse::<f64>().with_context(|| format!("Invalid --growth: {}", value))?),
                }
            }
            flag if flag.starts_with("--") => bail!("Unknown option: {}", flag),
            path => input = Some(PathBuf::from(path)),
        }
    }

    options.input = input.context("Missing input CSV path")?;
    Ok(options)
}

fn run_sales(options: &Options, config: &PipelineConfig) -> Result<()> {
    println!("📒 Sales Journal - invoices → journal entries");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let output = run_path(&options.input, config)
        .with_context(|| format!("Failed to process {}", options.input.display()))?;

    println!("✓ Regime: {}", output.regime.name());
    println!("✓ Invoices: {} ({} posted, {} skipped)", output.invoices.len(), output.posted_count(), output.skipped.len());
    println!("✓ Ledger: {}", output.reconciliation.summary());
    println!("✓ Fingerprint: {}", output.ledger.fingerprint()?);

    if !output.diagnostics.is_empty() {
        println!("\n🔍 Diagnostics: {}", output.diagnostics.summary());
        for diag in output.diagnostics.items() {
            if diag.severity >= Severity::Warning {
                println!("   {}", diag);
            }
        }
    }

    match &options.out {
        Some(path) => {
            write_ledger(&output.ledger, path)?;
            println!("\n💾 Written {}", path.display());
        }
        None => print!("\n{}", output.ledger.to_csv_string()?),
    }

    if output.reconciliation.is_balanced() {
        println!("\n✅ Journal balanced");
    } else {
        eprintln!("\n❌ Journal does not balance");
        std::process::exit(2);
    }

    Ok(())
}

fn write_ledger(ledger: &sales_journal::Ledger, path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    ledger.write_csv(file)?;
    Ok(())
}

fn run_returns(options: &Options, config: &PipelineConfig) -> Result<()> {
    println!("📦 Returns - impact by analytic code");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let table = RawTable::from_path(&options.input)
        .with_context(|| format!("Failed to read {}", options.input.display()))?;
    let entries = entries_from_table(&table, &config.returns)?;
    let report = ReturnsAggregator::new(config.returns.clone()).aggregate(&entries);

    if report.nothing_detected() {
        println!("ℹ️  No returns or discounts detected");
        return Ok(());
    }

    println!("✓ Returns accounts:    {}", report.detected.returns.join(", "));
    println!("✓ Discount accounts:   {}", report.detected.discounts.join(", "));
    println!("✓ Provision accounts:  {}", report.detected.provisions.join(", "));
    println!();
    println!("{:<20} {:>12} {:>12} {:>12} {:>12}", "Code", "Returns", "Discounts", "Provisions", "Impact");
    for row in &report.by_code {
        println!(
            "{:<20} {:>12.2} {:>12.2} {:>12.2} {:>12.2}",
            row.analytic_code, row.returns, row.discounts, row.provisions, row.total_impact
        );
    }
    println!(
        "{:<20} {:>12.2} {:>12.2} {:>12.2} {:>12.2}",
        "TOTAL", report.total_returns, report.total_discounts, report.total_provisions, report.total_impact
    );

    Ok(())
}

fn run_treasury(options: &Options, config: &PipelineConfig) -> Result<()> {
    println!("💶 Treasury - monthly client flows");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let mut treasury = config.treasury.clone();
    if let Some(months) = options.months {
        treasury.projection_months = months;
    }
    if let Some(growth) = options.growth {
        treasury.growth_rate = growth;
    }

    let output = run_path(&options.input, config)
        .with_context(|| format!("Failed to process {}", options.input.display()))?;
    let flows = flows_from_ledger(&output.ledger, &treasury.account_prefix);
    let report = build_report(&flows, &treasury);

    for month in &report.history {
        println!("   {}  {:>12.2}", month.month, month.net);
    }
    if !report.projection.is_empty() {
        println!("\n📈 Projection ({:+.1}% / month)", treasury.growth_rate * 100.0);
        for month in &report.projection {
            println!("   {}  {:>12.2}", month.month, month.net);
        }
    }
    if report.undated > 0 {
        println!("\n⚠️  {} undated flows excluded", report.undated);
    }

    Ok(())
}
