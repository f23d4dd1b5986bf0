use aadhaar_insights::{
    load_datasets, write_report, AliasTable, Pipeline, PipelineConfig, Report, VERSION,
};
use anyhow::{bail, Context, Result};
use std::env;
use std::path::PathBuf;

const USAGE: &str = "\
Usage:
  aadhaar-insights run <data_dir> <output_dir> [--config <file>] [--trend-only-fallback]
  aadhaar-insights check-aliases [<alias_table.json>]";

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().skip(1).collect();

    match args.first().map(String::as_str) {
        Some("run") => run(&args[1..]),
        Some("check-aliases") => check_aliases(&args[1..]),
        Some("--version") => {
            println!("aadhaar-insights {}", VERSION);
            Ok(())
        }
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    }
}

fn run(args: &[String]) -> Result<()> {
    let mut positional: Vec<PathBuf> = Vec::new();
    let mut config_path: Option<PathBuf> = None;
    let mut trend_only = false;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let path = iter.next().context("--config needs a file path")?;
                config_path = Some(PathBuf::from(path));
            }
            "--trend-only-fallback" => trend_only = true,
            flag if flag.starts_with("--") => bail!("Unknown option: {}\n{}", flag, USAGE),
            other => positional.push(PathBuf::from(other)),
        }
    }

    let [data_dir, output_dir] = positional.as_slice() else {
        bail!("run needs <data_dir> and <output_dir>\n{}", USAGE);
    };

    let mut config = match &config_path {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };
    if trend_only {
        config.allow_trend_only = true;
    }
    let top_n = config.top_n;

    println!("🪪 Aadhaar Insights {} - Enrolment & Update Analytics", VERSION);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // 1. Load CSV extracts
    println!("\n📂 Loading datasets from {:?}...", data_dir);
    let datasets = load_datasets(data_dir)?;
    println!(
        "✓ {} enrolment, {} demographic, {} biometric rows",
        datasets.enrolment.len(),
        datasets.demographic.len(),
        datasets.biometric.len()
    );

    // 2. Run pipeline
    println!("\n🔧 Running pipeline...");
    let pipeline = Pipeline::from_config(config)?;
    let report = pipeline.run(&datasets)?;

    // 3. Write tables
    println!("\n💾 Writing tables to {:?}...", output_dir);
    let written = write_report(&report, output_dir)?;
    println!("✓ {} files written", written.len());

    print_summary(&report, top_n);

    // 4. A failed forecast fails the run, after everything else is on disk
    if let Err(e) = &report.forecast {
        return Err(anyhow::Error::new(e.clone()))
            .context("Forecast stage failed; the other tables were written");
    }

    Ok(())
}

fn print_summary(report: &Report, top_n: usize) {
    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    println!("\n👶 Lifecycle enrolment:");
    for row in &report.lifecycle {
        println!("   {:<22} {:>14.0}", row.stage, row.total);
    }

    println!("\n🏆 Top {} regions by enrolment:", top_n);
    for row in report.state_ranking.iter().take(top_n) {
        println!("   {:>2}. {:<32} {:>12.0}", row.rank, row.region, row.total_enrolment);
    }

    println!("\n⚖️  Top {} regions by Update Burden Index:", top_n);
    for row in report.update_burden.iter().take(top_n) {
        match row.update_burden_index {
            Some(index) => println!("   {:>2}. {:<32} {:>10.3}", row.rank, row.region, index),
            None => println!("   {:>2}. {:<32} {:>10}", row.rank, row.region, "n/a"),
        }
    }

    println!("\n🚚 Top {} regions by Mobility Index:", top_n);
    for row in report.mobility.iter().take(top_n) {
        match row.mobility_index {
            Some(index) => println!("   {:>2}. {:<32} {:>10.3}", row.rank, row.region, index),
            None => println!("   {:>2}. {:<32} {:>10}", row.rank, row.region, "n/a"),
        }
    }

    match &report.forecast {
        Ok(forecast) => {
            println!(
                "\n📈 Forecast ({:?}, {:.0}% band) after {}:",
                forecast.model,
                forecast.confidence_level * 100.0,
                forecast.history_end
            );
            for point in &forecast.points {
                println!(
                    "   {}  {:>12.0}  [{:.0} .. {:.0}]",
                    point.period, point.predicted, point.lower_bound, point.upper_bound
                );
            }
        }
        Err(e) => println!("\n❌ Forecast not produced: {}", e),
    }

    let quality = &report.quality;
    println!("\n🔍 Quality: {}", quality.summary());
    for issue in &quality.issues {
        println!(
            "   {:?} [{}] {} → {}",
            issue.severity, issue.dataset, issue.issue, issue.recommendation
        );
    }

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    if quality.has_critical_issues() {
        println!("⚠️  Completed with critical quality issues");
    } else {
        println!("✅ Analysis complete");
    }
}

fn check_aliases(args: &[String]) -> Result<()> {
    let table = match args.first() {
        Some(path) => AliasTable::from_file(path)?,
        None => AliasTable::bundled()?,
    };

    println!("✅ Alias table v{} is valid", table.version());
    println!(
        "   {} regions with aliases, {} aliases",
        table.regions().len(),
        table.alias_count()
    );
    for region in table.regions() {
        let aliases: Vec<&str> = region.aliases.iter().map(String::as_str).collect();
        println!("   {:<32} ← {}", region.id, aliases.join(", "));
    }

    Ok(())
}
