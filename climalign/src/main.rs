//! Climalign CLI - reconcile temperature and emissions tables
//!
//! # Main Commands
//!
//! ```bash
//! climalign analyze --temperature t.csv --emissions e.csv   # Full pipeline, JSON report
//! climalign regions                                         # Built-in region presets
//! ```
//!
//! # Stage Commands
//!
//! ```bash
//! climalign parse input.csv               # Parse CSV to JSON records
//! climalign normalize temperature.csv     # Clean + reshape wide temperature table
//! climalign regress summary.csv           # Per-region linear statistics
//! climalign trend summary.csv --x Year --y Temperature
//! ```
//!
//! Logging goes to stderr; `RUST_LOG` overrides the `-v` level.

use clap::{ArgAction, Parser, Subcommand};
use climalign::config::{preset, presets, PipelineConfig, RegionSpec};
use climalign::{
    decode_content, detect_encoding, fit_trend, fit_trends_by_group, parse_csv_file_auto, parse_table,
    prepare_temperature, regress_by_group, run, write_table, RegressionReport, Table,
};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "climalign")]
#[command(about = "Align temperature and emissions tables and compute per-region trends", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a CSV file and output JSON records
    Parse {
        /// Input CSV file
        input: PathBuf,

        /// CSV delimiter (auto-detect if not specified)
        #[arg(short, long)]
        delimiter: Option<char>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Clean a wide temperature table and reshape it to long format
    Normalize {
        /// Wide temperature CSV
        input: PathBuf,

        /// Output CSV file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Full pipeline: normalize, align, join, aggregate, regress
    Analyze {
        /// Wide temperature CSV
        #[arg(long)]
        temperature: PathBuf,

        /// Long emissions CSV
        #[arg(long)]
        emissions: PathBuf,

        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Region as LABEL=MEMBER,MEMBER,... (repeatable, replaces configured regions)
        #[arg(long = "region")]
        regions: Vec<String>,

        /// Built-in region preset by label (repeatable)
        #[arg(long = "preset")]
        presets: Vec<String>,

        /// Period column to group by
        #[arg(long)]
        group_key: Option<String>,

        /// Trendline polynomial degree
        #[arg(long)]
        trend_degree: Option<usize>,

        /// Also clean the emissions table
        #[arg(long)]
        clean_emissions: bool,

        /// JSON report file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write the combined summary table as CSV
        #[arg(long)]
        summary_csv: Option<PathBuf>,

        /// Write the regression table as CSV
        #[arg(long)]
        regression_csv: Option<PathBuf>,
    },

    /// Per-group linear regression on a summary CSV
    Regress {
        /// Summary CSV (e.g. written by `analyze --summary-csv`)
        input: PathBuf,

        /// Group column
        #[arg(long, default_value = "Region")]
        group: String,

        /// Predictor column
        #[arg(long, default_value = "Year")]
        x: String,

        /// Response column
        #[arg(long, default_value = "emissions_total")]
        y: String,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Polynomial trendline coefficients (highest power first)
    Trend {
        /// Input CSV
        input: PathBuf,

        /// Predictor column
        #[arg(long)]
        x: String,

        /// Response column
        #[arg(long)]
        y: String,

        /// Polynomial degree
        #[arg(long, default_value = "4")]
        degree: usize,

        /// Fit once per value of this column
        #[arg(long)]
        group: Option<String>,
    },

    /// List built-in region presets
    Regions,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Parse {
            input,
            delimiter,
            output,
        } => cmd_parse(&input, delimiter, output.as_deref()),

        Commands::Normalize { input, output } => cmd_normalize(&input, output.as_deref()),

        Commands::Analyze {
            temperature,
            emissions,
            config,
            regions,
            presets,
            group_key,
            trend_degree,
            clean_emissions,
            output,
            summary_csv,
            regression_csv,
        } => cmd_analyze(AnalyzeArgs {
            temperature,
            emissions,
            config,
            regions,
            presets,
            group_key,
            trend_degree,
            clean_emissions,
            output,
            summary_csv,
            regression_csv,
        }),

        Commands::Regress {
            input,
            group,
            x,
            y,
            output,
        } => cmd_regress(&input, &group, &x, &y, output.as_deref()),

        Commands::Trend {
            input,
            x,
            y,
            degree,
            group,
        } => cmd_trend(&input, &x, &y, degree, group.as_deref()),

        Commands::Regions => cmd_regions(),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "climalign=info",
        1 => "climalign=debug",
        _ => "climalign=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose >= 2)
        .init();

    debug!("climalign started with verbosity level: {}", verbose);
}

fn load_table(input: &Path) -> Result<Table, Box<dyn std::error::Error>> {
    let result = parse_csv_file_auto(input)?;
    debug!(
        path = %input.display(),
        encoding = %result.encoding,
        delimiter = %format_delimiter(result.delimiter),
        rows = result.table.len(),
        "parsed CSV"
    );
    Ok(result.table)
}

fn cmd_parse(
    input: &Path,
    delimiter: Option<char>,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Parsing CSV: {}", input.display());

    let result = parse_csv_file_auto(input)?;
    let table = match delimiter {
        Some(d) if d != result.delimiter => {
            let bytes = fs::read(input)?;
            let content = decode_content(&bytes, &detect_encoding(&bytes));
            parse_table(&content, d, result.table.name())?
        }
        _ => result.table,
    };

    let used_delimiter = delimiter.unwrap_or(result.delimiter);
    eprintln!("   Encoding: {}", result.encoding);
    eprintln!(
        "   Delimiter: '{}'{}",
        format_delimiter(used_delimiter),
        if delimiter.is_none() { " (auto-detected)" } else { "" }
    );
    eprintln!("   Columns: {}", table.columns().join(", "));
    eprintln!("✅ Parsed {} records", table.len());

    let json = serde_json::to_string_pretty(&table)?;
    write_output(&json, output)?;

    Ok(())
}

fn cmd_normalize(input: &Path, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Normalizing: {}", input.display());

    let raw = load_table(input)?;
    let long = prepare_temperature(&raw)?;
    eprintln!("   {} wide rows → {} long rows", raw.len(), long.len());

    let csv = write_table(&long, ',')?;
    write_output(csv.trim_end(), output)?;
    Ok(())
}

struct AnalyzeArgs {
    temperature: PathBuf,
    emissions: PathBuf,
    config: Option<PathBuf>,
    regions: Vec<String>,
    presets: Vec<String>,
    group_key: Option<String>,
    trend_degree: Option<usize>,
    clean_emissions: bool,
    output: Option<PathBuf>,
    summary_csv: Option<PathBuf>,
    regression_csv: Option<PathBuf>,
}

fn resolve_config(args: &AnalyzeArgs) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => {
            eprintln!("⚙️  Config: {}", path.display());
            PipelineConfig::from_file(path)?
        }
        None => PipelineConfig::default(),
    };

    config.options = config.options.with_env_overrides()?;

    if !args.regions.is_empty() || !args.presets.is_empty() {
        let mut regions = args
            .regions
            .iter()
            .map(|raw| RegionSpec::parse(raw))
            .collect::<Result<Vec<_>, _>>()?;
        for label in &args.presets {
            regions.push(preset(label)?);
        }
        config.regions = regions;
    }

    if let Some(key) = &args.group_key {
        config.options.group_key = key.clone();
    }
    if let Some(degree) = args.trend_degree {
        config.options.trend_degree = degree;
    }
    if args.clean_emissions {
        config.options.clean_emissions = true;
    }

    config.validate()?;
    Ok(config)
}

fn cmd_analyze(args: AnalyzeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = resolve_config(&args)?;

    eprintln!("📄 Temperature: {}", args.temperature.display());
    let temperature = load_table(&args.temperature)?;
    eprintln!("📄 Emissions: {}", args.emissions.display());
    let emissions = load_table(&args.emissions)?;

    let labels: Vec<&str> = config.regions.iter().map(|r| r.label.as_str()).collect();
    eprintln!("🌎 Regions: {}", labels.join(", "));

    let report = run(&temperature, &emissions, &config)?;

    eprintln!("\n📊 Regression ({} on {}):", config.options.regression_y, config.options.predictor());
    for r in &report.regressions {
        eprintln!(
            "   {:<20} slope {:>12.4}  R² {:>6.3}  p {:>8.4}  n {}",
            r.region, r.slope, r.r_squared, r.p_value, r.n
        );
    }
    for f in &report.failures {
        eprintln!("   ⚠️  {}: {}", f.region, f.error);
    }

    if report.log.has_warnings() {
        eprintln!("\n📋 Run log:");
        for entry in report.log.entries() {
            eprintln!("{}", entry.render());
        }
    }

    if let Some(path) = &args.summary_csv {
        fs::write(path, write_table(&report.combined, ',')?)?;
        eprintln!("💾 Summary written to: {}", path.display());
    }
    if let Some(path) = &args.regression_csv {
        let table = RegressionReport {
            results: report.regressions.clone(),
            failures: Vec::new(),
        }
        .to_table();
        fs::write(path, write_table(&table, ',')?)?;
        eprintln!("💾 Regression written to: {}", path.display());
    }

    let json = serde_json::to_string_pretty(&report)?;
    write_output(&json, args.output.as_deref())?;

    eprintln!("\n✨ Done! (run {})", report.meta.run_id);
    Ok(())
}

fn cmd_regress(
    input: &Path,
    group: &str,
    x: &str,
    y: &str,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📈 Regressing {} on {} per {}: {}", y, x, group, input.display());

    let table = load_table(input)?;
    let report = regress_by_group(&table, group, x, y)?;
    eprintln!("   {} fitted, {} failed", report.results.len(), report.failures.len());
    for failure in &report.failures {
        eprintln!("   ⚠️  {}", failure);
    }

    let json = serde_json::to_string_pretty(&report.results)?;
    write_output(&json, output)?;
    Ok(())
}

fn cmd_trend(
    input: &Path,
    x: &str,
    y: &str,
    degree: usize,
    group: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let table = load_table(input)?;

    let json = match group {
        Some(group) => {
            let report = fit_trends_by_group(&table, group, x, y, degree)?;
            for failure in &report.failures {
                eprintln!("   ⚠️  {}", failure);
            }
            serde_json::to_string_pretty(&report.trendlines)?
        }
        None => {
            let x_idx = table.require(x)?;
            let y_idx = table.require(y)?;
            let (xs, ys): (Vec<f64>, Vec<f64>) = table
                .rows()
                .iter()
                .filter_map(|row| Some((row[x_idx].as_f64()?, row[y_idx].as_f64()?)))
                .unzip();
            let polynomial = fit_trend(&xs, &ys, degree)?;
            serde_json::to_string_pretty(&polynomial)?
        }
    };

    println!("{}", json);
    Ok(())
}

fn cmd_regions() -> Result<(), Box<dyn std::error::Error>> {
    let all = presets();
    eprintln!("🌎 Built-in region presets ({}):\n", all.len());
    for region in all {
        println!("  {} ({} members)", region.label, region.members.len());
        println!("     {}", region.members.join(", "));
        println!();
    }
    Ok(())
}

fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "\\t".to_string(),
        c => c.to_string(),
    }
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
