// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{anyhow, bail, Context, Result};
use std::env;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use tracing::info;

use cfem_choropleth::{
    aggregate, build_dashboard, default_selection, filter, resolve_selection, state_totals,
    DashboardConfig, DatasetCache, FilterSelection, RemoteSource, RenderSettings,
};

const USAGE: &str = "Usage: cfem-choropleth [summary | export | tui] [--config <path>] \
[--year <year>] [--substance <name>] [--municipality <name>] [--out <path>]";

/// Flags shared by every command
#[derive(Debug, Default, PartialEq)]
struct CliOptions {
    config: Option<PathBuf>,
    year: Option<String>,
    substance: Option<String>,
    municipality: Option<String>,
    out: Option<PathBuf>,
}

impl CliOptions {
    fn from_args(args: &[String]) -> Result<Self> {
        let mut options = CliOptions::default();

        let mut idx = 0;
        while idx < args.len() {
            let flag = args[idx].as_str();
            let value = || {
                args.get(idx + 1)
                    .cloned()
                    .ok_or_else(|| anyhow!("{} requires a value\n{}", flag, USAGE))
            };

            match flag {
                "--config" => options.config = Some(PathBuf::from(value()?)),
                "--year" => options.year = Some(value()?),
                "--substance" => options.substance = Some(value()?),
                "--municipality" => options.municipality = Some(value()?),
                "--out" => options.out = Some(PathBuf::from(value()?)),
                other => bail!("unknown argument {:?}\n{}", other, USAGE),
            }
            idx += 2;
        }

        Ok(options)
    }

    /// Start from the configured defaults; explicit flags win
    fn selection(&self, default: FilterSelection) -> FilterSelection {
        resolve_selection(
            default,
            self.year.as_deref(),
            self.substance.as_deref(),
            self.municipality.as_deref(),
        )
    }
}

fn main() -> Result<()> {
    cfem_choropleth::init_tracing();

    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("summary") => run_summary(&CliOptions::from_args(&args[2..])?),
        Some("export") => run_export(&CliOptions::from_args(&args[2..])?),
        Some("tui") => run_ui_mode(&CliOptions::from_args(&args[2..])?),
        Some("help") | Some("--help") | Some("-h") => {
            println!("{}", USAGE);
            Ok(())
        }
        // UI mode (default)
        _ => run_ui_mode(&CliOptions::from_args(args.get(1..).unwrap_or(&[]))?),
    }
}

fn open_cache(options: &CliOptions) -> Result<(DashboardConfig, DatasetCache<RemoteSource>)> {
    let config = DashboardConfig::load(options.config.as_deref()).context("Failed to load configuration")?;
    let source = RemoteSource::from_config(&config)?;
    Ok((config, DatasetCache::new(source)))
}

fn run_summary(options: &CliOptions) -> Result<()> {
    let (config, cache) = open_cache(options)?;
    let dataset = cache.distributions().context("Failed to load CFEM distributions")?;
    let currency = config.currency_format().unwrap_or_default();

    let selection = options.selection(default_selection(&dataset.records, &config));
    let aggregated = aggregate(&dataset.records);
    let filtered = filter(&aggregated, selection.year, selection.substance());

    let stdout = io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "Source:      {}", dataset.source)?;
    writeln!(out, "Loaded at:   {}", dataset.loaded_at.to_rfc3339())?;
    writeln!(out, "Records:     {}", dataset.records.len())?;
    writeln!(out, "Aggregated:  {}", aggregated.len())?;
    writeln!(
        out,
        "Selection:   year={:?} substance={:?} -> {} rows",
        selection.year,
        selection.substance(),
        filtered.len()
    )?;

    for total in state_totals(&filtered).iter().take(10) {
        writeln!(out, "  {:<4} {}", total.state_code, currency.format(total.total))?;
    }

    Ok(())
}

fn run_export(options: &CliOptions) -> Result<()> {
    let (config, cache) = open_cache(options)?;
    let dataset = cache.distributions().context("Failed to load CFEM distributions")?;
    let boundaries = cache.boundaries().context("Failed to load municipal boundaries")?;

    let selection = options.selection(default_selection(&dataset.records, &config));
    let view = build_dashboard(
        &dataset.records,
        &boundaries,
        &selection,
        &RenderSettings::from_config(&config),
    );

    match &options.out {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            serde_json::to_writer_pretty(BufWriter::new(file), &view)?;
            info!(path = %path.display(), rows = view.filtered_rows, "dashboard exported");
        }
        None => {
            let stdout = io::stdout();
            serde_json::to_writer_pretty(stdout.lock(), &view)?;
            println!();
        }
    }

    Ok(())
}

#[cfg(feature = "tui")]
fn run_ui_mode(options: &CliOptions) -> Result<()> {
    let (config, cache) = open_cache(options)?;

    println!("📊 Loading CFEM distributions...");
    let dataset = cache.distributions().context("Failed to load CFEM distributions")?;
    println!("✓ Loaded {} records\n", dataset.records.len());

    let mut app = ui::App::new(dataset.records.clone(), &config);
    ui::run_ui(&mut app)?;

    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_options: &CliOptions) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use web UI: cargo run --bin cfem-server --features server");
    std::process::exit(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_flags() {
        let options = CliOptions::from_args(&args(&[
            "--year", "2020", "--substance", "OURO", "--out", "view.json",
        ]))
        .unwrap();

        assert_eq!(options.year.as_deref(), Some("2020"));
        assert_eq!(options.substance.as_deref(), Some("OURO"));
        assert_eq!(options.out, Some(PathBuf::from("view.json")));
    }

    #[test]
    fn test_missing_value_and_unknown_flag() {
        assert!(CliOptions::from_args(&args(&["--year"])).is_err());
        assert!(CliOptions::from_args(&args(&["--bogus", "1"])).is_err());
        assert_eq!(CliOptions::from_args(&[]).unwrap(), CliOptions::default());
    }

    #[test]
    fn test_flags_override_defaults() {
        let default = FilterSelection::new(Some(2024), Some("FERRO"), None);

        let options = CliOptions::from_args(&args(&["--substance", "OURO"])).unwrap();
        assert_eq!(
            options.selection(default.clone()),
            FilterSelection::new(Some(2024), Some("OURO"), None)
        );

        let options = CliOptions::from_args(&args(&["--year", "Selecione o ano de consulta"])).unwrap();
        assert_eq!(options.selection(default).year, None);
    }
}
