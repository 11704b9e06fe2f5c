use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, ValueEnum};
use tracing::{error, info};

use catalog_skimmer::{
    init_logging, CatalogExporter, CatalogPipeline, CsvExporter, ExportMode, HttpTransport,
    OutputLayout, SiteTemplate, SkimmerConfig, SqlExporter,
};

#[derive(Debug, Parser)]
#[command(
    name = "catalog-skimmer",
    version,
    about = "Walk a storefront catalog and write a marked-up price list"
)]
struct Cli {
    /// JSON config file; flags given on the command line win over it
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[arg(long, value_name = "URL")]
    site_root: Option<String>,

    #[arg(long, value_enum)]
    template: Option<TemplateArg>,

    /// Stop after this many source products (0 = no cap)
    #[arg(long, value_name = "N")]
    max_products: Option<usize>,

    #[arg(long, value_enum)]
    export: Option<ExportArg>,

    /// Base directory for dated output folders
    #[arg(long, value_name = "DIR")]
    output_dir: Option<String>,

    #[arg(long, value_name = "NAME")]
    sql_proc_name: Option<String>,

    #[arg(long, value_name = "SECS")]
    timeout_secs: Option<u64>,

    #[arg(long, value_name = "UA")]
    user_agent: Option<String>,

    #[arg(long, value_name = "PREFIX")]
    listing_script_prefix: Option<String>,

    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

#[derive(Debug, Copy, Clone, ValueEnum, PartialEq, Eq)]
enum TemplateArg {
    MenuAjax,
    PagedListing,
}

impl From<TemplateArg> for SiteTemplate {
    fn from(arg: TemplateArg) -> Self {
        match arg {
            TemplateArg::MenuAjax => SiteTemplate::MenuAjax,
            TemplateArg::PagedListing => SiteTemplate::PagedListing,
        }
    }
}

#[derive(Debug, Copy, Clone, ValueEnum, PartialEq, Eq)]
enum ExportArg {
    DryRun,
    Csv,
    Sql,
    Both,
}

impl From<ExportArg> for ExportMode {
    fn from(arg: ExportArg) -> Self {
        match arg {
            ExportArg::DryRun => ExportMode::DryRun,
            ExportArg::Csv => ExportMode::Csv,
            ExportArg::Sql => ExportMode::Sql,
            ExportArg::Both => ExportMode::Both,
        }
    }
}

impl Cli {
    fn into_config(self) -> Result<SkimmerConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let raw = fs::read_to_string(path)
                    .with_context(|| format!("failed to read config file {}", path.display()))?;
                serde_json::from_str(&raw)
                    .with_context(|| format!("invalid config file {}", path.display()))?
            }
            None => SkimmerConfig::default(),
        };

        if let Some(site_root) = self.site_root {
            config.site_root = site_root;
        }
        if let Some(template) = self.template {
            config.template = template.into();
        }
        if let Some(max_products) = self.max_products {
            config.max_products = max_products;
        }
        if let Some(export) = self.export {
            config.export = export.into();
        }
        if let Some(output_dir) = self.output_dir {
            config.output_dir = output_dir;
        }
        if let Some(name) = self.sql_proc_name {
            config.sql_proc_name = name;
        }
        if let Some(secs) = self.timeout_secs {
            config.request_timeout_secs = Some(secs);
        }
        if let Some(user_agent) = self.user_agent {
            config.user_agent = user_agent;
        }
        if let Some(prefix) = self.listing_script_prefix {
            config.listing_script_prefix = prefix;
        }

        Ok(config)
    }
}

fn exporters(config: &SkimmerConfig, layout: &OutputLayout) -> Vec<Box<dyn CatalogExporter>> {
    let mut exporters: Vec<Box<dyn CatalogExporter>> = Vec::new();

    if config.export.writes_csv() {
        match CsvExporter::create(layout.csv_path()) {
            Ok(csv) => exporters.push(Box::new(csv)),
            Err(e) => error!(
                path = %layout.csv_path().display(),
                error = %e,
                "cannot create price list"
            ),
        }
    }

    if config.export.writes_sql() {
        let proc_name = config.sql_proc_name.as_str();
        match SqlExporter::create(layout.sql_path(), proc_name, layout.started_at()) {
            Ok(sql) => exporters.push(Box::new(sql)),
            Err(e) => error!(
                path = %layout.sql_path().display(),
                error = %e,
                "cannot create SQL script"
            ),
        }
    }

    exporters
}

fn run(cli: Cli) -> Result<()> {
    let verbose = cli.verbose;
    let config = cli.into_config()?;

    let layout = OutputLayout::new(&config.output_dir, Local::now());
    let _guard = init_logging(&layout, verbose)?;

    info!(
        site = %config.site_root,
        template = ?config.template,
        max_products = config.max_products,
        export = ?config.export,
        "configuration"
    );

    let transport = HttpTransport::new(&config.user_agent, config.request_timeout())?;
    let mut exporters = exporters(&config, &layout);
    let mut pipeline = CatalogPipeline::new(config, transport);
    let summary = pipeline.run(&mut exporters);

    println!(
        "Processed {} products ({} records, {} skipped)",
        summary.processed,
        summary.products.len(),
        summary.skipped
    );
    if !exporters.is_empty() {
        println!("Output written to {}", layout.root().display());
    }
    for name in &summary.failed_exports {
        println!("Export '{name}' failed, see log for details");
    }

    Ok(())
}

fn main() {
    let cli = Cli::parse();

    // Failures are reported, never turned into a non-zero exit
    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
    }
}
