use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};

use timesheet_import::config::{self, Config};
use timesheet_import::importer::{Importer, Renderer};
use timesheet_import::model::Batch;
use timesheet_import::page::{HtmlPage, PageContext, StaticPage};
use timesheet_import::redmine::RedmineClient;
use timesheet_import::session::RemoteSession;
use timesheet_import::summary;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Import a pasted weekly timesheet into Redmine time entries"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Tab-separated timesheet to import; reads stdin when omitted
    #[arg(long)]
    input: Option<PathBuf>,

    /// Parse and reconcile only, do not create entries
    #[arg(long)]
    dry_run: bool,
}

struct TerminalRenderer;

impl Renderer for TerminalRenderer {
    fn render(&self, batch: &Batch) {
        if batch.is_reconciled() {
            println!("{}", summary::render_text(&batch.entries));
        } else {
            println!(
                "batch {}: {} entries, not reconciled",
                batch.id,
                batch.entries.len()
            );
        }
    }
}

async fn read_input(path: Option<&PathBuf>) -> Result<String> {
    match path {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display())),
        None => {
            let mut raw = String::new();
            tokio::io::stdin()
                .read_to_string(&mut raw)
                .await
                .context("failed to read stdin")?;
            Ok(raw)
        }
    }
}

async fn page_context(cfg: &Config) -> Result<Arc<dyn PageContext>> {
    match &cfg.page.html_file {
        Some(path) => {
            let html = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read page snapshot {}", path.display()))?;
            Ok(Arc::new(HtmlPage::new(cfg.page.path.clone(), html)))
        }
        None => Ok(Arc::new(StaticPage::new(
            cfg.page.path.clone(),
            cfg.page.user_id,
            Some(cfg.page.activities.clone()),
        ))),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;

    let client = RedmineClient::new(&cfg.redmine.base_url, cfg.redmine.session_cookie.clone())?;
    let page = page_context(&cfg).await?;
    let session = match cfg.redmine.api_key.clone() {
        Some(key) => RemoteSession::with_api_key(Arc::new(client), page, key),
        None => RemoteSession::new(Arc::new(client), page),
    };
    let importer = Importer::new(
        Arc::new(session),
        cfg.reconcile.options(),
        cfg.submit.concurrency,
        Arc::new(TerminalRenderer),
    );

    let raw = read_input(args.input.as_ref()).await?;
    let batch = importer.import(&raw).await.context("import failed")?;
    if batch.entries.is_empty() {
        info!("timesheet has no hours to import");
        return Ok(());
    }
    if args.dry_run {
        info!("dry run, nothing submitted");
        return Ok(());
    }

    let report = importer.submit_current().await.context("submission failed")?;
    print!("{}", summary::render_report(&report));
    let failed = report.failed().len();
    if failed > 0 {
        warn!(failed, "some entries were not created; re-run to retry them");
        bail!("{} entries failed", failed);
    }
    Ok(())
}
