use adjudicator::app;
use adjudicator::config::ReviewConfig;
use adjudicator::navigator::Persistence;
use clap::Parser;
use log::info;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "adjudicator")]
#[command(about = "Case review workflow over Excel workbooks")]
struct Args {
    /// JSON config file (defaults to ./adjudicator.json when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(short, long)]
    bind: Option<String>,

    /// Directory holding the review workbooks
    #[arg(short, long)]
    workflow_dir: Option<PathBuf>,

    /// Never rewrite source files; reviews leave only through Download
    #[arg(long)]
    download_only: bool,

    /// Do not open the next case's studio link after a submit
    #[arg(long)]
    no_auto_open: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = ReviewConfig::load(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.bind = bind;
    }
    if let Some(dir) = args.workflow_dir {
        config.workflow_dir = dir;
    }
    if args.download_only {
        config.navigator.persistence = Persistence::Download;
    }
    if args.no_auto_open {
        config.navigator.auto_open_next_link = false;
    }

    app::init_logging(&config)?;
    info!("Application started");

    app::run(config).await?;

    Ok(())
}
