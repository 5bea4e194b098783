use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use reportforge::bridge::{AutomationBridge, BridgeConfig};
use reportforge::pipeline::{Pipeline, RewriteOutcome, RewriteRequest};
use reportforge::transplant::TransplantRange;
use reportforge::Settings;

#[derive(Parser)]
#[command(name = "reportforge", version, about = "Rebuild incident notifications from a template")]
struct Cli {
    /// Settings file (TOML). Defaults are used when absent.
    #[arg(long, global = true, default_value = "reportforge.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Transplant a source notification into the template and save it
    Rewrite {
        /// Source .docx file
        source: PathBuf,
        /// Template path; discovered by filename keyword when omitted
        #[arg(long)]
        template: Option<PathBuf>,
        /// Output directory; defaults to the source directory
        #[arg(long)]
        out_dir: Option<PathBuf>,
        /// First source paragraph to copy (1-based)
        #[arg(long, default_value_t = 3)]
        start: i64,
        /// One past the last paragraph to copy; negative counts from the end
        #[arg(long, default_value_t = -1, allow_hyphen_values = true)]
        end: i64,
        /// Also export a PDF of the result
        #[arg(long)]
        pdf: bool,
        /// Confirmation stamp image to place per page
        #[arg(long)]
        stamp: Option<PathBuf>,
        /// Delete the digit-prefixed source file after a clean run
        #[arg(long)]
        remove_source: bool,
    },
    /// Export an existing document to PDF
    Convert {
        file: PathBuf,
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Place the confirmation stamp on each page of an existing document
    Watermark { file: PathBuf, image: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let settings = Settings::load(&cli.config)?;

    match cli.command {
        Command::Rewrite {
            source,
            template,
            out_dir,
            start,
            end,
            pdf,
            stamp,
            remove_source,
        } => {
            let mut pipeline = Pipeline::new(settings);
            let request = RewriteRequest {
                template,
                output_dir: out_dir,
                range: TransplantRange { start, end },
                export_pdf: pdf,
                watermark_image: stamp,
                remove_source,
                ..RewriteRequest::new(source)
            };
            report(pipeline.rewrite(request).await);
        }
        Command::Convert { file, out_dir } => {
            let bridge = AutomationBridge::create(BridgeConfig::default())?;
            let out_dir = out_dir
                .or_else(|| file.parent().map(PathBuf::from))
                .unwrap_or_else(|| PathBuf::from("."));
            let pdf = bridge.convert_to_pdf(&file, &out_dir)?;
            println!("exported {}", pdf.display());
        }
        Command::Watermark { file, image } => {
            let mut pipeline = Pipeline::new(settings);
            report(pipeline.stamp_existing(&file, &image).await);
        }
    }

    Ok(())
}

fn report(outcome: RewriteOutcome) {
    if let Some(reason) = &outcome.skip_reason {
        println!("skipped: {reason}");
        return;
    }
    if let Some(path) = &outcome.output_file {
        println!("written: {}", path.display());
    }
    if let Some(path) = &outcome.pdf_file {
        println!("pdf: {}", path.display());
    }
    for reason in &outcome.needs_manual_processing {
        println!("manual follow-up: {reason}");
    }
    if !outcome.success {
        eprintln!("rewrite failed");
        std::process::exit(1);
    }
}
