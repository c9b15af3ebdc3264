use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use jute_audit::config::AuditConfig;
use jute_audit::integrity;
use jute_audit::models::{
    AuditSummary, GeoPoint, GradeBuckets, ManualCounts, MaterialType, MillDetails,
};
use jute_audit::normalize::{self, Normalizer};
use jute_audit::report::ExportBundle;
use jute_audit::session::AuditSession;
use jute_audit::watermark::{self, WatermarkInfo};

#[derive(Parser)]
#[command(name = "jute-audit")]
#[command(about = "Jute stock audit: grade detections, check compliance, export tamper-evident reports", long_about = None)]
struct Cli {
    /// TOML file overriding split tables, branding and defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SessionArgs {
    #[arg(long, value_enum)]
    material: MaterialType,
    /// Bales consumed per day; defaults to the configured value
    #[arg(long)]
    daily: Option<i64>,
    #[arg(long)]
    inspector: String,
    #[arg(long)]
    inspector_id: Option<String>,
    #[arg(long)]
    notes: Option<String>,
    #[arg(long, requires = "lon", allow_negative_numbers = true)]
    lat: Option<f64>,
    #[arg(long, requires = "lat", allow_negative_numbers = true)]
    lon: Option<f64>,
    #[arg(long)]
    mill_name: Option<String>,
    #[arg(long)]
    mill_license: Option<String>,
    /// Quality flag such as DAMAGED_BALES or IRREGULAR_STOCK (repeatable)
    #[arg(long = "flag")]
    flags: Vec<String>,
    /// Mark the counts as checked by the inspector
    #[arg(long)]
    verified: bool,
    /// Images to watermark and include in the export
    #[arg(long, num_args = 1..)]
    images: Vec<PathBuf>,
    #[arg(long, default_value = "exports")]
    out_dir: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Grade recorded detector output and export the audit
    Analyze {
        /// JSON array with one array of boxes per image
        #[arg(long)]
        detections: PathBuf,
        #[command(flatten)]
        session: SessionArgs,
    },
    /// Grade operator-entered counts and export the audit
    Manual {
        #[arg(long)]
        total: u64,
        #[arg(long)]
        a: u64,
        #[arg(long)]
        b: u64,
        #[arg(long)]
        c: u64,
        #[arg(long)]
        d: u64,
        #[command(flatten)]
        session: SessionArgs,
    },
    /// Print the hash of an exported JSON record
    Hash {
        #[arg(long)]
        record: PathBuf,
    },
    /// Re-hash an exported JSON record and compare with its published hash
    Verify {
        #[arg(long)]
        record: PathBuf,
        /// Hash published elsewhere; defaults to the one inside the record
        #[arg(long)]
        hash: Option<String>,
    },
    /// Watermark a single image
    Watermark {
        #[arg(long)]
        image: PathBuf,
        #[arg(long)]
        out: PathBuf,
        #[arg(long)]
        audit_id: Option<String>,
        #[arg(long)]
        inspector_id: Option<String>,
        #[arg(long)]
        timestamp: Option<String>,
        #[arg(long)]
        label: Option<String>,
        #[arg(long)]
        ai_verified: bool,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "jute_audit=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = AuditConfig::load(cli.config.as_deref()).context("failed to load config")?;

    match cli.command {
        Commands::Analyze {
            detections,
            session: args,
        } => {
            let content = std::fs::read_to_string(&detections)
                .with_context(|| format!("failed to read {}", detections.display()))?;
            let images = normalize::parse_detections(&content)?;
            if !args.images.is_empty() && args.images.len() != images.len() {
                tracing::warn!(
                    detections = images.len(),
                    images = args.images.len(),
                    "image count differs from detection count"
                );
            }

            let normalizer = Normalizer::new(&config);
            let mut session = start_session(&args, &config);
            for boxes in &images {
                session.add_detections(&normalizer, boxes);
            }
            let summary = session.analyze()?;
            print_summary(&summary);
            export(&summary, &args, &config, true)?;
        }
        Commands::Manual {
            total,
            a,
            b,
            c,
            d,
            session: args,
        } => {
            let counts = ManualCounts {
                total,
                grades: GradeBuckets { a, b, c, d },
            };
            let session = start_session(&args, &config);
            let summary = session.manual_entry(&counts)?;
            print_summary(&summary);
            export(&summary, &args, &config, false)?;
        }
        Commands::Hash { record } => {
            let value = read_record(&record)?;
            let summary = value
                .get("summary")
                .context("record has no summary field")?;
            println!("{}", integrity::hash_value(summary));
        }
        Commands::Verify { record, hash } => {
            let mut value = read_record(&record)?;
            if let (Some(hash), Some(fields)) = (hash, value.as_object_mut()) {
                fields.insert("hash".to_string(), serde_json::Value::String(hash));
            }
            let verification = integrity::verify_record(&value)?;
            if verification.is_valid() {
                println!("VALID: {}", verification.recomputed);
            } else {
                println!("TAMPERED");
                println!("  published:  {}", verification.published);
                println!("  recomputed: {}", verification.recomputed);
                bail!("record does not match its published hash");
            }
        }
        Commands::Watermark {
            image,
            out,
            audit_id,
            inspector_id,
            timestamp,
            label,
            ai_verified,
        } => {
            let bytes = std::fs::read(&image)
                .with_context(|| format!("failed to read {}", image.display()))?;
            let info = WatermarkInfo {
                audit_id,
                inspector_id,
                timestamp: timestamp
                    .or_else(|| Some(Utc::now().format("%Y-%m-%d %H:%M:%S").to_string())),
                label,
            };
            // PNG stays PNG; everything else is written as JPEG.
            let format = image::ImageFormat::from_path(&out).unwrap_or(image::ImageFormat::Jpeg);
            let marked = watermark::watermark_bytes_as(
                &bytes,
                &info,
                &config.branding,
                ai_verified,
                format,
            )?;
            std::fs::write(&out, marked)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Watermarked image written to {}.", out.display());
        }
    }

    Ok(())
}

fn start_session(args: &SessionArgs, config: &AuditConfig) -> AuditSession {
    let daily = args.daily.unwrap_or(config.daily_consumption);
    let mut session = AuditSession::new(&args.inspector, args.material, daily, Utc::now());

    if let Some(id) = &args.inspector_id {
        session = session.with_inspector_id(id.clone());
    }
    if let Some(notes) = &args.notes {
        session = session.with_notes(notes.clone());
    }
    if let (Some(latitude), Some(longitude)) = (args.lat, args.lon) {
        session = session.with_geolocation(GeoPoint {
            latitude,
            longitude,
        });
    }
    if args.mill_name.is_some() || args.mill_license.is_some() {
        session = session.with_mill(MillDetails {
            name: args.mill_name.clone(),
            license: args.mill_license.clone(),
            ..MillDetails::default()
        });
    }
    for flag in &args.flags {
        session.flag(flag.clone().into());
    }
    if args.verified {
        session.mark_verified();
    }
    session
}

fn export(
    summary: &AuditSummary,
    args: &SessionArgs,
    config: &AuditConfig,
    ai_verified: bool,
) -> anyhow::Result<()> {
    let info = WatermarkInfo::from_summary(summary);
    let mut watermarked = Vec::with_capacity(args.images.len());
    for path in &args.images {
        let bytes =
            std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        let marked = watermark::watermark_bytes(&bytes, &info, &config.branding, ai_verified)
            .with_context(|| format!("failed to watermark {}", path.display()))?;
        watermarked.push(marked);
    }

    let bundle = ExportBundle::build(summary, watermarked, &config.branding)?;
    let written = bundle
        .write_to(&args.out_dir)
        .with_context(|| format!("failed to write export to {}", args.out_dir.display()))?;

    println!("Hash: {}", bundle.hash);
    println!("Export written to {} ({} files).", args.out_dir.display(), written.len());
    Ok(())
}

fn print_summary(summary: &AuditSummary) {
    println!("Audit {}", summary.metadata.audit_id);
    println!(
        "- total {} across {} image(s), grade {}",
        summary.total_count,
        summary.image_count,
        summary.grade_label()
    );
    println!(
        "- A {} / B {} / C {} / D {}",
        summary.grade_totals.a,
        summary.grade_totals.b,
        summary.grade_totals.c,
        summary.grade_totals.d
    );
    println!(
        "- stock days {:.1} at {}/day: {}",
        summary.stock_days, summary.daily_consumption, summary.compliance_status
    );
    println!(
        "- confidence {:.1}%, review risk {} ({})",
        summary.mean_confidence * 100.0,
        summary.review_risk.level,
        summary.review_risk.score
    );
}

fn read_record(path: &Path) -> anyhow::Result<serde_json::Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("{} is not valid JSON", path.display()))
}
