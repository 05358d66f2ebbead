mod http;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use vigil_vision::assemble::DEFAULT_JPEG_QUALITY;
use vigil_vision::doctor as vision_doctor;
use vigil_vision::pipeline::process;
use vigil_vision::stub::StubDetector;
use vigil_vision::{AnnotationRequest, Detector, VisionConfig, VisionContext};

#[cfg(feature = "vision-tflite")]
use vigil_vision::tflite::TfliteDetector;

#[derive(Debug, Parser)]
#[command(name = "vigil", version, about = "vigil - threat-tiered object detection service")]
struct Cli {
    #[arg(long)]
    config: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate the config and detector setup.
    Doctor,
    /// Run the HTTP service.
    Serve,
    /// Annotate a local image file and print the detections as JSON.
    Annotate {
        #[arg(long)]
        image: PathBuf,
        #[arg(long)]
        out: PathBuf,
        #[arg(long)]
        camera_name: Option<String>,
        #[arg(long)]
        hide_confidence: bool,
        #[arg(long)]
        hide_label: bool,
    },
    Vision { #[command(subcommand)] cmd: VisionCmd },
}

#[derive(Debug, Subcommand)]
enum VisionCmd { Inspect }

#[derive(Debug, serde::Deserialize)]
struct Config {
    #[serde(default)]
    server: http::ServerConfig,
    vision: VisionConfig,
    #[serde(default)]
    annotate: AnnotateCfg,
}

#[derive(Debug, serde::Deserialize)]
struct AnnotateCfg {
    #[serde(default = "default_jpeg_quality")]
    jpeg_quality: u8,
}

impl Default for AnnotateCfg {
    fn default() -> Self {
        Self { jpeg_quality: default_jpeg_quality() }
    }
}

fn default_jpeg_quality() -> u8 { DEFAULT_JPEG_QUALITY }

fn load_config(path: &str) -> Result<Config> {
    let s = std::fs::read_to_string(path).context("read config")?;
    parse_config(&s)
}

fn parse_config(s: &str) -> Result<Config> {
    Ok(toml::from_str(s).context("parse config toml")?)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = load_config(&cli.config)?;

    match cli.cmd {
        Command::Doctor => doctor(&cfg)?,
        Command::Serve => serve(&cfg).await?,
        Command::Annotate { image, out, camera_name, hide_confidence, hide_label } => {
            let req = AnnotationRequest {
                camera_label: camera_name,
                show_confidence: !hide_confidence,
                show_label: !hide_label,
            };
            annotate(&cfg, &image, &out, &req)?
        }
        Command::Vision { cmd } => vision_cmd(&cfg, cmd)?,
    }
    Ok(())
}

fn doctor(cfg: &Config) -> Result<()> {
    info!("doctor: starting");

    vision_doctor::check_vision(&cfg.vision)?;
    vision_doctor::check_jpeg_quality(cfg.annotate.jpeg_quality)?;
    cfg.server
        .bind
        .parse::<SocketAddr>()
        .with_context(|| format!("server.bind is not a socket address: {}", cfg.server.bind))?;
    anyhow::ensure!(cfg.server.max_upload_mb >= 1, "server.max_upload_mb must be >= 1");

    let det = init_detector(&cfg.vision)?;
    info!("doctor: detector {} with {} classes", det.name(), det.class_names().len());

    info!("doctor: OK");
    Ok(())
}

async fn serve(cfg: &Config) -> Result<()> {
    vision_doctor::check_jpeg_quality(cfg.annotate.jpeg_quality)?;
    let ctx = build_context(cfg)?;
    let app = http::create_router(http::AppState::new(ctx, &cfg.vision.model_name), &cfg.server);

    let listener = tokio::net::TcpListener::bind(&cfg.server.bind)
        .await
        .with_context(|| format!("bind {}", cfg.server.bind))?;
    info!("serve: listening on {} (model {})", listener.local_addr()?, cfg.vision.model_name);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server")?;
    info!("serve: stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("serve: ctrl-c handler failed: {}", e);
        std::future::pending::<()>().await;
    }
}

fn annotate(cfg: &Config, image: &Path, out: &Path, req: &AnnotationRequest) -> Result<()> {
    let ctx = build_context(cfg)?;
    let bytes = std::fs::read(image).with_context(|| format!("read {}", image.display()))?;
    let res = process(&ctx, &bytes, req)?;
    std::fs::write(out, &res.annotated_image).with_context(|| format!("write {}", out.display()))?;
    info!("annotate: {} detections -> {}", res.count, out.display());

    let wire = res.to_response();
    let summary = serde_json::json!({ "detections": wire.detections, "count": wire.count });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn vision_cmd(cfg: &Config, cmd: VisionCmd) -> Result<()> {
    match cmd {
        VisionCmd::Inspect => {
            #[cfg(feature = "vision-tflite")]
            {
                if cfg.vision.backend == "tflite" {
                    let d = TfliteDetector::new(cfg.vision.clone())?;
                    print!("{}", d.inspect()?);
                    return Ok(());
                }
            }
            let det = init_detector(&cfg.vision)?;
            println!("backend={} classes={}", det.name(), det.class_names().len());
            Ok(())
        }
    }
}

fn build_context(cfg: &Config) -> Result<VisionContext> {
    let det = init_detector(&cfg.vision)?;
    Ok(VisionContext::new(det).with_jpeg_quality(cfg.annotate.jpeg_quality))
}

// --- vision init helpers ---
fn init_detector(v: &VisionConfig) -> Result<Arc<dyn Detector>> {
    vision_doctor::check_class_table(&v.class_names)?;
    match v.backend.as_str() {
        "stub" => {
            info!("vision: stub detector with {} fixed detections", v.stub.detections.len());
            Ok(Arc::new(StubDetector::from_config(v.class_names.clone(), &v.stub)))
        }
        "tflite" => init_tflite(v),
        other => anyhow::bail!("unknown vision.backend: {}", other),
    }
}

#[cfg(feature = "vision-tflite")]
fn init_tflite(v: &VisionConfig) -> Result<Arc<dyn Detector>> {
    Ok(Arc::new(TfliteDetector::new(v.clone())?))
}

#[cfg(not(feature = "vision-tflite"))]
fn init_tflite(_v: &VisionConfig) -> Result<Arc<dyn Detector>> {
    anyhow::bail!("vision.backend=tflite but binary not built with --features vision-tflite")
}
