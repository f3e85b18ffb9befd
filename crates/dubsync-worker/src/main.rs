//! Lip-sync dubbing worker binary.

use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use dubsync_media::{run_dub, DubRequest, OnnxFaceDetector, OnnxMouthGenerator};
use dubsync_models::DubSummary;
use dubsync_worker::check::{environment_report, report_event_json};
use dubsync_worker::{Cli, Command, JobLogger, RunArgs, StdoutSink, WorkerConfig, WorkerResult};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production.
    // Logs go to stderr; stdout is reserved for the event stream.
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("dubsync=info".parse().unwrap())
        .add_directive("ort=warn".parse().unwrap())
        .add_directive("onnxruntime=warn".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => {
            if !run(args).await {
                std::process::exit(1);
            }
        }
        Command::Check => check(),
    }
}

/// Execute one dubbing job, reporting the terminal event on `sink`.
/// Returns false on failure.
async fn run(args: RunArgs) -> bool {
    let sink = StdoutSink::new();
    let logger = JobLogger::new("dub");

    logger.log_start(&format!(
        "face={} audio={} output={}",
        args.face.display(),
        args.audio.display(),
        args.output.display()
    ));

    match execute(args, &sink).await {
        Ok(summary) => {
            logger.log_completion(&format!(
                "{} frames in {:.2}s -> {}",
                summary.frames, summary.processing_time, summary.output_path
            ));
            sink.emit_result(summary);
            true
        }
        Err(e) => {
            logger.log_error(&e.to_string());
            if e.is_input_error() {
                sink.emit_error(format!("invalid input: {e}"));
            } else {
                sink.emit_error(e.to_string());
            }
            false
        }
    }
}

async fn execute(args: RunArgs, sink: &StdoutSink) -> WorkerResult<DubSummary> {
    let config = WorkerConfig::from_env().with_overrides(&args);
    info!("Worker config: {:?}", config);

    let detector = OnnxFaceDetector::load(&config.detector_model)?;
    let generator = OnnxMouthGenerator::load(&config.generator_model)?;

    let request = DubRequest {
        face_path: args.face,
        audio_path: args.audio,
        output_path: args.output,
        config: config.dub_config(),
    };

    Ok(run_dub(&request, &detector, &generator, sink).await?)
}

/// Report the runtime environment as a single terminal event.
fn check() {
    let config = WorkerConfig::from_env();
    let report = environment_report(&config);
    println!("{}", report_event_json(&report));
}
