//! Sends one image to the inference service and prints the result.

use clap::Parser;
use inference_api::bootstrap::load_face_gate;
use inference_api::client::{ClientView, InferenceClient, Prevalidator, StreamClient};
use inference_api::infrastructure::ml::cascade_face_gate::FaceGateParams;
use inference_api::infrastructure::ml::traits::FaceGate;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "detect", version, about = "Classify a face image with the inference service")]
struct Args {
    /// Image to classify (JPG, JPEG or PNG)
    image: PathBuf,

    /// Base URL of the server
    #[arg(long, default_value = "http://127.0.0.1:8000")]
    server: String,

    /// Haar cascade XML; enables the local face check before upload
    #[arg(long)]
    cascade: Option<PathBuf>,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Send the image over the streaming endpoint instead of an upload
    #[arg(long)]
    ws: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let args = Args::parse();

    let filename = args
        .image
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("image")
        .to_string();
    let bytes = tokio::fs::read(&args.image).await?;

    let gate: Option<Arc<dyn FaceGate>> = match &args.cascade {
        Some(path) => Some(load_face_gate(path, FaceGateParams::default())?),
        None => None,
    };
    if let Err(err) = Prevalidator::new(gate).check(&filename, &bytes) {
        return Ok(report(&ClientView::from_prevalidation(&err)));
    }

    println!("{}", ClientView::Pending);
    let timeout = Duration::from_secs(args.timeout);
    let result = if args.ws {
        StreamClient::new(&args.server, timeout)?.classify(&bytes).await
    } else {
        InferenceClient::new(&args.server, timeout)?
            .upload(&filename, bytes)
            .await
    };
    Ok(report(&ClientView::from_result(result)))
}

fn report(view: &ClientView) -> ExitCode {
    println!("{}", view);
    if view.is_failure() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
