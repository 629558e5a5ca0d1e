use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "facegate", about = "facegate face verification CLI")]
struct Cli {
    /// Base URL of the facegated service
    #[arg(long, env = "FACEGATE_SERVER", default_value = "http://127.0.0.1:5001")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll a profile photo for a user
    Enroll {
        /// User id to enroll under
        #[arg(short, long)]
        user: String,
        /// Path to the photo (JPEG, PNG, ...)
        photo: PathBuf,
    },
    /// Verify a photo against a user's enrolled profile
    Verify {
        #[arg(short, long)]
        user: String,
        photo: PathBuf,
    },
    /// Show daemon status
    Status,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(60))
        .build()?;

    match cli.command {
        Commands::Enroll { user, photo } => {
            let body = post_photo(&client, &format!("{server}/upload-profile"), &user, &photo).await?;
            print_json(&body)?;
            println!("Enrolled {user}");
            Ok(ExitCode::SUCCESS)
        }
        Commands::Verify { user, photo } => {
            let body = post_photo(&client, &format!("{server}/verify"), &user, &photo).await?;
            print_json(&body)?;

            let verified = body["verified"].as_bool().unwrap_or(false);
            let similarity = body["similarity"].as_f64().unwrap_or(0.0);
            let threshold = body["threshold"].as_f64().unwrap_or(0.0);
            if verified {
                println!("Verified {user} (similarity {similarity:.3}, threshold {threshold:.2})");
                Ok(ExitCode::SUCCESS)
            } else {
                println!("Not verified (similarity {similarity:.3}, threshold {threshold:.2})");
                Ok(ExitCode::FAILURE)
            }
        }
        Commands::Status => {
            let url = format!("{server}/health");
            let response = client
                .get(&url)
                .send()
                .await
                .with_context(|| format!("facegated not reachable at {server}"))?;
            let body = read_response(response).await?;
            print_json(&body)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn post_photo(client: &reqwest::Client, url: &str, user: &str, photo: &Path) -> Result<Value> {
    let bytes = tokio::fs::read(photo)
        .await
        .with_context(|| format!("reading {}", photo.display()))?;
    let file_name = photo
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "photo".to_string());
    tracing::debug!(url, user, bytes = bytes.len(), "uploading photo");

    let part = Part::bytes(bytes)
        .file_name(file_name)
        .mime_str(mime_for(photo))?;
    let form = Form::new().text("user_id", user.to_string()).part("photo", part);

    let response = client
        .post(url)
        .multipart(form)
        .send()
        .await
        .with_context(|| format!("request to {url} failed"))?;
    read_response(response).await
}

/// Parse the JSON body, failing on any non-2xx status.
async fn read_response(response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    let text = response.text().await?;
    let body: Value = serde_json::from_str(&text).unwrap_or(Value::String(text));
    if !status.is_success() {
        let message = body["error"].as_str().map(str::to_string).unwrap_or_else(|| body.to_string());
        bail!("server returned {status}: {message}");
    }
    Ok(body)
}

fn print_json(body: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(body)?);
    Ok(())
}

fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "tif" | "tiff" => "image/tiff",
        _ => "application/octet-stream",
    }
}
