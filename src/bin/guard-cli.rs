use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "guard-cli")]
#[command(about = "Management CLI for the storefront request guard", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, env = "GUARD_ADMIN_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check guard status and failure policies
    Status,
    /// Show decision and accounting counters
    Metrics,
    /// Inspect the attempt record for an identity key (e.g. "ip:1.2.3.4|user:42")
    Lockout { key: String },
    /// Clear the attempt record and lockout for an identity key
    Unlock { key: String },
    /// Revoke an outstanding token
    Revoke { token_id: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let base = cli.url.trim_end_matches('/');
    let res = match cli.command {
        Commands::Status => {
            client
                .get(format!("{}/admin/status", base))
                .headers(headers)
                .send()
                .await?
        }
        Commands::Metrics => {
            client
                .get(format!("{}/admin/metrics", base))
                .headers(headers)
                .send()
                .await?
        }
        Commands::Lockout { key } => {
            client
                .get(format!("{}/admin/lockouts/{}", base, encode_segment(&key)))
                .headers(headers)
                .send()
                .await?
        }
        Commands::Unlock { key } => {
            client
                .delete(format!("{}/admin/lockouts/{}", base, encode_segment(&key)))
                .headers(headers)
                .send()
                .await?
        }
        Commands::Revoke { token_id } => {
            client
                .delete(format!("{}/admin/tokens/{}", base, encode_segment(&token_id)))
                .headers(headers)
                .send()
                .await?
        }
    };
    print_response(res).await?;

    Ok(())
}

/// Percent-encode a single path segment.
fn encode_segment(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            if !text.is_empty() {
                eprintln!("Response: {}", text);
            }
        }
        return Ok(());
    }

    if status == reqwest::StatusCode::NO_CONTENT {
        println!("OK");
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
