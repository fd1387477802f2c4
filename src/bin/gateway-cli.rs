use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

use log_gateway::security::TenantKey;
use log_gateway::signing::{SignatureVerifier, SignedEnvelope};

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Management CLI for the log gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Tenant key (base64 "<validationId>:<host>"); defaults to $ERROR_AWARE_KEY
    #[arg(short, long)]
    key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the response-signing public key
    PublicKey,
    /// Show the current security policy
    Status,
    /// Refetch security policy and banned IPs
    Sync,
    /// Refetch the banned IP list
    RefreshBanned,
    /// Read a page of logs
    Logs {
        /// Log system: "request" or "app"
        #[arg(long = "type", default_value = "app")]
        system: String,
        /// Day bucket as MMDDYYYY
        #[arg(long)]
        date: String,
        #[arg(long)]
        lines: Option<usize>,
        #[arg(long)]
        start: Option<usize>,
        #[arg(long)]
        search: Option<String>,
        /// Verify the payload signature against the gateway public key
        #[arg(long)]
        verify: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/').to_string();

    match cli.command {
        Commands::PublicKey => {
            let res = client
                .get(format!("{base}/logger/.well-known?publickey"))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Status => {
            let res = client.post(format!("{base}/logger/status")).send().await?;
            print_response(res).await?;
        }
        Commands::Sync => {
            let res = client.post(format!("{base}/logger/sync")).send().await?;
            print_response(res).await?;
        }
        Commands::RefreshBanned => {
            let res = client.post(format!("{base}/logger/banned")).send().await?;
            print_response(res).await?;
        }
        Commands::Logs {
            system,
            date,
            lines,
            start,
            search,
            verify,
        } => {
            let mut query = vec![("type", system), ("date", date)];
            if let Some(lines) = lines {
                query.push(("lines", lines.to_string()));
            }
            if let Some(start) = start {
                query.push(("start", start.to_string()));
            }
            if let Some(search) = search {
                query.push(("search", search));
            }

            let res = client
                .get(format!("{base}/logger"))
                .headers(auth_headers(cli.key.as_deref())?)
                .query(&query)
                .send()
                .await?;
            if !res.status().is_success() {
                return print_response(res).await;
            }

            let envelope: SignedEnvelope = res.json().await?;
            if verify {
                let key: Value = client
                    .get(format!("{base}/logger/.well-known?publickey"))
                    .send()
                    .await?
                    .json()
                    .await?;
                let pem = key
                    .get("publicKey")
                    .and_then(Value::as_str)
                    .ok_or("gateway did not return a public key")?;
                let verifier = SignatureVerifier::from_public_key_pem(pem)?;
                if !verifier.verify_envelope(&envelope) {
                    return Err("signature verification failed".into());
                }
                eprintln!("Signature verified");
            }

            match envelope.payload.get("content").and_then(Value::as_str) {
                Some(content) => println!("{content}"),
                None => println!("{}", serde_json::to_string_pretty(&envelope.payload)?),
            }
        }
    }

    Ok(())
}

fn auth_headers(key: Option<&str>) -> Result<HeaderMap, Box<dyn std::error::Error>> {
    let encoded = match key {
        Some(key) => key.to_string(),
        None => std::env::var("ERROR_AWARE_KEY")
            .map_err(|_| "no tenant key: pass --key or set ERROR_AWARE_KEY")?,
    };
    let tenant = TenantKey::decode(&encoded)?;

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", tenant.validation_id()))?,
    );
    Ok(headers)
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: gateway returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    if status == reqwest::StatusCode::NO_CONTENT {
        return Ok(());
    }
    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
