use std::process::ExitCode;

use clap::{Parser, Subcommand};
use status_service::http::handlers::{HealthReport, HEALTH_ROUTE, METRICS_ROUTE};

#[derive(Parser)]
#[command(name = "status-cli")]
#[command(about = "Query a running status-service", long_about = None)]
struct Cli {
    #[arg(short, long, env = "STATUS_URL", default_value = "http://localhost:4000")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the health report; exits non-zero when unhealthy
    Health,
    /// Print metrics in exposition format
    Metrics {
        /// Only print samples whose metric name starts with this prefix
        #[arg(short, long)]
        filter: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(5))
        .build()?;
    let base = cli.url.trim_end_matches('/');

    match cli.command {
        Commands::Health => {
            let res = match client.get(format!("{}{}", base, HEALTH_ROUTE)).send().await {
                Ok(res) => res,
                Err(e) => {
                    eprintln!("Error: service unreachable at {}: {}", base, e);
                    return Ok(ExitCode::FAILURE);
                }
            };
            if !res.status().is_success() {
                eprintln!("Error: health check returned status {}", res.status());
                return Ok(ExitCode::FAILURE);
            }

            let report: HealthReport = res.json().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if report.status != "ok" {
                return Ok(ExitCode::FAILURE);
            }
            if !report.db_connected {
                eprintln!("Warning: store is not connected");
            }
        }
        Commands::Metrics { filter } => {
            let res = match client.get(format!("{}{}", base, METRICS_ROUTE)).send().await {
                Ok(res) => res,
                Err(e) => {
                    eprintln!("Error: service unreachable at {}: {}", base, e);
                    return Ok(ExitCode::FAILURE);
                }
            };
            let status = res.status();
            let text = res.text().await?;
            if !status.is_success() {
                eprintln!("Error: metrics endpoint returned status {}: {}", status, text.trim());
                return Ok(ExitCode::FAILURE);
            }

            for line in select_lines(&text, filter.as_deref()) {
                println!("{}", line);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Exposition lines for metrics starting with `prefix`, keeping their
/// `# HELP` and `# TYPE` headers.
fn select_lines<'a>(text: &'a str, prefix: Option<&str>) -> Vec<&'a str> {
    let Some(prefix) = prefix else {
        return text.lines().collect();
    };
    text.lines()
        .filter(|line| {
            let name = line
                .strip_prefix("# HELP ")
                .or_else(|| line.strip_prefix("# TYPE "))
                .unwrap_or(line);
            name.starts_with(prefix)
        })
        .collect()
}
