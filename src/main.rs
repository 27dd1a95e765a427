use anyhow::{anyhow, Context, Result};
use clap::Parser;
use productboard_mcp::config::{AuthType, LogFormat, LoggingConfig};
use productboard_mcp::startup::Application;
use productboard_mcp::Config;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = env!("CARGO_PKG_NAME"))]
#[command(about = env!("CARGO_PKG_DESCRIPTION"))]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = productboard_mcp::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Run the interactive OAuth2 authorization flow, store the tokens and exit
    #[arg(long)]
    authorize: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        error!("Fatal: {:#}", e);
        eprintln!("productboard-mcp: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;

    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if cli.log_json {
        config.logging.format = LogFormat::Json;
    }
    init_logging(&config.logging);

    info!("Starting productboard-mcp v{}", productboard_mcp::VERSION);

    let app = Application::build(config).await?;

    if cli.authorize {
        return authorize(&app).await;
    }

    app.run().await?;
    info!("productboard-mcp stopped");
    Ok(())
}

/// Logs always go to stderr; stdout carries the protocol
fn init_logging(logging: &LoggingConfig) {
    use tracing_subscriber::EnvFilter;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    let result = match logging.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    };
    if let Err(e) = result {
        eprintln!("Failed to initialize logging: {}", e);
    }
}

async fn authorize(app: &Application) -> Result<()> {
    if app.config.auth.r#type != AuthType::OAuth2 {
        return Err(anyhow!("--authorize requires auth.type: oauth2"));
    }

    let url = app.auth.authorization_url()?;
    eprintln!("Open this URL in a browser and approve access:\n\n  {}\n", url);
    if let Err(e) = webbrowser::open(&url) {
        tracing::debug!("Could not open a browser automatically: {}", e);
    }
    eprintln!("Then paste the full redirect URL here:");

    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("Failed to read the redirect URL")?;

    let (code, state) = parse_redirect(line.trim())?;
    app.auth.complete_authorization(&code, &state).await?;

    eprintln!("Authorization complete.");
    info!("OAuth2 authorization completed");
    Ok(())
}

fn parse_redirect(input: &str) -> Result<(String, String)> {
    let redirect = url::Url::parse(input).context("Expected the full redirect URL")?;
    let mut code = None;
    let mut state = None;
    for (key, value) in redirect.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => return Err(anyhow!("Authorization was denied: {}", value)),
            _ => {}
        }
    }
    match (code, state) {
        (Some(code), Some(state)) => Ok((code, state)),
        _ => Err(anyhow!("Redirect URL must carry both 'code' and 'state'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_redirect() {
        let (code, state) =
            parse_redirect("http://localhost:3000/callback?code=abc%20123&state=xyz").unwrap();
        assert_eq!(code, "abc 123");
        assert_eq!(state, "xyz");
    }

    #[test]
    fn test_parse_redirect_rejects_missing_state_and_denials() {
        assert!(parse_redirect("http://localhost:3000/callback?code=abc").is_err());
        assert!(parse_redirect("http://localhost:3000/callback?error=access_denied").is_err());
        assert!(parse_redirect("abc").is_err());
    }
}
