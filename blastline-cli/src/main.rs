use anyhow::{bail, Context, Result};
use blastline_core::config::Config;
use blastline_core::core_engine::{parse_recipients, qr, render, RecipientOutcome};
use blastline_core::core_protocol::{LoopbackClient, LoopbackConfig};
use blastline_core::http::HttpServer;
use blastline_core::logging::{init_logging_with_config, LogConfig};
use blastline_core::metrics;
use blastline_core::shutdown::{install_signal_handlers, DrainOutcome, ShutdownCoordinator};
use blastline_core::Engine;
use clap::Parser;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "blastline")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file (TOML). Without one, defaults plus BLASTLINE_* variables apply.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Enable JSON formatted logging
    #[arg(long)]
    json_logs: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Command,
}

#[derive(Parser, Debug)]
enum Command {
    /// Run the HTTP server and keep the session alive
    Serve,

    /// Send one message to every number in a CSV file, then exit
    Send {
        /// CSV file with recipient numbers in the first column
        #[arg(long)]
        recipients: PathBuf,

        /// Message text
        #[arg(long, conflicts_with = "template_file", required_unless_present = "template_file")]
        message: Option<String>,

        /// File whose content is rendered with --var bindings
        #[arg(long)]
        template_file: Option<PathBuf>,

        /// Placeholder binding, NAME=VALUE
        #[arg(long = "var", value_parser = parse_var)]
        vars: Vec<(String, String)>,

        /// How long to wait for the session to come up
        #[arg(long, default_value_t = 60)]
        connect_timeout_secs: u64,
    },

    /// Render template content and print the result
    Render {
        /// Template content, e.g. "Hello {Username}"
        #[arg(long)]
        content: String,

        /// Placeholder binding, NAME=VALUE
        #[arg(long = "var", value_parser = parse_var)]
        vars: Vec<(String, String)>,
    },
}

fn parse_var(raw: &str) -> Result<(String, String), String> {
    let (name, value) =
        raw.split_once('=').ok_or_else(|| format!("expected NAME=VALUE, got '{}'", raw))?;
    if name.is_empty() {
        return Err(format!("empty name in '{}'", raw));
    }
    Ok((name.to_string(), value.to_string()))
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if args.json_logs {
        config.logging.json_format = true;
    }
    config.validate()?;
    Ok(config)
}

fn loopback_config(config: &Config) -> LoopbackConfig {
    LoopbackConfig {
        device_store: Some(config.session.device_store.clone()),
        pairing_buffer: config.session.pairing_buffer,
        event_buffer: config.session.event_buffer,
        ..Default::default()
    }
}

fn start_engine(config: &Config) -> Result<Arc<Engine>> {
    let client = LoopbackClient::open(loopback_config(config))
        .with_context(|| format!("opening device store {}", config.session.device_store.display()))?;
    Ok(Engine::start(Arc::new(client), config))
}

/// Print every new pairing code so it can be confirmed from a companion device
fn print_pairing_codes(engine: &Engine) -> JoinHandle<()> {
    let mut codes = engine.watch_pairing();
    tokio::spawn(async move {
        while codes.changed().await.is_ok() {
            let Some(code) = codes.borrow_and_update().clone() else {
                continue;
            };
            match qr::render_terminal(&code.payload) {
                Ok(glyph) => println!("Scan with the companion device:\n{}", glyph),
                Err(e) => {
                    warn!(error = %e, "Cannot draw pairing code");
                    println!("Pairing code: {}", code.payload);
                }
            }
        }
    })
}

async fn serve(config: Config) -> Result<()> {
    metrics::init_metrics();
    let engine = start_engine(&config)?;
    let shutdown = Arc::new(ShutdownCoordinator::new(config.server.shutdown_timeout));
    install_signal_handlers(shutdown.clone())?;

    let printer = print_pairing_codes(&engine);
    engine.session().spawn_establish()?;

    let server = HttpServer::new(engine.clone(), &config.server);
    let mut server_task = tokio::spawn(server.run(shutdown.clone()));

    tokio::select! {
        result = &mut server_task => {
            printer.abort();
            engine.session().disconnect().await;
            return result.context("HTTP server task panicked")?;
        }
        _ = shutdown.wait_for_shutdown() => {}
    }

    let session = engine.session().clone();
    let outcome = shutdown
        .drain(async move {
            match server_task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(error = %e, "HTTP server failed during shutdown"),
                Err(e) => error!(error = %e, "HTTP server task panicked"),
            }
            session.disconnect().await;
        })
        .await;
    printer.abort();

    if outcome == DrainOutcome::Forced {
        warn!("Exiting with work still in flight");
    }
    Ok(())
}

async fn send(
    config: Config,
    recipients: &Path,
    body: String,
    connect_timeout: Duration,
) -> Result<()> {
    let csv = std::fs::read_to_string(recipients)
        .with_context(|| format!("reading {}", recipients.display()))?;
    let recipients = parse_recipients(&csv);
    if recipients.is_empty() {
        bail!("no recipients found in CSV");
    }

    let engine = start_engine(&config)?;
    let printer = print_pairing_codes(&engine);

    engine.session().establish().await?;
    tokio::time::timeout(connect_timeout, async {
        while !engine.is_ready() {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    })
    .await
    .context("session did not become ready in time")?;
    printer.abort();

    info!(recipients = recipients.len(), "Dispatching");
    let outcome = engine.send_bulk(&recipients, &body).await;
    for result in &outcome.results {
        match &result.outcome {
            RecipientOutcome::Delivered(id) => println!("{}\tsent\t{}", result.recipient, id),
            RecipientOutcome::Failed(err) => println!("{}\tfailed\t{}", result.recipient, err.source),
        }
    }
    println!("{}", serde_json::to_string_pretty(&engine.analytics())?);

    engine.session().disconnect().await;
    Ok(())
}

/// Message body for `send`: literal text, or a template file rendered with `vars`
fn message_body(
    message: Option<String>,
    template_file: Option<&Path>,
    vars: &HashMap<String, String>,
) -> Result<String> {
    match (message, template_file) {
        (Some(message), _) => Ok(message),
        (None, Some(path)) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            Ok(render(&content, vars)?)
        }
        (None, None) => bail!("either --message or --template-file is required"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    init_logging_with_config(LogConfig::from_settings(&config.logging)?)?;
    info!("Blastline CLI started");

    match args.command {
        Command::Serve => serve(config).await?,
        Command::Send { recipients, message, template_file, vars, connect_timeout_secs } => {
            let vars: HashMap<_, _> = vars.into_iter().collect();
            let body = message_body(message, template_file.as_deref(), &vars)?;
            send(config, &recipients, body, Duration::from_secs(connect_timeout_secs)).await?;
        }
        Command::Render { content, vars } => {
            let vars: HashMap<_, _> = vars.into_iter().collect();
            println!("{}", render(&content, &vars)?);
        }
    }

    info!("Blastline CLI finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_var() {
        assert_eq!(parse_var("Coupon=X1"), Ok(("Coupon".into(), "X1".into())));
        assert_eq!(parse_var("Url=a=b"), Ok(("Url".into(), "a=b".into())));
        assert!(parse_var("novalue").is_err());
        assert!(parse_var("=x").is_err());
    }

    #[test]
    fn test_args_require_a_message_source() {
        assert!(Args::try_parse_from(["blastline", "send", "--recipients", "a.csv"]).is_err());
        assert!(Args::try_parse_from([
            "blastline",
            "send",
            "--recipients",
            "a.csv",
            "--message",
            "hi",
            "--template-file",
            "t.txt",
        ])
        .is_err());

        let args = Args::try_parse_from([
            "blastline", "send", "--recipients", "a.csv", "--message", "hi", "--var", "A=1",
        ])
        .unwrap();
        match args.command {
            Command::Send { vars, .. } => assert_eq!(vars, vec![("A".to_string(), "1".to_string())]),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_message_body_renders_template_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "Hello {{Username}}").unwrap();
        let vars = HashMap::from([("Username".to_string(), "Sam".to_string())]);

        let body = message_body(None, Some(file.path()), &vars).unwrap();
        assert_eq!(body, "Hello Sam");

        let literal = message_body(Some("as is {x}".into()), None, &vars).unwrap();
        assert_eq!(literal, "as is {x}");
    }

    #[test]
    fn test_load_config_applies_flag_overrides() {
        let args = Args::try_parse_from(["blastline", "--log-level", "debug", "--json-logs", "serve"])
            .unwrap();
        let config = load_config(&args).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json_format);
    }
}
