//! LanBeam — LocalSend v2 peer-to-peer file sharing node.

use std::path::PathBuf;
use std::sync::Arc;

use lanbeam_core::{NodeOptions, Protocol};
use lanbeam_server::{Node, TransferObserver};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn print_help() {
    println!("LanBeam — share files with LocalSend peers on the local network");
    println!();
    println!("Usage: lanbeam [options]");
    println!();
    println!("Options:");
    println!("  --alias <name>      Advertised device name");
    println!("  --port <port>       HTTP port (default 53317)");
    println!("  --https             Serve over HTTPS with a self-signed certificate");
    println!("  --pin <pin>         Require this PIN on incoming transfers");
    println!("  --save-dir <dir>    Where received files land (default ./received_files)");
    println!("  --download          Advertise the download API flag");
    println!("  --help              Show this help message");
}

fn parse_options(args: &[String]) -> anyhow::Result<NodeOptions> {
    let mut options = NodeOptions::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--alias" => {
                options.alias = Some(
                    iter.next()
                        .ok_or_else(|| anyhow::anyhow!("--alias needs a value"))?
                        .clone(),
                );
            }
            "--port" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--port needs a value"))?;
                options.port = Some(value.parse()?);
            }
            "--https" => options.protocol = Some(Protocol::Https),
            "--pin" => {
                options.pin = Some(
                    iter.next()
                        .ok_or_else(|| anyhow::anyhow!("--pin needs a value"))?
                        .clone(),
                );
            }
            "--save-dir" => {
                options.save_dir = Some(PathBuf::from(
                    iter.next()
                        .ok_or_else(|| anyhow::anyhow!("--save-dir needs a value"))?,
                ));
            }
            "--download" => options.enable_download_api = true,
            other => anyhow::bail!("unknown option: {other}. Use --help for usage."),
        }
    }
    Ok(options)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var("LOCALSEND_DEBUG_DISCOVERY").map(|v| v == "1").unwrap_or(false) {
        filter = filter.add_directive("lanbeam_discovery=debug".parse()?);
    }
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }
    let options = parse_options(&args)?;

    let observer = TransferObserver {
        on_request: None,
        on_progress: Some(Arc::new(|event| {
            if event.finished {
                if let Some(done) = &event.completion {
                    info!(
                        file = %event.file_name,
                        path = %done.file_path.display(),
                        seconds = format!("{:.1}", done.total_time_seconds),
                        "transfer complete"
                    );
                }
            }
        })),
    };

    let node = Node::start(options, observer, None).await?;
    node.announce_presence()?;
    info!(
        alias = %node.config().device.alias,
        fingerprint = %node.config().device.fingerprint,
        "ready; press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c().await?;
    node.stop().await;
    Ok(())
}
