use std::sync::Arc;

use tracing::{info, warn};

mod fixture;

use cardview_core::{DeviceClass, Settings};
use cardview_render::BlockRenderer;
use fixture::FixtureEngine;

const USAGE: &str = "usage: cardview-cli <block-file> <result.json> [--mobile]";

struct Args {
    block: String,
    result: String,
    device: DeviceClass,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Option<Args> {
    let mut positional = Vec::new();
    let mut device = DeviceClass::Desktop;
    for arg in args {
        match arg.as_str() {
            "--mobile" => device = DeviceClass::Mobile,
            flag if flag.starts_with("--") => return None,
            _ => positional.push(arg),
        }
    }
    let [block, result] = <[String; 2]>::try_from(positional).ok()?;
    Some(Args { block, result, device })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    cardview_core::load_dotenv();

    let settings = Settings::load().unwrap_or_else(|e| {
        eprintln!("Failed to load settings, using defaults: {e}");
        Settings::default()
    });

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| settings.logging.level.as_str().into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let Some(args) = parse_args(std::env::args().skip(1)) else {
        eprintln!("{USAGE}");
        std::process::exit(2);
    };

    let block = tokio::fs::read_to_string(&args.block).await?;
    let engine = FixtureEngine::new(&args.result);
    info!("Rendering {} against {}", args.block, engine.path().display());

    let renderer = BlockRenderer::from_settings(Arc::new(engine), &settings, args.device);
    let output = renderer.render_block(&block).await;
    if let cardview_render::RenderOutput::Error { kind, message } = &output {
        warn!("Block rendered as an error ({kind}): {message}");
    }

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Option<Args> {
        parse_args(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_parse_args() {
        let parsed = args(&["block.md", "result.json"]).unwrap();
        assert_eq!(parsed.block, "block.md");
        assert_eq!(parsed.result, "result.json");
        assert_eq!(parsed.device, DeviceClass::Desktop);

        let parsed = args(&["--mobile", "block.md", "result.json"]).unwrap();
        assert_eq!(parsed.device, DeviceClass::Mobile);

        assert!(args(&["block.md"]).is_none());
        assert!(args(&["a", "b", "c"]).is_none());
        assert!(args(&["a", "b", "--verbose"]).is_none());
    }
}
