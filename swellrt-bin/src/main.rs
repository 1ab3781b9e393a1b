use clap::{Args, Parser, Subcommand};
use color_eyre::eyre;
use std::path::PathBuf;
use std::sync::Arc;
use swellrt_reconciler::{
    config, ensure_running, options, ContainerOptions, DockerRuntime, ReconcileReport, Reconciler,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "swellrt-docker")]
#[command(about = "Keep a SwellRT server container and its MongoDB running in Docker")]
#[command(version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    action: Option<Command>,

    /// Options file (YAML or JSON)
    #[arg(short, long, env = "SWELLRT_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(flatten)]
    overrides: Overrides,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Pull, create, start or recreate containers as needed (default)
    Up,
    /// Show what `up` would do without changing anything
    Plan,
}

/// Per-field overrides; these win over the options file
#[derive(Args, Debug, Default)]
struct Overrides {
    /// Image repository
    #[arg(long, env = "SWELLRT_IMAGE", global = true)]
    image: Option<String>,

    /// Image tag
    #[arg(long, env = "SWELLRT_TAG", global = true)]
    tag: Option<String>,

    /// Container name
    #[arg(long, env = "SWELLRT_NAME", global = true)]
    name: Option<String>,

    /// Hostname inside the container
    #[arg(long, env = "SWELLRT_HOST", global = true)]
    host: Option<String>,

    /// Host port bound to the server's port 9898
    #[arg(long, env = "SWELLRT_PORT", global = true)]
    port: Option<String>,

    /// Extra server arguments
    #[arg(
        long = "command",
        env = "SWELLRT_COMMAND",
        global = true,
        allow_hyphen_values = true
    )]
    cmd: Option<String>,
}

impl Overrides {
    fn to_options(&self) -> ContainerOptions {
        ContainerOptions {
            image: self.image.clone(),
            tag: self.tag.clone(),
            name: self.name.clone(),
            host: self.host.clone(),
            port: self.port.clone(),
            command: self.cmd.clone(),
            ..Default::default()
        }
    }
}

impl Cli {
    /// Options file merged with the command line, defaults not applied yet.
    fn options(&self) -> eyre::Result<ContainerOptions> {
        let file = match &self.config {
            Some(path) => config::load_options(path)?,
            None => ContainerOptions::default(),
        };
        Ok(options::merge(&file, &self.overrides.to_options()))
    }
}

fn print_report(report: &ReconcileReport, depth: usize) {
    for link in &report.links {
        print_report(link, depth + 1);
    }
    println!(
        "{:indent$}{:<30} {:<35} {:<12} {}",
        "",
        report.name,
        report.tagged_image,
        report.container_id.get(..12).unwrap_or(report.container_id.as_str()),
        report.action,
        indent = depth * 2
    );
}

/// `RUST_LOG` when set, `info` otherwise; `--verbose` raises either to `debug`.
fn log_filter(from_env: Option<EnvFilter>, verbose: bool) -> eyre::Result<EnvFilter> {
    let filter = from_env.unwrap_or_else(|| EnvFilter::new("info"));
    Ok(if verbose {
        filter.add_directive("debug".parse()?)
    } else {
        filter
    })
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    dotenvy::dotenv().ok();
    color_eyre::install()?;
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(log_filter(EnvFilter::try_from_default_env().ok(), cli.verbose)?)
        .init();

    let overrides = cli.options()?;
    let runtime = Arc::new(DockerRuntime::connect()?);

    match cli.action.unwrap_or(Command::Up) {
        Command::Up => {
            let report = ensure_running(runtime, &overrides, || {
                info!("All containers running");
            })
            .await?;
            print_report(&report, 0);
        }
        Command::Plan => {
            let merged = options::merge(&ContainerOptions::swellrt_defaults(), &overrides);
            let spec = options::resolve(&merged)?;
            for step in Reconciler::new(runtime).plan(&spec).await? {
                println!(
                    "{:<30} {:<35} {}",
                    step.name, step.tagged_image, step.action
                );
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_command_is_up() {
        let cli = Cli::try_parse_from(["swellrt-docker"]).unwrap();
        assert_eq!(cli.action, None);
        assert!(!cli.verbose);
    }

    #[test]
    fn test_log_filter_follows_rust_log() {
        use tracing_subscriber::filter::LevelFilter;

        let filter = log_filter(Some(EnvFilter::new("warn")), false).unwrap();
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::WARN));

        let filter = log_filter(None, false).unwrap();
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::INFO));

        let filter = log_filter(Some(EnvFilter::new("warn")), true).unwrap();
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::DEBUG));
    }

    #[test]
    fn test_overrides_after_subcommand() {
        let cli = Cli::try_parse_from([
            "swellrt-docker",
            "plan",
            "--tag",
            "0.5",
            "--command",
            "-Dfoo=bar",
        ])
        .unwrap();
        assert_eq!(cli.action, Some(Command::Plan));

        let options = cli.options().unwrap();
        assert_eq!(options.tag.as_deref(), Some("0.5"));
        assert_eq!(options.command.as_deref(), Some("-Dfoo=bar"));
        assert_eq!(options.image, None);
    }

    #[test]
    fn test_command_line_wins_over_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "name: from-file\nport: 7000\nmongo:\n  tag: \"4.4\"").unwrap();
        let path = file.path().to_string_lossy().to_string();

        let cli =
            Cli::try_parse_from(["swellrt-docker", "--config", path.as_str(), "--port", "8000"]).unwrap();
        let merged = options::merge(&ContainerOptions::swellrt_defaults(), &cli.options().unwrap());
        let spec = options::resolve(&merged).unwrap();

        assert_eq!(spec.name, "from-file");
        assert_eq!(spec.port.as_deref(), Some("8000"));
        assert_eq!(spec.links["mongo"].tagged_image(), "mongo:4.4");
        assert_eq!(spec.links["mongo"].name, "from-file-mongo");
    }
}
