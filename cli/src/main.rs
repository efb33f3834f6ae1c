use clap::Parser;
use imgbatch_cli::commands::{cli, init, plan, run};
use imgbatch_core::api::{AppConfig, CancelFlag, CliError, LoggingConfig};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

static LOG_GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
    std::sync::OnceLock::new();

#[tokio::main]
async fn main() {
    let exit = match real_main().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e}");
            exit_code_for_error(&e)
        }
    };

    std::process::exit(exit);
}

async fn real_main() -> Result<i32, CliError> {
    let cli::Args { command, config } = cli::Args::parse();

    match command {
        cli::Commands::Init(init_args) => init::handle_init(init_args),
        cli::Commands::Run(run_args) => {
            let cfg = load_config(config.as_deref())?;
            let cancel = CancelFlag::new();
            watch_interrupt(cancel.clone());
            run::handle_run(run_args, &cfg, cancel).await
        }
        cli::Commands::Plan(plan_args) => {
            let cfg = load_config(config.as_deref())?;
            plan::handle_plan(plan_args, &cfg)
        }
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<AppConfig, CliError> {
    let cfg = imgbatch_core::api::load(path).map_err(|e| CliError::Config(e.to_string()))?;
    init_tracing(&cfg.logging).map_err(CliError::Command)?;
    Ok(cfg)
}

/// First Ctrl-C lets the current group drain and skips the rest; a second
/// one exits immediately (outputs stay consistent: only staged files are
/// left behind, and the next attempt at that item replaces them).
fn watch_interrupt(cancel: CancelFlag) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        tracing::warn!("interrupt received, finishing the current group");
        eprintln!("interrupt received, finishing the current group (Ctrl-C again to abort)");
        cancel.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(run::EXIT_CANCELLED);
        }
    });
}

fn exit_code_for_error(e: &CliError) -> i32 {
    // 0: success
    // 2: finished with item or group failures (returned as a normal exit code)
    // 11: config error
    // 20: fatal I/O (input/output root, reference, log dir)
    // 50: internal/uncategorized
    use imgbatch_core::api::BatchError;
    match e {
        CliError::Config(_) => 11,
        CliError::Batch(be) => match be {
            BatchError::Config(_) => 11,
            BatchError::OutputRoot { .. }
            | BatchError::InputRoot { .. }
            | BatchError::Reference { .. } => 20,
            BatchError::State(_) => 50,
        },
        CliError::Io(_) => 20,
        CliError::Command(_) => 20,
        CliError::Anyhow(_) => 50,
    }
}

fn init_tracing(logging: &LoggingConfig) -> Result<(), String> {
    if !logging.enabled {
        return Ok(());
    }

    let filter = match std::env::var("RUST_LOG") {
        Ok(v) if !v.trim().is_empty() => EnvFilter::from_default_env(),
        _ => EnvFilter::try_new(logging.level.clone()).map_err(|e| e.to_string())?,
    };

    let mut maybe_writer = None;

    if logging.file {
        let dir = match logging
            .directory
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            Some(d) => std::path::PathBuf::from(d),
            None => std::env::temp_dir().join("imgbatch"),
        };

        std::fs::create_dir_all(&dir).map_err(|e| format!("create log dir failed: {e}"))?;
        let file_name = format!("imgbatch.{}.log", std::process::id());
        let appender = tracing_appender::rolling::never(dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let _ = LOG_GUARD.set(guard);
        maybe_writer = Some(non_blocking);
    }

    if !logging.console && maybe_writer.is_none() {
        return Err("logging disabled for both console and file".to_string());
    }

    let console_layer = logging.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(atty::is(atty::Stream::Stderr))
    });

    let file_layer = maybe_writer.map(|w| {
        tracing_subscriber::fmt::layer()
            .with_writer(w)
            .with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(())
}
