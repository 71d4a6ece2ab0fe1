//! Idlewatch CLI - stop an idle container and clear its cache

use std::io::Read;

use anyhow::{bail, Context};
use chrono::Utc;
use clap::Parser;
use idlewatch::cli::{Args, SubCommand};
use idlewatch::janitor::{CacheJanitor, Janitor};
use idlewatch::monitor::{
    run_check, ActivitySample, ControllerSettings, ExitReason, LifecycleController, LogSampler,
    SampleWindow, Scheduler, SignatureClassifier,
};
use idlewatch::output::{format_output, OutputFormat, ReportData};
use idlewatch::runtime::DockerApi;
use idlewatch::{logging, Config};
use tracing::info;

fn main() {
    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    logging::init(args.log_format, args.verbose)?;

    let mut config = Config::load(args.config.as_deref()).context("loading configuration")?;
    args.apply_overrides(&mut config);
    config.validate().context("invalid configuration")?;

    let format = if args.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };

    match args.command {
        SubCommand::Run { once } => run_monitor(&config, once, format),

        SubCommand::Check => {
            let runtime = DockerApi::new(&config.runtime)?;
            let classifier = SignatureClassifier::from_config(&config)?;
            let sampler = LogSampler::new(config.runtime.log_tail);
            let report = run_check(
                &runtime,
                &classifier,
                &sampler,
                &config.container_name,
                config.poll_interval,
                Utc::now(),
            );
            println!("{}", format_output(&ReportData::Check(report), &format));
            Ok(())
        }

        SubCommand::Classify { file } => {
            let payload = match file {
                Some(ref path) => std::fs::read(path)
                    .with_context(|| format!("reading {}", path.display()))?,
                None => {
                    let mut buf = Vec::new();
                    std::io::stdin()
                        .read_to_end(&mut buf)
                        .context("reading stdin")?;
                    buf
                }
            };
            let now = Utc::now();
            let sample = ActivitySample::from_bytes(SampleWindow::new(now, now), &payload);
            let classifier = SignatureClassifier::from_config(&config)?;
            let explained = classifier.explain(&sample);
            println!(
                "{}",
                format_output(&ReportData::Classification(explained), &format)
            );
            Ok(())
        }

        SubCommand::Clean { dry_run } => {
            let Some(ref target) = config.cache_target else {
                bail!("no cache_target configured (set it in the config file or pass --cache-target)");
            };
            let report = CacheJanitor::new(target).dry_run(dry_run).clean()?;
            println!("{}", format_output(&ReportData::Cleanup(report), &format));
            Ok(())
        }

        SubCommand::Config => {
            println!("{}", format_output(&ReportData::Config(config), &format));
            Ok(())
        }
    }
}

fn run_monitor(config: &Config, once: bool, format: OutputFormat) -> anyhow::Result<()> {
    let runtime = DockerApi::new(&config.runtime)?;
    let classifier = SignatureClassifier::from_config(config)?;
    let janitor = config.cache_target.as_ref().map(CacheJanitor::new);
    if janitor.is_none() {
        info!("no cache_target configured, stops will not clean anything");
    }

    let mut controller = LifecycleController::new(
        ControllerSettings::from_config(config),
        runtime,
        classifier,
        janitor,
    );

    let mut scheduler = Scheduler::new(config.poll_interval);
    if once {
        scheduler = scheduler.with_max_ticks(1);
    }
    scheduler.install_signal_handler()?;

    info!(
        container = %config.container_name,
        threshold_secs = config.inactivity_threshold.as_secs(),
        interval_secs = config.poll_interval.as_secs(),
        "monitor started"
    );

    // Human mode relies on the log stream for per-tick progress
    let print_ticks = once || format == OutputFormat::Json;
    let summary = scheduler.run(&mut controller, |report| {
        if print_ticks {
            println!("{}", format_output(&ReportData::Tick(report.clone()), &format));
        }
    });

    let stats = controller.stats();
    info!(
        ticks = stats.ticks,
        stops = stats.stops,
        cleanup_failures = stats.cleanup_failures,
        restarts = stats.restarts_detected,
        transient_errors = stats.transient_errors,
        "monitor stopped"
    );

    if format == OutputFormat::Human && !once {
        println!("{}", format_output(&ReportData::Summary(summary.clone()), &format));
    }
    if summary.exit == ExitReason::ContainerMissing {
        info!(container = %config.container_name, "container gone, nothing left to monitor");
    }
    Ok(())
}
