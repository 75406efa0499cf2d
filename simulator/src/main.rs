use anyhow::Context;
use clap::Parser;
use generator::profile::{build_echo_burst, random_scenario, BurstConfig};
use gui_bridge::bridge::{default_bind_address, GuiBridge};
use gui_bridge::model::VisualizationModel;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::net::SocketAddr;
use std::ops::ControlFlow;
use std::path::PathBuf;
use tokio::runtime::Builder as TokioBuilder;
use tokio::signal;
use workflow::config::ScenarioConfig;
use workflow::runner::Runner;

mod generator;
mod gui_bridge;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Pulse radar scenario driver")]
struct Args {
    /// Load a scenario from YAML
    #[arg(long)]
    scenario: Option<PathBuf>,
    /// Populate a random scenario with this many targets
    #[arg(long)]
    targets: Option<usize>,
    #[arg(long)]
    ticks: Option<u64>,
    #[arg(long)]
    dt: Option<f64>,
    #[arg(long)]
    seed: Option<u64>,
    /// Run the signal chain once over a synthetic coherent burst
    #[arg(long, default_value_t = false)]
    offline: bool,
    /// Keep the HTTP bridge alive after the run
    #[arg(long, default_value_t = false)]
    serve: bool,
    #[arg(long, default_value_t = default_bind_address())]
    bind: SocketAddr,
    /// Write the run report as JSON
    #[arg(long)]
    report: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let scenario = match (&args.scenario, args.targets) {
        (Some(path), _) => ScenarioConfig::load(path)?,
        (None, Some(count)) => random_scenario(count, args.seed.unwrap_or_default()),
        (None, None) => ScenarioConfig::demo(),
    }
    .with_overrides(args.ticks, args.dt, args.seed);
    scenario.validate().context("validating scenario")?;

    let runner = Runner::new(scenario);
    let gui_bridge = GuiBridge::new();
    if args.serve {
        gui_bridge.serve(args.bind);
    }

    if args.offline {
        let burst_config = BurstConfig {
            seed: runner.config().engine.seed,
            ..Default::default()
        };
        let burst = build_echo_burst(&burst_config)?;
        let result = runner.execute_offline(&burst)?;
        println!(
            "Offline burst -> detections {}, profile rms {:.3}, power_profile len {}",
            result.detection_count,
            result.profile_rms,
            result.power_profile.len()
        );
        for detection in &result.detections {
            println!(
                "  cell {:>4} doppler {:>3}: {:.0} m at {:+.2} m/s",
                detection.range_bin, detection.doppler_bin, detection.range, detection.radial_velocity
            );
        }
        gui_bridge.publish(VisualizationModel {
            power_profile: result.power_profile,
            detection_count: result.detection_count,
            notes: result.notes,
            ..Default::default()
        });
        gui_bridge.publish_status("Offline burst results ready.");
    } else {
        let report = runner.run_with(|summary, snapshot, tracks| {
            gui_bridge.publish(VisualizationModel::from_tick(snapshot, tracks));
            if !summary.removed.is_empty() {
                log::info!("tick {} removed {:?}", summary.tick, summary.removed);
            }
            if gui_bridge.stop_requested() {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })?;

        let mut model = gui_bridge.model();
        model.performance = report.performance;
        gui_bridge.publish(model);

        println!(
            "Scenario {} -> ticks {}, detections {}, tracks {}, removed {}, failures {}, {:.2} ms/tick",
            report.scenario,
            report.ticks,
            report.detections,
            report.tracks.len(),
            report.removed.len(),
            report.target_failures + report.fusion_failures,
            report.performance.average_tick_ms
        );
        for track in &report.tracks {
            let position = track.track.position();
            let truth = track.truth.map(|id| id.to_string()).unwrap_or_else(|| "-".into());
            println!(
                "  track {} ({}) via {:?}: ({:.0}, {:.0}, {:.0}) confidence {:.2}",
                track.id, truth, track.track.method, position.x, position.y, position.z, track.track.confidence
            );
        }

        if let Some(report_path) = &args.report {
            if let Some(parent) = report_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(report_path)
                .with_context(|| format!("opening report {}", report_path.display()))?;
            serde_json::to_writer_pretty(&mut file, &report).context("writing run report")?;
            file.write_all(b"\n")?;
        }
    }

    if args.serve {
        gui_bridge.publish_status("HTTP bridge running (Ctrl+C to stop)...");
        let runtime = TokioBuilder::new_current_thread()
            .enable_all()
            .build()
            .context("creating runtime for signal handling")?;
        runtime.block_on(async {
            signal::ctrl_c().await.context("awaiting Ctrl+C to exit")?;
            Ok::<(), anyhow::Error>(())
        })?;
    }

    Ok(())
}
