//! vehicled - vehicle inspection daemon
//!
//! This daemon:
//! 1. Reads frames from each configured stream on its own thread
//! 2. Detects vehicle type, plate and brand on every frame
//! 3. Captures one frame per stopped vehicle
//! 4. Reads plate text, plate nationality and body colour from it
//! 5. Publishes the event as JSON over MQTT

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use vehicle_inspector::config::VehicledConfig;
use vehicle_inspector::publish::{parse_mqtt_endpoint, MqttCredentials};
use vehicle_inspector::recognize::{
    ColorClassifier, CommandPlateReader, FixedColor, FixedNationality, FixedPlateReader,
    NationalityClassifier, PlateReader, PlateTextCountryIdentifier, RecognitionStageRunner,
};
use vehicle_inspector::{
    FileConfig, FileSource, LogPublisher, MqttPublisher, ObjectDetector, Publisher, StopReason,
    StreamPipeline, StubBackend,
};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Capture stopped vehicles and publish plate, country and colour over MQTT"
)]
struct Args {
    /// Path to a JSON or TOML config file.
    #[arg(long, env = "VEHICLE_CONFIG")]
    config: Option<PathBuf>,

    /// Use the stub detector and fixed recognizers, and log events instead
    /// of publishing them.
    #[arg(long)]
    stub: bool,

    /// Stop each stream after its first published event.
    #[arg(long)]
    once: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let cfg = VehicledConfig::load_from(args.config.as_deref())?;
    log::info!(
        "vehicled {} starting: {} stream(s), topic {}, area threshold {}",
        env!("CARGO_PKG_VERSION"),
        cfg.streams.len(),
        cfg.mqtt.topic,
        cfg.trigger.area_threshold
    );

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || {
            cancel.store(true, Ordering::SeqCst);
        })
        .expect("error setting Ctrl-C handler");
    }

    let runner = build_runner(&cfg, args.stub)?;
    let mqtt = if args.stub {
        None
    } else {
        Some(Arc::new(connect_mqtt(&cfg)?))
    };
    let publisher: Arc<dyn Publisher> = match &mqtt {
        Some(mqtt) => mqtt.clone(),
        None => Arc::new(LogPublisher),
    };

    let mut handles = Vec::with_capacity(cfg.streams.len());
    for stream in &cfg.streams {
        if args.stub && !stream.video_path.starts_with("stub://") {
            log::warn!(
                "stream {}: stub detector only matches stub:// sources, {} will not fire",
                stream.id,
                stream.video_path
            );
        }
        let source = FileSource::new(FileConfig {
            path: stream.video_path.clone(),
            target_fps: stream.target_fps,
        })
        .with_context(|| format!("stream {}", stream.id))?;
        let detector = build_detector(&cfg, args.stub)?;

        let pipeline = StreamPipeline::new(
            stream.id.clone(),
            Box::new(source),
            detector,
            runner.clone(),
            publisher.clone(),
        )
        .with_trigger(cfg.trigger.clone())
        .with_topic(cfg.mqtt.topic.clone())
        .stop_after_publish(args.once);

        let cancel = cancel.clone();
        let handle = std::thread::Builder::new()
            .name(format!("stream-{}", stream.id))
            .spawn(move || pipeline.run(&cancel))
            .with_context(|| format!("failed to start stream {}", stream.id))?;
        handles.push(handle);
    }

    let mut failed = 0usize;
    for handle in handles {
        let report = handle
            .join()
            .map_err(|_| anyhow!("stream thread panicked"))?;
        let s = &report.summary;
        log::info!(
            "stream {} finished: frames={} fired={} published={} unreadable={} failed={}",
            report.stream_id,
            s.frames,
            s.fired,
            s.published,
            s.unreadable,
            s.failed
        );
        if let StopReason::Failed(err) = &report.stop {
            log::error!("stream {} ended with error: {}", report.stream_id, err);
            failed += 1;
        }
    }

    drop(publisher);
    if let Some(mqtt) = mqtt {
        match Arc::try_unwrap(mqtt) {
            Ok(mqtt) => mqtt.disconnect()?,
            Err(_) => log::warn!("MQTT publisher still in use at shutdown"),
        }
    }

    if failed > 0 {
        return Err(anyhow!("{} stream(s) ended with an error", failed));
    }
    Ok(())
}

fn connect_mqtt(cfg: &VehicledConfig) -> Result<MqttPublisher> {
    let endpoint = parse_mqtt_endpoint(&cfg.mqtt.broker_addr)?;
    let credentials = MqttCredentials {
        username: cfg.mqtt.username.clone(),
        password: cfg.mqtt.password.clone(),
    };
    MqttPublisher::connect(
        &endpoint,
        &cfg.mqtt.client_id,
        &credentials,
        cfg.mqtt.tls_ca.as_deref(),
    )
}

fn build_detector(cfg: &VehicledConfig, stub: bool) -> Result<Box<dyn ObjectDetector>> {
    if stub {
        return Ok(Box::new(StubBackend::synthetic_lane()));
    }
    match &cfg.models.detector {
        Some(path) => tract_detector(path),
        None => Err(anyhow!(
            "no detector model configured (set models.detector or run with --stub)"
        )),
    }
}

fn build_runner(cfg: &VehicledConfig, stub: bool) -> Result<RecognitionStageRunner> {
    let (plate_reader, nationality, color): (
        Arc<dyn PlateReader>,
        Arc<dyn NationalityClassifier>,
        Arc<dyn ColorClassifier>,
    ) = if stub {
        (
            Arc::new(FixedPlateReader::new("STUB1234")),
            Arc::new(FixedNationality::new(None)),
            Arc::new(FixedColor::new("White")),
        )
    } else {
        let plate_reader = Arc::new(CommandPlateReader::from_command_line(
            &cfg.models.ocr_command,
        )?);
        let nationality: Arc<dyn NationalityClassifier> = match &cfg.models.nationality {
            Some(path) => tract_nationality(path)?,
            None => {
                log::info!("no nationality model configured, matching plate text instead");
                Arc::new(PlateTextCountryIdentifier::new())
            }
        };
        let color: Arc<dyn ColorClassifier> = match &cfg.models.color {
            Some(path) => tract_color(path)?,
            None => {
                log::warn!("no color model configured, every vehicle reports the default color");
                Arc::new(FixedColor::new(""))
            }
        };
        (plate_reader, nationality, color)
    };
    Ok(RecognitionStageRunner::new(
        plate_reader,
        nationality,
        color,
        cfg.recognition.clone(),
    ))
}

#[cfg(feature = "backend-tract")]
fn tract_detector(path: &Path) -> Result<Box<dyn ObjectDetector>> {
    Ok(Box::new(vehicle_inspector::detect::TractBackend::new(path)?))
}

#[cfg(not(feature = "backend-tract"))]
fn tract_detector(path: &Path) -> Result<Box<dyn ObjectDetector>> {
    Err(anyhow!(
        "detector model {} requires the backend-tract feature",
        path.display()
    ))
}

#[cfg(feature = "backend-tract")]
fn tract_nationality(path: &Path) -> Result<Arc<dyn NationalityClassifier>> {
    Ok(Arc::new(
        vehicle_inspector::recognize::TractNationalityClassifier::new(path)?,
    ))
}

#[cfg(not(feature = "backend-tract"))]
fn tract_nationality(path: &Path) -> Result<Arc<dyn NationalityClassifier>> {
    Err(anyhow!(
        "nationality model {} requires the backend-tract feature",
        path.display()
    ))
}

#[cfg(feature = "backend-tract")]
fn tract_color(path: &Path) -> Result<Arc<dyn ColorClassifier>> {
    Ok(Arc::new(
        vehicle_inspector::recognize::TractColorClassifier::new(path)?,
    ))
}

#[cfg(not(feature = "backend-tract"))]
fn tract_color(path: &Path) -> Result<Arc<dyn ColorClassifier>> {
    Err(anyhow!(
        "color model {} requires the backend-tract feature",
        path.display()
    ))
}
