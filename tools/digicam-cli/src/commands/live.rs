//! Live camera preview with effects, snapshots and recording.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use digicam_capture_engine::backend::get_backend;
use digicam_capture_engine::{CameraRequest, DisplaySurface, FrameScheduler, StartOutcome};
use digicam_common::config::AppConfig;
use digicam_common::error::DigicamError;
use digicam_platform_linux::{check_capabilities, missing_required};
use digicam_processing_core::{Compositor, EffectConfig, EffectId, Intensity};
use digicam_render_engine::{
    export_still, load_grain_texture, spawn_sampler, Clip, EndReason, GstWebmEncoderFactory,
    GstWindowPresenter, RecordingSettings, RecordingSink, VideoCodec,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch, Mutex};

pub struct LiveOptions {
    pub device: Option<String>,
    pub effect: Option<String>,
    pub intensity: Option<String>,
    pub fps: Option<u32>,
    pub window: bool,
    pub audio: bool,
    pub grain: Option<PathBuf>,
    pub output: Option<PathBuf>,
}

/// One line of operator input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveCommand {
    Effect(String),
    Intensity(String),
    /// Switch camera; `None` lets the backend choose.
    Camera(Option<String>),
    Snap,
    Record,
    Help,
    Quit,
    Unknown(String),
    Empty,
}

pub fn parse_command(line: &str) -> LiveCommand {
    let line = line.trim();
    let (verb, arg) = match line.split_once(char::is_whitespace) {
        Some((verb, arg)) => (verb, arg.trim()),
        None => (line, ""),
    };

    match verb.to_ascii_lowercase().as_str() {
        "" => LiveCommand::Empty,
        "effect" | "e" => LiveCommand::Effect(arg.to_string()),
        "intensity" | "i" => LiveCommand::Intensity(arg.to_string()),
        "camera" | "cam" => LiveCommand::Camera((!arg.is_empty()).then(|| arg.to_string())),
        "snap" | "s" => LiveCommand::Snap,
        "rec" | "r" => LiveCommand::Record,
        "help" | "?" => LiveCommand::Help,
        "quit" | "q" | "exit" => LiveCommand::Quit,
        _ => LiveCommand::Unknown(line.to_string()),
    }
}

pub async fn run(config: AppConfig, opts: LiveOptions) -> anyhow::Result<()> {
    let backend = get_backend();
    if !backend.is_supported() {
        let capabilities = check_capabilities();
        for cap in missing_required(&capabilities) {
            eprintln!("Missing: {} ({})", cap.name, cap.description);
        }
        anyhow::bail!("Camera capture is not supported in this environment");
    }

    let output_dir = opts.output.clone().unwrap_or_else(|| config.output_dir.clone());
    let initial = EffectConfig::from_text(
        opts.effect.as_deref().unwrap_or(&config.effect.effect),
        &opts
            .intensity
            .clone()
            .unwrap_or_else(|| config.effect.intensity.to_string()),
    );
    let (effect_tx, effect_rx) = watch::channel(initial);

    let surface = DisplaySurface::new();
    if opts.window && config.display.window {
        match GstWindowPresenter::new() {
            Ok(window) => surface.attach(Box::new(window)),
            Err(e) => tracing::warn!(error = %e, "Preview window unavailable"),
        }
    }

    let grain = opts
        .grain
        .clone()
        .or_else(|| config.effect.grain_texture.clone())
        .and_then(|path| load_grain_texture(&path));

    let mut request = CameraRequest::from_defaults(&config.capture);
    request.audio &= opts.audio;

    let scheduler = Arc::new(
        FrameScheduler::new(backend, surface.clone(), effect_rx)
            .with_request(request)
            .with_compositor(Compositor::new(grain))
            .with_refresh_hz(config.display.refresh_hz),
    );

    start_camera(&scheduler, opts.device.clone().or(config.capture.device.clone())).await;

    let stop = Arc::new(AtomicBool::new(false));
    let render = tokio::spawn({
        let scheduler = scheduler.clone();
        let stop = stop.clone();
        async move { scheduler.run(stop).await }
    });

    let recorder = Arc::new(Mutex::new(RecordingSink::new(
        Arc::new(GstWebmEncoderFactory),
        RecordingSettings {
            preferred_codec: VideoCodec::parse_lossy(&config.recording.video_codec),
            fps: opts.fps.unwrap_or(config.recording.fps),
        },
    )));
    let (clip_tx, mut clip_rx) = mpsc::unbounded_channel();
    let sampler = spawn_sampler(recorder.clone(), stop.clone(), clip_tx);

    print_help();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Some(clip) = clip_rx.recv() => {
                match clip.ended_by {
                    EndReason::EncoderFailed => println!("Encoder failed; recording stopped."),
                    _ => println!("Camera stopped; recording finalised."),
                }
                save_clip(&clip, &output_dir);
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_command(&line) {
                    LiveCommand::Effect(id) => {
                        let effect = EffectId::parse_lossy(&id);
                        effect_tx.send_modify(|c| c.effect = effect);
                        println!("Effect: {effect}");
                    }
                    LiveCommand::Intensity(text) => {
                        let intensity = Intensity::parse_lossy(&text);
                        effect_tx.send_modify(|c| c.intensity = intensity);
                        println!("Intensity: {:.2}", intensity.get());
                    }
                    LiveCommand::Camera(device) => {
                        let scheduler = scheduler.clone();
                        tokio::spawn(async move { start_camera(&scheduler, device).await });
                    }
                    LiveCommand::Snap => snapshot(&surface, &output_dir),
                    LiveCommand::Record => toggle_recording(&scheduler, &recorder, &output_dir).await,
                    LiveCommand::Help => print_help(),
                    LiveCommand::Quit => break,
                    LiveCommand::Unknown(text) => println!("Unknown command: {text} (try `help`)"),
                    LiveCommand::Empty => {}
                }
            }
        }
    }

    stop.store(true, Ordering::SeqCst);
    render.await??;
    sampler.await?;

    if let Some(clip) = recorder.lock().await.end().await? {
        save_clip(&clip, &output_dir);
    }
    while let Ok(clip) = clip_rx.try_recv() {
        save_clip(&clip, &output_dir);
    }
    scheduler.stop().await;
    Ok(())
}

async fn start_camera(scheduler: &FrameScheduler, device: Option<String>) {
    match scheduler.start(device).await {
        Ok(StartOutcome::Started { width, height, .. }) => {
            println!("Camera ready: {width}x{height}");
        }
        Ok(StartOutcome::Superseded) => {}
        Err(e) if e.is_user_facing() => eprintln!("Camera error: {e}"),
        Err(e) => {
            tracing::error!(error = %e, "Camera start failed");
            eprintln!("Camera failed to start; see the log for details.");
        }
    }
}

async fn toggle_recording(
    scheduler: &FrameScheduler,
    recorder: &Mutex<RecordingSink>,
    output_dir: &Path,
) {
    let mut sink = recorder.lock().await;
    if sink.is_recording() {
        match sink.end().await {
            Ok(Some(clip)) => save_clip(&clip, output_dir),
            Ok(None) => {}
            Err(e) => eprintln!("Recording error: {e}"),
        }
        return;
    }

    match sink.begin(scheduler.active_capture().await).await {
        Ok(_) => println!("Recording... (`rec` again to stop)"),
        Err(DigicamError::NoActiveCapture) => println!("No camera is active; nothing to record."),
        Err(e) => eprintln!("Recording error: {e}"),
    }
}

fn snapshot(surface: &DisplaySurface, output_dir: &Path) {
    let Some(frame) = surface.latest_frame() else {
        println!("No frame to capture yet.");
        return;
    };
    match export_still(&frame, output_dir) {
        Ok(path) => println!("Saved {}", path.display()),
        Err(e) => eprintln!("Snapshot failed: {e}"),
    }
}

fn save_clip(clip: &Clip, output_dir: &Path) {
    match clip.save(output_dir) {
        Ok(path) => println!("Saved {} ({} bytes)", path.display(), clip.len()),
        Err(e) => eprintln!("Saving recording failed: {e}"),
    }
}

fn print_help() {
    println!("Commands:");
    println!("  effect <id>       none, grayscale, sepia, vintage, invert, rgbSplit, scanlines");
    println!("  intensity <0..1>  effect strength");
    println!("  camera [device]   switch camera");
    println!("  snap              save a PNG snapshot");
    println!("  rec               start/stop recording");
    println!("  quit              exit (Ctrl+C also works)");
}
