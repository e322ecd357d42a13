//! Apply an effect to an image file.

use std::path::PathBuf;

use digicam_common::clock::badge_timestamp;
use digicam_processing_core::{apply_in_place, Compositor, EffectConfig};
use digicam_render_engine::{export_still, load_frame, load_grain_texture};
use rand::rngs::StdRng;
use rand::SeedableRng;

pub fn run(
    input: PathBuf,
    effect: String,
    intensity: String,
    output: PathBuf,
    seed: Option<u64>,
    timestamp: Option<String>,
    grain: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut frame = load_frame(&input)?;
    let config = EffectConfig::from_text(&effect, &intensity);
    let seed = seed.unwrap_or_else(rand::random::<u64>);
    tracing::info!(
        input = %input.display(),
        effect = %config.effect,
        intensity = config.intensity.get(),
        seed,
        "Applying effect"
    );

    apply_in_place(&mut frame, &config);

    let compositor = Compositor::new(grain.as_deref().and_then(load_grain_texture));
    let stamp = timestamp.unwrap_or_else(badge_timestamp);
    let mut rng = StdRng::seed_from_u64(seed);
    compositor.compose(&mut frame, &config, &stamp, &mut rng);

    let path = export_still(&frame, &output)?;
    println!("Wrote {}", path.display());
    Ok(())
}
