//! Train a denoising autoencoder on noisy binary patterns.
//!
//! Run with `RUST_LOG=info cargo run --example denoising` to see per-epoch logs.

use rust_autoencoder::{Activation, AutoEncoderBuilder, Dataset, Samples, TrainConfig};

fn patterns(len: usize, dim: usize) -> rust_autoencoder::Result<Samples> {
    let rows: Vec<Vec<f32>> = (0..len)
        .map(|i| {
            (0..dim)
                .map(|j| if (j + i % 5) % 5 < 2 { 1.0 } else { 0.0 })
                .collect()
        })
        .collect();
    Samples::from_rows(&rows)
}

fn main() -> rust_autoencoder::Result<()> {
    env_logger::init();

    let x = patterns(500, 20)?;
    let mut model = AutoEncoderBuilder::new(20, 5)?
        .encode_activation(Activation::Tanh)?
        .noise(0.2)?
        .l2(1e-5)?
        .build()?;

    let data = Dataset::autoencoding(x.clone());
    let before = model.evaluate(&data)?;
    let history = model.train(
        &x,
        None,
        &mut [],
        &TrainConfig {
            epochs: 50,
            batch_size: 32,
            lr: 0.5,
            ..TrainConfig::default()
        },
    )?;
    let after = model.evaluate(&data)?;

    println!(
        "mse before={before:.5} after={after:.5} ({} epochs)",
        history.len()
    );

    let codes = model.encoder().predict(&x)?;
    println!("first code: {:?}", codes.row(0));
    Ok(())
}
